//! Error handlers
//!
//! Maps errors to process exit codes and reports them.

use crate::error::types::CycleError;
use log::error;

pub const EXIT_CONFIG: u8 = 1;
pub const EXIT_LOCAL_IO: u8 = 2;
pub const EXIT_LINK: u8 = 3;
pub const EXIT_TRANSFER: u8 = 4;
pub const EXIT_VERIFICATION: u8 = 5;

/// Log a failed cycle
pub fn handle_error(err: &CycleError) {
    error!("Upload cycle failed: {}", err);
}

/// Convert a cycle error to a process exit code
pub fn error_to_exit_code(err: &CycleError) -> u8 {
    match err {
        CycleError::LocalIo { .. } => EXIT_LOCAL_IO,
        CycleError::Link(_) => EXIT_LINK,
        CycleError::Transfer { .. } => EXIT_TRANSFER,
        CycleError::VerificationFailure { .. } => EXIT_VERIFICATION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use crate::transfer::{Operation, TransferStatus};
    use crate::verify::digest;

    #[test]
    fn each_error_class_gets_its_own_code() {
        let local = CycleError::LocalIo {
            path: "missing.lua".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let link = CycleError::Link(LinkError::Timeout);
        let transfer = CycleError::Transfer {
            operation: Operation::Put,
            remote_path: "/APM/scripts/a.lua".into(),
            status: TransferStatus::Exhausted { attempts: 3 },
        };
        let verification = CycleError::VerificationFailure {
            local: digest(b"a"),
            remote: digest(b""),
            local_len: 1,
            remote_len: 0,
        };

        let codes = [
            error_to_exit_code(&local),
            error_to_exit_code(&link),
            error_to_exit_code(&transfer),
            error_to_exit_code(&verification),
        ];
        assert_eq!(
            codes,
            [EXIT_LOCAL_IO, EXIT_LINK, EXIT_TRANSFER, EXIT_VERIFICATION]
        );
    }
}
