//! Transfer request and result types
//!
//! Defines what the orchestrator asks of the driver and what it gets back.

use std::fmt;

use crate::protocol::{DirectoryEntry, NakCode};

/// Kind of transfer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Put,
    Get,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::List => write!(f, "List"),
            Operation::Put => write!(f, "Put"),
            Operation::Get => write!(f, "Get"),
        }
    }
}

/// One protocol step, consumed by `TransferDriver::execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRequest {
    List { remote_path: String },
    Put { remote_path: String, payload: Vec<u8> },
    Get { remote_path: String },
}

impl TransferRequest {
    pub fn operation(&self) -> Operation {
        match self {
            TransferRequest::List { .. } => Operation::List,
            TransferRequest::Put { .. } => Operation::Put,
            TransferRequest::Get { .. } => Operation::Get,
        }
    }

    pub fn remote_path(&self) -> &str {
        match self {
            TransferRequest::List { remote_path }
            | TransferRequest::Put { remote_path, .. }
            | TransferRequest::Get { remote_path } => remote_path,
        }
    }
}

/// Terminal state of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Completed,
    /// The device answered with a definitive NAK.
    Rejected {
        error_code: NakCode,
        system_error_code: Option<u8>,
    },
    /// Every attempt of one exchange timed out.
    Exhausted { attempts: u32 },
    /// The link failed in a way a retry cannot fix.
    LinkFault(String),
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Completed => write!(f, "completed"),
            TransferStatus::Rejected {
                error_code,
                system_error_code: Some(errno),
            } => write!(
                f,
                "device error {} ({}), system error {}",
                error_code.as_u8(),
                error_code,
                errno
            ),
            TransferStatus::Rejected {
                error_code,
                system_error_code: None,
            } => write!(f, "device error {} ({})", error_code.as_u8(), error_code),
            TransferStatus::Exhausted { attempts } => {
                write!(f, "no reply after {} attempts", attempts)
            }
            TransferStatus::LinkFault(msg) => write!(f, "link fault: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPayload {
    Listing(Vec<DirectoryEntry>),
    Content(Vec<u8>),
}

/// Outcome of one operation. A failed result never carries a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    operation: Operation,
    status: TransferStatus,
    payload: Option<TransferPayload>,
}

impl TransferResult {
    pub fn completed(operation: Operation, payload: Option<TransferPayload>) -> Self {
        Self {
            operation,
            status: TransferStatus::Completed,
            payload,
        }
    }

    pub fn failed(operation: Operation, status: TransferStatus) -> Self {
        Self {
            operation,
            status,
            payload: None,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn success(&self) -> bool {
        self.status == TransferStatus::Completed
    }

    pub fn status(&self) -> &TransferStatus {
        &self.status
    }

    pub fn into_status(self) -> TransferStatus {
        self.status
    }

    /// Protocol-level error code reported by the device.
    pub fn error_code(&self) -> Option<u8> {
        self.nak_code().map(NakCode::as_u8)
    }

    pub fn nak_code(&self) -> Option<NakCode> {
        match &self.status {
            TransferStatus::Rejected { error_code, .. } => Some(*error_code),
            _ => None,
        }
    }

    /// Secondary system errno accompanying the error code, if any.
    pub fn system_error_code(&self) -> Option<u8> {
        match &self.status {
            TransferStatus::Rejected {
                system_error_code, ..
            } => *system_error_code,
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&TransferPayload> {
        self.payload.as_ref()
    }

    pub fn entries(&self) -> Option<&[DirectoryEntry]> {
        match &self.payload {
            Some(TransferPayload::Listing(entries)) => Some(entries),
            _ => None,
        }
    }

    pub fn content(&self) -> Option<&[u8]> {
        match &self.payload {
            Some(TransferPayload::Content(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_payload(self) -> Option<TransferPayload> {
        self.payload
    }
}
