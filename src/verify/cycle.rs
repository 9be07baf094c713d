//! Upload-and-verify cycle
//!
//! Reads a local file, puts it on the device, optionally lists the target
//! directory, reads the file back and compares MD5 digests. On success a
//! restart can be requested so the autopilot reloads its scripts.

use log::{info, warn};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::VerifyConfig;
use crate::error::CycleError;
use crate::link::{Link, RestartParams, Session};
use crate::protocol::DirectoryEntry;
use crate::transfer::{TransferDriver, TransferResult};
use crate::verify::digest::{Digest, digest};

/// What one cycle does.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub list_parent: bool,
    pub restart: Option<RestartParams>,
    pub side_file_suffix: String,
}

impl CycleOptions {
    /// Options for uploading `local_path` into `config.remote_dir`.
    pub fn from_config(local_path: impl Into<PathBuf>, config: &VerifyConfig, restart: bool) -> Self {
        let local_path = local_path.into();
        let remote_path = remote_path_for(&config.remote_dir, &local_path);
        Self {
            local_path,
            remote_path,
            list_parent: config.list_parent,
            restart: restart.then_some(RestartParams {
                param1: config.restart_param1,
                param6: config.restart_param6,
            }),
            side_file_suffix: config.side_file_suffix.clone(),
        }
    }

    pub fn side_file_path(&self) -> PathBuf {
        side_file_path(&self.local_path, &self.side_file_suffix)
    }
}

/// Outcome of a verified cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub remote_path: String,
    pub local_digest: Digest,
    pub remote_digest: Digest,
    pub bytes: usize,
    pub listing: Option<Vec<DirectoryEntry>>,
    pub side_file: Option<PathBuf>,
    pub restart_sent: bool,
}

pub fn run_cycle<L: Link>(
    driver: &TransferDriver,
    session: &mut Session<L>,
    options: &CycleOptions,
) -> Result<CycleReport, CycleError> {
    let content = fs::read(&options.local_path).map_err(|source| CycleError::LocalIo {
        path: options.local_path.clone(),
        source,
    })?;
    let local_digest = digest(&content);
    info!(
        "Uploading {} ({} bytes, md5 {}) to {}",
        options.local_path.display(),
        content.len(),
        local_digest,
        options.remote_path
    );

    let put = driver.put(session, &content, &options.remote_path);
    check(put, &options.remote_path)?;

    let listing = if options.list_parent {
        let parent = parent_dir(&options.remote_path);
        let result = driver.list(session, parent);
        match result.entries() {
            Some(entries) => {
                for entry in entries {
                    info!("  {}", entry);
                }
                Some(entries.to_vec())
            }
            None => {
                warn!("Listing {} failed: {}", parent, result.status());
                None
            }
        }
    } else {
        None
    };

    let get = driver.get(session, &options.remote_path);
    let remote = match check(get, &options.remote_path)?.content() {
        Some(bytes) => bytes.to_vec(),
        None => Vec::new(),
    };
    let remote_digest = digest(&remote);

    let side_path = options.side_file_path();
    let side_file = match fs::write(&side_path, &remote) {
        Ok(()) => Some(side_path),
        Err(e) => {
            warn!("Cannot write {}: {}", side_path.display(), e);
            None
        }
    };

    if local_digest != remote_digest {
        return Err(CycleError::VerificationFailure {
            local: local_digest,
            remote: remote_digest,
            local_len: content.len(),
            remote_len: remote.len(),
        });
    }
    info!("Verified {} (md5 {})", options.remote_path, remote_digest);

    let restart_sent = match &options.restart {
        Some(params) => match session.request_restart(params) {
            Ok(()) => {
                info!("Restart requested");
                true
            }
            Err(e) => {
                warn!("Restart request failed: {}", e);
                false
            }
        },
        None => false,
    };

    Ok(CycleReport {
        remote_path: options.remote_path.clone(),
        local_digest,
        remote_digest,
        bytes: content.len(),
        listing,
        side_file,
        restart_sent,
    })
}

fn check(result: TransferResult, remote_path: &str) -> Result<TransferResult, CycleError> {
    if result.success() {
        return Ok(result);
    }
    Err(CycleError::Transfer {
        operation: result.operation(),
        remote_path: remote_path.to_string(),
        status: result.into_status(),
    })
}

/// Remote path of `local_path` inside `remote_dir`.
pub fn remote_path_for(remote_dir: &str, local_path: &Path) -> String {
    let name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("{}/{}", remote_dir.trim_end_matches('/'), name)
}

/// Directory part of a remote path; "/" for top-level entries.
pub fn parent_dir(remote_path: &str) -> &str {
    match remote_path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

/// `<local><suffix>` beside the local file.
pub fn side_file_path(local_path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(local_path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_path_joins_directory_and_file_name() {
        assert_eq!(
            remote_path_for("/APM/scripts", Path::new("lua/Cyphal.lua")),
            "/APM/scripts/Cyphal.lua"
        );
        assert_eq!(remote_path_for("/APM/scripts/", Path::new("a.lua")), "/APM/scripts/a.lua");
        assert_eq!(remote_path_for("", Path::new("a.lua")), "/a.lua");
    }

    #[test]
    fn parent_of_remote_path() {
        assert_eq!(parent_dir("/APM/scripts/a.lua"), "/APM/scripts");
        assert_eq!(parent_dir("/a.lua"), "/");
        assert_eq!(parent_dir("a.lua"), "/");
    }

    #[test]
    fn side_file_appends_suffix() {
        assert_eq!(
            side_file_path(Path::new("scripts/Cyphal.lua"), "_back"),
            PathBuf::from("scripts/Cyphal.lua_back")
        );
    }

    #[test]
    fn restart_params_follow_config() {
        let config = VerifyConfig::default();
        let options = CycleOptions::from_config("Cyphal.lua", &config, true);
        assert_eq!(options.remote_path, "/APM/scripts/Cyphal.lua");
        assert_eq!(
            options.restart,
            Some(RestartParams {
                param1: 1.0,
                param6: 20190226.0
            })
        );
        assert!(CycleOptions::from_config("Cyphal.lua", &config, false).restart.is_none());
    }
}
