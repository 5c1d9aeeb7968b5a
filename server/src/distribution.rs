//! Distribution engine: one uploaded credential file onto one eligible server
//!
//! A [`DistributionSession`] owns the FIFO queue of eligible targets for a
//! single operator and the log of assignments made so far. Each call to
//! [`DistributionSession::consume`] either produces exactly one assignment or
//! none:
//!
//! - Validation failures (extension, size, content) and an empty queue reject
//!   the file without touching the session.
//! - Once a target is popped it never goes back on the queue. If the target
//!   turns out to be unusable, or the write fails, the file is reported as not
//!   placed and the operator can resend it against the next target.
//!
//! Credential files are written to a temporary file in the session directory,
//! synced, then linked into place without clobbering, so a crash can never
//! leave a half-written `creds.json` that looks like an occupied server.

use crate::error::{ProvisionError, ValidationError};
use crate::gateway::ServerRecord;
use crate::paths::{session_dir, VolumeResolver};
use crate::sanitize;
use crate::utils::get_timestamp;
use log::{info, warn};
use shared::{CREDENTIAL_EXTENSION, CREDENTIAL_FILE_NAME};
use std::collections::VecDeque;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_FILE_BYTES: u64 = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub source_file_name: String,
    pub target: ServerRecord,
    /// Unix milliseconds
    pub assigned_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Finalized,
    Cancelled,
}

/// Bookkeeping handed back when a session closes.
#[derive(Debug, Clone)]
pub struct Summary {
    pub operator_id: u64,
    pub outcome: SessionOutcome,
    pub assignments: Vec<Assignment>,
    /// Eligible targets that were never popped
    pub remaining: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct DistributionSession {
    operator_id: u64,
    queue: VecDeque<ServerRecord>,
    initial_len: usize,
    assignments: Vec<Assignment>,
    started_at: Instant,
    started_at_ms: u64,
}

impl DistributionSession {
    pub fn begin(operator_id: u64, eligible: Vec<ServerRecord>) -> Self {
        info!(
            "Operator {} started a distribution session with {} eligible servers",
            operator_id,
            eligible.len()
        );

        Self {
            operator_id,
            initial_len: eligible.len(),
            queue: eligible.into(),
            assignments: Vec::new(),
            started_at: Instant::now(),
            started_at_ms: get_timestamp(),
        }
    }

    pub fn operator_id(&self) -> u64 {
        self.operator_id
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn initial_len(&self) -> usize {
        self.initial_len
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    /// Places one uploaded file onto the head of the queue.
    pub fn consume(
        &mut self,
        raw: &[u8],
        file_name: &str,
        resolver: &VolumeResolver,
        limits: &UploadLimits,
    ) -> Result<Assignment, ProvisionError> {
        check_extension(file_name)?;
        check_size(file_name, raw.len() as u64, limits)?;
        let content =
            sanitize::clean_bytes(raw).map_err(|source| ValidationError::Malformed {
                file_name: file_name.to_string(),
                source,
            })?;

        let target = self
            .queue
            .pop_front()
            .ok_or(ProvisionError::QueueExhausted)?;

        let session_path = match verify_target(resolver, &target) {
            Ok(path) => path,
            Err(e) => {
                warn!(
                    "Dropped {} from the queue while placing {}: {}",
                    target.identifier, file_name, e
                );
                return Err(e);
            }
        };

        if let Err(e) = write_credential(&session_path, &content) {
            warn!(
                "Writing {} to {} failed: {}",
                file_name, target.identifier, e
            );
            return Err(if e.kind() == ErrorKind::AlreadyExists {
                ProvisionError::TargetUnavailable {
                    identifier: target.identifier,
                    reason: "a credential appeared while writing".to_string(),
                }
            } else {
                ProvisionError::WriteFailure {
                    identifier: target.identifier,
                    source: e,
                }
            });
        }

        let assignment = Assignment {
            source_file_name: file_name.to_string(),
            target,
            assigned_at: get_timestamp(),
        };
        info!(
            "Assigned {} -> {} ({})",
            assignment.source_file_name, assignment.target.display_name, assignment.target.identifier
        );
        self.assignments.push(assignment.clone());
        Ok(assignment)
    }

    pub fn finalize(self) -> Summary {
        self.close(SessionOutcome::Finalized)
    }

    /// Ends the session without rolling back credentials already written.
    pub fn cancel(self) -> Summary {
        self.close(SessionOutcome::Cancelled)
    }

    fn close(self, outcome: SessionOutcome) -> Summary {
        let summary = Summary {
            operator_id: self.operator_id,
            outcome,
            remaining: self.queue.len(),
            elapsed: self.started_at.elapsed(),
            assignments: self.assignments,
        };
        info!(
            "Operator {} closed distribution session ({:?}) with {} assignments",
            summary.operator_id,
            outcome,
            summary.assignments.len()
        );
        summary
    }
}

pub fn check_extension(file_name: &str) -> Result<(), ValidationError> {
    let matches = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(CREDENTIAL_EXTENSION))
        .unwrap_or(false);

    if matches {
        Ok(())
    } else {
        Err(ValidationError::Extension {
            file_name: file_name.to_string(),
            expected: CREDENTIAL_EXTENSION,
        })
    }
}

pub fn check_size(file_name: &str, size: u64, limits: &UploadLimits) -> Result<(), ValidationError> {
    if size > limits.max_file_bytes {
        Err(ValidationError::TooLarge {
            file_name: file_name.to_string(),
            size,
            max: limits.max_file_bytes,
        })
    } else {
        Ok(())
    }
}

/// Re-checks a popped target right before writing; the disk may have changed
/// since the scan.
fn verify_target(
    resolver: &VolumeResolver,
    target: &ServerRecord,
) -> Result<PathBuf, ProvisionError> {
    let unavailable = |reason: String| ProvisionError::TargetUnavailable {
        identifier: target.identifier.clone(),
        reason,
    };

    let server_path = resolver
        .resolve_server_path(&target.identifier)
        .map_err(|e| unavailable(e.to_string()))?;
    let session_path = session_dir(&server_path);

    if !session_path.is_dir() {
        return Err(unavailable("session directory is missing".to_string()));
    }
    if session_path.join(CREDENTIAL_FILE_NAME).exists() {
        return Err(unavailable("a credential is already present".to_string()));
    }
    Ok(session_path)
}

/// Mode of a placed credential; the game server reads it as a different user.
#[cfg(unix)]
const CREDENTIAL_MODE: u32 = 0o644;

fn write_credential(session_path: &Path, content: &str) -> std::io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".creds-")
        .suffix(".tmp")
        .tempfile_in(session_path)?;
    tmp.write_all(content.as_bytes())?;
    // Temp files start out 0600 and persisting keeps the mode
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(CREDENTIAL_MODE))?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(session_path.join(CREDENTIAL_FILE_NAME))
        .map_err(|e| e.error)?;
    Ok(())
}
