//! Error taxonomy for the provisioning core
//!
//! Every failure the core can produce maps onto one of five recoverable kinds.
//! None of them is fatal to the process: the workflow boundary turns each one
//! into a single operator-facing reply and leaves the state machine in a
//! well-defined state.

use crate::fetch::FetchError;
use crate::gateway::GatewayError;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification used when reporting to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PathNotFound,
    Validation,
    QueueExhausted,
    WriteFailure,
    RemoteCallFailure,
}

#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("content is not valid UTF-8")]
    NotUtf8,
    #[error("content is empty")]
    Empty,
    #[error("no valid JSON found: {0}")]
    Unparseable(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("`{file_name}` is not a .{expected} file")]
    Extension {
        file_name: String,
        expected: &'static str,
    },
    #[error("`{file_name}` is {size} bytes, the limit is {max}")]
    TooLarge {
        file_name: String,
        size: u64,
        max: u64,
    },
    #[error("`{file_name}` is not valid JSON: {source}")]
    Malformed {
        file_name: String,
        #[source]
        source: SanitizeError,
    },
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("volume root not found ({tried} candidates tried)")]
    VolumeRootNotFound { tried: usize },
    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),
    #[error("invalid server identifier `{0}`")]
    InvalidIdentifier(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no eligible servers remain")]
    QueueExhausted,
    #[error("server {identifier} is no longer eligible: {reason}")]
    TargetUnavailable { identifier: String, reason: String },
    #[error("failed to write credential for {identifier}: {source}")]
    WriteFailure {
        identifier: String,
        #[source]
        source: std::io::Error,
    },
    #[error("panel call failed: {0}")]
    Remote(#[from] GatewayError),
    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("panel host `{0}` is blacklisted")]
    Blacklisted(String),
}

impl ProvisionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::VolumeRootNotFound { .. }
            | ProvisionError::PathNotFound(_)
            | ProvisionError::InvalidIdentifier(_) => ErrorKind::PathNotFound,
            ProvisionError::Validation(_) => ErrorKind::Validation,
            ProvisionError::QueueExhausted => ErrorKind::QueueExhausted,
            ProvisionError::TargetUnavailable { .. } | ProvisionError::WriteFailure { .. } => {
                ErrorKind::WriteFailure
            }
            ProvisionError::Remote(_)
            | ProvisionError::Fetch(_)
            | ProvisionError::Blacklisted(_) => ErrorKind::RemoteCallFailure,
        }
    }
}
