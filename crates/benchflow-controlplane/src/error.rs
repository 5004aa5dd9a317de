//! Orchestrator error type

use benchflow_cloud::CloudError;
use benchflow_core::ConfigError;
use thiserror::Error;

/// Errors raised while constructing, provisioning or restoring a run.
///
/// Teardown never raises: partial teardown failures are logged and the
/// remaining steps continue.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("Snapshot version {found} is newer than supported version {supported}")]
    SnapshotVersion { found: u32, supported: u32 },

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RunError>;
