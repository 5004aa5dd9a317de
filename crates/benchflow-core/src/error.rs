//! Configuration error types

use thiserror::Error;

/// Errors raised while validating a decoded benchmark configuration.
///
/// All of these are fatal and surface before any resource is provisioned.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Benchmark '{benchmark}' is not supported on cloud '{cloud}'")]
    UnsupportedBenchmark { cloud: String, benchmark: String },

    #[error("VM group '{group}' references undefined placement group '{placement_group}'")]
    UnknownPlacementGroup {
        group: String,
        placement_group: String,
    },

    #[error("VM group name '{0}' is reserved for a cluster service and cannot appear in the config")]
    ReservedGroupName(String),

    #[error("Unmanaged cluster services cannot be combined with user VM groups: {0}")]
    NonClusterVmGroups(String),

    #[error("VPC peering is only supported between exactly 2 networks, found {0}")]
    UnsupportedPeering(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
