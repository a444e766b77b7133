//! Error types for shardplane

use std::fmt;

/// Result type alias for shardplane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for shardplane
#[derive(Debug)]
pub enum Error {
    /// Tenant is not present in the partition directory
    TenantNotFound(String),
    /// Named store is not a member of the ingester fleet
    StoreNotFound(String),
    /// Partition is not present in the directory or on the ingester
    PartitionNotFound(String),
    /// The fleet cannot absorb the projected load of a split
    CapacityExhausted { needed: f64, free: f64 },
    /// Configuration errors
    Config(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TenantNotFound(id) => write!(f, "Tenant not found: {}", id),
            Error::StoreNotFound(name) => write!(f, "Store not found: {}", name),
            Error::PartitionNotFound(id) => write!(f, "Partition not found: {}", id),
            Error::CapacityExhausted { needed, free } => {
                write!(
                    f,
                    "Not enough capacity: needed {:.0} series, {:.0} free",
                    needed, free
                )
            }
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}
