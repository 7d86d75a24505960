//! Agent error types

use accel_types::AddressParseError;
use thiserror::Error;

/// Hardware discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to read device inventory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed device inventory: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid device address: {0}")]
    Address(#[from] AddressParseError),

    #[error("Driver error for vendor {vendor}: {message}")]
    Driver { vendor: String, message: String },
}

/// Inventory service errors
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Deployable not found: {0}")]
    NotFound(String),

    #[error("Deployable already exists at {0}")]
    AlreadyExists(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inventory API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid inventory response: {0}")]
    InvalidResponse(String),
}

/// Errors that abort a reconciliation run or an agent operation
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Inventory failed: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Image catalog failed: {0}")]
    Catalog(#[from] accel_catalog::CatalogError),

    #[error("Placement failed: {0}")]
    Placement(#[from] accel_placement::PlacementError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::Config(e.to_string())
    }
}

/// Result type for agent operations
pub type AgentResult<T> = std::result::Result<T, AgentError>;
