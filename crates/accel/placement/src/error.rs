//! Placement error types

use thiserror::Error;

/// Capacity-tracking service errors
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("No placement endpoint in the current session")]
    MissingEndpoint,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Generation conflict: {0}")]
    Conflict(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Placement API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid placement response: {0}")]
    InvalidResponse(String),
}

/// Result type for placement operations
pub type Result<T> = std::result::Result<T, PlacementError>;
