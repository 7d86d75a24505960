//! Catalog error types

use thiserror::Error;

/// Image catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("No image catalog endpoint in the current session")]
    MissingEndpoint,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid catalog response: {0}")]
    InvalidResponse(String),
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;
