//! Error type shared by the client, configuration and session layers.

use thiserror::Error;

/// Message used when the backend reports failure without saying why.
pub const GENERIC_API_ERROR: &str = "API returned an error";

#[derive(Debug, Error)]
pub enum Error {
    /// Network failure, timeout, or an undecodable response body.
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("Request failed with status {0}")]
    HttpStatus(u16),

    /// The backend answered `status: false`. Displays exactly the
    /// server-supplied message.
    #[error("{0}")]
    Api(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
