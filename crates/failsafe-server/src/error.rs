//! Server error types.

use thiserror::Error;

/// Fatal server errors. Per-connection failures never surface here; they
/// end the connection and the loop continues.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Bad configuration (bind address, layout string, image path).
    #[error("configuration error: {0}")]
    Config(String),

    /// Listener or socket setup failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
