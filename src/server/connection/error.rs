use thiserror::Error;

use crate::protocol::ProtocolError;

/// Connection-fatal errors.
///
/// These tear down one connection; they never propagate past the registry
/// or affect the server process.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
