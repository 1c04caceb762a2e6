mod error;
pub mod machine;

pub use error::ConnectionError;
pub use machine::{CloseReason, Direction, Phase, Progress, StateMachine, Transport};

use std::sync::Arc;

use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::server::context::ServerContext;

/// A single client connection: the socket plus its state machine.
///
/// The driver is the machine's only caller, so per-connection execution is
/// strictly sequential. Between `advance` calls it awaits exactly the one
/// readiness interest the machine suspended on; a new suspension replaces
/// the previous subscription rather than accumulating.
pub struct Connection {
    id: u32,
    stream: TcpStream,
    machine: StateMachine,
}

impl Connection {
    pub fn new(stream: TcpStream, id: u32, context: Arc<ServerContext>) -> Self {
        Self {
            id,
            stream,
            machine: StateMachine::new(context, id),
        }
    }

    /// Drives the state machine until the connection closes or the server
    /// shuts down.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<CloseReason, ConnectionError> {
        loop {
            match self.machine.advance(&mut self.stream)? {
                Progress::Closed(reason) => return Ok(reason),
                Progress::Suspended(direction) => {
                    let interest = match direction {
                        Direction::Read => Interest::READABLE,
                        Direction::Write => Interest::WRITABLE,
                    };
                    tokio::select! {
                        ready = self.stream.ready(interest) => {
                            ready?;
                        }
                        _ = cancel.cancelled() => {
                            debug!(id = self.id, "connection cancelled");
                            return Ok(CloseReason::ServerShutdown);
                        }
                    }
                }
            }
        }
    }
}
