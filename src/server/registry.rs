use std::collections::HashMap;
use std::net::SocketAddr;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The authoritative set of live connections.
///
/// Every accepted connection is registered here before its driver runs and
/// unregistered when the driver finishes; once `unregister` returns the
/// connection's task has released (or is about to drop) its socket and
/// buffers, and no further readiness processing happens for it.
pub struct Registry {
    connections: Mutex<HashMap<u32, ConnectionHandle>>,
}

struct ConnectionHandle {
    peer: SocketAddr,
    cancel: CancellationToken,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new connection and returns its cancellation token.
    pub fn register(&self, id: u32, peer: SocketAddr) -> CancellationToken {
        let token = CancellationToken::new();
        self.connections.lock().insert(
            id,
            ConnectionHandle {
                peer,
                cancel: token.clone(),
            },
        );
        token
    }

    /// Removes a connection. Unregistering an unknown id is a no-op.
    pub fn unregister(&self, id: u32) {
        self.connections.lock().remove(&id);
    }

    /// Number of currently registered connections.
    pub fn active_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Cancels every registered connection (server shutdown).
    pub fn shutdown(&self) {
        for (id, handle) in self.connections.lock().iter() {
            debug!(id, peer = %handle.peer, "cancelling connection");
            handle.cancel.cancel();
        }
    }
}
