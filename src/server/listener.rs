use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::server::connection::Connection;
use crate::server::context::ServerContext;
use crate::server::registry::Registry;

/// TCP acceptor: turns accepted sockets into registered, running
/// connections.
pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
    registry: Arc<Registry>,
    next_id: AtomicU32,
}

impl Server {
    /// Creates a new server around an already-bound listener.
    pub fn new(listener: TcpListener, context: ServerContext) -> Self {
        Self {
            listener,
            context: Arc::new(context),
            registry: Arc::new(Registry::new()),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` fires.
    ///
    /// A failed accept is logged and the listener keeps serving; one bad
    /// accept never takes the server down. On shutdown every live
    /// connection is cancelled through the registry.
    pub async fn serve(self, shutdown: CancellationToken) -> io::Result<()> {
        loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
                _ = shutdown.cancelled() => break,
            };

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            info!(id, peer = %peer, "accepted connection");

            let registry = self.registry.clone();
            let context = self.context.clone();
            tokio::spawn(async move {
                let cancel = registry.register(id, peer);
                let mut connection = Connection::new(stream, id, context);
                match connection.run(cancel).await {
                    Ok(reason) => info!(id, ?reason, "connection closed"),
                    Err(e) => warn!(id, error = %e, "connection failed"),
                }
                registry.unregister(id);
            });
        }

        info!("listener stopped, closing connections");
        self.registry.shutdown();
        Ok(())
    }
}
