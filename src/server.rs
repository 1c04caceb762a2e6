//! TCP server: acceptor, per-connection state machines, registry.
//!
//! ## Architecture
//!
//! ```text
//! +--------+
//! | Server |  <- Accepts TCP connections
//! +--------+
//!      |
//!      v
//! +------------+     +--------------+
//! | Connection | --> | StateMachine |  <- Handshake + command phases
//! +------------+     +--------------+
//!      |
//!      v
//! +----------+
//! | Registry |  <- Authoritative set of live connections
//! +----------+
//! ```
//!
//! ## Terminology
//!
//! - **Server**: TCP listener that registers and spawns connections
//! - **Connection**: one client socket plus the task driving its machine
//! - **StateMachine**: the connection's protocol phase and buffers; makes
//!   forward progress across non-blocking I/O and suspends on would-block
//! - **Registry**: tracks live connections and tears them down on shutdown
//! - **ServerContext**: immutable protocol identity shared by all
//!   connections

pub mod connection;
pub mod context;
pub mod listener;
pub mod registry;

pub use connection::{CloseReason, Connection, ConnectionError, Phase, Progress, StateMachine};
pub use context::ServerContext;
pub use listener::Server;
pub use registry::Registry;
