//! Wire protocol codec.
//!
//! Implements the packet layer the server and client exchange: the initial
//! handshake, command frames, and OK/ERR results, all framed as packets with
//! a 3-byte length and a sequence id.
//!
//! ## Architecture
//!
//! ```text
//! +----------+                             +----------+
//! |  Client  |  -- HandshakeResponse -->   |  Server  |
//! |          |  -- CommandFrame      -->   |          |
//! |          |  <-- HandshakePacket  --    |          |
//! |          |  <-- OkPacket/ErrPacket --  |          |
//! +----------+                             +----------+
//!                 ^                  ^
//!                 |   codec (framing)|
//!                 +------------------+
//! ```
//!
//! Decode functions return `Ok(None)` (or operate on complete packet
//! payloads) so that callers driving non-blocking sockets can suspend on
//! "not enough data yet" and resume without losing position.

pub mod codec;
pub mod command;
pub mod error;
pub mod handshake;
pub mod result;

pub use command::{Command, CommandFrame};
pub use error::ProtocolError;
pub use handshake::{
    capability, HandshakePacket, HandshakeResponse, NATIVE_AUTH_PLUGIN, SCRAMBLE_LEN,
};
pub use result::{ErrPacket, OkPacket, ResultPacket};
