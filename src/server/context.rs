use crate::protocol::capability;

/// Process-wide protocol identity, shared read-only by every connection.
///
/// Created once at startup and never mutated; connections copy what they
/// need into their own handshake context.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub server_version: String,
    pub protocol_version: u8,
    pub capabilities: u32,
    pub charset: u8,
    pub status_flags: u16,
    pub max_packet_size: u32,
}

impl ServerContext {
    pub fn new(server_version: impl Into<String>) -> Self {
        Self {
            server_version: server_version.into(),
            protocol_version: 10,
            capabilities: capability::PROTOCOL_41
                | capability::SECURE_CONNECTION
                | capability::PLUGIN_AUTH,
            charset: 8,
            status_flags: 0,
            max_packet_size: 16_777_215,
        }
    }
}

impl Default for ServerContext {
    fn default() -> Self {
        Self::new(concat!("mizzle ", env!("CARGO_PKG_VERSION")))
    }
}
