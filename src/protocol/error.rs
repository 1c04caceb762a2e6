use thiserror::Error;

/// Wire protocol errors.
///
/// Any of these is fatal to the connection that produced it, never to the
/// server process.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed packet")]
    InvalidPacket,
    #[error("packet payload of {0} bytes exceeds the maximum packet size")]
    PacketTooLarge(usize),
    #[error("client does not speak the 4.1 protocol")]
    UnsupportedClientProtocol,
    #[error("invalid UTF-8 in protocol string")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("unexpected packet: expected {0}")]
    UnexpectedPacket(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
