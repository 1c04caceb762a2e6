use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::error::ProtocolError;

/// Command codes from the client's command phase.
///
/// Codes this server has no special handling for are preserved as `Other`;
/// they are acknowledged generically rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 0x01 - terminate the session
    Quit,
    /// 0x02 - switch default database
    InitDb,
    /// 0x03 - text query
    Query,
    /// 0x0E - liveness check
    Ping,
    /// Any other code
    Other(u8),
}

impl Command {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Command::Quit,
            0x02 => Command::InitDb,
            0x03 => Command::Query,
            0x0E => Command::Ping,
            other => Command::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Command::Quit => 0x01,
            Command::InitDb => 0x02,
            Command::Query => 0x03,
            Command::Ping => 0x0E,
            Command::Other(code) => code,
        }
    }
}

/// One client request unit: command code plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub command: Command,
    pub payload: Vec<u8>,
}

impl CommandFrame {
    pub fn query(sql: &str) -> Self {
        Self {
            command: Command::Query,
            payload: sql.as_bytes().to_vec(),
        }
    }

    pub fn ping() -> Self {
        Self {
            command: Command::Ping,
            payload: Vec::new(),
        }
    }

    pub fn quit() -> Self {
        Self {
            command: Command::Quit,
            payload: Vec::new(),
        }
    }

    /// Decodes a command frame from a packet payload.
    pub fn decode(mut src: BytesMut) -> Result<Self, ProtocolError> {
        if src.is_empty() {
            return Err(ProtocolError::InvalidPacket);
        }
        let code = src.get_u8();
        Ok(Self {
            command: Command::from_code(code),
            payload: src.to_vec(),
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.command.code());
        dst.put_slice(&self.payload);
    }
}
