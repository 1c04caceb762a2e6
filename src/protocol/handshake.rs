use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::codec::{
    get_cstring, get_lenenc_bytes, need, put_cstring, put_lenenc_bytes,
};
use crate::protocol::error::ProtocolError;

/// Capability bits this server speaks or inspects.
pub mod capability {
    /// New 4.1 protocol: longer handshake response, OK/ERR status fields.
    pub const PROTOCOL_41: u32 = 0x0000_0200;
    /// Handshake response carries a database name.
    pub const CONNECT_WITH_DB: u32 = 0x0000_0008;
    /// Auth response is length-prefixed rather than null-terminated.
    pub const SECURE_CONNECTION: u32 = 0x0000_8000;
    /// Auth plugin names are exchanged.
    pub const PLUGIN_AUTH: u32 = 0x0008_0000;
    /// Auth response is a length-encoded byte string.
    pub const PLUGIN_AUTH_LENENC_DATA: u32 = 0x0020_0000;
}

/// Scramble length in the v10 handshake: 8 bytes in part 1, 12 in part 2.
pub const SCRAMBLE_LEN: usize = 20;

/// Auth plugin advertised when `PLUGIN_AUTH` is negotiated.
pub const NATIVE_AUTH_PLUGIN: &str = "mysql_native_password";

const RESERVED_LEN: usize = 10;
const RESPONSE_RESERVED_LEN: usize = 23;

/// Initial handshake packet (protocol version 10), server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePacket {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub scramble: [u8; SCRAMBLE_LEN],
    pub capabilities: u32,
    pub charset: u8,
    pub status_flags: u16,
}

impl HandshakePacket {
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.protocol_version);
        put_cstring(dst, &self.server_version);
        dst.put_u32_le(self.connection_id);
        dst.put_slice(&self.scramble[..8]);
        dst.put_u8(0); // filler
        dst.put_u16_le((self.capabilities & 0xFFFF) as u16);
        dst.put_u8(self.charset);
        dst.put_u16_le(self.status_flags);
        dst.put_u16_le((self.capabilities >> 16) as u16);
        if self.capabilities & capability::PLUGIN_AUTH != 0 {
            dst.put_u8((SCRAMBLE_LEN + 1) as u8);
        } else {
            dst.put_u8(0);
        }
        dst.put_bytes(0, RESERVED_LEN);
        // Scramble part 2 plus its terminator is always present; clients
        // predating SECURE_CONNECTION ignore the extra bytes.
        dst.put_slice(&self.scramble[8..]);
        dst.put_u8(0);
        if self.capabilities & capability::PLUGIN_AUTH != 0 {
            put_cstring(dst, NATIVE_AUTH_PLUGIN);
        }
    }

    /// Decodes a handshake packet payload (the client side of the exchange).
    pub fn decode(src: &mut BytesMut) -> Result<Self, ProtocolError> {
        need(src, 1)?;
        let protocol_version = src.get_u8();
        let server_version = get_cstring(src)?;

        need(src, 4 + 8 + 1 + 2 + 1 + 2 + 2 + 1 + RESERVED_LEN)?;
        let connection_id = src.get_u32_le();

        let mut scramble = [0u8; SCRAMBLE_LEN];
        scramble[..8].copy_from_slice(&src.split_to(8));
        src.advance(1); // filler

        let cap_low = src.get_u16_le();
        let charset = src.get_u8();
        let status_flags = src.get_u16_le();
        let cap_high = src.get_u16_le();
        let capabilities = u32::from(cap_low) | (u32::from(cap_high) << 16);

        src.advance(1); // auth data length
        src.advance(RESERVED_LEN);

        need(src, SCRAMBLE_LEN - 8 + 1)?;
        scramble[8..].copy_from_slice(&src.split_to(SCRAMBLE_LEN - 8));
        src.advance(1); // terminator

        if capabilities & capability::PLUGIN_AUTH != 0 && !src.is_empty() {
            let _plugin = get_cstring(src)?;
        }

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            scramble,
            capabilities,
            charset,
            status_flags,
        })
    }
}

/// Handshake response (4.1 format), client to server.
///
/// Responses that do not announce `PROTOCOL_41` use the pre-4.1 layout,
/// which this codec rejects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub capabilities: u32,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
}

impl HandshakeResponse {
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.capabilities);
        dst.put_u32_le(self.max_packet_size);
        dst.put_u8(self.charset);
        dst.put_bytes(0, RESPONSE_RESERVED_LEN);
        put_cstring(dst, &self.username);
        if self.capabilities & capability::PLUGIN_AUTH_LENENC_DATA != 0 {
            put_lenenc_bytes(dst, &self.auth_response);
        } else if self.capabilities & capability::SECURE_CONNECTION != 0 {
            dst.put_u8(self.auth_response.len() as u8);
            dst.put_slice(&self.auth_response);
        } else {
            dst.put_slice(&self.auth_response);
            dst.put_u8(0);
        }
        if let Some(database) = &self.database {
            put_cstring(dst, database);
        }
        if self.capabilities & capability::PLUGIN_AUTH != 0 {
            put_cstring(dst, NATIVE_AUTH_PLUGIN);
        }
    }

    /// Decodes a handshake response payload (the server side of the
    /// exchange).
    pub fn decode(src: &mut BytesMut) -> Result<Self, ProtocolError> {
        need(src, 4)?;
        let capabilities = src.get_u32_le();
        if capabilities & capability::PROTOCOL_41 == 0 {
            return Err(ProtocolError::UnsupportedClientProtocol);
        }

        need(src, 4 + 1 + RESPONSE_RESERVED_LEN)?;
        let max_packet_size = src.get_u32_le();
        let charset = src.get_u8();
        src.advance(RESPONSE_RESERVED_LEN);

        let username = get_cstring(src)?;

        let auth_response = if capabilities & capability::PLUGIN_AUTH_LENENC_DATA != 0 {
            get_lenenc_bytes(src)?
        } else if capabilities & capability::SECURE_CONNECTION != 0 {
            need(src, 1)?;
            let len = src.get_u8() as usize;
            need(src, len)?;
            src.split_to(len).to_vec()
        } else {
            get_cstring(src)?.into_bytes()
        };

        let database = if capabilities & capability::CONNECT_WITH_DB != 0 && !src.is_empty() {
            Some(get_cstring(src)?)
        } else {
            None
        };

        if capabilities & capability::PLUGIN_AUTH != 0 && !src.is_empty() {
            let _plugin = get_cstring(src)?;
        }

        Ok(Self {
            capabilities,
            max_packet_size,
            charset,
            username,
            auth_response,
            database,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scramble() -> [u8; SCRAMBLE_LEN] {
        *b"ABCDEFGHIJKLMNOPQRST"
    }

    fn sample_handshake() -> HandshakePacket {
        HandshakePacket {
            protocol_version: 10,
            server_version: "demo".to_string(),
            connection_id: 7,
            scramble: sample_scramble(),
            capabilities: capability::PROTOCOL_41
                | capability::SECURE_CONNECTION
                | capability::PLUGIN_AUTH,
            charset: 8,
            status_flags: 0,
        }
    }

    #[test]
    fn test_handshake_layout() {
        let mut buf = BytesMut::new();
        sample_handshake().encode(&mut buf);

        assert_eq!(buf[0], 10);
        assert_eq!(&buf[1..6], b"demo\0");
        assert_eq!(&buf[6..10], &7u32.to_le_bytes());
        assert_eq!(&buf[10..18], b"ABCDEFGH");
        assert_eq!(buf[18], 0); // filler
        // Scramble part 2 sits after capabilities/charset/status/reserved.
        let part2_at = 19 + 2 + 1 + 2 + 2 + 1 + RESERVED_LEN;
        assert_eq!(&buf[part2_at..part2_at + 12], b"IJKLMNOPQRST");
        assert_eq!(buf[part2_at + 12], 0);
    }

    #[test]
    fn test_handshake_round_trip() {
        let packet = sample_handshake();
        let mut buf = BytesMut::new();
        packet.encode(&mut buf);

        let decoded = HandshakePacket::decode(&mut buf).unwrap();
        assert_eq!(decoded, packet);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_handshake_decode_truncated() {
        let mut buf = BytesMut::new();
        sample_handshake().encode(&mut buf);
        buf.truncate(20);
        assert!(HandshakePacket::decode(&mut buf).is_err());
    }

    fn sample_response() -> HandshakeResponse {
        HandshakeResponse {
            capabilities: capability::PROTOCOL_41 | capability::SECURE_CONNECTION,
            max_packet_size: 16_777_215,
            charset: 8,
            username: "root".to_string(),
            auth_response: vec![],
            database: None,
        }
    }

    #[test]
    fn test_response_round_trip() {
        let response = sample_response();
        let mut buf = BytesMut::new();
        response.encode(&mut buf);

        let decoded = HandshakeResponse::decode(&mut buf).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_response_round_trip_with_database_and_lenenc_auth() {
        let response = HandshakeResponse {
            capabilities: capability::PROTOCOL_41
                | capability::SECURE_CONNECTION
                | capability::PLUGIN_AUTH_LENENC_DATA
                | capability::CONNECT_WITH_DB
                | capability::PLUGIN_AUTH,
            max_packet_size: 1024,
            charset: 33,
            username: "alice".to_string(),
            auth_response: vec![1, 2, 3, 4],
            database: Some("warehouse".to_string()),
        };
        let mut buf = BytesMut::new();
        response.encode(&mut buf);

        let decoded = HandshakeResponse::decode(&mut buf).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_response_rejects_pre_41_clients() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(capability::SECURE_CONNECTION);
        buf.put_u32_le(16_777_215);

        assert!(matches!(
            HandshakeResponse::decode(&mut buf),
            Err(ProtocolError::UnsupportedClientProtocol)
        ));
    }

    #[test]
    fn test_response_decode_truncated_username() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(capability::PROTOCOL_41);
        buf.put_u32_le(1024);
        buf.put_u8(8);
        buf.put_bytes(0, RESPONSE_RESERVED_LEN);
        buf.put_slice(b"root"); // no terminator

        assert!(HandshakeResponse::decode(&mut buf).is_err());
    }
}
