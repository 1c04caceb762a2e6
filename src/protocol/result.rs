use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::codec::{get_lenenc_int, need, put_lenenc_int};
use crate::protocol::error::ProtocolError;

const OK_MARKER: u8 = 0x00;
const ERR_MARKER: u8 = 0xFF;

/// OK result packet: the acknowledgement for a command, or an empty query
/// result. Field layout assumes the 4.1 protocol, which the handshake
/// mandates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

impl OkPacket {
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(OK_MARKER);
        put_lenenc_int(dst, self.affected_rows);
        put_lenenc_int(dst, self.last_insert_id);
        dst.put_u16_le(self.status_flags);
        dst.put_u16_le(self.warnings);
        if !self.info.is_empty() {
            dst.put_slice(self.info.as_bytes());
        }
    }

    fn decode_body(src: &mut BytesMut) -> Result<Self, ProtocolError> {
        let affected_rows = get_lenenc_int(src)?;
        let last_insert_id = get_lenenc_int(src)?;
        need(src, 4)?;
        let status_flags = src.get_u16_le();
        let warnings = src.get_u16_le();
        let info = String::from_utf8(src.split_to(src.len()).to_vec())?;
        Ok(Self {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }
}

/// ERR result packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    pub code: u16,
    pub sql_state: String,
    pub message: String,
}

impl ErrPacket {
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(ERR_MARKER);
        dst.put_u16_le(self.code);
        dst.put_u8(b'#');
        debug_assert_eq!(self.sql_state.len(), 5);
        dst.put_slice(self.sql_state.as_bytes());
        dst.put_slice(self.message.as_bytes());
    }

    fn decode_body(src: &mut BytesMut) -> Result<Self, ProtocolError> {
        need(src, 2)?;
        let code = src.get_u16_le();
        let sql_state = if src.first() == Some(&b'#') {
            src.advance(1);
            need(src, 5)?;
            String::from_utf8(src.split_to(5).to_vec())?
        } else {
            "HY000".to_string()
        };
        let message = String::from_utf8(src.split_to(src.len()).to_vec())?;
        Ok(Self {
            code,
            sql_state,
            message,
        })
    }
}

/// A decoded result packet: OK or ERR, discriminated by the marker byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultPacket {
    Ok(OkPacket),
    Err(ErrPacket),
}

impl ResultPacket {
    pub fn decode(mut src: BytesMut) -> Result<Self, ProtocolError> {
        if src.is_empty() {
            return Err(ProtocolError::UnexpectedPacket("result"));
        }
        match src.get_u8() {
            OK_MARKER => Ok(ResultPacket::Ok(OkPacket::decode_body(&mut src)?)),
            ERR_MARKER => Ok(ResultPacket::Err(ErrPacket::decode_body(&mut src)?)),
            _ => Err(ProtocolError::UnexpectedPacket("OK or ERR marker")),
        }
    }
}
