use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::error::ProtocolError;

/// Packet header size: 3-byte little-endian payload length + sequence id.
pub const PACKET_HEADER_LEN: usize = 4;

/// Largest payload the 3-byte length field can carry. A payload of exactly
/// this size announces a continuation packet, which this codec does not
/// speak; commands and results here are orders of magnitude smaller.
pub const MAX_PAYLOAD_LEN: usize = 0xFF_FFFF - 1;

/// Reads one framed packet from `src`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete packet;
/// the caller is expected to read more bytes and retry. On success the
/// header is consumed and `(sequence id, payload)` is returned.
pub fn read_packet(src: &mut BytesMut) -> Result<Option<(u8, BytesMut)>, ProtocolError> {
    if src.len() < PACKET_HEADER_LEN {
        return Ok(None);
    }

    let len = u32::from_le_bytes([src[0], src[1], src[2], 0]) as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PacketTooLarge(len));
    }

    if src.len() < PACKET_HEADER_LEN + len {
        return Ok(None);
    }

    let seq = src[3];
    src.advance(PACKET_HEADER_LEN);
    let payload = src.split_to(len);
    Ok(Some((seq, payload)))
}

/// Writes `payload` to `dst` framed with a packet header.
pub fn write_packet(dst: &mut BytesMut, seq: u8, payload: &[u8]) {
    debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);
    dst.put_slice(&(payload.len() as u32).to_le_bytes()[..3]);
    dst.put_u8(seq);
    dst.put_slice(payload);
}

/// Ensures that `src` has at least `n` bytes remaining.
pub fn need(src: &BytesMut, n: usize) -> Result<(), ProtocolError> {
    if src.len() < n {
        return Err(ProtocolError::InvalidPacket);
    }
    Ok(())
}

/// Reads a null-terminated string. The terminator is consumed but not
/// returned.
pub fn get_cstring(src: &mut BytesMut) -> Result<String, ProtocolError> {
    let Some(null_pos) = src.iter().position(|&b| b == 0) else {
        return Err(ProtocolError::InvalidPacket);
    };

    let bytes = src.split_to(null_pos);
    src.advance(1);
    String::from_utf8(bytes.to_vec()).map_err(ProtocolError::from)
}

/// Writes a null-terminated string.
pub fn put_cstring(dst: &mut BytesMut, s: &str) {
    dst.put_slice(s.as_bytes());
    dst.put_u8(0);
}

/// Reads a length-encoded integer.
pub fn get_lenenc_int(src: &mut BytesMut) -> Result<u64, ProtocolError> {
    need(src, 1)?;
    match src.get_u8() {
        v @ 0..=250 => Ok(u64::from(v)),
        0xFC => {
            need(src, 2)?;
            Ok(u64::from(src.get_u16_le()))
        }
        0xFD => {
            need(src, 3)?;
            let bytes = src.split_to(3);
            Ok(u64::from(bytes[0]) | (u64::from(bytes[1]) << 8) | (u64::from(bytes[2]) << 16))
        }
        0xFE => {
            need(src, 8)?;
            Ok(src.get_u64_le())
        }
        // 0xFB is the NULL marker, 0xFF the ERR marker; neither starts an
        // integer.
        _ => Err(ProtocolError::InvalidPacket),
    }
}

/// Writes a length-encoded integer.
pub fn put_lenenc_int(dst: &mut BytesMut, v: u64) {
    if v < 251 {
        dst.put_u8(v as u8);
    } else if v < 65_536 {
        dst.put_u8(0xFC);
        dst.put_u16_le(v as u16);
    } else if v < 16_777_216 {
        dst.put_u8(0xFD);
        dst.put_slice(&v.to_le_bytes()[..3]);
    } else {
        dst.put_u8(0xFE);
        dst.put_u64_le(v);
    }
}

/// Reads a length-encoded byte string.
pub fn get_lenenc_bytes(src: &mut BytesMut) -> Result<Vec<u8>, ProtocolError> {
    let len = get_lenenc_int(src)? as usize;
    need(src, len)?;
    Ok(src.split_to(len).to_vec())
}

/// Writes a length-encoded byte string.
pub fn put_lenenc_bytes(dst: &mut BytesMut, bytes: &[u8]) {
    put_lenenc_int(dst, bytes.len() as u64);
    dst.put_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_packet() {
        let mut buf = BytesMut::from(&[5, 0, 0, 1, b'h', b'e', b'l', b'l', b'o', 0xAA][..]);
        let (seq, payload) = read_packet(&mut buf).unwrap().unwrap();
        assert_eq!(seq, 1);
        assert_eq!(&payload[..], b"hello");
        assert_eq!(&buf[..], &[0xAA]);
    }

    #[test]
    fn test_read_packet_incomplete_header() {
        let mut buf = BytesMut::from(&[5, 0, 0][..]);
        assert!(read_packet(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_read_packet_incomplete_payload() {
        let mut buf = BytesMut::from(&[5, 0, 0, 0, b'h', b'i'][..]);
        assert!(read_packet(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_read_packet_too_large() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0][..]);
        assert!(matches!(
            read_packet(&mut buf),
            Err(ProtocolError::PacketTooLarge(_))
        ));
    }

    #[test]
    fn test_write_packet_round_trip() {
        let mut buf = BytesMut::new();
        write_packet(&mut buf, 3, b"abc");
        assert_eq!(&buf[..], &[3, 0, 0, 3, b'a', b'b', b'c']);

        let (seq, payload) = read_packet(&mut buf).unwrap().unwrap();
        assert_eq!(seq, 3);
        assert_eq!(&payload[..], b"abc");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_get_cstring() {
        let mut buf = BytesMut::from(&b"hello\0world"[..]);
        assert_eq!(get_cstring(&mut buf).unwrap(), "hello".to_string());
        assert_eq!(buf, b"world"[..]);
    }

    #[test]
    fn test_get_cstring_unterminated() {
        let mut buf = BytesMut::from(&b"hello"[..]);
        assert!(get_cstring(&mut buf).is_err());
    }

    #[test]
    fn test_lenenc_int_one_byte() {
        let mut buf = BytesMut::new();
        put_lenenc_int(&mut buf, 250);
        assert_eq!(&buf[..], &[250]);
        assert_eq!(get_lenenc_int(&mut buf).unwrap(), 250);
    }

    #[test]
    fn test_lenenc_int_two_bytes() {
        let mut buf = BytesMut::new();
        put_lenenc_int(&mut buf, 251);
        assert_eq!(&buf[..], &[0xFC, 251, 0]);
        assert_eq!(get_lenenc_int(&mut buf).unwrap(), 251);
    }

    #[test]
    fn test_lenenc_int_three_bytes() {
        let mut buf = BytesMut::new();
        put_lenenc_int(&mut buf, 0x01_0000);
        assert_eq!(&buf[..], &[0xFD, 0, 0, 1]);
        assert_eq!(get_lenenc_int(&mut buf).unwrap(), 0x01_0000);
    }

    #[test]
    fn test_lenenc_int_eight_bytes() {
        let mut buf = BytesMut::new();
        put_lenenc_int(&mut buf, u64::MAX);
        assert_eq!(buf[0], 0xFE);
        assert_eq!(get_lenenc_int(&mut buf).unwrap(), u64::MAX);
    }

    #[test]
    fn test_lenenc_int_invalid_prefix() {
        let mut buf = BytesMut::from(&[0xFB][..]);
        assert!(get_lenenc_int(&mut buf).is_err());
    }

    #[test]
    fn test_lenenc_bytes_round_trip() {
        let mut buf = BytesMut::new();
        put_lenenc_bytes(&mut buf, b"scramble");
        assert_eq!(get_lenenc_bytes(&mut buf).unwrap(), b"scramble".to_vec());
    }
}
