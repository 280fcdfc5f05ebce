//! OP_MSG framing
//!
//! Layout (all integers little-endian):
//! - Header: `messageLength`, `requestID`, `responseTo`, `opCode` (4 x i32)
//! - `flagBits` (u32)
//! - Sections: kind 0 carries the command/reply body, kind 1 carries a
//!   size-prefixed document sequence
//! - Optional CRC-32C checksum when flag bit 0 is set

use bson::Document;

use crate::error::{ProtocolError, Result};

/// OP_MSG opcode
pub const OP_MSG: i32 = 2013;

/// Size of the standard message header.
pub const HEADER_LEN: usize = 16;

/// Largest message a server accepts by default.
pub const MAX_MESSAGE_SIZE: usize = 48_000_000;

const CHECKSUM_PRESENT: u32 = 1;
const SECTION_BODY: u8 = 0;
const SECTION_SEQUENCE: u8 = 1;

/// One OP_MSG with a single body section.
#[derive(Debug, Clone, PartialEq)]
pub struct OpMsg {
    pub request_id: i32,
    pub response_to: i32,
    pub flags: u32,
    pub body: Document,
}

impl OpMsg {
    /// A request carrying `body`.
    pub fn request(request_id: i32, body: Document) -> Self {
        Self {
            request_id,
            response_to: 0,
            flags: 0,
            body,
        }
    }

    /// Serialize to a complete wire frame. Checksums are never written.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        self.body
            .to_writer(&mut body)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;

        let length = HEADER_LEN + 4 + 1 + body.len();
        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::Encode(format!(
                "message of {length} bytes exceeds {MAX_MESSAGE_SIZE}"
            ))
            .into());
        }

        let mut frame = Vec::with_capacity(length);
        frame.extend_from_slice(&(length as i32).to_le_bytes());
        frame.extend_from_slice(&self.request_id.to_le_bytes());
        frame.extend_from_slice(&self.response_to.to_le_bytes());
        frame.extend_from_slice(&OP_MSG.to_le_bytes());
        frame.extend_from_slice(&(self.flags & !CHECKSUM_PRESENT).to_le_bytes());
        frame.push(SECTION_BODY);
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Parse a complete frame as produced by [`frame_length`].
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let length = match frame_length(frame)? {
            Some(length) if length == frame.len() => length,
            _ => {
                return Err(malformed(format!(
                    "frame of {} bytes does not match its length prefix",
                    frame.len()
                )));
            }
        };

        let request_id = read_i32(frame, 4)?;
        let response_to = read_i32(frame, 8)?;
        let op_code = read_i32(frame, 12)?;
        if op_code != OP_MSG {
            return Err(malformed(format!("unsupported opcode {op_code}")));
        }

        let flags = read_i32(frame, HEADER_LEN)? as u32;
        let mut end = length;
        if flags & CHECKSUM_PRESENT != 0 {
            end = end
                .checked_sub(4)
                .ok_or_else(|| malformed("checksum flag set on a truncated frame".to_string()))?;
        }

        let mut offset = HEADER_LEN + 4;
        let mut body = None;
        while offset < end {
            let kind = frame[offset];
            offset += 1;
            let size = read_i32(frame, offset)?;
            let size = usize::try_from(size)
                .ok()
                .filter(|size| *size >= 5 && offset + size <= end)
                .ok_or_else(|| malformed(format!("section size {size} out of bounds")))?;

            match kind {
                SECTION_BODY => {
                    if body.is_some() {
                        return Err(malformed("more than one body section".to_string()));
                    }
                    let mut bytes = &frame[offset..offset + size];
                    let document = Document::from_reader(&mut bytes)
                        .map_err(|e| ProtocolError::Decode(e.to_string()))?;
                    body = Some(document);
                }
                SECTION_SEQUENCE => {}
                other => return Err(malformed(format!("unknown section kind {other}"))),
            }
            offset += size;
        }

        let body = body.ok_or_else(|| malformed("message has no body section".to_string()))?;

        Ok(Self {
            request_id,
            response_to,
            flags,
            body,
        })
    }
}

/// Length of the frame starting at `buffer`, once enough bytes have arrived
/// to read it. Rejects lengths below the smallest legal OP_MSG or above
/// [`MAX_MESSAGE_SIZE`].
pub fn frame_length(buffer: &[u8]) -> Result<Option<usize>> {
    if buffer.len() < 4 {
        return Ok(None);
    }

    let length = read_i32(buffer, 0)?;
    match usize::try_from(length) {
        Ok(length) if (HEADER_LEN + 4 + 1 + 5..=MAX_MESSAGE_SIZE).contains(&length) => {
            Ok(Some(length))
        }
        _ => Err(malformed(format!("invalid message length {length}"))),
    }
}

fn read_i32(buffer: &[u8], offset: usize) -> Result<i32> {
    buffer
        .get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(i32::from_le_bytes)
        .ok_or_else(|| malformed(format!("truncated at offset {offset}")))
}

fn malformed(message: String) -> crate::error::DriverError {
    ProtocolError::MalformedMessage(message).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use bson::doc;

    #[test]
    fn test_encode_decode() {
        let message = OpMsg::request(7, doc! { "getMore": 42i64, "collection": "orders", "$db": "shop" });
        let frame = message.encode().unwrap();

        assert_eq!(frame_length(&frame).unwrap(), Some(frame.len()));
        assert_eq!(&frame[12..16], &OP_MSG.to_le_bytes());

        let decoded = OpMsg::decode(&frame).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_frame_length_needs_prefix() {
        assert_eq!(frame_length(&[1, 0]).unwrap(), None);
    }

    #[test]
    fn test_frame_length_rejects_tiny() {
        let err = frame_length(&8i32.to_le_bytes()).unwrap_err();
        assert!(matches!(err, DriverError::Protocol(ProtocolError::MalformedMessage(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_opcode() {
        let mut frame = OpMsg::request(1, doc! { "ping": 1 }).encode().unwrap();
        frame[12..16].copy_from_slice(&2004i32.to_le_bytes());
        assert!(OpMsg::decode(&frame).is_err());
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let frame = OpMsg::request(1, doc! { "ping": 1 }).encode().unwrap();
        assert!(OpMsg::decode(&frame[..frame.len() - 1]).is_err());
    }

    #[test]
    fn test_decode_skips_checksum() {
        let mut frame = OpMsg::request(3, doc! { "ok": 1.0 }).encode().unwrap();
        frame.extend_from_slice(&[0, 0, 0, 0]);
        let length = frame.len() as i32;
        frame[0..4].copy_from_slice(&length.to_le_bytes());
        frame[16..20].copy_from_slice(&CHECKSUM_PRESENT.to_le_bytes());

        let decoded = OpMsg::decode(&frame).unwrap();
        assert_eq!(decoded.body, doc! { "ok": 1.0 });
        assert_eq!(decoded.flags, CHECKSUM_PRESENT);
    }
}
