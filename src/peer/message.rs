//! Frame payloads of the extension protocol (BEP 10) and the metadata
//! exchange running on top of it (BEP 9).
//!
//! Every payload here goes inside a length-prefixed frame, the prefix is
//! added by [`crate::peer::connection::Connection`].

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_bencode::value::Value;

use crate::error::PieceError;

/// Message id of every extended message.
pub const EXTENDED_ID: u8 = 20;
/// Extended sub-id of the extension handshake.
pub const EXTENDED_HANDSHAKE_ID: u8 = 0;
pub const UT_METADATA: &str = "ut_metadata";

/// A frame received after the base handshake, classified by its first bytes.
#[derive(Debug, PartialEq, Clone)]
pub enum Message {
    KeepAlive,
    /// any base protocol message, we only keep the id
    Core(u8),
    /// extended message, sub-id and the bytes after it
    Extended { id: u8, payload: Vec<u8> },
}

impl Message {
    pub fn deserialize(mut frame: Vec<u8>) -> Message {
        match frame.first().copied() {
            None => Message::KeepAlive,
            Some(EXTENDED_ID) if frame.len() >= 2 => {
                let id = frame[1];
                frame.drain(..2);
                Message::Extended { id, payload: frame }
            }
            Some(id) => Message::Core(id),
        }
    }
}

/// `<20><sub id><payload>`
pub fn extended(id: u8, payload: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(payload.len() + 2);
    msg.push(EXTENDED_ID);
    msg.push(id);
    msg.extend_from_slice(payload);
    msg
}

#[derive(Debug, Serialize)]
struct HandshakeDict {
    m: BTreeMap<&'static str, i64>,
}

/// Extension handshake announcing that we want ut_metadata messages labelled
/// with `local_metadata_id`.
pub fn extended_handshake(local_metadata_id: u8) -> Result<Vec<u8>, serde_bencode::Error> {
    let dict = HandshakeDict {
        m: BTreeMap::from([(UT_METADATA, local_metadata_id as i64)]),
    };
    Ok(extended(
        EXTENDED_HANDSHAKE_ID,
        &serde_bencode::to_bytes(&dict)?,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMsgType {
    Request = 0,
    Data = 1,
    Reject = 2,
}

#[derive(Debug, Serialize)]
struct MetadataDict {
    msg_type: i64,
    piece: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_size: Option<i64>,
}

/// A ut_metadata message: a bencoded dictionary, followed by the piece bytes
/// for data messages.
#[derive(Debug, PartialEq, Clone)]
pub struct MetadataMessage {
    pub msg_type: i64,
    pub piece: i64,
    pub total_size: Option<i64>,
    pub payload: Vec<u8>,
}

impl MetadataMessage {
    pub fn request(piece: usize) -> MetadataMessage {
        MetadataMessage {
            msg_type: MetadataMsgType::Request as i64,
            piece: piece as i64,
            total_size: None,
            payload: Vec::new(),
        }
    }

    pub fn data(piece: usize, total_size: usize, payload: Vec<u8>) -> MetadataMessage {
        MetadataMessage {
            msg_type: MetadataMsgType::Data as i64,
            piece: piece as i64,
            total_size: Some(total_size as i64),
            payload,
        }
    }

    pub fn reject(piece: usize) -> MetadataMessage {
        MetadataMessage {
            msg_type: MetadataMsgType::Reject as i64,
            piece: piece as i64,
            total_size: None,
            payload: Vec::new(),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, serde_bencode::Error> {
        let dict = MetadataDict {
            msg_type: self.msg_type,
            piece: self.piece,
            total_size: self.total_size,
        };
        let mut bytes = serde_bencode::to_bytes(&dict)?;
        bytes.extend_from_slice(&self.payload);
        Ok(bytes)
    }

    /// Splits a ut_metadata payload into its dictionary and trailing piece
    /// bytes. The dictionary end comes from walking the bencode structure, so
    /// piece bytes that happen to look like bencode cannot move it.
    pub fn deserialize(bytes: &[u8]) -> Result<MetadataMessage, PieceError> {
        let dict_len = dict_len(bytes)
            .ok_or_else(|| PieceError::Malformed("no complete bencoded dictionary".into()))?;
        let dict = decode_dict(&bytes[..dict_len])
            .map_err(|e| PieceError::Malformed(e.to_string()))?;

        let msg_type = int_field(&dict, "msg_type")
            .ok_or_else(|| PieceError::Malformed("missing msg_type".into()))?;
        let piece = int_field(&dict, "piece")
            .ok_or_else(|| PieceError::Malformed("missing piece".into()))?;

        Ok(MetadataMessage {
            msg_type,
            piece,
            total_size: int_field(&dict, "total_size"),
            payload: bytes[dict_len..].to_vec(),
        })
    }
}

/// Decodes bytes that must hold a single bencoded dictionary.
pub fn decode_dict(bytes: &[u8]) -> Result<HashMap<Vec<u8>, Value>, serde_bencode::Error> {
    match serde_bencode::from_bytes::<Value>(bytes)? {
        Value::Dict(dict) => Ok(dict),
        _ => Err(serde_bencode::Error::Custom("expected a dictionary".into())),
    }
}

pub fn int_field(dict: &HashMap<Vec<u8>, Value>, key: &str) -> Option<i64> {
    match dict.get(key.as_bytes()) {
        Some(Value::Int(i)) => Some(*i),
        _ => None,
    }
}

/// Number of bytes taken by the bencoded dictionary at the start of `buf`,
/// or `None` if `buf` does not start with a complete one.
pub fn dict_len(buf: &[u8]) -> Option<usize> {
    if buf.first() != Some(&b'd') {
        return None;
    }
    let mut pos = 0;
    let mut depth = 0usize;
    loop {
        match *buf.get(pos)? {
            b'd' | b'l' => {
                depth += 1;
                pos += 1;
            }
            b'e' => {
                depth = depth.checked_sub(1)?;
                pos += 1;
            }
            b'i' => {
                let end = buf[pos..].iter().position(|&b| b == b'e')?;
                pos += end + 1;
            }
            b'0'..=b'9' => {
                let colon = buf[pos..].iter().position(|&b| b == b':')?;
                let len: usize = std::str::from_utf8(&buf[pos..pos + colon])
                    .ok()?
                    .parse()
                    .ok()?;
                pos = pos.checked_add(colon + 1)?.checked_add(len)?;
                if pos > buf.len() {
                    return None;
                }
            }
            _ => return None,
        }
        if depth == 0 {
            return Some(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_handshake_bytes() {
        let msg = extended_handshake(1).unwrap();
        assert_eq!(msg, b"\x14\x00d1:md11:ut_metadatai1eee".to_vec());

        let msg = extended_handshake(3).unwrap();
        assert_eq!(msg, b"\x14\x00d1:md11:ut_metadatai3eee".to_vec());
    }

    #[test]
    fn test_request_bytes() {
        let body = MetadataMessage::request(5).serialize().unwrap();
        assert_eq!(body, b"d8:msg_typei0e5:piecei5ee".to_vec());
        assert_eq!(extended(2, &body)[..2], [20, 2]);
    }

    #[test]
    fn test_message_classification() {
        assert_eq!(Message::deserialize(vec![]), Message::KeepAlive);
        assert_eq!(Message::deserialize(vec![5, 0xff]), Message::Core(5));
        assert_eq!(Message::deserialize(vec![20]), Message::Core(20));
        assert_eq!(
            Message::deserialize(vec![20, 1, b'd', b'e']),
            Message::Extended {
                id: 1,
                payload: b"de".to_vec()
            }
        );
    }

    #[test]
    fn data_message_splits_dict_and_payload() {
        let mut bytes = b"d8:msg_typei1e5:piecei2e10:total_sizei32868ee".to_vec();
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let msg = MetadataMessage::deserialize(&bytes).unwrap();
        assert_eq!(msg, MetadataMessage::data(2, 32868, vec![0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn payload_that_looks_like_bencode_is_kept() {
        let payload = b"eed3:fooe".to_vec();
        let bytes = MetadataMessage::data(0, 9, payload.clone()).serialize().unwrap();
        let msg = MetadataMessage::deserialize(&bytes).unwrap();
        assert_eq!(msg.payload, payload);
    }

    #[test]
    fn strings_containing_ee_do_not_end_the_dict() {
        let mut bytes = b"d1:a2:ee8:msg_typei1e5:piecei0ee".to_vec();
        bytes.extend_from_slice(b"DATA");
        let msg = MetadataMessage::deserialize(&bytes).unwrap();
        assert_eq!(msg.piece, 0);
        assert_eq!(msg.payload, b"DATA".to_vec());
    }

    #[test]
    fn malformed_metadata_messages() {
        assert!(matches!(
            MetadataMessage::deserialize(b"d8:msg_typei1e5:piecei0e"),
            Err(PieceError::Malformed(_))
        ));
        assert!(matches!(
            MetadataMessage::deserialize(b"i1e"),
            Err(PieceError::Malformed(_))
        ));
        assert!(matches!(
            MetadataMessage::deserialize(b"d5:piecei0ee"),
            Err(PieceError::Malformed(_))
        ));
        assert!(matches!(
            MetadataMessage::deserialize(b"d8:msg_type1:15:piecei0ee"),
            Err(PieceError::Malformed(_))
        ));
    }

    #[test]
    fn dict_len_edge_cases() {
        assert_eq!(dict_len(b"de"), Some(2));
        assert_eq!(dict_len(b"dexyz"), Some(2));
        assert_eq!(dict_len(b"d1:ald1:bi-3eeee"), Some(16));
        assert_eq!(dict_len(b"d3:abe"), None);
        assert_eq!(dict_len(b"d99999999999999999999999:a"), None);
        assert_eq!(dict_len(b""), None);
    }
}
