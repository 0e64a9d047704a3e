use serde_bencode::value::Value;

use crate::config::{MAX_METADATA_SIZE, METADATA_PIECE_LEN};
use crate::error::{ExtensionError, Result};
use crate::peer::connection::Connection;
use crate::peer::message::{
    decode_dict, extended_handshake, int_field, Message, EXTENDED_HANDSHAKE_ID, UT_METADATA,
};

/// What the peer told us in its extension handshake. Fixed for the rest of
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionParameters {
    /// total length of the info dictionary in bytes
    pub metadata_size: usize,
    /// sub-id the peer wants on ut_metadata messages we send it
    pub peer_metadata_id: u8,
}

impl ExtensionParameters {
    /// Reads `metadata_size` and `m.ut_metadata` out of a bencoded extension
    /// handshake.
    pub fn from_handshake(payload: &[u8]) -> std::result::Result<Self, ExtensionError> {
        let dict = decode_dict(payload).map_err(|e| ExtensionError::Malformed(e.to_string()))?;

        let size = int_field(&dict, "metadata_size").ok_or(ExtensionError::MissingMetadataSize)?;
        if size < 0 {
            return Err(ExtensionError::NegativeSize(size));
        }
        if size as u64 > MAX_METADATA_SIZE as u64 {
            return Err(ExtensionError::SizeTooLarge(size));
        }

        let m = match dict.get(b"m".as_slice()) {
            Some(Value::Dict(m)) => m,
            _ => return Err(ExtensionError::MissingHandshakeMap),
        };
        let id = int_field(m, UT_METADATA).ok_or(ExtensionError::MissingUtMetadata)?;
        let peer_metadata_id = match u8::try_from(id) {
            Ok(id) if id != 0 => id,
            _ => return Err(ExtensionError::InvalidUtMetadata(id)),
        };

        Ok(ExtensionParameters {
            metadata_size: size as usize,
            peer_metadata_id,
        })
    }

    pub fn piece_count(&self) -> usize {
        (self.metadata_size + METADATA_PIECE_LEN - 1) / METADATA_PIECE_LEN
    }

    /// Expected length of piece `index`: full pieces except for the last one.
    pub fn piece_len(&self, index: usize) -> usize {
        let count = self.piece_count();
        if index + 1 < count {
            METADATA_PIECE_LEN
        } else if index + 1 == count {
            self.metadata_size - index * METADATA_PIECE_LEN
        } else {
            0
        }
    }
}

/// Announces ut_metadata under `local_metadata_id` and waits for the peer's
/// extension handshake. Base protocol messages arriving first are skipped.
pub fn negotiate(connection: &mut Connection, local_metadata_id: u8) -> Result<ExtensionParameters> {
    let handshake = extended_handshake(local_metadata_id)
        .map_err(|e| ExtensionError::Malformed(e.to_string()))?;
    connection.write_frame(&handshake)?;
    log::debug!("Sent extension handshake to {}", connection.addr());

    loop {
        match Message::deserialize(connection.read_frame()?) {
            Message::Extended { id, payload } if id == EXTENDED_HANDSHAKE_ID => {
                let params = ExtensionParameters::from_handshake(&payload)?;
                log::info!(
                    "Peer {} announced {} bytes of metadata in {} pieces, ut_metadata id {}",
                    connection.addr(),
                    params.metadata_size,
                    params.piece_count(),
                    params.peer_metadata_id
                );
                return Ok(params);
            }
            Message::Extended { id, .. } => {
                return Err(ExtensionError::UnexpectedMessage(id).into());
            }
            other => {
                log::debug!("Skipping {:?} while waiting for extension handshake", other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(metadata_size: usize) -> ExtensionParameters {
        ExtensionParameters {
            metadata_size,
            peer_metadata_id: 3,
        }
    }

    #[test]
    fn test_from_handshake() {
        let reply = b"d1:md11:lt_donthavei7e11:ut_metadatai3ee13:metadata_sizei32868e1:v4:testee";
        let params = ExtensionParameters::from_handshake(reply).unwrap();
        assert_eq!(params.metadata_size, 32868);
        assert_eq!(params.peer_metadata_id, 3);
        assert_eq!(params.piece_count(), 3);
    }

    #[test]
    fn handshake_field_errors() {
        let cases: [(&[u8], ExtensionError); 8] = [
            (b"le", ExtensionError::Malformed(String::new())),
            (b"d1:md11:ut_metadatai1eee", ExtensionError::MissingMetadataSize),
            (
                b"d1:md11:ut_metadatai1ee13:metadata_sizei-1ee",
                ExtensionError::NegativeSize(-1),
            ),
            (
                b"d1:md11:ut_metadatai1ee13:metadata_sizei16777217ee",
                ExtensionError::SizeTooLarge(16777217),
            ),
            (b"d13:metadata_sizei10ee", ExtensionError::MissingHandshakeMap),
            (
                b"d1:mde13:metadata_sizei10ee",
                ExtensionError::MissingUtMetadata,
            ),
            (
                b"d1:md11:ut_metadatai0ee13:metadata_sizei10ee",
                ExtensionError::InvalidUtMetadata(0),
            ),
            (
                b"d1:md11:ut_metadatai256ee13:metadata_sizei10ee",
                ExtensionError::InvalidUtMetadata(256),
            ),
        ];

        for (reply, expected) in cases {
            let err = ExtensionParameters::from_handshake(reply).unwrap_err();
            match expected {
                ExtensionError::Malformed(_) => {
                    assert!(matches!(err, ExtensionError::Malformed(_)), "{:?}", err)
                }
                expected => assert_eq!(err, expected),
            }
        }
    }

    #[test]
    fn largest_metadata_is_accepted() {
        let reply = b"d1:md11:ut_metadatai1ee13:metadata_sizei16777216ee";
        let params = ExtensionParameters::from_handshake(reply).unwrap();
        assert_eq!(params.piece_count(), 1024);
    }

    #[test]
    fn test_piece_count() {
        assert_eq!(params(0).piece_count(), 0);
        assert_eq!(params(1).piece_count(), 1);
        assert_eq!(params(16384).piece_count(), 1);
        assert_eq!(params(16385).piece_count(), 2);
        assert_eq!(params(16384 * 2 + 100).piece_count(), 3);
        assert_eq!(params(MAX_METADATA_SIZE).piece_count(), 1024);
    }

    #[test]
    fn test_piece_len() {
        let p = params(16384 * 2 + 100);
        assert_eq!(p.piece_len(0), 16384);
        assert_eq!(p.piece_len(1), 16384);
        assert_eq!(p.piece_len(2), 100);
        assert_eq!(p.piece_len(3), 0);

        assert_eq!(params(16384 * 2).piece_len(1), 16384);
    }
}
