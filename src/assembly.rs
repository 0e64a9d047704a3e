/*
src/assembly.rs

Holds the metadata pieces received from one peer until every one of them is in,
then glues them together and checks the result against the info hash.
*/

use sha1::{Digest, Sha1};

use crate::bitfield::BitField;
use crate::error::{Error, PieceError};
use crate::peer::extension::ExtensionParameters;
use crate::peer::message::{MetadataMessage, MetadataMsgType};

#[derive(Debug)]
pub struct Assembly {
    params: ExtensionParameters,
    pieces: Vec<Vec<u8>>,
    received: BitField,
}

impl Assembly {
    pub fn new(params: ExtensionParameters) -> Assembly {
        let piece_count = params.piece_count();
        Assembly {
            params,
            pieces: vec![Vec::new(); piece_count],
            received: BitField::with_len(piece_count),
        }
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    pub fn received(&self) -> usize {
        self.received.count_set()
    }

    /// Indices still waiting for data
    pub fn missing(&self) -> Vec<usize> {
        self.received.missing()
    }

    pub fn is_complete(&self) -> bool {
        self.received.is_complete()
    }

    /// Stores the payload of a data message and returns its index. A piece
    /// delivered twice keeps the latest bytes.
    pub fn store(&mut self, msg: MetadataMessage) -> Result<usize, PieceError> {
        if msg.msg_type == MetadataMsgType::Reject as i64 {
            return Err(PieceError::Rejected { piece: msg.piece });
        }
        if msg.msg_type != MetadataMsgType::Data as i64 {
            return Err(PieceError::UnexpectedMessageType(msg.msg_type));
        }

        let index = match usize::try_from(msg.piece) {
            Ok(index) if index < self.piece_count() => index,
            _ => {
                return Err(PieceError::IndexOutOfRange {
                    index: msg.piece,
                    count: self.piece_count(),
                })
            }
        };

        if let Some(reported) = msg.total_size {
            if reported != self.params.metadata_size as i64 {
                return Err(PieceError::TotalSizeMismatch {
                    reported,
                    announced: self.params.metadata_size,
                });
            }
        }

        let expected = self.params.piece_len(index);
        if msg.payload.len() != expected {
            return Err(PieceError::UnexpectedLength {
                index,
                expected,
                actual: msg.payload.len(),
            });
        }

        self.pieces[index] = msg.payload;
        self.received.set(index);
        Ok(index)
    }

    /// Concatenates the pieces in index order and verifies the SHA-1 against
    /// `info_hash`. Mismatched bytes are dropped, never returned.
    pub fn finish(self, info_hash: &[u8; 20]) -> Result<Vec<u8>, Error> {
        if !self.is_complete() {
            return Err(PieceError::Incomplete {
                missing: self.piece_count() - self.received(),
            }
            .into());
        }

        let metadata = self.pieces.concat();
        let actual: [u8; 20] = Sha1::digest(&metadata).into();
        if &actual != info_hash {
            return Err(Error::Checksum {
                expected: *info_hash,
                actual,
            });
        }
        Ok(metadata)
    }
}
