use std::io;

use thiserror::Error;

/// Everything that can end a metadata session. Each variant is one failure
/// category; the nested enums say what exactly went wrong.
#[derive(Error, Debug)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("extension error: {0}")]
    Extension(#[from] ExtensionError),

    #[error("piece error: {0}")]
    Piece(#[from] PieceError),

    #[error(
        "metadata checksum mismatch: expected {}, got {}",
        hex::encode(.expected),
        hex::encode(.actual)
    )]
    Checksum {
        expected: [u8; 20],
        actual: [u8; 20],
    },
}

/// Failures of the 68-byte base handshake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("remote peer does not speak the BitTorrent protocol")]
    ProtocolMismatch,

    #[error("remote peer does not support the extension protocol")]
    ExtensionUnsupported,

    #[error("remote peer answered with a different info hash")]
    InfoHashMismatch,
}

/// Failures of the extension handshake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    #[error("expected an extension handshake, got extended message {0}")]
    UnexpectedMessage(u8),

    #[error("extension handshake is not a bencoded dictionary: {0}")]
    Malformed(String),

    #[error("extension handshake has no metadata_size")]
    MissingMetadataSize,

    #[error("negative metadata_size {0}")]
    NegativeSize(i64),

    #[error("metadata_size {0} is too large")]
    SizeTooLarge(i64),

    #[error("extension handshake has no m dictionary")]
    MissingHandshakeMap,

    #[error("peer does not announce ut_metadata")]
    MissingUtMetadata,

    #[error("ut_metadata id {0} is outside 1..=255")]
    InvalidUtMetadata(i64),
}

/// Failures while collecting metadata pieces.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PieceError {
    #[error("malformed metadata message: {0}")]
    Malformed(String),

    #[error("piece {index} is out of range, metadata has {count} pieces")]
    IndexOutOfRange { index: i64, count: usize },

    #[error("peer rejected the request for piece {piece}")]
    Rejected { piece: i64 },

    #[error("unexpected metadata msg_type {0}")]
    UnexpectedMessageType(i64),

    #[error("piece {index} has {actual} bytes, expected {expected}")]
    UnexpectedLength {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("peer reported total_size {reported}, announced {announced}")]
    TotalSizeMismatch { reported: i64, announced: usize },

    #[error("metadata is missing {missing} pieces")]
    Incomplete { missing: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
