use std::time::Duration;

/// Size of one metadata piece.
pub const METADATA_PIECE_LEN: usize = 16384;
/// Largest metadata a peer may announce: 1024 pieces.
pub const MAX_METADATA_SIZE: usize = METADATA_PIECE_LEN * 1024;
/// Sub-id we ask peers to use for ut_metadata messages they send us.
pub const LOCAL_METADATA_ID: u8 = 1;

/// Timeouts and limits of a single metadata session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// how long to wait for the TCP connection to be established
    pub dial_timeout: Duration,
    /// deadline for each of the two handshakes
    pub handshake_timeout: Duration,
    /// deadline covering every piece request and reply
    pub metadata_timeout: Duration,
    /// frames declaring a longer payload are refused before allocating
    pub max_frame_len: usize,
    /// sub-id announced for ut_metadata in our extension handshake, must be
    /// in 1..=255 since 0 disables the extension
    pub local_metadata_id: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dial_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(5),
            metadata_timeout: Duration::from_secs(30),
            max_frame_len: 1 << 20,
            local_metadata_id: LOCAL_METADATA_ID,
        }
    }
}
