use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// a file of a multi file torrent
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct File {
    /// path components, relative to the torrent name
    pub path: Vec<String>,
    /// The length of the file in bytes (integer)
    pub length: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5sum: Option<String>,
}

/// The info dictionary fetched from a peer. If length is None, it's a multi
/// file torrent, else it's a single file torrent
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Info {
    pub name: String,
    pub pieces: ByteBuf,
    #[serde(rename = "piece length")]
    pub piece_length: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<File>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<u8>,
}

impl Info {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let info: Info =
            serde_bencode::from_bytes(bytes).context("failed to deserialize info dictionary")?;
        if info.pieces.len() % 20 != 0 {
            return Err(anyhow!(
                "pieces field has {} bytes, not a multiple of 20",
                info.pieces.len()
            ));
        }
        if info.length.is_none() && info.files.is_none() {
            return Err(anyhow!("info dictionary has neither length nor files"));
        }
        Ok(info)
    }

    pub fn piece_hashes(&self) -> Vec<[u8; 20]> {
        self.pieces
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect()
    }

    pub fn is_single_file(&self) -> bool {
        self.length.is_some()
    }

    pub fn file_count(&self) -> usize {
        self.files.as_ref().map_or(1, |files| files.len())
    }

    // if length is None, it's a multi file torrent, else it's a single file torrent
    pub fn total_length(&self) -> i64 {
        match (&self.length, &self.files) {
            (Some(length), _) => *length,
            (None, Some(files)) => files.iter().map(|f| f.length).sum(),
            (None, None) => 0,
        }
    }
}
