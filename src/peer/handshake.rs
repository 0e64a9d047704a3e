use crate::error::{ProtocolError, Result};
use crate::peer::connection::Connection;

pub const PSTR: &[u8; 19] = b"BitTorrent protocol";
pub const HANDSHAKE_LEN: usize = 68;
/// BEP 10: bit 20 from the right, i.e. 0x10 in reserved byte 5.
const EXTENSION_BYTE: usize = 5;
const EXTENSION_BIT: u8 = 0x10;

#[derive(Debug, PartialEq, Clone)]
pub struct Handshake {
    /// length byte followed by the protocol identifier, "BitTorrent protocol" for real peers
    pub pstr: [u8; 20],
    /// 8 reserved bytes, used to advertise protocol extensions
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
    /// 20-byte string used as a unique ID for the client.
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Handshake advertising the extension protocol.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Handshake {
        let mut pstr = [0u8; 20];
        pstr[0] = PSTR.len() as u8;
        pstr[1..].copy_from_slice(PSTR);
        let mut reserved = [0u8; 8];
        reserved[EXTENSION_BYTE] |= EXTENSION_BIT;
        Handshake {
            pstr,
            reserved,
            info_hash,
            peer_id,
        }
    }

    pub fn from_bytes(bytes: &[u8; HANDSHAKE_LEN]) -> Handshake {
        let mut pstr = [0; 20];
        pstr.copy_from_slice(&bytes[0..20]);
        let mut reserved = [0; 8];
        reserved.copy_from_slice(&bytes[20..28]);
        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&bytes[28..48]);
        let mut peer_id = [0; 20];
        peer_id.copy_from_slice(&bytes[48..68]);

        Handshake {
            pstr,
            reserved,
            info_hash,
            peer_id,
        }
    }

    pub fn to_bytes(&self) -> [u8; HANDSHAKE_LEN] {
        let mut bytes = [0; HANDSHAKE_LEN];
        bytes[0..20].copy_from_slice(&self.pstr);
        bytes[20..28].copy_from_slice(&self.reserved);
        bytes[28..48].copy_from_slice(&self.info_hash);
        bytes[48..68].copy_from_slice(&self.peer_id);
        bytes
    }

    pub fn supports_extensions(&self) -> bool {
        self.reserved[EXTENSION_BYTE] & EXTENSION_BIT != 0
    }

    /// Validates a reply against the info hash we asked for. The checks run in
    /// a fixed order so each failure maps to exactly one error.
    pub fn check(&self, info_hash: &[u8; 20]) -> std::result::Result<(), ProtocolError> {
        if self.pstr[0] as usize != PSTR.len() || &self.pstr[1..] != PSTR {
            return Err(ProtocolError::ProtocolMismatch);
        }
        if !self.supports_extensions() {
            return Err(ProtocolError::ExtensionUnsupported);
        }
        if &self.info_hash != info_hash {
            return Err(ProtocolError::InfoHashMismatch);
        }
        Ok(())
    }
}

/// Sends our handshake and validates the peer's reply. Returns the reply so
/// the caller can learn the remote peer id.
pub fn exchange(
    connection: &mut Connection,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
) -> Result<Handshake> {
    connection.write_all(&Handshake::new(info_hash, peer_id).to_bytes())?;
    log::debug!("Sent handshake to {}", connection.addr());

    let mut buf = [0u8; HANDSHAKE_LEN];
    connection.read_exact(&mut buf)?;
    let reply = Handshake::from_bytes(&buf);
    if let Err(e) = reply.check(&info_hash) {
        log::warn!("Handshake check failed with {}: {}", connection.addr(), e);
        return Err(e.into());
    }

    log::info!(
        "Handshake check passed, remote peer id {}",
        String::from_utf8_lossy(&reply.peer_id)
    );
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_HASH: [u8; 20] = [7; 20];

    #[test]
    fn test_handshake_layout() {
        let handshake = Handshake::new(INFO_HASH, *b"-UF0100-123456789012");
        let bytes = handshake.to_bytes();
        assert_eq!(bytes[0], 19);
        assert_eq!(&bytes[1..20], b"BitTorrent protocol");
        assert_eq!(&bytes[20..28], &[0, 0, 0, 0, 0, 0x10, 0, 0]);
        assert_eq!(&bytes[28..48], &INFO_HASH);
        assert_eq!(&bytes[48..68], b"-UF0100-123456789012");
        assert_eq!(Handshake::from_bytes(&bytes), handshake);
    }

    #[test]
    fn check_accepts_matching_reply() {
        let reply = Handshake::new(INFO_HASH, [1; 20]);
        assert_eq!(reply.check(&INFO_HASH), Ok(()));
    }

    #[test]
    fn check_reports_each_failure_distinctly() {
        let mut reply = Handshake::new(INFO_HASH, [1; 20]);
        reply.pstr[5] = b'X';
        assert_eq!(reply.check(&INFO_HASH), Err(ProtocolError::ProtocolMismatch));

        let mut reply = Handshake::new(INFO_HASH, [1; 20]);
        reply.reserved = [0; 8];
        assert_eq!(
            reply.check(&INFO_HASH),
            Err(ProtocolError::ExtensionUnsupported)
        );

        let reply = Handshake::new([8; 20], [1; 20]);
        assert_eq!(reply.check(&INFO_HASH), Err(ProtocolError::InfoHashMismatch));
    }

    #[test]
    fn protocol_is_checked_before_extension_bit() {
        let mut reply = Handshake::new([8; 20], [1; 20]);
        reply.pstr[0] = 18;
        reply.reserved = [0; 8];
        assert_eq!(reply.check(&INFO_HASH), Err(ProtocolError::ProtocolMismatch));
    }
}
