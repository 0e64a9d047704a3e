use rand::Rng;

/// Client prefix in Azureus style, the rest of the id is random.
const PEER_ID_PREFIX: &[u8; 8] = b"-UF0100-";

pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[..8].copy_from_slice(PEER_ID_PREFIX);
    let mut rng = rand::thread_rng();
    rng.fill(&mut peer_id[8..]);
    peer_id
}

/// Parses a 40 character hex string into an info hash.
pub fn parse_info_hash(s: &str) -> Option<[u8; 20]> {
    let mut hash = [0u8; 20];
    hex::decode_to_slice(s.trim(), &mut hash).ok()?;
    Some(hash)
}

/// Accepts either 20 raw ASCII bytes or 40 hex characters.
pub fn parse_peer_id(s: &str) -> Option<[u8; 20]> {
    if s.len() == 20 {
        let mut id = [0u8; 20];
        id.copy_from_slice(s.as_bytes());
        return Some(id);
    }
    parse_info_hash(s)
}
