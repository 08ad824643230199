use sha3::{Digest, Keccak256};

use guildnet_core::types::{Address, AgentId};

/// Compute BLAKE3 hash of arbitrary bytes → 32-byte array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Keccak-256 as used by the settlement chain (event topics, typed data).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut h = Keccak256::new();
    h.update(data);
    h.finalize().into()
}

/// Derive an AgentId from a chain address using BLAKE3.
pub fn agent_id_from_address(address: &Address) -> AgentId {
    AgentId::from_bytes(blake3_hash(address.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_matches_known_vector() {
        // keccak256("") — the canonical empty-input digest.
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn agent_id_is_stable() {
        let addr = Address::from_bytes([7u8; 20]);
        assert_eq!(agent_id_from_address(&addr), agent_id_from_address(&addr));
    }
}
