use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

use guildnet_core::error::GuildError;
use guildnet_core::types::Address;

use crate::hash::keccak256;

/// A 65-byte recoverable secp256k1 signature (r ‖ s ‖ v), v ∈ {27, 28}.
#[derive(Clone, PartialEq, Eq)]
pub struct RecoverableSignature(pub [u8; 65]);

impl RecoverableSignature {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }
}

impl std::fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecoverableSignature({}…)", &hex::encode(&self.0[..6]))
    }
}

/// A secp256k1 keypair with derived chain address.
///
/// The secret key material lives inside `SigningKey`; the raw bytes passed in
/// at construction are wiped via `Zeroizing` before this function returns.
pub struct EthKeyPair {
    signing_key: SigningKey,
    pub address: Address,
}

impl EthKeyPair {
    /// Generate a fresh keypair (tests and local development).
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let address = address_from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// Load from a 32-byte hex-encoded secret key (with or without 0x).
    pub fn from_hex(hex_key: &str) -> Result<Self, GuildError> {
        let stripped = hex_key.strip_prefix("0x").unwrap_or(hex_key);
        let bytes = Zeroizing::new(
            hex::decode(stripped).map_err(|_| GuildError::InvalidSignature)?,
        );
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|_| GuildError::InvalidSignature)?;
        let address = address_from_verifying_key(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Sign a 32-byte digest, returning the 65-byte r‖s‖v encoding the chain
    /// expects.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<RecoverableSignature, GuildError> {
        let (sig, recid): (Signature, RecoveryId) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|_| GuildError::InvalidSignature)?;
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = 27 + recid.to_byte();
        Ok(RecoverableSignature(out))
    }
}

impl std::fmt::Debug for EthKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EthKeyPair {{ address: {} }}", self.address)
    }
}

/// Recover the signing address from a digest and a 65-byte signature.
pub fn recover_signer(
    digest: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<Address, GuildError> {
    let sig = Signature::from_slice(&signature.0[..64])
        .map_err(|_| GuildError::InvalidSignature)?;
    let v = signature.0[64];
    let recid = RecoveryId::from_byte(v.wrapping_sub(27)).ok_or(GuildError::InvalidSignature)?;
    let key = VerifyingKey::recover_from_prehash(digest, &sig, recid)
        .map_err(|_| GuildError::InvalidSignature)?;
    Ok(address_from_verifying_key(&key))
}

/// Standard EVM address derivation: keccak256(uncompressed pubkey)[12..].
fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&digest[12..]);
    Address::from_bytes(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_recover_round_trip() {
        let kp = EthKeyPair::generate();
        let digest = keccak256(b"guildnet test digest");
        let sig = kp.sign_digest(&digest).unwrap();
        let recovered = recover_signer(&digest, &sig).unwrap();
        assert_eq!(recovered, kp.address);
    }

    #[test]
    fn known_key_derives_known_address() {
        // Well-known test vector: sk = 1 → the generator-point address.
        let kp = EthKeyPair::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(
            kp.address.to_hex(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn malformed_key_rejected() {
        assert!(EthKeyPair::from_hex("not-hex").is_err());
        assert!(EthKeyPair::from_hex("00").is_err());
    }
}
