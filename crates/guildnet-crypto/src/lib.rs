pub mod hash;
pub mod signer;

pub use hash::{agent_id_from_address, blake3_hash, keccak256};
pub use signer::{recover_signer, EthKeyPair, RecoverableSignature};
