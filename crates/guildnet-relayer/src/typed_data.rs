//! EIP-712 typed-data construction for the two privileged transitions the
//! relayer co-signs. The verifying contract recomputes these digests, so the
//! byte layout here is part of the chain contract.

use guildnet_core::types::Address;
use guildnet_crypto::keccak256;

/// The signing domain: binds every signature to one deployment of the
/// manager contract on one chain.
#[derive(Clone, Debug)]
pub struct TypedDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl TypedDomain {
    /// keccak256(abi.encode(DOMAIN_TYPEHASH, keccak(name), keccak(version),
    /// chainId, verifyingContract)).
    pub fn separator(&self) -> [u8; 32] {
        let typehash = keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let mut enc = Vec::with_capacity(5 * 32);
        enc.extend_from_slice(&typehash);
        enc.extend_from_slice(&keccak256(self.name.as_bytes()));
        enc.extend_from_slice(&keccak256(self.version.as_bytes()));
        enc.extend_from_slice(&u256(self.chain_id as u128));
        enc.extend_from_slice(&address_word(&self.verifying_contract));
        keccak256(&enc)
    }

    /// Final digest: keccak256(0x1901 ‖ domainSeparator ‖ structHash).
    pub fn digest(&self, struct_hash: &[u8; 32]) -> [u8; 32] {
        let mut enc = Vec::with_capacity(2 + 64);
        enc.extend_from_slice(&[0x19, 0x01]);
        enc.extend_from_slice(&self.separator());
        enc.extend_from_slice(struct_hash);
        keccak256(&enc)
    }
}

/// structHash of `AcceptProposal(uint256 proposalId,address worker,address
/// verifier,uint256 workerBond,uint256 deadline)`.
pub fn accept_proposal_hash(
    proposal_id: u64,
    worker: &Address,
    verifier: &Address,
    worker_bond: u128,
    deadline: u64,
) -> [u8; 32] {
    let typehash = keccak256(
        b"AcceptProposal(uint256 proposalId,address worker,address verifier,uint256 workerBond,uint256 deadline)",
    );
    let mut enc = Vec::with_capacity(6 * 32);
    enc.extend_from_slice(&typehash);
    enc.extend_from_slice(&u256(proposal_id as u128));
    enc.extend_from_slice(&address_word(worker));
    enc.extend_from_slice(&address_word(verifier));
    enc.extend_from_slice(&u256(worker_bond));
    enc.extend_from_slice(&u256(deadline as u128));
    keccak256(&enc)
}

/// structHash of `RejectProposal(uint256 proposalId,string reason,uint256
/// deadline)`. Dynamic fields are hashed per EIP-712.
pub fn reject_proposal_hash(proposal_id: u64, reason: &str, deadline: u64) -> [u8; 32] {
    let typehash =
        keccak256(b"RejectProposal(uint256 proposalId,string reason,uint256 deadline)");
    let mut enc = Vec::with_capacity(4 * 32);
    enc.extend_from_slice(&typehash);
    enc.extend_from_slice(&u256(proposal_id as u128));
    enc.extend_from_slice(&keccak256(reason.as_bytes()));
    enc.extend_from_slice(&u256(deadline as u128));
    keccak256(&enc)
}

fn u256(v: u128) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[16..].copy_from_slice(&v.to_be_bytes());
    w
}

fn address_word(a: &Address) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[12..].copy_from_slice(a.as_bytes());
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> TypedDomain {
        TypedDomain {
            name: "GuildManager".into(),
            version: "1".into(),
            chain_id: 31_337,
            verifying_contract: Address::from_bytes([0xAA; 20]),
        }
    }

    #[test]
    fn separator_is_stable_and_domain_sensitive() {
        let a = domain().separator();
        assert_eq!(a, domain().separator());

        let mut other = domain();
        other.chain_id = 1;
        assert_ne!(a, other.separator(), "chain id must change the domain");
    }

    #[test]
    fn digest_binds_struct_and_domain() {
        let d = domain();
        let h1 = accept_proposal_hash(
            1,
            &Address::from_bytes([1u8; 20]),
            &Address::from_bytes([2u8; 20]),
            20,
            9_999,
        );
        let h2 = accept_proposal_hash(
            2,
            &Address::from_bytes([1u8; 20]),
            &Address::from_bytes([2u8; 20]),
            20,
            9_999,
        );
        assert_ne!(d.digest(&h1), d.digest(&h2));
    }

    #[test]
    fn reject_hash_depends_on_reason() {
        assert_ne!(
            reject_proposal_hash(1, "escrow too large", 100),
            reject_proposal_hash(1, "deadline passed", 100)
        );
    }
}
