//! The signing relayer: builds typed-data messages for privileged lifecycle
//! transitions, runs them through the safety gate, signs, and records every
//! issued signature in the append-only audit log before returning it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use guildnet_core::clock::Clock;
use guildnet_core::error::GuildError;
use guildnet_core::records::SignedMessageRow;
use guildnet_core::types::{Address, Amount};
use guildnet_crypto::EthKeyPair;
use guildnet_state::StateDb;

use crate::safety::SafetyGate;
use crate::typed_data::{accept_proposal_hash, reject_proposal_hash, TypedDomain};

/// `AcceptProposal` message fields, as submitted by the operator surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcceptProposalRequest {
    pub proposal_id: u64,
    pub worker: Address,
    pub verifier: Address,
    pub worker_bond: Amount,
    pub deadline: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RejectProposalRequest {
    pub proposal_id: u64,
    pub reason: String,
    pub deadline: u64,
}

/// A signature issued by the relayer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedMessage {
    /// Typed-data digest, 0x-hex.
    pub digest: String,
    /// 65-byte recoverable signature, 0x-hex.
    pub signature: String,
    /// Relayer signer address the contract will recover.
    pub signer: Address,
}

pub struct SigningRelayer {
    db: Arc<StateDb>,
    signer: EthKeyPair,
    domain: TypedDomain,
    gate: SafetyGate,
    clock: Arc<dyn Clock>,
}

impl SigningRelayer {
    pub fn new(
        db: Arc<StateDb>,
        clock: Arc<dyn Clock>,
        signer: EthKeyPair,
        domain: TypedDomain,
        max_escrow: Amount,
        rate_limit_per_minute: u32,
    ) -> Self {
        Self {
            gate: SafetyGate::new(
                Arc::clone(&db),
                Arc::clone(&clock),
                max_escrow,
                rate_limit_per_minute,
            ),
            db,
            signer,
            domain,
            clock,
        }
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address
    }

    /// Sign an `AcceptProposal` transition after the full safety ladder.
    pub fn sign_accept(
        &self,
        request: &AcceptProposalRequest,
        caller: &str,
    ) -> Result<SignedMessage, GuildError> {
        self.gate.check_rate(caller)?;
        self.gate.check_proposal(request.proposal_id)?;

        let struct_hash = accept_proposal_hash(
            request.proposal_id,
            &request.worker,
            &request.verifier,
            request.worker_bond,
            request.deadline,
        );
        self.issue(
            "accept_proposal",
            struct_hash,
            serde_json::to_value(request)
                .map_err(|e| GuildError::Serialization(e.to_string()))?,
            caller,
        )
    }

    /// Sign a `RejectProposal` transition. Rejection still requires the
    /// proposal to exist and be pending — a signature for a settled proposal
    /// is a replay hazard.
    pub fn sign_reject(
        &self,
        request: &RejectProposalRequest,
        caller: &str,
    ) -> Result<SignedMessage, GuildError> {
        self.gate.check_rate(caller)?;
        self.gate.check_proposal(request.proposal_id)?;

        let struct_hash =
            reject_proposal_hash(request.proposal_id, &request.reason, request.deadline);
        self.issue(
            "reject_proposal",
            struct_hash,
            serde_json::to_value(request)
                .map_err(|e| GuildError::Serialization(e.to_string()))?,
            caller,
        )
    }

    /// Sign and persist. The audit row is written before the signature is
    /// returned: an unlogged signature must never leave the process.
    fn issue(
        &self,
        kind: &str,
        struct_hash: [u8; 32],
        fields: serde_json::Value,
        caller: &str,
    ) -> Result<SignedMessage, GuildError> {
        let digest = self.domain.digest(&struct_hash);
        let signature = self.signer.sign_digest(&digest)?;

        self.db.append_audit(&SignedMessageRow {
            digest,
            signature: signature.to_hex(),
            kind: kind.to_string(),
            fields,
            caller: caller.to_string(),
            at: self.clock.now(),
        })?;
        self.db.flush()?;

        info!(kind, caller, digest = %hex::encode(digest), "signature issued");
        Ok(SignedMessage {
            digest: format!("0x{}", hex::encode(digest)),
            signature: signature.to_hex(),
            signer: self.signer.address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildnet_core::clock::ManualClock;
    use guildnet_core::mission::{
        AssignmentMode, Mission, MissionStatus, Requester, RiskTier,
    };
    use guildnet_core::records::{EscrowRecord, LockState};
    use guildnet_core::types::MissionId;
    use guildnet_crypto::recover_signer;

    fn relayer(name: &str) -> (SigningRelayer, Arc<StateDb>, Arc<ManualClock>) {
        let dir = std::env::temp_dir().join(format!("guildnet_relayer_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        let db = Arc::new(StateDb::open(&dir).unwrap());
        let clock = Arc::new(ManualClock::new(1_000));
        let relayer = SigningRelayer::new(
            Arc::clone(&db),
            clock.clone(),
            EthKeyPair::generate(),
            TypedDomain {
                name: "GuildManager".into(),
                version: "1".into(),
                chain_id: 31_337,
                verifying_contract: Address::from_bytes([0xAA; 20]),
            },
            1_000,
            10,
        );
        (relayer, db, clock)
    }

    fn seed_pending_proposal(db: &StateDb, proposal_id: u64, escrow: Amount, deadline: i64) {
        let mission_id = MissionId::from_bytes([proposal_id as u8; 32]);
        db.put_mission(&Mission {
            mission_id,
            requester: Requester::External(Address::from_bytes([0xBB; 20])),
            objective: "mirrored".into(),
            reward: escrow,
            deadline,
            specialties: Default::default(),
            risk: RiskTier::Low,
            mode: AssignmentMode::Autopilot,
            status: MissionStatus::Posted { at: 0 },
            created_at: 0,
            assigned_worker: None,
            assigned_verifiers: Vec::new(),
            required_verifiers: 1,
            bids: Vec::new(),
            artifacts: Vec::new(),
            revision_count: 0,
            rating: None,
            parent: None,
            chain_ref: Some(proposal_id),
        })
        .unwrap();
        db.put_escrow(&EscrowRecord {
            mission_id,
            owner: Requester::External(Address::from_bytes([0xBB; 20])).owner_id(),
            amount: escrow,
            state: LockState::Locked,
            locked_at: 0,
            released_to: None,
            slashed_amount: None,
            resolved_at: None,
        })
        .unwrap();
    }

    fn accept_request(proposal_id: u64) -> AcceptProposalRequest {
        AcceptProposalRequest {
            proposal_id,
            worker: Address::from_bytes([0x01; 20]),
            verifier: Address::from_bytes([0x02; 20]),
            worker_bond: 20,
            deadline: 9_999,
        }
    }

    #[test]
    fn signature_recovers_to_the_relayer_signer() {
        let (relayer, db, _clock) = relayer("recover");
        seed_pending_proposal(&db, 1, 100, 9_999);

        let signed = relayer.sign_accept(&accept_request(1), "ops").unwrap();

        let digest_bytes = hex::decode(signed.digest.trim_start_matches("0x")).unwrap();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&digest_bytes);
        let sig_bytes = hex::decode(signed.signature.trim_start_matches("0x")).unwrap();
        let mut sig = [0u8; 65];
        sig.copy_from_slice(&sig_bytes);

        let recovered =
            recover_signer(&digest, &guildnet_crypto::RecoverableSignature(sig)).unwrap();
        assert_eq!(recovered, relayer.signer_address());
    }

    #[test]
    fn every_signature_lands_in_the_audit_log() {
        let (relayer, db, _clock) = relayer("audit");
        seed_pending_proposal(&db, 1, 100, 9_999);

        assert_eq!(db.count_audit_rows(), 0);
        relayer.sign_accept(&accept_request(1), "ops").unwrap();
        relayer
            .sign_reject(
                &RejectProposalRequest {
                    proposal_id: 1,
                    reason: "duplicate".into(),
                    deadline: 9_999,
                },
                "ops",
            )
            .unwrap();
        assert_eq!(db.count_audit_rows(), 2);
    }

    #[test]
    fn oversized_escrow_is_refused() {
        let (relayer, db, _clock) = relayer("escrow_cap");
        seed_pending_proposal(&db, 1, 5_000, 9_999); // gate ceiling is 1_000

        assert!(matches!(
            relayer.sign_accept(&accept_request(1), "ops").unwrap_err(),
            GuildError::SafetyRejection(_)
        ));
        assert_eq!(db.count_audit_rows(), 0, "refusals are not signatures");
    }

    #[test]
    fn expired_deadline_is_refused() {
        let (relayer, db, clock) = relayer("deadline");
        seed_pending_proposal(&db, 1, 100, 2_000);
        clock.set(3_000);
        assert!(matches!(
            relayer.sign_accept(&accept_request(1), "ops").unwrap_err(),
            GuildError::SafetyRejection(_)
        ));
    }

    #[test]
    fn rate_limit_applies_per_caller() {
        let (relayer, db, _clock) = relayer("rate");
        seed_pending_proposal(&db, 1, 100, 9_999);

        for _ in 0..10 {
            relayer.sign_accept(&accept_request(1), "spammy").unwrap();
        }
        assert!(matches!(
            relayer.sign_accept(&accept_request(1), "spammy").unwrap_err(),
            GuildError::RateLimited { .. }
        ));
        relayer.sign_accept(&accept_request(1), "calm").unwrap();
    }
}
