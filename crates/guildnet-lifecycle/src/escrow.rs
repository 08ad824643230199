//! Escrow engine — locks the reward (plus the anti-spam proposal bond) at
//! mission creation; release and refund run only from the settlement and
//! failure paths.

use guildnet_core::constants::PROPOSAL_BOND_UNITS;
use guildnet_core::error::GuildError;
use guildnet_core::mission::Mission;
use guildnet_core::types::{AgentId, Amount, MissionId, Timestamp};
use guildnet_state::Ledger;

#[derive(Clone)]
pub struct EscrowEngine {
    ledger: Ledger,
}

impl EscrowEngine {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Total locked at creation: reward + proposal bond.
    pub fn escrow_amount(reward: Amount) -> Amount {
        reward + PROPOSAL_BOND_UNITS
    }

    /// Lock the mission's escrow against the requester's balance.
    pub fn lock(
        &self,
        owner: &AgentId,
        mission: &MissionId,
        reward: Amount,
        now: Timestamp,
    ) -> Result<(), GuildError> {
        self.ledger
            .lock_escrow(owner, mission, Self::escrow_amount(reward), now)
    }

    /// Distribute a released escrow. The payout set must sum to the locked
    /// amount exactly; the ledger enforces it.
    pub fn release(
        &self,
        mission: &MissionId,
        payouts: &[(AgentId, Amount)],
        now: Timestamp,
    ) -> Result<(), GuildError> {
        self.ledger.release_escrow(mission, payouts, now)
    }

    /// Return the full escrow — reward and proposal bond — to the requester.
    pub fn refund(&self, mission: &Mission, now: Timestamp) -> Result<(), GuildError> {
        let owner = mission.requester.owner_id();
        self.ledger.release_escrow(
            &mission.mission_id,
            &[(owner, Self::escrow_amount(mission.reward))],
            now,
        )
    }
}
