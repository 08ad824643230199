//! Bond manager — stakes, releases, and slashes participation bonds through
//! the ledger. Amounts derive from the mission reward and the constants
//! table; this module never touches raw balance state.

use guildnet_core::constants::{BPS, VERIFIER_BOND_BPS, WORKER_BOND_BPS};
use guildnet_core::error::GuildError;
use guildnet_core::records::BondRole;
use guildnet_core::types::{AgentId, Amount, MissionId, Timestamp};
use guildnet_state::Ledger;

#[derive(Clone)]
pub struct BondManager {
    ledger: Ledger,
}

impl BondManager {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    pub fn required_bond(role: BondRole, reward: Amount) -> Amount {
        match role {
            BondRole::Worker => reward * WORKER_BOND_BPS / BPS,
            BondRole::Verifier => reward * VERIFIER_BOND_BPS / BPS,
        }
    }

    /// Stake the role-appropriate bond for `agent` on `mission`. Fails on
    /// insufficient available balance or an already-active bond.
    pub fn stake(
        &self,
        agent: &AgentId,
        mission: &MissionId,
        role: BondRole,
        reward: Amount,
        now: Timestamp,
    ) -> Result<Amount, GuildError> {
        let amount = Self::required_bond(role, reward);
        self.ledger.lock_bond(agent, mission, role, amount, now)?;
        Ok(amount)
    }

    pub fn release(
        &self,
        mission: &MissionId,
        role: BondRole,
        agent: &AgentId,
        now: Timestamp,
    ) -> Result<(), GuildError> {
        self.ledger.release_bond(mission, role, agent, now)
    }

    /// Slash `fraction_bps` of the bond to the treasury. Returns the amount
    /// taken.
    pub fn slash(
        &self,
        mission: &MissionId,
        role: BondRole,
        agent: &AgentId,
        fraction_bps: u128,
        now: Timestamp,
    ) -> Result<Amount, GuildError> {
        self.ledger.slash_bond(mission, role, agent, fraction_bps, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildnet_core::constants::UNITS_PER_TOKEN;
    use guildnet_state::StateDb;
    use std::sync::Arc;

    #[test]
    fn bond_amounts_follow_the_constants_table() {
        let reward = 100 * UNITS_PER_TOKEN;
        assert_eq!(
            BondManager::required_bond(BondRole::Worker, reward),
            20 * UNITS_PER_TOKEN
        );
        assert_eq!(
            BondManager::required_bond(BondRole::Verifier, reward),
            5 * UNITS_PER_TOKEN
        );
    }

    #[test]
    fn stake_requires_funds() {
        let dir = std::env::temp_dir().join("guildnet_bonds_test_funds");
        let _ = std::fs::remove_dir_all(&dir);
        let ledger = Ledger::new(Arc::new(StateDb::open(&dir).unwrap()));
        let bonds = BondManager::new(ledger.clone());

        let worker = AgentId::from_bytes([1u8; 32]);
        let mission = MissionId::from_bytes([2u8; 32]);

        assert!(matches!(
            bonds
                .stake(&worker, &mission, BondRole::Worker, 100, 0)
                .unwrap_err(),
            GuildError::InsufficientFunds { .. }
        ));

        ledger.credit(&worker, 50).unwrap();
        let staked = bonds
            .stake(&worker, &mission, BondRole::Worker, 100, 0)
            .unwrap();
        assert_eq!(staked, 20);
        assert_eq!(ledger.view(&worker).unwrap().bonded, 20);
    }
}
