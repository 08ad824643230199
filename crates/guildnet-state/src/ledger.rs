//! The token ledger — sole owner of balance, escrow, and bond amounts.
//!
//! Every operation takes the global writer lock, validates against current
//! state, then commits, so ledger state is linearised: concurrent callers
//! observe each operation entirely or not at all. Amounts are nonnegative
//! integers in smallest units; arithmetic is exact.
//!
//! `balance(owner) = total − escrowed − bonded` and is never allowed to go
//! negative: debits and locks check available funds before mutating.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use guildnet_core::constants::{BPS, TREASURY};
use guildnet_core::error::GuildError;
use guildnet_core::records::{BondRecord, BondRole, EscrowRecord, LockState};
use guildnet_core::types::{AgentId, Amount, MissionId, Timestamp};

use crate::db::StateDb;

/// Per-owner balance sheet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub owner: AgentId,
    pub total: Amount,
    pub escrowed: Amount,
    pub bonded: Amount,
}

impl LedgerAccount {
    pub fn new(owner: AgentId) -> Self {
        Self {
            owner,
            total: 0,
            escrowed: 0,
            bonded: 0,
        }
    }

    /// Spendable balance.
    pub fn available(&self) -> Amount {
        self.total - self.escrowed - self.bonded
    }
}

/// The ledger. Cheap to clone; all clones share the same writer lock.
#[derive(Clone)]
pub struct Ledger {
    db: Arc<StateDb>,
    write_lock: Arc<Mutex<()>>,
}

impl Ledger {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn account(&self, owner: &AgentId) -> Result<LedgerAccount, GuildError> {
        Ok(self
            .db
            .get_account(owner)?
            .unwrap_or_else(|| LedgerAccount::new(*owner)))
    }

    /// Read-side view of an owner's balance sheet.
    pub fn view(&self, owner: &AgentId) -> Result<LedgerAccount, GuildError> {
        self.account(owner)
    }

    // ── Plain transfers ──────────────────────────────────────────────────────

    pub fn credit(&self, owner: &AgentId, amount: Amount) -> Result<(), GuildError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut acc = self.account(owner)?;
        acc.total += amount;
        self.db.put_account(&acc)
    }

    pub fn debit(&self, owner: &AgentId, amount: Amount) -> Result<(), GuildError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut acc = self.account(owner)?;
        if acc.available() < amount {
            return Err(GuildError::InsufficientFunds {
                need: amount,
                have: acc.available(),
            });
        }
        acc.total -= amount;
        self.db.put_account(&acc)
    }

    // ── Escrow ───────────────────────────────────────────────────────────────

    /// Lock `amount` of `owner`'s funds against `mission`. One escrow per
    /// mission, ever.
    pub fn lock_escrow(
        &self,
        owner: &AgentId,
        mission: &MissionId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<(), GuildError> {
        let _guard = self.write_lock.lock().unwrap();
        if self.db.get_escrow(mission)?.is_some() {
            return Err(GuildError::DoubleLock {
                mission: mission.to_hex(),
                purpose: "escrow",
            });
        }
        let mut acc = self.account(owner)?;
        if acc.available() < amount {
            return Err(GuildError::InsufficientFunds {
                need: amount,
                have: acc.available(),
            });
        }
        acc.escrowed += amount;
        self.db.put_account(&acc)?;
        self.db.put_escrow(&EscrowRecord {
            mission_id: *mission,
            owner: *owner,
            amount,
            state: LockState::Locked,
            locked_at: now,
            released_to: None,
            slashed_amount: None,
            resolved_at: None,
        })
    }

    /// Release a locked escrow, distributing the full amount across
    /// `payouts`. The distribution must be exact: the payout sum equals the
    /// escrowed amount, so no unit is created or destroyed.
    pub fn release_escrow(
        &self,
        mission: &MissionId,
        payouts: &[(AgentId, Amount)],
        now: Timestamp,
    ) -> Result<(), GuildError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut escrow = self.locked_escrow(mission)?;

        let distributed: Amount = payouts.iter().map(|(_, a)| *a).sum();
        if distributed != escrow.amount {
            return Err(GuildError::ConflictingClaim(format!(
                "escrow payout {distributed} != locked {}",
                escrow.amount
            )));
        }

        let mut owner_acc = self.account(&escrow.owner)?;
        owner_acc.escrowed -= escrow.amount;
        owner_acc.total -= escrow.amount;
        self.db.put_account(&owner_acc)?;

        for (to, amount) in payouts {
            let mut acc = self.account(to)?;
            acc.total += amount;
            self.db.put_account(&acc)?;
        }

        escrow.state = LockState::Released;
        escrow.released_to = payouts.first().map(|(to, _)| *to);
        escrow.resolved_at = Some(now);
        self.db.put_escrow(&escrow)
    }

    /// Slash `fraction_bps` of the escrow to the treasury; the remainder
    /// returns to the owner's spendable balance.
    pub fn slash_escrow(
        &self,
        mission: &MissionId,
        fraction_bps: u128,
        now: Timestamp,
    ) -> Result<Amount, GuildError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut escrow = self.locked_escrow(mission)?;

        let slashed = escrow.amount * fraction_bps / BPS;

        let mut owner_acc = self.account(&escrow.owner)?;
        owner_acc.escrowed -= escrow.amount;
        owner_acc.total -= slashed;
        self.db.put_account(&owner_acc)?;

        if slashed > 0 {
            let mut treasury = self.account(&TREASURY)?;
            treasury.total += slashed;
            self.db.put_account(&treasury)?;
        }

        escrow.state = LockState::Slashed;
        escrow.slashed_amount = Some(slashed);
        escrow.resolved_at = Some(now);
        self.db.put_escrow(&escrow)?;
        Ok(slashed)
    }

    fn locked_escrow(&self, mission: &MissionId) -> Result<EscrowRecord, GuildError> {
        let escrow = self
            .db
            .get_escrow(mission)?
            .ok_or_else(|| GuildError::LockNotFound {
                mission: mission.to_hex(),
                purpose: "escrow",
            })?;
        if escrow.state != LockState::Locked {
            return Err(GuildError::LockNotFound {
                mission: mission.to_hex(),
                purpose: "escrow",
            });
        }
        Ok(escrow)
    }

    // ── Bonds ────────────────────────────────────────────────────────────────

    /// Stake `amount` of `owner`'s funds as a bond on `mission`. One bond per
    /// (owner, mission, role).
    pub fn lock_bond(
        &self,
        owner: &AgentId,
        mission: &MissionId,
        role: BondRole,
        amount: Amount,
        now: Timestamp,
    ) -> Result<(), GuildError> {
        let _guard = self.write_lock.lock().unwrap();
        // A resolved bond may be re-staked (e.g. a verifier re-voting after a
        // revision); only an active lock is a conflict.
        if let Some(existing) = self.db.get_bond(mission, role, owner)? {
            if existing.state == LockState::Locked {
                return Err(GuildError::DoubleLock {
                    mission: mission.to_hex(),
                    purpose: role.as_str(),
                });
            }
        }
        let mut acc = self.account(owner)?;
        if acc.available() < amount {
            return Err(GuildError::InsufficientFunds {
                need: amount,
                have: acc.available(),
            });
        }
        acc.bonded += amount;
        self.db.put_account(&acc)?;
        self.db.put_bond(&BondRecord {
            agent_id: *owner,
            mission_id: *mission,
            role,
            amount,
            state: LockState::Locked,
            staked_at: now,
            resolved_at: None,
            slashed_amount: None,
        })
    }

    /// Release a bond back to the agent's spendable balance.
    pub fn release_bond(
        &self,
        mission: &MissionId,
        role: BondRole,
        agent: &AgentId,
        now: Timestamp,
    ) -> Result<(), GuildError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut bond = self.locked_bond(mission, role, agent)?;

        let mut acc = self.account(agent)?;
        acc.bonded -= bond.amount;
        self.db.put_account(&acc)?;

        bond.state = LockState::Released;
        bond.resolved_at = Some(now);
        self.db.put_bond(&bond)
    }

    /// Slash `fraction_bps` of a bond to the treasury; the remainder returns
    /// to the agent's spendable balance. Returns the slashed amount.
    pub fn slash_bond(
        &self,
        mission: &MissionId,
        role: BondRole,
        agent: &AgentId,
        fraction_bps: u128,
        now: Timestamp,
    ) -> Result<Amount, GuildError> {
        let _guard = self.write_lock.lock().unwrap();
        let mut bond = self.locked_bond(mission, role, agent)?;

        let slashed = bond.amount * fraction_bps / BPS;

        let mut acc = self.account(agent)?;
        acc.bonded -= bond.amount;
        acc.total -= slashed;
        self.db.put_account(&acc)?;

        if slashed > 0 {
            let mut treasury = self.account(&TREASURY)?;
            treasury.total += slashed;
            self.db.put_account(&treasury)?;
        }

        bond.state = LockState::Slashed;
        bond.slashed_amount = Some(slashed);
        bond.resolved_at = Some(now);
        self.db.put_bond(&bond)?;
        Ok(slashed)
    }

    fn locked_bond(
        &self,
        mission: &MissionId,
        role: BondRole,
        agent: &AgentId,
    ) -> Result<BondRecord, GuildError> {
        let bond = self
            .db
            .get_bond(mission, role, agent)?
            .ok_or_else(|| GuildError::LockNotFound {
                mission: mission.to_hex(),
                purpose: role.as_str(),
            })?;
        if bond.state != LockState::Locked {
            return Err(GuildError::LockNotFound {
                mission: mission.to_hex(),
                purpose: role.as_str(),
            });
        }
        Ok(bond)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_ledger(name: &str) -> Ledger {
        let dir = std::env::temp_dir().join(format!("guildnet_ledger_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        Ledger::new(Arc::new(StateDb::open(&dir).expect("open temp db")))
    }

    fn agent(tag: u8) -> AgentId {
        AgentId::from_bytes([tag; 32])
    }

    fn mission(tag: u8) -> MissionId {
        MissionId::from_bytes([tag; 32])
    }

    const NOW: Timestamp = 1_000;

    #[test]
    fn credit_debit_and_available() {
        let ledger = temp_ledger("credit_debit");
        let owner = agent(1);
        ledger.credit(&owner, 1_000).unwrap();
        ledger.debit(&owner, 400).unwrap();
        assert_eq!(ledger.view(&owner).unwrap().available(), 600);

        let err = ledger.debit(&owner, 700).unwrap_err();
        assert!(matches!(
            err,
            GuildError::InsufficientFunds { need: 700, have: 600 }
        ));
    }

    #[test]
    fn escrow_lock_reduces_available_not_total() {
        let ledger = temp_ledger("escrow_lock");
        let owner = agent(1);
        ledger.credit(&owner, 1_000).unwrap();
        ledger.lock_escrow(&owner, &mission(9), 100, NOW).unwrap();

        let acc = ledger.view(&owner).unwrap();
        assert_eq!(acc.total, 1_000);
        assert_eq!(acc.escrowed, 100);
        assert_eq!(acc.available(), 900);
    }

    #[test]
    fn double_escrow_lock_rejected() {
        let ledger = temp_ledger("double_escrow");
        let owner = agent(1);
        ledger.credit(&owner, 1_000).unwrap();
        ledger.lock_escrow(&owner, &mission(9), 100, NOW).unwrap();
        assert!(matches!(
            ledger.lock_escrow(&owner, &mission(9), 50, NOW).unwrap_err(),
            GuildError::DoubleLock { .. }
        ));
    }

    #[test]
    fn escrow_release_distributes_exactly() {
        let ledger = temp_ledger("escrow_release");
        let owner = agent(1);
        let worker = agent(2);
        ledger.credit(&owner, 1_000).unwrap();
        ledger.lock_escrow(&owner, &mission(9), 100, NOW).unwrap();

        // Mismatched distribution rejected.
        assert!(ledger
            .release_escrow(&mission(9), &[(worker, 99)], NOW)
            .is_err());

        ledger
            .release_escrow(&mission(9), &[(worker, 85), (*TREASURY, 15)], NOW)
            .unwrap();
        assert_eq!(ledger.view(&owner).unwrap().total, 900);
        assert_eq!(ledger.view(&owner).unwrap().escrowed, 0);
        assert_eq!(ledger.view(&worker).unwrap().available(), 85);
        assert_eq!(ledger.view(&TREASURY).unwrap().available(), 15);
    }

    #[test]
    fn escrow_release_twice_rejected() {
        let ledger = temp_ledger("escrow_twice");
        let owner = agent(1);
        ledger.credit(&owner, 1_000).unwrap();
        ledger.lock_escrow(&owner, &mission(9), 100, NOW).unwrap();
        ledger
            .release_escrow(&mission(9), &[(owner, 100)], NOW)
            .unwrap();
        assert!(matches!(
            ledger
                .release_escrow(&mission(9), &[(owner, 100)], NOW)
                .unwrap_err(),
            GuildError::LockNotFound { .. }
        ));
    }

    #[test]
    fn escrow_slash_sends_fraction_to_treasury_rest_to_owner() {
        let ledger = temp_ledger("escrow_slash");
        let owner = agent(1);
        ledger.credit(&owner, 1_000).unwrap();
        ledger.lock_escrow(&owner, &mission(9), 100, NOW).unwrap();

        // Quarter slashed: 25 to treasury, 75 back to the owner's spendable.
        let slashed = ledger.slash_escrow(&mission(9), 2_500, NOW).unwrap();
        assert_eq!(slashed, 25);
        let acc = ledger.view(&owner).unwrap();
        assert_eq!(acc.total, 975);
        assert_eq!(acc.escrowed, 0);
        assert_eq!(ledger.view(&TREASURY).unwrap().total, 25);
    }

    #[test]
    fn bond_slash_splits_between_treasury_and_agent() {
        let ledger = temp_ledger("bond_slash");
        let worker = agent(2);
        ledger.credit(&worker, 50).unwrap();
        ledger
            .lock_bond(&worker, &mission(9), BondRole::Worker, 20, NOW)
            .unwrap();
        assert_eq!(ledger.view(&worker).unwrap().available(), 30);

        // Half slashed: 10 to treasury, 10 back to the worker.
        let slashed = ledger
            .slash_bond(&mission(9), BondRole::Worker, &worker, 5_000, NOW)
            .unwrap();
        assert_eq!(slashed, 10);
        let acc = ledger.view(&worker).unwrap();
        assert_eq!(acc.total, 40);
        assert_eq!(acc.bonded, 0);
        assert_eq!(ledger.view(&TREASURY).unwrap().total, 10);
    }

    #[test]
    fn duplicate_bond_rejected_but_roles_independent() {
        let ledger = temp_ledger("bond_roles");
        let a = agent(2);
        ledger.credit(&a, 100).unwrap();
        ledger
            .lock_bond(&a, &mission(9), BondRole::Worker, 20, NOW)
            .unwrap();
        assert!(matches!(
            ledger
                .lock_bond(&a, &mission(9), BondRole::Worker, 20, NOW)
                .unwrap_err(),
            GuildError::DoubleLock { .. }
        ));
        // Same mission, verifier role — separate lock purpose.
        ledger
            .lock_bond(&a, &mission(9), BondRole::Verifier, 5, NOW)
            .unwrap();
        assert_eq!(ledger.view(&a).unwrap().bonded, 25);
    }

    #[test]
    fn conservation_across_full_cycle() {
        let ledger = temp_ledger("conservation");
        let owner = agent(1);
        let worker = agent(2);
        ledger.credit(&owner, 1_000).unwrap();
        ledger.credit(&worker, 50).unwrap();

        ledger.lock_escrow(&owner, &mission(9), 100, NOW).unwrap();
        ledger
            .lock_bond(&worker, &mission(9), BondRole::Worker, 20, NOW)
            .unwrap();
        ledger
            .release_escrow(&mission(9), &[(worker, 85), (*TREASURY, 15)], NOW)
            .unwrap();
        ledger
            .release_bond(&mission(9), BondRole::Worker, &worker, NOW)
            .unwrap();

        let sum = ledger.view(&owner).unwrap().total
            + ledger.view(&worker).unwrap().total
            + ledger.view(&TREASURY).unwrap().total;
        assert_eq!(sum, 1_050);
    }
}
