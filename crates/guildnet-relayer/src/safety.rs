//! Pre-sign safety checks and the signing rate limiter.
//!
//! Nothing gets signed before every check passes: a signature the chain will
//! accept is as irreversible as a ledger write. Rate-limit counters are
//! persisted so a restart does not reset a caller's budget.

use std::sync::Arc;

use guildnet_core::clock::Clock;
use guildnet_core::error::GuildError;
use guildnet_core::mission::{Mission, MissionStatus};
use guildnet_core::types::Amount;
use guildnet_state::StateDb;

pub struct SafetyGate {
    db: Arc<StateDb>,
    clock: Arc<dyn Clock>,
    max_escrow: Amount,
    rate_limit_per_minute: u32,
}

impl SafetyGate {
    pub fn new(
        db: Arc<StateDb>,
        clock: Arc<dyn Clock>,
        max_escrow: Amount,
        rate_limit_per_minute: u32,
    ) -> Self {
        Self {
            db,
            clock,
            max_escrow,
            rate_limit_per_minute,
        }
    }

    /// Sliding one-minute budget per caller. Counters persist across
    /// restarts.
    pub fn check_rate(&self, caller: &str) -> Result<(), GuildError> {
        let minute = (self.clock.now() / 60) as u64;
        let count = self.db.bump_rate_counter(caller, minute)?;
        if count > self.rate_limit_per_minute {
            return Err(GuildError::RateLimited {
                limit: self.rate_limit_per_minute,
            });
        }
        Ok(())
    }

    /// The proposal must exist in the mirrored store, still be pending, fit
    /// under the escrow ceiling, and not be past its deadline.
    pub fn check_proposal(&self, proposal_id: u64) -> Result<Mission, GuildError> {
        let mission = self
            .db
            .get_mission_by_chain_ref(proposal_id)?
            .ok_or_else(|| {
                GuildError::SafetyRejection(format!("proposal {proposal_id} not found on chain"))
            })?;

        if !matches!(mission.status, MissionStatus::Posted { .. }) {
            return Err(GuildError::SafetyRejection(format!(
                "proposal {proposal_id} is {}, not pending",
                mission.status.as_str()
            )));
        }
        let escrow = self
            .db
            .get_escrow(&mission.mission_id)?
            .map(|e| e.amount)
            .unwrap_or(mission.reward);
        if escrow > self.max_escrow {
            return Err(GuildError::SafetyRejection(format!(
                "escrow {escrow} exceeds ceiling {}",
                self.max_escrow
            )));
        }
        if mission.deadline <= self.clock.now() {
            return Err(GuildError::SafetyRejection(format!(
                "proposal {proposal_id} deadline has passed"
            )));
        }
        Ok(mission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildnet_core::clock::ManualClock;

    fn gate(name: &str, limit: u32) -> (SafetyGate, Arc<ManualClock>) {
        let dir = std::env::temp_dir().join(format!("guildnet_safety_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        let db = Arc::new(StateDb::open(&dir).unwrap());
        let clock = Arc::new(ManualClock::new(600));
        (
            SafetyGate::new(db, clock.clone(), 1_000, limit),
            clock,
        )
    }

    #[test]
    fn rate_limit_trips_at_the_threshold() {
        let (gate, _clock) = gate("rate", 3);
        for _ in 0..3 {
            gate.check_rate("client-a").unwrap();
        }
        assert!(matches!(
            gate.check_rate("client-a").unwrap_err(),
            GuildError::RateLimited { limit: 3 }
        ));
        // Other callers are unaffected.
        gate.check_rate("client-b").unwrap();
    }

    #[test]
    fn rate_limit_resets_in_the_next_minute() {
        let (gate, clock) = gate("rate_reset", 2);
        gate.check_rate("client-a").unwrap();
        gate.check_rate("client-a").unwrap();
        assert!(gate.check_rate("client-a").is_err());

        clock.advance(60);
        gate.check_rate("client-a").unwrap();
    }

    #[test]
    fn unknown_proposal_is_a_safety_rejection() {
        let (gate, _clock) = gate("unknown", 10);
        assert!(matches!(
            gate.check_proposal(404).unwrap_err(),
            GuildError::SafetyRejection(_)
        ));
    }
}
