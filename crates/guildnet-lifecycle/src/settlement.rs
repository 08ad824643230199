//! Settlement — applies a verifier consensus decision to the ledger, bonds,
//! outcome log, and reputation caches.
//!
//! The money path is staged: every precondition (locked escrow, locked
//! bonds, exact payout arithmetic) is validated before the first ledger
//! mutation. Once the commit phase begins, a failure would leave the ledger
//! partially applied, so it aborts the process rather than acknowledge a
//! half-settled mission.

use std::sync::Arc;

use tracing::{error, info};

use guildnet_consensus::{reputation, ConsensusDecision, ConsensusOutcome};
use guildnet_core::constants::{
    BPS, OUTLIER_SLASH_BPS, PROPOSAL_BOND_UNITS, PROTOCOL_FEE_BPS, TREASURY, VERIFIER_FEE_BPS,
};
use guildnet_core::error::GuildError;
use guildnet_core::mission::{FailReason, Mission, MissionStatus};
use guildnet_core::records::{BondRole, JobOutcome, LockState, OutcomeKind, Vote};
use guildnet_core::types::{AgentId, Amount, Timestamp};
use guildnet_state::{Ledger, StateDb};

use crate::bonds::BondManager;
use crate::escrow::EscrowEngine;

#[derive(Clone)]
pub struct SettlementEngine {
    db: Arc<StateDb>,
    bonds: BondManager,
    escrow: EscrowEngine,
    /// Worker-bond slash fraction on FAIL (deployment policy).
    fail_slash_bps: u128,
}

impl SettlementEngine {
    pub fn new(db: Arc<StateDb>, ledger: Ledger, fail_slash_bps: u128) -> Self {
        Self {
            bonds: BondManager::new(ledger.clone()),
            escrow: EscrowEngine::new(ledger),
            db,
            fail_slash_bps,
        }
    }

    /// Apply a decisive PASS/FAIL outcome to a mission in `verifying`.
    /// DISPUTE never reaches this function — the lifecycle engine upgrades
    /// the verifier panel instead.
    pub fn settle(
        &self,
        mission: &mut Mission,
        decision: &ConsensusDecision,
        now: Timestamp,
    ) -> Result<(), GuildError> {
        if !matches!(mission.status, MissionStatus::Verifying { .. }) {
            return Err(GuildError::InvalidState {
                expected: "verifying",
                actual: mission.status.as_str().to_string(),
            });
        }
        let worker = mission.assigned_worker.ok_or(GuildError::NotAssigned {
            role: "worker",
        })?;

        // A crew parent settles only after every subtask is terminal.
        let open_subtasks = self
            .db
            .iter_subtasks(&mission.mission_id)?
            .into_iter()
            .filter(|m| !m.status.is_terminal())
            .count();
        if open_subtasks > 0 {
            return Err(GuildError::InvalidState {
                expected: "all subtasks terminal",
                actual: format!("{open_subtasks} subtasks open"),
            });
        }

        let votes = self.db.iter_votes_for_mission(&mission.mission_id)?;

        // ── Validate phase: confirm every lock this settlement will touch ────
        self.expect_locked_escrow(mission)?;
        self.expect_locked_bond(mission, BondRole::Worker, &worker)?;
        for vote in &votes {
            self.expect_locked_bond(mission, BondRole::Verifier, &vote.verifier_id)?;
        }

        match decision.outcome {
            ConsensusOutcome::Pass => self.commit_pass(mission, decision, &votes, worker, now),
            ConsensusOutcome::Fail => self.commit_fail(mission, decision, &votes, worker, now),
            ConsensusOutcome::Dispute => Err(GuildError::InvalidState {
                expected: "decisive outcome",
                actual: "dispute".to_string(),
            }),
        }
    }

    // ── PASS ─────────────────────────────────────────────────────────────────

    fn commit_pass(
        &self,
        mission: &mut Mission,
        decision: &ConsensusDecision,
        votes: &[Vote],
        worker: AgentId,
        now: Timestamp,
    ) -> Result<(), GuildError> {
        let reward = mission.reward;
        let aligned: Vec<AgentId> = votes
            .iter()
            .filter(|v| !decision.outliers.contains(&v.verifier_id))
            .map(|v| v.verifier_id)
            .collect();

        let worker_payout = reward * (BPS - PROTOCOL_FEE_BPS - VERIFIER_FEE_BPS) / BPS;
        let verifier_pool = reward * VERIFIER_FEE_BPS / BPS;
        let per_verifier = verifier_pool / aligned.len() as Amount;
        let pool_remainder = verifier_pool - per_verifier * aligned.len() as Amount;
        // Fee-division dust lands in the treasury, keeping the split exact.
        let treasury_cut = reward - worker_payout - verifier_pool + pool_remainder;

        let mut payouts: Vec<(AgentId, Amount)> = vec![(worker, worker_payout)];
        payouts.extend(aligned.iter().map(|v| (*v, per_verifier)));
        payouts.push((*TREASURY, treasury_cut));
        payouts.push((mission.requester.owner_id(), PROPOSAL_BOND_UNITS));

        // ── Commit phase ─────────────────────────────────────────────────────
        must(
            "release escrow",
            self.escrow.release(&mission.mission_id, &payouts, now),
        );
        must(
            "release worker bond",
            self.bonds
                .release(&mission.mission_id, BondRole::Worker, &worker, now),
        );

        for vote in votes {
            if decision.outliers.contains(&vote.verifier_id) {
                let slashed = must(
                    "slash outlier bond",
                    self.bonds.slash(
                        &mission.mission_id,
                        BondRole::Verifier,
                        &vote.verifier_id,
                        OUTLIER_SLASH_BPS,
                        now,
                    ),
                );
                must(
                    "record outlier outcome",
                    self.db.put_outcome(&JobOutcome {
                        agent_id: vote.verifier_id,
                        mission_id: mission.mission_id,
                        role: BondRole::Verifier,
                        outcome: OutcomeKind::Outlier,
                        reward_earned: 0,
                        bond_slashed: slashed,
                        rating: None,
                        at: now,
                    }),
                );
            } else {
                must(
                    "release verifier bond",
                    self.bonds.release(
                        &mission.mission_id,
                        BondRole::Verifier,
                        &vote.verifier_id,
                        now,
                    ),
                );
                must(
                    "record verifier outcome",
                    self.db.put_outcome(&JobOutcome {
                        agent_id: vote.verifier_id,
                        mission_id: mission.mission_id,
                        role: BondRole::Verifier,
                        outcome: OutcomeKind::Pass,
                        reward_earned: per_verifier,
                        bond_slashed: 0,
                        rating: None,
                        at: now,
                    }),
                );
            }
        }

        must(
            "record worker outcome",
            self.db.put_outcome(&JobOutcome {
                agent_id: worker,
                mission_id: mission.mission_id,
                role: BondRole::Worker,
                outcome: OutcomeKind::Pass,
                reward_earned: worker_payout,
                bond_slashed: 0,
                rating: mission.rating,
                at: now,
            }),
        );

        self.finish(mission, MissionStatus::Settled { at: now }, votes, worker);
        info!(
            mission = %mission.mission_id,
            worker_payout,
            verifiers = votes.len(),
            outliers = decision.outliers.len(),
            "mission settled PASS"
        );
        Ok(())
    }

    // ── FAIL ─────────────────────────────────────────────────────────────────

    fn commit_fail(
        &self,
        mission: &mut Mission,
        decision: &ConsensusDecision,
        votes: &[Vote],
        worker: AgentId,
        now: Timestamp,
    ) -> Result<(), GuildError> {
        let slashed = must(
            "slash worker bond",
            self.bonds.slash(
                &mission.mission_id,
                BondRole::Worker,
                &worker,
                self.fail_slash_bps,
                now,
            ),
        );

        // Escrow goes back to the requester in full; verifiers keep nothing
        // on a FAIL, and their bonds are released regardless of alignment.
        must("refund escrow", self.escrow.refund(mission, now));
        for vote in votes {
            must(
                "release verifier bond",
                self.bonds.release(
                    &mission.mission_id,
                    BondRole::Verifier,
                    &vote.verifier_id,
                    now,
                ),
            );
            let outcome = if decision.outliers.contains(&vote.verifier_id) {
                OutcomeKind::Outlier
            } else {
                OutcomeKind::Pass
            };
            must(
                "record verifier outcome",
                self.db.put_outcome(&JobOutcome {
                    agent_id: vote.verifier_id,
                    mission_id: mission.mission_id,
                    role: BondRole::Verifier,
                    outcome,
                    reward_earned: 0,
                    bond_slashed: 0,
                    rating: None,
                    at: now,
                }),
            );
        }

        must(
            "record worker outcome",
            self.db.put_outcome(&JobOutcome {
                agent_id: worker,
                mission_id: mission.mission_id,
                role: BondRole::Worker,
                outcome: OutcomeKind::Fail,
                reward_earned: 0,
                bond_slashed: slashed,
                rating: None,
                at: now,
            }),
        );

        self.finish(
            mission,
            MissionStatus::Failed {
                at: now,
                reason: FailReason::VerdictFail,
            },
            votes,
            worker,
        );
        info!(mission = %mission.mission_id, slashed, "mission settled FAIL");
        Ok(())
    }

    // ── Shared tail ──────────────────────────────────────────────────────────

    /// Clear votes, persist the terminal status, and recompute reputation for
    /// every participant from the outcome log.
    fn finish(&self, mission: &mut Mission, status: MissionStatus, votes: &[Vote], worker: AgentId) {
        must(
            "clear votes",
            self.db.clear_votes_for_mission(&mission.mission_id),
        );
        mission.status = status;
        must("persist mission", self.db.put_mission(mission));

        let mut participants: Vec<AgentId> = vec![worker];
        participants.extend(votes.iter().map(|v| v.verifier_id));
        for agent_id in participants {
            must("recompute reputation", self.recompute_reputation(&agent_id));
        }
        must("flush", self.db.flush());
    }

    fn recompute_reputation(&self, agent_id: &AgentId) -> Result<(), GuildError> {
        let Some(mut agent) = self.db.get_agent(agent_id)? else {
            return Ok(());
        };
        let outcomes = self.db.iter_outcomes_for_agent(agent_id)?;
        agent.reputation = reputation(&outcomes).score;
        self.db.put_agent(&agent)
    }

    // ── Validation helpers ───────────────────────────────────────────────────

    fn expect_locked_escrow(&self, mission: &Mission) -> Result<(), GuildError> {
        let escrow = self
            .db
            .get_escrow(&mission.mission_id)?
            .ok_or_else(|| GuildError::LockNotFound {
                mission: mission.mission_id.to_hex(),
                purpose: "escrow",
            })?;
        if escrow.state != LockState::Locked {
            return Err(GuildError::LockNotFound {
                mission: mission.mission_id.to_hex(),
                purpose: "escrow",
            });
        }
        Ok(())
    }

    fn expect_locked_bond(
        &self,
        mission: &Mission,
        role: BondRole,
        agent: &AgentId,
    ) -> Result<(), GuildError> {
        let bond = self
            .db
            .get_bond(&mission.mission_id, role, agent)?
            .ok_or_else(|| GuildError::LockNotFound {
                mission: mission.mission_id.to_hex(),
                purpose: role.as_str(),
            })?;
        if bond.state != LockState::Locked {
            return Err(GuildError::LockNotFound {
                mission: mission.mission_id.to_hex(),
                purpose: role.as_str(),
            });
        }
        Ok(())
    }
}

/// Commit-phase guard: past the point of no return, a storage failure means
/// the ledger may be partially applied. Abort instead of acknowledging.
fn must<T>(step: &str, result: Result<T, GuildError>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            error!(step, error = %e, "settlement commit failed mid-application; aborting process");
            std::process::abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Fee arithmetic is exercised end-to-end in the node integration tests;
    // here we pin the split math itself.
    #[test]
    fn pass_split_is_exact_for_even_and_odd_verifier_counts() {
        let reward: Amount = 100;
        let worker = reward * (BPS - PROTOCOL_FEE_BPS - VERIFIER_FEE_BPS) / BPS;
        let pool = reward * VERIFIER_FEE_BPS / BPS;
        assert_eq!(worker, 85);
        assert_eq!(pool, 5);

        for aligned in 1usize..=3 {
            let per = pool / aligned as Amount;
            let rem = pool - per * aligned as Amount;
            let treasury = reward - worker - pool + rem;
            assert_eq!(worker + per * aligned as Amount + treasury, reward);
        }
    }
}
