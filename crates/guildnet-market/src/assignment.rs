//! Worker and verifier selection.
//!
//! Three assignment modes share one candidate filter; autopilot adds a
//! reputation-weighted draw with an anti-monopoly fairness discount, bidding
//! scores offers by reputation / (price × eta) in exact integer arithmetic,
//! direct hire only validates. Selection is deterministic: the autopilot draw
//! is seeded from the mission id and every tie-break is total.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use guildnet_core::constants::{
    BPS, FAIRNESS_WINDOW, REPUTATION_FLOOR, REPUTATION_FLOOR_RELAX, VERIFIER_BUDGET_BPS,
};
use guildnet_core::error::GuildError;
use guildnet_core::mission::{Bid, Mission};
use guildnet_core::types::AgentId;
use guildnet_core::{Agent, AgentRole};
use guildnet_state::StateDb;

/// Weight scale for the fairness discount so 1/(1+n) stays integral.
const FAIRNESS_SCALE: u128 = 1_000;

#[derive(Clone)]
pub struct AssignmentEngine {
    db: Arc<StateDb>,
}

impl AssignmentEngine {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self { db }
    }

    // ── Candidate filter ─────────────────────────────────────────────────────

    /// Workers eligible for `mission`: active, capability-covering, at or
    /// above the reputation floor. If the filter comes back empty the floor
    /// is relaxed by 10 points exactly once.
    pub fn eligible_workers(&self, mission: &Mission) -> Result<Vec<Agent>, GuildError> {
        let agents = self.db.iter_agents()?;
        let filter = |floor: i64| -> Vec<Agent> {
            agents
                .iter()
                .filter(|a| {
                    a.active
                        && a.role == AgentRole::Worker
                        && a.covers(&mission.specialties)
                        && a.reputation >= floor
                })
                .cloned()
                .collect()
        };

        let mut candidates = filter(REPUTATION_FLOOR);
        if candidates.is_empty() {
            debug!(mission = %mission.mission_id, "no candidates at floor; relaxing once");
            candidates = filter(REPUTATION_FLOOR - REPUTATION_FLOOR_RELAX);
        }
        if candidates.is_empty() {
            return Err(GuildError::NoEligibleAgents);
        }

        // Total deterministic order: reputation descending, id ascending.
        candidates.sort_by(|a, b| {
            b.reputation
                .cmp(&a.reputation)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        Ok(candidates)
    }

    // ── Autopilot ────────────────────────────────────────────────────────────

    /// Reputation-weighted draw with fairness discount, seeded from the
    /// mission id so the same state always selects the same worker.
    pub fn autopilot(&self, mission: &Mission) -> Result<Agent, GuildError> {
        let candidates = self.eligible_workers(mission)?;
        // Non-empty after the filter; the head is the tie-break fallback.
        let fallback = candidates[0].clone();

        let weights: Vec<u128> = candidates
            .iter()
            .map(|a| self.weight(a, mission))
            .collect::<Result<_, _>>()?;
        let total: u128 = weights.iter().sum();
        if total == 0 {
            return Ok(fallback);
        }

        let mut rng = StdRng::seed_from_u64(mission.mission_id.seed());
        let mut point = rng.gen_range(0..total);
        for (agent, weight) in candidates.iter().zip(&weights) {
            if point < *weight {
                debug!(mission = %mission.mission_id, worker = %agent.agent_id, "autopilot pick");
                return Ok(agent.clone());
            }
            point -= weight;
        }
        Ok(fallback)
    }

    /// w(a) = reputation × fairness, fairness = 1/(1 + recent assignments in
    /// the specialty window), scaled to stay in integers.
    fn weight(&self, agent: &Agent, mission: &Mission) -> Result<u128, GuildError> {
        let recent = self.recent_assignments(agent, mission)?;
        Ok(agent.reputation.max(0) as u128 * FAIRNESS_SCALE / (1 + recent as u128))
    }

    /// Count of `agent`'s wins among the last [`FAIRNESS_WINDOW`] assignments
    /// that touched any of the mission's specialties.
    fn recent_assignments(&self, agent: &Agent, mission: &Mission) -> Result<usize, GuildError> {
        // Newest-first rows; keep only same-specialty assignments.
        let rows = self.db.recent_assignments(FAIRNESS_WINDOW * 4)?;
        let in_specialty = rows
            .into_iter()
            .filter(|r| r.specialties.iter().any(|s| mission.specialties.contains(s)))
            .take(FAIRNESS_WINDOW);
        Ok(in_specialty.filter(|r| r.agent_id == agent.agent_id).count())
    }

    // ── Bidding ──────────────────────────────────────────────────────────────

    /// Winner of a closed bidding window, or `NoBidders` when nothing valid
    /// was offered. Score = reputation / (price × eta), compared by
    /// cross-multiplication; ties go to (highest reputation, earliest bid).
    pub fn best_bid(&self, mission: &Mission) -> Result<Bid, GuildError> {
        let mut best: Option<(Bid, i64)> = None;

        for bid in &mission.bids {
            if bid.price == 0 || bid.price > mission.reward || bid.eta_secs == 0 {
                continue;
            }
            let Some(agent) = self.db.get_agent(&bid.bidder)? else {
                continue;
            };
            if !agent.active {
                continue;
            }

            match &best {
                None => best = Some((bid.clone(), agent.reputation)),
                Some((incumbent, incumbent_rep)) => {
                    if Self::bid_beats(
                        (agent.reputation, bid),
                        (*incumbent_rep, incumbent),
                    ) {
                        best = Some((bid.clone(), agent.reputation));
                    }
                }
            }
        }

        best.map(|(bid, _)| bid).ok_or(GuildError::NoBidders)
    }

    /// True iff bid `a` outranks bid `b`.
    fn bid_beats(a: (i64, &Bid), b: (i64, &Bid)) -> bool {
        let (rep_a, bid_a) = a;
        let (rep_b, bid_b) = b;

        // rep_a/(p_a·e_a) > rep_b/(p_b·e_b)  ⇔  rep_a·p_b·e_b > rep_b·p_a·e_a
        let lhs = (rep_a.max(0) as u128)
            .saturating_mul(bid_b.price)
            .saturating_mul(bid_b.eta_secs as u128);
        let rhs = (rep_b.max(0) as u128)
            .saturating_mul(bid_a.price)
            .saturating_mul(bid_a.eta_secs as u128);

        if lhs != rhs {
            return lhs > rhs;
        }
        // Tie-break: highest reputation, then earliest bid.
        if rep_a != rep_b {
            return rep_a > rep_b;
        }
        bid_a.submitted_at < bid_b.submitted_at
    }

    // ── Direct hire ──────────────────────────────────────────────────────────

    /// Validate a requester-specified worker against the same bar autopilot
    /// applies.
    pub fn direct_hire(&self, mission: &Mission, worker: &AgentId) -> Result<Agent, GuildError> {
        let agent = self
            .db
            .get_agent(worker)?
            .ok_or_else(|| GuildError::InvalidDirectHire(format!("unknown agent {worker}")))?;
        if !agent.active {
            return Err(GuildError::InvalidDirectHire("agent is deactivated".into()));
        }
        if agent.role != AgentRole::Worker {
            return Err(GuildError::InvalidDirectHire("agent is not a worker".into()));
        }
        if !agent.covers(&mission.specialties) {
            return Err(GuildError::InvalidDirectHire(
                "capabilities do not cover the mission specialties".into(),
            ));
        }
        if agent.reputation < REPUTATION_FLOOR {
            return Err(GuildError::InvalidDirectHire(format!(
                "reputation {} below floor {REPUTATION_FLOOR}",
                agent.reputation
            )));
        }
        Ok(agent)
    }

    // ── Verifier selection ───────────────────────────────────────────────────

    /// Pick `count` verifiers for a mission: capability match, fee within the
    /// per-verifier budget share, operator diversity (no two verifiers from
    /// the same `registered_by`), highest reputation first.
    pub fn select_verifiers(
        &self,
        mission: &Mission,
        count: usize,
        exclude: &[AgentId],
    ) -> Result<Vec<Agent>, GuildError> {
        let budget_share = mission.reward * VERIFIER_BUDGET_BPS / BPS / count.max(1) as u128;

        let mut pool: Vec<Agent> = self
            .db
            .iter_agents()?
            .into_iter()
            .filter(|a| {
                a.active
                    && a.role == AgentRole::Verifier
                    && a.covers(&mission.specialties)
                    && a.min_fee <= budget_share
                    && !exclude.contains(&a.agent_id)
            })
            .collect();
        pool.sort_by(|a, b| {
            b.reputation
                .cmp(&a.reputation)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });

        let mut picked: Vec<Agent> = Vec::with_capacity(count);
        let mut operators_seen: Vec<_> = Vec::new();
        // Existing verifiers keep their operator slots occupied.
        for id in exclude {
            if let Some(existing) = self.db.get_agent(id)? {
                operators_seen.push(existing.registered_by);
            }
        }
        for agent in pool {
            if picked.len() == count {
                break;
            }
            if operators_seen.contains(&agent.registered_by) {
                continue;
            }
            operators_seen.push(agent.registered_by);
            picked.push(agent);
        }

        if picked.len() < count {
            return Err(GuildError::NoEligibleAgents);
        }
        Ok(picked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildnet_core::mission::{AssignmentMode, MissionStatus, Requester, RiskTier};
    use guildnet_core::types::{Address, MissionId};
    use guildnet_core::NeuralSpec;
    use std::collections::BTreeSet;

    fn temp_db(name: &str) -> Arc<StateDb> {
        let dir = std::env::temp_dir().join(format!("guildnet_assign_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        Arc::new(StateDb::open(&dir).expect("open temp db"))
    }

    fn seed_agent(
        db: &StateDb,
        tag: u8,
        role: AgentRole,
        reputation: i64,
        capabilities: &[&str],
        operator: u8,
    ) -> Agent {
        let agent = Agent {
            agent_id: AgentId::from_bytes([tag; 32]),
            address: Address::from_bytes([tag; 20]),
            role,
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
            min_fee: 0,
            min_bond: 0,
            reputation,
            active: true,
            registered_by: Address::from_bytes([operator; 20]),
            neural_spec: NeuralSpec(serde_json::json!({
                "model": "m", "context_window": 1, "max_concurrency": 1
            })),
            api_key_hash: [0u8; 32],
            registered_at: 0,
        };
        db.put_agent(&agent).unwrap();
        agent
    }

    fn mission(tag: u8, reward: u128, specialties: &[&str]) -> Mission {
        Mission {
            mission_id: MissionId::from_bytes([tag; 32]),
            requester: Requester::External(Address::from_bytes([0xEE; 20])),
            objective: "test".into(),
            reward,
            deadline: 10_000,
            specialties: specialties.iter().map(|s| s.to_string()).collect(),
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
            chain_ref: None,
        }
    }

    fn bid(tag: u8, price: u128, eta_secs: u64, submitted_at: i64) -> Bid {
        Bid {
            bidder: AgentId::from_bytes([tag; 32]),
            price,
            eta_secs,
            bond_pledge: 0,
            submitted_at,
        }
    }

    #[test]
    fn filter_excludes_wrong_capability_and_low_reputation() {
        let db = temp_db("filter");
        seed_agent(&db, 1, AgentRole::Worker, 80, &["rust"], 1);
        seed_agent(&db, 2, AgentRole::Worker, 80, &["python"], 2);
        seed_agent(&db, 3, AgentRole::Worker, 10, &["rust"], 3);
        seed_agent(&db, 4, AgentRole::Verifier, 90, &["rust"], 4);

        let engine = AssignmentEngine::new(db);
        let m = mission(9, 50, &["rust"]);
        let workers = engine.eligible_workers(&m).unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].agent_id, AgentId::from_bytes([1u8; 32]));
    }

    #[test]
    fn floor_relaxes_once_then_fails() {
        let db = temp_db("relax");
        // Reputation 25 fails the floor of 30 but passes the relaxed 20.
        seed_agent(&db, 1, AgentRole::Worker, 25, &["rust"], 1);
        let engine = AssignmentEngine::new(db.clone());
        assert!(engine.eligible_workers(&mission(9, 50, &["rust"])).is_ok());

        // Reputation 15 fails both bars.
        let db2 = temp_db("relax_fail");
        seed_agent(&db2, 1, AgentRole::Worker, 15, &["rust"], 1);
        let engine2 = AssignmentEngine::new(db2);
        assert!(matches!(
            engine2.eligible_workers(&mission(9, 50, &["rust"])).unwrap_err(),
            GuildError::NoEligibleAgents
        ));
    }

    #[test]
    fn autopilot_is_deterministic_for_a_mission() {
        let db = temp_db("autopilot_det");
        for tag in 1..=5 {
            seed_agent(&db, tag, AgentRole::Worker, 50 + tag as i64, &["rust"], tag);
        }
        let engine = AssignmentEngine::new(db);
        let m = mission(7, 50, &["rust"]);
        let first = engine.autopilot(&m).unwrap();
        for _ in 0..5 {
            assert_eq!(engine.autopilot(&m).unwrap().agent_id, first.agent_id);
        }
    }

    #[test]
    fn bidding_winner_maximises_score() {
        let db = temp_db("bids");
        seed_agent(&db, 1, AgentRole::Worker, 70, &["rust"], 1);
        seed_agent(&db, 2, AgentRole::Worker, 70, &["rust"], 2);
        let engine = AssignmentEngine::new(db);

        let mut m = mission(9, 500, &["rust"]);
        // Same reputation; bidder 2 is cheaper → higher score.
        m.bids = vec![bid(1, 400, 3_600, 10), bid(2, 200, 3_600, 20)];
        let winner = engine.best_bid(&m).unwrap();
        assert_eq!(winner.bidder, AgentId::from_bytes([2u8; 32]));
    }

    #[test]
    fn bidding_tie_breaks_on_earliest_bid() {
        let db = temp_db("bid_tie");
        seed_agent(&db, 1, AgentRole::Worker, 70, &["rust"], 1);
        seed_agent(&db, 2, AgentRole::Worker, 70, &["rust"], 2);
        let engine = AssignmentEngine::new(db);

        let mut m = mission(9, 500, &["rust"]);
        m.bids = vec![bid(2, 500, 3_600, 25), bid(1, 500, 3_600, 10)];
        let winner = engine.best_bid(&m).unwrap();
        assert_eq!(winner.bidder, AgentId::from_bytes([1u8; 32]));
        assert_eq!(winner.submitted_at, 10);
    }

    #[test]
    fn bidding_rejects_overpriced_and_empty() {
        let db = temp_db("bid_invalid");
        seed_agent(&db, 1, AgentRole::Worker, 70, &["rust"], 1);
        let engine = AssignmentEngine::new(db);

        let mut m = mission(9, 500, &["rust"]);
        m.bids = vec![bid(1, 501, 3_600, 10)]; // above reward
        assert!(matches!(
            engine.best_bid(&m).unwrap_err(),
            GuildError::NoBidders
        ));
    }

    #[test]
    fn direct_hire_validates_capability() {
        let db = temp_db("direct");
        seed_agent(&db, 1, AgentRole::Worker, 80, &["python"], 1);
        let engine = AssignmentEngine::new(db);
        let err = engine
            .direct_hire(&mission(9, 50, &["rust"]), &AgentId::from_bytes([1u8; 32]))
            .unwrap_err();
        assert!(matches!(err, GuildError::InvalidDirectHire(_)));
    }

    #[test]
    fn verifier_selection_enforces_operator_diversity() {
        let db = temp_db("verifier_div");
        // Three verifiers, two sharing an operator.
        seed_agent(&db, 1, AgentRole::Verifier, 90, &["rust"], 1);
        seed_agent(&db, 2, AgentRole::Verifier, 85, &["rust"], 1);
        seed_agent(&db, 3, AgentRole::Verifier, 60, &["rust"], 2);
        let engine = AssignmentEngine::new(db);

        let picked = engine
            .select_verifiers(&mission(9, 100, &["rust"]), 2, &[])
            .unwrap();
        let operators: BTreeSet<_> = picked.iter().map(|a| a.registered_by).collect();
        assert_eq!(operators.len(), 2, "no shared operator");
        // Highest-reputation pick from each operator.
        assert_eq!(picked[0].agent_id, AgentId::from_bytes([1u8; 32]));
        assert_eq!(picked[1].agent_id, AgentId::from_bytes([3u8; 32]));
    }

    #[test]
    fn verifier_selection_excludes_expensive_fees() {
        let db = temp_db("verifier_fee");
        let mut pricey = seed_agent(&db, 1, AgentRole::Verifier, 90, &["rust"], 1);
        pricey.min_fee = 1_000; // budget share for reward 100 at 5% is 5
        db.put_agent(&pricey).unwrap();
        seed_agent(&db, 2, AgentRole::Verifier, 60, &["rust"], 2);
        let engine = AssignmentEngine::new(db);

        let picked = engine
            .select_verifiers(&mission(9, 100, &["rust"]), 1, &[])
            .unwrap();
        assert_eq!(picked[0].agent_id, AgentId::from_bytes([2u8; 32]));
    }
}
