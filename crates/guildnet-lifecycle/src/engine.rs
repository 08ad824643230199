//! The mission lifecycle engine.
//!
//! Owns every status transition:
//!
//! `posted → (bidding_open) → assigned → executing → verifying → settled | failed`
//!
//! plus the bounded `verifying → executing` revision loop. All transitions
//! for one mission are linearised through a mission-keyed lock; transitions
//! for different missions run independently. Observable side effects are
//! confined to the ledger (escrow/bonds), the dispatch queue, and the
//! append-only outcome log, so any mission's history can be re-derived from
//! those records.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use guildnet_consensus::{evaluate, ConsensusOutcome};
use guildnet_core::clock::Clock;
use guildnet_core::config::Config;
use guildnet_core::constants::{DISPATCH_TTL_SECS, MAX_REVISIONS};
use guildnet_core::error::GuildError;
use guildnet_core::mission::{
    Artifact, AssignmentMode, Bid, FailReason, Mission, MissionStatus, Requester, RiskTier,
};
use guildnet_core::records::{BondRole, JobOutcome, LockState, OutcomeKind, Priority, Verdict, Vote};
use guildnet_core::types::{Address, AgentId, Amount, MissionId, Timestamp};
use guildnet_core::{Agent, AgentRole, NeuralSpec};
use guildnet_crypto::hash::{agent_id_from_address, blake3_hash};
use guildnet_market::{AssignmentEngine, DispatchQueue};
use guildnet_state::{KeyedLocks, Ledger, StateDb};

use crate::bonds::BondManager;
use crate::escrow::EscrowEngine;
use crate::settlement::SettlementEngine;

/// Parameters for `create`.
#[derive(Clone, Debug)]
pub struct CreateMission {
    pub requester: Requester,
    pub objective: String,
    pub reward: Amount,
    pub deadline: Timestamp,
    pub specialties: BTreeSet<String>,
    pub risk: RiskTier,
    /// Requester-specified worker; bypasses selection.
    pub direct_hire: Option<AgentId>,
    /// Parent mission for crew subtasks.
    pub parent: Option<MissionId>,
}

pub struct MissionEngine {
    db: Arc<StateDb>,
    ledger: Ledger,
    bonds: BondManager,
    escrow: EscrowEngine,
    settlement: SettlementEngine,
    assignment: AssignmentEngine,
    dispatch: DispatchQueue,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
    cfg: Config,
}

impl MissionEngine {
    pub fn new(db: Arc<StateDb>, clock: Arc<dyn Clock>, cfg: Config) -> Self {
        let ledger = Ledger::new(Arc::clone(&db));
        Self {
            bonds: BondManager::new(ledger.clone()),
            escrow: EscrowEngine::new(ledger.clone()),
            settlement: SettlementEngine::new(Arc::clone(&db), ledger.clone(), cfg.fail_slash_bps),
            assignment: AssignmentEngine::new(Arc::clone(&db)),
            dispatch: DispatchQueue::new(Arc::clone(&db), Arc::clone(&clock)),
            locks: KeyedLocks::new(),
            db,
            ledger,
            clock,
            cfg,
        }
    }

    pub fn db(&self) -> &Arc<StateDb> {
        &self.db
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn dispatch(&self) -> &DispatchQueue {
        &self.dispatch
    }

    // ── Agent directory ──────────────────────────────────────────────────────

    /// Register a new agent and issue its bearer API key. The key is returned
    /// exactly once; only its BLAKE3 hash is stored.
    #[allow(clippy::too_many_arguments)]
    pub fn register_agent(
        &self,
        address: Address,
        role: AgentRole,
        capabilities: BTreeSet<String>,
        min_fee: Amount,
        min_bond: Amount,
        registered_by: Address,
        neural_spec: NeuralSpec,
    ) -> Result<(Agent, String), GuildError> {
        neural_spec.validate()?;
        let agent_id = agent_id_from_address(&address);
        if self.db.get_agent(&agent_id)?.is_some() {
            return Err(GuildError::ConflictingClaim(format!(
                "agent already registered for {address}"
            )));
        }

        let key_bytes: [u8; 32] = rand::random();
        let api_key = bs58::encode(key_bytes).into_string();
        let agent = Agent {
            agent_id,
            address,
            role,
            capabilities,
            min_fee,
            min_bond,
            reputation: guildnet_core::constants::REPUTATION_BASE,
            active: true,
            registered_by,
            neural_spec,
            api_key_hash: blake3_hash(api_key.as_bytes()),
            registered_at: self.clock.now(),
        };
        self.db.put_agent(&agent)?;
        info!(agent = %agent.agent_id, role = role.as_str(), "agent registered");
        Ok((agent, api_key))
    }

    /// Resolve a bearer API key to its agent, or `Unauthorized`.
    pub fn authenticate(&self, api_key: &str) -> Result<Agent, GuildError> {
        let hash = blake3_hash(api_key.as_bytes());
        match self.db.get_agent_by_key_hash(&hash)? {
            Some(agent) if agent.active => Ok(agent),
            Some(_) => Err(GuildError::AgentInactive),
            None => Err(GuildError::Unauthorized),
        }
    }

    /// Deactivate or reactivate an agent. Agents are never deleted.
    pub fn set_agent_active(&self, agent_id: &AgentId, active: bool) -> Result<Agent, GuildError> {
        let mut agent = self
            .db
            .get_agent(agent_id)?
            .ok_or_else(|| GuildError::UnknownAgent(agent_id.to_hex()))?;
        agent.active = active;
        self.db.put_agent(&agent)?;
        Ok(agent)
    }

    // ── create ───────────────────────────────────────────────────────────────

    /// Create a mission and lock its escrow. The mission lands in `posted`;
    /// callers follow with `assign` or `open_bidding`.
    pub fn create(&self, params: CreateMission) -> Result<Mission, GuildError> {
        let now = self.clock.now();

        if params.objective.trim().is_empty() {
            return Err(GuildError::InvalidInput("objective must not be empty".into()));
        }
        if params.reward == 0 {
            return Err(GuildError::InvalidInput("reward must be positive".into()));
        }
        if params.deadline <= now {
            return Err(GuildError::InvalidInput("deadline must be in the future".into()));
        }
        if let Some(parent) = &params.parent {
            let parent_mission = self
                .db
                .get_mission(parent)?
                .ok_or_else(|| GuildError::UnknownMission(parent.to_hex()))?;
            if parent_mission.status.is_terminal() {
                return Err(GuildError::InvalidState {
                    expected: "non-terminal parent",
                    actual: parent_mission.status.as_str().to_string(),
                });
            }
        }

        let mode = match params.direct_hire {
            Some(worker) => AssignmentMode::DirectHire { worker },
            None if params.reward >= self.cfg.bidding_threshold => AssignmentMode::Bidding,
            None => AssignmentMode::Autopilot,
        };

        let owner = params.requester.owner_id();
        let seq = self.db.next_seq("next_mission_seq")?;
        let mission_id = derive_mission_id(&owner, &params.objective, params.reward, now, seq);

        self.escrow.lock(&owner, &mission_id, params.reward, now)?;

        let mission = Mission {
            mission_id,
            requester: params.requester,
            objective: params.objective,
            reward: params.reward,
            deadline: params.deadline,
            specialties: params.specialties,
            risk: params.risk,
            required_verifiers: params.risk.required_verifiers(),
            mode,
            status: MissionStatus::Posted { at: now },
            created_at: now,
            assigned_worker: None,
            assigned_verifiers: Vec::new(),
            bids: Vec::new(),
            artifacts: Vec::new(),
            revision_count: 0,
            rating: None,
            parent: params.parent,
            chain_ref: None,
        };
        self.db.put_mission(&mission)?;
        info!(mission = %mission_id, reward = mission.reward, mode = ?mission.mode, "mission created");
        Ok(mission)
    }

    // ── bidding ──────────────────────────────────────────────────────────────

    /// `posted → bidding_open`. Only missions at or above the bidding
    /// threshold qualify.
    pub fn open_bidding(&self, mission_id: &MissionId) -> Result<Mission, GuildError> {
        let lock = self.locks.lock_for(mission_id.as_bytes());
        let _guard = lock.lock().unwrap();
        let now = self.clock.now();
        let mut mission = self.load(mission_id)?;

        expect_status(&mission, "posted", |s| matches!(s, MissionStatus::Posted { .. }))?;
        if mission.mode != AssignmentMode::Bidding {
            return Err(GuildError::InvalidState {
                expected: "bidding mode",
                actual: format!("{:?}", mission.mode),
            });
        }

        mission.status = MissionStatus::BiddingOpen {
            at: now,
            closes_at: now + self.cfg.bidding_window_secs,
        };
        self.db.put_mission(&mission)?;
        info!(mission = %mission_id, closes_at = now + self.cfg.bidding_window_secs, "bidding opened");
        Ok(mission)
    }

    /// Record a bid inside the window. A bid arriving at exactly the close
    /// time is included; anything later is rejected. A bidder re-bidding
    /// replaces its earlier offer.
    pub fn place_bid(
        &self,
        mission_id: &MissionId,
        bidder: &AgentId,
        price: Amount,
        eta_secs: u64,
        bond_pledge: Amount,
    ) -> Result<Mission, GuildError> {
        let lock = self.locks.lock_for(mission_id.as_bytes());
        let _guard = lock.lock().unwrap();
        let now = self.clock.now();
        let mut mission = self.load(mission_id)?;

        let closes_at = match mission.status {
            MissionStatus::BiddingOpen { closes_at, .. } => closes_at,
            _ => {
                return Err(GuildError::InvalidState {
                    expected: "bidding_open",
                    actual: mission.status.as_str().to_string(),
                })
            }
        };
        if now > closes_at {
            return Err(GuildError::InvalidState {
                expected: "bidding_open",
                actual: "bidding window closed".to_string(),
            });
        }

        let agent = self
            .db
            .get_agent(bidder)?
            .ok_or_else(|| GuildError::UnknownAgent(bidder.to_hex()))?;
        if !agent.active {
            return Err(GuildError::AgentInactive);
        }
        if agent.role != AgentRole::Worker {
            return Err(GuildError::Forbidden("verifier"));
        }
        if !agent.covers(&mission.specialties) {
            return Err(GuildError::InvalidInput(
                "capabilities do not cover the mission specialties".into(),
            ));
        }
        if agent.reputation < guildnet_core::constants::REPUTATION_FLOOR {
            return Err(GuildError::InvalidInput(format!(
                "reputation {} below the assignment floor",
                agent.reputation
            )));
        }
        if price == 0 || price > mission.reward {
            return Err(GuildError::InvalidInput(format!(
                "bid price must be in 1..={}",
                mission.reward
            )));
        }
        if eta_secs == 0 {
            return Err(GuildError::InvalidInput("eta must be positive".into()));
        }

        mission.bids.retain(|b| b.bidder != *bidder);
        mission.bids.push(Bid {
            bidder: *bidder,
            price,
            eta_secs,
            bond_pledge,
            submitted_at: now,
        });
        self.db.put_mission(&mission)?;
        Ok(mission)
    }

    /// `bidding_open → assigned` through the best bid, or
    /// `failed(no_bidders)` when nothing valid arrived.
    pub fn close_bidding(&self, mission_id: &MissionId) -> Result<Mission, GuildError> {
        let lock = self.locks.lock_for(mission_id.as_bytes());
        let _guard = lock.lock().unwrap();
        let now = self.clock.now();
        let mut mission = self.load(mission_id)?;

        let closes_at = match mission.status {
            MissionStatus::BiddingOpen { closes_at, .. } => closes_at,
            _ => {
                return Err(GuildError::InvalidState {
                    expected: "bidding_open",
                    actual: mission.status.as_str().to_string(),
                })
            }
        };
        if now <= closes_at {
            return Err(GuildError::InvalidState {
                expected: "bidding window elapsed",
                actual: format!("closes at {closes_at}"),
            });
        }

        match self.assignment.best_bid(&mission) {
            Ok(winning) => {
                self.record_assignment(&mut mission, winning.bidder, now)?;
                self.db.put_mission(&mission)?;
                info!(mission = %mission_id, worker = %winning.bidder, price = winning.price, "bidding closed");
                Ok(mission)
            }
            Err(GuildError::NoBidders) => {
                self.fail_mission(&mut mission, FailReason::NoBidders, now)?;
                Err(GuildError::NoBidders)
            }
            Err(e) => Err(e),
        }
    }

    // ── assign ───────────────────────────────────────────────────────────────

    /// `posted → assigned` via autopilot or direct hire.
    pub fn assign(&self, mission_id: &MissionId) -> Result<Mission, GuildError> {
        let lock = self.locks.lock_for(mission_id.as_bytes());
        let _guard = lock.lock().unwrap();
        let now = self.clock.now();
        let mut mission = self.load(mission_id)?;

        expect_status(&mission, "posted", |s| matches!(s, MissionStatus::Posted { .. }))?;

        let worker = match &mission.mode {
            AssignmentMode::Autopilot => match self.assignment.autopilot(&mission) {
                Ok(agent) => agent.agent_id,
                Err(GuildError::NoEligibleAgents) => {
                    self.fail_mission(&mut mission, FailReason::NoEligibleAgents, now)?;
                    return Err(GuildError::NoEligibleAgents);
                }
                Err(e) => return Err(e),
            },
            AssignmentMode::DirectHire { worker } => {
                self.assignment.direct_hire(&mission, worker)?.agent_id
            }
            AssignmentMode::Bidding => {
                return Err(GuildError::InvalidState {
                    expected: "autopilot or direct_hire mode",
                    actual: "bidding".to_string(),
                })
            }
        };

        self.record_assignment(&mut mission, worker, now)?;
        self.db.put_mission(&mission)?;
        info!(mission = %mission_id, worker = %worker, "mission assigned");
        Ok(mission)
    }

    fn record_assignment(
        &self,
        mission: &mut Mission,
        worker: AgentId,
        now: Timestamp,
    ) -> Result<(), GuildError> {
        mission.assigned_worker = Some(worker);
        mission.status = MissionStatus::Assigned { at: now };
        self.db.append_assignment(&guildnet_state::db::AssignmentRow {
            agent_id: worker,
            mission_id: mission.mission_id,
            specialties: mission.specialties.iter().cloned().collect(),
            at: now,
        })?;
        self.notify(
            &worker,
            serde_json::json!({
                "type": "mission_assigned",
                "mission_id": mission.mission_id.to_hex(),
                "reward": mission.reward.to_string(),
                "deadline": mission.deadline,
            }),
            Priority::High,
        )
    }

    // ── start ────────────────────────────────────────────────────────────────

    /// `assigned → executing`. Only the assigned worker may start; its bond
    /// is staked here and the verifier panel is chosen.
    pub fn start(&self, mission_id: &MissionId, caller: &AgentId) -> Result<Mission, GuildError> {
        let lock = self.locks.lock_for(mission_id.as_bytes());
        let _guard = lock.lock().unwrap();
        let now = self.clock.now();
        let mut mission = self.load(mission_id)?;

        expect_status(&mission, "assigned", |s| {
            matches!(s, MissionStatus::Assigned { .. })
        })?;
        if mission.assigned_worker != Some(*caller) {
            return Err(GuildError::NotAssigned { role: "worker" });
        }
        if now > mission.deadline {
            return Err(GuildError::DeadlineExpired);
        }

        // Verifier selection is read-only; run it before staking so a
        // selection failure leaves the ledger untouched.
        let verifiers =
            self.assignment
                .select_verifiers(&mission, mission.required_verifiers, &[*caller])?;

        self.bonds.stake(
            caller,
            mission_id,
            BondRole::Worker,
            mission.reward,
            now,
        )?;

        mission.assigned_verifiers = verifiers.iter().map(|a| a.agent_id).collect();
        mission.status = MissionStatus::Executing { at: now };
        self.db.put_mission(&mission)?;
        info!(mission = %mission_id, verifiers = mission.assigned_verifiers.len(), "mission started");
        Ok(mission)
    }

    // ── submit ───────────────────────────────────────────────────────────────

    /// `executing → verifying`. Requires at least one artifact; each assigned
    /// verifier is notified through its dispatch queue.
    pub fn submit(
        &self,
        mission_id: &MissionId,
        caller: &AgentId,
        artifacts: Vec<([u8; 32], u64)>,
    ) -> Result<Mission, GuildError> {
        let lock = self.locks.lock_for(mission_id.as_bytes());
        let _guard = lock.lock().unwrap();
        let now = self.clock.now();
        let mut mission = self.load(mission_id)?;

        expect_status(&mission, "executing", |s| {
            matches!(s, MissionStatus::Executing { .. })
        })?;
        if mission.assigned_worker != Some(*caller) {
            return Err(GuildError::NotAssigned { role: "worker" });
        }
        if artifacts.is_empty() {
            return Err(GuildError::MissingArtifact);
        }

        for (digest, size) in artifacts {
            mission.artifacts.push(Artifact {
                digest,
                size,
                submitter: *caller,
            });
        }
        mission.status = MissionStatus::Verifying { at: now };
        self.db.put_mission(&mission)?;

        for verifier in mission.assigned_verifiers.clone() {
            self.notify(
                &verifier,
                serde_json::json!({
                    "type": "verification_requested",
                    "mission_id": mission.mission_id.to_hex(),
                }),
                Priority::High,
            )?;
        }
        info!(mission = %mission_id, artifacts = mission.artifacts.len(), "work submitted");
        Ok(mission)
    }

    // ── vote ─────────────────────────────────────────────────────────────────

    /// Record a verifier's verdict. The verifier's bond is staked with its
    /// first vote. When the panel completes, the consensus decision either
    /// settles the mission or upgrades a 2-verifier split to a 3-verifier
    /// panel.
    pub fn vote(
        &self,
        mission_id: &MissionId,
        verifier: &AgentId,
        verdict: Verdict,
        reason: String,
    ) -> Result<Mission, GuildError> {
        let lock = self.locks.lock_for(mission_id.as_bytes());
        let _guard = lock.lock().unwrap();
        let now = self.clock.now();
        let mut mission = self.load(mission_id)?;

        expect_status(&mission, "verifying", |s| {
            matches!(s, MissionStatus::Verifying { .. })
        })?;
        if !mission.assigned_verifiers.contains(verifier) {
            return Err(GuildError::NotAssigned { role: "verifier" });
        }
        if self.db.get_vote(mission_id, verifier)?.is_some() {
            return Err(GuildError::DuplicateVote);
        }

        // Bond rides with the vote: stake unless an active bond already
        // exists from an earlier verification round.
        let existing = self.db.get_bond(mission_id, BondRole::Verifier, verifier)?;
        if !matches!(existing, Some(b) if b.state == LockState::Locked) {
            self.bonds.stake(
                verifier,
                mission_id,
                BondRole::Verifier,
                mission.reward,
                now,
            )?;
        }

        self.db.put_vote(&Vote {
            mission_id: *mission_id,
            verifier_id: *verifier,
            verdict,
            reason,
            at: now,
        })?;

        let votes = self.db.iter_votes_for_mission(mission_id)?;
        let Some(decision) = evaluate(&votes, mission.required_verifiers) else {
            return Ok(mission);
        };

        if decision.outcome == ConsensusOutcome::Dispute {
            self.upgrade_panel(&mut mission, now)?;
            return Ok(mission);
        }

        match self.settlement.settle(&mut mission, &decision, now) {
            Ok(()) => Ok(mission),
            // A crew parent with open subtasks keeps its quorum parked; the
            // sweeper retries once the subtasks are terminal.
            Err(GuildError::InvalidState { expected, .. })
                if expected == "all subtasks terminal" =>
            {
                warn!(mission = %mission.mission_id, "quorum reached; settlement parked on open subtasks");
                Ok(mission)
            }
            Err(e) => Err(e),
        }
    }

    /// 2-verifier split: grow the panel to 3 and bring in one fresh
    /// verifier. Existing votes stay.
    fn upgrade_panel(&self, mission: &mut Mission, now: Timestamp) -> Result<(), GuildError> {
        mission.required_verifiers = 3;
        let mut exclude = mission.assigned_verifiers.clone();
        if let Some(worker) = mission.assigned_worker {
            exclude.push(worker);
        }
        match self.assignment.select_verifiers(mission, 1, &exclude) {
            Ok(extra) => {
                let new_verifier = extra[0].agent_id;
                mission.assigned_verifiers.push(new_verifier);
                self.db.put_mission(mission)?;
                self.notify(
                    &new_verifier,
                    serde_json::json!({
                        "type": "verification_requested",
                        "mission_id": mission.mission_id.to_hex(),
                        "tiebreak": true,
                    }),
                    Priority::High,
                )?;
                info!(mission = %mission.mission_id, verifier = %new_verifier, "split verdict; panel upgraded to 3");
                Ok(())
            }
            Err(GuildError::NoEligibleAgents) => {
                // No third verifier available right now. The mission stays in
                // verifying at quorum 3; the deadline sweep bounds how long.
                self.db.put_mission(mission)?;
                warn!(mission = %mission.mission_id, "split verdict but no third verifier available");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ── revise ───────────────────────────────────────────────────────────────

    /// `verifying → executing` on requester feedback, at most
    /// [`MAX_REVISIONS`] times. Votes are cleared and voter bonds released;
    /// they re-stake when the new round of votes arrives.
    pub fn revise(
        &self,
        mission_id: &MissionId,
        caller: &Requester,
        feedback: String,
    ) -> Result<Mission, GuildError> {
        let lock = self.locks.lock_for(mission_id.as_bytes());
        let _guard = lock.lock().unwrap();
        let now = self.clock.now();
        let mut mission = self.load(mission_id)?;

        expect_status(&mission, "verifying", |s| {
            matches!(s, MissionStatus::Verifying { .. })
        })?;
        if mission.requester != *caller {
            return Err(GuildError::Forbidden("requester"));
        }
        if mission.revision_count >= MAX_REVISIONS {
            return Err(GuildError::RevisionLimit { max: MAX_REVISIONS });
        }

        for vote in self.db.iter_votes_for_mission(mission_id)? {
            self.bonds
                .release(mission_id, BondRole::Verifier, &vote.verifier_id, now)?;
        }
        self.db.clear_votes_for_mission(mission_id)?;

        mission.revision_count += 1;
        mission.status = MissionStatus::Executing { at: now };
        self.db.put_mission(&mission)?;

        if let Some(worker) = mission.assigned_worker {
            self.notify(
                &worker,
                serde_json::json!({
                    "type": "revision_requested",
                    "mission_id": mission.mission_id.to_hex(),
                    "feedback": feedback,
                    "revision": mission.revision_count,
                }),
                Priority::High,
            )?;
        }
        info!(mission = %mission_id, revision = mission.revision_count, "revision requested");
        Ok(mission)
    }

    /// Record the requester's 1–5 rating; must land before settlement.
    pub fn rate(
        &self,
        mission_id: &MissionId,
        caller: &Requester,
        rating: u8,
    ) -> Result<Mission, GuildError> {
        let lock = self.locks.lock_for(mission_id.as_bytes());
        let _guard = lock.lock().unwrap();
        let mut mission = self.load(mission_id)?;

        if mission.requester != *caller {
            return Err(GuildError::Forbidden("requester"));
        }
        if !(1..=5).contains(&rating) {
            return Err(GuildError::InvalidInput("rating must be 1..=5".into()));
        }
        if mission.status.is_terminal() {
            return Err(GuildError::InvalidState {
                expected: "pre-settlement",
                actual: mission.status.as_str().to_string(),
            });
        }
        mission.rating = Some(rating);
        self.db.put_mission(&mission)?;
        Ok(mission)
    }

    // ── expiry ───────────────────────────────────────────────────────────────

    /// Force a mission past its deadline into `failed(deadline_expired)`,
    /// slashing according to the phase: an active worker bond is slashed,
    /// voter bonds are released, and the escrow returns to the requester.
    pub fn expire(&self, mission_id: &MissionId) -> Result<Mission, GuildError> {
        let lock = self.locks.lock_for(mission_id.as_bytes());
        let _guard = lock.lock().unwrap();
        let now = self.clock.now();
        let mut mission = self.load(mission_id)?;

        if mission.status.is_terminal() {
            return Ok(mission);
        }
        if now <= mission.deadline {
            return Err(GuildError::InvalidState {
                expected: "past deadline",
                actual: format!("deadline {}", mission.deadline),
            });
        }

        // Slash the worker if it was mid-flight.
        if let Some(worker) = mission.assigned_worker {
            let bond = self.db.get_bond(mission_id, BondRole::Worker, &worker)?;
            if matches!(bond, Some(b) if b.state == LockState::Locked) {
                let slashed = self.bonds.slash(
                    mission_id,
                    BondRole::Worker,
                    &worker,
                    self.cfg.fail_slash_bps,
                    now,
                )?;
                self.db.put_outcome(&JobOutcome {
                    agent_id: worker,
                    mission_id: *mission_id,
                    role: BondRole::Worker,
                    outcome: OutcomeKind::Fail,
                    reward_earned: 0,
                    bond_slashed: slashed,
                    rating: None,
                    at: now,
                })?;
                if let Some(mut agent) = self.db.get_agent(&worker)? {
                    let outcomes = self.db.iter_outcomes_for_agent(&worker)?;
                    agent.reputation = guildnet_consensus::reputation(&outcomes).score;
                    self.db.put_agent(&agent)?;
                }
            }
        }

        self.fail_mission(&mut mission, FailReason::DeadlineExpired, now)?;
        info!(mission = %mission_id, "mission expired");
        Ok(mission)
    }

    /// One pass of the deadline sweep. Also closes elapsed bidding windows.
    /// Returns how many missions reached a terminal state.
    pub fn sweep(&self) -> Result<usize, GuildError> {
        let now = self.clock.now();
        let mut swept = 0;

        for mission in self.db.iter_missions()? {
            if mission.status.is_terminal() {
                continue;
            }
            if now > mission.deadline {
                match self.expire(&mission.mission_id) {
                    Ok(_) => swept += 1,
                    Err(e) => warn!(mission = %mission.mission_id, error = %e, "expiry failed"),
                }
                continue;
            }
            match mission.status {
                MissionStatus::BiddingOpen { closes_at, .. } if now > closes_at => {
                    match self.close_bidding(&mission.mission_id) {
                        Ok(_) => {}
                        Err(GuildError::NoBidders) => swept += 1,
                        Err(e) => {
                            warn!(mission = %mission.mission_id, error = %e, "bid close failed")
                        }
                    }
                }
                // A quorum may already exist but settlement was parked (e.g.
                // a crew parent waiting on subtasks); retry it here.
                MissionStatus::Verifying { .. } => {
                    match self.try_settle(&mission.mission_id) {
                        Ok(true) => swept += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(mission = %mission.mission_id, error = %e, "parked settlement failed")
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(swept)
    }

    /// Settle a verifying mission whose quorum is already complete. Returns
    /// false when there is no decisive quorum or settlement must keep
    /// waiting.
    fn try_settle(&self, mission_id: &MissionId) -> Result<bool, GuildError> {
        let lock = self.locks.lock_for(mission_id.as_bytes());
        let _guard = lock.lock().unwrap();
        let now = self.clock.now();
        let mut mission = self.load(mission_id)?;

        if !matches!(mission.status, MissionStatus::Verifying { .. }) {
            return Ok(false);
        }
        let votes = self.db.iter_votes_for_mission(mission_id)?;
        let Some(decision) = evaluate(&votes, mission.required_verifiers) else {
            return Ok(false);
        };
        if decision.outcome == ConsensusOutcome::Dispute {
            return Ok(false);
        }
        match self.settlement.settle(&mut mission, &decision, now) {
            Ok(()) => Ok(true),
            Err(GuildError::InvalidState { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ── shared helpers ───────────────────────────────────────────────────────

    /// Terminalise a mission as failed: refund escrow, release any bonds
    /// still locked, drop votes.
    fn fail_mission(
        &self,
        mission: &mut Mission,
        reason: FailReason,
        now: Timestamp,
    ) -> Result<(), GuildError> {
        for bond in self.db.iter_bonds_for_mission(&mission.mission_id)? {
            if bond.state == LockState::Locked {
                self.bonds
                    .release(&mission.mission_id, bond.role, &bond.agent_id, now)?;
            }
        }
        self.escrow.refund(mission, now)?;
        self.db.clear_votes_for_mission(&mission.mission_id)?;
        mission.status = MissionStatus::Failed { at: now, reason };
        self.db.put_mission(mission)
    }

    fn notify(
        &self,
        agent: &AgentId,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<(), GuildError> {
        self.dispatch
            .enqueue(agent, payload, priority, DISPATCH_TTL_SECS)?;
        Ok(())
    }

    fn load(&self, mission_id: &MissionId) -> Result<Mission, GuildError> {
        self.db
            .get_mission(mission_id)?
            .ok_or_else(|| GuildError::UnknownMission(mission_id.to_hex()))
    }
}

fn expect_status(
    mission: &Mission,
    expected: &'static str,
    check: impl Fn(&MissionStatus) -> bool,
) -> Result<(), GuildError> {
    if check(&mission.status) {
        Ok(())
    } else {
        Err(GuildError::InvalidState {
            expected,
            actual: mission.status.as_str().to_string(),
        })
    }
}

fn derive_mission_id(
    owner: &AgentId,
    objective: &str,
    reward: Amount,
    now: Timestamp,
    seq: u64,
) -> MissionId {
    let mut bytes = owner.as_bytes().to_vec();
    bytes.extend_from_slice(objective.as_bytes());
    bytes.extend_from_slice(&reward.to_be_bytes());
    bytes.extend_from_slice(&now.to_be_bytes());
    bytes.extend_from_slice(&seq.to_be_bytes());
    MissionId::from_bytes(blake3_hash(&bytes))
}
