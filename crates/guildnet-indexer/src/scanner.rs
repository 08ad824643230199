//! Per-stream chain scanner.
//!
//! Each stream (agent registry, mission manager) runs as an independent
//! worker that owns its cursor: scan a bounded block window, decode and
//! apply every log idempotently, then advance the cursor — never past an
//! unprocessed log. Transient RPC failures retry with capped exponential
//! backoff; ABI drift stops the stream loudly while the rest of the process
//! keeps running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use guildnet_core::clock::Clock;
use guildnet_core::constants::{
    LOG_RANGE_BLOCKS, POLL_INTERVAL_SECS, RETRY_BACKOFF_CAP_SECS, RETRY_MAX_ATTEMPTS,
    SAFE_LOOKBACK_BLOCKS, TREASURY,
};
use guildnet_core::error::GuildError;
use guildnet_core::mission::{
    AssignmentMode, FailReason, Mission, MissionStatus, Requester, RiskTier,
};
use guildnet_core::records::{BondRole, ChainEventCursor, LockState, ReputationHistoryRow};
use guildnet_core::types::{Address, Amount, BlockNumber, MissionId, TxHash};
use guildnet_core::{Agent, AgentRole, NeuralSpec};
use guildnet_crypto::hash::{agent_id_from_address, blake3_hash};
use guildnet_state::{Ledger, StateDb};

use crate::client::{ChainRpc, RawLog};
use crate::events::{decode_log, decode_objective_from_input, ChainEvent, OBJECTIVE_UNAVAILABLE};

/// The two event streams the indexer mirrors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainStream {
    AgentRegistry,
    Manager,
}

impl ChainStream {
    pub fn name(&self) -> &'static str {
        match self {
            ChainStream::AgentRegistry => "agent_registry",
            ChainStream::Manager => "manager",
        }
    }
}

pub struct StreamScanner<C: ChainRpc> {
    stream: ChainStream,
    contract: Address,
    client: Arc<C>,
    db: Arc<StateDb>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    /// Realtime mode jumps over large gaps instead of replaying history.
    realtime: bool,
}

impl<C: ChainRpc> StreamScanner<C> {
    pub fn new(
        stream: ChainStream,
        contract: Address,
        client: Arc<C>,
        db: Arc<StateDb>,
        clock: Arc<dyn Clock>,
        realtime: bool,
    ) -> Self {
        Self {
            ledger: Ledger::new(Arc::clone(&db)),
            stream,
            contract,
            client,
            db,
            clock,
            realtime,
        }
    }

    /// Run until shutdown. ABI drift ends the loop for this stream only.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECS));
        info!(stream = self.stream.name(), contract = %self.contract, "indexer stream started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.scan_window().await {
                        Ok(0) => {}
                        Ok(n) => debug!(stream = self.stream.name(), logs = n, "window processed"),
                        Err(e @ GuildError::AbiDrift { .. }) => {
                            error!(stream = self.stream.name(), error = %e,
                                   "ABI drift detected — stopping this stream");
                            return;
                        }
                        Err(e) => warn!(stream = self.stream.name(), error = %e, "scan failed; will retry"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!(stream = self.stream.name(), "indexer stream shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Scan one bounded window from the persisted cursor. Returns the number
    /// of logs applied.
    pub async fn scan_window(&self) -> Result<usize, GuildError> {
        let head = with_retry(|| self.client.block_number()).await?;
        let mut last = self
            .db
            .get_cursor(self.stream.name())?
            .map(|c| c.last_block)
            .unwrap_or(0);

        if head <= last {
            return Ok(0);
        }
        if self.realtime && head - last > SAFE_LOOKBACK_BLOCKS {
            let jumped = head - SAFE_LOOKBACK_BLOCKS;
            warn!(
                stream = self.stream.name(),
                from = last,
                to = jumped,
                "cursor far behind head; jumping forward past the safe lookback"
            );
            last = jumped;
        }

        let from = last + 1;
        let to = (last + LOG_RANGE_BLOCKS).min(head);
        let logs = with_retry(|| self.client.get_logs(&self.contract, from, to)).await?;

        let mut applied = 0;
        for log in &logs {
            // Drift aborts before the cursor moves, so nothing is skipped.
            let Some(event) = decode_log(log)? else {
                continue;
            };
            // Replay guard: a (stream, tx_hash, log_index) already applied is
            // a no-op.
            if !self
                .db
                .mark_log_seen(self.stream.name(), &log.tx_hash, log.log_index)?
            {
                continue;
            }
            self.apply(event, log).await?;
            applied += 1;
        }

        // Cursor advances only once the whole window is durable.
        self.db.put_cursor(&ChainEventCursor {
            stream: self.stream.name().to_string(),
            last_block: to,
            updated_at: self.clock.now(),
        })?;
        self.db.flush()?;
        Ok(applied)
    }

    // ── Handlers ─────────────────────────────────────────────────────────────

    async fn apply(&self, event: ChainEvent, log: &RawLog) -> Result<(), GuildError> {
        match event {
            ChainEvent::AgentRegistered {
                agent,
                agent_type,
                min_fee,
                min_bond,
                capabilities,
            } => self.upsert_agent(agent, agent_type, min_fee, min_bond, capabilities),

            ChainEvent::ReputationUpdated {
                agent,
                old_score,
                new_score,
                reason,
            } => {
                if let Some(mut row) = self.db.get_agent_by_address(&agent)? {
                    row.reputation = new_score as i64;
                    self.db.put_agent(&row)?;
                }
                self.db.append_rep_history(&ReputationHistoryRow {
                    agent,
                    old_score: old_score as i64,
                    new_score: new_score as i64,
                    reason,
                    block: log.block_number,
                    tx_hash: log.tx_hash,
                    log_index: log.log_index,
                })
            }

            ChainEvent::ProposalSubmitted {
                proposal_id,
                proposer,
                escrow,
                deadline,
            } => {
                self.upsert_proposal(proposal_id, proposer, escrow, deadline, &log.tx_hash)
                    .await
            }

            ChainEvent::ProposalAccepted {
                proposal_id,
                task_id,
                worker,
                verifier,
            } => self.accept_proposal(proposal_id, task_id, worker, verifier),

            ChainEvent::WorkerBondPosted {
                task_id,
                worker,
                amount,
            } => self.post_worker_bond(task_id, worker, amount),

            ChainEvent::TaskStarted { task_id } => {
                self.transition_task(task_id, |now| MissionStatus::Executing { at: now })
            }

            ChainEvent::TaskCompleted { task_id } => {
                self.transition_task(task_id, |now| MissionStatus::Verifying { at: now })
            }

            ChainEvent::TaskSettled {
                task_id,
                success,
                payout,
            } => self.settle_task(task_id, success, payout),

            ChainEvent::TaskExpired { task_id } => self.expire_task(task_id),
        }
    }

    fn upsert_agent(
        &self,
        address: Address,
        agent_type: u8,
        min_fee: Amount,
        min_bond: Amount,
        capabilities: Vec<String>,
    ) -> Result<(), GuildError> {
        let role = if agent_type == 1 {
            AgentRole::Verifier
        } else {
            AgentRole::Worker
        };
        let agent = match self.db.get_agent_by_address(&address)? {
            // Update in place; local-only fields (key hash, reputation,
            // registration time) survive the upsert.
            Some(mut existing) => {
                existing.role = role;
                existing.min_fee = min_fee;
                existing.min_bond = min_bond;
                existing.capabilities = capabilities.into_iter().collect();
                existing
            }
            None => Agent {
                agent_id: agent_id_from_address(&address),
                address,
                role,
                capabilities: capabilities.into_iter().collect(),
                min_fee,
                min_bond,
                reputation: guildnet_core::constants::REPUTATION_BASE,
                active: true,
                registered_by: address,
                neural_spec: NeuralSpec(serde_json::json!({
                    "model": "unspecified",
                    "context_window": 0,
                    "max_concurrency": 1,
                })),
                api_key_hash: [0u8; 32],
                registered_at: self.clock.now(),
            },
        };
        self.db.put_agent(&agent)
    }

    async fn upsert_proposal(
        &self,
        proposal_id: u64,
        proposer: Address,
        escrow: Amount,
        deadline: u64,
        tx_hash: &TxHash,
    ) -> Result<(), GuildError> {
        if self.db.get_mission_by_chain_ref(proposal_id)?.is_some() {
            return Ok(());
        }

        // The event omits the objective; recover it from the submitting
        // transaction's calldata, falling back to a sentinel.
        let objective = match with_retry(|| self.client.transaction_input(tx_hash)).await {
            Ok(Some(input)) => decode_objective_from_input(&input).unwrap_or_else(|| {
                error!(proposal = proposal_id, "objective calldata undecodable");
                OBJECTIVE_UNAVAILABLE.to_string()
            }),
            Ok(None) => {
                error!(proposal = proposal_id, tx = %tx_hash, "submitting transaction not found");
                OBJECTIVE_UNAVAILABLE.to_string()
            }
            Err(e) => {
                error!(proposal = proposal_id, error = %e, "objective lookup failed");
                OBJECTIVE_UNAVAILABLE.to_string()
            }
        };

        let now = self.clock.now();
        let mission_id = chain_mission_id(proposal_id);
        let requester = Requester::External(proposer);
        let owner = requester.owner_id();

        // Mirror the on-chain escrow so local balance invariants hold for
        // chain-funded missions.
        self.ledger.credit(&owner, escrow)?;
        self.ledger.lock_escrow(&owner, &mission_id, escrow, now)?;

        self.db.put_mission(&Mission {
            mission_id,
            requester,
            objective,
            reward: escrow,
            deadline: deadline as i64,
            specialties: Default::default(),
            risk: RiskTier::Low,
            mode: AssignmentMode::Autopilot,
            status: MissionStatus::Posted { at: now },
            created_at: now,
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
    }

    fn accept_proposal(
        &self,
        proposal_id: u64,
        task_id: u64,
        worker: Address,
        verifier: Address,
    ) -> Result<(), GuildError> {
        let Some(mut mission) = self.db.get_mission_by_chain_ref(proposal_id)? else {
            warn!(proposal = proposal_id, "accepted proposal unknown locally");
            return Ok(());
        };
        mission.assigned_worker = Some(agent_id_from_address(&worker));
        mission.assigned_verifiers = vec![agent_id_from_address(&verifier)];
        if mission.status.rank() < (MissionStatus::Assigned { at: 0 }).rank() {
            mission.status = MissionStatus::Assigned {
                at: self.clock.now(),
            };
        }
        self.db.put_mission(&mission)?;
        // Task id → mission id, for the per-task status events.
        self.db
            .put_meta(&task_key(task_id), mission.mission_id.as_bytes())
    }

    fn post_worker_bond(
        &self,
        task_id: u64,
        worker: Address,
        amount: Amount,
    ) -> Result<(), GuildError> {
        let Some(mission) = self.task_mission(task_id)? else {
            return Ok(());
        };
        let worker_id = agent_id_from_address(&worker);
        let now = self.clock.now();
        self.ledger.credit(&worker_id, amount)?;
        self.ledger
            .lock_bond(&worker_id, &mission.mission_id, BondRole::Worker, amount, now)
    }

    fn transition_task(
        &self,
        task_id: u64,
        status: impl FnOnce(i64) -> MissionStatus,
    ) -> Result<(), GuildError> {
        let Some(mut mission) = self.task_mission(task_id)? else {
            return Ok(());
        };
        let next = status(self.clock.now());
        // Chain history replays in order; anything else is a stale event.
        if next.rank() <= mission.status.rank() {
            warn!(task = task_id, "out-of-order task status event ignored");
            return Ok(());
        }
        mission.status = next;
        self.db.put_mission(&mission)
    }

    fn settle_task(&self, task_id: u64, success: bool, payout: Amount) -> Result<(), GuildError> {
        let Some(mut mission) = self.task_mission(task_id)? else {
            return Ok(());
        };
        if mission.status.is_terminal() {
            return Ok(());
        }
        let now = self.clock.now();
        let owner = mission.requester.owner_id();

        if let Some(escrow) = self.db.get_escrow(&mission.mission_id)? {
            if escrow.state == LockState::Locked {
                if success {
                    let worker = mission.assigned_worker.unwrap_or(owner);
                    let payout = payout.min(escrow.amount);
                    self.ledger.release_escrow(
                        &mission.mission_id,
                        &[(worker, payout), (*TREASURY, escrow.amount - payout)],
                        now,
                    )?;
                } else {
                    self.ledger
                        .release_escrow(&mission.mission_id, &[(owner, escrow.amount)], now)?;
                }
            }
        }
        self.resolve_worker_bond(&mission, success, now)?;

        mission.status = if success {
            MissionStatus::Settled { at: now }
        } else {
            MissionStatus::Failed {
                at: now,
                reason: FailReason::VerdictFail,
            }
        };
        self.db.put_mission(&mission)
    }

    fn expire_task(&self, task_id: u64) -> Result<(), GuildError> {
        let Some(mut mission) = self.task_mission(task_id)? else {
            return Ok(());
        };
        if mission.status.is_terminal() {
            return Ok(());
        }
        let now = self.clock.now();
        let owner = mission.requester.owner_id();

        if let Some(escrow) = self.db.get_escrow(&mission.mission_id)? {
            if escrow.state == LockState::Locked {
                self.ledger
                    .release_escrow(&mission.mission_id, &[(owner, escrow.amount)], now)?;
            }
        }
        self.resolve_worker_bond(&mission, false, now)?;

        mission.status = MissionStatus::Failed {
            at: now,
            reason: FailReason::DeadlineExpired,
        };
        self.db.put_mission(&mission)
    }

    /// Release the mirrored worker bond on success, slash it to the treasury
    /// otherwise.
    fn resolve_worker_bond(
        &self,
        mission: &Mission,
        success: bool,
        now: i64,
    ) -> Result<(), GuildError> {
        let Some(worker) = mission.assigned_worker else {
            return Ok(());
        };
        let bond = self
            .db
            .get_bond(&mission.mission_id, BondRole::Worker, &worker)?;
        if !matches!(bond, Some(b) if b.state == LockState::Locked) {
            return Ok(());
        }
        if success {
            self.ledger
                .release_bond(&mission.mission_id, BondRole::Worker, &worker, now)?;
        } else {
            self.ledger
                .slash_bond(&mission.mission_id, BondRole::Worker, &worker, 10_000, now)?;
        }
        Ok(())
    }

    fn task_mission(&self, task_id: u64) -> Result<Option<Mission>, GuildError> {
        let Some(bytes) = self.db.get_meta(&task_key(task_id))? else {
            warn!(task = task_id, "task event for unknown task id");
            return Ok(None);
        };
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        self.db.get_mission(&MissionId::from_bytes(arr))
    }
}

fn task_key(task_id: u64) -> String {
    format!("task_mission:{task_id}")
}

/// Deterministic local id for a chain proposal.
fn chain_mission_id(proposal_id: u64) -> MissionId {
    let mut bytes = b"chain_proposal:".to_vec();
    bytes.extend_from_slice(&proposal_id.to_be_bytes());
    MissionId::from_bytes(blake3_hash(&bytes))
}

/// Retry a transient operation with capped exponential backoff.
async fn with_retry<T, F, Fut>(op: F) -> Result<T, GuildError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, GuildError>>,
{
    let mut delay = Duration::from_secs(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < RETRY_MAX_ATTEMPTS => {
                warn!(attempt, error = %e, "transient chain RPC error; backing off");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(RETRY_BACKOFF_CAP_SECS));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
