use std::path::Path;

use guildnet_core::error::GuildError;
use guildnet_core::mission::Mission;
use guildnet_core::records::{
    BondRecord, BondRole, ChainEventCursor, DispatchTask, EscrowRecord, JobOutcome, Priority,
    ReputationHistoryRow, SignedMessageRow, Vote,
};
use guildnet_core::types::{Address, AgentId, MissionId, TaskId, Timestamp, TxHash};
use guildnet_core::Agent;

use crate::ledger::LedgerAccount;

/// Persistent state database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   agents            — AgentId bytes                       → bincode(Agent)
///   agents_by_addr    — Address bytes                       → AgentId bytes
///   api_keys          — blake3(api key) bytes               → AgentId bytes
///   accounts          — AgentId bytes                       → bincode(LedgerAccount)
///   missions          — MissionId bytes                     → bincode(Mission)
///   escrows           — MissionId bytes                     → bincode(EscrowRecord)
///   bonds             — mission ‖ role ‖ agent              → bincode(BondRecord)
///   votes             — mission ‖ verifier                  → bincode(Vote)
///   outcomes          — agent ‖ mission ‖ role              → bincode(JobOutcome)
///   assignments       — seq u64 be                          → bincode(AssignmentRow)
///   dispatch          — agent ‖ prio ‖ created_at ‖ task_id → bincode(DispatchTask)
///   heartbeats        — AgentId bytes                       → i64 be (last_poll)
///   cursors           — stream utf8                         → bincode(ChainEventCursor)
///   seen_logs         — stream ‖ tx_hash ‖ log_index        → [] (membership set)
///   rep_history       — address ‖ block ‖ log_index         → bincode(ReputationHistoryRow)
///   audit             — seq u64 be                          → bincode(SignedMessageRow)
///   rate_limits       — caller ‖ minute u64 be              → u32 be
///   meta              — utf8 key bytes                      → raw bytes
pub struct StateDb {
    _db: sled::Db,
    agents: sled::Tree,
    agents_by_addr: sled::Tree,
    api_keys: sled::Tree,
    accounts: sled::Tree,
    missions: sled::Tree,
    escrows: sled::Tree,
    bonds: sled::Tree,
    votes: sled::Tree,
    outcomes: sled::Tree,
    assignments: sled::Tree,
    dispatch: sled::Tree,
    heartbeats: sled::Tree,
    cursors: sled::Tree,
    seen_logs: sled::Tree,
    rep_history: sled::Tree,
    audit: sled::Tree,
    rate_limits: sled::Tree,
    meta: sled::Tree,
}

fn storage(e: sled::Error) -> GuildError {
    GuildError::Storage(e.to_string())
}

fn ser<T: serde::Serialize>(v: &T) -> Result<Vec<u8>, GuildError> {
    bincode::serialize(v).map_err(|e| GuildError::Serialization(e.to_string()))
}

fn de<T: serde::de::DeserializeOwned>(b: &[u8]) -> Result<T, GuildError> {
    bincode::deserialize(b).map_err(|e| GuildError::Serialization(e.to_string()))
}

/// One assignment event, kept for the fairness window.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AssignmentRow {
    pub agent_id: AgentId,
    pub mission_id: MissionId,
    pub specialties: Vec<String>,
    pub at: Timestamp,
}

impl StateDb {
    /// Open or create the state database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GuildError> {
        let db = sled::open(path).map_err(storage)?;
        let open = |name: &str| db.open_tree(name).map_err(storage);
        Ok(Self {
            agents: open("agents")?,
            agents_by_addr: open("agents_by_addr")?,
            api_keys: open("api_keys")?,
            accounts: open("accounts")?,
            missions: open("missions")?,
            escrows: open("escrows")?,
            bonds: open("bonds")?,
            votes: open("votes")?,
            outcomes: open("outcomes")?,
            assignments: open("assignments")?,
            dispatch: open("dispatch")?,
            heartbeats: open("heartbeats")?,
            cursors: open("cursors")?,
            seen_logs: open("seen_logs")?,
            rep_history: open("rep_history")?,
            audit: open("audit")?,
            rate_limits: open("rate_limits")?,
            meta: open("meta")?,
            _db: db,
        })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), GuildError> {
        self._db.flush().map_err(storage)?;
        Ok(())
    }

    // ── Agents ───────────────────────────────────────────────────────────────

    pub fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>, GuildError> {
        match self.agents.get(id.as_bytes()).map_err(storage)? {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    pub fn put_agent(&self, agent: &Agent) -> Result<(), GuildError> {
        self.agents
            .insert(agent.agent_id.as_bytes(), ser(agent)?)
            .map_err(storage)?;
        self.agents_by_addr
            .insert(agent.address.as_bytes(), agent.agent_id.as_bytes().to_vec())
            .map_err(storage)?;
        if agent.api_key_hash != [0u8; 32] {
            self.api_keys
                .insert(agent.api_key_hash, agent.agent_id.as_bytes().to_vec())
                .map_err(storage)?;
        }
        Ok(())
    }

    pub fn get_agent_by_address(&self, addr: &Address) -> Result<Option<Agent>, GuildError> {
        match self.agents_by_addr.get(addr.as_bytes()).map_err(storage)? {
            Some(b) => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&b);
                self.get_agent(&AgentId::from_bytes(arr))
            }
            None => Ok(None),
        }
    }

    /// Resolve a bearer key hash to the owning agent.
    pub fn get_agent_by_key_hash(&self, hash: &[u8; 32]) -> Result<Option<Agent>, GuildError> {
        match self.api_keys.get(hash).map_err(storage)? {
            Some(b) => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&b);
                self.get_agent(&AgentId::from_bytes(arr))
            }
            None => Ok(None),
        }
    }

    pub fn iter_agents(&self) -> Result<Vec<Agent>, GuildError> {
        let mut out = Vec::new();
        for item in self.agents.iter() {
            let (_, b) = item.map_err(storage)?;
            out.push(de(&b)?);
        }
        Ok(out)
    }

    pub fn count_agents(&self) -> u64 {
        self.agents.len() as u64
    }

    // ── Ledger accounts ──────────────────────────────────────────────────────

    pub fn get_account(&self, owner: &AgentId) -> Result<Option<LedgerAccount>, GuildError> {
        match self.accounts.get(owner.as_bytes()).map_err(storage)? {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    pub fn put_account(&self, account: &LedgerAccount) -> Result<(), GuildError> {
        self.accounts
            .insert(account.owner.as_bytes(), ser(account)?)
            .map_err(storage)?;
        Ok(())
    }

    // ── Missions ─────────────────────────────────────────────────────────────

    pub fn get_mission(&self, id: &MissionId) -> Result<Option<Mission>, GuildError> {
        match self.missions.get(id.as_bytes()).map_err(storage)? {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    pub fn put_mission(&self, mission: &Mission) -> Result<(), GuildError> {
        self.missions
            .insert(mission.mission_id.as_bytes(), ser(mission)?)
            .map_err(storage)?;
        Ok(())
    }

    pub fn iter_missions(&self) -> Result<Vec<Mission>, GuildError> {
        let mut out = Vec::new();
        for item in self.missions.iter() {
            let (_, b) = item.map_err(storage)?;
            out.push(de(&b)?);
        }
        Ok(out)
    }

    /// Subtasks of a parent mission.
    pub fn iter_subtasks(&self, parent: &MissionId) -> Result<Vec<Mission>, GuildError> {
        Ok(self
            .iter_missions()?
            .into_iter()
            .filter(|m| m.parent.as_ref() == Some(parent))
            .collect())
    }

    /// Mission mirrored from a chain proposal id, if any.
    pub fn get_mission_by_chain_ref(&self, proposal_id: u64) -> Result<Option<Mission>, GuildError> {
        Ok(self
            .iter_missions()?
            .into_iter()
            .find(|m| m.chain_ref == Some(proposal_id)))
    }

    pub fn count_missions(&self) -> u64 {
        self.missions.len() as u64
    }

    // ── Escrows ──────────────────────────────────────────────────────────────

    pub fn get_escrow(&self, mission: &MissionId) -> Result<Option<EscrowRecord>, GuildError> {
        match self.escrows.get(mission.as_bytes()).map_err(storage)? {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    pub fn put_escrow(&self, escrow: &EscrowRecord) -> Result<(), GuildError> {
        self.escrows
            .insert(escrow.mission_id.as_bytes(), ser(escrow)?)
            .map_err(storage)?;
        Ok(())
    }

    // ── Bonds ────────────────────────────────────────────────────────────────

    fn bond_key(mission: &MissionId, role: BondRole, agent: &AgentId) -> Vec<u8> {
        let mut key = mission.as_bytes().to_vec();
        key.push(role.tag());
        key.extend_from_slice(agent.as_bytes());
        key
    }

    pub fn get_bond(
        &self,
        mission: &MissionId,
        role: BondRole,
        agent: &AgentId,
    ) -> Result<Option<BondRecord>, GuildError> {
        let key = Self::bond_key(mission, role, agent);
        match self.bonds.get(key).map_err(storage)? {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    pub fn put_bond(&self, bond: &BondRecord) -> Result<(), GuildError> {
        let key = Self::bond_key(&bond.mission_id, bond.role, &bond.agent_id);
        self.bonds.insert(key, ser(bond)?).map_err(storage)?;
        Ok(())
    }

    /// All bonds recorded against a mission, both roles.
    pub fn iter_bonds_for_mission(&self, mission: &MissionId) -> Result<Vec<BondRecord>, GuildError> {
        let mut out = Vec::new();
        for item in self.bonds.scan_prefix(mission.as_bytes()) {
            let (_, b) = item.map_err(storage)?;
            out.push(de(&b)?);
        }
        Ok(out)
    }

    // ── Votes ────────────────────────────────────────────────────────────────

    fn vote_key(mission: &MissionId, verifier: &AgentId) -> Vec<u8> {
        let mut key = mission.as_bytes().to_vec();
        key.extend_from_slice(verifier.as_bytes());
        key
    }

    pub fn get_vote(
        &self,
        mission: &MissionId,
        verifier: &AgentId,
    ) -> Result<Option<Vote>, GuildError> {
        match self
            .votes
            .get(Self::vote_key(mission, verifier))
            .map_err(storage)?
        {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    pub fn put_vote(&self, vote: &Vote) -> Result<(), GuildError> {
        let key = Self::vote_key(&vote.mission_id, &vote.verifier_id);
        self.votes.insert(key, ser(vote)?).map_err(storage)?;
        Ok(())
    }

    pub fn iter_votes_for_mission(&self, mission: &MissionId) -> Result<Vec<Vote>, GuildError> {
        let mut out = Vec::new();
        for item in self.votes.scan_prefix(mission.as_bytes()) {
            let (_, b) = item.map_err(storage)?;
            out.push(de(&b)?);
        }
        Ok(out)
    }

    /// Votes only exist while a mission is in `verifying`; the settlement and
    /// revise paths clear them here.
    pub fn clear_votes_for_mission(&self, mission: &MissionId) -> Result<(), GuildError> {
        let keys: Vec<_> = self
            .votes
            .scan_prefix(mission.as_bytes())
            .keys()
            .collect::<Result<_, _>>()
            .map_err(storage)?;
        for key in keys {
            self.votes.remove(key).map_err(storage)?;
        }
        Ok(())
    }

    // ── Job outcomes ─────────────────────────────────────────────────────────

    fn outcome_key(agent: &AgentId, mission: &MissionId, role: BondRole) -> Vec<u8> {
        let mut key = agent.as_bytes().to_vec();
        key.extend_from_slice(mission.as_bytes());
        key.push(role.tag());
        key
    }

    pub fn put_outcome(&self, outcome: &JobOutcome) -> Result<(), GuildError> {
        let key = Self::outcome_key(&outcome.agent_id, &outcome.mission_id, outcome.role);
        self.outcomes.insert(key, ser(outcome)?).map_err(storage)?;
        Ok(())
    }

    pub fn get_outcome(
        &self,
        agent: &AgentId,
        mission: &MissionId,
        role: BondRole,
    ) -> Result<Option<JobOutcome>, GuildError> {
        match self
            .outcomes
            .get(Self::outcome_key(agent, mission, role))
            .map_err(storage)?
        {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    /// Full outcome history for one agent (reputation input).
    pub fn iter_outcomes_for_agent(&self, agent: &AgentId) -> Result<Vec<JobOutcome>, GuildError> {
        let mut out = Vec::new();
        for item in self.outcomes.scan_prefix(agent.as_bytes()) {
            let (_, b) = item.map_err(storage)?;
            out.push(de(&b)?);
        }
        Ok(out)
    }

    // ── Assignment history (fairness window) ─────────────────────────────────

    pub fn append_assignment(&self, row: &AssignmentRow) -> Result<(), GuildError> {
        let seq = self.next_seq("next_assignment_seq")?;
        self.assignments
            .insert(seq.to_be_bytes(), ser(row)?)
            .map_err(storage)?;
        Ok(())
    }

    /// The most recent `window` assignments, newest first.
    pub fn recent_assignments(&self, window: usize) -> Result<Vec<AssignmentRow>, GuildError> {
        let mut out = Vec::new();
        for item in self.assignments.iter().rev().take(window) {
            let (_, b) = item.map_err(storage)?;
            out.push(de(&b)?);
        }
        Ok(out)
    }

    // ── Dispatch queue ───────────────────────────────────────────────────────

    fn dispatch_key(
        agent: &AgentId,
        priority: Priority,
        created_at: Timestamp,
        task_id: &TaskId,
    ) -> Vec<u8> {
        let mut key = agent.as_bytes().to_vec();
        key.push(priority.key_byte());
        key.extend_from_slice(&(created_at as u64).to_be_bytes());
        key.extend_from_slice(task_id.as_bytes());
        key
    }

    pub fn put_dispatch_task(&self, task: &DispatchTask) -> Result<(), GuildError> {
        let key = Self::dispatch_key(&task.agent_id, task.priority, task.created_at, &task.task_id);
        self.dispatch.insert(key, ser(task)?).map_err(storage)?;
        Ok(())
    }

    /// All queued rows for an agent in key order: priority class first, then
    /// FIFO by created_at within the class.
    pub fn iter_dispatch_for_agent(&self, agent: &AgentId) -> Result<Vec<DispatchTask>, GuildError> {
        let mut out = Vec::new();
        for item in self.dispatch.scan_prefix(agent.as_bytes()) {
            let (_, b) = item.map_err(storage)?;
            out.push(de(&b)?);
        }
        Ok(out)
    }

    pub fn remove_dispatch_task(&self, task: &DispatchTask) -> Result<(), GuildError> {
        let key = Self::dispatch_key(&task.agent_id, task.priority, task.created_at, &task.task_id);
        self.dispatch.remove(key).map_err(storage)?;
        Ok(())
    }

    pub fn put_heartbeat(&self, agent: &AgentId, last_poll: Timestamp) -> Result<(), GuildError> {
        self.heartbeats
            .insert(agent.as_bytes(), last_poll.to_be_bytes().to_vec())
            .map_err(storage)?;
        Ok(())
    }

    pub fn get_heartbeat(&self, agent: &AgentId) -> Result<Option<Timestamp>, GuildError> {
        match self.heartbeats.get(agent.as_bytes()).map_err(storage)? {
            Some(b) => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b);
                Ok(Some(i64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    // ── Indexer cursors and replay guards ────────────────────────────────────

    pub fn get_cursor(&self, stream: &str) -> Result<Option<ChainEventCursor>, GuildError> {
        match self.cursors.get(stream.as_bytes()).map_err(storage)? {
            Some(b) => Ok(Some(de(&b)?)),
            None => Ok(None),
        }
    }

    pub fn put_cursor(&self, cursor: &ChainEventCursor) -> Result<(), GuildError> {
        self.cursors
            .insert(cursor.stream.as_bytes(), ser(cursor)?)
            .map_err(storage)?;
        Ok(())
    }

    fn seen_key(stream: &str, tx_hash: &TxHash, log_index: u64) -> Vec<u8> {
        let mut key = stream.as_bytes().to_vec();
        key.push(0);
        key.extend_from_slice(tx_hash.as_bytes());
        key.extend_from_slice(&log_index.to_be_bytes());
        key
    }

    /// Record a processed log. Returns false when the log was already seen,
    /// making replay a no-op for the caller.
    pub fn mark_log_seen(
        &self,
        stream: &str,
        tx_hash: &TxHash,
        log_index: u64,
    ) -> Result<bool, GuildError> {
        let key = Self::seen_key(stream, tx_hash, log_index);
        let prev = self.seen_logs.insert(key, &[]).map_err(storage)?;
        Ok(prev.is_none())
    }

    pub fn count_seen_logs(&self) -> u64 {
        self.seen_logs.len() as u64
    }

    // ── Reputation history ───────────────────────────────────────────────────

    pub fn append_rep_history(&self, row: &ReputationHistoryRow) -> Result<(), GuildError> {
        let mut key = row.agent.as_bytes().to_vec();
        key.extend_from_slice(&row.block.to_be_bytes());
        key.extend_from_slice(&row.log_index.to_be_bytes());
        self.rep_history.insert(key, ser(row)?).map_err(storage)?;
        Ok(())
    }

    pub fn iter_rep_history(&self, agent: &Address) -> Result<Vec<ReputationHistoryRow>, GuildError> {
        let mut out = Vec::new();
        for item in self.rep_history.scan_prefix(agent.as_bytes()) {
            let (_, b) = item.map_err(storage)?;
            out.push(de(&b)?);
        }
        Ok(out)
    }

    // ── Relayer audit log ────────────────────────────────────────────────────

    pub fn append_audit(&self, row: &SignedMessageRow) -> Result<(), GuildError> {
        let seq = self.next_seq("next_audit_seq")?;
        self.audit
            .insert(seq.to_be_bytes(), ser(row)?)
            .map_err(storage)?;
        Ok(())
    }

    pub fn count_audit_rows(&self) -> u64 {
        self.audit.len() as u64
    }

    // ── Rate-limit counters ──────────────────────────────────────────────────

    fn rate_key(caller: &str, minute: u64) -> Vec<u8> {
        let mut key = caller.as_bytes().to_vec();
        key.push(0);
        key.extend_from_slice(&minute.to_be_bytes());
        key
    }

    /// Increment and return the counter for (caller, minute bucket).
    pub fn bump_rate_counter(&self, caller: &str, minute: u64) -> Result<u32, GuildError> {
        let key = Self::rate_key(caller, minute);
        let current = match self.rate_limits.get(&key).map_err(storage)? {
            Some(b) => {
                let mut arr = [0u8; 4];
                arr.copy_from_slice(&b);
                u32::from_be_bytes(arr)
            }
            None => 0,
        };
        let next = current + 1;
        self.rate_limits
            .insert(key, next.to_be_bytes().to_vec())
            .map_err(storage)?;
        Ok(next)
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), GuildError> {
        self.meta.insert(key.as_bytes(), value).map_err(storage)?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, GuildError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage)
    }

    /// Allocate the next value of a monotonically increasing meta counter.
    pub fn next_seq(&self, counter: &str) -> Result<u64, GuildError> {
        let current = self
            .get_meta(counter)?
            .map(|b| {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&b[..8]);
                u64::from_be_bytes(arr)
            })
            .unwrap_or(0);
        self.put_meta(counter, &(current + 1).to_be_bytes())?;
        Ok(current)
    }
}
