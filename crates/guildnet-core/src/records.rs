//! Durable economic and coordination records.
//!
//! `JobOutcome`, `Vote`, reputation history, and signed-message audit rows
//! are append-only; escrow and bond records transition `locked →
//! released | slashed` exactly once.

use serde::{Deserialize, Serialize};

use crate::types::{Address, AgentId, Amount, BlockNumber, MissionId, TaskId, Timestamp, TxHash};

// ── Escrow ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockState {
    Locked,
    Released,
    Slashed,
}

/// Requester funds locked against a mission until settlement. Exactly one
/// escrow exists per mission while the mission is non-terminal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub mission_id: MissionId,
    pub owner: AgentId,
    /// reward + proposal bond.
    pub amount: Amount,
    pub state: LockState,
    pub locked_at: Timestamp,
    pub released_to: Option<AgentId>,
    pub slashed_amount: Option<Amount>,
    pub resolved_at: Option<Timestamp>,
}

// ── Bonds ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondRole {
    Worker,
    Verifier,
}

impl BondRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BondRole::Worker => "worker",
            BondRole::Verifier => "verifier",
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            BondRole::Worker => 0,
            BondRole::Verifier => 1,
        }
    }
}

/// Agent stake locked while participating in a mission. One active worker
/// bond per mission; up to three active verifier bonds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BondRecord {
    pub agent_id: AgentId,
    pub mission_id: MissionId,
    pub role: BondRole,
    pub amount: Amount,
    pub state: LockState,
    pub staked_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub slashed_amount: Option<Amount>,
}

// ── Job outcomes ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeKind {
    Pass,
    Fail,
    Outlier,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Pass => "pass",
            OutcomeKind::Fail => "fail",
            OutcomeKind::Outlier => "outlier",
        }
    }
}

/// Append-only settlement record per participant per mission. The reputation
/// module derives every score from these rows alone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub agent_id: AgentId,
    pub mission_id: MissionId,
    pub role: BondRole,
    pub outcome: OutcomeKind,
    pub reward_earned: Amount,
    pub bond_slashed: Amount,
    /// Requester rating 1–5, when given. Weighted into worker PASS deltas.
    pub rating: Option<u8>,
    pub at: Timestamp,
}

// ── Votes ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
}

/// One verifier's verdict on a mission. At most one per verifier per mission;
/// rows exist only while the mission is in `verifying`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub mission_id: MissionId,
    pub verifier_id: AgentId,
    pub verdict: Verdict,
    pub reason: String,
    pub at: Timestamp,
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// Key byte: lower sorts first so a prefix scan returns high before low.
    pub fn key_byte(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

/// A queued work item for one agent. FIFO within a priority class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchTask {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub acknowledged_at: Option<Timestamp>,
}

impl DispatchTask {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    pub fn is_pending(&self, now: Timestamp) -> bool {
        self.acknowledged_at.is_none() && !self.is_expired(now)
    }
}

// ── Chain mirror rows ────────────────────────────────────────────────────────

/// Per event-stream high-water mark.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainEventCursor {
    pub stream: String,
    pub last_block: BlockNumber,
    pub updated_at: Timestamp,
}

/// Reputation change mirrored from the chain, one row per event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReputationHistoryRow {
    pub agent: Address,
    pub old_score: i64,
    pub new_score: i64,
    pub reason: String,
    pub block: BlockNumber,
    pub tx_hash: TxHash,
    pub log_index: u64,
}

// ── Relayer audit ────────────────────────────────────────────────────────────

/// Append-only record of every signature the relayer issues.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedMessageRow {
    /// Typed-data digest that was signed.
    pub digest: [u8; 32],
    /// 65-byte recoverable signature, hex-encoded.
    pub signature: String,
    /// Message kind ("accept_proposal" / "reject_proposal").
    pub kind: String,
    /// Message fields as submitted, for audit replay.
    pub fields: serde_json::Value,
    pub caller: String,
    pub at: Timestamp,
}
