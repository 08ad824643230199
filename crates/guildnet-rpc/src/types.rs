//! Request/response DTOs for the JSON-RPC facade. Amounts travel as decimal
//! strings (u128 does not survive JSON number precision); ids and digests as
//! hex strings.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcAgent {
    pub agent_id: String,
    pub address: String,
    pub role: String,
    pub capabilities: Vec<String>,
    pub min_fee: String,
    pub min_bond: String,
    pub reputation: i64,
    pub active: bool,
    pub registered_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRegisterAgent {
    pub address: String,
    /// "worker" or "verifier".
    pub role: String,
    pub capabilities: Vec<String>,
    pub min_fee: String,
    pub min_bond: String,
    /// Operator address; defaults to the agent address itself.
    pub registered_by: Option<String>,
    pub neural_spec: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRegisteredAgent {
    pub agent: RpcAgent,
    /// Returned exactly once at registration.
    pub api_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcCreateMission {
    pub objective: String,
    pub reward: String,
    pub deadline: i64,
    pub specialties: Vec<String>,
    /// "low", "medium", "high".
    pub risk: String,
    /// Direct-hire worker id; omits selection.
    pub worker: Option<String>,
    /// Parent mission id for crew subtasks.
    pub parent: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcBid {
    pub bidder: String,
    pub price: String,
    pub eta_secs: u64,
    pub bond_pledge: String,
    pub submitted_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcArtifact {
    /// BLAKE3 digest, hex.
    pub digest: String,
    pub size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcMission {
    pub mission_id: String,
    pub requester: String,
    pub objective: String,
    pub reward: String,
    pub deadline: i64,
    pub specialties: Vec<String>,
    pub risk: String,
    pub mode: String,
    pub status: String,
    pub fail_reason: Option<String>,
    pub created_at: i64,
    pub assigned_worker: Option<String>,
    pub assigned_verifiers: Vec<String>,
    pub required_verifiers: usize,
    pub bids: Vec<RpcBid>,
    pub artifact_count: usize,
    pub revision_count: u32,
    pub parent: Option<String>,
    pub chain_ref: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcBalance {
    pub owner: String,
    pub total: String,
    pub escrowed: String,
    pub bonded: String,
    pub available: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcReputation {
    pub agent_id: String,
    pub base: i64,
    pub settlements: i64,
    pub ratings: i64,
    pub failures: i64,
    pub score: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcTask {
    pub task_id: String,
    pub payload: serde_json::Value,
    pub priority: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcPollResult {
    pub tasks: Vec<RpcTask>,
    pub has_more: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcSignAccept {
    pub proposal_id: u64,
    pub worker: String,
    pub verifier: String,
    pub worker_bond: String,
    pub deadline: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcSignReject {
    pub proposal_id: u64,
    pub reason: String,
    pub deadline: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcSignature {
    pub digest: String,
    pub signature: String,
    pub signer: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcStats {
    pub agents: u64,
    pub missions: u64,
    pub indexed_logs: u64,
    pub audit_rows: u64,
    pub cursors: Vec<RpcCursor>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcCursor {
    pub stream: String,
    pub last_block: u64,
}
