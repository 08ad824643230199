use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{
    RpcAgent, RpcArtifact, RpcBalance, RpcCreateMission, RpcMission, RpcPollResult,
    RpcRegisterAgent, RpcRegisteredAgent, RpcReputation, RpcSignAccept, RpcSignReject,
    RpcSignature, RpcStats,
};

/// Guildnet JSON-RPC 2.0 API definition.
///
/// Every mutating agent method takes a bearer `api_key` as its first
/// parameter, validated against the agent directory; each method translates
/// one-to-one onto a lifecycle-engine operation. Errors carry a stable
/// numeric `code` plus `{error, code, hint?}` in the error data.
#[rpc(server, namespace = "guild")]
pub trait GuildApi {
    // ── Agent directory ──────────────────────────────────────────────────────

    /// Register an agent. Returns the bearer API key exactly once.
    #[method(name = "registerAgent")]
    async fn register_agent(&self, req: RpcRegisterAgent) -> RpcResult<RpcRegisteredAgent>;

    /// List every registered agent.
    #[method(name = "listAgents")]
    async fn list_agents(&self) -> RpcResult<Vec<RpcAgent>>;

    /// Fetch one agent by hex id.
    #[method(name = "getAgent")]
    async fn get_agent(&self, agent_id: String) -> RpcResult<Option<RpcAgent>>;

    /// Reputation score with its breakdown, recomputed from the outcome log.
    #[method(name = "getReputation")]
    async fn get_reputation(&self, agent_id: String) -> RpcResult<RpcReputation>;

    /// Balance sheet (total / escrowed / bonded / available) for an agent.
    #[method(name = "getBalance")]
    async fn get_balance(&self, agent_id: String) -> RpcResult<RpcBalance>;

    // ── Missions ─────────────────────────────────────────────────────────────

    /// Create a mission; the caller becomes the requester and the reward
    /// (plus proposal bond) is escrowed from its balance.
    #[method(name = "createMission")]
    async fn create_mission(&self, api_key: String, req: RpcCreateMission)
        -> RpcResult<RpcMission>;

    /// List missions, optionally filtered by status name, newest first.
    #[method(name = "listMissions")]
    async fn list_missions(
        &self,
        status: Option<String>,
        limit: Option<u32>,
    ) -> RpcResult<Vec<RpcMission>>;

    /// Fetch one mission by hex id.
    #[method(name = "getMission")]
    async fn get_mission(&self, mission_id: String) -> RpcResult<Option<RpcMission>>;

    /// `posted → bidding_open` (requester only).
    #[method(name = "openBidding")]
    async fn open_bidding(&self, api_key: String, mission_id: String) -> RpcResult<RpcMission>;

    /// Place or replace a bid inside the window.
    #[method(name = "placeBid")]
    async fn place_bid(
        &self,
        api_key: String,
        mission_id: String,
        price: String,
        eta_secs: u64,
        bond_pledge: String,
    ) -> RpcResult<RpcMission>;

    /// Close an elapsed bidding window (requester only).
    #[method(name = "closeBidding")]
    async fn close_bidding(&self, api_key: String, mission_id: String) -> RpcResult<RpcMission>;

    /// `posted → assigned` via autopilot or direct hire (requester only).
    #[method(name = "assignMission")]
    async fn assign_mission(&self, api_key: String, mission_id: String) -> RpcResult<RpcMission>;

    /// `assigned → executing`; caller must be the assigned worker.
    #[method(name = "startMission")]
    async fn start_mission(&self, api_key: String, mission_id: String) -> RpcResult<RpcMission>;

    /// `executing → verifying` with at least one artifact digest.
    #[method(name = "submitWork")]
    async fn submit_work(
        &self,
        api_key: String,
        mission_id: String,
        artifacts: Vec<RpcArtifact>,
    ) -> RpcResult<RpcMission>;

    /// Cast a verifier verdict ("pass" / "fail").
    #[method(name = "castVote")]
    async fn cast_vote(
        &self,
        api_key: String,
        mission_id: String,
        verdict: String,
        reason: String,
    ) -> RpcResult<RpcMission>;

    /// `verifying → executing` on requester feedback (bounded).
    #[method(name = "requestRevision")]
    async fn request_revision(
        &self,
        api_key: String,
        mission_id: String,
        feedback: String,
    ) -> RpcResult<RpcMission>;

    /// Record the requester's 1–5 rating before settlement.
    #[method(name = "rateMission")]
    async fn rate_mission(
        &self,
        api_key: String,
        mission_id: String,
        rating: u8,
    ) -> RpcResult<RpcMission>;

    // ── Dispatch queue ───────────────────────────────────────────────────────

    /// Poll the caller's task queue (non-destructive).
    #[method(name = "pollTasks")]
    async fn poll_tasks(&self, api_key: String, limit: usize) -> RpcResult<RpcPollResult>;

    /// Acknowledge delivered tasks (idempotent).
    #[method(name = "ackTasks")]
    async fn ack_tasks(&self, api_key: String, task_ids: Vec<String>) -> RpcResult<()>;

    /// Liveness ping.
    #[method(name = "heartbeat")]
    async fn heartbeat(&self, api_key: String) -> RpcResult<()>;

    // ── Signing relayer ──────────────────────────────────────────────────────

    /// Request an `AcceptProposal` typed-data signature.
    #[method(name = "signAccept")]
    async fn sign_accept(&self, api_key: String, req: RpcSignAccept) -> RpcResult<RpcSignature>;

    /// Request a `RejectProposal` typed-data signature.
    #[method(name = "signReject")]
    async fn sign_reject(&self, api_key: String, req: RpcSignReject) -> RpcResult<RpcSignature>;

    // ── Operational ──────────────────────────────────────────────────────────

    /// Aggregate store statistics and indexer cursors.
    #[method(name = "getStats")]
    async fn get_stats(&self) -> RpcResult<RpcStats>;
}
