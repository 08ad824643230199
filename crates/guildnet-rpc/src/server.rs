use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use guildnet_consensus::reputation;
use guildnet_core::error::GuildError;
use guildnet_core::mission::{Mission, MissionStatus, Requester, RiskTier};
use guildnet_core::records::{Priority, Verdict};
use guildnet_core::types::{Address, AgentId, Amount, MissionId, TaskId};
use guildnet_core::{Agent, AgentRole, NeuralSpec};
use guildnet_lifecycle::{CreateMission, MissionEngine};
use guildnet_relayer::{AcceptProposalRequest, RejectProposalRequest, SigningRelayer};
use guildnet_state::StateDb;

use crate::api::GuildApiServer;
use crate::types::{
    RpcAgent, RpcArtifact, RpcBalance, RpcBid, RpcCreateMission, RpcCursor, RpcMission,
    RpcPollResult, RpcRegisterAgent, RpcRegisteredAgent, RpcReputation, RpcSignAccept,
    RpcSignReject, RpcSignature, RpcStats, RpcTask,
};

/// Shared state passed to the RPC server.
pub struct RpcServerState {
    pub db: Arc<StateDb>,
    pub engine: Arc<MissionEngine>,
    /// Absent when `SIGNER_KEY` is not configured.
    pub relayer: Option<Arc<SigningRelayer>>,
}

/// The RPC server implementation. A thin facade: every method authenticates,
/// parses, calls one engine operation, and converts the result.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers.
    /// Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }

    fn auth(&self, api_key: &str) -> Result<Agent, GuildError> {
        self.state.engine.authenticate(api_key)
    }

    fn requester_guard(&self, mission: &Mission, agent: &Agent) -> Result<(), GuildError> {
        if mission.requester != Requester::Agent(agent.agent_id) {
            return Err(GuildError::Forbidden("requester"));
        }
        Ok(())
    }

    fn load_mission(&self, mission_id: &MissionId) -> Result<Mission, GuildError> {
        self.state
            .db
            .get_mission(mission_id)?
            .ok_or_else(|| GuildError::UnknownMission(mission_id.to_hex()))
    }
}

// ── Error mapping ────────────────────────────────────────────────────────────

fn hint(e: &GuildError) -> Option<&'static str> {
    match e {
        GuildError::InsufficientFunds { .. } => Some("top up the owner balance first"),
        GuildError::InvalidState { .. } => Some("re-fetch the mission and check its status"),
        GuildError::Unauthorized => Some("pass the bearer api_key issued at registration"),
        GuildError::RateLimited { .. } => Some("retry after the current minute window"),
        GuildError::DuplicateVote => Some("each verifier may vote once per mission"),
        _ => None,
    }
}

fn domain_err(e: GuildError) -> ErrorObject<'static> {
    let data = serde_json::json!({
        "error": e.to_string(),
        "code": e.code(),
        "hint": hint(&e),
    });
    ErrorObject::owned(e.code(), e.to_string(), Some(data))
}

fn parse_err(msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(-32602, msg.into(), None::<()>)
}

// ── Parsers ──────────────────────────────────────────────────────────────────

fn parse_amount(s: &str, field: &str) -> Result<Amount, ErrorObject<'static>> {
    s.parse()
        .map_err(|_| parse_err(format!("invalid {field}: {s}")))
}

fn parse_mission_id(s: &str) -> Result<MissionId, ErrorObject<'static>> {
    MissionId::from_hex(s).map_err(|e| parse_err(format!("invalid mission id: {e}")))
}

fn parse_agent_id(s: &str) -> Result<AgentId, ErrorObject<'static>> {
    AgentId::from_hex(s).map_err(|e| parse_err(format!("invalid agent id: {e}")))
}

fn parse_address(s: &str) -> Result<Address, ErrorObject<'static>> {
    Address::from_hex(s).map_err(|e| parse_err(format!("invalid address: {e}")))
}

fn parse_risk(s: &str) -> Result<RiskTier, ErrorObject<'static>> {
    match s {
        "low" => Ok(RiskTier::Low),
        "medium" => Ok(RiskTier::Medium),
        "high" => Ok(RiskTier::High),
        other => Err(parse_err(format!("invalid risk tier: {other}"))),
    }
}

fn parse_role(s: &str) -> Result<AgentRole, ErrorObject<'static>> {
    match s {
        "worker" => Ok(AgentRole::Worker),
        "verifier" => Ok(AgentRole::Verifier),
        other => Err(parse_err(format!("invalid role: {other}"))),
    }
}

fn parse_verdict(s: &str) -> Result<Verdict, ErrorObject<'static>> {
    match s {
        "pass" => Ok(Verdict::Pass),
        "fail" => Ok(Verdict::Fail),
        other => Err(parse_err(format!("invalid verdict: {other}"))),
    }
}

// ── Conversions ──────────────────────────────────────────────────────────────

fn agent_to_rpc(agent: Agent) -> RpcAgent {
    RpcAgent {
        agent_id: agent.agent_id.to_hex(),
        address: agent.address.to_hex(),
        role: agent.role.as_str().to_string(),
        capabilities: agent.capabilities.into_iter().collect(),
        min_fee: agent.min_fee.to_string(),
        min_bond: agent.min_bond.to_string(),
        reputation: agent.reputation,
        active: agent.active,
        registered_at: agent.registered_at,
    }
}

fn requester_str(requester: &Requester) -> String {
    match requester {
        Requester::Agent(id) => id.to_hex(),
        Requester::External(addr) => addr.to_hex(),
    }
}

fn mission_to_rpc(mission: Mission) -> RpcMission {
    let fail_reason = match &mission.status {
        MissionStatus::Failed { reason, .. } => Some(reason.as_str().to_string()),
        _ => None,
    };
    RpcMission {
        mission_id: mission.mission_id.to_hex(),
        requester: requester_str(&mission.requester),
        objective: mission.objective,
        reward: mission.reward.to_string(),
        deadline: mission.deadline,
        specialties: mission.specialties.into_iter().collect(),
        risk: mission.risk.as_str().to_string(),
        mode: match &mission.mode {
            guildnet_core::mission::AssignmentMode::Autopilot => "autopilot".to_string(),
            guildnet_core::mission::AssignmentMode::Bidding => "bidding".to_string(),
            guildnet_core::mission::AssignmentMode::DirectHire { .. } => "direct_hire".to_string(),
        },
        status: mission.status.as_str().to_string(),
        fail_reason,
        created_at: mission.created_at,
        assigned_worker: mission.assigned_worker.map(|w| w.to_hex()),
        assigned_verifiers: mission
            .assigned_verifiers
            .iter()
            .map(|v| v.to_hex())
            .collect(),
        required_verifiers: mission.required_verifiers,
        bids: mission
            .bids
            .into_iter()
            .map(|b| RpcBid {
                bidder: b.bidder.to_hex(),
                price: b.price.to_string(),
                eta_secs: b.eta_secs,
                bond_pledge: b.bond_pledge.to_string(),
                submitted_at: b.submitted_at,
            })
            .collect(),
        artifact_count: mission.artifacts.len(),
        revision_count: mission.revision_count,
        parent: mission.parent.map(|p| p.to_hex()),
        chain_ref: mission.chain_ref,
    }
}

// ── RPC implementation ───────────────────────────────────────────────────────

#[async_trait]
impl GuildApiServer for RpcServer {
    async fn register_agent(&self, req: RpcRegisterAgent) -> RpcResult<RpcRegisteredAgent> {
        let address = parse_address(&req.address)?;
        let registered_by = match &req.registered_by {
            Some(s) => parse_address(s)?,
            None => address,
        };
        let (agent, api_key) = self
            .state
            .engine
            .register_agent(
                address,
                parse_role(&req.role)?,
                req.capabilities.into_iter().collect(),
                parse_amount(&req.min_fee, "min_fee")?,
                parse_amount(&req.min_bond, "min_bond")?,
                registered_by,
                NeuralSpec(req.neural_spec),
            )
            .map_err(domain_err)?;
        Ok(RpcRegisteredAgent {
            agent: agent_to_rpc(agent),
            api_key,
        })
    }

    async fn list_agents(&self) -> RpcResult<Vec<RpcAgent>> {
        let agents = self.state.db.iter_agents().map_err(domain_err)?;
        Ok(agents.into_iter().map(agent_to_rpc).collect())
    }

    async fn get_agent(&self, agent_id: String) -> RpcResult<Option<RpcAgent>> {
        let id = parse_agent_id(&agent_id)?;
        let agent = self.state.db.get_agent(&id).map_err(domain_err)?;
        Ok(agent.map(agent_to_rpc))
    }

    async fn get_reputation(&self, agent_id: String) -> RpcResult<RpcReputation> {
        let id = parse_agent_id(&agent_id)?;
        let outcomes = self
            .state
            .db
            .iter_outcomes_for_agent(&id)
            .map_err(domain_err)?;
        let breakdown = reputation(&outcomes);
        Ok(RpcReputation {
            agent_id,
            base: breakdown.base,
            settlements: breakdown.settlements,
            ratings: breakdown.ratings,
            failures: breakdown.failures,
            score: breakdown.score,
        })
    }

    async fn get_balance(&self, agent_id: String) -> RpcResult<RpcBalance> {
        let id = parse_agent_id(&agent_id)?;
        let account = self.state.engine.ledger().view(&id).map_err(domain_err)?;
        Ok(RpcBalance {
            owner: agent_id,
            total: account.total.to_string(),
            escrowed: account.escrowed.to_string(),
            bonded: account.bonded.to_string(),
            available: account.available().to_string(),
        })
    }

    async fn create_mission(
        &self,
        api_key: String,
        req: RpcCreateMission,
    ) -> RpcResult<RpcMission> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let parent = match &req.parent {
            Some(s) => Some(parse_mission_id(s)?),
            None => None,
        };
        let direct_hire = match &req.worker {
            Some(s) => Some(parse_agent_id(s)?),
            None => None,
        };
        let mission = self
            .state
            .engine
            .create(CreateMission {
                requester: Requester::Agent(agent.agent_id),
                objective: req.objective,
                reward: parse_amount(&req.reward, "reward")?,
                deadline: req.deadline,
                specialties: req.specialties.into_iter().collect(),
                risk: parse_risk(&req.risk)?,
                direct_hire,
                parent,
            })
            .map_err(domain_err)?;
        Ok(mission_to_rpc(mission))
    }

    async fn list_missions(
        &self,
        status: Option<String>,
        limit: Option<u32>,
    ) -> RpcResult<Vec<RpcMission>> {
        let limit = limit.unwrap_or(50).min(200) as usize;
        let mut missions = self.state.db.iter_missions().map_err(domain_err)?;
        if let Some(filter) = &status {
            missions.retain(|m| m.status.as_str() == filter);
        }
        missions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(missions
            .into_iter()
            .take(limit)
            .map(mission_to_rpc)
            .collect())
    }

    async fn get_mission(&self, mission_id: String) -> RpcResult<Option<RpcMission>> {
        let id = parse_mission_id(&mission_id)?;
        let mission = self.state.db.get_mission(&id).map_err(domain_err)?;
        Ok(mission.map(mission_to_rpc))
    }

    async fn open_bidding(&self, api_key: String, mission_id: String) -> RpcResult<RpcMission> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let id = parse_mission_id(&mission_id)?;
        let mission = self.load_mission(&id).map_err(domain_err)?;
        self.requester_guard(&mission, &agent).map_err(domain_err)?;
        let mission = self.state.engine.open_bidding(&id).map_err(domain_err)?;
        Ok(mission_to_rpc(mission))
    }

    async fn place_bid(
        &self,
        api_key: String,
        mission_id: String,
        price: String,
        eta_secs: u64,
        bond_pledge: String,
    ) -> RpcResult<RpcMission> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let id = parse_mission_id(&mission_id)?;
        let mission = self
            .state
            .engine
            .place_bid(
                &id,
                &agent.agent_id,
                parse_amount(&price, "price")?,
                eta_secs,
                parse_amount(&bond_pledge, "bond_pledge")?,
            )
            .map_err(domain_err)?;
        Ok(mission_to_rpc(mission))
    }

    async fn close_bidding(&self, api_key: String, mission_id: String) -> RpcResult<RpcMission> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let id = parse_mission_id(&mission_id)?;
        let mission = self.load_mission(&id).map_err(domain_err)?;
        self.requester_guard(&mission, &agent).map_err(domain_err)?;
        let mission = self.state.engine.close_bidding(&id).map_err(domain_err)?;
        Ok(mission_to_rpc(mission))
    }

    async fn assign_mission(&self, api_key: String, mission_id: String) -> RpcResult<RpcMission> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let id = parse_mission_id(&mission_id)?;
        let mission = self.load_mission(&id).map_err(domain_err)?;
        self.requester_guard(&mission, &agent).map_err(domain_err)?;
        let mission = self.state.engine.assign(&id).map_err(domain_err)?;
        Ok(mission_to_rpc(mission))
    }

    async fn start_mission(&self, api_key: String, mission_id: String) -> RpcResult<RpcMission> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let id = parse_mission_id(&mission_id)?;
        let mission = self
            .state
            .engine
            .start(&id, &agent.agent_id)
            .map_err(domain_err)?;
        Ok(mission_to_rpc(mission))
    }

    async fn submit_work(
        &self,
        api_key: String,
        mission_id: String,
        artifacts: Vec<RpcArtifact>,
    ) -> RpcResult<RpcMission> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let id = parse_mission_id(&mission_id)?;
        let mut parsed = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            let bytes = hex::decode(&artifact.digest)
                .map_err(|e| parse_err(format!("invalid artifact digest: {e}")))?;
            if bytes.len() != 32 {
                return Err(parse_err("artifact digest must be 32 bytes"));
            }
            let mut digest = [0u8; 32];
            digest.copy_from_slice(&bytes);
            parsed.push((digest, artifact.size));
        }
        let mission = self
            .state
            .engine
            .submit(&id, &agent.agent_id, parsed)
            .map_err(domain_err)?;
        Ok(mission_to_rpc(mission))
    }

    async fn cast_vote(
        &self,
        api_key: String,
        mission_id: String,
        verdict: String,
        reason: String,
    ) -> RpcResult<RpcMission> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let id = parse_mission_id(&mission_id)?;
        let mission = self
            .state
            .engine
            .vote(&id, &agent.agent_id, parse_verdict(&verdict)?, reason)
            .map_err(domain_err)?;
        Ok(mission_to_rpc(mission))
    }

    async fn request_revision(
        &self,
        api_key: String,
        mission_id: String,
        feedback: String,
    ) -> RpcResult<RpcMission> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let id = parse_mission_id(&mission_id)?;
        let mission = self
            .state
            .engine
            .revise(&id, &Requester::Agent(agent.agent_id), feedback)
            .map_err(domain_err)?;
        Ok(mission_to_rpc(mission))
    }

    async fn rate_mission(
        &self,
        api_key: String,
        mission_id: String,
        rating: u8,
    ) -> RpcResult<RpcMission> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let id = parse_mission_id(&mission_id)?;
        let mission = self
            .state
            .engine
            .rate(&id, &Requester::Agent(agent.agent_id), rating)
            .map_err(domain_err)?;
        Ok(mission_to_rpc(mission))
    }

    async fn poll_tasks(&self, api_key: String, limit: usize) -> RpcResult<RpcPollResult> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let (tasks, has_more) = self
            .state
            .engine
            .dispatch()
            .poll(&agent.agent_id, limit)
            .map_err(domain_err)?;
        Ok(RpcPollResult {
            tasks: tasks
                .into_iter()
                .map(|t| RpcTask {
                    task_id: t.task_id.to_hex(),
                    payload: t.payload,
                    priority: match t.priority {
                        Priority::High => "high".to_string(),
                        Priority::Normal => "normal".to_string(),
                        Priority::Low => "low".to_string(),
                    },
                    created_at: t.created_at,
                    expires_at: t.expires_at,
                })
                .collect(),
            has_more,
        })
    }

    async fn ack_tasks(&self, api_key: String, task_ids: Vec<String>) -> RpcResult<()> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let mut ids = Vec::with_capacity(task_ids.len());
        for task_id in &task_ids {
            ids.push(
                TaskId::from_hex(task_id)
                    .map_err(|e| parse_err(format!("invalid task id: {e}")))?,
            );
        }
        self.state
            .engine
            .dispatch()
            .ack(&agent.agent_id, &ids)
            .map_err(domain_err)?;
        Ok(())
    }

    async fn heartbeat(&self, api_key: String) -> RpcResult<()> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        self.state
            .engine
            .dispatch()
            .heartbeat(&agent.agent_id)
            .map_err(domain_err)?;
        Ok(())
    }

    async fn sign_accept(&self, api_key: String, req: RpcSignAccept) -> RpcResult<RpcSignature> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let relayer = self.state.relayer.as_ref().ok_or_else(|| {
            domain_err(GuildError::UpstreamUnavailable(
                "signing relayer not configured".into(),
            ))
        })?;
        let signed = relayer
            .sign_accept(
                &AcceptProposalRequest {
                    proposal_id: req.proposal_id,
                    worker: parse_address(&req.worker)?,
                    verifier: parse_address(&req.verifier)?,
                    worker_bond: parse_amount(&req.worker_bond, "worker_bond")?,
                    deadline: req.deadline,
                },
                &agent.agent_id.to_hex(),
            )
            .map_err(domain_err)?;
        Ok(RpcSignature {
            digest: signed.digest,
            signature: signed.signature,
            signer: signed.signer.to_hex(),
        })
    }

    async fn sign_reject(&self, api_key: String, req: RpcSignReject) -> RpcResult<RpcSignature> {
        let agent = self.auth(&api_key).map_err(domain_err)?;
        let relayer = self.state.relayer.as_ref().ok_or_else(|| {
            domain_err(GuildError::UpstreamUnavailable(
                "signing relayer not configured".into(),
            ))
        })?;
        let signed = relayer
            .sign_reject(
                &RejectProposalRequest {
                    proposal_id: req.proposal_id,
                    reason: req.reason,
                    deadline: req.deadline,
                },
                &agent.agent_id.to_hex(),
            )
            .map_err(domain_err)?;
        Ok(RpcSignature {
            digest: signed.digest,
            signature: signed.signature,
            signer: signed.signer.to_hex(),
        })
    }

    async fn get_stats(&self) -> RpcResult<RpcStats> {
        let db = &self.state.db;
        let mut cursors = Vec::new();
        for stream in ["agent_registry", "manager"] {
            if let Some(cursor) = db.get_cursor(stream).map_err(domain_err)? {
                cursors.push(RpcCursor {
                    stream: cursor.stream,
                    last_block: cursor.last_block,
                });
            }
        }
        Ok(RpcStats {
            agents: db.count_agents(),
            missions: db.count_missions(),
            indexed_logs: db.count_seen_logs(),
            audit_rows: db.count_audit_rows(),
            cursors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildnet_core::mission::{AssignmentMode, Bid, FailReason};
    use guildnet_core::NeuralSpec;
    use std::collections::BTreeSet;

    fn sample_agent() -> Agent {
        Agent {
            agent_id: AgentId::from_bytes([0x11; 32]),
            address: Address::from_bytes([0x22; 20]),
            role: AgentRole::Verifier,
            capabilities: BTreeSet::from(["rust".to_string(), "audit".to_string()]),
            min_fee: 5,
            min_bond: 7,
            reputation: 64,
            active: true,
            registered_by: Address::from_bytes([0x33; 20]),
            neural_spec: NeuralSpec(serde_json::json!({
                "model": "m", "context_window": 1, "max_concurrency": 1
            })),
            api_key_hash: [0u8; 32],
            registered_at: 42,
        }
    }

    fn sample_mission(status: MissionStatus) -> Mission {
        Mission {
            mission_id: MissionId::from_bytes([0x44; 32]),
            requester: Requester::Agent(AgentId::from_bytes([0x11; 32])),
            objective: "index the docs".into(),
            reward: 100,
            deadline: 9_999,
            specialties: BTreeSet::from(["rust".to_string()]),
            risk: RiskTier::Medium,
            mode: AssignmentMode::Bidding,
            status,
            created_at: 1,
            assigned_worker: Some(AgentId::from_bytes([0x55; 32])),
            assigned_verifiers: vec![AgentId::from_bytes([0x66; 32])],
            required_verifiers: 2,
            bids: vec![Bid {
                bidder: AgentId::from_bytes([0x55; 32]),
                price: 90,
                eta_secs: 3_600,
                bond_pledge: 18,
                submitted_at: 2,
            }],
            artifacts: Vec::new(),
            revision_count: 1,
            rating: None,
            parent: None,
            chain_ref: Some(7),
        }
    }

    // ── Error mapping ────────────────────────────────────────────────────────

    #[test]
    fn domain_err_carries_stable_code_and_structured_data() {
        let err = domain_err(GuildError::DuplicateVote);
        assert_eq!(err.code(), GuildError::DuplicateVote.code());
        assert_eq!(err.message(), "verifier has already voted on this mission");

        let data: serde_json::Value =
            serde_json::from_str(err.data().expect("error data").get()).unwrap();
        assert_eq!(data["code"], GuildError::DuplicateVote.code());
        assert_eq!(data["error"], "verifier has already voted on this mission");
        assert_eq!(data["hint"], "each verifier may vote once per mission");
    }

    #[test]
    fn unhinted_errors_serialise_a_null_hint() {
        let err = domain_err(GuildError::NoBidders);
        let data: serde_json::Value =
            serde_json::from_str(err.data().expect("error data").get()).unwrap();
        assert!(data["hint"].is_null());
    }

    #[test]
    fn hint_covers_the_client_recoverable_errors() {
        assert!(hint(&GuildError::InsufficientFunds { need: 1, have: 0 }).is_some());
        assert!(hint(&GuildError::Unauthorized).is_some());
        assert!(hint(&GuildError::RateLimited { limit: 10 }).is_some());
        assert!(hint(&GuildError::NoEligibleAgents).is_none());
    }

    #[test]
    fn parse_err_uses_the_invalid_params_code() {
        assert_eq!(parse_err("bad input").code(), -32602);
    }

    // ── Parsers ──────────────────────────────────────────────────────────────

    #[test]
    fn amount_parser_accepts_decimal_strings_only() {
        assert_eq!(parse_amount("1000000000000000000", "reward").unwrap(), 10u128.pow(18));
        assert!(parse_amount("1e18", "reward").is_err());
        assert!(parse_amount("-5", "reward").is_err());
    }

    #[test]
    fn enum_parsers_reject_unknown_values() {
        assert_eq!(parse_risk("high").unwrap(), RiskTier::High);
        assert!(parse_risk("extreme").is_err());

        assert_eq!(parse_role("worker").unwrap(), AgentRole::Worker);
        assert!(parse_role("admin").is_err());

        assert_eq!(parse_verdict("fail").unwrap(), Verdict::Fail);
        assert!(parse_verdict("maybe").is_err());
    }

    // ── DTO conversions ──────────────────────────────────────────────────────

    #[test]
    fn agent_converts_with_hex_ids_and_string_amounts() {
        let rpc = agent_to_rpc(sample_agent());
        assert_eq!(rpc.agent_id, AgentId::from_bytes([0x11; 32]).to_hex());
        assert_eq!(rpc.address, "0x2222222222222222222222222222222222222222");
        assert_eq!(rpc.role, "verifier");
        assert_eq!(rpc.capabilities, vec!["audit".to_string(), "rust".to_string()]);
        assert_eq!(rpc.min_fee, "5");
        assert_eq!(rpc.min_bond, "7");
        assert_eq!(rpc.reputation, 64);
    }

    #[test]
    fn mission_converts_status_mode_and_bids() {
        let rpc = mission_to_rpc(sample_mission(MissionStatus::Verifying { at: 3 }));
        assert_eq!(rpc.status, "verifying");
        assert_eq!(rpc.fail_reason, None);
        assert_eq!(rpc.mode, "bidding");
        assert_eq!(rpc.reward, "100");
        assert_eq!(rpc.requester, AgentId::from_bytes([0x11; 32]).to_hex());
        assert_eq!(rpc.assigned_worker, Some(AgentId::from_bytes([0x55; 32]).to_hex()));
        assert_eq!(rpc.required_verifiers, 2);
        assert_eq!(rpc.bids.len(), 1);
        assert_eq!(rpc.bids[0].price, "90");
        assert_eq!(rpc.chain_ref, Some(7));
    }

    #[test]
    fn failed_mission_exposes_its_reason() {
        let rpc = mission_to_rpc(sample_mission(MissionStatus::Failed {
            at: 3,
            reason: FailReason::NoBidders,
        }));
        assert_eq!(rpc.status, "failed");
        assert_eq!(rpc.fail_reason.as_deref(), Some("no_bidders"));
    }

    #[test]
    fn external_requester_renders_as_address() {
        let mut mission = sample_mission(MissionStatus::Posted { at: 1 });
        mission.requester = Requester::External(Address::from_bytes([0xAB; 20]));
        mission.mode = AssignmentMode::DirectHire {
            worker: AgentId::from_bytes([0x55; 32]),
        };
        let rpc = mission_to_rpc(mission);
        assert_eq!(rpc.requester, "0xabababababababababababababababababababab");
        assert_eq!(rpc.mode, "direct_hire");
    }
}
