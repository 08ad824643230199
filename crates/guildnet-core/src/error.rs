use thiserror::Error;

/// Domain errors for the guildnet core. Every variant maps to a stable
/// numeric code via [`GuildError::code`] so the facade can return it to
/// clients without leaking internals.
#[derive(Debug, Error)]
pub enum GuildError {
    // ── Ledger errors ────────────────────────────────────────────────────────
    #[error("insufficient funds: need {need} units, have {have}")]
    InsufficientFunds { need: u128, have: u128 },

    #[error("already locked for {purpose}: mission {mission}")]
    DoubleLock { mission: String, purpose: &'static str },

    #[error("no {purpose} lock found for mission {mission}")]
    LockNotFound { mission: String, purpose: &'static str },

    // ── Lifecycle errors ─────────────────────────────────────────────────────
    #[error("caller is not the assigned {role} for this mission")]
    NotAssigned { role: &'static str },

    #[error("invalid state: mission is {actual}, operation requires {expected}")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },

    #[error("bidding closed with no valid bids")]
    NoBidders,

    #[error("no eligible agents match the mission requirements")]
    NoEligibleAgents,

    #[error("direct hire rejected: {0}")]
    InvalidDirectHire(String),

    #[error("mission deadline has expired")]
    DeadlineExpired,

    #[error("verifier has already voted on this mission")]
    DuplicateVote,

    #[error("revision limit reached ({max} per mission)")]
    RevisionLimit { max: u32 },

    #[error("a work submission is required before verification")]
    MissingArtifact,

    #[error("conflicting claim: {0}")]
    ConflictingClaim(String),

    // ── Directory errors ─────────────────────────────────────────────────────
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("unknown mission: {0}")]
    UnknownMission(String),

    #[error("agent is deactivated")]
    AgentInactive,

    #[error("agent declaration missing required field: {0}")]
    InvalidAgentSpec(&'static str),

    #[error("invalid api key")]
    Unauthorized,

    #[error("operation not permitted for role {0}")]
    Forbidden(&'static str),

    // ── Relayer errors ───────────────────────────────────────────────────────
    #[error("signing refused: {0}")]
    SafetyRejection(String),

    #[error("rate limit exceeded: {limit} requests per minute")]
    RateLimited { limit: u32 },

    #[error("invalid signature")]
    InvalidSignature,

    // ── Chain errors ─────────────────────────────────────────────────────────
    #[error("upstream chain RPC unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("event ABI drift on {event}: expected {expected} topics, got {got}")]
    AbiDrift {
        event: &'static str,
        expected: usize,
        got: usize,
    },

    // ── Input validation ─────────────────────────────────────────────────────
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // ── Serialization / storage (ambient) ────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl GuildError {
    /// Stable error code surfaced by the RPC facade. Codes are part of the
    /// external contract; renumbering is a breaking change.
    pub fn code(&self) -> i32 {
        match self {
            GuildError::InsufficientFunds { .. } => 1001,
            GuildError::DoubleLock { .. } => 1002,
            GuildError::LockNotFound { .. } => 1003,
            GuildError::NotAssigned { .. } => 1101,
            GuildError::InvalidState { .. } => 1102,
            GuildError::NoBidders => 1103,
            GuildError::NoEligibleAgents => 1104,
            GuildError::InvalidDirectHire(_) => 1105,
            GuildError::DeadlineExpired => 1106,
            GuildError::DuplicateVote => 1107,
            GuildError::RevisionLimit { .. } => 1108,
            GuildError::MissingArtifact => 1109,
            GuildError::ConflictingClaim(_) => 1110,
            GuildError::UnknownAgent(_) => 1201,
            GuildError::UnknownMission(_) => 1202,
            GuildError::AgentInactive => 1203,
            GuildError::InvalidAgentSpec(_) => 1204,
            GuildError::Unauthorized => 1205,
            GuildError::Forbidden(_) => 1206,
            GuildError::SafetyRejection(_) => 1301,
            GuildError::RateLimited { .. } => 1302,
            GuildError::InvalidSignature => 1303,
            GuildError::UpstreamUnavailable(_) => 1401,
            GuildError::AbiDrift { .. } => 1402,
            GuildError::InvalidInput(_) => 1501,
            GuildError::Serialization(_) => 1901,
            GuildError::Storage(_) => 1902,
        }
    }

    /// Whether a retry without changes can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GuildError::UpstreamUnavailable(_) | GuildError::Storage(_)
        )
    }
}
