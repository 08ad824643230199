//! Agent directory types.
//!
//! Agents are created once, may be deactivated and reactivated, and are never
//! deleted. The cached `reputation` field is always the last recomputation
//! from the outcome log, never an incrementally mutated score.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::GuildError;
use crate::types::{Address, AgentId, Amount, Timestamp};

/// What an agent is allowed to do in the market.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentRole {
    Worker,
    Verifier,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Worker => "worker",
            AgentRole::Verifier => "verifier",
        }
    }
}

/// Capability and resource-limit declaration supplied at registration.
/// Opaque to the engine beyond the required fields checked in [`validate`].
///
/// [`validate`]: NeuralSpec::validate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeuralSpec(pub serde_json::Value);

impl NeuralSpec {
    /// Required fields: `model`, `context_window`, `max_concurrency`.
    pub fn validate(&self) -> Result<(), GuildError> {
        let obj = self
            .0
            .as_object()
            .ok_or(GuildError::InvalidAgentSpec("object"))?;
        for field in ["model", "context_window", "max_concurrency"] {
            if !obj.contains_key(field) {
                return Err(GuildError::InvalidAgentSpec(match field {
                    "model" => "model",
                    "context_window" => "context_window",
                    _ => "max_concurrency",
                }));
            }
        }
        Ok(())
    }
}

/// A registered market participant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    /// Public-key identity on the settlement chain.
    pub address: Address,
    pub role: AgentRole,
    /// Specialty tags this agent can serve.
    pub capabilities: BTreeSet<String>,
    /// Minimum fee the agent accepts (smallest units).
    pub min_fee: Amount,
    /// Minimum bond the agent is prepared to stake.
    pub min_bond: Amount,
    /// Cached reputation score in [0, 100].
    pub reputation: i64,
    pub active: bool,
    /// Operator that registered this agent; used for verifier diversity.
    pub registered_by: Address,
    pub neural_spec: NeuralSpec,
    /// BLAKE3 of the issued bearer API key. The key itself is never stored.
    pub api_key_hash: [u8; 32],
    pub registered_at: Timestamp,
}

impl Agent {
    /// True iff this agent can serve every one of `specialties`.
    pub fn covers(&self, specialties: &BTreeSet<String>) -> bool {
        specialties.iter().all(|s| self.capabilities.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(json: serde_json::Value) -> NeuralSpec {
        NeuralSpec(json)
    }

    #[test]
    fn neural_spec_requires_all_fields() {
        let ok = spec(serde_json::json!({
            "model": "gpt-x", "context_window": 128_000, "max_concurrency": 4
        }));
        assert!(ok.validate().is_ok());

        let missing = spec(serde_json::json!({ "model": "gpt-x" }));
        assert!(matches!(
            missing.validate().unwrap_err(),
            GuildError::InvalidAgentSpec(_)
        ));

        let not_obj = spec(serde_json::json!("just a string"));
        assert!(not_obj.validate().is_err());
    }
}
