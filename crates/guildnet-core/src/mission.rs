//! Mission types and the status state machine.
//!
//! A mission transitions monotonically:
//!
//! `posted → (bidding_open) → assigned → executing → verifying → settled | failed`
//!
//! Status order is enforced through [`MissionStatus::rank`]; a transition to a
//! lower rank is rejected by the lifecycle engine. Terminal missions are
//! immutable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::{Address, AgentId, Amount, MissionId, Timestamp};

/// Verifier count is keyed off risk: low→1, medium→2, high→3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn required_verifiers(&self) -> usize {
        match self {
            RiskTier::Low => 1,
            RiskTier::Medium => 2,
            RiskTier::High => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

/// How the worker is chosen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentMode {
    /// Reputation-weighted probabilistic selection.
    Autopilot,
    /// Competitive bidding for high-reward missions.
    Bidding,
    /// Requester-specified worker.
    DirectHire { worker: AgentId },
}

/// Why a mission ended in `failed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailReason {
    NoBidders,
    NoEligibleAgents,
    DeadlineExpired,
    VerdictFail,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::NoBidders => "no_bidders",
            FailReason::NoEligibleAgents => "no_eligible_agents",
            FailReason::DeadlineExpired => "deadline_expired",
            FailReason::VerdictFail => "verdict_fail",
        }
    }
}

/// Mission lifecycle status. Payload timestamps record when the transition
/// happened; `Failed` additionally carries the reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MissionStatus {
    Posted { at: Timestamp },
    BiddingOpen { at: Timestamp, closes_at: Timestamp },
    Assigned { at: Timestamp },
    Executing { at: Timestamp },
    Verifying { at: Timestamp },
    Settled { at: Timestamp },
    Failed { at: Timestamp, reason: FailReason },
}

impl MissionStatus {
    /// Monotonic ordering of the state machine. Transitions must strictly
    /// increase rank except for `revise` (verifying → executing), which the
    /// engine allows explicitly.
    pub fn rank(&self) -> u8 {
        match self {
            MissionStatus::Posted { .. } => 0,
            MissionStatus::BiddingOpen { .. } => 1,
            MissionStatus::Assigned { .. } => 2,
            MissionStatus::Executing { .. } => 3,
            MissionStatus::Verifying { .. } => 4,
            MissionStatus::Settled { .. } => 5,
            MissionStatus::Failed { .. } => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MissionStatus::Settled { .. } | MissionStatus::Failed { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Posted { .. } => "posted",
            MissionStatus::BiddingOpen { .. } => "bidding_open",
            MissionStatus::Assigned { .. } => "assigned",
            MissionStatus::Executing { .. } => "executing",
            MissionStatus::Verifying { .. } => "verifying",
            MissionStatus::Settled { .. } => "settled",
            MissionStatus::Failed { .. } => "failed",
        }
    }
}

/// A bid placed during the bidding window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub bidder: AgentId,
    /// Asking price; must not exceed the mission reward.
    pub price: Amount,
    /// Estimated completion time in seconds.
    pub eta_secs: u64,
    /// Bond the bidder pledges to stake on assignment.
    pub bond_pledge: Amount,
    pub submitted_at: Timestamp,
}

/// A work artifact recorded at submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// BLAKE3 digest of the artifact content.
    pub digest: [u8; 32],
    pub size: u64,
    pub submitter: AgentId,
}

/// Who posted the mission: a registered agent or an external principal
/// identified by chain address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requester {
    Agent(AgentId),
    External(Address),
}

impl Requester {
    /// Ledger owner key for escrow accounting.
    pub fn owner_id(&self) -> AgentId {
        match self {
            Requester::Agent(id) => *id,
            Requester::External(addr) => {
                AgentId::from_bytes(*blake3::hash(addr.as_bytes()).as_bytes())
            }
        }
    }
}

/// A priced unit of work with a reward, deadline, and lifecycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Mission {
    pub mission_id: MissionId,
    pub requester: Requester,
    pub objective: String,
    pub reward: Amount,
    pub deadline: Timestamp,
    pub specialties: BTreeSet<String>,
    pub risk: RiskTier,
    pub mode: AssignmentMode,
    pub status: MissionStatus,
    pub created_at: Timestamp,
    pub assigned_worker: Option<AgentId>,
    pub assigned_verifiers: Vec<AgentId>,
    /// Verifier quorum; starts at `risk.required_verifiers()` and may be
    /// upgraded from 2 to 3 on a split verdict.
    pub required_verifiers: usize,
    pub bids: Vec<Bid>,
    pub artifacts: Vec<Artifact>,
    pub revision_count: u32,
    /// Requester rating 1–5, settable until settlement; weighted into the
    /// worker's outcome row.
    pub rating: Option<u8>,
    /// Set for crew subtasks. A parent settles only after every subtask is
    /// terminal.
    pub parent: Option<MissionId>,
    /// On-chain proposal id for missions mirrored by the indexer.
    pub chain_ref: Option<u64>,
}

impl Mission {
    pub fn is_subtask(&self) -> bool {
        self.parent.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_rank_is_monotonic() {
        let order = [
            MissionStatus::Posted { at: 0 },
            MissionStatus::BiddingOpen { at: 0, closes_at: 0 },
            MissionStatus::Assigned { at: 0 },
            MissionStatus::Executing { at: 0 },
            MissionStatus::Verifying { at: 0 },
            MissionStatus::Settled { at: 0 },
        ];
        for pair in order.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn risk_maps_to_verifier_count() {
        assert_eq!(RiskTier::Low.required_verifiers(), 1);
        assert_eq!(RiskTier::Medium.required_verifiers(), 2);
        assert_eq!(RiskTier::High.required_verifiers(), 3);
    }

    #[test]
    fn terminal_states() {
        assert!(MissionStatus::Settled { at: 1 }.is_terminal());
        assert!(MissionStatus::Failed {
            at: 1,
            reason: FailReason::NoBidders
        }
        .is_terminal());
        assert!(!MissionStatus::Verifying { at: 1 }.is_terminal());
    }
}
