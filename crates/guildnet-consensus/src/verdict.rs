//! Verifier consensus evaluation.
//!
//! Given the votes cast on a mission and the required verifier count N, decide
//! PASS / FAIL / DISPUTE and flag outliers. Pure function of its inputs:
//! evaluating the same vote set twice yields the same decision.

use guildnet_core::records::{Verdict, Vote};
use guildnet_core::types::AgentId;

/// The decision over a complete vote set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsensusOutcome {
    Pass,
    Fail,
    /// Even split; the mission needs an extra verifier.
    Dispute,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConsensusDecision {
    pub outcome: ConsensusOutcome,
    /// Verifiers whose verdict disagreed with the majority.
    pub outliers: Vec<AgentId>,
}

/// Evaluate the votes for a mission with required verifier count `required`
/// (1–3, chosen by risk tier).
///
/// Returns `None` while fewer than `required` votes exist — the mission stays
/// in `verifying`.
pub fn evaluate(votes: &[Vote], required: usize) -> Option<ConsensusDecision> {
    if votes.len() < required {
        return None;
    }

    // Only the first `required` votes count; extra rows cannot exist because
    // the lifecycle engine rejects votes from unassigned verifiers.
    let votes = &votes[..required];

    let pass: Vec<&Vote> = votes.iter().filter(|v| v.verdict == Verdict::Pass).collect();
    let fail: Vec<&Vote> = votes.iter().filter(|v| v.verdict == Verdict::Fail).collect();

    let decision = match (pass.len(), fail.len()) {
        // Unanimous either way.
        (p, 0) if p == required => ConsensusDecision {
            outcome: ConsensusOutcome::Pass,
            outliers: Vec::new(),
        },
        (0, f) if f == required => ConsensusDecision {
            outcome: ConsensusOutcome::Fail,
            outliers: Vec::new(),
        },
        // Two-verifier split: dispute, both sides flagged, panel upgraded
        // downstream. Any other even tie defaults to FAIL.
        (p, f) if p == f && required == 2 => ConsensusDecision {
            outcome: ConsensusOutcome::Dispute,
            outliers: votes.iter().map(|v| v.verifier_id).collect(),
        },
        (p, f) if p == f => ConsensusDecision {
            outcome: ConsensusOutcome::Fail,
            outliers: pass.iter().map(|v| v.verifier_id).collect(),
        },
        // Majority rules; the minority are outliers.
        (p, f) if p > f => ConsensusDecision {
            outcome: ConsensusOutcome::Pass,
            outliers: fail.iter().map(|v| v.verifier_id).collect(),
        },
        _ => ConsensusDecision {
            outcome: ConsensusOutcome::Fail,
            outliers: pass.iter().map(|v| v.verifier_id).collect(),
        },
    };

    Some(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildnet_core::types::MissionId;

    fn vote(tag: u8, verdict: Verdict) -> Vote {
        Vote {
            mission_id: MissionId::from_bytes([0u8; 32]),
            verifier_id: AgentId::from_bytes([tag; 32]),
            verdict,
            reason: String::new(),
            at: 0,
        }
    }

    #[test]
    fn below_quorum_no_decision() {
        assert_eq!(evaluate(&[], 1), None);
        assert_eq!(evaluate(&[vote(1, Verdict::Pass)], 2), None);
        assert_eq!(
            evaluate(&[vote(1, Verdict::Pass), vote(2, Verdict::Fail)], 3),
            None
        );
    }

    #[test]
    fn single_verifier_is_decisive() {
        let d = evaluate(&[vote(1, Verdict::Pass)], 1).unwrap();
        assert_eq!(d.outcome, ConsensusOutcome::Pass);
        assert!(d.outliers.is_empty());

        let d = evaluate(&[vote(1, Verdict::Fail)], 1).unwrap();
        assert_eq!(d.outcome, ConsensusOutcome::Fail);
    }

    #[test]
    fn two_verifier_split_is_dispute_with_both_flagged() {
        let d = evaluate(&[vote(1, Verdict::Pass), vote(2, Verdict::Fail)], 2).unwrap();
        assert_eq!(d.outcome, ConsensusOutcome::Dispute);
        assert_eq!(d.outliers.len(), 2);
    }

    #[test]
    fn two_verifier_agreement() {
        let d = evaluate(&[vote(1, Verdict::Pass), vote(2, Verdict::Pass)], 2).unwrap();
        assert_eq!(d.outcome, ConsensusOutcome::Pass);
        assert!(d.outliers.is_empty());

        let d = evaluate(&[vote(1, Verdict::Fail), vote(2, Verdict::Fail)], 2).unwrap();
        assert_eq!(d.outcome, ConsensusOutcome::Fail);
    }

    #[test]
    fn three_verifier_majority_flags_minority() {
        let d = evaluate(
            &[
                vote(1, Verdict::Pass),
                vote(2, Verdict::Fail),
                vote(3, Verdict::Pass),
            ],
            3,
        )
        .unwrap();
        assert_eq!(d.outcome, ConsensusOutcome::Pass);
        assert_eq!(d.outliers, vec![AgentId::from_bytes([2u8; 32])]);

        let d = evaluate(
            &[
                vote(1, Verdict::Fail),
                vote(2, Verdict::Fail),
                vote(3, Verdict::Pass),
            ],
            3,
        )
        .unwrap();
        assert_eq!(d.outcome, ConsensusOutcome::Fail);
        assert_eq!(d.outliers, vec![AgentId::from_bytes([3u8; 32])]);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let votes = [
            vote(1, Verdict::Pass),
            vote(2, Verdict::Fail),
            vote(3, Verdict::Pass),
        ];
        assert_eq!(evaluate(&votes, 3), evaluate(&votes, 3));
    }
}
