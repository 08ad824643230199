//! Deterministic reputation recomputation.
//!
//! A score is never mutated in place: it is always recomputed from the
//! append-only outcome log. The sum is commutative, so recomputation is
//! order-independent and replay-safe.

use guildnet_core::constants::{
    DELTA_VERIFIER_ALIGNED, DELTA_VERIFIER_OUTLIER, DELTA_WORKER_FAIL, DELTA_WORKER_PASS,
    REPUTATION_BASE, REPUTATION_MAX, REPUTATION_MIN,
};
use guildnet_core::records::{BondRole, JobOutcome, OutcomeKind};

/// Score with the per-source contributions, so a caller can explain it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReputationBreakdown {
    pub base: i64,
    /// Sum of PASS / aligned-verifier deltas.
    pub settlements: i64,
    /// Sum of rating-weighted adjustments on rated worker passes.
    pub ratings: i64,
    /// Sum of FAIL and outlier deltas (nonpositive).
    pub failures: i64,
    /// clamp(base + settlements + ratings + failures, 0, 100).
    pub score: i64,
}

/// Recompute an agent's reputation from its full outcome history.
pub fn reputation(outcomes: &[JobOutcome]) -> ReputationBreakdown {
    let mut settlements = 0i64;
    let mut ratings = 0i64;
    let mut failures = 0i64;

    for outcome in outcomes {
        match (outcome.role, outcome.outcome) {
            (BondRole::Worker, OutcomeKind::Pass) => {
                settlements += DELTA_WORKER_PASS;
                if let Some(rating) = outcome.rating {
                    // Rating 1–5 centred on 3: ±2 at the extremes.
                    ratings += rating as i64 - 3;
                }
            }
            (BondRole::Worker, OutcomeKind::Fail) => failures += DELTA_WORKER_FAIL,
            (BondRole::Verifier, OutcomeKind::Pass) => settlements += DELTA_VERIFIER_ALIGNED,
            (BondRole::Verifier, OutcomeKind::Outlier) => failures += DELTA_VERIFIER_OUTLIER,
            // A verifier on the losing side of a FAIL-worthy mission still
            // aligned with consensus gets the aligned delta; rows recorded
            // as worker OUTLIER or verifier FAIL do not occur, but uninvoked
            // combinations contribute zero.
            _ => {}
        }
    }

    let raw = REPUTATION_BASE + settlements + ratings + failures;
    ReputationBreakdown {
        base: REPUTATION_BASE,
        settlements,
        ratings,
        failures,
        score: raw.clamp(REPUTATION_MIN, REPUTATION_MAX),
    }
}
