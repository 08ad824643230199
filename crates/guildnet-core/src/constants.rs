//! ─── Guildnet economics constants ────────────────────────────────────────────
//!
//! One table for every fee, bond fraction, window, and indexer limit. All
//! fee/bond fractions are basis points (1 bp = 0.01%) over integer amounts;
//! no floating arithmetic anywhere in the money path.

use once_cell::sync::Lazy;

use crate::types::{AgentId, Amount};

/// Ledger identity that collects protocol fees and slashed stakes.
pub static TREASURY: Lazy<AgentId> =
    Lazy::new(|| AgentId::from_bytes(*blake3::hash(b"guildnet:treasury").as_bytes()));

// ── Units ────────────────────────────────────────────────────────────────────

/// 1 GUILD expressed in smallest units.
pub const UNITS_PER_TOKEN: Amount = 1_000_000_000_000_000_000;

/// Basis-point denominator.
pub const BPS: u128 = 10_000;

// ── Fees (applied to the mission reward at settlement) ───────────────────────

/// Protocol fee kept by the treasury on a PASS settlement.
pub const PROTOCOL_FEE_BPS: u128 = 1_000; // 10%

/// Verifier pool split evenly among non-outlier voters on a PASS settlement.
pub const VERIFIER_FEE_BPS: u128 = 500; // 5%

// ── Bonds ────────────────────────────────────────────────────────────────────

/// Worker bond staked at mission start.
pub const WORKER_BOND_BPS: u128 = 2_000; // 20% of reward

/// Verifier bond staked per voter.
pub const VERIFIER_BOND_BPS: u128 = 500; // 5% of reward

/// Fixed anti-spam bond locked with the reward at mission creation and
/// returned to the requester at any terminal state.
pub const PROPOSAL_BOND_UNITS: Amount = UNITS_PER_TOKEN / 10; // 0.1 GUILD

/// Default worker-bond slash fraction on a FAIL settlement. Deployment
/// policy; override via config.
pub const DEFAULT_FAIL_SLASH_BPS: u128 = 10_000; // 100%

/// Outlier verifier bond slash fraction. Fixed, not configurable.
pub const OUTLIER_SLASH_BPS: u128 = 10_000; // 100%

// ── Reputation deltas ────────────────────────────────────────────────────────

/// Score every agent starts from.
pub const REPUTATION_BASE: i64 = 50;

pub const REPUTATION_MIN: i64 = 0;
pub const REPUTATION_MAX: i64 = 100;

/// Worker PASS delta (before any rating weighting).
pub const DELTA_WORKER_PASS: i64 = 2;

/// Worker FAIL delta.
pub const DELTA_WORKER_FAIL: i64 = -15;

/// Verifier aligned-with-consensus delta.
pub const DELTA_VERIFIER_ALIGNED: i64 = 1;

/// Verifier outlier delta.
pub const DELTA_VERIFIER_OUTLIER: i64 = -10;

// ── Assignment ───────────────────────────────────────────────────────────────

/// Missions with reward at or above this go through bidding.
pub const BIDDING_THRESHOLD_UNITS: Amount = 100 * UNITS_PER_TOKEN;

/// Default bidding window length (seconds).
pub const BIDDING_WINDOW_SECS: i64 = 600;

/// Minimum reputation to be considered for assignment.
pub const REPUTATION_FLOOR: i64 = 30;

/// One-time floor relaxation when no candidate passes the filter.
pub const REPUTATION_FLOOR_RELAX: i64 = 10;

/// Recent-assignment window for the fairness weight (assignments counted
/// across the specialty).
pub const FAIRNESS_WINDOW: usize = 20;

/// Verifier budget share of the reward used for fee-reasonableness checks.
pub const VERIFIER_BUDGET_BPS: u128 = 500; // 5%

/// Maximum verifiers per mission.
pub const MAX_VERIFIERS: usize = 3;

// ── Lifecycle ────────────────────────────────────────────────────────────────

/// Maximum `revise` round-trips per mission.
pub const MAX_REVISIONS: u32 = 5;

/// Deadline sweep interval (seconds).
pub const SWEEP_INTERVAL_SECS: u64 = 60;

// ── Dispatch queue ───────────────────────────────────────────────────────────

/// Agent liveness window: alive iff `now − last_poll` is under this.
pub const LIVENESS_WINDOW_SECS: i64 = 90;

/// Default dispatch task TTL (seconds).
pub const DISPATCH_TTL_SECS: i64 = 3_600;

/// Maximum tasks returned by a single poll.
pub const MAX_POLL_LIMIT: usize = 100;

// ── Chain indexer ────────────────────────────────────────────────────────────

/// Log-range request width. Provider hard limit is 99 blocks; stay under it.
pub const LOG_RANGE_BLOCKS: u64 = 90;

/// Poll interval between scan windows (seconds).
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Blocks re-scanned after a restart / gap jump to absorb reorgs.
pub const SAFE_LOOKBACK_BLOCKS: u64 = 200;

/// Transient-error retry policy: capped exponential backoff.
pub const RETRY_MAX_ATTEMPTS: u32 = 5;
pub const RETRY_BACKOFF_CAP_SECS: u64 = 60;

/// Every outbound RPC and store call gets this operation timeout.
pub const OPERATION_TIMEOUT_SECS: u64 = 30;

// ── Signing relayer ──────────────────────────────────────────────────────────

/// Default signing rate limit per caller per minute.
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 10;

/// Default ceiling on escrow the relayer will co-sign for.
pub const DEFAULT_MAX_ESCROW_UNITS: Amount = 10_000 * UNITS_PER_TOKEN;

/// Typed-data domain name and version advertised to the verifying contract.
pub const TYPED_DATA_DOMAIN_NAME: &str = "GuildManager";
pub const TYPED_DATA_DOMAIN_VERSION: &str = "1";
