//! Deployment configuration.
//!
//! Values come from environment variables with CLI flags layered on top by
//! the binary. `from_env` fails fast on anything malformed so a bad deploy
//! exits non-zero before touching state.

use crate::constants::{
    BIDDING_THRESHOLD_UNITS, BIDDING_WINDOW_SECS, DEFAULT_FAIL_SLASH_BPS,
    DEFAULT_MAX_ESCROW_UNITS, DEFAULT_RATE_LIMIT_PER_MINUTE,
};
use crate::error::GuildError;
use crate::types::{Address, Amount};

/// Everything the node needs to run one deployment.
#[derive(Clone, Debug)]
pub struct Config {
    /// Outbound JSON-RPC endpoint of the settlement chain.
    pub chain_rpc_url: String,
    pub chain_id: u64,
    /// Manager contract (mission/proposal events, typed-data verifier).
    pub manager_address: Address,
    /// Agent registry contract.
    pub registry_address: Address,
    /// Relayer secret key, 32-byte hex. Absent disables the relayer.
    pub signer_key: Option<String>,
    /// Ceiling on escrow the relayer will co-sign for (smallest units).
    pub max_escrow: Amount,
    pub rate_limit_per_minute: u32,
    /// Path for the sled database.
    pub db_url: String,
    /// Worker-bond slash fraction on FAIL, basis points. Deployment policy.
    pub fail_slash_bps: u128,
    /// Reward threshold at which missions go to bidding.
    pub bidding_threshold: Amount,
    /// Bidding window length (seconds).
    pub bidding_window_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_rpc_url: "http://127.0.0.1:8545".into(),
            chain_id: 1,
            manager_address: Address::ZERO,
            registry_address: Address::ZERO,
            signer_key: None,
            max_escrow: DEFAULT_MAX_ESCROW_UNITS,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            db_url: "./guildnet-data".into(),
            fail_slash_bps: DEFAULT_FAIL_SLASH_BPS,
            bidding_threshold: BIDDING_THRESHOLD_UNITS,
            bidding_window_secs: BIDDING_WINDOW_SECS,
        }
    }
}

impl Config {
    /// Resolve configuration from the process environment. Unset optional
    /// vars fall back to defaults; malformed values are fatal.
    pub fn from_env() -> Result<Self, GuildError> {
        let mut cfg = Config::default();

        if let Ok(v) = std::env::var("CHAIN_RPC_URL") {
            cfg.chain_rpc_url = v;
        }
        if let Ok(v) = std::env::var("CHAIN_ID") {
            cfg.chain_id = v
                .parse()
                .map_err(|_| GuildError::InvalidInput(format!("CHAIN_ID: {v}")))?;
        }
        if let Ok(v) = std::env::var("MANAGER_ADDRESS") {
            cfg.manager_address = Address::from_hex(&v)
                .map_err(|_| GuildError::InvalidInput(format!("MANAGER_ADDRESS: {v}")))?;
        }
        if let Ok(v) = std::env::var("REGISTRY_ADDRESS") {
            cfg.registry_address = Address::from_hex(&v)
                .map_err(|_| GuildError::InvalidInput(format!("REGISTRY_ADDRESS: {v}")))?;
        }
        if let Ok(v) = std::env::var("SIGNER_KEY") {
            if !v.is_empty() {
                cfg.signer_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("MAX_ESCROW") {
            cfg.max_escrow = v
                .parse()
                .map_err(|_| GuildError::InvalidInput(format!("MAX_ESCROW: {v}")))?;
        }
        if let Ok(v) = std::env::var("RATE_LIMIT_PER_MINUTE") {
            cfg.rate_limit_per_minute = v
                .parse()
                .map_err(|_| GuildError::InvalidInput(format!("RATE_LIMIT_PER_MINUTE: {v}")))?;
        }
        if let Ok(v) = std::env::var("DB_URL") {
            cfg.db_url = v;
        }
        if let Ok(v) = std::env::var("FAIL_SLASH_BPS") {
            let bps: u128 = v
                .parse()
                .map_err(|_| GuildError::InvalidInput(format!("FAIL_SLASH_BPS: {v}")))?;
            if bps > 10_000 {
                return Err(GuildError::InvalidInput(format!(
                    "FAIL_SLASH_BPS exceeds 10000: {bps}"
                )));
            }
            cfg.fail_slash_bps = bps;
        }

        Ok(cfg)
    }
}
