//! Event decoding with ABI-drift guards.
//!
//! The event set is closed: each stream has a fixed table of expected
//! signatures, and every log is checked against the table before decoding —
//! topic count (indexed arguments + selector) first, then data layout. A
//! mismatch is ABI drift and is fatal for the stream, never silently skipped.
//!
//! Decoding itself is the minimal word-oriented subset of the ABI the
//! manager and registry contracts use: static 32-byte words, one level of
//! dynamic offsets for strings and string arrays.

use once_cell::sync::Lazy;

use guildnet_core::error::GuildError;
use guildnet_core::types::{Address, Amount};
use guildnet_crypto::keccak256;

use crate::client::RawLog;

/// Sentinel objective recorded when the submitting transaction's calldata
/// cannot be recovered or decoded.
pub const OBJECTIVE_UNAVAILABLE: &str = "[objective unavailable]";

// ── Event descriptors ────────────────────────────────────────────────────────

struct EventAbi {
    name: &'static str,
    signature: &'static str,
    /// Indexed arguments (topics beyond topic0).
    indexed: usize,
    /// Minimum data length in 32-byte words (dynamic args add more).
    min_data_words: usize,
}

static AGENT_REGISTERED: EventAbi = EventAbi {
    name: "AgentRegistered",
    signature: "AgentRegistered(address,uint8,uint256,uint256,string[])",
    indexed: 1,
    min_data_words: 4,
};
static REPUTATION_UPDATED: EventAbi = EventAbi {
    name: "ReputationUpdated",
    signature: "ReputationUpdated(address,uint256,uint256,string)",
    indexed: 1,
    min_data_words: 3,
};
static PROPOSAL_SUBMITTED: EventAbi = EventAbi {
    name: "ProposalSubmitted",
    signature: "ProposalSubmitted(uint256,address,uint256,uint256)",
    indexed: 2,
    min_data_words: 2,
};
static PROPOSAL_ACCEPTED: EventAbi = EventAbi {
    name: "ProposalAccepted",
    signature: "ProposalAccepted(uint256,uint256,address,address)",
    indexed: 1,
    min_data_words: 3,
};
static WORKER_BOND_POSTED: EventAbi = EventAbi {
    name: "WorkerBondPosted",
    signature: "WorkerBondPosted(uint256,address,uint256)",
    indexed: 1,
    min_data_words: 2,
};
static TASK_STARTED: EventAbi = EventAbi {
    name: "TaskStarted",
    signature: "TaskStarted(uint256)",
    indexed: 1,
    min_data_words: 0,
};
static TASK_COMPLETED: EventAbi = EventAbi {
    name: "TaskCompleted",
    signature: "TaskCompleted(uint256)",
    indexed: 1,
    min_data_words: 0,
};
static TASK_SETTLED: EventAbi = EventAbi {
    name: "TaskSettled",
    signature: "TaskSettled(uint256,bool,uint256)",
    indexed: 1,
    min_data_words: 2,
};
static TASK_EXPIRED: EventAbi = EventAbi {
    name: "TaskExpired",
    signature: "TaskExpired(uint256)",
    indexed: 1,
    min_data_words: 0,
};

static TOPIC0: Lazy<Vec<([u8; 32], &'static EventAbi)>> = Lazy::new(|| {
    [
        &AGENT_REGISTERED,
        &REPUTATION_UPDATED,
        &PROPOSAL_SUBMITTED,
        &PROPOSAL_ACCEPTED,
        &WORKER_BOND_POSTED,
        &TASK_STARTED,
        &TASK_COMPLETED,
        &TASK_SETTLED,
        &TASK_EXPIRED,
    ]
    .into_iter()
    .map(|abi| (keccak256(abi.signature.as_bytes()), abi))
    .collect()
});

// ── Decoded events ───────────────────────────────────────────────────────────

/// Every event the indexer understands, as a closed sum.
#[derive(Clone, Debug, PartialEq)]
pub enum ChainEvent {
    AgentRegistered {
        agent: Address,
        agent_type: u8,
        min_fee: Amount,
        min_bond: Amount,
        capabilities: Vec<String>,
    },
    ReputationUpdated {
        agent: Address,
        old_score: u64,
        new_score: u64,
        reason: String,
    },
    ProposalSubmitted {
        proposal_id: u64,
        proposer: Address,
        escrow: Amount,
        deadline: u64,
    },
    ProposalAccepted {
        proposal_id: u64,
        task_id: u64,
        worker: Address,
        verifier: Address,
    },
    WorkerBondPosted {
        task_id: u64,
        worker: Address,
        amount: Amount,
    },
    TaskStarted {
        task_id: u64,
    },
    TaskCompleted {
        task_id: u64,
    },
    TaskSettled {
        task_id: u64,
        success: bool,
        payout: Amount,
    },
    TaskExpired {
        task_id: u64,
    },
}

/// Decode a raw log against the expected event table.
///
/// Returns `Ok(None)` for topics outside the table (foreign events on the
/// same contract), `Err(AbiDrift)` when a known event no longer matches its
/// expected shape.
pub fn decode_log(log: &RawLog) -> Result<Option<ChainEvent>, GuildError> {
    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };
    let Some((_, abi)) = TOPIC0.iter().find(|(hash, _)| hash == topic0) else {
        return Ok(None);
    };

    // ABI-drift guard: exact indexed-argument count, minimum data size.
    if log.topics.len() != abi.indexed + 1 {
        return Err(GuildError::AbiDrift {
            event: abi.name,
            expected: abi.indexed + 1,
            got: log.topics.len(),
        });
    }
    if log.data.len() < abi.min_data_words * 32 || log.data.len() % 32 != 0 {
        return Err(GuildError::AbiDrift {
            event: abi.name,
            expected: abi.min_data_words,
            got: log.data.len() / 32,
        });
    }

    let event = match abi.name {
        "AgentRegistered" => ChainEvent::AgentRegistered {
            agent: topic_address(log, 1),
            agent_type: word_u64(abi, &log.data, 0)? as u8,
            min_fee: word_u128(abi, &log.data, 1)?,
            min_bond: word_u128(abi, &log.data, 2)?,
            capabilities: dynamic_string_array(abi, &log.data, 3)?,
        },
        "ReputationUpdated" => ChainEvent::ReputationUpdated {
            agent: topic_address(log, 1),
            old_score: word_u64(abi, &log.data, 0)?,
            new_score: word_u64(abi, &log.data, 1)?,
            reason: dynamic_string(abi, &log.data, 2)?,
        },
        "ProposalSubmitted" => ChainEvent::ProposalSubmitted {
            proposal_id: topic_u64(abi, log, 1)?,
            proposer: topic_address(log, 2),
            escrow: word_u128(abi, &log.data, 0)?,
            deadline: word_u64(abi, &log.data, 1)?,
        },
        "ProposalAccepted" => ChainEvent::ProposalAccepted {
            proposal_id: topic_u64(abi, log, 1)?,
            task_id: word_u64(abi, &log.data, 0)?,
            worker: word_address(abi, &log.data, 1)?,
            verifier: word_address(abi, &log.data, 2)?,
        },
        "WorkerBondPosted" => ChainEvent::WorkerBondPosted {
            task_id: topic_u64(abi, log, 1)?,
            worker: word_address(abi, &log.data, 0)?,
            amount: word_u128(abi, &log.data, 1)?,
        },
        "TaskStarted" => ChainEvent::TaskStarted {
            task_id: topic_u64(abi, log, 1)?,
        },
        "TaskCompleted" => ChainEvent::TaskCompleted {
            task_id: topic_u64(abi, log, 1)?,
        },
        "TaskSettled" => ChainEvent::TaskSettled {
            task_id: topic_u64(abi, log, 1)?,
            success: word_u64(abi, &log.data, 0)? != 0,
            payout: word_u128(abi, &log.data, 1)?,
        },
        "TaskExpired" => ChainEvent::TaskExpired {
            task_id: topic_u64(abi, log, 1)?,
        },
        _ => unreachable!("event table covers every ABI entry"),
    };
    Ok(Some(event))
}

/// Recover the objective string from a `submitProposal` transaction's
/// calldata (selector + ABI args, objective first). The event itself omits
/// it, so a decode failure falls back to [`OBJECTIVE_UNAVAILABLE`].
pub fn decode_objective_from_input(input: &[u8]) -> Option<String> {
    // 4-byte selector, then the argument head.
    let args = input.get(4..)?;
    let offset = read_usize(args, 0)?;
    let len = read_usize(args, offset)?;
    let bytes = args.get(offset + 32..offset + 32 + len)?;
    String::from_utf8(bytes.to_vec()).ok()
}

// ── Word readers ─────────────────────────────────────────────────────────────

fn drift(abi: &EventAbi, got_words: usize) -> GuildError {
    GuildError::AbiDrift {
        event: abi.name,
        expected: abi.min_data_words,
        got: got_words,
    }
}

fn word<'d>(abi: &EventAbi, data: &'d [u8], index: usize) -> Result<&'d [u8], GuildError> {
    data.get(index * 32..(index + 1) * 32)
        .ok_or_else(|| drift(abi, data.len() / 32))
}

fn word_u64(abi: &EventAbi, data: &[u8], index: usize) -> Result<u64, GuildError> {
    let w = word(abi, data, index)?;
    if w[..24].iter().any(|b| *b != 0) {
        return Err(drift(abi, index));
    }
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&w[24..]);
    Ok(u64::from_be_bytes(arr))
}

fn word_u128(abi: &EventAbi, data: &[u8], index: usize) -> Result<u128, GuildError> {
    let w = word(abi, data, index)?;
    if w[..16].iter().any(|b| *b != 0) {
        return Err(drift(abi, index));
    }
    let mut arr = [0u8; 16];
    arr.copy_from_slice(&w[16..]);
    Ok(u128::from_be_bytes(arr))
}

fn word_address(abi: &EventAbi, data: &[u8], index: usize) -> Result<Address, GuildError> {
    let w = word(abi, data, index)?;
    if w[..12].iter().any(|b| *b != 0) {
        return Err(drift(abi, index));
    }
    let mut arr = [0u8; 20];
    arr.copy_from_slice(&w[12..]);
    Ok(Address::from_bytes(arr))
}

fn topic_address(log: &RawLog, index: usize) -> Address {
    let mut arr = [0u8; 20];
    arr.copy_from_slice(&log.topics[index][12..]);
    Address::from_bytes(arr)
}

fn topic_u64(abi: &EventAbi, log: &RawLog, index: usize) -> Result<u64, GuildError> {
    let w = &log.topics[index];
    if w[..24].iter().any(|b| *b != 0) {
        return Err(drift(abi, index));
    }
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&w[24..]);
    Ok(u64::from_be_bytes(arr))
}

fn read_usize(data: &[u8], at: usize) -> Option<usize> {
    let w = data.get(at..at + 32)?;
    if w[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&w[24..]);
    Some(u64::from_be_bytes(arr) as usize)
}

fn dynamic_string(abi: &EventAbi, data: &[u8], head_index: usize) -> Result<String, GuildError> {
    let offset = read_usize(data, head_index * 32).ok_or_else(|| drift(abi, head_index))?;
    let len = read_usize(data, offset).ok_or_else(|| drift(abi, head_index))?;
    let bytes = data
        .get(offset + 32..offset + 32 + len)
        .ok_or_else(|| drift(abi, head_index))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| drift(abi, head_index))
}

fn dynamic_string_array(
    abi: &EventAbi,
    data: &[u8],
    head_index: usize,
) -> Result<Vec<String>, GuildError> {
    let base = read_usize(data, head_index * 32).ok_or_else(|| drift(abi, head_index))?;
    let count = read_usize(data, base).ok_or_else(|| drift(abi, head_index))?;
    let elements = base + 32;

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let rel = read_usize(data, elements + i * 32).ok_or_else(|| drift(abi, head_index))?;
        let at = elements + rel;
        let len = read_usize(data, at).ok_or_else(|| drift(abi, head_index))?;
        let bytes = data
            .get(at + 32..at + 32 + len)
            .ok_or_else(|| drift(abi, head_index))?;
        out.push(String::from_utf8(bytes.to_vec()).map_err(|_| drift(abi, head_index))?);
    }
    Ok(out)
}

// ── Encoding helpers for tests ───────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod encode {
    //! Minimal ABI writer used by indexer tests to fabricate logs.

    pub fn word_u64(v: u64) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[24..].copy_from_slice(&v.to_be_bytes());
        w
    }

    pub fn word_u128(v: u128) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[16..].copy_from_slice(&v.to_be_bytes());
        w
    }

    pub fn word_address(a: &guildnet_core::types::Address) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[12..].copy_from_slice(a.as_bytes());
        w
    }

    pub fn padded_string(s: &str) -> Vec<u8> {
        let mut out = word_u64(s.len() as u64).to_vec();
        out.extend_from_slice(s.as_bytes());
        let pad = (32 - s.len() % 32) % 32;
        out.extend(std::iter::repeat(0u8).take(pad));
        out
    }

    /// head word (offset) is written by the caller; this builds the tail of
    /// a string[] at a given base offset.
    pub fn string_array_tail(items: &[&str]) -> Vec<u8> {
        let mut tail = word_u64(items.len() as u64).to_vec();
        let mut bodies: Vec<Vec<u8>> = Vec::new();
        let mut rel = items.len() * 32;
        let mut offsets = Vec::new();
        for item in items {
            offsets.push(rel);
            let body = padded_string(item);
            rel += body.len();
            bodies.push(body);
        }
        for off in offsets {
            tail.extend_from_slice(&word_u64(off as u64));
        }
        for body in bodies {
            tail.extend_from_slice(&body);
        }
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildnet_core::types::TxHash;

    fn topic0_of(signature: &str) -> [u8; 32] {
        keccak256(signature.as_bytes())
    }

    fn log(topics: Vec<[u8; 32]>, data: Vec<u8>) -> RawLog {
        RawLog {
            address: Address::from_bytes([0xAA; 20]),
            topics,
            data,
            block_number: 1,
            tx_hash: TxHash::from_bytes([1u8; 32]),
            log_index: 0,
        }
    }

    #[test]
    fn decodes_agent_registered_with_capabilities() {
        let agent = Address::from_bytes([0x11; 20]);
        let mut data = Vec::new();
        data.extend_from_slice(&encode::word_u64(1)); // agentType
        data.extend_from_slice(&encode::word_u128(7)); // minFee
        data.extend_from_slice(&encode::word_u128(9)); // minBond
        data.extend_from_slice(&encode::word_u64(4 * 32)); // offset to string[]
        data.extend_from_slice(&encode::string_array_tail(&["rust", "audit"]));

        let raw = log(
            vec![
                topic0_of("AgentRegistered(address,uint8,uint256,uint256,string[])"),
                encode::word_address(&agent),
            ],
            data,
        );
        let event = decode_log(&raw).unwrap().unwrap();
        assert_eq!(
            event,
            ChainEvent::AgentRegistered {
                agent,
                agent_type: 1,
                min_fee: 7,
                min_bond: 9,
                capabilities: vec!["rust".into(), "audit".into()],
            }
        );
    }

    #[test]
    fn decodes_task_settled() {
        let raw = log(
            vec![
                topic0_of("TaskSettled(uint256,bool,uint256)"),
                encode::word_u64(42),
            ],
            [encode::word_u64(1), encode::word_u128(85)].concat(),
        );
        assert_eq!(
            decode_log(&raw).unwrap().unwrap(),
            ChainEvent::TaskSettled {
                task_id: 42,
                success: true,
                payout: 85,
            }
        );
    }

    #[test]
    fn unknown_topic_is_skipped_not_drift() {
        let raw = log(vec![keccak256(b"SomethingElse(uint256)")], vec![]);
        assert_eq!(decode_log(&raw).unwrap(), None);
    }

    #[test]
    fn wrong_topic_count_is_abi_drift() {
        // TaskStarted expects exactly one indexed argument.
        let raw = log(
            vec![
                topic0_of("TaskStarted(uint256)"),
                encode::word_u64(1),
                encode::word_u64(2),
            ],
            vec![],
        );
        assert!(matches!(
            decode_log(&raw).unwrap_err(),
            GuildError::AbiDrift {
                event: "TaskStarted",
                ..
            }
        ));
    }

    #[test]
    fn truncated_data_is_abi_drift() {
        let raw = log(
            vec![
                topic0_of("TaskSettled(uint256,bool,uint256)"),
                encode::word_u64(42),
            ],
            encode::word_u64(1).to_vec(), // missing the payout word
        );
        assert!(matches!(
            decode_log(&raw).unwrap_err(),
            GuildError::AbiDrift { .. }
        ));
    }

    #[test]
    fn objective_recovers_from_calldata() {
        // selector ‖ offset ‖ len ‖ "ship the docs" padded
        let mut input = vec![0xde, 0xad, 0xbe, 0xef];
        input.extend_from_slice(&encode::word_u64(32));
        input.extend_from_slice(&encode::padded_string("ship the docs"));
        assert_eq!(
            decode_objective_from_input(&input).as_deref(),
            Some("ship the docs")
        );

        assert_eq!(decode_objective_from_input(&[0x01, 0x02]), None);
    }
}
