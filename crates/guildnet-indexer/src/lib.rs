pub mod client;
pub mod events;
pub mod scanner;

pub use client::{ChainRpc, HttpChainClient, RawLog};
pub use events::{decode_log, decode_objective_from_input, ChainEvent};
pub use scanner::{ChainStream, StreamScanner};
