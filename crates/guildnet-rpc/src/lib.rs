pub mod api;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerState};
