pub mod relayer;
pub mod safety;
pub mod typed_data;

pub use relayer::{AcceptProposalRequest, RejectProposalRequest, SignedMessage, SigningRelayer};
pub use typed_data::TypedDomain;
