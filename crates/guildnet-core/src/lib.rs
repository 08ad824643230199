pub mod agent;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod mission;
pub mod records;
pub mod types;

pub use agent::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use constants::*;
pub use error::GuildError;
pub use mission::*;
pub use records::*;
pub use types::*;
