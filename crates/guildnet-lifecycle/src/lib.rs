pub mod bonds;
pub mod engine;
pub mod escrow;
pub mod settlement;
pub mod sweeper;

pub use bonds::BondManager;
pub use engine::{CreateMission, MissionEngine};
pub use escrow::EscrowEngine;
pub use settlement::SettlementEngine;
pub use sweeper::run_sweeper;
