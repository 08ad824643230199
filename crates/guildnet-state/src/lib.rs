pub mod db;
pub mod ledger;
pub mod locks;

pub use db::StateDb;
pub use ledger::{Ledger, LedgerAccount};
pub use locks::KeyedLocks;
