pub mod assignment;
pub mod dispatch;

pub use assignment::AssignmentEngine;
pub use dispatch::DispatchQueue;
