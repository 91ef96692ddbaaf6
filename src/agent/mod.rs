//! Autonomous behaviour: the agent loop, its governor and critic, the
//! planner and the self-improver.

mod autonomous;
pub mod critic;
pub mod governor;
pub mod improver;
pub mod planner;
pub mod simulator;
pub mod thoughts;

pub use autonomous::{AutonomousAgent, Observation};
pub use improver::SelfImprover;
