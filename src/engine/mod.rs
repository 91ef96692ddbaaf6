//! Execution engine: everything that touches the filesystem or runs tools.
//!
//! [`Router`] is the entry point; the other modules are the individual
//! capabilities it dispatches to.

pub mod analyzer;
pub mod apps;
pub mod commands;
pub mod deps;
pub mod docker;
pub mod env;
pub mod git;
pub mod health;
pub mod process;
mod router;
pub mod scaffold;
pub mod undo;

pub use router::{Outcome, PlanReview, Router, expand_home};
pub use undo::UndoManager;
