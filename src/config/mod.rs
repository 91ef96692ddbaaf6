//! Configuration module for VAL.
//!
//! Provides CLI argument parsing and the data directory layout.

#[allow(clippy::module_inception)]
mod config;

pub use config::AppConfig;
