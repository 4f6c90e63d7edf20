//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod batch;
pub mod quota;
pub mod status;
pub mod unit;
pub mod units;
