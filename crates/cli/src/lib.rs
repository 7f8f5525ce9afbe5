//! osc CLI library
//!
//! The command implementations behind the `osc` binary, exported for
//! integration tests.

pub mod backend;
pub mod commands;
pub mod exit_code;
pub mod output;
