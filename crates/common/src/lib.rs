//! Shared utilities for the trickle workspace: configuration loading,
//! logging setup and retry helpers.

pub mod utils;
