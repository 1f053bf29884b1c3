//! Stable exit codes for orchestrator CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, missing credentials, or another setup error.
pub const INVALID: i32 = 1;
/// `orchestrator once` could not complete its tick or digest write.
pub const TICK_FAILED: i32 = 2;
