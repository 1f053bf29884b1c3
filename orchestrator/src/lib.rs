//! Task and dialog orchestration over a WorkFlowy outline.
//!
//! The engine polls a backlog node, dispatches agent-assigned tasks and
//! dialogs awaiting the agent to pluggable agents, writes results back into
//! the tree according to each task's autonomy tier, and summarizes activity
//! as a digest. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, classification,
//!   selection, dialog state, digest rendering). No I/O.
//! - **[`io`]**: Side-effecting collaborators (config files, the tree API,
//!   child processes, prompt templates).
//! - **[`agents`]**: The agent interface and its implementations.
//!
//! Orchestration modules ([`dialog`], [`engine`]) coordinate core logic with
//! I/O to implement the CLI commands.

pub mod agents;
pub mod core;
pub mod dialog;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tree;
