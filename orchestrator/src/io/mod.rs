//! Side-effecting collaborators: config files, the tree backend, child processes.

pub mod config;
pub mod process;
pub mod prompt;
pub mod tree_client;
pub mod workflowy;
