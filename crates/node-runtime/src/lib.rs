//! # Node Runtime Library
//!
//! Command-line parsing and process wiring for the `node-runtime` binary,
//! exposed as a library so the wiring can be exercised from tests.
//!
//! ## Startup Sequence
//!
//! 1. Parse flags into an [`EmulatorConfig`](shared_types::EmulatorConfig)
//!    and validate it
//! 2. Initialise tracing and metrics
//! 3. Bind the accept loop on this process's address
//! 4. Run the replica or the supervisor until the run is stopped

pub mod cli;
pub mod runtime;

pub use cli::Cli;
pub use runtime::{run_shard_node, run_supervisor, run_supervisor_with};
