//! Domain layer: replica state, quorum rules, barriers and the migration
//! round record. No I/O happens here.

pub mod barrier;
pub mod errors;
pub mod migration;
pub mod quorum;
pub mod state;

pub use barrier::Barrier;
pub use errors::{ConsensusError, ConsensusResult};
pub use migration::{MigrationState, ModifiedMap};
pub use quorum::{commit_quorum, prepare_quorum, VoteCounter};
pub use state::{CommitDecision, PbftState, Placement};
