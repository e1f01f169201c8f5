//! # Transaction Source Port
//!
//! Where the supervisor pulls the transfers it injects from.

use crate::domain::SupervisorResult;
use shared_types::Transaction;

/// A finite stream of transfers read in batches.
///
/// Reads are blocking; the supervisor calls them off the async runtime.
pub trait TxSource: Send {
    /// Up to `max` further transfers. An empty batch ends the stream.
    fn next_batch(&mut self, max: usize) -> SupervisorResult<Vec<Transaction>>;
}
