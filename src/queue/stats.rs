//! Queue Statistics Module

use serde::Serialize;

// == Queue Stats ==
/// Snapshot of the admission queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Tickets currently admitted
    pub in_flight: usize,
    /// Tickets currently waiting
    pub waiting: usize,
    /// Callers with at least one waiting ticket
    pub callers_waiting: usize,
    pub admitted: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub completed: u64,
}
