//! Queue Module
//!
//! Fair, bounded admission of lookups per caller and globally.

mod limiter;
mod stats;
mod ticket;


pub use limiter::{AdmissionError, AdmissionHandle, AdmissionQueue, QueueLimits};
pub use stats::QueueStats;
pub use ticket::{QueueTicket, RequestId, TicketState};
