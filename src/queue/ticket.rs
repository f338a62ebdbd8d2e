//! Queue Ticket Module
//!
//! Identity and lifecycle of a single admission request.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

// == Request Id ==
/// Unique per submission; correlates cancellation and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

// == Ticket State ==
/// `Waiting -> Admitted -> Completed`, or `Waiting -> Rejected | TimedOut | Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Waiting,
    Admitted,
    Completed,
    Rejected,
    TimedOut,
    Cancelled,
}

// == Queue Ticket ==
#[derive(Debug, Clone)]
pub struct QueueTicket {
    pub caller_id: String,
    pub request_id: RequestId,
    pub enqueued_at: Instant,
    pub state: TicketState,
}

impl QueueTicket {
    pub fn new(caller_id: impl Into<String>, request_id: RequestId) -> Self {
        Self {
            caller_id: caller_id.into(),
            request_id,
            enqueued_at: Instant::now(),
            state: TicketState::Waiting,
        }
    }

    /// Time since the ticket was submitted.
    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}
