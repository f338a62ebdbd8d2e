//! Admission Queue
//!
//! Bounds concurrent lookups per caller and globally. Requests over either
//! cap wait in a per-caller FIFO line; freed slots go round-robin to callers
//! with waiting tickets so a bursty caller cannot starve the others.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::queue::{QueueStats, QueueTicket, RequestId, TicketState};

// == Queue Limits ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Concurrent admissions across all callers
    pub max_global: usize,
    /// Concurrent admissions for one caller
    pub max_per_caller: usize,
    /// Waiting tickets one caller may hold before new ones are rejected
    pub max_queue_depth_per_caller: usize,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            max_global: 3,
            max_per_caller: 1,
            max_queue_depth_per_caller: 5,
        }
    }
}

// == Admission Error ==
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    /// The caller's wait line was already full
    #[error("wait line for caller is full")]
    Rejected,

    #[error("timed out waiting for admission")]
    TimedOut,

    /// Withdrawn through `cancel` while still waiting
    #[error("admission cancelled while waiting")]
    Cancelled,
}

impl AdmissionError {
    /// Final state of a ticket that ended with this error.
    pub fn ticket_state(self) -> TicketState {
        match self {
            AdmissionError::Rejected => TicketState::Rejected,
            AdmissionError::TimedOut => TicketState::TimedOut,
            AdmissionError::Cancelled => TicketState::Cancelled,
        }
    }
}

struct Waiter {
    ticket: QueueTicket,
    notify: oneshot::Sender<()>,
}

// == Queue State ==
/// Everything guarded by the queue's single lock.
#[derive(Default)]
struct QueueState {
    in_flight: usize,
    in_flight_per_caller: HashMap<String, usize>,
    lines: HashMap<String, VecDeque<Waiter>>,
    /// Callers with a non-empty line, in round-robin order
    rotation: VecDeque<String>,
    stats: QueueStats,
}

impl QueueState {
    fn in_flight_for(&self, caller_id: &str) -> usize {
        self.in_flight_per_caller.get(caller_id).copied().unwrap_or(0)
    }

    fn can_admit_now(&self, caller_id: &str, limits: &QueueLimits) -> bool {
        self.in_flight < limits.max_global
            && self.in_flight_for(caller_id) < limits.max_per_caller
            && !self.lines.contains_key(caller_id)
    }

    fn grant(&mut self, caller_id: &str) {
        self.in_flight += 1;
        *self
            .in_flight_per_caller
            .entry(caller_id.to_string())
            .or_insert(0) += 1;
        self.stats.admitted += 1;
    }

    fn release(&mut self, caller_id: &str) {
        let per_caller = self.in_flight_per_caller.get_mut(caller_id);
        match per_caller {
            Some(count) if *count > 0 && self.in_flight > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.in_flight_per_caller.remove(caller_id);
                }
                self.in_flight -= 1;
            }
            _ => panic!(
                "admission slot released for caller '{}' that holds none (in_flight={})",
                caller_id, self.in_flight
            ),
        }
    }

    fn line_len(&self, caller_id: &str) -> usize {
        self.lines.get(caller_id).map_or(0, VecDeque::len)
    }

    fn enqueue(&mut self, waiter: Waiter) {
        let caller_id = waiter.ticket.caller_id.clone();
        let line = self.lines.entry(caller_id.clone()).or_default();
        if line.is_empty() {
            self.rotation.push_back(caller_id);
        }
        line.push_back(waiter);
    }

    /// Takes a still-waiting ticket out of its line.
    fn remove_waiter(&mut self, caller_id: &str, request_id: RequestId) -> Option<Waiter> {
        let line = self.lines.get_mut(caller_id)?;
        let position = line
            .iter()
            .position(|w| w.ticket.request_id == request_id)?;
        let waiter = line.remove(position);
        if line.is_empty() {
            self.lines.remove(caller_id);
            self.rotation.retain(|c| c != caller_id);
        }
        waiter
    }

    /// Next caller in rotation whose head ticket fits under its cap.
    fn next_eligible_caller(&mut self, limits: &QueueLimits) -> Option<String> {
        for _ in 0..self.rotation.len() {
            let caller_id = self.rotation.pop_front()?;
            if self.in_flight_for(&caller_id) < limits.max_per_caller {
                return Some(caller_id);
            }
            self.rotation.push_back(caller_id);
        }
        None
    }

    // == Dispatch ==
    /// Admits waiters while global slots are free.
    fn dispatch(&mut self, limits: &QueueLimits) {
        while self.in_flight < limits.max_global {
            let Some(caller_id) = self.next_eligible_caller(limits) else {
                break;
            };
            let Some(line) = self.lines.get_mut(&caller_id) else {
                continue;
            };
            let Some(waiter) = line.pop_front() else {
                self.lines.remove(&caller_id);
                continue;
            };
            if line.is_empty() {
                self.lines.remove(&caller_id);
            } else {
                self.rotation.push_back(caller_id.clone());
            }

            let waited = waiter.ticket.waited();
            if waiter.notify.send(()).is_ok() {
                self.grant(&caller_id);
                debug!(
                    caller = %caller_id,
                    request = %waiter.ticket.request_id,
                    waited_ms = waited.as_millis() as u64,
                    "Admitted waiting request"
                );
            }
        }
    }

    fn snapshot(&self) -> QueueStats {
        QueueStats {
            in_flight: self.in_flight,
            waiting: self.lines.values().map(VecDeque::len).sum(),
            callers_waiting: self.lines.len(),
            ..self.stats.clone()
        }
    }
}

struct Shared {
    limits: QueueLimits,
    state: Mutex<QueueState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// == Admission Queue ==
/// Cloneable handle to one shared admission queue.
#[derive(Clone)]
pub struct AdmissionQueue {
    shared: Arc<Shared>,
}

impl AdmissionQueue {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            shared: Arc::new(Shared {
                limits,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub fn limits(&self) -> QueueLimits {
        self.shared.limits
    }

    // == Admit ==
    /// Waits up to `timeout` for a slot for `caller_id`.
    ///
    /// Rejects immediately when the caller already has
    /// `max_queue_depth_per_caller` waiting tickets. Dropping the returned
    /// future while it waits withdraws the ticket.
    pub async fn admit(
        &self,
        caller_id: &str,
        request_id: RequestId,
        timeout: Duration,
    ) -> Result<AdmissionHandle, AdmissionError> {
        let limits = self.shared.limits;
        let mut ticket = QueueTicket::new(caller_id, request_id);

        let rx = {
            let mut state = self.shared.lock();
            if state.can_admit_now(caller_id, &limits) {
                state.grant(caller_id);
                debug!(caller = caller_id, request = %request_id, "Admitted immediately");
                return Ok(self.handle(ticket));
            }

            if state.line_len(caller_id) >= limits.max_queue_depth_per_caller {
                state.stats.rejected += 1;
                ticket.state = AdmissionError::Rejected.ticket_state();
                warn!(
                    caller = caller_id,
                    request = %request_id,
                    state = ?ticket.state,
                    depth = limits.max_queue_depth_per_caller,
                    "Wait line full, rejecting request"
                );
                return Err(AdmissionError::Rejected);
            }

            let (tx, rx) = oneshot::channel();
            state.enqueue(Waiter {
                ticket: ticket.clone(),
                notify: tx,
            });
            debug!(caller = caller_id, request = %request_id, "Request waiting for admission");
            rx
        };

        let mut pending = PendingAdmission {
            shared: Arc::clone(&self.shared),
            caller_id: caller_id.to_string(),
            request_id,
            rx,
            settled: false,
        };

        let waited = tokio::time::timeout(timeout, &mut pending.rx).await;
        let outcome = match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(AdmissionError::Cancelled),
            Err(_) => pending.settle_after_timeout(),
        };
        pending.settled = true;

        match outcome {
            Ok(()) => Ok(self.handle(ticket)),
            Err(err) => {
                ticket.state = err.ticket_state();
                debug!(
                    caller = caller_id,
                    request = %request_id,
                    state = ?ticket.state,
                    waited_ms = ticket.waited().as_millis() as u64,
                    "Request not admitted"
                );
                Err(err)
            }
        }
    }

    // == Cancel ==
    /// Withdraws a still-waiting ticket. Returns false if it is not waiting
    /// (already admitted, finished or unknown).
    pub fn cancel(&self, caller_id: &str, request_id: RequestId) -> bool {
        let mut state = self.shared.lock();
        match state.remove_waiter(caller_id, request_id) {
            Some(_) => {
                state.stats.cancelled += 1;
                debug!(caller = caller_id, request = %request_id, "Waiting request cancelled");
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.lock().snapshot()
    }

    /// Admitted tickets currently held by `caller_id`.
    pub fn in_flight_for(&self, caller_id: &str) -> usize {
        self.shared.lock().in_flight_for(caller_id)
    }

    fn handle(&self, mut ticket: QueueTicket) -> AdmissionHandle {
        ticket.state = TicketState::Admitted;
        AdmissionHandle {
            shared: Arc::clone(&self.shared),
            ticket,
            released: false,
        }
    }
}

// == Pending Admission ==
/// A ticket sitting in a wait line; cleans up after itself if abandoned.
struct PendingAdmission {
    shared: Arc<Shared>,
    caller_id: String,
    request_id: RequestId,
    rx: oneshot::Receiver<()>,
    settled: bool,
}

impl PendingAdmission {
    /// Resolves a wait whose timer fired. A grant that raced the timer wins.
    fn settle_after_timeout(&mut self) -> Result<(), AdmissionError> {
        let mut state = self.shared.lock();
        if state.remove_waiter(&self.caller_id, self.request_id).is_some() {
            state.stats.timed_out += 1;
            return Err(AdmissionError::TimedOut);
        }
        match self.rx.try_recv() {
            Ok(()) => Ok(()),
            Err(_) => Err(AdmissionError::Cancelled),
        }
    }
}

impl Drop for PendingAdmission {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let limits = self.shared.limits;
        let mut state = self.shared.lock();
        if state.remove_waiter(&self.caller_id, self.request_id).is_some() {
            state.stats.cancelled += 1;
            debug!(caller = %self.caller_id, request = %self.request_id, "Abandoned waiting request");
        } else if self.rx.try_recv().is_ok() {
            // granted after the waiter stopped listening
            state.release(&self.caller_id);
            state.stats.cancelled += 1;
            state.dispatch(&limits);
        }
    }
}

// == Admission Handle ==
/// Proof of an admitted ticket; frees its slot exactly once on release or drop.
pub struct AdmissionHandle {
    shared: Arc<Shared>,
    ticket: QueueTicket,
    released: bool,
}

impl AdmissionHandle {
    pub fn ticket(&self) -> &QueueTicket {
        &self.ticket
    }

    // == Release ==
    /// Frees one global and one per-caller slot and admits the next fair waiter.
    pub fn release(mut self) {
        self.release_slot();
    }

    fn release_slot(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.ticket.state = TicketState::Completed;

        let limits = self.shared.limits;
        let mut state = self.shared.lock();
        state.release(&self.ticket.caller_id);
        state.stats.completed += 1;
        state.dispatch(&limits);
        debug!(
            caller = %self.ticket.caller_id,
            request = %self.ticket.request_id,
            "Released admission slot"
        );
    }
}

impl Drop for AdmissionHandle {
    fn drop(&mut self) {
        self.release_slot();
    }
}

impl std::fmt::Debug for AdmissionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionHandle")
            .field("ticket", &self.ticket)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::task;
    use tokio_test::{assert_pending, assert_ready, assert_ready_err, assert_ready_ok};

    const LONG: Duration = Duration::from_secs(60);

    fn queue(max_global: usize, max_per_caller: usize, depth: usize) -> AdmissionQueue {
        AdmissionQueue::new(QueueLimits {
            max_global,
            max_per_caller,
            max_queue_depth_per_caller: depth,
        })
    }

    #[test]
    fn test_errors_map_to_final_ticket_states() {
        assert_eq!(AdmissionError::Rejected.ticket_state(), TicketState::Rejected);
        assert_eq!(AdmissionError::TimedOut.ticket_state(), TicketState::TimedOut);
        assert_eq!(AdmissionError::Cancelled.ticket_state(), TicketState::Cancelled);
    }

    #[tokio::test]
    async fn test_admits_immediately_under_caps() {
        let queue = queue(2, 2, 1);

        let a = queue.admit("alice", RequestId(1), LONG).await.unwrap();
        let b = queue.admit("alice", RequestId(2), LONG).await.unwrap();

        assert_eq!(a.ticket().state, TicketState::Admitted);
        assert_eq!(queue.in_flight_for("alice"), 2);
        assert_eq!(queue.stats().in_flight, 2);

        a.release();
        drop(b);
        assert_eq!(queue.stats().in_flight, 0);
        assert_eq!(queue.stats().completed, 2);
    }

    #[tokio::test]
    async fn test_per_caller_fifo() {
        let queue = queue(5, 1, 5);
        let first = queue.admit("alice", RequestId(1), LONG).await.unwrap();

        let mut second = task::spawn(queue.admit("alice", RequestId(2), LONG));
        let mut third = task::spawn(queue.admit("alice", RequestId(3), LONG));
        assert_pending!(second.poll());
        assert_pending!(third.poll());

        first.release();

        assert!(second.is_woken());
        let second = assert_ready_ok!(second.poll());
        assert_eq!(second.ticket().request_id, RequestId(2));
        assert_pending!(third.poll());

        second.release();
        let third = assert_ready_ok!(third.poll());
        assert_eq!(third.ticket().request_id, RequestId(3));
    }

    #[tokio::test]
    async fn test_depth_overflow_is_rejected_immediately() {
        let queue = queue(1, 1, 2);
        let _held = queue.admit("alice", RequestId(1), LONG).await.unwrap();

        let mut w1 = task::spawn(queue.admit("alice", RequestId(2), LONG));
        let mut w2 = task::spawn(queue.admit("alice", RequestId(3), LONG));
        assert_pending!(w1.poll());
        assert_pending!(w2.poll());

        let mut w3 = task::spawn(queue.admit("alice", RequestId(4), LONG));
        assert_eq!(assert_ready_err!(w3.poll()), AdmissionError::Rejected);
        assert_eq!(queue.stats().rejected, 1);
        assert_eq!(queue.stats().waiting, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_and_leaves_the_line() {
        let queue = queue(1, 1, 5);
        let held = queue.admit("alice", RequestId(1), LONG).await.unwrap();

        let result = queue.admit("bob", RequestId(2), Duration::from_secs(5)).await;

        assert_eq!(result.unwrap_err(), AdmissionError::TimedOut);
        let stats = queue.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.waiting, 0);
        assert_eq!(stats.callers_waiting, 0);

        held.release();
        assert_eq!(queue.stats().in_flight, 0, "Timed-out ticket must not be admitted later");
    }

    #[tokio::test]
    async fn test_round_robin_across_callers() {
        let queue = queue(1, 5, 5);
        let held = queue.admit("alice", RequestId(1), LONG).await.unwrap();

        // alice queues a burst before bob arrives
        let mut a2 = task::spawn(queue.admit("alice", RequestId(2), LONG));
        let mut a3 = task::spawn(queue.admit("alice", RequestId(3), LONG));
        let mut b1 = task::spawn(queue.admit("bob", RequestId(4), LONG));
        assert_pending!(a2.poll());
        assert_pending!(a3.poll());
        assert_pending!(b1.poll());

        held.release();
        let a2 = assert_ready_ok!(a2.poll());
        assert_pending!(b1.poll());

        a2.release();
        let b1 = assert_ready_ok!(b1.poll());
        assert_pending!(a3.poll(), "bob is served before alice's second queued request");

        b1.release();
        assert_ready_ok!(a3.poll());
    }

    #[tokio::test]
    async fn test_capped_caller_does_not_block_others() {
        let queue = queue(3, 1, 5);
        let _alice = queue.admit("alice", RequestId(1), LONG).await.unwrap();

        let mut alice_again = task::spawn(queue.admit("alice", RequestId(2), LONG));
        assert_pending!(alice_again.poll());

        let bob = queue.admit("bob", RequestId(3), LONG).await;
        assert!(bob.is_ok(), "Free global slots go to callers under their own cap");
    }

    #[tokio::test]
    async fn test_cancel_waiting_ticket() {
        let queue = queue(1, 1, 5);
        let held = queue.admit("alice", RequestId(1), LONG).await.unwrap();

        let mut waiting = task::spawn(queue.admit("bob", RequestId(2), LONG));
        assert_pending!(waiting.poll());

        assert!(queue.cancel("bob", RequestId(2)));
        assert_eq!(assert_ready_err!(waiting.poll()), AdmissionError::Cancelled);
        assert!(!queue.cancel("bob", RequestId(2)), "Second cancel is a no-op");
        assert!(!queue.cancel("alice", RequestId(1)), "Admitted tickets cannot be cancelled");

        held.release();
        assert_eq!(queue.stats().in_flight, 0);
        assert_eq!(queue.stats().cancelled, 1);
    }

    #[tokio::test]
    async fn test_dropping_waiting_future_withdraws_ticket() {
        let queue = queue(1, 1, 5);
        let held = queue.admit("alice", RequestId(1), LONG).await.unwrap();

        let mut waiting = task::spawn(queue.admit("bob", RequestId(2), LONG));
        assert_pending!(waiting.poll());
        drop(waiting);

        assert_eq!(queue.stats().waiting, 0);
        held.release();
        assert_eq!(queue.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_grant_to_abandoned_waiter_is_returned() {
        let queue = queue(1, 1, 5);
        let held = queue.admit("alice", RequestId(1), LONG).await.unwrap();

        let mut bob = task::spawn(queue.admit("bob", RequestId(2), LONG));
        let mut carol = task::spawn(queue.admit("carol", RequestId(3), LONG));
        assert_pending!(bob.poll());
        assert_pending!(carol.poll());

        // bob is granted the slot but gives up before observing it
        held.release();
        assert_eq!(queue.in_flight_for("bob"), 1);
        drop(bob);

        assert_eq!(queue.in_flight_for("bob"), 0);
        assert_ready_ok!(carol.poll());
    }

    #[tokio::test]
    async fn test_handle_released_once_on_drop_after_release() {
        let queue = queue(1, 1, 1);
        let handle = queue.admit("alice", RequestId(1), LONG).await.unwrap();
        handle.release();

        let again = queue.admit("alice", RequestId(2), LONG).await;
        assert!(again.is_ok());
        assert_eq!(queue.stats().completed, 1);
    }

    #[test]
    #[should_panic(expected = "holds none")]
    fn test_releasing_unheld_slot_is_fatal() {
        let mut state = QueueState::default();
        state.release("ghost");
    }

    #[tokio::test]
    async fn test_zero_depth_rejects_every_wait() {
        let queue = queue(1, 1, 0);
        let _held = queue.admit("alice", RequestId(1), LONG).await.unwrap();

        let mut next = task::spawn(queue.admit("bob", RequestId(2), LONG));
        assert_ready!(next.poll()).unwrap_err();
    }
}
