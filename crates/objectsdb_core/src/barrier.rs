//! Access barrier ordering field accesses against commits.
//!
//! Any number of field accesses may run at once, each holding an
//! [`AccessTicket`]. A commit closes the gate to new tickets, waits for the
//! live ones to drain, runs, and reopens the gate. The barrier does not make
//! two writers of the same field exclusive; it only guarantees that a commit
//! never observes a half-finished access.
//!
//! A ticket that is never dropped stalls every later commit. Field accessor
//! closures must therefore not call back into the session.

use parking_lot::{Condvar, Mutex};
use tracing::trace;

#[derive(Debug, Default)]
struct BarrierState {
    tickets: usize,
    committing: bool,
    commits: u64,
}

/// Ticketed drain barrier, one per session.
#[derive(Debug, Default)]
pub struct AccessBarrier {
    state: Mutex<BarrierState>,
    changed: Condvar,
}

impl AccessBarrier {
    /// Creates an open barrier with no live tickets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes an access ticket, waiting while a commit is in progress.
    pub fn acquire(&self) -> AccessTicket<'_> {
        let mut state = self.state.lock();
        while state.committing {
            self.changed.wait(&mut state);
        }
        state.tickets += 1;
        AccessTicket { barrier: self }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.tickets -= 1;
        if state.tickets == 0 {
            self.changed.notify_all();
        }
    }

    /// Closes the gate, waits for all tickets to drain, then runs `commit`.
    ///
    /// The gate reopens when `commit` returns, whether it succeeded, failed
    /// or panicked, so a failed commit never blocks later accesses.
    /// Concurrent callers run one after the other.
    pub fn drain_and_commit<T, F>(&self, commit: F) -> T
    where
        F: FnOnce() -> T,
    {
        {
            let mut state = self.state.lock();
            while state.committing {
                self.changed.wait(&mut state);
            }
            state.committing = true;
            trace!(live = state.tickets, "commit gate closed, draining");
            while state.tickets > 0 {
                self.changed.wait(&mut state);
            }
        }

        let _reopen = Reopen { barrier: self };
        commit()
    }

    /// Number of tickets currently held.
    #[must_use]
    pub fn live_tickets(&self) -> usize {
        self.state.lock().tickets
    }

    /// Returns true while a commit holds the gate closed.
    #[must_use]
    pub fn is_committing(&self) -> bool {
        self.state.lock().committing
    }

    /// Number of commits that have passed through the barrier.
    #[must_use]
    pub fn commits(&self) -> u64 {
        self.state.lock().commits
    }
}

/// Proof of one in-flight field access. Dropping it releases the access.
#[derive(Debug)]
#[must_use = "the access ends as soon as the ticket is dropped"]
pub struct AccessTicket<'a> {
    barrier: &'a AccessBarrier,
}

impl Drop for AccessTicket<'_> {
    fn drop(&mut self) {
        self.barrier.release();
    }
}

struct Reopen<'a> {
    barrier: &'a AccessBarrier,
}

impl Drop for Reopen<'_> {
    fn drop(&mut self) {
        let mut state = self.barrier.state.lock();
        state.committing = false;
        state.commits += 1;
        self.barrier.changed.notify_all();
        trace!("commit gate reopened");
    }
}
