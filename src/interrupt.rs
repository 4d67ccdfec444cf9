//! Process-wide interrupt signal
//!
//! A single raised/clear flag shared by the hotkey listener (which raises it)
//! and the conversation loop, capture service and player (which consume it).
//! The flag lives under a mutex paired with a condition variable, so a raise
//! that lands before the consumer starts waiting is still observed.
//!
//! Capture and playback poll with [`InterruptSignal::wait_timeout_and_consume`]
//! instead of blocking forever. Worst-case latency between a raise and the
//! poller noticing it is one poll interval.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Shared cancellation flag with exactly-once consumption
#[derive(Debug, Default)]
pub struct InterruptSignal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl InterruptSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        // A panic while holding the lock cannot leave a bool half-written.
        self.raised.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise the signal. Idempotent and callable from any thread.
    pub fn raise(&self) {
        let mut raised = self.flag();
        if !*raised {
            *raised = true;
            self.cond.notify_all();
        }
    }

    /// Block until raised, then clear it in the same critical section.
    pub fn wait_and_consume(&self) {
        let mut raised = self.flag();
        while !*raised {
            raised = self
                .cond
                .wait(raised)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *raised = false;
    }

    /// Bounded variant of [`wait_and_consume`](Self::wait_and_consume).
    ///
    /// Returns `true` if the signal was raised (and is now cleared) within
    /// `timeout`, `false` if the interval elapsed first.
    pub fn wait_timeout_and_consume(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut raised = self.flag();
        while !*raised {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(raised, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            raised = guard;
        }
        *raised = false;
        true
    }

    /// Discard any pending raise
    pub fn clear(&self) {
        *self.flag() = false;
    }

    pub fn is_raised(&self) -> bool {
        *self.flag()
    }
}
