//! Deadline timers
//!
//! A [`DeadlineTimer`] fires once at or after an absolute wall-clock deadline.
//! Only the deadline is ever persisted; after a restart a fresh timer is built
//! from it. A deadline already in the past fires on the next scheduler turn,
//! never inline from the constructor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct DeadlineTimer {
    deadline: DateTime<Utc>,
    cancel: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl DeadlineTimer {
    /// Arm a timer. `now` comes from the caller's clock so deadlines line up
    /// with the rest of the state machine.
    pub fn start<F>(deadline: DateTime<Utc>, now: DateTime<Utc>, on_fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = remaining_time(deadline, now).unwrap_or(Duration::ZERO);
        let cancel = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));

        let token = cancel.clone();
        let fired_flag = fired.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(%deadline, "deadline timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    if !token.is_cancelled() {
                        fired_flag.store(true, Ordering::SeqCst);
                        on_fire();
                    }
                }
            }
        });

        Self {
            deadline,
            cancel,
            fired,
        }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Safe to call any number of times, including after the timer fired
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for DeadlineTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineTimer")
            .field("deadline", &self.deadline)
            .field("fired", &self.has_fired())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Time left until `deadline`, or `None` if it has passed
pub fn remaining_time(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    deadline.signed_duration_since(now).to_std().ok()
}

/// Whether `deadline` is at or before `now`
pub fn has_expired(deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    deadline <= now
}
