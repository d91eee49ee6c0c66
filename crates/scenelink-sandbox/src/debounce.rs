//! Trailing-edge debouncer
//!
//! Collapses a burst of triggers into one firing `delay` after the last of
//! them. The latest triggered value wins.

use std::pin::Pin;
use std::time::Duration;
use tokio::time::{self, Instant, Sleep};

/// Trailing-edge debouncer driven from a `select!` loop
///
/// [`Debouncer::fired`] is cancel-safe: dropping the future before it
/// completes keeps the pending value and deadline.
#[derive(Debug)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<T>,
    sleep: Pin<Box<Sleep>>,
}

impl<T> Debouncer<T> {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            sleep: Box::pin(time::sleep(delay)),
        }
    }

    /// Store `value` and push the deadline out to `now + delay`
    pub fn trigger(&mut self, value: T) {
        self.pending = Some(value);
        self.sleep.as_mut().reset(Instant::now() + self.delay);
    }

    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending value without firing
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take()
    }

    /// Resolve with the latest value once the quiet period has elapsed
    ///
    /// Never resolves while nothing is pending.
    pub async fn fired(&mut self) -> T {
        loop {
            if self.pending.is_none() {
                std::future::pending::<()>().await;
            }
            self.sleep.as_mut().await;
            if let Some(value) = self.pending.take() {
                return value;
            }
        }
    }
}
