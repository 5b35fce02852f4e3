//! Process-wide in-flight broadcast counter used to drain on shutdown.
//!
//! Every broadcast calls [`DrainController::begin`] on arrival and holds the
//! returned [`InFlight`] guard until its last delivery has finished and its
//! buffer is released. Shutdown awaits [`DrainController::wait_for_zero`]
//! after the listener stops accepting connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct DrainController {
    in_flight: AtomicUsize,
    idle: Notify,
}

impl DrainController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more broadcast in flight until the guard is dropped.
    #[must_use = "dropping the guard immediately ends the broadcast"]
    pub fn begin(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlight {
            controller: Arc::clone(self),
        }
    }

    fn end(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            self.idle.notify_waiters();
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn wait_for_zero(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so an `end` between the load and the
            // await still wakes us.
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Bounded [`wait_for_zero`](Self::wait_for_zero). Returns `false` if
    /// broadcasts were still in flight when `limit` elapsed.
    pub async fn wait_for_zero_within(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.wait_for_zero()).await.is_ok()
    }
}

/// Guard for one in-flight broadcast.
#[derive(Debug)]
pub struct InFlight {
    controller: Arc<DrainController>,
}

impl InFlight {
    pub fn end(self) {
        drop(self);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.controller.end();
    }
}
