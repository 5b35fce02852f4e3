//! Per-broadcast completion tracking.
//!
//! Each delivery owns a [`DeliveryToken`]. Anything that still reads the
//! buffered body, or still streams the primary's response to the caller,
//! holds a clone of that token. The [`CompletionWaiter`] resolves only once
//! every clone is gone, which is the earliest point the buffer file may be
//! deleted.

use std::time::Duration;

use axum::body::Body;
use futures_util::StreamExt;
use hyper::StatusCode;
use tokio::sync::mpsc;

/// Outcome of one delivery, kept for logs and counters.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub index: usize,
    pub status: Option<StatusCode>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl DeliveryReport {
    #[must_use]
    pub const fn is_primary(&self) -> bool {
        self.index == 0
    }

    #[must_use]
    pub const fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryToken {
    tx: mpsc::UnboundedSender<DeliveryReport>,
}

#[derive(Debug)]
pub struct CompletionWaiter {
    rx: mpsc::UnboundedReceiver<DeliveryReport>,
}

#[must_use]
pub fn channel() -> (DeliveryToken, CompletionWaiter) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DeliveryToken { tx }, CompletionWaiter { rx })
}

impl DeliveryToken {
    pub fn report(&self, report: DeliveryReport) {
        // The waiter outlives every token, so a closed channel is unreachable
        let _ = self.tx.send(report);
    }

    /// Wrap `body` so this delivery stays open until the body is dropped.
    #[must_use]
    pub fn hold_until_dropped(self, body: Body) -> Body {
        Body::from_stream(body.into_data_stream().map(move |chunk| {
            let _held = &self;
            chunk
        }))
    }
}

impl CompletionWaiter {
    /// Collect reports until every token clone has been dropped.
    pub async fn wait(mut self) -> Vec<DeliveryReport> {
        let mut reports = Vec::new();
        while let Some(report) = self.rx.recv().await {
            reports.push(report);
        }
        reports
    }
}
