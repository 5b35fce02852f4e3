//! Broadcast coordination for one inbound request.
//!
//! Lifecycle: arrive (id + drain guard), buffer the body, start one
//! delivery task per target, return as soon as the primary resolves, and
//! hand the rest to a completion waiter that releases the buffer and the
//! drain guard once every delivery has finished.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::completion::{self, CompletionWaiter, DeliveryReport};
use super::dispatch::{Delivery, InboundRequest};
use crate::buffer::{BufferHandle, RequestBuffer};
use crate::drain::InFlight;
use crate::server::{AppState, Stats};

#[allow(clippy::cast_possible_truncation)]
pub async fn broadcast(state: Arc<AppState>, request: Request) -> Response {
    let request_id: Arc<str> = Arc::from(state.ids.next_id());
    let in_flight = state.drain.begin();
    let started = Instant::now();
    state.stats.broadcasts.fetch_add(1, Ordering::Relaxed);

    let (parts, body) = request.into_parts();
    tracing::info!(
        request_id = %request_id,
        method = %parts.method,
        uri = %parts.uri,
        targets = state.targets.len(),
        in_flight = state.drain.in_flight(),
        "request received"
    );

    let handle = match state.buffer.store(&request_id, body).await {
        Ok(handle) => Arc::new(handle),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "failed to buffer request body");
            state.stats.primary_failed.fetch_add(1, Ordering::Relaxed);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    tracing::debug!(
        request_id = %request_id,
        path = %handle.path().display(),
        bytes = handle.len(),
        "request body buffered"
    );

    let inbound = Arc::new(InboundRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
    });
    let (token, waiter) = completion::channel();

    let mut primary = None;
    for (index, target) in state.targets.iter().enumerate() {
        let delivery = Delivery {
            request_id: Arc::clone(&request_id),
            index,
            target: target.clone(),
            inbound: Arc::clone(&inbound),
            buffer: Arc::clone(&handle),
            timeout: state.timeout,
            token: token.clone(),
        };
        let task = tokio::spawn(delivery.run(state.http_client.clone()));
        if index == 0 {
            primary = Some(task);
        }
    }
    // Only deliveries and their body streams may keep the waiter open
    drop(token);

    tokio::spawn(release_when_complete(Completion {
        request_id: Arc::clone(&request_id),
        waiter,
        buffer: state.buffer.clone(),
        handle,
        stats: Arc::clone(&state.stats),
        in_flight,
        started,
    }));

    let response = match primary {
        Some(task) => match task.await {
            Ok(Some(response)) => response,
            Ok(None) => {
                tracing::error!(request_id = %request_id, "primary delivery produced no response");
                StatusCode::BAD_GATEWAY.into_response()
            }
            Err(join_err) => {
                tracing::error!(request_id = %request_id, error = %join_err, "primary delivery task panicked");
                StatusCode::BAD_GATEWAY.into_response()
            }
        },
        None => {
            tracing::error!(request_id = %request_id, "no targets configured");
            StatusCode::BAD_GATEWAY.into_response()
        }
    };

    tracing::info!(
        request_id = %request_id,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "primary resolved"
    );
    response
}

struct Completion {
    request_id: Arc<str>,
    waiter: CompletionWaiter,
    buffer: RequestBuffer,
    handle: Arc<BufferHandle>,
    stats: Arc<Stats>,
    in_flight: InFlight,
    started: Instant,
}

#[allow(clippy::cast_possible_truncation)]
async fn release_when_complete(completion: Completion) {
    let Completion {
        request_id,
        waiter,
        buffer,
        handle,
        stats,
        in_flight,
        started,
    } = completion;

    let reports = waiter.wait().await;
    record(&stats, &reports);

    match buffer.release(&handle).await {
        Ok(()) => tracing::debug!(request_id = %request_id, "request buffer released"),
        Err(e) => tracing::warn!(request_id = %request_id, error = %e, "failed to release request buffer"),
    }
    in_flight.end();

    tracing::info!(
        request_id = %request_id,
        deliveries = reports.len(),
        failed = reports.iter().filter(|r| r.failed()).count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "broadcast drained"
    );
}

fn record(stats: &Stats, reports: &[DeliveryReport]) {
    for report in reports {
        let counter = match (report.is_primary(), report.failed()) {
            (true, false) => &stats.primary_relayed,
            (true, true) => &stats.primary_failed,
            (false, true) => &stats.secondary_failed,
            (false, false) => continue,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
