//! Request broadcasting.
//!
//! [`broadcast_handler`] is the Axum fallback that receives every inbound
//! request and hands it to the coordinator in [`broadcast`]. Submodules
//! cover the header rules ([`headers`]), a single delivery to one target
//! ([`dispatch`]), and tracking when every delivery is done
//! ([`completion`]).

pub mod broadcast;
pub mod completion;
pub mod dispatch;
pub mod headers;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::server::AppState;

/// Run the broadcast on its own task so a caller disconnecting mid-upload
/// cannot cancel buffering or fan-out halfway through.
pub async fn broadcast_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    match tokio::spawn(broadcast::broadcast(state, request)).await {
        Ok(response) => response,
        Err(join_err) => {
            tracing::error!(error = %join_err, "broadcast task panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
