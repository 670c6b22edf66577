//! Server-Sent Events for booking activity
//!
//! Streams every domain event (new enquiries, duplicates, degraded parses,
//! status changes, conflicts) to connected clients.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    gigflow_common::sse::event_bus_sse_stream("gigflow-ingest", &state.event_bus)
}
