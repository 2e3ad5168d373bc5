//! GET /events - SSE stream of every engine event

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use trialmatch_common::sse::event_bus_sse_stream;

use crate::AppState;

pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    event_bus_sse_stream("trialmatch-engine", &state.events)
}
