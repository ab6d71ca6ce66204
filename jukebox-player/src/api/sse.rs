//! Server-Sent Events live-update stream
//!
//! Each connection subscribes to the downstream event types of one session.
//! When a `user_id` is given the connection is announced with
//! `connection_opened`, and `connection_closed` follows when the client goes
//! away and the stream is dropped.

use super::{error_response, AppState, StatusResponse};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::Json,
};
use futures::stream::Stream;
use jukebox_common::events::{EventBus, EventPayload, EventType, GroupId};
use jukebox_common::time;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    user_id: Option<String>,
}

/// Publishes `connection_closed` when the stream holding it is dropped
struct ConnectionGuard {
    bus: EventBus,
    group: GroupId,
    user_id: String,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        debug!(session = %self.group, user = %self.user_id, "SSE client disconnected");
        self.bus.publish(
            self.group.clone(),
            EventPayload::ConnectionClosed {
                user_id: self.user_id.clone(),
            },
        );
    }
}

/// GET /sessions/:session_id/events
pub async fn session_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<StatusResponse>)> {
    state
        .stores
        .sessions
        .touch_session(&session_id, time::now())
        .await
        .map_err(error_response)?;

    let group = GroupId::from(session_id);
    // Subscribe before announcing so the user list update reaches this client too
    let mut subscription = state.bus.subscribe(EventType::LIVE_UPDATES, &[group.clone()]);

    let guard = query.user_id.map(|user_id| {
        debug!(session = %group, user = %user_id, "SSE client connected");
        state.bus.publish(
            group.clone(),
            EventPayload::ConnectionOpened {
                user_id: user_id.clone(),
            },
        );
        ConnectionGuard {
            bus: state.bus.clone(),
            group: group.clone(),
            user_id,
        }
    });

    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(event) = subscription.recv().await {
            match Event::default()
                .event(event.event_type().as_str())
                .json_data(event.payload())
            {
                Ok(sse_event) => yield Ok(sse_event),
                Err(e) => warn!(event_type = %event.event_type(), error = %e, "Failed to serialize event"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
