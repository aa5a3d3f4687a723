/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `config`: Public client configuration
/// - `auth`: Registration, login and token refresh
/// - `users`: The caller's profile and password
/// - `whitelist`: Registration whitelist (admin)
/// - `settings`: AI provider settings (admin)
/// - `family`: Household membership and invite codes
/// - `members`: Tracked family members
/// - `records`: Vital sign measurements, trends and reference ranges
/// - `storage`: File uploads
/// - `documents`: Medical documents, OCR and AI formatting
/// - `chat`: Health assistant conversations (SSE)
/// - `advice`: AI health advice
/// - `vaccinations`: Vaccine records, schedules and skips
/// - `checkups`: Recurring check items

pub mod advice;
pub mod auth;
pub mod chat;
pub mod checkups;
pub mod config;
pub mod documents;
pub mod family;
pub mod health;
pub mod members;
pub mod records;
pub mod settings;
pub mod storage;
pub mod users;
pub mod vaccinations;
pub mod whitelist;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use std::{convert::Infallible, time::Duration};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt as _};

/// Buffered events between a producer task and the HTTP response
pub(crate) const SSE_CHANNEL_CAPACITY: usize = 64;

/// Builds a `data:` event carrying `data` as JSON, named when `name` is set
pub(crate) fn json_event<T: Serialize>(name: Option<&str>, data: &T) -> Event {
    let event = match name {
        Some(name) => Event::default().event(name),
        None => Event::default(),
    };

    let payload = serde_json::to_string(data).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize SSE payload");
        r#"{"error":"serialization failed"}"#.to_string()
    });

    event.data(payload)
}

/// Wraps the receiving half of an event channel as an SSE response
///
/// The stream ends when every sender is dropped.
pub(crate) fn sse_response(
    rx: mpsc::Receiver<Event>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(25)))
}
