//! Server-sent event stream of every bus event.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use event_bus::EventBus;
use futures_util::Stream;
use futures_util::stream;
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

/// GET /notifications: one `event: <routing key>` frame per bus event,
/// with `data: {"event", "data"}`, until the client goes away.
pub async fn stream<B: EventBus + Clone + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.relay.listen();
    tracing::debug!(listeners = state.relay.listener_count(), "notification listener joined");

    let frames = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(notification) => {
                    match Event::default()
                        .event(notification.event.clone())
                        .json_data(&notification)
                    {
                        Ok(event) => return Some((Ok::<_, Infallible>(event), receiver)),
                        Err(e) => tracing::warn!(error = %e, "dropping unencodable notification"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification listener lagged, frames skipped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(frames).keep_alive(KeepAlive::default())
}
