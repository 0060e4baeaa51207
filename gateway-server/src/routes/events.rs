//! `/api/events` SSE facade (spec.md §6 "SSE wire framing") — merges the
//! signal, outage and alert streams into one `event: <kind>\ndata: <json>\n\n`
//! wire format.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive};
use axum::response::Sse;

use gateway_core::alerts::SubscriptionItem;

use crate::state::AppState;

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new().interval(std::time::Duration::from_secs(15))
}

pub async fn get_events(State(state): State<AppState>) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let mut signal_sub = state.poller.subscribe().await;
    let mut outage_sub = state.poller.subscribe_outages().await;
    let mut alert_sub = state.alerts.subscribe().await;

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                sample = signal_sub.recv() => {
                    if let Ok(data) = serde_json::to_string(&sample) {
                        yield Ok::<Event, Infallible>(Event::default().event("signal").data(data));
                    }
                }
                outage = outage_sub.recv() => {
                    if let Ok(data) = serde_json::to_string(&outage) {
                        yield Ok::<Event, Infallible>(Event::default().event("outage").data(data));
                    }
                }
                item = alert_sub.recv() => {
                    match item {
                        SubscriptionItem::Heartbeat => {
                            yield Ok::<Event, Infallible>(Event::default().event("heartbeat").data("{}"));
                        }
                        other => {
                            if let Ok(data) = serde_json::to_string(&other) {
                                yield Ok::<Event, Infallible>(Event::default().event("alert").data(data));
                            }
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(default_keep_alive())
}
