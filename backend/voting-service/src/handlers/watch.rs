//! Server-sent refresh signals for live feed / leaderboard views.

use crate::error::{ServiceError, ServiceResult};
use crate::services::{ChangePropagator, Subscription};
use crate::state::VotingCore;
use actix_web::{web, HttpResponse};
use futures_util::{stream, Stream};
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;
use vote_events::{RefreshSignal, ResourceKind};

/// Comment frames on an idle stream let the server notice a gone client
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const KEEPALIVE_FRAME: &[u8] = b": ping\n\n";

/// Deregisters the observer when the client disconnects and actix drops the
/// response stream
struct Watcher {
    propagator: ChangePropagator,
    subscription: Subscription,
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.propagator.unsubscribe(self.subscription.id());
        debug!(resource = %self.subscription.resource(), "Watch stream closed");
    }
}

fn sse_frame(signal: &RefreshSignal) -> web::Bytes {
    let data = serde_json::to_string(signal).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!(
        "event: refresh\nid: {}\ndata: {}\n\n",
        signal.sequence, data
    ))
}

fn frames(
    watcher: Watcher,
    keepalive: Duration,
) -> impl Stream<Item = Result<web::Bytes, actix_web::Error>> {
    let mut ticker = time::interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold((watcher, ticker), |(mut watcher, mut ticker)| async move {
        let frame = tokio::select! {
            signal = watcher.subscription.recv() => signal.map(|s| sse_frame(&s)),
            _ = ticker.tick() => Some(web::Bytes::from_static(KEEPALIVE_FRAME)),
        };
        Some((Ok(frame?), (watcher, ticker)))
    })
}

/// GET /api/v1/watch/{resource}
///
/// `resource` is `all-posts` or `leaderboard`. Each event only says the view
/// may be stale; clients re-query the feed or leaderboard, and re-query once
/// after reconnecting since signals missed while disconnected are not
/// replayed.
pub async fn watch(
    core: web::Data<VotingCore>,
    path: web::Path<String>,
) -> ServiceResult<HttpResponse> {
    let resource: ResourceKind = path
        .parse()
        .map_err(|e: vote_events::EventError| ServiceError::InvalidInput(e.to_string()))?;

    let watcher = Watcher {
        propagator: core.propagator.clone(),
        subscription: core.propagator.subscribe(resource),
    };

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(frames(watcher, KEEPALIVE_INTERVAL)))
}
