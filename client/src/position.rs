//! Position source — ownership of the continuous-location subscription.
//!
//! Each fix overwrites a `watch` cell holding the latest known position, so
//! fixes arriving between periodic sends coalesce to the most recent value
//! by construction. `start` while running and `stop` while stopped are
//! harmless no-ops; at most one underlying subscription exists per source.
//!
//! The device geolocation capability is an external collaborator. In this
//! crate it appears only as the [`PositionSource`] seam plus
//! [`ScriptedPositionSource`], which replays a fixed route — enough for the
//! CLI exerciser and for tests.

use std::time::Duration;

use tokio::sync::watch;

use crate::types::LatLng;

/// Create the latest-known-position cell shared between a source (writer)
/// and the periodic sender (reader).
#[must_use]
pub fn position_cell() -> (watch::Sender<Option<LatLng>>, watch::Receiver<Option<LatLng>>) {
    watch::channel(None)
}

/// Continuous position observation with an idempotent start/stop lifecycle.
pub trait PositionSource: Send {
    /// Begin observation if not already running. Each fix updates `sink`.
    fn start(&mut self, sink: watch::Sender<Option<LatLng>>);
    /// Cancel observation if running; a no-op otherwise.
    fn stop(&mut self);
    /// Whether a subscription is currently live.
    fn is_running(&self) -> bool;
}

/// Replays a fixed route on an interval, cycling from the start when the
/// route is exhausted.
pub struct ScriptedPositionSource {
    route: Vec<LatLng>,
    interval: Duration,
    task: Option<tokio::task::JoinHandle<()>>,
    /// Count of subscriptions ever spawned; the start/stop invariant keeps
    /// at most one live at a time.
    generation: u64,
}

impl ScriptedPositionSource {
    #[must_use]
    pub fn new(route: Vec<LatLng>, interval: Duration) -> Self {
        Self { route, interval, task: None, generation: 0 }
    }
}

impl PositionSource for ScriptedPositionSource {
    fn start(&mut self, sink: watch::Sender<Option<LatLng>>) {
        if self.task.is_some() {
            return;
        }
        if self.route.is_empty() {
            // Degrade silently, the way a missing device capability would.
            tracing::warn!("position source has no route; position stays unknown");
            return;
        }

        let route = self.route.clone();
        let interval = self.interval;
        self.generation += 1;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            for fix in route.iter().cycle() {
                ticker.tick().await;
                if sink.send(Some(*fix)).is_err() {
                    return;
                }
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for ScriptedPositionSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "position_test.rs"]
mod tests;
