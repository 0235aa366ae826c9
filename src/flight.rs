//! Broadcast-once completion signal for renders in flight.

use std::sync::Arc;

use tokio::sync::watch;

/// Fan-out handle letting every request that arrives during an in-flight
/// first render observe its completion.
///
/// Created when the render starts, resolved exactly once when its capture
/// finishes, and never reused for a later render of the same key.
#[derive(Debug, Clone)]
pub struct RenderFlight {
    tx: Arc<watch::Sender<bool>>,
}

impl RenderFlight {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Register interest in the completion of this render.
    pub fn subscribe(&self) -> FlightSubscription {
        FlightSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Mark the render as complete, waking every subscriber. Idempotent.
    pub fn resolve(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_resolved(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for RenderFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// A single waiter's view of an in-flight render.
#[derive(Debug)]
pub struct FlightSubscription {
    rx: watch::Receiver<bool>,
}

impl FlightSubscription {
    /// Wait until the render completes.
    ///
    /// Also returns if every [`RenderFlight`] handle is dropped without
    /// resolving; callers re-check the store either way.
    pub async fn resolved(mut self) {
        let _ = self.rx.wait_for(|done| *done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolution_wakes_all_subscribers() {
        let flight = RenderFlight::new();
        let first = flight.subscribe();
        let second = flight.subscribe();

        let waiters = tokio::spawn(async move {
            tokio::join!(first.resolved(), second.resolved());
        });

        flight.resolve();
        waiters.await.expect("waiters complete");
    }

    #[tokio::test]
    async fn subscribing_after_resolution_completes_immediately() {
        let flight = RenderFlight::new();
        flight.resolve();
        flight.subscribe().resolved().await;
    }

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let flight = RenderFlight::new();
        flight.resolve();
        flight.resolve();
        assert!(flight.is_resolved());
    }

    #[tokio::test]
    async fn dropped_flight_releases_waiters() {
        let flight = RenderFlight::new();
        let subscription = flight.subscribe();
        drop(flight);
        subscription.resolved().await;
    }

    #[test]
    fn starts_unresolved() {
        assert!(!RenderFlight::new().is_resolved());
    }
}
