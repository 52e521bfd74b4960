// src/health/cache.rs
use super::Health;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

/// Shared slot holding the most recent combined record.
///
/// `None` until background refresh has been started once. The refresh task
/// replaces the whole record under the write guard, so readers observe
/// either the previous record or the next one, never a mix.
#[derive(Clone, Default)]
pub(crate) struct LastState {
    health: Arc<RwLock<Option<Health>>>,
}

impl LastState {
    pub(crate) async fn get(&self) -> Option<Health> {
        self.health.read().await.clone()
    }

    pub(crate) async fn set(&self, health: Health) {
        let mut slot = self.health.write().await;
        *slot = Some(health);
    }
}

/// Handle on a running refresh loop. Dropping it also stops the loop.
pub(crate) struct Refresher {
    shutdown_tx: watch::Sender<bool>,
}

impl Refresher {
    /// Spawns a task that runs `evaluate` on every tick of `period` and stores
    /// the result in `state`. The first tick is skipped: callers populate the
    /// state themselves before spawning.
    pub(crate) fn spawn<F, Fut>(period: Duration, state: LastState, mut evaluate: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Health> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            info!("Starting health refresh with interval: {:?}", period);

            loop {
                tokio::select! {
                    // Shutdown wins over a tick that became ready at the same time.
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Health refresh shutting down");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let health = evaluate().await;
                        debug!(status = %health.status(), "Refreshed cached health");
                        state.set(health).await;
                    }
                }
            }
        });

        Self { shutdown_tx }
    }

    /// Prevents any further tick. An evaluation already under way is not
    /// cancelled and may still store its result.
    pub(crate) fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
    }
}
