// src/health/checker.rs
use super::cache::{LastState, Refresher};
use super::{Checker, Health};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Annotation holding the RFC 3339 time a cached record was computed.
pub const LAST_CHECK_TS: &str = "lastcheck.ts";
/// Annotation holding how long computing a cached record took.
pub const LAST_CHECK_TOOK: &str = "lastcheck.took";

#[derive(Clone)]
struct CheckerItem {
    name: String,
    checker: Arc<dyn Checker>,
}

#[derive(Clone, Default)]
struct Registry {
    checkers: Vec<CheckerItem>,
    info: Map<String, Value>,
}

impl Registry {
    async fn evaluate(&self) -> Health {
        let mut tasks = Vec::with_capacity(self.checkers.len());

        for item in &self.checkers {
            let checker = item.checker.clone();
            tasks.push(tokio::spawn(async move { checker.check().await }));
        }

        // join_all keeps registration order, so a re-used name resolves to
        // the last registered probe.
        let results = futures::future::join_all(tasks).await;

        let mut health = Health::new();
        health.up();

        for (item, result) in self.checkers.iter().zip(results) {
            let probe_health = match result {
                Ok(probe_health) => probe_health,
                Err(e) => {
                    error!("Checker {} task failed: {}", item.name, e);
                    let mut failed = Health::new();
                    failed.down().add_info("error", e.to_string());
                    failed
                }
            };

            if probe_health.is_up() {
                debug!("Checker {} is up", item.name);
            } else {
                warn!("Checker {} reported {}", item.name, probe_health.status());
                if !health.is_down() {
                    health.down();
                }
            }

            health.add_info(item.name.clone(), probe_health);
        }

        for (key, value) in &self.info {
            health.add_info(key.clone(), value.clone());
        }

        health
    }

    async fn evaluate_timed(&self) -> Health {
        let start = Instant::now();
        let mut health = self.evaluate().await;
        health
            .add_info(LAST_CHECK_TS, Utc::now().to_rfc3339())
            .add_info(LAST_CHECK_TOOK, format!("{:?}", start.elapsed()));
        health
    }
}

/// Refresh lifecycle. The lock around it is never held across an await.
#[derive(Default)]
enum RefreshState {
    #[default]
    Idle,
    /// Initial evaluation in progress; `cancelled` is set by a `stop` that
    /// arrives before the loop is spawned.
    Starting { cancelled: bool },
    Running(Refresher),
}

/// Aggregates named [`Checker`]s into one overall [`Health`].
///
/// The combined record is `UP` only when every probe is `UP`; any other probe
/// status (including `OUT OF SERVICE` and `UNKNOWN`) makes it `DOWN`. Each
/// probe's own record is nested under its name, followed by the static info.
///
/// Registration needs `&mut self` and therefore cannot overlap a `check` or a
/// `start`. Once [`start`](Self::start) has run, `check` only reads the cached
/// record; probes registered afterwards are picked up on the next `start`.
#[derive(Default)]
pub struct CompositeChecker {
    registry: Arc<Registry>,
    last_state: LastState,
    refresh: Mutex<RefreshState>,
}

impl CompositeChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a static annotation merged into every combined record.
    pub fn add_info(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        Arc::make_mut(&mut self.registry)
            .info
            .insert(key.into(), value.into());
        self
    }

    pub fn add_checker(&mut self, name: impl Into<String>, checker: impl Checker + 'static) -> &mut Self {
        self.add_shared_checker(name, Arc::new(checker))
    }

    pub fn add_shared_checker(&mut self, name: impl Into<String>, checker: Arc<dyn Checker>) -> &mut Self {
        let name = name.into();
        let registry = Arc::make_mut(&mut self.registry);

        if registry.checkers.iter().any(|item| item.name == name) {
            warn!("Checker name {} registered more than once, the last one wins", name);
        }

        registry.checkers.push(CheckerItem { name, checker });
        self
    }

    pub fn len(&self) -> usize {
        self.registry.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.checkers.is_empty()
    }

    /// Returns the cached record once refresh has been started, otherwise
    /// runs every probe concurrently and combines the results.
    pub async fn check(&self) -> Health {
        if let Some(health) = self.last_state.get().await {
            return health;
        }
        self.registry.evaluate().await
    }

    /// Populates the cache with one evaluation, then refreshes it every
    /// `interval` in the background. Does nothing if already running.
    ///
    /// The initial evaluation runs without holding any lock, so `stop` and
    /// `is_running` never wait on probe I/O.
    pub async fn start(&self, interval: Duration) {
        {
            let mut state = self.refresh_state();
            match &mut *state {
                RefreshState::Idle => {}
                RefreshState::Starting { cancelled } => {
                    *cancelled = false;
                    debug!("Health refresh already starting");
                    return;
                }
                RefreshState::Running(_) => {
                    debug!("Health refresh already running");
                    return;
                }
            }
            *state = RefreshState::Starting { cancelled: false };
        }

        let period = if interval.is_zero() {
            warn!("Refresh interval must be non-zero, using 1ms");
            Duration::from_millis(1)
        } else {
            interval
        };

        let registry = self.registry.clone();
        self.last_state.set(registry.evaluate_timed().await).await;

        let mut state = self.refresh_state();
        match *state {
            RefreshState::Starting { cancelled: false } => {
                *state = RefreshState::Running(Refresher::spawn(
                    period,
                    self.last_state.clone(),
                    move || {
                        let registry = registry.clone();
                        async move { registry.evaluate_timed().await }
                    },
                ));
                info!(
                    "Health refresh started for {} checkers every {:?}",
                    self.registry.checkers.len(),
                    period
                );
            }
            _ => {
                *state = RefreshState::Idle;
                info!("Health refresh stopped before it started");
            }
        }
    }

    /// Stops background refresh. The last cached record stays readable.
    pub async fn stop(&self) {
        let mut state = self.refresh_state();
        match std::mem::take(&mut *state) {
            RefreshState::Idle => {}
            RefreshState::Starting { .. } => {
                *state = RefreshState::Starting { cancelled: true };
            }
            RefreshState::Running(refresher) => {
                refresher.shutdown();
                info!("Health refresh stopped");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(
            *self.refresh_state(),
            RefreshState::Starting { cancelled: false } | RefreshState::Running(_)
        )
    }

    fn refresh_state(&self) -> MutexGuard<'_, RefreshState> {
        self.refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::CheckerFn;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn up() -> Health {
        let mut health = Health::new();
        health.up();
        health
    }

    fn down() -> Health {
        let mut health = Health::new();
        health.down();
        health
    }

    struct SlowChecker(Duration);

    #[async_trait]
    impl Checker for SlowChecker {
        async fn check(&self) -> Health {
            tokio::time::sleep(self.0).await;
            up()
        }
    }

    struct PanickingChecker;

    #[async_trait]
    impl Checker for PanickingChecker {
        async fn check(&self) -> Health {
            panic!("probe blew up");
        }
    }

    #[tokio::test]
    async fn test_no_checkers_is_up() {
        let checker = CompositeChecker::new();
        assert!(checker.check().await.is_up());
    }

    #[tokio::test]
    async fn test_all_up_is_up() {
        let mut checker = CompositeChecker::new();
        checker
            .add_checker("first", CheckerFn(up))
            .add_checker("second", CheckerFn(up));

        let health = checker.check().await;
        assert!(health.is_up());
        assert_eq!(health.get_info("first"), Some(&json!({"status": "UP"})));
    }

    #[tokio::test]
    async fn test_any_non_up_is_down() {
        fn out_of_service() -> Health {
            let mut health = Health::new();
            health.out_of_service();
            health
        }

        let failing_probes: [fn() -> Health; 3] = [down, out_of_service, Health::new];
        for failing in failing_probes {
            let mut checker = CompositeChecker::new();
            checker
                .add_checker("ok", CheckerFn(up))
                .add_checker("bad", CheckerFn(failing));

            assert!(checker.check().await.is_down());
        }
    }

    #[tokio::test]
    async fn test_static_info_is_merged() {
        let mut checker = CompositeChecker::new();
        checker
            .add_checker("probe", CheckerFn(up))
            .add_info("version", "1.0")
            .add_info("version", "1.1");

        let health = checker.check().await;
        assert_eq!(health.get_info("version"), Some(&json!("1.1")));
        assert!(health.get_info("probe").is_some());
    }

    #[tokio::test]
    async fn test_duplicate_name_last_registered_wins() {
        let mut checker = CompositeChecker::new();
        checker
            .add_checker("dup", CheckerFn(down))
            .add_checker("dup", CheckerFn(up));

        let health = checker.check().await;
        assert_eq!(health.get_info("dup"), Some(&json!({"status": "UP"})));
        // The shadowed probe still counts towards the aggregate.
        assert!(health.is_down());
    }

    #[tokio::test]
    async fn test_probes_run_concurrently() {
        let mut checker = CompositeChecker::new();
        for i in 0..5 {
            checker.add_checker(format!("slow-{}", i), SlowChecker(Duration::from_millis(200)));
        }

        let start = Instant::now();
        assert!(checker.check().await.is_up());
        assert!(start.elapsed() < Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_panicking_probe_reports_down() {
        let mut checker = CompositeChecker::new();
        checker
            .add_checker("ok", CheckerFn(up))
            .add_checker("boom", PanickingChecker);

        let health = checker.check().await;
        assert!(health.is_down());
        assert_eq!(health.get_info("boom").unwrap()["status"], "DOWN");
        assert!(health.get_info("boom").unwrap().get("error").is_some());
    }

    #[tokio::test]
    async fn test_start_populates_cache_immediately() {
        let mut checker = CompositeChecker::new();
        checker.add_checker("probe", CheckerFn(up));

        checker.start(Duration::from_secs(60)).await;
        let health = checker.check().await;
        checker.stop().await;

        assert!(health.is_up());
        assert!(health.get_info(LAST_CHECK_TS).is_some());
        assert!(health.get_info(LAST_CHECK_TOOK).is_some());
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_twice_are_noops() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut checker = CompositeChecker::new();
        checker.add_checker(
            "counted",
            CheckerFn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                up()
            }),
        );

        checker.stop().await;
        assert!(!checker.is_running().await);

        checker.start(Duration::from_secs(60)).await;
        checker.start(Duration::from_secs(60)).await;
        assert!(checker.is_running().await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        checker.stop().await;
        checker.stop().await;
        assert!(!checker.is_running().await);
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let mut checker = CompositeChecker::new();
        checker.add_checker("probe", CheckerFn(up));

        checker.start(Duration::ZERO).await;
        assert!(checker.is_running().await);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let health = checker.check().await;
        checker.stop().await;

        assert!(health.is_up());
        assert!(health.get_info(LAST_CHECK_TS).is_some());
    }

    #[tokio::test]
    async fn test_stop_during_slow_start_does_not_wait() {
        let mut checker = CompositeChecker::new();
        checker.add_checker("slow", SlowChecker(Duration::from_millis(1000)));
        let checker = Arc::new(checker);

        let starting = {
            let checker = checker.clone();
            tokio::spawn(async move { checker.start(Duration::from_millis(20)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let running = tokio::time::timeout(Duration::from_millis(100), checker.is_running())
            .await
            .expect("is_running must not wait for the initial evaluation");
        assert!(running);

        tokio::time::timeout(Duration::from_millis(100), checker.stop())
            .await
            .expect("stop must not wait for the initial evaluation");
        assert!(!checker.is_running().await);

        starting.await.unwrap();
        // The cancelled start still stores its evaluation but spawns no loop.
        assert!(!checker.is_running().await);
        assert!(checker.check().await.is_up());
    }

    #[tokio::test]
    async fn test_start_after_stop_during_start_keeps_running() {
        let mut checker = CompositeChecker::new();
        checker.add_checker("slow", SlowChecker(Duration::from_millis(200)));
        let checker = Arc::new(checker);

        let starting = {
            let checker = checker.clone();
            tokio::spawn(async move { checker.start(Duration::from_secs(60)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        checker.stop().await;
        checker.start(Duration::from_secs(60)).await;
        starting.await.unwrap();

        assert!(checker.is_running().await);
        checker.stop().await;
        assert!(!checker.is_running().await);
    }
}
