use crate::error::{FeedError, FeedResult};
use crate::model::{Fixture, NameIndex};
use crate::stream::config::FeedConfig;
use crate::stream::reconciler::{FixtureReconciler, ReconcilerHandle};
use crate::stream::registry::{ListenerRegistry, StartOutcome};
use crate::stream::transport::{DiscoveryClient, FixtureResource};
use crate::utils::record_sink::{FileSinkFactory, SinkFactory};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Counts of what one poll cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub sports_listed: usize,
    pub started: usize,
    pub skipped: usize,
    pub in_progress: usize,
    pub reaped: usize,
    pub failed: usize,
}

impl PollSummary {
    fn record(&mut self, outcome: StartOutcome) {
        match outcome {
            StartOutcome::Started => self.started += 1,
            StartOutcome::Skipped => self.skipped += 1,
            StartOutcome::InProgress => self.in_progress += 1,
            StartOutcome::Reaped => self.reaped += 1,
        }
    }
}

struct SchedulerInner {
    config: Arc<FeedConfig>,
    discovery: Arc<dyn DiscoveryClient>,
    sinks: Arc<dyn SinkFactory>,
    registry: Arc<ListenerRegistry>,
}

impl SchedulerInner {
    async fn poll_cycle(self: &Arc<Self>) -> PollSummary {
        let mut summary = PollSummary::default();

        for sport in &self.config.sports {
            info!("Get the list of available fixtures for {}", sport);
            let resources = match self.discovery.list_resources(sport).await {
                Ok(Some(resources)) => resources,
                Ok(None) => {
                    info!("Cannot find {} in the feed....", sport);
                    continue;
                }
                Err(e) => {
                    error!("Failed to list {} fixtures: {}", sport, e);
                    continue;
                }
            };
            summary.sports_listed += 1;

            if resources.is_empty() {
                info!("There are currently no {} fixtures in the feed", sport);
                continue;
            }

            self.fan_out(sport, resources, &mut summary).await;
        }

        debug!("Poll cycle finished: {:?}", summary);
        summary
    }

    /// Run `try_start` for every resource, at most `max_concurrency` at a time.
    /// One fixture failing (or panicking) never stops its siblings.
    async fn fan_out(self: &Arc<Self>, sport: &str, resources: Vec<Arc<dyn FixtureResource>>, summary: &mut PollSummary) {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for resource in resources {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let inner = Arc::clone(self);
            let sport = sport.to_string();
            tasks.spawn(async move {
                let _permit = permit;
                let fixture_id = resource.id().to_string();
                let fixture_name = resource.name().to_string();
                let outcome = inner
                    .registry
                    .try_start(&fixture_id, &fixture_name, || inner.start_fixture(resource, &sport))
                    .await;
                (fixture_id, fixture_name, outcome)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, _, Ok(outcome))) => summary.record(outcome),
                Ok((fixture_id, fixture_name, Err(e))) => failures.push(format!(
                    "Fixture {} id {} There is a problem processing this fixture: {}",
                    fixture_name, fixture_id, e
                )),
                Err(join_error) => failures.push(format!("{} fixture worker aborted: {}", sport, join_error)),
            }
        }

        summary.failed += failures.len();
        for failure in failures {
            error!("{}", failure);
        }
    }

    /// Fetch the snapshot, build the name index and start the reconciler.
    /// `Ok(None)` when the listing already reports the match as over.
    async fn start_fixture(&self, resource: Arc<dyn FixtureResource>, sport: &str) -> FeedResult<Option<ReconcilerHandle>> {
        if resource.content().is_some_and(|content| content.match_status.is_terminal()) {
            info!("Fixture {} id {} has finished. Will not process", resource.name(), resource.id());
            return Ok(None);
        }

        let sink = self.sinks.open(resource.id(), resource.name()).await?;

        info!("Get snapshot for {} id {}", resource.name(), resource.id());
        let raw = resource.fetch_snapshot().await?;
        info!("Successfully retrieved snapshot for {} id {}", resource.name(), resource.id());

        let snapshot = Fixture::from_snapshot(&raw)?;
        let names = NameIndex::from_snapshot(&snapshot);
        let epoch = snapshot.epoch;

        let handle = FixtureReconciler::spawn(Arc::clone(&resource), epoch, names, sink, &self.config).await?;
        info!(
            "Listening to {} fixture {} id {} at epoch {}",
            sport, resource.name(), resource.id(), epoch
        );
        Ok(Some(handle))
    }
}

struct Timer {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// Polls every configured sport on a fixed period and keeps one reconciler per
/// active fixture.
pub struct DiscoveryScheduler {
    inner: Arc<SchedulerInner>,
    timer: Option<Timer>,
}

impl DiscoveryScheduler {
    pub fn new(config: FeedConfig, discovery: Arc<dyn DiscoveryClient>, sinks: Arc<dyn SinkFactory>) -> Self {
        info!("Initializing DiscoveryScheduler for {} sports", config.sports.len());
        Self {
            inner: Arc::new(SchedulerInner {
                config: Arc::new(config),
                discovery,
                sinks,
                registry: Arc::new(ListenerRegistry::new()),
            }),
            timer: None,
        }
    }

    /// Schedule `poll_cycle` now and then every poll interval.
    ///
    /// Without a schedule nothing can be discovered, so failures here are
    /// returned to the caller.
    pub fn start(&mut self) -> FeedResult<()> {
        info!("Starting DiscoveryScheduler");
        if self.timer.is_some() {
            error!("DiscoveryScheduler is already running");
            return Err(FeedError::AlreadyRunning);
        }

        let period = self.inner.config.poll_interval();
        if period.is_zero() {
            error!("A fatal error has occurred and the scheduler cannot start: poll interval is zero");
            return Err(FeedError::SchedulerStart("poll interval must be greater than zero".to_string()));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            error!("A fatal error has occurred and the scheduler cannot start: {}", e);
            FeedError::SchedulerStart(e.to_string())
        })?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let inner = Arc::clone(&self.inner);
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        inner.poll_cycle().await;
                    }
                }
            }
            info!("Discovery timer stopped");
        });

        self.timer = Some(Timer { shutdown_tx, task });
        info!("Discovery timer started, polling every {:?}", period);
        Ok(())
    }

    /// Cancel the schedule, let an in-flight cycle finish, then stop every
    /// reconciler. Returns how many reconcilers stopped cleanly.
    pub async fn stop(&mut self) -> usize {
        info!("Stopping DiscoveryScheduler");
        if let Some(timer) = self.timer.take() {
            let _ = timer.shutdown_tx.try_send(());
            if let Err(e) = timer.task.await {
                warn!("Discovery timer error during shutdown: {}", e);
            }
        }

        let stopped = self.inner.registry.stop_all(self.inner.config.max_concurrency).await;
        info!("DiscoveryScheduler stopped, {} listeners stopped", stopped);
        stopped
    }

    /// Run one discovery pass immediately.
    pub async fn poll_cycle(&self) -> PollSummary {
        self.inner.poll_cycle().await
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &FeedConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.task.is_finished())
    }
}

impl Drop for DiscoveryScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("DiscoveryScheduler dropped while running, the timer task is left to finish its cycle");
            if let Some(timer) = self.timer.take() {
                let _ = timer.shutdown_tx.try_send(());
            }
        }
    }
}

/// Builder for DiscoveryScheduler
pub struct DiscoverySchedulerBuilder {
    config: Option<FeedConfig>,
    discovery: Option<Arc<dyn DiscoveryClient>>,
    sinks: Option<Arc<dyn SinkFactory>>,
}

impl DiscoverySchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            discovery: None,
            sinks: None,
        }
    }

    pub fn with_config(mut self, config: FeedConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryClient>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_sink_factory(mut self, sinks: Arc<dyn SinkFactory>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    /// Missing config is read from the environment; missing sinks write files under `log_dir`.
    pub fn build(self) -> FeedResult<DiscoveryScheduler> {
        let discovery = self
            .discovery
            .ok_or_else(|| FeedError::SchedulerStart("a discovery client is required".to_string()))?;
        let config = match self.config {
            Some(config) => config,
            None => FeedConfig::from_env()?,
        };
        config.validate()?;
        let sinks = self
            .sinks
            .unwrap_or_else(|| Arc::new(FileSinkFactory::new(config.log_dir.clone())));
        Ok(DiscoveryScheduler::new(config, discovery, sinks))
    }
}

impl Default for DiscoverySchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::memory::InMemoryDiscovery;
    use crate::utils::record_sink::MemorySinkFactory;

    #[test]
    fn test_start_without_runtime_fails() {
        let mut scheduler = DiscoveryScheduler::new(
            FeedConfig::default(),
            Arc::new(InMemoryDiscovery::default()),
            Arc::new(MemorySinkFactory::default()),
        );
        assert!(matches!(scheduler.start(), Err(FeedError::SchedulerStart(_))));
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let mut scheduler = DiscoveryScheduler::new(
            FeedConfig::default(),
            Arc::new(InMemoryDiscovery::default()),
            Arc::new(MemorySinkFactory::default()),
        );
        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(FeedError::AlreadyRunning)));
        assert_eq!(scheduler.stop().await, 0);
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_builder_requires_discovery() {
        let result = DiscoverySchedulerBuilder::new().with_config(FeedConfig::default()).build();
        assert!(matches!(result, Err(FeedError::SchedulerStart(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = DiscoverySchedulerBuilder::new()
            .with_config(FeedConfig { max_concurrency: 0, ..Default::default() })
            .with_discovery(Arc::new(InMemoryDiscovery::default()))
            .build();
        assert!(matches!(result, Err(FeedError::Internal(_))));
    }

    #[tokio::test]
    async fn test_unknown_and_empty_sports_are_skipped() {
        let discovery = Arc::new(InMemoryDiscovery::default());
        discovery.set_resources("Tennis", vec![]);
        let scheduler = DiscoveryScheduler::new(
            FeedConfig::default(),
            discovery.clone(),
            Arc::new(MemorySinkFactory::default()),
        );
        let summary = scheduler.poll_cycle().await;
        assert_eq!(summary.sports_listed, 1);
        assert_eq!(summary.started, 0);
        assert_eq!(discovery.listing_count(), 6);
    }
}
