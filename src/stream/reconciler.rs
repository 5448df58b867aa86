use crate::error::FeedResult;
use crate::model::{Fixture, NameIndex};
use crate::stream::config::FeedConfig;
use crate::stream::transport::{FixtureResource, StreamEvent};
use crate::utils::record_sink::RecordSink;
use eyre::Result;
use futures::{StreamExt, stream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Starting value of the current sequence; below any sequence upstream sends.
pub const SEQUENCE_SENTINEL: i64 = -1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReconcilerPhase {
    Starting,
    Streaming,
    Resyncing,
    Ended,
}

impl ReconcilerPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReconcilerPhase::Starting,
            1 => ReconcilerPhase::Streaming,
            2 => ReconcilerPhase::Resyncing,
            _ => ReconcilerPhase::Ended,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ReconcilerPhase::Starting => 0,
            ReconcilerPhase::Streaming => 1,
            ReconcilerPhase::Resyncing => 2,
            ReconcilerPhase::Ended => 3,
        }
    }
}

/// What a single update did to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Same-epoch delta written to the sink, one record per market
    Applied { records: usize, gap: bool },
    /// Sequence older than the current one
    Stale,
    /// Epoch moved forward and the name index was rebuilt from a fresh snapshot
    Resynced { epoch: i64, gap: bool },
    /// Epoch change carried the Deleted reason
    Deleted,
    /// Fresh snapshot reported the match as over
    MatchOver,
    /// Reconciler already ended, or the delta belongs to an older epoch
    Ignored,
    /// Processing failed; state is unchanged apart from the sequence
    Failed,
}

/// Consistency state of one fixture, readable from any task.
///
/// Only the fixture's event loop writes to it.
#[derive(Debug)]
pub struct ReconcilerStatus {
    fixture_id: String,
    epoch: AtomicI64,
    sequence: AtomicI64,
    ended: AtomicBool,
    phase: AtomicU8,
}

impl ReconcilerStatus {
    fn new(fixture_id: &str, epoch: i64) -> Self {
        Self {
            fixture_id: fixture_id.to_string(),
            epoch: AtomicI64::new(epoch),
            sequence: AtomicI64::new(SEQUENCE_SENTINEL),
            ended: AtomicBool::new(false),
            phase: AtomicU8::new(ReconcilerPhase::Starting.as_u8()),
        }
    }

    pub fn fixture_id(&self) -> &str {
        &self.fixture_id
    }

    pub fn epoch(&self) -> i64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn sequence(&self) -> i64 {
        self.sequence.load(Ordering::Acquire)
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> ReconcilerPhase {
        ReconcilerPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: ReconcilerPhase) {
        // Ended is terminal.
        let _ = self.phase.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (current != ReconcilerPhase::Ended.as_u8()).then_some(phase.as_u8())
        });
    }

    fn mark_ended(&self) {
        self.ended.store(true, Ordering::Release);
        self.phase.store(ReconcilerPhase::Ended.as_u8(), Ordering::Release);
    }
}

/// Decides, per update, whether to apply it, drop it or resync from a snapshot.
pub struct FixtureReconciler {
    resource: Arc<dyn FixtureResource>,
    names: Arc<NameIndex>,
    sink: Arc<dyn RecordSink>,
    status: Arc<ReconcilerStatus>,
    max_concurrency: usize,
}

impl FixtureReconciler {
    pub fn new(
        resource: Arc<dyn FixtureResource>,
        epoch: i64,
        names: NameIndex,
        sink: Arc<dyn RecordSink>,
        max_concurrency: usize,
    ) -> Self {
        let status = Arc::new(ReconcilerStatus::new(resource.id(), epoch));
        status.set_phase(ReconcilerPhase::Streaming);
        Self {
            resource,
            names: Arc::new(names),
            sink,
            status,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Build the reconciler, start the upstream stream and run the event loop on its own task.
    pub async fn spawn(
        resource: Arc<dyn FixtureResource>,
        epoch: i64,
        names: NameIndex,
        sink: Arc<dyn RecordSink>,
        config: &FeedConfig,
    ) -> Result<ReconcilerHandle> {
        let reconciler = Self::new(Arc::clone(&resource), epoch, names, sink, config.max_concurrency);
        let status = Arc::clone(&reconciler.status);
        let (events_tx, events_rx) = mpsc::channel(config.event_channel_size.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(reconciler.run(events_rx, shutdown_rx));

        if let Err(e) = resource
            .start_stream(config.echo_interval(), config.echo_max_delay(), events_tx)
            .await
        {
            error!("Fixture {} id {} failed to start streaming: {}", resource.name(), resource.id(), e);
            task.abort();
            return Err(e);
        }

        Ok(ReconcilerHandle {
            inner: Arc::new(HandleInner { status, resource, shutdown_tx, task }),
        })
    }

    pub fn status(&self) -> &Arc<ReconcilerStatus> {
        &self.status
    }

    pub fn names(&self) -> &Arc<NameIndex> {
        &self.names
    }

    async fn run(mut self, mut events: mpsc::Receiver<StreamEvent>, mut shutdown: mpsc::Receiver<()>) {
        debug!("Event loop started for fixture {}", self.resource.id());
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }
        debug!("Event loop ended for fixture {}", self.resource.id());
    }

    pub async fn handle_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => self.handle_connected(),
            StreamEvent::Disconnected => self.handle_disconnected().await,
            StreamEvent::Update(payload) => {
                self.handle_update(&payload).await;
            }
        }
    }

    pub fn handle_connected(&self) {
        info!("Stream connected for {} id {}", self.resource.name(), self.resource.id());
    }

    pub async fn handle_disconnected(&mut self) {
        if self.status.is_ended() {
            info!("Stream disconnected for {}", self.resource.name());
            return;
        }

        warn!(
            "Stream disconnected due to problem with {}, suspending markets, will try reconnect within 1 minute",
            self.resource.name()
        );
        self.status.mark_ended();
        self.suspend_all_markets().await;
    }

    /// Writes a suspension record for every market of the current name index.
    async fn suspend_all_markets(&self) {
        let records = self.names.suspension_records();
        let mut written = 0;
        for record in &records {
            match self.sink.write_line(record).await {
                Ok(()) => written += 1,
                Err(e) => error!("Fixture {} failed to write suspension record: {}", self.resource.id(), e),
            }
        }
        warn!("Fixture {} id {}: suspended {} markets", self.resource.name(), self.resource.id(), written);
    }

    /// Process one raw update. Errors never escape: they are logged and the update is dropped.
    pub async fn handle_update(&mut self, payload: &str) -> UpdateOutcome {
        match self.try_handle_update(payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Fixture {} id {}: failed to process update: {}", self.resource.name(), self.resource.id(), e);
                UpdateOutcome::Failed
            }
        }
    }

    async fn try_handle_update(&mut self, payload: &str) -> FeedResult<UpdateOutcome> {
        if self.status.is_ended() {
            debug!("Fixture {} has ended, ignoring update", self.resource.id());
            return Ok(UpdateOutcome::Ignored);
        }

        let delta = Fixture::from_update(payload)?;
        let current_epoch = self.status.epoch();
        let current_sequence = self.status.sequence();

        self.write_summary(&delta, payload.len(), current_epoch).await;

        if delta.sequence < current_sequence {
            info!(
                "Fixture {} id {} sequence {} is less than current sequence {}",
                self.resource.name(), self.resource.id(), delta.sequence, current_sequence
            );
            return Ok(UpdateOutcome::Stale);
        }

        let gap = delta.sequence.saturating_sub(current_sequence) > 1;
        if gap {
            warn!(
                "Fixture {} id {} sequence {} is more than one greater than current sequence {}",
                self.resource.name(), self.resource.id(), delta.sequence, current_sequence
            );
        }

        self.status.sequence.store(delta.sequence, Ordering::Release);

        if delta.epoch > current_epoch {
            return self.resync(&delta, gap).await;
        }

        if delta.epoch < current_epoch {
            debug!(
                "Fixture {} id {} delta epoch {} is behind current epoch {}",
                self.resource.name(), self.resource.id(), delta.epoch, current_epoch
            );
            return Ok(UpdateOutcome::Ignored);
        }

        let records = self.apply_delta(&delta).await;
        Ok(UpdateOutcome::Applied { records, gap })
    }

    async fn write_summary(&self, delta: &Fixture, size_bytes: usize, current_epoch: i64) {
        let size_kb = size_bytes as f64 / 1024.0;
        let mut line = format!("sequence {};size {}kb", delta.sequence, size_kb);
        if delta.epoch > current_epoch {
            line.push_str(&format!(";epoch {};", delta.epoch));
            for reason in delta.epoch_change_reasons() {
                line.push_str(&format!("{};", reason));
            }
        }
        if let Err(e) = self.sink.write_line(&line).await {
            warn!("Fixture {} failed to write summary line: {}", self.resource.id(), e);
        }
    }

    /// Emit one normalized record per delta market. Returns how many were written.
    async fn apply_delta(&self, delta: &Fixture) -> usize {
        let lines: Vec<String> = delta.markets.iter().map(|market| self.names.normalize(market).to_string()).collect();
        let results: Vec<Result<()>> = stream::iter(lines)
            .map(|line| {
                let sink = Arc::clone(&self.sink);
                async move { sink.write_line(&line).await }
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut written = 0;
        for result in results {
            match result {
                Ok(()) => written += 1,
                Err(e) => error!("Fixture {} failed to write market record: {}", self.resource.id(), e),
            }
        }
        written
    }

    async fn resync(&mut self, delta: &Fixture, gap: bool) -> FeedResult<UpdateOutcome> {
        info!(
            "Epoch changed for {} id {} from {} to {}",
            self.resource.name(), self.resource.id(), self.status.epoch(), delta.epoch
        );
        self.status.set_phase(ReconcilerPhase::Resyncing);
        if let Err(e) = self.resource.pause_stream().await {
            warn!("Fixture {} failed to pause stream: {}", self.resource.id(), e);
        }

        if delta.is_deleted() {
            info!(
                "Fixture {} has been deleted from the fixture factory. Stopping the stream",
                self.resource.name()
            );
            self.stop_upstream().await;
            self.status.mark_ended();
            return Ok(UpdateOutcome::Deleted);
        }

        let snapshot = match self.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Nothing else can be done; keep consuming so the next epoch change retries.
                self.resume_upstream().await;
                return Err(e);
            }
        };

        self.names = Arc::new(NameIndex::from_snapshot(&snapshot));
        self.status.epoch.store(snapshot.epoch, Ordering::Release);
        self.status
            .sequence
            .fetch_max(snapshot.sequence, Ordering::AcqRel);
        debug!(
            "Fixture {} rebuilt name index with {} markets at epoch {}",
            self.resource.id(), self.names.len(), snapshot.epoch
        );

        if snapshot.match_status.is_terminal() {
            info!(
                "Stopping streaming for {} with id {}, match status is MatchOver",
                self.resource.name(), self.resource.id()
            );
            self.stop_upstream().await;
            self.status.mark_ended();
            return Ok(UpdateOutcome::MatchOver);
        }

        self.resume_upstream().await;
        Ok(UpdateOutcome::Resynced { epoch: snapshot.epoch, gap })
    }

    async fn fetch_snapshot(&self) -> FeedResult<Fixture> {
        info!("Get snapshot for {}", self.resource.name());
        let raw = self.resource.fetch_snapshot().await?;
        let snapshot = Fixture::from_snapshot(&raw)?;
        info!("Successfully retrieved snapshot for {}", self.resource.name());
        Ok(snapshot)
    }

    async fn resume_upstream(&self) {
        if let Err(e) = self.resource.resume_stream().await {
            warn!("Fixture {} failed to resume stream: {}", self.resource.id(), e);
        }
        self.status.set_phase(ReconcilerPhase::Streaming);
    }

    async fn stop_upstream(&self) {
        if let Err(e) = self.resource.stop_stream().await {
            warn!("Fixture {} failed to stop stream: {}", self.resource.id(), e);
        }
    }
}

struct HandleInner {
    status: Arc<ReconcilerStatus>,
    resource: Arc<dyn FixtureResource>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// Registry-side view of a running reconciler. Dropping the last clone ends its event loop.
#[derive(Clone)]
pub struct ReconcilerHandle {
    inner: Arc<HandleInner>,
}

impl ReconcilerHandle {
    pub fn fixture_id(&self) -> &str {
        self.inner.status.fixture_id()
    }

    pub fn status(&self) -> &Arc<ReconcilerStatus> {
        &self.inner.status
    }

    pub fn is_ended(&self) -> bool {
        self.inner.status.is_ended()
    }

    pub fn is_running(&self) -> bool {
        !self.inner.task.is_finished()
    }

    /// Ask upstream to stop streaming and close the event loop. Does not wait for
    /// an update that is already being processed.
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping stream for fixture {}", self.fixture_id());
        let _ = self.inner.shutdown_tx.try_send(());
        self.inner.resource.stop_stream().await
    }
}
