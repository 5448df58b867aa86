//! Scripted in-process collaborators. Used by the tests and the replay demo
//! in place of a network transport.

use crate::model::ResourceSummary;
use crate::stream::transport::{DiscoveryClient, FixtureResource, StreamEvent};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use eyre::{Result, eyre};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

/// Fixture whose stream events are pushed by the caller.
pub struct InMemoryResource {
    id: String,
    name: String,
    content: Option<ResourceSummary>,
    snapshot: Mutex<Option<String>>,
    events: Mutex<Option<mpsc::Sender<StreamEvent>>>,
    fail_snapshots: AtomicBool,
    fetch_delay_ms: AtomicU64,
    starts: AtomicUsize,
    stops: AtomicUsize,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
    fetches: AtomicUsize,
}

impl InMemoryResource {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            content: None,
            snapshot: Mutex::new(None),
            events: Mutex::new(None),
            fail_snapshots: AtomicBool::new(false),
            fetch_delay_ms: AtomicU64::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_content(mut self, content: ResourceSummary) -> Self {
        self.content = Some(content);
        self
    }

    pub async fn set_snapshot(&self, snapshot: String) {
        *self.snapshot.lock().await = Some(snapshot);
    }

    pub fn fail_snapshots(&self, fail: bool) {
        self.fail_snapshots.store(fail, Ordering::Relaxed);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.fetch_delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Deliver an event to the running stream.
    pub async fn push(&self, event: StreamEvent) -> Result<()> {
        let sender = self.events.lock().await.clone().ok_or_else(|| eyre!("stream for {} is not running", self.id))?;
        sender.send(event).await.map_err(|_| eyre!("event loop for {} has closed", self.id))
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::Relaxed)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::Relaxed)
    }

    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::Relaxed)
    }

    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::Relaxed)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FixtureResource for InMemoryResource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn content(&self) -> Option<ResourceSummary> {
        self.content
    }

    async fn start_stream(
        &self,
        _echo_interval: Duration,
        _echo_max_delay: Duration,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        self.starts.fetch_add(1, Ordering::Relaxed);
        *self.events.lock().await = Some(events);
        Ok(())
    }

    async fn stop_stream(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::Relaxed);
        self.events.lock().await.take();
        Ok(())
    }

    async fn pause_stream(&self) -> Result<()> {
        self.pauses.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn resume_stream(&self) -> Result<()> {
        self.resumes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn fetch_snapshot(&self) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let delay = self.fetch_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_snapshots.load(Ordering::Relaxed) {
            return Err(eyre!("snapshot unavailable for {}", self.id));
        }
        self.snapshot.lock().await.clone().ok_or_else(|| eyre!("no snapshot for {}", self.id))
    }
}

/// Sport category -> fixtures listing.
#[derive(Default)]
pub struct InMemoryDiscovery {
    sports: DashMap<String, Vec<Arc<InMemoryResource>>>,
    failing: DashSet<String>,
    listings: AtomicUsize,
}

impl InMemoryDiscovery {
    pub fn set_resources(&self, sport: &str, resources: Vec<Arc<InMemoryResource>>) {
        self.sports.insert(sport.to_string(), resources);
    }

    pub fn fail_sport(&self, sport: &str) {
        self.failing.insert(sport.to_string());
    }

    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DiscoveryClient for InMemoryDiscovery {
    async fn list_resources(&self, sport: &str) -> Result<Option<Vec<Arc<dyn FixtureResource>>>> {
        self.listings.fetch_add(1, Ordering::Relaxed);
        if self.failing.contains(sport) {
            return Err(eyre!("discovery unavailable for {}", sport));
        }
        Ok(self.sports.get(sport).map(|entry| {
            entry
                .value()
                .iter()
                .map(|resource| Arc::clone(resource) as Arc<dyn FixtureResource>)
                .collect()
        }))
    }
}
