use crate::model::ResourceSummary;
use async_trait::async_trait;
use eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Notifications a fixture stream delivers, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Connected,
    Disconnected,
    /// Raw JSON delta document
    Update(String),
}

/// Per-fixture push transport.
///
/// Implementations deliver every notification for the fixture into the
/// `events` channel handed to `start_stream`, one at a time and in order.
#[async_trait]
pub trait FixtureResource: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// State carried by the discovery listing, if any.
    fn content(&self) -> Option<ResourceSummary>;

    async fn start_stream(
        &self,
        echo_interval: Duration,
        echo_max_delay: Duration,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<()>;

    async fn stop_stream(&self) -> Result<()>;

    async fn pause_stream(&self) -> Result<()>;

    async fn resume_stream(&self) -> Result<()>;

    /// Full snapshot document for the fixture's current epoch.
    async fn fetch_snapshot(&self) -> Result<String>;
}

/// Lists the fixtures available for a sport category.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// `Ok(None)` when the sport category itself is unknown upstream.
    async fn list_resources(&self, sport: &str) -> Result<Option<Vec<Arc<dyn FixtureResource>>>>;
}
