/// Fixture Stream Layer
///
/// Keeps one reconciler per live fixture and decides, for every pushed update,
/// whether to apply it, drop it or resync from a snapshot:
///
/// - Discovery scheduler polling sport categories on a fixed interval
/// - Listener registry guaranteeing one reconciler per fixture
/// - Per-fixture reconciler consuming a serialized event channel
/// - Transport/discovery traits implemented by the feed client

pub mod config;
pub mod discovery;
pub mod memory;
pub mod reconciler;
pub mod registry;
pub mod transport;

#[cfg(test)]
mod tests;

pub use config::FeedConfig;
pub use discovery::{DiscoveryScheduler, DiscoverySchedulerBuilder, PollSummary};
pub use memory::{InMemoryDiscovery, InMemoryResource};
pub use reconciler::{FixtureReconciler, ReconcilerHandle, ReconcilerPhase, ReconcilerStatus, UpdateOutcome};
pub use registry::{ListenerRegistry, StartOutcome};
pub use transport::{DiscoveryClient, FixtureResource, StreamEvent};
