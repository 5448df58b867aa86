// Fixture model: snapshot/delta documents and the name index built from them
pub mod model;
// Stream layer: discovery scheduling, listener registry, per-fixture reconciliation
pub mod stream;

pub mod error;

// Common utilities: config loading, per-fixture record sinks, tracing setup
pub mod utils;

pub use error::{FeedError, FeedResult};
pub use model::{EpochChangeReason, Fixture, Market, MarketRecord, MatchStatus, NameIndex, ResourceSummary, Selection};
pub use stream::{
    DiscoveryClient, DiscoveryScheduler, DiscoverySchedulerBuilder, FeedConfig, FixtureReconciler, FixtureResource,
    ListenerRegistry, ReconcilerHandle, StartOutcome, StreamEvent, UpdateOutcome,
};
pub use utils::{FileSinkFactory, MemorySinkFactory, RecordSink, SinkFactory};
