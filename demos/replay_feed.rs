/// Replay Feed Example
///
/// Wires an in-memory discovery listing through the scheduler and replays a
/// short scripted stream for one fixture: a delta, a stale update, an epoch
/// change that forces a resync, and finally a disconnect.
use fixture_stream::stream::{InMemoryDiscovery, InMemoryResource};
use fixture_stream::utils::init_tracing;
use fixture_stream::{DiscoverySchedulerBuilder, FeedConfig, FileSinkFactory, StreamEvent};
use eyre::Result;
use serde_json::json;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

fn snapshot(epoch: i64, sequence: i64) -> String {
    json!({
        "Id": "fx-100", "Epoch": epoch, "Sequence": sequence, "MatchStatus": "40",
        "Markets": [
            {"Id": "m1", "Tags": {"name": "Winner", "type": "Match Odds"},
             "Selections": [{"Id": "s1", "Tags": {"name": "Home"}}, {"Id": "s2", "Tags": {"name": "Away"}}]},
            {"Id": "m2", "Tags": {"name": "Total Goals", "type": "Over/Under"},
             "Selections": [{"Id": "s3", "Tags": {"name": "Over 2.5"}}, {"Id": "s4", "Tags": {"name": "Under 2.5"}}]}
        ]
    })
    .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");
    info!("Starting replay feed example");

    let config = FeedConfig::from_env().unwrap_or_else(|e| {
        warn!("Failed to load config from environment ({}), using defaults", e);
        FeedConfig::default()
    });
    let config = FeedConfig { poll_interval_secs: 1, sports: vec!["Football".to_string()], ..config };
    info!("Fixture logs will be written to {}", config.log_dir.display());

    let fixture = Arc::new(InMemoryResource::new("fx-100", "Home v Away"));
    fixture.set_snapshot(snapshot(3, 10)).await;
    let discovery = Arc::new(InMemoryDiscovery::default());
    discovery.set_resources("Football", vec![fixture.clone()]);

    let mut scheduler = DiscoverySchedulerBuilder::new()
        .with_sink_factory(Arc::new(FileSinkFactory::new(&config.log_dir)))
        .with_config(config)
        .with_discovery(discovery)
        .build()?;
    scheduler.start()?;

    let mut registered = false;
    for _ in 0..50 {
        if scheduler.registry().contains("fx-100") {
            registered = true;
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    if !registered {
        warn!("Fixture was never registered, stopping");
        scheduler.stop().await;
        return Ok(());
    }

    let script = vec![
        StreamEvent::Connected,
        StreamEvent::Update(json!({"Epoch": 3, "Sequence": 11, "Markets": [{"Id": "m1", "Selections": [{"Id": "s2"}]}]}).to_string()),
        StreamEvent::Update(json!({"Epoch": 3, "Sequence": 9, "Markets": [{"Id": "m2"}]}).to_string()),
        StreamEvent::Update(json!({"Epoch": 4, "Sequence": 12, "LastEpochChangeReason": [40]}).to_string()),
        StreamEvent::Update(json!({"Epoch": 4, "Sequence": 13, "Markets": [{"Id": "m2", "Selections": [{"Id": "s3"}]}]}).to_string()),
        StreamEvent::Disconnected,
    ];

    fixture.set_snapshot(snapshot(4, 12)).await;
    for event in script {
        info!("Replaying {:?}", event);
        fixture.push(event).await?;
        sleep(Duration::from_millis(200)).await;
    }

    if let Some(handle) = scheduler.registry().get("fx-100") {
        let status = handle.status();
        info!(
            "Fixture {} finished: epoch={}, sequence={}, ended={}",
            handle.fixture_id(),
            status.epoch(),
            status.sequence(),
            handle.is_ended()
        );
    }

    let stopped = scheduler.stop().await;
    info!("Scheduler stopped, {} listeners shut down", stopped);
    Ok(())
}
