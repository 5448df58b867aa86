/// Scenario tests for the fixture stream layer
///
/// These drive the scheduler, registry and reconcilers together through the
/// in-memory discovery and transport.

#[cfg(test)]
mod scenario_tests {
    use super::super::*;
    use crate::model::{MatchStatus, ResourceSummary};
    use crate::utils::record_sink::{FileSinkFactory, MemorySinkFactory};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::time::Duration;

    fn snapshot(id: &str, epoch: i64, match_status: &str) -> String {
        json!({
            "Id": id, "Epoch": epoch, "Sequence": 1, "MatchStatus": match_status,
            "Markets": [
                {"Id": "m1", "Tags": {"name": "Winner", "type": "Match Odds"},
                 "Selections": [{"Id": "s1", "Tags": {"name": "Home"}}, {"Id": "s2", "Tags": {"name": "Away"}}]}
            ]
        })
        .to_string()
    }

    async fn resource(id: &str) -> Arc<InMemoryResource> {
        let resource = Arc::new(InMemoryResource::new(id, &format!("Fixture {}", id)));
        resource.set_snapshot(snapshot(id, 1, "40")).await;
        resource
    }

    fn config(sports: &[&str]) -> FeedConfig {
        FeedConfig {
            poll_interval_secs: 1,
            sports: sports.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_poll_cycle_starts_one_listener_per_fixture() {
        let discovery = Arc::new(InMemoryDiscovery::default());
        discovery.set_resources("Football", vec![resource("f1").await, resource("f2").await]);
        discovery.set_resources("Tennis", vec![resource("t1").await]);

        let scheduler = DiscoveryScheduler::new(
            config(&["Tennis", "Football"]),
            discovery,
            Arc::new(MemorySinkFactory::default()),
        );

        let summary = scheduler.poll_cycle().await;
        assert_eq!(summary.started, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(scheduler.registry().len(), 3);

        let summary = scheduler.poll_cycle().await;
        assert_eq!(summary.started, 0);
        assert_eq!(summary.in_progress, 3);
        assert_eq!(scheduler.registry().len(), 3);
    }

    #[tokio::test]
    async fn test_finished_fixture_is_not_started() {
        let discovery = Arc::new(InMemoryDiscovery::default());
        let finished = Arc::new(
            InMemoryResource::new("f1", "Over").with_content(ResourceSummary {
                match_status: MatchStatus::MatchOver,
                sequence: 40,
            }),
        );
        discovery.set_resources("Football", vec![finished.clone()]);

        let scheduler = DiscoveryScheduler::new(config(&["Football"]), discovery, Arc::new(MemorySinkFactory::default()));
        let summary = scheduler.poll_cycle().await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(finished.fetch_count(), 0);
        assert!(scheduler.registry().is_empty());
        assert!(!scheduler.registry().is_starting("f1"));
    }

    #[tokio::test]
    async fn test_failing_fixture_does_not_abort_siblings() {
        let discovery = Arc::new(InMemoryDiscovery::default());
        let broken = resource("f2").await;
        broken.fail_snapshots(true);
        let malformed = Arc::new(InMemoryResource::new("f3", "Malformed"));
        malformed.set_snapshot("{\"Epoch\": \"x\"".to_string()).await;
        discovery.set_resources("Football", vec![resource("f1").await, broken, malformed, resource("f4").await]);
        discovery.fail_sport("Tennis");
        discovery.set_resources("Rugby", vec![resource("r1").await]);

        let scheduler = DiscoveryScheduler::new(
            config(&["Tennis", "Football", "Rugby"]),
            discovery,
            Arc::new(MemorySinkFactory::default()),
        );
        let summary = scheduler.poll_cycle().await;
        assert_eq!(summary.started, 3);
        assert_eq!(summary.failed, 2);
        assert!(scheduler.registry().contains("f1"));
        assert!(scheduler.registry().contains("f4"));
        assert!(scheduler.registry().contains("r1"));
        assert!(!scheduler.registry().is_starting("f2"));
        assert!(!scheduler.registry().is_starting("f3"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_poll_cycles_never_duplicate_listeners() {
        let discovery = Arc::new(InMemoryDiscovery::default());
        let mut resources = Vec::new();
        for i in 0..30 {
            let r = resource(&format!("f{}", i)).await;
            r.set_fetch_delay(Duration::from_millis(15));
            resources.push(r);
        }
        discovery.set_resources("Football", resources.clone());

        let scheduler = Arc::new(DiscoveryScheduler::new(
            config(&["Football"]),
            discovery,
            Arc::new(MemorySinkFactory::default()),
        ));

        let (a, b, c) = tokio::join!(scheduler.poll_cycle(), scheduler.poll_cycle(), scheduler.poll_cycle());
        assert_eq!(a.started + b.started + c.started, 30);
        assert_eq!(scheduler.registry().len(), 30);
        assert!(resources.iter().all(|r| r.start_count() == 1));
    }

    #[tokio::test]
    async fn test_ended_fixture_is_reaped_and_restarted() {
        let discovery = Arc::new(InMemoryDiscovery::default());
        let fixture = resource("f1").await;
        discovery.set_resources("Football", vec![fixture.clone()]);
        let scheduler = DiscoveryScheduler::new(config(&["Football"]), discovery, Arc::new(MemorySinkFactory::default()));

        scheduler.poll_cycle().await;
        let deleted = json!({"Epoch": 2, "Sequence": 2, "LastEpochChangeReason": [10]}).to_string();
        fixture.push(StreamEvent::Update(deleted)).await.unwrap();
        let handle = scheduler.registry().get("f1").unwrap();
        assert!(wait_for(|| handle.is_ended()).await);
        assert_eq!(fixture.fetch_count(), 1);

        let summary = scheduler.poll_cycle().await;
        assert_eq!(summary.reaped, 1);
        assert!(scheduler.registry().is_empty());

        let summary = scheduler.poll_cycle().await;
        assert_eq!(summary.started, 1);
        assert_eq!(fixture.start_count(), 2);
    }

    #[tokio::test]
    async fn test_scheduler_lifecycle_with_updates() {
        let discovery = Arc::new(InMemoryDiscovery::default());
        let fixture = resource("f1").await;
        discovery.set_resources("Football", vec![fixture.clone()]);
        let sinks = Arc::new(MemorySinkFactory::default());

        let mut scheduler = DiscoverySchedulerBuilder::new()
            .with_config(config(&["Football"]))
            .with_discovery(discovery.clone())
            .with_sink_factory(sinks.clone())
            .build()
            .unwrap();
        scheduler.start().unwrap();
        assert!(scheduler.is_running());

        let registry = scheduler.registry().clone();
        assert!(wait_for(|| registry.contains("f1")).await);

        fixture.push(StreamEvent::Connected).await.unwrap();
        let update = json!({"Epoch": 1, "Sequence": 2, "Markets": [{"Id": "m1", "Selections": [{"Id": "s2"}]}]});
        fixture.push(StreamEvent::Update(update.to_string())).await.unwrap();

        let sink = sinks.sink("f1").unwrap();
        let mut found = false;
        for _ in 0..200 {
            if sink.lines().await.contains(&"Match Odds;Winner;Away;".to_string()) {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(found);

        assert_eq!(scheduler.stop().await, 1);
        assert!(!scheduler.is_running());
        assert_eq!(fixture.stop_count(), 1);

        let listings = discovery.listing_count();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(discovery.listing_count(), listings);
    }

    #[tokio::test]
    async fn test_records_are_written_to_fixture_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = Arc::new(InMemoryDiscovery::default());
        let fixture = resource("f1").await;
        discovery.set_resources("Football", vec![fixture.clone()]);
        let scheduler = DiscoveryScheduler::new(
            config(&["Football"]),
            discovery,
            Arc::new(FileSinkFactory::new(dir.path())),
        );

        scheduler.poll_cycle().await;
        let update = json!({"Epoch": 1, "Sequence": 2, "Markets": [{"Id": "m1", "Selections": [{"Id": "s1"}, {"Id": "s2"}]}]});
        fixture.push(StreamEvent::Update(update.to_string())).await.unwrap();
        fixture.push(StreamEvent::Disconnected).await.unwrap();

        let handle = scheduler.registry().get("f1").unwrap();
        assert!(wait_for(|| handle.is_ended()).await);

        let text = tokio::fs::read_to_string(dir.path().join("Fixture f1-f1.log")).await.unwrap();
        let messages: Vec<String> = text
            .lines()
            .map(|line| line.split_once(';').map(|(_, message)| message.to_string()).unwrap_or_default())
            .collect();
        assert!(messages[0].starts_with("sequence 2;size "));
        assert_eq!(messages[1], "Match Odds;Winner;Home;Away;");
        assert_eq!(messages[2], "SUSPENDED;Match Odds;Winner;");
    }
}
