use crate::error::FeedResult;
use crate::stream::reconciler::ReconcilerHandle;
use dashmap::{DashMap, DashSet};
use futures::{StreamExt, stream};
use std::future::Future;
use tracing::{error, info, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new reconciler was registered
    Started,
    /// The factory declined to start one (e.g. the match is already over)
    Skipped,
    /// A reconciler exists or is being started by another worker
    InProgress,
    /// The existing reconciler had ended and was removed
    Reaped,
}

/// Removes the "being started" marker when the start attempt finishes, even on panic.
struct ActiveGuard<'a> {
    active: &'a DashSet<String>,
    fixture_id: &'a str,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.remove(self.fixture_id);
    }
}

/// Fixture id -> running reconciler, plus the ids currently being started.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<String, ReconcilerHandle>,
    active: DashSet<String>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a reconciler for `fixture_id` unless one exists or is being started.
    ///
    /// The factory runs without any map lock held. An existing reconciler that
    /// has ended is removed so the next call can start a fresh one.
    pub async fn try_start<F, Fut>(&self, fixture_id: &str, fixture_name: &str, factory: F) -> FeedResult<StartOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FeedResult<Option<ReconcilerHandle>>>,
    {
        if self.listeners.contains_key(fixture_id) || !self.active.insert(fixture_id.to_string()) {
            return Ok(self.on_existing(fixture_id, fixture_name).await);
        }
        let _guard = ActiveGuard { active: &self.active, fixture_id };

        // Another worker may have registered between the two checks above.
        if self.listeners.contains_key(fixture_id) {
            return Ok(self.on_existing(fixture_id, fixture_name).await);
        }

        match factory().await? {
            Some(handle) => {
                self.listeners.insert(fixture_id.to_string(), handle);
                Ok(StartOutcome::Started)
            }
            None => Ok(StartOutcome::Skipped),
        }
    }

    /// Reaps a reconciler that has ended or whose event loop is gone, and asks
    /// upstream to stop its stream.
    async fn on_existing(&self, fixture_id: &str, fixture_name: &str) -> StartOutcome {
        info!("Fixture {} id {} is currently being processed", fixture_name, fixture_id);
        let reaped = self
            .listeners
            .remove_if(fixture_id, |_, handle| handle.is_ended() || !handle.is_running());
        let Some((_, handle)) = reaped else {
            return StartOutcome::InProgress;
        };

        info!("Fixture {} id {} is over.", fixture_name, fixture_id);
        if let Err(e) = handle.stop().await {
            warn!("Failed to stop stream for reaped fixture {}: {}", fixture_id, e);
        }
        StartOutcome::Reaped
    }

    /// Stop every registered reconciler, at most `max_concurrency` at a time.
    /// Returns how many stopped cleanly.
    pub async fn stop_all(&self, max_concurrency: usize) -> usize {
        let handles: Vec<ReconcilerHandle> = self.listeners.iter().map(|entry| entry.value().clone()).collect();
        info!("Stopping {} fixture listeners", handles.len());

        let results: Vec<_> = stream::iter(handles)
            .map(|handle| async move {
                let result = handle.stop().await;
                (handle, result)
            })
            .buffer_unordered(max_concurrency.max(1))
            .collect()
            .await;

        let mut stopped = 0;
        for (handle, result) in results {
            match result {
                Ok(()) => stopped += 1,
                Err(e) => error!("Failed to stop listener for fixture {}: {}", handle.fixture_id(), e),
            }
        }
        stopped
    }

    pub fn get(&self, fixture_id: &str) -> Option<ReconcilerHandle> {
        self.listeners.get(fixture_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, fixture_id: &str) -> bool {
        self.listeners.contains_key(fixture_id)
    }

    pub fn is_starting(&self, fixture_id: &str) -> bool {
        self.active.contains(fixture_id)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Registered reconcilers that have not ended.
    pub fn live_count(&self) -> usize {
        self.listeners.iter().filter(|entry| !entry.value().is_ended()).count()
    }
}
