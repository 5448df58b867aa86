use async_trait::async_trait;
use chrono::Local;
use dashmap::DashMap;
use eyre::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Append-only destination for one fixture's normalized records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write_line(&self, line: &str) -> Result<()>;
}

/// Opens one sink per fixture.
#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn open(&self, fixture_id: &str, fixture_name: &str) -> Result<Arc<dyn RecordSink>>;
}

/// `{date};{message}` lines appended to a per-fixture file.
pub struct FileRecordSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileRecordSink {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        debug!("Opened fixture log {}", path.display());
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for FileRecordSink {
    async fn write_line(&self, line: &str) -> Result<()> {
        let stamped = format!("{};{}\n", Local::now().format("%Y-%m-%d %H:%M:%S,%3f"), line);
        let mut file = self.file.lock().await;
        file.write_all(stamped.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Creates `{log_dir}/{name}-{id}.log` files.
pub struct FileSinkFactory {
    log_dir: PathBuf,
}

impl FileSinkFactory {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self { log_dir: log_dir.into() }
    }

    pub fn file_name(fixture_id: &str, fixture_name: &str) -> String {
        let safe_name: String = fixture_name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
            .collect();
        format!("{}-{}.log", safe_name, fixture_id)
    }
}

#[async_trait]
impl SinkFactory for FileSinkFactory {
    async fn open(&self, fixture_id: &str, fixture_name: &str) -> Result<Arc<dyn RecordSink>> {
        tokio::fs::create_dir_all(&self.log_dir).await?;
        let path = self.log_dir.join(Self::file_name(fixture_id, fixture_name));
        Ok(Arc::new(FileRecordSink::open(path).await?))
    }
}

/// Keeps records in memory; used by tests and the replay demo.
#[derive(Default)]
pub struct MemoryRecordSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryRecordSink {
    pub async fn lines(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn write_line(&self, line: &str) -> Result<()> {
        self.lines.lock().await.push(line.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySinkFactory {
    sinks: DashMap<String, Arc<MemoryRecordSink>>,
}

impl MemorySinkFactory {
    pub fn sink(&self, fixture_id: &str) -> Option<Arc<MemoryRecordSink>> {
        self.sinks.get(fixture_id).map(|entry| Arc::clone(entry.value()))
    }
}

#[async_trait]
impl SinkFactory for MemorySinkFactory {
    async fn open(&self, fixture_id: &str, _fixture_name: &str) -> Result<Arc<dyn RecordSink>> {
        let sink = Arc::clone(self.sinks.entry(fixture_id.to_string()).or_default().value());
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_is_sanitized() {
        assert_eq!(FileSinkFactory::file_name("abc", "Home v Away"), "Home v Away-abc.log");
        assert_eq!(FileSinkFactory::file_name("abc", "A/B: C"), "A_B_ C-abc.log");
    }

    #[tokio::test]
    async fn test_file_sink_appends_dated_lines() {
        let dir = tempfile::tempdir().unwrap();
        let factory = FileSinkFactory::new(dir.path().join("fixtures"));
        let sink = factory.open("fx1", "Home v Away").await.unwrap();
        sink.write_line("sequence 1;size 0.1kb").await.unwrap();
        sink.write_line("Match Odds;Winner;Home;Away;").await.unwrap();

        // Reopening must append, not truncate.
        let again = factory.open("fx1", "Home v Away").await.unwrap();
        again.write_line("sequence 2;size 0.1kb").await.unwrap();

        let text = tokio::fs::read_to_string(dir.path().join("fixtures").join("Home v Away-fx1.log")).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(";sequence 1;size 0.1kb"));
        assert!(lines[1].ends_with(";Match Odds;Winner;Home;Away;"));
        assert!(lines[2].ends_with(";sequence 2;size 0.1kb"));
    }

    #[tokio::test]
    async fn test_memory_factory_shares_sink_per_fixture() {
        let factory = MemorySinkFactory::default();
        factory.open("fx1", "A").await.unwrap().write_line("one").await.unwrap();
        factory.open("fx1", "A").await.unwrap().write_line("two").await.unwrap();
        assert_eq!(factory.sink("fx1").unwrap().lines().await, vec!["one", "two"]);
        assert!(factory.sink("fx2").is_none());
    }
}
