pub mod config_loader;
pub mod logging;
pub mod record_sink;

pub use config_loader::*;
pub use logging::init_tracing;
pub use record_sink::{FileRecordSink, FileSinkFactory, MemoryRecordSink, MemorySinkFactory, RecordSink, SinkFactory};
