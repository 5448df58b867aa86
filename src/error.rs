use crate::utils::config_loader::LoadConfigError;
use eyre::Report;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("malformed fixture document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("fixture log io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] LoadConfigError),
    #[error("scheduler cannot start: {0}")]
    SchedulerStart(String),
    #[error("scheduler already running")]
    AlreadyRunning,
    #[error(transparent)]
    Internal(Report),
}

impl From<Report> for FeedError {
    fn from(error: Report) -> Self {
        Self::Internal(error)
    }
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
