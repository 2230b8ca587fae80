use crate::config::ConfigError;
use crate::lane::LaneId;
use crate::roi::RoiError;
use crate::stream::ConnectionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("lane {0} is not a configured lane")]
    UnknownLane(LaneId),
    #[error("snapshot for lane {snapshot} applied under lane {key}")]
    LaneMismatch { key: LaneId, snapshot: LaneId },
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("roi error: {0}")]
    Roi(#[from] RoiError),
    #[error("http client error: {0}")]
    HttpClient(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
