//! Error handling for the air-quality forwarder.

/// A specialized `Result` type for airq_chords operations.
pub type Result<T> = std::result::Result<T, AirqError>;

/// The main error type for collection and delivery.
#[derive(Debug, thiserror::Error)]
pub enum AirqError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration document could not be parsed
    #[error("Invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration is structurally valid JSON but unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// A sensor could not be read
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// Submission address could not be built
    #[error("Invalid submission address: {0}")]
    Url(#[from] url::ParseError),

    /// Remote endpoint rejected or never answered a submission
    #[error("Transport error: {0}")]
    Transport(String),

    /// Delivery worker is no longer running
    #[error("Delivery queue is closed")]
    QueueClosed,

    /// Status server error
    #[error("Status server error: {0}")]
    StatusServer(String),
}

impl AirqError {
    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new sensor error
    pub fn sensor_error(msg: impl Into<String>) -> Self {
        Self::Sensor(msg.into())
    }

    /// Create a new transport error
    pub fn transport_error(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new status server error
    pub fn status_server_error(msg: impl Into<String>) -> Self {
        Self::StatusServer(msg.into())
    }
}

impl From<reqwest::Error> for AirqError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
