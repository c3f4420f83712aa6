//! Error types for Drishti

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Drishti error types
///
/// Wire-level problems (bad checksums, truncated frames) never surface here:
/// they are dropped at the frame boundary. These variants cover setup and
/// lifecycle failures only.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sensor address could not be resolved or is unset
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No sensor with the given name
    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    /// No zone with the given name
    #[error("Unknown zone: {0}")]
    UnknownZone(String),

    /// Peer closed the connection
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Worker thread could not be spawned
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),

    /// Worker thread panicked
    #[error("Thread panicked")]
    ThreadPanic,
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
