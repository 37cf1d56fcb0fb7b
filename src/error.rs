use thiserror::Error;

/// Errors that can occur while setting up or running a harness.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// An environment variable could not be parsed. This is the only error
    /// that aborts a run before any session is created.
    #[error("invalid value {value:?} for {key}")]
    Config { key: &'static str, value: String },

    #[error("client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// A specialized `Result` type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
