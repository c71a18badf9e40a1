use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScriptgateError {
    /// Startup configuration is missing, unreadable or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Certificate chain or private key could not be loaded or validated.
    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Failed to start listening on {endpoint}: {source}")]
    Listen {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error while accepting connection: {0}")]
    Accept(#[source] std::io::Error),

    /// The interpreter could not run the requested script.
    #[error("Failed to execute {file}: {reason}")]
    Execution { file: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The remote handler reported a failure.
    #[error("Remote call failed: {0}")]
    Remote(String),

    #[error("TLS handshake error: {0}")]
    Handshake(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// A frame, in either direction, is larger than the wire allows.
    #[error("Message too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Connection queue is closed")]
    QueueClosed,

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptgateError {
    /// Builds an [`ScriptgateError::Execution`] for the given script.
    pub fn execution(file: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ScriptgateError::Execution {
            file: file.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<rustls::Error> for ScriptgateError {
    fn from(err: rustls::Error) -> Self {
        ScriptgateError::Certificate(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScriptgateError>;
