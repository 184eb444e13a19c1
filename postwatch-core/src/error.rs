use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Timed out after {seconds}s waiting for {stage} of @{handle}")]
    Timeout {
        handle: String,
        stage: FetchStage,
        seconds: u64,
    },

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Rendering service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network failure talking to rendering service: {0}")]
    Network(String),

    #[error("Could not extract {what} from page: {details}")]
    Extraction { what: String, details: String },
}

/// The two bounded waits a profile fetch performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Posts,
    Followers,
}

impl std::fmt::Display for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStage::Posts => write!(f, "post container"),
            FetchStage::Followers => write!(f, "follower count"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Post already recorded for @{handle}: {permalink}")]
    AlreadyExists { handle: String, permalink: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Schema initialization failed: {reason}")]
    MigrationFailed { reason: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("Corrupt database")]
    CorruptDatabase,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification destination not configured: missing {missing}")]
    ConfigMissing { missing: String },

    #[error("Messaging API rejected the message ({status}): {body}")]
    Transport { status: u16, body: String },

    #[error("Network failure sending notification: {0}")]
    Network(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {details}")]
    InvalidFormat { details: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("No handles could be loaded from {path}: {reason}")]
    NoHandles { path: String, reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
