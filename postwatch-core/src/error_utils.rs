use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        match self {
            CoreError::Fetch(e) => {
                e.log_error();
            }
            CoreError::Store(e) => {
                e.log_error();
            }
            CoreError::Notify(e) => {
                e.log_error();
            }
            CoreError::Config(e) => {
                e.log_error();
            }
            other => error!(code = %other.error_code(), "{}", other),
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(code = %self.error_code(), "{}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Fetch(e) => e.is_retryable(),
            CoreError::Store(e) => e.is_retryable(),
            CoreError::Notify(e) => e.is_retryable(),
            CoreError::Config(_) | CoreError::Io(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Fetch(e) => e.retry_after(),
            CoreError::Store(e) => e.retry_after(),
            CoreError::Notify(e) => e.retry_after(),
            CoreError::Config(_) | CoreError::Io(_) => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Fetch(e) => e.user_friendly_message(),
            CoreError::Store(e) => e.user_friendly_message(),
            CoreError::Notify(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Io(e) => format!("File access failed: {e}"),
        }
    }

    fn error_code(&self) -> String {
        let code = match self {
            CoreError::Fetch(_) => "FETCH",
            CoreError::Store(_) => "STORE",
            CoreError::Notify(_) => "NOTIFY",
            CoreError::Config(_) => "CONFIG",
            CoreError::Io(_) => "IO",
        };
        code.to_string()
    }
}

impl ErrorExt for FetchError {
    fn log_error(&self) -> &Self {
        error!("FetchError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("FetchError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network(_) => true,
            FetchError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        // Fetches are only retried by the next cycle.
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            FetchError::Timeout { handle, stage, .. } => {
                format!("Profile @{handle} did not render its {stage} in time; skipping this cycle.")
            }
            FetchError::Navigation { url, .. } => format!("Could not open {url}."),
            FetchError::Api { status, .. } => {
                format!("The page rendering service answered with status {status}.")
            }
            FetchError::Network(_) => {
                "Could not reach the page rendering service.".to_string()
            }
            FetchError::Extraction { what, .. } => format!("Could not read {what} from the page."),
        }
    }

    fn error_code(&self) -> String {
        match self {
            FetchError::Timeout { .. } => "FETCH_TIMEOUT".to_string(),
            FetchError::Navigation { .. } => "FETCH_NAVIGATION".to_string(),
            FetchError::Api { .. } => "FETCH_API".to_string(),
            FetchError::Network(_) => "FETCH_NETWORK".to_string(),
            FetchError::Extraction { .. } => "FETCH_EXTRACTION".to_string(),
        }
    }
}

impl ErrorExt for StoreError {
    fn log_error(&self) -> &Self {
        error!("StoreError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("StoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::DatabaseLocked | StoreError::ConnectionFailed { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            StoreError::DatabaseLocked => Some(Duration::from_millis(100)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            StoreError::AlreadyExists { .. } => "This post was already alerted.".to_string(),
            StoreError::ConnectionFailed { .. } => {
                "Could not open the alert database. Please check the path.".to_string()
            }
            StoreError::DatabaseLocked => {
                "Alert database is temporarily busy. Please try again.".to_string()
            }
            StoreError::CorruptDatabase => {
                "Alert database appears to be corrupted.".to_string()
            }
            _ => "Alert database error occurred.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            StoreError::AlreadyExists { .. } => "STORE_ALREADY_EXISTS".to_string(),
            StoreError::ConnectionFailed { .. } => "STORE_CONNECTION_FAILED".to_string(),
            StoreError::MigrationFailed { .. } => "STORE_MIGRATION_FAILED".to_string(),
            StoreError::DatabaseLocked => "STORE_LOCKED".to_string(),
            StoreError::CorruptDatabase => "STORE_CORRUPT".to_string(),
            StoreError::Sql(_) => "STORE_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for NotifyError {
    fn log_error(&self) -> &Self {
        error!("NotifyError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("NotifyError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        // ConfigMissing needs operator action, everything else gets another
        // chance on the next cycle.
        !matches!(self, NotifyError::ConfigMissing { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            NotifyError::ConfigMissing { missing } => {
                format!("Notifications are disabled: {missing} is not set.")
            }
            NotifyError::Transport { status, .. } => {
                format!("The messaging API refused the alert (status {status}).")
            }
            NotifyError::Network(_) => "Could not reach the messaging API.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            NotifyError::ConfigMissing { .. } => "NOTIFY_CONFIG_MISSING".to_string(),
            NotifyError::Transport { .. } => "NOTIFY_TRANSPORT".to_string(),
            NotifyError::Network(_) => "NOTIFY_NETWORK".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!(code = %self.error_code(), "Startup configuration rejected: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(code = %self.error_code(), "Questionable configuration: {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        // The process reads its configuration once, so nothing here heals itself
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("POSTWATCH_CONFIG points at '{path}', which does not exist.")
            }
            ConfigError::InvalidFormat { details } => {
                format!("Could not read the config file: {details}")
            }
            ConfigError::InvalidValue { field, value } => {
                format!("{field} has an unusable value '{value}'.")
            }
            ConfigError::ValidationFailed { reason } => format!("Refusing to start: {reason}."),
            ConfigError::NoHandles { path, reason } => {
                format!("No handles to monitor ({reason}). Add one handle per line to '{path}'.")
            }
            ConfigError::Parse(e) => format!("postwatch.toml is not valid TOML: {e}"),
        }
    }

    fn error_code(&self) -> String {
        let code = match self {
            ConfigError::FileNotFound { .. } => "CONFIG_MISSING_FILE",
            ConfigError::InvalidFormat { .. } => "CONFIG_UNREADABLE",
            ConfigError::InvalidValue { .. } => "CONFIG_BAD_VALUE",
            ConfigError::ValidationFailed { .. } => "CONFIG_REJECTED",
            ConfigError::NoHandles { .. } => "CONFIG_NO_HANDLES",
            ConfigError::Parse(_) => "CONFIG_TOML",
        };
        code.to_string()
    }
}

/// Logs contained errors from a worker. Nothing reported here stops the
/// service.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn report_error(&self, error: &CoreError) {
        error.log_error();
        info!(
            code = %error.error_code(),
            hint = %error.user_friendly_message(),
            "Contained error, continuing with the next item"
        );
    }

    pub fn report_warning(&self, error: &CoreError) {
        error.log_warn();
        if error.is_retryable() {
            info!(code = %error.error_code(), "Will retry on the next cycle");
        }
    }
}
