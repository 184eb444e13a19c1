use crate::{ConfigError, CoreError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_KEYWORDS: &[&str] = &["crypto", "coin", "token", "safemoon", "$", "moonshot"];
pub const DEFAULT_CONFIG_FILE: &str = "postwatch.toml";

/// Upper bound for each of the two render timeouts.
pub const MAX_RENDER_TIMEOUT: Duration = Duration::from_secs(3600);

/// Immutable runtime configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_api_base: String,
    pub check_interval: Duration,
    pub users_file: PathBuf,
    pub num_workers: usize,
    pub db_filename: PathBuf,
    pub post_max_age: chrono::Duration,
    pub keywords: Vec<String>,
    pub dedupe_handles: bool,
    pub browserless_url: String,
    pub browserless_token: Option<String>,
    pub profile_base_url: String,
    pub page_load_timeout: Duration,
    pub element_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_base: "https://api.telegram.org".to_string(),
            check_interval: Duration::ZERO,
            users_file: PathBuf::from("users.txt"),
            num_workers: 5,
            db_filename: PathBuf::from("alerted_posts.db"),
            post_max_age: chrono::Duration::days(7),
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            dedupe_handles: false,
            browserless_url: "http://localhost:3000".to_string(),
            browserless_token: None,
            profile_base_url: "https://x.com".to_string(),
            page_load_timeout: Duration::from_secs(60),
            element_timeout: Duration::from_secs(50),
        }
    }
}

/// Optional on-disk overrides. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    telegram_chat_id: Option<String>,
    telegram_api_base: Option<String>,
    check_interval_seconds: Option<u64>,
    users_file: Option<PathBuf>,
    num_threads: Option<usize>,
    db_filename: Option<PathBuf>,
    post_max_age_days: Option<i64>,
    keywords: Option<Vec<String>>,
    dedupe_handles: Option<bool>,
    browserless_url: Option<String>,
    profile_base_url: Option<String>,
    page_load_timeout_seconds: Option<u64>,
    element_timeout_seconds: Option<u64>,
}

impl AppConfig {
    /// Defaults, then the optional TOML file named by `POSTWATCH_CONFIG`,
    /// then the process environment.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let (config_path, explicit) = match lookup("POSTWATCH_CONFIG") {
            Some(path) => (PathBuf::from(path), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if let Some(file) = FileConfig::read(&config_path, explicit)? {
            config.apply_file(file)?;
        }

        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(v) = file.telegram_chat_id {
            self.telegram_chat_id = Some(v);
        }
        if let Some(v) = file.telegram_api_base {
            self.telegram_api_base = v;
        }
        if let Some(v) = file.check_interval_seconds {
            self.check_interval = Duration::from_secs(v);
        }
        if let Some(v) = file.users_file {
            self.users_file = v;
        }
        if let Some(v) = file.num_threads {
            self.num_workers = v;
        }
        if let Some(v) = file.db_filename {
            self.db_filename = v;
        }
        if let Some(v) = file.post_max_age_days {
            self.post_max_age = days("post_max_age_days", v)?;
        }
        if let Some(v) = file.keywords {
            self.keywords = v;
        }
        if let Some(v) = file.dedupe_handles {
            self.dedupe_handles = v;
        }
        if let Some(v) = file.browserless_url {
            self.browserless_url = v;
        }
        if let Some(v) = file.profile_base_url {
            self.profile_base_url = v;
        }
        if let Some(v) = file.page_load_timeout_seconds {
            self.page_load_timeout = Duration::from_secs(v);
        }
        if let Some(v) = file.element_timeout_seconds {
            self.element_timeout = Duration::from_secs(v);
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.telegram_chat_id = Some(v);
        }
        if let Some(v) = get("TELEGRAM_API_BASE") {
            self.telegram_api_base = v;
        }
        if let Some(v) = get("CHECK_INTERVAL_SECONDS") {
            self.check_interval = Duration::from_secs(parse_number("CHECK_INTERVAL_SECONDS", &v)?);
        }
        if let Some(v) = get("USERS_FILE") {
            self.users_file = PathBuf::from(v);
        }
        if let Some(v) = get("NUM_THREADS") {
            self.num_workers = parse_number("NUM_THREADS", &v)?;
        }
        if let Some(v) = get("DB_FILENAME") {
            self.db_filename = PathBuf::from(v);
        }
        if let Some(v) = get("POST_MAX_AGE_DAYS") {
            self.post_max_age = days("POST_MAX_AGE_DAYS", parse_number("POST_MAX_AGE_DAYS", &v)?)?;
        }
        if let Some(v) = get("KEYWORDS") {
            self.keywords = v
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get("DEDUPE_HANDLES") {
            self.dedupe_handles = parse_bool("DEDUPE_HANDLES", &v)?;
        }
        if let Some(v) = get("BROWSERLESS_URL") {
            self.browserless_url = v;
        }
        if let Some(v) = get("BROWSERLESS_TOKEN") {
            self.browserless_token = Some(v);
        }
        if let Some(v) = get("PROFILE_BASE_URL") {
            self.profile_base_url = v;
        }
        if let Some(v) = get("PAGE_LOAD_TIMEOUT_SECONDS") {
            self.page_load_timeout =
                Duration::from_secs(parse_number("PAGE_LOAD_TIMEOUT_SECONDS", &v)?);
        }
        if let Some(v) = get("ELEMENT_TIMEOUT_SECONDS") {
            self.element_timeout =
                Duration::from_secs(parse_number("ELEMENT_TIMEOUT_SECONDS", &v)?);
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "NUM_THREADS must be at least 1".to_string(),
            });
        }
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed {
                reason: "keyword list is empty".to_string(),
            });
        }
        for (field, timeout) in [
            ("PAGE_LOAD_TIMEOUT_SECONDS", self.page_load_timeout),
            ("ELEMENT_TIMEOUT_SECONDS", self.element_timeout),
        ] {
            if timeout > MAX_RENDER_TIMEOUT {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: timeout.as_secs().to_string(),
                });
            }
        }
        Ok(())
    }
}

impl FileConfig {
    fn read(path: &Path, explicit: bool) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            }
            Err(e) => {
                return Err(ConfigError::InvalidFormat {
                    details: format!("{}: {e}", path.display()),
                })
            }
        };
        Ok(Some(toml::from_str(&contents)?))
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

fn days(field: &str, value: i64) -> Result<chrono::Duration, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    };
    if value < 0 {
        return Err(invalid());
    }
    chrono::Duration::try_days(value).ok_or_else(invalid)
}
