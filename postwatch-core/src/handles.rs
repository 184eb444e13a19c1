use crate::{ConfigError, CoreError, ErrorExt, Handle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The watch list: a plain text file with one handle per line, read fresh
/// every cycle so it can be edited while the service runs.
#[derive(Debug, Clone)]
pub struct HandleSource {
    path: PathBuf,
    dedupe: bool,
}

impl HandleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dedupe: false,
        }
    }

    /// Drop repeated handles before dispatch, keeping the first occurrence.
    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn try_load(&self) -> Result<Vec<Handle>, CoreError> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let handles = parse_handles(&contents, self.dedupe);
        debug!(
            path = %self.path.display(),
            count = handles.len(),
            "Loaded watch list"
        );
        Ok(handles)
    }

    /// Startup check. An unreadable or empty file is a configuration error
    /// carrying the cause.
    pub async fn load_at_boot(&self) -> Result<Vec<Handle>, CoreError> {
        let reason = match self.try_load().await {
            Ok(handles) if !handles.is_empty() => return Ok(handles),
            Ok(_) => "file contains no handles".to_string(),
            Err(e) => e.to_string(),
        };
        Err(ConfigError::NoHandles {
            path: self.path.display().to_string(),
            reason,
        }
        .into())
    }

    /// Read failures are logged and yield an empty list.
    pub async fn load(&self) -> Vec<Handle> {
        match self.try_load().await {
            Ok(handles) => handles,
            Err(e) => {
                warn!(path = %self.path.display(), "Error reading users file");
                e.log_warn();
                Vec::new()
            }
        }
    }
}

pub fn parse_handles(contents: &str, dedupe: bool) -> Vec<Handle> {
    let mut seen = HashSet::new();
    contents
        .lines()
        .filter_map(Handle::parse)
        .filter(|h| !dedupe || seen.insert(h.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("postwatch_users_{}.txt", uuid::Uuid::new_v4()))
    }

    fn names(handles: &[Handle]) -> Vec<&str> {
        handles.iter().map(Handle::as_str).collect()
    }

    #[test]
    fn test_parse_strips_and_skips_blank_lines() {
        let handles = parse_handles("  alice\n\n\tbob  \r\n   \ncarol", false);
        assert_eq!(names(&handles), ["alice", "bob", "carol"]);
    }

    #[test]
    fn test_parse_keeps_duplicates_by_default() {
        let handles = parse_handles("alice\nbob\nalice\n", false);
        assert_eq!(names(&handles), ["alice", "bob", "alice"]);
    }

    #[test]
    fn test_parse_dedupe_preserves_first_position() {
        let handles = parse_handles("bob\nalice\nbob\nalice\ncarol", true);
        assert_eq!(names(&handles), ["bob", "alice", "carol"]);
    }

    #[tokio::test]
    async fn test_load_reads_file_each_time() {
        let path = temp_path();
        tokio::fs::write(&path, "alice\nbob\n").await.unwrap();
        let source = HandleSource::new(&path);
        assert_eq!(names(&source.load().await), ["alice", "bob"]);

        tokio::fs::write(&path, "carol\n").await.unwrap();
        assert_eq!(names(&source.load().await), ["carol"]);

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_boot_load_rejects_missing_file_with_cause() {
        let source = HandleSource::new(temp_path());
        match source.load_at_boot().await {
            Err(CoreError::Config(ConfigError::NoHandles { path, reason })) => {
                assert_eq!(path, source.path().display().to_string());
                assert!(reason.starts_with("IO error"));
            }
            other => panic!("expected NoHandles, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_boot_load_rejects_blank_file() {
        let path = temp_path();
        tokio::fs::write(&path, "\n   \n\t\n").await.unwrap();
        let result = HandleSource::new(&path).load_at_boot().await;
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::NoHandles { ref reason, .. }))
                if reason == "file contains no handles"
        ));
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_boot_load_returns_handles() {
        let path = temp_path();
        tokio::fs::write(&path, "alice\n\nbob\n").await.unwrap();
        let handles = HandleSource::new(&path).load_at_boot().await.unwrap();
        assert_eq!(names(&handles), ["alice", "bob"]);
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_not_fatal() {
        let source = HandleSource::new(temp_path());
        assert!(source.load().await.is_empty());
        assert!(matches!(source.try_load().await, Err(CoreError::Io(_))));
    }
}
