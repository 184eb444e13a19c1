use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a monitored profile, e.g. `alice` for `https://x.com/alice`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    /// Trims the input and rejects empty strings.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Profile page for this handle under `base_url`.
    pub fn profile_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single post as rendered on the profile page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSnapshot {
    pub permalink: String,
    pub text: String,
    pub timestamp: Option<DateTime<FixedOffset>>,
}

/// Everything one fetch of a profile yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub posts: Vec<PostSnapshot>,
    pub follower_count: String,
}

impl ProfileSnapshot {
    pub const UNKNOWN_FOLLOWERS: &'static str = "N/A";
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeenRecord {
    pub id: i64,
    pub handle: String,
    pub permalink: String,
    pub alerted_at: DateTime<Utc>,
}

/// Alert text sent to the messaging channel, in Telegram Markdown.
#[derive(Debug, Clone)]
pub struct AlertMessage<'a> {
    pub handle: &'a Handle,
    pub follower_count: &'a str,
    pub post: &'a PostSnapshot,
}

impl<'a> AlertMessage<'a> {
    pub fn new(handle: &'a Handle, follower_count: &'a str, post: &'a PostSnapshot) -> Self {
        Self {
            handle,
            follower_count,
            post,
        }
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AlertMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "*User:* @{}\n*Followers:* {}\n\n*Tweet:*\n{}\n\n[View Tweet]({})",
            escape_markdown(self.handle.as_str()),
            escape_markdown(self.follower_count),
            escape_markdown(&self.post.text),
            self.post.permalink
        )
    }
}

/// Backslash-escapes the characters Telegram's legacy Markdown treats as
/// entity delimiters. An unbalanced one makes the whole message unparseable.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
