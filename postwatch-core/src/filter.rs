use crate::PostSnapshot;
use chrono::{DateTime, Utc};

/// Decides which posts deserve an alert: recent enough and mentioning at
/// least one keyword.
#[derive(Debug, Clone)]
pub struct PostFilter {
    threshold: chrono::Duration,
    keywords: Vec<String>,
}

impl PostFilter {
    pub fn new<I, S>(threshold: chrono::Duration, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            threshold,
            keywords,
        }
    }

    pub fn threshold(&self) -> chrono::Duration {
        self.threshold
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Undated posts are never eligible.
    pub fn is_eligible(&self, post: &PostSnapshot, now: DateTime<Utc>) -> bool {
        match post.timestamp {
            Some(posted_at) => {
                let now_local = now.with_timezone(posted_at.offset());
                now_local.signed_duration_since(posted_at) <= self.threshold
            }
            None => false,
        }
    }

    /// Plain substring match on the lowercased text, so `coin` also hits
    /// "bitcoin" and `$` hits any cashtag.
    pub fn matches_keywords(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    pub fn is_relevant(&self, post: &PostSnapshot, now: DateTime<Utc>) -> bool {
        self.is_eligible(post, now) && self.matches_keywords(&post.text)
    }
}
