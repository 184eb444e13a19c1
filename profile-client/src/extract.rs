//! Turns rendered profile HTML into post snapshots.

use chrono::{DateTime, FixedOffset};
use postwatch_core::{FetchError, PostSnapshot, ProfileSnapshot};
use scraper::{ElementRef, Html, Selector};
use url::Url;

pub const POST_SELECTOR: &str = "article";
pub const FOLLOWERS_SELECTOR: &str = "a[href$=\"/followers\"], a[href$=\"/verified_followers\"]";

const TIME_SELECTOR: &str = "time[datetime]";
const STATUS_LINK_SELECTOR: &str = "a[href*=\"/status/\"]";

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::Extraction {
        what: format!("selector `{css}`"),
        details: e.to_string(),
    })
}

/// Every `article` on the page, in document order.
///
/// Relative status links are resolved against `base_url`. A post without a
/// status link falls back to `profile_url` as its permalink.
pub fn extract_posts(
    html: &str,
    base_url: &str,
    profile_url: &str,
) -> Result<Vec<PostSnapshot>, FetchError> {
    let base = Url::parse(base_url).map_err(|e| FetchError::Navigation {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    let article_selector = selector(POST_SELECTOR)?;
    let time_selector = selector(TIME_SELECTOR)?;
    let link_selector = selector(STATUS_LINK_SELECTOR)?;

    let document = Html::parse_document(html);
    let posts = document
        .select(&article_selector)
        .map(|article| {
            let timestamp = article
                .select(&time_selector)
                .next()
                .and_then(|t| t.value().attr("datetime"))
                .and_then(parse_timestamp);

            let permalink = article
                .select(&link_selector)
                .filter_map(|a| a.value().attr("href"))
                .find_map(|href| base.join(href.trim()).ok())
                .map(|u| u.to_string())
                .unwrap_or_else(|| profile_url.to_string());

            PostSnapshot {
                permalink,
                text: rendered_text(article),
                timestamp,
            }
        })
        .collect();
    Ok(posts)
}

/// Text of the first link mentioning "followers" in any case, e.g.
/// `"1,234 Followers"`.
pub fn extract_follower_count(html: &str) -> Result<String, FetchError> {
    let anchor_selector = selector("a")?;
    let document = Html::parse_document(html);
    let count = document
        .select(&anchor_selector)
        .map(|a| a.text().collect::<String>())
        .find(|text| text.to_lowercase().contains("followers"))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|| ProfileSnapshot::UNKNOWN_FOLLOWERS.to_string());
    Ok(count)
}

/// ISO-8601 `datetime` attribute; a trailing `Z` is read as `+00:00`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    let normalized = match raw.strip_suffix('Z') {
        Some(stripped) => format!("{stripped}+00:00"),
        None => raw.to_string(),
    };
    DateTime::parse_from_rfc3339(&normalized).ok()
}

/// Approximates a browser's `innerText`: text nodes concatenated, one line
/// per non-blank line.
fn rendered_text(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
