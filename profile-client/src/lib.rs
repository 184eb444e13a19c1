pub mod api;
pub mod extract;

#[cfg(test)]
mod tests;

use api::{BrowserlessClient, ContentRequest};
use async_trait::async_trait;
use postwatch_core::{
    AppConfig, FetchError, FetchStage, FetcherFactory, Handle, ProfileFetcher, ProfileSnapshot,
};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub profile_base_url: String,
    pub page_load_timeout: Duration,
    pub element_timeout: Duration,
}

impl FetchSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            profile_base_url: config.profile_base_url.trim_end_matches('/').to_string(),
            page_load_timeout: config.page_load_timeout,
            element_timeout: config.element_timeout,
        }
    }
}

/// Creates one [`ProfileSession`] per dispatched task.
#[derive(Debug, Clone)]
pub struct ProfileClient {
    browser: BrowserlessClient,
    settings: FetchSettings,
}

impl ProfileClient {
    pub fn new(browser: BrowserlessClient, settings: FetchSettings) -> Self {
        Self { browser, settings }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, FetchError> {
        let browser =
            BrowserlessClient::new(&config.browserless_url, config.browserless_token.clone())?;
        info!(
            browserless = %config.browserless_url,
            profiles = %config.profile_base_url,
            "Profile client configured"
        );
        Ok(Self::new(browser, FetchSettings::from_config(config)))
    }

    pub fn session(&self) -> ProfileSession {
        ProfileSession {
            browser: self.browser.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl FetcherFactory for ProfileClient {
    fn fetcher(&self) -> Box<dyn ProfileFetcher> {
        Box::new(self.session())
    }
}

/// A single task's view of the rendering service.
#[derive(Debug)]
pub struct ProfileSession {
    browser: BrowserlessClient,
    settings: FetchSettings,
}

impl ProfileSession {
    fn request(&self, url: &str, selector: &str) -> ContentRequest {
        ContentRequest::new(
            url,
            selector,
            self.settings.page_load_timeout,
            self.settings.element_timeout,
        )
    }
}

#[async_trait]
impl ProfileFetcher for ProfileSession {
    async fn fetch(&self, handle: &Handle) -> Result<ProfileSnapshot, FetchError> {
        let profile_url = handle.profile_url(&self.settings.profile_base_url);

        let timeline_html = self
            .browser
            .content(
                handle.as_str(),
                FetchStage::Posts,
                &self.request(&profile_url, extract::POST_SELECTOR),
            )
            .await?;
        let posts =
            extract::extract_posts(&timeline_html, &self.settings.profile_base_url, &profile_url)?;

        // Second navigation to the same profile for the header counts
        let header_html = self
            .browser
            .content(
                handle.as_str(),
                FetchStage::Followers,
                &self.request(&profile_url, extract::FOLLOWERS_SELECTOR),
            )
            .await?;
        let follower_count = extract::extract_follower_count(&header_html)?;

        debug!(
            handle = %handle,
            posts = posts.len(),
            followers = %follower_count,
            "Fetched profile"
        );
        Ok(ProfileSnapshot {
            posts,
            follower_count,
        })
    }
}
