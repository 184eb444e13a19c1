use postwatch_core::{FetchError, FetchStage};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Extra client-side allowance on top of the render budget, so the service
/// gets the chance to report its own timeout first.
const CLIENT_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub url: String,
    pub goto_options: GotoOptions,
    pub wait_for_selector: WaitForSelector,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoOptions {
    pub timeout: u64,
    pub wait_until: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitForSelector {
    pub selector: String,
    pub timeout: u64,
}

impl ContentRequest {
    pub fn new(url: &str, selector: &str, page_load: Duration, element: Duration) -> Self {
        Self {
            url: url.to_string(),
            goto_options: GotoOptions {
                timeout: millis(page_load),
                wait_until: "domcontentloaded".to_string(),
            },
            wait_for_selector: WaitForSelector {
                selector: selector.to_string(),
                timeout: millis(element),
            },
        }
    }

    pub(crate) fn budget(&self) -> Duration {
        Duration::from_millis(
            self.goto_options
                .timeout
                .saturating_add(self.wait_for_selector.timeout),
        )
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Thin client for a Browserless-compatible `/content` endpoint, which
/// navigates a headless browser and returns the rendered DOM.
#[derive(Debug, Clone)]
pub struct BrowserlessClient {
    http_client: Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Renders `request.url` and returns the HTML once `wait_for_selector`
    /// matched. Both the navigation and the element wait are bounded.
    pub async fn content(
        &self,
        handle: &str,
        stage: FetchStage,
        request: &ContentRequest,
    ) -> Result<String, FetchError> {
        let endpoint = format!("{}/content", self.base_url);
        let budget = request.budget();
        let timeout_error = || FetchError::Timeout {
            handle: handle.to_string(),
            stage,
            seconds: budget.as_secs(),
        };

        let mut request_builder = self
            .http_client
            .post(&endpoint)
            .timeout(budget.saturating_add(CLIENT_SLACK))
            .json(request);
        if let Some(ref token) = self.token {
            request_builder = request_builder.query(&[("token", token.as_str())]);
        }

        let start_time = Instant::now();
        debug!(handle, %stage, url = %request.url, "Rendering profile page");

        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(handle, %stage, elapsed = ?start_time.elapsed(), "Render request timed out");
                return Err(timeout_error());
            }
            Err(e) => {
                let e = e.without_url();
                error!(handle, %stage, "Network error talking to rendering service: {}", e);
                return Err(FetchError::Network(e.to_string()));
            }
        };

        let status = response.status();
        if status == StatusCode::REQUEST_TIMEOUT {
            warn!(handle, %stage, "Rendering service gave up waiting for the page");
            return Err(timeout_error());
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(handle, %stage, status = status.as_u16(), "Rendering service error: {}", message);
            return Err(FetchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let html = match response.text().await {
            Ok(html) => html,
            Err(e) if e.is_timeout() => return Err(timeout_error()),
            Err(e) => return Err(FetchError::Network(e.without_url().to_string())),
        };
        debug!(
            handle,
            %stage,
            bytes = html.len(),
            elapsed = ?start_time.elapsed(),
            "Rendered profile page"
        );
        Ok(html)
    }
}
