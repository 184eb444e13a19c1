use async_trait::async_trait;
use postwatch_core::{AppConfig, ErrorExt, Notifier, NotifyError};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendMessageForm<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Sends alerts through the Telegram Bot API `sendMessage` method.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    http_client: Client,
    api_base: String,
    bot_token: Option<String>,
    chat_id: Option<String>,
}

impl TelegramNotifier {
    pub fn new(
        api_base: &str,
        bot_token: Option<String>,
        chat_id: Option<String>,
    ) -> Result<Self, NotifyError> {
        let http_client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.filter(|t| !t.is_empty()),
            chat_id: chat_id.filter(|c| !c.is_empty()),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, NotifyError> {
        Self::new(
            &config.telegram_api_base,
            config.telegram_bot_token.clone(),
            config.telegram_chat_id.clone(),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }

    fn destination(&self) -> Result<(&str, &str), NotifyError> {
        match (self.bot_token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat_id)) => Ok((token, chat_id)),
            (None, _) => Err(NotifyError::ConfigMissing {
                missing: "TELEGRAM_BOT_TOKEN".to_string(),
            }),
            (_, None) => Err(NotifyError::ConfigMissing {
                missing: "TELEGRAM_CHAT_ID".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let (token, chat_id) = match self.destination() {
            Ok(destination) => destination,
            Err(e) => {
                e.log_error();
                return Err(e);
            }
        };

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let form = SendMessageForm {
            chat_id,
            text: message,
            parse_mode: "Markdown",
        };

        debug!(chat_id, "Sending Telegram alert");
        let response = match self.http_client.post(&url).form(&form).send().await {
            Ok(response) => response,
            Err(e) => {
                // reqwest includes the URL (and so the token) in its Display output
                let err = NotifyError::Network(e.without_url().to_string());
                err.log_error();
                return Err(err);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = NotifyError::Transport {
                status: status.as_u16(),
                body,
            };
            err.log_error();
            return Err(err);
        }

        info!("Telegram alert sent successfully.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123456:TEST";

    fn notifier_for(server: &MockServer) -> TelegramNotifier {
        TelegramNotifier::new(
            &server.uri(),
            Some(TOKEN.to_string()),
            Some("-1001".to_string()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_posts_form_to_bot_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .and(body_string_contains("chat_id=-1001"))
            .and(body_string_contains("parse_mode=Markdown"))
            .and(body_string_contains("%40alice"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let result = notifier_for(&server).send("*User:* @alice").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: can't parse"))
            .mount(&server)
            .await;

        let err = notifier_for(&server).send("hello").await.unwrap_err();
        match err {
            NotifyError::Transport { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("can't parse"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_token_fails_fast_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::new(&server.uri(), None, Some("-1001".to_string())).unwrap();
        assert!(!notifier.is_configured());
        let err = notifier.send("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::ConfigMissing { ref missing } if missing == "TELEGRAM_BOT_TOKEN"));
    }

    #[tokio::test]
    async fn test_empty_chat_id_counts_as_missing() {
        let notifier =
            TelegramNotifier::new("http://127.0.0.1:9", Some(TOKEN.to_string()), Some(String::new()))
                .unwrap();
        let err = notifier.send("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::ConfigMissing { ref missing } if missing == "TELEGRAM_CHAT_ID"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        // Port 9 (discard) is not listening in the test environment
        let notifier = TelegramNotifier::new(
            "http://127.0.0.1:9",
            Some(TOKEN.to_string()),
            Some("-1001".to_string()),
        )
        .unwrap();
        let err = notifier.send("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::Network(_)));
        assert!(!err.to_string().contains(TOKEN));
    }
}
