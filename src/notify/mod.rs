//! SMS notifications for selected tickets.
//!
//! The gateway is a capability (`SmsGateway`) so the pipeline can run
//! against ClickSend in production, a logging stand-in for dry runs, or a
//! fake in tests. Each recipient is sent to independently: one failure
//! never blocks the others and nothing is retried.

use crate::config::NotifyConfig;
use crate::ticket::Ticket;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gateway rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver `body` to one E.164 number.
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct SmsBatch<'a> {
    messages: Vec<SmsMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct SmsMessage<'a> {
    body: &'a str,
    to: &'a str,
}

/// ClickSend v3 `sms/send` over HTTP basic auth.
pub struct ClickSendGateway {
    client: reqwest::Client,
    url: String,
    username: String,
    api_key: String,
}

impl ClickSendGateway {
    pub fn new(url: String, username: String, api_key: String) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| NotifyError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url,
            username,
            api_key,
        })
    }
}

#[async_trait]
impl SmsGateway for ClickSendGateway {
    fn name(&self) -> &'static str {
        "clicksend"
    }

    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        let payload = SmsBatch {
            messages: vec![SmsMessage { body, to }],
        };

        let resp = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.api_key))
            .json(&payload)
            .send()
            .await?;

        // ClickSend answers 200 on success; anything else is a rejection.
        if resp.status() != reqwest::StatusCode::OK {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }
        Ok(())
    }
}

/// Dry-run gateway: logs instead of sending.
pub struct LogGateway;

#[async_trait]
impl SmsGateway for LogGateway {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        info!(to = to, body = body, "dry run: SMS not sent");
        Ok(())
    }
}

/// Human-readable SMS body for a ticket.
pub fn format_message(ticket: &Ticket, currency_symbol: &str, link: &str) -> String {
    format!(
        "Ticket found for {}{:.2} in section {}, row {}. Link: {}",
        currency_symbol, ticket.price, ticket.section, ticket.row, link
    )
}

/// Per-recipient result of one notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyReport {
    pub delivered: Vec<String>,
    /// (recipient, error)
    pub failed: Vec<(String, String)>,
}

impl NotifyReport {
    pub fn any_delivered(&self) -> bool {
        !self.delivered.is_empty()
    }
}

pub struct Notifier {
    gateway: Arc<dyn SmsGateway>,
    recipients: Vec<String>,
    currency_symbol: String,
}

impl Notifier {
    pub fn new(
        gateway: Arc<dyn SmsGateway>,
        recipients: Vec<String>,
        currency_symbol: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            recipients,
            currency_symbol: currency_symbol.into(),
        }
    }

    /// ClickSend, or the logging gateway when `dry_run` is set.
    pub fn from_config(config: &NotifyConfig, currency_symbol: &str) -> Result<Self, NotifyError> {
        let gateway: Arc<dyn SmsGateway> = if config.dry_run {
            Arc::new(LogGateway)
        } else {
            Arc::new(ClickSendGateway::new(
                config.gateway_url.clone(),
                config.username.clone(),
                config.api_key.clone(),
            )?)
        };
        Ok(Self::new(gateway, config.recipients.clone(), currency_symbol))
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Notify a single recipient.
    pub async fn notify_one(
        &self,
        ticket: &Ticket,
        link: &str,
        recipient: &str,
    ) -> Result<(), NotifyError> {
        let body = format_message(ticket, &self.currency_symbol, link);
        self.gateway.send(recipient, &body).await
    }

    /// Notify every configured recipient concurrently.
    pub async fn notify(&self, ticket: &Ticket, link: &str) -> NotifyReport {
        let sends = self.recipients.iter().map(|to| async move {
            (to.clone(), self.notify_one(ticket, link, to).await)
        });

        let mut report = NotifyReport::default();
        for (to, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    info!(
                        gateway = self.gateway.name(),
                        to = %to,
                        id = %ticket.identifier,
                        "SMS sent"
                    );
                    report.delivered.push(to);
                }
                Err(e) => {
                    warn!(
                        gateway = self.gateway.name(),
                        to = %to,
                        id = %ticket.identifier,
                        error = %e,
                        "failed to send SMS"
                    );
                    report.failed.push((to, e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tokio::sync::Mutex;

    fn ticket() -> Ticket {
        Ticket::new("abc", Decimal::from_str("115.5").unwrap(), "12", "7")
    }

    #[test]
    fn test_format_message() {
        let msg = format_message(&ticket(), "£", "https://example.test/app/block/abc,2");
        assert_eq!(
            msg,
            "Ticket found for £115.50 in section 12, row 7. Link: https://example.test/app/block/abc,2"
        );
    }

    #[test]
    fn test_payload_shape() {
        let payload = SmsBatch {
            messages: vec![SmsMessage {
                body: "hi",
                to: "+447700900001",
            }],
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"messages": [{"body": "hi", "to": "+447700900001"}]})
        );
    }

    #[tokio::test]
    async fn test_clicksend_posts_with_basic_auth() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v3/sms/send")
                    // base64("user:key")
                    .header("authorization", "Basic dXNlcjprZXk=")
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "messages": [{"body": "hello", "to": "+447700900001"}]
                    }));
                then.status(200)
                    .header("content-type", "application/json")
                    .body("{}");
            })
            .await;

        let gateway =
            ClickSendGateway::new(server.url("/v3/sms/send"), "user".into(), "key".into())
                .unwrap();
        gateway.send("+447700900001", "hello").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_clicksend_non_200_is_rejection() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v3/sms/send");
                then.status(401).body(r#"{"response_code":"UNAUTHORIZED"}"#);
            })
            .await;

        let gateway =
            ClickSendGateway::new(server.url("/v3/sms/send"), "user".into(), "bad".into())
                .unwrap();
        match gateway.send("+447700900001", "hello").await {
            Err(NotifyError::Rejected { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("UNAUTHORIZED"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_clicksend_other_2xx_is_rejection() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v3/sms/send");
                then.status(202);
            })
            .await;

        let gateway =
            ClickSendGateway::new(server.url("/v3/sms/send"), "user".into(), "key".into())
                .unwrap();
        assert!(matches!(
            gateway.send("+447700900001", "hello").await,
            Err(NotifyError::Rejected { status: 202, .. })
        ));
    }

    struct FlakyGateway {
        failing: &'static str,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SmsGateway for FlakyGateway {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
            if to == self.failing {
                return Err(NotifyError::Rejected {
                    status: 500,
                    body: "boom".into(),
                });
            }
            self.sent.lock().await.push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_one_recipient_failing_does_not_block_others() {
        let gateway = Arc::new(FlakyGateway {
            failing: "+2",
            sent: Mutex::new(Vec::new()),
        });
        let notifier = Notifier::new(
            gateway.clone(),
            vec!["+1".into(), "+2".into(), "+3".into()],
            "£",
        );

        let report = notifier.notify(&ticket(), "https://example.test").await;
        assert_eq!(report.delivered, vec!["+1".to_string(), "+3".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "+2");
        assert!(report.any_delivered());

        let sent = gateway.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert!(sent[0].1.contains("section 12, row 7"));
    }

    #[tokio::test]
    async fn test_dry_run_uses_log_gateway() {
        let config = NotifyConfig {
            dry_run: true,
            recipients: vec!["+447700900001".into()],
            ..NotifyConfig::default()
        };
        let notifier = Notifier::from_config(&config, "£").unwrap();
        let report = notifier.notify(&ticket(), "https://example.test").await;
        assert_eq!(report.delivered, vec!["+447700900001".to_string()]);
        assert_eq!(notifier.recipients().len(), 1);
    }
}
