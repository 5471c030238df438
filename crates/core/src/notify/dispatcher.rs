use crate::config::Settings;
use crate::domain::subscription::WebhookPayload;
use crate::error::DispatchError;
use anyhow::Context;
use reqwest::StatusCode;
use std::time::Duration;

#[async_trait::async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn dispatch(&self, url: &str, payload: &WebhookPayload) -> Result<(), DispatchError>;
}

/// POSTs the payload as JSON. Only 200 and 204 count as delivered; there is no retry.
#[derive(Debug, Clone)]
pub struct HttpWebhookDispatcher {
    http: reqwest::Client,
}

impl HttpWebhookDispatcher {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(settings.webhook_timeout)
    }

    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook http client")?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl WebhookDispatcher for HttpWebhookDispatcher {
    async fn dispatch(&self, url: &str, payload: &WebhookPayload) -> Result<(), DispatchError> {
        let res = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = res.status();
        tracing::debug!(%url, %status, "webhook responded");
        if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            Err(DispatchError::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> WebhookPayload {
        WebhookPayload {
            base_currency: "EUR".parse().unwrap(),
            target_currency: "NOK".parse().unwrap(),
            current_rate: 1.75,
            min_trigger: 1.5,
            max_trigger: 2.0,
        }
    }

    #[tokio::test]
    async fn posts_json_and_accepts_200_and_204() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ok"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "baseCurrency": "EUR",
                "targetCurrency": "NOK",
                "currentRate": 1.75,
                "minTriggerValue": 1.5,
                "maxTriggerValue": 2.0
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = HttpWebhookDispatcher::new(Duration::from_secs(5)).unwrap();
        dispatcher
            .dispatch(&format!("{}/ok", server.uri()), &payload())
            .await
            .unwrap();
        dispatcher
            .dispatch(&format!("{}/empty", server.uri()), &payload())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn other_success_codes_are_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let dispatcher = HttpWebhookDispatcher::new(Duration::from_secs(5)).unwrap();
        let err = dispatcher
            .dispatch(&server.uri(), &payload())
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Status(201));
    }

    #[tokio::test]
    async fn unreachable_receiver_is_a_transport_failure() {
        let dispatcher = HttpWebhookDispatcher::new(Duration::from_secs(2)).unwrap();
        let err = dispatcher
            .dispatch("http://127.0.0.1:9/hook", &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }
}
