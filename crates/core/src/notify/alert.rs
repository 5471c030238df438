use crate::config::Settings;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const HEADING_REGISTERED: &str = "Registered new currency!";
pub const HEADING_NOT_NEW: &str = "No new currencies!";
pub const HEADING_FAILED: &str = "Couldn't save the latest currency to database!";

const ALERT_TIMEOUT_SECS: u64 = 10;

/// Operator notification about an ingestion outcome. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMessage {
    pub heading: String,
    pub date_time: String,
    pub message: String,
    pub from_service: String,
}

impl AlertMessage {
    pub fn new(
        heading: &str,
        message: impl Into<String>,
        from_service: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            heading: heading.to_string(),
            date_time: at.format("%Y-%m-%d-%H:%M:%S").to_string(),
            message: message.into(),
            from_service: from_service.to_string(),
        }
    }
}

/// Best-effort side channel. Implementations log their own failures and never return them.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, message: &AlertMessage);
}

pub fn sink_from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn AlertSink>> {
    let sink: Arc<dyn AlertSink> = match &settings.operator_alert_url {
        Some(url) => Arc::new(HttpAlertSink::new(
            url.clone(),
            Duration::from_secs(ALERT_TIMEOUT_SECS),
        )?),
        None => {
            tracing::warn!("OPERATOR_ALERT_URL not set; operator alerts are only logged");
            Arc::new(LogAlertSink)
        }
    };
    Ok(sink)
}

#[derive(Debug, Clone)]
pub struct HttpAlertSink {
    http: reqwest::Client,
    url: String,
}

impl HttpAlertSink {
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build alert http client")?;
        Ok(Self { http, url })
    }
}

#[async_trait::async_trait]
impl AlertSink for HttpAlertSink {
    async fn notify(&self, message: &AlertMessage) {
        // The collector's answer is ignored beyond transport success.
        if let Err(err) = self.http.post(&self.url).json(message).send().await {
            tracing::warn!(
                url = %self.url,
                heading = %message.heading,
                error = %err,
                "operator alert could not be sent"
            );
        }
    }
}

/// Used when no collector URL is configured, and for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

#[async_trait::async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, message: &AlertMessage) {
        tracing::info!(
            heading = %message.heading,
            from_service = %message.from_service,
            message = %message.message,
            "operator alert"
        );
    }
}
