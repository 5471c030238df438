use crate::config::Settings;
use crate::domain::currency::CurrencyCode;
use crate::domain::snapshot::RateSnapshot;
use crate::error::FetchError;
use crate::ingest::types::DateToken;
use anyhow::Context;
use std::time::Duration;

#[async_trait::async_trait]
pub trait RateSource: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch(&self, base: &CurrencyCode, date: DateToken) -> Result<RateSnapshot, FetchError>;
}

/// fixer.io-style provider: `GET {base_url}/{latest|YYYY-MM-DD}?base={BASE}` answering
/// `{"base": .., "date": .., "rates": {..}}`.
#[derive(Debug, Clone)]
pub struct HttpRateSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRateSource {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::new(
            settings.rate_provider_base_url.clone(),
            settings.rate_provider_timeout,
        )
    }

    pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build rate provider http client")?;
        Ok(Self { http, base_url })
    }

    fn url(&self, date: DateToken) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), date)
    }
}

#[async_trait::async_trait]
impl RateSource for HttpRateSource {
    fn provider_name(&self) -> &'static str {
        "fixer_http_json"
    }

    async fn fetch(&self, base: &CurrencyCode, date: DateToken) -> Result<RateSnapshot, FetchError> {
        let res = self
            .http
            .get(self.url(date))
            .query(&[("base", base.as_str())])
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let snapshot = serde_json::from_str::<RateSnapshot>(&text)?;
        validate(&snapshot, base, date)?;

        tracing::debug!(
            base = %snapshot.base,
            date = %snapshot.date,
            rates_len = snapshot.rates.len(),
            "fetched rate snapshot"
        );
        Ok(snapshot)
    }
}

fn validate(snapshot: &RateSnapshot, base: &CurrencyCode, date: DateToken) -> Result<(), FetchError> {
    if &snapshot.base != base {
        return Err(FetchError::Invalid(format!(
            "base mismatch: requested {base}, got {}",
            snapshot.base
        )));
    }
    if let DateToken::On(expected) = date {
        if snapshot.date != expected {
            return Err(FetchError::Invalid(format!(
                "date mismatch: requested {expected}, got {}",
                snapshot.date
            )));
        }
    }
    if let Some((code, rate)) = snapshot.rates.iter().find(|(_, r)| !r.is_finite()) {
        return Err(FetchError::Invalid(format!("non-finite rate for {code}: {rate}")));
    }
    Ok(())
}
