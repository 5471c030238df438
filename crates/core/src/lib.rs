pub mod domain;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod storage;

pub mod config {
    use crate::domain::currency::CurrencyCode;
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_RATE_PROVIDER_BASE_URL: &str = "https://api.fixer.io";
    const DEFAULT_RATE_PROVIDER_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;
    const DEFAULT_ALERT_SERVICE: &str = "fxwatch_worker";
    const DEFAULT_SUPPORTED_BASES: &str = "EUR";
    const DEFAULT_INGEST_INTERVAL_HOURS: u64 = 24;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub rate_provider_base_url: String,
        pub rate_provider_timeout: Duration,
        pub webhook_timeout: Duration,
        pub operator_alert_url: Option<String>,
        pub operator_alert_service: String,
        pub supported_bases: Vec<CurrencyCode>,
        pub ingest_interval: Duration,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let supported_bases = std::env::var("SUPPORTED_BASE_CURRENCIES")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SUPPORTED_BASES.to_string());

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                rate_provider_base_url: std::env::var("RATE_PROVIDER_BASE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_RATE_PROVIDER_BASE_URL.to_string()),
                rate_provider_timeout: Duration::from_secs(env_u64(
                    "RATE_PROVIDER_TIMEOUT_SECS",
                    DEFAULT_RATE_PROVIDER_TIMEOUT_SECS,
                )),
                webhook_timeout: Duration::from_secs(env_u64(
                    "WEBHOOK_TIMEOUT_SECS",
                    DEFAULT_WEBHOOK_TIMEOUT_SECS,
                )),
                operator_alert_url: std::env::var("OPERATOR_ALERT_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                operator_alert_service: std::env::var("OPERATOR_ALERT_SERVICE")
                    .unwrap_or_else(|_| DEFAULT_ALERT_SERVICE.to_string()),
                supported_bases: parse_currency_list(&supported_bases)
                    .context("SUPPORTED_BASE_CURRENCIES is invalid")?,
                ingest_interval: ingest_interval_from_hours(env_u64(
                    "INGEST_INTERVAL_HOURS",
                    DEFAULT_INGEST_INTERVAL_HOURS,
                ))
                .context("INGEST_INTERVAL_HOURS is invalid")?,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }

    fn env_u64(key: &str, default: u64) -> u64 {
        std::env::var(key)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(default)
    }

    pub fn ingest_interval_from_hours(hours: u64) -> anyhow::Result<Duration> {
        anyhow::ensure!(hours >= 1, "interval must be at least one hour");
        let secs = hours
            .checked_mul(3600)
            .context("interval is too large")?;
        Ok(Duration::from_secs(secs))
    }

    pub fn parse_currency_list(s: &str) -> anyhow::Result<Vec<CurrencyCode>> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let code = part.parse::<CurrencyCode>()?;
            if !out.contains(&code) {
                out.push(code);
            }
        }
        anyhow::ensure!(!out.is_empty(), "at least one currency is required");
        Ok(out)
    }

}
