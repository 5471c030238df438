//! Error taxonomy for the ingestion and notification pipeline.
//!
//! Fetch and store errors abort the running cycle (or request). A dispatch failure stops the
//! remaining webhook calls of the cycle. Validation errors only ever reach the registrant.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("rate provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate provider HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate provider response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("rate provider response rejected: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Why a single webhook call was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The receiver answered with something other than 200 or 204.
    Status(u16),
    Transport(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Status(status) => {
                write!(f, "unexpected status {status} (expected 200 or 204)")
            }
            DispatchError::Transport(detail) => write!(f, "transport error: {detail}"),
        }
    }
}

impl std::error::Error for DispatchError {}

#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "webhook number {index} ({subscription_id}, {url}) failed, remaining webhooks were not sent: {reason}"
)]
pub struct DispatchFailure {
    /// Position of the subscription in the store's enumeration.
    pub index: usize,
    pub subscription_id: String,
    pub url: String,
    pub reason: DispatchError,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("unsupported base currency {base}, accepted: {supported}")]
    UnsupportedBase { base: String, supported: String },

    #[error("invalid currency code {0:?}, expected three ASCII letters")]
    InvalidCurrency(String),

    #[error("invalid webhook URL {0:?}")]
    InvalidUrl(String),

    #[error("trigger values must be finite numbers")]
    NonFiniteTrigger,

    #[error("minTriggerValue {min} is greater than maxTriggerValue {max}")]
    InvertedBand { min: f32, max: f32 },
}

/// Terminal failure of one ingestion cycle.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to fetch rates: {0}")]
    Fetch(#[from] FetchError),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("failed to send webhook: {0}")]
    Dispatch(#[from] DispatchFailure),
}
