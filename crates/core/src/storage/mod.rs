use crate::domain::currency::{CurrencyCode, Rate};
use crate::domain::snapshot::{average_of_last, RateSnapshot};
use crate::domain::subscription::{Subscription, WebhookRegistration};
use crate::error::StoreError;
use chrono::NaiveDate;

pub mod lock;
pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Persistence for rate snapshots and webhook subscriptions.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Most recent snapshot (by date) for `base`.
    async fn latest_snapshot(&self, base: &CurrencyCode) -> Result<Option<RateSnapshot>, StoreError>;

    /// Up to `n` most recent snapshots for `base`, newest first.
    async fn recent_snapshots(
        &self,
        base: &CurrencyCode,
        n: usize,
    ) -> Result<Vec<RateSnapshot>, StoreError>;

    /// Inserts unless a snapshot for the same (base, date) exists. Returns whether a row was
    /// written.
    async fn insert_snapshot(&self, snapshot: &RateSnapshot) -> Result<bool, StoreError>;

    /// All subscriptions in registration order.
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, StoreError>;

    async fn insert_subscription(&self, reg: &WebhookRegistration) -> Result<String, StoreError>;

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>, StoreError>;

    /// Returns false when no subscription has this id.
    async fn delete_subscription(&self, id: &str) -> Result<bool, StoreError>;

    async fn reset_subscriptions(&self) -> Result<u64, StoreError>;

    async fn reset_snapshots(&self) -> Result<u64, StoreError>;

    async fn latest_rate(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
    ) -> Result<Option<(Rate, NaiveDate)>, StoreError> {
        Ok(self
            .latest_snapshot(base)
            .await?
            .and_then(|s| s.rate(target).map(|rate| (rate, s.date))))
    }

    async fn average_rate(
        &self,
        base: &CurrencyCode,
        target: &CurrencyCode,
        last_n: usize,
    ) -> Result<Option<Rate>, StoreError> {
        let recent = self.recent_snapshots(base, last_n).await?;
        Ok(average_of_last(&recent, target, last_n))
    }
}
