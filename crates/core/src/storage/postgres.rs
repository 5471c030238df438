use crate::domain::currency::{CurrencyCode, Rate};
use crate::domain::snapshot::RateSnapshot;
use crate::domain::subscription::{Subscription, WebhookRegistration};
use crate::error::StoreError;
use crate::storage::Storage;
use chrono::NaiveDate;
use sqlx::types::Json;
use std::collections::BTreeMap;
use uuid::Uuid;

type SnapshotRow = (String, NaiveDate, Json<BTreeMap<CurrencyCode, Rate>>);
type SubscriptionRow = (Uuid, String, String, String, f32, f32);

#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: sqlx::PgPool,
}

impl PgStorage {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Storage for PgStorage {
    async fn latest_snapshot(&self, base: &CurrencyCode) -> Result<Option<RateSnapshot>, StoreError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT base, date, rates \
             FROM rate_snapshots \
             WHERE base = $1 \
             ORDER BY date DESC \
             LIMIT 1",
        )
        .bind(base.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(snapshot_from_row).transpose()
    }

    async fn recent_snapshots(
        &self,
        base: &CurrencyCode,
        n: usize,
    ) -> Result<Vec<RateSnapshot>, StoreError> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT base, date, rates \
             FROM rate_snapshots \
             WHERE base = $1 \
             ORDER BY date DESC \
             LIMIT $2",
        )
        .bind(base.as_str())
        .bind(i64::try_from(n).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(snapshot_from_row).collect()
    }

    async fn insert_snapshot(&self, snapshot: &RateSnapshot) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "INSERT INTO rate_snapshots (base, date, rates) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (base, date) DO NOTHING",
        )
        .bind(snapshot.base.as_str())
        .bind(snapshot.date)
        .bind(Json(&snapshot.rates))
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() == 1)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, webhook_url, base_currency, target_currency, min_trigger, max_trigger \
             FROM webhook_subscriptions \
             ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(subscription_from_row).collect()
    }

    async fn insert_subscription(&self, reg: &WebhookRegistration) -> Result<String, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO webhook_subscriptions \
             (id, webhook_url, base_currency, target_currency, min_trigger, max_trigger) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(&reg.webhook_url)
        .bind(reg.base_currency.as_str())
        .bind(reg.target_currency.as_str())
        .bind(reg.min_trigger)
        .bind(reg.max_trigger)
        .execute(&self.pool)
        .await?;

        Ok(id.to_string())
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>, StoreError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        let row = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT id, webhook_url, base_currency, target_currency, min_trigger, max_trigger \
             FROM webhook_subscriptions \
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(subscription_from_row).transpose()
    }

    async fn delete_subscription(&self, id: &str) -> Result<bool, StoreError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(false);
        };

        let res = sqlx::query("DELETE FROM webhook_subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn reset_subscriptions(&self) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM webhook_subscriptions")
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn reset_snapshots(&self) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM rate_snapshots")
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

fn snapshot_from_row((base, date, rates): SnapshotRow) -> Result<RateSnapshot, StoreError> {
    let base = base
        .parse::<CurrencyCode>()
        .map_err(|e| StoreError::Corrupt(format!("rate_snapshots.base for {date}: {e}")))?;
    Ok(RateSnapshot {
        base,
        date,
        rates: rates.0,
    })
}

fn subscription_from_row(
    (id, webhook_url, base, target, min_trigger, max_trigger): SubscriptionRow,
) -> Result<Subscription, StoreError> {
    let corrupt = |field: &str, e: crate::error::ValidationError| {
        StoreError::Corrupt(format!("webhook_subscriptions.{field} for id={id}: {e}"))
    };

    Ok(Subscription {
        id: id.to_string(),
        webhook_url,
        base_currency: base.parse().map_err(|e| corrupt("base_currency", e))?,
        target_currency: target.parse().map_err(|e| corrupt("target_currency", e))?,
        min_trigger,
        max_trigger,
    })
}
