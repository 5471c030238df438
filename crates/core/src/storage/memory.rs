use crate::domain::currency::CurrencyCode;
use crate::domain::snapshot::RateSnapshot;
use crate::domain::subscription::{Subscription, WebhookRegistration};
use crate::error::StoreError;
use crate::storage::Storage;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Process-local storage used by dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    snapshots: BTreeMap<(CurrencyCode, NaiveDate), RateSnapshot>,
    subscriptions: Vec<Subscription>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot_count(&self) -> usize {
        self.inner.lock().await.snapshots.len()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn latest_snapshot(&self, base: &CurrencyCode) -> Result<Option<RateSnapshot>, StoreError> {
        Ok(self.recent_snapshots(base, 1).await?.into_iter().next())
    }

    async fn recent_snapshots(
        &self,
        base: &CurrencyCode,
        n: usize,
    ) -> Result<Vec<RateSnapshot>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .snapshots
            .iter()
            .rev()
            .filter(|((b, _), _)| b == base)
            .take(n)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn insert_snapshot(&self, snapshot: &RateSnapshot) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let key = (snapshot.base.clone(), snapshot.date);
        if inner.snapshots.contains_key(&key) {
            return Ok(false);
        }
        inner.snapshots.insert(key, snapshot.clone());
        Ok(true)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        Ok(self.inner.lock().await.subscriptions.clone())
    }

    async fn insert_subscription(&self, reg: &WebhookRegistration) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.inner
            .lock()
            .await
            .subscriptions
            .push(Subscription::from_registration(id.clone(), reg.clone()));
        Ok(id)
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.subscriptions.iter().find(|s| s.id == id).cloned())
    }

    async fn delete_subscription(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        Ok(inner.subscriptions.len() != before)
    }

    async fn reset_subscriptions(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let n = inner.subscriptions.len() as u64;
        inner.subscriptions.clear();
        Ok(n)
    }

    async fn reset_snapshots(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let n = inner.snapshots.len() as u64;
        inner.snapshots.clear();
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::AVERAGE_WINDOW;

    fn code(s: &str) -> CurrencyCode {
        s.parse().unwrap()
    }

    fn snapshot(base: &str, day: u32, nok: f32) -> RateSnapshot {
        RateSnapshot {
            base: code(base),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            rates: BTreeMap::from([(code("NOK"), nok), (code("USD"), 1.1)]),
        }
    }

    fn registration() -> WebhookRegistration {
        WebhookRegistration {
            webhook_url: "http://localhost:8080/hook".to_string(),
            base_currency: code("EUR"),
            target_currency: code("NOK"),
            min_trigger: 1.5,
            max_trigger: 2.5,
        }
    }

    #[tokio::test]
    async fn duplicate_base_and_date_is_not_inserted() {
        let store = MemoryStorage::new();
        assert!(store.insert_snapshot(&snapshot("EUR", 1, 11.0)).await.unwrap());
        assert!(!store.insert_snapshot(&snapshot("EUR", 1, 12.0)).await.unwrap());
        assert!(store.insert_snapshot(&snapshot("USD", 1, 10.0)).await.unwrap());
        assert_eq!(store.snapshot_count().await, 2);

        let (rate, _) = store
            .latest_rate(&code("EUR"), &code("NOK"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rate, 11.0);
    }

    #[tokio::test]
    async fn latest_and_average_are_per_base() {
        let store = MemoryStorage::new();
        for (day, nok) in [(1, 10.0), (2, 10.5), (3, 11.0), (4, 11.5)] {
            store.insert_snapshot(&snapshot("EUR", day, nok)).await.unwrap();
        }
        store.insert_snapshot(&snapshot("USD", 9, 99.0)).await.unwrap();

        let (rate, date) = store
            .latest_rate(&code("EUR"), &code("NOK"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rate, 11.5);
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());

        let avg = store
            .average_rate(&code("EUR"), &code("NOK"), AVERAGE_WINDOW)
            .await
            .unwrap();
        assert_eq!(avg, Some((10.5_f32 + 11.0 + 11.5) / 3.0));

        assert!(store
            .latest_rate(&code("EUR"), &code("SEK"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn subscription_round_trip_and_delete() {
        let store = MemoryStorage::new();
        let id = store.insert_subscription(&registration()).await.unwrap();

        let stored = store.get_subscription(&id).await.unwrap().unwrap();
        assert_eq!(stored, Subscription::from_registration(id.clone(), registration()));

        assert!(store.delete_subscription(&id).await.unwrap());
        assert!(!store.delete_subscription(&id).await.unwrap());
        assert!(store.get_subscription(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let store = MemoryStorage::new();
        store.insert_subscription(&registration()).await.unwrap();
        store.insert_subscription(&registration()).await.unwrap();
        store.insert_snapshot(&snapshot("EUR", 1, 11.0)).await.unwrap();

        assert_eq!(store.reset_subscriptions().await.unwrap(), 2);
        assert_eq!(store.reset_snapshots().await.unwrap(), 1);
        assert!(store.list_subscriptions().await.unwrap().is_empty());
        assert!(store.latest_snapshot(&code("EUR")).await.unwrap().is_none());
    }
}
