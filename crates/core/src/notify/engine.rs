use crate::domain::currency::Rate;
use crate::domain::snapshot::RateSnapshot;
use crate::domain::subscription::Subscription;
use crate::error::{DispatchFailure, IngestError};
use crate::notify::dispatcher::WebhookDispatcher;
use crate::storage::Storage;
use std::sync::Arc;

/// Matches subscriptions against rates and calls their webhooks.
///
/// Dispatch is fail-fast: the first webhook that is not accepted ends the pass, and the
/// subscriptions enumerated after it are not attempted until the next pass.
#[derive(Clone)]
pub struct NotificationEngine {
    storage: Arc<dyn Storage>,
    dispatcher: Arc<dyn WebhookDispatcher>,
}

impl NotificationEngine {
    pub fn new(storage: Arc<dyn Storage>, dispatcher: Arc<dyn WebhookDispatcher>) -> Self {
        Self {
            storage,
            dispatcher,
        }
    }

    /// Dispatches to every subscription on `snapshot.base` whose target rate lies inside its
    /// trigger band. Returns how many webhooks were called.
    pub async fn evaluate(&self, snapshot: &RateSnapshot) -> Result<usize, IngestError> {
        let subscriptions = self.storage.list_subscriptions().await?;
        let mut dispatched = 0;

        for (index, sub) in subscriptions.iter().enumerate() {
            if sub.base_currency != snapshot.base {
                continue;
            }
            let Some(rate) = snapshot.rate(&sub.target_currency) else {
                tracing::warn!(
                    subscription_id = %sub.id,
                    base = %snapshot.base,
                    target = %sub.target_currency,
                    date = %snapshot.date,
                    "snapshot has no rate for subscribed target; skipping"
                );
                continue;
            };
            if !sub.in_band(rate) {
                continue;
            }

            self.send(index, sub, rate).await?;
            dispatched += 1;
        }

        tracing::info!(
            base = %snapshot.base,
            date = %snapshot.date,
            subscriptions = subscriptions.len(),
            dispatched,
            "evaluated subscriptions"
        );
        Ok(dispatched)
    }

    /// Sends every subscriber the latest stored rate for its pair, regardless of its trigger
    /// band. Pairs without a stored rate are skipped.
    pub async fn evaluate_latest(&self) -> Result<usize, IngestError> {
        let subscriptions = self.storage.list_subscriptions().await?;
        let mut dispatched = 0;

        for (index, sub) in subscriptions.iter().enumerate() {
            let latest = self
                .storage
                .latest_rate(&sub.base_currency, &sub.target_currency)
                .await?;
            let Some((rate, _date)) = latest else {
                tracing::warn!(
                    subscription_id = %sub.id,
                    base = %sub.base_currency,
                    target = %sub.target_currency,
                    "no stored rate for subscribed pair; skipping"
                );
                continue;
            };

            self.send(index, sub, rate).await?;
            dispatched += 1;
        }

        Ok(dispatched)
    }

    async fn send(&self, index: usize, sub: &Subscription, rate: Rate) -> Result<(), DispatchFailure> {
        let payload = sub.payload(rate);
        self.dispatcher
            .dispatch(&sub.webhook_url, &payload)
            .await
            .map_err(|reason| {
                tracing::warn!(
                    index,
                    subscription_id = %sub.id,
                    url = %sub.webhook_url,
                    %reason,
                    "webhook dispatch failed; stopping"
                );
                DispatchFailure {
                    index,
                    subscription_id: sub.id.clone(),
                    url: sub.webhook_url.clone(),
                    reason,
                }
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::currency::CurrencyCode;
    use crate::domain::subscription::{WebhookPayload, WebhookRegistration};
    use crate::error::DispatchError;
    use crate::storage::MemoryStorage;
    use chrono::NaiveDate;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    /// Records every call; fails for URLs in `failing`.
    #[derive(Default)]
    pub(crate) struct RecordingDispatcher {
        pub calls: Mutex<Vec<(String, WebhookPayload)>>,
        pub failing: HashSet<String>,
    }

    impl RecordingDispatcher {
        pub fn urls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(url, _)| url.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl WebhookDispatcher for RecordingDispatcher {
        async fn dispatch(&self, url: &str, payload: &WebhookPayload) -> Result<(), DispatchError> {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), payload.clone()));
            if self.failing.contains(url) {
                return Err(DispatchError::Status(500));
            }
            Ok(())
        }
    }

    pub(crate) fn code(s: &str) -> CurrencyCode {
        s.parse().unwrap()
    }

    pub(crate) fn registration(url: &str, base: &str, min: Rate, max: Rate) -> WebhookRegistration {
        WebhookRegistration {
            webhook_url: url.to_string(),
            base_currency: code(base),
            target_currency: code("NOK"),
            min_trigger: min,
            max_trigger: max,
        }
    }

    pub(crate) fn snapshot(day: u32, nok: Rate) -> RateSnapshot {
        RateSnapshot {
            base: code("EUR"),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            rates: BTreeMap::from([(code("NOK"), nok), (code("USD"), 1.1)]),
        }
    }

    async fn engine_with(
        regs: &[WebhookRegistration],
        dispatcher: Arc<RecordingDispatcher>,
    ) -> (NotificationEngine, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        for reg in regs {
            storage.insert_subscription(reg).await.unwrap();
        }
        (NotificationEngine::new(storage.clone(), dispatcher), storage)
    }

    #[tokio::test]
    async fn only_the_matching_band_is_dispatched() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let regs = [
            registration("http://a/hook", "EUR", 1.0, 1.5),
            registration("http://b/hook", "EUR", 1.5, 2.0),
            registration("http://c/hook", "EUR", 2.0, 2.5),
        ];
        let (engine, _) = engine_with(&regs, dispatcher.clone()).await;

        let dispatched = engine.evaluate(&snapshot(1, 1.6)).await.unwrap();
        assert_eq!(dispatched, 1);
        assert_eq!(dispatcher.urls(), vec!["http://b/hook".to_string()]);

        let calls = dispatcher.calls.lock().unwrap();
        assert_eq!(calls[0].1.current_rate, 1.6);
        assert_eq!(calls[0].1.min_trigger, 1.5);
        assert_eq!(calls[0].1.max_trigger, 2.0);
    }

    #[tokio::test]
    async fn other_bases_and_missing_targets_are_skipped() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut missing_target = registration("http://sek/hook", "EUR", 0.0, 100.0);
        missing_target.target_currency = code("SEK");
        let regs = [
            registration("http://usd-base/hook", "USD", 0.0, 100.0),
            missing_target,
            registration("http://eur/hook", "EUR", 0.0, 100.0),
        ];
        let (engine, _) = engine_with(&regs, dispatcher.clone()).await;

        assert_eq!(engine.evaluate(&snapshot(1, 11.0)).await.unwrap(), 1);
        assert_eq!(dispatcher.urls(), vec!["http://eur/hook".to_string()]);
    }

    #[tokio::test]
    async fn first_failure_stops_the_remaining_dispatches() {
        let dispatcher = Arc::new(RecordingDispatcher {
            failing: HashSet::from(["http://b/hook".to_string()]),
            ..Default::default()
        });
        let regs = [
            registration("http://a/hook", "EUR", 1.0, 2.0),
            registration("http://b/hook", "EUR", 1.0, 2.0),
            registration("http://c/hook", "EUR", 1.0, 2.0),
        ];
        let (engine, _) = engine_with(&regs, dispatcher.clone()).await;

        let err = engine.evaluate(&snapshot(1, 1.5)).await.unwrap_err();
        match err {
            IngestError::Dispatch(failure) => {
                assert_eq!(failure.index, 1);
                assert_eq!(failure.url, "http://b/hook");
                assert_eq!(failure.reason, DispatchError::Status(500));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            dispatcher.urls(),
            vec!["http://a/hook".to_string(), "http://b/hook".to_string()]
        );
    }

    #[tokio::test]
    async fn evaluate_latest_ignores_bands_and_skips_unknown_pairs() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let regs = [
            registration("http://out-of-band/hook", "EUR", 50.0, 60.0),
            registration("http://no-data/hook", "USD", 0.0, 1.0),
        ];
        let (engine, storage) = engine_with(&regs, dispatcher.clone()).await;
        storage.insert_snapshot(&snapshot(1, 10.0)).await.unwrap();
        storage.insert_snapshot(&snapshot(2, 11.0)).await.unwrap();

        assert_eq!(engine.evaluate_latest().await.unwrap(), 1);
        let calls = dispatcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http://out-of-band/hook");
        assert_eq!(calls[0].1.current_rate, 11.0);
    }
}
