//! Fetch, dedup, persist and notify for one base currency at a time.

use crate::domain::currency::CurrencyCode;
use crate::domain::snapshot::RateSnapshot;
use crate::error::IngestError;
use crate::ingest::provider::RateSource;
use crate::ingest::types::DateToken;
use crate::notify::alert::{
    AlertMessage, AlertSink, HEADING_FAILED, HEADING_NOT_NEW, HEADING_REGISTERED,
};
use crate::notify::engine::NotificationEngine;
use crate::storage::Storage;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

#[derive(Debug)]
pub enum Outcome {
    /// A new snapshot was persisted and every matching webhook was called.
    Registered {
        snapshot: RateSnapshot,
        dispatched: usize,
    },
    /// The provider had nothing newer than what is stored.
    AlreadyCurrent {
        base: CurrencyCode,
        date: NaiveDate,
    },
    Failed(IngestError),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

pub struct IngestionCycle {
    source: Arc<dyn RateSource>,
    storage: Arc<dyn Storage>,
    notifier: NotificationEngine,
    alerts: Arc<dyn AlertSink>,
    service: String,
}

impl IngestionCycle {
    pub fn new(
        source: Arc<dyn RateSource>,
        storage: Arc<dyn Storage>,
        notifier: NotificationEngine,
        alerts: Arc<dyn AlertSink>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            source,
            storage,
            notifier,
            alerts,
            service: service.into(),
        }
    }

    /// One cycle for `base`. The operator is alerted whatever the outcome.
    pub async fn run(&self, base: &CurrencyCode, date: DateToken) -> Outcome {
        match self.source.fetch(base, date).await {
            Ok(snapshot) => self.process(snapshot).await,
            Err(err) => self.fail(base, err.into()).await,
        }
    }

    /// Runs `seed`, then one cycle per currency quoted in the seed snapshot. Stops at the first
    /// failed cycle.
    pub async fn run_fan_out(
        &self,
        seed: &CurrencyCode,
        date: DateToken,
    ) -> Vec<(CurrencyCode, Outcome)> {
        let snapshot = match self.source.fetch(seed, date).await {
            Ok(snapshot) => snapshot,
            Err(err) => return vec![(seed.clone(), self.fail(seed, err.into()).await)],
        };

        let targets: Vec<CurrencyCode> = snapshot
            .targets()
            .filter(|code| *code != seed)
            .cloned()
            .collect();

        let first = self.process(snapshot).await;
        let stop = first.is_failed();
        let mut outcomes = vec![(seed.clone(), first)];
        if stop {
            return outcomes;
        }

        for target in targets {
            let outcome = self.run(&target, date).await;
            let stop = outcome.is_failed();
            outcomes.push((target, outcome));
            if stop {
                break;
            }
        }
        outcomes
    }

    async fn process(&self, snapshot: RateSnapshot) -> Outcome {
        let base = snapshot.base.clone();
        let existing = match self.ingest(&snapshot).await {
            Ok(existing) => existing,
            Err(err) => return self.fail(&base, err).await,
        };

        if let Some(existing) = existing {
            let message = format!(
                "Checked for new {base} rates, but there was nothing new to register: fetched \
                 rates dated {}, latest stored rates are dated {existing}",
                snapshot.date
            );
            tracing::info!(%base, date = %snapshot.date, "rates already current");
            self.alert(HEADING_NOT_NEW, message).await;
            return Outcome::AlreadyCurrent {
                base,
                date: existing,
            };
        }

        let dispatched = match self.notifier.evaluate(&snapshot).await {
            Ok(dispatched) => dispatched,
            Err(err) => return self.fail(&base, err).await,
        };

        let message = format!(
            "Registered new {base} rates with the date {}, notified {dispatched} webhook(s)",
            snapshot.date
        );
        self.alert(HEADING_REGISTERED, message).await;
        Outcome::Registered {
            snapshot,
            dispatched,
        }
    }

    /// Returns the latest stored date when the snapshot is not newer than it. Older snapshots
    /// are still stored but never evaluated against subscriptions.
    async fn ingest(&self, snapshot: &RateSnapshot) -> Result<Option<NaiveDate>, IngestError> {
        if let Some(latest) = self.storage.latest_snapshot(&snapshot.base).await? {
            if latest.date == snapshot.date {
                return Ok(Some(latest.date));
            }
            if snapshot.date < latest.date {
                let inserted = self.storage.insert_snapshot(snapshot).await?;
                tracing::info!(
                    base = %snapshot.base,
                    date = %snapshot.date,
                    latest = %latest.date,
                    inserted,
                    "stored snapshot older than latest; not notifying"
                );
                return Ok(Some(latest.date));
            }
        }

        // The conditional insert also covers a (base, date) that is stored but not the latest.
        if !self.storage.insert_snapshot(snapshot).await? {
            return Ok(Some(snapshot.date));
        }
        tracing::info!(
            base = %snapshot.base,
            date = %snapshot.date,
            rates_len = snapshot.rates.len(),
            "persisted rate snapshot"
        );
        Ok(None)
    }

    async fn fail(&self, base: &CurrencyCode, err: IngestError) -> Outcome {
        tracing::error!(%base, error = %err, "ingestion cycle failed");
        self.alert(HEADING_FAILED, format!("{base}: {err}")).await;
        Outcome::Failed(err)
    }

    async fn alert(&self, heading: &str, message: String) {
        let msg = AlertMessage::new(heading, message, &self.service, Utc::now());
        self.alerts.notify(&msg).await;
    }
}
