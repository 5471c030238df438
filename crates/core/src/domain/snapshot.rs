use crate::domain::currency::{CurrencyCode, Rate};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of most recent snapshots the "average" read covers.
pub const AVERAGE_WINDOW: usize = 3;

/// Rates for one base currency on one date. At most one per (base, date) is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub base: CurrencyCode,
    pub date: NaiveDate,
    pub rates: BTreeMap<CurrencyCode, Rate>,
}

impl RateSnapshot {
    pub fn rate(&self, target: &CurrencyCode) -> Option<Rate> {
        self.rates.get(target).copied()
    }

    pub fn targets(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.rates.keys()
    }
}

/// Mean of `target` over the `n` most recent snapshots.
///
/// Returns `None` when fewer than `n` snapshots exist or one of them does not quote `target`.
/// The sum runs oldest to newest in `f32`.
pub fn average_of_last(snapshots: &[RateSnapshot], target: &CurrencyCode, n: usize) -> Option<Rate> {
    if n == 0 || snapshots.len() < n {
        return None;
    }

    let mut ordered: Vec<&RateSnapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.date);

    let mut total: Rate = 0.0;
    for snapshot in &ordered[ordered.len() - n..] {
        total += snapshot.rate(target)?;
    }
    Some(total / n as Rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> CurrencyCode {
        s.parse().unwrap()
    }

    fn snapshot(day: u32, nok: Rate) -> RateSnapshot {
        RateSnapshot {
            base: code("EUR"),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            rates: BTreeMap::from([(code("NOK"), nok)]),
        }
    }

    #[test]
    fn averages_the_three_most_recent_snapshots() {
        let (r1, r2, r3) = (9.5_f32, 9.75_f32, 10.25_f32);
        let snapshots = vec![snapshot(4, r3), snapshot(1, 1.0), snapshot(2, r1), snapshot(3, r2)];
        let avg = average_of_last(&snapshots, &code("NOK"), AVERAGE_WINDOW).unwrap();
        assert_eq!(avg, (r1 + r2 + r3) / 3.0);
    }

    #[test]
    fn needs_a_full_window() {
        let snapshots = vec![snapshot(1, 1.0), snapshot(2, 2.0)];
        assert_eq!(average_of_last(&snapshots, &code("NOK"), AVERAGE_WINDOW), None);
    }

    #[test]
    fn missing_target_yields_none() {
        let snapshots = vec![snapshot(1, 1.0), snapshot(2, 2.0), snapshot(3, 3.0)];
        assert_eq!(average_of_last(&snapshots, &code("USD"), AVERAGE_WINDOW), None);
    }

    #[test]
    fn decodes_provider_shape() {
        let s: RateSnapshot = serde_json::from_value(serde_json::json!({
            "base": "EUR",
            "date": "2024-01-01",
            "rates": {"NOK": 11.5, "USD": 1.1}
        }))
        .unwrap();
        assert_eq!(s.rate(&code("USD")), Some(1.1));
        assert_eq!(s.targets().count(), 2);
    }
}
