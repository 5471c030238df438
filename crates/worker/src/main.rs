use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxwatch_core::domain::currency::CurrencyCode;
use fxwatch_core::ingest::provider::{HttpRateSource, RateSource};
use fxwatch_core::ingest::types::DateToken;
use fxwatch_core::notify::{alert, AlertSink, HttpWebhookDispatcher, LogAlertSink, NotificationEngine};
use fxwatch_core::pipeline::{IngestionCycle, Outcome};
use fxwatch_core::storage::{MemoryStorage, PgStorage, Storage};

#[derive(Debug, Parser)]
#[command(name = "fxwatch_worker")]
struct Args {
    /// Provider date to ingest: "latest" or YYYY-MM-DD.
    #[arg(long, default_value = "latest")]
    date: String,

    /// Base currency to ingest (repeatable). Defaults to SUPPORTED_BASE_CURRENCIES.
    #[arg(long = "base")]
    bases: Vec<String>,

    /// Also ingest every currency quoted by each base, each as its own base.
    #[arg(long)]
    fan_out: bool,

    /// Run a single round and exit instead of looping every interval.
    #[arg(long)]
    once: bool,

    /// Fetch and evaluate against in-memory storage; nothing is written and no alert is posted.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = fxwatch_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let date: DateToken = args.date.parse()?;
    let bases = resolve_bases(&args.bases, &settings.supported_bases)?;

    let source = Arc::new(HttpRateSource::from_settings(&settings)?);
    let provider = source.provider_name();
    let dispatcher = Arc::new(HttpWebhookDispatcher::from_settings(&settings)?);

    let mut lock_conn = None;
    let (storage, alerts): (Arc<dyn Storage>, Arc<dyn AlertSink>) = if args.dry_run {
        (
            Arc::new(MemoryStorage::new()) as Arc<dyn Storage>,
            Arc::new(LogAlertSink) as Arc<dyn AlertSink>,
        )
    } else {
        let db_url = settings.require_database_url()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;

        fxwatch_core::storage::migrate(&pool).await?;

        match fxwatch_core::storage::lock::try_acquire_ingest_lock(&pool).await? {
            Some(conn) => lock_conn = Some(conn),
            None => {
                tracing::warn!("ingest lock not acquired; another worker is running");
                return Ok(());
            }
        }

        (
            Arc::new(PgStorage::new(pool)) as Arc<dyn Storage>,
            alert::sink_from_settings(&settings)?,
        )
    };

    let notifier = NotificationEngine::new(storage.clone(), dispatcher);
    let cycle = IngestionCycle::new(
        source,
        storage,
        notifier,
        alerts,
        settings.operator_alert_service.clone(),
    );

    let base_list: Vec<&str> = bases.iter().map(CurrencyCode::as_str).collect();
    tracing::info!(
        %date,
        provider,
        bases = ?base_list,
        fan_out = args.fan_out,
        dry_run = args.dry_run,
        interval_secs = settings.ingest_interval.as_secs(),
        "worker started"
    );

    let mut result = Ok(());
    loop {
        let failures = run_round(&cycle, &bases, date, args.fan_out).await;

        if args.once || args.dry_run {
            if failures > 0 {
                result = Err(anyhow::anyhow!("{failures} ingestion cycle(s) failed"));
            }
            break;
        }

        // Sleep the full interval after each round so rounds never overlap.
        tokio::select! {
            _ = tokio::time::sleep(settings.ingest_interval) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }

    if let Some(conn) = lock_conn {
        let _ = fxwatch_core::storage::lock::release_ingest_lock(conn).await;
    }
    result
}

/// Runs every base once and returns how many cycles failed.
async fn run_round(
    cycle: &IngestionCycle,
    bases: &[CurrencyCode],
    date: DateToken,
    fan_out: bool,
) -> usize {
    let mut failures = 0;
    for base in bases {
        let outcomes = if fan_out {
            cycle.run_fan_out(base, date).await
        } else {
            vec![(base.clone(), cycle.run(base, date).await)]
        };

        for (base, outcome) in outcomes {
            match outcome {
                Outcome::Registered {
                    snapshot,
                    dispatched,
                } => {
                    tracing::info!(%base, date = %snapshot.date, dispatched, "registered new rates");
                }
                Outcome::AlreadyCurrent { date, .. } => {
                    tracing::info!(%base, %date, "no new rates");
                }
                Outcome::Failed(err) => {
                    failures += 1;
                    let err = anyhow::Error::new(err).context(format!("ingestion failed for {base}"));
                    sentry_anyhow::capture_anyhow(&err);
                }
            }
        }
    }
    failures
}

fn resolve_bases(args: &[String], supported: &[CurrencyCode]) -> anyhow::Result<Vec<CurrencyCode>> {
    if args.is_empty() {
        return Ok(supported.to_vec());
    }
    fxwatch_core::config::parse_currency_list(&args.join(","))
}

fn init_sentry(settings: &fxwatch_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bases_default_to_supported_list() {
        let supported = vec!["EUR".parse().unwrap()];
        assert_eq!(resolve_bases(&[], &supported).unwrap(), supported);
    }

    #[test]
    fn explicit_bases_are_validated() {
        let supported = vec!["EUR".parse().unwrap()];
        let bases = resolve_bases(&["usd".to_string(), "nok,sek".to_string()], &supported).unwrap();
        let bases: Vec<&str> = bases.iter().map(CurrencyCode::as_str).collect();
        assert_eq!(bases, vec!["USD", "NOK", "SEK"]);
        assert!(resolve_bases(&["dollar".to_string()], &supported).is_err());
    }

    #[test]
    fn cli_parses_flags() {
        let args = Args::parse_from([
            "fxwatch_worker",
            "--date",
            "2024-01-01",
            "--base",
            "EUR",
            "--once",
            "--fan-out",
        ]);
        assert!(args.once && args.fan_out && !args.dry_run);
        assert_eq!(args.bases, vec!["EUR".to_string()]);
        assert!(args.date.parse::<DateToken>().is_ok());
    }
}
