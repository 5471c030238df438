use anyhow::Context;

// Advisory locks are scoped to the Postgres session. Ingestion assumes a single writer, so the
// worker holds this lock for the lifetime of its connection.
const LOCK_NAMESPACE: i64 = 0x4658_5741_5443; // "FXWATC"

fn lock_key_for_ingest() -> i64 {
    LOCK_NAMESPACE
}

/// Takes the ingest lock on a dedicated connection. `None` means another worker holds it.
pub async fn try_acquire_ingest_lock(
    pool: &sqlx::PgPool,
) -> anyhow::Result<Option<sqlx::pool::PoolConnection<sqlx::Postgres>>> {
    let key = lock_key_for_ingest();
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for ingest lock")?;
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
    Ok(acquired.0.then_some(conn))
}

pub async fn release_ingest_lock(
    mut conn: sqlx::pool::PoolConnection<sqlx::Postgres>,
) -> anyhow::Result<()> {
    let key = lock_key_for_ingest();
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("failed to release advisory lock (key={key})"))?;
    Ok(())
}
