use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Advisory locks are scoped to the Postgres session, so the connection that
// took the lock is kept until release. Best-effort guard against overlapping
// worker runs.
const LOCK_NAMESPACE: i64 = 0x5354_4F43_4B50; // "STOCKP"

pub struct RunLock {
    conn: PoolConnection<Postgres>,
    key: i64,
}

pub fn lock_key(job: &str) -> i64 {
    let folded = job
        .bytes()
        .fold(0i64, |acc, b| acc.wrapping_mul(31).wrapping_add(i64::from(b)));
    LOCK_NAMESPACE ^ folded
}

pub async fn try_acquire_run_lock(pool: &sqlx::PgPool, job: &str) -> anyhow::Result<Option<RunLock>> {
    let key = lock_key(job);
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for advisory lock")?;

    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;

    Ok(acquired.0.then_some(RunLock { conn, key }))
}

impl RunLock {
    pub async fn release(mut self) -> anyhow::Result<()> {
        let key = self.key;
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={key})"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_stable_per_job() {
        assert_eq!(lock_key("scrape"), lock_key("scrape"));
        assert_ne!(lock_key("scrape"), lock_key("history"));
    }
}
