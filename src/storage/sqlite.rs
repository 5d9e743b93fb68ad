use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::path::Path;
use std::str::FromStr;

use super::SnapshotStore;
use crate::config::DatabaseConfig;
use crate::models::AvailabilitySnapshot;
use crate::utils::error::{AppError, Result};

const UPSERT_SNAPSHOT: &str = r#"
INSERT INTO availability_snapshots (category, location, has_slots, slots_count, last_checked_ms, opened_at_ms)
VALUES (?, ?, ?, ?, ?, ?)
ON CONFLICT (category, location) DO UPDATE SET
    has_slots = excluded.has_slots,
    slots_count = excluded.slots_count,
    last_checked_ms = excluded.last_checked_ms,
    opened_at_ms = CASE
        WHEN excluded.has_slots = 1 AND availability_snapshots.has_slots = 0 THEN excluded.last_checked_ms
        ELSE availability_snapshots.opened_at_ms
    END
WHERE excluded.last_checked_ms >= availability_snapshots.last_checked_ms
"#;

#[derive(Debug, FromRow)]
struct SnapshotRow {
    category: String,
    location: String,
    has_slots: bool,
    slots_count: i64,
    last_checked_ms: i64,
    opened_at_ms: Option<i64>,
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| AppError::Internal(format!("Invalid stored timestamp: {}", ms)))
}

impl TryFrom<SnapshotRow> for AvailabilitySnapshot {
    type Error = AppError;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        Ok(Self {
            slots_count: u32::try_from(row.slots_count)
                .map_err(|_| AppError::Internal(format!("Invalid stored slots_count: {}", row.slots_count)))?,
            last_checked: from_millis(row.last_checked_ms)?,
            opened_at: row.opened_at_ms.map(from_millis).transpose()?,
            category: row.category,
            location: row.location,
            has_slots: row.has_slots,
        })
    }
}

/// Parent directory of a file-backed SQLite URL.
fn database_dir(url: &str) -> Option<&Path> {
    let path = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(':') {
        return None;
    }
    Path::new(path).parent().filter(|p| !p.as_os_str().is_empty())
}

pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    /// Opens (creating if needed) the database and applies migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = database_dir(&config.url) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn get_snapshot(&self, category: &str, location: &str) -> Result<Option<AvailabilitySnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            "SELECT category, location, has_slots, slots_count, last_checked_ms, opened_at_ms \
             FROM availability_snapshots WHERE category = ? AND location = ?",
        )
        .bind(category)
        .bind(location)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AvailabilitySnapshot::try_from).transpose()
    }

    async fn put_snapshot(
        &self,
        category: &str,
        location: &str,
        has_slots: bool,
        slots_count: u32,
        checked_at: DateTime<Utc>,
    ) -> Result<bool> {
        let checked_ms = checked_at.timestamp_millis();
        let opened_ms = has_slots.then_some(checked_ms);

        let result = sqlx::query(UPSERT_SNAPSHOT)
            .bind(category)
            .bind(location)
            .bind(has_slots)
            .bind(i64::from(slots_count))
            .bind(checked_ms)
            .bind(opened_ms)
            .execute(&self.pool)
            .await?;

        let applied = result.rows_affected() > 0;
        if !applied {
            tracing::debug!(category, location, checked_ms, "Ignored out-of-order snapshot write");
        }
        Ok(applied)
    }

    async fn list_snapshots(&self) -> Result<Vec<AvailabilitySnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT category, location, has_slots, slots_count, last_checked_ms, opened_at_ms \
             FROM availability_snapshots ORDER BY category, location",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AvailabilitySnapshot::try_from).collect()
    }
}
