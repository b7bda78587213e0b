//! Storage layer: SQLite schema and record store.
//!
//! Holds DB pool setup and the idempotent schema runner.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

pub mod models;

use models::{NewFailure, NewOptimizationRun, NewRecord, StoredRecord};

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let mut url = database_url.to_string();
    if !database_url.starts_with("sqlite:") {
        let path = std::path::PathBuf::from(database_url);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let norm = path.to_string_lossy().replace('\\', "/");
        if path.is_absolute() {
            url = format!("sqlite:///{}?mode=rwc", norm.trim_start_matches('/'));
        } else {
            url = format!("sqlite://{}?mode=rwc", norm);
        }
    }
    let mut opts = SqlitePoolOptions::new();
    if url.contains("memory") {
        opts = opts.max_connections(1);
    } else {
        opts = opts.max_connections(5);
    }
    let pool = opts.connect(&url).await?;
    Ok(pool)
}

/// Creates the schema if absent. Safe to run multiple times.
pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id TEXT NOT NULL UNIQUE,
            url TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            provider TEXT NOT NULL DEFAULT '',
            label TEXT NOT NULL,
            confidence REAL NOT NULL,
            quality_score REAL NOT NULL,
            grade TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            harvested_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS failures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id TEXT NOT NULL,
            url TEXT NOT NULL,
            category TEXT NOT NULL,
            retries INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS optimization_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            config_name TEXT NOT NULL,
            composite_score REAL NOT NULL,
            samples_tested INTEGER NOT NULL,
            metrics_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Re-harvesting the same item replaces the stored row; a record is
    /// immutable once created, so a replacement is a whole new payload.
    pub async fn insert_record(&self, record: &NewRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO records
                (item_id, url, title, description, provider, label, confidence,
                 quality_score, grade, payload_json, harvested_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(item_id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                description = excluded.description,
                provider = excluded.provider,
                label = excluded.label,
                confidence = excluded.confidence,
                quality_score = excluded.quality_score,
                grade = excluded.grade,
                payload_json = excluded.payload_json,
                harvested_at = excluded.harvested_at",
        )
        .bind(&record.item_id)
        .bind(&record.url)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.provider)
        .bind(&record.label)
        .bind(record.confidence)
        .bind(record.quality_score)
        .bind(&record.grade)
        .bind(&record.payload_json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_failure(&self, failure: &NewFailure) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO failures (item_id, url, category, retries, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&failure.item_id)
        .bind(&failure.url)
        .bind(&failure.category)
        .bind(failure.retries)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_optimization_run(&self, run: &NewOptimizationRun) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO optimization_runs
                (config_name, composite_score, samples_tested, metrics_json, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&run.config_name)
        .bind(run.composite_score)
        .bind(run.samples_tested)
        .bind(&run.metrics_json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_records(
        &self,
        limit: i64,
        label: Option<&str>,
    ) -> anyhow::Result<Vec<StoredRecord>> {
        let rows = if let Some(label) = label {
            sqlx::query_as::<_, StoredRecord>(
                "SELECT id, item_id, url, title, provider, label, confidence,
                        quality_score, grade, harvested_at
                 FROM records WHERE label = ? ORDER BY id DESC LIMIT ?",
            )
            .bind(label)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, StoredRecord>(
                "SELECT id, item_id, url, title, provider, label, confidence,
                        quality_score, grade, harvested_at
                 FROM records ORDER BY id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }

    pub async fn record_payload(&self, item_id: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT payload_json FROM records WHERE item_id = ?")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn record_count(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>(0))
    }

    pub async fn failure_count(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM failures")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>(0))
    }

    pub async fn optimization_run_count(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM optimization_runs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>(0))
    }
}
