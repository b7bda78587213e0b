use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Insert payload for one harvested record. `payload_json` carries the full
/// record (classification votes, quality report) as serialized JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    pub item_id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub provider: String,
    pub label: String,
    pub confidence: f32,
    pub quality_score: f32,
    pub grade: String,
    pub payload_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredRecord {
    pub id: i64,
    pub item_id: String,
    pub url: String,
    pub title: String,
    pub provider: String,
    pub label: String,
    pub confidence: f32,
    pub quality_score: f32,
    pub grade: String,
    pub harvested_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFailure {
    pub item_id: String,
    pub url: String,
    pub category: String,
    pub retries: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOptimizationRun {
    pub config_name: String,
    pub composite_score: f64,
    pub samples_tested: i64,
    pub metrics_json: String,
}
