use crate::error::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Sentinel label used when no method produced a usable vote.
pub const UNCLASSIFIED: &str = "unclassified";

/// Canonical method names used as `method_weights` keys.
pub mod methods {
    pub const MODEL: &str = "model";
    pub const MODEL_LITE: &str = "model_lite";
    pub const ENTITY: &str = "entity";
    pub const KEYWORD: &str = "keyword";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InFlight,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemSource {
    Url { url: String },
    Inline { url: String, html: String },
}

impl ItemSource {
    pub fn url(&self) -> &str {
        match self {
            ItemSource::Url { url } => url,
            ItemSource::Inline { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub source: ItemSource,
    pub retry_count: u32,
    pub status: ItemStatus,
}

impl WorkItem {
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: item_id(&url),
            source: ItemSource::Url { url },
            retry_count: 0,
            status: ItemStatus::Pending,
        }
    }

    pub fn from_html(url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: item_id(&url),
            source: ItemSource::Inline {
                url,
                html: html.into(),
            },
            retry_count: 0,
            status: ItemStatus::Pending,
        }
    }

    pub fn url(&self) -> &str {
        self.source.url()
    }
}

/// Stable id derived from the document URL.
pub fn item_id(url: &str) -> String {
    blake3::hash(url.as_bytes()).to_hex()[..16].to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationVote {
    pub method: String,
    pub label: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_scores: Option<BTreeMap<String, f32>>,
}

impl ClassificationVote {
    pub fn new(method: &str, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            method: method.to_string(),
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            raw_scores: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub final_label: String,
    pub aggregate_confidence: f32,
    pub votes: Vec<ClassificationVote>,
    pub method_breakdown: BTreeMap<String, f32>,
}

impl ClassificationResult {
    pub fn unclassified() -> Self {
        Self {
            final_label: UNCLASSIFIED.to_string(),
            aggregate_confidence: 0.0,
            votes: Vec::new(),
            method_breakdown: BTreeMap::new(),
        }
    }

    pub fn is_classified(&self) -> bool {
        self.final_label != UNCLASSIFIED
    }

    /// Number of votes agreeing with the final label.
    pub fn agreement(&self) -> usize {
        self.votes
            .iter()
            .filter(|v| v.label == self.final_label)
            .count()
    }
}

/// Structured fields extracted from one catalog page by the thin
/// fetch/parse step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFields {
    pub url: String,
    pub title: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub provider: String,
    pub technical_specs: BTreeMap<String, String>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub score: f32,
    pub grade: Grade,
    pub level: QualityLevel,
    pub issues: Vec<String>,
    pub strengths: Vec<String>,
}

/// Outcome of one external field-format check, consumed by the quality
/// scorer. The validation logic itself lives outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Pass,
    Partial,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCheck {
    pub name: String,
    pub outcome: CheckOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub item_id: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub provider: String,
    pub technical_specs: BTreeMap<String, String>,
    pub classification: ClassificationResult,
    pub quality: QualityReport,
    pub harvested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub batch_index: usize,
    pub total_batches: usize,
    pub items_done: usize,
    pub items_total: usize,
    pub errors_so_far: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedItem {
    pub id: String,
    pub url: String,
    pub category: ErrorCategory,
    pub retries: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlReport {
    pub failed_items: Vec<FailedItem>,
    pub error_counts: BTreeMap<String, usize>,
    pub items_done: usize,
    pub final_memory_mb: u64,
    pub elapsed_ms: u64,
    /// Set when the run was aborted instead of running to completion.
    pub fatal: Option<String>,
}

#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub records: Vec<Record>,
    pub report: CrawlReport,
    /// Ids abandoned by cancellation or a fatal abort, in input order.
    pub unprocessed: Vec<String>,
}

/// Metrics of one optimizer pass over the sample set with one
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRun {
    pub config_name: String,
    pub samples_tested: usize,
    pub average_quality: f64,
    pub average_confidence: f64,
    pub completeness: f64,
    pub error_rate: f64,
    pub label_diversity: usize,
    pub processing_time_ms: u64,
    pub memory_delta_mb: i64,
    pub composite_score: f64,
}
