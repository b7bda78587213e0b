//! Quality scoring for harvested records: weighted sub-scores summed to a
//! 0–100 total with a letter grade and level.

use crate::keywords::KeywordTable;
use crate::models::{
    CheckOutcome, ClassificationResult, DocumentFields, FieldCheck, Grade, QualityLevel,
    QualityReport,
};

const TITLE_MAX: f32 = 30.0;
const DESCRIPTION_MAX: f32 = 30.0;
const TAGS_MAX: f32 = 15.0;
const PROVIDER_MAX: f32 = 10.0;
const CLASSIFICATION_MAX: f32 = 20.0;
const VALIDATION_MAX: f32 = 10.0;

/// Domain technical terms that mark a title or description as substantive.
const DOMAIN_TERMS: &[&str] = &[
    "resolution",
    "sensor",
    "satellite",
    "dataset",
    "coverage",
    "grid",
    "radar",
    "spectral",
    "temporal",
    "orbit",
];

pub fn score(
    fields: &DocumentFields,
    classification: &ClassificationResult,
    checks: &[FieldCheck],
    vocabulary: &KeywordTable,
) -> QualityReport {
    let subs = [
        ("title", title_score(&fields.title), TITLE_MAX),
        (
            "description",
            description_score(&fields.description),
            DESCRIPTION_MAX,
        ),
        ("tags", tags_score(fields, vocabulary), TAGS_MAX),
        ("provider", provider_score(&fields.provider), PROVIDER_MAX),
        (
            "classification",
            classification_score(classification),
            CLASSIFICATION_MAX,
        ),
        ("validation", validation_score(checks), VALIDATION_MAX),
    ];

    let total: f32 = subs.iter().map(|(_, got, _)| got).sum();
    let total = total.clamp(0.0, 100.0);

    let mut strengths = Vec::new();
    let mut issues = Vec::new();
    for (name, got, max) in &subs {
        if *got >= 0.9 * max {
            strengths.push(format!("{name} near maximum ({got:.0}/{max:.0})"));
        } else if *got < 0.3 * max {
            issues.push(format!("{name} below minimum ({got:.0}/{max:.0})"));
        }
    }

    QualityReport {
        score: total,
        grade: grade_for(total),
        level: level_for(total),
        issues,
        strengths,
    }
}

pub fn grade_for(score: f32) -> Grade {
    match score {
        s if s >= 90.0 => Grade::APlus,
        s if s >= 80.0 => Grade::A,
        s if s >= 70.0 => Grade::BPlus,
        s if s >= 60.0 => Grade::B,
        s if s >= 50.0 => Grade::C,
        s if s >= 40.0 => Grade::D,
        _ => Grade::F,
    }
}

pub fn level_for(score: f32) -> QualityLevel {
    match score {
        s if s >= 85.0 => QualityLevel::Excellent,
        s if s >= 65.0 => QualityLevel::Good,
        s if s >= 45.0 => QualityLevel::Fair,
        _ => QualityLevel::Poor,
    }
}

fn length_points(len: usize, thresholds: &[(usize, f32)]) -> f32 {
    let mut points = 0.0;
    for (at_least, value) in thresholds {
        if len >= *at_least {
            points = *value;
        }
    }
    points
}

fn term_bonus(text: &str, per_term: f32, cap: f32) -> f32 {
    let lower = text.to_lowercase();
    let hits = DOMAIN_TERMS
        .iter()
        .filter(|t| lower.contains(*t))
        .count() as f32;
    (hits * per_term).min(cap)
}

fn title_score(title: &str) -> f32 {
    let len = title.trim().chars().count();
    if len == 0 {
        return 0.0;
    }
    let base = length_points(len, &[(1, 6.0), (10, 14.0), (25, 20.0), (60, 24.0)]);
    (base + term_bonus(title, 3.0, 6.0)).min(TITLE_MAX)
}

fn description_score(description: &str) -> f32 {
    let len = description.trim().chars().count();
    if len == 0 {
        return 0.0;
    }
    let base = length_points(len, &[(1, 8.0), (40, 16.0), (120, 22.0), (300, 24.0)]);
    (base + term_bonus(description, 3.0, 6.0)).min(DESCRIPTION_MAX)
}

fn tags_score(fields: &DocumentFields, vocabulary: &KeywordTable) -> f32 {
    if fields.tags.is_empty() {
        return 0.0;
    }
    let count_points = (fields.tags.len().min(5) * 2) as f32;
    let known = fields
        .tags
        .iter()
        .filter(|t| vocabulary.is_known_tag(t))
        .count();
    let relevance = known as f32 / fields.tags.len() as f32;
    (count_points + relevance * 5.0).min(TAGS_MAX)
}

fn provider_score(provider: &str) -> f32 {
    let len = provider.trim().chars().count();
    if len == 0 {
        return 0.0;
    }
    let mut points: f32 = 7.0;
    if len >= 8 {
        points += 3.0;
    }
    points.min(PROVIDER_MAX)
}

fn classification_score(classification: &ClassificationResult) -> f32 {
    if !classification.is_classified() {
        return 0.0;
    }
    let mut points = classification.aggregate_confidence * 14.0;
    if classification.agreement() >= 2 {
        points += 6.0;
    }
    points.min(CLASSIFICATION_MAX)
}

fn validation_score(checks: &[FieldCheck]) -> f32 {
    if checks.is_empty() {
        return 0.0;
    }
    let credit: f32 = checks
        .iter()
        .map(|c| match c.outcome {
            CheckOutcome::Pass => 1.0,
            CheckOutcome::Partial => 0.5,
            CheckOutcome::Fail => 0.0,
        })
        .sum();
    (credit / checks.len() as f32 * VALIDATION_MAX).min(VALIDATION_MAX)
}
