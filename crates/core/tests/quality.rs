use harvester_core::keywords::KeywordTable;
use harvester_core::models::{
    methods, CheckOutcome, ClassificationResult, ClassificationVote, DocumentFields, FieldCheck,
    Grade, QualityLevel,
};
use harvester_core::quality;
use std::collections::BTreeMap;

fn classified(confidence: f32, agreeing_votes: usize) -> ClassificationResult {
    let votes = (0..agreeing_votes)
        .map(|i| ClassificationVote::new(&format!("method_{i}"), "satellite_data", confidence))
        .collect();
    ClassificationResult {
        final_label: "satellite_data".to_string(),
        aggregate_confidence: confidence,
        votes,
        method_breakdown: BTreeMap::new(),
    }
}

fn rich_fields() -> DocumentFields {
    let mut fields = DocumentFields {
        url: "https://catalog.example/modis".to_string(),
        title: "MODIS Satellite Imagery Collection with 250m Resolution Sensor Coverage"
            .to_string(),
        description: "Global multispectral satellite dataset with daily temporal coverage, \
                      250 meter spatial resolution, full radiometric grid calibration, and \
                      orbit-corrected swath mosaics suitable for land, ocean, and atmosphere \
                      studies. Includes sensor metadata, spectral band documentation, and \
                      coverage footprints for every granule in the archive."
            .to_string(),
        provider: "Earth Observation Data Centre".to_string(),
        ..Default::default()
    };
    for tag in ["satellite", "imagery", "modis", "vegetation", "ocean"] {
        fields.tags.insert(tag.to_string());
    }
    fields
}

fn all_pass_checks() -> Vec<FieldCheck> {
    vec![
        FieldCheck {
            name: "date_range".to_string(),
            outcome: CheckOutcome::Pass,
        },
        FieldCheck {
            name: "coordinates".to_string(),
            outcome: CheckOutcome::Pass,
        },
    ]
}

#[test]
fn score_stays_within_bounds() {
    let vocabulary = KeywordTable::builtin();

    let best = quality::score(
        &rich_fields(),
        &classified(1.0, 3),
        &all_pass_checks(),
        &vocabulary,
    );
    assert!(best.score <= 100.0);
    assert!(best.score >= 85.0);
    assert_eq!(best.level, QualityLevel::Excellent);

    let worst = quality::score(
        &DocumentFields::default(),
        &ClassificationResult::unclassified(),
        &[],
        &vocabulary,
    );
    assert_eq!(worst.score, 0.0);
    assert_eq!(worst.grade, Grade::F);
    assert_eq!(worst.level, QualityLevel::Poor);
}

#[test]
fn grade_mapping_matches_thresholds() {
    assert_eq!(quality::grade_for(95.0), Grade::APlus);
    assert_eq!(quality::grade_for(90.0), Grade::APlus);
    assert_eq!(quality::grade_for(89.9), Grade::A);
    assert_eq!(quality::grade_for(80.0), Grade::A);
    assert_eq!(quality::grade_for(70.0), Grade::BPlus);
    assert_eq!(quality::grade_for(60.0), Grade::B);
    assert_eq!(quality::grade_for(50.0), Grade::C);
    assert_eq!(quality::grade_for(40.0), Grade::D);
    assert_eq!(quality::grade_for(39.9), Grade::F);
}

#[test]
fn level_mapping_matches_thresholds() {
    assert_eq!(quality::level_for(85.0), QualityLevel::Excellent);
    assert_eq!(quality::level_for(84.9), QualityLevel::Good);
    assert_eq!(quality::level_for(65.0), QualityLevel::Good);
    assert_eq!(quality::level_for(45.0), QualityLevel::Fair);
    assert_eq!(quality::level_for(44.9), QualityLevel::Poor);
}

#[test]
fn agreement_across_methods_earns_bonus() {
    let vocabulary = KeywordTable::builtin();
    let fields = rich_fields();

    let single = quality::score(&fields, &classified(0.5, 1), &[], &vocabulary);
    let agreeing = quality::score(&fields, &classified(0.5, 2), &[], &vocabulary);

    assert!((agreeing.score - single.score - 6.0).abs() < 1e-3);
}

#[test]
fn validation_signals_scale_linearly() {
    let vocabulary = KeywordTable::builtin();
    let fields = rich_fields();
    let classification = classified(0.5, 1);

    let mixed = vec![
        FieldCheck {
            name: "date_range".to_string(),
            outcome: CheckOutcome::Pass,
        },
        FieldCheck {
            name: "coordinates".to_string(),
            outcome: CheckOutcome::Fail,
        },
    ];

    let full = quality::score(&fields, &classification, &all_pass_checks(), &vocabulary);
    let half = quality::score(&fields, &classification, &mixed, &vocabulary);

    assert!((full.score - half.score - 5.0).abs() < 1e-3);
}

#[test]
fn strengths_and_issues_name_subscores_without_changing_totals() {
    let vocabulary = KeywordTable::builtin();
    let mut fields = rich_fields();
    fields.provider.clear();

    let report = quality::score(&fields, &classified(1.0, 3), &all_pass_checks(), &vocabulary);

    assert!(report.strengths.iter().any(|s| s.contains("title")));
    assert!(report.issues.iter().any(|s| s.contains("provider")));

    // The lists are informational: recomputing yields the same number.
    let again = quality::score(&fields, &classified(1.0, 3), &all_pass_checks(), &vocabulary);
    assert_eq!(report.score, again.score);
}
