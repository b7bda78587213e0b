use harvester_core::config::{load_profiles, select_profile, WeightConfig};
use harvester_core::models::methods;
use std::fs;
use tempfile::tempdir;

#[test]
fn profiles_load_from_toml_directory() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("aggressive.toml"),
        r#"
            name = "aggressive"
            token_limit = 1024

            [method_weights]
            model = 0.7
            keyword = 0.3
        "#,
    )
    .unwrap();
    fs::write(
        dir.path().join("lean.toml"),
        r#"
            name = "lean"
            quality_factor = 1.1

            [method_weights]
            keyword = 1.0
        "#,
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let profiles = load_profiles(dir.path()).unwrap();
    assert_eq!(profiles.len(), 2);
    assert_eq!(profiles[0].name, "aggressive");
    assert_eq!(profiles[1].name, "lean");

    // Unspecified fields come from the defaults: the loader never returns
    // a partially-populated profile.
    assert_eq!(profiles[0].token_limit, 1024);
    assert_eq!(
        profiles[0].quality_threshold,
        WeightConfig::default().quality_threshold
    );
    assert_eq!(profiles[1].quality_factor, Some(1.1));
    assert_eq!(profiles[0].weight(methods::MODEL), 0.7);
    assert_eq!(profiles[0].weight(methods::ENTITY), 0.0);
}

#[test]
fn missing_directory_is_an_empty_profile_set() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("not_there");
    assert!(load_profiles(&missing).unwrap().is_empty());
}

#[test]
fn selection_falls_back_to_the_builtin_default() {
    let profiles = vec![WeightConfig {
        name: "tuned".to_string(),
        ..WeightConfig::default()
    }];

    assert_eq!(select_profile(&profiles, Some("tuned")).name, "tuned");
    assert_eq!(select_profile(&profiles, Some("missing")).name, "default");
    assert_eq!(select_profile(&profiles, None).name, "default");
    assert_eq!(select_profile(&[], None).name, "default");
}

#[test]
fn builtin_candidates_cover_the_tuning_spread() {
    let candidates = WeightConfig::builtin_candidates();
    let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"default"));
    assert!(names.contains(&"model_heavy"));
    assert!(names.contains(&"constrained"));

    let constrained = candidates.iter().find(|c| c.name == "constrained").unwrap();
    assert!(constrained.quality_factor.is_some());
    assert!(constrained.memory_limit_mb < WeightConfig::default().memory_limit_mb);
}
