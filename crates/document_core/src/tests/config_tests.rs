use super::{
    apply_env_overrides, load_settings_from, parse_settings, CloseActivation, Settings,
};

use std::{collections::HashMap, path::PathBuf};

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::default();
    assert_eq!(settings.event_capacity, 1024);
    assert_eq!(settings.base_dir, None);
    assert_eq!(settings.close_activation, CloseActivation::MostRecent);
}

#[test]
fn parses_partial_toml_with_defaults() {
    let settings = parse_settings("close_activation = \"adjacent\"\n").expect("parse");
    assert_eq!(settings.close_activation, CloseActivation::Adjacent);
    assert_eq!(settings.event_capacity, 1024);

    let settings = parse_settings("event_capacity = 8\nbase_dir = \"/srv/work\"\n").expect("parse");
    assert_eq!(settings.event_capacity, 8);
    assert_eq!(settings.base_dir, Some(PathBuf::from("/srv/work")));
}

#[test]
fn rejects_unknown_policy_in_file() {
    assert!(parse_settings("close_activation = \"random\"\n").is_err());
}

#[test]
fn env_overrides_win_and_invalid_values_are_ignored() {
    let mut settings = Settings::default();
    apply_env_overrides(
        &mut settings,
        lookup_from(&[
            ("APP__EVENT_CAPACITY", "64"),
            ("APP__BASE_DIR", "/home/dev/project"),
            ("APP__CLOSE_ACTIVATION", "Adjacent"),
        ]),
    );
    assert_eq!(settings.event_capacity, 64);
    assert_eq!(settings.base_dir, Some(PathBuf::from("/home/dev/project")));
    assert_eq!(settings.close_activation, CloseActivation::Adjacent);

    apply_env_overrides(
        &mut settings,
        lookup_from(&[
            ("APP__EVENT_CAPACITY", "0"),
            ("APP__BASE_DIR", "  "),
            ("APP__CLOSE_ACTIVATION", "sideways"),
        ]),
    );
    assert_eq!(settings.event_capacity, 64);
    assert_eq!(settings.base_dir, Some(PathBuf::from("/home/dev/project")));
    assert_eq!(settings.close_activation, CloseActivation::Adjacent);
}

#[test]
fn policy_parsing_accepts_dashes() {
    assert_eq!(
        "most-recent".parse::<CloseActivation>(),
        Ok(CloseActivation::MostRecent)
    );
}

#[test]
fn explicit_base_dir_wins_over_working_directory() {
    let settings = Settings {
        base_dir: Some(PathBuf::from("/explicit")),
        ..Settings::default()
    };
    assert_eq!(settings.resolved_base_dir(), PathBuf::from("/explicit"));
}

#[test]
fn loads_settings_file_from_explicit_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("documents.toml");
    std::fs::write(&path, "event_capacity = 16\n").expect("write");

    let settings = load_settings_from(&path).expect("load");
    assert!(settings.event_capacity > 0);

    let missing = load_settings_from(&dir.path().join("absent.toml"));
    assert!(missing.is_err());
}
