//! Integration tests for shunt-config
//!
//! These tests verify the full config loading pipeline with real file system operations.

use shunt_config::{
    ColorChoice, Config, ConfigError, LogLevel, MatchKind, ReadPolicy, ShrinkPolicy, ENV_CONFIG,
    ENV_REDIRECT_CONTENT, ENV_REDIRECT_PATH,
};
use std::path::Path;
use tempfile::tempdir;

fn no_env(_: &str) -> Option<String> {
    None
}

/// Test config loading from real global config file
#[test]
fn test_load_global_config_from_file() {
    let temp = tempdir().unwrap();
    let global = temp.path().join("config.toml");
    std::fs::write(
        &global,
        r#"
[accounting]
color = "never"
shrink = "overwrite"

[redirect]
capacity = 8
reads = "repeat"

[[redirect.rules]]
path = ".txt"
match = "suffix"
content = "fake"

[log]
level = "debug"
"#,
    )
    .unwrap();

    let config = Config::load_from(Some(&global), &temp.path().join("missing.toml"), no_env).unwrap();

    assert_eq!(config.accounting.color, ColorChoice::Never);
    assert_eq!(config.accounting.shrink, ShrinkPolicy::Overwrite);
    assert_eq!(config.redirect.capacity, 8);
    assert_eq!(config.redirect.reads, ReadPolicy::Repeat);
    assert_eq!(config.redirect.rules[0].matching, MatchKind::Suffix);
    assert_eq!(config.log.level, LogLevel::Debug);
}

/// Test config hierarchy: project config overrides global
#[test]
fn test_config_hierarchy_project_overrides_global() {
    let temp = tempdir().unwrap();
    let global = temp.path().join("global.toml");
    let project = temp.path().join("project.toml");

    std::fs::write(
        &global,
        r#"
[accounting]
report = false

[[redirect.rules]]
path = "global.txt"
content = "from global"
"#,
    )
    .unwrap();
    std::fs::write(
        &project,
        r#"
[[redirect.rules]]
path = "project.txt"
content = "from project"
"#,
    )
    .unwrap();

    let config = Config::load_from(Some(&global), &project, no_env).unwrap();

    // Project rules replace global rules; untouched sections survive.
    assert_eq!(config.redirect.rules.len(), 1);
    assert_eq!(config.redirect.rules[0].path, "project.txt");
    assert!(!config.accounting.report);
}

#[test]
fn test_explicit_config_file_and_env_rule() {
    let temp = tempdir().unwrap();
    let explicit = temp.path().join("explicit.toml");
    std::fs::write(&explicit, "[redirect]\ncapacity = 2\n").unwrap();
    let explicit_str = explicit.display().to_string();

    let env = |key: &str| match key {
        k if k == ENV_CONFIG => Some(explicit_str.clone()),
        k if k == ENV_REDIRECT_PATH => Some("data.txt".to_string()),
        k if k == ENV_REDIRECT_CONTENT => Some("override".to_string()),
        _ => None,
    };

    let config = Config::load_from(None, Path::new("/nonexistent/.shunt/config.toml"), env).unwrap();
    assert_eq!(config.redirect.capacity, 2);
    assert_eq!(config.redirect.rules.len(), 1);
    assert_eq!(config.redirect.rules[0].content.as_deref(), Some("override"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp = tempdir().unwrap();
    let project = temp.path().join("config.toml");
    std::fs::write(
        &project,
        r#"
[[redirect.rules]]
path = "data.txt"
"#,
    )
    .unwrap();

    let err = Config::load_from(None, &project, no_env).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let temp = tempdir().unwrap();
    let project = temp.path().join("config.toml");
    std::fs::write(&project, "[redirect\ncapacity = ").unwrap();

    let err = Config::load_from(None, &project, no_env).unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn test_default_toml_round_trips() {
    let text = Config::default_toml().unwrap();
    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed, Config::default());
}
