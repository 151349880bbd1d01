// tests/config_env.rs
use std::io::Write;

use digest_curator::config::{
    ENV_COGNITIVE_BUDGET, ENV_CONFIG_PATH, ENV_TIME_BUDGET_SECS, ENV_WINDOW_DAYS,
};
use digest_curator::PipelineConfig;
use serial_test::serial;

fn clear_env() {
    for k in [
        ENV_CONFIG_PATH,
        ENV_WINDOW_DAYS,
        ENV_COGNITIVE_BUDGET,
        ENV_TIME_BUDGET_SECS,
    ] {
        std::env::remove_var(k);
    }
}

#[test]
#[serial]
fn loads_explicit_file_then_env_overrides() {
    clear_env();
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(
        f,
        r#"
[dedup]
window_days = 3
content_threshold = 0.8

[ranking]
topic = 0.5
author = 0.0

[digest]
cognitive_budget = 5
"#
    )
    .unwrap();

    std::env::set_var(ENV_CONFIG_PATH, f.path());
    std::env::set_var(ENV_COGNITIVE_BUDGET, "9");
    std::env::set_var(ENV_TIME_BUDGET_SECS, "not-a-number");

    let cfg = PipelineConfig::load().unwrap();
    assert_eq!(cfg.dedup.window_days, 3);
    assert!((cfg.dedup.content_threshold - 0.8).abs() < f32::EPSILON);
    assert!((cfg.ranking.topic - 0.5).abs() < f32::EPSILON);
    assert_eq!(cfg.ranking.author, 0.0);
    assert_eq!(cfg.digest.cognitive_budget, 9);
    assert_eq!(cfg.digest.time_budget_secs, 180.0);
    clear_env();
}

#[test]
#[serial]
fn missing_explicit_file_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var(ENV_CONFIG_PATH, dir.path().join("nope.toml"));
    assert!(PipelineConfig::load().is_err());
    clear_env();
}

#[test]
#[serial]
fn window_override_is_clamped() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("digest.toml");
    std::fs::write(&path, "").unwrap();
    std::env::set_var(ENV_CONFIG_PATH, &path);
    std::env::set_var(ENV_WINDOW_DAYS, "0");
    let cfg = PipelineConfig::load().unwrap();
    assert_eq!(cfg.dedup.window_days, 1);
    clear_env();
}
