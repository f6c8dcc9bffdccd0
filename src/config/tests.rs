//! Configuration tests
//!
//! Round-trip guards keep `to_toml()` and the `File*` structs in sync, and
//! the precedence tests pin env > file > defaults.

use super::*;
use crate::race::Checkpoint;
use std::collections::HashMap;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

fn no_env(_: &str) -> Option<String> {
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Round-trip tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let toml_str = config.to_toml();

    let parsed: FileConfig = toml::from_str(&toml_str).unwrap_or_else(|e| {
        panic!("Default config should round-trip.\nTOML:\n{}\nError: {}", toml_str, e)
    });
    let reloaded = Config::from_sources(parsed, no_env).unwrap();

    assert_eq!(reloaded.bind_addr, config.bind_addr);
    assert_eq!(reloaded.db_path, config.db_path);
    assert_eq!(reloaded.broadcast, config.broadcast);
    assert_eq!(reloaded.race, config.race);
    assert_eq!(reloaded.tracker, config.tracker);
    assert_eq!(reloaded.logging, config.logging);
}

#[test]
fn test_config_roundtrip_custom_race() {
    let mut config = Config::default();
    config.race.name = "Night \"Trail\"".to_string();
    config.race.distance_km = 21.1;
    config.race.checkpoints = vec![
        Checkpoint::new("Start", 0.0, 52.0, 4.0),
        Checkpoint::new("Finish", 21.1, 52.1, 4.2),
    ];
    config.race.route = vec![[52.0, 4.0], [52.1, 4.2]];
    config.tracker.buffer_limit = Some(500);
    config.logging.file_rotation = LogRotation::Hourly;

    let toml_str = config.to_toml();
    let parsed: FileConfig = toml::from_str(&toml_str).unwrap_or_else(|e| {
        panic!("Custom config should round-trip.\nTOML:\n{}\nError: {}", toml_str, e)
    });
    let reloaded = Config::from_sources(parsed, no_env).unwrap();

    assert_eq!(reloaded.race, config.race);
    assert_eq!(reloaded.tracker.buffer_limit, Some(500));
    assert_eq!(reloaded.logging.file_rotation, LogRotation::Hourly);
}

#[test]
fn test_template_never_contains_secret() {
    let mut config = Config::default();
    config.ping_secret = Some("hunter2".to_string());
    let toml_str = config.to_toml();
    assert!(!toml_str.contains("hunter2"));
    assert!(!toml_str.contains("ping_secret ="));
}

// ─────────────────────────────────────────────────────────────────────────────
// Precedence tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_defaults_without_file_or_env() {
    let config = Config::from_sources(FileConfig::default(), no_env).unwrap();
    assert_eq!(config.bind_addr.to_string(), "127.0.0.1:3000");
    assert_eq!(config.broadcast.delay_minutes, 0);
    assert_eq!(config.broadcast.poll_interval_secs, 5);
    assert_eq!(config.broadcast.init_batch, 100);
    assert_eq!(config.broadcast.poll_batch, 50);
    assert_eq!(config.race.distance_km, 92.0);
    assert_eq!(config.race.checkpoints.len(), 9);
    assert_eq!(config.tracker.smoothing_window, 3);
    assert!(config.ping_secret.is_none());
}

#[test]
fn test_env_overrides_file() {
    let file: FileConfig = toml::from_str(
        r#"
        bind_addr = "0.0.0.0:8080"
        [broadcast]
        delay_minutes = 2
        "#,
    )
    .unwrap();

    let env = env_from(&[
        ("RACETRACK_BIND", "127.0.0.1:9000"),
        ("RACE_DELAY_MINUTES", "15"),
        ("RACE_PING_SECRET", "s3cret"),
        ("RACETRACK_STREAM_URL", "http://race.example/api/race/stream"),
    ]);
    let config = Config::from_sources(file, env).unwrap();

    assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9000");
    assert_eq!(config.broadcast.delay_minutes, 15);
    assert_eq!(config.ping_secret.as_deref(), Some("s3cret"));
    assert_eq!(
        config.tracker.stream_url,
        "http://race.example/api/race/stream"
    );
}

#[test]
fn test_file_overrides_defaults() {
    let file: FileConfig = toml::from_str(
        r#"
        [broadcast]
        delay_minutes = 2
        [tracker]
        buffer_limit = 0
        smoothing_window = 0
        "#,
    )
    .unwrap();
    let config = Config::from_sources(file, no_env).unwrap();

    assert_eq!(config.broadcast.delay_minutes, 2);
    assert_eq!(config.tracker.buffer_limit, None);
    assert_eq!(config.tracker.smoothing_window, 1);
}

#[test]
fn test_zero_batches_and_reconnect_are_clamped() {
    let file: FileConfig = toml::from_str(
        r#"
        [broadcast]
        init_batch = 0
        poll_batch = 0
        [tracker]
        reconnect_secs = 0
        "#,
    )
    .unwrap();
    let config = Config::from_sources(file, no_env).unwrap();

    assert_eq!(config.broadcast.init_batch, 1);
    assert_eq!(config.broadcast.poll_batch, 1);
    assert_eq!(
        config.tracker.reconnect_delay(),
        std::time::Duration::from_secs(1)
    );
}

#[test]
fn test_empty_secret_counts_as_unset() {
    let config =
        Config::from_sources(FileConfig::default(), env_from(&[("RACE_PING_SECRET", "")])).unwrap();
    assert!(config.ping_secret.is_none());
}

#[test]
fn test_negative_delay_rejected() {
    let result = Config::from_sources(
        FileConfig::default(),
        env_from(&[("RACE_DELAY_MINUTES", "-5")]),
    );
    assert!(result.is_err());
}

#[test]
fn test_invalid_race_start_rejected() {
    let file: FileConfig = toml::from_str(
        r#"
        [race]
        start = "next saturday"
        "#,
    )
    .unwrap();
    assert!(Config::from_sources(file, no_env).is_err());
}

#[test]
fn test_log_rotation_parse() {
    assert_eq!(LogRotation::parse("HOURLY"), LogRotation::Hourly);
    assert_eq!(LogRotation::parse("never"), LogRotation::Never);
    assert_eq!(LogRotation::parse("weekly"), LogRotation::Daily);
}
