use super::data::{path_display, Config, BASE_URL_ENV};
use super::io::ConfigError;
use crate::core::chat_stream::DEFAULT_BASE_URL;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.set_value("base-url", "http://localhost:8080/api").unwrap();
    config.set_value("streaming", "off").unwrap();
    config.save_to_path(&config_path).expect("Failed to save config");

    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded.base_url.as_deref(), Some("http://localhost:8080/api"));
    assert_eq!(loaded.streaming, Some(false));
    assert_eq!(loaded.web_search, None);

    let mut loaded = loaded;
    loaded.unset_value("base-url").unwrap();
    loaded.save_to_path(&config_path).expect("Failed to save config");

    let reloaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(reloaded.base_url, None);
    assert_eq!(reloaded.streaming, Some(false));
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "streaming = \"sometimes\"\n").unwrap();

    let err = Config::load_from_path(&config_path).expect_err("invalid type should fail");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("Failed to parse config at "));
}

#[test]
fn base_url_precedence_is_flag_env_config_default() {
    let config = Config {
        base_url: Some("http://config".to_string()),
        ..Default::default()
    };

    assert_eq!(
        config.resolve_base_url(Some("http://flag"), Some("http://env".to_string())),
        "http://flag"
    );
    assert_eq!(
        config.resolve_base_url(None, Some("http://env".to_string())),
        "http://env"
    );
    assert_eq!(config.resolve_base_url(None, None), "http://config");
    assert_eq!(
        Config::default().resolve_base_url(None, Some("  ".to_string())),
        DEFAULT_BASE_URL
    );
    assert_eq!(BASE_URL_ENV, "HAVEN_API_URL");
}

#[test]
fn chat_options_default_to_on() {
    let options = Config::default().chat_options();
    assert!(options.streaming);
    assert!(options.enable_web_search);
    assert!(options.enable_fact_check);

    let config = Config {
        web_search: Some(false),
        streaming: Some(false),
        ..Default::default()
    };
    let options = config.chat_options();
    assert!(!options.streaming);
    assert!(!options.enable_web_search);
    assert!(options.enable_fact_check);
}

#[test]
fn sessions_path_prefers_flag_then_config() {
    let config = Config {
        sessions_path: Some(PathBuf::from("/tmp/from-config.json")),
        ..Default::default()
    };

    assert_eq!(
        config.sessions_path(Some(Path::new("/tmp/flag.json"))),
        Some(PathBuf::from("/tmp/flag.json"))
    );
    assert_eq!(
        config.sessions_path(None),
        Some(PathBuf::from("/tmp/from-config.json"))
    );
}

#[test]
fn set_value_rejects_unknown_keys_and_bad_switches() {
    let mut config = Config::default();

    let err = config.set_value("theme", "dark").unwrap_err();
    assert!(err.contains("Available keys"));
    assert!(config.set_value("fact-check", "maybe").is_err());
    assert!(config.set_value("base-url", "  ").is_err());
    assert!(config.unset_value("theme").is_err());

    config.set_value("fact-check", "No").unwrap();
    assert_eq!(config.fact_check, Some(false));
}

#[test]
fn test_path_display() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("sessions.json");

    let display = path_display(&path);
    assert!(display.ends_with("sessions.json"));
}
