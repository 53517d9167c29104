use biostudio::config::{AppConfig, ConfigManager};
use biostudio::Args;
use clap::Parser;
use std::fs;
use tempfile::TempDir;

// Helper to create a temporary config directory for testing
fn setup_test_config_dir() -> (TempDir, ConfigManager) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_manager = ConfigManager::with_dir(temp_dir.path().to_path_buf());
    (temp_dir, config_manager)
}

fn write_config(manager: &ConfigManager, content: &str) -> std::path::PathBuf {
    manager.ensure_config_dir().unwrap();
    let path = manager.config_path("config.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.version, "0.1");

    assert_eq!(config.backend.base_url, "http://localhost:8000");
    assert_eq!(config.backend.dataset_version, "latest");
    assert_eq!(config.backend.timeout_secs, 30);

    assert_eq!(config.session.page_size, 100);
    assert_eq!(config.session.default_column_order, 5);
    assert_eq!(config.session.id_column, "sample_id");

    assert_eq!(config.charts.histogram_bins, None);
    assert_eq!(config.charts.label_max_len, 10);

    assert_eq!(config.theme.colors.panel_border, "cyan");
    assert_eq!(config.theme.series.len(), 8);

    assert_eq!(config.logging.level, "warn");
    assert!(!config.logging.json);
    assert!(!config.debug.enabled);

    assert!(config.validate().is_ok());
}

#[test]
fn test_generate_default_config() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    let template = config_manager.generate_default_config();

    for section in [
        "[backend]",
        "[session]",
        "[charts]",
        "[theme]",
        "[theme.colors]",
        "[logging]",
        "[debug]",
    ] {
        assert!(template.contains(section), "template is missing {section}");
    }
    assert!(template.contains("version = \"0.1\""));
}

#[test]
fn test_write_default_config() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    let config_path = config_manager
        .write_default_config(false)
        .expect("Failed to write config");
    assert!(config_path.exists());

    // The written template loads back to the defaults
    let loaded = AppConfig::from_file(&config_path).expect("Failed to parse template");
    assert_eq!(loaded, AppConfig::default());
}

#[test]
fn test_write_default_config_requires_force() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    config_manager.write_default_config(false).unwrap();
    let err = config_manager.write_default_config(false).unwrap_err();
    assert!(err.to_string().contains("--force"));

    assert!(config_manager.write_default_config(true).is_ok());
}

#[test]
fn test_partial_config_keeps_defaults() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    let path = write_config(
        &config_manager,
        r##"
[session]
page_size = 250

[charts]
histogram_bins = 12

[theme.colors]
panel_border = "#336699"
"##,
    );

    let file = AppConfig::from_file(&path).unwrap();
    let mut config = AppConfig::default();
    config.merge(file);

    assert_eq!(config.session.page_size, 250);
    assert_eq!(config.session.id_column, "sample_id");
    assert_eq!(config.charts.histogram_bins, Some(12));
    assert_eq!(config.charts.label_max_len, 10);
    assert_eq!(config.theme.colors.panel_border, "#336699");
    assert_eq!(config.theme.colors.panel_border_active, "yellow");
    assert!(config.validate().is_ok());
}

#[test]
fn test_merge_only_overrides_non_defaults() {
    let mut base = AppConfig::default();
    base.backend.base_url = "https://studio.example.org".to_string();
    base.logging.level = "info".to_string();

    let mut other = AppConfig::default();
    other.backend.timeout_secs = 5;
    other.debug.enabled = true;
    base.merge(other);

    assert_eq!(base.backend.base_url, "https://studio.example.org");
    assert_eq!(base.backend.timeout_secs, 5);
    assert_eq!(base.logging.level, "info");
    assert!(base.debug.enabled);
}

#[test]
fn test_invalid_toml_is_reported_with_path() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    let path = write_config(&config_manager, "[session\npage_size = ");

    let err = AppConfig::from_file(&path).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Failed to parse config file"));
    assert!(message.contains("config.toml"));
}

#[test]
fn test_validation_errors() {
    let mut config = AppConfig::default();
    config.version = "0.3".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.backend.base_url = "localhost:8000".to_string();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("base_url"));

    let mut config = AppConfig::default();
    config.session.page_size = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.charts.histogram_bins = Some(0);
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.theme.color_mode = "neon".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.theme.colors.axis = "not_a_color".to_string();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("axis"));

    let mut config = AppConfig::default();
    config.theme.series.clear();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.logging.level = "biostudio=verbose".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_command_line_overrides() {
    let args = Args::parse_from([
        "biostudio",
        "brca",
        "--base-url",
        "https://studio.example.org",
        "--dataset-version",
        "2024-01",
        "--page-size",
        "20",
        "--log-level",
        "debug",
        "--log-json",
        "--debug",
    ]);
    let mut config = AppConfig::default();
    config.apply_args(&args);

    assert_eq!(config.backend.base_url, "https://studio.example.org");
    assert_eq!(config.backend.dataset_version, "2024-01");
    assert_eq!(config.session.page_size, 20);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
    assert!(config.debug.enabled);

    let options = config.session_options();
    assert_eq!(options.page_size, 20);
    assert_eq!(options.id_column.as_deref(), Some("sample_id"));
}
