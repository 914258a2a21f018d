use queuectl::config::{Config, Settings};
use queuectl::error::Error;

// Environment variables are process-global, so every env case lives in
// one test to keep parallel test threads from interfering.
#[test]
fn config_from_env_defaults_and_overrides() {
    unsafe {
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("QUEUECTL_SETTINGS");
        std::env::remove_var("OTEL_ENDPOINT");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.database_url, "sqlite://queuectl.db");
    assert_eq!(config.settings_path.to_str(), Some("queuectl.toml"));
    assert!(config.otel_endpoint.is_none());
    assert!(!config.log_level.is_empty());

    unsafe {
        std::env::set_var("DATABASE_URL", "sqlite:///tmp/other.db");
        std::env::set_var("QUEUECTL_SETTINGS", "/etc/queuectl.toml");
        std::env::set_var("OTEL_ENDPOINT", "");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.database_url, "sqlite:///tmp/other.db");
    assert_eq!(config.settings_path.to_str(), Some("/etc/queuectl.toml"));
    assert!(config.otel_endpoint.is_none());

    unsafe {
        std::env::set_var("DATABASE_URL", "  ");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    unsafe {
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("QUEUECTL_SETTINGS");
        std::env::remove_var("OTEL_ENDPOINT");
    }
}

#[test]
fn missing_settings_file_means_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.max_retries, 3);
    assert_eq!(settings.backoff_base, 2);
}

#[test]
fn settings_survive_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queuectl.toml");

    let mut settings = Settings::default();
    settings.set("max_retries", "5").unwrap();
    settings.set("backoff_base", "3").unwrap();
    settings.save(&path).unwrap();

    let loaded = Settings::load(&path).unwrap();
    assert_eq!(loaded.get("max_retries").unwrap(), 5);
    assert_eq!(loaded.get("backoff_base").unwrap(), 3);
    assert_eq!(loaded.get("lease_secs").unwrap(), 30);
}

#[test]
fn partial_settings_file_fills_in_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queuectl.toml");
    std::fs::write(&path, "max_retries = 7\n").unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.max_retries, 7);
    assert_eq!(settings.poll_interval_secs, 2);
}

#[test]
fn invalid_settings_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queuectl.toml");

    for content in [
        "max_retries = \"three\"\n",
        "backoff_base = 0\n",
        "colour = 1\n",
        "lease_secs = 320000000000\n",
        "poll_interval_secs = 86401\n",
        "not toml at all",
    ] {
        std::fs::write(&path, content).unwrap();
        assert!(
            matches!(Settings::load(&path), Err(Error::Config(_))),
            "accepted: {content:?}"
        );
    }
}

#[test]
fn oversized_lease_is_rejected_by_set() {
    let mut settings = Settings::default();
    assert!(matches!(
        settings.set("lease_secs", "320000000000"),
        Err(Error::Config(_))
    ));
    assert_eq!(settings.lease_secs, 30);
    settings.set("lease_secs", "86400").unwrap();
    assert_eq!(settings.lease_secs, 86_400);
}
