use kart_steward::config::StewardConfig;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = StewardConfig::default();

    assert_eq!(config.storage.pool_size, 4);
    assert_eq!(config.storage.busy_timeout_ms, 5_000);

    assert_eq!(config.rules.warning_expiry_minutes, 180);
    assert_eq!(config.rules.penalty_threshold, 3);
    assert_eq!(config.rules.accumulated_penalty, "5 sec Stop & Go");

    assert_eq!(config.ledger.max_page_size, 1000);
    assert_eq!(config.ledger.default_page_size, 50);

    assert!(config.notification.enabled);
    assert!(!config.notification.event_log);
    assert!(config.notification.hook_command.is_none());

    assert!(config.export.dir.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_derived_paths() {
    let config = StewardConfig::with_data_dir("/srv/steward");

    assert_eq!(
        config.control_db_path().to_str(),
        Some("/srv/steward/control.sqlite")
    );
    assert_eq!(config.sessions_dir().to_str(), Some("/srv/steward/sessions"));
    assert_eq!(config.logs_dir().to_str(), Some("/srv/steward/logs"));
    assert_eq!(
        config.export_dir().to_str(),
        Some("/srv/steward/session_exports")
    );
}

#[test]
fn test_validation_collects_every_problem() {
    let mut config = StewardConfig::default();
    config.storage.pool_size = 0;
    config.rules.penalty_threshold = 0;
    config.ledger.default_page_size = 2000;

    let message = config.validate().unwrap_err().to_string();
    assert!(message.contains("pool_size"));
    assert!(message.contains("penalty_threshold"));
    assert!(message.contains("default_page_size"));
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config: StewardConfig = toml::from_str(
        r#"
        [rules]
        penalty_threshold = 4

        [notification]
        event_log = true
        "#,
    )
    .unwrap();

    assert_eq!(config.rules.penalty_threshold, 4);
    assert_eq!(config.rules.warning_expiry_minutes, 180);
    assert!(config.notification.event_log);
    assert!(config.notification.enabled);
}

#[tokio::test]
async fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let mut config = StewardConfig::with_data_dir(dir.path());
    config.rules.accumulated_penalty = "Drive through".to_string();
    config.ledger.default_page_size = 25;
    config.save().await.unwrap();

    let loaded = StewardConfig::load(dir.path()).await.unwrap();
    assert_eq!(loaded.rules.accumulated_penalty, "Drive through");
    assert_eq!(loaded.ledger.default_page_size, 25);
    assert_eq!(loaded.storage.data_dir, dir.path());
}

#[tokio::test]
async fn test_load_rejects_invalid_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[ledger]\nmax_page_size = 0\n",
    )
    .unwrap();

    assert!(StewardConfig::load(dir.path()).await.is_err());
}
