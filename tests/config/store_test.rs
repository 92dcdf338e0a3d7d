//! Config file load/save behaviour.

use fancifier::config::{AppConfig, ChatConfig, ConfigStore};

#[test]
fn missing_file_loads_defaults() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let store = ConfigStore::new(dir.path().join("config.toml"));
    assert_eq!(store.load().expect("defaults"), AppConfig::default());
    assert!(store.modified().is_err());
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let store = ConfigStore::new(dir.path().join("nested").join("config.toml"));

    let mut config = AppConfig::default();
    config.default_dry_run = true;
    config.chats.push(ChatConfig {
        chat_id: -100,
        title: "Channel".to_owned(),
        plugin_order: vec!["llm_rewrite".to_owned(), "random_bold".to_owned()],
    });
    store.save(&config).expect("save should succeed");

    assert_eq!(store.load().expect("load should succeed"), config);
    assert!(store.modified().is_ok());
    assert!(!dir.path().join("nested").join("config.toml.tmp").exists());
}

#[test]
fn invalid_config_is_not_written() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("config.toml");
    let store = ConfigStore::new(&path);

    let mut config = AppConfig::default();
    let chat = ChatConfig {
        chat_id: 7,
        title: String::new(),
        plugin_order: Vec::new(),
    };
    config.chats = vec![chat.clone(), chat];

    assert!(store.save(&config).is_err());
    assert!(!path.exists());
}

#[test]
fn unreadable_config_reports_the_path() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "parse_mode = [").expect("write");

    let err = ConfigStore::new(&path).load().expect_err("broken toml");
    assert!(format!("{err:#}").contains("config.toml"));
}
