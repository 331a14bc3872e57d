use std::path::PathBuf;

use nesforge_core::{
    AppConfig,
    config::{DocumentConfig, PathsConfig},
};

#[test]
fn partial_config_falls_back_to_defaults() {
    let config = AppConfig::from_toml_str(
        r#"
[document]
default_author = "Chiptune Collective"

[paths]
logs_dir = "var/logs"
"#,
    )
    .expect("partial config should parse");

    assert_eq!(config.document.default_author, "Chiptune Collective");
    assert_eq!(config.document.default_name, DocumentConfig::default().default_name);
    assert!(config.document.create_default_content);
    assert_eq!(config.paths.logs_dir, PathBuf::from("var/logs"));
    assert_eq!(config.paths.autosave_dir, PathsConfig::default().autosave_dir);
    assert_eq!(config.undo, AppConfig::default().undo);
    assert_eq!(config.diagnostics, AppConfig::default().diagnostics);
}

#[test]
fn empty_config_is_the_default() {
    let config = AppConfig::from_toml_str("").expect("empty config should parse");
    assert_eq!(config, AppConfig::default());
}

#[test]
fn malformed_config_is_rejected() {
    let error = AppConfig::from_toml_str("[undo]\nmax_depth = \"lots\"\n")
        .expect_err("string depth is invalid");
    assert!(format!("{error:#}").contains("invalid config TOML"));
}

#[test]
fn config_files_load_from_disk() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("nesforge.config.toml");
    std::fs::write(
        &path,
        "[document]\ndefault_name = \"Session\"\ncreate_default_content = false\n",
    )
    .expect("write config");

    let config = AppConfig::load_from(&path).expect("load config");
    let project = config.new_project();
    assert_eq!(project.name, "Session");
    assert!(project.songs().is_empty());
    assert!(project.instruments().is_empty());

    assert!(AppConfig::load_from(&temp.path().join("absent.toml")).is_err());
}

#[test]
fn default_documents_get_one_song_and_one_instrument() {
    let project = AppConfig::default().new_project();
    assert_eq!(project.songs().len(), 1);
    assert_eq!(project.instruments().len(), 1);
    assert_eq!(project.author, "Unknown");
}

#[test]
fn configs_survive_a_toml_round_trip() {
    let mut config = AppConfig::default();
    config.undo.max_depth = 12;
    config.paths.sample_directories.push(PathBuf::from("extra/dpcm"));

    let text = toml::to_string(&config).expect("serialize config");
    let parsed = AppConfig::from_toml_str(&text).expect("parse config");
    assert_eq!(parsed, config);
}
