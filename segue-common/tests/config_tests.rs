//! Integration tests for configuration file resolution

use segue_common::config::{load_toml, resolve_config_path, ConfigSource};
use serde::Deserialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Default, Deserialize, PartialEq)]
struct PlaybackSection {
    #[serde(default)]
    crossfade_ms: u64,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
struct FileConfig {
    #[serde(default)]
    playback: PlaybackSection,
}

#[test]
fn test_env_var_used_when_no_cli_argument() {
    // Unique variable name per test, tests in this binary run concurrently
    let var = "SEGUE_CONFIG_TEST_ENV_ONLY";
    std::env::set_var(var, "/tmp/segue-from-env.toml");

    let source = resolve_config_path(None, var, "segue-config-test-app");
    assert_eq!(source, ConfigSource::Explicit("/tmp/segue-from-env.toml".into()));

    std::env::remove_var(var);
}

#[test]
fn test_cli_argument_beats_env_var() {
    let var = "SEGUE_CONFIG_TEST_CLI_WINS";
    std::env::set_var(var, "/tmp/segue-from-env.toml");

    let source = resolve_config_path(Some(Path::new("/tmp/cli.toml")), var, "segue-config-test-app");
    assert_eq!(source.path(), Some(Path::new("/tmp/cli.toml")));

    std::env::remove_var(var);
}

#[test]
fn test_empty_env_var_is_ignored() {
    let var = "SEGUE_CONFIG_TEST_EMPTY";
    std::env::set_var(var, "");

    // App name nobody has a config directory for
    let source = resolve_config_path(None, var, "segue-config-test-app-without-files");
    assert_eq!(source, ConfigSource::Defaults);

    std::env::remove_var(var);
}

#[test]
fn test_nested_tables_load_with_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[playback]\ncrossfade_ms = 4000").unwrap();

    let loaded: FileConfig = load_toml(&ConfigSource::Explicit(file.path().to_path_buf())).unwrap();
    assert_eq!(loaded.playback.crossfade_ms, 4000);

    let mut empty = tempfile::NamedTempFile::new().unwrap();
    writeln!(empty, "# nothing configured").unwrap();
    let loaded: FileConfig = load_toml(&ConfigSource::Explicit(empty.path().to_path_buf())).unwrap();
    assert_eq!(loaded, FileConfig::default());
}
