//! Configuration file resolution and loading
//!
//! Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`<config dir>/<app>/config.toml`)
//! 4. System config file (`/etc/<app>/config.toml`, Linux only)
//! 5. Built-in defaults (fallback)
//!
//! An explicitly named file (1 or 2) must exist. A missing file at one of the
//! discovered locations is not an error; built-in defaults apply instead.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Name of the configuration file inside the per-app config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named on the command line or through the environment
    Explicit(PathBuf),
    /// Found at a well-known location
    Discovered(PathBuf),
    /// No file; use built-in defaults
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Explicit(path) | ConfigSource::Discovered(path) => Some(path),
            ConfigSource::Defaults => None,
        }
    }
}

/// Resolve the configuration file for `app_name`
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    app_name: &str,
) -> ConfigSource {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return ConfigSource::Explicit(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return ConfigSource::Explicit(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    if let Some(path) = dirs::config_dir().map(|d| d.join(app_name).join(CONFIG_FILE_NAME)) {
        if path.exists() {
            return ConfigSource::Discovered(path);
        }
    }

    // Priority 4: System config file
    if cfg!(target_os = "linux") {
        let path = PathBuf::from("/etc").join(app_name).join(CONFIG_FILE_NAME);
        if path.exists() {
            return ConfigSource::Discovered(path);
        }
    }

    ConfigSource::Defaults
}

/// Load and deserialize a TOML file according to its source
///
/// Explicit sources must be readable. Discovered sources that vanished
/// between resolution and loading fall back to defaults with a warning.
pub fn load_toml<T>(source: &ConfigSource) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let path = match source {
        ConfigSource::Defaults => {
            info!("No configuration file found, using built-in defaults");
            return Ok(T::default());
        }
        ConfigSource::Explicit(path) | ConfigSource::Discovered(path) => path,
    };

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if matches!(source, ConfigSource::Discovered(_)) => {
            warn!("Config file {:?} unreadable ({}), using built-in defaults", path, e);
            return Ok(T::default());
        }
        Err(e) => {
            return Err(Error::Config(format!("Failed to read config file {:?}: {}", path, e)));
        }
    };

    let parsed = toml::from_str(&contents)?;
    info!("Loaded configuration from {:?}", path);
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        level: u32,
    }

    #[test]
    fn test_cli_argument_wins() {
        let source = resolve_config_path(Some(Path::new("/tmp/x.toml")), "SEGUE_TEST_UNSET_VAR", "segue");
        assert_eq!(source, ConfigSource::Explicit(PathBuf::from("/tmp/x.toml")));
    }

    #[test]
    fn test_defaults_source_yields_default() {
        let loaded: Sample = load_toml(&ConfigSource::Defaults).unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = ConfigSource::Explicit(dir.path().join("missing.toml"));
        let result: Result<Sample> = load_toml(&source);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_discovered_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let source = ConfigSource::Discovered(dir.path().join("missing.toml"));
        let loaded: Sample = load_toml(&source).unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_loads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"segue\"\nlevel = 3").unwrap();

        let source = ConfigSource::Explicit(file.path().to_path_buf());
        let loaded: Sample = load_toml(&source).unwrap();
        assert_eq!(loaded, Sample { name: "segue".to_string(), level: 3 });
    }

    #[test]
    fn test_parse_error_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "level = \"not a number\"").unwrap();

        let source = ConfigSource::Explicit(file.path().to_path_buf());
        let result: Result<Sample> = load_toml(&source);
        assert!(matches!(result, Err(Error::Toml(_))));
    }
}
