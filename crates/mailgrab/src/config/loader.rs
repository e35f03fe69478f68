use std::path::Path;

use log::info;

use crate::config::schema::Config;
use crate::error::ConfigError;

/// Loads the config file, writing defaults out first if it is missing.
///
/// A file that exists but is not valid YAML is a hard error; we never
/// silently fall back to defaults over a broken config.
pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    if !path.exists() {
        let config = Config::default();
        write_defaults(path, &config)?;
        info!("Config file '{}' not found, wrote defaults", path.display());
        return Ok(config);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: Config = serde_yaml::from_str(&content)?;
    info!("Loaded config from '{}'", path.display());
    Ok(config)
}

fn write_defaults(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteDefaults {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(path, yaml).map_err(|e| ConfigError::WriteDefaults {
        path: path.to_path_buf(),
        source: e,
    })
}

/// CLI-supplied overrides. Each field replaces the corresponding
/// config field for this run only; `None` leaves the config value.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub query: Option<String>,
    pub file_types: Option<String>,
    pub dry_run: bool,
}

impl Config {
    /// Applies CLI overrides field-by-field. No cross-validation: an
    /// unmatched file-type entry simply never matches anything later.
    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(query) = &overrides.query {
            self.search.query = query.clone();
        }
        if let Some(file_types) = &overrides.file_types {
            self.search.file_types = file_types.clone();
        }
        if overrides.dry_run {
            self.search.dry_run = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let config = load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.search.query, "has:attachment");

        // The written file must round-trip to the same defaults.
        let reloaded = load_or_init(&path).unwrap();
        assert_eq!(reloaded.search.query, config.search.query);
        assert_eq!(reloaded.logging.log_level, config.logging.log_level);
    }

    #[test]
    fn test_malformed_yaml_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "search: [not: a: mapping").unwrap();

        let result = load_or_init(&path);
        assert!(matches!(result, Err(ConfigError::ParseYaml(_))));
    }

    #[test]
    fn test_overrides_apply_field_by_field() {
        let mut config = Config::default();
        config.apply_overrides(&CliOverrides {
            query: Some("from:alice".to_string()),
            file_types: None,
            dry_run: true,
        });

        assert_eq!(config.search.query, "from:alice");
        assert!(config.search.dry_run);
        // Untouched field keeps its config value.
        assert_eq!(config.search.file_types, "");
    }

    #[test]
    fn test_dry_run_flag_never_unsets_config() {
        let mut config = Config::default();
        config.search.dry_run = true;
        config.apply_overrides(&CliOverrides::default());
        assert!(config.search.dry_run);
    }
}
