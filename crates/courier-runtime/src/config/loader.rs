//! Layered `CourierConfig` loading on top of figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables TOML files (`courier.toml`)
//! - `yaml-config`: enables YAML files (`courier.yaml`, `courier.yml`)
//!
//! # Layers, lowest first
//!
//! 1. Built-in defaults
//! 2. Programmatic merges ([`ConfigLoader::merge`])
//! 3. Profile-specific file (`courier.{profile}.toml`)
//! 4. Main file (`courier.toml`)
//! 5. Environment variables (`COURIER_*`)
//!
//! # Environment overrides
//!
//! Variables use the `COURIER_` prefix with `__` as the nesting separator:
//!
//! - `COURIER_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `COURIER_BROKER__DEFAULT_TIMEOUT_MS=500` → `broker.default_timeout_ms = 500`
//! - `COURIER_ROUTING__STRICT=true` → `routing.strict = true`
//!
//! `COURIER_PROFILE` selects the profile and is not mapped into the schema.
//!
//! # Example
//!
//! ```rust,ignore
//! use courier_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("staging")
//!     .search_path("/etc/courier")
//!     .load()?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::CourierConfig;
use super::validation::validate_config;

/// Prefix of the environment variables read by the loader.
pub const ENV_PREFIX: &str = "COURIER_";

const CONFIG_EXTENSIONS: &[&str] = &[
    #[cfg(feature = "toml-config")]
    "toml",
    #[cfg(feature = "yaml-config")]
    "yaml",
    #[cfg(feature = "yaml-config")]
    "yml",
];

/// Selects the `courier.{profile}.*` variant merged under the base file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    /// Any other name, lowercased.
    Custom(String),
}

impl Profile {
    /// The name used in file names.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting the usual short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_owned()),
        }
    }

    /// Reads `COURIER_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("COURIER_PROFILE")
            .map(|name| Self::parse(&name))
            .unwrap_or_default()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layered configuration loader.
pub struct ConfigLoader {
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader reading the profile from the environment.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Overrides the profile read from `COURIER_PROFILE`.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to search, replacing the default locations.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds the user config directory (`~/.config/courier` on Linux).
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("courier")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables environment variables (the default).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a programmatic configuration over the built-in defaults.
    ///
    /// Files and environment variables still override it.
    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and validates the configuration.
    pub fn load(self) -> ConfigResult<CourierConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: CourierConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            strict_routing = config.routing.strict,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(CourierConfig::default()))
            .merge(std::mem::take(&mut self.figment));

        let files = match &self.config_file {
            Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.clone())),
            Some(path) => vec![path.clone()],
            None => self.discover_files(),
        };
        if files.is_empty() {
            warn!("No courier configuration file found, running on defaults");
        }
        for path in &files {
            info!(path = %path.display(), "Merging configuration file");
            figment = Self::merge_config_file(figment, path)?;
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Merging environment overrides");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__"));
        }

        Ok(figment)
    }

    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        match path.extension().and_then(|ext| ext.to_str()) {
            #[cfg(feature = "toml-config")]
            Some("toml") => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            Some("yaml" | "yml") => Ok(figment.merge(Yaml::file(path))),
            other => Err(ConfigError::ParseError(format!(
                "no enabled format reads '{}' files",
                other.unwrap_or_default()
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("courier")))
            .collect()
    }

    /// Collects files in merge order. Profile variants come before the first
    /// `courier.{ext}` found, which ends the search.
    fn discover_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for dir in self.resolve_search_paths() {
            for ext in CONFIG_EXTENSIONS {
                let variant = dir.join(format!("courier.{}.{ext}", self.profile));
                if variant.exists() {
                    debug!(
                        path = %variant.display(),
                        profile = %self.profile,
                        "Found profile file"
                    );
                    files.push(variant);
                }

                let base = dir.join(format!("courier.{ext}"));
                if base.exists() {
                    files.push(base);
                    return files;
                }
            }
        }
        files
    }
}

/// Loads configuration from the current and user config directories.
pub fn load_config() -> ConfigResult<CourierConfig> {
    ConfigLoader::new()
        .with_current_dir()
        .with_user_config_dir()
        .load()
}

/// Loads configuration from one file plus environment variables.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<CourierConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;

    /// A scratch directory removed on drop.
    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "courier-config-{name}-{}",
                std::process::id()
            ));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn write(&self, file: &str, contents: &str) -> PathBuf {
            let path = self.0.join(file);
            std::fs::write(&path, contents).unwrap();
            path
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_default_config() {
        let scratch = ScratchDir::new("defaults");
        let config = ConfigLoader::new()
            .without_env()
            .search_path(&scratch.0)
            .load()
            .unwrap();

        assert_eq!(config.logging.level.as_str(), "info");
        assert_eq!(config.broker.default_timeout_ms, 30000);
        assert!(!config.routing.strict);
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("prod"), Profile::Production);
        assert_eq!(Profile::parse("Dev"), Profile::Development);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
    }

    #[test]
    fn test_programmatic_merge() {
        let scratch = ScratchDir::new("merge");
        let mut overrides = CourierConfig::default();
        overrides.routing.strict = true;
        overrides.features.enabled = vec!["x".into()];

        let config = ConfigLoader::new()
            .without_env()
            .search_path(&scratch.0)
            .merge(overrides)
            .load()
            .unwrap();

        assert!(config.routing.strict);
        assert_eq!(config.features.enabled, vec!["x"]);
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new()
            .without_env()
            .file("/definitely/not/here/courier.toml")
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_is_overridden_by_base_file() {
        let scratch = ScratchDir::new("profile");
        scratch.write(
            "courier.staging.toml",
            "[logging]\nlevel = \"trace\"\n\n[broker]\nreply_grace_ms = 42\n",
        );
        scratch.write("courier.toml", "[logging]\nlevel = \"warn\"\n");

        let config = ConfigLoader::new()
            .without_env()
            .profile("staging")
            .search_path(&scratch.0)
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(config.broker.reply_grace_ms, 42);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_invalid_file_fails_validation() {
        let scratch = ScratchDir::new("invalid");
        let path = scratch.write("courier.toml", "[broker]\nsweep_interval_ms = 0\n");

        let result = ConfigLoader::new().without_env().file(path).load();
        assert!(matches!(result, Err(ConfigError::ZeroDuration { .. })));
    }
}
