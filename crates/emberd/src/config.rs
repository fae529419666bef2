//! Configuration file parsing and structures.
//!
//! emberd uses TOML for declarative configuration. Each native integration
//! owns a statically typed section under `[integrations]`; an integration
//! whose section is absent is not started.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

#[cfg(feature = "integration_bloomsky")]
pub use crate::integrations::bloomsky::BloomSkyConfig;
#[cfg(feature = "integration_radiotherm")]
pub use crate::integrations::radiotherm::RadioThermConfig;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `"emberd::integrations::radiotherm" = "debug"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build the per-target filter used by the tracing subscriber
    pub fn targets(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| {
                targets.with_target(target.clone(), LevelFilter::from(*level))
            },
        )
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8565
}

fn default_true() -> bool {
    true
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to listen on
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: default_listen(),
            port: default_port(),
        }
    }
}

/// Integration configuration container
#[derive(Debug, Default, Deserialize)]
pub struct IntegrationsConfig {
    /// BloomSky weather-station cameras
    #[cfg(feature = "integration_bloomsky")]
    #[serde(default)]
    pub bloomsky: Option<BloomSkyConfig>,

    /// Radio Thermostat devices on the local network
    #[cfg(feature = "integration_radiotherm")]
    #[serde(default)]
    pub radiotherm: Option<RadioThermConfig>,
}

/// A config file as written, before sections from several files are combined
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    logging: Option<LoggingConfig>,
    api: Option<ApiConfig>,
    #[serde(default)]
    integrations: IntegrationsConfig,
}

/// Non-fatal finding while loading several config files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub section: String,
    pub ignored: PathBuf,
    pub defined_in: PathBuf,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "section [{}] in {} ignored: already defined in {}",
            self.section,
            self.ignored.display(),
            self.defined_in.display()
        )
    }
}

/// Keep the first definition of a section, recording a warning for later ones
fn merge_section<T>(
    name: &str,
    current: &mut Option<(T, PathBuf)>,
    next: Option<T>,
    path: &Path,
    warnings: &mut Vec<ConfigWarning>,
) {
    let Some(next) = next else {
        return;
    };
    match current {
        Some((_, defined_in)) => warnings.push(ConfigWarning {
            section: name.to_string(),
            ignored: path.to_path_buf(),
            defined_in: defined_in.clone(),
        }),
        None => *current = Some((next, path.to_path_buf())),
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from several TOML files (e.g. base + secrets)
    ///
    /// Sections are combined with first-wins semantics: a section defined by an
    /// earlier file shadows the same section in later files, and every shadowed
    /// definition is reported as a warning.
    pub fn load(paths: &[PathBuf]) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let mut warnings = Vec::new();
        let mut logging = None;
        let mut api = None;
        #[cfg(feature = "integration_bloomsky")]
        let mut bloomsky = None;
        #[cfg(feature = "integration_radiotherm")]
        let mut radiotherm = None;

        for path in paths {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Io(path.clone(), e))?;
            let partial: PartialConfig = toml::from_str(&contents)?;

            merge_section("logging", &mut logging, partial.logging, path, &mut warnings);
            merge_section("api", &mut api, partial.api, path, &mut warnings);
            #[cfg(feature = "integration_bloomsky")]
            merge_section(
                "integrations.bloomsky",
                &mut bloomsky,
                partial.integrations.bloomsky,
                path,
                &mut warnings,
            );
            #[cfg(feature = "integration_radiotherm")]
            merge_section(
                "integrations.radiotherm",
                &mut radiotherm,
                partial.integrations.radiotherm,
                path,
                &mut warnings,
            );
        }

        let config = Config {
            logging: logging.map(|(l, _)| l).unwrap_or_default(),
            api: api.map(|(a, _)| a).unwrap_or_default(),
            integrations: IntegrationsConfig {
                #[cfg(feature = "integration_bloomsky")]
                bloomsky: bloomsky.map(|(b, _)| b),
                #[cfg(feature = "integration_radiotherm")]
                radiotherm: radiotherm.map(|(r, _)| r),
            },
        };
        config.validate()?;

        Ok((config, warnings))
    }

    /// Validate the configuration, reporting every problem at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems: Vec<String> = Vec::new();

        if self.api.enabled && self.api.port == 0 {
            problems.push("api.port must not be 0".to_string());
        }

        #[cfg(feature = "integration_bloomsky")]
        if let Some(bloomsky) = &self.integrations.bloomsky {
            problems.extend(bloomsky.validate());
        }

        #[cfg(feature = "integration_radiotherm")]
        if let Some(radiotherm) = &self.integrations.radiotherm {
            problems.extend(radiotherm.validate());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.api.enabled);
        assert_eq!(config.api.listen, "127.0.0.1");
        assert_eq!(config.api.port, 8565);
        assert!(config.integrations.bloomsky.is_none());
        assert!(config.integrations.radiotherm.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [logging]
            level = "debug"

            [logging.overrides]
            "emberd::api" = "warn"

            [api]
            listen = "0.0.0.0"
            port = 9000

            [integrations.bloomsky]
            api_key = "secret"

            [integrations.radiotherm]
            host = ["192.168.1.40", "192.168.1.41"]
            hold_temp = true
            away_delta = 6
        "#;

        let config: Config = toml.parse().unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.overrides["emberd::api"], LogLevel::Warn);
        assert_eq!(config.api.port, 9000);

        let bloomsky = config.integrations.bloomsky.as_ref().unwrap();
        assert_eq!(bloomsky.api_key, "secret");
        assert_eq!(bloomsky.min_refresh_secs, 300);

        let radiotherm = config.integrations.radiotherm.as_ref().unwrap();
        assert_eq!(
            radiotherm.hosts(),
            Some(&["192.168.1.40".to_string(), "192.168.1.41".to_string()][..])
        );
        assert!(radiotherm.hold_temp);
        assert_eq!(radiotherm.away_delta, 6.0);
        assert_eq!(radiotherm.scan_interval_secs, 30);
    }

    #[test]
    fn test_invalid_values_are_all_reported() {
        let toml = r#"
            [integrations.bloomsky]
            api_key = ""

            [integrations.radiotherm]
            away_delta = -2
            scan_interval_secs = 0
        "#;

        let err = toml.parse::<Config>().unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"Invalid configuration: integrations.bloomsky.api_key must not be empty; integrations.radiotherm.away_delta must be a non-negative number; integrations.radiotherm.scan_interval_secs must be at least 1");
    }

    #[test]
    fn test_load_merges_sections_first_wins() {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path().join("base.toml");
        let secrets_path = temp_dir.path().join("secrets.toml");

        fs::write(
            &base_path,
            r#"
            [logging]
            level = "warn"

            [integrations.radiotherm]
            host = "10.0.0.5"
            "#,
        )
        .unwrap();

        fs::write(
            &secrets_path,
            r#"
            [logging]
            level = "trace"

            [integrations.bloomsky]
            api_key = "from-secrets"
            "#,
        )
        .unwrap();

        let (config, warnings) = Config::load(&[base_path.clone(), secrets_path.clone()]).unwrap();

        assert_eq!(config.logging.level, LogLevel::Warn);
        assert_eq!(
            config.integrations.bloomsky.as_ref().unwrap().api_key,
            "from-secrets"
        );
        assert_eq!(
            config.integrations.radiotherm.as_ref().unwrap().hosts(),
            Some(&["10.0.0.5".to_string()][..])
        );

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].section, "logging");
        assert_eq!(warnings[0].ignored, secrets_path);
        assert_eq!(warnings[0].defined_in, base_path);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");

        let err = Config::from_file(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Io(ref path, _) if path == &missing));
    }
}
