//! Tree Configuration
//!
//! Languages, slug limits and position spacing for a content tree. Built
//! once at startup and shared (`Arc`) by the services.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Wildcard language for content that applies to every language
pub const ANY_LANGUAGE: &str = "any";

/// Default maximum slug length
pub const DEFAULT_MAX_SLUG_LENGTH: usize = 40;

/// Default spacing between sibling positions
pub const DEFAULT_POSITION_INTERVAL: i64 = 100;

/// Environment variable holding a comma-separated language list
pub const LANGUAGES_ENV: &str = "SLUGTREE_LANGUAGES";

/// Environment variable holding the default language
pub const DEFAULT_LANGUAGE_ENV: &str = "SLUGTREE_DEFAULT_LANGUAGE";

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a content tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Configured language codes; every node gets one path per language
    pub languages: Vec<String>,

    /// Language used when a call does not name one
    pub default_language: String,

    /// Maximum slug length in characters
    pub max_slug_length: usize,

    /// Spacing between sibling positions
    pub position_interval: i64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            default_language: "en".to_string(),
            max_slug_length: DEFAULT_MAX_SLUG_LENGTH,
            position_interval: DEFAULT_POSITION_INTERVAL,
        }
    }
}

impl TreeConfig {
    /// Configuration with the given languages; the first becomes the default
    pub fn with_languages<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let languages: Vec<String> = languages.into_iter().map(Into::into).collect();
        let default_language = languages
            .first()
            .cloned()
            .unwrap_or_else(|| "en".to_string());
        Self {
            languages,
            default_language,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: TreeConfig = serde_json::from_str(&raw)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Apply `SLUGTREE_LANGUAGES` / `SLUGTREE_DEFAULT_LANGUAGE` overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup
    ///
    /// When only the language list is given, the default language becomes
    /// its first entry unless the current default is part of the list.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(LANGUAGES_ENV) {
            let languages: Vec<String> = raw
                .split(',')
                .map(|l| l.trim().to_lowercase())
                .filter(|l| !l.is_empty())
                .collect();
            if !languages.contains(&self.default_language) {
                if let Some(first) = languages.first() {
                    self.default_language = first.clone();
                }
            }
            self.languages = languages;
        }
        if let Some(default_language) = lookup(DEFAULT_LANGUAGE_ENV) {
            self.default_language = default_language.trim().to_lowercase();
        }
        self.validate().map_err(ConfigError::Invalid)?;
        Ok(self)
    }

    /// Whether `language` is configured
    pub fn has_language(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l == language)
    }

    /// `language` if given, else the default language
    pub fn language_or_default<'a>(&'a self, language: Option<&'a str>) -> &'a str {
        language.unwrap_or(&self.default_language)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.languages.is_empty() {
            return Err("languages cannot be empty".to_string());
        }

        for (i, language) in self.languages.iter().enumerate() {
            if language.is_empty() {
                return Err("language codes cannot be empty".to_string());
            }
            if language == ANY_LANGUAGE {
                return Err(format!("'{}' is reserved and cannot be configured", ANY_LANGUAGE));
            }
            if self.languages[..i].contains(language) {
                return Err(format!("language '{}' is configured twice", language));
            }
        }

        if !self.has_language(&self.default_language) {
            return Err(format!(
                "default_language '{}' is not one of the configured languages",
                self.default_language
            ));
        }

        if self.max_slug_length == 0 {
            return Err("max_slug_length must be greater than 0".to_string());
        }

        if self.position_interval <= 0 {
            return Err("position_interval must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = TreeConfig::default();
        assert_eq!(config.languages, vec!["en".to_string()]);
        assert_eq!(config.default_language, "en");
        assert_eq!(config.max_slug_length, 40);
        assert_eq!(config.position_interval, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = TreeConfig::with_languages(["en", "nl"]);
        assert!(config.validate().is_ok());

        // Invalid: default not configured
        config.default_language = "fr".to_string();
        assert!(config.validate().is_err());

        // Invalid: wildcard configured
        config.default_language = "en".to_string();
        config.languages.push(ANY_LANGUAGE.to_string());
        assert!(config.validate().is_err());

        // Invalid: duplicate language
        config.languages = vec!["en".to_string(), "en".to_string()];
        assert!(config.validate().is_err());

        // Invalid: zero spacing
        config.languages = vec!["en".to_string()];
        config.position_interval = 0;
        assert!(config.validate().is_err());

        config.position_interval = 100;
        config.max_slug_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"languages": ["nl", "en"], "default_language": "nl"}}"#).unwrap();

        let config = TreeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.languages, vec!["nl".to_string(), "en".to_string()]);
        assert_eq!(config.default_language, "nl");
        assert_eq!(config.max_slug_length, 40);
        assert_eq!(config.position_interval, 100);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"languages": ["nl"], "default_language": "en"}}"#).unwrap();
        assert!(matches!(
            TreeConfig::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            TreeConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [(LANGUAGES_ENV, "NL, en ,fr")].into_iter().collect();
        let config = TreeConfig::default()
            .with_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.languages, vec!["nl", "en", "fr"]);
        // "en" is still configured, so it stays the default
        assert_eq!(config.default_language, "en");

        let vars: HashMap<&str, &str> = [(LANGUAGES_ENV, "nl,fr"), (DEFAULT_LANGUAGE_ENV, "fr")]
            .into_iter()
            .collect();
        let config = TreeConfig::default()
            .with_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.default_language, "fr");

        let config = TreeConfig::default()
            .with_env_overrides(|k| (k == LANGUAGES_ENV).then(|| "nl".to_string()))
            .unwrap();
        assert_eq!(config.default_language, "nl");
    }

    #[test]
    fn test_language_or_default() {
        let config = TreeConfig::with_languages(["en", "nl"]);
        assert_eq!(config.language_or_default(None), "en");
        assert_eq!(config.language_or_default(Some("nl")), "nl");
    }
}
