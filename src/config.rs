//! Declarative rule configuration.
//!
//! Redirection rules can be described in a TOML document, one `[[rule]]`
//! table per rule, and fed into a director builder. Only the rule surface is
//! configured here; validation stays with the builder so that a hand-built
//! and a configured rule set go through identical checks.
//!
//! ```toml
//! [[rule]]
//! name = "Saves"
//! origin_directory = 'C:\Game\Saves'
//! target_directory = 'C:\Storage\GameSaves'
//! file_patterns = ["*.sav"]
//! redirect_mode = "Overlay"
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::director::builder::{FilesystemDirectorBuilder, RuleDefinition, RuleError};
use crate::rules::RedirectMode;

/// Failure to obtain a rule configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read rules file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse rules file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One configured rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub name: String,
    pub origin_directory: String,
    pub target_directory: String,

    /// Wildcard patterns narrowing the rule to matching file names. Empty
    /// means the rule covers everything.
    #[serde(default)]
    pub file_patterns: Vec<String>,

    #[serde(default)]
    pub redirect_mode: RedirectMode,
}

impl From<RuleConfig> for RuleDefinition {
    fn from(config: RuleConfig) -> RuleDefinition {
        RuleDefinition {
            name: config.name,
            origin_directory: config.origin_directory,
            target_directory: config.target_directory,
            file_patterns: config.file_patterns,
            redirect_mode: config.redirect_mode,
        }
    }
}

/// A complete set of configured rules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleConfig>,
}

impl RulesConfig {
    /// Parses a configuration from TOML text.
    pub fn parse(text: &str) -> Result<RulesConfig, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<RulesConfig, ConfigError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Adds every configured rule to the builder, stopping at the first
    /// rejection.
    pub fn apply(self, builder: &mut FilesystemDirectorBuilder) -> Result<(), RuleError> {
        for rule in self.rules {
            builder.add_rule(rule.into())?;
        }
        Ok(())
    }
}
