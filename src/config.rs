//!
//! Configuration file support.
//!
//! ```toml
//! # Start every write from an empty tag map, so only the tags given on the command line are written
//! clear_existing_tags = false
//!
//! # Language stored for values that do not name one
//! default_language = "und"
//!
//! # Leaf payloads above this many bytes are left on disk while parsing
//! inline_payload_limit = 16777216
//!
//! # tracing filter directives, e.g. "ebml_tags=debug"
//! log_filter = "warn"
//! ```
//!

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::config::ConfigError;
use crate::tags::DEFAULT_LANGUAGE;
use crate::tree_parser::{ParseOptions, DEFAULT_INLINE_PAYLOAD_LIMIT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ignore tags already in the file when building the map to write
    pub clear_existing_tags: bool,
    /// Language for tag values that do not specify one
    pub default_language: String,
    /// Largest leaf payload read into memory while parsing
    pub inline_payload_limit: u64,
    /// Log filter directives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            clear_existing_tags: false,
            default_language: String::from(DEFAULT_LANGUAGE),
            inline_payload_limit: DEFAULT_INLINE_PAYLOAD_LIMIT,
            log_filter: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Config::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Parser options for tag work with this configuration's payload limit
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::for_tags().with_inline_payload_limit(self.inline_payload_limit)
    }
}
