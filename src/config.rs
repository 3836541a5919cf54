//! Serialization configuration
//!
//! Settings shared by the dumper, the loader and the codec. They can be built
//! in code or read from JSON.

use serde::{Deserialize, Serialize};

/// Serialization settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializationConfig {
    /// Caller-defined sub-format tag written into stream headers
    pub sub_profile_signature: u32,
    /// Caller-defined sub-format version written into stream headers
    pub sub_profile_version: u32,
    /// Initial capacity of the per-node staging buffer, in bytes
    pub staging_capacity: usize,
    /// Largest properties payload accepted for a single node, in bytes
    pub max_payload_size: u32,
    /// Deepest nesting of nodes accepted when inflating
    pub max_depth: usize,
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            sub_profile_signature: 0,
            sub_profile_version: 0,
            staging_capacity: 1024,
            max_payload_size: 16 * 1024 * 1024,
            max_depth: 1024,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON document could not be parsed
    #[error("Invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A setting is out of range
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl SerializationConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// Missing settings keep their default value.
    ///
    /// # Example
    /// ```
    /// use kore_blocks::config::SerializationConfig;
    ///
    /// let config = SerializationConfig::from_json_str(r#"{ "max_depth": 16 }"#).unwrap();
    /// assert_eq!(config.max_depth, 16);
    /// assert_eq!(config.staging_capacity, 1024);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every limit is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_payload_size",
                reason: "must be greater than zero".into(),
            });
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "max_depth",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Set the sub-profile written into stream headers
    pub fn with_sub_profile(mut self, signature: u32, version: u32) -> Self {
        self.sub_profile_signature = signature;
        self.sub_profile_version = version;
        self
    }

    /// Set the nesting limit used when inflating
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
