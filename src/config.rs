use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

use crate::{format::FormatOptions, CloudEventsError, CloudEventsResult};

/// Settings shared by the HTTP and Kafka bindings, usually loaded from JSON.
///
/// ```json
/// {
///   "default_encoder_name": "json",
///   "allow_opaque": true,
///   "structured": false,
///   "partition_key_attribute": "partitionkey",
///   "format": { "sort": true }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Envelope encoder used when a structured encode names no format.
    #[serde(default = "default_encoder_name")]
    pub default_encoder_name: String,

    /// Keep undecodable structured content as an opaque event instead of
    /// failing.
    #[serde(default)]
    pub allow_opaque: bool,

    /// Encode in structured mode by default.
    #[serde(default)]
    pub structured: bool,

    /// Extension attribute mapped to and from the Kafka record key.
    #[serde(default = "default_partition_key_attribute")]
    pub partition_key_attribute: String,

    #[serde(default)]
    pub format: FormatOptions,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            default_encoder_name: default_encoder_name(),
            allow_opaque: false,
            structured: false,
            partition_key_attribute: default_partition_key_attribute(),
            format: FormatOptions::default(),
        }
    }
}

impl BindingConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> CloudEventsResult<Self> {
        from_file(path)
    }

    pub fn from_str(s: &str) -> CloudEventsResult<Self> {
        from_str(s)
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> CloudEventsResult<T> {
    let file = File::open(path)
        .map_err(|e| CloudEventsError::Config(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| CloudEventsError::Config(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> CloudEventsResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| CloudEventsError::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_encoder_name() -> String {
    "json".to_string()
}

fn default_partition_key_attribute() -> String {
    "partitionkey".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = BindingConfig::from_str("{}").unwrap();
        assert_eq!(config, BindingConfig::default());
        assert_eq!(config.default_encoder_name, "json");
        assert_eq!(config.partition_key_attribute, "partitionkey");
        assert!(!config.format.sort);
    }

    #[test]
    fn test_partial_override() {
        let config =
            BindingConfig::from_str(r#"{"allow_opaque": true, "format": {"sort": true}}"#).unwrap();
        assert!(config.allow_opaque);
        assert!(!config.structured);
        assert!(config.format.sort);
    }

    #[test]
    fn test_errors_are_config_errors() {
        let err = BindingConfig::from_str("{").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Config);
        let err = BindingConfig::from_file("/nonexistent/binding.json").unwrap_err();
        assert!(err.to_string().contains("Failed to open config file"));
    }
}
