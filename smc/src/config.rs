use std::{
    fs::File,
    io::{self, BufReader},
    path::Path,
    time::Duration,
};

use serde::Deserialize;

/// Default bound on every blocking retrieval.
pub const DEFAULT_RETRIEVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables of the party engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum time to wait for a single message. Expiry aborts the run.
    pub retrieve_timeout: Duration,
}

/// Raw parsed JSON configuration file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEngineConfig {
    retrieve_timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn with_timeout(retrieve_timeout: Duration) -> Self {
        Self { retrieve_timeout }
    }

    /// Load configuration from JSON file.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let raw: RawEngineConfig = serde_json::from_reader(reader)?;
        Ok(raw.into())
    }

    /// Parse configuration from JSON string.
    pub fn from_json(json: &str) -> io::Result<Self> {
        let raw: RawEngineConfig = serde_json::from_str(json)?;
        Ok(raw.into())
    }
}

impl From<RawEngineConfig> for EngineConfig {
    fn from(raw: RawEngineConfig) -> Self {
        Self {
            retrieve_timeout: raw
                .retrieve_timeout_ms
                .map_or(DEFAULT_RETRIEVE_TIMEOUT, Duration::from_millis),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_RETRIEVE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let config = EngineConfig::from_json(r#"{"retrieve_timeout_ms": 1500}"#).unwrap();
        assert_eq!(config.retrieve_timeout, Duration::from_millis(1500));
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
        assert!(EngineConfig::from_json(r#"{"timeout": 1}"#).is_err());
    }
}
