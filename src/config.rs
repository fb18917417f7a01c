//! Runtime Configuration
//!
//! Process-wide paths resolved once from the environment, plus the
//! options the engine is built with.

use std::path::PathBuf;

use log::debug;
use once_cell::sync::Lazy;

/// Environment variable overriding the state directory.
pub const HOME_ENV: &str = "FLOWGATE_HOME";

/// Default state directory, relative to the working directory.
pub const DEFAULT_HOME: &str = ".flowgate";

/// File name of the instance snapshot inside the state directory.
pub const STATE_FILE_NAME: &str = "instances.json";

/// Default catalog path used by the CLI.
pub const DEFAULT_CATALOG: &str = "catalog.yaml";

/// Lazily-resolved state directory.
pub static FLOWGATE_HOME: Lazy<PathBuf> = Lazy::new(|| {
    let home = match std::env::var(HOME_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_HOME),
    };
    debug!("Using state directory: {}", home.display());
    home
});

/// Lazily-resolved path of the instance snapshot.
pub static STATE_FILE_PATH: Lazy<PathBuf> = Lazy::new(|| FLOWGATE_HOME.join(STATE_FILE_NAME));

/// Whether built-in step handlers simulate their nominal latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Latency {
    /// Sleep for each handler's nominal duration
    Simulated,
    /// Return immediately
    #[default]
    None,
}

/// Options an engine is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub latency: Latency,
    pub state_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            latency: Latency::None,
            state_path: STATE_FILE_PATH.clone(),
        }
    }
}

impl EngineConfig {
    pub fn with_latency(mut self, latency: Latency) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_file_inside_home() {
        assert!(STATE_FILE_PATH.starts_with(&*FLOWGATE_HOME));
        assert!(STATE_FILE_PATH.ends_with(STATE_FILE_NAME));
    }

    #[test]
    fn test_config_builders() {
        let config = EngineConfig::default()
            .with_latency(Latency::Simulated)
            .with_state_path("/tmp/state.json");

        assert_eq!(config.latency, Latency::Simulated);
        assert_eq!(config.state_path, PathBuf::from("/tmp/state.json"));
    }

    #[test]
    fn test_default_latency_is_none() {
        assert_eq!(EngineConfig::default().latency, Latency::None);
    }
}
