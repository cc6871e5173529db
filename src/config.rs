//! Configuration.
//!
//! Every section has a `Default` and deserializes with missing fields filled
//! from that default, so a config file only needs to name what it changes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::{CrawlStrategy, InterfaceFilter};
use crate::error::{MapperError, MapperResult};
use crate::names;
use crate::path;
use crate::registry::RegistrationPolicy;

/// Object registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// What `add` does when the path is already registered.
    pub policy: RegistrationPolicy,
    /// Path at which the registry answers `GetManagedObjects`.
    pub manager_path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            policy: RegistrationPolicy::Reject,
            manager_path: names::OBJ_PREFIX.to_string(),
        }
    }
}

/// Signal hub settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalHubConfig {
    /// Per-subscription buffer capacity.
    pub stream_capacity: usize,
}

impl Default for SignalHubConfig {
    fn default() -> Self {
        Self { stream_capacity: 1024 }
    }
}

/// Crawl settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub strategy: CrawlStrategy,
    /// Where each crawl starts.
    pub root: String,
    /// Per remote call.
    pub call_timeout_ms: u64,
    /// Whole crawl of one service.
    pub deadline_ms: u64,
    /// Interfaces recorded when they start with one of these prefixes.
    pub interface_namespaces: Vec<String>,
    /// Interfaces recorded when they match one of these regexes.
    pub interface_patterns: Vec<String>,
    /// Parse method and signal declarations out of introspection data.
    pub parse_members: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            strategy: CrawlStrategy::ManagedObjects,
            root: path::ROOT.to_string(),
            call_timeout_ms: 2_000,
            deadline_ms: 30_000,
            interface_namespaces: vec![names::BUS_PREFIX.to_string()],
            interface_patterns: Vec::new(),
            parse_members: false,
        }
    }
}

impl CrawlConfig {
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    #[must_use]
    pub const fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// Directory service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Bus names crawled by a full refresh.
    pub service_namespaces: Vec<String>,
    /// Number of crawl worker threads.
    pub workers: usize,
    /// Maximum queued refresh jobs.
    pub queue_capacity: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            service_namespaces: vec![names::BUS_PREFIX.to_string()],
            workers: 1,
            queue_capacity: 16,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub registry: RegistryConfig,
    pub signals: SignalHubConfig,
    pub crawl: CrawlConfig,
    pub directory: DirectoryConfig,
}

impl MapperConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> MapperResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| MapperError::config(format!("invalid config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses, and validates a JSON config file.
    pub fn from_file(file: impl AsRef<Path>) -> MapperResult<Self> {
        let file = file.as_ref();
        let text = std::fs::read_to_string(file)
            .map_err(|e| MapperError::config(format!("cannot read {}: {e}", file.display())))?;
        Self::from_json_str(&text)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> MapperResult<()> {
        path::validate(&self.registry.manager_path)
            .map_err(|e| MapperError::config(format!("registry.manager_path: {e}")))?;
        path::validate(&self.crawl.root).map_err(|e| MapperError::config(format!("crawl.root: {e}")))?;

        if self.signals.stream_capacity == 0 {
            return Err(MapperError::config("signals.stream_capacity must be positive"));
        }
        if self.crawl.call_timeout_ms == 0 || self.crawl.deadline_ms == 0 {
            return Err(MapperError::config("crawl timeouts must be positive"));
        }
        if self.crawl.call_timeout_ms > self.crawl.deadline_ms {
            return Err(MapperError::config("crawl.call_timeout_ms exceeds crawl.deadline_ms"));
        }
        if self.directory.workers == 0 || self.directory.queue_capacity == 0 {
            return Err(MapperError::config("directory workers and queue_capacity must be positive"));
        }

        // Interface patterns must compile.
        InterfaceFilter::from_config(&self.crawl)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        MapperConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = MapperConfig::from_json_str(
            r#"{ "crawl": { "strategy": "tree_walk", "call_timeout_ms": 500 }, "registry": { "policy": "replace" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.crawl.strategy, CrawlStrategy::TreeWalk);
        assert_eq!(cfg.crawl.call_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.crawl.deadline_ms, CrawlConfig::default().deadline_ms);
        assert_eq!(cfg.registry.policy, RegistrationPolicy::Replace);
        assert_eq!(cfg.directory, DirectoryConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        let err = MapperConfig::from_json_str(r#"{ "crawl": { "root": "relative" } }"#).unwrap_err();
        assert!(matches!(err, MapperError::Config { .. }));

        let err = MapperConfig::from_json_str(r#"{ "crawl": { "interface_patterns": ["(unclosed"] } }"#).unwrap_err();
        assert!(matches!(err, MapperError::Config { .. }));

        let err = MapperConfig::from_json_str(r#"{ "crawl": { "call_timeout_ms": 10, "deadline_ms": 5 } }"#).unwrap_err();
        assert!(format!("{err}").contains("deadline"));

        let err = MapperConfig::from_json_str("not json").unwrap_err();
        assert!(format!("{err}").contains("invalid config JSON"));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mapper.json");
        let mut f = std::fs::File::create(&file).unwrap();
        writeln!(f, r#"{{ "directory": {{ "workers": 3 }} }}"#).unwrap();
        drop(f);

        let cfg = MapperConfig::from_file(&file).unwrap();
        assert_eq!(cfg.directory.workers, 3);

        let err = MapperConfig::from_file(dir.path().join("missing.json")).unwrap_err();
        assert!(format!("{err}").contains("cannot read"));
    }
}
