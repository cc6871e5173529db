use regex::Regex;

use crate::config::CrawlConfig;
use crate::error::{MapperError, MapperResult};
use crate::names;

/// Decides which interface names a crawl records.
///
/// An interface passes when it lies in one of the namespaces or matches one
/// of the patterns. A filter with neither passes everything. The object
/// manager interface always passes.
#[derive(Debug, Clone, Default)]
pub struct InterfaceFilter {
    namespaces: Vec<String>,
    patterns: Vec<Regex>,
}

impl InterfaceFilter {
    /// Passes every interface.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Passes interfaces equal to, or dotted below, one of `namespaces`.
    #[must_use]
    pub fn namespaces<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespaces: namespaces.into_iter().map(Into::into).collect(),
            patterns: Vec::new(),
        }
    }

    /// Adds a regex pattern.
    pub fn with_pattern(mut self, pattern: &str) -> MapperResult<Self> {
        let re = Regex::new(pattern).map_err(|e| MapperError::config(format!("bad interface pattern '{pattern}': {e}")))?;
        self.patterns.push(re);
        Ok(self)
    }

    /// Builds the filter described by `cfg`.
    pub fn from_config(cfg: &CrawlConfig) -> MapperResult<Self> {
        let mut filter = Self::namespaces(cfg.interface_namespaces.iter().cloned());
        for pattern in &cfg.interface_patterns {
            filter = filter.with_pattern(pattern)?;
        }
        Ok(filter)
    }

    #[must_use]
    pub fn matches(&self, interface: &str) -> bool {
        if interface == names::OBJECT_MANAGER_IFACE {
            return true;
        }
        if self.namespaces.is_empty() && self.patterns.is_empty() {
            return true;
        }
        self.namespaces.iter().any(|ns| in_namespace(interface, ns)) || self.patterns.iter().any(|re| re.is_match(interface))
    }
}

fn in_namespace(interface: &str, ns: &str) -> bool {
    interface
        .strip_prefix(ns)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_matching_is_dot_aware() {
        let f = InterfaceFilter::namespaces(["org.openbmc"]);
        assert!(f.matches("org.openbmc"));
        assert!(f.matches("org.openbmc.SensorValue"));
        assert!(!f.matches("org.openbmcx.Thing"));
        assert!(!f.matches("org.freedesktop.DBus.Properties"));
    }

    #[test]
    fn object_manager_always_passes() {
        let f = InterfaceFilter::namespaces(["xyz"]);
        assert!(f.matches(names::OBJECT_MANAGER_IFACE));
    }

    #[test]
    fn empty_filter_passes_everything() {
        assert!(InterfaceFilter::all().matches("anything.At.All"));
    }

    #[test]
    fn patterns_extend_namespaces() {
        let f = InterfaceFilter::namespaces(["org.openbmc"])
            .with_pattern(r"^xyz\.openbmc_project\.Sensor\.")
            .unwrap();
        assert!(f.matches("xyz.openbmc_project.Sensor.Value"));
        assert!(!f.matches("xyz.openbmc_project.Control"));
        assert!(InterfaceFilter::all().with_pattern("(").is_err());
    }

    #[test]
    fn from_config() {
        let cfg = CrawlConfig {
            interface_namespaces: vec![],
            interface_patterns: vec!["Sensor".into()],
            ..CrawlConfig::default()
        };
        let f = InterfaceFilter::from_config(&cfg).unwrap();
        assert!(f.matches("org.openbmc.SensorValue"));
        assert!(!f.matches("org.openbmc.Control"));
    }
}
