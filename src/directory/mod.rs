//! Directory (object mapper) service.
//!
//! The directory aggregates one [`DiscoveryIndex`] per service into
//! `path → service → interfaces` and answers lookups by path, subtree and
//! ancestry. Published directories are immutable; every update builds a new
//! one and swaps it in.

/// Refresh orchestration and incremental updates.
pub mod service;
/// Crawl worker threads.
pub mod worker;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::discovery::DiscoveryIndex;
use crate::error::{MapperError, MapperResult};
use crate::path;

pub use service::{DirectoryService, RefreshReport, RefreshTarget};
pub use worker::RefreshHandle;

/// `service → interfaces` for one path.
pub type ServiceMap = BTreeMap<String, BTreeSet<String>>;

/// `path → service → interfaces`.
pub type DirectoryEntries = BTreeMap<String, ServiceMap>;

/// An immutable published directory.
#[derive(Debug, Clone)]
pub struct Directory {
    entries: DirectoryEntries,
    refreshed_at: DateTime<Utc>,
    digest: blake3::Hash,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new(DirectoryEntries::new())
    }
}

impl PartialEq for Directory {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Directory {
    #[must_use]
    pub fn new(entries: DirectoryEntries) -> Self {
        let digest = digest(&entries);
        Self {
            entries,
            refreshed_at: Utc::now(),
            digest,
        }
    }

    #[must_use]
    pub const fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    /// Content digest. Two directories with equal entries share it.
    #[must_use]
    pub const fn digest(&self) -> &blake3::Hash {
        &self.digest
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &DirectoryEntries {
        &self.entries
    }

    /// Every service with at least one path.
    #[must_use]
    pub fn services(&self) -> BTreeSet<String> {
        self.entries.values().flat_map(|s| s.keys().cloned()).collect()
    }

    /// Services and interfaces at exactly `path`.
    pub fn get_object(&self, path: &str) -> MapperResult<ServiceMap> {
        let path = path::normalize(path);
        self.entries.get(&path).cloned().ok_or(MapperError::NotFound { path })
    }

    /// Strict descendants of `path` at most `depth` levels down (0 means
    /// unlimited).
    ///
    /// Fails with `NotFound` when `path` is neither known nor an ancestor of
    /// anything known. The root always exists.
    pub fn get_subtree(&self, path: &str, depth: usize) -> MapperResult<DirectoryEntries> {
        let path = path::normalize(path);
        let found: DirectoryEntries = self
            .subtree_iter(&path, depth)
            .map(|(p, services)| (p.clone(), services.clone()))
            .collect();
        if found.is_empty() && !self.entries.contains_key(&path) && path != path::ROOT {
            return Err(MapperError::NotFound { path });
        }
        Ok(found)
    }

    /// Paths of [`get_subtree`](Self::get_subtree).
    pub fn get_subtree_paths(&self, path: &str, depth: usize) -> MapperResult<Vec<String>> {
        Ok(self.get_subtree(path, depth)?.into_keys().collect())
    }

    /// Known proper ancestors of `path`. `path` itself must be known.
    pub fn get_ancestors(&self, path: &str) -> MapperResult<DirectoryEntries> {
        let path = path::normalize(path);
        if !self.entries.contains_key(&path) {
            return Err(MapperError::NotFound { path });
        }
        Ok(path::ancestors(&path)
            .into_iter()
            .filter_map(|a| self.entries.get(&a).map(|services| (a, services.clone())))
            .collect())
    }

    fn subtree_iter<'a>(&'a self, path: &'a str, depth: usize) -> impl Iterator<Item = (&'a String, &'a ServiceMap)> + 'a {
        self.entries.iter().filter(move |(p, _)| match path::depth_below(p, path) {
            Some(d) => d > 0 && (depth == 0 || d <= depth),
            None => false,
        })
    }

    /// Copy without any of `service`'s entries.
    #[must_use]
    pub(crate) fn without_service(&self, service: &str) -> Self {
        let mut entries = self.entries.clone();
        strip_service(&mut entries, service);
        Self::new(entries)
    }

    /// Copy with `interfaces` added to `service` at `path`.
    #[must_use]
    pub(crate) fn with_interfaces(&self, service: &str, path: &str, interfaces: BTreeSet<String>) -> Self {
        let mut entries = self.entries.clone();
        if !interfaces.is_empty() {
            entries
                .entry(path.to_string())
                .or_default()
                .entry(service.to_string())
                .or_default()
                .extend(interfaces);
        }
        Self::new(entries)
    }

    /// Copy with `interfaces` removed from `service` at `path`.
    #[must_use]
    pub(crate) fn without_interfaces(&self, service: &str, path: &str, interfaces: &[String]) -> Self {
        let mut entries = self.entries.clone();
        if let Some(services) = entries.get_mut(path) {
            if let Some(set) = services.get_mut(service) {
                for iface in interfaces {
                    set.remove(iface);
                }
                if set.is_empty() {
                    services.remove(service);
                }
            }
            if services.is_empty() {
                entries.remove(path);
            }
        }
        Self::new(entries)
    }
}

pub(crate) fn replace_service(entries: &mut DirectoryEntries, service: &str, index: DiscoveryIndex) {
    strip_service(entries, service);
    for (path, interfaces) in index {
        entries.entry(path).or_default().insert(service.to_string(), interfaces);
    }
}

pub(crate) fn strip_service(entries: &mut DirectoryEntries, service: &str) {
    entries.retain(|_, services| {
        services.remove(service);
        !services.is_empty()
    });
}

fn digest(entries: &DirectoryEntries) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for (path, services) in entries {
        hasher.update(path.as_bytes());
        hasher.update(&[0]);
        for (service, interfaces) in services {
            hasher.update(service.as_bytes());
            hasher.update(&[1]);
            for iface in interfaces {
                hasher.update(iface.as_bytes());
                hasher.update(&[2]);
            }
        }
        hasher.update(&[3]);
    }
    hasher.finalize()
}
