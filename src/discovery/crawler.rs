use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::bus::RemoteBus;
use crate::config::CrawlConfig;
use crate::error::{BusError, CrawlError, MapperResult};
use crate::introspect::{parse_node, IntrospectionNode, TagFilter};
use crate::names;
use crate::path;
use crate::registry::ManagedObjects;

use super::{DiscoveryIndex, InterfaceFilter};

/// How a crawl descends through a service's object tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStrategy {
    /// Introspect every node. Pre-flattened children are read flat.
    TreeWalk,
    /// Introspect until a node offers the object manager interface, then
    /// take that whole subtree from one bulk call.
    #[default]
    ManagedObjects,
}

/// Counters for one crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub introspect_calls: u64,
    pub bulk_calls: u64,
    /// Branches abandoned after a transient failure.
    pub skipped_branches: u64,
}

/// A finished crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub index: DiscoveryIndex,
    pub stats: CrawlStats,
    pub elapsed: Duration,
}

/// Builds a [`DiscoveryIndex`] for one service at a time.
///
/// A crawler holds no per-crawl state and may be shared between threads.
#[derive(Clone)]
pub struct Crawler {
    bus: Arc<dyn RemoteBus>,
    filter: InterfaceFilter,
    tags: TagFilter,
    strategy: CrawlStrategy,
    call_timeout: Duration,
    deadline: Duration,
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("filter", &self.filter)
            .field("tags", &self.tags)
            .field("strategy", &self.strategy)
            .field("call_timeout", &self.call_timeout)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Crawler {
    pub fn new(bus: Arc<dyn RemoteBus>, cfg: &CrawlConfig) -> MapperResult<Self> {
        let tags = if cfg.parse_members { TagFilter::all() } else { TagFilter::none() };
        Ok(Self {
            bus,
            filter: InterfaceFilter::from_config(cfg)?,
            tags,
            strategy: cfg.strategy,
            call_timeout: cfg.call_timeout(),
            deadline: cfg.deadline(),
        })
    }

    #[must_use]
    pub fn with_filter(mut self, filter: InterfaceFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: CrawlStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Interfaces this crawler records.
    #[must_use]
    pub const fn filter(&self) -> &InterfaceFilter {
        &self.filter
    }

    #[must_use]
    pub const fn strategy(&self) -> CrawlStrategy {
        self.strategy
    }

    /// Crawls `service` from `root`.
    pub fn crawl(&self, service: &str, root: &str) -> Result<DiscoveryIndex, CrawlError> {
        self.crawl_detailed(service, root).map(|outcome| outcome.index)
    }

    /// Crawls `service` from `root`, also reporting call counts.
    ///
    /// Transient failures abandon the affected branch only. Anything else
    /// aborts the crawl and nothing built so far is returned.
    pub fn crawl_detailed(&self, service: &str, root: &str) -> Result<CrawlOutcome, CrawlError> {
        let span = tracing::debug_span!("crawl", service, root, strategy = ?self.strategy);
        let _enter = span.enter();

        let mut walk = Walk {
            crawler: self,
            service,
            started: Instant::now(),
            visited: HashSet::new(),
            index: DiscoveryIndex::new(),
            stats: CrawlStats::default(),
        };
        let root = path::normalize(root);
        match self.strategy {
            CrawlStrategy::TreeWalk => walk.tree_walk(&root)?,
            CrawlStrategy::ManagedObjects => walk.managed_walk(&root)?,
        }

        let elapsed = walk.started.elapsed();
        tracing::debug!(
            paths = walk.index.len(),
            introspect_calls = walk.stats.introspect_calls,
            bulk_calls = walk.stats.bulk_calls,
            skipped = walk.stats.skipped_branches,
            elapsed_ms = millis(elapsed),
            "crawl finished"
        );
        Ok(CrawlOutcome {
            index: walk.index,
            stats: walk.stats,
            elapsed,
        })
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

struct Walk<'a> {
    crawler: &'a Crawler,
    service: &'a str,
    started: Instant,
    visited: HashSet<String>,
    index: DiscoveryIndex,
    stats: CrawlStats,
}

impl Walk<'_> {
    /// Timeout for the next call: the per-call bound, cut short by the deadline.
    fn next_timeout(&self) -> Result<Duration, CrawlError> {
        let elapsed = self.started.elapsed();
        match self.crawler.deadline.checked_sub(elapsed) {
            Some(left) if !left.is_zero() => Ok(left.min(self.crawler.call_timeout)),
            _ => Err(CrawlError::DeadlineExceeded {
                service: self.service.to_string(),
                elapsed_ms: millis(elapsed),
            }),
        }
    }

    /// Maps a failed call: `Ok(None)` for transient failures, else an abort.
    fn failed<T>(&mut self, path: &str, err: BusError) -> Result<Option<T>, CrawlError> {
        if err.is_transient() {
            tracing::warn!(service = self.service, path, error = %err, "skipping unreachable branch");
            self.stats.skipped_branches += 1;
            return Ok(None);
        }
        Err(CrawlError::Aborted {
            service: self.service.to_string(),
            path: path.to_string(),
            source: err,
        })
    }

    fn introspect(&mut self, path: &str) -> Result<Option<IntrospectionNode>, CrawlError> {
        let timeout = self.next_timeout()?;
        self.stats.introspect_calls += 1;
        let xml = match self.crawler.bus.introspect(self.service, path, timeout) {
            Ok(xml) => xml,
            Err(err) => return self.failed(path, err),
        };
        let filter = &self.crawler.filter;
        let tags = self.crawler.tags;
        parse_node(&xml, |i| filter.matches(i), |k| tags.matches(k))
            .map(Some)
            .map_err(|e| CrawlError::Malformed {
                service: self.service.to_string(),
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    fn managed_objects(&mut self, path: &str) -> Result<Option<ManagedObjects>, CrawlError> {
        let timeout = self.next_timeout()?;
        self.stats.bulk_calls += 1;
        match self.crawler.bus.get_managed_objects(self.service, path, timeout) {
            Ok(objects) => Ok(Some(objects)),
            Err(err) => self.failed(path, err),
        }
    }

    fn record(&mut self, path: &str, node: &IntrospectionNode) {
        self.index.insert(path, node.interface_names());
    }

    /// Child paths of `node` in name order.
    fn children(&self, parent: &str, node: &IntrospectionNode) -> Result<Vec<String>, CrawlError> {
        let mut names: Vec<&String> = node.children.iter().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let child = path::join(parent, name);
                path::validate(&child).map_err(|e| CrawlError::Malformed {
                    service: self.service.to_string(),
                    path: parent.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(child)
            })
            .collect()
    }

    fn tree_walk(&mut self, path: &str) -> Result<(), CrawlError> {
        if !self.visited.insert(path.to_string()) {
            return Ok(());
        }
        let Some(node) = self.introspect(path)? else {
            return Ok(());
        };
        self.record(path, &node);
        tracing::debug!(path, children = node.children.len(), "introspected");

        let children = self.children(path, &node)?;
        if node.is_pre_flattened() {
            for child in children {
                if !self.visited.insert(child.clone()) {
                    continue;
                }
                if let Some(flat) = self.introspect(&child)? {
                    self.record(&child, &flat);
                }
            }
            return Ok(());
        }
        for child in children {
            self.tree_walk(&child)?;
        }
        Ok(())
    }

    fn managed_walk(&mut self, path: &str) -> Result<(), CrawlError> {
        if !self.visited.insert(path.to_string()) {
            return Ok(());
        }
        let Some(node) = self.introspect(path)? else {
            return Ok(());
        };
        self.record(path, &node);

        if node.declares(names::OBJECT_MANAGER_IFACE) {
            tracing::debug!(path, "taking subtree from object manager");
            if let Some(objects) = self.managed_objects(path)? {
                for (object_path, interfaces) in objects {
                    self.index.insert(&object_path, interfaces.into_keys());
                    self.visited.insert(object_path);
                }
            }
            return Ok(());
        }

        tracing::debug!(path, children = node.children.len(), "introspected");
        for child in self.children(path, &node)? {
            self.managed_walk(&child)?;
        }
        Ok(())
    }
}
