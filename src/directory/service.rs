use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use crossbeam_channel::bounded;
use serde::{Deserialize, Serialize};

use crate::bus::RemoteBus;
use crate::config::MapperConfig;
use crate::discovery::{Crawler, DiscoveryIndex};
use crate::error::{CrawlError, MapperResult};
use crate::names;
use crate::signal::{Signal, SignalEnvelope};

use super::worker::{Job, RefreshHandle, WorkerPool};
use super::{replace_service, strip_service, Directory, DirectoryEntries, ServiceMap};

/// Which services a refresh crawls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTarget {
    /// Every bus name in the configured namespaces. Services that vanished
    /// from the bus are dropped from the directory.
    All,
    /// Only these services.
    Services(Vec<String>),
}

/// Result of one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// Services whose entries were replaced.
    pub refreshed: Vec<String>,
    /// Services whose crawl aborted. Their previous entries were kept.
    pub failed: Vec<CrawlError>,
    /// Services dropped because they left the bus.
    pub removed: Vec<String>,
    /// Paths in the published directory.
    pub paths: usize,
    /// Whether the published content differs from the previous directory.
    pub changed: bool,
}

pub(crate) struct Shared {
    bus: Arc<dyn RemoteBus>,
    crawler: Crawler,
    root: String,
    namespaces: Vec<String>,
    current: RwLock<Arc<Directory>>,
    publish: Mutex<()>,
}

impl Shared {
    fn snapshot(&self) -> Arc<Directory> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn discover_services(&self) -> MapperResult<Vec<String>> {
        let mut services: Vec<String> = self
            .bus
            .list_names()?
            .into_iter()
            .filter(|name| !names::is_unique(name) && name != names::MAPPER_NAME)
            .filter(|name| {
                self.namespaces
                    .iter()
                    .any(|ns| name == ns || name.strip_prefix(ns.as_str()).is_some_and(|r| r.starts_with('.')))
            })
            .collect();
        services.sort();
        services.dedup();
        Ok(services)
    }

    pub(crate) fn refresh(&self, target: &RefreshTarget) -> MapperResult<RefreshReport> {
        let started = Instant::now();
        let (services, full) = match target {
            RefreshTarget::All => (self.discover_services()?, true),
            RefreshTarget::Services(services) => (services.clone(), false),
        };

        // Crawl without holding the publish lock.
        let mut crawled: Vec<(String, DiscoveryIndex)> = Vec::with_capacity(services.len());
        let mut failed = Vec::new();
        for service in &services {
            match self.crawler.crawl(service, &self.root) {
                Ok(index) => crawled.push((service.clone(), index)),
                Err(err) => {
                    tracing::warn!(service = %service, error = %err, "crawl aborted; keeping previous entries");
                    failed.push(err);
                }
            }
        }

        let _publish = self.publish.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.snapshot();
        let mut entries = previous.entries().clone();

        let mut removed = Vec::new();
        if full {
            for gone in previous.services() {
                if !services.contains(&gone) {
                    strip_service(&mut entries, &gone);
                    removed.push(gone);
                }
            }
        }
        let mut refreshed = Vec::with_capacity(crawled.len());
        for (service, index) in crawled {
            replace_service(&mut entries, &service, index);
            refreshed.push(service);
        }

        let next = Directory::new(entries);
        let changed = next.digest() != previous.digest();
        let paths = next.len();
        self.swap(next);

        tracing::info!(
            refreshed = refreshed.len(),
            failed = failed.len(),
            removed = removed.len(),
            paths,
            changed,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "directory refreshed"
        );
        Ok(RefreshReport {
            refreshed,
            failed,
            removed,
            paths,
            changed,
        })
    }

    fn swap(&self, next: Directory) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(next);
    }

    /// Builds and publishes a directory derived from the current one.
    fn update(&self, f: impl FnOnce(&Directory) -> Directory) -> bool {
        let _publish = self.publish.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = self.snapshot();
        let next = f(&previous);
        let changed = next.digest() != previous.digest();
        if changed {
            self.swap(next);
        }
        changed
    }
}

/// Crawls services on worker threads and publishes the aggregate directory.
pub struct DirectoryService {
    shared: Arc<Shared>,
    pool: WorkerPool,
}

impl std::fmt::Debug for DirectoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryService")
            .field("crawler", &self.shared.crawler)
            .field("root", &self.shared.root)
            .field("paths", &self.shared.snapshot().len())
            .finish_non_exhaustive()
    }
}

impl DirectoryService {
    /// Starts the crawl workers. The directory starts empty.
    pub fn new(bus: Arc<dyn RemoteBus>, cfg: &MapperConfig) -> MapperResult<Self> {
        cfg.validate()?;
        let shared = Arc::new(Shared {
            crawler: Crawler::new(Arc::clone(&bus), &cfg.crawl)?,
            bus,
            root: cfg.crawl.root.clone(),
            namespaces: cfg.directory.service_namespaces.clone(),
            current: RwLock::new(Arc::new(Directory::default())),
            publish: Mutex::new(()),
        });
        let pool = WorkerPool::start(cfg.directory.workers, cfg.directory.queue_capacity, &shared)?;
        Ok(Self { shared, pool })
    }

    /// Queues a refresh on a crawl worker.
    pub fn refresh_async(&self, target: RefreshTarget) -> MapperResult<RefreshHandle> {
        let (tx, rx) = bounded(1);
        self.pool.try_submit(Job::Refresh { target, reply: tx })?;
        Ok(RefreshHandle::new(rx))
    }

    /// Queues a refresh and waits for it.
    pub fn refresh(&self, target: RefreshTarget) -> MapperResult<RefreshReport> {
        self.refresh_async(target)?.join()
    }

    /// The currently published directory.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Directory> {
        self.shared.snapshot()
    }

    /// Applies a lifecycle signal observed from `service`.
    ///
    /// Returns whether the directory changed. Signals other than
    /// `InterfacesAdded`/`InterfacesRemoved` are ignored. Announced
    /// interfaces are recorded as reported, the same as bulk snapshot
    /// entries; only introspection goes through the interface filter.
    pub fn apply_signal(&self, service: &str, envelope: &SignalEnvelope) -> bool {
        match &envelope.signal {
            Signal::InterfacesAdded { object_path, interfaces } => {
                let added: BTreeSet<String> = interfaces.keys().cloned().collect();
                tracing::debug!(service, path = %object_path, ?added, "interfaces added");
                self.shared.update(|dir| dir.with_interfaces(service, object_path, added))
            }
            Signal::InterfacesRemoved { object_path, interfaces } => {
                tracing::debug!(service, path = %object_path, ?interfaces, "interfaces removed");
                self.shared.update(|dir| dir.without_interfaces(service, object_path, interfaces))
            }
            _ => false,
        }
    }

    /// Drops every entry of a service that left the bus.
    pub fn service_removed(&self, service: &str) -> bool {
        tracing::debug!(service, "service removed");
        self.shared.update(|dir| dir.without_service(service))
    }

    pub fn get_object(&self, path: &str) -> MapperResult<ServiceMap> {
        self.snapshot().get_object(path)
    }

    pub fn get_subtree(&self, path: &str, depth: usize) -> MapperResult<DirectoryEntries> {
        self.snapshot().get_subtree(path, depth)
    }

    pub fn get_subtree_paths(&self, path: &str, depth: usize) -> MapperResult<Vec<String>> {
        self.snapshot().get_subtree_paths(path, depth)
    }

    pub fn get_ancestors(&self, path: &str) -> MapperResult<DirectoryEntries> {
        self.snapshot().get_ancestors(path)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bus::LocalBus;
    use crate::config::RegistryConfig;
    use crate::directory::worker::submit_blocker;
    use crate::error::MapperError;
    use crate::registry::{BusObject, ObjectRegistry};
    use crate::signal::{SignalFilter, SignalHub};

    fn host(bus: &LocalBus, service: &str, paths: &[&str]) -> Arc<ObjectRegistry> {
        let reg = Arc::new(ObjectRegistry::new(RegistryConfig::default(), Arc::new(SignalHub::default())));
        for p in paths {
            reg.add(p, BusObject::builder().property("org.openbmc.SensorValue", "value", 0).build())
                .unwrap();
        }
        bus.host(service, Arc::clone(&reg));
        reg
    }

    fn service(bus: Arc<LocalBus>) -> DirectoryService {
        DirectoryService::new(bus, &MapperConfig::default()).unwrap()
    }

    #[test]
    fn full_refresh_discovers_namespaced_services() {
        let bus = Arc::new(LocalBus::new());
        host(&bus, "org.openbmc.Sensors", &["/org/openbmc/sensors/t0"]);
        host(&bus, "com.example.Other", &["/org/openbmc/other/x"]);
        let dir = service(bus);

        let report = dir.refresh(RefreshTarget::All).unwrap();
        assert_eq!(report.refreshed, vec!["org.openbmc.Sensors"]);
        assert!(report.changed);
        let obj = dir.get_object("/org/openbmc/sensors/t0").unwrap();
        assert!(obj.contains_key("org.openbmc.Sensors"));
        assert!(dir.get_object("/org/openbmc/other/x").is_err());

        let again = dir.refresh(RefreshTarget::All).unwrap();
        assert!(!again.changed);
    }

    #[test]
    fn vanished_services_are_dropped_on_full_refresh() {
        let bus = Arc::new(LocalBus::new());
        host(&bus, "org.openbmc.Sensors", &["/org/openbmc/sensors/t0"]);
        let dir = service(Arc::clone(&bus));
        dir.refresh(RefreshTarget::All).unwrap();

        bus.unhost("org.openbmc.Sensors");
        let report = dir.refresh(RefreshTarget::All).unwrap();
        assert_eq!(report.removed, vec!["org.openbmc.Sensors"]);
        assert!(dir.snapshot().is_empty());
    }

    #[test]
    fn signals_update_incrementally() {
        let bus = Arc::new(LocalBus::new());
        let reg = Arc::new(ObjectRegistry::new(RegistryConfig::default(), Arc::new(SignalHub::default())));
        let hub = Arc::new(SignalHub::default());
        let watched = ObjectRegistry::new(RegistryConfig::default(), hub.clone());
        bus.host("org.openbmc.Sensors", reg);
        let dir = service(bus);
        let stream = hub.subscribe(SignalFilter::all());

        watched
            .add("/org/openbmc/sensors/t9", BusObject::builder().property("org.openbmc.SensorValue", "value", 1).build())
            .unwrap();
        for env in stream.drain() {
            dir.apply_signal("org.openbmc.Sensors", &env);
        }
        assert!(dir.get_object("/org/openbmc/sensors/t9").is_ok());

        watched.remove("/org/openbmc/sensors/t9").unwrap();
        for env in stream.drain() {
            dir.apply_signal("org.openbmc.Sensors", &env);
        }
        assert!(dir.get_object("/org/openbmc/sensors/t9").is_err());
    }

    #[test]
    fn announced_and_crawled_objects_record_the_same_interfaces() {
        let bus = Arc::new(LocalBus::new());
        let hub = Arc::new(SignalHub::default());
        let reg = Arc::new(ObjectRegistry::new(RegistryConfig::default(), hub.clone()));
        let object = || {
            BusObject::builder()
                .property("org.openbmc.SensorValue", "value", 0)
                .property("com.example.Calibration", "offset", 0)
                .build()
        };
        reg.add("/org/openbmc/sensors/t0", object()).unwrap();
        bus.host("org.openbmc.Sensors", Arc::clone(&reg));
        let dir = service(bus);
        dir.refresh(RefreshTarget::All).unwrap();

        let stream = hub.subscribe(SignalFilter::all());
        reg.add("/org/openbmc/sensors/t1", object()).unwrap();
        for env in stream.drain() {
            dir.apply_signal("org.openbmc.Sensors", &env);
        }

        let crawled = dir.get_object("/org/openbmc/sensors/t0").unwrap();
        let announced = dir.get_object("/org/openbmc/sensors/t1").unwrap();
        assert!(crawled["org.openbmc.Sensors"].contains("com.example.Calibration"));
        assert_eq!(crawled, announced);
    }

    #[test]
    fn full_queue_is_reported() {
        let bus = Arc::new(LocalBus::new());
        let mut cfg = MapperConfig::default();
        cfg.directory.workers = 1;
        cfg.directory.queue_capacity = 1;
        let dir = DirectoryService::new(bus, &cfg).unwrap();

        let (busy, release_busy) = submit_blocker(&dir.pool).unwrap();
        busy.recv_timeout(Duration::from_secs(5)).unwrap();
        let (queued, release_queued) = submit_blocker(&dir.pool).unwrap();

        let err = dir.refresh_async(RefreshTarget::All).unwrap_err();
        assert!(matches!(err, MapperError::QueueFull { capacity: 1, .. }));

        release_busy.send(()).unwrap();
        queued.recv_timeout(Duration::from_secs(5)).unwrap();
        release_queued.send(()).unwrap();
        let report = dir.refresh_async(RefreshTarget::All).unwrap().join_timeout(Duration::from_secs(5)).unwrap();
        assert!(report.refreshed.is_empty());
    }
}
