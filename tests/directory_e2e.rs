use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mgmtbus::bus::RemoteBus;
use mgmtbus::error::{BusError, CrawlError};
use mgmtbus::names;
use mgmtbus::registry::ManagedObjects;
use mgmtbus::value::Value;
use mgmtbus::{
    BusObject, DirectoryService, LocalBus, MapperConfig, MapperError, ObjectRegistry, RefreshTarget, RegistryConfig,
    SignalFilter, SignalHub,
};

const SENSORS: &str = "org.openbmc.Sensors";
const CONTROL: &str = "org.openbmc.Control";
const VALUE_IFACE: &str = "org.openbmc.SensorValue";
const FAN_IFACE: &str = "org.openbmc.control.Fan";

/// A [`LocalBus`] whose chosen services answer every call with a fault.
struct FaultyBus {
    inner: Arc<LocalBus>,
    faulty: Mutex<BTreeSet<String>>,
}

impl FaultyBus {
    fn new(inner: Arc<LocalBus>) -> Self {
        Self {
            inner,
            faulty: Mutex::new(BTreeSet::new()),
        }
    }

    fn break_service(&self, service: &str) {
        self.faulty.lock().unwrap().insert(service.to_string());
    }

    fn check(&self, service: &str) -> Result<(), BusError> {
        if self.faulty.lock().unwrap().contains(service) {
            return Err(BusError::Remote {
                name: names::ERROR_ACCESS_DENIED.to_string(),
                message: "introspection refused".to_string(),
            });
        }
        Ok(())
    }
}

impl RemoteBus for FaultyBus {
    fn list_names(&self) -> Result<Vec<String>, BusError> {
        self.inner.list_names()
    }

    fn introspect(&self, service: &str, path: &str, timeout: Duration) -> Result<String, BusError> {
        self.check(service)?;
        self.inner.introspect(service, path, timeout)
    }

    fn get_managed_objects(&self, service: &str, path: &str, timeout: Duration) -> Result<ManagedObjects, BusError> {
        self.check(service)?;
        self.inner.get_managed_objects(service, path, timeout)
    }

    fn get_property(
        &self,
        service: &str,
        path: &str,
        interface: &str,
        property: &str,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        self.check(service)?;
        self.inner.get_property(service, path, interface, property, timeout)
    }

    fn set_property(
        &self,
        service: &str,
        path: &str,
        interface: &str,
        property: &str,
        value: Value,
        timeout: Duration,
    ) -> Result<(), BusError> {
        self.check(service)?;
        self.inner.set_property(service, path, interface, property, value, timeout)
    }
}

struct Fixture {
    bus: Arc<LocalBus>,
    faulty: Arc<FaultyBus>,
    sensors: Arc<ObjectRegistry>,
    control: Arc<ObjectRegistry>,
    control_hub: Arc<SignalHub>,
    directory: DirectoryService,
}

fn fixture() -> Fixture {
    let bus = Arc::new(LocalBus::new());

    let sensors = Arc::new(ObjectRegistry::new(RegistryConfig::default(), Arc::new(SignalHub::default())));
    for p in ["/org/openbmc/sensors/temp/t0", "/org/openbmc/sensors/temp/t1"] {
        sensors
            .add(p, BusObject::builder().property(VALUE_IFACE, "value", 0).build())
            .unwrap();
    }
    bus.host(SENSORS, sensors.clone());

    let control_hub = Arc::new(SignalHub::default());
    let control = Arc::new(ObjectRegistry::new(RegistryConfig::default(), control_hub.clone()));
    control
        .add("/org/openbmc/control/fan0", BusObject::builder().property(FAN_IFACE, "speed", 0).build())
        .unwrap();
    bus.host(CONTROL, control.clone());

    // Outside the default service namespace.
    let other = Arc::new(ObjectRegistry::new(RegistryConfig::default(), Arc::new(SignalHub::default())));
    bus.host("com.example.Other", other);

    let faulty = Arc::new(FaultyBus::new(bus.clone()));
    let directory = DirectoryService::new(faulty.clone(), &MapperConfig::default()).unwrap();
    Fixture {
        bus,
        faulty,
        sensors,
        control,
        control_hub,
        directory,
    }
}

fn services_at(dir: &DirectoryService, path: &str) -> Vec<String> {
    dir.get_object(path).unwrap().into_keys().collect()
}

#[test]
fn full_refresh_aggregates_services() {
    let fx = fixture();
    let report = fx.directory.refresh(RefreshTarget::All).unwrap();

    assert_eq!(report.refreshed, vec![CONTROL.to_string(), SENSORS.to_string()]);
    assert!(report.failed.is_empty());
    assert!(report.changed);

    assert_eq!(services_at(&fx.directory, "/org/openbmc"), vec![CONTROL, SENSORS]);
    let fan = fx.directory.get_object("/org/openbmc/control/fan0").unwrap();
    assert!(fan[CONTROL].contains(FAN_IFACE));
    assert!(!fx.directory.snapshot().services().contains("com.example.Other"));

    let again = fx.directory.refresh(RefreshTarget::All).unwrap();
    assert!(!again.changed);
}

#[test]
fn subtree_and_ancestor_queries() {
    let fx = fixture();
    fx.directory.refresh(RefreshTarget::All).unwrap();
    let dir = &fx.directory;

    assert_eq!(dir.get_subtree_paths("/org/openbmc", 0).unwrap(), vec![
        "/org/openbmc/control/fan0",
        "/org/openbmc/sensors/temp/t0",
        "/org/openbmc/sensors/temp/t1",
    ]);
    assert_eq!(dir.get_subtree_paths("/org/openbmc", 2).unwrap(), vec!["/org/openbmc/control/fan0"]);
    assert_eq!(dir.get_subtree_paths("/org/openbmc/sensors", 0).unwrap().len(), 2);
    assert!(dir.get_subtree_paths("/org/openbmc/sensors/temp/t0", 0).unwrap().is_empty());
    assert!(matches!(dir.get_subtree("/org/nowhere", 0), Err(MapperError::NotFound { .. })));

    let ancestors = dir.get_ancestors("/org/openbmc/sensors/temp/t0").unwrap();
    assert_eq!(ancestors.keys().collect::<Vec<_>>(), vec!["/org/openbmc"]);
    assert!(matches!(dir.get_ancestors("/org/openbmc/sensors"), Err(MapperError::NotFound { .. })));
}

#[test]
fn aborted_crawl_keeps_previous_entries() {
    let fx = fixture();
    fx.directory.refresh(RefreshTarget::All).unwrap();

    fx.control
        .add("/org/openbmc/control/fan1", BusObject::builder().property(FAN_IFACE, "speed", 0).build())
        .unwrap();
    fx.sensors
        .add("/org/openbmc/sensors/temp/t2", BusObject::builder().property(VALUE_IFACE, "value", 0).build())
        .unwrap();
    fx.faulty.break_service(CONTROL);

    let report = fx.directory.refresh(RefreshTarget::All).unwrap();
    assert_eq!(report.refreshed, vec![SENSORS.to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(&report.failed[0], CrawlError::Aborted { service, .. } if service == CONTROL));

    assert!(fx.directory.get_object("/org/openbmc/control/fan0").is_ok());
    assert!(fx.directory.get_object("/org/openbmc/control/fan1").is_err());
    assert!(fx.directory.get_object("/org/openbmc/sensors/temp/t2").is_ok());
}

#[test]
fn vanished_service_is_dropped() {
    let fx = fixture();
    fx.directory.refresh(RefreshTarget::All).unwrap();

    fx.bus.unhost(CONTROL);
    let report = fx.directory.refresh(RefreshTarget::All).unwrap();
    assert_eq!(report.removed, vec![CONTROL.to_string()]);
    assert!(fx.directory.get_object("/org/openbmc/control/fan0").is_err());
    assert_eq!(services_at(&fx.directory, "/org/openbmc"), vec![SENSORS]);
}

#[test]
fn targeted_refresh_runs_on_a_worker() {
    let fx = fixture();
    let handle = fx
        .directory
        .refresh_async(RefreshTarget::Services(vec![SENSORS.to_string()]))
        .unwrap();
    let report = handle.join_timeout(Duration::from_secs(5)).unwrap();

    assert_eq!(report.refreshed, vec![SENSORS.to_string()]);
    assert_eq!(fx.directory.snapshot().services(), BTreeSet::from([SENSORS.to_string()]));
}

#[test]
fn lifecycle_signals_update_without_a_crawl() {
    let fx = fixture();
    fx.directory.refresh(RefreshTarget::All).unwrap();
    let stream = fx.control_hub.subscribe(SignalFilter::all());

    fx.control
        .add("/org/openbmc/control/fan2", BusObject::builder().property(FAN_IFACE, "speed", 0).build())
        .unwrap();
    fx.control.remove("/org/openbmc/control/fan0").unwrap();

    let calls_before = fx.bus.call_count();
    for envelope in stream.drain() {
        fx.directory.apply_signal(CONTROL, &envelope);
    }
    assert_eq!(fx.bus.call_count(), calls_before);

    assert!(fx.directory.get_object("/org/openbmc/control/fan2").unwrap()[CONTROL].contains(FAN_IFACE));
    assert!(fx.directory.get_object("/org/openbmc/control/fan0").is_err());

    assert!(fx.directory.service_removed(CONTROL));
    assert!(fx.directory.get_object("/org/openbmc/control/fan2").is_err());
}
