use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bus::RemoteBus;
use crate::error::{MapperResult, RegistryError};
use crate::introspect::{ArgDecl, InterfaceDecl};
use crate::names::SENSOR_VALUE_IFACE;
use crate::properties::PropertyStore;
use crate::registry::{ExportedObject, Unregistered};
use crate::value::{InterfaceMap, PropertyMap, Value};

use super::local::{ERROR, UNITS, VALUE};

/// A property owned by another service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProperty {
    pub service: String,
    pub path: String,
    pub interface: String,
    pub property: String,
}

/// A sensor whose value lives in another service.
///
/// The local store keeps the last value seen. Callers pick between the
/// cached copy and a live fetch; neither is treated as authoritative.
pub struct SettingsSensor {
    store: PropertyStore,
    bus: Arc<dyn RemoteBus>,
    source: RemoteProperty,
    timeout: Duration,
}

impl std::fmt::Debug for SettingsSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsSensor")
            .field("store", &self.store)
            .field("source", &self.source)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SettingsSensor {
    /// Builds an unregistered settings sensor. Nothing is fetched yet, so
    /// [`cached_get`](Self::cached_get) fails until the first live read or
    /// write.
    #[must_use]
    pub fn new(bus: Arc<dyn RemoteBus>, source: RemoteProperty, units: &str, timeout: Duration) -> Unregistered<Self> {
        let interfaces = InterfaceMap::from([(
            SENSOR_VALUE_IFACE.to_string(),
            PropertyMap::from([
                (UNITS.to_string(), Value::String(units.to_string())),
                (ERROR.to_string(), Value::Bool(false)),
            ]),
        )]);
        Unregistered::new(Self {
            store: PropertyStore::from_parts(None, interfaces),
            bus,
            source,
            timeout,
        })
    }

    #[must_use]
    pub const fn source(&self) -> &RemoteProperty {
        &self.source
    }

    /// Last value seen, without a remote call.
    pub fn cached_get(&self) -> MapperResult<Value> {
        Ok(self.store.get(SENSOR_VALUE_IFACE, VALUE)?)
    }

    /// Fetches the value from its owner and refreshes the cache.
    pub fn live_get(&self) -> MapperResult<Value> {
        let src = &self.source;
        let value = self
            .bus
            .get_property(&src.service, &src.path, &src.interface, &src.property, self.timeout)
            .inspect_err(|err| {
                tracing::debug!(service = %src.service, path = %src.path, error = %err, "live read failed");
            })?;
        self.store.set(SENSOR_VALUE_IFACE, VALUE, value.clone())?;
        Ok(value)
    }

    /// Writes the value at its owner, then caches it.
    ///
    /// Returns whether the cached value changed.
    pub fn set_value(&self, value: impl Into<Value>) -> MapperResult<bool> {
        let value = value.into();
        self.write_remote(value.clone())?;
        Ok(self.store.set(SENSOR_VALUE_IFACE, VALUE, value)?)
    }

    fn write_remote(&self, value: Value) -> MapperResult<()> {
        let src = &self.source;
        self.bus
            .set_property(&src.service, &src.path, &src.interface, &src.property, value, self.timeout)?;
        Ok(())
    }
}

impl ExportedObject for SettingsSensor {
    fn properties(&self) -> &PropertyStore {
        &self.store
    }

    fn declared_interfaces(&self) -> Vec<InterfaceDecl> {
        vec![InterfaceDecl::new(SENSOR_VALUE_IFACE)
            .method("setValue", vec![ArgDecl::input("value", "v")])
            .method("getValue", vec![ArgDecl::output("value", "v")])]
    }

    fn set_property(&self, interface: &str, property: &str, value: Value) -> MapperResult<bool> {
        if interface == SENSOR_VALUE_IFACE && property == VALUE {
            return self.set_value(value);
        }
        Ok(self.store.set(interface, property, value)?)
    }

    fn set_properties(&self, interface: &str, values: PropertyMap) -> MapperResult<bool> {
        if let (SENSOR_VALUE_IFACE, Some(value)) = (interface, values.get(VALUE)) {
            self.write_remote(value.clone())?;
        }
        Ok(self.store.set_multiple(interface, values)?)
    }

    /// `getValue` reads live; the cache is only a fallback for local callers.
    fn invoke(&self, interface: &str, member: &str, args: &[Value]) -> MapperResult<Option<Value>> {
        match (interface, member, args) {
            (SENSOR_VALUE_IFACE, "setValue", [value]) => {
                self.set_value(value.clone())?;
                Ok(None)
            }
            (SENSOR_VALUE_IFACE, "setValue", _) => Err(RegistryError::InvalidArgs {
                member: member.to_string(),
                reason: format!("expected 1 argument, got {}", args.len()),
            }
            .into()),
            (SENSOR_VALUE_IFACE, "getValue", _) => Ok(Some(self.live_get()?)),
            _ => Err(RegistryError::UnknownMethod {
                path: self.store.path().unwrap_or_default(),
                interface: interface.to_string(),
                member: member.to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::config::RegistryConfig;
    use crate::error::{MapperError, PropertyError};
    use crate::registry::{BusObject, MethodCall, ObjectRegistry};
    use crate::signal::SignalHub;

    const SETTINGS: &str = "org.openbmc.settings.Host";
    const SETTINGS_IFACE: &str = "org.openbmc.settings.Host";

    fn setup() -> (Arc<LocalBus>, Unregistered<SettingsSensor>) {
        let reg = Arc::new(ObjectRegistry::new(RegistryConfig::default(), Arc::new(SignalHub::default())));
        reg.add(
            "/org/openbmc/settings/host0",
            BusObject::builder().property(SETTINGS_IFACE, "power_cap", 300).build(),
        )
        .unwrap();
        let bus = Arc::new(LocalBus::new());
        bus.host(SETTINGS, reg);

        let sensor = SettingsSensor::new(
            bus.clone(),
            RemoteProperty {
                service: SETTINGS.into(),
                path: "/org/openbmc/settings/host0".into(),
                interface: SETTINGS_IFACE.into(),
                property: "power_cap".into(),
            },
            "W",
            Duration::from_millis(100),
        );
        (bus, sensor)
    }

    #[test]
    fn cache_is_empty_until_first_live_read() {
        let (_bus, sensor) = setup();
        let sensor = sensor.into_inner();
        let err = sensor.cached_get().unwrap_err();
        assert!(matches!(err, MapperError::Property(PropertyError::UnknownProperty { .. })));

        assert_eq!(sensor.live_get().unwrap(), Value::Int(300));
        assert_eq!(sensor.cached_get().unwrap(), Value::Int(300));
    }

    #[test]
    fn cached_and_live_can_diverge() {
        let (bus, sensor) = setup();
        let sensor = sensor.into_inner();
        sensor.live_get().unwrap();

        let owner = bus.registry(SETTINGS).unwrap();
        owner
            .get("/org/openbmc/settings/host0")
            .unwrap()
            .properties()
            .set(SETTINGS_IFACE, "power_cap", Value::Int(250))
            .unwrap();

        assert_eq!(sensor.cached_get().unwrap(), Value::Int(300));
        assert_eq!(sensor.live_get().unwrap(), Value::Int(250));
    }

    #[test]
    fn set_value_writes_remote_first() {
        let (bus, sensor) = setup();
        let sensor = sensor.into_inner();
        sensor.set_value(275).unwrap();
        assert_eq!(sensor.cached_get().unwrap(), Value::Int(275));
        let remote = bus
            .get_property(SETTINGS, "/org/openbmc/settings/host0", SETTINGS_IFACE, "power_cap", Duration::from_millis(10))
            .unwrap();
        assert_eq!(remote, Value::Int(275));

        bus.unhost(SETTINGS);
        assert!(sensor.set_value(1).is_err());
        assert_eq!(sensor.cached_get().unwrap(), Value::Int(275));
    }

    #[test]
    fn property_set_over_the_bus_reaches_the_owner() {
        let (bus, sensor) = setup();
        let reg = ObjectRegistry::new(RegistryConfig::default(), Arc::new(SignalHub::default()));
        let path = "/org/openbmc/sensors/power/cap";
        let sensor = reg.add(path, sensor).unwrap();

        reg.dispatch(path, MethodCall::Set {
            interface: SENSOR_VALUE_IFACE.into(),
            property: VALUE.into(),
            value: Value::Int(260),
        })
        .unwrap();

        let remote = bus
            .get_property(SETTINGS, "/org/openbmc/settings/host0", SETTINGS_IFACE, "power_cap", Duration::from_millis(10))
            .unwrap();
        assert_eq!(remote, Value::Int(260));
        assert_eq!(sensor.cached_get().unwrap(), Value::Int(260));

        bus.unhost(SETTINGS);
        let fault = reg
            .dispatch(path, MethodCall::SetMultiple {
                interface: SENSOR_VALUE_IFACE.into(),
                values: PropertyMap::from([(VALUE.to_string(), Value::Int(1))]),
            })
            .unwrap_err();
        assert_eq!(fault.name, crate::names::ERROR_SERVICE_UNKNOWN);
        assert_eq!(sensor.cached_get().unwrap(), Value::Int(260));
    }
}
