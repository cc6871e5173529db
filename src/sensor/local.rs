use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{MapperResult, RegistryError};
use crate::introspect::{ArgDecl, InterfaceDecl};
use crate::names::{SENSOR_THRESHOLDS_IFACE, SENSOR_VALUE_IFACE};
use crate::properties::PropertyStore;
use crate::registry::{ExportedObject, Unregistered};
use crate::signal::Signal;
use crate::value::{InterfaceMap, PropertyMap, Value};

use super::threshold::{
    ThresholdConfig, ThresholdEngine, ThresholdOutcome, ThresholdState, THRESHOLD_STATE, WORST_THRESHOLD_STATE,
};

pub(crate) const VALUE: &str = "value";
pub(crate) const UNITS: &str = "units";
pub(crate) const ERROR: &str = "error";

/// What a poll cycle should do with the hardware reading.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The scaled reading was stored.
    Updated { value: Value, changed: bool },
    /// A bus client wrote the value since the last poll. The caller should
    /// write this back to the hardware instead of overwriting it.
    WriteBack(Value),
}

/// A sensor: a value on `org.openbmc.SensorValue`, optionally watched by a
/// threshold engine exported on `org.openbmc.SensorThresholds`.
pub struct Sensor {
    store: PropertyStore,
    thresholds: Option<Mutex<ThresholdEngine>>,
    scale: f64,
    offset: f64,
    pending_write: AtomicBool,
}

impl std::fmt::Debug for Sensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sensor")
            .field("store", &self.store)
            .field("has_thresholds", &self.thresholds.is_some())
            .field("scale", &self.scale)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl Sensor {
    #[must_use]
    pub fn builder() -> SensorBuilder {
        SensorBuilder::default()
    }

    pub fn value(&self) -> MapperResult<Value> {
        Ok(self.store.get(SENSOR_VALUE_IFACE, VALUE)?)
    }

    /// Stores a new value and, for numeric values, runs the thresholds.
    ///
    /// Returns whether the stored value changed.
    pub fn set_value(&self, value: impl Into<Value>) -> MapperResult<bool> {
        let value = value.into();
        let changed = self.store.set(SENSOR_VALUE_IFACE, VALUE, value.clone())?;
        if let Some(reading) = value.as_f64() {
            self.evaluate(reading, value)?;
        }
        Ok(changed)
    }

    /// A value written by a bus client: stored, evaluated, and held for
    /// write-back on the next poll.
    fn write_from_bus(&self, value: Value) -> MapperResult<bool> {
        let changed = self.set_value(value)?;
        self.pending_write.store(true, Ordering::Release);
        Ok(changed)
    }

    /// Reconciles a raw hardware reading with the bus-side value.
    pub fn poll_reconcile(&self, raw: f64) -> MapperResult<PollOutcome> {
        if self.pending_write.swap(false, Ordering::AcqRel) {
            return Ok(PollOutcome::WriteBack(self.value()?));
        }
        let value = Value::Double(raw.mul_add(self.scale, self.offset));
        let changed = self.set_value(value.clone())?;
        Ok(PollOutcome::Updated { value, changed })
    }

    /// Clears the worst threshold state. No-op without thresholds.
    pub fn reset_thresholds(&self) -> MapperResult<()> {
        let Some(engine) = &self.thresholds else {
            return Ok(());
        };
        let (current, worst) = {
            let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
            engine.reset();
            (engine.current(), engine.worst())
        };
        self.store.set_multiple(SENSOR_THRESHOLDS_IFACE, state_props(current, worst))?;
        Ok(())
    }

    /// Current threshold engine state, if thresholds are configured.
    #[must_use]
    pub fn threshold_engine(&self) -> Option<ThresholdEngine> {
        self.thresholds
            .as_ref()
            .map(|e| e.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn evaluate(&self, reading: f64, value: Value) -> MapperResult<Option<ThresholdOutcome>> {
        let Some(engine) = &self.thresholds else {
            return Ok(None);
        };
        // Bounds may have been rewritten over the bus.
        let config = ThresholdConfig::from_properties(&self.store.get_all(SENSOR_THRESHOLDS_IFACE)?);
        let (outcome, worst) = {
            let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
            engine.set_config(config);
            (engine.evaluate(reading), engine.worst())
        };
        if config.enabled {
            self.store.set_multiple(SENSOR_THRESHOLDS_IFACE, state_props(outcome.state, worst))?;
        }
        if outcome.emergency {
            tracing::warn!(path = ?self.store.path(), %value, "sensor entered critical state");
            self.store.emit(Signal::Emergency { reading: value });
        }
        Ok(Some(outcome))
    }
}

fn state_props(current: ThresholdState, worst: ThresholdState) -> PropertyMap {
    PropertyMap::from([
        (THRESHOLD_STATE.to_string(), Value::from(current)),
        (WORST_THRESHOLD_STATE.to_string(), Value::from(worst)),
    ])
}

fn one_arg<'a>(member: &str, args: &'a [Value]) -> MapperResult<&'a Value> {
    match args {
        [v] => Ok(v),
        _ => Err(RegistryError::InvalidArgs {
            member: member.to_string(),
            reason: format!("expected 1 argument, got {}", args.len()),
        }
        .into()),
    }
}

impl ExportedObject for Sensor {
    fn properties(&self) -> &PropertyStore {
        &self.store
    }

    fn declared_interfaces(&self) -> Vec<InterfaceDecl> {
        let mut decls = vec![InterfaceDecl::new(SENSOR_VALUE_IFACE)
            .method("setValue", vec![ArgDecl::input("value", "v")])
            .method("getValue", vec![ArgDecl::output("value", "v")])];
        if self.thresholds.is_some() {
            decls.push(
                InterfaceDecl::new(SENSOR_THRESHOLDS_IFACE)
                    .method("resetThresholdState", vec![])
                    .signal("Emergency", vec![ArgDecl::output("reading", "v")]),
            );
        }
        decls
    }

    fn set_property(&self, interface: &str, property: &str, value: Value) -> MapperResult<bool> {
        if interface == SENSOR_VALUE_IFACE && property == VALUE {
            return self.write_from_bus(value);
        }
        Ok(self.store.set(interface, property, value)?)
    }

    fn set_properties(&self, interface: &str, values: PropertyMap) -> MapperResult<bool> {
        let written = if interface == SENSOR_VALUE_IFACE {
            values.get(VALUE).cloned()
        } else {
            None
        };
        let changed = self.store.set_multiple(interface, values)?;
        if let Some(value) = written {
            self.pending_write.store(true, Ordering::Release);
            if let Some(reading) = value.as_f64() {
                self.evaluate(reading, value)?;
            }
        }
        Ok(changed)
    }

    fn invoke(&self, interface: &str, member: &str, args: &[Value]) -> MapperResult<Option<Value>> {
        match (interface, member) {
            (SENSOR_VALUE_IFACE, "setValue") => {
                self.write_from_bus(one_arg(member, args)?.clone())?;
                Ok(None)
            }
            (SENSOR_VALUE_IFACE, "getValue") => Ok(Some(self.value()?)),
            (SENSOR_THRESHOLDS_IFACE, "resetThresholdState") if self.thresholds.is_some() => {
                self.reset_thresholds()?;
                Ok(None)
            }
            _ => Err(RegistryError::UnknownMethod {
                path: self.store.path().unwrap_or_default(),
                interface: interface.to_string(),
                member: member.to_string(),
            }
            .into()),
        }
    }
}

/// Builder for [`Sensor`].
#[derive(Debug, Clone)]
pub struct SensorBuilder {
    value: Value,
    units: String,
    thresholds: Option<ThresholdConfig>,
    scale: f64,
    offset: f64,
}

impl Default for SensorBuilder {
    fn default() -> Self {
        Self {
            value: Value::Int(0),
            units: String::new(),
            thresholds: None,
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl SensorBuilder {
    #[must_use]
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    #[must_use]
    pub fn units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }

    #[must_use]
    pub const fn thresholds(mut self, config: ThresholdConfig) -> Self {
        self.thresholds = Some(config);
        self
    }

    /// Poll readings are stored as `raw * scale + offset`.
    #[must_use]
    pub const fn scaling(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn build(self) -> Unregistered<Sensor> {
        let mut interfaces = InterfaceMap::new();
        interfaces.insert(
            SENSOR_VALUE_IFACE.to_string(),
            PropertyMap::from([
                (VALUE.to_string(), self.value),
                (UNITS.to_string(), Value::String(self.units)),
                (ERROR.to_string(), Value::Bool(false)),
            ]),
        );
        if let Some(cfg) = &self.thresholds {
            let mut props = cfg.to_properties();
            props.extend(state_props(ThresholdState::Normal, ThresholdState::Normal));
            interfaces.insert(SENSOR_THRESHOLDS_IFACE.to_string(), props);
        }
        Unregistered::new(Sensor {
            store: PropertyStore::from_parts(None, interfaces),
            thresholds: self.thresholds.map(|cfg| Mutex::new(ThresholdEngine::new(cfg))),
            scale: self.scale,
            offset: self.offset,
            pending_write: AtomicBool::new(false),
        })
    }
}
