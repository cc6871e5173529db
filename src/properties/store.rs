//! Per-object property store.
//!
//! Properties are grouped by interface. Writes are diffed against the stored
//! value and only real changes are notified. Notifications pass through the
//! export gate: a store emits nothing until it is both attached to a sink and
//! unmasked, which the registry does as the last step of `add`.
//!
//! A commit and its notification happen under one emission lock, so
//! concurrent writers' signals arrive in commit order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::PropertyError;
use crate::signal::{Signal, SignalSink};
use crate::value::{InterfaceMap, PropertyMap, Value};

/// Hook consulted before every write.
pub trait PropertyValidator: Send + Sync {
    /// Returns `Err(reason)` to reject the write.
    fn validate(&self, interface: &str, property: &str, value: &Value) -> Result<(), String>;
}

impl<F> PropertyValidator for F
where
    F: Fn(&str, &str, &Value) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, interface: &str, property: &str, value: &Value) -> Result<(), String> {
        self(interface, property, value)
    }
}

#[derive(Clone)]
struct Binding {
    path: String,
    sink: Arc<dyn SignalSink>,
}

/// Keyed property bag with gated change notification.
pub struct PropertyStore {
    interfaces: RwLock<InterfaceMap>,
    unmasked: AtomicBool,
    binding: RwLock<Option<Binding>>,
    validator: Option<Arc<dyn PropertyValidator>>,
    emission: Mutex<()>,
}

impl std::fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyStore")
            .field("path", &self.path())
            .field("unmasked", &self.is_unmasked())
            .field("interfaces", &self.interfaces())
            .finish_non_exhaustive()
    }
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyStore {
    /// Creates an empty, masked, unattached store.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(None, InterfaceMap::new())
    }

    /// Creates a store whose writes are checked by `validator`.
    #[must_use]
    pub fn with_validator(validator: impl PropertyValidator + 'static) -> Self {
        Self::from_parts(Some(Arc::new(validator)), InterfaceMap::new())
    }

    /// Masked store pre-populated with `initial`, bypassing the validator.
    pub(crate) fn from_parts(validator: Option<Arc<dyn PropertyValidator>>, initial: InterfaceMap) -> Self {
        Self {
            interfaces: RwLock::new(initial),
            unmasked: AtomicBool::new(false),
            binding: RwLock::new(None),
            validator,
            emission: Mutex::new(()),
        }
    }

    pub fn get(&self, interface: &str, property: &str) -> Result<Value, PropertyError> {
        let guard = self.interfaces.read().unwrap_or_else(PoisonError::into_inner);
        let props = guard.get(interface).ok_or_else(|| PropertyError::UnknownInterface {
            interface: interface.to_string(),
        })?;
        props.get(property).cloned().ok_or_else(|| PropertyError::UnknownProperty {
            interface: interface.to_string(),
            property: property.to_string(),
        })
    }

    pub fn get_all(&self, interface: &str) -> Result<PropertyMap, PropertyError> {
        let guard = self.interfaces.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(interface).cloned().ok_or_else(|| PropertyError::UnknownInterface {
            interface: interface.to_string(),
        })
    }

    /// Writes one property. Returns whether the stored value changed.
    pub fn set(&self, interface: &str, property: &str, value: Value) -> Result<bool, PropertyError> {
        self.check(interface, property, &value)?;

        let _ordered = self.emission.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = {
            let mut guard = self.interfaces.write().unwrap_or_else(PoisonError::into_inner);
            let props = guard.entry(interface.to_string()).or_default();
            write_if_changed(props, property, &value)
        };

        if changed {
            let mut changed_props = PropertyMap::new();
            changed_props.insert(property.to_string(), value);
            self.properties_changed(interface, changed_props);
        }
        Ok(changed)
    }

    /// Writes several properties of one interface with at most one
    /// notification. Every entry is validated before anything is written.
    pub fn set_multiple(&self, interface: &str, values: PropertyMap) -> Result<bool, PropertyError> {
        for (property, value) in &values {
            self.check(interface, property, value)?;
        }

        let _ordered = self.emission.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = {
            let mut guard = self.interfaces.write().unwrap_or_else(PoisonError::into_inner);
            let props = guard.entry(interface.to_string()).or_default();
            let mut any = false;
            for (property, value) in &values {
                any |= write_if_changed(props, property, value);
            }
            any
        };

        if changed {
            self.properties_changed(interface, values);
        }
        Ok(changed)
    }

    /// Closes the export gate.
    pub fn mask(&self) {
        self.unmasked.store(false, Ordering::Release);
    }

    /// Opens the export gate.
    pub fn unmask(&self) {
        self.unmasked.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_unmasked(&self) -> bool {
        self.unmasked.load(Ordering::Acquire)
    }

    /// Interface names populated so far.
    #[must_use]
    pub fn interfaces(&self) -> Vec<String> {
        let guard = self.interfaces.read().unwrap_or_else(PoisonError::into_inner);
        guard.keys().cloned().collect()
    }

    #[must_use]
    pub fn has_interface(&self, interface: &str) -> bool {
        let guard = self.interfaces.read().unwrap_or_else(PoisonError::into_inner);
        guard.contains_key(interface)
    }

    /// Copy of every interface and property.
    #[must_use]
    pub fn snapshot(&self) -> InterfaceMap {
        self.interfaces.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Path this store is attached at, if any.
    #[must_use]
    pub fn path(&self) -> Option<String> {
        let guard = self.binding.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|b| b.path.clone())
    }

    /// Emits an object-specific signal through the export gate.
    ///
    /// Returns whether the signal went out.
    pub fn emit(&self, signal: Signal) -> bool {
        if !self.is_unmasked() {
            return false;
        }
        let binding = self.binding.read().unwrap_or_else(PoisonError::into_inner).clone();
        match binding {
            Some(b) => {
                b.sink.emit(&b.path, signal);
                true
            }
            None => false,
        }
    }

    pub(crate) fn attach(&self, path: &str, sink: Arc<dyn SignalSink>) {
        let mut guard = self.binding.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Binding {
            path: path.to_string(),
            sink,
        });
    }

    pub(crate) fn detach(&self) {
        self.mask();
        let mut guard = self.binding.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    fn check(&self, interface: &str, property: &str, value: &Value) -> Result<(), PropertyError> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };
        validator
            .validate(interface, property, value)
            .map_err(|reason| PropertyError::ValidationRejected {
                interface: interface.to_string(),
                property: property.to_string(),
                reason,
            })
    }

    fn properties_changed(&self, interface: &str, changed: PropertyMap) {
        self.emit(Signal::PropertiesChanged {
            interface: interface.to_string(),
            changed,
            invalidated: Vec::new(),
        });
    }
}

fn write_if_changed(props: &mut PropertyMap, property: &str, value: &Value) -> bool {
    if props.get(property) == Some(value) {
        return false;
    }
    props.insert(property.to_string(), value.clone());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{SignalFilter, SignalHub, SignalStream};

    const IFACE: &str = "org.openbmc.SensorValue";

    fn attached_store() -> (PropertyStore, Arc<SignalHub>, SignalStream) {
        let hub = Arc::new(SignalHub::default());
        let stream = hub.subscribe(SignalFilter::all());
        let store = PropertyStore::new();
        store.attach("/sensors/t0", hub.clone());
        store.unmask();
        (store, hub, stream)
    }

    #[test]
    fn unknown_interface_before_unknown_property() {
        let store = PropertyStore::new();
        assert_eq!(
            store.get(IFACE, "value"),
            Err(PropertyError::UnknownInterface {
                interface: IFACE.to_string()
            })
        );
        assert!(matches!(store.get_all(IFACE), Err(PropertyError::UnknownInterface { .. })));

        store.set(IFACE, "units", "C".into()).unwrap();
        assert!(matches!(store.get(IFACE, "value"), Err(PropertyError::UnknownProperty { .. })));
        assert_eq!(store.get(IFACE, "units").unwrap(), Value::from("C"));
    }

    #[test]
    fn set_is_idempotent() {
        let (store, _hub, stream) = attached_store();
        assert!(store.set(IFACE, "value", Value::Int(5)).unwrap());
        assert!(!store.set(IFACE, "value", Value::Int(5)).unwrap());

        let got = stream.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(
            got[0].signal,
            Signal::PropertiesChanged {
                interface: IFACE.to_string(),
                changed: PropertyMap::from([("value".to_string(), Value::Int(5))]),
                invalidated: vec![],
            }
        );
    }

    #[test]
    fn set_multiple_emits_one_combined_signal() {
        let (store, _hub, stream) = attached_store();
        let values = PropertyMap::from([
            ("a".to_string(), Value::Int(1)),
            ("b".to_string(), Value::Int(2)),
            ("c".to_string(), Value::Int(3)),
        ]);
        assert!(store.set_multiple(IFACE, values.clone()).unwrap());
        assert_eq!(stream.drain().len(), 1);

        // Nothing changed: no signal at all.
        assert!(!store.set_multiple(IFACE, values.clone()).unwrap());
        assert!(stream.drain().is_empty());

        // One of three changed: still exactly one.
        let mut values = values;
        values.insert("b".to_string(), Value::Int(20));
        assert!(store.set_multiple(IFACE, values).unwrap());
        assert_eq!(stream.drain().len(), 1);
        assert_eq!(store.get(IFACE, "b").unwrap(), Value::Int(20));
    }

    #[test]
    fn masked_store_is_silent() {
        let (store, hub, stream) = attached_store();
        store.mask();
        store.set(IFACE, "value", Value::Int(1)).unwrap();
        store.set_multiple(IFACE, PropertyMap::from([("x".to_string(), Value::Bool(true))])).unwrap();
        assert!(stream.drain().is_empty());
        assert_eq!(hub.emitted_signals(), 0);

        store.unmask();
        store.set(IFACE, "value", Value::Int(2)).unwrap();
        assert_eq!(stream.drain().len(), 1);
    }

    #[test]
    fn unattached_store_is_silent_even_when_unmasked() {
        let store = PropertyStore::new();
        store.unmask();
        assert!(store.set(IFACE, "value", Value::Int(1)).unwrap());
        assert!(!store.emit(Signal::Emergency {
            reading: Value::Int(1)
        }));
    }

    #[test]
    fn validator_rejects_and_keeps_prior_value() {
        let store = PropertyStore::with_validator(|_: &str, prop: &str, v: &Value| {
            if prop == "value" && !v.is_numeric() {
                return Err("value must be numeric".to_string());
            }
            Ok(())
        });
        store.set(IFACE, "value", Value::Double(1.5)).unwrap();

        let err = store.set(IFACE, "value", "hot".into()).unwrap_err();
        assert!(matches!(err, PropertyError::ValidationRejected { .. }));
        assert_eq!(store.get(IFACE, "value").unwrap(), Value::Double(1.5));

        // A rejected entry aborts the whole batch.
        let batch = PropertyMap::from([
            ("units".to_string(), Value::from("C")),
            ("value".to_string(), Value::from("hot")),
        ]);
        assert!(store.set_multiple(IFACE, batch).is_err());
        assert!(matches!(store.get(IFACE, "units"), Err(PropertyError::UnknownProperty { .. })));
    }

    #[test]
    fn concurrent_writers_notify_in_commit_order() {
        let (store, _hub, stream) = attached_store();
        let store = Arc::new(store);
        let writers: Vec<_> = (0..2i64)
            .map(|w| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.set(IFACE, "value", Value::Int(w * 1000 + i)).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let last = stream
            .drain()
            .into_iter()
            .filter_map(|e| match e.signal {
                Signal::PropertiesChanged { changed, .. } => changed.get("value").cloned(),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(last, store.get(IFACE, "value").unwrap());
    }

    #[test]
    fn detach_masks() {
        let (store, _hub, stream) = attached_store();
        store.detach();
        assert!(!store.is_unmasked());
        assert!(store.path().is_none());
        store.set(IFACE, "value", Value::Int(9)).unwrap();
        assert!(stream.drain().is_empty());
    }
}
