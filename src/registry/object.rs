//! Exported objects and the two-phase construction protocol.
//!
//! Objects are built unregistered: their property store is masked and not
//! attached to any sink, so populating it is silent. Only
//! [`ObjectRegistry::add`](super::ObjectRegistry::add) turns an
//! [`Unregistered`] object into a live, notifying one.

use std::sync::Arc;

use crate::error::{MapperResult, RegistryError};
use crate::introspect::InterfaceDecl;
use crate::properties::{PropertyStore, PropertyValidator};
use crate::value::{InterfaceMap, PropertyMap, Value};

/// An object that can be exported on the bus.
pub trait ExportedObject: Send + Sync {
    /// The object's property store.
    fn properties(&self) -> &PropertyStore;

    /// Method and signal declarations beyond the standard interfaces.
    fn declared_interfaces(&self) -> Vec<InterfaceDecl> {
        Vec::new()
    }

    /// Bus-side `Properties.Set`. Objects whose properties drive behavior
    /// override this to route the write through it.
    fn set_property(&self, interface: &str, property: &str, value: Value) -> MapperResult<bool> {
        Ok(self.properties().set(interface, property, value)?)
    }

    /// Bus-side `SetMultiple`.
    fn set_properties(&self, interface: &str, values: PropertyMap) -> MapperResult<bool> {
        Ok(self.properties().set_multiple(interface, values)?)
    }

    /// Invokes an object-specific method.
    fn invoke(&self, interface: &str, member: &str, _args: &[Value]) -> MapperResult<Option<Value>> {
        Err(RegistryError::UnknownMethod {
            path: self.properties().path().unwrap_or_default(),
            interface: interface.to_string(),
            member: member.to_string(),
        }
        .into())
    }
}

/// An object that has been built but not yet registered.
#[derive(Debug)]
pub struct Unregistered<O> {
    object: O,
}

impl<O: ExportedObject> Unregistered<O> {
    /// Wraps a freshly built object, closing its export gate.
    pub fn new(object: O) -> Self {
        object.properties().mask();
        Self { object }
    }

    /// Read access for inspection before registration.
    pub const fn object(&self) -> &O {
        &self.object
    }

    pub(crate) fn into_inner(self) -> O {
        self.object
    }
}

/// An object that is nothing but properties.
#[derive(Debug, Default)]
pub struct BusObject {
    store: PropertyStore,
}

impl BusObject {
    /// Starts building a property-only object.
    #[must_use]
    pub fn builder() -> ObjectBuilder {
        ObjectBuilder::default()
    }
}

impl ExportedObject for BusObject {
    fn properties(&self) -> &PropertyStore {
        &self.store
    }
}

/// Builder for [`BusObject`].
#[derive(Default)]
pub struct ObjectBuilder {
    interfaces: InterfaceMap,
    validator: Option<Arc<dyn PropertyValidator>>,
}

impl ObjectBuilder {
    /// Declares an interface, with no properties yet.
    #[must_use]
    pub fn interface(mut self, interface: &str) -> Self {
        self.interfaces.entry(interface.to_string()).or_default();
        self
    }

    #[must_use]
    pub fn property(mut self, interface: &str, name: &str, value: impl Into<Value>) -> Self {
        self.interfaces
            .entry(interface.to_string())
            .or_default()
            .insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn properties(mut self, interface: &str, values: PropertyMap) -> Self {
        self.interfaces.entry(interface.to_string()).or_default().extend(values);
        self
    }

    /// Checks every later write. Initial values are not validated.
    #[must_use]
    pub fn validator(mut self, validator: impl PropertyValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    #[must_use]
    pub fn build(self) -> Unregistered<BusObject> {
        let store = PropertyStore::from_parts(self.validator, self.interfaces);
        Unregistered::new(BusObject { store })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapperError;

    #[test]
    fn builder_seeds_masked_store() {
        let obj = BusObject::builder()
            .property("org.openbmc.Control", "state", 1)
            .interface("org.openbmc.Marker")
            .build();
        let store = obj.object().properties();
        assert!(!store.is_unmasked());
        assert_eq!(store.get("org.openbmc.Control", "state").unwrap(), Value::Int(1));
        assert!(store.get_all("org.openbmc.Marker").unwrap().is_empty());
    }

    #[test]
    fn default_invoke_is_unknown_method() {
        let obj = BusObject::builder().build().into_inner();
        let err = obj.invoke("x.Y", "Z", &[]).unwrap_err();
        assert!(matches!(err, MapperError::Registry(RegistryError::UnknownMethod { .. })));
    }

    #[test]
    fn validator_applies_after_build() {
        let obj = BusObject::builder()
            .property("x.Y", "v", 1)
            .validator(|_: &str, _: &str, v: &Value| {
                if v.as_i64().is_some_and(|n| n < 0) {
                    Err("negative".to_string())
                } else {
                    Ok(())
                }
            })
            .build();
        let store = obj.object().properties();
        assert!(store.set("x.Y", "v", Value::Int(-1)).is_err());
        assert!(store.set("x.Y", "v", Value::Int(2)).is_ok());
    }
}
