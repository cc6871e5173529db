//! Routes incoming bus method calls to registered objects.

use serde::{Deserialize, Serialize};

use crate::error::{BusError, MapperError, RegistryError};
use crate::names;
use crate::value::{PropertyMap, Value};

use super::{Enumeration, ManagedObjects, ObjectRegistry};

/// A method call addressed to one object path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MethodCall {
    Get {
        interface: String,
        property: String,
    },
    GetAll {
        interface: String,
    },
    Set {
        interface: String,
        property: String,
        value: Value,
    },
    SetMultiple {
        interface: String,
        values: PropertyMap,
    },
    GetManagedObjects,
    Enumerate,
    Introspect,
    /// Object-specific method.
    Invoke {
        interface: String,
        member: String,
        args: Vec<Value>,
    },
}

impl MethodCall {
    /// `(interface, member)` as it would appear on the wire.
    #[must_use]
    pub fn member(&self) -> (&str, &str) {
        match self {
            Self::Get { .. } => (names::PROPERTIES_IFACE, "Get"),
            Self::GetAll { .. } => (names::PROPERTIES_IFACE, "GetAll"),
            Self::Set { .. } => (names::PROPERTIES_IFACE, "Set"),
            Self::SetMultiple { .. } => (names::OBJECT_PROPERTIES_IFACE, "SetMultiple"),
            Self::GetManagedObjects => (names::OBJECT_MANAGER_IFACE, "GetManagedObjects"),
            Self::Enumerate => (names::ENUMERATE_IFACE, "enumerate"),
            Self::Introspect => (names::INTROSPECTABLE_IFACE, "Introspect"),
            Self::Invoke { interface, member, .. } => (interface, member),
        }
    }
}

/// Successful reply to a [`MethodCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Reply {
    Empty,
    Value(Value),
    Properties(PropertyMap),
    ManagedObjects(ManagedObjects),
    Enumeration(Enumeration),
    Introspection(String),
}

/// Error reply: a dotted fault name plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusFault {
    pub name: String,
    pub message: String,
}

impl From<&MapperError> for BusFault {
    fn from(err: &MapperError) -> Self {
        Self {
            name: err.fault_name().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<MapperError> for BusFault {
    fn from(err: MapperError) -> Self {
        Self::from(&err)
    }
}

impl From<BusFault> for BusError {
    fn from(fault: BusFault) -> Self {
        Self::Remote {
            name: fault.name,
            message: fault.message,
        }
    }
}

impl ObjectRegistry {
    /// Handles one method call against `path`.
    ///
    /// Bulk snapshot calls are only served at the manager path; everything
    /// else needs an object registered at `path` (except `Introspect`, which
    /// also answers for intermediate nodes).
    pub fn dispatch(&self, path: &str, call: MethodCall) -> Result<Reply, BusFault> {
        let (interface, member) = call.member();
        tracing::trace!(path, interface, member, "dispatch");
        self.dispatch_inner(path, call).map_err(|err| {
            tracing::debug!(path, error = %err, "method call failed");
            BusFault::from(err)
        })
    }

    fn dispatch_inner(&self, path: &str, call: MethodCall) -> Result<Reply, MapperError> {
        match call {
            MethodCall::Introspect => return self.introspect(path).map(Reply::Introspection),
            MethodCall::GetManagedObjects | MethodCall::Enumerate if path == self.manager_path() => {
                return Ok(match call {
                    MethodCall::Enumerate => Reply::Enumeration(self.enumerate()),
                    _ => Reply::ManagedObjects(self.get_managed_objects()),
                });
            }
            _ => {}
        }

        let object = self.get(path).ok_or_else(|| RegistryError::UnknownPath { path: path.to_string() })?;
        let store = object.properties();
        match call {
            MethodCall::Get { interface, property } => Ok(Reply::Value(store.get(&interface, &property)?)),
            MethodCall::GetAll { interface } => Ok(Reply::Properties(store.get_all(&interface)?)),
            MethodCall::Set {
                interface,
                property,
                value,
            } => {
                object.set_property(&interface, &property, value)?;
                Ok(Reply::Empty)
            }
            MethodCall::SetMultiple { interface, values } => {
                object.set_properties(&interface, values)?;
                Ok(Reply::Empty)
            }
            MethodCall::Invoke {
                interface,
                member,
                args,
            } => Ok(object
                .invoke(&interface, &member, &args)?
                .map_or(Reply::Empty, Reply::Value)),
            MethodCall::GetManagedObjects | MethodCall::Enumerate | MethodCall::Introspect => {
                let (interface, member) = call.member();
                Err(RegistryError::UnknownMethod {
                    path: path.to_string(),
                    interface: interface.to_string(),
                    member: member.to_string(),
                }
                .into())
            }
        }
    }
}

/// Unwraps a [`Reply::ManagedObjects`] body.
pub(crate) fn managed_objects_reply(reply: Reply) -> Result<ManagedObjects, Reply> {
    match reply {
        Reply::ManagedObjects(objects) => Ok(objects),
        other => Err(other),
    }
}

/// Unwraps a [`Reply::Introspection`] body.
pub(crate) fn introspection_reply(reply: Reply) -> Result<String, Reply> {
    match reply {
        Reply::Introspection(xml) => Ok(xml),
        other => Err(other),
    }
}

/// Unwraps a [`Reply::Value`] body.
pub(crate) fn value_reply(reply: Reply) -> Result<Value, Reply> {
    match reply {
        Reply::Value(v) => Ok(v),
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::RegistryConfig;
    use crate::registry::BusObject;
    use crate::signal::SignalHub;

    const IFACE: &str = "org.openbmc.Control";

    fn registry() -> ObjectRegistry {
        let reg = ObjectRegistry::new(RegistryConfig::default(), Arc::new(SignalHub::default()));
        reg.add("/org/openbmc/control/fan0", BusObject::builder().property(IFACE, "speed", 1200).build())
            .unwrap();
        reg
    }

    #[test]
    fn property_calls_round_through_store() {
        let reg = registry();
        let path = "/org/openbmc/control/fan0";
        reg.dispatch(path, MethodCall::Set {
            interface: IFACE.into(),
            property: "speed".into(),
            value: Value::Int(1500),
        })
        .unwrap();
        let reply = reg
            .dispatch(path, MethodCall::Get {
                interface: IFACE.into(),
                property: "speed".into(),
            })
            .unwrap();
        assert_eq!(reply, Reply::Value(Value::Int(1500)));
    }

    #[test]
    fn faults_carry_dotted_names() {
        let reg = registry();
        let fault = reg
            .dispatch("/org/openbmc/control/fan0", MethodCall::GetAll {
                interface: "org.openbmc.Nope".into(),
            })
            .unwrap_err();
        assert_eq!(fault.name, names::ERROR_UNKNOWN_INTERFACE);

        let fault = reg.dispatch("/org/openbmc/control/none", MethodCall::GetAll { interface: IFACE.into() }).unwrap_err();
        assert_eq!(fault.name, names::ERROR_UNKNOWN_OBJECT);

        let fault = reg
            .dispatch("/org/openbmc/control/fan0", MethodCall::Invoke {
                interface: IFACE.into(),
                member: "spin".into(),
                args: vec![],
            })
            .unwrap_err();
        assert_eq!(fault.name, names::ERROR_UNKNOWN_METHOD);
    }

    #[test]
    fn bulk_calls_only_at_manager_path() {
        let reg = registry();
        let reply = reg.dispatch(names::OBJ_PREFIX, MethodCall::GetManagedObjects).unwrap();
        let objects = managed_objects_reply(reply).unwrap();
        assert!(objects.contains_key("/org/openbmc/control/fan0"));

        let reply = reg.dispatch(names::OBJ_PREFIX, MethodCall::Enumerate).unwrap();
        assert!(matches!(reply, Reply::Enumeration(_)));

        let fault = reg.dispatch("/org/openbmc/control/fan0", MethodCall::GetManagedObjects).unwrap_err();
        assert_eq!(fault.name, names::ERROR_UNKNOWN_METHOD);
    }

    #[test]
    fn fault_converts_to_remote_bus_error() {
        let err: BusError = BusFault {
            name: names::ERROR_FAILED.into(),
            message: "boom".into(),
        }
        .into();
        assert!(!err.is_transient());
        assert_eq!(err.name(), names::ERROR_FAILED);
    }
}
