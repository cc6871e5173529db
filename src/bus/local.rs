use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::error::BusError;
use crate::registry::dispatch::{introspection_reply, managed_objects_reply, value_reply};
use crate::registry::{ManagedObjects, MethodCall, ObjectRegistry, Reply};
use crate::value::Value;

use super::RemoteBus;

struct Hosted {
    registry: Arc<ObjectRegistry>,
    unique: String,
    responsive: bool,
}

/// In-process bus: registries hosted under well-known service names.
///
/// Calls complete synchronously, so per-call timeouts are accepted but never
/// hit. A service marked unresponsive answers every call with `NoReply`.
#[derive(Default)]
pub struct LocalBus {
    services: RwLock<BTreeMap<String, Hosted>>,
    next_unique: AtomicU64,
    calls: AtomicU64,
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("LocalBus")
            .field("services", &services.keys().collect::<Vec<_>>())
            .field("calls", &self.call_count())
            .finish()
    }
}

impl LocalBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosts `registry` under `name`, replacing any previous owner.
    ///
    /// Returns the unique connection name (`:1.N`) assigned to it.
    pub fn host(&self, name: &str, registry: Arc<ObjectRegistry>) -> String {
        let n = self.next_unique.fetch_add(1, Ordering::Relaxed) + 1;
        let unique = format!(":1.{n}");
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        services.insert(name.to_string(), Hosted {
            registry,
            unique: unique.clone(),
            responsive: true,
        });
        tracing::debug!(service = name, unique = %unique, "service hosted");
        unique
    }

    /// Stops hosting `name`.
    pub fn unhost(&self, name: &str) -> Option<Arc<ObjectRegistry>> {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        services.remove(name).map(|h| h.registry)
    }

    /// Makes `name` stop (or resume) answering calls.
    pub fn set_unresponsive(&self, name: &str, unresponsive: bool) {
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(hosted) = services.get_mut(name) {
            hosted.responsive = !unresponsive;
        }
    }

    #[must_use]
    pub fn registry(&self, name: &str) -> Option<Arc<ObjectRegistry>> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        services.get(name).map(|h| Arc::clone(&h.registry))
    }

    /// Total calls received, failed ones included.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Sends one method call to `service`, by well-known or unique name.
    pub fn call(&self, service: &str, path: &str, call: MethodCall) -> Result<Reply, BusError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let registry = {
            let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
            let hosted = services
                .get(service)
                .or_else(|| services.values().find(|h| h.unique == service))
                .ok_or_else(|| BusError::ServiceUnknown {
                    service: service.to_string(),
                })?;
            if !hosted.responsive {
                return Err(BusError::NoReply {
                    service: service.to_string(),
                    path: path.to_string(),
                });
            }
            Arc::clone(&hosted.registry)
        };
        registry.dispatch(path, call).map_err(BusError::from)
    }
}

fn unexpected(reply: &Reply) -> BusError {
    BusError::Remote {
        name: crate::names::ERROR_FAILED.to_string(),
        message: format!("unexpected reply {reply:?}"),
    }
}

fn expect_reply<T>(reply: Reply, unwrap: impl FnOnce(Reply) -> Result<T, Reply>) -> Result<T, BusError> {
    unwrap(reply).map_err(|other| unexpected(&other))
}

impl RemoteBus for LocalBus {
    fn list_names(&self) -> Result<Vec<String>, BusError> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.extend(services.values().map(|h| h.unique.clone()));
        Ok(names)
    }

    fn introspect(&self, service: &str, path: &str, _timeout: Duration) -> Result<String, BusError> {
        let reply = self.call(service, path, MethodCall::Introspect)?;
        expect_reply(reply, introspection_reply)
    }

    fn get_managed_objects(&self, service: &str, path: &str, _timeout: Duration) -> Result<ManagedObjects, BusError> {
        let reply = self.call(service, path, MethodCall::GetManagedObjects)?;
        expect_reply(reply, managed_objects_reply)
    }

    fn get_property(
        &self,
        service: &str,
        path: &str,
        interface: &str,
        property: &str,
        _timeout: Duration,
    ) -> Result<Value, BusError> {
        let reply = self.call(service, path, MethodCall::Get {
            interface: interface.to_string(),
            property: property.to_string(),
        })?;
        expect_reply(reply, value_reply)
    }

    fn set_property(
        &self,
        service: &str,
        path: &str,
        interface: &str,
        property: &str,
        value: Value,
        _timeout: Duration,
    ) -> Result<(), BusError> {
        self.call(service, path, MethodCall::Set {
            interface: interface.to_string(),
            property: property.to_string(),
            value,
        })
        .map(|_| ())
    }
}
