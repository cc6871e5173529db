//! Object registry.
//!
//! The registry owns every exported object of a process, keyed by path. It
//! answers bulk snapshot queries (`GetManagedObjects`, legacy `Enumerate`),
//! renders introspection data for the object tree, and emits lifecycle
//! signals when objects come and go.

/// Bus method dispatch.
pub mod dispatch;
/// Exported objects and builders.
pub mod object;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::RegistryConfig;
use crate::error::{MapperResult, RegistryError};
use crate::introspect::{render_node, ArgDecl, InterfaceDecl, IntrospectionNode};
use crate::names;
use crate::path;
use crate::signal::{Signal, SignalSink};
use crate::value::{InterfaceMap, PropertyMap};

pub use dispatch::{BusFault, MethodCall, Reply};
pub use object::{BusObject, ExportedObject, ObjectBuilder, Unregistered};

/// Bulk snapshot: path → interface → properties.
pub type ManagedObjects = BTreeMap<String, InterfaceMap>;

/// Legacy snapshot: path → properties of every interface merged together.
pub type Enumeration = BTreeMap<String, PropertyMap>;

/// What `add` does when the path is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Fail with `PathInUse`.
    #[default]
    Reject,
    /// Remove the previous object (with its `InterfacesRemoved`) first.
    Replace,
}

/// Live exported objects of one process.
pub struct ObjectRegistry {
    cfg: RegistryConfig,
    objects: RwLock<BTreeMap<String, Arc<dyn ExportedObject>>>,
    sink: Arc<dyn SignalSink>,
    unmasked: AtomicBool,
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("cfg", &self.cfg)
            .field("paths", &self.paths())
            .field("unmasked", &self.is_unmasked())
            .finish_non_exhaustive()
    }
}

impl ObjectRegistry {
    /// Creates an empty registry emitting through `sink`. The registry's own
    /// gate starts open.
    pub fn new(cfg: RegistryConfig, sink: Arc<dyn SignalSink>) -> Self {
        Self {
            cfg,
            objects: RwLock::new(BTreeMap::new()),
            sink,
            unmasked: AtomicBool::new(true),
        }
    }

    /// Path serving `GetManagedObjects`.
    #[must_use]
    pub fn manager_path(&self) -> &str {
        &self.cfg.manager_path
    }

    /// Registers `object` at `path` and opens its export gate.
    pub fn add<O: ExportedObject + 'static>(&self, path: &str, object: Unregistered<O>) -> MapperResult<Arc<O>> {
        path::validate(path)?;
        let object = Arc::new(object.into_inner());
        let shared: Arc<dyn ExportedObject> = object.clone();

        let replaced = {
            let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
            if objects.contains_key(path) && self.cfg.policy == RegistrationPolicy::Reject {
                return Err(RegistryError::PathInUse { path: path.to_string() }.into());
            }
            objects.insert(path.to_string(), shared)
        };

        if let Some(old) = replaced {
            tracing::debug!(path, "replacing registered object");
            self.retire(path, old.as_ref());
        }

        let store = object.properties();
        store.attach(path, Arc::clone(&self.sink));
        store.unmask();
        tracing::debug!(path, interfaces = ?store.interfaces(), "object registered");

        if self.is_unmasked() {
            self.sink.emit(path, Signal::InterfacesAdded {
                object_path: path.to_string(),
                interfaces: store.snapshot(),
            });
            self.sink.emit(path, Signal::ObjectAdded {
                object_path: path.to_string(),
                interface: String::new(),
            });
        }
        Ok(object)
    }

    /// Unregisters the object at `path`.
    pub fn remove(&self, path: &str) -> MapperResult<Arc<dyn ExportedObject>> {
        let removed = {
            let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
            objects.remove(path)
        };
        let Some(object) = removed else {
            return Err(RegistryError::UnknownPath { path: path.to_string() }.into());
        };
        self.retire(path, object.as_ref());
        tracing::debug!(path, "object removed");
        Ok(object)
    }

    fn retire(&self, path: &str, object: &dyn ExportedObject) {
        let store = object.properties();
        store.detach();
        if self.is_unmasked() {
            self.sink.emit(path, Signal::InterfacesRemoved {
                object_path: path.to_string(),
                interfaces: store.interfaces(),
            });
        }
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<Arc<dyn ExportedObject>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).get(path).cloned()
    }

    /// Looks up `path`, falling back to `default`.
    #[must_use]
    pub fn get_or(&self, path: &str, default: Arc<dyn ExportedObject>) -> Arc<dyn ExportedObject> {
        self.get(path).unwrap_or(default)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).contains_key(path)
    }

    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full snapshot of every object's properties.
    #[must_use]
    pub fn get_managed_objects(&self) -> ManagedObjects {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        objects
            .iter()
            .map(|(path, obj)| (path.clone(), obj.properties().snapshot()))
            .collect()
    }

    /// Legacy flattened view: each object's interfaces merged into one map.
    ///
    /// A property name present on several interfaces of one object keeps the
    /// value of whichever interface is merged last. Consumers must not rely
    /// on which one that is.
    #[must_use]
    pub fn enumerate(&self) -> Enumeration {
        self.get_managed_objects()
            .into_iter()
            .map(|(path, interfaces)| {
                let mut merged = PropertyMap::new();
                for props in interfaces.into_values() {
                    merged.extend(props);
                }
                (path, merged)
            })
            .collect()
    }

    /// Renders introspection data for `path`.
    ///
    /// Intermediate nodes (ancestors of registered objects or of the manager
    /// path) introspect as bare nodes with children.
    pub fn introspect(&self, path: &str) -> MapperResult<String> {
        let path = path::normalize(path);
        let object = self.get(&path);

        let mut children = BTreeSet::new();
        {
            let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
            for known in objects.keys().map(String::as_str).chain(std::iter::once(self.manager_path())) {
                if let Some(child) = path::child_toward(known, &path) {
                    children.insert(child.to_string());
                }
            }
        }

        let is_manager = path == self.cfg.manager_path;
        if object.is_none() && children.is_empty() && !is_manager && path != path::ROOT {
            return Err(RegistryError::UnknownPath { path }.into());
        }

        let mut node = IntrospectionNode {
            interfaces: BTreeMap::new(),
            children: children.into_iter().collect(),
        };
        node.add_interface(introspectable_decl());

        if let Some(object) = object {
            node.add_interface(properties_decl());
            for iface in object.properties().interfaces() {
                node.add_interface(InterfaceDecl::new(iface));
            }
            for decl in object.declared_interfaces() {
                node.add_interface(decl);
            }
        }
        if is_manager {
            node.add_interface(object_manager_decl());
            node.add_interface(
                InterfaceDecl::new(names::ENUMERATE_IFACE).method("enumerate", vec![ArgDecl::output("objects", "a{sa{sv}}")]),
            );
        }
        Ok(render_node(&node))
    }

    /// Closes the registry gate: lifecycle signals are suppressed.
    pub fn mask(&self) {
        self.unmasked.store(false, Ordering::Release);
    }

    /// Opens the registry gate.
    pub fn unmask(&self) {
        self.unmasked.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_unmasked(&self) -> bool {
        self.unmasked.load(Ordering::Acquire)
    }
}

fn introspectable_decl() -> InterfaceDecl {
    InterfaceDecl::new(names::INTROSPECTABLE_IFACE).method("Introspect", vec![ArgDecl::output("xml_data", "s")])
}

fn properties_decl() -> InterfaceDecl {
    InterfaceDecl::new(names::PROPERTIES_IFACE)
        .method("Get", vec![
            ArgDecl::input("interface_name", "s"),
            ArgDecl::input("property_name", "s"),
            ArgDecl::output("value", "v"),
        ])
        .method("GetAll", vec![ArgDecl::input("interface_name", "s"), ArgDecl::output("props", "a{sv}")])
        .method("Set", vec![
            ArgDecl::input("interface_name", "s"),
            ArgDecl::input("property_name", "s"),
            ArgDecl::input("value", "v"),
        ])
        .signal("PropertiesChanged", vec![
            ArgDecl::output("interface_name", "s"),
            ArgDecl::output("changed_properties", "a{sv}"),
            ArgDecl::output("invalidated_properties", "as"),
        ])
}

fn object_manager_decl() -> InterfaceDecl {
    InterfaceDecl::new(names::OBJECT_MANAGER_IFACE)
        .method("GetManagedObjects", vec![ArgDecl::output("objects", "a{oa{sa{sv}}}")])
        .signal("InterfacesAdded", vec![
            ArgDecl::output("object_path", "o"),
            ArgDecl::output("interfaces_and_properties", "a{sa{sv}}"),
        ])
        .signal("InterfacesRemoved", vec![ArgDecl::output("object_path", "o"), ArgDecl::output("interfaces", "as")])
}
