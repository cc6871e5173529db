//! Bus signals and in-process fan-out.
//!
//! Objects emit [`Signal`]s through a [`SignalSink`]. The [`SignalHub`] is the
//! in-process sink: it stamps each signal into a [`SignalEnvelope`] and hands it
//! to every subscriber whose [`SignalFilter`] matches. Delivery never blocks the
//! emitter; slow subscribers lose signals and the hub counts the drops.

/// Subscriber registry and emission.
pub mod hub;
/// Subscriber stream handle.
pub mod stream;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::names;
use crate::path;
use crate::value::{InterfaceMap, PropertyMap, Value};

pub use hub::SignalHub;
pub use stream::SignalStream;

/// Unique identifier for a signal subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Signals emitted by exported objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "member", rename_all = "PascalCase")]
pub enum Signal {
    PropertiesChanged {
        interface: String,
        changed: PropertyMap,
        invalidated: Vec<String>,
    },
    InterfacesAdded {
        object_path: String,
        interfaces: InterfaceMap,
    },
    InterfacesRemoved {
        object_path: String,
        interfaces: Vec<String>,
    },
    /// Legacy lifecycle signal kept for older mapper clients.
    ObjectAdded {
        object_path: String,
        interface: String,
    },
    /// A sensor reading crossed into the critical band.
    Emergency {
        reading: Value,
    },
}

impl Signal {
    /// Interface the signal is declared on.
    #[must_use]
    pub const fn interface(&self) -> &'static str {
        match self {
            Self::PropertiesChanged { .. } => names::PROPERTIES_IFACE,
            Self::InterfacesAdded { .. } | Self::InterfacesRemoved { .. } => names::OBJECT_MANAGER_IFACE,
            Self::ObjectAdded { .. } => names::LEGACY_MAPPER_IFACE,
            Self::Emergency { .. } => names::SENSOR_THRESHOLDS_IFACE,
        }
    }

    /// Signal member name.
    #[must_use]
    pub const fn member(&self) -> &'static str {
        match self {
            Self::PropertiesChanged { .. } => "PropertiesChanged",
            Self::InterfacesAdded { .. } => "InterfacesAdded",
            Self::InterfacesRemoved { .. } => "InterfacesRemoved",
            Self::ObjectAdded { .. } => "ObjectAdded",
            Self::Emergency { .. } => "Emergency",
        }
    }
}

/// A signal as observed by subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Hub-wide emission sequence number.
    pub seq: u64,
    /// Path of the emitting object.
    pub path: String,
    pub signal: Signal,
    pub emitted_at: DateTime<Utc>,
}

/// Destination for emitted signals.
pub trait SignalSink: Send + Sync {
    /// Emits `signal` from the object at `path`.
    fn emit(&self, path: &str, signal: Signal);
}

/// Subscription filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalFilter {
    /// Only signals from this path or below it.
    pub path_namespace: Option<String>,
    /// Only signals with this member name.
    pub member: Option<String>,
}

impl SignalFilter {
    /// Matches every signal.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn under(mut self, namespace: impl Into<String>) -> Self {
        self.path_namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Returns true if `envelope` passes this filter.
    #[must_use]
    pub fn matches(&self, envelope: &SignalEnvelope) -> bool {
        if let Some(ns) = &self.path_namespace {
            if path::depth_below(&envelope.path, ns).is_none() {
                return false;
            }
        }
        if let Some(member) = &self.member {
            if envelope.signal.member() != member {
                return false;
            }
        }
        true
    }
}
