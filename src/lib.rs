//! # mgmtbus - object bus middleware for hardware management agents
//!
//! mgmtbus exposes manageable objects (sensors, controls) on a process-wide
//! object bus and maintains a directory of which service exports what,
//! discovered by crawling other services' introspection data.
//!
//! ## Core Concepts
//!
//! - **PropertyStore**: per-object properties grouped by interface, with
//!   change notification behind an export gate
//! - **ObjectRegistry**: the live objects of one process, bulk snapshots,
//!   lifecycle signals and method dispatch
//! - **Crawler**: builds a `path → interfaces` index of another service
//! - **DirectoryService**: aggregates crawls into a queryable directory
//! - **ThresholdEngine**: NORMAL / WARNING / CRITICAL classification of readings
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mgmtbus::{BusObject, ObjectRegistry, RegistryConfig, SignalHub};
//!
//! let hub = Arc::new(SignalHub::default());
//! let registry = ObjectRegistry::new(RegistryConfig::default(), hub.clone());
//!
//! // Populating an unregistered object is silent.
//! let fan = BusObject::builder()
//!     .property("org.openbmc.Fan", "speed", 1200)
//!     .build();
//!
//! // Registration announces it and opens its export gate.
//! let fan = registry.add("/org/openbmc/control/fan0", fan)?;
//! fan.properties().set("org.openbmc.Fan", "speed", 1500.into())?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Leaf types
pub mod config;
pub mod error;
pub mod names;
pub mod path;
pub mod value;

// Objects and signals
pub mod introspect;
pub mod properties;
pub mod registry;
pub mod signal;

// Discovery
pub mod bus;
pub mod directory;
pub mod discovery;

// Sensors
pub mod sensor;

pub use bus::{LocalBus, RemoteBus};
pub use config::{CrawlConfig, DirectoryConfig, MapperConfig, RegistryConfig, SignalHubConfig};
pub use directory::{Directory, DirectoryService, RefreshHandle, RefreshReport, RefreshTarget};
pub use discovery::{CrawlOutcome, CrawlStats, CrawlStrategy, Crawler, DiscoveryIndex, InterfaceFilter};
pub use error::{BusError, CrawlError, MapperError, MapperResult, PropertyError, RegistryError};
pub use introspect::{IntrospectionNode, MemberKind, TagFilter};
pub use properties::{PropertyStore, PropertyValidator};
pub use registry::{
    BusFault, BusObject, ExportedObject, ManagedObjects, MethodCall, ObjectBuilder, ObjectRegistry, RegistrationPolicy,
    Reply, Unregistered,
};
pub use sensor::{
    PollOutcome, RemoteProperty, Sensor, SensorBuilder, SettingsSensor, ThresholdConfig, ThresholdEngine,
    ThresholdOutcome, ThresholdState,
};
pub use signal::{Signal, SignalEnvelope, SignalFilter, SignalHub, SignalSink, SignalStream};
pub use value::{InterfaceMap, PropertyMap, Value};
