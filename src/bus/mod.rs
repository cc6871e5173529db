//! Remote bus seam.
//!
//! The crawler, the directory service and delegating sensors talk to other
//! processes only through [`RemoteBus`]. The wire encoding lives behind it;
//! this crate ships [`LocalBus`], which hosts registries in-process.

/// In-process bus implementation.
pub mod local;

use std::time::Duration;

use crate::error::BusError;
use crate::registry::ManagedObjects;
use crate::value::Value;

pub use local::LocalBus;

/// Calls other processes can answer.
///
/// Every call carries its own timeout. Implementations report an absent
/// peer as [`BusError::ServiceUnknown`] and a silent one as
/// [`BusError::NoReply`].
pub trait RemoteBus: Send + Sync {
    /// Names currently owned on the bus, unique names included.
    fn list_names(&self) -> Result<Vec<String>, BusError>;

    /// Introspection XML of `path` on `service`.
    fn introspect(&self, service: &str, path: &str, timeout: Duration) -> Result<String, BusError>;

    /// Bulk snapshot served by the object manager at `path`.
    fn get_managed_objects(&self, service: &str, path: &str, timeout: Duration) -> Result<ManagedObjects, BusError>;

    fn get_property(
        &self,
        service: &str,
        path: &str,
        interface: &str,
        property: &str,
        timeout: Duration,
    ) -> Result<Value, BusError>;

    fn set_property(
        &self,
        service: &str,
        path: &str,
        interface: &str,
        property: &str,
        value: Value,
        timeout: Duration,
    ) -> Result<(), BusError>;
}
