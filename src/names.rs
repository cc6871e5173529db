//! Well-known interface, path, and error names.

/// Standard properties interface.
pub const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";
/// Standard introspection interface.
pub const INTROSPECTABLE_IFACE: &str = "org.freedesktop.DBus.Introspectable";
/// Bulk management capability.
pub const OBJECT_MANAGER_IFACE: &str = "org.freedesktop.DBus.ObjectManager";

/// Batched property writes.
pub const OBJECT_PROPERTIES_IFACE: &str = "org.openbmc.Object.Properties";
/// Legacy flattened enumeration.
pub const ENUMERATE_IFACE: &str = "org.openbmc.Object.Enumerate";
/// Legacy object lifecycle signal interface.
pub const LEGACY_MAPPER_IFACE: &str = "org.openbmc.Object.ObjectMapper";

pub const SENSOR_VALUE_IFACE: &str = "org.openbmc.SensorValue";
pub const SENSOR_THRESHOLDS_IFACE: &str = "org.openbmc.SensorThresholds";

pub const MAPPER_NAME: &str = "org.openbmc.objectmapper";
pub const MAPPER_IFACE: &str = "org.openbmc.objectmapper.ObjectMapper";
pub const MAPPER_PATH: &str = "/org/openbmc/objectmapper/objectmapper";

/// Default namespace for services and objects.
pub const BUS_PREFIX: &str = "org.openbmc";
pub const OBJ_PREFIX: &str = "/org/openbmc";

pub const ERROR_SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";
pub const ERROR_NO_REPLY: &str = "org.freedesktop.DBus.Error.NoReply";
pub const ERROR_UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";
pub const ERROR_UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
pub const ERROR_INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
pub const ERROR_ACCESS_DENIED: &str = "org.freedesktop.DBus.Error.AccessDenied";
pub const ERROR_FAILED: &str = "org.freedesktop.DBus.Error.Failed";
pub const ERROR_UNKNOWN_INTERFACE: &str = "org.freedesktop.UnknownInterface";
pub const ERROR_UNKNOWN_PROPERTY: &str = "org.freedesktop.UnknownProperty";
pub const ERROR_MAPPER_NOT_FOUND: &str = "org.openbmc.objectmapper.Error.NotFound";

/// Unique connection names (`:1.42`) identify a connection, not a service.
#[must_use]
pub fn is_unique(name: &str) -> bool {
    name.starts_with(':')
}
