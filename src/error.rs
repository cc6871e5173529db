//! Error types for mgmtbus.
//!
//! Errors are strongly typed using thiserror and layered by subsystem.
//! Dotted bus fault names are only attached at the dispatch boundary
//! (see [`MapperError::fault_name`]).

use thiserror::Error;

use crate::names;

/// Property store errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PropertyError {
    #[error("Unknown interface: {interface}")]
    UnknownInterface {
        interface: String,
    },

    #[error("Unknown property: {interface}.{property}")]
    UnknownProperty {
        interface: String,
        property: String,
    },

    #[error("Rejected write to {interface}.{property}: {reason}")]
    ValidationRejected {
        interface: String,
        property: String,
        reason: String,
    },
}

/// Object registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("No object registered at {path}")]
    UnknownPath {
        path: String,
    },

    #[error("Path already in use: {path}")]
    PathInUse {
        path: String,
    },

    #[error("Invalid object path '{path}': {reason}")]
    InvalidPath {
        path: String,
        reason: String,
    },

    #[error("Unknown method {interface}.{member} on {path}")]
    UnknownMethod {
        path: String,
        interface: String,
        member: String,
    },

    #[error("Invalid arguments for {member}: {reason}")]
    InvalidArgs {
        member: String,
        reason: String,
    },
}

/// Errors raised by a remote bus call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("Service {service} is not running")]
    ServiceUnknown {
        service: String,
    },

    #[error("Service {service} did not reply to a call on {path}")]
    NoReply {
        service: String,
        path: String,
    },

    #[error("Remote fault {name}: {message}")]
    Remote {
        name: String,
        message: String,
    },
}

impl BusError {
    /// True for failures that mean "nobody is there right now".
    ///
    /// Crawls swallow these per branch instead of aborting.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ServiceUnknown { .. } | Self::NoReply { .. })
    }

    /// Dotted error name as it would appear on the wire.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ServiceUnknown { .. } => names::ERROR_SERVICE_UNKNOWN,
            Self::NoReply { .. } => names::ERROR_NO_REPLY,
            Self::Remote { name, .. } => name,
        }
    }
}

/// Errors that abort a whole crawl.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlError {
    #[error("Crawl of {service} aborted at {path}: {source}")]
    Aborted {
        service: String,
        path: String,
        #[source]
        source: BusError,
    },

    #[error("Malformed introspection data from {service} at {path}: {reason}")]
    Malformed {
        service: String,
        path: String,
        reason: String,
    },

    #[error("Crawl of {service} exceeded its deadline after {elapsed_ms}ms")]
    DeadlineExceeded {
        service: String,
        elapsed_ms: u64,
    },
}

impl CrawlError {
    /// The service whose crawl failed.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::Aborted { service, .. }
            | Self::Malformed { service, .. }
            | Self::DeadlineExceeded { service, .. } => service,
        }
    }
}

/// Top-level error type for mgmtbus.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapperError {
    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Crawl error: {0}")]
    Crawl(#[from] CrawlError),

    #[error("Path not found: {path}")]
    NotFound {
        path: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    #[error("Worker queue '{queue}' is full (capacity {capacity})")]
    QueueFull {
        queue: String,
        capacity: usize,
    },

    #[error("Worker '{worker}' disconnected")]
    Disconnected {
        worker: String,
    },

    #[error("Failed to spawn worker '{worker}': {reason}")]
    Spawn {
        worker: String,
        reason: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

impl MapperError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Bus(e) => e.is_transient(),
            Self::Crawl(_) | Self::QueueFull { .. } | Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Dotted fault name reported to bus callers.
    #[must_use]
    pub fn fault_name(&self) -> &str {
        match self {
            Self::Property(PropertyError::UnknownInterface { .. }) => names::ERROR_UNKNOWN_INTERFACE,
            Self::Property(PropertyError::UnknownProperty { .. }) => names::ERROR_UNKNOWN_PROPERTY,
            Self::Property(PropertyError::ValidationRejected { .. }) => names::ERROR_INVALID_ARGS,
            Self::Registry(RegistryError::UnknownPath { .. }) => names::ERROR_UNKNOWN_OBJECT,
            Self::Registry(RegistryError::UnknownMethod { .. }) => names::ERROR_UNKNOWN_METHOD,
            Self::Registry(RegistryError::InvalidArgs { .. } | RegistryError::InvalidPath { .. }) => {
                names::ERROR_INVALID_ARGS
            }
            Self::Bus(e) => e.name(),
            Self::NotFound { .. } => names::ERROR_MAPPER_NOT_FOUND,
            _ => names::ERROR_FAILED,
        }
    }
}

/// Result type alias for mgmtbus operations.
pub type MapperResult<T> = Result<T, MapperError>;
