//! Property storage for exported objects.

/// Property store with gated change notification.
pub mod store;

pub use store::{PropertyStore, PropertyValidator};
