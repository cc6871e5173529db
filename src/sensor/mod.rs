//! Sensors exported on the bus.

/// Locally owned sensor values with thresholds.
pub mod local;
/// Sensors delegating to another service's property.
pub mod settings;
/// Threshold state machine.
pub mod threshold;

pub use local::{PollOutcome, Sensor, SensorBuilder};
pub use settings::{RemoteProperty, SettingsSensor};
pub use threshold::{ThresholdConfig, ThresholdEngine, ThresholdOutcome, ThresholdState};
