//! Threshold evaluation.
//!
//! A pure state machine over numeric readings. It knows nothing about
//! property stores or signals; [`Sensor`](super::Sensor) wires it up.

use serde::{Deserialize, Serialize};

use crate::value::{PropertyMap, Value};

/// Threshold classification, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdState {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl ThresholdState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NORMAL" => Some(Self::Normal),
            "WARNING" => Some(Self::Warning),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for ThresholdState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ThresholdState> for Value {
    fn from(state: ThresholdState) -> Self {
        Self::String(state.as_str().to_string())
    }
}

pub const WARNING_UPPER: &str = "warning_upper";
pub const WARNING_LOWER: &str = "warning_lower";
pub const CRITICAL_UPPER: &str = "critical_upper";
pub const CRITICAL_LOWER: &str = "critical_lower";
pub const THRESHOLDS_ENABLED: &str = "thresholds_enabled";
pub const EMERGENCY_ENABLED: &str = "emergency_enabled";
pub const THRESHOLD_STATE: &str = "threshold_state";
pub const WORST_THRESHOLD_STATE: &str = "worst_threshold_state";

/// Threshold bounds and switches. An absent bound never trips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub warning_upper: Option<f64>,
    pub warning_lower: Option<f64>,
    pub critical_upper: Option<f64>,
    pub critical_lower: Option<f64>,
    pub enabled: bool,
    pub emergency_enabled: bool,
}

impl ThresholdConfig {
    /// Property form, as exported on the thresholds interface.
    #[must_use]
    pub fn to_properties(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        for (name, bound) in [
            (WARNING_UPPER, self.warning_upper),
            (WARNING_LOWER, self.warning_lower),
            (CRITICAL_UPPER, self.critical_upper),
            (CRITICAL_LOWER, self.critical_lower),
        ] {
            if let Some(b) = bound {
                props.insert(name.to_string(), Value::Double(b));
            }
        }
        props.insert(THRESHOLDS_ENABLED.to_string(), Value::Bool(self.enabled));
        props.insert(EMERGENCY_ENABLED.to_string(), Value::Bool(self.emergency_enabled));
        props
    }

    /// Reads a config back from exported properties. Missing or
    /// non-numeric bounds are absent; missing switches are off.
    #[must_use]
    pub fn from_properties(props: &PropertyMap) -> Self {
        let bound = |name: &str| props.get(name).and_then(Value::as_f64);
        let flag = |name: &str| props.get(name).and_then(Value::as_bool).unwrap_or(false);
        Self {
            warning_upper: bound(WARNING_UPPER),
            warning_lower: bound(WARNING_LOWER),
            critical_upper: bound(CRITICAL_UPPER),
            critical_lower: bound(CRITICAL_LOWER),
            enabled: flag(THRESHOLDS_ENABLED),
            emergency_enabled: flag(EMERGENCY_ENABLED),
        }
    }

    /// Classifies `reading`. Critical bounds win over warning bounds and
    /// upper bounds are checked before lower ones.
    #[must_use]
    pub fn classify(&self, reading: f64) -> ThresholdState {
        let at_or_above = |b: Option<f64>| b.is_some_and(|b| reading >= b);
        let at_or_below = |b: Option<f64>| b.is_some_and(|b| reading <= b);
        if at_or_above(self.critical_upper) || at_or_below(self.critical_lower) {
            ThresholdState::Critical
        } else if at_or_above(self.warning_upper) || at_or_below(self.warning_lower) {
            ThresholdState::Warning
        } else {
            ThresholdState::Normal
        }
    }
}

/// What one evaluation decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdOutcome {
    /// The reading is outside the normal band.
    pub violated: bool,
    pub state: ThresholdState,
    /// The reading moved the sensor into CRITICAL with emergencies on.
    pub emergency: bool,
}

/// Current and worst threshold state of one sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdEngine {
    config: ThresholdConfig,
    current: ThresholdState,
    worst: ThresholdState,
}

impl ThresholdEngine {
    #[must_use]
    pub fn new(config: ThresholdConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Replaces the bounds. Recorded states are kept.
    pub fn set_config(&mut self, config: ThresholdConfig) {
        self.config = config;
    }

    #[must_use]
    pub const fn current(&self) -> ThresholdState {
        self.current
    }

    #[must_use]
    pub const fn worst(&self) -> ThresholdState {
        self.worst
    }

    /// Evaluates one reading. A disabled engine changes nothing.
    pub fn evaluate(&mut self, reading: f64) -> ThresholdOutcome {
        if !self.config.enabled {
            return ThresholdOutcome {
                violated: false,
                state: self.current,
                emergency: false,
            };
        }

        let state = self.config.classify(reading);
        let emergency = state != self.current && state == ThresholdState::Critical && self.config.emergency_enabled;
        self.current = state;
        self.worst = self.worst.max(state);

        ThresholdOutcome {
            violated: state != ThresholdState::Normal,
            state,
            emergency,
        }
    }

    /// Lowers the worst state back to NORMAL.
    pub fn reset(&mut self) {
        self.worst = ThresholdState::Normal;
    }
}
