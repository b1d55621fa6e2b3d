//! Trigger rules: when a sensor reading counts as an alarm.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a reading is compared against the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Fires when the value is at or below the upper bound.
    #[default]
    MaximumThreshold,
    /// Fires when the value is at or above the lower bound.
    MinimumThreshold,
    /// Fires on the change relative to the scenario's initial value.
    RelativeDelta,
    /// Fires on the raw change from the scenario's initial value.
    AbsoluteDelta,
}

impl Trigger {
    pub const fn is_delta(self) -> bool {
        matches!(self, Self::RelativeDelta | Self::AbsoluteDelta)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaximumThreshold => write!(f, "Maximum threshold"),
            Self::MinimumThreshold => write!(f, "Minimum threshold"),
            Self::RelativeDelta => write!(f, "Relative delta"),
            Self::AbsoluteDelta => write!(f, "Absolute delta"),
        }
    }
}

/// Direction gate for delta triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeltaType {
    Increase,
    Decrease,
    #[default]
    Both,
}

impl fmt::Display for DeltaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increase => write!(f, "Increase"),
            Self::Decrease => write!(f, "Decrease"),
            Self::Both => write!(f, "Both"),
        }
    }
}

/// Everything that decides whether a single reading fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerRule {
    pub trigger: Trigger,
    pub delta_type: DeltaType,
    pub lower: f64,
    pub upper: f64,
}

impl Default for TriggerRule {
    fn default() -> Self {
        Self {
            trigger: Trigger::MaximumThreshold,
            delta_type: DeltaType::Both,
            lower: 0.0,
            upper: 0.0,
        }
    }
}

impl TriggerRule {
    /// Does `value` fire, given the scenario's `initial` value at the same node?
    ///
    /// Delta triggers compare the change against `lower`; relative change is
    /// taken as zero when the initial value is zero.
    pub fn fires(&self, value: f64, initial: f64) -> bool {
        match self.trigger {
            Trigger::MaximumThreshold => value <= self.upper,
            Trigger::MinimumThreshold => value >= self.lower,
            Trigger::RelativeDelta | Trigger::AbsoluteDelta => {
                let change = if self.trigger == Trigger::AbsoluteDelta {
                    value - initial
                } else if initial == 0.0 {
                    0.0
                } else {
                    (value - initial) / initial
                };
                match self.delta_type {
                    DeltaType::Increase => self.lower <= change,
                    DeltaType::Decrease => self.lower >= change,
                    DeltaType::Both => self.lower <= change.abs(),
                }
            }
        }
    }
}
