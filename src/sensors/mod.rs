//! Sensor types: trigger rules, per-type settings, and placed sensors.

mod sensor;
mod setting;
mod trigger;

pub use sensor::{ExtendedSensor, Sensor, SensorState};
pub use setting::{CombinePolicy, SensorSetting, UserSettings, DEFAULT_SENSOR_COST};
pub use trigger::{DeltaType, Trigger, TriggerRule};
