//! Run Configuration - search parameters and sensor settings as TOML values
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! runnable configuration. Sensor sections only override the fields they
//! name; anything left out keeps the value the scenario set already holds.

use crate::placement::{Constraints, ModelOption, TtdAggregation};
use crate::grid::Ijk;
use crate::sensors::{CombinePolicy, DeltaType, Trigger, UserSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file to load.
pub const CONFIG_ENV_VAR: &str = "SITING_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "siting.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one siting run.
///
/// Load with `RunConfig::load()` which searches:
/// 1. `$SITING_CONFIG` env var
/// 2. `./siting.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub constraints: ConstraintsSection,

    /// Per sensor type overrides, keyed by type name
    #[serde(default)]
    pub sensors: BTreeMap<String, SensorSection>,

    #[serde(default)]
    pub inference: InferenceSection,

    #[serde(default)]
    pub scenarios: ScenariosSection,
}

impl RunConfig {
    /// Load configuration using the standard search order:
    /// 1. `$SITING_CONFIG` environment variable
    /// 2. `./siting.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), run = %config.run.name, "Loaded run config from SITING_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from SITING_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "SITING_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(run = %config.run.name, "Loaded run config from ./siting.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./siting.toml, using defaults");
                }
            }
        }

        info!("No siting.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are logged as warnings and otherwise ignored.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in &super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Run config saved");
        Ok(())
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - Every number must be finite; costs and radii must be non-negative
    /// - The inclusion radius must exceed the exclusion radius
    /// - At least one well and one worker
    /// - Add point indices are 1-based
    /// - A two-sided delta trigger needs a non-negative lower threshold
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let c = &self.constraints;

        if self.run.workers == 0 {
            errors.push("run.workers must be at least 1".to_string());
        }

        Self::check_non_negative(c.cost_ceiling, "constraints.cost_ceiling", &mut errors);
        Self::check_non_negative(c.exclusion_radius, "constraints.exclusion_radius", &mut errors);
        Self::check_non_negative(c.well_cost, "constraints.well_cost", &mut errors);
        Self::check_non_negative(c.well_depth_cost, "constraints.well_depth_cost", &mut errors);
        if let Some(inclusion) = c.inclusion_radius {
            if !inclusion.is_finite() {
                errors.push(format!(
                    "constraints.inclusion_radius: value must be finite (got {inclusion})"
                ));
            } else if inclusion <= c.exclusion_radius {
                errors.push(format!(
                    "constraints.inclusion_radius ({inclusion:.3}) must be > exclusion_radius ({:.3})",
                    c.exclusion_radius
                ));
            }
        }
        if c.max_wells == 0 {
            errors.push("constraints.max_wells must be at least 1".to_string());
        }
        if c.add_point.contains(&0) {
            errors.push(format!(
                "constraints.add_point {:?}: indices are 1-based",
                c.add_point
            ));
        }

        for (sensor_type, s) in &self.sensors {
            let prefix = format!("sensors.{sensor_type}");
            if let Some(cost) = s.cost {
                Self::check_non_negative(cost, &format!("{prefix}.cost"), &mut errors);
            }
            for (value, name) in [
                (s.lower_threshold, "lower_threshold"),
                (s.upper_threshold, "upper_threshold"),
                (s.min_z, "min_z"),
                (s.max_z, "max_z"),
            ] {
                if let Some(v) = value.filter(|v| !v.is_finite()) {
                    errors.push(format!("{prefix}.{name}: value must be finite (got {v})"));
                }
            }
            let two_sided_delta = s.trigger.is_some_and(Trigger::is_delta)
                && s.delta.unwrap_or_default() == DeltaType::Both;
            if let Some(lower) = s.lower_threshold.filter(|&l| two_sided_delta && l < 0.0) {
                errors.push(format!(
                    "{prefix}.lower_threshold ({lower:.3}) must be >= 0 for a two-sided delta trigger"
                ));
            }
        }

        for (scenario, &weight) in &self.scenarios.weights {
            Self::check_non_negative(weight, &format!("scenarios.weights.{scenario}"), &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_non_negative(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() {
            errors.push(format!("{name}: value must be finite (got {value})"));
        } else if value < 0.0 {
            errors.push(format!("{name} ({value:.3}) cannot be negative"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            Self::Parse(path, e) => write!(f, "Config parse error ({}): {}", path.display(), e),
            Self::Serialize(e) => write!(f, "Config serialization error: {e}"),
            Self::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Run
// ============================================================================

/// Which chain a search step calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MutationMode {
    #[default]
    Sensor,
    Well,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSection {
    /// Label used in logs and reports
    #[serde(default = "default_run_name")]
    pub name: String,

    /// Master seed; each worker derives its own stream from it
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Mutation steps per worker
    #[serde(default = "default_steps")]
    pub steps: usize,

    /// Score scenarios and run workers in parallel
    #[serde(default = "default_threaded")]
    pub threaded: bool,

    #[serde(default)]
    pub model_option: ModelOption,

    #[serde(default)]
    pub mutation: MutationMode,

    #[serde(default)]
    pub ttd_aggregation: TtdAggregation,
}

fn default_run_name() -> String {
    "siting".to_string()
}
const fn default_seed() -> u64 { 42 }
const fn default_workers() -> usize { 4 }
const fn default_steps() -> usize { 200 }
const fn default_threaded() -> bool { true }

impl Default for RunSection {
    fn default() -> Self {
        Self {
            name: default_run_name(),
            seed: default_seed(),
            workers: default_workers(),
            steps: default_steps(),
            threaded: default_threaded(),
            model_option: ModelOption::default(),
            mutation: MutationMode::default(),
            ttd_aggregation: TtdAggregation::default(),
        }
    }
}

// ============================================================================
// Constraints
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintsSection {
    /// Preferred `[i, j, k]` for new sensors and realized wells (1-based)
    #[serde(default = "default_add_point")]
    pub add_point: [usize; 3],

    #[serde(default = "default_max_wells")]
    pub max_wells: usize,

    /// Budget on the summed sensor cost
    #[serde(default = "default_cost_ceiling")]
    pub cost_ceiling: f64,

    #[serde(default)]
    pub exclusion_radius: f64,

    /// Unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusion_radius: Option<f64>,

    #[serde(default = "default_allow_multiple")]
    pub allow_multiple_sensors_in_well: bool,

    #[serde(default)]
    pub edge_moves_only: bool,

    #[serde(default)]
    pub well_cost: f64,

    #[serde(default)]
    pub well_depth_cost: f64,
}

const fn default_add_point() -> [usize; 3] { [1, 1, 1] }
const fn default_max_wells() -> usize { 10 }
const fn default_cost_ceiling() -> f64 { 300.0 }
const fn default_allow_multiple() -> bool { true }

impl Default for ConstraintsSection {
    fn default() -> Self {
        Self {
            add_point: default_add_point(),
            max_wells: default_max_wells(),
            cost_ceiling: default_cost_ceiling(),
            exclusion_radius: 0.0,
            inclusion_radius: None,
            allow_multiple_sensors_in_well: default_allow_multiple(),
            edge_moves_only: false,
            well_cost: 0.0,
            well_depth_cost: 0.0,
        }
    }
}

impl ConstraintsSection {
    pub fn to_constraints(&self) -> Constraints {
        let [i, j, k] = self.add_point;
        Constraints {
            add_point: Ijk::new(i, j, k),
            max_wells: self.max_wells,
            cost_ceiling: self.cost_ceiling,
            exclusion_radius: self.exclusion_radius,
            inclusion_radius: self.inclusion_radius.unwrap_or(f64::MAX),
            allow_multiple_sensors_in_well: self.allow_multiple_sensors_in_well,
            edge_moves_only: self.edge_moves_only,
            well_cost: self.well_cost,
            well_depth_cost: self.well_depth_cost,
        }
    }
}

// ============================================================================
// Sensors
// ============================================================================

/// Overrides for one sensor type. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combine: Option<CombinePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pareto_optimal: Option<bool>,
}

impl SensorSection {
    /// Layer these overrides onto `current`.
    pub fn merge_into(&self, current: UserSettings) -> UserSettings {
        UserSettings {
            cost: self.cost.unwrap_or(current.cost),
            trigger: self.trigger.unwrap_or(current.trigger),
            delta_type: self.delta.unwrap_or(current.delta_type),
            lower_threshold: self.lower_threshold.unwrap_or(current.lower_threshold),
            upper_threshold: self.upper_threshold.unwrap_or(current.upper_threshold),
            min_z: self.min_z.unwrap_or(current.min_z),
            max_z: self.max_z.unwrap_or(current.max_z),
            combine: self.combine.unwrap_or(current.combine),
            pareto_optimal: self.pareto_optimal.unwrap_or(current.pareto_optimal),
            reset: false,
        }
    }
}

// ============================================================================
// Inference / Scenarios
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceSection {
    /// Total triggered sensors that infer a leak regardless of type; `<= 0` disables
    #[serde(default = "default_overall_minimum")]
    pub overall_minimum: i32,

    /// Minimum triggered sensors per type; types not listed keep their minimum
    #[serde(default)]
    pub per_type: BTreeMap<String, i32>,
}

const fn default_overall_minimum() -> i32 {
    crate::inference::DEFAULT_OVERALL_MINIMUM
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self {
            overall_minimum: default_overall_minimum(),
            per_type: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenariosSection {
    /// Scenario name to weight; unlisted scenarios keep weight 1
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.constraints.to_constraints(), Constraints::default());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_parse_full_document() {
        let config = RunConfig::from_toml_str(
            r#"
[run]
name = "plume-a"
seed = 7
model_option = "individual_sensors_2"
mutation = "well"
ttd_aggregation = "worst_case"

[constraints]
add_point = [2, 3, 1]
max_wells = 3
cost_ceiling = 450.0
inclusion_radius = 500.0

[sensors.pressure]
cost = 25.0
trigger = "absolute_delta"
delta = "increase"
lower_threshold = 0.5

[inference]
overall_minimum = 3

[inference.per_type]
pressure = 2

[scenarios.weights]
run_001 = 0.5
"#,
        )
        .unwrap();
        assert_eq!(config.run.model_option, ModelOption::IndividualSensors2);
        assert_eq!(config.run.mutation, MutationMode::Well);
        assert_eq!(config.run.ttd_aggregation, TtdAggregation::WorstCase);
        assert_eq!(config.constraints.to_constraints().add_point, Ijk::new(2, 3, 1));
        let pressure = &config.sensors["pressure"];
        assert_eq!(pressure.trigger, Some(Trigger::AbsoluteDelta));
        assert!(pressure.max_z.is_none());
        assert_eq!(config.inference.per_type["pressure"], 2);
        assert!((config.scenarios.weights["run_001"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let current = UserSettings {
            cost: 10.0,
            trigger: Trigger::MaximumThreshold,
            delta_type: DeltaType::Both,
            lower_threshold: 0.0,
            upper_threshold: 5.0,
            min_z: -100.0,
            max_z: 0.0,
            combine: CombinePolicy::Union,
            pareto_optimal: false,
            reset: true,
        };
        let section = SensorSection {
            cost: Some(30.0),
            max_z: Some(-10.0),
            ..SensorSection::default()
        };
        let merged = section.merge_into(current.clone());
        assert!((merged.cost - 30.0).abs() < 1e-12);
        assert!((merged.max_z + 10.0).abs() < 1e-12);
        assert!((merged.upper_threshold - current.upper_threshold).abs() < 1e-12);
        assert!(!merged.reset);
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = RunConfig::default();
        config.constraints.max_wells = 0;
        config.constraints.cost_ceiling = f64::NAN;
        config.constraints.exclusion_radius = 50.0;
        config.constraints.inclusion_radius = Some(20.0);
        config.constraints.add_point = [0, 1, 1];
        config.sensors.insert(
            "co2".to_string(),
            SensorSection {
                cost: Some(-1.0),
                trigger: Some(Trigger::RelativeDelta),
                lower_threshold: Some(-0.1),
                ..SensorSection::default()
            },
        );
        config.scenarios.weights.insert("s1".to_string(), f64::INFINITY);

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        for needle in [
            "max_wells",
            "cost_ceiling",
            "inclusion_radius",
            "add_point",
            "sensors.co2.cost",
            "sensors.co2.lower_threshold",
            "scenarios.weights.s1",
        ] {
            assert!(errors.iter().any(|e| e.contains(needle)), "missing {needle}: {errors:?}");
        }
    }

    #[test]
    fn test_to_toml_round_trip() {
        let mut config = RunConfig::default();
        config.run.name = "round-trip".to_string();
        config.sensors.insert(
            "brine".to_string(),
            SensorSection {
                combine: Some(CombinePolicy::Intersection),
                ..SensorSection::default()
            },
        );
        let text = config.to_toml().unwrap();
        assert_eq!(RunConfig::from_toml_str(&text).unwrap(), config);
    }
}
