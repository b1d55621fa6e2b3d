//! Detection scoring: time to detection of a candidate across all scenarios.
//!
//! For every scenario with positive weight, each sensor's first trigger step
//! is looked up in the data source. Walking the grid's time steps in order,
//! the triggered sensors are counted per type and handed to the inference
//! test; the first step that reaches inference is the scenario's detection
//! time. Undetected scenarios score [`SENTINEL_TTD`].
//!
//! ## Usage
//!
//! ```ignore
//! let objective = detection::score_configuration(&mut candidate, &set, true);
//! let percent = candidate.percent_scenarios_detected(&set);
//! ```
//!
//! Scenarios are independent, so with `threaded` set they are scored on the
//! rayon pool. Results are applied back to the candidate in scenario order
//! either way, so both paths produce identical candidates.

use crate::inference::InferenceResult;
use crate::placement::{ExtendedConfiguration, ScenarioSet};
use crate::sensors::ExtendedSensor;
use crate::types::{Scenario, TimeStep, SENTINEL_TTD};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Outcome of one scenario for one candidate.
#[derive(Debug, Clone)]
pub struct ScenarioScore {
    pub scenario: Scenario,
    /// Per sensor, in candidate order: first trigger step and the reading there.
    pub first_triggers: Vec<Option<(TimeStep, f64)>>,
    pub detected_at: Option<TimeStep>,
    pub inference: InferenceResult,
    /// Detection time, or [`SENTINEL_TTD`] if never detected.
    pub time_to_detection: f64,
}

/// Score `config` against every weighted scenario of `set` and record the
/// results on it. Returns the summed objective (weighted detection time).
pub fn score_configuration(config: &mut ExtendedConfiguration, set: &ScenarioSet, threaded: bool) -> f64 {
    config.clear_evaluation();
    let scenarios: Vec<&Scenario> = set
        .scenarios()
        .iter()
        .filter(|s| set.weight(s) > 0.0)
        .collect();

    let scores: Vec<ScenarioScore> = {
        let sensors = config.sensors();
        if threaded {
            scenarios
                .par_iter()
                .map(|s| score_scenario(set, sensors, s))
                .collect()
        } else {
            scenarios
                .iter()
                .map(|s| score_scenario(set, sensors, s))
                .collect()
        }
    };

    for score in scores {
        apply_score(config, set, score);
    }

    let objective = config.objective_value();
    debug!(
        sensors = config.sensors().len(),
        scenarios = scenarios.len(),
        objective,
        threaded,
        "Configuration scored"
    );
    objective
}

/// Evaluate one scenario without touching the candidate.
pub fn score_scenario(set: &ScenarioSet, sensors: &[ExtendedSensor], scenario: &Scenario) -> ScenarioScore {
    let grid = set.grid();
    let source = set.source();

    let first_triggers: Vec<Option<(TimeStep, f64)>> = sensors
        .iter()
        .map(|sensor| {
            let setting = set.setting(sensor.sensor_type())?;
            let step = source.first_trigger(grid, scenario, sensor.sensor_type(), setting.rule(), sensor.node())?;
            let value = source
                .value_at(scenario, sensor.sensor_type(), step.index, sensor.node())
                .unwrap_or(f64::NAN);
            Some((step, value))
        })
        .collect();

    let inference_test = set.inference_test();
    let mut inference = inference_test.evaluate(&BTreeMap::new());
    let mut detected_at = None;
    for &step in grid.time_steps() {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for (sensor, first) in sensors.iter().zip(&first_triggers) {
            if first.is_some_and(|(t, _)| t <= step) {
                *counts.entry(sensor.sensor_type().to_string()).or_insert(0) += 1;
            }
        }
        inference = inference_test.evaluate(&counts);
        if inference.inferred {
            detected_at = Some(step);
            break;
        }
    }

    ScenarioScore {
        scenario: scenario.clone(),
        time_to_detection: detected_at.map_or(SENTINEL_TTD, |t| t.real_time),
        first_triggers,
        detected_at,
        inference,
    }
}

fn apply_score(config: &mut ExtendedConfiguration, set: &ScenarioSet, score: ScenarioScore) {
    let scenario = &score.scenario;
    for (sensor, first) in config.sensors_mut().iter_mut().zip(&score.first_triggers) {
        match first {
            Some((step, value)) => sensor.set_triggered(true, scenario, *step, *value),
            None => {
                sensor.state.history.insert(scenario.clone(), None);
            }
        }
    }
    config.record_detection_time(scenario, score.time_to_detection);
    config.record_objective_value(scenario, score.time_to_detection * set.normalized_weight(scenario));
    config.record_inference_result(scenario, score.inference);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryFieldData;
    use crate::grid::{NodeStructure, Xyz};
    use crate::sensors::{DeltaType, Trigger, UserSettings};
    use std::sync::Arc;

    /// 2x2x1 grid, steps at t = 0, 10, 20.
    /// In "s1" node 1 rises at t=10 and node 2 at t=20; "s2" never changes.
    fn make_set() -> ScenarioSet {
        let steps = vec![
            TimeStep::new(0, 0.0),
            TimeStep::new(1, 10.0),
            TimeStep::new(2, 20.0),
        ];
        let grid = NodeStructure::from_cell_widths(
            Xyz::new(0.0, 0.0, 0.0),
            &[1.0; 2],
            &[1.0; 2],
            &[1.0],
            steps.clone(),
        )
        .unwrap();
        let s1 = Scenario::new("s1");
        let s2 = Scenario::new("s2");
        let mut data = InMemoryFieldData::new(grid.total_nodes());
        for node in grid.node_ids() {
            data.set_constant(&s1, "a", &steps, node, 0.0);
            data.set_constant(&s2, "a", &steps, node, 0.0);
        }
        data.set_value(&s1, "a", 1, 1, 1.0);
        data.set_value(&s1, "a", 2, 1, 1.0);
        data.set_value(&s1, "a", 2, 2, 1.0);

        let mut set = ScenarioSet::new(grid, vec![s1, s2], &["a"], Arc::new(data)).unwrap();
        let edit = UserSettings {
            trigger: Trigger::AbsoluteDelta,
            delta_type: DeltaType::Increase,
            lower_threshold: 0.5,
            ..set.setting("a").unwrap().user_settings()
        };
        set.apply_user_settings("a", &edit).unwrap();
        set
    }

    fn config_at(set: &ScenarioSet, nodes: &[usize]) -> ExtendedConfiguration {
        let mut config = ExtendedConfiguration::new();
        for &n in nodes {
            config.add_sensor(ExtendedSensor::new("a", n, set.grid()));
        }
        config
    }

    #[test]
    fn test_detected_and_undetected_scenarios() {
        let set = make_set();
        let mut config = config_at(&set, &[1]);
        let objective = score_configuration(&mut config, &set, false);

        let ttd = config.times_to_detection();
        assert!((ttd[&Scenario::new("s1")] - 10.0).abs() < 1e-12);
        assert!((ttd[&Scenario::new("s2")] - SENTINEL_TTD).abs() < 1e-12);
        assert!((objective - 0.5f64.mul_add(SENTINEL_TTD, 5.0)).abs() < 1e-6);
        assert!((config.percent_scenarios_detected(&set) - 50.0).abs() < 1e-12);
        assert!((config.normalized_average_ttd(&set) - 10.0).abs() < 1e-12);
        assert!(config.inference_results()[&Scenario::new("s1")].inferred);

        let sensor = &config.sensors()[0];
        assert!(sensor.state.triggering);
        assert!(sensor.triggered_by(&Scenario::new("s1"), TimeStep::new(1, 10.0)));
        assert!(!sensor.triggered_by(&Scenario::new("s1"), TimeStep::new(0, 0.0)));
        assert_eq!(sensor.state.history.get(&Scenario::new("s2")), Some(&None));
    }

    #[test]
    fn test_inference_minimum_delays_detection() {
        let mut set = make_set();
        set.inference_test_mut().set_minimum_for_type("a", 2);
        let mut config = config_at(&set, &[1, 2]);
        score_configuration(&mut config, &set, false);
        let ttd = config.times_to_detection()[&Scenario::new("s1")];
        assert!((ttd - 20.0).abs() < 1e-12, "both sensors must fire first, got {ttd}");
    }

    #[test]
    fn test_zero_weight_scenarios_are_skipped() {
        let mut set = make_set();
        set.set_weight(&Scenario::new("s2"), 0.0).unwrap();
        let mut config = config_at(&set, &[1]);
        let objective = score_configuration(&mut config, &set, false);
        assert!((objective - 10.0).abs() < 1e-12);
        assert!(!config.times_to_detection().contains_key(&Scenario::new("s2")));
    }

    #[test]
    fn test_threaded_scoring_matches_sequential() {
        let set = make_set();
        let mut one = config_at(&set, &[1, 2, 3]);
        let mut two = one.make_copy();
        let a = score_configuration(&mut one, &set, false);
        let b = score_configuration(&mut two, &set, true);
        assert!((a - b).abs() < 1e-12);
        assert_eq!(one.times_to_detection(), two.times_to_detection());
        for (x, y) in one.sensors().iter().zip(two.sensors()) {
            assert_eq!(x.state, y.state);
        }
    }

    #[test]
    fn test_empty_configuration_detects_nothing() {
        let set = make_set();
        let mut config = ExtendedConfiguration::new();
        score_configuration(&mut config, &set, true);
        assert!(config
            .times_to_detection()
            .values()
            .all(|&t| (t - SENTINEL_TTD).abs() < 1e-12));
        assert!((config.time_to_detection(&set) - SENTINEL_TTD).abs() < 1e-12);
    }
}
