//! Inference test: decides whether enough sensors fired to call a scenario detected.
//!
//! Each sensor type carries a minimum number of triggered sensors (`<= 0`
//! means the type is not required). The overall minimum, when positive, can
//! rescue a scenario that failed a per-type minimum: if the triggered counts
//! of all required types together reach it, the scenario is inferred anyway.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Per-type minimum given to every type when a test is created.
pub const DEFAULT_TYPE_MINIMUM: i32 = 1;

/// Overall minimum of a new test: disabled.
pub const DEFAULT_OVERALL_MINIMUM: i32 = -1;

/// Outcome of one inference evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub inferred: bool,
    /// Fraction of required triggers observed, capped at 1.
    pub goodness: f64,
}

impl fmt::Display for InferenceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inferred={} goodness={:.3}", self.inferred, self.goodness)
    }
}

/// Minimum triggered-sensor counts per type, plus one overall minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceTest {
    minimums: BTreeMap<String, i32>,
    overall_minimum: i32,
}

impl InferenceTest {
    /// New test requiring one triggered sensor of each listed type.
    pub fn new<I, S>(sensor_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            minimums: sensor_types
                .into_iter()
                .map(|t| (t.into(), DEFAULT_TYPE_MINIMUM))
                .collect(),
            overall_minimum: DEFAULT_OVERALL_MINIMUM,
        }
    }

    pub fn set_minimum_for_type(&mut self, sensor_type: impl Into<String>, minimum: i32) {
        self.minimums.insert(sensor_type.into(), minimum);
    }

    pub fn minimum_for_type(&self, sensor_type: &str) -> i32 {
        self.minimums.get(sensor_type).copied().unwrap_or(0)
    }

    pub fn set_overall_minimum(&mut self, minimum: i32) {
        self.overall_minimum = minimum;
    }

    pub const fn overall_minimum(&self) -> i32 {
        self.overall_minimum
    }

    pub const fn minimums(&self) -> &BTreeMap<String, i32> {
        &self.minimums
    }

    /// Types with a positive minimum.
    pub fn required_types(&self) -> impl Iterator<Item = (&str, i32)> {
        self.minimums
            .iter()
            .filter(|(_, &m)| m > 0)
            .map(|(t, &m)| (t.as_str(), m))
    }

    /// Was the scenario detected, given triggered-sensor counts per type?
    ///
    /// A required type that is absent from `counts` fails its minimum.
    pub fn reached_inference(&self, counts: &BTreeMap<String, usize>) -> bool {
        self.evaluate(counts).inferred
    }

    /// Full evaluation, including how close the counts came.
    pub fn evaluate(&self, counts: &BTreeMap<String, usize>) -> InferenceResult {
        let mut inferred = true;
        let mut total_triggering: i64 = 0;
        let mut required: i64 = 0;
        let mut satisfied: i64 = 0;

        for (sensor_type, minimum) in self.required_types() {
            let minimum = i64::from(minimum);
            required += minimum;
            match counts.get(sensor_type) {
                None => inferred = false,
                Some(&count) => {
                    let count = i64::try_from(count).unwrap_or(i64::MAX);
                    total_triggering = total_triggering.saturating_add(count);
                    satisfied += count.min(minimum);
                    if count < minimum {
                        inferred = false;
                    }
                }
            }
        }

        let overall = i64::from(self.overall_minimum);
        if overall > 0 && total_triggering >= overall {
            inferred = true;
        }

        #[allow(clippy::cast_precision_loss)]
        let goodness = if inferred || required == 0 {
            1.0
        } else {
            satisfied as f64 / required as f64
        };
        InferenceResult { inferred, goodness }
    }

    /// Cheapest sensor set able to satisfy this test, given per-type costs.
    ///
    /// Sums the per-type minimums at their cost. When the overall minimum is
    /// positive, the cheapest required type filling that many slots is also
    /// considered and the smaller figure is returned. Reaching the overall
    /// minimum infers on its own (see [`Self::evaluate`]), so the two routes
    /// are alternatives: the overall count is never added on top of the
    /// per-type sum.
    pub fn min_sensor_cost(&self, cost_of: impl Fn(&str) -> f64) -> f64 {
        let per_type: f64 = self
            .required_types()
            .map(|(t, m)| f64::from(m) * cost_of(t))
            .sum();
        if self.overall_minimum <= 0 {
            return per_type;
        }
        let cheapest = self
            .required_types()
            .map(|(t, _)| cost_of(t))
            .fold(f64::INFINITY, f64::min);
        if cheapest.is_finite() {
            per_type.min(f64::from(self.overall_minimum) * cheapest)
        } else {
            per_type
        }
    }
}

impl fmt::Display for InferenceTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Inference test:")?;
        for (t, m) in self.required_types() {
            write!(f, " {t}>={m}")?;
        }
        if self.overall_minimum > 0 {
            write!(f, " or total>={}", self.overall_minimum)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
        pairs.iter().map(|(t, c)| ((*t).to_string(), *c)).collect()
    }

    #[test]
    fn test_no_requirements_always_infers() {
        let mut test = InferenceTest::new(["co2", "brine"]);
        test.set_minimum_for_type("co2", 0);
        test.set_minimum_for_type("brine", -2);
        assert!(test.reached_inference(&counts(&[])));
        assert!(test.reached_inference(&counts(&[("co2", 0)])));
        assert!(test.reached_inference(&counts(&[("brine", 9)])));
    }

    #[test]
    fn test_type_minimum_fails_below_count() {
        let mut test = InferenceTest::new(["co2", "brine"]);
        test.set_minimum_for_type("co2", 2);
        assert!(!test.reached_inference(&counts(&[("co2", 1), ("brine", 1)])));
        assert!(test.reached_inference(&counts(&[("co2", 2), ("brine", 1)])));
    }

    #[test]
    fn test_missing_required_type_fails() {
        let test = InferenceTest::new(["co2", "brine"]);
        assert!(!test.reached_inference(&counts(&[("co2", 5)])));
    }

    #[test]
    fn test_overall_minimum_overrides_type_failure() {
        let mut test = InferenceTest::new(["co2", "brine"]);
        test.set_minimum_for_type("co2", 3);
        let seen = counts(&[("co2", 1), ("brine", 2)]);
        assert!(!test.reached_inference(&seen));

        test.set_overall_minimum(3);
        assert!(test.reached_inference(&seen), "total of 3 meets the overall minimum");

        test.set_overall_minimum(4);
        assert!(!test.reached_inference(&seen));
    }

    #[test]
    fn test_goodness_reports_partial_progress() {
        let mut test = InferenceTest::new(["co2", "brine"]);
        test.set_minimum_for_type("co2", 3);
        let result = test.evaluate(&counts(&[("co2", 1), ("brine", 1)]));
        assert!(!result.inferred);
        assert!((result.goodness - 0.5).abs() < 1e-12);
        let done = test.evaluate(&counts(&[("co2", 3), ("brine", 1)]));
        assert!((done.goodness - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_min_sensor_cost() {
        let mut test = InferenceTest::new(["co2", "brine"]);
        let cost = |t: &str| if t == "co2" { 10.0 } else { 30.0 };
        assert!((test.min_sensor_cost(cost) - 40.0).abs() < 1e-12);
        test.set_overall_minimum(2);
        assert!((test.min_sensor_cost(cost) - 20.0).abs() < 1e-12);
        // Three co2 sensors infer by count alone and undercut one of each
        // type plus a top-up to three
        test.set_overall_minimum(3);
        assert!((test.min_sensor_cost(cost) - 30.0).abs() < 1e-12);
        assert!(test.evaluate(&counts(&[("co2", 3)])).inferred);
        test.set_overall_minimum(5);
        assert!((test.min_sensor_cost(cost) - 40.0).abs() < 1e-12);
    }
}
