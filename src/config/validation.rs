//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! A run config is read twice. The first read goes into a bare `toml::Value`
//! so every dotted key can be checked against the fields `RunConfig`
//! understands; unknown ones become warnings, with the nearest known key
//! offered as a fix. The second read is the typed serde parse. A warning
//! alone never rejects a file.
//!
//! Some tables are keyed by user data (sensor type names, scenario names).
//! Those segments are matched as `*` before the lookup.

use std::collections::HashSet;

/// An unknown key found in a run config.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `RunConfig`.
///
/// Maintained by hand to match the struct hierarchy in run_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [run]
        "run",
        "run.name",
        "run.seed",
        "run.workers",
        "run.steps",
        "run.threaded",
        "run.model_option",
        "run.mutation",
        "run.ttd_aggregation",
        // [constraints]
        "constraints",
        "constraints.add_point",
        "constraints.max_wells",
        "constraints.cost_ceiling",
        "constraints.exclusion_radius",
        "constraints.inclusion_radius",
        "constraints.allow_multiple_sensors_in_well",
        "constraints.edge_moves_only",
        "constraints.well_cost",
        "constraints.well_depth_cost",
        // [sensors.<type>]
        "sensors",
        "sensors.*",
        "sensors.*.cost",
        "sensors.*.trigger",
        "sensors.*.delta",
        "sensors.*.lower_threshold",
        "sensors.*.upper_threshold",
        "sensors.*.min_z",
        "sensors.*.max_z",
        "sensors.*.combine",
        "sensors.*.pareto_optimal",
        // [inference]
        "inference",
        "inference.overall_minimum",
        "inference.per_type",
        "inference.per_type.*",
        // [scenarios]
        "scenarios",
        "scenarios.weights",
        "scenarios.weights.*",
    ];
    keys.iter().copied().collect()
}

/// Replace user-named segments with `*`, returning the pattern and the
/// segment it stood for.
fn generalize_key(key: &str) -> (String, Option<&str>) {
    let parts: Vec<&str> = key.split('.').collect();
    let wildcard_at = match parts.as_slice() {
        ["sensors", _, ..] => Some(1),
        ["inference", "per_type", _] | ["scenarios", "weights", _] => Some(2),
        _ => None,
    };
    match wildcard_at {
        Some(i) => {
            let mut pattern = parts.clone();
            pattern[i] = "*";
            (pattern.join("."), Some(parts[i]))
        }
        None => (key.to_string(), None),
    }
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Every dotted key path in `value`, tables included:
/// `[sensors.co2] cost = 1.0` gives `sensors`, `sensors.co2`, `sensors.co2.cost`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Nearest known key to `unknown`, when it is at most three edits away.
/// Ties go to the lexicographically smaller key.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|&(d, _)| d <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Warnings for every key in `raw_toml` that `RunConfig` does not read.
///
/// Unparseable input yields no warnings; the typed parse reports it.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    let mut warnings = Vec::new();

    for key in walk_toml_keys(&value, "") {
        let (pattern, named) = generalize_key(&key);
        if known.contains(pattern.as_str()) {
            continue;
        }
        let suggestion = suggest_correction(&pattern, &known)
            .map(|s| named.map_or_else(|| s.clone(), |n| s.replacen('*', n, 1)));
        warnings.push(ValidationWarning {
            message: format!("Unknown config key '{key}'"),
            field: key,
            suggestion,
        });
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================
