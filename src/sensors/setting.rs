//! Per-type sensor settings and the cached "cloud" of valid nodes.
//!
//! The cloud of a sensor type is the set of nodes at which its trigger rule
//! fires in the scenarios, combined across scenarios by union or
//! intersection and trimmed to the type's depth window. It is expensive to
//! compute, so it is cached and only recomputed on the first read after a
//! change to a field that affects triggering.
//!
//! The cache sits behind an `RwLock` so a populated cloud can be read from
//! many worker threads; recomputation happens under the write lock after a
//! re-check, so at most one thread ever computes it.

use super::trigger::{DeltaType, Trigger, TriggerRule};
use crate::data::FieldDataSource;
use crate::grid::{NodeId, NodeStructure};
use crate::types::Scenario;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Cost assigned to a sensor type before the user changes it.
pub const DEFAULT_SENSOR_COST: f64 = 100.0;

/// How per-scenario triggering sets are combined into one cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CombinePolicy {
    /// A node is valid if it triggers in any scenario.
    #[default]
    Union,
    /// A node is valid only if it triggers in every scenario.
    Intersection,
}

/// Incoming user-editable fields of a [`SensorSetting`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub cost: f64,
    pub trigger: Trigger,
    pub delta_type: DeltaType,
    pub lower_threshold: f64,
    pub upper_threshold: f64,
    pub min_z: f64,
    pub max_z: f64,
    pub combine: CombinePolicy,
    pub pareto_optimal: bool,
    /// Force recomputation even when nothing else differs.
    pub reset: bool,
}

#[derive(Debug)]
struct CloudCache {
    stale: bool,
    valid: Arc<BTreeSet<NodeId>>,
    full: Arc<BTreeSet<NodeId>>,
}

impl CloudCache {
    fn stale() -> Self {
        Self {
            stale: true,
            valid: Arc::default(),
            full: Arc::default(),
        }
    }
}

/// Trigger configuration, cost, and cached cloud of one sensor type.
#[derive(Debug)]
pub struct SensorSetting {
    sensor_type: String,
    cost: f64,
    rule: TriggerRule,
    min_z: f64,
    max_z: f64,
    combine: CombinePolicy,
    pareto_optimal: bool,
    min_value: Option<f64>,
    max_value: Option<f64>,
    cache: RwLock<CloudCache>,
}

impl Clone for SensorSetting {
    fn clone(&self) -> Self {
        let cache = self.read_cache();
        Self {
            sensor_type: self.sensor_type.clone(),
            cost: self.cost,
            rule: self.rule,
            min_z: self.min_z,
            max_z: self.max_z,
            combine: self.combine,
            pareto_optimal: self.pareto_optimal,
            min_value: self.min_value,
            max_value: self.max_value,
            cache: RwLock::new(CloudCache {
                stale: cache.stale,
                valid: Arc::clone(&cache.valid),
                full: Arc::clone(&cache.full),
            }),
        }
    }
}

impl SensorSetting {
    /// New setting with default cost and trigger, spanning the grid's full depth.
    pub fn new(sensor_type: impl Into<String>, grid: &NodeStructure, source: &dyn FieldDataSource) -> Self {
        let sensor_type = sensor_type.into();
        let (min_z, max_z) = grid.z_range();
        let min_value = source.min_value(&sensor_type);
        let max_value = source.max_value(&sensor_type);
        debug!(sensor_type = %sensor_type, ?min_value, ?max_value, "Sensor setting initialized");
        Self {
            sensor_type,
            cost: DEFAULT_SENSOR_COST,
            rule: TriggerRule::default(),
            min_z,
            max_z,
            combine: CombinePolicy::Union,
            pareto_optimal: false,
            min_value,
            max_value,
            cache: RwLock::new(CloudCache::stale()),
        }
    }

    pub fn sensor_type(&self) -> &str {
        &self.sensor_type
    }

    pub const fn cost(&self) -> f64 {
        self.cost
    }

    pub const fn rule(&self) -> &TriggerRule {
        &self.rule
    }

    pub const fn z_bounds(&self) -> (f64, f64) {
        (self.min_z, self.max_z)
    }

    pub const fn combine(&self) -> CombinePolicy {
        self.combine
    }

    pub const fn pareto_optimal(&self) -> bool {
        self.pareto_optimal
    }

    /// Global minimum of this type's field, as reported by the data source.
    pub const fn min_value(&self) -> Option<f64> {
        self.min_value
    }

    pub const fn max_value(&self) -> Option<f64> {
        self.max_value
    }

    /// Current user-editable fields, e.g. to start an edit from.
    pub const fn user_settings(&self) -> UserSettings {
        UserSettings {
            cost: self.cost,
            trigger: self.rule.trigger,
            delta_type: self.rule.delta_type,
            lower_threshold: self.rule.lower,
            upper_threshold: self.rule.upper,
            min_z: self.min_z,
            max_z: self.max_z,
            combine: self.combine,
            pareto_optimal: self.pareto_optimal,
            reset: false,
        }
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, CloudCache> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, CloudCache> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_stale(&self) -> bool {
        self.read_cache().stale
    }

    /// Mark the cloud for recomputation on the next read.
    pub fn invalidate(&self) {
        self.write_cache().stale = true;
    }

    /// Apply user edits. Any differing field marks the cloud stale; nothing
    /// is recomputed until the next read. Returns whether anything changed.
    pub fn apply_user_settings(&mut self, settings: &UserSettings) -> bool {
        let (min_z, max_z) = if settings.min_z <= settings.max_z {
            (settings.min_z, settings.max_z)
        } else {
            (settings.max_z, settings.min_z)
        };
        let rule = TriggerRule {
            trigger: settings.trigger,
            delta_type: settings.delta_type,
            lower: settings.lower_threshold,
            upper: settings.upper_threshold,
        };

        #[allow(clippy::float_cmp)]
        let changed = settings.reset
            || self.cost != settings.cost
            || self.rule != rule
            || self.min_z != min_z
            || self.max_z != max_z
            || self.combine != settings.combine
            || self.pareto_optimal != settings.pareto_optimal;

        if changed {
            self.cost = settings.cost;
            self.rule = rule;
            self.min_z = min_z;
            self.max_z = max_z;
            self.combine = settings.combine;
            self.pareto_optimal = settings.pareto_optimal;
            self.cache
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .stale = true;
            debug!(sensor_type = %self.sensor_type, "Sensor settings changed, cloud marked stale");
        }
        changed
    }

    /// The cloud of this type: valid nodes after depth trimming and, when
    /// enabled, Pareto pruning.
    pub fn valid_nodes(
        &self,
        grid: &NodeStructure,
        scenarios: &[Scenario],
        source: &dyn FieldDataSource,
    ) -> Arc<BTreeSet<NodeId>> {
        {
            let cache = self.read_cache();
            if !cache.stale {
                return Arc::clone(&cache.valid);
            }
        }
        let mut cache = self.write_cache();
        if cache.stale {
            self.recompute(&mut cache, grid, scenarios, source);
        }
        Arc::clone(&cache.valid)
    }

    /// The depth-trimmed cloud before Pareto pruning.
    pub fn full_cloud(
        &self,
        grid: &NodeStructure,
        scenarios: &[Scenario],
        source: &dyn FieldDataSource,
    ) -> Arc<BTreeSet<NodeId>> {
        self.valid_nodes(grid, scenarios, source);
        Arc::clone(&self.read_cache().full)
    }

    fn recompute(
        &self,
        cache: &mut CloudCache,
        grid: &NodeStructure,
        scenarios: &[Scenario],
        source: &dyn FieldDataSource,
    ) {
        let mut combined: Option<BTreeSet<NodeId>> = None;
        for scenario in scenarios {
            let nodes = source.valid_nodes_for_trigger(grid, scenario, &self.sensor_type, &self.rule);
            combined = Some(match (combined, self.combine) {
                (None, _) => nodes,
                (Some(acc), CombinePolicy::Union) => &acc | &nodes,
                (Some(acc), CombinePolicy::Intersection) => &acc & &nodes,
            });
        }

        let full: BTreeSet<NodeId> = combined
            .unwrap_or_default()
            .into_iter()
            .filter(|&node| {
                let z = grid.xyz_center(grid.ijk(node)).z;
                self.min_z <= z && z <= self.max_z
            })
            .collect();

        let valid = if self.pareto_optimal {
            pareto_front(&full, |node| {
                scenarios
                    .iter()
                    .map(|s| {
                        source
                            .first_trigger(grid, s, &self.sensor_type, &self.rule, node)
                            .map_or(f64::INFINITY, |step| step.real_time)
                    })
                    .collect()
            })
        } else {
            full.clone()
        };

        info!(
            sensor_type = %self.sensor_type,
            trigger = %self.rule.trigger,
            full = full.len(),
            valid = valid.len(),
            "Sensor cloud recomputed"
        );
        cache.full = Arc::new(full);
        cache.valid = Arc::new(valid);
        cache.stale = false;
    }
}

/// Keep the nodes whose per-scenario detection times are not dominated by
/// any other node. Nodes with identical time vectors are all kept.
fn pareto_front<F>(nodes: &BTreeSet<NodeId>, times_of: F) -> BTreeSet<NodeId>
where
    F: Fn(NodeId) -> Vec<f64>,
{
    let scored: Vec<(NodeId, Vec<f64>)> = nodes.iter().map(|&n| (n, times_of(n))).collect();
    scored
        .iter()
        .filter(|(_, mine)| {
            !scored.iter().any(|(_, other)| {
                let no_worse = other.iter().zip(mine).all(|(o, m)| o <= m);
                let better = other.iter().zip(mine).any(|(o, m)| o < m);
                no_worse && better
            })
        })
        .map(|(n, _)| *n)
        .collect()
}
