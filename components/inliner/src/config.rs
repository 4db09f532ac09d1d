//! Inliner tunables
//!
//! One [`InlinerConfig`] is built per compilation unit and handed by
//! reference to every phase. The numeric defaults are empirical; none of
//! them is derived from a model.

use crate::error::{InlinerError, InlinerResult};
use crate::ir::{COLD_FREQUENCY_BAND, MAX_BLOCK_FREQUENCY};
use core_types::Hotness;
use serde::{Deserialize, Serialize};

/// Configuration for one inlining pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlinerConfig {
    /// Total weight the accepted non-exempt candidates may reach
    pub caller_weight_limit: u32,
    /// Estimated node count above which further candidates are cut
    pub node_count_threshold: u32,
    /// Node count past which reinstated candidates fail the unit at high hotness
    pub node_count_ceiling: u32,
    /// Candidates at or below this weight never form the weight cut point
    pub trivial_weight_for_limit: u32,
    /// Largest estimated size accepted for a top-level candidate
    pub max_callee_size: u32,
    /// Largest estimated size for a nested candidate to be counted inside its parent
    pub max_nested_callee_size: u32,
    /// Deepest nesting the estimator will peek into
    pub max_recursion_depth: u32,
    /// Upper bound on accepted call sites in one unit
    pub max_inlined_call_sites: u32,
    /// Callees smaller than this skip fan-in scaling
    pub min_fan_in_size: u32,
    /// Strength of fan-in scaling
    pub fan_in_size_multiplier: f32,
    /// Fraction of a callee's fan-in held by untracked callers past which an
    /// untracked caller is treated as contributing nothing
    pub fan_in_other_bucket_threshold: f32,
    /// Weight discount for a known-object argument, halved for a fixed class
    /// or constant argument
    pub const_class_weight: u32,
    /// Size assigned to recognized cheap library operations
    pub cheap_library_size: u32,
    /// Size reduction per constant argument of a constant-foldable callee, in percent
    pub constant_arg_scale_pct: u32,
    /// Size reduction per enclosing loop of the call site, in percent
    pub loop_nesting_discount_pct: u32,
    /// Block frequency above which a site counts as hot
    pub hot_border_frequency: u32,
    /// Block frequency below which a site counts as cold
    pub cold_border_frequency: u32,
    /// Minimum share of a site's receiver profile for a profiled target
    pub min_profiled_call_frequency: f32,
    /// Most profiled targets considered per site
    pub max_profiled_targets: usize,
    /// Callees larger than this are penalized in very hot callers
    pub very_large_callee_size: u32,
    /// Optimization level of the compilation unit
    pub hotness: Hotness,
    /// Never convert self tail calls into loops
    pub disable_tail_recursion: bool,
    /// Skip fan-in size scaling
    pub disable_fan_in: bool,
    /// Double the loop nesting discount
    pub aggressive_loop_inlining: bool,
    /// Never inline only the hot part of a callee
    pub disable_partial_inlining: bool,
    /// Ignore receiver profiles during devirtualization
    pub disable_profiled_guards: bool,
}

impl Default for InlinerConfig {
    fn default() -> Self {
        Self {
            caller_weight_limit: 1500,
            node_count_threshold: 4000,
            node_count_ceiling: 50_000,
            trivial_weight_for_limit: 20,
            max_callee_size: 150,
            max_nested_callee_size: 100,
            max_recursion_depth: 5,
            max_inlined_call_sites: 300,
            min_fan_in_size: 40,
            fan_in_size_multiplier: 1.0,
            fan_in_other_bucket_threshold: 0.5,
            const_class_weight: 10,
            cheap_library_size: 5,
            constant_arg_scale_pct: 10,
            loop_nesting_discount_pct: 10,
            hot_border_frequency: 2500,
            cold_border_frequency: 1000,
            min_profiled_call_frequency: 0.10,
            max_profiled_targets: 3,
            very_large_callee_size: 120,
            hotness: Hotness::Warm,
            disable_tail_recursion: false,
            disable_fan_in: false,
            aggressive_loop_inlining: false,
            disable_partial_inlining: false,
            disable_profiled_guards: false,
        }
    }
}

impl InlinerConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    ///
    /// # Examples
    ///
    /// ```
    /// use inliner::InlinerConfig;
    ///
    /// let config = InlinerConfig::from_json(r#"{ "caller_weight_limit": 100 }"#).unwrap();
    /// assert_eq!(config.caller_weight_limit, 100);
    /// assert_eq!(config.node_count_ceiling, 50_000);
    /// ```
    pub fn from_json(text: &str) -> InlinerResult<Self> {
        let config: InlinerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> InlinerResult<()> {
        let invalid = |msg: &str| Err(InlinerError::InvalidConfig(msg.to_string()));
        if self.caller_weight_limit == 0 {
            return invalid("caller_weight_limit must be positive");
        }
        if self.node_count_threshold == 0 {
            return invalid("node_count_threshold must be positive");
        }
        if self.node_count_ceiling < self.node_count_threshold {
            return invalid("node_count_ceiling is below node_count_threshold");
        }
        if self.max_recursion_depth == 0 {
            return invalid("max_recursion_depth must be at least 1");
        }
        if self.cold_border_frequency > self.hot_border_frequency {
            return invalid("cold_border_frequency is above hot_border_frequency");
        }
        if self.hot_border_frequency > MAX_BLOCK_FREQUENCY + COLD_FREQUENCY_BAND {
            return invalid("hot_border_frequency is above the maximum block frequency");
        }
        if !(self.min_profiled_call_frequency > 0.0 && self.min_profiled_call_frequency <= 1.0) {
            return invalid("min_profiled_call_frequency must be in (0, 1]");
        }
        if !(0.0..=1.0).contains(&self.fan_in_other_bucket_threshold) {
            return invalid("fan_in_other_bucket_threshold must be in [0, 1]");
        }
        if !self.fan_in_size_multiplier.is_finite() || self.fan_in_size_multiplier < 0.0 {
            return invalid("fan_in_size_multiplier must be a non-negative number");
        }
        if self.constant_arg_scale_pct > 100 || self.loop_nesting_discount_pct > 100 {
            return invalid("percentages must not exceed 100");
        }
        if self.max_profiled_targets == 0 {
            return invalid("max_profiled_targets must be at least 1");
        }
        Ok(())
    }

    /// Hot and cold border frequencies for this unit's hotness
    ///
    /// Above warm every site below the hot border is treated as ordinary.
    pub fn border_frequencies(&self) -> (u32, u32) {
        if self.hotness > Hotness::Warm {
            (self.hot_border_frequency.min(2000), 0)
        } else {
            (self.hot_border_frequency, self.cold_border_frequency)
        }
    }
}
