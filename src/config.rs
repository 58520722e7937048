// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The scheduler's own recognized configuration surface (spec.md §6) —
//! scoring weights, feature toggles, subnetting/sky-coverage thresholds,
//! and the scan-sequence/multi-scheduling sweep parameters. Not a VEX/SKD
//! file reader; those remain external (spec.md §1).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::SourceId;

/// Scoring coefficients for [`crate::subcon::Subcon`] (spec.md §4.6).
/// Every term is normalized to `[0, 1]` before being multiplied by its
/// weight (Design Notes §9, Open Question resolution — see DESIGN.md).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightFactors {
    pub number_of_observations: f64,
    pub average_stations: f64,
    pub average_sources: f64,
    pub duration: f64,
    pub sky_coverage: f64,
    pub low_elevation: f64,
    pub idle_time: f64,
    pub closures: f64,
}

impl Default for WeightFactors {
    fn default() -> Self {
        Self {
            number_of_observations: 1.0,
            average_stations: 1.0,
            average_sources: 1.0,
            duration: 1.0,
            sky_coverage: 1.0,
            low_elevation: 0.0,
            idle_time: 0.0,
            closures: 0.0,
        }
    }
}

impl WeightFactors {
    pub fn is_all_zero(&self) -> bool {
        [
            self.number_of_observations,
            self.average_stations,
            self.average_sources,
            self.duration,
            self.sky_coverage,
            self.low_elevation,
            self.idle_time,
            self.closures,
        ]
        .iter()
        .all(|w| *w == 0.0)
    }
}

/// A custom scan cadence (spec.md §4.7 step 2, §6 `scan_sequence`):
/// every `cadence`-th committed scan, if `current_index % cadence` has a
/// configured target set, eligible sources are restricted to it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScanSequence {
    pub cadence: u32,
    pub targets: HashMap<u32, Vec<SourceId>>,
}

impl ScanSequence {
    /// The restricted source set for the given 0-based committed-scan
    /// index, if the cadence rule applies at this tick.
    pub fn targets_for(&self, committed_index: u32) -> Option<&[SourceId]> {
        if self.cadence == 0 {
            return None;
        }
        self.targets
            .get(&(committed_index % self.cadence))
            .map(|v| v.as_slice())
    }
}

/// spec.md §4.7 step 4, "High-impact override": a pre-computed window
/// during which `source_id` must be observed, preempting whatever the
/// regular selection competition would otherwise pick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HighImpactWindow {
    pub source_id: SourceId,
    pub start_time: f64,
    pub end_time: f64,
}

/// The scheduler's recognized configuration keys (spec.md §6).
///
/// There is deliberately no `fillin_during_selection` key: step 6's "must
/// return to required end-pointing on time" check needs each idle
/// station's *actual* next commitment, which only exists once the whole
/// timeline is committed. An in-loop pass would have to approve fillin
/// candidates against a commitment it can't yet see; `fillin_a_posteriori`
/// is the only pass that can enforce the invariant honestly, so it's the
/// only one this crate ships.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub weights: WeightFactors,
    pub subnetting: bool,
    pub fillin_a_posteriori: bool,
    pub min_number_of_stations_per_subcon: u32,
    pub subnetting_min_angle_deg: f64,
    pub subnetting_max_angle_deg: f64,
    pub subnetting_time_tolerance_sec: f64,
    pub max_influence_time_sec: f64,
    pub max_influence_distance_rad: f64,
    pub scan_sequence: Option<ScanSequence>,
    pub seed: Option<u64>,
    pub high_impact_windows: Vec<HighImpactWindow>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weights: WeightFactors::default(),
            subnetting: false,
            fillin_a_posteriori: false,
            min_number_of_stations_per_subcon: 2,
            subnetting_min_angle_deg: 0.0,
            subnetting_max_angle_deg: 180.0,
            subnetting_time_tolerance_sec: crate::constants::DEFAULT_SUBNETTING_TIME_TOLERANCE,
            max_influence_time_sec: 3600.0,
            max_influence_distance_rad: 30.0f64.to_radians(),
            scan_sequence: None,
            seed: None,
            high_impact_windows: Vec::new(),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("all scoring weights are zero; at least one must be positive")]
    AllWeightsZero,
    #[error("min_number_of_stations_per_subcon must be at least 2, got {0}")]
    TooFewStations(u32),
    #[error("subnetting_min_angle_deg ({0}) must be less than subnetting_max_angle_deg ({1})")]
    InvertedSubnettingAngles(f64, f64),
}

impl Config {
    /// `ConfigInconsistency` checks (spec.md §7): raised at setup, never
    /// from inside the selection loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weights.is_all_zero() {
            return Err(ConfigError::AllWeightsZero);
        }
        if self.min_number_of_stations_per_subcon < 2 {
            return Err(ConfigError::TooFewStations(
                self.min_number_of_stations_per_subcon,
            ));
        }
        if self.subnetting_min_angle_deg >= self.subnetting_max_angle_deg {
            return Err(ConfigError::InvertedSubnettingAngles(
                self.subnetting_min_angle_deg,
                self.subnetting_max_angle_deg,
            ));
        }
        Ok(())
    }

    /// Load from a TOML string on disk. Note this reads the scheduler's
    /// *own* settings, not any VEX/SKD/NGS exchange format.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|_e| ConfigError::AllWeightsZero)
    }
}

/// Parameter-sweep expansion (spec.md §2/§5, "MultiScheduling"): expands
/// one base [`Config`] into `K` independent configs by Cartesian product
/// over configured value lists.
#[derive(Clone, Debug, Default)]
pub struct MultiScheduling {
    pub sky_coverage_weights: Vec<f64>,
    pub subnetting_options: Vec<bool>,
}

impl MultiScheduling {
    /// Expand into concrete jobs. An empty sweep axis keeps the base
    /// config's value for that axis.
    pub fn expand(&self, base: &Config) -> Vec<Config> {
        let sky_weights = if self.sky_coverage_weights.is_empty() {
            vec![base.weights.sky_coverage]
        } else {
            self.sky_coverage_weights.clone()
        };
        let subnetting_opts = if self.subnetting_options.is_empty() {
            vec![base.subnetting]
        } else {
            self.subnetting_options.clone()
        };

        let mut jobs = Vec::with_capacity(sky_weights.len() * subnetting_opts.len());
        for &sky in &sky_weights {
            for &subnetting in &subnetting_opts {
                let mut cfg = base.clone();
                cfg.weights.sky_coverage = sky;
                cfg.subnetting = subnetting;
                jobs.push(cfg);
            }
        }
        jobs
    }
}
