// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-source parameters, flux model, event timeline and statistics
//! (spec.md §3, "Source").

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::astro::AstroProvider;
use crate::coord::RADec;
use crate::ids::{SourceId, StationId};

/// Band identifier (e.g. `"S"`, `"X"`). Bands are a network-defined open
/// set (unlike the closed antenna-axis/wrap-sector enums), so this is a
/// thin string newtype rather than a `strum` enum.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BandId(pub String);

impl From<&str> for BandId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A source's flux density model for one band (spec.md §4.3).
#[derive(Clone, Debug, PartialEq)]
pub enum FluxModel {
    /// Tabulated `(projected baseline length [wavelengths], flux [Jy])`
    /// points, sorted ascending by baseline length; linear interpolation
    /// between bracketing points, clamped at the edges.
    Tabulated { points: Vec<(f64, f64)> },

    /// A closed-form spectral-index model, baseline-independent (point
    /// source): `flux(freq) = flux_jy * (freq / reference_freq_hz) ^ index`.
    SpectralIndex {
        flux_jy: f64,
        reference_freq_hz: f64,
        index: f64,
    },
}

#[derive(Error, Debug, PartialEq)]
pub enum EstimateError {
    #[error("frequency must be positive, got {0} Hz")]
    NonPositiveFrequency(f64),
}

impl FluxModel {
    /// spec.md §4.3 `observed_flux`: projected-baseline- and
    /// frequency-dependent flux density, Jansky.
    pub fn observed_flux(&self, freq_hz: f64, baseline_wavelengths: f64) -> Result<f64, EstimateError> {
        if freq_hz <= 0.0 {
            return Err(EstimateError::NonPositiveFrequency(freq_hz));
        }
        Ok(match self {
            FluxModel::SpectralIndex {
                flux_jy,
                reference_freq_hz,
                index,
            } => flux_jy * (freq_hz / reference_freq_hz).powf(*index),
            FluxModel::Tabulated { points } => interpolate_flux(points, baseline_wavelengths),
        })
    }

    /// Supremum of the model (the zero-baseline / reference-frequency
    /// flux), used by [`Source::is_strong_enough`].
    pub fn supremum(&self) -> f64 {
        match self {
            FluxModel::SpectralIndex { flux_jy, .. } => *flux_jy,
            FluxModel::Tabulated { points } => {
                points.first().map(|(_, f)| *f).unwrap_or(0.0)
            }
        }
    }
}

fn interpolate_flux(points: &[(f64, f64)], x: f64) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    if x <= points[0].0 {
        return points[0].1;
    }
    let last = points.len() - 1;
    if x >= points[last].0 {
        return points[last].1;
    }
    let idx = points.partition_point(|&(bx, _)| bx <= x);
    let (x0, y0) = points[idx - 1];
    let (x1, y1) = points[idx];
    if (x1 - x0).abs() < 1e-15 {
        return y0;
    }
    y0 + (x - x0) / (x1 - x0) * (y1 - y0)
}

/// A hard event forbids crossing it inside an in-flight scan; a soft one
/// allows an already-started scan to complete (spec.md §3, "Event").
#[derive(Clone, Debug)]
pub struct Event<P> {
    pub apply_at_time: f64,
    pub soft_transition: bool,
    pub parameters: P,
}

/// Summary of the events crossed by one [`Source::advance_events`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventCrossing {
    pub crossed_any: bool,
    pub crossed_hard: bool,
}

/// Source-side configurable parameters (spec.md §3, "Parameters").
#[derive(Clone, Debug, PartialEq)]
pub struct SourceParameters {
    pub available: bool,
    pub available_for_fillin: bool,
    pub weight: f64,
    pub min_snr: HashMap<BandId, f64>,
    pub min_elevation: f64,
    pub max_slew_time: Option<f64>,
    pub min_slew_distance: Option<f64>,
    pub max_slew_distance: Option<f64>,
    pub max_wait: f64,
    pub min_scan: f64,
    pub max_scan: f64,
    pub min_number_of_stations: u32,
    pub min_flux: f64,
    pub min_repeat: f64,
    pub min_sun_distance: f64,
    pub ignore_sources: HashSet<SourceId>,
    pub ignore_stations: HashSet<StationId>,
    pub ignore_baselines: HashSet<(StationId, StationId)>,
    pub required_stations: HashSet<StationId>,
    pub fixed_scan_duration: Option<f64>,
    pub try_to_focus: Option<TryToFocus>,
    pub max_number_of_scans: Option<u32>,
}

/// "Focus" behavior block: bias scoring toward this source until it has
/// accumulated enough observations, then stop treating it specially.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TryToFocus {
    pub target_number_of_scans: u32,
    pub bonus_weight: f64,
}

impl Default for SourceParameters {
    fn default() -> Self {
        Self {
            available: true,
            available_for_fillin: true,
            weight: 1.0,
            min_snr: HashMap::new(),
            min_elevation: crate::constants::DEFAULT_MIN_ELEVATION,
            max_slew_time: None,
            min_slew_distance: None,
            max_slew_distance: None,
            max_wait: 600.0,
            min_scan: 30.0,
            max_scan: 600.0,
            min_number_of_stations: 2,
            min_flux: 0.0,
            min_repeat: 0.0,
            min_sun_distance: 0.0,
            ignore_sources: HashSet::new(),
            ignore_stations: HashSet::new(),
            ignore_baselines: HashSet::new(),
            required_stations: HashSet::new(),
            fixed_scan_duration: None,
            try_to_focus: None,
            max_number_of_scans: None,
        }
    }
}

/// Incremental per-source statistics (spec.md §3).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SourceStatistics {
    pub last_scan_time: Option<f64>,
    pub number_of_scans: u32,
    pub number_of_observations: u32,
}

/// A catalog source (spec.md §3, "Source").
#[derive(Clone, Debug)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    pub alternate_name: Option<String>,
    pub radec: RADec,
    flux_models: HashMap<BandId, FluxModel>,
    timeline: Vec<Event<SourceParameters>>,
    next_event: usize,
    active_parameters: SourceParameters,
    pub stats: SourceStatistics,
}

impl Source {
    pub fn new(
        id: SourceId,
        name: impl Into<String>,
        radec: RADec,
        initial_parameters: SourceParameters,
        mut timeline: Vec<Event<SourceParameters>>,
    ) -> Self {
        timeline.sort_by(|a, b| a.apply_at_time.partial_cmp(&b.apply_at_time).unwrap());
        Self {
            id,
            name: name.into(),
            alternate_name: None,
            radec,
            flux_models: HashMap::new(),
            timeline,
            next_event: 0,
            active_parameters: initial_parameters,
            stats: SourceStatistics::default(),
        }
    }

    /// Precomputed unit vector in the celestial frame (invariant: norm =
    /// 1, enforced by construction via [`RADec::to_unit_vector`]).
    pub fn unit_vector(&self) -> [f64; 3] {
        self.radec.to_unit_vector()
    }

    pub fn set_flux_model(&mut self, band: BandId, model: FluxModel) {
        self.flux_models.insert(band, model);
    }

    pub fn flux_model(&self, band: &BandId) -> Option<&FluxModel> {
        self.flux_models.get(band)
    }

    pub fn parameters(&self) -> &SourceParameters {
        &self.active_parameters
    }

    /// `check_for_new_event`: advance the cursor past every event with
    /// `apply_at_time <= t`, folding their hard/soft flags together.
    pub fn advance_events(&mut self, t: f64) -> EventCrossing {
        let mut crossing = EventCrossing::default();
        while self.next_event < self.timeline.len()
            && self.timeline[self.next_event].apply_at_time <= t
        {
            let event = &self.timeline[self.next_event];
            crossing.crossed_any = true;
            crossing.crossed_hard |= !event.soft_transition;
            self.active_parameters = event.parameters.clone();
            self.next_event += 1;
        }
        crossing
    }

    /// spec.md §4.3 `observed_flux`. Falls back to a small non-zero
    /// constant when the band is absent, per spec.md's "If the band is
    /// absent, returns a configured fallback".
    pub fn observed_flux(
        &self,
        band: &BandId,
        freq_hz: f64,
        baseline_wavelengths: f64,
        fallback_jy: f64,
    ) -> Result<f64, EstimateError> {
        match self.flux_models.get(band) {
            Some(model) => model.observed_flux(freq_hz, baseline_wavelengths),
            None => Ok(fallback_jy),
        }
    }

    /// spec.md §4.3 `is_strong_enough`.
    pub fn is_strong_enough(&self) -> (bool, f64) {
        let max_flux = self
            .flux_models
            .values()
            .map(|m| m.supremum())
            .fold(0.0_f64, f64::max);
        (max_flux >= self.active_parameters.min_flux, max_flux)
    }

    /// spec.md §4.3 `sun_distance`.
    pub fn sun_distance(&self, t: f64, astro: &dyn AstroProvider) -> f64 {
        self.radec.separation(&astro.sun_position(t))
    }

    /// spec.md §4.6 cadence check: `t >= last_scan_time + min_repeat`.
    pub fn cadence_satisfied(&self, t: f64) -> bool {
        match self.stats.last_scan_time {
            None => true,
            Some(last) => t >= last + self.active_parameters.min_repeat,
        }
    }

    /// Record a committed observation (invariant: `last_scan_time` never
    /// decreases).
    pub fn record_scan(&mut self, start_time: f64, num_observations: u32) {
        self.stats.last_scan_time = Some(
            self.stats
                .last_scan_time
                .map_or(start_time, |prev| prev.max(start_time)),
        );
        self.stats.number_of_scans += 1;
        self.stats.number_of_observations += num_observations;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn src() -> Source {
        Source::new(
            SourceId(0),
            "3C123",
            RADec::new(0.0, 0.0),
            SourceParameters::default(),
            Vec::new(),
        )
    }

    #[test]
    fn tabulated_flux_interpolates() {
        let model = FluxModel::Tabulated {
            points: vec![(0.0, 10.0), (100.0, 2.0)],
        };
        let mid = model.observed_flux(1.4e9, 50.0).unwrap();
        assert_abs_diff_eq!(mid, 6.0, epsilon = 1e-9);
    }

    #[test]
    fn spectral_index_is_closed_form() {
        let model = FluxModel::SpectralIndex {
            flux_jy: 10.0,
            reference_freq_hz: 1.0e9,
            index: -0.7,
        };
        let f = model.observed_flux(2.0e9, 0.0).unwrap();
        assert_abs_diff_eq!(f, 10.0 * 2.0_f64.powf(-0.7), epsilon = 1e-9);
    }

    #[test]
    fn rejects_non_positive_frequency() {
        let model = FluxModel::SpectralIndex {
            flux_jy: 10.0,
            reference_freq_hz: 1.0e9,
            index: -0.7,
        };
        assert!(model.observed_flux(0.0, 0.0).is_err());
    }

    #[test]
    fn missing_band_uses_fallback() {
        let s = src();
        let flux = s
            .observed_flux(&BandId::from("X"), 8.4e9, 0.0, 0.001)
            .unwrap();
        assert_abs_diff_eq!(flux, 0.001, epsilon = 1e-12);
    }

    #[test]
    fn last_scan_time_never_decreases() {
        let mut s = src();
        s.record_scan(100.0, 3);
        s.record_scan(50.0, 2);
        assert_eq!(s.stats.last_scan_time, Some(100.0));
        assert_eq!(s.stats.number_of_scans, 2);
        assert_eq!(s.stats.number_of_observations, 5);
    }

    #[test]
    fn cadence_respects_min_repeat() {
        let mut s = src();
        s.active_parameters.min_repeat = 1000.0;
        s.record_scan(0.0, 1);
        assert!(!s.cadence_satisfied(500.0));
        assert!(s.cadence_satisfied(1000.0));
    }

    #[test]
    fn hard_event_crossing_is_flagged() {
        let mut s = Source::new(
            SourceId(0),
            "test",
            RADec::new(0.0, 0.0),
            SourceParameters::default(),
            vec![
                Event {
                    apply_at_time: 10.0,
                    soft_transition: true,
                    parameters: SourceParameters::default(),
                },
                Event {
                    apply_at_time: 20.0,
                    soft_transition: false,
                    parameters: SourceParameters {
                        available: false,
                        ..SourceParameters::default()
                    },
                },
            ],
        );
        let c = s.advance_events(5.0);
        assert!(!c.crossed_any);
        let c = s.advance_events(15.0);
        assert!(c.crossed_any && !c.crossed_hard);
        let c = s.advance_events(25.0);
        assert!(c.crossed_hard);
        assert!(!s.parameters().available);
    }
}
