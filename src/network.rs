// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Owns the station and source tables plus the baseline-indexed
//! observing-mode collaborator (spec.md §3 "Ownership", §6).

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::ids::{SourceId, StationId};
use crate::source::{BandId, Source};
use crate::station::Station;

/// Owns every [`Station`], keyed by [`StationId`], in deterministic
/// insertion order (spec.md §5 determinism requirement).
#[derive(Clone, Debug, Default)]
pub struct Network {
    stations: IndexMap<StationId, Station>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            stations: IndexMap::new(),
        }
    }

    pub fn add(&mut self, station: Station) {
        self.stations.insert(station.id, station);
    }

    pub fn get(&self, id: StationId) -> Option<&Station> {
        self.stations.get(&id)
    }

    pub fn get_mut(&mut self, id: StationId) -> Option<&mut Station> {
        self.stations.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Station> {
        self.stations.values_mut()
    }

    pub fn station_ids(&self) -> impl Iterator<Item = StationId> + '_ {
        self.stations.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Network-wide mean observation count per station (used by §4.6
    /// `astas`).
    pub fn mean_observation_count(&self) -> f64 {
        if self.stations.is_empty() {
            return 0.0;
        }
        let total: u32 = self
            .stations
            .values()
            .map(|s| s.stats.number_of_observations)
            .sum();
        total as f64 / self.stations.len() as f64
    }
}

/// Owns every [`Source`], keyed by [`SourceId`], in deterministic
/// insertion order.
#[derive(Clone, Debug, Default)]
pub struct SourceList {
    sources: IndexMap<SourceId, Source>,
}

impl SourceList {
    pub fn new() -> Self {
        Self {
            sources: IndexMap::new(),
        }
    }

    pub fn add(&mut self, source: Source) {
        self.sources.insert(source.id, source);
    }

    pub fn get(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(&id)
    }

    pub fn get_mut(&mut self, id: SourceId) -> Option<&mut Source> {
        self.sources.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Source> {
        self.sources.values_mut()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Network-wide mean observation count per source (used by §4.6
    /// `asrcs`, normalized separately by the caller).
    pub fn max_observation_count(&self) -> u32 {
        self.sources
            .values()
            .map(|s| s.stats.number_of_observations)
            .max()
            .unwrap_or(0)
    }
}

/// External collaborator (spec.md §6): per-baseline recording rate and
/// correlator efficiency, and per-band wavelength/minimum-SNR lookups.
/// Production deployments supply their own implementation backed by a real
/// observing-mode/frequency/track/IF/BBC definition reader (out of scope,
/// spec.md §1).
pub trait ObservingMode: Send + Sync {
    fn recording_rate(&self, sta1: StationId, sta2: StationId, band: &BandId) -> f64;
    fn efficiency(&self, sta1: StationId, sta2: StationId) -> f64;
    fn bands(&self) -> Vec<BandId>;
    fn wavelength(&self, band: &BandId) -> f64;
    fn min_snr(&self, band: &BandId) -> f64;
}

/// A simple, uniform-network [`ObservingMode`] for testing and small
/// deployments: one recording rate and efficiency for every baseline, one
/// wavelength/min-SNR per band.
#[derive(Clone, Debug, Default)]
pub struct InMemoryObservingMode {
    pub recording_rate_bps: f64,
    pub efficiency: f64,
    pub bands: HashMap<BandId, (f64, f64)>, // band -> (wavelength_m, min_snr)
}

impl InMemoryObservingMode {
    pub fn new(recording_rate_bps: f64, efficiency: f64) -> Self {
        Self {
            recording_rate_bps,
            efficiency,
            bands: HashMap::new(),
        }
    }

    pub fn with_band(mut self, band: BandId, wavelength_m: f64, min_snr: f64) -> Self {
        self.bands.insert(band, (wavelength_m, min_snr));
        self
    }
}

impl ObservingMode for InMemoryObservingMode {
    fn recording_rate(&self, _sta1: StationId, _sta2: StationId, _band: &BandId) -> f64 {
        self.recording_rate_bps
    }

    fn efficiency(&self, _sta1: StationId, _sta2: StationId) -> f64 {
        self.efficiency
    }

    fn bands(&self) -> Vec<BandId> {
        let mut v: Vec<BandId> = self.bands.keys().cloned().collect();
        v.sort();
        v
    }

    fn wavelength(&self, band: &BandId) -> f64 {
        self.bands.get(band).map(|(w, _)| *w).unwrap_or(0.21)
    }

    fn min_snr(&self, band: &BandId) -> f64 {
        self.bands.get(band).map(|(_, s)| *s).unwrap_or(7.0)
    }
}
