// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The candidate/committed scan data model and the construction pipeline
//! that turns a set of raw pointings into a scan with aligned times and
//! baseline durations (spec.md §3 "Scan"/"ScanTimes"/"Observation", §4.5).

use std::collections::BTreeMap;

use strum_macros::EnumIter;
use thiserror::Error;

use crate::coord::PointingVector;
use crate::ids::{SourceId, StationId};
use crate::network::{Network, ObservingMode};
use crate::source::Source;
use crate::station::Station;

const SPEED_OF_LIGHT_M_PER_S: f64 = 299_792_458.0;

/// spec.md §3, "Scan": the kind of scan, driving which selection pass
/// produced it (statistics and output writers key off this).
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter)]
pub enum ScanType {
    Standard,
    HighImpact,
    AstroCalibrator,
    FringeFinder,
    Parallactic,
    DiffParallactic,
    Fillin,
}

/// spec.md §3, "Scan": whether this scan occupies the whole network or one
/// arm of a subnetting pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter)]
pub enum Constellation {
    Single,
    Subnetting,
}

/// Recoverable, candidate-local failures of the §4.5 pipeline (Design
/// Notes §9: modeled as `Result`, never a panic).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanRejected {
    #[error("scan has {have} stations, needs at least {need}")]
    TooFewStations { have: u32, need: u32 },

    #[error("no observations survived baseline construction")]
    NoObservations,

    #[error("station {0} produced a numeric singularity during refinement")]
    NumericSingularity(StationId),

    #[error("required stations {0:?} are not all present in the scan")]
    MissingRequiredStations(Vec<StationId>),
}

/// The six ordered per-station time milestones of spec.md §3, "ScanTimes".
/// Invariant (enforced by construction, never by a caller mutating fields
/// directly): `end_of_previous_scan <= end_of_field_system <= end_of_slew
/// <= end_of_idle <= end_of_preob <= end_of_observing`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StationScanTimes {
    pub end_of_previous_scan: f64,
    pub end_of_field_system: f64,
    pub end_of_slew: f64,
    pub end_of_idle: f64,
    pub end_of_preob: f64,
    pub end_of_observing: f64,
}

impl StationScanTimes {
    pub fn slew_seconds(&self) -> f64 {
        self.end_of_slew - self.end_of_field_system
    }

    pub fn idle_seconds(&self) -> f64 {
        self.end_of_idle - self.end_of_slew
    }

    pub fn observing_seconds(&self) -> f64 {
        self.end_of_observing - self.end_of_preob
    }
}

/// A per-baseline entry in a [`Scan`] (spec.md §3, "Observation").
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub station1_id: StationId,
    pub station2_id: StationId,
    pub source_id: SourceId,
    pub start_time: f64,
    pub duration: f64,
}

/// A scheduled or candidate observation of one source by N≥2 stations
/// (spec.md §3, "Scan").
#[derive(Clone, Debug)]
pub struct Scan {
    pub scan_type: ScanType,
    pub constellation: Constellation,
    pub source_id: SourceId,
    pub pointings_start: BTreeMap<StationId, PointingVector>,
    pub pointings_end: BTreeMap<StationId, PointingVector>,
    pub times: BTreeMap<StationId, StationScanTimes>,
    pub observations: Vec<Observation>,
    pub score: f64,
    pub min_required_stations: u32,
}

impl Scan {
    pub fn stations(&self) -> impl Iterator<Item = StationId> + '_ {
        self.pointings_start.keys().copied()
    }

    pub fn num_stations(&self) -> u32 {
        self.pointings_start.len() as u32
    }

    /// The scan's observing start: the latest `end_of_preob` across
    /// stations (the station-alignment rule of spec.md §3).
    pub fn observing_start(&self) -> f64 {
        self.times
            .values()
            .map(|t| t.end_of_preob)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// The latest `end_of_observing` across stations.
    pub fn max_end_time(&self) -> f64 {
        self.times
            .values()
            .map(|t| t.end_of_observing)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn station_duration(&self, station: StationId) -> Option<f64> {
        self.times.get(&station).map(StationScanTimes::observing_seconds)
    }

    fn validate_min_stations(&self) -> Result<(), ScanRejected> {
        if self.num_stations() < self.min_required_stations {
            return Err(ScanRejected::TooFewStations {
                have: self.num_stations(),
                need: self.min_required_stations,
            });
        }
        Ok(())
    }
}

/// A candidate pointing with its aligned times, as chosen by the
/// earliest-start pass (step 1).
struct Candidate {
    pv: PointingVector,
    times: StationScanTimes,
}

/// spec.md §4.5: run the full construction pipeline on a raw set of
/// pointings, producing an aligned [`Scan`] or the reason it was rejected.
#[allow(clippy::too_many_arguments)]
pub fn construct_candidate(
    source: &Source,
    raw_pointings: BTreeMap<StationId, PointingVector>,
    previous_scan_end: &BTreeMap<StationId, f64>,
    network: &Network,
    mode: &dyn ObservingMode,
    fallback_flux_jy: f64,
    min_stations: u32,
    scan_type: ScanType,
    constellation: Constellation,
) -> Result<Scan, ScanRejected> {
    // Step 1: earliest-start pass.
    let mut candidates: BTreeMap<StationId, Candidate> = BTreeMap::new();
    for (&station_id, &pv) in &raw_pointings {
        let Some(station) = network.get(station_id) else {
            continue;
        };
        let end_of_prev = previous_scan_end
            .get(&station_id)
            .copied()
            .unwrap_or(station.current_pointing.time);
        let end_of_field_system = end_of_prev + station.wait.field_system;

        let current_pv = PointingVector::new(
            station.id,
            pv.source_id,
            station.current_pointing.az,
            station.current_pointing.el,
            station.current_pointing.time,
        );
        let (unwrapped_az, _sector) = if station.first_scan {
            match station.wrap.sector_of(pv.az) {
                Some(s) => (pv.az, s),
                None => continue,
            }
        } else {
            match station.wrap.calc_unwrapped_az(&current_pv, pv.az) {
                Some(r) => r,
                None => continue,
            }
        };
        let mut pv = pv;
        pv.az = unwrapped_az;

        let slew = station
            .kinematics
            .slew_seconds(&current_pv, &pv, station.first_scan);
        if let Some(max_slew) = station.parameters().max_slew_time {
            if slew > max_slew {
                continue;
            }
        }

        let end_of_slew = end_of_field_system + slew;
        candidates.insert(
            station_id,
            Candidate {
                pv,
                times: StationScanTimes {
                    end_of_previous_scan: end_of_prev,
                    end_of_field_system,
                    end_of_slew,
                    end_of_idle: end_of_slew,
                    end_of_preob: end_of_slew,
                    end_of_observing: end_of_slew,
                },
            },
        );
    }
    if (candidates.len() as u32) < min_stations {
        return Err(ScanRejected::TooFewStations {
            have: candidates.len() as u32,
            need: min_stations,
        });
    }

    // Step 2: idle-time cap. Align every remaining station to the latest
    // end_of_slew, then add its own preob; drop any station whose induced
    // idle exceeds its max_wait, and repeat until stable.
    loop {
        let aligned = candidates
            .values()
            .map(|c| c.times.end_of_slew)
            .fold(f64::NEG_INFINITY, f64::max);

        let mut to_drop = Vec::new();
        for (&station_id, candidate) in candidates.iter_mut() {
            let station = network.get(station_id).unwrap();
            let idle = aligned - candidate.times.end_of_slew;
            if idle > station.parameters().max_wait {
                to_drop.push(station_id);
                continue;
            }
            candidate.times.end_of_idle = aligned;
            candidate.times.end_of_preob = aligned + station.wait.preob;
        }
        if to_drop.is_empty() {
            break;
        }
        for id in to_drop {
            candidates.remove(&id);
        }
        if (candidates.len() as u32) < min_stations {
            return Err(ScanRejected::TooFewStations {
                have: candidates.len() as u32,
                need: min_stations,
            });
        }
    }

    // Step 3: baseline construction.
    let station_ids: Vec<StationId> = candidates.keys().copied().collect();
    let mut observations = Vec::new();
    let observing_start_estimate = candidates
        .values()
        .map(|c| c.times.end_of_preob)
        .fold(f64::NEG_INFINITY, f64::max);
    for (i, &s1) in station_ids.iter().enumerate() {
        for &s2 in &station_ids[i + 1..] {
            if is_baseline_ignored(source, network, s1, s2) {
                continue;
            }
            observations.push(Observation {
                station1_id: s1,
                station2_id: s2,
                source_id: source.id,
                start_time: observing_start_estimate,
                duration: 0.0,
            });
        }
    }
    drop_stations_with_no_observations(&mut candidates, &observations);
    if (candidates.len() as u32) < min_stations || observations.is_empty() {
        return Err(if observations.is_empty() {
            ScanRejected::NoObservations
        } else {
            ScanRejected::TooFewStations {
                have: candidates.len() as u32,
                need: min_stations,
            }
        });
    }

    // Steps 4-6: per-baseline duration, per-station duration, fixed
    // override.
    let params = source.parameters();
    if let Some(fixed) = params.fixed_scan_duration {
        for obs in &mut observations {
            obs.duration = fixed;
        }
    } else {
        for obs in &mut observations {
            let station1 = network.get(obs.station1_id).unwrap();
            let station2 = network.get(obs.station2_id).unwrap();
            match required_duration(source, station1, station2, &candidates, mode, fallback_flux_jy) {
                Some(d) => obs.duration = d,
                None => obs.duration = f64::INFINITY, // marks the baseline for removal below
            }
        }
        observations.retain(|o| o.duration.is_finite());
        drop_stations_with_no_observations(&mut candidates, &observations);
        if (candidates.len() as u32) < min_stations || observations.is_empty() {
            return Err(if observations.is_empty() {
                ScanRejected::NoObservations
            } else {
                ScanRejected::TooFewStations {
                    have: candidates.len() as u32,
                    need: min_stations,
                }
            });
        }
    }

    // Step 5: per-station duration, bounded by station/source max_scan;
    // drop the most-involved station on overflow (tie-break: highest SEFD
    // max, then latest slew end).
    loop {
        let mut station_duration: BTreeMap<StationId, f64> = BTreeMap::new();
        for obs in &observations {
            let d = obs.duration;
            station_duration
                .entry(obs.station1_id)
                .and_modify(|v| *v = v.max(d))
                .or_insert(d);
            station_duration
                .entry(obs.station2_id)
                .and_modify(|v| *v = v.max(d))
                .or_insert(d);
        }

        let mut overflowing: Vec<StationId> = Vec::new();
        for (&station_id, &duration) in &station_duration {
            let station = network.get(station_id).unwrap();
            let max_scan = station.parameters().max_scan.min(params.max_scan);
            if duration > max_scan {
                overflowing.push(station_id);
            }
        }
        if overflowing.is_empty() {
            for (&station_id, &duration) in &station_duration {
                let station = network.get(station_id).unwrap();
                let min_scan = station.parameters().min_scan.max(params.min_scan);
                let duration = duration.max(min_scan);
                if let Some(c) = candidates.get_mut(&station_id) {
                    c.times.end_of_observing = c.times.end_of_preob + duration;
                }
            }
            break;
        }

        let worst = overflowing
            .into_iter()
            .max_by(|&a, &b| {
                let sefd_a = max_sefd(network.get(a).unwrap());
                let sefd_b = max_sefd(network.get(b).unwrap());
                sefd_a
                    .partial_cmp(&sefd_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        let ea = candidates[&a].times.end_of_slew;
                        let eb = candidates[&b].times.end_of_slew;
                        ea.partial_cmp(&eb).unwrap_or(std::cmp::Ordering::Equal)
                    })
            })
            .unwrap();
        candidates.remove(&worst);
        observations.retain(|o| o.station1_id != worst && o.station2_id != worst);
        drop_stations_with_no_observations(&mut candidates, &observations);
        if (candidates.len() as u32) < min_stations || observations.is_empty() {
            return Err(if observations.is_empty() {
                ScanRejected::NoObservations
            } else {
                ScanRejected::TooFewStations {
                    have: candidates.len() as u32,
                    need: min_stations,
                }
            });
        }
    }

    if !params.required_stations.is_empty() {
        let missing: Vec<StationId> = params
            .required_stations
            .iter()
            .filter(|s| !candidates.contains_key(s))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ScanRejected::MissingRequiredStations(missing));
        }
    }

    let observing_start = candidates
        .values()
        .map(|c| c.times.end_of_preob)
        .fold(f64::NEG_INFINITY, f64::max);
    for obs in &mut observations {
        obs.start_time = observing_start;
    }

    let mut pointings_start = BTreeMap::new();
    let mut pointings_end = BTreeMap::new();
    let mut times = BTreeMap::new();
    for (station_id, candidate) in candidates {
        let mut end_pv = candidate.pv;
        end_pv.time = candidate.times.end_of_observing;
        pointings_start.insert(station_id, candidate.pv);
        pointings_end.insert(station_id, end_pv);
        times.insert(station_id, candidate.times);
    }

    let scan = Scan {
        scan_type,
        constellation,
        source_id: source.id,
        pointings_start,
        pointings_end,
        times,
        observations,
        score: 0.0,
        min_required_stations: min_stations,
    };
    scan.validate_min_stations()?;
    Ok(scan)
}

fn is_baseline_ignored(source: &Source, network: &Network, s1: StationId, s2: StationId) -> bool {
    let params = source.parameters();
    if params.ignore_stations.contains(&s1) || params.ignore_stations.contains(&s2) {
        return true;
    }
    if params.ignore_baselines.contains(&(s1, s2)) || params.ignore_baselines.contains(&(s2, s1)) {
        return true;
    }
    for station_id in [s1, s2] {
        if let Some(station) = network.get(station_id) {
            if station.parameters().ignore_sources.contains(&source.id) {
                return true;
            }
            if station.parameters().ignore_baselines.contains(&(s1, s2))
                || station.parameters().ignore_baselines.contains(&(s2, s1))
            {
                return true;
            }
        }
    }
    false
}

fn drop_stations_with_no_observations(
    candidates: &mut BTreeMap<StationId, Candidate>,
    observations: &[Observation],
) {
    candidates.retain(|&id, _| {
        observations
            .iter()
            .any(|o| o.station1_id == id || o.station2_id == id)
    });
}

fn max_sefd(station: &Station) -> f64 {
    // Equipment is queried per-band by the caller elsewhere; for the
    // tie-break we only need a representative scale, so take whichever
    // zero-elevation SEFD this station reports as its worst case.
    station
        .equipment(&crate::source::BandId::from("X"))
        .map(|e| e.sefd_jy)
        .unwrap_or(0.0)
}

/// spec.md §4.5 step 4: the duration (seconds) required to meet the
/// strictest per-band min-SNR across source/station1/station2/baseline,
/// clamped at the bottom into `[min_scan, max_scan]`. `None` if the
/// required duration exceeds `max_scan` even uncapped (baseline dropped).
fn required_duration(
    source: &Source,
    station1: &Station,
    station2: &Station,
    candidates: &BTreeMap<StationId, Candidate>,
    mode: &dyn ObservingMode,
    fallback_flux_jy: f64,
) -> Option<f64> {
    let params = source.parameters();
    let min_scan = station1
        .parameters()
        .min_scan
        .max(station2.parameters().min_scan)
        .max(params.min_scan);
    let max_scan = station1
        .parameters()
        .max_scan
        .min(station2.parameters().max_scan)
        .min(params.max_scan);

    let midob = station1.wait.midob.max(station2.wait.midob);
    let pv1 = candidates.get(&station1.id)?.pv;
    let pv2 = candidates.get(&station2.id)?.pv;
    let baseline_len = projected_baseline_length(station1, station2, source.unit_vector());

    let mut worst_duration: f64 = 0.0;
    for band in mode.bands() {
        let wavelength = mode.wavelength(&band);
        if wavelength <= 0.0 {
            continue;
        }
        let freq_hz = SPEED_OF_LIGHT_M_PER_S / wavelength;
        let baseline_wavelengths = baseline_len / wavelength;
        let flux = source
            .observed_flux(&band, freq_hz, baseline_wavelengths, fallback_flux_jy)
            .unwrap_or(fallback_flux_jy);

        let sefd1 = station1
            .equipment(&band)
            .map(|e| e.sefd_at(pv1.el))
            .unwrap_or(fallback_flux_jy.max(1.0) * 1000.0);
        let sefd2 = station2
            .equipment(&band)
            .map(|e| e.sefd_at(pv2.el))
            .unwrap_or(fallback_flux_jy.max(1.0) * 1000.0);

        let min_snr = [
            params.min_snr.get(&band).copied(),
            station1.parameters().min_snr.get(&band).copied(),
            station2.parameters().min_snr.get(&band).copied(),
            Some(mode.min_snr(&band)),
        ]
        .into_iter()
        .flatten()
        .fold(0.0_f64, f64::max);
        if min_snr <= 0.0 {
            continue;
        }

        let efficiency = mode.efficiency(station1.id, station2.id);
        let rec_rate = mode.recording_rate(station1.id, station2.id, &band);
        if efficiency <= 0.0 || rec_rate <= 0.0 || flux <= 0.0 {
            continue;
        }
        let sensitivity = efficiency * flux / (sefd1 * sefd2).sqrt();
        if sensitivity <= 0.0 {
            continue;
        }
        let duration = (min_snr / sensitivity).powi(2) / rec_rate + midob;
        worst_duration = worst_duration.max(duration);
    }

    let clamped = worst_duration.max(min_scan);
    if clamped > max_scan {
        None
    } else {
        Some(clamped)
    }
}

fn projected_baseline_length(station1: &Station, station2: &Station, source_unit: [f64; 3]) -> f64 {
    let d = [
        station1.position[0] - station2.position[0],
        station1.position[1] - station2.position[1],
        station1.position[2] - station2.position[2],
    ];
    let dot = d[0] * source_unit[0] + d[1] * source_unit[1] + d[2] * source_unit[2];
    let proj = [
        d[0] - dot * source_unit[0],
        d[1] - dot * source_unit[1],
        d[2] - dot * source_unit[2],
    ];
    (proj[0] * proj[0] + proj[1] * proj[1] + proj[2] * proj[2]).sqrt()
}
