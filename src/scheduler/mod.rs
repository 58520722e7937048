// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The outer decision-point loop (spec.md §4.7): advance the event clock,
//! assemble a [`crate::subcon::Subcon`], commit its winner, and repeat
//! until the session window is exhausted.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use log::{debug, info, warn};
use thiserror::Error;

use crate::astro::AstroProvider;
use crate::config::Config;
use crate::coord::PointingVector;
use crate::ids::{GroupId, SourceId, StationId};
use crate::network::{Network, ObservingMode, SourceList};
use crate::scan::{Scan, ScanType};
use crate::skycoverage::SkyCoverageGroups;
use crate::subcon::{Subcon, SubconConfig, Winner};
use crate::time::TimeSystem;

/// A fatal problem setting up a [`Scheduler`] (spec.md §7, raised once at
/// construction, never from inside the selection loop).
#[derive(Error, Debug)]
pub enum SchedulerSetupError {
    #[error("network has no stations")]
    EmptyNetwork,

    #[error("source list is empty")]
    EmptySourceList,

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Minimum step, seconds, the event clock advances by when a decision
/// point yields no candidate at all (spec.md §4.7 step 7, "advance to the
/// next event/epoch").
const EMPTY_SUBCON_STEP_SECONDS: f64 = 60.0;

/// How far ahead of the current decision point a configured
/// [`crate::config::HighImpactWindow`] is allowed to "open" and still
/// trigger the step-4 preemption (spec.md §4.7 step 4, "next decision
/// horizon").
const HIGH_IMPACT_DECISION_HORIZON_SECONDS: f64 = 60.0;

/// The complete session state: network, source catalog, configuration and
/// astronomical/observing-mode collaborators (spec.md §3 "Ownership").
pub struct Scheduler {
    network: Network,
    sources: SourceList,
    config: Config,
    time_system: TimeSystem,
    astro: Box<dyn AstroProvider>,
    mode: Box<dyn ObservingMode>,
    sky_coverage: SkyCoverageGroups,
    pair_index: Vec<(SourceId, SourceId)>,
    previous_scan_end: BTreeMap<StationId, f64>,
    t: f64,
    committed_index: u32,
    committed: Vec<Scan>,
    high_impact_fired: HashSet<SourceId>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("t", &self.t)
            .field("committed_index", &self.committed_index)
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        network: Network,
        sources: SourceList,
        config: Config,
        time_system: TimeSystem,
        astro: Box<dyn AstroProvider>,
        mode: Box<dyn ObservingMode>,
    ) -> Result<Self, SchedulerSetupError> {
        config.validate()?;
        if network.is_empty() {
            return Err(SchedulerSetupError::EmptyNetwork);
        }
        if sources.is_empty() {
            return Err(SchedulerSetupError::EmptySourceList);
        }

        let pair_index = build_pair_index(&sources, &config);
        let previous_scan_end = network.station_ids().map(|id| (id, 0.0)).collect();

        Ok(Self {
            network,
            sources,
            config,
            time_system,
            astro,
            mode,
            sky_coverage: SkyCoverageGroups::new(),
            pair_index,
            previous_scan_end,
            t: 0.0,
            committed_index: 0,
            committed: Vec::new(),
            high_impact_fired: HashSet::new(),
        })
    }

    /// spec.md §4.7: run every decision point until the session window is
    /// exhausted, then apply the optional a-posteriori fillin pass.
    pub fn run(&mut self) -> Vec<Scan> {
        let duration = self.time_system.duration_seconds();
        while self.t < duration {
            self.advance_events();

            if let Some(scan) = self.high_impact_override() {
                self.commit(Winner::Single(scan));
                continue;
            }

            let eligible = self.eligible_sources();
            if eligible.is_empty() {
                self.t += EMPTY_SUBCON_STEP_SECONDS;
                continue;
            }

            let candidate_pointings = self.candidate_pointings(&eligible);
            if candidate_pointings.is_empty() {
                self.t += EMPTY_SUBCON_STEP_SECONDS;
                continue;
            }

            let pair_index_tick: Vec<(SourceId, SourceId)> = self
                .pair_index
                .iter()
                .copied()
                .filter(|(a, b)| candidate_pointings.contains_key(a) && candidate_pointings.contains_key(b))
                .collect();

            let subcon_config = SubconConfig {
                min_stations: self.config.min_number_of_stations_per_subcon,
                fallback_flux_jy: crate::constants::DEFAULT_FALLBACK_FLUX_JY,
                subnetting: self.config.subnetting,
                subnetting_time_tolerance: self.config.subnetting_time_tolerance_sec,
            };

            let (singles, pairs) = Subcon::build(
                &candidate_pointings,
                &self.sources,
                &self.network,
                self.mode.as_ref(),
                &self.previous_scan_end,
                &pair_index_tick,
                &subcon_config,
            );
            if singles.is_empty() && pairs.is_empty() {
                debug!("empty subcon at t={:.1}s", self.t);
                self.t += EMPTY_SUBCON_STEP_SECONDS;
                continue;
            }

            let subcon = Subcon::precalc_score(
                singles,
                pairs,
                &self.sources,
                &self.network,
                &mut self.sky_coverage,
                &self.config.weights,
                self.config.max_influence_time_sec,
                self.config.max_influence_distance_rad,
                self.config.seed,
            );

            let winner = subcon.select_winner(
                &self.network,
                &self.sources,
                self.mode.as_ref(),
                &self.time_system,
                self.astro.as_ref(),
                &self.previous_scan_end,
                self.config.subnetting_time_tolerance_sec,
                crate::constants::DEFAULT_FALLBACK_FLUX_JY,
                &self.config.weights,
                &mut self.sky_coverage,
            );

            match winner {
                Some(w) => self.commit(w),
                None => {
                    warn!("rigorous escalation eliminated every candidate at t={:.1}s", self.t);
                    self.t += EMPTY_SUBCON_STEP_SECONDS;
                }
            }
        }

        if self.config.fillin_a_posteriori {
            self.fillin_a_posteriori_pass();
        }

        info!("scheduled {} scans", self.committed.len());
        std::mem::take(&mut self.committed)
    }

    fn advance_events(&mut self) {
        for station in self.network.iter_mut() {
            station.advance_events(self.t);
        }
        for source in self.sources.iter_mut() {
            source.advance_events(self.t);
        }
    }

    /// spec.md §4.7 step 2/3: sources available, cadence-satisfied, strong
    /// enough, clear of the Sun, not yet at their scan cap, and — if a
    /// [`crate::config::ScanSequence`] cadence applies at this tick —
    /// restricted to its target list.
    fn eligible_sources(&self) -> Vec<SourceId> {
        let restriction = self
            .config
            .scan_sequence
            .as_ref()
            .and_then(|seq| seq.targets_for(self.committed_index));

        let mut out: Vec<SourceId> = self
            .sources
            .iter()
            .filter(|s| {
                let p = s.parameters();
                p.available
                    && s.cadence_satisfied(self.t)
                    && s.is_strong_enough().0
                    && s.sun_distance(self.t, self.astro.as_ref()) >= p.min_sun_distance
                    && p.max_number_of_scans.map_or(true, |max| s.stats.number_of_scans < max)
            })
            .map(|s| s.id)
            .collect();

        if let Some(targets) = restriction {
            let allowed: std::collections::HashSet<SourceId> = targets.iter().copied().collect();
            let restricted: Vec<SourceId> = out.iter().copied().filter(|id| allowed.contains(id)).collect();
            if restricted.is_empty() {
                debug!(
                    "scan-sequence target(s) {targets:?} not eligible at t={:.1}s; skipping the cadence restriction for this tick",
                    self.t
                );
            } else {
                out = restricted;
            }
        }
        out
    }

    /// spec.md §4.7 step 4: az/el + visibility filter for every eligible
    /// source against every available station, using the cheap pointing
    /// model (the rigorous model is reserved for winner escalation).
    fn candidate_pointings(
        &self,
        eligible: &[SourceId],
    ) -> BTreeMap<SourceId, BTreeMap<StationId, PointingVector>> {
        let mut out = BTreeMap::new();
        for &source_id in eligible {
            let Some(source) = self.sources.get(source_id) else { continue };
            let mut per_station = BTreeMap::new();
            for station in self.network.iter() {
                if !station.parameters().available {
                    continue;
                }
                let pv = station.calc_az_el_simple(source, &self.time_system, self.t);
                if station.is_visible(&pv, source.parameters().min_elevation) {
                    per_station.insert(station.id, pv);
                }
            }
            if !per_station.is_empty() {
                out.insert(source_id, per_station);
            }
        }
        out
    }

    /// spec.md §4.7 step 4, "High-impact override": if a configured
    /// [`crate::config::HighImpactWindow`] opens within the next decision
    /// horizon, build a dedicated `HighImpact` scan for it, preempting
    /// whatever the regular selection competition would otherwise pick
    /// this tick. Each window fires at most once.
    fn high_impact_override(&mut self) -> Option<Scan> {
        let horizon = self.t + HIGH_IMPACT_DECISION_HORIZON_SECONDS;
        let window = self
            .config
            .high_impact_windows
            .iter()
            .find(|w| {
                !self.high_impact_fired.contains(&w.source_id) && w.start_time < horizon && w.end_time > self.t
            })
            .copied()?;

        let source = self.sources.get(window.source_id)?;
        let mut raw_pointings = BTreeMap::new();
        for station in self.network.iter() {
            if !station.parameters().available {
                continue;
            }
            let pv = station.calc_az_el_simple(source, &self.time_system, self.t);
            if station.is_visible(&pv, source.parameters().min_elevation) {
                raw_pointings.insert(station.id, pv);
            }
        }
        if (raw_pointings.len() as u32) < self.config.min_number_of_stations_per_subcon {
            return None;
        }

        let scan = crate::scan::construct_candidate(
            source,
            raw_pointings,
            &self.previous_scan_end,
            &self.network,
            self.mode.as_ref(),
            crate::constants::DEFAULT_FALLBACK_FLUX_JY,
            self.config.min_number_of_stations_per_subcon,
            ScanType::HighImpact,
            crate::scan::Constellation::Single,
        )
        .ok()?;
        self.high_impact_fired.insert(window.source_id);
        Some(scan)
    }

    fn commit(&mut self, winner: Winner) {
        match winner {
            Winner::Single(scan) => self.commit_one(scan),
            Winner::Pair(a, b) => {
                self.commit_one(a);
                self.commit_one(b);
            }
        }
        self.committed_index += 1;
    }

    /// spec.md §4.7 step 5: update every participating station and the
    /// source's statistics, record the sky-coverage pointing, and advance
    /// the event clock to the scan's end.
    fn commit_one(&mut self, scan: Scan) {
        let radec = self.sources.get(scan.source_id).map(|s| s.radec);

        for (&station_id, pv_end) in &scan.pointings_end {
            let Some(times) = scan.times.get(&station_id) else { continue };
            if let Some(station) = self.network.get_mut(station_id) {
                station.commit(pv_end, times.slew_seconds(), times.idle_seconds(), times.observing_seconds());
                let group = station
                    .collocation_group
                    .unwrap_or_else(|| GroupId::from(station_id.index()));
                self.sky_coverage.ensure_group(
                    group,
                    self.config.max_influence_time_sec,
                    self.config.max_influence_distance_rad,
                );
                if let (Some(sc), Some(radec)) = (self.sky_coverage.get_mut(group), radec) {
                    sc.commit(radec, times.end_of_observing);
                }
            }
            self.previous_scan_end.insert(station_id, times.end_of_observing);
        }

        for obs in &scan.observations {
            if let Some(s) = self.network.get_mut(obs.station1_id) {
                s.stats.number_of_observations += 1;
            }
            if let Some(s) = self.network.get_mut(obs.station2_id) {
                s.stats.number_of_observations += 1;
            }
        }

        if let Some(source) = self.sources.get_mut(scan.source_id) {
            source.record_scan(scan.observing_start(), scan.observations.len() as u32);
        }

        // spec.md §4.7: "current time" is the minimum over stations of
        // end_of_previous_observing, not the max over this scan's own
        // stations — otherwise a station this scan excluded, whose
        // previous_scan_end is untouched above, is never revisited at its
        // true earliest-available time.
        self.t = self
            .previous_scan_end
            .values()
            .copied()
            .fold(f64::INFINITY, f64::min);
        self.committed.push(scan);
    }

    /// spec.md §4.7, "a-posteriori fillin": after the main schedule is
    /// built, try to occupy stations idle during a `Standard` scan with a
    /// second, independently-scored, `Fillin` scan of their own. Unlike
    /// the main loop, a fillin candidate doesn't compete through a full
    /// `Subcon`; the first eligible source that produces a valid candidate
    /// is taken, since it never displaces the primary observation it rides
    /// alongside.
    ///
    /// Because this pass runs after the whole timeline is committed, every
    /// idle station's actual next commitment is already known; each
    /// candidate is checked against it the way the original's
    /// `FillinmodeEndposition` does (`original_source/VLBI_Scheduler/FillinmodeEndposition.h`):
    /// a station due back in a later scan must be able to slew from the
    /// fillin's end pointing to that scan's start pointing before it
    /// begins, and a station with no further commitment has no such
    /// constraint.
    fn fillin_a_posteriori_pass(&mut self) {
        let primaries = std::mem::take(&mut self.committed);
        let mut fillins: Vec<Option<Scan>> = vec![None; primaries.len()];
        for (i, primary) in primaries.iter().enumerate() {
            if primary.scan_type != ScanType::Standard {
                continue;
            }
            let idle_stations: Vec<StationId> = self
                .network
                .station_ids()
                .filter(|id| !primary.pointings_start.contains_key(id))
                .filter(|id| {
                    self.network
                        .get(*id)
                        .is_some_and(|s| s.parameters().available_for_fillin)
                })
                .collect();

            if idle_stations.len() as u32 >= self.config.min_number_of_stations_per_subcon {
                let required_next: BTreeMap<StationId, Option<(PointingVector, f64)>> = idle_stations
                    .iter()
                    .map(|&id| (id, Self::next_required_position(&primaries, i, id)))
                    .collect();
                if let Some(fillin) =
                    self.try_build_fillin(&idle_stations, primary.observing_start(), &required_next)
                {
                    self.commit_fillin_observations(&fillin);
                    fillins[i] = Some(fillin);
                }
            }
        }

        let mut out = Vec::with_capacity(primaries.len() * 2);
        for (primary, fillin) in primaries.into_iter().zip(fillins) {
            if let Some(fillin) = fillin {
                out.push(fillin);
            }
            out.push(primary);
        }
        self.committed = out;
    }

    /// A station's required pointing and deadline at its next appearance
    /// after `primaries[after_index]`, or `None` if it never appears again
    /// (`FillinmodeEndposition::stationUnused_`'s "no predetermined desired
    /// position" case).
    fn next_required_position(
        primaries: &[Scan],
        after_index: usize,
        station_id: StationId,
    ) -> Option<(PointingVector, f64)> {
        primaries[after_index + 1..].iter().find_map(|scan| {
            scan.pointings_start
                .get(&station_id)
                .map(|pv| (*pv, scan.observing_start()))
        })
    }

    fn try_build_fillin(
        &self,
        stations: &[StationId],
        t: f64,
        required_next: &BTreeMap<StationId, Option<(PointingVector, f64)>>,
    ) -> Option<Scan> {
        for source in self.sources.iter() {
            let p = source.parameters();
            if !p.available || !p.available_for_fillin || !source.cadence_satisfied(t) || !source.is_strong_enough().0 {
                continue;
            }
            let mut raw_pointings = BTreeMap::new();
            for &station_id in stations {
                let Some(station) = self.network.get(station_id) else { continue };
                let pv = station.calc_az_el_simple(source, &self.time_system, t);
                if station.is_visible(&pv, p.min_elevation) {
                    raw_pointings.insert(station_id, pv);
                }
            }
            if (raw_pointings.len() as u32) < self.config.min_number_of_stations_per_subcon {
                continue;
            }
            if let Ok(scan) = crate::scan::construct_candidate(
                source,
                raw_pointings,
                &self.previous_scan_end,
                &self.network,
                self.mode.as_ref(),
                crate::constants::DEFAULT_FALLBACK_FLUX_JY,
                self.config.min_number_of_stations_per_subcon,
                ScanType::Fillin,
                crate::scan::Constellation::Single,
            ) {
                if self.fillin_honors_endpoint_invariant(&scan, required_next) {
                    return Some(scan);
                }
                debug!(
                    "fillin candidate for source {} at t={t:.1}s dropped: a participating station \
                     could not return to its next required pointing on time",
                    source.id
                );
            }
        }
        None
    }

    /// spec.md §4.7 step 6, "must return to required end-pointing on time":
    /// every station in `scan` that has a further commitment must be able
    /// to slew from `scan`'s end pointing to that commitment's start
    /// pointing before the commitment's observing start.
    fn fillin_honors_endpoint_invariant(
        &self,
        scan: &Scan,
        required_next: &BTreeMap<StationId, Option<(PointingVector, f64)>>,
    ) -> bool {
        for station_id in scan.stations() {
            let Some(Some((required_pv, required_start))) = required_next.get(&station_id) else {
                continue;
            };
            let Some(station) = self.network.get(station_id) else { continue };
            let Some(pv_end) = scan.pointings_end.get(&station_id) else { continue };
            let slew = station.kinematics.slew_seconds(pv_end, required_pv, false);
            if pv_end.time + slew > *required_start {
                return false;
            }
        }
        true
    }

    /// Fillin scans record station/source statistics the same way a
    /// primary scan does, but never advance the event clock — they ride
    /// inside time the primary scan already claimed.
    fn commit_fillin_observations(&mut self, scan: &Scan) {
        for (&station_id, pv_end) in &scan.pointings_end {
            let Some(times) = scan.times.get(&station_id) else { continue };
            if let Some(station) = self.network.get_mut(station_id) {
                station.commit(pv_end, times.slew_seconds(), times.idle_seconds(), times.observing_seconds());
            }
        }
        for obs in &scan.observations {
            if let Some(s) = self.network.get_mut(obs.station1_id) {
                s.stats.number_of_observations += 1;
            }
            if let Some(s) = self.network.get_mut(obs.station2_id) {
                s.stats.number_of_observations += 1;
            }
        }
        if let Some(source) = self.sources.get_mut(scan.source_id) {
            source.record_scan(scan.observing_start(), scan.observations.len() as u32);
        }
    }

    /// spec.md §4.7, "tagalong": a designated station observes whatever
    /// the network already committed to, without ever entering the
    /// selection competition itself. Applied after the main schedule (and
    /// any a-posteriori fillin) is final.
    pub fn apply_tagalong(&mut self, stations: &[StationId]) {
        for scan in &mut self.committed {
            let Some(source) = self.sources.get(scan.source_id) else { continue };
            for &station_id in stations {
                if scan.pointings_start.contains_key(&station_id) {
                    continue;
                }
                let Some(station) = self.network.get(station_id) else { continue };
                if !station.parameters().available {
                    continue;
                }
                let start = scan.observing_start();
                let pv = station.calc_az_el_simple(source, &self.time_system, start);
                if !station.is_visible(&pv, source.parameters().min_elevation) {
                    continue;
                }
                let others: Vec<StationId> = scan.stations().collect();
                for other in others {
                    scan.observations.push(crate::scan::Observation {
                        station1_id: station_id,
                        station2_id: other,
                        source_id: scan.source_id,
                        start_time: start,
                        duration: scan.station_duration(other).unwrap_or(station.parameters().min_scan),
                    });
                }
                scan.pointings_start.insert(station_id, pv);
                let mut pv_end = pv;
                pv_end.time = scan.max_end_time();
                scan.pointings_end.insert(station_id, pv_end);
            }
        }
    }
}

/// spec.md §4.6 ADDED: the subnetting pair index, built once at session
/// start from every pair of sources whose angular separation falls inside
/// the configured subnetting window.
fn build_pair_index(sources: &SourceList, config: &Config) -> Vec<(SourceId, SourceId)> {
    let min = config.subnetting_min_angle_deg.to_radians();
    let max = config.subnetting_max_angle_deg.to_radians();
    let ids: Vec<SourceId> = sources.iter().map(|s| s.id).collect();
    let mut out = Vec::new();
    for (i, &a) in ids.iter().enumerate() {
        for &b in &ids[i + 1..] {
            let (sa, sb) = (sources.get(a).unwrap(), sources.get(b).unwrap());
            let sep = sa.radec.separation(&sb.radec);
            if sep >= min && sep <= max {
                out.push((a, b));
            }
        }
    }
    out
}
