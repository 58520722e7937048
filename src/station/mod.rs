// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-antenna state machine: current pointing, wait-time budget,
//! parameter-event timeline, statistics (spec.md §3/§4.2, "Station").

use std::collections::{HashMap, HashSet};

use crate::antenna::{visibility, AntennaKinematics, CableWrap, HorizonMask};
use crate::astro::AstroProvider;
use crate::coord::PointingVector;
use crate::ids::{GroupId, SourceId, StationId};
use crate::source::{BandId, Event, EventCrossing, Source};
use crate::time::TimeSystem;

/// Receiver equipment for one band: system equivalent flux density, Jy,
/// with an optional elevation-dependent correction polynomial evaluated in
/// degrees above the horizon (spec.md §3).
#[derive(Clone, Debug, PartialEq)]
pub struct Equipment {
    pub sefd_jy: f64,
    pub elevation_poly: Option<Vec<f64>>,
}

impl Equipment {
    /// SEFD at a given elevation, radians.
    pub fn sefd_at(&self, elevation_rad: f64) -> f64 {
        match &self.elevation_poly {
            None => self.sefd_jy,
            Some(coeffs) => {
                let el_deg = elevation_rad.to_degrees();
                let correction = coeffs
                    .iter()
                    .enumerate()
                    .fold(0.0, |acc, (i, c)| acc + c * el_deg.powi(i as i32));
                self.sefd_jy * correction.max(1e-6)
            }
        }
    }
}

/// Wait-time budget, seconds (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaitTimes {
    pub field_system: f64,
    pub preob: f64,
    pub midob: f64,
    pub postob: f64,
}

/// Station-side configurable parameters (spec.md §3, "Parameters").
#[derive(Clone, Debug, PartialEq)]
pub struct StationParameters {
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
    pub ignore_sources: HashSet<SourceId>,
    pub ignore_stations: HashSet<StationId>,
    pub ignore_baselines: HashSet<(StationId, StationId)>,
    pub max_number_of_scans: Option<u32>,
}

impl Default for StationParameters {
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
            ignore_sources: HashSet::new(),
            ignore_stations: HashSet::new(),
            ignore_baselines: HashSet::new(),
            max_number_of_scans: None,
        }
    }
}

/// The station's current commitment (spec.md §3, "CurrentPointing").
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurrentPointing {
    pub az: f64,
    pub el: f64,
    pub time: f64,
}

/// Incremental per-station statistics (spec.md §4.2).
#[derive(Clone, Debug, PartialEq)]
pub struct StationStatistics {
    pub observing_seconds: f64,
    pub slew_seconds: f64,
    pub idle_seconds: f64,
    pub field_system_seconds: f64,
    pub preob_seconds: f64,
    /// One bucket per quarter-hour of a 24-hour day.
    pub scan_start_histogram: [u32; 96],
    pub number_of_scans: u32,
    pub number_of_observations: u32,
}

impl Default for StationStatistics {
    fn default() -> Self {
        Self {
            observing_seconds: 0.0,
            slew_seconds: 0.0,
            idle_seconds: 0.0,
            field_system_seconds: 0.0,
            preob_seconds: 0.0,
            scan_start_histogram: [0; 96],
            number_of_scans: 0,
            number_of_observations: 0,
        }
    }
}

/// A VLBI antenna (spec.md §3, "Station").
#[derive(Clone, Debug)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    /// Geocentric position, metres.
    pub position: [f64; 3],
    pub kinematics: AntennaKinematics,
    pub wrap: CableWrap,
    pub mask: HorizonMask,
    equipment: HashMap<BandId, Equipment>,
    pub wait: WaitTimes,
    timeline: Vec<Event<StationParameters>>,
    next_event: usize,
    active_parameters: StationParameters,
    pub current_pointing: CurrentPointing,
    pub first_scan: bool,
    pub stats: StationStatistics,
    pub collocation_group: Option<GroupId>,
}

impl Station {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: StationId,
        name: impl Into<String>,
        position: [f64; 3],
        kinematics: AntennaKinematics,
        wrap: CableWrap,
        mask: HorizonMask,
        wait: WaitTimes,
        initial_parameters: StationParameters,
        mut timeline: Vec<Event<StationParameters>>,
    ) -> Self {
        timeline.sort_by(|a, b| a.apply_at_time.partial_cmp(&b.apply_at_time).unwrap());
        Self {
            id,
            name: name.into(),
            position,
            kinematics,
            wrap,
            mask,
            equipment: HashMap::new(),
            wait,
            timeline,
            next_event: 0,
            active_parameters: initial_parameters,
            current_pointing: CurrentPointing {
                az: 0.0,
                el: 0.0,
                time: 0.0,
            },
            first_scan: true,
            stats: StationStatistics::default(),
            collocation_group: None,
        }
    }

    pub fn set_equipment(&mut self, band: BandId, equipment: Equipment) {
        self.equipment.insert(band, equipment);
    }

    pub fn equipment(&self, band: &BandId) -> Option<&Equipment> {
        self.equipment.get(band)
    }

    pub fn parameters(&self) -> &StationParameters {
        &self.active_parameters
    }

    /// `check_for_new_event`: identical contract to
    /// [`crate::source::Source::advance_events`].
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

    /// Geodetic (latitude, longitude, height) from the geocentric position,
    /// under a spherical-Earth approximation — adequate for the pointing
    /// geometry a scheduler needs (sub-arcsecond ellipsoidal corrections are
    /// the `AstroProvider`'s business, not the mount's).
    pub fn geodetic(&self) -> (f64, f64, f64) {
        let [x, y, z] = self.position;
        let r = (x * x + y * y + z * z).sqrt();
        let lon = y.atan2(x);
        let lat = (z / r).asin();
        (lat, lon, r)
    }

    /// `calc_az_el`, simple model: ignores nutation/aberration, uses the
    /// station's geodetic longitude and the session's GMST to rotate the
    /// source's precomputed unit vector into the local horizon frame.
    pub fn calc_az_el_simple(
        &self,
        source: &Source,
        time_system: &TimeSystem,
        t: f64,
    ) -> PointingVector {
        let gmst = time_system.gmst_rad(t);
        self.horizon_from_radec(source.id, source.radec, gmst, t)
    }

    /// `calc_az_el`, rigorous model: applies earth-velocity aberration and
    /// nutation (sampled from `astro`) before the horizon-frame rotation.
    pub fn calc_az_el_rigorous(
        &self,
        source: &Source,
        time_system: &TimeSystem,
        t: f64,
        astro: &dyn AstroProvider,
    ) -> PointingVector {
        let (dpsi, deps, _s) = astro.nutation(t);
        let mut radec = source.radec;
        radec.ra += dpsi;
        radec.dec += deps;

        // First-order annual aberration: shift the apparent direction by
        // v/c along Earth's velocity vector, projected onto the local
        // tangent plane of the source direction.
        const C: f64 = 299_792_458.0;
        let v = astro.earth_velocity(t);
        let u = source.unit_vector();
        let v_dot_u = v[0] * u[0] + v[1] * u[1] + v[2] * u[2];
        let aberrated = [
            u[0] + (v[0] - v_dot_u * u[0]) / C,
            u[1] + (v[1] - v_dot_u * u[1]) / C,
            u[2] + (v[2] - v_dot_u * u[2]) / C,
        ];
        let norm = (aberrated[0].powi(2) + aberrated[1].powi(2) + aberrated[2].powi(2)).sqrt();
        let dec = (aberrated[2] / norm).asin();
        let ra = aberrated[1].atan2(aberrated[0]);
        radec.ra = ra;
        radec.dec = dec;

        let mjd = 40_587.0 + time_system.to_calendar(t).as_gpst_seconds() / 86_400.0;
        let gmst = astro.gmst(mjd);
        self.horizon_from_radec(source.id, radec, gmst, t)
    }

    fn horizon_from_radec(
        &self,
        source_id: SourceId,
        radec: crate::coord::RADec,
        gmst: f64,
        t: f64,
    ) -> PointingVector {
        let (lat, lon, _height) = self.geodetic();
        let ha = gmst + lon - radec.ra;
        let (s_ha, c_ha) = ha.sin_cos();
        let (s_dec, c_dec) = radec.dec.sin_cos();
        let (s_lat, c_lat) = lat.sin_cos();

        let sin_el = s_lat * s_dec + c_lat * c_dec * c_ha;
        let el = sin_el.clamp(-1.0, 1.0).asin();
        let az = (-c_dec * s_ha).atan2(s_dec * c_lat - c_dec * s_lat * c_ha);
        let az = az.rem_euclid(crate::constants::TAU);

        let mut pv = PointingVector::new(self.id, source_id, az, el, t);
        pv.ha = Some(ha);
        pv.dec = Some(radec.dec);
        pv
    }

    /// `visibility` against this station's mask/wrap and its own minimum
    /// elevation, combined with the source's.
    pub fn is_visible(&self, pv: &PointingVector, source_min_el: f64) -> bool {
        visibility(
            pv,
            &self.wrap,
            &self.mask,
            self.active_parameters.min_elevation,
            source_min_el,
        )
    }

    /// `slew_time`: `None` when infeasible (no legal wrap ambiguity).
    pub fn slew_time(&self, to_raw_az: f64, to: &PointingVector) -> Option<f64> {
        if self.first_scan {
            return Some(0.0);
        }
        let current = PointingVector::new(
            self.id,
            to.source_id,
            self.current_pointing.az,
            self.current_pointing.el,
            self.current_pointing.time,
        );
        let (unwrapped_az, _sector) = self.wrap.calc_unwrapped_az(&current, to_raw_az)?;
        let mut target = *to;
        target.az = unwrapped_az;
        Some(self.kinematics.slew_seconds(&current, &target, false))
    }

    /// Commit this station to a new pointing (spec.md §4.7 step 5).
    pub fn commit(&mut self, pv: &PointingVector, slew: f64, idle: f64, observing: f64) {
        self.current_pointing = CurrentPointing {
            az: pv.az,
            el: pv.el,
            time: pv.time + observing,
        };
        self.first_scan = false;
        self.stats.slew_seconds += slew;
        self.stats.idle_seconds += idle;
        self.stats.field_system_seconds += self.wait.field_system;
        self.stats.preob_seconds += self.wait.preob;
        self.stats.observing_seconds += observing;
        self.stats.number_of_scans += 1;
        let quarter_hour = ((pv.time / 900.0) as usize) % 96;
        self.stats.scan_start_histogram[quarter_hour] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antenna::{AntennaAxisType, AxisRate};
    use crate::source::SourceParameters;
    use approx::assert_abs_diff_eq;

    fn station() -> Station {
        Station::new(
            StationId(0),
            "TESTA",
            [6_371_000.0, 0.0, 0.0],
            AntennaKinematics {
                axis_type: AntennaAxisType::AzEl,
                axis1: AxisRate { rate: 0.02, constant_overhead: 0.0, settle_time: 1.0 },
                axis2: AxisRate { rate: 0.02, constant_overhead: 0.0, settle_time: 1.0 },
                slew_overhead: 2.0,
            },
            CableWrap::unconstrained(),
            HorizonMask::flat(0.0),
            WaitTimes { field_system: 5.0, preob: 10.0, midob: 1.0, postob: 1.0 },
            StationParameters::default(),
            Vec::new(),
        )
    }

    #[test]
    fn first_scan_slew_is_zero() {
        let s = station();
        assert!(s.first_scan);
        let pv = PointingVector::new(s.id, SourceId(0), 1.0, 0.5, 0.0);
        assert_eq!(s.slew_time(1.0, &pv), Some(0.0));
    }

    #[test]
    fn elevation_is_bounded() {
        let s = station();
        let source = Source::new(
            SourceId(0),
            "test",
            crate::coord::RADec::new(0.5, 0.3),
            SourceParameters::default(),
            Vec::new(),
        );
        let start = hifitime::Epoch::from_gpst_seconds(1_000_000_000.0);
        use hifitime::TimeUnits;
        let ts = TimeSystem::new(start, start + 3600.0.seconds()).unwrap();
        let pv = s.calc_az_el_simple(&source, &ts, 0.0);
        assert!(pv.el >= -crate::constants::FRAC_PI_2 - 1e-9);
        assert!(pv.el <= crate::constants::FRAC_PI_2 + 1e-9);
        assert!((0.0..crate::constants::TAU).contains(&pv.az));
    }

    #[test]
    fn equipment_elevation_polynomial_scales_sefd() {
        let eq = Equipment {
            sefd_jy: 1000.0,
            elevation_poly: Some(vec![2.0, -0.01]),
        };
        let at_30 = eq.sefd_at(30.0f64.to_radians());
        assert_abs_diff_eq!(at_30, 1000.0 * (2.0 - 0.01 * 30.0), epsilon = 1e-6);
    }

    #[test]
    fn commit_updates_statistics_and_pointing() {
        let mut s = station();
        let pv = PointingVector::new(s.id, SourceId(0), 1.0, 0.5, 100.0);
        s.commit(&pv, 20.0, 5.0, 60.0);
        assert!(!s.first_scan);
        assert_eq!(s.current_pointing.time, 160.0);
        assert_abs_diff_eq!(s.stats.slew_seconds, 20.0);
        assert_abs_diff_eq!(s.stats.observing_seconds, 60.0);
        assert_eq!(s.stats.number_of_scans, 1);
    }
}
