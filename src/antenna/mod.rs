// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pointing kinematics: slew timing, cable-wrap unwrap rules, and horizon
//! visibility (spec.md §4.1).

use strum_macros::{EnumCount, EnumIter};

use crate::constants::TAU;
use crate::coord::PointingVector;

/// The antenna's two-axis mount type (Design Notes §9: closed set, tagged
/// variant, no dynamic dispatch).
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter)]
pub enum AntennaAxisType {
    AzEl,
    HaDec,
    XyEw,
    Equatorial,
}

/// Per-axis rate and settle overhead.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisRate {
    /// Slew rate, radians/second.
    pub rate: f64,
    /// Fixed angular overhead eaten by acceleration/deceleration before the
    /// rate applies, radians.
    pub constant_overhead: f64,
    /// Fixed settle time after reaching the target, seconds.
    pub settle_time: f64,
}

impl AxisRate {
    /// Time to traverse `delta` radians on this axis.
    pub fn travel_time(&self, delta: f64) -> f64 {
        (delta.abs() - self.constant_overhead).max(0.0) / self.rate + self.settle_time
    }
}

/// Antenna mount kinematics: axis type plus the two axes' rate models and a
/// fixed per-slew overhead applied regardless of which axes moved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AntennaKinematics {
    pub axis_type: AntennaAxisType,
    pub axis1: AxisRate,
    pub axis2: AxisRate,
    pub slew_overhead: f64,
}

impl AntennaKinematics {
    /// `slew_time` per spec.md §4.1: per-axis travel time is the max of the
    /// two axes, plus a fixed per-slew overhead. `first_scan` short-circuits
    /// to zero (spec.md §3, Station invariant).
    fn axis_deltas(&self, from: &PointingVector, to: &PointingVector) -> (f64, f64) {
        match self.axis_type {
            AntennaAxisType::AzEl | AntennaAxisType::XyEw => (to.az - from.az, to.el - from.el),
            AntennaAxisType::HaDec | AntennaAxisType::Equatorial => {
                let from_ha = from.ha.unwrap_or(from.az);
                let to_ha = to.ha.unwrap_or(to.az);
                let from_dec = from.dec.unwrap_or(from.el);
                let to_dec = to.dec.unwrap_or(to.el);
                (to_ha - from_ha, to_dec - from_dec)
            }
        }
    }

    pub fn slew_seconds(&self, from: &PointingVector, to: &PointingVector, first_scan: bool) -> f64 {
        if first_scan {
            return 0.0;
        }
        let (d1, d2) = self.axis_deltas(from, to);
        self.axis1.travel_time(d1).max(self.axis2.travel_time(d2)) + self.slew_overhead
    }
}

/// One of the (up to three) legal azimuth arcs of a cable-wrap-limited
/// AzEl mount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumCount, EnumIter)]
pub enum WrapSector {
    Ccw,
    Neutral,
    Cw,
}

/// Cable-wrap sector limits, radians, in whatever azimuth frame the station
/// uses (not necessarily `[0, 2π)` — the neutral axis may straddle zero
/// with an ambiguity of ±2π, per spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CableWrap {
    limits: [Option<(f64, f64)>; 3],
}

impl CableWrap {
    pub fn new(
        ccw: Option<(f64, f64)>,
        neutral: Option<(f64, f64)>,
        cw: Option<(f64, f64)>,
    ) -> Self {
        Self {
            limits: [ccw, neutral, cw],
        }
    }

    /// Unconstrained full-circle wrap: one neutral sector covering all
    /// azimuths, no ambiguity.
    pub fn unconstrained() -> Self {
        Self::new(None, Some((f64::NEG_INFINITY, f64::INFINITY)), None)
    }

    pub fn limits_of(&self, sector: WrapSector) -> Option<(f64, f64)> {
        self.limits[sector as usize]
    }

    /// The sector containing `az`, if any.
    pub fn sector_of(&self, az: f64) -> Option<WrapSector> {
        [WrapSector::Ccw, WrapSector::Neutral, WrapSector::Cw]
            .into_iter()
            .find(|&s| matches!(self.limits_of(s), Some((lo, hi)) if az >= lo && az <= hi))
    }

    /// All `az + 2π·k` ambiguities (for `k` in a small practical range)
    /// that fall inside a legal sector, paired with that sector.
    fn legal_ambiguities(&self, az: f64) -> Vec<(f64, WrapSector)> {
        let mut out = Vec::new();
        for k in -3..=3 {
            let candidate = az + TAU * k as f64;
            if let Some(sector) = self.sector_of(candidate) {
                out.push((candidate, sector));
            }
        }
        out
    }

    /// Choose the ambiguity of `raw_az` closest to `reference_az` that lies
    /// within a legal sector. Ties prefer `prefer_sector` when given
    /// (spec.md §4.1: "prefer staying in the same sector as `previous`").
    /// Returns `None` if no ambiguity is legal (slew is infeasible).
    pub fn unwrap_near(
        &self,
        raw_az: f64,
        reference_az: f64,
        prefer_sector: Option<WrapSector>,
    ) -> Option<(f64, WrapSector)> {
        let candidates = self.legal_ambiguities(raw_az);
        candidates.into_iter().min_by(|a, b| {
            let da = (a.0 - reference_az).abs();
            let db = (b.0 - reference_az).abs();
            match da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal) {
                std::cmp::Ordering::Equal => {
                    let a_pref = prefer_sector == Some(a.1);
                    let b_pref = prefer_sector == Some(b.1);
                    b_pref.cmp(&a_pref)
                }
                other => other,
            }
        })
    }

    /// `calc_unwrapped_az`: unwrap against a previous pointing, preferring
    /// to stay inside that pointing's own sector on ties.
    pub fn calc_unwrapped_az(
        &self,
        previous: &PointingVector,
        raw_az: f64,
    ) -> Option<(f64, WrapSector)> {
        let prefer = self.sector_of(previous.az);
        self.unwrap_near(raw_az, previous.az, prefer)
    }
}

/// Piecewise-linear horizon mask: `el_min(az)`, wrapping the azimuth domain
/// at `2π`.
#[derive(Clone, Debug, PartialEq)]
pub struct HorizonMask {
    /// Sorted `(az, el_min)` breakpoints, `az` in `[0, 2π)`.
    breakpoints: Vec<(f64, f64)>,
}

impl HorizonMask {
    pub fn new(mut breakpoints: Vec<(f64, f64)>) -> Self {
        breakpoints.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        Self { breakpoints }
    }

    pub fn flat(el_min: f64) -> Self {
        Self::new(vec![(0.0, el_min), (TAU, el_min)])
    }

    /// Minimum legal elevation at azimuth `az` (any ambiguity; wrapped into
    /// `[0, 2π)` first).
    pub fn el_min(&self, az: f64) -> f64 {
        if self.breakpoints.is_empty() {
            return 0.0;
        }
        if self.breakpoints.len() == 1 {
            return self.breakpoints[0].1;
        }
        let wrapped = az.rem_euclid(TAU);
        let idx = self.breakpoints.partition_point(|&(a, _)| a <= wrapped);
        let (a_az, a_el) = if idx == 0 {
            self.breakpoints[self.breakpoints.len() - 1]
        } else {
            self.breakpoints[idx - 1]
        };
        let (b_az, b_el) = self.breakpoints[idx.min(self.breakpoints.len() - 1)];
        if (b_az - a_az).abs() < 1e-12 {
            return a_el;
        }
        let frac = (wrapped - a_az) / (b_az - a_az);
        a_el + frac * (b_el - a_el)
    }
}

/// spec.md §4.1 `visibility`: elevation above both the station/source
/// minimum and the horizon mask, and azimuth inside a legal wrap sector.
pub fn visibility(
    pv: &PointingVector,
    wrap: &CableWrap,
    mask: &HorizonMask,
    station_min_el: f64,
    source_min_el: f64,
) -> bool {
    let min_el = station_min_el.max(source_min_el);
    pv.el >= min_el && pv.el >= mask.el_min(pv.az) && wrap.sector_of(pv.az).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{SourceId, StationId};
    use approx::assert_abs_diff_eq;

    fn pv(az: f64, el: f64) -> PointingVector {
        PointingVector::new(StationId(0), SourceId(0), az, el, 0.0)
    }

    #[test]
    fn wrap_conflict_scenario_picks_in_sector_ambiguity() {
        // Scenario 2 of spec.md §8: station at az=350deg, cw sector upper
        // limit 360deg, source at az=10deg. 370deg is out of any sector;
        // -350deg (= 10 - 360) should land in the ccw sector.
        let wrap = CableWrap::new(
            Some(((-360.0f64).to_radians(), (-10.0f64).to_radians())),
            Some((170.0f64.to_radians(), 270.0f64.to_radians())),
            Some((270.0f64.to_radians(), 360.0f64.to_radians())),
        );
        let previous = 350.0f64.to_radians();
        let raw = 10.0f64.to_radians();
        let (unwrapped, sector) = wrap.unwrap_near(raw, previous, None).unwrap();
        assert_abs_diff_eq!(unwrapped, (-350.0f64).to_radians(), epsilon = 1e-9);
        assert_eq!(sector, WrapSector::Ccw);
        let slew = (unwrapped - previous).abs();
        assert_abs_diff_eq!(slew, 340.0f64.to_radians(), epsilon = 1e-9);
    }

    #[test]
    fn no_legal_ambiguity_is_infeasible() {
        let wrap = CableWrap::new(None, Some((0.0, 0.1)), None);
        assert!(wrap.unwrap_near(3.0, 0.0, None).is_none());
    }

    #[test]
    fn unwrap_is_idempotent() {
        let wrap = CableWrap::unconstrained();
        let raw = 1.234;
        let first = wrap.unwrap_near(raw, 0.0, None).unwrap();
        let second = wrap.unwrap_near(first.0, 0.0, None).unwrap();
        assert_abs_diff_eq!(first.0, second.0, epsilon = 1e-12);
    }

    #[test]
    fn first_scan_has_zero_slew() {
        let k = AntennaKinematics {
            axis_type: AntennaAxisType::AzEl,
            axis1: AxisRate { rate: 0.01, constant_overhead: 0.0, settle_time: 5.0 },
            axis2: AxisRate { rate: 0.01, constant_overhead: 0.0, settle_time: 5.0 },
            slew_overhead: 2.0,
        };
        let from = pv(0.0, 0.5);
        let to = pv(3.0, 1.0);
        assert_eq!(k.slew_seconds(&from, &to, true), 0.0);
    }

    #[test]
    fn slew_is_max_of_axes_plus_overhead() {
        let k = AntennaKinematics {
            axis_type: AntennaAxisType::AzEl,
            axis1: AxisRate { rate: 0.1, constant_overhead: 0.0, settle_time: 0.0 },
            axis2: AxisRate { rate: 0.2, constant_overhead: 0.0, settle_time: 0.0 },
            slew_overhead: 1.0,
        };
        let from = pv(0.0, 0.0);
        let to = pv(1.0, 1.0); // axis1: 1/0.1=10s, axis2: 1/0.2=5s
        assert_abs_diff_eq!(k.slew_seconds(&from, &to, false), 11.0, epsilon = 1e-9);
    }

    #[test]
    fn horizon_mask_interpolates_linearly() {
        let mask = HorizonMask::new(vec![
            (0.0, 0.1),
            (std::f64::consts::PI, 0.3),
            (TAU, 0.1),
        ]);
        let mid = mask.el_min(std::f64::consts::FRAC_PI_2);
        assert_abs_diff_eq!(mid, 0.2, epsilon = 1e-9);
    }

    #[test]
    fn visibility_requires_above_horizon_and_in_sector() {
        let wrap = CableWrap::unconstrained();
        let mask = HorizonMask::flat(5.0f64.to_radians());
        let good = pv(0.0, 10.0f64.to_radians());
        assert!(visibility(&good, &wrap, &mask, 0.0, 0.0));
        let below_horizon = pv(0.0, 2.0f64.to_radians());
        assert!(!visibility(&below_horizon, &wrap, &mask, 0.0, 0.0));
    }
}
