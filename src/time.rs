// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Session epoch, duration, and calendar/internal-seconds conversions
//! (spec.md §2, `TimeSystem`).

use hifitime::{Epoch, TimeUnits};

use crate::constants::TAU;

/// Anchors a session to a calendar epoch and converts between that and the
/// internal "seconds since session start" representation used everywhere
/// else in the crate (`PointingVector::time`, `ScanTimes`, ...).
#[derive(Clone, Copy, Debug)]
pub struct TimeSystem {
    start: Epoch,
    end: Epoch,
}

impl TimeSystem {
    /// Returns `None` if `end` is not strictly after `start` — a zero or
    /// negative session duration is a `ConfigInconsistency` (spec.md §7),
    /// not a representable `TimeSystem`.
    pub fn new(start: Epoch, end: Epoch) -> Option<Self> {
        if end > start {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn start(&self) -> Epoch {
        self.start
    }

    pub fn end(&self) -> Epoch {
        self.end
    }

    /// Total session duration, seconds.
    pub fn duration_seconds(&self) -> f64 {
        (self.end - self.start).to_seconds()
    }

    /// Convert a calendar [`Epoch`] to internal seconds-since-start.
    pub fn to_internal(&self, e: Epoch) -> f64 {
        (e - self.start).to_seconds()
    }

    /// Convert internal seconds-since-start back to a calendar [`Epoch`].
    pub fn to_calendar(&self, t: f64) -> Epoch {
        self.start + t.seconds()
    }

    /// `true` if `t` (internal seconds) lies within `[0, duration]`.
    pub fn contains(&self, t: f64) -> bool {
        (0.0..=self.duration_seconds()).contains(&t)
    }

    /// Greenwich Mean Sidereal Time, radians, at internal time `t`.
    ///
    /// Uses the IAU 1982 polynomial expansion in UT1 days since J2000
    /// (adequate for scheduling purposes; the sub-arcsecond corrections
    /// supplied by [`crate::astro::AstroProvider::nutation`] refine azimuth
    /// in the rigorous pointing model, not GMST itself).
    pub fn gmst_rad(&self, t: f64) -> f64 {
        gmst_from_epoch(self.to_calendar(t))
    }
}

/// Julian centuries of UT1 since J2000.0 for an [`Epoch`].
fn julian_centuries_j2000(e: Epoch) -> f64 {
    let jd = e.to_jde_utc_days();
    (jd - 2_451_545.0) / 36_525.0
}

/// GMST, radians, from the IAU 1982 expansion.
fn gmst_from_epoch(e: Epoch) -> f64 {
    let jd = e.to_jde_utc_days();
    let t = julian_centuries_j2000(e);
    let gmst_sec = 67_310.548_41
        + (876_600.0 * 3_600.0 + 8_640_184.812_866) * t
        + 0.093_104 * t * t
        - 6.2e-6 * t * t * t;
    // gmst_sec is referenced to the UT1 day fraction; fold in the day
    // fraction itself (the formula above is evaluated at 0h, so add the
    // sub-day seconds of `jd` scaled by the sidereal/solar day ratio).
    let day_fraction = jd.fract();
    let sidereal_seconds =
        gmst_sec + day_fraction * 86_400.0 * 1.002_737_909_350_795;
    let turns = sidereal_seconds / 86_400.0;
    let wrapped = turns.rem_euclid(1.0);
    wrapped * TAU
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rejects_non_positive_duration() {
        let e = Epoch::from_gpst_seconds(0.0);
        assert!(TimeSystem::new(e, e).is_none());
        assert!(TimeSystem::new(e + 10.0.seconds(), e).is_none());
    }

    #[test]
    fn internal_and_calendar_round_trip() {
        let start = Epoch::from_gpst_seconds(1_000_000_000.0);
        let end = start + 3600.0.seconds();
        let ts = TimeSystem::new(start, end).unwrap();
        let t = 1234.5;
        let back = ts.to_internal(ts.to_calendar(t));
        assert_abs_diff_eq!(back, t, epsilon = 1e-6);
    }

    #[test]
    fn gmst_is_within_a_turn() {
        let start = Epoch::from_gpst_seconds(1_000_000_000.0);
        let end = start + 3600.0.seconds();
        let ts = TimeSystem::new(start, end).unwrap();
        let g = ts.gmst_rad(0.0);
        assert!((0.0..TAU).contains(&g));
    }

    #[test]
    fn gmst_advances_with_time() {
        let start = Epoch::from_gpst_seconds(1_000_000_000.0);
        let end = start + 7200.0.seconds();
        let ts = TimeSystem::new(start, end).unwrap();
        let g0 = ts.gmst_rad(0.0);
        let g1 = ts.gmst_rad(3600.0);
        // one sidereal hour is a bit more than pi/12 radians of rotation
        let mut delta = g1 - g0;
        if delta < 0.0 {
            delta += TAU;
        }
        assert!(delta > 0.26 && delta < 0.27);
    }
}
