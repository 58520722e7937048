// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Astronomical collaborator interface (spec.md §6, `AstroProvider`).
//!
//! Ephemeris math is explicitly out of this crate's core scope (spec.md
//! §1); what lives here is the *interface* the scan-selection engine
//! depends on, plus two concrete implementations so the crate is
//! independently testable without a real ephemeris library wired in:
//! [`SimpleAstroProvider`] evaluates every quantity directly from its
//! closed-form approximation on each call (cheap-pass pointing, mirroring
//! [`crate::station::Station::calc_az_el_simple`]'s no-cache contract),
//! while [`NutationGridAstroProvider`] pre-samples earth velocity and
//! nutation on a grid and interpolates, trading a one-time build cost for
//! cheaper repeated lookups during the rigorous escalation pass.

use crate::coord::RADec;
use crate::time::TimeSystem;

/// Earth's instantaneous barycentric velocity, nutation angles, and the
/// apparent solar position, all as pure functions of internal session time.
/// A production deployment supplies its own implementation backed by a real
/// ephemeris (e.g. IAU SOFA/ERFA); see spec.md §1 "Deliberately out of
/// scope".
pub trait AstroProvider: Send + Sync {
    /// Earth's velocity relative to the solar-system barycentre, m/s, ICRS.
    fn earth_velocity(&self, t: f64) -> [f64; 3];

    /// Nutation angles `(X, Y, S)` at time `t`, radians (CIO-based model).
    fn nutation(&self, t: f64) -> (f64, f64, f64);

    /// Apparent position of the Sun at time `t`.
    fn sun_position(&self, t: f64) -> RADec;

    /// Greenwich Mean Sidereal Time, radians, for a given Modified Julian
    /// Date (UT1).
    fn gmst(&self, mjd: f64) -> f64;
}

/// Direct, uncached evaluation of the same closed-form approximations
/// [`NutationGridAstroProvider`] grids and interpolates. No build step and
/// no per-session state beyond the [`TimeSystem`] needed to convert an
/// internal session offset to a calendar epoch.
pub struct SimpleAstroProvider {
    time_system: TimeSystem,
}

impl SimpleAstroProvider {
    pub fn new(time_system: TimeSystem) -> Self {
        Self { time_system }
    }
}

impl AstroProvider for SimpleAstroProvider {
    fn earth_velocity(&self, t: f64) -> [f64; 3] {
        earth_velocity_approx(&self.time_system, t)
    }

    fn nutation(&self, t: f64) -> (f64, f64, f64) {
        nutation_approx(&self.time_system, t)
    }

    fn sun_position(&self, t: f64) -> RADec {
        sun_position_approx(t)
    }

    fn gmst(&self, mjd: f64) -> f64 {
        gmst_from_mjd(mjd)
    }
}

/// One grid sample: earth velocity and nutation angles at a fixed time.
#[derive(Clone, Copy, Debug)]
struct Sample {
    t: f64,
    earth_velocity: [f64; 3],
    nutation: (f64, f64, f64),
}

/// Per-session, per-worker astronomical cache (Design Notes §9: "Replace
/// [global mutable caches] with a per-Scheduler `NutationGridAstroProvider` owned struct
/// built once at session start and passed by borrow").
///
/// Earth velocity and nutation are sampled on a grid and linearly
/// interpolated (spec.md §2); the Sun's position and GMST are cheap closed
/// forms evaluated directly, matching the component responsibility table's
/// "sampled on a grid with linear interpolation" language, which applies
/// only to the two quantities expensive enough to warrant caching.
pub struct NutationGridAstroProvider {
    samples: Vec<Sample>,
}

impl NutationGridAstroProvider {
    /// Build the grid, one sample every `step_seconds`, spanning the whole
    /// session plus one trailing point so interpolation never needs to
    /// extrapolate past the session end.
    pub fn build(time_system: &TimeSystem, step_seconds: f64) -> Self {
        assert!(step_seconds > 0.0);
        let duration = time_system.duration_seconds();
        let mut samples = Vec::new();
        let mut t = 0.0;
        loop {
            samples.push(Self::sample_at(time_system, t));
            if t >= duration {
                break;
            }
            t = (t + step_seconds).min(duration);
            if samples.last().map(|s| s.t) == Some(t) {
                break;
            }
        }
        Self { samples }
    }

    fn sample_at(time_system: &TimeSystem, t: f64) -> Sample {
        Sample {
            t,
            earth_velocity: earth_velocity_approx(time_system, t),
            nutation: nutation_approx(time_system, t),
        }
    }

    /// Linear interpolation between the two bracketing grid points; clamps
    /// to the nearest edge sample outside `[0, duration]`.
    fn interpolate<T>(&self, t: f64, extract: impl Fn(&Sample) -> T) -> T
    where
        T: Copy + std::ops::Add<T, Output = T> + std::ops::Mul<f64, Output = T>,
    {
        if self.samples.is_empty() {
            unreachable!("NutationGridAstroProvider always has at least one sample");
        }
        if t <= self.samples[0].t {
            return extract(&self.samples[0]);
        }
        let last = self.samples.len() - 1;
        if t >= self.samples[last].t {
            return extract(&self.samples[last]);
        }
        let idx = self
            .samples
            .partition_point(|s| s.t <= t)
            .saturating_sub(1)
            .min(last.saturating_sub(1));
        let a = &self.samples[idx];
        let b = &self.samples[idx + 1];
        let frac = if b.t > a.t { (t - a.t) / (b.t - a.t) } else { 0.0 };
        extract(a) * (1.0 - frac) + extract(b) * frac
    }
}

impl AstroProvider for NutationGridAstroProvider {
    fn earth_velocity(&self, t: f64) -> [f64; 3] {
        let interp_component = |s: &Sample, i: usize| s.earth_velocity[i];
        [
            self.interpolate(t, |s| interp_component(s, 0)),
            self.interpolate(t, |s| interp_component(s, 1)),
            self.interpolate(t, |s| interp_component(s, 2)),
        ]
    }

    fn nutation(&self, t: f64) -> (f64, f64, f64) {
        (
            self.interpolate(t, |s| s.nutation.0),
            self.interpolate(t, |s| s.nutation.1),
            self.interpolate(t, |s| s.nutation.2),
        )
    }

    fn sun_position(&self, t: f64) -> RADec {
        sun_position_approx(t)
    }

    fn gmst(&self, mjd: f64) -> f64 {
        gmst_from_mjd(mjd)
    }
}

/// Earth's ICRS velocity, approximated as a circular orbit about the Sun.
fn earth_velocity_approx(time_system: &TimeSystem, t: f64) -> [f64; 3] {
    use crate::constants::TAU;
    const AU_PER_DAY_TO_M_PER_S: f64 = 1731.46;
    let days = time_system.to_internal(time_system.to_calendar(t)) / 86_400.0;
    let mean_anomaly = TAU * days / 365.25;
    let speed = AU_PER_DAY_TO_M_PER_S * 1000.0 / 365.25;
    [
        -speed * mean_anomaly.sin(),
        speed * mean_anomaly.cos() * 0.9175, // ecliptic obliquity projection onto equatorial Y
        speed * mean_anomaly.cos() * 0.3978, // ... and Z
    ]
}

/// Small-amplitude nutation approximation (principal lunar term only). Not
/// an IAU2000 series; adequate for scheduling-grade pointing, which is the
/// only consumer (see DESIGN.md).
fn nutation_approx(time_system: &TimeSystem, t: f64) -> (f64, f64, f64) {
    use crate::constants::TAU;
    let days = time_system.to_internal(time_system.to_calendar(t)) / 86_400.0;
    let omega = TAU * (125.04_f64.to_radians() - days * 0.05295_f64.to_radians()) / TAU;
    let dpsi = -17.2 * omega.sin() / 3_600.0 / 57.295_78; // arcsec -> rad
    let deps = 9.2 * omega.cos() / 3_600.0 / 57.295_78;
    (dpsi, deps, 0.0)
}

/// Low-precision apparent solar position (good to a few arcminutes),
/// sufficient for the sun-distance constraint of spec.md §3/§4.3.
fn sun_position_approx(days_since_j2000: f64) -> RADec {
    let n = days_since_j2000;
    let g = (357.529 + 0.985_600_28 * n).to_radians();
    let l = (280.459 + 0.985_647_37 * n).to_radians() + 1.915_f64.to_radians() * g.sin()
        + 0.020_f64.to_radians() * (2.0 * g).sin();
    let eps = (23.439 - 0.000_000_4 * n).to_radians();
    let ra = (eps.cos() * l.sin()).atan2(l.cos());
    let dec = (eps.sin() * l.sin()).asin();
    RADec::new(ra.rem_euclid(std::f64::consts::TAU), dec)
}

fn gmst_from_mjd(mjd: f64) -> f64 {
    use crate::constants::TAU;
    let t = (mjd - 51_544.5) / 36_525.0;
    let gmst_sec = 67_310.548_41
        + (876_600.0 * 3_600.0 + 8_640_184.812_866) * t
        + 0.093_104 * t * t
        - 6.2e-6 * t * t * t;
    let day_fraction = mjd.fract();
    let sidereal_seconds = gmst_sec + day_fraction * 86_400.0 * 1.002_737_909_350_795;
    (sidereal_seconds / 86_400.0).rem_euclid(1.0) * TAU
}
