// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. The scheduler should do as many
calculations as possible in double precision before converting to a lower
precision, if it is ever required.
 */

pub use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Default minimum legal elevation, radians, used when a station or source
/// doesn't specify one.
pub const DEFAULT_MIN_ELEVATION: f64 = 5.0 * PI / 180.0;

/// Default subnetting max-end-time tolerance, seconds (spec.md §4.6).
pub const DEFAULT_SUBNETTING_TIME_TOLERANCE: f64 = 600.0;

/// Default rigorous-update resample interval along a scan, seconds
/// (spec.md §4.6, "verify visibility ... at the scan's end, every ~30 s
/// sample").
pub const RIGOROUS_RESAMPLE_INTERVAL: f64 = 30.0;

/// Azimuth change between rigorous-update iterations that flags a "big
/// slew" wrap crossing (spec.md §4.6).
pub const BIG_SLEW_THRESHOLD: f64 = FRAC_PI_2;

/// Grid spacing, seconds, for the earth-velocity/nutation sample tables
/// (spec.md §2, `AstroProvider`).
pub const DEFAULT_ASTRO_GRID_STEP_SECONDS: f64 = 3_600.0;

/// Flux density, Jy, assumed for a source/band combination with no flux
/// model at all (spec.md §4.6, "fallback flux"). Deliberately tiny: such a
/// candidate should almost always fail the SNR check rather than silently
/// succeed.
pub const DEFAULT_FALLBACK_FLUX_JY: f64 = 1.0e-6;
