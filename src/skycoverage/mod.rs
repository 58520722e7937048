// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-group recent-observation index and pointing-novelty score
//! (spec.md §3/§4.4, "SkyCoverage").

use std::collections::HashMap;

use crate::coord::RADec;
use crate::ids::GroupId;

#[derive(Clone, Copy, Debug)]
struct Entry {
    direction: RADec,
    time: f64,
}

/// One collocation group's recent-pointing window (spec.md §4.4).
#[derive(Clone, Debug)]
pub struct SkyCoverage {
    max_influence_time: f64,
    max_influence_distance: f64,
    entries: Vec<Entry>,
    /// Per-pointing-vector first score cache, keyed by a coarse grid cell
    /// of the candidate direction, used to distinguish `calc_score` (which
    /// populates it) from `calc_score_subcon` (which only reads it) — see
    /// spec.md §4.4.
    subcon_cache: HashMap<(i64, i64), f64>,
}

impl SkyCoverage {
    pub fn new(max_influence_time: f64, max_influence_distance: f64) -> Self {
        Self {
            max_influence_time,
            max_influence_distance,
            entries: Vec::new(),
            subcon_cache: HashMap::new(),
        }
    }

    fn grid_key(direction: &RADec) -> (i64, i64) {
        const CELLS_PER_RADIAN: f64 = 1000.0;
        (
            (direction.ra * CELLS_PER_RADIAN).round() as i64,
            (direction.dec * CELLS_PER_RADIAN).round() as i64,
        )
    }

    fn f_dist(&self, nearest_distance: f64) -> f64 {
        (nearest_distance / self.max_influence_distance).clamp(0.0, 1.0)
    }

    fn g_time(&self, time_since_nearest: f64) -> f64 {
        (time_since_nearest / self.max_influence_time).clamp(0.0, 1.0)
    }

    fn nearest(&self, direction: &RADec, now: f64) -> Option<(f64, f64)> {
        self.entries
            .iter()
            .filter(|e| now - e.time <= self.max_influence_time)
            .map(|e| (direction.separation(&e.direction), now - e.time))
            .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
    }

    /// `calc_score`: the "live" score, called once per candidate pointing
    /// and cached for [`Self::calc_score_subcon`].
    pub fn calc_score(&mut self, direction: &RADec, now: f64) -> f64 {
        let score = match self.nearest(direction, now) {
            None => 1.0,
            Some((dist, age)) => self.f_dist(dist) * self.g_time(age),
        };
        self.subcon_cache.insert(Self::grid_key(direction), score);
        score
    }

    /// `calc_score_subcon`: reads the cache populated by `calc_score`,
    /// so that twin antennas sharing one group don't each get separate
    /// credit for exploring the same patch of sky within one subnetting
    /// arm (spec.md §4.4).
    pub fn calc_score_subcon(&self, direction: &RADec) -> f64 {
        *self
            .subcon_cache
            .get(&Self::grid_key(direction))
            .unwrap_or(&1.0)
    }

    /// Record a committed pointing, dropping entries older than the
    /// influence window.
    pub fn commit(&mut self, direction: RADec, time: f64) {
        self.entries.push(Entry { direction, time });
        self.entries
            .retain(|e| time - e.time <= self.max_influence_time);
        self.subcon_cache.clear();
    }
}

/// Maps stations sharing a collocation group to one [`SkyCoverage`]
/// account each (spec.md §4.4 ADDED note in SPEC_FULL.md).
#[derive(Clone, Debug, Default)]
pub struct SkyCoverageGroups {
    groups: HashMap<GroupId, SkyCoverage>,
}

impl SkyCoverageGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_group(&mut self, group: GroupId, max_influence_time: f64, max_influence_distance: f64) {
        self.groups
            .entry(group)
            .or_insert_with(|| SkyCoverage::new(max_influence_time, max_influence_distance));
    }

    pub fn get_mut(&mut self, group: GroupId) -> Option<&mut SkyCoverage> {
        self.groups.get_mut(&group)
    }

    pub fn get(&self, group: GroupId) -> Option<&SkyCoverage> {
        self.groups.get(&group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn empty_coverage_scores_maximum_novelty() {
        let mut sc = SkyCoverage::new(3600.0, 0.5);
        let score = sc.calc_score(&RADec::new(0.0, 0.0), 0.0);
        assert_abs_diff_eq!(score, 1.0);
    }

    #[test]
    fn coincident_recent_pointing_scores_zero() {
        let mut sc = SkyCoverage::new(3600.0, 0.5);
        sc.commit(RADec::new(0.0, 0.0), 0.0);
        let score = sc.calc_score(&RADec::new(0.0, 0.0), 1.0);
        assert_abs_diff_eq!(score, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn old_pointing_loses_influence() {
        let mut sc = SkyCoverage::new(100.0, 0.5);
        sc.commit(RADec::new(0.0, 0.0), 0.0);
        let score = sc.calc_score(&RADec::new(0.0, 0.0), 10_000.0);
        assert_abs_diff_eq!(score, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn subcon_score_reads_the_cache_without_recomputing() {
        let mut sc = SkyCoverage::new(3600.0, 0.5);
        sc.commit(RADec::new(0.0, 0.0), 0.0);
        let direction = RADec::new(0.1, 0.0);
        let live = sc.calc_score(&direction, 1.0);
        let cached = sc.calc_score_subcon(&direction);
        assert_abs_diff_eq!(live, cached);
    }
}
