// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Concrete numbered scenarios against the public API. Scenario 1 (minimum
//! viable two-station scan) and scenario 2 (wrap conflict) already live as
//! unit tests next to the code they exercise (`scan::tests` and
//! `antenna::tests`); the remaining scenarios are covered here because they
//! need several modules wired together.

use std::collections::BTreeMap;

use hifitime::{Epoch, TimeUnits};

use vlbi_scheduler::antenna::{AntennaAxisType, AntennaKinematics, AxisRate, CableWrap, HorizonMask};
use vlbi_scheduler::astro::AstroProvider;
use vlbi_scheduler::coord::{PointingVector, RADec};
use vlbi_scheduler::scan::{self, Constellation, ScanRejected, ScanType};
use vlbi_scheduler::source::{BandId, FluxModel, SourceParameters};
use vlbi_scheduler::station::{Equipment, StationParameters, WaitTimes};
use vlbi_scheduler::subcon::{Subcon, SubconConfig};
use vlbi_scheduler::{
    Config, InMemoryObservingMode, Network, ScanSequence, Scheduler, Source, SourceId, SourceList,
    Station, StationId, TimeSystem,
};

struct ZeroAstro;

impl AstroProvider for ZeroAstro {
    fn earth_velocity(&self, _t: f64) -> [f64; 3] {
        [0.0, 0.0, 0.0]
    }
    fn nutation(&self, _t: f64) -> (f64, f64, f64) {
        (0.0, 0.0, 0.0)
    }
    fn sun_position(&self, _t: f64) -> RADec {
        RADec::new(0.0, -1.4)
    }
    fn gmst(&self, _mjd: f64) -> f64 {
        0.0
    }
}

fn flat_station(id: u32, position: [f64; 3]) -> Station {
    let mut s = Station::new(
        StationId(id),
        format!("S{id}"),
        position,
        AntennaKinematics {
            axis_type: AntennaAxisType::AzEl,
            axis1: AxisRate { rate: 1.0, constant_overhead: 0.0, settle_time: 0.0 },
            axis2: AxisRate { rate: 1.0, constant_overhead: 0.0, settle_time: 0.0 },
            slew_overhead: 0.0,
        },
        CableWrap::unconstrained(),
        HorizonMask::flat(0.0),
        WaitTimes { field_system: 0.0, preob: 0.0, midob: 0.0, postob: 0.0 },
        StationParameters { min_scan: 1.0, max_scan: 600.0, ..StationParameters::default() },
        Vec::new(),
    );
    s.set_equipment(BandId::from("X"), Equipment { sefd_jy: 500.0, elevation_poly: None });
    s
}

fn flux_source(id: u32, ra: f64, dec: f64) -> Source {
    let mut src = Source::new(
        SourceId(id),
        format!("src{id}"),
        RADec::new(ra, dec),
        SourceParameters { min_scan: 1.0, max_scan: 600.0, min_flux: 0.0, ..SourceParameters::default() },
        Vec::new(),
    );
    src.set_flux_model(
        BandId::from("X"),
        FluxModel::SpectralIndex { flux_jy: 1000.0, reference_freq_hz: 8.4e9, index: 0.0 },
    );
    src
}

fn time_system(duration_hours: f64) -> TimeSystem {
    let start = Epoch::from_gpst_seconds(1_000_000_000.0);
    let end = start + (duration_hours * 3600.0).seconds();
    TimeSystem::new(start, end).unwrap()
}

fn pv(station: StationId, source: SourceId, az: f64, el: f64) -> PointingVector {
    PointingVector::new(station, source, az, el, 0.0)
}

/// Scenario 3 of spec.md §8: stations {A,B,C,D}; S1 seen by {A,B,C}, S2 seen
/// by {B,C,D}. The intersection {B,C} must be enumerated into disjoint
/// arms, and at least one valid partition must survive `min_stations = 2`.
#[test]
fn subnetting_splits_a_four_station_network() {
    let (station_a, station_b, station_c, station_d) =
        (StationId(0), StationId(1), StationId(2), StationId(3));
    let mut network = Network::new();
    network.add(flat_station(0, [6_371_000.0, 0.0, 0.0]));
    network.add(flat_station(1, [0.0, 6_371_000.0, 0.0]));
    network.add(flat_station(2, [0.0, 0.0, 6_371_000.0]));
    network.add(flat_station(3, [-6_371_000.0, 0.0, 0.0]));

    let mut sources = SourceList::new();
    let (s1, s2) = (SourceId(0), SourceId(1));
    sources.add(flux_source(0, 0.0, 0.5));
    sources.add(flux_source(1, 1.0, 0.5));

    let mut candidate_pointings = BTreeMap::new();
    let mut p1 = BTreeMap::new();
    p1.insert(station_a, pv(station_a, s1, 0.1, 0.5));
    p1.insert(station_b, pv(station_b, s1, 0.2, 0.5));
    p1.insert(station_c, pv(station_c, s1, 0.3, 0.5));
    candidate_pointings.insert(s1, p1);
    let mut p2 = BTreeMap::new();
    p2.insert(station_b, pv(station_b, s2, 0.4, 0.5));
    p2.insert(station_c, pv(station_c, s2, 0.5, 0.5));
    p2.insert(station_d, pv(station_d, s2, 0.6, 0.5));
    candidate_pointings.insert(s2, p2);

    let mode = InMemoryObservingMode::new(256.0e6, 0.5).with_band(BandId::from("X"), 0.0357, 5.0);
    let config = SubconConfig { min_stations: 2, fallback_flux_jy: 1e-6, subnetting: true, subnetting_time_tolerance: 600.0 };
    let (_singles, pairs) = Subcon::build(
        &candidate_pointings,
        &sources,
        &network,
        &mode,
        &BTreeMap::new(),
        &[(s1, s2)],
        &config,
    );

    assert!(!pairs.is_empty(), "the {{B,C}} intersection must yield at least one valid partition");
    for (scan_a, scan_b) in &pairs {
        let stations_a: std::collections::BTreeSet<_> = scan_a.stations().collect();
        let stations_b: std::collections::BTreeSet<_> = scan_b.stations().collect();
        assert!(stations_a.is_disjoint(&stations_b), "subnetting arms must not share a station");
        assert!(stations_a.len() as u32 >= config.min_stations);
        assert!(stations_b.len() as u32 >= config.min_stations);
    }
    // A must always land in the S1 arm and D in the S2 arm; only the
    // intersection {B,C} varies between valid partitions.
    assert!(pairs.iter().any(|(a, b)| {
        a.stations().any(|s| s == station_a) && b.stations().any(|s| s == station_d)
    }));
}

/// Scenario 4 of spec.md §8: `ScanSequence{cadence: 5, targets: {0 => [target]}}`
/// must force the target source onto every 5th committed scan while it
/// remains eligible.
#[test]
fn cadence_rule_forces_target_source_every_nth_scan() {
    // Stations placed near the pole: elevation to any fixed-declination
    // source is then ~independent of sidereal time, so both sources stay
    // visible for the whole session regardless of the (zeroed) Earth
    // rotation model.
    let mut network = Network::new();
    network.add(flat_station(0, [200_000.0, 0.0, 6_371_000.0]));
    network.add(flat_station(1, [0.0, 200_000.0, 6_371_000.0]));

    let target = SourceId(0);
    let other = SourceId(1);
    let mut sources = SourceList::new();
    for (id, ra) in [(0u32, 0.0), (1u32, 3.0)] {
        let mut src = Source::new(
            SourceId(id),
            format!("src{id}"),
            RADec::new(ra, 80.0f64.to_radians()),
            SourceParameters {
                min_scan: 1.0,
                max_scan: 30.0,
                min_flux: 0.0,
                fixed_scan_duration: Some(2.0),
                ..SourceParameters::default()
            },
            Vec::new(),
        );
        src.set_flux_model(
            BandId::from("X"),
            FluxModel::SpectralIndex { flux_jy: 1000.0, reference_freq_hz: 8.4e9, index: 0.0 },
        );
        sources.add(src);
    }

    let config = Config {
        scan_sequence: Some(ScanSequence {
            cadence: 5,
            targets: std::collections::HashMap::from([(0u32, vec![target])]),
        }),
        ..Config::default()
    };

    let mode = InMemoryObservingMode::new(256.0e6, 0.5).with_band(BandId::from("X"), 0.0357, 5.0);
    let mut scheduler = Scheduler::new(network, sources, config, time_system(2.0), Box::new(ZeroAstro), Box::new(mode)).unwrap();
    let scans = scheduler.run();

    assert!(scans.len() >= 6, "expected enough turnover in a 2-hour session to exercise cadence index 5, got {}", scans.len());
    assert_eq!(scans[0].source_id, target);
    assert_eq!(scans[5].source_id, target);
    let _ = other;
}

/// Scenario 5 of spec.md §8: a secondary scan whose slew would overrun the
/// station's slew budget must be rejected rather than silently delaying
/// whatever the station is committed to next.
///
/// This exercises the generic per-station slew-budget check inside
/// `construct_candidate`, independent of `Scheduler`; the
/// fillin-specific "must return to required end-pointing on time"
/// invariant against a station's actual next commitment
/// (`Scheduler::fillin_honors_endpoint_invariant`, grounded on
/// `original_source/VLBI_Scheduler/FillinmodeEndposition.h`) is covered
/// by `scheduler::tests::fillin_endpoint_invariant_rejects_a_candidate_that_cannot_slew_back_in_time`
/// and `scheduler::tests::next_required_position_is_none_past_the_last_appearance`,
/// which run against a real `Scheduler` rather than calling
/// `construct_candidate` directly.
#[test]
fn fillin_respects_the_slew_budget() {
    let mut station = Station::new(
        StationId(0),
        "S0",
        [0.0, 0.0, 0.0],
        AntennaKinematics {
            axis_type: AntennaAxisType::AzEl,
            axis1: AxisRate { rate: 1.0, constant_overhead: 0.0, settle_time: 0.0 },
            // A deliberately slow elevation drive: 0.4 rad of elevation
            // travel costs 40s here, matching scenario 5's 40-second leg.
            axis2: AxisRate { rate: 0.01, constant_overhead: 0.0, settle_time: 0.0 },
            slew_overhead: 0.0,
        },
        CableWrap::unconstrained(),
        HorizonMask::flat(0.0),
        WaitTimes { field_system: 0.0, preob: 0.0, midob: 0.0, postob: 0.0 },
        StationParameters { min_scan: 1.0, max_scan: 600.0, max_slew_time: Some(35.0), ..StationParameters::default() },
        Vec::new(),
    );
    station.set_equipment(BandId::from("X"), Equipment { sefd_jy: 500.0, elevation_poly: None });
    // Commit an initial pointing so the station is no longer in its
    // zero-cost "first scan" state (which would bypass the slew budget).
    station.commit(&pv(StationId(0), SourceId(0), 0.0, 0.1), 0.0, 0.0, 0.0);
    let mut network = Network::new();
    network.add(station);
    network.add(flat_station(1, [5_000_000.0, 0.0, 0.0]));

    let source = flux_source(0, 0.0, 0.0);
    let mode = InMemoryObservingMode::new(256.0e6, 0.5).with_band(BandId::from("X"), 0.0357, 20.0);

    // Station 0 is parked at el=0.1 rad; the candidate requires 0.4 rad of
    // further elevation travel, a 40s slew at the configured rate, which
    // exceeds the 35s budget and must drop the station, leaving too few
    // stations for the scan to survive.
    let mut pointings = BTreeMap::new();
    pointings.insert(StationId(0), pv(StationId(0), source.id, 0.0, 0.5));
    pointings.insert(StationId(1), pv(StationId(1), source.id, 0.1, 0.5));

    let err = scan::construct_candidate(
        &source,
        pointings,
        &BTreeMap::new(),
        &network,
        &mode,
        0.001,
        2,
        ScanType::Fillin,
        Constellation::Single,
    )
    .unwrap_err();
    assert!(matches!(err, ScanRejected::TooFewStations { .. }));
}

/// Scenario 6 of spec.md §8: `calc_az_el` in rigorous mode is a pure
/// function of its inputs and the nutation grid, so re-evaluating it on the
/// same (source, station, time) is a bitwise fixed point.
#[test]
fn rigorous_pointing_is_a_fixed_point_on_repeat_evaluation() {
    let station = flat_station(0, [6_371_000.0, 0.0, 0.0]);
    let source = flux_source(0, 0.3, 0.2);
    let ts = time_system(1.0);
    let astro = ZeroAstro;

    let first = station.calc_az_el_rigorous(&source, &ts, 1_234.0, &astro);
    let second = station.calc_az_el_rigorous(&source, &ts, 1_234.0, &astro);
    assert_eq!(first, second);
}
