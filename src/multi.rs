// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameter-sweep dispatch (spec.md §2/§5, "MultiScheduling"): run many
//! independent schedules in parallel and merge their summary statistics
//! into one CSV, guarded by a single writer lock (spec.md §5, "no shared
//! mutable state across workers").

use std::io::Write;
use std::sync::Mutex;

use log::info;
use rayon::prelude::*;

use crate::astro::AstroProvider;
use crate::config::{Config, MultiScheduling};
use crate::network::{Network, ObservingMode, SourceList};
use crate::scan::Scan;
use crate::scheduler::{Scheduler, SchedulerSetupError};
use crate::time::TimeSystem;

/// One expanded sweep job's outcome.
pub struct MultiSchedulingRun {
    pub config: Config,
    pub scans: Vec<Scan>,
}

impl MultiSchedulingRun {
    fn summary_row(&self, index: usize) -> [String; 4] {
        let observing_seconds: f64 = self
            .scans
            .iter()
            .flat_map(|s| s.observations.iter())
            .map(|o| o.duration)
            .sum();
        [
            index.to_string(),
            self.config.weights.sky_coverage.to_string(),
            self.config.subnetting.to_string(),
            observing_seconds.to_string(),
        ]
    }
}

/// Run every config in `sweep.expand(base_config)` against its own private
/// [`Scheduler`] (and hence its own private astronomical cache, per the
/// Design Notes' "no shared mutable state across workers"), in parallel via
/// a `rayon` job pool. `astro_factory`/`mode_factory` build one fresh
/// collaborator per job rather than sharing one across threads, so each
/// worker's cache is genuinely private.
#[allow(clippy::too_many_arguments)]
pub fn run_multi(
    base_config: &Config,
    sweep: &MultiScheduling,
    network: &Network,
    sources: &SourceList,
    time_system: &TimeSystem,
    astro_factory: impl Fn() -> Box<dyn AstroProvider> + Sync,
    mode_factory: impl Fn() -> Box<dyn ObservingMode> + Sync,
    csv_out: Option<&mut dyn Write>,
) -> Result<Vec<MultiSchedulingRun>, SchedulerSetupError> {
    let jobs = sweep.expand(base_config);
    info!("multi-scheduling sweep: {} jobs", jobs.len());

    let results: Vec<Result<MultiSchedulingRun, SchedulerSetupError>> = jobs
        .into_par_iter()
        .map(|config| {
            let mut scheduler = Scheduler::new(
                network.clone(),
                sources.clone(),
                config.clone(),
                *time_system,
                astro_factory(),
                mode_factory(),
            )?;
            let scans = scheduler.run();
            Ok(MultiSchedulingRun { config, scans })
        })
        .collect();

    let runs: Vec<MultiSchedulingRun> = results.into_iter().collect::<Result<_, _>>()?;

    if let Some(out) = csv_out {
        write_summary_csv(&runs, out);
    }

    Ok(runs)
}

/// Serialize every job's summary row through a single writer lock, so
/// concurrent workers (were this called mid-sweep instead of after the
/// `par_iter` barrier) would never interleave partial rows.
fn write_summary_csv(runs: &[MultiSchedulingRun], out: &mut dyn Write) {
    let writer = Mutex::new(csv::Writer::from_writer(out));
    {
        let mut w = writer.lock().unwrap();
        let _ = w.write_record(["job", "sky_coverage_weight", "subnetting", "observing_seconds"]);
    }
    runs.iter().enumerate().for_each(|(i, run)| {
        let row = run.summary_row(i);
        let mut w = writer.lock().unwrap();
        let _ = w.write_record(row);
    });
    let mut w = writer.lock().unwrap();
    let _ = w.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antenna::{AntennaAxisType, AntennaKinematics, AxisRate, CableWrap, HorizonMask};
    use crate::coord::RADec;
    use crate::ids::{SourceId, StationId};
    use crate::network::InMemoryObservingMode;
    use crate::source::{BandId, FluxModel, Source, SourceParameters};
    use crate::station::{Equipment, Station, StationParameters, WaitTimes};
    use hifitime::{Epoch, TimeUnits};

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

    #[test]
    fn sweep_runs_every_expanded_config() {
        let mut network = Network::new();
        network.add(flat_station(0, [6_371_000.0, 0.0, 0.0]));
        network.add(flat_station(1, [0.0, 6_371_000.0, 0.0]));
        let mut sources = SourceList::new();
        let mut src = Source::new(
            SourceId(0),
            "src0",
            RADec::new(0.0, 1.4),
            SourceParameters { min_scan: 1.0, max_scan: 600.0, ..SourceParameters::default() },
            Vec::new(),
        );
        src.set_flux_model(
            BandId::from("X"),
            FluxModel::SpectralIndex { flux_jy: 1000.0, reference_freq_hz: 8.4e9, index: 0.0 },
        );
        sources.add(src);

        let start = Epoch::from_gpst_seconds(1_000_000_000.0);
        let ts = TimeSystem::new(start, start + (3.0 * 3600.0).seconds()).unwrap();

        let sweep = MultiScheduling {
            sky_coverage_weights: vec![0.0, 1.0],
            subnetting_options: vec![false],
        };

        let mut csv_buf = Vec::new();
        let runs = run_multi(
            &Config::default(),
            &sweep,
            &network,
            &sources,
            &ts,
            || Box::new(ZeroAstro),
            || Box::new(InMemoryObservingMode::new(256.0e6, 0.5).with_band(BandId::from("X"), 0.0357, 5.0)),
            Some(&mut csv_buf),
        )
        .unwrap();

        assert_eq!(runs.len(), 2);
        let csv_text = String::from_utf8(csv_buf).unwrap();
        assert!(csv_text.contains("job,sky_coverage_weight,subnetting,observing_seconds"));
    }
}
