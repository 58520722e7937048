// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scan-selection engine for planning Very Long Baseline Interferometry
//! (VLBI) observing sessions: given a station network, a source catalog
//! and a scoring configuration, produces a schedule of scans maximizing
//! sky coverage, station usage fairness and source diversity subject to
//! slew kinematics, cable-wrap and SNR constraints.
//!
//! This crate schedules; it does not read or write any particular
//! exchange format (VEX, SKD, NGS). Callers build a [`network::Network`]
//! and [`network::SourceList`] however suits their deployment and hand
//! them to a [`scheduler::Scheduler`].

pub mod antenna;
pub mod astro;
pub mod config;
pub(crate) mod constants;
pub mod coord;
pub(crate) mod error;
pub mod ids;
pub mod multi;
pub mod network;
pub mod scan;
pub mod scheduler;
pub mod skycoverage;
pub mod source;
pub mod station;
pub mod subcon;
pub mod time;

// Re-exports.
pub use config::{Config, ConfigError, HighImpactWindow, MultiScheduling, ScanSequence, WeightFactors};
pub use error::SchedulerError;
pub use ids::{GroupId, ScanId, SourceId, StationId};
pub use network::{InMemoryObservingMode, Network, ObservingMode, SourceList};
pub use scan::{Observation, Scan, ScanType};
pub use scheduler::{Scheduler, SchedulerSetupError};
pub use source::Source;
pub use station::Station;
pub use time::TimeSystem;
