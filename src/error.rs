// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all scheduler-related errors. This should be the *only*
//! error enum that is publicly visible.

use thiserror::Error;

use crate::{config::ConfigError, scan::ScanRejected, scheduler::SchedulerSetupError};

const URL: &str = "https://example.invalid/vlbi-scheduler/docs";

/// The *only* publicly visible error from this crate. Each error message
/// should include the URL, unless it's "generic".
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A fatal configuration problem, raised at setup and never from inside
    /// the selection loop.
    #[error("{0}\n\nSee for more info: {URL}/defs/config.html")]
    Config(String),

    /// A fatal problem setting up a [`crate::scheduler::Scheduler`], e.g. an
    /// empty network or an inverted time window.
    #[error("{0}\n\nSee for more info: {URL}/defs/scheduler.html")]
    Setup(String),

    /// A generic error that can't be clarified further with documentation.
    #[error("{0}")]
    Generic(String),
}

impl From<ConfigError> for SchedulerError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<SchedulerSetupError> for SchedulerError {
    fn from(e: SchedulerSetupError) -> Self {
        Self::Setup(e.to_string())
    }
}

/// Convenience conversion so setup-time sanity checks on a single hand-built
/// scan can use `?` against a [`ScanRejected`] inside functions that
/// otherwise return [`SchedulerError`].
impl From<ScanRejected> for SchedulerError {
    fn from(e: ScanRejected) -> Self {
        Self::Generic(e.to_string())
    }
}
