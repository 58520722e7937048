// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Single integration-test binary, following the teacher's own
//! `tests/integration/` layout (`examples/cjordan-mwa_hyperdrive/tests/integration/`):
//! one top-level harness file per logical test group, declared as a module
//! here rather than each living as its own `tests/*.rs` binary.

#[path = "integration/scenarios.rs"]
mod scenarios;
