// Copyright 2026 Pitchfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! pitchfeed runtime library: live football data acquisition engine.
//!
//! A singleton-guarded scheduler drives one acquisition cycle per interval:
//! fetch the live match list, enrich it through a two-phase bounded fan-out,
//! write the output document, and hand it to downstream stages.

pub mod acquisition;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod counter;
pub mod cycle;
pub mod downstream;
pub mod error;
pub mod lock;
pub mod match_status;
pub mod output;
pub mod persist;
pub mod scheduler;
pub mod shutdown;
