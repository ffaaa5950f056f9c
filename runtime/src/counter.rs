//! Rolling per-day cycle counter.
//!
//! One small JSON file mapping a New York calendar date to the number of
//! completed cycles and items processed that day. It is read, bumped and
//! written back once per completed cycle; only the cycle runner touches it.

use crate::persist;
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Days kept in the file, today included.
pub const RETENTION_DAYS: i64 = 30;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayTally {
    pub cycles: u32,
    pub items: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyCounter {
    days: BTreeMap<NaiveDate, DayTally>,
}

impl DailyCounter {
    /// Load from disk. A missing file is an empty counter; so is a corrupt
    /// one, with a warning, since the counter is advisory.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "daily counter unreadable, starting fresh");
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(counter) => counter,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "daily counter corrupt, starting fresh");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        persist::write_json_atomic(path, self)
    }

    pub fn get(&self, day: NaiveDate) -> DayTally {
        self.days.get(&day).copied().unwrap_or_default()
    }

    /// Count one completed cycle on `day` and return its 1-based number.
    pub fn record(&mut self, day: NaiveDate, items: u64) -> u32 {
        let tally = self.days.entry(day).or_default();
        tally.cycles += 1;
        tally.items += items;
        let number = tally.cycles;
        self.prune(day);
        number
    }

    fn prune(&mut self, today: NaiveDate) {
        let oldest = today - chrono::Duration::days(RETENTION_DAYS - 1);
        self.days.retain(|day, _| *day >= oldest);
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Load, bump and persist in one step. Returns the cycle's number for `day`.
pub fn record_cycle(path: &Path, day: NaiveDate, items: u64) -> Result<u32> {
    let mut counter = DailyCounter::load(path);
    let number = counter.record(day, items);
    counter.save(path)?;
    Ok(number)
}
