//! Duration parsing and the clock a reconciliation pass samples "now" from.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{Error, Result};

/// Source of the current time for a reconciliation pass.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant. Used by tests and simulations.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Which token field a duration string came from, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationField {
    ExpiresIn,
    RenewBefore,
    RenewAfter,
}

impl DurationField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationField::ExpiresIn => "expiresIn",
            DurationField::RenewBefore => "renewBefore",
            DurationField::RenewAfter => "renewAfter",
        }
    }
}

impl std::fmt::Display for DurationField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a human duration such as `"1h"`, `"30m"` or `"1h30m"`.
pub fn parse_duration(field: DurationField, value: &str) -> Result<TimeDelta> {
    let parsed = humantime::parse_duration(value.trim()).map_err(|source| Error::Parse {
        field,
        value: value.to_string(),
        source,
    })?;
    to_delta(field, value, parsed)
}

/// Whole seconds of a parsed duration, as sent in token-create requests.
pub fn whole_seconds(delta: TimeDelta) -> i64 {
    delta.num_seconds()
}

fn to_delta(field: DurationField, value: &str, parsed: Duration) -> Result<TimeDelta> {
    TimeDelta::from_std(parsed).map_err(|_| Error::DurationOutOfRange {
        field,
        value: value.to_string(),
    })
}
