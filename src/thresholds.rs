// Nagios-style threshold ranges and the count -> status classification.

use std::fmt;

use error_stack::{Report, Result, ResultExt};

use crate::errors::CheckError;

/// The tri-state (plus "could not tell") health verdict a monitoring
/// supervisor understands, in the conventional exit-code order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Status {
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Warning => 1,
            Status::Critical => 2,
            Status::Unknown => 3,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        };
        write!(f, "{name}")
    }
}

/// A parsed threshold range.  `None` on either side means that side is
/// unbounded.  Non-inverted ranges alert when the value falls *outside*
/// [min, max]; a leading `@` in the spec string inverts that to alerting
/// when the value falls *inside* the range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThresholdRange {
    min: Option<u32>,
    max: Option<u32>,
    inverted: bool,
}

impl ThresholdRange {
    /// Parses a range spec.  Accepted forms: `N` (same as `0:N`), `N:`,
    /// `:N`, `N:M`, each optionally prefixed with `@`.
    pub fn parse(spec: &str) -> Result<Self, CheckError> {
        let bad = || Report::new(CheckError::InvalidThreshold(spec.to_string()));

        let (inverted, body) = match spec.strip_prefix('@') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };

        if body.is_empty() {
            return Err(bad().attach_printable("empty range"));
        }

        let parse_bound = |bound: &str| -> Result<Option<u32>, CheckError> {
            if bound.is_empty() {
                return Ok(None);
            }
            bound
                .parse::<u32>()
                .map(Some)
                .change_context(CheckError::InvalidThreshold(spec.to_string()))
                .attach_printable_lazy(|| format!("'{bound}' is not a non-negative integer"))
        };

        let (min, max) = match body.split_once(':') {
            Some((lo, hi)) => (parse_bound(lo)?, parse_bound(hi)?),
            // A bare number means "0 up to N".
            None => (Some(0), parse_bound(body)?),
        };

        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(bad().attach_printable(format!("min {lo} is greater than max {hi}")));
            }
        }

        Ok(ThresholdRange { min, max, inverted })
    }

    /// True when `count` triggers this threshold.
    #[must_use]
    pub fn alerts_on(&self, count: u32) -> bool {
        if self.inverted {
            self.min.is_none_or(|lo| count >= lo) && self.max.is_none_or(|hi| count <= hi)
        } else {
            self.min.is_some_and(|lo| count < lo) || self.max.is_some_and(|hi| count > hi)
        }
    }
}

/// Classifies a message count.  Critical takes priority over warning; a
/// range that was not supplied never triggers.  Requiring at least one
/// range is the configuration layer's job, before any network I/O.
#[must_use]
pub fn evaluate(
    count: u32,
    warning: Option<&ThresholdRange>,
    critical: Option<&ThresholdRange>,
) -> Status {
    if critical.is_some_and(|range| range.alerts_on(count)) {
        Status::Critical
    } else if warning.is_some_and(|range| range.alerts_on(count)) {
        Status::Warning
    } else {
        Status::Ok
    }
}
