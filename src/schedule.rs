//! Weighted load score, mirroring the `cms.sched` directive of XRootD.
//!
//! A directive is a flat list of `<name> <integer>` pairs:
//!
//! ```text
//! cpu 50 runq 30 io 20 maxload 80
//! ```
//!
//! The score of one report is `floor(Σ field·weight / 100)`; a report whose
//! score exceeds `maxload` is rejected (the server would stop accepting work).

use crate::error::DirectiveError;
use crate::report::Field;
use std::fmt;
use std::str::FromStr;

/// Per-field weights plus the rejection threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWeight {
    pub runq: i64,
    pub cpu: i64,
    pub mem: i64,
    pub pag: i64,
    pub io: i64,
    pub maxload: i64,
}

impl Default for ScheduleWeight {
    fn default() -> Self {
        ScheduleWeight { runq: 0, cpu: 0, mem: 0, pag: 0, io: 0, maxload: 100 }
    }
}

impl ScheduleWeight {
    /// Build weights from a directive.
    ///
    /// Every token that names a weight takes the following token as its value.
    /// Other tokens are skipped, so a full `cms.sched` line with unrelated
    /// options still works. A name followed by a non-integer is an error.
    pub fn from_directive(directive: &str) -> Result<Self, DirectiveError> {
        let mut weight = ScheduleWeight::default();
        let words: Vec<&str> = directive.split_whitespace().collect();
        for pair in words.windows(2) {
            let [name, value] = pair else { continue };
            let Some(slot) = weight.slot(name) else { continue };
            *slot = value
                .parse()
                .map_err(|_| DirectiveError { name: name.to_string(), value: value.to_string() })?;
        }
        Ok(weight)
    }

    fn slot(&mut self, name: &str) -> Option<&mut i64> {
        match name {
            "runq" => Some(&mut self.runq),
            "cpu" => Some(&mut self.cpu),
            "mem" => Some(&mut self.mem),
            "pag" => Some(&mut self.pag),
            "io" => Some(&mut self.io),
            "maxload" => Some(&mut self.maxload),
            _ => None,
        }
    }

    pub fn weight(&self, field: Field) -> i64 {
        match field {
            Field::Runq => self.runq,
            Field::Cpu => self.cpu,
            Field::Mem => self.mem,
            Field::Pag => self.pag,
            Field::Io => self.io,
        }
    }

    /// Score one report, given in `Field::ALL` order.
    ///
    /// Any `i64` weight is accepted; a score beyond the `i64` range saturates.
    pub fn weigh(&self, report: [u8; 5]) -> Score {
        let total: i128 = Field::ALL
            .iter()
            .zip(report)
            .map(|(field, value)| i128::from(value) * i128::from(self.weight(*field)))
            .sum();
        let load = i64::try_from(total.div_euclid(100)).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX });
        Score { load, rejected: load > self.maxload }
    }
}

impl FromStr for ScheduleWeight {
    type Err = DirectiveError;

    fn from_str(directive: &str) -> Result<Self, Self::Err> {
        Self::from_directive(directive)
    }
}

/// Result of weighing one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub load: i64,
    pub rejected: bool,
}

// `37` or `137!`, one per side-channel line.
impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.load, if self.rejected { "!" } else { "" })
    }
}
