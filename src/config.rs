//! Runtime configuration: reporting cadence and the per-field expressions.

use crate::error::DurationError;
use crate::report::Field;
use crate::schedule::ScheduleWeight;
use std::time::Duration;

/// Parse an XRootD duration literal such as `12`, `17.5s`, `2m`, `1h` or `1e3`.
///
/// ```
/// use std::time::Duration;
/// use cms_perf::parse_duration;
///
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// assert_eq!(parse_duration(" 0.5 ").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(literal: &str) -> Result<Duration, DurationError> {
    let trimmed = literal.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }
    let caps = crate::regex!(
        r"(?x)^
        (?P<value> [+-]? (?:[0-9]+\.?[0-9]* | \.[0-9]+) (?:[eE][+-]?[0-9]+)? )
        \s* (?P<unit>[A-Za-z]*) $"
    )
    .captures(trimmed)
    .ok_or_else(|| DurationError::InvalidNumber(trimmed.to_string()))?;

    let scale = match &caps["unit"] {
        "" | "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        unit => return Err(DurationError::UnknownUnit { unit: unit.to_string(), literal: trimmed.to_string() }),
    };
    let value: f64 = caps["value"].parse().map_err(|_| DurationError::InvalidNumber(caps["value"].to_string()))?;
    Duration::try_from_secs_f64(value * scale).map_err(|_| DurationError::OutOfRange(trimmed.to_string()))
}

/// How the reporting loop runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    /// Time between two reports.
    pub interval: Duration,
    /// Ramp-up duration; shorter than a second disables ramp-up.
    pub rampup: Duration,
    /// Weights for the side-channel score, if any.
    pub schedule: Option<ScheduleWeight>,
    /// Stop after this many reports.
    pub ticks: Option<u64>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig { interval: Duration::from_secs(60), rampup: Duration::ZERO, schedule: None, ticks: None }
    }
}

/// Expression source for each output field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldExprs {
    pub prunq: String,
    pub pcpu: String,
    pub pmem: String,
    pub ppag: String,
    pub pio: String,
}

impl FieldExprs {
    pub const DEFAULT_PRUNQ: &'static str = "prunq";
    pub const DEFAULT_PCPU: &'static str = "pcpu";
    pub const DEFAULT_PMEM: &'static str = "pmem";
    // paging cannot be measured reliably
    pub const DEFAULT_PPAG: &'static str = "0";
    pub const DEFAULT_PIO: &'static str = "pio";

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Runq => &self.prunq,
            Field::Cpu => &self.pcpu,
            Field::Mem => &self.pmem,
            Field::Pag => &self.ppag,
            Field::Io => &self.pio,
        }
    }
}

impl Default for FieldExprs {
    fn default() -> Self {
        FieldExprs {
            prunq: Self::DEFAULT_PRUNQ.to_string(),
            pcpu: Self::DEFAULT_PCPU.to_string(),
            pmem: Self::DEFAULT_PMEM.to_string(),
            ppag: Self::DEFAULT_PPAG.to_string(),
            pio: Self::DEFAULT_PIO.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_with_and_without_units() {
        let cases = [
            ("12", Duration::from_secs(12)),
            ("17.5", Duration::from_millis(17_500)),
            ("17.5s", Duration::from_millis(17_500)),
            ("2m", Duration::from_secs(120)),
            ("1.5h", Duration::from_secs(5400)),
            ("  3 s ", Duration::from_secs(3)),
            ("0", Duration::ZERO),
            ("0.02", Duration::from_millis(20)),
            ("1e3", Duration::from_secs(1000)),
            ("2.5e-1", Duration::from_millis(250)),
            ("1E1m", Duration::from_secs(600)),
            (".5", Duration::from_millis(500)),
        ];
        for (literal, expected) in cases {
            assert_eq!(parse_duration(literal).unwrap(), expected, "{literal}");
        }
    }

    #[test]
    fn malformed_durations() {
        assert_eq!(parse_duration("  "), Err(DurationError::Empty));
        assert_eq!(
            parse_duration("3d"),
            Err(DurationError::UnknownUnit { unit: "d".to_string(), literal: "3d".to_string() })
        );
        assert!(matches!(parse_duration("1.2.3"), Err(DurationError::InvalidNumber(_))));
        assert!(matches!(parse_duration("m"), Err(DurationError::InvalidNumber(_))));
        assert!(matches!(parse_duration("1e"), Err(DurationError::UnknownUnit { .. })));
        assert!(matches!(parse_duration("-5"), Err(DurationError::OutOfRange(_))));
    }

    #[test]
    fn default_expressions() {
        let exprs = FieldExprs::default();
        let sources: Vec<&str> = Field::ALL.iter().map(|field| exprs.get(*field)).collect();
        assert_eq!(sources, ["prunq", "pcpu", "pmem", "0", "pio"]);
    }
}
