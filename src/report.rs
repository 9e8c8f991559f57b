//! The reporting loop.
//!
//! Every tick samples the five fields, clamps them to integer percentages and
//! writes one line. An optional ramp-up phase at start-up blends the reported
//! values from 100 (fully loaded) down to the measured values, so a freshly
//! started server is not flooded with work:
//!
//! ```text
//!  reported
//!  100 ┤━━━━━╮
//!      │      ╲___          RampUp: round(clamp(raw)·w + 100·(1-w))
//!      │          ╲___      w = min(elapsed / rampup, 1)
//!  raw ┤              ╲━━━━━━━━━━━━━━━━  SteadyState: clamp(raw)
//!      └──────────────┴─────────────────> time
//!                   rampup
//! ```
//!
//! Ticks are paced to the configured interval: the time spent sampling is
//! subtracted from the following pause, which never drops below
//! [`MIN_PAUSE`]. The pause doubles as the point where shutdown is observed.

use crate::config::ReportConfig;
use crate::engine::Sampler;
use crate::error::ReportError;
use std::fmt;
use std::io::Write;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{info, trace};

/// Ramp-up is only performed if it lasts longer than this.
pub const RAMPUP_THRESHOLD: Duration = Duration::from_secs(1);

/// Shortest pause between two ticks, however long sampling took.
pub const MIN_PAUSE: Duration = Duration::from_millis(100);

/// One of the five reported values, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Runq,
    Cpu,
    Mem,
    Pag,
    Io,
}

impl Field {
    pub const ALL: [Field; 5] = [Field::Runq, Field::Cpu, Field::Mem, Field::Pag, Field::Io];

    /// Name of the command line option configuring this field.
    pub fn option_name(self) -> &'static str {
        match self {
            Field::Runq => "prunq",
            Field::Cpu => "pcpu",
            Field::Mem => "pmem",
            Field::Pag => "ppag",
            Field::Io => "pio",
        }
    }

    /// Name of this field's weight in a schedule directive.
    pub fn sched_name(self) -> &'static str {
        match self {
            Field::Runq => "runq",
            Field::Cpu => "cpu",
            Field::Mem => "mem",
            Field::Pag => "pag",
            Field::Io => "io",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Field::Runq => "system load",
            Field::Cpu => "cpu utilization",
            Field::Mem => "memory utilization",
            Field::Pag => "paging load",
            Field::Io => "network utilization",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.option_name())
    }
}

/// Restrict a percentage to an integer in `0..=100`, truncating.
///
/// NaN has no meaningful load and reports as 0.
pub fn clamp_percentage(value: f64) -> u8 {
    if value.is_nan() { 0 } else { value.clamp(0.0, 100.0) as u8 }
}

/// Progress of the ramp-up, from 0.0 at start to 1.0 once `rampup` has passed.
pub fn rampup_weight(elapsed: Duration, rampup: Duration) -> f64 {
    if rampup.is_zero() { 1.0 } else { (elapsed.as_secs_f64() / rampup.as_secs_f64()).min(1.0) }
}

/// Time to wait after a tick that took `elapsed`, keeping the `interval` cadence.
pub fn pause(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(MIN_PAUSE)
}

/// Blend a clamped value towards 100 by `1 - weight`.
pub fn blend(value: u8, weight: f64) -> u8 {
    (f64::from(value) * weight + 100.0 * (1.0 - weight)).round().clamp(0.0, 100.0) as u8
}

/// The compiled expression of every field.
#[derive(Debug)]
pub struct FieldSamplers {
    samplers: [Sampler; 5],
}

impl FieldSamplers {
    /// Samplers in `Field::ALL` order.
    pub fn new(samplers: [Sampler; 5]) -> Self {
        FieldSamplers { samplers }
    }

    pub fn get(&self, field: Field) -> &Sampler {
        &self.samplers[field as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &Sampler)> {
        Field::ALL.into_iter().zip(&self.samplers)
    }

    /// Sample every field once, clamped.
    pub fn sample(&self) -> Result<[u8; 5], ReportError> {
        let mut values = [0; 5];
        for ((field, sampler), slot) in self.iter().zip(&mut values) {
            let raw = sampler.sample().map_err(|source| ReportError::Sample { field, source })?;
            *slot = clamp_percentage(raw);
        }
        Ok(values)
    }
}

/// Create a connected shutdown trigger and listener.
pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = mpsc::channel();
    (ShutdownHandle { tx }, Shutdown { rx })
}

/// Asks a running [`Reporter`] to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<()>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        // the reporter may already have stopped on its own
        let _ = self.tx.send(());
    }
}

/// Listening end of [`shutdown_channel`]. Dropping every handle also stops the loop.
#[derive(Debug)]
pub struct Shutdown {
    rx: mpsc::Receiver<()>,
}

impl Shutdown {
    /// Pause for `timeout`; true if shutdown was requested meanwhile.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => true,
            Err(mpsc::RecvTimeoutError::Timeout) => false,
        }
    }

    /// Check for a pending request without blocking.
    pub fn requested(&self) -> bool {
        match self.rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => true,
            Err(mpsc::TryRecvError::Empty) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    RampUp,
    SteadyState,
}

/// Drives the samplers and writes reports.
///
/// `out` receives one line of five percentages per tick. `side` receives the
/// weighted score, and only if the configuration has a schedule.
pub struct Reporter<O, E> {
    samplers: FieldSamplers,
    config: ReportConfig,
    out: O,
    side: E,
}

impl<O: Write, E: Write> Reporter<O, E> {
    pub fn new(samplers: FieldSamplers, config: ReportConfig, out: O, side: E) -> Self {
        Reporter { samplers, config, out, side }
    }

    /// Report until shutdown or the configured tick limit; returns the number of reports.
    pub fn run(&mut self, shutdown: &Shutdown) -> Result<u64, ReportError> {
        let started = Instant::now();
        let mut phase = if self.config.rampup > RAMPUP_THRESHOLD { Phase::RampUp } else { Phase::SteadyState };
        info!(interval = ?self.config.interval, rampup = ?self.config.rampup, ?phase, "reporting started");

        let mut ticks = 0u64;
        loop {
            if self.config.ticks.is_some_and(|limit| ticks >= limit) {
                info!(ticks, "tick limit reached");
                break;
            }
            if shutdown.requested() {
                info!(ticks, "shutdown requested");
                break;
            }

            let tick_started = Instant::now();
            let mut values = self.samplers.sample()?;
            if phase == Phase::RampUp {
                let weight = rampup_weight(started.elapsed(), self.config.rampup);
                values = values.map(|value| blend(value, weight));
                if weight >= 1.0 {
                    info!(ticks, "ramp-up complete");
                    phase = Phase::SteadyState;
                }
            }
            self.emit(values)?;
            ticks += 1;
            trace!(tick = ticks, ?values, elapsed = ?tick_started.elapsed(), "reported");

            if self.config.ticks.is_some_and(|limit| ticks >= limit) {
                continue;
            }
            if shutdown.wait(pause(self.config.interval, tick_started.elapsed())) {
                info!(ticks, "shutdown requested");
                break;
            }
        }
        Ok(ticks)
    }

    fn emit(&mut self, values: [u8; 5]) -> Result<(), ReportError> {
        let [runq, cpu, mem, pag, io] = values;
        writeln!(self.out, "{runq} {cpu} {mem} {pag} {io}")?;
        self.out.flush()?;
        if let Some(schedule) = &self.config.schedule {
            writeln!(self.side, "{}", schedule.weigh(values))?;
            self.side.flush()?;
        }
        Ok(())
    }

    /// Give back the writers, e.g. to inspect what was reported.
    pub fn into_writers(self) -> (O, E) {
        (self.out, self.side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SampleError;
    use crate::registry::{Registry, Signature};
    use crate::schedule::ScheduleWeight;

    fn samplers(registry: &Registry, exprs: [&str; 5]) -> FieldSamplers {
        FieldSamplers::new(exprs.map(|text| registry.compile_str(text, Duration::from_secs(1)).unwrap()))
    }

    fn config(ticks: u64) -> ReportConfig {
        ReportConfig { interval: Duration::from_millis(1), ticks: Some(ticks), ..ReportConfig::default() }
    }

    fn run(samplers: FieldSamplers, config: ReportConfig) -> (Result<u64, ReportError>, String, String) {
        let (_handle, shutdown) = shutdown_channel();
        let mut reporter = Reporter::new(samplers, config, Vec::new(), Vec::new());
        let result = reporter.run(&shutdown);
        let (out, side) = reporter.into_writers();
        (result, String::from_utf8(out).unwrap(), String::from_utf8(side).unwrap())
    }

    #[test]
    fn clamping() {
        assert_eq!(clamp_percentage(-5.0), 0);
        assert_eq!(clamp_percentage(250.0), 100);
        assert_eq!(clamp_percentage(42.9), 42);
        assert_eq!(clamp_percentage(f64::NAN), 0);
        assert_eq!(clamp_percentage(f64::INFINITY), 100);
        assert_eq!(clamp_percentage(f64::NEG_INFINITY), 0);
    }

    #[test]
    fn rampup_blends_from_full_load_to_measurement() {
        let rampup = Duration::from_secs(10);
        assert_eq!(blend(20, rampup_weight(Duration::ZERO, rampup)), 100);
        assert_eq!(blend(20, rampup_weight(Duration::from_secs(5), rampup)), 60);
        assert_eq!(blend(20, rampup_weight(rampup, rampup)), 20);
        assert_eq!(blend(20, rampup_weight(Duration::from_secs(30), rampup)), 20);
    }

    #[test]
    fn pause_keeps_the_cadence_with_a_floor() {
        let second = Duration::from_secs(1);
        assert_eq!(pause(second, Duration::from_millis(300)), Duration::from_millis(700));
        assert_eq!(pause(second, Duration::ZERO), second);
        assert_eq!(pause(second, Duration::from_millis(950)), MIN_PAUSE);
        assert_eq!(pause(second, Duration::from_secs(5)), MIN_PAUSE);
        assert_eq!(pause(Duration::from_millis(20), Duration::ZERO), MIN_PAUSE);
    }

    #[test]
    fn rampup_ends_in_the_measured_values() {
        let registry = Registry::new();
        let interval = Duration::from_millis(400);
        let rampup = RAMPUP_THRESHOLD + Duration::from_millis(100);
        let config = ReportConfig { interval, rampup, ..config(5) };

        let started = Instant::now();
        let (result, out, _) = run(samplers(&registry, ["0", "10", "20", "30", "40"]), config);
        assert_eq!(result.unwrap(), 5);
        assert!(started.elapsed() >= interval * 4);

        let lines: Vec<Vec<u8>> =
            out.lines().map(|line| line.split(' ').map(|value| value.parse().unwrap()).collect()).collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], [100; 5]);
        // ticks at 1.2 s and later are past the ramp-up
        assert_eq!(lines[3], [0, 10, 20, 30, 40]);
        assert_eq!(lines[4], [0, 10, 20, 30, 40]);
        for pair in lines.windows(2) {
            assert!(pair[0].iter().zip(&pair[1]).all(|(earlier, later)| earlier >= later), "{pair:?}");
        }
    }

    #[test]
    fn steady_state_reports_every_field_in_order() {
        let registry = Registry::new();
        let (result, out, side) = run(samplers(&registry, ["0", "1", "2", "3", "4"]), config(3));
        assert_eq!(result.unwrap(), 3);
        assert_eq!(out, "0 1 2 3 4\n".repeat(3));
        assert!(side.is_empty());
    }

    #[test]
    fn values_are_clamped_before_reporting() {
        let registry = Registry::new();
        let (_, out, _) = run(samplers(&registry, ["-1", "100.5", "0/0", "1/0", "99.99"]), config(1));
        assert_eq!(out, "0 100 0 100 99\n");
    }

    #[test]
    fn rampup_starts_at_full_load() {
        let registry = Registry::new();
        let config = ReportConfig { rampup: Duration::from_secs(3600), ..config(2) };
        let (_, out, _) = run(samplers(&registry, ["0", "10", "20", "30", "40"]), config);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, ["100 100 100 100 100", "100 100 100 100 100"]);
    }

    #[test]
    fn short_rampup_is_skipped() {
        let registry = Registry::new();
        let config = ReportConfig { rampup: Duration::from_secs(1), ..config(1) };
        let (_, out, _) = run(samplers(&registry, ["0", "10", "20", "30", "40"]), config);
        assert_eq!(out, "0 10 20 30 40\n");
    }

    #[test]
    fn schedule_scores_go_to_the_side_channel() {
        let registry = Registry::new();
        let schedule = ScheduleWeight::from_directive("cpu 100 maxload 40").unwrap();
        let config = ReportConfig { schedule: Some(schedule), ..config(2) };
        let (_, out, side) = run(samplers(&registry, ["0", "50", "0", "0", "0"]), config);
        assert_eq!(out, "0 50 0 0 0\n".repeat(2));
        assert_eq!(side, "50!\n".repeat(2));
    }

    #[test]
    fn failing_sensor_stops_the_loop_naming_the_field() {
        let mut registry = Registry::new();
        registry
            .register_callable(Signature::new("broken"), |_| Err(SampleError::Failed("gone".to_string())))
            .unwrap();
        let (result, out, _) = run(samplers(&registry, ["0", "0", "broken", "0", "0"]), config(5));
        assert!(matches!(result, Err(ReportError::Sample { field: Field::Mem, .. })));
        assert!(out.is_empty());
    }

    #[test]
    fn shutdown_ends_the_loop_cleanly() {
        let registry = Registry::new();
        let (handle, shutdown) = shutdown_channel();
        let config = ReportConfig { interval: Duration::from_secs(3600), ..ReportConfig::default() };
        let samplers = samplers(&registry, ["1", "2", "3", "4", "5"]);
        let mut reporter = Reporter::new(samplers, config, Vec::new(), Vec::new());

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.trigger();
        });
        let started = Instant::now();
        assert_eq!(reporter.run(&shutdown).unwrap(), 1);
        assert!(started.elapsed() < Duration::from_secs(60));
        stopper.join().unwrap();
    }
}
