//! Sensors for the `xrootd` server processes running on this host.
//!
//! Finding processes by name means walking the whole process table, so the
//! pids of `xrootd` processes are cached by a [`Tracker`] shared between the
//! sensors. The cache is refreshed when it is empty, when any tracked process
//! has exited, or after [`RESCAN_PERIOD`].

use super::procfs::{self, CLOCK_TICKS};
use super::system::sub_interval;
use crate::error::{RegistrationError, SampleError};
use crate::registry::{Registry, Signature};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

/// Upper bound on how long a list of xrootd processes is trusted.
pub const RESCAN_PERIOD: Duration = Duration::from_secs(30);

const PROCESS_NAME: &str = "xrootd";

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing().with_tasks()
}

/// Cached pids of processes with a given name.
pub struct Tracker {
    name: String,
    system: System,
    pids: Vec<Pid>,
    next_scan: Instant,
}

impl Tracker {
    pub fn new(name: impl Into<String>) -> Self {
        Tracker { name: name.into(), system: System::new(), pids: Vec::new(), next_scan: Instant::now() }
    }

    /// Current matching processes, rescanning if the cache is stale.
    pub fn pids(&mut self) -> &[Pid] {
        if !self.pids.is_empty() {
            // drops tracked processes that have exited
            self.system.refresh_processes_specifics(ProcessesToUpdate::Some(&self.pids), true, refresh_kind());
        }
        let alive = !self.pids.is_empty() && self.pids.iter().all(|pid| self.system.process(*pid).is_some());
        if !alive || Instant::now() >= self.next_scan {
            self.scan();
        }
        &self.pids
    }

    fn scan(&mut self) {
        self.system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());
        let mut pids: Vec<Pid> = self
            .system
            .processes_by_exact_name(OsStr::new(&self.name))
            // threads inherit the name of their process
            .filter(|process| process.thread_kind().is_none())
            .map(|process| process.pid())
            .collect();
        pids.sort_unstable();
        self.pids = pids;
        self.next_scan = Instant::now() + RESCAN_PERIOD;
        debug!(name = %self.name, count = self.pids.len(), "rescanned processes");
    }

    pub fn num_threads(&mut self) -> u64 {
        let pids = self.pids().to_vec();
        pids.iter()
            .filter_map(|pid| self.system.process(*pid))
            .map(|process| {
                let tasks = process.tasks().map_or(0, |tasks| tasks.len());
                // the main thread is not always listed among the tasks
                let main = process.tasks().is_none_or(|tasks| !tasks.contains(&process.pid()));
                (tasks + usize::from(main)) as u64
            })
            .sum()
    }

    pub fn num_fds(&mut self, proc_root: &Path) -> Result<u64, SampleError> {
        let pids = self.pids().to_vec();
        pids.iter().map(|pid| procfs::fd_count(proc_root, pid.as_u32())).sum()
    }
}

fn blkio_ticks(proc_root: &Path, pids: &[Pid]) -> Result<Vec<u64>, SampleError> {
    pids.iter().map(|pid| procfs::blkio_ticks(proc_root, pid.as_u32())).collect()
}

/// Largest share of `window` any single process spent waiting on block I/O,
/// given `delayacct_blkio_ticks` before and after.
fn io_wait(before: &[u64], after: &[u64], window: Duration) -> f64 {
    let waited = before.iter().zip(after).map(|(before, after)| after.saturating_sub(*before)).max().unwrap_or(0);
    100.0 * waited as f64 / CLOCK_TICKS / window.as_secs_f64()
}

fn io_wait_percent(tracker: &Mutex<Tracker>, proc_root: &Path, window: Duration) -> Result<f64, SampleError> {
    let pids = tracker.lock().unwrap_or_else(PoisonError::into_inner).pids().to_vec();
    if pids.is_empty() {
        return Ok(0.0);
    }
    let before = blkio_ticks(proc_root, &pids)?;
    thread::sleep(window);
    let after = blkio_ticks(proc_root, &pids)?;
    Ok(io_wait(&before, &after, window))
}

pub fn register(registry: &mut Registry) -> Result<(), RegistrationError> {
    let tracker = Arc::new(Mutex::new(Tracker::new(PROCESS_NAME)));
    let proc_root = Path::new(procfs::PROC);

    let shared = Arc::clone(&tracker);
    registry.register_callable(
        Signature::new("xrd.piowait").interval().doc("Percentage of time xrootd processes are waiting for disk I/O"),
        move |call| io_wait_percent(&shared, proc_root, sub_interval(call.interval())),
    )?;
    let shared = Arc::clone(&tracker);
    registry.register_callable(
        Signature::new("xrd.nfds").doc("Number of open file descriptors of all xrootd processes"),
        move |_| Ok(shared.lock().unwrap_or_else(PoisonError::into_inner).num_fds(proc_root)? as f64),
    )?;
    registry.register_callable(
        Signature::new("xrd.nthreads").doc("Number of threads of all xrootd processes"),
        move |_| Ok(tracker.lock().unwrap_or_else(PoisonError::into_inner).num_threads() as f64),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_wait_takes_the_busiest_process() {
        // 50 ticks of a 100 Hz clock in one second
        assert_eq!(io_wait(&[10, 200], &[20, 250], Duration::from_secs(1)), 50.0);
        assert_eq!(io_wait(&[], &[], Duration::from_secs(1)), 0.0);
        // counters never run backwards, but a recycled pid could
        assert_eq!(io_wait(&[90], &[10], Duration::from_secs(1)), 0.0);
    }

    #[test]
    fn no_matching_process_means_zero() {
        let proc = tempfile::tempdir().unwrap();
        let tracker = Mutex::new(Tracker::new("no such process name"));
        assert!(tracker.lock().unwrap().pids().is_empty());
        assert_eq!(tracker.lock().unwrap().num_threads(), 0);
        assert_eq!(tracker.lock().unwrap().num_fds(proc.path()).unwrap(), 0);
        assert_eq!(io_wait_percent(&tracker, proc.path(), Duration::from_millis(1)).unwrap(), 0.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn tracks_the_running_test_process() {
        let me = sysinfo::get_current_pid().unwrap();
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[me]), true);
        let name = system.process(me).unwrap().name().to_string_lossy().into_owned();

        let mut tracker = Tracker::new(name);
        assert!(tracker.pids().contains(&me));
        // the test harness runs tests on threads of their own
        assert!(tracker.num_threads() >= 1);
        assert!(tracker.num_fds(Path::new(procfs::PROC)).unwrap() >= 1);
        // a cached scan survives as long as every tracked process lives
        let next_scan = tracker.next_scan;
        tracker.pids();
        assert_eq!(tracker.next_scan, next_scan);
    }
}
