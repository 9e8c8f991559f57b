//! Whole-system sensors: load, cpu, memory, swap, network and sockets.
//!
//! Host metrics come from `sysinfo`. Link speeds and socket tables are not
//! exposed there and are read from `/sys` and `/proc` directly.

use super::procfs::{self, Nic};
use crate::error::{RegistrationError, SampleError};
use crate::registry::{Call, Registry, Signature};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use sysinfo::{LoadAvg, Networks, System};

/// Longest time a sensor blocks to measure a rate.
pub const MAX_SUB_INTERVAL: Duration = Duration::from_secs(1);

/// Blocking measurement window for a sampling `interval`: a quarter of it, at most a second.
pub fn sub_interval(interval: Option<Duration>) -> Duration {
    interval.map_or(MAX_SUB_INTERVAL, |interval| (interval / 4).min(MAX_SUB_INTERVAL))
}

/// The load average that best matches the sampling interval.
fn pick_load(load: &LoadAvg, interval: Option<Duration>) -> f64 {
    let seconds = interval.map_or(0.0, |interval| interval.as_secs_f64());
    if seconds <= 60.0 {
        load.one
    } else if seconds <= 300.0 {
        load.five
    } else {
        load.fifteen
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 { 0.0 } else { 100.0 * part as f64 / whole as f64 }
}

type SharedSystem = Arc<Mutex<System>>;

fn lock(system: &SharedSystem) -> MutexGuard<'_, System> {
    system.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn load_average(call: &Call<'_>) -> Result<f64, SampleError> {
    Ok(pick_load(&System::load_average(), call.interval()))
}

fn logical_cpus(system: &mut System) -> Result<usize, SampleError> {
    system.refresh_cpu_usage();
    match system.cpus().len() {
        0 => Err(SampleError::Failed("no cpus reported".to_string())),
        count => Ok(count),
    }
}

fn load_percent(system: &SharedSystem, call: &Call<'_>) -> Result<f64, SampleError> {
    let cores = logical_cpus(&mut lock(system))?;
    Ok(100.0 * load_average(call)? / cores as f64)
}

fn cpu_percent(system: &SharedSystem, call: &Call<'_>) -> Result<f64, SampleError> {
    let mut system = lock(system);
    system.refresh_cpu_usage();
    thread::sleep(sub_interval(call.interval()));
    system.refresh_cpu_usage();
    Ok(f64::from(system.global_cpu_usage()))
}

fn memory_percent(system: &SharedSystem) -> f64 {
    let mut system = lock(system);
    system.refresh_memory();
    percent(system.used_memory(), system.total_memory())
}

fn swap_percent(system: &SharedSystem) -> f64 {
    let mut system = lock(system);
    system.refresh_memory();
    percent(system.used_swap(), system.total_swap())
}

fn core_count(system: &SharedSystem, call: &Call<'_>) -> Result<f64, SampleError> {
    let logical = logical_cpus(&mut lock(system))?;
    let count = match call.tag(0)? {
        "physical" => System::physical_core_count().unwrap_or(logical),
        _ => logical,
    };
    Ok(count as f64)
}

fn transmitted() -> HashMap<String, u64> {
    let networks = Networks::new_with_refreshed_list();
    networks.list().iter().map(|(name, data)| (name.clone(), data.total_transmitted())).collect()
}

/// Highest share of any interface's send capacity used during `window`.
fn link_utilisation(
    nics: &[Nic],
    before: &HashMap<String, u64>,
    after: &HashMap<String, u64>,
    window: Duration,
) -> f64 {
    let utilisation = nics.iter().filter_map(|nic| {
        let sent = after.get(&nic.name)?.saturating_sub(*before.get(&nic.name)?);
        // Mbit/s to bytes per window
        let capacity = nic.speed as f64 * 125_000.0 * window.as_secs_f64();
        Some(sent as f64 / capacity)
    });
    100.0 * utilisation.fold(0.0, f64::max)
}

fn network_percent(call: &Call<'_>) -> Result<f64, SampleError> {
    let window = sub_interval(call.interval());
    let nics = procfs::active_nics(Path::new(procfs::SYS_NET))?;
    if nics.is_empty() {
        return Ok(0.0);
    }
    let before = transmitted();
    thread::sleep(window);
    Ok(link_utilisation(&nics, &before, &transmitted(), window))
}

/// The socket tables that make up each `NET` literal.
fn socket_tables(kind: &str) -> &'static [&'static str] {
    match kind {
        "tcp" => &["tcp", "tcp6"],
        "tcp4" => &["tcp"],
        "tcp6" => &["tcp6"],
        "udp" => &["udp", "udp6"],
        "udp4" => &["udp"],
        "udp6" => &["udp6"],
        "inet" => &["tcp", "tcp6", "udp", "udp6"],
        "inet4" => &["tcp", "udp"],
        "inet6" => &["tcp6", "udp6"],
        "unix" => &["unix"],
        _ => &["tcp", "tcp6", "udp", "udp6", "unix"],
    }
}

fn socket_count(call: &Call<'_>) -> Result<f64, SampleError> {
    let mut count = 0;
    for table in socket_tables(call.tag(0)?) {
        if let Some(text) = procfs::read_optional(Path::new(procfs::PROC).join("net").join(table))? {
            count += procfs::parse_socket_count(&text);
        }
    }
    Ok(count as f64)
}

pub fn register(registry: &mut Registry) -> Result<(), RegistrationError> {
    let system: SharedSystem = Arc::new(Mutex::new(System::new()));

    let shared = Arc::clone(&system);
    registry.register_callable(
        Signature::new("prunq").interval().doc("Percentage of system load per core, equivalent to 100*nloadq/ncores"),
        move |call| load_percent(&shared, call),
    )?;
    let shared = Arc::clone(&system);
    registry.register_callable(Signature::new("pcpu").interval().doc("Percentage of cpu utilisation"), move |call| {
        cpu_percent(&shared, call)
    })?;
    let shared = Arc::clone(&system);
    registry.register_callable(Signature::new("pmem").interval().doc("Percentage of memory utilisation"), move |_| {
        Ok(memory_percent(&shared))
    })?;
    registry.register_callable(
        Signature::new("pio").interval().doc("Percentage of network I/O utilisation"),
        network_percent,
    )?;
    registry.register_callable(
        Signature::new("nloadq").interval().doc("Absolute system load, the number of active processes"),
        load_average,
    )?;
    registry.register_callable(
        Signature::new("loadq").interval().doc("Deprecated alias of nloadq").deprecated("nloadq"),
        load_average,
    )?;
    let shared = Arc::clone(&system);
    registry.register_callable(
        Signature::new("ncores")
            .domain_or("kind", "CPU", "all")
            .doc("Number of CPU cores; kind is all (including logical cores, the default) or physical"),
        move |call| core_count(&shared, call),
    )?;
    registry.register_callable(Signature::new("pswap").interval().doc("Percentage of swap utilisation"), move |_| {
        Ok(swap_percent(&system))
    })?;
    registry.register_callable(
        Signature::new("nsockets")
            .domain_or("kind", "NET", "tcp")
            .doc("Number of open sockets across all processes of a kind, by default tcp"),
        socket_count,
    )?;
    Ok(())
}
