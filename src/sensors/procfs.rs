//! The few Linux `/proc` and `/sys` readings `sysinfo` does not expose.
//!
//! ```text
//! /sys/class/net/<nic>/{operstate,speed}   link speed, for pio
//! /proc/net/{tcp,tcp6,udp,udp6,unix}      socket tables, for nsockets
//! /proc/<pid>/fd                           open descriptors, for xrd.nfds
//! /proc/<pid>/stat                         delayacct_blkio_ticks, for xrd.piowait
//! ```
//!
//! Parsing is kept apart from I/O so the `parse_*` functions can be tested
//! against captured samples.

use crate::error::SampleError;
use std::fs;
use std::io;
use std::path::Path;

pub const PROC: &str = "/proc";
pub const SYS_NET: &str = "/sys/class/net";

/// Kernel clock ticks per second as exposed to user space (`USER_HZ`).
pub const CLOCK_TICKS: f64 = 100.0;

pub fn read(path: impl AsRef<Path>) -> Result<String, SampleError> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|source| SampleError::Io { path: path.to_path_buf(), source })
}

/// Like [`read`], but a missing file is `None` (e.g. `/proc/net/tcp6` without IPv6).
pub fn read_optional(path: impl AsRef<Path>) -> Result<Option<String>, SampleError> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SampleError::Io { path: path.to_path_buf(), source }),
    }
}

/// Entries of a `/proc/net/{tcp,tcp6,udp,udp6,unix}` table, excluding its header.
pub fn parse_socket_count(table: &str) -> usize {
    table.lines().skip(1).filter(|line| !line.trim().is_empty()).count()
}

/// Aggregated block I/O delay (`delayacct_blkio_ticks`) from `/proc/<pid>/stat`.
pub fn parse_stat_blkio_ticks(stat: &str) -> Result<u64, SampleError> {
    // the command name may contain spaces and parentheses; fields restart after the last ')'
    let (_, fields) = stat
        .rsplit_once(')')
        .ok_or_else(|| SampleError::Malformed { what: "/proc/<pid>/stat", detail: stat.trim().to_string() })?;
    // field 42 of proc(5); `state` (field 3) is the first one after the name
    fields.split_whitespace().nth(42 - 3).and_then(|value| value.parse().ok()).ok_or_else(|| SampleError::Malformed {
        what: "/proc/<pid>/stat",
        detail: "no delayacct_blkio_ticks field".to_string(),
    })
}

pub fn blkio_ticks(proc_root: &Path, pid: u32) -> Result<u64, SampleError> {
    parse_stat_blkio_ticks(&read(proc_root.join(pid.to_string()).join("stat"))?)
}

/// Number of entries in `/proc/<pid>/fd`.
pub fn fd_count(proc_root: &Path, pid: u32) -> Result<u64, SampleError> {
    let dir = proc_root.join(pid.to_string()).join("fd");
    let entries = fs::read_dir(&dir).map_err(|source| SampleError::Io { path: dir.clone(), source })?;
    Ok(entries.count() as u64)
}

/// An interface usable for the network sensor: up, with a known speed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nic {
    pub name: String,
    /// Link speed in Mbit/s.
    pub speed: u64,
}

/// Interfaces under `sys_net` that are up and report a positive speed.
pub fn active_nics(sys_net: &Path) -> Result<Vec<Nic>, SampleError> {
    let entries = fs::read_dir(sys_net).map_err(|source| SampleError::Io { path: sys_net.into(), source })?;
    let mut nics = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        let up = fs::read_to_string(dir.join("operstate")).is_ok_and(|state| state.trim() == "up");
        // virtual devices fail to read or report -1
        let speed = fs::read_to_string(dir.join("speed")).ok().and_then(|speed| speed.trim().parse::<i64>().ok());
        if let (true, Some(speed @ 1..)) = (up, speed) {
            nics.push(Nic { name: entry.file_name().to_string_lossy().into_owned(), speed: speed.unsigned_abs() });
        }
    }
    nics.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(nics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_tables_skip_the_header() {
        let table = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 00000000:0016 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 20537 1
   1: 0100007F:0277 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 22611 1
";
        assert_eq!(parse_socket_count(table), 2);
        assert_eq!(parse_socket_count(""), 0);
    }

    #[test]
    fn blkio_ticks_follow_the_command_name() {
        let mut fields: Vec<String> = (3..=52).map(|n| n.to_string()).collect();
        fields[42 - 3] = "777".to_string();
        let stat = format!("1234 (xrootd (main)) {}", fields.join(" "));
        assert_eq!(parse_stat_blkio_ticks(&stat).unwrap(), 777);
        assert!(parse_stat_blkio_ticks("1234 (xrootd) S 1").is_err());
        assert!(parse_stat_blkio_ticks("garbage").is_err());
    }

    #[test]
    fn nics_need_to_be_up_with_a_speed() {
        let sys = tempfile::tempdir().unwrap();
        let links = [("eth0", "up", "1000"), ("eth1", "down", "1000"), ("lo", "unknown", ""), ("veth", "up", "-1")];
        for (name, state, speed) in links {
            let dir = sys.path().join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("operstate"), format!("{state}\n")).unwrap();
            if !speed.is_empty() {
                fs::write(dir.join("speed"), format!("{speed}\n")).unwrap();
            }
        }
        assert_eq!(active_nics(sys.path()).unwrap(), [Nic { name: "eth0".to_string(), speed: 1000 }]);
    }

    #[test]
    fn fds_are_counted_per_process() {
        let proc = tempfile::tempdir().unwrap();
        let fd = proc.path().join("42").join("fd");
        fs::create_dir_all(&fd).unwrap();
        for n in 0..3 {
            fs::write(fd.join(n.to_string()), "").unwrap();
        }
        assert_eq!(fd_count(proc.path(), 42).unwrap(), 3);
        assert!(matches!(fd_count(proc.path(), 43), Err(SampleError::Io { .. })));
    }
}
