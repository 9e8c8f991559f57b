//! Built-in sensors, transforms and literal domains.
//!
//! Everything here is registered through the same public interface a third
//! party would use (`Registry::register_domain` and
//! `Registry::register_callable`); the engine has no special knowledge of
//! any of it.
//!
//! ```text
//! domains     CPU, NET
//! system      prunq pcpu pmem pio nloadq loadq ncores pswap nsockets
//! xrootd      xrd.piowait xrd.nfds xrd.nthreads
//! transform   max min
//! ```
//!
//! Host metrics and process discovery go through `sysinfo`; the remaining
//! readings come from Linux `/proc` and `/sys`. Rate-like sensors (`pcpu`,
//! `pio`, `xrd.piowait`) block for a short window of `min(interval / 4, 1s)`.

#[path = "sensors/procfs.rs"]
mod procfs;
#[path = "sensors/system.rs"]
mod system;
#[path = "sensors/transform.rs"]
mod transform;
#[path = "sensors/xrootd.rs"]
mod xrootd;

use crate::error::RegistrationError;
use crate::registry::Registry;

pub use system::{MAX_SUB_INTERVAL, sub_interval};
pub use xrootd::RESCAN_PERIOD;

/// Literals of the `CPU` domain, for `ncores`.
pub const CPU_KINDS: [&str; 2] = ["all", "physical"];

/// Literals of the `NET` domain, for `nsockets`.
pub const NET_KINDS: [&str; 11] =
    ["inet", "inet4", "inet6", "tcp", "tcp4", "tcp6", "udp", "udp4", "udp6", "unix", "all"];

/// Register every built-in domain, sensor and transform, domains first.
pub fn register_builtins(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_domain("CPU", CPU_KINDS)?;
    registry.register_domain("NET", NET_KINDS)?;
    system::register(registry)?;
    xrootd::register(registry)?;
    transform::register(registry)?;
    Ok(())
}
