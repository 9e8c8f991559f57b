//! Expression-configured load sensor for the XRootD `cms.perf` directive.
//!
//! Each of the five reported fields (system load, cpu, memory, paging and
//! network) is computed by a small expression over named sensors, transforms
//! and literals:
//!
//! ```text
//! --prunq '100.0*nloadq/ncores(physical)'   --pio 'max(pio, xrd.piowait)'
//! ```
//!
//! What an expression may reference is defined by a [`Registry`]: every
//! registered callable and domain extends the grammar the parser accepts.
//!
//! ```
//! use std::time::Duration;
//! use cms_perf::{Registry, Signature};
//!
//! let mut registry = Registry::new();
//! registry.register_domain("UNIT", ["one", "ten"]).unwrap();
//! registry
//!     .register_callable(Signature::new("scale").domain_or("unit", "UNIT", "one"), |call| {
//!         Ok(if call.tag(0)? == "ten" { 10.0 } else { 1.0 })
//!     })
//!     .unwrap();
//!
//! let sampler = registry.compile_str("2 * scale(ten) + scale", Duration::from_secs(60)).unwrap();
//! assert_eq!(sampler.sample().unwrap(), 21.0);
//! ```

#[macro_use]
mod macros;
mod api;
mod config;
mod engine;
mod error;
mod expr;
mod registry;
mod report;
mod schedule;
pub mod sensors;

pub use api::{compile_fields, reporter};
pub use config::{FieldExprs, ReportConfig, parse_duration};
pub use engine::{ArgRule, CallForms, CallRule, DomainRule, Grammar, Sampler, compile, parse};
pub use error::{
    BindError, ConfigError, DirectiveError, DurationError, FieldError, RegistrationError, ReportError, SampleError,
    SyntaxError,
};
pub use expr::{BinOp, Expr};
pub use registry::{
    Call, CallFn, CallableEntry, DomainEntry, Param, ParamDefault, ParamKind, Registry, Signature, Value,
};
pub use report::{
    Field, FieldSamplers, MIN_PAUSE, RAMPUP_THRESHOLD, Reporter, Shutdown, ShutdownHandle, blend, clamp_percentage,
    pause, rampup_weight, shutdown_channel,
};
pub use schedule::{Score, ScheduleWeight};
