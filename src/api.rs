use crate::config::{FieldExprs, ReportConfig};
use crate::error::FieldError;
use crate::registry::Registry;
use crate::report::{Field, FieldSamplers, Reporter};
use std::io::Write;
use std::time::Duration;
use tracing::debug;

/// Parse and compile the expression of every field.
///
/// Fails on the first invalid expression, in `Field::ALL` order, naming the
/// field it was configured for.
///
/// ```
/// use std::time::Duration;
/// use cms_perf::{FieldExprs, Registry, compile_fields};
///
/// let exprs = FieldExprs {
///     prunq: "1".into(), pcpu: "2 * 3".into(), pmem: "4".into(), ppag: "0".into(), pio: "5".into(),
/// };
/// let samplers = compile_fields(&Registry::new(), &exprs, Duration::from_secs(60)).unwrap();
/// assert!(samplers.iter().all(|(_, sampler)| sampler.is_constant()));
/// ```
pub fn compile_fields(
    registry: &Registry,
    exprs: &FieldExprs,
    interval: Duration,
) -> Result<FieldSamplers, FieldError> {
    let [runq, cpu, mem, pag, io] = Field::ALL.map(|field| {
        registry.compile_str(exprs.get(field), interval).map_err(|source| FieldError { field, source })
    });
    let samplers = [runq?, cpu?, mem?, pag?, io?];
    for (field, sampler) in Field::ALL.iter().zip(&samplers) {
        debug!(%field, expr = sampler.source(), constant = sampler.is_constant(), "field compiled");
    }
    Ok(FieldSamplers::new(samplers))
}

/// Compile every field and set up a [`Reporter`] writing to `out` and `side`.
pub fn reporter<O: Write, E: Write>(
    registry: &Registry,
    exprs: &FieldExprs,
    config: ReportConfig,
    out: O,
    side: E,
) -> Result<Reporter<O, E>, FieldError> {
    let samplers = compile_fields(registry, exprs, config.interval)?;
    Ok(Reporter::new(samplers, config, out, side))
}
