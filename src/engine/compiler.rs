//! Bind a parsed [`Expr`] to registry entries and build a [`Sampler`].
//!
//! Every check that does not depend on live measurements happens here: names
//! resolve, argument counts match, literals belong to their domain and sit in
//! domain positions only. What is left for `Sampler::sample` is arithmetic
//! and calling sensors.
//!
//! The result is a tree of boxed closures. Sub-trees without any call are
//! folded to constants while binding; calls are never folded, since even a
//! call with constant arguments may read the system.

use crate::error::{BindError, SampleError};
use crate::expr::Expr;
use crate::registry::{Call, CallableEntry, ParamKind, Registry, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

type Node = Box<dyn Fn() -> Result<f64, SampleError> + Send + Sync>;

enum Bound {
    Const(f64),
    Dynamic(Node),
}

/// A bound argument of a call.
enum Arg {
    /// Literal, default or folded constant; resolved once.
    Fixed(Value),
    /// Re-evaluated on every invocation.
    Dynamic(Node),
}

/// A compiled expression: a zero-argument producer of one number.
pub struct Sampler {
    source: String,
    bound: Bound,
}

impl Sampler {
    /// Evaluate the expression, calling every sensor it references once.
    pub fn sample(&self) -> Result<f64, SampleError> {
        match &self.bound {
            Bound::Const(value) => Ok(*value),
            Bound::Dynamic(node) => node(),
        }
    }

    /// The expression this sampler was compiled from, fully parenthesized.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if the expression references no callable at all.
    pub fn is_constant(&self) -> bool {
        matches!(self.bound, Bound::Const(_))
    }
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler").field("source", &self.source).field("constant", &self.is_constant()).finish()
    }
}

/// Compile `expr` against `registry`, fixing the sampling `interval` for
/// every interval-dependent sensor it references.
pub fn compile(registry: &Registry, expr: &Expr, interval: Duration) -> Result<Sampler, BindError> {
    let binder = Binder { registry, interval };
    let bound = binder.bind(expr)?;
    Ok(Sampler { source: expr.to_string(), bound })
}

struct Binder<'r> {
    registry: &'r Registry,
    interval: Duration,
}

impl Binder<'_> {
    fn bind(&self, expr: &Expr) -> Result<Bound, BindError> {
        match expr {
            Expr::Number(value) => Ok(Bound::Const(*value)),
            Expr::Tag { domain, tag } => Err(BindError::UnexpectedTag { domain: domain.clone(), tag: tag.clone() }),
            Expr::Reference(name) => {
                let entry = self.callable(name)?;
                let args = entry.bare_args().ok_or_else(|| BindError::MissingArguments(name.clone()))?;
                Ok(self.invoke(entry, args.iter().cloned().map(Arg::Fixed).collect()))
            }
            Expr::Call { name, args } => {
                let entry = self.callable(name)?;
                let args = self.bind_args(entry, args)?;
                Ok(self.invoke(entry, args))
            }
            Expr::Binary { op, lhs, rhs } => {
                let op = *op;
                match (self.bind(lhs)?, self.bind(rhs)?) {
                    (Bound::Const(lhs), Bound::Const(rhs)) => Ok(Bound::Const(op.apply(lhs, rhs))),
                    (lhs, rhs) => {
                        let (lhs, rhs) = (into_node(lhs), into_node(rhs));
                        Ok(Bound::Dynamic(Box::new(move || -> Result<f64, SampleError> {
                            Ok(op.apply(lhs()?, rhs()?))
                        })))
                    }
                }
            }
        }
    }

    fn callable(&self, name: &str) -> Result<&CallableEntry, BindError> {
        self.registry.callable(name).ok_or_else(|| BindError::UnknownCallable(name.to_string()))
    }

    fn bind_args(&self, entry: &CallableEntry, args: &[Expr]) -> Result<Vec<Arg>, BindError> {
        let fixed = entry.fixed_arity();
        let variadic = entry.is_variadic();
        if args.len() < fixed || (!variadic && args.len() > fixed) {
            let name = entry.name().to_string();
            return Err(BindError::Arity { name, expected: fixed, variadic, found: args.len() });
        }

        let params = entry.params();
        args.iter()
            .enumerate()
            .map(|(idx, arg)| {
                // every argument past the fixed ones belongs to the trailing variadic
                let param = &params[idx.min(params.len() - 1)];
                match (&param.kind, arg) {
                    (ParamKind::Domain(domain), Expr::Tag { tag, .. }) => self
                        .registry
                        .domain(domain)
                        .and_then(|known| known.canonical(tag))
                        .map(|canonical| Arg::Fixed(Value::Tag(canonical)))
                        .ok_or_else(|| BindError::UnknownTag { domain: domain.clone(), tag: tag.clone() }),
                    (ParamKind::Domain(domain), _) => Err(BindError::ExpectedTag {
                        name: entry.name().to_string(),
                        parameter: param.name.clone(),
                        domain: domain.clone(),
                    }),
                    (ParamKind::Number | ParamKind::Variadic, arg) => Ok(match self.bind(arg)? {
                        Bound::Const(value) => Arg::Fixed(Value::Number(value)),
                        Bound::Dynamic(node) => Arg::Dynamic(node),
                    }),
                }
            })
            .collect()
    }

    fn invoke(&self, entry: &CallableEntry, args: Vec<Arg>) -> Bound {
        if let Some(replacement) = entry.replacement() {
            warn!(callable = entry.name(), replacement, "callable is deprecated");
        }
        let function = Arc::clone(entry.function());
        let interval = entry.implicit_interval().then_some(self.interval);

        if args.iter().all(|arg| matches!(arg, Arg::Fixed(_))) {
            let values: Vec<Value> = args
                .into_iter()
                .filter_map(|arg| match arg {
                    Arg::Fixed(value) => Some(value),
                    Arg::Dynamic(_) => None,
                })
                .collect();
            return Bound::Dynamic(Box::new(move || function(&Call::new(interval, &values))));
        }

        Bound::Dynamic(Box::new(move || -> Result<f64, SampleError> {
            let values = args
                .iter()
                .map(|arg| match arg {
                    Arg::Fixed(value) => Ok(value.clone()),
                    Arg::Dynamic(node) => node().map(Value::Number),
                })
                .collect::<Result<Vec<_>, _>>()?;
            function(&Call::new(interval, &values))
        }))
    }
}

fn into_node(bound: Bound) -> Node {
    match bound {
        Bound::Const(value) => Box::new(move || -> Result<f64, SampleError> { Ok(value) }),
        Bound::Dynamic(node) => node,
    }
}
