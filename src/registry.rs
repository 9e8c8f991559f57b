//! The registry of callables (sensors and transforms) and literal domains.
//!
//! Every successful registration also extends the registry's [`Grammar`], so
//! the set of expressions the parser accepts is exactly the set of things
//! that have been registered. The registry is built once at start-up, then
//! only read while parsing and compiling.
//!
//! ```text
//! Signature ─┐
//!            ├─ register_callable ─┬─> CallableEntry
//! CallFn ────┘                     └─> Grammar::extend_call
//!
//! tags ────── register_domain ─────┬─> DomainEntry
//!                                  └─> Grammar::extend_domain
//! ```
//!
//! Callable names and domain names share one namespace.

use crate::engine::{self, Grammar, Sampler};
use crate::error::{BindError, ConfigError, RegistrationError, SampleError, SyntaxError};
use crate::expr::Expr;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A runtime argument handed to a callable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    /// Canonical token of a domain literal.
    Tag(Arc<str>),
}

/// The arguments of one invocation of a callable.
#[derive(Debug)]
pub struct Call<'a> {
    interval: Option<Duration>,
    args: &'a [Value],
}

impl<'a> Call<'a> {
    pub fn new(interval: Option<Duration>, args: &'a [Value]) -> Self {
        Call { interval, args }
    }

    /// The sampling interval, present only for callables declared with [`Signature::interval`].
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    pub fn number(&self, index: usize) -> Result<f64, SampleError> {
        match self.args.get(index) {
            Some(Value::Number(value)) => Ok(*value),
            _ => Err(SampleError::Argument { index, expected: "number" }),
        }
    }

    pub fn tag(&self, index: usize) -> Result<&'a str, SampleError> {
        match self.args.get(index) {
            Some(Value::Tag(tag)) => Ok(tag),
            _ => Err(SampleError::Argument { index, expected: "domain literal" }),
        }
    }

    /// All numeric arguments in order; what a variadic transform folds over.
    pub fn numbers(&self) -> impl Iterator<Item = f64> + 'a {
        self.args.iter().filter_map(|arg| match arg {
            Value::Number(value) => Some(*value),
            Value::Tag(_) => None,
        })
    }
}

/// The function behind a registered callable.
pub type CallFn = Arc<dyn Fn(&Call<'_>) -> Result<f64, SampleError> + Send + Sync>;

/// Kind of a declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Any arithmetic expression.
    Number,
    /// A literal of the named domain.
    Domain(String),
    /// Zero or more trailing arithmetic expressions.
    Variadic,
}

/// Default of an optional parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamDefault {
    Number(f64),
    Tag(String),
}

/// One declared parameter of a callable.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<ParamDefault>,
}

impl Param {
    pub fn is_variadic(&self) -> bool {
        self.kind == ParamKind::Variadic
    }
}

/// Declared shape of a callable, built with a small builder API.
///
/// ```
/// use cms_perf::Signature;
///
/// let sig = Signature::new("ncores")
///     .domain_or("kind", "CPU", "all")
///     .doc("Number of CPU cores");
/// assert_eq!(sig.name(), "ncores");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    name: String,
    params: Vec<Param>,
    interval: bool,
    doc: String,
    replacement: Option<String>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Signature { name: name.into(), params: Vec::new(), interval: false, doc: String::new(), replacement: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The callable receives the shared sampling interval on every call.
    pub fn interval(mut self) -> Self {
        self.interval = true;
        self
    }

    pub fn number(self, name: impl Into<String>) -> Self {
        self.param(Param { name: name.into(), kind: ParamKind::Number, default: None })
    }

    pub fn number_or(self, name: impl Into<String>, default: f64) -> Self {
        self.param(Param { name: name.into(), kind: ParamKind::Number, default: Some(ParamDefault::Number(default)) })
    }

    pub fn domain(self, name: impl Into<String>, domain: impl Into<String>) -> Self {
        self.param(Param { name: name.into(), kind: ParamKind::Domain(domain.into()), default: None })
    }

    pub fn domain_or(self, name: impl Into<String>, domain: impl Into<String>, default: impl Into<String>) -> Self {
        self.param(Param {
            name: name.into(),
            kind: ParamKind::Domain(domain.into()),
            default: Some(ParamDefault::Tag(default.into())),
        })
    }

    pub fn variadic(self, name: impl Into<String>) -> Self {
        self.param(Param { name: name.into(), kind: ParamKind::Variadic, default: None })
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Mark the callable as deprecated in favour of `replacement`.
    pub fn deprecated(mut self, replacement: impl Into<String>) -> Self {
        self.replacement = Some(replacement.into());
        self
    }
}

/// A registered callable.
pub struct CallableEntry {
    name: String,
    params: Vec<Param>,
    implicit_interval: bool,
    doc: String,
    replacement: Option<String>,
    /// Arguments for the bare form; `None` if some parameter is required.
    bare_args: Option<Vec<Value>>,
    function: CallFn,
}

impl CallableEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn implicit_interval(&self) -> bool {
        self.implicit_interval
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn replacement(&self) -> Option<&str> {
        self.replacement.as_deref()
    }

    pub fn bare_args(&self) -> Option<&[Value]> {
        self.bare_args.as_deref()
    }

    pub fn function(&self) -> &CallFn {
        &self.function
    }

    /// Number of parameters that must be passed explicitly in the parenthesized form.
    pub fn fixed_arity(&self) -> usize {
        self.params.iter().filter(|p| !p.is_variadic()).count()
    }

    pub fn is_variadic(&self) -> bool {
        self.params.last().is_some_and(Param::is_variadic)
    }

    /// Human readable usage, e.g. `ncores or ncores(kind)` or `max(a, b, others...)`.
    pub fn usage(&self) -> String {
        let mut forms = Vec::new();
        if self.bare_args.is_some() {
            forms.push(self.name.clone());
        }
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|p| if p.is_variadic() { format!("{}...", p.name) } else { p.name.clone() })
                .collect();
            forms.push(format!("{}({})", self.name, params.join(", ")));
        }
        forms.join(" or ")
    }
}

impl fmt::Debug for CallableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableEntry")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("implicit_interval", &self.implicit_interval)
            .field("function", &"<function>")
            .finish()
    }
}

/// A registered domain of literal tags.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEntry {
    name: String,
    tags: Vec<Arc<str>>,
}

impl DomainEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags in registration order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|tag| &**tag)
    }

    /// The canonical token for `tag`, shared by every use of that literal.
    pub fn canonical(&self, tag: &str) -> Option<Arc<str>> {
        self.tags.iter().find(|known| &***known == tag).cloned()
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Callable(usize),
    Domain(usize),
}

/// Named callables and domains plus the grammar derived from them.
#[derive(Debug, Default)]
pub struct Registry {
    callables: Vec<CallableEntry>,
    domains: Vec<DomainEntry>,
    names: HashMap<String, Slot>,
    grammar: Grammar,
}

impl Registry {
    /// An empty registry: only numbers and arithmetic parse.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in sensor, transform and domain.
    pub fn with_builtins() -> Result<Self, RegistrationError> {
        let mut registry = Self::new();
        crate::sensors::register_builtins(&mut registry)?;
        Ok(registry)
    }

    /// Register a callable under `signature`.
    ///
    /// Fails on name collisions, unknown domains and unsupported parameters
    /// (anything but numbers, domain literals and one trailing variadic).
    pub fn register_callable<F>(&mut self, signature: Signature, function: F) -> Result<(), RegistrationError>
    where
        F: Fn(&Call<'_>) -> Result<f64, SampleError> + Send + Sync + 'static,
    {
        let Signature { name, params, interval, doc, replacement } = signature;
        self.check_name(&name)?;

        let mut bare_args = Some(Vec::with_capacity(params.len()));
        for (idx, param) in params.iter().enumerate() {
            let unsupported = |reason| RegistrationError::UnsupportedParameter {
                callable: name.clone(),
                parameter: param.name.clone(),
                reason,
            };
            let default = match (&param.kind, &param.default) {
                (ParamKind::Variadic, _) if idx + 1 != params.len() => {
                    return Err(unsupported("a variadic parameter must be the last parameter"));
                }
                (ParamKind::Variadic, Some(_)) => return Err(unsupported("a variadic parameter cannot have a default")),
                (ParamKind::Variadic, None) => None,
                (ParamKind::Number, Some(ParamDefault::Number(value))) => Some(Value::Number(*value)),
                (ParamKind::Number, Some(ParamDefault::Tag(_))) => {
                    return Err(unsupported("a numeric parameter cannot default to a literal"));
                }
                (ParamKind::Domain(domain), default) => {
                    let entry = self.domain(domain).ok_or_else(|| RegistrationError::UnknownDomain {
                        callable: name.clone(),
                        domain: domain.clone(),
                    })?;
                    match default {
                        Some(ParamDefault::Tag(tag)) => Some(Value::Tag(
                            entry.canonical(tag).ok_or_else(|| unsupported("default is not a literal of its domain"))?,
                        )),
                        Some(ParamDefault::Number(_)) => {
                            return Err(unsupported("a domain parameter cannot default to a number"));
                        }
                        None => {
                            bare_args = None;
                            None
                        }
                    }
                }
                (ParamKind::Number, None) => {
                    bare_args = None;
                    None
                }
            };
            if let (Some(args), Some(value)) = (bare_args.as_mut(), default) {
                args.push(value);
            }
        }

        let entry = CallableEntry {
            name: name.clone(),
            params,
            implicit_interval: interval,
            doc,
            replacement,
            bare_args,
            function: Arc::new(function),
        };
        self.grammar.extend_call(&entry);
        debug!(callable = %name, usage = %entry.usage(), "registered callable");
        self.names.insert(name, Slot::Callable(self.callables.len()));
        self.callables.push(entry);
        Ok(())
    }

    /// Register a domain of literal tags, usable by domain-typed parameters.
    pub fn register_domain<I, T>(&mut self, name: impl Into<String>, tags: I) -> Result<(), RegistrationError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let name = name.into();
        self.check_name(&name)?;
        let invalid = |reason: String| RegistrationError::InvalidDomain { domain: name.clone(), reason };

        let mut entry = DomainEntry { name: name.clone(), tags: Vec::new() };
        for tag in tags {
            let tag: String = tag.into();
            if !is_valid_tag(&tag) {
                return Err(invalid(format!("{tag:?} is not a valid literal")));
            }
            if entry.canonical(&tag).is_some() {
                return Err(invalid(format!("literal {tag:?} is listed twice")));
            }
            entry.tags.push(Arc::from(tag));
        }
        if entry.tags.is_empty() {
            return Err(invalid("a domain needs at least one literal".to_string()));
        }

        self.grammar.extend_domain(&entry);
        debug!(domain = %name, tags = entry.tags.len(), "registered domain");
        self.names.insert(name, Slot::Domain(self.domains.len()));
        self.domains.push(entry);
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<(), RegistrationError> {
        if !is_valid_name(name) {
            return Err(RegistrationError::InvalidName(name.to_string()));
        }
        if self.names.contains_key(name) {
            return Err(RegistrationError::Duplicate(name.to_string()));
        }
        Ok(())
    }

    pub fn callable(&self, name: &str) -> Option<&CallableEntry> {
        match self.names.get(name)? {
            Slot::Callable(idx) => self.callables.get(*idx),
            Slot::Domain(_) => None,
        }
    }

    pub fn domain(&self, name: &str) -> Option<&DomainEntry> {
        match self.names.get(name)? {
            Slot::Domain(idx) => self.domains.get(*idx),
            Slot::Callable(_) => None,
        }
    }

    /// Callables in registration order.
    pub fn callables(&self) -> impl Iterator<Item = &CallableEntry> {
        self.callables.iter()
    }

    /// Domains in registration order.
    pub fn domains(&self) -> impl Iterator<Item = &DomainEntry> {
        self.domains.iter()
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Parse `text` against everything registered so far.
    pub fn parse(&self, text: &str) -> Result<Expr, SyntaxError> {
        engine::parse(&self.grammar, text)
    }

    /// Bind a parsed expression to this registry and a fixed sampling interval.
    pub fn compile(&self, expr: &Expr, interval: Duration) -> Result<Sampler, BindError> {
        engine::compile(self, expr, interval)
    }

    /// Parse and compile in one step.
    pub fn compile_str(&self, text: &str, interval: Duration) -> Result<Sampler, ConfigError> {
        let expr = self.parse(text)?;
        let sampler = self.compile(&expr, interval)?;
        debug!(source = text, parsed = %expr, "compiled expression");
        Ok(sampler)
    }
}

fn is_valid_name(name: &str) -> bool {
    crate::regex!(r"^[A-Za-z_][A-Za-z0-9_.]*$").is_match(name)
}

// Tags may hold inner spaces ("all cores") but never leading/trailing ones.
fn is_valid_tag(tag: &str) -> bool {
    crate::regex!(r"^[A-Za-z_][A-Za-z0-9_.]*(?: [A-Za-z0-9_.]+)*$").is_match(tag)
}
