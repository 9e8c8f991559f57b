//! Grammar derived from registrations.
//!
//! The arithmetic part of the grammar is fixed (see `parser.rs`). What grows
//! is the set of *terms*: one `CallRule` per registered callable and one
//! `DomainRule` per registered domain.
//!
//! ```text
//! Signature::new("ncores").domain_or("kind", "CPU", "all")
//!     └─> CallRule { name: "ncores", forms: BARE | PARENTHESIZED, args: [Domain("CPU")] }
//!
//! register_domain("CPU", ["all", "physical"])
//!     └─> DomainRule { name: "CPU", tags: ["physical", "all"] }
//! ```
//!
//! ## Invariants
//!
//! - Rules are only ever added.
//! - `Grammar::calls` and every `DomainRule::tags` are ordered longest first,
//!   ties broken by reverse lexical order. The parser tries them in this order
//!   and takes the first match, so `tcp6` wins over `tcp` and `all cores`
//!   over `all`.

use crate::registry::{CallableEntry, DomainEntry, ParamKind};
use std::fmt;

bitflags::bitflags! {
    /// Syntactic forms a callable can be written in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CallForms: u8 {
        /// `name` alone; every parameter has a default or is variadic.
        const BARE          = 1 << 0;
        /// `name(arg, ...)`; the callable declares at least one parameter.
        const PARENTHESIZED = 1 << 1;
    }
}

/// What one argument position accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgRule {
    Expr,
    /// A literal of the named domain.
    Domain(String),
    /// Zero or more comma separated expressions.
    Variadic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRule {
    pub name: String,
    pub forms: CallForms,
    pub args: Vec<ArgRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRule {
    pub name: String,
    /// Match order, longest first.
    pub tags: Vec<String>,
}

impl DomainRule {
    /// `"physical" | "all"`, used in diagnostics.
    pub fn alternatives(&self) -> String {
        self.tags.iter().map(|tag| format!("{tag:?}")).collect::<Vec<_>>().join(" | ")
    }
}

/// The growing set of term rules.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    calls: Vec<CallRule>,
    domains: Vec<DomainRule>,
}

impl Grammar {
    /// Call rules in match order.
    pub fn calls(&self) -> &[CallRule] {
        &self.calls
    }

    pub fn domain(&self, name: &str) -> Option<&DomainRule> {
        self.domains.iter().find(|rule| rule.name == name)
    }

    pub(crate) fn extend_call(&mut self, entry: &CallableEntry) {
        let params = entry.params();
        let mut forms = CallForms::empty();
        if entry.bare_args().is_some() {
            forms |= CallForms::BARE;
        }
        if !params.is_empty() {
            forms |= CallForms::PARENTHESIZED;
        }
        let args = params
            .iter()
            .map(|param| match &param.kind {
                ParamKind::Number => ArgRule::Expr,
                ParamKind::Domain(domain) => ArgRule::Domain(domain.clone()),
                ParamKind::Variadic => ArgRule::Variadic,
            })
            .collect();

        let rule = CallRule { name: entry.name().to_string(), forms, args };
        let at = self.calls.iter().position(|known| match_first(&rule.name, &known.name)).unwrap_or(self.calls.len());
        self.calls.insert(at, rule);
    }

    pub(crate) fn extend_domain(&mut self, entry: &DomainEntry) {
        let mut tags: Vec<String> = entry.tags().map(str::to_string).collect();
        tags.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| b.cmp(a)));
        self.domains.push(DomainRule { name: entry.name().to_string(), tags });
    }
}

/// Whether `candidate` must be tried before `known`.
fn match_first(candidate: &str, known: &str) -> bool {
    candidate.len() > known.len() || (candidate.len() == known.len() && candidate > known)
}

// A compact EBNF-like dump, mostly useful with `--list-callables`.
impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EXPR   ::= TERM (('+' | '-') TERM)*")?;
        writeln!(f, "TERM   ::= FACTOR (('*' | '/') FACTOR)*")?;
        writeln!(f, "FACTOR ::= NUMBER | '(' EXPR ')' | CALL")?;
        write!(f, "CALL   ::=")?;
        let mut first = true;
        for rule in &self.calls {
            let mut alternatives = Vec::new();
            if rule.forms.contains(CallForms::PARENTHESIZED) {
                let args: Vec<String> = rule
                    .args
                    .iter()
                    .map(|arg| match arg {
                        ArgRule::Expr => "EXPR".to_string(),
                        ArgRule::Domain(domain) => domain.clone(),
                        ArgRule::Variadic => "EXPR...".to_string(),
                    })
                    .collect();
                alternatives.push(format!("{:?} '(' {} ')'", rule.name, args.join(" ',' ")));
            }
            if rule.forms.contains(CallForms::BARE) {
                alternatives.push(format!("{:?}", rule.name));
            }
            for alternative in alternatives {
                write!(f, "{} {}", if first { "" } else { "\n         |" }, alternative)?;
                first = false;
            }
        }
        for domain in &self.domains {
            write!(f, "\n{} ::= {}", domain.name, domain.alternatives())?;
        }
        Ok(())
    }
}
