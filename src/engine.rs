//! Expression engine: grammar, parser and compiler.
//!
//! The registry owns a [`Grammar`] and feeds it every registration. Parsing
//! and compiling are then two separate, one-shot passes over user text:
//!
//! ```text
//! register_callable ──┐
//! register_domain  ───┴─> Grammar::extend_*          (grammar.rs)
//!                               │
//! "100*nloadq/ncores" ──> parse(grammar, text)       (parser.rs)
//!                               │  Expr tree
//!                               v
//!                     compile(registry, expr, interval)   (compiler.rs)
//!                               │  constant folding, argument binding
//!                               v
//!                            Sampler  ──> sample() every tick
//! ```
//!
//! ## Responsibilities by module
//!
//! - `grammar.rs`: derives one `CallRule` per callable and one `DomainRule` per
//!   domain, kept in longest-name-first order so that a name is never shadowed
//!   by a shorter prefix.
//! - `parser.rs`: recursive descent over the grammar with standard
//!   precedence. Reports the furthest point it could reach on failure.
//! - `compiler.rs`: resolves names against the registry and builds a tree of
//!   closures. Everything statically known is checked and resolved here, so a
//!   `Sampler` can only fail because a sensor failed.

#[path = "engine/compiler.rs"]
mod compiler;
#[path = "engine/grammar.rs"]
mod grammar;
#[path = "engine/parser.rs"]
mod parser;

pub use compiler::{Sampler, compile};
pub use grammar::{ArgRule, CallForms, CallRule, DomainRule, Grammar};
pub use parser::parse;
