//! Recursive-descent parser over a [`Grammar`].
//!
//! The arithmetic layer is fixed; terms come from the grammar:
//!
//! ```text
//! expr   ::= term (('+'|'-') term)*
//! term   ::= factor (('*'|'/') factor)*
//! factor ::= NUMBER | '(' expr ')' | CALL
//! NUMBER ::= '-'? digit+ ('.' digit*)?
//! CALL   ::= name ['(' [arg (',' arg)*] ')']       -- shape from CallRule
//! arg    ::= expr | domainLiteralTag               -- kind from ArgRule
//! ```
//!
//! Both operator levels are left-associative. Whitespace between tokens is
//! skipped. Names and tags are matched as whole words, in the grammar's
//! longest-first order, and the first rule that matches wins.
//!
//! Alternatives backtrack freely: each `Option`-returning step either consumes
//! input and returns `Some`, or returns `None` and the caller rewinds `pos`.
//! Every failed expectation is recorded against its position; the error
//! reports the furthest position any alternative reached, which is almost
//! always where the user's mistake is.

use super::grammar::{ArgRule, CallForms, CallRule, Grammar};
use crate::error::SyntaxError;
use crate::expr::{BinOp, Expr};

/// Parse `text` into an [`Expr`], consuming all of it.
///
/// ```
/// use cms_perf::{Grammar, parse};
///
/// let expr = parse(&Grammar::default(), "3 - 2 * 2").unwrap();
/// assert_eq!(expr.to_string(), "(3 - (2 * 2))");
/// assert!(parse(&Grammar::default(), "3 -").is_err());
/// ```
pub fn parse(grammar: &Grammar, text: &str) -> Result<Expr, SyntaxError> {
    let mut parser = Parser::new(grammar, text);
    let expr = parser.expr();
    parser.skip_whitespace();
    match expr {
        Some(expr) if parser.pos == text.len() => Ok(expr),
        _ => {
            parser.fail("end of input");
            Err(parser.error())
        }
    }
}

struct Parser<'g, 's> {
    grammar: &'g Grammar,
    input: &'s str,
    pos: usize,
    /// Furthest position at which an expectation failed.
    furthest: usize,
    /// What was expected at `furthest`, in the order it was tried.
    expected: Vec<String>,
}

impl<'g, 's> Parser<'g, 's> {
    fn new(grammar: &'g Grammar, input: &'s str) -> Self {
        Parser { grammar, input, pos: 0, furthest: 0, expected: Vec::new() }
    }

    fn rest(&self) -> &'s str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Record that `what` was expected at the current position.
    fn fail(&mut self, what: impl Into<String>) {
        if self.pos > self.furthest {
            self.furthest = self.pos;
            self.expected.clear();
        }
        if self.pos == self.furthest {
            let what = what.into();
            if !self.expected.contains(&what) {
                self.expected.push(what);
            }
        }
    }

    fn error(&self) -> SyntaxError {
        let expected = match self.expected.as_slice() {
            [] => "a valid expression".to_string(),
            [only] => only.clone(),
            [init @ .., last] => format!("{} or {}", init.join(", "), last),
        };
        SyntaxError { offset: self.furthest, expected, text: self.input.to_string() }
    }

    /// Consume `symbol` (after whitespace) or record it as expected.
    fn punct(&mut self, symbol: char) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(symbol) {
            self.pos += symbol.len_utf8();
            true
        } else {
            self.fail(format!("'{symbol}'"));
            false
        }
    }

    /// Consume `word` if it appears at the current position as a whole word.
    fn keyword(&mut self, word: &str) -> bool {
        let rest = self.rest();
        let whole = rest.strip_prefix(word).is_some_and(|after| !after.starts_with(is_word_char));
        if whole {
            self.pos += word.len();
        }
        whole
    }

    /// `expr ::= term (('+'|'-') term)*`
    fn expr(&mut self) -> Option<Expr> {
        self.binary_chain(&['+', '-'], Self::term)
    }

    /// `term ::= factor (('*'|'/') factor)*`
    fn term(&mut self) -> Option<Expr> {
        self.binary_chain(&['*', '/'], Self::factor)
    }

    /// Left fold of `operand (op operand)*`.
    ///
    /// If an operator is not followed by a valid operand, the operator is left
    /// unconsumed; the caller then fails on it with a precise position.
    fn binary_chain(&mut self, operators: &[char], operand: fn(&mut Self) -> Option<Expr>) -> Option<Expr> {
        let mut lhs = operand(self)?;
        loop {
            let before = self.pos;
            self.skip_whitespace();
            let Some(op) = self.rest().chars().next().filter(|c| operators.contains(c)).and_then(BinOp::from_symbol)
            else {
                let expected = operators.iter().map(|op| format!("'{op}'")).collect::<Vec<_>>().join(", ");
                self.fail(expected);
                self.pos = before;
                return Some(lhs);
            };
            self.pos += 1;
            match operand(self) {
                Some(rhs) => lhs = Expr::binary(op, lhs, rhs),
                None => {
                    self.pos = before;
                    return Some(lhs);
                }
            }
        }
    }

    /// `factor ::= NUMBER | '(' expr ')' | CALL`
    fn factor(&mut self) -> Option<Expr> {
        self.skip_whitespace();
        if let Some(number) = self.number() {
            return Some(number);
        }
        let start = self.pos;
        if self.rest().starts_with('(') {
            self.pos += 1;
            if let Some(inner) = self.expr() {
                if self.punct(')') {
                    return Some(inner);
                }
            }
            self.pos = start;
            return None;
        }
        if let Some(call) = self.call() {
            return Some(call);
        }
        self.fail("a number, '(' or a callable name");
        None
    }

    fn number(&mut self) -> Option<Expr> {
        let literal = crate::lex!(r"^-?[0-9]+(?:\.[0-9]*)?", self.rest())?;
        let value = literal.parse::<f64>().ok()?;
        self.pos += literal.len();
        Some(Expr::Number(value))
    }

    /// Try each call rule in grammar order; the first whose name matches decides.
    fn call(&mut self) -> Option<Expr> {
        let grammar = self.grammar;
        let start = self.pos;
        let rule = grammar.calls().iter().find(|rule| self.keyword(&rule.name))?;
        let after_name = self.pos;

        if rule.forms.contains(CallForms::PARENTHESIZED) {
            if let Some(args) = self.arguments(rule) {
                return Some(Expr::call(rule.name.clone(), args));
            }
            self.pos = after_name;
        }
        if rule.forms.contains(CallForms::BARE) {
            return Some(Expr::reference(rule.name.clone()));
        }
        self.pos = start;
        None
    }

    /// `'(' args ')'` where every position follows the rule's `ArgRule`.
    fn arguments(&mut self, rule: &CallRule) -> Option<Vec<Expr>> {
        if !self.punct('(') {
            return None;
        }
        let mut args = Vec::with_capacity(rule.args.len());
        for (idx, arg) in rule.args.iter().enumerate() {
            match arg {
                ArgRule::Expr => {
                    if idx > 0 && !self.punct(',') {
                        return None;
                    }
                    args.push(self.expr()?);
                }
                ArgRule::Domain(domain) => {
                    if idx > 0 && !self.punct(',') {
                        return None;
                    }
                    args.push(self.tag(domain)?);
                }
                ArgRule::Variadic => self.variadic(idx > 0, &mut args),
            }
        }
        if !self.punct(')') {
            return None;
        }
        Some(args)
    }

    /// Zero or more expressions; a leading comma is needed after fixed arguments.
    fn variadic(&mut self, leading_comma: bool, args: &mut Vec<Expr>) {
        let mut needs_comma = leading_comma;
        loop {
            let before = self.pos;
            if needs_comma && !self.punct(',') {
                return;
            }
            match self.expr() {
                Some(expr) => args.push(expr),
                None => {
                    self.pos = before;
                    return;
                }
            }
            needs_comma = true;
        }
    }

    fn tag(&mut self, domain: &str) -> Option<Expr> {
        self.skip_whitespace();
        let grammar = self.grammar;
        let Some(rule) = grammar.domain(domain) else {
            self.fail(format!("a literal of unknown domain {domain}"));
            return None;
        };
        match rule.tags.iter().find(|tag| self.keyword(tag)) {
            Some(tag) => Some(Expr::Tag { domain: rule.name.clone(), tag: tag.clone() }),
            None => {
                self.fail(rule.alternatives());
                None
            }
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, Signature};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_domain("CPU", ["all", "physical"]).unwrap();
        registry.register_domain("NET", ["tcp", "tcp6", "all", "all cores"]).unwrap();
        registry.register_callable(Signature::new("pcpu").interval(), |_| Ok(0.0)).unwrap();
        registry.register_callable(Signature::new("loadq").interval(), |_| Ok(0.0)).unwrap();
        registry.register_callable(Signature::new("nloadq").interval(), |_| Ok(0.0)).unwrap();
        registry.register_callable(Signature::new("ncores").domain_or("kind", "CPU", "all"), |_| Ok(0.0)).unwrap();
        registry.register_callable(Signature::new("nsockets").domain_or("kind", "NET", "tcp"), |_| Ok(0.0)).unwrap();
        registry.register_callable(Signature::new("max").number("a").number("b").variadic("c"), |_| Ok(0.0)).unwrap();
        registry.register_callable(Signature::new("sum").variadic("xs"), |_| Ok(0.0)).unwrap();
        registry.register_callable(Signature::new("xrd.nfds"), |_| Ok(0.0)).unwrap();
        registry
    }

    fn shown(text: &str) -> String {
        registry().parse(text).map(|expr| expr.to_string()).unwrap_or_else(|err| panic!("{}", err.render()))
    }

    #[test]
    fn numbers() {
        let cases = [("1", "1"), ("1337", "1337"), ("1.5", "1.5"), ("-2", "-2"), ("3.", "3"), (" 7 ", "7")];
        for (text, expected) in cases {
            assert_eq!(shown(text), expected, "{text}");
        }
    }

    #[test]
    fn precedence_and_associativity() {
        let cases = [
            ("2*2-3", "((2 * 2) - 3)"),
            ("3-2*2", "(3 - (2 * 2))"),
            ("3+2*2*2-3", "((3 + ((2 * 2) * 2)) - 3)"),
            ("8/4/2", "((8 / 4) / 2)"),
            ("1-2-3", "((1 - 2) - 3)"),
            ("(1-2)*3", "((1 - 2) * 3)"),
            ("2*-3", "(2 * -3)"),
            ("2--3", "(2 - -3)"),
        ];
        for (text, expected) in cases {
            assert_eq!(shown(text), expected, "{text}");
        }
    }

    #[test]
    fn calls_in_every_form() {
        let cases = [
            ("pcpu", "pcpu"),
            ("100.0*nloadq/ncores", "((100 * nloadq) / ncores)"),
            ("ncores(physical)", "ncores(physical)"),
            ("ncores( all )", "ncores(all)"),
            ("max(1, pcpu)", "max(1, pcpu)"),
            ("max(1,2,3,4)", "max(1, 2, 3, 4)"),
            ("sum", "sum"),
            ("sum()", "sum()"),
            ("sum(1, 2)", "sum(1, 2)"),
            ("max(sum(1), ncores(physical) * 2)", "max(sum(1), (ncores(physical) * 2))"),
            ("xrd.nfds / 20", "(xrd.nfds / 20)"),
        ];
        for (text, expected) in cases {
            assert_eq!(shown(text), expected, "{text}");
        }
    }

    #[test]
    fn longer_names_and_tags_are_not_shadowed() {
        assert_eq!(shown("nloadq"), "nloadq");
        assert_eq!(shown("loadq"), "loadq");
        assert_eq!(shown("nsockets(tcp6)"), "nsockets(tcp6)");
        assert_eq!(shown("nsockets(all cores)"), "nsockets(all cores)");
        assert_eq!(shown("nsockets(all)"), "nsockets(all)");
    }

    #[test]
    fn wrong_argument_counts_fail() {
        let registry = registry();
        for text in ["max(1)", "max()", "max", "ncores()", "ncores(all, all)", "pcpu()", "max(1,2,)"] {
            assert!(registry.parse(text).is_err(), "{text} should not parse");
        }
    }

    #[test]
    fn domain_literals_must_be_registered() {
        let registry = registry();
        for tag in ["all", "physical"] {
            assert!(registry.parse(&format!("ncores({tag})")).is_ok(), "{tag}");
        }
        let err = registry.parse("ncores(logical)").unwrap_err();
        assert_eq!(err.offset, 7);
        assert_eq!(err.expected, r#""physical" | "all""#);
        // tags are only literals inside their parameter position
        assert!(registry.parse("physical").is_err());
        assert!(registry.parse("max(physical, 1)").is_err());
    }

    #[test]
    fn trailing_input_fails_with_offset_and_source() {
        let registry = registry();
        let err = registry.parse("1 + 2 3").unwrap_err();
        assert_eq!(err.offset, 6);
        assert_eq!(err.text, "1 + 2 3");
        assert!(err.expected.contains("end of input"), "{}", err.expected);

        let err = registry.parse("pcpu2").unwrap_err();
        assert_eq!(err.offset, 0);

        let err = registry.parse("(1 + 2").unwrap_err();
        assert_eq!(err.offset, 6);
        assert!(err.expected.contains("')'"), "{}", err.expected);
    }

    #[test]
    fn unknown_names_fail() {
        let registry = registry();
        let err = registry.parse("2 * bogus").unwrap_err();
        assert_eq!(err.offset, 4);
        assert_eq!(registry.parse("").unwrap_err().offset, 0);
    }

    #[test]
    fn empty_grammar_still_parses_arithmetic() {
        let grammar = Grammar::default();
        assert_eq!(parse(&grammar, "1 + 2 * 3").unwrap().to_string(), "(1 + (2 * 3))");
        assert!(parse(&grammar, "pcpu").is_err());
    }
}
