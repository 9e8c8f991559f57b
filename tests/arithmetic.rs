//! Property tests: literal arithmetic evaluates like native floating point,
//! with the usual precedence and left associativity.

use cms_perf::{Registry, Sampler};
use proptest::prelude::*;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_secs(1);

fn compile(text: &str) -> Sampler {
    Registry::new().compile_str(text, INTERVAL).unwrap()
}

fn arb_op() -> impl Strategy<Value = char> {
    prop_oneof![Just('+'), Just('-'), Just('*'), Just('/')]
}

fn apply(op: char, lhs: f64, rhs: f64) -> f64 {
    match op {
        '+' => lhs + rhs,
        '-' => lhs - rhs,
        '*' => lhs * rhs,
        '/' => lhs / rhs,
        _ => unreachable!(),
    }
}

fn binds_tighter(op: char) -> bool {
    matches!(op, '*' | '/')
}

proptest! {
    #[test]
    fn two_operators_follow_precedence(
        a in 0u32..1000,
        b in 1u32..1000,
        c in 1u32..1000,
        first in arb_op(),
        second in arb_op(),
    ) {
        let (a, b, c) = (f64::from(a), f64::from(b), f64::from(c));
        let expected = if binds_tighter(second) && !binds_tighter(first) {
            apply(first, a, apply(second, b, c))
        } else {
            apply(second, apply(first, a, b), c)
        };

        let sampler = compile(&format!("{a} {first} {b} {second} {c}"));
        prop_assert!(sampler.is_constant());
        prop_assert_eq!(sampler.sample().unwrap(), expected);
    }

    #[test]
    fn parentheses_override_precedence(a in 0u32..1000, b in 0u32..1000, c in 0u32..1000) {
        let (a, b, c) = (f64::from(a), f64::from(b), f64::from(c));
        prop_assert_eq!(compile(&format!("({a} + {b}) * {c}")).sample().unwrap(), (a + b) * c);
        prop_assert_eq!(compile(&format!("{a} - ({b} - {c})")).sample().unwrap(), a - (b - c));
    }

    #[test]
    fn source_reparses_to_the_same_value(
        a in 0u32..100,
        b in 1u32..100,
        c in 1u32..100,
        first in arb_op(),
        second in arb_op(),
    ) {
        let sampler = compile(&format!("{a}{first}{b}{second}{c}"));
        let reparsed = compile(sampler.source());
        prop_assert_eq!(reparsed.sample().unwrap(), sampler.sample().unwrap());
    }
}

#[test]
fn whitespace_is_insignificant() {
    assert_eq!(compile("  3+2 *2\t*2 - 3 ").sample().unwrap(), 8.0);
}
