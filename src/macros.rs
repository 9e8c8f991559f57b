/// Compile a regex literal once and hand out a `&'static Regex`.
///
/// Patterns are literals checked by the tests that exercise them, so a bad
/// pattern fails loudly on first use rather than being reported to callers.
#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Match a regex literal at the very start of `$input`, returning the matched text.
#[macro_export]
macro_rules! lex {
    ($pat:literal, $input:expr) => {
        $crate::regex!($pat).find($input).filter(|m| m.start() == 0).map(|m| m.as_str())
    };
}
