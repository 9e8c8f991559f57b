use cms_perf::{CallableEntry, ParamDefault, ParamKind, Registry};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            self.wrap(s.as_ref(), color)
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            self.wrap(s.as_ref(), BOLD)
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            self.wrap(s.as_ref(), DIM)
        }

        fn wrap(&self, s: &str, code: &str) -> String {
            if self.enabled { format!("{code}{s}{RESET}") } else { s.to_string() }
        }
    }
}

/// Print every callable and domain the registry knows, for `--list-callables`.
pub fn print_callables(registry: &Registry, color: bool) {
    let palette = ansi::Palette::new(color);

    println!("{}", palette.paint("━━━ Callables ━━━", ansi::GRAY));
    for entry in registry.callables() {
        print_callable(entry, &palette);
    }

    println!("\n{}", palette.paint("━━━ Domains ━━━", ansi::GRAY));
    for domain in registry.domains() {
        let tags: Vec<&str> = domain.tags().collect();
        println!("  {}  {}", palette.bold(palette.paint(domain.name(), ansi::CYAN)), tags.join(" | "));
    }

    println!("\n{}", palette.paint("━━━ Grammar ━━━", ansi::GRAY));
    for line in registry.grammar().to_string().lines() {
        println!("  {}", palette.dim(line));
    }
}

fn print_callable(entry: &CallableEntry, palette: &ansi::Palette) {
    let mut notes = Vec::new();
    if entry.implicit_interval() {
        notes.push("uses --interval".to_string());
    }
    if let Some(replacement) = entry.replacement() {
        notes.push(format!("deprecated, use {replacement}"));
    }
    let notes =
        if notes.is_empty() { String::new() } else { palette.paint(format!("  [{}]", notes.join("; ")), ansi::YELLOW) };

    println!("\n  {}{}", palette.bold(palette.paint(entry.usage(), ansi::GREEN)), notes);
    if !entry.doc().is_empty() {
        println!("      {}", entry.doc());
    }
    for param in entry.params() {
        let kind = match &param.kind {
            ParamKind::Number => "number".to_string(),
            ParamKind::Domain(domain) => format!("one of {domain}"),
            ParamKind::Variadic => "numbers...".to_string(),
        };
        let default = match &param.default {
            Some(ParamDefault::Number(value)) => format!(" = {value}"),
            Some(ParamDefault::Tag(tag)) => format!(" = {tag}"),
            None => String::new(),
        };
        println!("      {} {}{}", palette.paint(&param.name, ansi::CYAN), palette.dim(kind), default);
    }
}
