//! Extraction of known options from argument lists that also carry foreign ones.
//!
//! Argument lists handed to the shim mix options for three different tools.
//! The helpers here pull out the options one consumer understands and leave
//! every other token, known or not, in its original order.

/// Description of one option recognized by [`extract_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    /// Long name without the leading dashes.
    pub long: Option<&'static str>,
    /// Single-character short name.
    pub short: Option<char>,
    /// Whether the option consumes a value.
    pub takes_value: bool,
}

impl OptionSpec {
    pub const fn flag(long: &'static str) -> Self {
        OptionSpec {
            long: Some(long),
            short: None,
            takes_value: false,
        }
    }

    pub const fn value(long: &'static str) -> Self {
        OptionSpec {
            long: Some(long),
            short: None,
            takes_value: true,
        }
    }

    pub const fn with_short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub const fn short_value(short: char) -> Self {
        OptionSpec {
            long: None,
            short: Some(short),
            takes_value: true,
        }
    }

    /// Parse an option name as written on a command line (`--config`, `-G`).
    pub fn from_name(name: &'static str, takes_value: bool) -> Self {
        if let Some(long) = name.strip_prefix("--") {
            OptionSpec {
                long: Some(long),
                short: None,
                takes_value,
            }
        } else {
            OptionSpec {
                long: None,
                short: name.trim_start_matches('-').chars().next(),
                takes_value,
            }
        }
    }
}

/// How a single token relates to a spec.
enum Match {
    /// The option alone; its value, if any, is the next token.
    Bare,
    /// The option with its value attached (`--name=value`, `-Xvalue`).
    Attached,
}

fn match_token(token: &str, spec: &OptionSpec) -> Option<Match> {
    if let (Some(long), Some(rest)) = (spec.long, token.strip_prefix("--")) {
        if rest == long {
            return Some(Match::Bare);
        }
        if spec.takes_value
            && rest.len() > long.len()
            && rest.starts_with(long)
            && rest.as_bytes()[long.len()] == b'='
        {
            return Some(Match::Attached);
        }
        return None;
    }

    if let Some(short) = spec.short {
        let mut chars = token.chars();
        if chars.next() == Some('-') && chars.next() == Some(short) {
            let rest = chars.as_str();
            if rest.is_empty() {
                return Some(Match::Bare);
            }
            if spec.takes_value && !token.starts_with("--") {
                return Some(Match::Attached);
            }
        }
    }

    None
}

/// Split `args` into the tokens belonging to `specs` and everything else.
///
/// Returns `(extracted, remaining)`, both in input order. A value-taking
/// option written as a bare token consumes the following token as its value.
pub fn extract_options(args: &[String], specs: &[OptionSpec]) -> (Vec<String>, Vec<String>) {
    let mut extracted = Vec::new();
    let mut remaining = Vec::new();
    let mut iter = args.iter();

    while let Some(token) = iter.next() {
        let found = specs
            .iter()
            .find_map(|spec| match_token(token, spec).map(|m| (spec, m)));

        match found {
            Some((spec, Match::Bare)) => {
                extracted.push(token.clone());
                if spec.takes_value {
                    if let Some(value) = iter.next() {
                        extracted.push(value.clone());
                    }
                }
            }
            Some((_, Match::Attached)) => extracted.push(token.clone()),
            None => remaining.push(token.clone()),
        }
    }

    (extracted, remaining)
}

/// Remove every occurrence of the value option `name` from `args`.
///
/// Returns the remaining arguments and the value of the last occurrence, or
/// `default` when the option is absent.
pub fn pop_arg(name: &'static str, args: &[String], default: Option<&str>) -> (Vec<String>, Option<String>) {
    let spec = OptionSpec::from_name(name, true);
    let (extracted, remaining) = extract_options(args, &[spec]);

    let mut value = None;
    let mut iter = extracted.iter();
    while let Some(token) = iter.next() {
        match match_token(token, &spec) {
            Some(Match::Bare) => value = iter.next().cloned(),
            Some(Match::Attached) => {
                value = Some(match spec.long {
                    Some(long) => token[long.len() + 3..].to_string(),
                    None => token[2..].to_string(),
                })
            }
            None => {}
        }
    }

    (remaining, value.or_else(|| default.map(str::to_string)))
}
