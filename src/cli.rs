//! Command-line helpers
//!
//! clap only knows single-character short flags, but the tool has always
//! accepted `-lt` and `-qt`. Those are rewritten to their long forms before
//! parsing.

use std::ffi::OsString;
use std::time::Duration;

const TWO_LETTER_FLAGS: &[(&str, &str)] = &[("-lt", "--line-time"), ("-qt", "--quit-timeout")];

/// Rewrite `-lt 0.5`, `-lt=0.5` and `-lt0.5` (and the `-qt` forms) to long
/// options. Everything after a bare `--` is left alone.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = Vec::new();
    let mut passthrough = false;

    for arg in args {
        if passthrough {
            out.push(arg);
            continue;
        }

        let Some(text) = arg.to_str() else {
            out.push(arg);
            continue;
        };

        if text == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }

        let rewritten = TWO_LETTER_FLAGS.iter().find_map(|(short, long)| {
            let rest = text.strip_prefix(short)?;
            if rest.is_empty() {
                Some(vec![OsString::from(*long)])
            } else {
                let value = rest.strip_prefix('=').unwrap_or(rest);
                Some(vec![OsString::from(format!("{}={}", long, value))])
            }
        });

        match rewritten {
            Some(args) => out.extend(args),
            None => out.push(arg),
        }
    }

    out
}

/// Parse a non-negative number of seconds, e.g. `0.01` or `2`
pub fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;

    Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("'{}' must be a finite, non-negative number of seconds", s))
}
