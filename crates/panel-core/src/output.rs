//! Cleaning of ad-hoc command output.
//!
//! `ansible -m shell` wraps the remote stdout in framing: a result banner per
//! host (`builder-1 | CHANGED | rc=0 >>`), warnings in brackets, and a
//! trailer on failure. [`clean`] strips every line that matches the noise
//! table and returns only the payload lines, trimmed.

use regex::Regex;
use std::sync::OnceLock;

/// Literal payload substituted when a host has no automation log.
pub const NO_LOG_AVAILABLE: &str = "No log available";

// ---------------------------------------------------------------------------
// Noise table
// ---------------------------------------------------------------------------

/// Every pattern is matched against the trimmed line.
const NOISE_PATTERNS: &[&str] = &[
    // Result banner: `host | CHANGED | rc=0 >>`, `host | FAILED | rc=3 >>`,
    // `host | SUCCESS => {`, `host | UNREACHABLE! => {`
    r"^\S.*\|\s*(CHANGED|SUCCESS|FAILED!?|UNREACHABLE!)\s*(\||=>|$)",
    // Bracketed noise: `[WARNING]: ...`, `[DEPRECATION WARNING]: ...`
    r"^\[[^\]]*\]",
    // Failure trailer emitted after the payload of a non-zero command.
    r"^non-zero return code$",
];

static NOISE_RE: OnceLock<Vec<Regex>> = OnceLock::new();

fn noise_re() -> &'static [Regex] {
    NOISE_RE.get_or_init(|| {
        NOISE_PATTERNS
            .iter()
            .map(|p| Regex::new(p).unwrap())
            .collect()
    })
}

/// Whether `line` is framing rather than payload.
pub fn is_noise(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || noise_re().iter().any(|re| re.is_match(trimmed))
}

// ---------------------------------------------------------------------------
// Cleaning
// ---------------------------------------------------------------------------

/// Strip framing lines from `raw`, keeping trimmed payload lines in order.
/// Output that is all framing cleans to the empty string.
pub fn clean(raw: &str) -> String {
    payload_lines(raw).collect::<Vec<_>>().join("\n")
}

/// Iterate the trimmed payload lines of `raw`.
pub fn payload_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().filter(|l| !is_noise(l)).map(str::trim)
}

/// The last payload line of `raw`, if any.
pub fn last_line(raw: &str) -> Option<&str> {
    payload_lines(raw).last()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
