//! Trigger-pattern validation.
//!
//! Rule patterns are user-authored regular expressions stored as data, so they
//! are treated as untrusted input. [`validate_pattern`] answers two questions:
//!
//! - **valid**: does the pattern compile at all (case-insensitively, within the
//!   configured size limit)?
//! - **safe**: does it avoid the shapes that cause catastrophic backtracking in
//!   backtracking engines?
//!
//! The safety check is a heuristic scan over the pattern text, not a proof:
//! false negatives are acceptable, and every positive carries a reason a human
//! can act on. Matching itself runs on the `regex` crate's automata, which never
//! backtrack; the gate keeps the rule document portable to engines that do.
//!
//! ```text
//! (a+)+        nested unbounded quantifier        -> unsafe
//! (a|aa)*      alternation in a repeated group    -> unsafe
//! ((a?)?)?     quantified groups 3 deep           -> unsafe
//! \bROCK\b     plain                              -> safe
//! ```

use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Patterns longer than this are reported as unsafe.
pub const MAX_PATTERN_LEN: usize = 512;

/// Default compiled-size limit for rule patterns (bytes).
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Quantified groups nested this deep are reported as unsafe.
const MAX_QUANTIFIED_DEPTH: usize = 3;

/// Outcome of [`validate_pattern`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternCheck {
    /// The pattern compiles.
    pub valid: bool,
    /// The pattern compiles and no risky construct was detected.
    pub safe: bool,
    /// Why the pattern is invalid or unsafe; `None` when `safe`.
    pub reason: Option<String>,
}

impl PatternCheck {
    fn safe() -> Self {
        Self { valid: true, safe: true, reason: None }
    }

    fn unsafe_because(reason: impl Into<String>) -> Self {
        Self { valid: true, safe: false, reason: Some(reason.into()) }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self { valid: false, safe: false, reason: Some(reason.into()) }
    }
}

/// Validate `pattern` with the default size limit.
pub fn validate_pattern(pattern: &str) -> PatternCheck {
    validate_pattern_with_limit(pattern, DEFAULT_REGEX_SIZE_LIMIT)
}

/// Validate `pattern`, compiling it under `size_limit`.
pub fn validate_pattern_with_limit(pattern: &str, size_limit: usize) -> PatternCheck {
    if let Err(err) = compile_pattern(pattern, size_limit) {
        return PatternCheck::invalid(format!("invalid regular expression: {err}"));
    }

    if pattern.chars().count() > MAX_PATTERN_LEN {
        return PatternCheck::unsafe_because(format!("pattern is longer than {MAX_PATTERN_LEN} characters"));
    }

    match scan_backtracking_risk(pattern) {
        Some(reason) => PatternCheck::unsafe_because(reason),
        None => PatternCheck::safe(),
    }
}

/// Compile a rule pattern the way the matcher does: case-insensitive,
/// unanchored, bounded in size.
pub(crate) fn compile_pattern(pattern: &str, size_limit: usize) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).size_limit(size_limit).dfa_size_limit(size_limit).build()
}

/// Per-group bookkeeping while scanning.
#[derive(Debug, Default, Clone, Copy)]
struct GroupFrame {
    /// Some atom directly or transitively inside carries `*`, `+` or `{n,}`.
    has_unbounded: bool,
    /// A `|` appears at this group's own level.
    has_alternation: bool,
    /// Deepest chain of quantified groups inside this one.
    quantified_depth: usize,
}

/// What the scanner just consumed, i.e. what a following quantifier binds to.
#[derive(Debug, Clone, Copy)]
enum Atom {
    None,
    Simple,
    Group(GroupFrame),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantifier {
    /// `?` or `{0,n}` / `{n,m}`
    Bounded,
    /// `*`, `+`, `{n,}`
    Unbounded,
}

/// Walk the pattern once and report the first risky construct found.
fn scan_backtracking_risk(pattern: &str) -> Option<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut stack: Vec<GroupFrame> = vec![GroupFrame::default()];
    let mut last = Atom::None;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                // An escape is one atom; skip the escaped char.
                i += 2;
                last = Atom::Simple;
                continue;
            }
            '[' => {
                i = skip_class(&chars, i);
                last = Atom::Simple;
                continue;
            }
            '(' => {
                stack.push(GroupFrame::default());
                i += 1;
                // Skip group flags / names: (?:, (?i), (?P<name>, (?<name>.
                if chars.get(i) == Some(&'?') {
                    while i < chars.len() && !matches!(chars[i], ':' | ')' | '>') {
                        i += 1;
                    }
                    if chars.get(i).is_some_and(|c| *c == ':' || *c == '>') {
                        i += 1;
                    }
                }
                last = Atom::None;
                continue;
            }
            ')' => {
                if stack.len() > 1 {
                    let closed = stack.pop().unwrap_or_default();
                    last = Atom::Group(closed);
                } else {
                    last = Atom::Simple;
                }
            }
            '|' => {
                if let Some(top) = stack.last_mut() {
                    top.has_alternation = true;
                }
                last = Atom::None;
            }
            '*' | '+' | '?' | '{' => {
                let (quantifier, next) = read_quantifier(&chars, i);
                let Some(quantifier) = quantifier else {
                    // A literal `{`.
                    last = Atom::Simple;
                    i = next;
                    continue;
                };
                if let Some(reason) = apply_quantifier(&mut stack, last, quantifier, &chars[..next]) {
                    return Some(reason);
                }
                last = Atom::None;
                i = next;
                continue;
            }
            _ => last = Atom::Simple,
        }

        // Fold a just-closed, unquantified group into its parent.
        if let (')', Atom::Group(closed)) = (chars[i], last) {
            if !next_is_quantifier(&chars, i + 1) {
                merge_into_parent(&mut stack, closed, closed.quantified_depth);
            }
        }
        i += 1;
    }

    None
}

/// Apply a quantifier to the atom before it and check the risky shapes.
fn apply_quantifier(stack: &mut [GroupFrame], atom: Atom, quantifier: Quantifier, seen: &[char]) -> Option<String> {
    let unbounded = quantifier == Quantifier::Unbounded;
    match atom {
        Atom::None => None,
        Atom::Simple => {
            if let Some(top) = stack.last_mut() {
                top.has_unbounded |= unbounded;
                top.quantified_depth = top.quantified_depth.max(1);
            }
            None
        }
        Atom::Group(group) => {
            let snippet: String = seen.iter().collect();
            if unbounded && group.has_unbounded {
                return Some(format!(
                    "nested quantifier: a repeated group contains another unbounded quantifier near `{}`",
                    tail(&snippet)
                ));
            }
            if unbounded && group.has_alternation {
                return Some(format!("alternation inside a repeated group near `{}`", tail(&snippet)));
            }
            let depth = group.quantified_depth + 1;
            if depth >= MAX_QUANTIFIED_DEPTH {
                return Some(format!(
                    "quantified groups stacked {depth} deep near `{}`; flatten the optional parts",
                    tail(&snippet)
                ));
            }
            let mut merged = group;
            merged.has_unbounded |= unbounded;
            merge_into_parent(stack, merged, depth);
            None
        }
    }
}

fn merge_into_parent(stack: &mut [GroupFrame], child: GroupFrame, depth: usize) {
    if let Some(parent) = stack.last_mut() {
        parent.has_unbounded |= child.has_unbounded;
        parent.quantified_depth = parent.quantified_depth.max(depth);
    }
}

/// Parse the quantifier starting at `i`; returns it and the index after it
/// (including a lazy `?` or possessive `+` suffix).
fn read_quantifier(chars: &[char], i: usize) -> (Option<Quantifier>, usize) {
    let (quantifier, mut next) = match chars[i] {
        '*' | '+' => (Quantifier::Unbounded, i + 1),
        '?' => (Quantifier::Bounded, i + 1),
        '{' => match read_counted(chars, i) {
            Some((q, end)) => (q, end),
            None => return (None, i + 1),
        },
        _ => return (None, i + 1),
    };
    if matches!(chars.get(next), Some('?') | Some('+')) {
        next += 1;
    }
    (Some(quantifier), next)
}

/// `{n}`, `{n,}`, `{n,m}`; anything else is a literal brace.
fn read_counted(chars: &[char], start: usize) -> Option<(Quantifier, usize)> {
    let close = chars[start..].iter().position(|c| *c == '}')? + start;
    let body: String = chars[start + 1..close].iter().collect();
    let (lo, hi) = match body.split_once(',') {
        Some((lo, hi)) => (lo.trim(), Some(hi.trim())),
        None => (body.trim(), None),
    };
    if lo.is_empty() || !lo.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let quantifier = match hi {
        Some("") => Quantifier::Unbounded,
        Some(hi) if hi.chars().all(|c| c.is_ascii_digit()) => Quantifier::Bounded,
        Some(_) => return None,
        None => Quantifier::Bounded,
    };
    Some((quantifier, close + 1))
}

fn next_is_quantifier(chars: &[char], i: usize) -> bool {
    match chars.get(i) {
        Some('*') | Some('+') | Some('?') => true,
        Some('{') => read_counted(chars, i).is_some(),
        _ => false,
    }
}

/// Index just past the character class opening at `start`.
fn skip_class(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    if chars.get(i) == Some(&'^') {
        i += 1;
    }
    // A leading `]` is literal.
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '[' if chars.get(i + 1) == Some(&':') => {
                // POSIX class like [:alpha:]
                while i < chars.len() && !(chars[i] == ']' && i > 0 && chars[i - 1] == ':') {
                    i += 1;
                }
                i += 1;
            }
            '[' => i = skip_class(chars, i),
            ']' => return i + 1,
            _ => i += 1,
        }
    }
    i
}

fn tail(snippet: &str) -> String {
    let chars: Vec<char> = snippet.chars().collect();
    let start = chars.len().saturating_sub(24);
    chars[start..].iter().collect()
}
