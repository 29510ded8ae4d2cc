//! Shell-safety sanitization of model output.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// Matches an already-escaped quote (left alternative, preserved) or a bare
// quote (right alternative, escaped). Keeps the transform idempotent.
static QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\\"|""#).unwrap());

/// Prepares free-form text (LLM output) for embedding inside a double-quoted
/// shell argument: removes NULs, collapses whitespace runs to single spaces,
/// trims, and escapes bare double quotes. Model output flows into later
/// shell commands; this is the sole line of defense against accidental
/// multi-line command injection.
pub fn sanitize_for_shell(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let s = s.replace('\0', "");
    let s = WHITESPACE_RUN.replace_all(&s, " ");
    let s = s.trim();
    QUOTE
        .replace_all(s, |caps: &regex::Captures| {
            if &caps[0] == "\"" {
                "\\\"".to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}
