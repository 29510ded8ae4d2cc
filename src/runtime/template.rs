//! Substitution of `{{key}}` placeholders into command and prompt text.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// Keys may contain dots so consumer templates can reference imported
// producer values under their source-form qualified key.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").unwrap());

/// Renders a template against a variable map. `{{key}}` (optional whitespace
/// inside the braces) is replaced with the mapped value; missing keys render
/// as the empty string. Pure; performs no I/O.
pub fn render_template(input: &str, vars: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(input, |caps: &Captures| {
            vars.get(&caps[1]).map(String::as_str).unwrap_or("").to_string()
        })
        .into_owned()
}
