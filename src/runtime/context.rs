//! Per-workflow variable state accumulated from step outputs.

use std::collections::HashMap;

/// String-to-string variable map owned exclusively by one workflow task.
/// Keys may contain dots to carry cross-workflow references verbatim
/// (e.g. `producer.final_output`). Last write wins.
#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: HashMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Returns the value for `key`, or the empty string when absent.
    pub fn get(&self, key: &str) -> &str {
        self.vars.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Consumes the context, yielding the accumulated map for the run-wide
    /// contexts snapshot.
    pub fn into_vars(self) -> HashMap<String, String> {
        self.vars
    }
}
