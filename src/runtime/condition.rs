//! Evaluation of step gating expressions.

use std::collections::HashMap;

/// Evaluates a condition of the form `{{var}} == 'literal'` against the
/// variable map. The left side must be a single substitution; the right side
/// a single- or double-quoted literal. Anything else is unsupported and
/// evaluates to false with a warning.
pub fn eval_condition(vars: &HashMap<String, String>, condition: &str) -> bool {
    let cond = condition.trim();

    if let Some((left, right)) = cond.split_once("==") {
        let left = left.trim();
        let right = right.trim();

        if let Some(var_name) = left
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
        {
            let left_val = vars
                .get(var_name.trim())
                .map(String::as_str)
                .unwrap_or("");
            let right_val = right.trim_matches(|c| c == '\'' || c == '"');
            return left_val == right_val;
        }
    }

    println!("⚠️ Unsupported condition: {}", condition);
    false
}
