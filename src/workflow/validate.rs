//! Structural validation applied before any code generation.

use std::collections::HashSet;

use anyhow::{bail, Result};

use super::{Step, Workflow, KIND_LLM, KIND_LOCAL_LLM, KIND_SHELL};

impl Workflow {
    /// Checks that the workflow is structurally sound: a non-empty name, at
    /// least one step, and per-step requirements for each kind.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("workflow name is required");
        }
        if self.steps.is_empty() {
            bail!("workflow must have at least one step");
        }

        for (i, step) in self.steps.iter().enumerate() {
            if step.name.is_empty() {
                bail!("step {} is missing a name", i + 1);
            }
            validate_step(step)?;
        }
        Ok(())
    }
}

fn validate_step(step: &Step) -> Result<()> {
    match step.kind.as_str() {
        KIND_SHELL => {
            if step.command.is_empty() {
                bail!("shell step {} missing command", step.name);
            }
        }
        KIND_LLM | KIND_LOCAL_LLM => {
            if step.prompt.is_empty() {
                bail!("llm step {} missing prompt", step.name);
            }
            if step.model.is_empty() {
                bail!("llm step {} missing model", step.name);
            }
        }
        other => bail!("unknown step kind: {}", other),
    }
    Ok(())
}

/// Validates every workflow in a compile set. Beyond per-workflow checks,
/// workflow names must be unique: source-form `wait_for` keys
/// (`workflowName.stepName`) could not be resolved otherwise.
pub fn validate_workflows(workflows: &[Workflow]) -> Result<()> {
    let mut seen = HashSet::new();
    for wf in workflows {
        wf.validate()?;
        if !seen.insert(wf.name.as_str()) {
            bail!("duplicate workflow name: {}", wf.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_workflow_passes() {
        let wf = Workflow::new("test").with_step(Step::shell("step1", "echo hello"));
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn missing_name_fails() {
        let mut wf = Workflow::new("").with_step(Step::shell("step1", "echo hello"));
        wf.name.clear();
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("name is required"));
    }

    #[test]
    fn empty_steps_fail() {
        let wf = Workflow::new("test");
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("at least one step"));
    }

    #[test]
    fn step_without_name_fails() {
        let wf = Workflow::new("test").with_step(Step::shell("", "echo hello"));
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("missing a name"));
    }

    #[test]
    fn shell_step_requires_command() {
        let wf = Workflow::new("test").with_step(Step::shell("run", ""));
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("missing command"));
    }

    #[test]
    fn model_steps_require_prompt_and_model() {
        let wf = Workflow::new("test").with_step(Step::llm("ask", ""));
        assert!(wf.validate().unwrap_err().to_string().contains("missing prompt"));

        let wf = Workflow::new("test").with_step(Step::local_llm("ask", "hello"));
        assert!(wf.validate().unwrap_err().to_string().contains("missing model"));
    }

    #[test]
    fn unknown_kind_fails() {
        let mut step = Step::shell("run", "echo hello");
        step.kind = "docker".to_string();
        let wf = Workflow::new("test").with_step(step);
        let err = wf.validate().unwrap_err();
        assert_eq!(err.to_string(), "unknown step kind: docker");
    }

    #[test]
    fn duplicate_workflow_names_are_rejected() {
        let a = Workflow::new("dup").with_step(Step::shell("one", "echo 1"));
        let b = Workflow::new("dup").with_step(Step::shell("two", "echo 2"));
        let err = validate_workflows(&[a, b]).unwrap_err();
        assert!(err.to_string().contains("duplicate workflow name: dup"));
    }

    #[test]
    fn distinct_workflow_names_pass() {
        let a = Workflow::new("a").with_step(Step::shell("one", "echo 1"));
        let b = Workflow::new("b").with_step(Step::shell("two", "echo 2"));
        assert!(validate_workflows(&[a, b]).is_ok());
    }
}
