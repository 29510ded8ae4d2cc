//! Workflow model shared by the parser, the validator and the generator.

use serde::{Deserialize, Serialize};

mod parser;
mod validate;

pub use parser::load_workflows;
pub use validate::validate_workflows;

/// Step kind executing a shell command through the host interpreter.
pub const KIND_SHELL: &str = "shell";
/// Step kind calling a remote LLM API (OpenAI-compatible).
pub const KIND_LLM: &str = "llm";
/// Step kind running inference locally through the llama backend.
pub const KIND_LOCAL_LLM: &str = "local_llm";

/// A named, ordered sequence of steps executed as one cooperative task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A single unit of work: a shell command or a model invocation, with
/// optional gating and a cross-workflow dependency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub name: String,

    /// One of `shell`, `llm`, `local_llm`. `type` is accepted as an alias.
    #[serde(default, alias = "type")]
    pub kind: String,

    /// Shell command template, rendered against the workflow variable map.
    #[serde(default)]
    pub command: String,

    /// Model prompt template, rendered before dispatch.
    #[serde(default)]
    pub prompt: String,

    /// Model identifier or filesystem path (see runtime::local for
    /// resolution rules).
    #[serde(default)]
    pub model: String,

    /// Output length cap for model steps. Zero means backend default; the
    /// generator emits 256 when unset.
    #[serde(default)]
    pub max_tokens: u32,

    /// Variable name receiving the step result. Absent means the result is
    /// discarded (shell output streams to stdout instead).
    #[serde(default)]
    pub output: String,

    /// Gating expression, e.g. `{{mode}} == 'production'`. The step executes
    /// only when it evaluates true.
    #[serde(default, rename = "if")]
    pub condition: String,

    /// Qualified key `workflowName.stepName` of a producing step. When set,
    /// this step blocks until that signal arrives; the received value is
    /// stored into the local variable map under the same source-form key.
    #[serde(default)]
    pub wait_for: String,

    /// Seconds to wait for the producer. Zero means block indefinitely.
    #[serde(default)]
    pub wait_timeout: u64,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

impl Step {
    /// Shell step with the given command.
    pub fn shell(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: KIND_SHELL.to_string(),
            command: command.into(),
            ..Self::default()
        }
    }

    /// Remote LLM step with the given prompt.
    pub fn llm(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: KIND_LLM.to_string(),
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Local LLM step with the given prompt.
    pub fn local_llm(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: KIND_LOCAL_LLM.to_string(),
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn with_wait_for(mut self, wait_for: impl Into<String>, timeout: u64) -> Self {
        self.wait_for = wait_for.into();
        self.wait_timeout = timeout;
        self
    }

    pub fn is_model_step(&self) -> bool {
        self.kind == KIND_LLM || self.kind == KIND_LOCAL_LLM
    }
}
