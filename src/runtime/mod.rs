//! Runtime services linked into every generated workflow executable.
//!
//! Generated programs drive these services directly: they render templates
//! against their variable map, evaluate step guards, run shell commands and
//! model inference, coordinate across workflows through the signal bus, and
//! serialize the run artifact once every workflow task has finished.

// Run artifact serialization
pub mod artifact;

// Step guard evaluation
pub mod condition;

// Per-workflow variable map
pub mod context;

// Remote LLM client (OpenAI-compatible)
pub mod llm;

// Local inference client (in-process or subprocess-backed)
pub mod local;

// Shell-safety sanitization of model output
pub mod sanitize;

// Shell command execution
pub mod shell;

// Cross-workflow publish/subscribe coordination
pub mod signals;

// `{{key}}` template rendering
pub mod template;

pub use condition::eval_condition;
pub use context::Context;
pub use llm::LlmRuntime;
pub use local::LocalLlamaRuntime;
pub use sanitize::sanitize_for_shell;
pub use shell::ShellRuntime;
pub use signals::{SignalBus, SignalMsg};
pub use template::render_template;
