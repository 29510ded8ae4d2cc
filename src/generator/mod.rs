//! Lowering validated workflows into a standalone Rust program.
//!
//! The generated source is the contract surface of the compiler: it must be
//! deterministic, warning-free, and semantically faithful to the workflow
//! definitions. It links against `llmc::runtime` and is built from the
//! compiler crate root (see `build`).

use std::collections::HashMap;
use std::fmt::Write as _;

use anyhow::{bail, Result};

use crate::workflow::{Step, Workflow, KIND_LLM, KIND_LOCAL_LLM, KIND_SHELL};

mod build;

pub use build::{build_from_code, save_to_file, BuildOptions, BuildResult};

/// Prefixed workflow key for the i-th (1-based) workflow: `"<i>_<name>"`.
/// These keys identify workflows in the run artifact's `contexts` map.
pub fn workflow_key(index: usize, name: &str) -> String {
    format!("{}_{}", index, name)
}

/// Qualified signal identifier for the j-th (1-based) step of the i-th
/// workflow: `"<i>_<wf>.<i>_<j>/<total>_<step>"`. Part of the run artifact
/// contract.
pub fn signal_id(wf_index: usize, wf_name: &str, step_index: usize, total: usize, step_name: &str) -> String {
    format!(
        "{}_{}.{}_{}/{}_{}",
        wf_index, wf_name, wf_index, step_index, total, step_name
    )
}

/// Builds the lookup table from source-form keys (`"wfName.stepName"`) to
/// qualified signal identifiers. `wait_for` references resolve through this
/// map; unresolved references pass through unchanged.
pub fn signal_id_map(workflows: &[Workflow]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (i, wf) in workflows.iter().enumerate() {
        let total = wf.steps.len();
        for (j, step) in wf.steps.iter().enumerate() {
            map.insert(
                format!("{}.{}", wf.name, step.name),
                signal_id(i + 1, &wf.name, j + 1, total, &step.name),
            );
        }
    }
    map
}

/// Escapes a string into a Rust string literal, quotes included.
fn quoted(s: &str) -> String {
    format!("{:?}", s)
}

// The generated default when a model step leaves max_tokens unset.
const DEFAULT_MAX_TOKENS: u32 = 256;

struct Needs {
    shell: bool,
    llm: bool,
    local: bool,
    condition: bool,
    sanitize: bool,
}

fn scan(workflows: &[Workflow]) -> Needs {
    let mut needs = Needs {
        shell: false,
        llm: false,
        local: false,
        condition: false,
        sanitize: false,
    };
    for step in workflows.iter().flat_map(|wf| &wf.steps) {
        match step.kind.as_str() {
            KIND_SHELL => needs.shell = true,
            KIND_LLM => needs.llm = true,
            KIND_LOCAL_LLM => needs.local = true,
            _ => {}
        }
        if !step.condition.is_empty() {
            needs.condition = true;
        }
        if step.is_model_step() && !step.output.is_empty() {
            needs.sanitize = true;
        }
    }
    needs
}

/// Generates the complete source of a program that runs `workflows`
/// concurrently: one cooperative task per workflow, sequential steps within
/// each task, cross-workflow coordination over the signal bus, and the run
/// artifact emitted after every task finishes.
pub fn generate(workflows: &[Workflow]) -> Result<String> {
    if workflows.is_empty() {
        bail!("no workflows to generate");
    }

    let needs = scan(workflows);
    let ids = signal_id_map(workflows);
    let mut out = String::new();

    out.push_str("// Generated by llmc. Do not edit.\n");
    out.push_str("\n");
    out.push_str("use std::collections::HashMap;\n");
    out.push_str("use std::sync::{Arc, Mutex};\n");
    out.push_str("\n");
    out.push_str("use llmc::runtime::artifact::write_run_artifact;\n");

    // Only the helpers the workflow set actually exercises are imported, so
    // the generated program compiles without warnings.
    let mut helpers = vec!["render_template"];
    if needs.condition {
        helpers.insert(0, "eval_condition");
    }
    if needs.sanitize {
        helpers.push("sanitize_for_shell");
    }
    writeln!(out, "use llmc::runtime::{{{}}};", helpers.join(", "))?;

    let mut types = vec!["Context", "SignalBus", "SignalMsg"];
    if needs.llm {
        types.push("LlmRuntime");
    }
    if needs.local {
        types.push("LocalLlamaRuntime");
    }
    if needs.shell {
        types.push("ShellRuntime");
    }
    writeln!(out, "use llmc::runtime::{{{}}};", types.join(", "))?;
    out.push_str("use llmc::worker;\n");
    out.push_str("\n");
    out.push_str("#[tokio::main]\n");
    out.push_str("async fn main() {\n");
    out.push_str("    // Worker children serve inference requests and never reach the scheduler.\n");
    out.push_str("    if worker::run_if_worker().await {\n");
    out.push_str("        return;\n");
    out.push_str("    }\n");
    out.push_str("\n");
    out.push_str("    let bus = SignalBus::new();\n");
    out.push_str("    let contexts: Arc<Mutex<HashMap<String, HashMap<String, String>>>> =\n");
    out.push_str("        Arc::new(Mutex::new(HashMap::new()));\n");
    if needs.shell {
        out.push_str("    let shell = ShellRuntime::new();\n");
    }
    if needs.llm {
        out.push_str("    let llm = Arc::new(LlmRuntime::new());\n");
    }
    if needs.local {
        // Local runtimes are per-workflow (the native backend is not
        // re-entrant); this list only tracks them for shutdown.
        out.push_str("    let local_runtimes: Arc<Mutex<Vec<Arc<LocalLlamaRuntime>>>> =\n");
        out.push_str("        Arc::new(Mutex::new(Vec::new()));\n");
    }
    out.push_str("\n");
    out.push_str("    let mut tasks = Vec::new();\n");
    out.push_str("\n");

    for (i, wf) in workflows.iter().enumerate() {
        emit_workflow(&mut out, i + 1, wf, &ids)?;
    }

    out.push_str("    let _ = futures::future::join_all(tasks).await;\n");
    out.push_str("\n");
    if needs.local {
        out.push_str("    // Close local inference runtimes (shuts down worker subprocesses).\n");
        out.push_str("    let local_runtimes: Vec<_> = local_runtimes.lock().unwrap().drain(..).collect();\n");
        out.push_str("    for runtime in local_runtimes {\n");
        out.push_str("        runtime.close().await;\n");
        out.push_str("    }\n");
        out.push_str("\n");
    }
    out.push_str("    let contexts = contexts.lock().unwrap().clone();\n");
    out.push_str("    let channels = bus.snapshot();\n");
    out.push_str("    if let Err(e) = write_run_artifact(&contexts, &channels) {\n");
    out.push_str("        eprintln!(\"failed to write run artifact: {}\", e);\n");
    out.push_str("    }\n");
    out.push_str("    println!(\"\\n\\u{2705} Workflows completed\");\n");
    out.push_str("}\n");

    Ok(out)
}

fn emit_workflow(
    out: &mut String,
    index: usize,
    wf: &Workflow,
    ids: &HashMap<String, String>,
) -> Result<()> {
    // ShellRuntime is Copy, so tasks capture it without an explicit clone.
    let has_llm = wf.steps.iter().any(|s| s.kind == KIND_LLM);
    let has_local = wf.steps.iter().any(|s| s.kind == KIND_LOCAL_LLM);
    let writes_vars = wf
        .steps
        .iter()
        .any(|s| !s.output.is_empty() || !s.wait_for.is_empty());

    writeln!(out, "    // Workflow: {}", wf.name)?;
    out.push_str("    {\n");
    out.push_str("        let bus = bus.clone();\n");
    out.push_str("        let contexts = Arc::clone(&contexts);\n");
    if has_llm {
        out.push_str("        let llm = Arc::clone(&llm);\n");
    }
    if has_local {
        out.push_str("        let local_runtimes = Arc::clone(&local_runtimes);\n");
    }
    out.push_str("        tasks.push(tokio::spawn(async move {\n");
    if writes_vars {
        out.push_str("            let mut ctx = Context::new();\n");
    } else {
        out.push_str("            let ctx = Context::new();\n");
    }
    if has_local {
        out.push_str("            let local_llama = Arc::new(LocalLlamaRuntime::new());\n");
        out.push_str("            local_runtimes.lock().unwrap().push(Arc::clone(&local_llama));\n");
    }

    let total = wf.steps.len();
    for (j, step) in wf.steps.iter().enumerate() {
        let qualified = signal_id(index, &wf.name, j + 1, total, &step.name);
        out.push_str("\n");
        writeln!(out, "            // Step: {}", step.name)?;
        emit_step(out, step, &qualified, ids)?;
    }

    out.push_str("\n");
    out.push_str("            contexts\n");
    out.push_str("                .lock()\n");
    out.push_str("                .unwrap()\n");
    writeln!(
        out,
        "                .insert({}.to_string(), ctx.into_vars());",
        quoted(&workflow_key(index, &wf.name))
    )?;
    out.push_str("        }));\n");
    out.push_str("    }\n");
    out.push_str("\n");
    Ok(())
}

fn emit_step(
    out: &mut String,
    step: &Step,
    qualified: &str,
    ids: &HashMap<String, String>,
) -> Result<()> {
    // Wait gate: consume the producer's signal before anything else. The
    // received value is stored under the source-form key so templates can
    // reference {{producer.step}} literally.
    if !step.wait_for.is_empty() {
        let resolved = ids
            .get(&step.wait_for)
            .map(String::as_str)
            .unwrap_or(step.wait_for.as_str());
        writeln!(
            out,
            "            match bus.wait({}, {}).await {{",
            quoted(resolved),
            step.wait_timeout
        )?;
        out.push_str("                Ok(msg) => {\n");
        out.push_str("                    if let Some(err) = msg.err {\n");
        writeln!(
            out,
            "                        eprintln!(\"producer {{}} failed: {{}}\", {}, err);",
            quoted(resolved)
        )?;
        writeln!(
            out,
            "                        bus.publish({}, SignalMsg::err(err));",
            quoted(qualified)
        )?;
        out.push_str("                        return;\n");
        out.push_str("                    }\n");
        writeln!(
            out,
            "                    ctx.set({}, msg.val);",
            quoted(&step.wait_for)
        )?;
        out.push_str("                }\n");
        out.push_str("                Err(e) => {\n");
        out.push_str("                    eprintln!(\"{}\", e);\n");
        writeln!(
            out,
            "                    bus.publish({}, SignalMsg::err(e.to_string()));",
            quoted(qualified)
        )?;
        out.push_str("                    return;\n");
        out.push_str("                }\n");
        out.push_str("            }\n");
    }

    let (body_indent, conditional) = if step.condition.is_empty() {
        ("            ", false)
    } else {
        writeln!(
            out,
            "            if eval_condition(ctx.vars(), {}) {{",
            quoted(&step.condition)
        )?;
        ("                ", true)
    };

    match step.kind.as_str() {
        KIND_SHELL => emit_shell_body(out, body_indent, step, qualified)?,
        KIND_LLM | KIND_LOCAL_LLM => emit_model_body(out, body_indent, step, qualified)?,
        other => bail!("unknown step kind: {}", other),
    }

    if conditional {
        out.push_str("            }\n");
    }
    Ok(())
}

fn emit_shell_body(out: &mut String, ind: &str, step: &Step, qualified: &str) -> Result<()> {
    writeln!(
        out,
        "{ind}let cmd = render_template({}, ctx.vars());",
        quoted(&step.command)
    )?;
    writeln!(out, "{ind}match shell.run(&cmd).await {{")?;
    if step.output.is_empty() {
        out.push_str(ind);
        out.push_str("    Ok(out) => {\n");
        out.push_str(ind);
        out.push_str("        if !out.is_empty() {\n");
        out.push_str(ind);
        out.push_str("            print!(\"{}\", out);\n");
        out.push_str(ind);
        out.push_str("        }\n");
        out.push_str(ind);
        out.push_str("    }\n");
    } else {
        out.push_str(ind);
        out.push_str("    Ok(out) => {\n");
        writeln!(out, "{ind}        ctx.set({}, out.clone());", quoted(&step.output))?;
        writeln!(
            out,
            "{ind}        bus.publish({}, SignalMsg::ok(out));",
            quoted(qualified)
        )?;
        out.push_str(ind);
        out.push_str("    }\n");
    }
    out.push_str(ind);
    out.push_str("    Err(e) => {\n");
    writeln!(
        out,
        "{ind}        bus.publish({}, SignalMsg::err(e.to_string()));",
        quoted(qualified)
    )?;
    out.push_str(ind);
    out.push_str("        return;\n");
    out.push_str(ind);
    out.push_str("    }\n");
    out.push_str(ind);
    out.push_str("}\n");
    Ok(())
}

fn emit_model_body(out: &mut String, ind: &str, step: &Step, qualified: &str) -> Result<()> {
    // Prompts are emitted as raw string literals so multi-line text survives
    // verbatim. Prompts containing the closing delimiter cannot be lowered.
    if step.prompt.contains("\"#") {
        bail!(
            "prompt for step {} contains a raw string terminator (\"#)",
            step.name
        );
    }

    let max_tokens = if step.max_tokens > 0 {
        step.max_tokens
    } else {
        DEFAULT_MAX_TOKENS
    };
    let runtime_var = if step.kind == KIND_LOCAL_LLM {
        "local_llama"
    } else {
        "llm"
    };

    writeln!(out, "{ind}let prompt = r#\"{}\"#;", step.prompt)?;
    out.push_str(ind);
    out.push_str("let prompt = render_template(prompt, ctx.vars());\n");
    writeln!(
        out,
        "{ind}match {}.generate(&prompt, {}, {}).await {{",
        runtime_var,
        quoted(&step.model),
        max_tokens
    )?;
    if step.output.is_empty() {
        out.push_str(ind);
        out.push_str("    Ok(_) => {}\n");
    } else {
        out.push_str(ind);
        out.push_str("    Ok(result) => {\n");
        writeln!(out, "{ind}        let out = sanitize_for_shell(&result);")?;
        writeln!(out, "{ind}        ctx.set({}, out.clone());", quoted(&step.output))?;
        writeln!(
            out,
            "{ind}        bus.publish({}, SignalMsg::ok(out));",
            quoted(qualified)
        )?;
        out.push_str(ind);
        out.push_str("    }\n");
    }
    out.push_str(ind);
    out.push_str("    Err(e) => {\n");
    writeln!(
        out,
        "{ind}        bus.publish({}, SignalMsg::err(e.to_string()));",
        quoted(qualified)
    )?;
    out.push_str(ind);
    out.push_str("        return;\n");
    out.push_str(ind);
    out.push_str("    }\n");
    out.push_str(ind);
    out.push_str("}\n");
    Ok(())
}
