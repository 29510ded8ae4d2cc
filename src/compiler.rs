//! Compilation façade: parse, validate, generate, build.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::generator::{self, BuildOptions};
use crate::workflow::{load_workflows, validate_workflows, Workflow};

/// Where a compilation failed. Every kind aborts the compile; build errors
/// carry the full underlying compiler output.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("workflow file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to load workflows: {0}")]
    Parse(#[source] anyhow::Error),

    #[error("validation error: {0}")]
    Validation(#[source] anyhow::Error),

    #[error("code generation failed: {0}")]
    Codegen(#[source] anyhow::Error),

    #[error("build failed: {0}")]
    Build(#[source] anyhow::Error),
}

/// Options for a compile run.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Directory receiving the binary (and kept source). Defaults to the
    /// current directory.
    pub output_dir: PathBuf,

    /// Overrides the output name. Defaults to the input file stem, or
    /// `workflows` for multi-workflow struct-level compiles.
    pub output_name: String,

    /// Generate source only; skip the native build.
    pub skip_build: bool,

    /// Preserve the generated source alongside the binary.
    pub keep_source: bool,
}

/// Artifacts of a successful compile.
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// Path to the generated source. Set when the source was preserved or
    /// the build was skipped.
    pub source_file: Option<PathBuf>,

    /// Path to the compiled binary. None when the build was skipped.
    pub binary_file: Option<PathBuf>,

    /// The parsed workflow definitions.
    pub workflows: Vec<Workflow>,
}

/// Compiles a YAML workflow file into a standalone binary.
pub fn compile_file(input: impl AsRef<Path>, opts: &Options) -> Result<CompileResult, CompileError> {
    let input = input.as_ref();
    if !input.is_file() {
        return Err(CompileError::FileNotFound(input.to_path_buf()));
    }

    let workflows = load_workflows(input).map_err(CompileError::Parse)?;

    let output_name = if opts.output_name.is_empty() {
        input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workflow".to_string())
    } else {
        opts.output_name.clone()
    };

    compile_validated(workflows, opts, output_name)
}

/// Compiles workflow structs (built programmatically) into a standalone
/// binary.
pub fn compile(workflows: Vec<Workflow>, opts: &Options) -> Result<CompileResult, CompileError> {
    let output_name = if !opts.output_name.is_empty() {
        opts.output_name.clone()
    } else if workflows.len() == 1 {
        workflows[0].name.clone()
    } else {
        "workflows".to_string()
    };

    compile_validated(workflows, opts, output_name)
}

fn compile_validated(
    workflows: Vec<Workflow>,
    opts: &Options,
    output_name: String,
) -> Result<CompileResult, CompileError> {
    validate_workflows(&workflows).map_err(CompileError::Validation)?;

    let code = generator::generate(&workflows).map_err(CompileError::Codegen)?;

    let output_dir = if opts.output_dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        opts.output_dir.clone()
    };

    if opts.skip_build {
        let source_path = output_dir.join(format!("{}.rs", output_name));
        generator::save_to_file(&source_path, &code).map_err(CompileError::Build)?;
        return Ok(CompileResult {
            source_file: Some(source_path),
            binary_file: None,
            workflows,
        });
    }

    let built = generator::build_from_code(
        &code,
        &BuildOptions {
            output_dir,
            output_name,
            keep_source: opts.keep_source,
            source_dir: None,
        },
    )
    .map_err(CompileError::Build)?;

    Ok(CompileResult {
        source_file: built.source_path,
        binary_file: Some(built.binary_path),
        workflows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Step;

    #[test]
    fn missing_input_file_is_reported() {
        let err = compile_file("/nonexistent/wf.yaml", &Options::default()).unwrap_err();
        assert!(matches!(err, CompileError::FileNotFound(_)));
    }

    #[test]
    fn validation_failures_abort_the_compile() {
        let wfs = vec![Workflow::new("bad").with_step(Step::shell("run", ""))];
        let err = compile(wfs, &Options::default()).unwrap_err();
        assert!(matches!(err, CompileError::Validation(_)));
    }

    #[test]
    fn skip_build_writes_source_only() {
        let dir = tempfile::tempdir().unwrap();
        let wfs =
            vec![Workflow::new("demo").with_step(Step::shell("run", "echo hi").with_output("x"))];

        let result = compile(
            wfs,
            &Options {
                output_dir: dir.path().to_path_buf(),
                skip_build: true,
                ..Options::default()
            },
        )
        .unwrap();

        let source = result.source_file.unwrap();
        assert!(source.ends_with("demo.rs"));
        assert!(result.binary_file.is_none());

        let code = std::fs::read_to_string(source).unwrap();
        assert!(code.contains("async fn main()"));
        assert!(code.contains("1_demo.1_1/1_run"));
    }

    #[test]
    fn skip_build_from_file_uses_input_stem() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("pipeline.yaml");
        std::fs::write(
            &input,
            "name: demo\nsteps:\n  - name: run\n    kind: shell\n    command: echo hi\n",
        )
        .unwrap();

        let result = compile_file(
            &input,
            &Options {
                output_dir: dir.path().to_path_buf(),
                skip_build: true,
                ..Options::default()
            },
        )
        .unwrap();

        assert!(result.source_file.unwrap().ends_with("pipeline.rs"));
        assert_eq!(result.workflows.len(), 1);
    }

    #[test]
    fn multi_workflow_struct_compile_defaults_to_workflows_name() {
        let dir = tempfile::tempdir().unwrap();
        let wfs = vec![
            Workflow::new("a").with_step(Step::shell("one", "echo 1").with_output("x")),
            Workflow::new("b").with_step(Step::shell("two", "echo 2").with_output("y")),
        ];

        let result = compile(
            wfs,
            &Options {
                output_dir: dir.path().to_path_buf(),
                skip_build: true,
                ..Options::default()
            },
        )
        .unwrap();

        assert!(result.source_file.unwrap().ends_with("workflows.rs"));
    }
}
