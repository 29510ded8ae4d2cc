//! Building generated source into a native executable.
//!
//! Generated programs import `llmc::runtime`, so they must be compiled from
//! the compiler crate root: the source is written as a temporary `src/bin`
//! member, built with `cargo build --bin`, and the produced binary is copied
//! into the caller's output directory. The temporary source is removed
//! afterwards (or preserved on request).

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};

/// Root of the llmc crate, baked in at compile time so builds work no matter
/// where the compiler binary is invoked from.
fn module_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Options for [`build_from_code`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Directory receiving the final binary. Defaults to the current
    /// directory; created when missing.
    pub output_dir: PathBuf,

    /// Binary name. Defaults to `workflow`.
    pub output_name: String,

    /// Keep the generated source next to the binary for inspection.
    pub keep_source: bool,

    /// Where to save the source when `keep_source` is set. Defaults to
    /// `output_dir`.
    pub source_dir: Option<PathBuf>,
}

/// Paths produced by a successful build.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub binary_path: PathBuf,
    /// Set only when the source was preserved.
    pub source_path: Option<PathBuf>,
}

/// Compiles generated code into a standalone binary placed in
/// `opts.output_dir`. On build failure the temporary source is removed and
/// the full compiler output is returned as the error payload.
pub fn build_from_code(code: &str, opts: &BuildOptions) -> Result<BuildResult> {
    let output_dir = if opts.output_dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        opts.output_dir.clone()
    };
    let output_name = if opts.output_name.is_empty() {
        "workflow"
    } else {
        opts.output_name.as_str()
    };

    let root = module_root();
    let bin_dir = root.join("src").join("bin");
    std::fs::create_dir_all(&bin_dir).context("failed to create temp build dir")?;

    let source_file = bin_dir.join(format!("{}.rs", output_name));
    std::fs::write(&source_file, code).context("failed to write generated code")?;

    let abs_output_dir = ensure_dir(&output_dir)?;
    let binary_path = abs_output_dir.join(output_name);

    println!("🔨 Building {}...", binary_path.display());

    let output = Command::new("cargo")
        .args(["build", "--bin", output_name])
        .current_dir(&root)
        .output();

    let output = match output {
        Ok(out) => out,
        Err(e) => {
            let _ = std::fs::remove_file(&source_file);
            return Err(e).context("failed to run cargo");
        }
    };

    if !output.status.success() {
        let _ = std::fs::remove_file(&source_file);
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        bail!("build error ({}):\n{}", output.status, combined);
    }

    let built = root.join("target").join("debug").join(output_name);
    std::fs::copy(&built, &binary_path).with_context(|| {
        format!(
            "failed to copy binary from {} to {}",
            built.display(),
            binary_path.display()
        )
    })?;

    let mut result = BuildResult {
        binary_path,
        source_path: None,
    };

    if opts.keep_source {
        let dest_dir = opts.source_dir.clone().unwrap_or(output_dir);
        let dest = ensure_dir(&dest_dir)?.join(format!("{}.rs", output_name));
        if dest != source_file {
            std::fs::copy(&source_file, &dest)
                .with_context(|| format!("failed to save source to {}", dest.display()))?;
        }
        result.source_path = Some(dest);
    }

    let _ = std::fs::remove_file(&source_file);
    Ok(result)
}

/// Writes generated code to `path`, creating parent directories as needed.
pub fn save_to_file(path: &Path, code: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, code).with_context(|| format!("failed to write {}", path.display()))
}

fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;
    std::fs::canonicalize(dir).with_context(|| format!("invalid output dir {}", dir.display()))
}
