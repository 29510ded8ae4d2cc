use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use llmc::compiler::{self, Options};

/// Compile declarative workflow definitions into standalone executables.
#[derive(Parser)]
#[command(name = "llmc", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a workflow file into a runnable pipeline binary
    Compile {
        /// Workflow YAML file
        file: Option<PathBuf>,

        /// Workflow YAML file (alternative to the positional argument)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output directory for the binary
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Preserve the generated source alongside the binary
        #[arg(long)]
        keep_source: bool,

        /// Generate source only; skip the native build
        #[arg(long)]
        skip_build: bool,
    },
}

fn main() -> ExitCode {
    match Cli::parse().command {
        Commands::Compile {
            file,
            input,
            output,
            keep_source,
            skip_build,
        } => {
            let Some(input) = input.or(file) else {
                println!("❌ No workflow file given (pass a path or use -i <file>)");
                return ExitCode::FAILURE;
            };
            run_compile(input, output, keep_source, skip_build)
        }
    }
}

fn run_compile(input: PathBuf, output: PathBuf, keep_source: bool, skip_build: bool) -> ExitCode {
    println!("🔧 Starting compilation...");
    println!("✅ Workflow file: {}", input.display());
    println!("📦 Output target folder: {}", output.display());

    let opts = Options {
        output_dir: output,
        output_name: String::new(),
        skip_build,
        keep_source,
    };

    match compiler::compile_file(&input, &opts) {
        Ok(result) => {
            for wf in &result.workflows {
                println!("📋 Workflow loaded: {} ({} steps)", wf.name, wf.steps.len());
            }
            if let Some(source) = &result.source_file {
                println!("✅ Code generated at {}", source.display());
            }
            if let Some(binary) = &result.binary_file {
                println!("✅ Build complete! Run with: {}", binary.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}
