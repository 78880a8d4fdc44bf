//! Selva backend CLI

use clap::{Parser, Subcommand};
use selva_cli::trace;
use selva_ir::{BuildResult, BuilderContext};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "selva")]
#[command(version = "0.1.0")]
#[command(about = "Selva backend driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replays an action trace and dumps the final IR
    Ir {
        /// Input trace file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Skip the loop optimization pipeline
        #[arg(long)]
        no_opt: bool,
    },

    /// Replays an action trace and reports diagnostics only
    Check {
        /// Input trace file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ir { input, output, no_opt } => {
            let BuildResult { mut module, loop_records, mut diagnostics } =
                build_from_file(&input);

            if !no_opt && !loop_records.is_empty() {
                match selva_opt::optimize_module(&module, &loop_records) {
                    Ok(rewritten) => module = rewritten,
                    Err(err) => {
                        tracing::error!("{}", err);
                        diagnostics.push(err);
                    }
                }
            }

            module.finalize();
            if diagnostics.has_errors() {
                eprintln!("{}", diagnostics.render());
            }

            let dump = module.to_string();
            match output {
                Some(path) => {
                    if let Err(e) = fs::write(&path, dump) {
                        eprintln!("error: cannot write {}: {}", path.display(), e);
                        process::exit(1);
                    }
                }
                None => print!("{}", dump),
            }
        }

        Commands::Check { input } => {
            let result = build_from_file(&input);
            if result.diagnostics.has_errors() {
                eprintln!("{}", result.diagnostics.render());
                process::exit(1);
            }
            println!("OK: no diagnostics");
        }
    }
}

/// Reads and replays a trace file; exits on I/O or trace errors
fn build_from_file(input: &Path) -> BuildResult {
    let source = match fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: cannot read {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    let mut ctx = BuilderContext::new("selva_program");
    if let Err(e) = trace::replay(&source, &mut ctx) {
        eprintln!("error: {}: {}", input.display(), e);
        process::exit(1);
    }
    ctx.finish()
}
