//! `flvc` — thin driver over the front-end.
//!
//! Success exits 0; any diagnostic renders to stderr with a caret under the
//! offending span and exits 2.

use clap::{Parser, Subcommand};
use flavent::{analyze, AnalyzeOptions, Diagnostic, ModuleCache};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "flvc", version, about = "Flavent front-end")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lex a file and print its token stream.
    Lex { file: PathBuf },
    /// Parse a file and print the AST as JSON.
    Parse { file: PathBuf },
    /// Run the full pipeline: resolve, lower, type/effect check.
    Check {
        file: PathBuf,
        /// Print the resolution and HIR as JSON on success.
        #[arg(long)]
        json: bool,
        /// Skip the stdlib prelude.
        #[arg(long)]
        no_stdlib: bool,
        /// Additional module roots, searched after the stdlib.
        #[arg(long)]
        root: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Diagnostic { source, diag }) => {
            eprint!("{}", diag.render_styled(&source, true));
            ExitCode::from(2)
        }
        Err(RunError::Io(msg)) => {
            eprintln!("flvc: {}", msg);
            ExitCode::from(2)
        }
    }
}

enum RunError {
    Diagnostic { source: String, diag: Diagnostic },
    Io(String),
}

fn read_source(file: &PathBuf) -> Result<String, RunError> {
    std::fs::read_to_string(file)
        .map_err(|e| RunError::Io(format!("{}: {}", file.display(), e)))
}

fn run(cli: Cli) -> Result<(), RunError> {
    match cli.command {
        Command::Lex { file } => {
            let src = read_source(&file)?;
            let path = file.to_string_lossy();
            let tokens = flavent::lexer::lex(&path, &src)
                .map_err(|diag| RunError::Diagnostic { source: src.clone(), diag })?;
            for tok in tokens {
                println!("{}", tok);
            }
            Ok(())
        }
        Command::Parse { file } => {
            let src = read_source(&file)?;
            let path = file.to_string_lossy();
            let prog = flavent::lexer::lex(&path, &src)
                .and_then(flavent::parser::parse_program)
                .map_err(|diag| RunError::Diagnostic { source: src.clone(), diag })?;
            println!(
                "{}",
                serde_json::to_string_pretty(&prog).unwrap_or_else(|e| e.to_string())
            );
            Ok(())
        }
        Command::Check {
            file,
            json,
            no_stdlib,
            root,
        } => {
            let src = read_source(&file)?;
            let path = file.to_string_lossy();
            let opts = AnalyzeOptions {
                use_stdlib: !no_stdlib,
                module_roots: root,
            };
            let mut cache = ModuleCache::new();
            let analysis = analyze(&path, &src, &opts, &mut cache)
                .map_err(|diag| RunError::Diagnostic { source: src.clone(), diag })?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&analysis).unwrap_or_else(|e| e.to_string())
                );
            } else {
                println!("ok: {}", file.display());
            }
            Ok(())
        }
    }
}
