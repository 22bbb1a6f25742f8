use anyhow::{Context, Result};
use clap::Parser;
use clasp_cli::eval::{EvalError, State};
use clasp_cli::intrinsics::StdIo;

/// Maximum source file size in bytes (1MB)
const MAX_SOURCE_SIZE: usize = 1_000_000;

#[derive(Parser, Debug)]
#[command(name = "clasp")]
#[command(about = "Clasp: a closure-structured functional language interpreter")]
struct Cli {
    /// Path to the .clasp source file
    file: String,

    /// Print the analyzed AST as JSON and exit without evaluating
    #[arg(long)]
    dump_ast: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let src = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("failed to read {}", cli.file))?;
    if src.len() > MAX_SOURCE_SIZE {
        eprintln!(
            "Error: source file exceeds {}MB limit ({} bytes)",
            MAX_SOURCE_SIZE / 1_000_000,
            src.len()
        );
        std::process::exit(1);
    }

    let mut state = match State::new(&src) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if cli.dump_ast {
        println!("{}", serde_json::to_string_pretty(state.ast())?);
        return Ok(());
    }

    match state.execute(&mut StdIo::new()) {
        Ok(()) => {
            let Some(rendered) = state.render_result() else {
                eprintln!("Error: evaluation finished without a result");
                std::process::exit(1);
            };
            println!("<end-of-stdout>");
            println!("{rendered}");
            Ok(())
        }
        Err(e) => {
            if let EvalError::Runtime(rte) = &e {
                eprintln!();
                eprintln!(">>> stack trace printed below");
                for sl in &rte.trace {
                    eprintln!("calling function body at {sl}");
                }
            }
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
