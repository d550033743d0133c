//! smelt command-line interface
//!
//! Compiles a parsed module (the parser's JSON-serialized tree) to
//! WebAssembly text format.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::Path;
use std::time::Instant;

use smelt_core::ast::ModuleAst;
use smelt_core::{render, Compiler, Instruction, LogTrace, NullTrace};

#[derive(Parser)]
#[command(name = "smelt")]
#[command(version = "0.1.0")]
#[command(about = "smelt - C-like systems language to WebAssembly transpiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a parsed module to WebAssembly text
    Compile {
        /// Input module file (JSON tree from the parser)
        #[arg(value_name = "INPUT")]
        input: String,

        /// Output file path; stdout when omitted
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<String>,

        /// Emit the diagnostic trace stream to stderr
        #[arg(long)]
        trace: bool,

        /// Show compilation statistics
        #[arg(long)]
        stats: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Compile {
            input,
            output,
            trace,
            stats,
        } => compile_command(input, output, trace, stats),
        Commands::Version => {
            println!("smelt {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn compile_command(
    input: String,
    output: Option<String>,
    trace: bool,
    stats: bool,
) -> Result<()> {
    if trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing_subscriber::filter::LevelFilter::TRACE)
            .with_writer(std::io::stderr)
            .init();
    }

    let input_path = Path::new(&input);
    if !input_path.exists() {
        return Err(anyhow!("Input file not found: {}", input));
    }
    let text = fs::read_to_string(input_path).context("Failed to read input file")?;
    let ast: ModuleAst = serde_json::from_str(&text).context("Failed to parse module tree")?;

    let start = Instant::now();
    let mut compiler = if trace {
        Compiler::with_trace(&ast, Box::new(LogTrace))?
    } else {
        Compiler::with_trace(&ast, Box::new(NullTrace))?
    };
    let module = compiler.compile(&ast)?;
    let elapsed = start.elapsed();

    for diagnostic in compiler.diagnostics.iter() {
        eprintln!("{diagnostic}");
    }

    let wat = render::render_module(&module);
    match &output {
        Some(path) => {
            fs::write(path, &wat).context("Failed to write output file")?;
            println!("Wrote {}", path);
        }
        None => print!("{wat}"),
    }

    if stats {
        let instructions: usize = module.functions.iter().map(|f| count(&f.instructions)).sum();
        println!("\nCompilation statistics");
        println!("Functions:    {}", module.functions.len());
        println!("Instructions: {instructions}");
        println!("Diagnostics:  {}", compiler.diagnostics.len());
        println!("Time:         {} us", elapsed.as_micros());
    }

    if compiler.diagnostics.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "compilation finished with {} diagnostics",
            compiler.diagnostics.len()
        ))
    }
}

/// Count instructions including nested bodies.
fn count(instructions: &[Instruction]) -> usize {
    instructions
        .iter()
        .map(|instruction| match instruction {
            Instruction::Block { body, .. } | Instruction::Loop { body, .. } => 1 + count(body),
            Instruction::If {
                then_body,
                else_body,
                ..
            } => 1 + count(then_body) + count(else_body),
            _ => 1,
        })
        .sum()
}
