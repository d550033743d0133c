//! smelt core library
//!
//! Core functionality for the smelt transpiler, which lowers a small C-like
//! systems language to WebAssembly text format:
//! - Expression simplification (constant folding, identity elimination,
//!   additive-chain refolding)
//! - Type-directed expression and statement emission over a typed
//!   instruction model
//! - Effective-address calculation for struct, array and pointer lvalues
//! - Multi-pass peephole optimization of the emitted instruction stream
//! - WAT text rendering
//!
//! The lexer and grammar parser are external collaborators: the core accepts
//! the parser's string-tagged tree (see [`ast`]) and returns per-function
//! builders whose instruction lists validate as WebAssembly.
//!
//! ```no_run
//! use smelt_core::{compile::Compiler, render};
//! # use anyhow::Result;
//! # fn example(ast: smelt_core::ast::ModuleAst) -> Result<()> {
//! let mut compiler = Compiler::new(&ast)?;
//! let module = compiler.compile(&ast)?;
//! println!("{}", render::render_module(&module));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod ast;
pub mod builder;
pub mod cast;
pub mod check;
pub mod compile;
pub mod diag;
pub mod emit;
pub mod instr;
pub mod optimize;
pub mod render;
pub mod simplify;
pub mod types;

pub use builder::FunctionBuilder;
pub use compile::{CompiledModule, Compiler};
pub use diag::{Diagnostic, Diagnostics, ErrorCode, LogTrace, NullTrace, TraceSink};
pub use instr::Instruction;
pub use types::{Intrinsic, TypeSpec, ValueType};
