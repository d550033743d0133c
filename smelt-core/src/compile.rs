//! Module-level compilation: declaration table, type resolution and the
//! pipeline entry point that runs every function through the body compiler.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};

use crate::ast::{Declaration, Expression, LiteralValue, ModuleAst, TypeExpr};
use crate::builder::FunctionBuilder;
use crate::diag::{Diagnostics, ErrorCode, NullTrace, TraceSink};
use crate::emit;
use crate::instr::Value;
use crate::simplify::{self, SimplifyContext};
use crate::types::{Intrinsic, TypeSpec, TypeTable};

/// Bytes per linear-memory page.
pub const PAGE_SIZE: u32 = 65536;

/// Signature of a declared function.
#[derive(Debug, Clone)]
pub struct FunctionSig {
    /// Parameter names and storage types, in order.
    pub params: Vec<(String, TypeSpec)>,
    /// Declared result, if any.
    pub result: Option<Intrinsic>,
}

/// What a module-level name resolves to.
#[derive(Debug, Clone)]
pub enum Binding {
    /// A named compile-time constant.
    Const(LiteralValue),
    /// A module global of intrinsic type.
    Global(Intrinsic),
    /// A variable at a fixed linear-memory address.
    Variable {
        /// Byte address.
        address: u32,
        /// Storage type.
        spec: TypeSpec,
    },
    /// A declared function.
    Function(FunctionSig),
    /// A type alias.
    Alias(TypeSpec),
}

/// Name-keyed declaration lookup, shared read-only during function
/// compilation.
#[derive(Debug, Default)]
pub struct DeclTable {
    map: HashMap<String, Binding>,
}

impl DeclTable {
    /// Empty table.
    pub fn new() -> Self {
        DeclTable::default()
    }

    /// Resolve a name.
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.map.get(name)
    }

    /// Insert a binding; `false` when the name is already taken.
    pub fn insert(&mut self, name: &str, binding: Binding) -> bool {
        if self.map.contains_key(name) {
            return false;
        }
        self.map.insert(name.to_string(), binding);
        true
    }
}

/// Resolve written type syntax to a storage type.
///
/// Array counts are constant expressions; they are simplified against the
/// declaration table and must fold to a non-negative integer literal.
pub fn resolve_type(
    decls: &DeclTable,
    types: &TypeTable,
    expr: &TypeExpr,
) -> Result<TypeSpec> {
    match expr {
        TypeExpr::Named { name } => {
            if let Some(intrinsic) = Intrinsic::parse(name) {
                return Ok(TypeSpec::Intrinsic(intrinsic));
            }
            match decls.lookup(name) {
                Some(Binding::Alias(spec)) => Ok(spec.clone()),
                _ if types.struct_layout(name).is_some() => Ok(TypeSpec::Struct(name.clone())),
                _ => bail!("unknown type name {name}"),
            }
        }
        TypeExpr::Pointer { target } => Ok(TypeSpec::Pointer(Box::new(resolve_type(
            decls, types, target,
        )?))),
        TypeExpr::Array { item, count } => {
            let item = resolve_type(decls, types, item)?;
            let count = resolve_count(decls, types, count)?;
            Ok(TypeSpec::Array {
                item: Box::new(item),
                count,
            })
        }
        TypeExpr::Struct { .. } => {
            bail!("inline struct types are only allowed in type alias declarations")
        }
    }
}

fn resolve_count(decls: &DeclTable, types: &TypeTable, count: &Expression) -> Result<u32> {
    use num_traits::ToPrimitive;
    let mut expr = count.clone();
    simplify::simplify(&mut expr, &SimplifyContext { decls, types });
    match expr.as_literal() {
        Some(LiteralValue::Int(v)) if *v >= 0 => {
            u32::try_from(*v).map_err(|_| anyhow!("array count {v} out of range"))
        }
        Some(LiteralValue::BigInt(v)) => v
            .to_u32()
            .ok_or_else(|| anyhow!("array count {v} out of range")),
        _ => bail!("array count does not fold to a constant"),
    }
}

/// A module global ready for rendering.
#[derive(Debug, Clone)]
pub struct GlobalDef {
    /// Machine name.
    pub name: String,
    /// Machine type.
    pub ty: Intrinsic,
    /// Constant initializer.
    pub init: Value,
}

/// The compiled module handed to the renderer.
#[derive(Debug)]
pub struct CompiledModule {
    /// Linear-memory page count; `None` when no memory variable exists.
    pub memory_pages: Option<u32>,
    /// Globals in declaration order.
    pub globals: Vec<GlobalDef>,
    /// Compiled function bodies in declaration order.
    pub functions: Vec<FunctionBuilder>,
}

/// Whole-module compilation state: the declaration table, the size oracle,
/// the diagnostic sink and the trace stream.
pub struct Compiler {
    decls: DeclTable,
    types: TypeTable,
    /// Diagnostics reported so far.
    pub diagnostics: Diagnostics,
    trace: Box<dyn TraceSink>,
    globals: Vec<GlobalDef>,
    memory_end: u32,
}

impl Compiler {
    /// Build the semantic tables for a module. Declarations are processed in
    /// source order; constants, aliases and structs may only refer backwards.
    pub fn new(ast: &ModuleAst) -> Result<Self> {
        Compiler::with_trace(ast, Box::new(NullTrace))
    }

    /// Like [`Compiler::new`] with an explicit trace sink.
    pub fn with_trace(ast: &ModuleAst, trace: Box<dyn TraceSink>) -> Result<Self> {
        let mut compiler = Compiler {
            decls: DeclTable::new(),
            types: TypeTable::new(),
            diagnostics: Diagnostics::new(),
            trace,
            globals: Vec::new(),
            memory_end: 0,
        };
        for declaration in &ast.declarations {
            compiler.declare(declaration)?;
        }
        Ok(compiler)
    }

    fn declare(&mut self, declaration: &Declaration) -> Result<()> {
        match declaration {
            Declaration::ConstDeclaration { name, value, loc } => {
                let mut expr = value.clone();
                simplify::simplify(
                    &mut expr,
                    &SimplifyContext {
                        decls: &self.decls,
                        types: &self.types,
                    },
                );
                let Some(literal) = expr.as_literal() else {
                    self.diagnostics.report(
                        ErrorCode::UnresolvedIdentifier,
                        *loc,
                        format!("const {name} does not fold to a literal"),
                    );
                    return Ok(());
                };
                let literal = literal.clone();
                self.insert(name, Binding::Const(literal), *loc);
            }
            Declaration::GlobalDeclaration {
                name,
                spec,
                init,
                loc,
            } => {
                let Some(intrinsic) = Intrinsic::parse(spec) else {
                    self.diagnostics.report(
                        ErrorCode::IntrinsicRequired,
                        *loc,
                        format!("global {name}: {spec} is not an intrinsic type"),
                    );
                    return Ok(());
                };
                let init = match init {
                    Some(expr) => {
                        let mut expr = expr.clone();
                        simplify::simplify(
                            &mut expr,
                            &SimplifyContext {
                                decls: &self.decls,
                                types: &self.types,
                            },
                        );
                        match expr.as_literal() {
                            Some(v) => crate::cast::constant_for(intrinsic, v),
                            None => {
                                self.diagnostics.report(
                                    ErrorCode::UnresolvedIdentifier,
                                    *loc,
                                    format!("global {name} initializer is not constant"),
                                );
                                zero_value(intrinsic)
                            }
                        }
                    }
                    None => zero_value(intrinsic),
                };
                if self.insert(name, Binding::Global(intrinsic), *loc) {
                    self.globals.push(GlobalDef {
                        name: name.clone(),
                        ty: intrinsic,
                        init,
                    });
                }
            }
            Declaration::VariableDeclaration {
                name,
                address,
                spec,
                loc,
            } => {
                let spec = match resolve_type(&self.decls, &self.types, spec) {
                    Ok(spec) => spec,
                    Err(err) => {
                        self.diagnostics.report(
                            ErrorCode::IntrinsicRequired,
                            *loc,
                            format!("variable {name}: {err}"),
                        );
                        return Ok(());
                    }
                };
                let size = self.types.size_of(&spec)?;
                self.memory_end = self.memory_end.max(address.saturating_add(size));
                self.insert(
                    name,
                    Binding::Variable {
                        address: *address,
                        spec,
                    },
                    *loc,
                );
            }
            Declaration::TypeAlias { name, spec, loc } => {
                let resolved = match spec {
                    TypeExpr::Struct { fields } => {
                        let mut resolved_fields = Vec::with_capacity(fields.len());
                        for field in fields {
                            let spec = resolve_type(&self.decls, &self.types, &field.spec)
                                .with_context(|| {
                                    format!("field {} of struct {name}", field.name)
                                })?;
                            resolved_fields.push((field.name.clone(), spec));
                        }
                        self.types.declare_struct(name, resolved_fields)?;
                        TypeSpec::Struct(name.clone())
                    }
                    other => resolve_type(&self.decls, &self.types, other)
                        .with_context(|| format!("type alias {name}"))?,
                };
                self.insert(name, Binding::Alias(resolved), *loc);
            }
            Declaration::FunctionDeclaration(func) => {
                let mut params = Vec::with_capacity(func.params.len());
                for param in &func.params {
                    let spec = match resolve_type(&self.decls, &self.types, &param.spec) {
                        Ok(spec) => spec,
                        Err(err) => {
                            self.diagnostics.report(
                                ErrorCode::IntrinsicRequired,
                                func.loc,
                                format!("parameter {}: {err}", param.name),
                            );
                            TypeSpec::Intrinsic(Intrinsic::I32)
                        }
                    };
                    params.push((param.name.clone(), spec));
                }
                let result = match &func.result {
                    Some(name) => match Intrinsic::parse(name) {
                        Some(intrinsic) => Some(intrinsic),
                        None => {
                            self.diagnostics.report(
                                ErrorCode::IntrinsicRequired,
                                func.loc,
                                format!("function {} result {name}", func.name),
                            );
                            None
                        }
                    },
                    None => None,
                };
                self.insert(
                    &func.name,
                    Binding::Function(FunctionSig { params, result }),
                    func.loc,
                );
            }
        }
        Ok(())
    }

    fn insert(&mut self, name: &str, binding: Binding, loc: crate::ast::Loc) -> bool {
        let inserted = self.decls.insert(name, binding);
        if !inserted {
            self.diagnostics
                .report(ErrorCode::DuplicateLocal, loc, format!("declaration {name}"));
        }
        inserted
    }

    /// The declaration table.
    pub fn decls(&self) -> &DeclTable {
        &self.decls
    }

    /// The size oracle.
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Compile every function of the module. Recoverable problems land in
    /// [`Compiler::diagnostics`]; the returned module is best-effort.
    pub fn compile(&mut self, ast: &ModuleAst) -> Result<CompiledModule> {
        let mut functions = Vec::new();
        for declaration in &ast.declarations {
            if let Declaration::FunctionDeclaration(func) = declaration {
                let builder = emit::compile_function(
                    func,
                    &self.decls,
                    &self.types,
                    &mut self.diagnostics,
                    self.trace.as_mut(),
                )?;
                functions.push(builder);
            }
        }
        let memory_pages = if self.memory_end > 0 {
            Some(self.memory_end.div_ceil(PAGE_SIZE).max(1))
        } else {
            None
        };
        Ok(CompiledModule {
            memory_pages,
            globals: self.globals.clone(),
            functions,
        })
    }
}

fn zero_value(intrinsic: Intrinsic) -> Value {
    crate::cast::constant_for(intrinsic, &LiteralValue::Int(0))
}
