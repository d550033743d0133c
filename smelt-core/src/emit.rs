//! The type-directed emitter: walks simplified trees, computes a result type
//! per node, casts operands to a common representation and appends
//! instructions to the function builder.
//!
//! Typing is a two-pass pattern: operand types are probed with `emit = false`
//! to pick the operation's result type, then operands are re-emitted with
//! casts. Recoverable errors go to the diagnostic sink and propagate as
//! `None` result types; only internal invariants abort the function.

use anyhow::{bail, Result};

use crate::ast::{
    Expression, FunctionDecl, LiteralValue, Loc, Statement, UnaryOp,
};
use crate::builder::FunctionBuilder;
use crate::cast::{emit_cast, emit_storage_cast, load_for, storage_compatible, store_for};
use crate::compile::{resolve_type, Binding, DeclTable, FunctionSig};
use crate::diag::{Diagnostics, ErrorCode, TraceCategory, TraceSink};
use crate::instr::{BinOp, Instruction, UnOp, Value};
use crate::optimize;
use crate::render;
use crate::simplify::{self, SimplifyContext};
use crate::types::{Intrinsic, TypeSpec, TypeTable, ValueType};

/// Compile one function declaration into an optimized builder.
pub fn compile_function(
    decl: &FunctionDecl,
    decls: &DeclTable,
    types: &TypeTable,
    diags: &mut Diagnostics,
    trace: &mut dyn TraceSink,
) -> Result<FunctionBuilder> {
    let mut fc = FunctionCompiler {
        decls,
        types,
        diags,
        trace,
        builder: FunctionBuilder::new(&decl.name, decl.export),
        result: None,
        loops: Vec::new(),
    };
    fc.header(decl);
    for statement in &decl.body {
        fc.statement(statement)?;
    }
    optimize::optimize_function(&mut fc.builder)?;
    trace_inject(fc.trace, &fc.builder.instructions, 0);
    Ok(fc.builder)
}

fn trace_inject(trace: &mut dyn TraceSink, instructions: &[Instruction], depth: u32) {
    for instruction in instructions {
        trace.event(
            TraceCategory::Inject,
            depth,
            &render::instruction_text(instruction),
        );
        match instruction {
            Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
                trace_inject(trace, body, depth + 1);
            }
            Instruction::If {
                then_body,
                else_body,
                ..
            } => {
                trace_inject(trace, then_body, depth + 1);
                trace_inject(trace, else_body, depth + 1);
            }
            _ => {}
        }
    }
}

struct FunctionCompiler<'a> {
    decls: &'a DeclTable,
    types: &'a TypeTable,
    diags: &'a mut Diagnostics,
    trace: &'a mut dyn TraceSink,
    builder: FunctionBuilder,
    result: Option<Intrinsic>,
    /// Innermost-last `(break, continue)` label pairs.
    loops: Vec<(String, String)>,
}

impl<'a> FunctionCompiler<'a> {
    fn report(&mut self, code: ErrorCode, loc: Loc, detail: impl Into<String>) {
        self.diags.report(code, loc, detail);
    }

    fn ctx(&self) -> SimplifyContext<'a> {
        SimplifyContext {
            decls: self.decls,
            types: self.types,
        }
    }

    /// Simplify a statement-level expression, tracing the tree before and
    /// after.
    fn simplified(&mut self, expr: &Expression) -> Expression {
        let mut expr = expr.clone();
        self.trace
            .event(TraceCategory::PExpr, 0, &format!("{expr:?}"));
        simplify::simplify(&mut expr, &self.ctx());
        self.trace
            .event(TraceCategory::PExpr, 0, &format!("{expr:?}"));
        expr
    }

    // -----------------------------------------------------------------------
    // Function header
    // -----------------------------------------------------------------------

    fn header(&mut self, decl: &FunctionDecl) {
        for param in &decl.params {
            let spec = match resolve_type(self.decls, self.types, &param.spec) {
                Ok(spec) => spec,
                Err(err) => {
                    self.report(
                        ErrorCode::IntrinsicRequired,
                        decl.loc,
                        format!("parameter {}: {err}", param.name),
                    );
                    continue;
                }
            };
            let Some(value_type) = spec.value_type() else {
                self.report(
                    ErrorCode::IntrinsicRequired,
                    decl.loc,
                    format!("parameter {} must be scalar", param.name),
                );
                continue;
            };
            if !self.builder.declare(&param.name, spec, value_type, true) {
                self.report(
                    ErrorCode::DuplicateLocal,
                    decl.loc,
                    format!("parameter {}", param.name),
                );
            }
        }
        if let Some(result_name) = &decl.result {
            match Intrinsic::parse(result_name) {
                Some(intrinsic) => {
                    self.result = Some(intrinsic);
                    self.builder.result = Some(intrinsic.value_type());
                }
                None => self.report(
                    ErrorCode::IntrinsicRequired,
                    decl.loc,
                    format!("result type {result_name}"),
                ),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn statement(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::LocalVariable {
                name,
                spec,
                init,
                loc,
            } => self.local_variable(name, spec, init.as_ref(), *loc),
            Statement::Assignment { target, value, loc } => {
                self.assignment(target, value, *loc)
            }
            Statement::Break { loc } => {
                match self.loops.last() {
                    Some((break_label, _)) => {
                        let label = break_label.clone();
                        self.builder.push(Instruction::Br(label));
                    }
                    None => self.report(
                        ErrorCode::UnresolvedIdentifier,
                        *loc,
                        "no enclosing loop for break",
                    ),
                }
                Ok(())
            }
            Statement::Continue { loc } => {
                match self.loops.last() {
                    Some((_, continue_label)) => {
                        let label = continue_label.clone();
                        self.builder.push(Instruction::Br(label));
                    }
                    None => self.report(
                        ErrorCode::UnresolvedIdentifier,
                        *loc,
                        "no enclosing loop for continue",
                    ),
                }
                Ok(())
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => self.if_statement(condition, then_branch, else_branch),
            Statement::While {
                condition, body, ..
            } => self.while_statement(condition, body),
            Statement::Do {
                body, condition, ..
            } => self.do_statement(body, condition),
            Statement::Return { value, loc } => self.return_statement(value.as_ref(), *loc),
            Statement::LocalFunctionInvocation {
                callee, args, loc, ..
            } => {
                let call = Expression::FunctionInvocation {
                    callee: callee.clone(),
                    args: args.clone(),
                    loc: *loc,
                };
                let call = self.simplified(&call);
                if self.expression(&call, true)?.is_some() {
                    self.builder.push(Instruction::Drop);
                }
                Ok(())
            }
        }
    }

    fn local_variable(
        &mut self,
        name: &str,
        spec: &crate::ast::TypeExpr,
        init: Option<&Expression>,
        loc: Loc,
    ) -> Result<()> {
        let spec = match resolve_type(self.decls, self.types, spec) {
            Ok(spec) => spec,
            Err(err) => {
                self.report(ErrorCode::IntrinsicRequired, loc, format!("local {name}: {err}"));
                return Ok(());
            }
        };
        let Some(value_type) = spec.value_type() else {
            self.report(
                ErrorCode::IntrinsicRequired,
                loc,
                format!("local {name} must be scalar"),
            );
            return Ok(());
        };
        if self.builder.lookup(name).is_some() {
            self.report(ErrorCode::DuplicateLocal, loc, format!("local {name}"));
            return Ok(());
        }
        if let Some(init) = init {
            let init = self.simplified(init);
            if let Some(from) = self.expression(&init, false)? {
                if storage_compatible(&from, &spec) {
                    self.expression(&init, true)?;
                    if !emit_storage_cast(&mut self.builder, &from, &spec, init.as_literal()) {
                        bail!("storage cast vanished between probe and emission");
                    }
                    self.builder.push(Instruction::LocalSet(name.to_string()));
                } else {
                    self.report(
                        ErrorCode::InvalidStorageCast,
                        init.loc(),
                        format!("cannot store {from} into {spec}"),
                    );
                }
            }
        }
        self.builder.declare(name, spec.clone(), value_type, false);
        self.trace
            .event(TraceCategory::Local, 0, &format!("{name}: {spec}"));
        Ok(())
    }

    fn assignment(&mut self, target: &Expression, value: &Expression, loc: Loc) -> Result<()> {
        // Register-backed targets first: locals, then module globals.
        if let Expression::Identifier { name, .. } = target {
            if let Some(entry) = self.builder.lookup(name) {
                let spec = entry.source_type.clone();
                let machine = entry.machine_name.clone();
                let value = self.simplified(value);
                if let Some(from) = self.expression(&value, false)? {
                    if !storage_compatible(&from, &spec) {
                        self.report(
                            ErrorCode::InvalidStorageCast,
                            loc,
                            format!("cannot store {from} into {spec}"),
                        );
                        return Ok(());
                    }
                    self.expression(&value, true)?;
                    emit_storage_cast(&mut self.builder, &from, &spec, value.as_literal());
                    self.builder.push(Instruction::LocalSet(machine));
                }
                return Ok(());
            }
            if let Some(Binding::Global(intrinsic)) = self.decls.lookup(name) {
                let spec = TypeSpec::Intrinsic(*intrinsic);
                let name = name.clone();
                let value = self.simplified(value);
                if let Some(from) = self.expression(&value, false)? {
                    if !storage_compatible(&from, &spec) {
                        self.report(
                            ErrorCode::InvalidStorageCast,
                            loc,
                            format!("cannot store {from} into {spec}"),
                        );
                        return Ok(());
                    }
                    self.expression(&value, true)?;
                    emit_storage_cast(&mut self.builder, &from, &spec, value.as_literal());
                    self.builder.push(Instruction::GlobalSet(name));
                }
                return Ok(());
            }
        }

        // Everything else is a memory lvalue: address, value, typed store.
        let Some(spec) = self.address_of(target, false)? else {
            return Ok(());
        };
        let Some(store) = store_for(&spec) else {
            self.report(
                ErrorCode::InvalidStorageCast,
                loc,
                format!("cannot assign to aggregate {spec}"),
            );
            return Ok(());
        };
        let value = self.simplified(value);
        let Some(from) = self.expression(&value, false)? else {
            return Ok(());
        };
        if !storage_compatible(&from, &spec) {
            self.report(
                ErrorCode::InvalidStorageCast,
                loc,
                format!("cannot store {from} into {spec}"),
            );
            return Ok(());
        }
        self.address_of(target, true)?;
        self.expression(&value, true)?;
        emit_storage_cast(&mut self.builder, &from, &spec, value.as_literal());
        self.builder.push(store);
        Ok(())
    }

    fn if_statement(
        &mut self,
        condition: &Expression,
        then_branch: &[Statement],
        else_branch: &[Statement],
    ) -> Result<()> {
        let condition = self.simplified(condition);
        let Some(cond) = self.intrinsic_condition(&condition)? else {
            return Ok(());
        };
        self.expression(&condition, true)?;
        emit_cast(
            &mut self.builder,
            cond,
            Intrinsic::I32,
            condition.as_literal(),
        );
        let then_body = self.collect_body(|fc| {
            for statement in then_branch {
                fc.statement(statement)?;
            }
            Ok(())
        })?;
        let else_body = self.collect_body(|fc| {
            for statement in else_branch {
                fc.statement(statement)?;
            }
            Ok(())
        })?;
        self.builder.push(Instruction::If {
            result: None,
            then_body,
            else_body,
        });
        Ok(())
    }

    fn while_statement(&mut self, condition: &Expression, body: &[Statement]) -> Result<()> {
        let condition = self.simplified(condition);
        let Some(cond) = self.intrinsic_condition(&condition)? else {
            return Ok(());
        };
        let break_label = self.builder.fresh_label("break");
        let continue_label = self.builder.fresh_label("continue");
        self.loops
            .push((break_label.clone(), continue_label.clone()));
        let loop_body = self.collect_body(|fc| {
            fc.expression(&condition, true)?;
            emit_cast(
                &mut fc.builder,
                cond,
                Intrinsic::I32,
                condition.as_literal(),
            );
            fc.builder.push(Instruction::Unary {
                ty: ValueType::I32,
                op: UnOp::Eqz,
            });
            fc.builder.push(Instruction::BrIf(break_label.clone()));
            for statement in body {
                fc.statement(statement)?;
            }
            fc.builder.push(Instruction::Br(continue_label.clone()));
            Ok(())
        })?;
        self.loops.pop();
        self.builder.push(Instruction::Block {
            label: break_label,
            body: vec![Instruction::Loop {
                label: continue_label,
                body: loop_body,
            }],
        });
        Ok(())
    }

    fn do_statement(&mut self, body: &[Statement], condition: &Expression) -> Result<()> {
        let condition = self.simplified(condition);
        let Some(cond) = self.intrinsic_condition(&condition)? else {
            return Ok(());
        };
        let break_label = self.builder.fresh_label("break");
        let repeat_label = self.builder.fresh_label("loop");
        // `continue` falls out of the inner block, straight to the condition.
        let continue_label = self.builder.fresh_label("continue");
        self.loops
            .push((break_label.clone(), continue_label.clone()));
        let body_instrs = self.collect_body(|fc| {
            for statement in body {
                fc.statement(statement)?;
            }
            Ok(())
        })?;
        self.loops.pop();
        let mut loop_body = vec![Instruction::Block {
            label: continue_label,
            body: body_instrs,
        }];
        let condition_instrs = self.collect_body(|fc| {
            fc.expression(&condition, true)?;
            emit_cast(
                &mut fc.builder,
                cond,
                Intrinsic::I32,
                condition.as_literal(),
            );
            fc.builder.push(Instruction::BrIf(repeat_label.clone()));
            Ok(())
        })?;
        loop_body.extend(condition_instrs);
        self.builder.push(Instruction::Block {
            label: break_label,
            body: vec![Instruction::Loop {
                label: repeat_label,
                body: loop_body,
            }],
        });
        Ok(())
    }

    fn return_statement(&mut self, value: Option<&Expression>, loc: Loc) -> Result<()> {
        match (self.result, value) {
            (Some(result), Some(value)) => {
                let value = self.simplified(value);
                let Some(spec) = self.expression(&value, false)? else {
                    return Ok(());
                };
                let Some(from) = spec.as_intrinsic() else {
                    self.report(
                        ErrorCode::IntrinsicRequired,
                        value.loc(),
                        format!("return value of type {spec}"),
                    );
                    return Ok(());
                };
                self.expression(&value, true)?;
                emit_cast(&mut self.builder, from, result, value.as_literal());
                self.builder.push(Instruction::Return);
            }
            (None, None) => self.builder.push(Instruction::Return),
            (Some(_), None) => {
                self.report(ErrorCode::InvalidStorageCast, loc, "return requires a value")
            }
            (None, Some(_)) => self.report(
                ErrorCode::InvalidStorageCast,
                loc,
                "function declares no result",
            ),
        }
        Ok(())
    }

    /// Probe a condition and require an intrinsic type.
    fn intrinsic_condition(&mut self, condition: &Expression) -> Result<Option<Intrinsic>> {
        let Some(spec) = self.expression(condition, false)? else {
            return Ok(None);
        };
        match spec.as_intrinsic() {
            Some(intrinsic) => Ok(Some(intrinsic)),
            None => {
                self.report(
                    ErrorCode::IntrinsicRequired,
                    condition.loc(),
                    format!("condition of type {spec}"),
                );
                Ok(None)
            }
        }
    }

    /// Run `build` against a detached instruction list, for nested bodies.
    fn collect_body(
        &mut self,
        build: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<Vec<Instruction>> {
        let saved = std::mem::take(&mut self.builder.instructions);
        let outcome = build(self);
        let body = std::mem::replace(&mut self.builder.instructions, saved);
        outcome.map(|_| body)
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    /// Emit (or probe, with `emit = false`) one expression. Returns its
    /// result type, or `None` after a reported, recoverable error.
    fn expression(&mut self, expr: &Expression, emit: bool) -> Result<Option<TypeSpec>> {
        match expr {
            Expression::Literal { value, .. } => {
                let (constant, intrinsic) = literal_machine(value);
                if emit {
                    self.builder.push(Instruction::Const(constant));
                }
                Ok(Some(TypeSpec::Intrinsic(intrinsic)))
            }
            Expression::Identifier { name, loc } => self.identifier(name, *loc, emit),
            Expression::UnaryExpression { op, operand, loc } => {
                self.unary(*op, operand, *loc, emit)
            }
            Expression::BinaryExpression {
                op,
                left,
                right,
                loc,
            } => self.binary(*op, left, right, *loc, emit),
            Expression::ConditionalExpression {
                condition,
                consequent,
                alternate,
                loc,
            } => self.conditional(condition, consequent, alternate, *loc, emit),
            Expression::TypeCast {
                target,
                operand,
                loc,
            } => self.type_cast(target, operand, *loc, emit),
            Expression::MemberAccess { .. }
            | Expression::ItemAccess { .. }
            | Expression::DereferenceExpression { .. } => self.indirect(expr, emit),
            Expression::BuiltInFunctionInvocation { name, args, loc } => {
                self.builtin(name, args, *loc, emit)
            }
            Expression::FunctionInvocation { callee, args, loc } => {
                self.invocation(callee, args, *loc, emit)
            }
            Expression::SizeOfExpression { spec, loc } => {
                let size = match resolve_type(self.decls, self.types, spec)
                    .and_then(|spec| self.types.size_of(&spec))
                {
                    Ok(size) => size,
                    Err(err) => {
                        self.report(ErrorCode::IntrinsicRequired, *loc, format!("sizeof: {err}"));
                        return Ok(None);
                    }
                };
                if emit {
                    self.builder.push(Instruction::i32_const(size as i32));
                }
                Ok(Some(TypeSpec::Intrinsic(Intrinsic::I32)))
            }
        }
    }

    fn identifier(&mut self, name: &str, loc: Loc, emit: bool) -> Result<Option<TypeSpec>> {
        if let Some(entry) = self.builder.lookup(name) {
            let spec = entry.source_type.clone();
            let machine = entry.machine_name.clone();
            if emit {
                self.builder.push(Instruction::LocalGet(machine));
            }
            return Ok(Some(spec));
        }
        match self.decls.lookup(name) {
            Some(Binding::Global(intrinsic)) => {
                let intrinsic = *intrinsic;
                if emit {
                    self.builder.push(Instruction::GlobalGet(name.to_string()));
                }
                Ok(Some(TypeSpec::Intrinsic(intrinsic)))
            }
            Some(Binding::Const(value)) => {
                let (constant, intrinsic) = literal_machine(value);
                if emit {
                    self.builder.push(Instruction::Const(constant));
                }
                Ok(Some(TypeSpec::Intrinsic(intrinsic)))
            }
            Some(Binding::Variable { address, spec }) => {
                let spec = spec.clone();
                let address = *address;
                if emit {
                    self.builder.push(Instruction::i32_const(address as i32));
                }
                if let Some(load) = load_for(&spec) {
                    if emit {
                        self.builder.push(load);
                    }
                }
                Ok(Some(spec))
            }
            _ => {
                self.report(ErrorCode::UnresolvedIdentifier, loc, name);
                Ok(None)
            }
        }
    }

    fn unary(
        &mut self,
        op: UnaryOp,
        operand: &Expression,
        loc: Loc,
        emit: bool,
    ) -> Result<Option<TypeSpec>> {
        if op == UnaryOp::AddressOf {
            let spec = self.address_of(operand, emit)?;
            return Ok(spec.map(|_| TypeSpec::Intrinsic(Intrinsic::I32)));
        }
        let Some(spec) = self.expression(operand, false)? else {
            return Ok(None);
        };
        let Some(intrinsic) = spec.as_intrinsic() else {
            self.report(
                ErrorCode::IntrinsicRequired,
                loc,
                format!("unary operand of type {spec}"),
            );
            return Ok(None);
        };
        let machine = intrinsic.value_type();
        match op {
            UnaryOp::Plus => {
                if emit {
                    self.expression(operand, true)?;
                    emit_cast(
                        &mut self.builder,
                        intrinsic,
                        Intrinsic::I32,
                        operand.as_literal(),
                    );
                }
                Ok(Some(TypeSpec::Intrinsic(Intrinsic::I32)))
            }
            UnaryOp::Minus => {
                if emit {
                    self.expression(operand, true)?;
                    self.builder.push(Instruction::Const(minus_one(machine)));
                    self.builder.push(Instruction::Binary {
                        ty: machine,
                        op: BinOp::Mul,
                    });
                }
                Ok(Some(TypeSpec::Intrinsic(intrinsic)))
            }
            UnaryOp::Not => {
                if intrinsic.is_float() {
                    self.report(ErrorCode::OperatorTypeMismatch, loc, "! on float operand");
                    return Ok(None);
                }
                if emit {
                    self.expression(operand, true)?;
                    self.builder.push(Instruction::Unary {
                        ty: machine,
                        op: UnOp::Eqz,
                    });
                }
                Ok(Some(TypeSpec::Intrinsic(Intrinsic::I32)))
            }
            UnaryOp::Complement => {
                if intrinsic.is_float() {
                    self.report(ErrorCode::OperatorTypeMismatch, loc, "~ on float operand");
                    return Ok(None);
                }
                if emit {
                    self.expression(operand, true)?;
                    let ones = match machine {
                        ValueType::I64 => Value::I64(-1),
                        _ => Value::I32(-1),
                    };
                    self.builder.push(Instruction::Const(ones));
                    self.builder.push(Instruction::Binary {
                        ty: machine,
                        op: BinOp::Xor,
                    });
                }
                Ok(Some(TypeSpec::Intrinsic(intrinsic)))
            }
            UnaryOp::AddressOf => unreachable!("handled above"),
        }
    }

    fn binary(
        &mut self,
        op: crate::ast::BinaryOp,
        left: &Expression,
        right: &Expression,
        loc: Loc,
        emit: bool,
    ) -> Result<Option<TypeSpec>> {
        let Some(left_spec) = self.expression(left, false)? else {
            return Ok(None);
        };
        let Some(right_spec) = self.expression(right, false)? else {
            return Ok(None);
        };
        let (Some(li), Some(ri)) = (left_spec.as_intrinsic(), right_spec.as_intrinsic()) else {
            self.report(
                ErrorCode::NonIntrinsicOperand,
                loc,
                format!("operands {left_spec} and {right_spec}"),
            );
            return Ok(None);
        };
        let result = binary_result(li, ri);
        if op.is_integer_only() && result.is_float() {
            self.report(
                ErrorCode::OperatorTypeMismatch,
                loc,
                "integer operator on float operands",
            );
            return Ok(None);
        }
        let signed = li.is_signed() || ri.is_signed();
        if emit {
            self.expression(left, true)?;
            emit_cast(&mut self.builder, li, result, left.as_literal());
            self.expression(right, true)?;
            emit_cast(&mut self.builder, ri, result, right.as_literal());
            self.builder.push(Instruction::Binary {
                ty: result.value_type(),
                op: machine_binop(op, signed),
            });
        }
        let result = if op.is_comparison() {
            Intrinsic::I32
        } else {
            result
        };
        Ok(Some(TypeSpec::Intrinsic(result)))
    }

    fn conditional(
        &mut self,
        condition: &Expression,
        consequent: &Expression,
        alternate: &Expression,
        loc: Loc,
        emit: bool,
    ) -> Result<Option<TypeSpec>> {
        let (Some(c), Some(t), Some(e)) = (
            self.expression(condition, false)?,
            self.expression(consequent, false)?,
            self.expression(alternate, false)?,
        ) else {
            return Ok(None);
        };
        let (Some(ci), Some(ti), Some(ei)) =
            (c.as_intrinsic(), t.as_intrinsic(), e.as_intrinsic())
        else {
            self.report(
                ErrorCode::NonIntrinsicOperand,
                loc,
                "conditional requires intrinsic operands",
            );
            return Ok(None);
        };
        let result = binary_result(ti, ei);
        if emit {
            // select consumes (value1, value2, condition), condition topmost.
            self.expression(consequent, true)?;
            emit_cast(&mut self.builder, ti, result, consequent.as_literal());
            self.expression(alternate, true)?;
            emit_cast(&mut self.builder, ei, result, alternate.as_literal());
            self.expression(condition, true)?;
            emit_cast(&mut self.builder, ci, Intrinsic::I32, condition.as_literal());
            self.builder.push(Instruction::Select);
        }
        Ok(Some(TypeSpec::Intrinsic(result)))
    }

    fn type_cast(
        &mut self,
        target: &str,
        operand: &Expression,
        loc: Loc,
        emit: bool,
    ) -> Result<Option<TypeSpec>> {
        let Some(to) = Intrinsic::parse(target) else {
            self.report(
                ErrorCode::IntrinsicRequired,
                loc,
                format!("cast target {target}"),
            );
            return Ok(None);
        };
        let Some(spec) = self.expression(operand, false)? else {
            return Ok(None);
        };
        let Some(from) = spec.as_intrinsic() else {
            self.report(
                ErrorCode::IntrinsicRequired,
                loc,
                format!("cast operand of type {spec}"),
            );
            return Ok(None);
        };
        if emit {
            self.expression(operand, true)?;
            emit_cast(&mut self.builder, from, to, operand.as_literal());
        }
        Ok(Some(TypeSpec::Intrinsic(to)))
    }

    /// Member access, item access and dereference in value position: compute
    /// the address, load scalars, leave aggregate addresses for further
    /// indexing.
    fn indirect(&mut self, expr: &Expression, emit: bool) -> Result<Option<TypeSpec>> {
        let Some(spec) = self.address_of(expr, emit)? else {
            return Ok(None);
        };
        if let Some(load) = load_for(&spec) {
            if emit {
                self.builder.push(load);
            }
        }
        Ok(Some(spec))
    }

    fn builtin(
        &mut self,
        name: &str,
        args: &[Expression],
        loc: Loc,
        emit: bool,
    ) -> Result<Option<TypeSpec>> {
        let mut arg_types = Vec::with_capacity(args.len());
        for arg in args {
            let Some(spec) = self.expression(arg, false)? else {
                return Ok(None);
            };
            let Some(intrinsic) = spec.as_intrinsic() else {
                self.report(
                    ErrorCode::NonIntrinsicOperand,
                    arg.loc(),
                    format!("built-in argument of type {spec}"),
                );
                return Ok(None);
            };
            arg_types.push(intrinsic);
        }
        match name {
            "min" | "max" => {
                if args.is_empty() {
                    self.report(ErrorCode::NonIntrinsicOperand, loc, format!("{name}()"));
                    return Ok(None);
                }
                let result = if arg_types.iter().any(|t| *t == Intrinsic::F64) {
                    Intrinsic::F64
                } else {
                    Intrinsic::F32
                };
                let op = if name == "min" { BinOp::Min } else { BinOp::Max };
                if emit {
                    self.expression(&args[0], true)?;
                    emit_cast(&mut self.builder, arg_types[0], result, args[0].as_literal());
                    for (arg, ty) in args[1..].iter().zip(&arg_types[1..]) {
                        self.expression(arg, true)?;
                        emit_cast(&mut self.builder, *ty, result, arg.as_literal());
                        self.builder.push(Instruction::Binary {
                            ty: result.value_type(),
                            op,
                        });
                    }
                }
                Ok(Some(TypeSpec::Intrinsic(result)))
            }
            "ceil" | "floor" | "trunc" | "nearest" | "sqrt" | "neg" => {
                if arg_types.len() != 1 {
                    self.report(ErrorCode::NonIntrinsicOperand, loc, format!("{name} arity"));
                    return Ok(None);
                }
                let ty = arg_types[0];
                if ty.is_integer() {
                    self.report(
                        ErrorCode::FloatBuiltInOnInteger,
                        loc,
                        format!("{name} on {ty}"),
                    );
                    return Ok(None);
                }
                if emit {
                    self.expression(&args[0], true)?;
                    let op = match name {
                        "ceil" => UnOp::Ceil,
                        "floor" => UnOp::Floor,
                        "trunc" => UnOp::Trunc,
                        "nearest" => UnOp::Nearest,
                        "sqrt" => UnOp::Sqrt,
                        _ => UnOp::Neg,
                    };
                    self.builder.push(Instruction::Unary {
                        ty: ty.value_type(),
                        op,
                    });
                }
                Ok(Some(TypeSpec::Intrinsic(ty)))
            }
            "copysign" => {
                if arg_types.len() != 2 {
                    self.report(ErrorCode::NonIntrinsicOperand, loc, "copysign arity");
                    return Ok(None);
                }
                let (a, b) = (arg_types[0], arg_types[1]);
                if a.is_integer() || b.is_integer() {
                    self.report(ErrorCode::FloatBuiltInOnInteger, loc, "copysign on integer");
                    return Ok(None);
                }
                let result = if a == Intrinsic::F64 || b == Intrinsic::F64 {
                    Intrinsic::F64
                } else {
                    Intrinsic::F32
                };
                if emit {
                    self.expression(&args[0], true)?;
                    emit_cast(&mut self.builder, a, result, args[0].as_literal());
                    self.expression(&args[1], true)?;
                    emit_cast(&mut self.builder, b, result, args[1].as_literal());
                    self.builder.push(Instruction::Binary {
                        ty: result.value_type(),
                        op: BinOp::Copysign,
                    });
                }
                Ok(Some(TypeSpec::Intrinsic(result)))
            }
            "abs" => {
                if arg_types.len() != 1 {
                    self.report(ErrorCode::NonIntrinsicOperand, loc, "abs arity");
                    return Ok(None);
                }
                let ty = arg_types[0];
                if emit {
                    self.expression(&args[0], true)?;
                }
                if ty.is_float() {
                    if emit {
                        self.builder.push(Instruction::Unary {
                            ty: ty.value_type(),
                            op: UnOp::Abs,
                        });
                    }
                } else if emit {
                    self.emit_integer_abs(ty.value_type());
                }
                Ok(Some(TypeSpec::Intrinsic(ty)))
            }
            "clz" | "ctz" | "popcnt" => {
                if arg_types.len() != 1 {
                    self.report(ErrorCode::NonIntrinsicOperand, loc, format!("{name} arity"));
                    return Ok(None);
                }
                let ty = arg_types[0];
                if ty.is_float() {
                    self.report(
                        ErrorCode::IntegerBuiltInOnFloat,
                        loc,
                        format!("{name} on {ty}"),
                    );
                    return Ok(None);
                }
                if emit {
                    self.expression(&args[0], true)?;
                    let op = match name {
                        "clz" => UnOp::Clz,
                        "ctz" => UnOp::Ctz,
                        _ => UnOp::Popcnt,
                    };
                    self.builder.push(Instruction::Unary {
                        ty: ty.value_type(),
                        op,
                    });
                }
                Ok(Some(TypeSpec::Intrinsic(ty)))
            }
            _ => {
                self.report(ErrorCode::UnresolvedIdentifier, loc, format!("built-in {name}"));
                Ok(None)
            }
        }
    }

    /// `abs` has no integer form; expand through the per-type temporary:
    /// `tee t; t < 0 ? t * -1 : t`.
    fn emit_integer_abs(&mut self, machine: ValueType) {
        let tmp = self.builder.temp(machine);
        self.builder.push(Instruction::LocalTee(tmp.clone()));
        self.builder.push(Instruction::Const(zero(machine)));
        self.builder.push(Instruction::Binary {
            ty: machine,
            op: BinOp::LtS,
        });
        self.builder.push(Instruction::If {
            result: Some(machine),
            then_body: vec![
                Instruction::LocalGet(tmp.clone()),
                Instruction::Const(minus_one(machine)),
                Instruction::Binary {
                    ty: machine,
                    op: BinOp::Mul,
                },
            ],
            else_body: vec![Instruction::LocalGet(tmp)],
        });
    }

    fn invocation(
        &mut self,
        callee: &str,
        args: &[Expression],
        loc: Loc,
        emit: bool,
    ) -> Result<Option<TypeSpec>> {
        let Some(Binding::Function(sig)) = self.decls.lookup(callee) else {
            self.report(ErrorCode::UnresolvedIdentifier, loc, callee);
            return Ok(None);
        };
        let sig: FunctionSig = sig.clone();
        if args.len() != sig.params.len() {
            self.report(
                ErrorCode::NonIntrinsicOperand,
                loc,
                format!(
                    "{callee} expects {} arguments, got {}",
                    sig.params.len(),
                    args.len()
                ),
            );
            return Ok(None);
        }
        let mut arg_specs = Vec::with_capacity(args.len());
        for (arg, (param_name, param_spec)) in args.iter().zip(&sig.params) {
            let Some(spec) = self.expression(arg, false)? else {
                return Ok(None);
            };
            if !storage_compatible(&spec, param_spec) {
                self.report(
                    ErrorCode::InvalidStorageCast,
                    arg.loc(),
                    format!("argument {param_name}: cannot pass {spec} as {param_spec}"),
                );
                return Ok(None);
            }
            arg_specs.push(spec);
        }
        if emit {
            for (arg, ((_, param_spec), spec)) in
                args.iter().zip(sig.params.iter().zip(&arg_specs))
            {
                self.expression(arg, true)?;
                if !emit_storage_cast(&mut self.builder, spec, param_spec, arg.as_literal()) {
                    bail!("argument cast vanished between probe and emission");
                }
            }
            self.builder.push(Instruction::Call(callee.to_string()));
        }
        Ok(sig.result.map(TypeSpec::Intrinsic))
    }

    // -----------------------------------------------------------------------
    // Address calculation
    // -----------------------------------------------------------------------

    /// Compute the effective address of an lvalue, leaving it on the stack
    /// when emitting, and return the storage type found there.
    fn address_of(&mut self, expr: &Expression, emit: bool) -> Result<Option<TypeSpec>> {
        match expr {
            Expression::Identifier { name, loc } => {
                if self.builder.lookup(name).is_some() {
                    self.report(
                        ErrorCode::NotAddressable,
                        *loc,
                        format!("local {name} has no address"),
                    );
                    return Ok(None);
                }
                match self.decls.lookup(name) {
                    Some(Binding::Variable { address, spec }) => {
                        let spec = spec.clone();
                        if emit {
                            self.builder.push(Instruction::i32_const(*address as i32));
                        }
                        Ok(Some(spec))
                    }
                    Some(_) => {
                        self.report(ErrorCode::NotAddressable, *loc, name.clone());
                        Ok(None)
                    }
                    None => {
                        self.report(ErrorCode::UnresolvedIdentifier, *loc, name.clone());
                        Ok(None)
                    }
                }
            }
            Expression::DereferenceExpression { operand, loc } => {
                // The pointer value is the pointee's address; for memory
                // variables this is the 32-bit load of the pointer cell.
                let Some(spec) = self.expression(operand, emit)? else {
                    return Ok(None);
                };
                match spec {
                    TypeSpec::Pointer(pointee) => Ok(Some(*pointee)),
                    other => {
                        self.report(
                            ErrorCode::DereferenceOfNonPointer,
                            *loc,
                            format!("dereference of {other}"),
                        );
                        Ok(None)
                    }
                }
            }
            Expression::MemberAccess {
                object,
                member,
                loc,
            } => {
                let Some(spec) = self.address_of(object, emit)? else {
                    return Ok(None);
                };
                let TypeSpec::Struct(struct_name) = spec else {
                    self.report(
                        ErrorCode::InvalidMemberAccess,
                        *loc,
                        format!("member access on {spec}"),
                    );
                    return Ok(None);
                };
                let Some(layout) = self.types.struct_layout(&struct_name) else {
                    bail!("struct {struct_name} lost its layout");
                };
                let Some(field) = layout.field(member) else {
                    self.report(
                        ErrorCode::InvalidMemberAccess,
                        *loc,
                        format!("{struct_name} has no member {member}"),
                    );
                    return Ok(None);
                };
                let field_spec = field.spec.clone();
                let offset = field.offset;
                if emit && offset != 0 {
                    self.builder.push(Instruction::i32_const(offset as i32));
                    self.builder.push(Instruction::Binary {
                        ty: ValueType::I32,
                        op: BinOp::Add,
                    });
                }
                Ok(Some(field_spec))
            }
            Expression::ItemAccess { array, index, loc } => {
                let Some(spec) = self.address_of(array, emit)? else {
                    return Ok(None);
                };
                let TypeSpec::Array { item, .. } = spec else {
                    self.report(
                        ErrorCode::ItemAccessOnNonArray,
                        *loc,
                        format!("item access on {spec}"),
                    );
                    return Ok(None);
                };
                let Some(index_spec) = self.expression(index, false)? else {
                    return Ok(None);
                };
                let Some(index_intrinsic) = index_spec.as_intrinsic() else {
                    self.report(
                        ErrorCode::IntrinsicRequired,
                        index.loc(),
                        format!("index of type {index_spec}"),
                    );
                    return Ok(None);
                };
                let item_size = self.types.size_of(&item)?;
                if emit {
                    self.expression(index, true)?;
                    emit_cast(
                        &mut self.builder,
                        index_intrinsic,
                        Intrinsic::I32,
                        index.as_literal(),
                    );
                    self.builder.push(Instruction::i32_const(item_size as i32));
                    self.builder.push(Instruction::Binary {
                        ty: ValueType::I32,
                        op: BinOp::Mul,
                    });
                    self.builder.push(Instruction::Binary {
                        ty: ValueType::I32,
                        op: BinOp::Add,
                    });
                }
                Ok(Some(*item))
            }
            other => {
                self.report(
                    ErrorCode::NotAddressable,
                    other.loc(),
                    "expression has no address",
                );
                Ok(None)
            }
        }
    }
}

/// Result-type lattice: floats win as `f64`, then 64-bit as `i64`, else
/// `i32`.
fn binary_result(a: Intrinsic, b: Intrinsic) -> Intrinsic {
    if a.is_float() || b.is_float() {
        Intrinsic::F64
    } else if a.is_wide() || b.is_wide() {
        Intrinsic::I64
    } else {
        Intrinsic::I32
    }
}

fn machine_binop(op: crate::ast::BinaryOp, signed: bool) -> BinOp {
    use crate::ast::BinaryOp as B;
    match op {
        B::Add => BinOp::Add,
        B::Sub => BinOp::Sub,
        B::Mul => BinOp::Mul,
        B::Div => {
            if signed {
                BinOp::DivS
            } else {
                BinOp::DivU
            }
        }
        B::Rem => {
            if signed {
                BinOp::RemS
            } else {
                BinOp::RemU
            }
        }
        B::BitAnd => BinOp::And,
        B::BitOr => BinOp::Or,
        B::BitXor => BinOp::Xor,
        B::Shl => BinOp::Shl,
        B::Shr => {
            if signed {
                BinOp::ShrS
            } else {
                BinOp::ShrU
            }
        }
        B::ShrU => BinOp::ShrU,
        B::Eq => BinOp::Eq,
        B::Ne => BinOp::Ne,
        B::Lt => {
            if signed {
                BinOp::LtS
            } else {
                BinOp::LtU
            }
        }
        B::Le => {
            if signed {
                BinOp::LeS
            } else {
                BinOp::LeU
            }
        }
        B::Gt => {
            if signed {
                BinOp::GtS
            } else {
                BinOp::GtU
            }
        }
        B::Ge => {
            if signed {
                BinOp::GeS
            } else {
                BinOp::GeU
            }
        }
    }
}

/// Machine constant and result type of a literal in value position. Integer
/// literals are `i32`, reals are `f64`, big integers are `i64`.
fn literal_machine(value: &LiteralValue) -> (Value, Intrinsic) {
    match value {
        LiteralValue::Int(v) => (Value::I32(*v as i32), Intrinsic::I32),
        LiteralValue::Real(v) => (Value::F64(*v), Intrinsic::F64),
        LiteralValue::BigInt(v) => (
            Value::I64(simplify::wrap_u64(v) as i64),
            Intrinsic::I64,
        ),
    }
}

fn zero(machine: ValueType) -> Value {
    match machine {
        ValueType::I32 => Value::I32(0),
        ValueType::I64 => Value::I64(0),
        ValueType::F32 => Value::F32(0.0),
        ValueType::F64 => Value::F64(0.0),
    }
}

fn minus_one(machine: ValueType) -> Value {
    match machine {
        ValueType::I32 => Value::I32(-1),
        ValueType::I64 => Value::I64(-1),
        ValueType::F32 => Value::F32(-1.0),
        ValueType::F64 => Value::F64(-1.0),
    }
}
