//! Stack-discipline checking for emitted bodies.
//!
//! Replays the machine-type stack every instruction sequence implies and
//! fails on any mismatch, enforcing the builder invariant that what the
//! emitter leaves behind validates as WebAssembly. Branch targets are tracked
//! lexically; code after a terminator is treated as unreachable and skipped,
//! the way a validator's unreachable mode would accept it.

use anyhow::{anyhow, bail, Result};

use crate::builder::FunctionBuilder;
use crate::compile::{Binding, DeclTable};
use crate::instr::{Instruction, UnOp};
use crate::types::ValueType;

/// Check one compiled function against a declaration table.
pub fn check_function(function: &FunctionBuilder, decls: &DeclTable) -> Result<()> {
    let checker = Checker { function, decls };
    let mut labels = Vec::new();
    let outcome = checker
        .body(&function.instructions, &mut labels)
        .map_err(|err| anyhow!("function {}: {err}", function.name))?;
    if let Some(stack) = outcome {
        let expected: Vec<ValueType> = function.result.into_iter().collect();
        if stack != expected {
            bail!(
                "function {} ends with stack {stack:?}, expected {expected:?}",
                function.name
            );
        }
    }
    Ok(())
}

struct Checker<'a> {
    function: &'a FunctionBuilder,
    decls: &'a DeclTable,
}

impl Checker<'_> {
    /// Replay one body. `Ok(Some(stack))` when the end is reachable,
    /// `Ok(None)` when a terminator cut it off.
    fn body(
        &self,
        instructions: &[Instruction],
        labels: &mut Vec<String>,
    ) -> Result<Option<Vec<ValueType>>> {
        let mut stack: Vec<ValueType> = Vec::new();
        for instruction in instructions {
            match instruction {
                Instruction::Const(value) => stack.push(value.value_type()),
                Instruction::Binary { ty, op } => {
                    self.pop(&mut stack, *ty)?;
                    self.pop(&mut stack, *ty)?;
                    stack.push(if op.is_comparison() {
                        ValueType::I32
                    } else {
                        *ty
                    });
                }
                Instruction::Unary { ty, op } => {
                    self.pop(&mut stack, *ty)?;
                    stack.push(if *op == UnOp::Eqz { ValueType::I32 } else { *ty });
                }
                Instruction::Convert(op) => {
                    self.pop(&mut stack, op.input())?;
                    stack.push(op.output());
                }
                Instruction::Load { ty, .. } => {
                    self.pop(&mut stack, ValueType::I32)?;
                    stack.push(*ty);
                }
                Instruction::Store { ty, .. } => {
                    self.pop(&mut stack, *ty)?;
                    self.pop(&mut stack, ValueType::I32)?;
                }
                Instruction::LocalGet(name) => stack.push(self.local(name)?),
                Instruction::LocalSet(name) => {
                    let ty = self.local(name)?;
                    self.pop(&mut stack, ty)?;
                }
                Instruction::LocalTee(name) => {
                    let ty = self.local(name)?;
                    self.pop(&mut stack, ty)?;
                    stack.push(ty);
                }
                Instruction::GlobalGet(name) => stack.push(self.global(name)?),
                Instruction::GlobalSet(name) => {
                    let ty = self.global(name)?;
                    self.pop(&mut stack, ty)?;
                }
                Instruction::Select => {
                    self.pop(&mut stack, ValueType::I32)?;
                    let b = stack.pop().ok_or_else(|| anyhow!("select on empty stack"))?;
                    self.pop(&mut stack, b)?;
                    stack.push(b);
                }
                Instruction::Block { label, body } | Instruction::Loop { label, body } => {
                    labels.push(label.clone());
                    let inner = self.body(body, labels)?;
                    labels.pop();
                    if let Some(inner) = inner {
                        if !inner.is_empty() {
                            bail!("frame {label} leaves values {inner:?}");
                        }
                    }
                }
                Instruction::If {
                    result,
                    then_body,
                    else_body,
                } => {
                    self.pop(&mut stack, ValueType::I32)?;
                    let expected: Vec<ValueType> = result.iter().copied().collect();
                    for arm in [then_body, else_body] {
                        if arm.is_empty() && result.is_none() {
                            continue;
                        }
                        if let Some(end) = self.body(arm, labels)? {
                            if end != expected {
                                bail!("if arm ends with {end:?}, expected {expected:?}");
                            }
                        }
                    }
                    if let Some(ty) = result {
                        stack.push(*ty);
                    }
                }
                Instruction::Br(label) => {
                    self.target(label, labels)?;
                    return Ok(None);
                }
                Instruction::BrIf(label) => {
                    self.target(label, labels)?;
                    self.pop(&mut stack, ValueType::I32)?;
                }
                Instruction::Call(name) => {
                    let Some(Binding::Function(sig)) = self.decls.lookup(name) else {
                        bail!("call to unknown function {name}");
                    };
                    for (param, spec) in sig.params.iter().rev() {
                        let ty = spec
                            .value_type()
                            .ok_or_else(|| anyhow!("parameter {param} is not scalar"))?;
                        self.pop(&mut stack, ty)?;
                    }
                    if let Some(result) = sig.result {
                        stack.push(result.value_type());
                    }
                }
                Instruction::Return => {
                    if let Some(result) = self.function.result {
                        self.pop(&mut stack, result)?;
                    }
                    return Ok(None);
                }
                Instruction::Drop => {
                    stack
                        .pop()
                        .ok_or_else(|| anyhow!("drop on empty stack"))?;
                }
                Instruction::Nop => {}
                Instruction::Unreachable => return Ok(None),
            }
        }
        Ok(Some(stack))
    }

    fn pop(&self, stack: &mut Vec<ValueType>, expected: ValueType) -> Result<()> {
        match stack.pop() {
            Some(ty) if ty == expected => Ok(()),
            Some(ty) => bail!("expected {expected} on stack, found {ty}"),
            None => bail!("expected {expected} on stack, found nothing"),
        }
    }

    fn local(&self, name: &str) -> Result<ValueType> {
        self.function
            .lookup(name)
            .map(|entry| entry.value_type)
            .ok_or_else(|| anyhow!("unknown local {name}"))
    }

    fn global(&self, name: &str) -> Result<ValueType> {
        match self.decls.lookup(name) {
            Some(Binding::Global(intrinsic)) => Ok(intrinsic.value_type()),
            _ => bail!("unknown global {name}"),
        }
    }

    fn target(&self, label: &str, labels: &[String]) -> Result<()> {
        if labels.iter().any(|l| l == label) {
            Ok(())
        } else {
            bail!("branch to unknown label {label}")
        }
    }
}
