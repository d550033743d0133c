//! Per-function emission state.
//!
//! A builder accumulates the ordered instruction list and the ordered local
//! declaration list of one function. Parameters and locals share a namespace
//! keyed by source name; each entry records the machine name the renderer
//! prints, the declared storage type and the machine type.

use std::collections::HashMap;

use crate::instr::Instruction;
use crate::types::{TypeSpec, ValueType};

/// One parameter, local or emitter temporary.
#[derive(Debug, Clone)]
pub struct LocalEntry {
    /// Name the renderer prints (`$` is added there).
    pub machine_name: String,
    /// Declared storage type.
    pub source_type: TypeSpec,
    /// Machine type of the slot.
    pub value_type: ValueType,
    /// Whether the slot is a function parameter.
    pub is_param: bool,
}

/// Emission state for one function.
#[derive(Debug)]
pub struct FunctionBuilder {
    /// Function name.
    pub name: String,
    /// Whether the function is exported.
    pub export: bool,
    /// Result machine type, if the function returns a value.
    pub result: Option<ValueType>,
    /// Emitted body.
    pub instructions: Vec<Instruction>,
    locals: Vec<LocalEntry>,
    index: HashMap<String, usize>,
    temps: HashMap<ValueType, String>,
    label_seq: u32,
}

impl FunctionBuilder {
    /// Fresh builder for a named function.
    pub fn new(name: &str, export: bool) -> Self {
        FunctionBuilder {
            name: name.to_string(),
            export,
            result: None,
            instructions: Vec::new(),
            locals: Vec::new(),
            index: HashMap::new(),
            temps: HashMap::new(),
            label_seq: 0,
        }
    }

    /// Append one instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Declare a parameter or local under its source name.
    /// Returns `false` when the name is already taken.
    pub fn declare(
        &mut self,
        name: &str,
        source_type: TypeSpec,
        value_type: ValueType,
        is_param: bool,
    ) -> bool {
        if self.index.contains_key(name) {
            return false;
        }
        self.index.insert(name.to_string(), self.locals.len());
        self.locals.push(LocalEntry {
            machine_name: name.to_string(),
            source_type,
            value_type,
            is_param,
        });
        true
    }

    /// Look up a parameter or local by source name.
    pub fn lookup(&self, name: &str) -> Option<&LocalEntry> {
        self.index.get(name).map(|&i| &self.locals[i])
    }

    /// Machine name of the temporary slot for a machine type, allocating the
    /// slot on first use. At most one temporary per machine type exists per
    /// function; the `.t.` prefix cannot collide with source identifiers.
    pub fn temp(&mut self, value_type: ValueType) -> String {
        if let Some(name) = self.temps.get(&value_type) {
            return name.clone();
        }
        let name = format!(".t.{}", value_type.name());
        let source_type = match value_type {
            ValueType::I32 => crate::types::Intrinsic::I32,
            ValueType::I64 => crate::types::Intrinsic::I64,
            ValueType::F32 => crate::types::Intrinsic::F32,
            ValueType::F64 => crate::types::Intrinsic::F64,
        };
        self.temps.insert(value_type, name.clone());
        self.index.insert(name.clone(), self.locals.len());
        self.locals.push(LocalEntry {
            machine_name: name.clone(),
            source_type: TypeSpec::Intrinsic(source_type),
            value_type,
            is_param: false,
        });
        name
    }

    /// Mint a function-unique label from a stem, e.g. `break.0`.
    pub fn fresh_label(&mut self, stem: &str) -> String {
        let label = format!("{stem}.{}", self.label_seq);
        self.label_seq += 1;
        label
    }

    /// Declared entries in order, parameters first.
    pub fn locals(&self) -> &[LocalEntry] {
        &self.locals
    }

    /// Parameters in declaration order.
    pub fn params(&self) -> impl Iterator<Item = &LocalEntry> {
        self.locals.iter().filter(|l| l.is_param)
    }

    /// Non-parameter locals in declaration order.
    pub fn body_locals(&self) -> impl Iterator<Item = &LocalEntry> {
        self.locals.iter().filter(|l| !l.is_param)
    }

    /// Drop non-parameter locals the optimizer proved unused.
    /// `keep` receives each machine name and decides.
    pub fn retain_locals(&mut self, keep: impl Fn(&str) -> bool) {
        self.locals
            .retain(|l| l.is_param || keep(&l.machine_name));
        self.index.clear();
        for (i, entry) in self.locals.iter().enumerate() {
            self.index.insert(entry.machine_name.clone(), i);
        }
        self.temps
            .retain(|_, name| self.index.contains_key(name));
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Intrinsic;

    #[test]
    fn duplicate_declaration_is_rejected() {
        let mut b = FunctionBuilder::new("f", false);
        assert!(b.declare("x", TypeSpec::Intrinsic(Intrinsic::I32), ValueType::I32, true));
        assert!(!b.declare("x", TypeSpec::Intrinsic(Intrinsic::I64), ValueType::I64, false));
    }

    #[test]
    fn one_temp_per_machine_type() {
        let mut b = FunctionBuilder::new("f", false);
        let a = b.temp(ValueType::I32);
        let c = b.temp(ValueType::I32);
        let d = b.temp(ValueType::F64);
        assert_eq!(a, c);
        assert_ne!(a, d);
        assert_eq!(b.locals().len(), 2);
    }

    #[test]
    fn labels_are_function_unique() {
        let mut b = FunctionBuilder::new("f", false);
        let first = b.fresh_label("break");
        let second = b.fresh_label("continue");
        let third = b.fresh_label("break");
        assert_ne!(first, third);
        assert_eq!(first, "break.0");
        assert_eq!(second, "continue.1");
    }
}
