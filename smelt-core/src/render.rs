//! Rendering of compiled modules to WebAssembly text format.
//!
//! Names are the currency throughout the core, so the renderer prints `$`
//! identifiers for functions, locals, globals and labels instead of indices.
//! Structured control renders as flat `block`/`loop`/`if` … `end` lines with
//! indentation.

use std::fmt::Write as _;

use crate::builder::FunctionBuilder;
use crate::compile::CompiledModule;
use crate::instr::{BinOp, Instruction, MemWidth, UnOp, Value};
use crate::types::ValueType;

/// Render a whole module.
pub fn render_module(module: &CompiledModule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "(module");
    if let Some(pages) = module.memory_pages {
        let _ = writeln!(out, "  (memory $memory {pages})");
    }
    for global in &module.globals {
        let _ = writeln!(
            out,
            "  (global ${} (mut {}) ({}))",
            global.name,
            global.ty.value_type(),
            constant_text(global.init)
        );
    }
    for function in &module.functions {
        write_function(&mut out, function);
    }
    out.push_str(")\n");
    out
}

/// Render one function body (used by tests and the trace stream).
pub fn render_function(function: &FunctionBuilder) -> String {
    let mut out = String::new();
    write_function(&mut out, function);
    out
}

fn write_function(out: &mut String, function: &FunctionBuilder) {
    let _ = write!(out, "  (func ${}", function.name);
    if function.export {
        let _ = write!(out, " (export \"{}\")", function.name);
    }
    for param in function.params() {
        let _ = write!(out, " (param ${} {})", param.machine_name, param.value_type);
    }
    if let Some(result) = function.result {
        let _ = write!(out, " (result {result})");
    }
    let _ = writeln!(out);
    for local in function.body_locals() {
        let _ = writeln!(out, "    (local ${} {})", local.machine_name, local.value_type);
    }
    write_body(out, &function.instructions, 2);
    let _ = writeln!(out, "  )");
}

fn write_body(out: &mut String, instructions: &[Instruction], indent: usize) {
    for instruction in instructions {
        match instruction {
            Instruction::Block { body, .. } | Instruction::Loop { body, .. } => {
                write_line(out, indent, &instruction_text(instruction));
                write_body(out, body, indent + 1);
                write_line(out, indent, "end");
            }
            Instruction::If {
                then_body,
                else_body,
                ..
            } => {
                write_line(out, indent, &instruction_text(instruction));
                write_body(out, then_body, indent + 1);
                if !else_body.is_empty() {
                    write_line(out, indent, "else");
                    write_body(out, else_body, indent + 1);
                }
                write_line(out, indent, "end");
            }
            _ => write_line(out, indent, &instruction_text(instruction)),
        }
    }
}

fn write_line(out: &mut String, indent: usize, text: &str) {
    for _ in 0..indent {
        out.push_str("  ");
    }
    out.push_str(text);
    out.push('\n');
}

/// The text of one instruction; block-like instructions yield their header
/// line only.
pub fn instruction_text(instruction: &Instruction) -> String {
    match instruction {
        Instruction::Const(value) => constant_text(*value),
        Instruction::Binary { ty, op } => format!("{}.{}", ty, binop_text(*op, ty.is_float())),
        Instruction::Unary { ty, op } => format!("{}.{}", ty, unop_text(*op)),
        Instruction::Convert(op) => op.name().to_string(),
        Instruction::Load {
            ty,
            width,
            signed,
            offset,
        } => {
            let mut text = format!("{}.{}", ty, load_text(*ty, *width, *signed));
            if *offset > 0 {
                let _ = write!(text, " offset={offset}");
            }
            text
        }
        Instruction::Store { ty, width, offset } => {
            let mut text = format!("{}.{}", ty, store_text(*ty, *width));
            if *offset > 0 {
                let _ = write!(text, " offset={offset}");
            }
            text
        }
        Instruction::LocalGet(name) => format!("local.get ${name}"),
        Instruction::LocalSet(name) => format!("local.set ${name}"),
        Instruction::LocalTee(name) => format!("local.tee ${name}"),
        Instruction::GlobalGet(name) => format!("global.get ${name}"),
        Instruction::GlobalSet(name) => format!("global.set ${name}"),
        Instruction::Select => "select".to_string(),
        Instruction::Block { label, .. } => format!("block ${label}"),
        Instruction::Loop { label, .. } => format!("loop ${label}"),
        Instruction::If { result, .. } => match result {
            Some(ty) => format!("if (result {ty})"),
            None => "if".to_string(),
        },
        Instruction::Br(label) => format!("br ${label}"),
        Instruction::BrIf(label) => format!("br_if ${label}"),
        Instruction::Call(name) => format!("call ${name}"),
        Instruction::Return => "return".to_string(),
        Instruction::Drop => "drop".to_string(),
        Instruction::Nop => "nop".to_string(),
        Instruction::Unreachable => "unreachable".to_string(),
    }
}

fn constant_text(value: Value) -> String {
    match value {
        Value::I32(v) => format!("i32.const {v}"),
        Value::I64(v) => format!("i64.const {v}"),
        Value::F32(v) => {
            if v.is_nan() || v.is_infinite() {
                format!("f32.const {}", float_text(f64::from(v)))
            } else {
                format!("f32.const {v}")
            }
        }
        Value::F64(v) => format!("f64.const {}", float_text(v)),
    }
}

/// WAT float syntax: `nan` and `inf` are lowercase keywords.
fn float_text(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value < 0.0 {
            "-inf".to_string()
        } else {
            "inf".to_string()
        }
    } else {
        format!("{value}")
    }
}

fn binop_text(op: BinOp, float: bool) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::DivS => {
            if float {
                "div"
            } else {
                "div_s"
            }
        }
        BinOp::DivU => "div_u",
        BinOp::RemS => "rem_s",
        BinOp::RemU => "rem_u",
        BinOp::And => "and",
        BinOp::Or => "or",
        BinOp::Xor => "xor",
        BinOp::Shl => "shl",
        BinOp::ShrS => "shr_s",
        BinOp::ShrU => "shr_u",
        BinOp::Eq => "eq",
        BinOp::Ne => "ne",
        BinOp::LtS => {
            if float {
                "lt"
            } else {
                "lt_s"
            }
        }
        BinOp::LtU => "lt_u",
        BinOp::GtS => {
            if float {
                "gt"
            } else {
                "gt_s"
            }
        }
        BinOp::GtU => "gt_u",
        BinOp::LeS => {
            if float {
                "le"
            } else {
                "le_s"
            }
        }
        BinOp::LeU => "le_u",
        BinOp::GeS => {
            if float {
                "ge"
            } else {
                "ge_s"
            }
        }
        BinOp::GeU => "ge_u",
        BinOp::Min => "min",
        BinOp::Max => "max",
        BinOp::Copysign => "copysign",
    }
}

fn unop_text(op: UnOp) -> &'static str {
    match op {
        UnOp::Eqz => "eqz",
        UnOp::Clz => "clz",
        UnOp::Ctz => "ctz",
        UnOp::Popcnt => "popcnt",
        UnOp::Abs => "abs",
        UnOp::Neg => "neg",
        UnOp::Ceil => "ceil",
        UnOp::Floor => "floor",
        UnOp::Trunc => "trunc",
        UnOp::Nearest => "nearest",
        UnOp::Sqrt => "sqrt",
    }
}

fn load_text(ty: ValueType, width: MemWidth, signed: bool) -> String {
    let full_width = matches!(
        (ty, width),
        (ValueType::I32, MemWidth::W32)
            | (ValueType::I64, MemWidth::W64)
            | (ValueType::F32, MemWidth::W32)
            | (ValueType::F64, MemWidth::W64)
    );
    if full_width {
        return "load".to_string();
    }
    let bits = match width {
        MemWidth::W8 => 8,
        MemWidth::W16 => 16,
        MemWidth::W32 => 32,
        MemWidth::W64 => 64,
    };
    format!("load{}_{}", bits, if signed { "s" } else { "u" })
}

fn store_text(ty: ValueType, width: MemWidth) -> String {
    let full_width = matches!(
        (ty, width),
        (ValueType::I32, MemWidth::W32)
            | (ValueType::I64, MemWidth::W64)
            | (ValueType::F32, MemWidth::W32)
            | (ValueType::F64, MemWidth::W64)
    );
    if full_width {
        return "store".to_string();
    }
    let bits = match width {
        MemWidth::W8 => 8,
        MemWidth::W16 => 16,
        MemWidth::W32 => 32,
        MemWidth::W64 => 64,
    };
    format!("store{bits}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Intrinsic, TypeSpec};

    #[test]
    fn instruction_mnemonics() {
        assert_eq!(
            instruction_text(&Instruction::i32_const(11)),
            "i32.const 11"
        );
        assert_eq!(
            instruction_text(&Instruction::Binary {
                ty: ValueType::F64,
                op: BinOp::LtS
            }),
            "f64.lt"
        );
        assert_eq!(
            instruction_text(&Instruction::Binary {
                ty: ValueType::I32,
                op: BinOp::ShrU
            }),
            "i32.shr_u"
        );
        assert_eq!(
            instruction_text(&Instruction::Load {
                ty: ValueType::F64,
                width: MemWidth::W64,
                signed: true,
                offset: 8
            }),
            "f64.load offset=8"
        );
        assert_eq!(
            instruction_text(&Instruction::Load {
                ty: ValueType::I32,
                width: MemWidth::W8,
                signed: false,
                offset: 0
            }),
            "i32.load8_u"
        );
        assert_eq!(
            instruction_text(&Instruction::Store {
                ty: ValueType::I32,
                width: MemWidth::W16,
                offset: 0
            }),
            "i32.store16"
        );
    }

    #[test]
    fn float_keywords_are_lowercase() {
        assert_eq!(float_text(f64::NAN), "nan");
        assert_eq!(float_text(f64::INFINITY), "inf");
        assert_eq!(float_text(f64::NEG_INFINITY), "-inf");
        assert_eq!(float_text(2.5), "2.5");
    }

    #[test]
    fn function_shell_renders_params_and_locals() {
        let mut f = FunctionBuilder::new("add", true);
        f.declare(
            "x",
            TypeSpec::Intrinsic(Intrinsic::I32),
            ValueType::I32,
            true,
        );
        f.declare(
            "y",
            TypeSpec::Intrinsic(Intrinsic::F64),
            ValueType::F64,
            false,
        );
        f.result = Some(ValueType::I32);
        f.push(Instruction::LocalGet("x".into()));
        f.push(Instruction::Return);
        let text = render_function(&f);
        assert!(text.contains("(func $add (export \"add\") (param $x i32) (result i32)"));
        assert!(text.contains("(local $y f64)"));
        assert!(text.contains("local.get $x"));
    }
}
