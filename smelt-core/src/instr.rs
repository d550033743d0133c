//! Typed representation of the emitted WebAssembly instructions.
//!
//! Instructions are simple records. Structured control (`block`, `loop`, `if`)
//! nests instruction lists; branches target labels by name, which is also how
//! the text renderer prints them. Locals and globals are referenced by their
//! machine names.

use crate::types::ValueType;

/// A constant of one of the four machine types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// `i32.const`
    I32(i32),
    /// `i64.const`
    I64(i64),
    /// `f32.const`
    F32(f32),
    /// `f64.const`
    F64(f64),
}

impl Value {
    /// Machine type of the constant.
    pub fn value_type(self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }

    /// Integer payload of an `i32`/`i64` constant.
    pub fn as_integer(self) -> Option<i64> {
        match self {
            Value::I32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            Value::F32(_) | Value::F64(_) => None,
        }
    }
}

/// Binary operations, parameterized by the machine type they run on.
///
/// Signed/unsigned pairs exist only for integers; on float types the renderer
/// drops the suffix (`f64.lt`, `f64.div`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `add`
    Add,
    /// `sub`
    Sub,
    /// `mul`
    Mul,
    /// `div_s` on integers, `div` on floats
    DivS,
    /// `div_u`
    DivU,
    /// `rem_s`
    RemS,
    /// `rem_u`
    RemU,
    /// `and`
    And,
    /// `or`
    Or,
    /// `xor`
    Xor,
    /// `shl`
    Shl,
    /// `shr_s`
    ShrS,
    /// `shr_u`
    ShrU,
    /// `eq`
    Eq,
    /// `ne`
    Ne,
    /// `lt_s` on integers, `lt` on floats
    LtS,
    /// `lt_u`
    LtU,
    /// `gt_s` on integers, `gt` on floats
    GtS,
    /// `gt_u`
    GtU,
    /// `le_s` on integers, `le` on floats
    LeS,
    /// `le_u`
    LeU,
    /// `ge_s` on integers, `ge` on floats
    GeS,
    /// `ge_u`
    GeU,
    /// `min` (float only)
    Min,
    /// `max` (float only)
    Max,
    /// `copysign` (float only)
    Copysign,
}

impl BinOp {
    /// Comparisons push an `i32` regardless of operand type.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq
                | BinOp::Ne
                | BinOp::LtS
                | BinOp::LtU
                | BinOp::GtS
                | BinOp::GtU
                | BinOp::LeS
                | BinOp::LeU
                | BinOp::GeS
                | BinOp::GeU
        )
    }
}

/// Unary operations, parameterized by machine type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// `eqz` (integer; pushes `i32`)
    Eqz,
    /// `clz`
    Clz,
    /// `ctz`
    Ctz,
    /// `popcnt`
    Popcnt,
    /// `abs` (float)
    Abs,
    /// `neg` (float)
    Neg,
    /// `ceil`
    Ceil,
    /// `floor`
    Floor,
    /// `trunc`
    Trunc,
    /// `nearest`
    Nearest,
    /// `sqrt`
    Sqrt,
}

/// Conversions between machine types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvOp {
    /// `i32.wrap_i64`
    I32WrapI64,
    /// `i64.extend_i32_s`
    I64ExtendI32S,
    /// `i64.extend_i32_u`
    I64ExtendI32U,
    /// `f32.convert_i32_s`
    F32ConvertI32S,
    /// `f32.convert_i32_u`
    F32ConvertI32U,
    /// `f32.convert_i64_s`
    F32ConvertI64S,
    /// `f32.convert_i64_u`
    F32ConvertI64U,
    /// `f64.convert_i32_s`
    F64ConvertI32S,
    /// `f64.convert_i32_u`
    F64ConvertI32U,
    /// `f64.convert_i64_s`
    F64ConvertI64S,
    /// `f64.convert_i64_u`
    F64ConvertI64U,
    /// `i32.trunc_f32_s`
    I32TruncF32S,
    /// `i32.trunc_f32_u`
    I32TruncF32U,
    /// `i32.trunc_f64_s`
    I32TruncF64S,
    /// `i32.trunc_f64_u`
    I32TruncF64U,
    /// `i64.trunc_f32_s`
    I64TruncF32S,
    /// `i64.trunc_f32_u`
    I64TruncF32U,
    /// `i64.trunc_f64_s`
    I64TruncF64S,
    /// `i64.trunc_f64_u`
    I64TruncF64U,
    /// `f32.demote_f64`
    F32DemoteF64,
    /// `f64.promote_f32`
    F64PromoteF32,
}

impl ConvOp {
    /// Machine type consumed by the conversion.
    pub fn input(self) -> ValueType {
        use ConvOp::*;
        match self {
            I32WrapI64 | F32ConvertI64S | F32ConvertI64U | F64ConvertI64S | F64ConvertI64U => {
                ValueType::I64
            }
            I64ExtendI32S | I64ExtendI32U | F32ConvertI32S | F32ConvertI32U | F64ConvertI32S
            | F64ConvertI32U => ValueType::I32,
            I32TruncF32S | I32TruncF32U | I64TruncF32S | I64TruncF32U | F64PromoteF32 => {
                ValueType::F32
            }
            I32TruncF64S | I32TruncF64U | I64TruncF64S | I64TruncF64U | F32DemoteF64 => {
                ValueType::F64
            }
        }
    }

    /// Machine type produced by the conversion.
    pub fn output(self) -> ValueType {
        use ConvOp::*;
        match self {
            I32WrapI64 | I32TruncF32S | I32TruncF32U | I32TruncF64S | I32TruncF64U => ValueType::I32,
            I64ExtendI32S | I64ExtendI32U | I64TruncF32S | I64TruncF32U | I64TruncF64S
            | I64TruncF64U => ValueType::I64,
            F32ConvertI32S | F32ConvertI32U | F32ConvertI64S | F32ConvertI64U | F32DemoteF64 => {
                ValueType::F32
            }
            F64ConvertI32S | F64ConvertI32U | F64ConvertI64S | F64ConvertI64U | F64PromoteF32 => {
                ValueType::F64
            }
        }
    }

    /// The WAT mnemonic.
    pub fn name(self) -> &'static str {
        use ConvOp::*;
        match self {
            I32WrapI64 => "i32.wrap_i64",
            I64ExtendI32S => "i64.extend_i32_s",
            I64ExtendI32U => "i64.extend_i32_u",
            F32ConvertI32S => "f32.convert_i32_s",
            F32ConvertI32U => "f32.convert_i32_u",
            F32ConvertI64S => "f32.convert_i64_s",
            F32ConvertI64U => "f32.convert_i64_u",
            F64ConvertI32S => "f64.convert_i32_s",
            F64ConvertI32U => "f64.convert_i32_u",
            F64ConvertI64S => "f64.convert_i64_s",
            F64ConvertI64U => "f64.convert_i64_u",
            I32TruncF32S => "i32.trunc_f32_s",
            I32TruncF32U => "i32.trunc_f32_u",
            I32TruncF64S => "i32.trunc_f64_s",
            I32TruncF64U => "i32.trunc_f64_u",
            I64TruncF32S => "i64.trunc_f32_s",
            I64TruncF32U => "i64.trunc_f32_u",
            I64TruncF64S => "i64.trunc_f64_s",
            I64TruncF64U => "i64.trunc_f64_u",
            F32DemoteF64 => "f32.demote_f64",
            F64PromoteF32 => "f64.promote_f32",
        }
    }
}

/// Byte width of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemWidth {
    /// 1 byte
    W8,
    /// 2 bytes
    W16,
    /// 4 bytes
    W32,
    /// 8 bytes
    W64,
}

/// An emitted instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// A typed constant.
    Const(Value),
    /// A typed binary operation; pops two, pushes one.
    Binary {
        /// Operand machine type.
        ty: ValueType,
        /// Operation.
        op: BinOp,
    },
    /// A typed unary operation.
    Unary {
        /// Operand machine type.
        ty: ValueType,
        /// Operation.
        op: UnOp,
    },
    /// A conversion between machine types.
    Convert(ConvOp),
    /// A typed load from linear memory; pops the address.
    Load {
        /// Result machine type.
        ty: ValueType,
        /// Access width.
        width: MemWidth,
        /// Sign-extend flag for sub-word and 64-bit integer loads.
        signed: bool,
        /// Static byte offset added to the address.
        offset: u32,
    },
    /// A typed store to linear memory; pops value then address.
    Store {
        /// Operand machine type.
        ty: ValueType,
        /// Access width.
        width: MemWidth,
        /// Static byte offset added to the address.
        offset: u32,
    },
    /// `local.get`
    LocalGet(String),
    /// `local.set`
    LocalSet(String),
    /// `local.tee`
    LocalTee(String),
    /// `global.get`
    GlobalGet(String),
    /// `global.set`
    GlobalSet(String),
    /// `select`: pops condition, two values; pushes one.
    Select,
    /// A labeled block; branching to the label exits it.
    Block {
        /// Label name.
        label: String,
        /// Body instructions.
        body: Vec<Instruction>,
    },
    /// A labeled loop; branching to the label restarts it.
    Loop {
        /// Label name.
        label: String,
        /// Body instructions.
        body: Vec<Instruction>,
    },
    /// Two-armed conditional; pops the selector.
    If {
        /// Result machine type, when the arms push a value.
        result: Option<ValueType>,
        /// Taken when the selector is non-zero.
        then_body: Vec<Instruction>,
        /// Taken when the selector is zero.
        else_body: Vec<Instruction>,
    },
    /// Unconditional branch to a label.
    Br(String),
    /// Conditional branch; pops the condition.
    BrIf(String),
    /// Direct call by function name.
    Call(String),
    /// Return from the function.
    Return,
    /// Pop and discard one value.
    Drop,
    /// No operation.
    Nop,
    /// Trap.
    Unreachable,
}

impl Instruction {
    /// Shorthand for an `i32.const`.
    pub fn i32_const(value: i32) -> Instruction {
        Instruction::Const(Value::I32(value))
    }

    /// Shorthand for an `i64.const`.
    pub fn i64_const(value: i64) -> Instruction {
        Instruction::Const(Value::I64(value))
    }

    /// True for instructions after which code in the same block is dead.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Return | Instruction::Br(_) | Instruction::Unreachable
        )
    }
}
