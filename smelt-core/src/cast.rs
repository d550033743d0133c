//! The canonical cast table between intrinsic types, the storage cast used
//! for initializers and assignments, and typed memory access selection.
//!
//! Casting first produces a value of the target's machine shape (wrap,
//! extend, convert, trunc, promote, demote), then tightens 8/16-bit targets
//! back into range with a mask and, for signed targets, a shift pair. The
//! tightening is skipped when the source is a literal provably in range.

use crate::ast::LiteralValue;
use crate::builder::FunctionBuilder;
use crate::instr::{BinOp, ConvOp, Instruction, MemWidth, Value};
use crate::types::{Intrinsic, TypeSpec, ValueType};

/// Emit the instructions converting a value of intrinsic type `from` into
/// intrinsic type `to`. `literal` carries the source literal when the operand
/// is one, enabling the tighten skip.
pub fn emit_cast(
    builder: &mut FunctionBuilder,
    from: Intrinsic,
    to: Intrinsic,
    literal: Option<&LiteralValue>,
) {
    if from == to {
        return;
    }
    emit_shape_cast(builder, from, to);
    if to.bits() <= 16 && !literal_fits(literal, to) {
        emit_tighten(builder, to);
    }
}

/// The machine-shape part of the cast table, without tightening.
fn emit_shape_cast(builder: &mut FunctionBuilder, from: Intrinsic, to: Intrinsic) {
    use ValueType::*;
    let (src, dst) = (from.value_type(), to.value_type());
    match (src, dst) {
        // Same underlying shape; signedness alone changes nothing.
        (I32, I32) | (I64, I64) | (F32, F32) | (F64, F64) => {}
        (I64, I32) => builder.push(Instruction::Convert(ConvOp::I32WrapI64)),
        (I32, I64) => builder.push(Instruction::Convert(if to.is_signed() {
            ConvOp::I64ExtendI32S
        } else {
            ConvOp::I64ExtendI32U
        })),
        (I32, F32) => builder.push(Instruction::Convert(if from.is_signed() {
            ConvOp::F32ConvertI32S
        } else {
            ConvOp::F32ConvertI32U
        })),
        (I32, F64) => builder.push(Instruction::Convert(if from.is_signed() {
            ConvOp::F64ConvertI32S
        } else {
            ConvOp::F64ConvertI32U
        })),
        (I64, F32) => builder.push(Instruction::Convert(if from.is_signed() {
            ConvOp::F32ConvertI64S
        } else {
            ConvOp::F32ConvertI64U
        })),
        (I64, F64) => builder.push(Instruction::Convert(if from.is_signed() {
            ConvOp::F64ConvertI64S
        } else {
            ConvOp::F64ConvertI64U
        })),
        (F32, I32) => builder.push(Instruction::Convert(if to.is_signed() {
            ConvOp::I32TruncF32S
        } else {
            ConvOp::I32TruncF32U
        })),
        (F64, I32) => builder.push(Instruction::Convert(if to.is_signed() {
            ConvOp::I32TruncF64S
        } else {
            ConvOp::I32TruncF64U
        })),
        (F32, I64) => builder.push(Instruction::Convert(if to.is_signed() {
            ConvOp::I64TruncF32S
        } else {
            ConvOp::I64TruncF32U
        })),
        (F64, I64) => builder.push(Instruction::Convert(if to.is_signed() {
            ConvOp::I64TruncF64S
        } else {
            ConvOp::I64TruncF64U
        })),
        (F32, F64) => builder.push(Instruction::Convert(ConvOp::F64PromoteF32)),
        (F64, F32) => builder.push(Instruction::Convert(ConvOp::F32DemoteF64)),
    }
}

/// Mask an `i32` down to an 8/16-bit range, sign-extending signed targets.
fn emit_tighten(builder: &mut FunctionBuilder, to: Intrinsic) {
    let mask = if to.bits() == 8 { 0xff } else { 0xffff };
    builder.push(Instruction::i32_const(mask));
    builder.push(Instruction::Binary {
        ty: ValueType::I32,
        op: BinOp::And,
    });
    if to.is_signed() {
        let shift = 32 - to.bits() as i32;
        builder.push(Instruction::i32_const(shift));
        builder.push(Instruction::Binary {
            ty: ValueType::I32,
            op: BinOp::Shl,
        });
        builder.push(Instruction::i32_const(shift));
        builder.push(Instruction::Binary {
            ty: ValueType::I32,
            op: BinOp::ShrS,
        });
    }
}

/// Whether a literal source value already lies in the target's range.
fn literal_fits(literal: Option<&LiteralValue>, to: Intrinsic) -> bool {
    let Some(LiteralValue::Int(v)) = literal else {
        return false;
    };
    let bits = to.bits();
    if to.is_signed() {
        let limit = 1i64 << (bits - 1);
        (-limit..limit).contains(v)
    } else {
        (0..1i64 << bits).contains(v)
    }
}

/// Whether a value of type `from` can be stored into a location of type
/// `to`. Mirrors [`emit_storage_cast`] without emitting, so callers can
/// reject before any operand lands on the stack.
pub fn storage_compatible(from: &TypeSpec, to: &TypeSpec) -> bool {
    match to {
        TypeSpec::Pointer(_) => match from {
            TypeSpec::Pointer(_) => true,
            TypeSpec::Intrinsic(intrinsic) => intrinsic.is_integer(),
            _ => false,
        },
        TypeSpec::Intrinsic(target) => match from {
            TypeSpec::Intrinsic(_) => true,
            TypeSpec::Pointer(_) => target.is_integer(),
            _ => false,
        },
        TypeSpec::Array { .. } | TypeSpec::Struct(_) => false,
    }
}

/// Emit the storage cast used by initializers and assignments. Pointer
/// storage accepts a pointer or any non-float intrinsic; 64-bit integers are
/// narrowed before storage. Returns `false` when no cast exists.
pub fn emit_storage_cast(
    builder: &mut FunctionBuilder,
    from: &TypeSpec,
    to: &TypeSpec,
    literal: Option<&LiteralValue>,
) -> bool {
    match to {
        TypeSpec::Pointer(_) => match from {
            TypeSpec::Pointer(_) => true,
            TypeSpec::Intrinsic(intrinsic) if intrinsic.is_integer() => {
                if intrinsic.value_type() == ValueType::I64 {
                    builder.push(Instruction::Convert(ConvOp::I32WrapI64));
                }
                true
            }
            _ => false,
        },
        TypeSpec::Intrinsic(target) => match from {
            TypeSpec::Intrinsic(source) => {
                emit_cast(builder, *source, *target, literal);
                true
            }
            // A pointer stores into integer targets as an unsigned address.
            TypeSpec::Pointer(_) if target.is_integer() => {
                emit_cast(builder, Intrinsic::U32, *target, None);
                true
            }
            _ => false,
        },
        TypeSpec::Array { .. } | TypeSpec::Struct(_) => false,
    }
}

/// The typed load for a scalar storage type. Sub-word integer loads
/// sign-extend exactly when the intrinsic is signed; floats load plain.
pub fn load_for(spec: &TypeSpec) -> Option<Instruction> {
    let intrinsic = scalar_of(spec)?;
    let (ty, width) = access_shape(intrinsic);
    Some(Instruction::Load {
        ty,
        width,
        signed: intrinsic.is_signed(),
        offset: 0,
    })
}

/// The typed store for a scalar storage type.
pub fn store_for(spec: &TypeSpec) -> Option<Instruction> {
    let intrinsic = scalar_of(spec)?;
    let (ty, width) = access_shape(intrinsic);
    Some(Instruction::Store {
        ty,
        width,
        offset: 0,
    })
}

/// Pointers access memory as unsigned 32-bit addresses.
fn scalar_of(spec: &TypeSpec) -> Option<Intrinsic> {
    match spec {
        TypeSpec::Intrinsic(i) => Some(*i),
        TypeSpec::Pointer(_) => Some(Intrinsic::U32),
        TypeSpec::Array { .. } | TypeSpec::Struct(_) => None,
    }
}

fn access_shape(intrinsic: Intrinsic) -> (ValueType, MemWidth) {
    let width = match intrinsic.bits() {
        8 => MemWidth::W8,
        16 => MemWidth::W16,
        32 => MemWidth::W32,
        _ => MemWidth::W64,
    };
    (intrinsic.value_type(), width)
}

/// Machine constant for a literal of the given intrinsic type.
pub fn constant_for(intrinsic: Intrinsic, literal: &LiteralValue) -> Value {
    use num_traits::ToPrimitive;
    match intrinsic.value_type() {
        ValueType::F32 => Value::F32(literal.as_f64() as f32),
        ValueType::F64 => Value::F64(literal.as_f64()),
        machine => {
            let wide = match literal {
                LiteralValue::Int(v) => *v,
                LiteralValue::Real(v) => *v as i64,
                LiteralValue::BigInt(v) => v
                    .to_i64()
                    .or_else(|| v.to_u64().map(|u| u as i64))
                    .unwrap_or(0),
            };
            if machine == ValueType::I32 {
                Value::I32(wide as i32)
            } else {
                Value::I64(wide)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn casted(from: Intrinsic, to: Intrinsic) -> Vec<Instruction> {
        let mut b = FunctionBuilder::new("t", false);
        emit_cast(&mut b, from, to, None);
        b.instructions
    }

    #[test]
    fn signedness_only_is_free() {
        assert!(casted(Intrinsic::I32, Intrinsic::U32).is_empty());
        assert!(casted(Intrinsic::U64, Intrinsic::I64).is_empty());
    }

    #[test]
    fn identity_cast_is_free_even_when_narrow() {
        assert!(casted(Intrinsic::I16, Intrinsic::I16).is_empty());
        assert!(casted(Intrinsic::U8, Intrinsic::U8).is_empty());
    }

    #[test]
    fn narrowing_from_u8_to_i8_still_sign_extends() {
        let instrs = casted(Intrinsic::U8, Intrinsic::I8);
        assert!(instrs.contains(&Instruction::Binary {
            ty: ValueType::I32,
            op: BinOp::ShrS
        }));
    }

    #[test]
    fn widening_follows_target_signedness() {
        assert_eq!(
            casted(Intrinsic::U32, Intrinsic::I64),
            vec![Instruction::Convert(ConvOp::I64ExtendI32S)]
        );
        assert_eq!(
            casted(Intrinsic::I32, Intrinsic::U64),
            vec![Instruction::Convert(ConvOp::I64ExtendI32U)]
        );
    }

    #[test]
    fn narrowing_to_i8_masks_and_sign_extends() {
        let instrs = casted(Intrinsic::I32, Intrinsic::I8);
        assert_eq!(
            instrs,
            vec![
                Instruction::i32_const(0xff),
                Instruction::Binary {
                    ty: ValueType::I32,
                    op: BinOp::And
                },
                Instruction::i32_const(24),
                Instruction::Binary {
                    ty: ValueType::I32,
                    op: BinOp::Shl
                },
                Instruction::i32_const(24),
                Instruction::Binary {
                    ty: ValueType::I32,
                    op: BinOp::ShrS
                },
            ]
        );
    }

    #[test]
    fn narrowing_to_u16_only_masks() {
        let instrs = casted(Intrinsic::I32, Intrinsic::U16);
        assert_eq!(
            instrs,
            vec![
                Instruction::i32_const(0xffff),
                Instruction::Binary {
                    ty: ValueType::I32,
                    op: BinOp::And
                },
            ]
        );
    }

    #[test]
    fn in_range_literal_skips_tightening() {
        let mut b = FunctionBuilder::new("t", false);
        emit_cast(
            &mut b,
            Intrinsic::I32,
            Intrinsic::U8,
            Some(&LiteralValue::Int(200)),
        );
        assert!(b.instructions.is_empty());
    }

    #[test]
    fn float_to_unsigned_trunc() {
        assert_eq!(
            casted(Intrinsic::F64, Intrinsic::U32),
            vec![Instruction::Convert(ConvOp::I32TruncF64U)]
        );
    }

    #[test]
    fn typed_loads_carry_sign_flags() {
        let load = load_for(&TypeSpec::Intrinsic(Intrinsic::I8)).unwrap();
        assert_eq!(
            load,
            Instruction::Load {
                ty: ValueType::I32,
                width: MemWidth::W8,
                signed: true,
                offset: 0
            }
        );
        let load = load_for(&TypeSpec::Intrinsic(Intrinsic::U16)).unwrap();
        assert!(matches!(
            load,
            Instruction::Load {
                width: MemWidth::W16,
                signed: false,
                ..
            }
        ));
    }
}
