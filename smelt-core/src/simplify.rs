//! Pure rewriting over the expression tree, ahead of emission.
//!
//! Four passes run in order until one full round changes nothing: trivial
//! literal elimination, literal reordering for commutative operators,
//! additive-chain refolding, and constant folding. Folding evaluates in host
//! doubles, switching to arbitrary-precision integers whenever a big-integer
//! literal is involved; fold results keep the `Int`/`Real`/`BigInt`
//! distinction of their inputs. A cast that would overflow at run time is
//! left in the tree.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::ast::{BinaryOp, Expression, LiteralValue, UnaryOp};
use crate::compile::{resolve_type, Binding, DeclTable};
use crate::types::{Intrinsic, TypeTable};

/// Read-only context the simplifier needs: named constants and the size
/// oracle.
pub struct SimplifyContext<'a> {
    /// Module declaration table, for `const` resolution.
    pub decls: &'a DeclTable,
    /// Size oracle, for `sizeof`.
    pub types: &'a TypeTable,
}

/// Simplify an expression in place until a fixed point is reached.
/// Idempotent: simplifying an already-simplified tree changes nothing.
pub fn simplify(expr: &mut Expression, ctx: &SimplifyContext) {
    loop {
        let changed = pass_trivial(expr)
            + pass_reorder(expr)
            + pass_refold(expr)
            + pass_fold(expr, ctx);
        if changed == 0 {
            break;
        }
    }
}

/// Detach a child node, leaving a placeholder behind.
fn take(expr: &mut Expression) -> Expression {
    std::mem::replace(expr, Expression::int(0))
}

/// Apply `f` to every direct child, summing rewrite counts. The rewritten
/// alternate of a conditional is assigned back to the alternate slot.
fn each_child(expr: &mut Expression, f: &mut dyn FnMut(&mut Expression) -> usize) -> usize {
    match expr {
        Expression::Literal { .. } | Expression::Identifier { .. } => 0,
        Expression::UnaryExpression { operand, .. } => f(operand),
        Expression::BinaryExpression { left, right, .. } => f(left) + f(right),
        Expression::ConditionalExpression {
            condition,
            consequent,
            alternate,
            ..
        } => f(condition) + f(consequent) + f(alternate),
        Expression::TypeCast { operand, .. } => f(operand),
        Expression::MemberAccess { object, .. } => f(object),
        Expression::ItemAccess { array, index, .. } => f(array) + f(index),
        Expression::DereferenceExpression { operand, .. } => f(operand),
        Expression::BuiltInFunctionInvocation { args, .. }
        | Expression::FunctionInvocation { args, .. } => args.iter_mut().map(|a| f(a)).sum(),
        Expression::SizeOfExpression { .. } => 0,
    }
}

// ---------------------------------------------------------------------------
// Pass 1: remove trivial literals from binary operations
// ---------------------------------------------------------------------------

fn pass_trivial(expr: &mut Expression) -> usize {
    let mut count = each_child(expr, &mut pass_trivial);
    count += rewrite_trivial(expr);
    count
}

fn rewrite_trivial(expr: &mut Expression) -> usize {
    let Expression::BinaryExpression {
        op,
        left,
        right,
        loc,
    } = expr
    else {
        return 0;
    };
    let op = *op;
    let loc = *loc;
    let left_zero = left.as_literal().is_some_and(|v| v.is(0));
    let right_zero = right.as_literal().is_some_and(|v| v.is(0));
    let left_one = left.as_literal().is_some_and(|v| v.is(1));
    let right_one = right.as_literal().is_some_and(|v| v.is(1));

    let replacement = match op {
        BinaryOp::Add | BinaryOp::BitOr | BinaryOp::BitXor if left_zero => take(right),
        BinaryOp::Add | BinaryOp::BitOr | BinaryOp::BitXor if right_zero => take(left),
        BinaryOp::Sub if left_zero => Expression::UnaryExpression {
            op: UnaryOp::Minus,
            operand: Box::new(take(right)),
            loc,
        },
        BinaryOp::Sub if right_zero => take(left),
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::ShrU if right_zero => take(left),
        BinaryOp::Mul if left_one => take(right),
        BinaryOp::Mul if right_one => take(left),
        BinaryOp::Div if right_one => take(left),
        BinaryOp::Rem if right_one => Expression::int(0),
        BinaryOp::BitAnd if left_zero || right_zero => Expression::int(0),
        _ => return 0,
    };
    *expr = replacement;
    1
}

// ---------------------------------------------------------------------------
// Pass 2: order literals to the right of commutative operators
// ---------------------------------------------------------------------------

fn pass_reorder(expr: &mut Expression) -> usize {
    let mut count = each_child(expr, &mut pass_reorder);
    if let Expression::BinaryExpression {
        op, left, right, ..
    } = expr
    {
        if op.is_commutative() && left.as_literal().is_some() && right.as_literal().is_none() {
            std::mem::swap(left, right);
            count += 1;
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Pass 3: refold additive chains
// ---------------------------------------------------------------------------

fn pass_refold(expr: &mut Expression) -> usize {
    let mut count = each_child(expr, &mut pass_refold);
    count += refold_chain(expr);
    count += normalize_negative_sub(expr);
    count
}

/// `(X op2 L2) op1 L1` with additive operators collapses to `X op2 L'`.
fn refold_chain(expr: &mut Expression) -> usize {
    let Expression::BinaryExpression {
        op: op1,
        left,
        right,
        ..
    } = expr
    else {
        return 0;
    };
    if !op1.is_additive() || right.as_literal().is_none() {
        return 0;
    }
    let Expression::BinaryExpression {
        op: op2,
        left: inner_left,
        right: inner_right,
        loc: inner_loc,
    } = left.as_mut()
    else {
        return 0;
    };
    if !op2.is_additive() || inner_right.as_literal().is_none() {
        return 0;
    }
    let l1 = right.as_literal().unwrap();
    let l2 = inner_right.as_literal().unwrap();
    let combine = if op1 == op2 { BinaryOp::Add } else { BinaryOp::Sub };
    let Some(folded) = fold_binary(combine, l2, l1) else {
        return 0;
    };
    let op2 = *op2;
    let loc = *inner_loc;
    let base = take(inner_left);
    *expr = Expression::BinaryExpression {
        op: op2,
        left: Box::new(base),
        right: Box::new(Expression::literal(folded)),
        loc,
    };
    1
}

/// `X - (-k)` becomes `X + k` for integer literals.
fn normalize_negative_sub(expr: &mut Expression) -> usize {
    let Expression::BinaryExpression { op, right, .. } = expr else {
        return 0;
    };
    if *op != BinaryOp::Sub {
        return 0;
    }
    let negated = match right.as_literal() {
        Some(LiteralValue::Int(v)) if *v < 0 => LiteralValue::Int(v.wrapping_neg()),
        Some(LiteralValue::BigInt(v)) if v.is_negative() => LiteralValue::BigInt(-v.clone()),
        _ => return 0,
    };
    *op = BinaryOp::Add;
    *right = Box::new(Expression::literal(negated));
    1
}

// ---------------------------------------------------------------------------
// Pass 4: constant folding
// ---------------------------------------------------------------------------

fn pass_fold(expr: &mut Expression, ctx: &SimplifyContext) -> usize {
    let mut count = each_child(expr, &mut |child| pass_fold(child, ctx));
    count += rewrite_fold(expr, ctx);
    count
}

fn rewrite_fold(expr: &mut Expression, ctx: &SimplifyContext) -> usize {
    let replacement = match expr {
        Expression::ConditionalExpression {
            condition,
            consequent,
            alternate,
            ..
        } => {
            let all_literal = condition.as_literal().is_some()
                && consequent.as_literal().is_some()
                && alternate.as_literal().is_some();
            if !all_literal {
                return 0;
            }
            let pick = condition.as_literal().unwrap().is_truthy();
            if pick {
                take(consequent)
            } else {
                take(alternate)
            }
        }
        Expression::BinaryExpression {
            op, left, right, ..
        } => {
            let (Some(l), Some(r)) = (left.as_literal(), right.as_literal()) else {
                return 0;
            };
            match fold_binary(*op, l, r) {
                Some(value) => Expression::literal(value),
                None => return 0,
            }
        }
        Expression::UnaryExpression { op, operand, .. } => {
            let Some(value) = operand.as_literal() else {
                return 0;
            };
            match fold_unary(*op, value) {
                Some(value) => Expression::literal(value),
                None => return 0,
            }
        }
        Expression::BuiltInFunctionInvocation { name, args, .. } => {
            let values: Option<Vec<&LiteralValue>> =
                args.iter().map(|a| a.as_literal()).collect();
            let Some(values) = values else {
                return 0;
            };
            if values.is_empty() {
                return 0;
            }
            match fold_builtin(name, &values) {
                Some(value) => Expression::literal(value),
                None => return 0,
            }
        }
        Expression::TypeCast {
            target, operand, ..
        } => {
            let Some(intrinsic) = Intrinsic::parse(target) else {
                return 0;
            };
            let Some(value) = operand.as_literal() else {
                return 0;
            };
            match fold_cast(intrinsic, value) {
                Some(value) => Expression::literal(value),
                None => return 0,
            }
        }
        Expression::SizeOfExpression { spec, .. } => {
            let Ok(resolved) = resolve_type(ctx.decls, ctx.types, spec) else {
                return 0;
            };
            let Ok(size) = ctx.types.size_of(&resolved) else {
                return 0;
            };
            Expression::int(i64::from(size))
        }
        Expression::Identifier { name, .. } => match ctx.decls.lookup(name) {
            Some(Binding::Const(value)) => Expression::literal(value.clone()),
            _ => return 0,
        },
        _ => return 0,
    };
    *expr = replacement;
    1
}

// ---------------------------------------------------------------------------
// Literal arithmetic
// ---------------------------------------------------------------------------

const SAFE_RANGE: f64 = 9_007_199_254_740_992.0; // 2^53

fn is_real(v: &LiteralValue) -> bool {
    matches!(v, LiteralValue::Real(_))
}

fn is_big(v: &LiteralValue) -> bool {
    matches!(v, LiteralValue::BigInt(_))
}

fn to_big(v: &LiteralValue) -> BigInt {
    match v {
        LiteralValue::Int(i) => BigInt::from(*i),
        LiteralValue::BigInt(b) => b.clone(),
        LiteralValue::Real(_) => unreachable!("float handled before big path"),
    }
}

/// Integer result of host-double arithmetic stays `Int` when both inputs
/// were `Int` and the value survives exactly.
fn numeric(result: f64, keep_int: bool) -> LiteralValue {
    if keep_int && result.is_finite() && result.fract() == 0.0 && result.abs() <= SAFE_RANGE {
        LiteralValue::Int(result as i64)
    } else {
        LiteralValue::Real(result)
    }
}

fn to_int32(x: f64) -> i32 {
    if !x.is_finite() {
        return 0;
    }
    let n = x.trunc().rem_euclid(4_294_967_296.0);
    n as u32 as i32
}

fn to_uint32(x: f64) -> u32 {
    to_int32(x) as u32
}

/// Fold a binary operation over two literals. `None` leaves the node in the
/// tree (division by zero on the big path, unsupported mixes).
pub fn fold_binary(op: BinaryOp, a: &LiteralValue, b: &LiteralValue) -> Option<LiteralValue> {
    if is_real(a) || is_real(b) {
        return fold_binary_f64(op, a.as_f64(), b.as_f64(), false);
    }
    if is_big(a) || is_big(b) {
        return fold_binary_big(op, to_big(a), to_big(b));
    }
    fold_binary_f64(op, a.as_f64(), b.as_f64(), true)
}

fn fold_binary_f64(op: BinaryOp, a: f64, b: f64, keep_int: bool) -> Option<LiteralValue> {
    let value = match op {
        BinaryOp::Add => numeric(a + b, keep_int),
        BinaryOp::Sub => numeric(a - b, keep_int),
        BinaryOp::Mul => numeric(a * b, keep_int),
        BinaryOp::Div => numeric(a / b, keep_int),
        BinaryOp::Rem => numeric(a % b, keep_int),
        BinaryOp::BitAnd => LiteralValue::Int(i64::from(to_int32(a) & to_int32(b))),
        BinaryOp::BitOr => LiteralValue::Int(i64::from(to_int32(a) | to_int32(b))),
        BinaryOp::BitXor => LiteralValue::Int(i64::from(to_int32(a) ^ to_int32(b))),
        BinaryOp::Shl => LiteralValue::Int(i64::from(to_int32(a) << (to_uint32(b) & 31))),
        BinaryOp::Shr => LiteralValue::Int(i64::from(to_int32(a) >> (to_uint32(b) & 31))),
        BinaryOp::ShrU => LiteralValue::Int(i64::from(to_uint32(a) >> (to_uint32(b) & 31))),
        BinaryOp::Eq => LiteralValue::Int((a == b) as i64),
        BinaryOp::Ne => LiteralValue::Int((a != b) as i64),
        BinaryOp::Lt => LiteralValue::Int((a < b) as i64),
        BinaryOp::Le => LiteralValue::Int((a <= b) as i64),
        BinaryOp::Gt => LiteralValue::Int((a > b) as i64),
        BinaryOp::Ge => LiteralValue::Int((a >= b) as i64),
    };
    Some(value)
}

fn fold_binary_big(op: BinaryOp, a: BigInt, b: BigInt) -> Option<LiteralValue> {
    const SHIFT_CAP: u64 = 1 << 16;
    let value = match op {
        BinaryOp::Add => LiteralValue::BigInt(a + b),
        BinaryOp::Sub => LiteralValue::BigInt(a - b),
        BinaryOp::Mul => LiteralValue::BigInt(a * b),
        BinaryOp::Div => {
            if b.is_zero() {
                return None;
            }
            LiteralValue::BigInt(a / b)
        }
        BinaryOp::Rem => {
            if b.is_zero() {
                return None;
            }
            LiteralValue::BigInt(a % b)
        }
        BinaryOp::BitAnd => LiteralValue::BigInt(a & b),
        BinaryOp::BitOr => LiteralValue::BigInt(a | b),
        BinaryOp::BitXor => LiteralValue::BigInt(a ^ b),
        BinaryOp::Shl => {
            let shift = b.to_u64().filter(|s| *s < SHIFT_CAP)?;
            LiteralValue::BigInt(a << shift)
        }
        BinaryOp::Shr => {
            let shift = b.to_u64().filter(|s| *s < SHIFT_CAP)?;
            LiteralValue::BigInt(a >> shift)
        }
        // Logical shift has no arbitrary-precision meaning; run it in the
        // 64-bit two's-complement space the value lowers into.
        BinaryOp::ShrU => {
            let shift = b.to_u64()? & 63;
            let bits = wrap_u64(&a) >> shift;
            LiteralValue::BigInt(BigInt::from(bits))
        }
        BinaryOp::Eq => LiteralValue::Int((a == b) as i64),
        BinaryOp::Ne => LiteralValue::Int((a != b) as i64),
        BinaryOp::Lt => LiteralValue::Int((a < b) as i64),
        BinaryOp::Le => LiteralValue::Int((a <= b) as i64),
        BinaryOp::Gt => LiteralValue::Int((a > b) as i64),
        BinaryOp::Ge => LiteralValue::Int((a >= b) as i64),
    };
    Some(value)
}

/// Unsigned 64-bit modular reduction.
pub(crate) fn wrap_u64(value: &BigInt) -> u64 {
    let modulus = BigInt::from(1u128 << 64);
    let reduced = ((value % &modulus) + &modulus) % &modulus;
    reduced.to_u64().expect("reduced below 2^64")
}

fn fold_unary(op: UnaryOp, v: &LiteralValue) -> Option<LiteralValue> {
    let value = match op {
        // The emitter lowers unary plus to a cast; fold only where that cast
        // cannot change the value.
        UnaryOp::Plus => match v {
            LiteralValue::Int(i) => LiteralValue::Int(*i),
            _ => return None,
        },
        UnaryOp::Minus => match v {
            LiteralValue::Int(i) => LiteralValue::Int(i.wrapping_neg()),
            LiteralValue::Real(r) => LiteralValue::Real(-r),
            LiteralValue::BigInt(b) => LiteralValue::BigInt(-b.clone()),
        },
        UnaryOp::Not => LiteralValue::Int((!v.is_truthy()) as i64),
        UnaryOp::Complement => match v {
            LiteralValue::BigInt(b) => LiteralValue::BigInt(-(b.clone() + 1i32)),
            other => LiteralValue::Int(i64::from(!to_int32(other.as_f64()))),
        },
        UnaryOp::AddressOf => return None,
    };
    Some(value)
}

fn fold_builtin(name: &str, args: &[&LiteralValue]) -> Option<LiteralValue> {
    let all_int = args.iter().copied().all(|v| !is_real(v));
    let any_big = args.iter().copied().any(is_big);

    match name {
        "clz" | "ctz" | "popcnt" => {
            if args.len() != 1 || is_real(args[0]) {
                return None;
            }
            let value = if any_big {
                let bits = wrap_u64(&to_big(args[0]));
                match name {
                    "clz" => bits.leading_zeros(),
                    "ctz" => bits.trailing_zeros(),
                    _ => bits.count_ones(),
                }
            } else {
                let bits = to_uint32(args[0].as_f64());
                match name {
                    "clz" => bits.leading_zeros(),
                    "ctz" => bits.trailing_zeros(),
                    _ => bits.count_ones(),
                }
            };
            Some(LiteralValue::Int(i64::from(value)))
        }
        "abs" => {
            if args.len() != 1 {
                return None;
            }
            Some(match args[0] {
                LiteralValue::Int(i) => LiteralValue::Int(i.wrapping_abs()),
                LiteralValue::Real(r) => LiteralValue::Real(r.abs()),
                LiteralValue::BigInt(b) => LiteralValue::BigInt(b.abs()),
            })
        }
        "neg" => {
            if args.len() != 1 {
                return None;
            }
            fold_unary(UnaryOp::Minus, args[0])
        }
        "min" | "max" => {
            if any_big || args.len() < 2 {
                return None;
            }
            let mut acc = args[0].as_f64();
            for arg in &args[1..] {
                let x = arg.as_f64();
                acc = if name == "min" { acc.min(x) } else { acc.max(x) };
            }
            Some(numeric(acc, all_int))
        }
        "floor" | "ceil" | "trunc" | "nearest" | "sqrt" => {
            if any_big || args.len() != 1 {
                return None;
            }
            let x = args[0].as_f64();
            let r = match name {
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                "trunc" => x.trunc(),
                "nearest" => x.round_ties_even(),
                _ => x.sqrt(),
            };
            Some(numeric(r, all_int))
        }
        "copysign" => {
            if any_big || args.len() != 2 {
                return None;
            }
            Some(numeric(args[0].as_f64().copysign(args[1].as_f64()), all_int))
        }
        _ => None,
    }
}

/// Fold a cast of a literal to an intrinsic type. `None` means the cast
/// could trap at run time and the node stays in the tree.
pub fn fold_cast(target: Intrinsic, v: &LiteralValue) -> Option<LiteralValue> {
    if target.is_float() {
        let x = v.as_f64();
        let x = if target == Intrinsic::F32 { x as f32 as f64 } else { x };
        return Some(LiteralValue::Real(x));
    }

    let wide: BigInt = match v {
        LiteralValue::Int(i) => BigInt::from(*i),
        LiteralValue::BigInt(b) => b.clone(),
        LiteralValue::Real(r) => {
            // The machine operation is a float truncation; it traps outside
            // the machine-width range, so such casts are not folded.
            if !r.is_finite() {
                return None;
            }
            let t = r.trunc();
            let machine_bits = if target.bits() == 64 { 64 } else { 32 };
            let in_range = if target.is_signed() {
                let limit = 2f64.powi(machine_bits - 1);
                t >= -limit && t < limit
            } else {
                t >= 0.0 && t < 2f64.powi(machine_bits)
            };
            if !in_range {
                return None;
            }
            BigInt::from(t as i128)
        }
    };

    let bits = target.bits();
    let modulus = BigInt::from(1u8) << bits;
    let mut reduced = ((&wide % &modulus) + &modulus) % &modulus;
    if target.is_signed() && reduced >= (BigInt::from(1u8) << (bits - 1)) {
        reduced -= &modulus;
    }

    Some(match v {
        LiteralValue::BigInt(_) if bits == 64 => LiteralValue::BigInt(reduced),
        _ => match reduced.to_i64() {
            Some(i) => LiteralValue::Int(i),
            None => LiteralValue::BigInt(reduced),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Loc;
    use crate::compile::DeclTable;
    use crate::types::TypeTable;

    fn ctx_tables() -> (DeclTable, TypeTable) {
        (DeclTable::new(), TypeTable::new())
    }

    fn bin(op: BinaryOp, left: Expression, right: Expression) -> Expression {
        Expression::BinaryExpression {
            op,
            left: Box::new(left),
            right: Box::new(right),
            loc: Loc::default(),
        }
    }

    fn ident(name: &str) -> Expression {
        Expression::Identifier {
            name: name.to_string(),
            loc: Loc::default(),
        }
    }

    fn run(expr: &mut Expression) {
        let (decls, types) = ctx_tables();
        // Tables outlive the context; a fresh pair per call keeps tests terse.
        let ctx = SimplifyContext {
            decls: &decls,
            types: &types,
        };
        simplify(expr, &ctx);
    }

    #[test]
    fn folds_arithmetic_to_literal() {
        let mut e = bin(
            BinaryOp::Add,
            Expression::int(3),
            bin(BinaryOp::Mul, Expression::int(4), Expression::int(2)),
        );
        run(&mut e);
        assert_eq!(e, Expression::int(11));
    }

    #[test]
    fn removes_additive_identity() {
        let mut e = bin(BinaryOp::Add, ident("x"), Expression::int(0));
        run(&mut e);
        assert_eq!(e, ident("x"));
    }

    #[test]
    fn and_with_zero_collapses() {
        let mut e = bin(BinaryOp::BitAnd, ident("x"), Expression::int(0));
        run(&mut e);
        assert_eq!(e, Expression::int(0));
    }

    #[test]
    fn literals_move_right() {
        let mut e = bin(BinaryOp::Mul, Expression::int(3), ident("x"));
        run(&mut e);
        match e {
            Expression::BinaryExpression { left, right, .. } => {
                assert_eq!(*left, ident("x"));
                assert_eq!(*right, Expression::int(3));
            }
            other => panic!("expected binary node, got {other:?}"),
        }
    }

    #[test]
    fn additive_chain_refolds() {
        // (y - 5) + 8 → y + 3
        let mut e = bin(
            BinaryOp::Add,
            bin(BinaryOp::Sub, ident("y"), Expression::int(5)),
            Expression::int(8),
        );
        run(&mut e);
        assert_eq!(e, bin(BinaryOp::Add, ident("y"), Expression::int(3)));
    }

    #[test]
    fn conditional_picks_alternate_on_zero() {
        let mut e = Expression::ConditionalExpression {
            condition: Box::new(Expression::int(0)),
            consequent: Box::new(Expression::int(1)),
            alternate: Box::new(Expression::int(2)),
            loc: Loc::default(),
        };
        run(&mut e);
        assert_eq!(e, Expression::int(2));
    }

    #[test]
    fn bigint_folding_is_exact() {
        let big: BigInt = "18446744073709551615".parse().unwrap();
        let mut e = bin(
            BinaryOp::Sub,
            Expression::literal(LiteralValue::BigInt(big)),
            Expression::literal(LiteralValue::BigInt(BigInt::from(5))),
        );
        run(&mut e);
        let expected: BigInt = "18446744073709551610".parse().unwrap();
        assert_eq!(e, Expression::literal(LiteralValue::BigInt(expected)));
    }

    #[test]
    fn unsigned_cast_reduces_modularly() {
        let folded = fold_cast(Intrinsic::U8, &LiteralValue::Int(300)).unwrap();
        assert_eq!(folded, LiteralValue::Int(44));
        let folded = fold_cast(Intrinsic::I8, &LiteralValue::Int(200)).unwrap();
        assert_eq!(folded, LiteralValue::Int(-56));
    }

    #[test]
    fn trapping_cast_is_left_alone() {
        assert_eq!(fold_cast(Intrinsic::I32, &LiteralValue::Real(1e30)), None);
        assert_eq!(
            fold_cast(Intrinsic::U32, &LiteralValue::Real(-1.0)),
            None
        );
        let mut e = Expression::TypeCast {
            target: "i32".to_string(),
            operand: Box::new(Expression::literal(LiteralValue::Real(1e30))),
            loc: Loc::default(),
        };
        run(&mut e);
        assert!(matches!(e, Expression::TypeCast { .. }));
    }

    #[test]
    fn signed_u64_cast_of_bigint() {
        let minus_one = fold_cast(
            Intrinsic::U64,
            &LiteralValue::BigInt(BigInt::from(-1)),
        )
        .unwrap();
        let expected: BigInt = "18446744073709551615".parse().unwrap();
        assert_eq!(minus_one, LiteralValue::BigInt(expected));
    }

    #[test]
    fn simplify_is_idempotent() {
        let mut e = bin(
            BinaryOp::Add,
            bin(BinaryOp::Sub, ident("y"), Expression::int(5)),
            Expression::int(8),
        );
        run(&mut e);
        let once = e.clone();
        run(&mut e);
        assert_eq!(e, once);
    }

    #[test]
    fn folds_builtins() {
        assert_eq!(
            fold_builtin("max", &[&LiteralValue::Int(3), &LiteralValue::Int(9)]),
            Some(LiteralValue::Int(9))
        );
        assert_eq!(
            fold_builtin("clz", &[&LiteralValue::Int(1)]),
            Some(LiteralValue::Int(31))
        );
        assert_eq!(
            fold_builtin("nearest", &[&LiteralValue::Real(2.5)]),
            Some(LiteralValue::Real(2.0))
        );
    }
}
