//! Property tests for the expression simplifier: idempotence, complete
//! folding of closed trees, the literal-on-the-right invariant and
//! additive-chain collapse.

use proptest::prelude::*;

use smelt_core::ast::{BinaryOp, Expression, Loc};
use smelt_core::compile::DeclTable;
use smelt_core::simplify::{simplify, SimplifyContext};
use smelt_core::types::TypeTable;

fn run_simplify(expr: &mut Expression) {
    let decls = DeclTable::new();
    let types = TypeTable::new();
    simplify(
        expr,
        &SimplifyContext {
            decls: &decls,
            types: &types,
        },
    );
}

fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    Expression::BinaryExpression {
        op,
        left: Box::new(left),
        right: Box::new(right),
        loc: Loc::default(),
    }
}

fn identifier(name: &str) -> Expression {
    Expression::Identifier {
        name: name.to_string(),
        loc: Loc::default(),
    }
}

fn arb_op() -> impl Strategy<Value = BinaryOp> {
    prop_oneof![
        Just(BinaryOp::Add),
        Just(BinaryOp::Sub),
        Just(BinaryOp::Mul),
        Just(BinaryOp::BitAnd),
        Just(BinaryOp::BitOr),
        Just(BinaryOp::BitXor),
        Just(BinaryOp::Eq),
        Just(BinaryOp::Lt),
    ]
}

fn arb_leaf(with_identifiers: bool) -> BoxedStrategy<Expression> {
    if with_identifiers {
        prop_oneof![
            (-100i64..100).prop_map(Expression::int),
            prop_oneof![Just("x"), Just("y")].prop_map(identifier),
        ]
        .boxed()
    } else {
        (-100i64..100).prop_map(Expression::int).boxed()
    }
}

fn arb_expr(with_identifiers: bool) -> BoxedStrategy<Expression> {
    arb_leaf(with_identifiers)
        .prop_recursive(4, 32, 2, |inner| {
            (arb_op(), inner.clone(), inner)
                .prop_map(|(op, left, right)| binary(op, left, right))
        })
        .boxed()
}

/// No commutative node may keep a literal on the left while the right side
/// is not a literal.
fn literals_are_right(expr: &Expression) -> bool {
    match expr {
        Expression::BinaryExpression {
            op, left, right, ..
        } => {
            let ordered = !(op.is_commutative()
                && left.as_literal().is_some()
                && right.as_literal().is_none());
            ordered && literals_are_right(left) && literals_are_right(right)
        }
        Expression::UnaryExpression { operand, .. } => literals_are_right(operand),
        _ => true,
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    /// Simplification is idempotent: a second run changes nothing.
    #[test]
    fn simplify_is_idempotent(mut expr in arb_expr(true)) {
        run_simplify(&mut expr);
        let once = expr.clone();
        run_simplify(&mut expr);
        prop_assert_eq!(expr, once);
    }

    /// A tree with no free identifiers folds to a single literal.
    #[test]
    fn closed_trees_fold_completely(mut expr in arb_expr(false)) {
        run_simplify(&mut expr);
        prop_assert!(
            matches!(expr, Expression::Literal { .. }),
            "did not fold: {:?}",
            expr
        );
    }

    /// After simplification, commutative operators keep literals on the
    /// right.
    #[test]
    fn commutative_literals_end_up_right(mut expr in arb_expr(true)) {
        run_simplify(&mut expr);
        prop_assert!(literals_are_right(&expr), "misordered: {:?}", expr);
    }

    /// Chains of literal additions and subtractions collapse to depth one.
    #[test]
    fn additive_chains_collapse(steps in prop::collection::vec((any::<bool>(), -50i64..50), 1..8)) {
        let mut expr = identifier("x");
        for (subtract, amount) in steps {
            let op = if subtract { BinaryOp::Sub } else { BinaryOp::Add };
            expr = binary(op, expr, Expression::int(amount));
        }
        run_simplify(&mut expr);
        let collapsed = match &expr {
            Expression::Identifier { .. } => true,
            Expression::BinaryExpression { left, right, .. } => {
                matches!(left.as_ref(), Expression::Identifier { .. })
                    && right.as_literal().is_some()
            }
            _ => false,
        };
        prop_assert!(collapsed, "chain did not collapse: {:?}", expr);
    }
}
