//! Source tree delivered by the parser.
//!
//! The parser hands over string-tagged nodes; the `serde` tagging here mirrors
//! that encoding exactly, so a JSON dump of the tree round-trips. Nodes carry
//! source locations for diagnostics. The tree is mutated in place by the
//! simplifier and then consumed by the emitter.

use std::fmt;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// Line/column pair attached to every node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loc {
    /// 1-based source line; 0 when synthesized.
    #[serde(default)]
    pub line: u32,
    /// 1-based source column; 0 when synthesized.
    #[serde(default)]
    pub column: u32,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A literal value with its source flavor.
///
/// `Int` is a bounded integer, `Real` a floating value, `BigInt` an
/// arbitrary-precision integer used when a decimal/binary/hex literal exceeds
/// the safe integer range of the host double.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value")]
pub enum LiteralValue {
    /// Bounded integer literal.
    Int(i64),
    /// Floating literal.
    Real(f64),
    /// Arbitrary-precision integer literal, exchanged as a decimal string.
    BigInt(#[serde(with = "bigint_decimal")] BigInt),
}

mod bigint_decimal {
    use num_bigint::BigInt;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

impl LiteralValue {
    /// Numeric equality against a small integer, across all three flavors.
    pub fn is(&self, n: i64) -> bool {
        match self {
            LiteralValue::Int(v) => *v == n,
            LiteralValue::Real(v) => *v == n as f64,
            LiteralValue::BigInt(v) => *v == BigInt::from(n),
        }
    }

    /// Truthiness, the way a conditional fold sees it. NaN is falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            LiteralValue::Real(v) => *v != 0.0 && !v.is_nan(),
            other => !other.is(0),
        }
    }

    /// Approximate value as a host double.
    pub fn as_f64(&self) -> f64 {
        use num_traits::ToPrimitive;
        match self {
            LiteralValue::Int(v) => *v as f64,
            LiteralValue::Real(v) => *v,
            LiteralValue::BigInt(v) => v.to_f64().unwrap_or(f64::INFINITY),
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Int(v) => write!(f, "{v}"),
            LiteralValue::Real(v) => write!(f, "{v}"),
            LiteralValue::BigInt(v) => write!(f, "{v}"),
        }
    }
}

/// Binary operators of the source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    #[serde(rename = "+")]
    Add,
    /// `-`
    #[serde(rename = "-")]
    Sub,
    /// `*`
    #[serde(rename = "*")]
    Mul,
    /// `/`
    #[serde(rename = "/")]
    Div,
    /// `%`
    #[serde(rename = "%")]
    Rem,
    /// `&`
    #[serde(rename = "&")]
    BitAnd,
    /// `|`
    #[serde(rename = "|")]
    BitOr,
    /// `^`
    #[serde(rename = "^")]
    BitXor,
    /// `<<`
    #[serde(rename = "<<")]
    Shl,
    /// `>>` (arithmetic when signed)
    #[serde(rename = ">>")]
    Shr,
    /// `>>>` (always logical)
    #[serde(rename = ">>>")]
    ShrU,
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
}

impl BinaryOp {
    /// Operators whose operands may be swapped freely.
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::BitAnd
                | BinaryOp::Mul
                | BinaryOp::Add
                | BinaryOp::BitXor
                | BinaryOp::BitOr
        )
    }

    /// Comparison operators; they yield `i32`.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// `+` or `-`.
    pub fn is_additive(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub)
    }

    /// Operators that only make sense on integer representations.
    pub fn is_integer_only(self) -> bool {
        matches!(
            self,
            BinaryOp::Rem
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
                | BinaryOp::Shl
                | BinaryOp::Shr
                | BinaryOp::ShrU
        )
    }
}

/// Unary operators of the source language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `+`
    #[serde(rename = "+")]
    Plus,
    /// `-`
    #[serde(rename = "-")]
    Minus,
    /// `!`
    #[serde(rename = "!")]
    Not,
    /// `~`
    #[serde(rename = "~")]
    Complement,
    /// `&` (address-of)
    #[serde(rename = "&")]
    AddressOf,
}

/// Unresolved type syntax as written in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TypeExpr {
    /// An intrinsic, struct or alias name.
    Named {
        /// Type name.
        name: String,
    },
    /// Pointer to a type.
    Pointer {
        /// Pointee type.
        target: Box<TypeExpr>,
    },
    /// Array with a constant-evaluable element count.
    Array {
        /// Element type.
        item: Box<TypeExpr>,
        /// Element count expression; must fold to an integer literal.
        count: Box<Expression>,
    },
    /// Inline struct body, used by type alias declarations.
    Struct {
        /// Field list in declaration order.
        fields: Vec<FieldExpr>,
    },
}

/// One field of an inline struct type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldExpr {
    /// Field name.
    pub name: String,
    /// Field type.
    pub spec: TypeExpr,
}

/// Expression nodes. Tags match the parser's string-tagged encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expression {
    /// A literal constant.
    Literal {
        /// Value and source flavor.
        #[serde(flatten)]
        value: LiteralValue,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// A name: local, global, memory variable or named constant.
    Identifier {
        /// Identifier text.
        name: String,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// Unary operation.
    UnaryExpression {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// Binary operation.
    BinaryExpression {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// Ternary `cond ? consequent : alternate`.
    ConditionalExpression {
        /// Selector.
        condition: Box<Expression>,
        /// Value when the selector is non-zero.
        consequent: Box<Expression>,
        /// Value when the selector is zero.
        alternate: Box<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// Cast to a named intrinsic type, `T(x)`.
    TypeCast {
        /// Target intrinsic name.
        target: String,
        /// Operand.
        operand: Box<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// `object.member` on a struct.
    MemberAccess {
        /// Struct-typed lvalue.
        object: Box<Expression>,
        /// Field name.
        member: String,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// `array[index]`.
    ItemAccess {
        /// Array-typed lvalue.
        array: Box<Expression>,
        /// Index expression; cast to `i32`.
        index: Box<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// `*pointer`.
    DereferenceExpression {
        /// Pointer-typed operand.
        operand: Box<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// Invocation of a compiler built-in such as `abs` or `min`.
    BuiltInFunctionInvocation {
        /// Built-in name.
        name: String,
        /// Argument list.
        args: Vec<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// Direct call of a declared function.
    FunctionInvocation {
        /// Callee name.
        callee: String,
        /// Argument list.
        args: Vec<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// `sizeof(T)`; folded to an integer by the simplifier.
    SizeOfExpression {
        /// Queried type.
        spec: TypeExpr,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
}

impl Expression {
    /// Build a literal node with no position.
    pub fn literal(value: LiteralValue) -> Expression {
        Expression::Literal {
            value,
            loc: Loc::default(),
        }
    }

    /// Build an integer literal node.
    pub fn int(value: i64) -> Expression {
        Expression::literal(LiteralValue::Int(value))
    }

    /// The literal value, if this node is a literal.
    pub fn as_literal(&self) -> Option<&LiteralValue> {
        match self {
            Expression::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Source position of the node.
    pub fn loc(&self) -> Loc {
        match self {
            Expression::Literal { loc, .. }
            | Expression::Identifier { loc, .. }
            | Expression::UnaryExpression { loc, .. }
            | Expression::BinaryExpression { loc, .. }
            | Expression::ConditionalExpression { loc, .. }
            | Expression::TypeCast { loc, .. }
            | Expression::MemberAccess { loc, .. }
            | Expression::ItemAccess { loc, .. }
            | Expression::DereferenceExpression { loc, .. }
            | Expression::BuiltInFunctionInvocation { loc, .. }
            | Expression::FunctionInvocation { loc, .. }
            | Expression::SizeOfExpression { loc, .. } => *loc,
        }
    }
}

/// Statement nodes of a function body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Statement {
    /// Declaration of a function-local variable, with optional initializer.
    LocalVariable {
        /// Source-visible name.
        name: String,
        /// Declared storage type.
        spec: TypeExpr,
        /// Optional initializer expression.
        #[serde(default)]
        init: Option<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// Assignment to a local, global or memory lvalue.
    Assignment {
        /// Target lvalue.
        target: Expression,
        /// Assigned value.
        value: Expression,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// `break` out of the innermost loop.
    Break {
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// `continue` the innermost loop.
    Continue {
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// `do { … } while (…)`.
    Do {
        /// Loop body.
        body: Vec<Statement>,
        /// Repeat condition, checked after the body.
        condition: Expression,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// `if (…) { … } else { … }`.
    If {
        /// Branch selector.
        condition: Expression,
        /// Then branch.
        then_branch: Vec<Statement>,
        /// Else branch; may be empty.
        #[serde(default)]
        else_branch: Vec<Statement>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// A call in statement position; an unused result is dropped.
    LocalFunctionInvocation {
        /// Callee name.
        callee: String,
        /// Argument list.
        args: Vec<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// `return`, with a value when the function declares a result.
    Return {
        /// Returned value.
        #[serde(default)]
        value: Option<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// `while (…) { … }`.
    While {
        /// Loop condition, checked before the body.
        condition: Expression,
        /// Loop body.
        body: Vec<Statement>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
}

/// One function parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name; shares the local namespace.
    pub name: String,
    /// Declared type; pointers lower to `i32`.
    pub spec: TypeExpr,
}

/// A function declaration with its body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    /// Function name.
    pub name: String,
    /// Parameters in order.
    #[serde(default)]
    pub params: Vec<Param>,
    /// Optional result intrinsic name.
    #[serde(default)]
    pub result: Option<String>,
    /// Body statements.
    #[serde(default)]
    pub body: Vec<Statement>,
    /// Whether the function is exported from the module.
    #[serde(default)]
    pub export: bool,
    /// Source position.
    #[serde(default)]
    pub loc: Loc,
}

/// Module-level declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Declaration {
    /// A named compile-time constant.
    ConstDeclaration {
        /// Constant name.
        name: String,
        /// Value; must fold to a literal.
        value: Expression,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// A mutable module global with an intrinsic type.
    GlobalDeclaration {
        /// Global name.
        name: String,
        /// Intrinsic type name.
        spec: String,
        /// Optional constant initializer; zero when absent.
        #[serde(default)]
        init: Option<Expression>,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// A variable living in linear memory at a fixed address.
    VariableDeclaration {
        /// Variable name.
        name: String,
        /// Byte address in linear memory.
        address: u32,
        /// Storage type.
        spec: TypeExpr,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// A named type alias; inline struct bodies declare struct types.
    TypeAlias {
        /// Alias name.
        name: String,
        /// Aliased type.
        spec: TypeExpr,
        /// Source position.
        #[serde(default)]
        loc: Loc,
    },
    /// A function.
    FunctionDeclaration(FunctionDecl),
}

/// A whole parsed module: an ordered declaration list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleAst {
    /// Declarations in source order.
    pub declarations: Vec<Declaration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expression_tags_round_trip() {
        let json = r#"{
            "type": "BinaryExpression",
            "op": "+",
            "left": {"type": "Identifier", "name": "x"},
            "right": {"type": "Literal", "source": "Int", "value": 3}
        }"#;
        let expr: Expression = serde_json::from_str(json).unwrap();
        match &expr {
            Expression::BinaryExpression { op, right, .. } => {
                assert_eq!(*op, BinaryOp::Add);
                assert_eq!(right.as_literal(), Some(&LiteralValue::Int(3)));
            }
            other => panic!("unexpected node {other:?}"),
        }
        let back = serde_json::to_string(&expr).unwrap();
        let again: Expression = serde_json::from_str(&back).unwrap();
        assert_eq!(expr, again);
    }

    #[test]
    fn bigint_literals_are_decimal_strings() {
        let json = r#"{"type": "Literal", "source": "BigInt", "value": "18446744073709551615"}"#;
        let expr: Expression = serde_json::from_str(json).unwrap();
        let value = expr.as_literal().unwrap();
        assert!(matches!(value, LiteralValue::BigInt(_)));
        assert!(value.is_truthy());
    }
}
