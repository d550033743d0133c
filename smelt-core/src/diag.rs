//! Diagnostics and the trace stream.
//!
//! Definition and type errors are recoverable: they are appended to the sink
//! once at the offending node, and compilation of the containing function
//! continues best-effort. Internal invariant violations do not go through the
//! sink; they abort the function as `anyhow` errors.

use std::fmt;

use thiserror::Error;

use crate::ast::Loc;

/// Stable diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCode {
    /// W140: a local or parameter name is declared twice.
    #[error("duplicate local or parameter name")]
    DuplicateLocal,
    /// W141: a value cannot be stored into the target's storage type.
    #[error("invalid storage cast")]
    InvalidStorageCast,
    /// W142: an identifier resolves to nothing.
    #[error("unresolved identifier")]
    UnresolvedIdentifier,
    /// W143: an intrinsic type was required.
    #[error("intrinsic type required")]
    IntrinsicRequired,
    /// W144: an operand is not of intrinsic type.
    #[error("non-intrinsic operand")]
    NonIntrinsicOperand,
    /// W145: an integer-only operator was applied to a float (or vice versa).
    #[error("operator not defined for this operand type")]
    OperatorTypeMismatch,
    /// W146: address-of on an expression with no address.
    #[error("expression is not addressable")]
    NotAddressable,
    /// W147: member access on a non-struct, or an unknown member.
    #[error("invalid member access")]
    InvalidMemberAccess,
    /// W149: item access on something that is not an array.
    #[error("item access requires an array")]
    ItemAccessOnNonArray,
    /// W150: a float-only built-in received an integer argument.
    #[error("built-in requires float arguments")]
    FloatBuiltInOnInteger,
    /// W151: an integer-only built-in received a float argument.
    #[error("built-in requires integer arguments")]
    IntegerBuiltInOnFloat,
    /// W152: dereference of a non-pointer.
    #[error("dereference requires a pointer")]
    DereferenceOfNonPointer,
}

impl ErrorCode {
    /// The wire code, e.g. `W140`.
    pub fn code(self) -> &'static str {
        match self {
            ErrorCode::DuplicateLocal => "W140",
            ErrorCode::InvalidStorageCast => "W141",
            ErrorCode::UnresolvedIdentifier => "W142",
            ErrorCode::IntrinsicRequired => "W143",
            ErrorCode::NonIntrinsicOperand => "W144",
            ErrorCode::OperatorTypeMismatch => "W145",
            ErrorCode::NotAddressable => "W146",
            ErrorCode::InvalidMemberAccess => "W147",
            ErrorCode::ItemAccessOnNonArray => "W149",
            ErrorCode::FloatBuiltInOnInteger => "W150",
            ErrorCode::IntegerBuiltInOnFloat => "W151",
            ErrorCode::DereferenceOfNonPointer => "W152",
        }
    }
}

/// One reported problem.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Code of the problem class.
    pub code: ErrorCode,
    /// Offending source position.
    pub loc: Loc,
    /// Human detail, naming the offending construct.
    pub detail: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}: {} ({})",
            self.code.code(),
            self.loc,
            self.code,
            self.detail
        )
    }
}

/// Append-only diagnostic sink.
#[derive(Debug, Default)]
pub struct Diagnostics {
    reported: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Empty sink.
    pub fn new() -> Self {
        Diagnostics::default()
    }

    /// Append one diagnostic.
    pub fn report(&mut self, code: ErrorCode, loc: Loc, detail: impl Into<String>) {
        let diagnostic = Diagnostic {
            code,
            loc,
            detail: detail.into(),
        };
        tracing::debug!(target: "smelt::diag", "{diagnostic}");
        self.reported.push(diagnostic);
    }

    /// True when nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.reported.is_empty()
    }

    /// Number of reported diagnostics.
    pub fn len(&self) -> usize {
        self.reported.len()
    }

    /// All diagnostics in report order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.reported.iter()
    }
}

/// Categories of the diagnostic trace stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceCategory {
    /// Expression trees before and after simplification.
    PExpr,
    /// Local declarations as they are registered.
    Local,
    /// Final instruction stream after optimization.
    Inject,
}

impl TraceCategory {
    /// Wire name of the category.
    pub fn name(self) -> &'static str {
        match self {
            TraceCategory::PExpr => "pExpr",
            TraceCategory::Local => "local",
            TraceCategory::Inject => "inject",
        }
    }
}

/// Receiver of `(category, depth, payload)` trace events.
pub trait TraceSink {
    /// Handle one event.
    fn event(&mut self, category: TraceCategory, depth: u32, payload: &str);
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn event(&mut self, _category: TraceCategory, _depth: u32, _payload: &str) {}
}

/// Sink that forwards events to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct LogTrace;

impl TraceSink for LogTrace {
    fn event(&mut self, category: TraceCategory, depth: u32, payload: &str) {
        tracing::trace!(
            target: "smelt::trace",
            category = category.name(),
            depth,
            "{payload}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::DuplicateLocal.code(), "W140");
        assert_eq!(ErrorCode::DereferenceOfNonPointer.code(), "W152");
    }

    #[test]
    fn sink_appends_in_order() {
        let mut diags = Diagnostics::new();
        diags.report(ErrorCode::UnresolvedIdentifier, Loc::default(), "x");
        diags.report(ErrorCode::DuplicateLocal, Loc::default(), "y");
        let codes: Vec<_> = diags.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![ErrorCode::UnresolvedIdentifier, ErrorCode::DuplicateLocal]
        );
    }
}
