//! Soft-error recording: marks, typed holes, and the diagnostic side table.
//!
//! A soft error never aborts inference (§7, tier 2): the offending node gets
//! an `Unknown` type plus a `Mark` describing what went wrong, and inference
//! continues using that `Unknown` as if it were any other type. Marks are
//! collected in a flat side table keyed by `NodeId` rather than attached to
//! AST nodes (§9's design note), matching the teacher's `TypeError` — a
//! single data-carrying enum with a hand-written `Display`, no `thiserror`.

use std::fmt;

use serde::Serialize;
use weave_common::NodeId;

use crate::ty::Ty;

/// A soft type error recorded against a node. Each variant names exactly
/// one of the kinds §4.9/§7 enumerate.
#[derive(Clone, Debug, Serialize)]
pub enum MarkKind {
    /// An identifier has no binding in scope or the prelude.
    FreeVariable { name: String },
    /// A call target resolved to a non-function type.
    NotFunction { ty: Ty },
    /// Two types that should unify do not.
    Inconsistent { expected: Ty, found: Ty },
    /// A type variable would have to occur within its own binding.
    OccursCheck { ty: Ty },
    /// A match/case is missing coverage for some constructors of the
    /// scrutinee's type (or for `Bool`'s two literals).
    NonExhaustive {
        scrutinee_type: String,
        missing: Vec<String>,
    },
    /// An expression form inference does not (yet) support.
    UnsupportedExpr { description: String },

    // Pattern-level.
    /// The same variable name is bound twice in one pattern.
    DuplicateVariable { name: String },
    /// A constructor pattern names a constructor that does not belong to
    /// the scrutinee's nominal type.
    WrongConstructor { name: String, expected_type: String },
    /// A literal pattern's type disagrees with the scrutinee's type.
    LiteralUnifyFailed { expected: Ty, found: Ty },
    /// A tuple pattern's arity disagrees with the scrutinee's tuple arity.
    TupleArity { expected: usize, found: usize },
    /// A pattern form inference does not (yet) support.
    UnsupportedPatternKind { description: String },

    // Match-level.
    /// An `AllErrors` pattern appeared outside of a carrier-typed scrutinee.
    AllErrorsOutsideResult,
    /// A match over an effect row leaves some labelled cases undischarged.
    ErrorRowPartialCoverage { missing: Vec<String> },
    /// Two match arms produce incompatible result types.
    TypeMismatch { expected: Ty, found: Ty },

    // Record-level.
    /// A record literal repeats a field name.
    DuplicateRecordField { name: String },
    /// A record literal omits a field its nominal type requires.
    MissingField { name: String, record_type: String },
    /// A record literal's field set matches more than one nominal record
    /// type; none can be chosen without ambiguity.
    AmbiguousRecord { candidates: Vec<String> },
    /// A projection target is not a record type.
    NotRecord { ty: Ty },
    /// A pattern-let destructures a value without a matching binder.
    BindingRequired,
}

impl fmt::Display for MarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkKind::FreeVariable { name } => write!(f, "unbound identifier `{}`", name),
            MarkKind::NotFunction { ty } => write!(f, "expected a function, found `{}`", ty),
            MarkKind::Inconsistent { expected, found } => {
                write!(f, "expected `{}`, found `{}`", expected, found)
            }
            MarkKind::OccursCheck { ty } => write!(f, "infinite type involving `{}`", ty),
            MarkKind::NonExhaustive {
                scrutinee_type,
                missing,
            } => write!(
                f,
                "non-exhaustive match over `{}`, missing: {}",
                scrutinee_type,
                missing.join(", ")
            ),
            MarkKind::UnsupportedExpr { description } => {
                write!(f, "unsupported expression: {}", description)
            }
            MarkKind::DuplicateVariable { name } => {
                write!(f, "variable `{}` bound more than once in pattern", name)
            }
            MarkKind::WrongConstructor {
                name,
                expected_type,
            } => write!(
                f,
                "constructor `{}` does not belong to type `{}`",
                name, expected_type
            ),
            MarkKind::LiteralUnifyFailed { expected, found } => write!(
                f,
                "literal pattern of type `{}` cannot match `{}`",
                found, expected
            ),
            MarkKind::TupleArity { expected, found } => write!(
                f,
                "tuple pattern has {} elements, expected {}",
                found, expected
            ),
            MarkKind::UnsupportedPatternKind { description } => {
                write!(f, "unsupported pattern: {}", description)
            }
            MarkKind::AllErrorsOutsideResult => {
                write!(f, "`_errors` pattern used outside a carrier-typed match")
            }
            MarkKind::ErrorRowPartialCoverage { missing } => write!(
                f,
                "match does not discharge error case(s): {}",
                missing.join(", ")
            ),
            MarkKind::TypeMismatch { expected, found } => {
                write!(f, "match arms disagree: `{}` vs `{}`", expected, found)
            }
            MarkKind::DuplicateRecordField { name } => {
                write!(f, "field `{}` given more than once", name)
            }
            MarkKind::MissingField { name, record_type } => {
                write!(f, "missing field `{}` of record `{}`", name, record_type)
            }
            MarkKind::AmbiguousRecord { candidates } => write!(
                f,
                "record literal is ambiguous between: {}",
                candidates.join(", ")
            ),
            MarkKind::NotRecord { ty } => write!(f, "`{}` is not a record type", ty),
            MarkKind::BindingRequired => {
                write!(f, "destructuring binding did not bind any variable")
            }
        }
    }
}

/// A mark is a `MarkKind` anchored to the node that raised it.
#[derive(Clone, Debug, Serialize)]
pub struct Mark {
    pub node: NodeId,
    pub kind: MarkKind,
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, self.kind)
    }
}

/// A typed hole: a node whose type could not be determined, recorded with
/// the `Unknown` provenance that produced it so callers can distinguish an
/// explicit `_` hole from a type that merely failed to resolve.
#[derive(Clone, Debug, Serialize)]
pub struct Hole {
    pub node: NodeId,
    pub ty: Ty,
}

/// The recorder every inference pass writes into. Marks are a side table,
/// never attached to the tree itself (§9).
#[derive(Default)]
pub struct MarkRecorder {
    pub marks: Vec<Mark>,
    pub pattern_marks: Vec<Mark>,
    pub holes: Vec<Hole>,
}

impl MarkRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node: NodeId, kind: MarkKind) {
        self.marks.push(Mark { node, kind });
    }

    pub fn record_pattern(&mut self, node: NodeId, kind: MarkKind) {
        self.pattern_marks.push(Mark { node, kind });
    }

    pub fn record_hole(&mut self, node: NodeId, ty: Ty) {
        self.holes.push(Hole { node, ty });
    }
}
