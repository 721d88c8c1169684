//! Shared identity and provenance types for the Weave type inference engine.
//!
//! Deliberately tiny: the core consumes an already-canonicalized program
//! (see `weave-ast`), so there is no lexer/parser vocabulary to host here,
//! only the handful of types every other crate in the family needs —
//! node identity and an optional source span for debugging.

use serde::Serialize;

/// Identifies a node (expression, pattern, or declaration) in the input
/// tree. Ids are assigned by whatever produced the tree (out of scope
/// here) and are never interpreted by the core beyond equality/hashing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn new(id: u32) -> Self {
        NodeId(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A byte-offset span into the optional debug source text.
///
/// Never interpreted for type-checking decisions; it exists only so marks
/// and diagnostics can carry a human-locatable hint when `InferOptions`
/// was given source text. Absence of source text does not affect
/// inference in any way.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start must not exceed end");
        Span { start, end }
    }
}
