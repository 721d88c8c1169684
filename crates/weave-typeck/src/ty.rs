//! Type representation for the Weave type system.
//!
//! Defines the core `Ty` enum, type variables (`TyVar`), effect rows, and
//! polymorphic type schemes (`Scheme`). These form the foundation of the
//! Hindley-Milner inference implemented in `unify.rs`, `env.rs`, and
//! `expr.rs`.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;

/// A type variable, identified by a `u32` index into the unification table.
///
/// Type variables are created during inference and unified with concrete
/// types or other variables. The `ena` crate handles the union-find
/// mechanics; `TyVar` itself is just the key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TyVar(pub u32);

/// Where an `Unknown` type came from, carried purely for mark/diagnostic
/// rendering — never interpreted during unification beyond its presence.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Provenance {
    Hole,
    UnboundIdentifier(String),
    NotAFunction,
    TypeMismatch,
    OccursCheck,
    UnsupportedExpr,
    Other(String),
}

/// A Weave type.
///
/// - `Var`: an inference variable, resolved by unification.
/// - `Unit`/`Bool`/`Int`/`String`: the built-in primitive types.
/// - `Func`: a single-argument function type (curried for multi-arg calls).
/// - `Tuple`: a fixed-arity product type.
/// - `Constructor`: a nominal ADT or alias applied to type arguments.
/// - `Record`: a nominal record's field types, insertion-ordered.
/// - `EffectRow`: a carrier's error/effect state — a map of labelled cases
///   to optional payload types plus an optional open tail variable.
/// - `Unknown`: a soft-error placeholder that lets inference continue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Ty {
    Var(TyVar),
    Unit,
    Bool,
    Int,
    String,
    Func(Box<Ty>, Box<Ty>),
    Tuple(Vec<Ty>),
    Constructor(String, Vec<Ty>),
    Record(Vec<(String, Ty)>),
    EffectRow {
        cases: FxHashMap<String, Option<Box<Ty>>>,
        tail: Option<TyVar>,
    },
    Unknown(Provenance),
}

impl Ty {
    pub fn func(from: Ty, to: Ty) -> Ty {
        Ty::Func(Box::new(from), Box::new(to))
    }

    /// Build a curried function type from a parameter list and return type,
    /// matching the teacher's multi-param convenience constructor.
    pub fn curried(params: Vec<Ty>, ret: Ty) -> Ty {
        params
            .into_iter()
            .rev()
            .fold(ret, |acc, param| Ty::func(param, acc))
    }

    pub fn constructor(name: impl Into<String>, args: Vec<Ty>) -> Ty {
        Ty::Constructor(name.into(), args)
    }

    /// An effect row with no open cases and no tail — the fully discharged
    /// state a carrier collapses to when every branch is a value.
    pub fn closed_row() -> Ty {
        Ty::EffectRow {
            cases: FxHashMap::default(),
            tail: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Ty::Unknown(_))
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Var(v) => write!(f, "?{}", v.0),
            Ty::Unit => write!(f, "Unit"),
            Ty::Bool => write!(f, "Bool"),
            Ty::Int => write!(f, "Int"),
            Ty::String => write!(f, "String"),
            Ty::Func(from, to) => write!(f, "({} -> {})", from, to),
            Ty::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Ty::Constructor(name, args) => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Ty::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "}}")
            }
            Ty::EffectRow { cases, tail } => {
                write!(f, "[")?;
                let mut labels: Vec<&String> = cases.keys().collect();
                labels.sort();
                for (i, label) in labels.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    match &cases[*label] {
                        Some(payload) => write!(f, "{}({})", label, payload)?,
                        None => write!(f, "{}", label)?,
                    }
                }
                if let Some(t) = tail {
                    if !cases.is_empty() {
                        write!(f, " | ")?;
                    }
                    write!(f, "?{}", t.0)?;
                }
                write!(f, "]")
            }
            Ty::Unknown(_) => write!(f, "Unknown"),
        }
    }
}

/// A polymorphic type scheme: a type with universally quantified variables.
///
/// For example, `let id = x => x` has scheme `forall a. a -> a`, represented
/// as `Scheme { vars: [a], ty: Func(Var(a), Var(a)) }`.
#[derive(Clone, Debug, Serialize)]
pub struct Scheme {
    pub vars: Vec<TyVar>,
    pub ty: Ty,
}

impl Scheme {
    pub fn mono(ty: Ty) -> Self {
        Scheme {
            vars: Vec::new(),
            ty,
        }
    }
}

/// Collect all `TyVar` references appearing in a type, including inside
/// effect row tails, in order of first appearance (duplicates included —
/// callers that need a set should dedupe).
pub fn free_tyvars(ty: &Ty, out: &mut Vec<TyVar>) {
    match ty {
        Ty::Var(v) => out.push(*v),
        Ty::Unit | Ty::Bool | Ty::Int | Ty::String | Ty::Unknown(_) => {}
        Ty::Func(from, to) => {
            free_tyvars(from, out);
            free_tyvars(to, out);
        }
        Ty::Tuple(elems) => {
            for e in elems {
                free_tyvars(e, out);
            }
        }
        Ty::Constructor(_, args) => {
            for a in args {
                free_tyvars(a, out);
            }
        }
        Ty::Record(fields) => {
            for (_, t) in fields {
                free_tyvars(t, out);
            }
        }
        Ty::EffectRow { cases, tail } => {
            for payload in cases.values().flatten() {
                free_tyvars(payload, out);
            }
            if let Some(t) = tail {
                out.push(*t);
            }
        }
    }
}

// ── ena trait implementations ──────────────────────────────────────────

impl ena::unify::UnifyKey for TyVar {
    type Value = Option<Ty>;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        TyVar(u)
    }

    fn tag() -> &'static str {
        "TyVar"
    }
}

impl ena::unify::EqUnifyValue for Ty {}
