//! The canonicalized input tree the Weave type inference core consumes.
//!
//! Everything upstream of this crate — lexing, parsing, desugaring — is out
//! of scope for the core; callers hand it a tree already shaped like this
//! one, plus a prelude environment. Every node carries a `NodeId` so the
//! core can report a type (or a mark) against it without owning any notion
//! of source position itself.

use serde::Serialize;
use weave_common::NodeId;

/// A canonicalized program: a flat list of top-level declarations in
/// source order. Import resolution already happened upstream; there is no
/// `use`/`import` node here.
#[derive(Clone, Debug, Serialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}

#[derive(Clone, Debug, Serialize)]
pub enum Decl {
    Let(LetDecl),
    Type(TypeDecl),
    Infectious(InfectiousDecl),
    Infix(OperatorDecl),
    Prefix(OperatorDecl),
}

impl Decl {
    pub fn id(&self) -> NodeId {
        match self {
            Decl::Let(d) => d.id,
            Decl::Type(d) => d.id,
            Decl::Infectious(d) => d.id,
            Decl::Infix(d) | Decl::Prefix(d) => d.id,
        }
    }
}

/// A `let` binding. `mutual_group` links siblings that must be registered
/// with fresh type variables before any of their bodies are inferred, so
/// mutual recursion (`even`/`odd`) type-checks without a forward-declared
/// signature.
#[derive(Clone, Debug, Serialize)]
pub struct LetDecl {
    pub id: NodeId,
    pub name: String,
    pub params: Vec<Param>,
    pub return_annotation: Option<TypeExpr>,
    pub body: Expr,
    pub recursive: bool,
    pub mutual_group: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Param {
    pub name: String,
    pub annotation: Option<TypeExpr>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TypeDecl {
    pub id: NodeId,
    pub name: String,
    pub type_params: Vec<String>,
    pub kind: TypeDeclKind,
    /// Present when this declaration uses the combined infectious-type
    /// syntax; canonicalizes to the same registration path as a standalone
    /// `InfectiousDecl` (§9's design note on the legacy/combined split).
    pub carrier: Option<CarrierAnnotation>,
}

#[derive(Clone, Debug, Serialize)]
pub enum TypeDeclKind {
    Adt { constructors: Vec<CtorDecl> },
    Record { fields: Vec<(String, TypeExpr)> },
    Alias(TypeExpr),
}

#[derive(Clone, Debug, Serialize)]
pub struct CtorDecl {
    pub name: String,
    pub field_types: Vec<TypeExpr>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CarrierAnnotation {
    pub domain: String,
    pub value_ctor: String,
    pub effect_ctors: Vec<String>,
}

/// Legacy standalone syntax binding a domain label to an already-declared
/// nominal type; carries the same fields as `CarrierAnnotation` because
/// both canonicalize into one `CarrierDescriptor` registration.
#[derive(Clone, Debug, Serialize)]
pub struct InfectiousDecl {
    pub id: NodeId,
    pub domain: String,
    pub type_name: String,
    pub value_ctor: String,
    pub effect_ctors: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct OperatorDecl {
    pub id: NodeId,
    pub symbol: String,
    pub impl_name: String,
}

#[derive(Clone, Debug, Serialize)]
pub enum TypeExpr {
    Unit,
    Bool,
    Int,
    String,
    Func(Box<TypeExpr>, Box<TypeExpr>),
    Tuple(Vec<TypeExpr>),
    /// A nominal reference, possibly applied to type arguments (`IResult
    /// Int`). Zero arguments for a plain name.
    Named(String, Vec<TypeExpr>),
    /// A bound type-parameter reference inside a declaration's own scope.
    Var(String),
}

#[derive(Clone, Debug, Serialize)]
pub enum LiteralValue {
    Unit,
    Bool(bool),
    Int(i64),
    Str(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind) -> Self {
        Expr { id, kind }
    }
}

#[derive(Clone, Debug, Serialize)]
pub enum ExprKind {
    Ident(String),
    Literal(LiteralValue),
    /// A typed hole (`_` in expression position): always produces an
    /// `Unknown` type and a mark, never a hard error.
    Hole,
    ConstructorApp {
        name: String,
        args: Vec<Expr>,
    },
    Tuple(Vec<Expr>),
    RecordLiteral {
        fields: Vec<(String, Expr)>,
    },
    Project {
        target: Box<Expr>,
        field: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Arrow {
        params: Vec<Param>,
        return_annotation: Option<TypeExpr>,
        body: Box<Expr>,
    },
    Block {
        stmts: Vec<Stmt>,
        result: Option<Box<Expr>>,
    },
    Binary {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
    },
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
    },
    /// A function whose own parameters are the match scrutinees — each arm
    /// pattern is a tuple pattern of the declared arity.
    MatchFn {
        arity: usize,
        arms: Vec<MatchArm>,
    },
    /// A standalone set of arms with no scrutinee, referenced by name from
    /// another match via `ArmKind::BundleRef`.
    MatchBundleLiteral {
        arms: Vec<MatchArm>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct Stmt {
    pub kind: StmtKind,
}

#[derive(Clone, Debug, Serialize)]
pub enum StmtKind {
    Let {
        name: String,
        annotation: Option<TypeExpr>,
        value: Expr,
    },
    PatternLet {
        pattern: Pattern,
        value: Expr,
    },
    Expr(Expr),
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchArm {
    pub id: NodeId,
    pub kind: ArmKind,
}

#[derive(Clone, Debug, Serialize)]
pub enum ArmKind {
    Pattern { pattern: Pattern, body: Expr },
    BundleRef { name: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct Pattern {
    pub id: NodeId,
    pub kind: PatternKind,
}

impl Pattern {
    pub fn new(id: NodeId, kind: PatternKind) -> Self {
        Pattern { id, kind }
    }
}

#[derive(Clone, Debug, Serialize)]
pub enum PatternKind {
    Wildcard,
    /// A bound variable; `pin: true` means the pattern must match an
    /// already-bound occurrence rather than introduce a new binding.
    Variable { name: String, pin: bool },
    Literal(LiteralValue),
    Tuple(Vec<Pattern>),
    Constructor { name: String, args: Vec<Pattern> },
    /// Matches any carrier error state, regardless of which error
    /// constructor produced it.
    AllErrors,
}
