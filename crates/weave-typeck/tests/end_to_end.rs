//! Whole-pipeline scenarios exercising carrier infection, match discharge,
//! nominal record resolution, and exhaustiveness together, the way a
//! caller handing `infer_program` a real canonicalized tree would see them.

use rustc_hash::FxHashSet;

use weave_ast::{
    ArmKind, CtorDecl, Decl, Expr, ExprKind, InfectiousDecl, LetDecl, LiteralValue, MatchArm,
    Param, Pattern, PatternKind, Program, Stmt, StmtKind, TypeDecl, TypeDeclKind, TypeExpr,
};
use weave_common::NodeId;
use weave_typeck::expr::Facts;
use weave_typeck::marks::MarkRecorder;
use weave_typeck::match_engine::infer_match;
use weave_typeck::register::{register_carriers, register_constructors, register_type_names, AdtEnv, OperatorTable};
use weave_typeck::stubs::StubRecorder;
use weave_typeck::ty::Ty;
use weave_typeck::unify::InferCtx;
use weave_typeck::{infer_program, InferOptions, NodeTypeMap};

fn id(n: u32) -> NodeId {
    NodeId::new(n)
}

fn ident(n: u32, name: &str) -> Expr {
    Expr::new(id(n), ExprKind::Ident(name.to_string()))
}

fn int_lit(n: u32, v: i64) -> Expr {
    Expr::new(id(n), ExprKind::Literal(LiteralValue::Int(v)))
}

fn one_param_let(name: &str, param: &str, body: Expr) -> Decl {
    Decl::Let(LetDecl {
        id: id(900),
        name: name.to_string(),
        params: vec![Param {
            name: param.to_string(),
            annotation: None,
        }],
        return_annotation: None,
        body,
        recursive: false,
        mutual_group: None,
    })
}

// A two-constructor carrier: IOk(v) is the value case, NotFound is a
// nullary effect case. Mirrors how register.rs threads an effect
// constructor's own name into the row as its label.
fn iresult_type_decl() -> Decl {
    Decl::Type(TypeDecl {
        id: id(0),
        name: "IResult".into(),
        type_params: vec!["v".into()],
        kind: TypeDeclKind::Adt {
            constructors: vec![
                CtorDecl {
                    name: "IOk".into(),
                    field_types: vec![TypeExpr::Var("v".into())],
                },
                CtorDecl {
                    name: "NotFound".into(),
                    field_types: vec![],
                },
                CtorDecl {
                    name: "Other".into(),
                    field_types: vec![],
                },
            ],
        },
        carrier: None,
    })
}

fn iresult_infectious_decl() -> Decl {
    Decl::Infectious(InfectiousDecl {
        id: id(1),
        domain: "io".into(),
        type_name: "IResult".into(),
        value_ctor: "IOk".into(),
        effect_ctors: vec!["NotFound".into(), "Other".into()],
    })
}

// Scenario 3 (spec.md §8.3): a carrier error constructed in one function
// infects the result of a second function that calls it and then uses the
// unwrapped value arithmetically.
#[test]
fn carrier_effect_infects_through_arithmetic_call_chain() {
    // let f = x => NotFound
    let f_body = Expr::new(id(10), ExprKind::ConstructorApp { name: "NotFound".into(), args: vec![] });
    let f_decl = one_param_let("f", "x", f_body);

    // let g = x => { let y = f(x); y + 1 }
    let y_value = Expr::new(
        id(20),
        ExprKind::Call {
            callee: Box::new(ident(21, "f")),
            args: vec![ident(22, "x")],
        },
    );
    let g_body = Expr::new(
        id(23),
        ExprKind::Block {
            stmts: vec![Stmt {
                kind: StmtKind::Let {
                    name: "y".into(),
                    annotation: None,
                    value: y_value,
                },
            }],
            result: Some(Box::new(Expr::new(
                id(24),
                ExprKind::Binary {
                    op: "+".into(),
                    lhs: Box::new(ident(25, "y")),
                    rhs: Box::new(int_lit(26, 1)),
                },
            ))),
        },
    );
    let g_decl = one_param_let("g", "x", g_body);

    let program = Program {
        decls: vec![iresult_type_decl(), iresult_infectious_decl(), f_decl, g_decl],
    };

    let result = infer_program(&program, InferOptions::default()).unwrap();
    let result_ty = result.node_type_by_id.get(&id(24)).unwrap().clone();
    match result_ty {
        Ty::Constructor(name, args) if name == "IResult" => {
            assert_eq!(args[0], Ty::Int);
            match &args[1] {
                Ty::EffectRow { cases, .. } => assert!(cases.contains_key("NotFound")),
                other => panic!("expected an effect row, got {:?}", other),
            }
        }
        other => panic!("expected an infected IResult, got {:?}", other),
    }
}

fn carrier_env() -> (InferCtx, AdtEnv, OperatorTable, weave_typeck::env::TypeEnv) {
    let program = Program {
        decls: vec![iresult_type_decl(), iresult_infectious_decl()],
    };
    let mut ctx = InferCtx::new();
    register_carriers(&program, &mut ctx.carriers).unwrap();
    let mut adt_env = AdtEnv::new();
    register_type_names(&program, &mut adt_env).unwrap();
    let mut env = weave_typeck::env::TypeEnv::new();
    let mut operators = OperatorTable::default();
    register_constructors(&mut ctx, &program, &adt_env, &mut env, &mut operators);
    (ctx, adt_env, operators, env)
}

fn run_match(scrutinee: Ty, arms: Vec<MatchArm>) -> (Ty, MarkRecorder) {
    let (mut ctx, adt_env, operators, mut env) = carrier_env();
    let facts = Facts { adt_env: &adt_env, operators: &operators };
    let mut marks = MarkRecorder::new();
    let mut stubs = StubRecorder::new();
    let mut non_generalizable = FxHashSet::default();
    let mut node_types: NodeTypeMap = Default::default();
    let ty = infer_match(
        &mut ctx,
        &mut env,
        &facts,
        &mut marks,
        &mut stubs,
        &mut non_generalizable,
        &mut node_types,
        id(999),
        scrutinee,
        &arms,
    );
    (ctx.resolve(ty), marks)
}

fn ok_value_arm(pattern_var: &str, body: Expr) -> MatchArm {
    MatchArm {
        id: id(100),
        kind: ArmKind::Pattern {
            pattern: Pattern::new(
                id(101),
                PatternKind::Constructor {
                    name: "IOk".into(),
                    args: vec![Pattern::new(
                        id(102),
                        PatternKind::Variable { name: pattern_var.into(), pin: false },
                    )],
                },
            ),
            body,
        },
    }
}

fn ctor_arm(n: u32, ctor: &str, body: Expr) -> MatchArm {
    MatchArm {
        id: id(n),
        kind: ArmKind::Pattern {
            pattern: Pattern::new(id(n + 1), PatternKind::Constructor { name: ctor.into(), args: vec![] }),
            body,
        },
    }
}

// Scenario 4 (spec.md §8.4), fully-covered case: matching every case of a
// closed `{NotFound}` row discharges it down to the bare value type.
#[test]
fn match_discharges_fully_covered_error_row() {
    let mut cases = rustc_hash::FxHashMap::default();
    cases.insert("NotFound".to_string(), None);
    let scrutinee = Ty::Constructor(
        "IResult".into(),
        vec![Ty::Int, Ty::EffectRow { cases, tail: None }],
    );
    let arms = vec![
        ok_value_arm("v", ident(110, "v")),
        ctor_arm(120, "NotFound", int_lit(122, 0)),
    ];
    let (result_ty, marks) = run_match(scrutinee, arms);
    assert_eq!(result_ty, Ty::Int);
    assert!(marks.marks.is_empty());
}

// Scenario 4, partial case: a `{NotFound, Other}` row with only `NotFound`
// handled produces `ErrorRowPartialCoverage` and leaves `Other` in the
// result's carried state instead of discharging.
#[test]
fn match_leaves_partial_error_row_undischarged() {
    let mut cases = rustc_hash::FxHashMap::default();
    cases.insert("NotFound".to_string(), None);
    cases.insert("Other".to_string(), None);
    let scrutinee = Ty::Constructor(
        "IResult".into(),
        vec![Ty::Int, Ty::EffectRow { cases, tail: None }],
    );
    let arms = vec![
        ok_value_arm("v", ident(110, "v")),
        ctor_arm(120, "NotFound", int_lit(122, 0)),
    ];
    let (result_ty, marks) = run_match(scrutinee, arms);
    match result_ty {
        Ty::Constructor(name, args) if name == "IResult" => match &args[1] {
            Ty::EffectRow { cases, .. } => {
                assert!(cases.contains_key("Other"));
                assert!(!cases.contains_key("NotFound"));
            }
            other => panic!("expected a leftover effect row, got {:?}", other),
        },
        other => panic!("expected IResult to remain, got {:?}", other),
    }
    assert!(marks
        .marks
        .iter()
        .any(|m| matches!(&m.kind, weave_typeck::marks::MarkKind::ErrorRowPartialCoverage { missing } if missing == &vec!["Other".to_string()])));
}

fn point_type_decl(n: u32, name: &str) -> Decl {
    Decl::Type(TypeDecl {
        id: id(n),
        name: name.to_string(),
        type_params: vec![],
        kind: TypeDeclKind::Record {
            fields: vec![("x".into(), TypeExpr::Int), ("y".into(), TypeExpr::Int)],
        },
        carrier: None,
    })
}

fn record_lit(n: u32) -> Expr {
    Expr::new(
        id(n),
        ExprKind::RecordLiteral {
            fields: vec![
                ("x".to_string(), int_lit(n + 1, 1)),
                ("y".to_string(), int_lit(n + 2, 2)),
            ],
        },
    )
}

// Scenario 5 (spec.md §8.5), unique case: one matching nominal record type
// in scope means the literal adopts that type.
#[test]
fn record_literal_adopts_unique_nominal_type() {
    let program = Program {
        decls: vec![point_type_decl(0, "Point"), one_param_let("p", "_unused", record_lit(10))],
    };
    let result = infer_program(&program, InferOptions::default()).unwrap();
    let ty = result.node_type_by_id.get(&id(10)).unwrap().clone();
    assert!(matches!(ty, Ty::Constructor(name, _) if name == "Point"));
    assert!(result.marks.iter().all(|m| !matches!(m.kind, weave_typeck::marks::MarkKind::AmbiguousRecord { .. })));
}

// Scenario 5, ambiguous case: two nominal record types with the same field
// set make the literal fall back to a structural record plus a diagnostic.
#[test]
fn record_literal_falls_back_when_ambiguous() {
    let program = Program {
        decls: vec![
            point_type_decl(0, "Point"),
            point_type_decl(1, "Coord"),
            one_param_let("p", "_unused", record_lit(10)),
        ],
    };
    let result = infer_program(&program, InferOptions::default()).unwrap();
    let ty = result.node_type_by_id.get(&id(10)).unwrap().clone();
    assert!(matches!(ty, Ty::Record(_)));
    assert!(result
        .marks
        .iter()
        .any(|m| matches!(&m.kind, weave_typeck::marks::MarkKind::AmbiguousRecord { .. })));
}

// Scenario 6 (spec.md §8.6): matching `Bool` without both literals marks
// non-exhaustive; covering both type-checks cleanly.
#[test]
fn bool_match_non_exhaustive_without_both_literals() {
    let scrutinee_expr = ident(30, "b");
    let arm = MatchArm {
        id: id(31),
        kind: ArmKind::Pattern {
            pattern: Pattern::new(id(32), PatternKind::Literal(LiteralValue::Bool(true))),
            body: int_lit(33, 1),
        },
    };
    let body = Expr::new(
        id(34),
        ExprKind::Match { scrutinee: Box::new(scrutinee_expr), arms: vec![arm] },
    );
    let decl = Decl::Let(LetDecl {
        id: id(900),
        name: "f".into(),
        params: vec![Param { name: "b".into(), annotation: Some(TypeExpr::Bool) }],
        return_annotation: None,
        body,
        recursive: false,
        mutual_group: None,
    });
    let program = Program { decls: vec![decl] };
    let result = infer_program(&program, InferOptions::default()).unwrap();
    assert!(result.marks.iter().any(|m| matches!(
        &m.kind,
        weave_typeck::marks::MarkKind::NonExhaustive { missing, .. } if missing == &vec!["false".to_string()]
    )));
}

#[test]
fn bool_match_exhaustive_with_both_literals_type_checks() {
    let scrutinee_expr = ident(30, "b");
    let arms = vec![
        MatchArm {
            id: id(31),
            kind: ArmKind::Pattern {
                pattern: Pattern::new(id(32), PatternKind::Literal(LiteralValue::Bool(true))),
                body: int_lit(33, 1),
            },
        },
        MatchArm {
            id: id(35),
            kind: ArmKind::Pattern {
                pattern: Pattern::new(id(36), PatternKind::Literal(LiteralValue::Bool(false))),
                body: int_lit(37, 2),
            },
        },
    ];
    let body = Expr::new(
        id(34),
        ExprKind::Match { scrutinee: Box::new(scrutinee_expr), arms },
    );
    let decl = Decl::Let(LetDecl {
        id: id(900),
        name: "f".into(),
        params: vec![Param { name: "b".into(), annotation: Some(TypeExpr::Bool) }],
        return_annotation: None,
        body,
        recursive: false,
        mutual_group: None,
    });
    let program = Program { decls: vec![decl] };
    let result = infer_program(&program, InferOptions::default()).unwrap();
    assert_eq!(result.node_type_by_id.get(&id(34)).unwrap(), &Ty::Int);
    assert!(result
        .marks
        .iter()
        .all(|m| !matches!(m.kind, weave_typeck::marks::MarkKind::NonExhaustive { .. })));
}

// Scenario: `IOk(NotFound)` — the value constructor applied to one of its
// own carrier's effect constructors. The infectious refinement leaks
// `NotFound` into the result's state row even though the argument went in
// as the (nominally unconstrained) value slot, not through a call.
#[test]
fn constructor_application_leaks_nested_effect_constructor_into_state_row() {
    let body = Expr::new(
        id(40),
        ExprKind::ConstructorApp {
            name: "IOk".into(),
            args: vec![Expr::new(id(41), ExprKind::ConstructorApp { name: "NotFound".into(), args: vec![] })],
        },
    );
    let decl = one_param_let("f", "x", body);
    let program = Program {
        decls: vec![iresult_type_decl(), iresult_infectious_decl(), decl],
    };
    let result = infer_program(&program, InferOptions::default()).unwrap();
    let ty = result.node_type_by_id.get(&id(40)).unwrap().clone();
    match ty {
        Ty::Constructor(name, args) if name == "IResult" => match &args[1] {
            Ty::EffectRow { cases, .. } => assert!(cases.contains_key("NotFound")),
            other => panic!("expected an effect row, got {:?}", other),
        },
        other => panic!("expected an IResult, got {:?}", other),
    }
    assert!(result
        .constraint_stubs
        .iter()
        .any(|s| matches!(s, weave_typeck::stubs::ConstraintStub::Source { .. })));
}

// A constructor application left under-saturated must be a `NotFunction`,
// not a silently-allowed curried value — §4.5 requires constructors to be
// fully applied.
#[test]
fn under_saturated_constructor_application_is_not_function() {
    let body = Expr::new(
        id(42),
        ExprKind::ConstructorApp { name: "IOk".into(), args: vec![] },
    );
    let decl = one_param_let("g", "x", body);
    let program = Program {
        decls: vec![iresult_type_decl(), iresult_infectious_decl(), decl],
    };
    let result = infer_program(&program, InferOptions::default()).unwrap();
    assert!(result
        .marks
        .iter()
        .any(|m| matches!(m.kind, weave_typeck::marks::MarkKind::NotFunction { .. })));
}
