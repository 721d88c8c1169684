//! Hindley-Milner type inference core with infectious effect carriers.
//!
//! `infer_program` is the single entry point (§6): three passes of
//! declaration registration followed by per-`let` inference, threading one
//! `InferCtx`/`TypeEnv`/`MarkRecorder`/`StubRecorder` through the whole
//! program. Everything else in this crate is a component of that pass —
//! see each module's own doc comment for the piece of §2's component table
//! it implements.

pub mod builtins;
pub mod carrier;
pub mod env;
pub mod error;
pub mod expr;
pub mod marks;
pub mod match_engine;
pub mod pattern;
pub mod register;
pub mod rows;
pub mod stubs;
pub mod ty;
pub mod unify;

use rustc_hash::{FxHashMap, FxHashSet};

use weave_ast::{Decl, LetDecl, Param, Program};
use weave_common::NodeId;

use crate::env::{generalize, TypeEnv};
use crate::error::ContractError;
use crate::expr::{infer_expr, Facts};
use crate::marks::{Hole, Mark, MarkRecorder};
use crate::register::{
    convert_type_expr, register_carriers, register_constructors, register_type_names, AdtEnv,
    AdtKind, OperatorTable,
};
use crate::stubs::{ConstraintStub, StubRecorder};
use crate::ty::{Scheme, Ty, TyVar};
use crate::unify::InferCtx;

/// A complete, substitution-applied id → type map. Every expression id in
/// the input program has an entry once `infer_program` returns (§8).
pub type NodeTypeMap = FxHashMap<NodeId, Ty>;

/// Inputs beyond the program tree itself (§6 "Options").
pub struct InferOptions {
    /// Seeded name → scheme map, visible before any registration pass runs.
    pub initial_env: TypeEnv,
    /// Seeded ADT info map, visible before `register_type_names` runs.
    pub initial_adt_env: AdtEnv,
    /// Populate the core's own small prelude (`builtins::register_prelude`).
    pub register_prelude: bool,
    /// Reset the fresh-variable counter before inferring this program.
    pub reset_counter: bool,
    /// Source text kept only for debugging; never read by inference itself.
    pub source: Option<String>,
}

impl Default for InferOptions {
    fn default() -> Self {
        InferOptions {
            initial_env: TypeEnv::new(),
            initial_adt_env: AdtEnv::new(),
            register_prelude: true,
            reset_counter: false,
            source: None,
        }
    }
}

/// One top-level `let` binding's final, generalized scheme.
#[derive(Clone, Debug)]
pub struct LetSummary {
    pub name: String,
    pub scheme: Scheme,
}

/// The output contract (§6 "Output"). `markedProgram` has no separate
/// representation here: marks are a side table (§9) keyed by node id, and
/// combined with the unmodified input `Program` they carry the same
/// information. `typeExprMarks`/`layer1Diagnostics` are folded into
/// `marks`/`pattern_marks` since this crate has no separate "Layer 1" pass.
#[derive(Debug)]
pub struct InferResult {
    pub env: TypeEnv,
    pub adt_env: AdtEnv,
    pub summaries: Vec<LetSummary>,
    pub all_bindings: FxHashMap<String, Scheme>,
    pub marks: Vec<Mark>,
    pub pattern_marks: Vec<Mark>,
    pub holes: Vec<Hole>,
    pub constraint_stubs: Vec<ConstraintStub>,
    pub node_type_by_id: NodeTypeMap,
}

/// Run the whole pipeline over `program`: register every declaration, then
/// infer every top-level `let` in source order, generalizing standalone
/// and mutually-recursive groups alike against fresh monomorphic
/// placeholders for their own names (§4.2).
pub fn infer_program(program: &Program, options: InferOptions) -> Result<InferResult, ContractError> {
    let mut ctx = InferCtx::new();
    if options.reset_counter {
        ctx.reset_counter();
    }
    let mut env = options.initial_env;
    let mut adt_env = options.initial_adt_env;
    let mut marks = MarkRecorder::new();
    let mut stubs = StubRecorder::new();
    let mut node_types: NodeTypeMap = FxHashMap::default();
    let mut operators = OperatorTable::default();
    let mut summaries = Vec::new();

    if options.register_prelude {
        builtins::register_prelude(&mut ctx, &mut env);
    }

    register_carriers(program, &mut ctx.carriers)?;
    register_type_names(program, &mut adt_env)?;
    register_constructors(&mut ctx, program, &adt_env, &mut env, &mut operators);

    let facts = Facts {
        adt_env: &adt_env,
        operators: &operators,
    };

    let mut seen_groups: FxHashSet<u32> = FxHashSet::default();

    for decl in &program.decls {
        let Decl::Let(let_decl) = decl else { continue };
        match let_decl.mutual_group {
            Some(group_id) => {
                if !seen_groups.insert(group_id) {
                    continue;
                }
                let members: Vec<&LetDecl> = program
                    .decls
                    .iter()
                    .filter_map(|d| match d {
                        Decl::Let(ld) if ld.mutual_group == Some(group_id) => Some(ld),
                        _ => None,
                    })
                    .collect();
                if members.len() < 2 {
                    return Err(ContractError::UnknownMutualGroupMember {
                        name: members[0].name.clone(),
                    });
                }
                process_mutual_group(
                    &mut ctx,
                    &mut env,
                    &facts,
                    &mut marks,
                    &mut stubs,
                    &mut node_types,
                    &members,
                    &mut summaries,
                );
            }
            None => {
                process_single_let(
                    &mut ctx,
                    &mut env,
                    &facts,
                    &mut marks,
                    &mut stubs,
                    &mut node_types,
                    let_decl,
                    &mut summaries,
                );
            }
        }
    }

    // Idempotent final substitution pass (§8): every recorded node type is
    // resolved once more now that the whole program's unification is done.
    for ty in node_types.values_mut() {
        *ty = ctx.resolve(ty.clone());
    }

    let mut output_adt_env = AdtEnv::new();
    for (name, info) in &adt_env.types {
        if !matches!(info.kind, AdtKind::Alias(_)) {
            output_adt_env.types.insert(name.clone(), info.clone());
        }
    }
    output_adt_env.ctor_owner = adt_env.ctor_owner.clone();

    let all_bindings = env.all_bindings.clone();

    Ok(InferResult {
        env,
        adt_env: output_adt_env,
        summaries,
        all_bindings,
        marks: marks.marks,
        pattern_marks: marks.pattern_marks,
        holes: marks.holes,
        constraint_stubs: stubs.stubs,
        node_type_by_id: node_types,
    })
}

// A parameter's own fresh variable is not added to the non-generalizable
// set: it is exactly what the enclosing `let` should be polymorphic over
// once its scope is popped (§4.2). Keeping it out of the set here is what
// lets `x => x` generalize to `forall a. a -> a` instead of being pinned
// monomorphic by its own parameter.
fn build_param_types(ctx: &mut InferCtx, env: &mut TypeEnv, params: &[Param]) -> Vec<Ty> {
    params
        .iter()
        .map(|p| {
            let ty = match &p.annotation {
                Some(te) => convert_type_expr(te, &Default::default()),
                None => ctx.fresh_var(),
            };
            env.insert(p.name.clone(), Scheme::mono(ty.clone()));
            ty
        })
        .collect()
}

/// Infer one `let` declaration's own param scope plus body, returning the
/// curried function type over its declared parameters. Pushes and pops one
/// scope for the parameters; callers own any outer scope (e.g. a
/// self/mutual-recursion placeholder binding).
#[allow(clippy::too_many_arguments)]
fn infer_let_body(
    ctx: &mut InferCtx,
    env: &mut TypeEnv,
    facts: &Facts,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    node_types: &mut NodeTypeMap,
    non_generalizable: &mut FxHashSet<TyVar>,
    decl: &LetDecl,
) -> Ty {
    env.push_scope();
    let param_tys = build_param_types(ctx, env, &decl.params);
    let body_ty = infer_expr(
        ctx,
        env,
        facts,
        marks,
        stubs,
        non_generalizable,
        node_types,
        &decl.body,
    );
    if let Some(ret_te) = &decl.return_annotation {
        let expected = convert_type_expr(ret_te, &Default::default());
        stubs.push(ConstraintStub::Annotation {
            node: decl.id,
            expected: expected.clone(),
        });
        if let Err(kind) = ctx.unify(expected, body_ty.clone()) {
            marks.record(decl.id, kind);
        }
    }
    env.pop_scope();
    Ty::curried(param_tys, body_ty)
}

/// A standalone `let`, recursive or not. A recursive binding gets a fresh
/// monomorphic placeholder for its own name, visible while its body is
/// inferred so self-calls resolve against it; the placeholder's scope is
/// popped before generalizing, so the placeholder itself can never block
/// its own generalization.
#[allow(clippy::too_many_arguments)]
fn process_single_let(
    ctx: &mut InferCtx,
    env: &mut TypeEnv,
    facts: &Facts,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    node_types: &mut NodeTypeMap,
    decl: &LetDecl,
    summaries: &mut Vec<LetSummary>,
) {
    let mut non_generalizable = FxHashSet::default();

    let fn_ty = if decl.recursive {
        env.push_scope();
        let placeholder = ctx.fresh_var();
        env.insert(decl.name.clone(), crate::ty::Scheme::mono(placeholder.clone()));
        let fn_ty = infer_let_body(
            ctx,
            env,
            facts,
            marks,
            stubs,
            node_types,
            &mut non_generalizable,
            decl,
        );
        if let Err(kind) = ctx.unify(fn_ty.clone(), placeholder) {
            marks.record(decl.id, kind);
        }
        env.pop_scope();
        ctx.resolve(fn_ty)
    } else {
        infer_let_body(
            ctx,
            env,
            facts,
            marks,
            stubs,
            node_types,
            &mut non_generalizable,
            decl,
        )
    };

    let scheme = generalize(ctx, env, &non_generalizable, fn_ty);
    env.insert(decl.name.clone(), scheme.clone());
    summaries.push(LetSummary {
        name: decl.name.clone(),
        scheme,
    });
}

/// A mutual-recursion group: every sibling's name is pre-bound to a fresh
/// placeholder in one shared scope, every body is inferred against that
/// scope (so siblings see each other), each body is unified with its own
/// placeholder, the whole scope is popped in one shot, and only then is
/// each member generalized against the now-placeholder-free environment.
#[allow(clippy::too_many_arguments)]
fn process_mutual_group(
    ctx: &mut InferCtx,
    env: &mut TypeEnv,
    facts: &Facts,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    node_types: &mut NodeTypeMap,
    members: &[&LetDecl],
    summaries: &mut Vec<LetSummary>,
) {
    env.push_scope();
    let placeholders: Vec<Ty> = members
        .iter()
        .map(|m| {
            let placeholder = ctx.fresh_var();
            env.insert(m.name.clone(), crate::ty::Scheme::mono(placeholder.clone()));
            placeholder
        })
        .collect();

    let mut fn_tys = Vec::with_capacity(members.len());
    let mut non_generalizable_sets = Vec::with_capacity(members.len());
    for (member, placeholder) in members.iter().zip(&placeholders) {
        let mut non_generalizable = FxHashSet::default();
        let fn_ty = infer_let_body(
            ctx,
            env,
            facts,
            marks,
            stubs,
            node_types,
            &mut non_generalizable,
            member,
        );
        if let Err(kind) = ctx.unify(fn_ty.clone(), placeholder.clone()) {
            marks.record(member.id, kind);
        }
        fn_tys.push(ctx.resolve(fn_ty));
        non_generalizable_sets.push(non_generalizable);
    }
    env.pop_scope();

    for ((member, fn_ty), non_generalizable) in
        members.iter().zip(fn_tys).zip(non_generalizable_sets)
    {
        let scheme = generalize(ctx, env, &non_generalizable, fn_ty);
        env.insert(member.name.clone(), scheme.clone());
        summaries.push(LetSummary {
            name: member.name.clone(),
            scheme,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_ast::{Expr, ExprKind, LiteralValue};

    fn id(n: u32) -> NodeId {
        NodeId::new(n)
    }

    fn simple_let(name: &str, body: Expr, recursive: bool, mutual_group: Option<u32>) -> Decl {
        Decl::Let(LetDecl {
            id: id(100),
            name: name.to_string(),
            params: vec![Param {
                name: "x".into(),
                annotation: None,
            }],
            return_annotation: None,
            body,
            recursive,
            mutual_group,
        })
    }

    #[test]
    fn identity_generalizes_and_specializes_independently() {
        let program = Program {
            decls: vec![simple_let(
                "id",
                Expr::new(id(1), ExprKind::Ident("x".into())),
                false,
                None,
            )],
        };
        let mut result = infer_program(&program, InferOptions::default()).unwrap();
        let scheme = result.env.lookup("id").unwrap().clone();
        assert_eq!(scheme.vars.len(), 1);

        let mut ctx = InferCtx::new();
        let inst1 = crate::env::instantiate(&mut ctx, &scheme);
        let inst2 = crate::env::instantiate(&mut ctx, &scheme);
        assert_ne!(inst1, inst2);
        let _ = &mut result;
    }

    #[test]
    fn every_expression_id_has_a_recorded_type() {
        let program = Program {
            decls: vec![simple_let(
                "id",
                Expr::new(id(1), ExprKind::Ident("x".into())),
                false,
                None,
            )],
        };
        let result = infer_program(&program, InferOptions::default()).unwrap();
        assert!(result.node_type_by_id.contains_key(&id(1)));
    }

    #[test]
    fn malformed_single_member_mutual_group_is_a_hard_error() {
        let program = Program {
            decls: vec![simple_let(
                "lonely",
                Expr::new(id(1), ExprKind::Literal(LiteralValue::Int(1))),
                true,
                Some(7),
            )],
        };
        let err = infer_program(&program, InferOptions::default()).unwrap_err();
        assert!(matches!(err, ContractError::UnknownMutualGroupMember { .. }));
    }

    #[test]
    fn mutual_recursion_group_generalizes_both_members() {
        use weave_ast::{ArmKind, MatchArm, Pattern, PatternKind};

        // even = n => match n { 0 => true, _ => odd(n) }
        // odd  = n => match n { 0 => false, _ => even(n) }
        let even_body = Expr::new(
            id(10),
            ExprKind::Match {
                scrutinee: Box::new(Expr::new(id(11), ExprKind::Ident("x".into()))),
                arms: vec![
                    MatchArm {
                        id: id(12),
                        kind: ArmKind::Pattern {
                            pattern: Pattern::new(id(13), PatternKind::Literal(LiteralValue::Int(0))),
                            body: Expr::new(id(14), ExprKind::Literal(LiteralValue::Bool(true))),
                        },
                    },
                    MatchArm {
                        id: id(15),
                        kind: ArmKind::Pattern {
                            pattern: Pattern::new(
                                id(16),
                                PatternKind::Variable {
                                    name: "_n".into(),
                                    pin: false,
                                },
                            ),
                            body: Expr::new(
                                id(17),
                                ExprKind::Call {
                                    callee: Box::new(Expr::new(id(18), ExprKind::Ident("odd".into()))),
                                    args: vec![Expr::new(id(19), ExprKind::Ident("x".into()))],
                                },
                            ),
                        },
                    },
                ],
            },
        );
        let odd_body = Expr::new(
            id(20),
            ExprKind::Call {
                callee: Box::new(Expr::new(id(21), ExprKind::Ident("even".into()))),
                args: vec![Expr::new(id(22), ExprKind::Ident("x".into()))],
            },
        );

        let program = Program {
            decls: vec![
                simple_let("even", even_body, true, Some(1)),
                simple_let("odd", odd_body, true, Some(1)),
            ],
        };
        let result = infer_program(&program, InferOptions::default()).unwrap();
        assert_eq!(result.summaries.len(), 2);
        for summary in &result.summaries {
            assert!(summary.scheme.vars.is_empty());
            assert_eq!(summary.scheme.ty, Ty::func(Ty::Int, Ty::Bool));
        }
    }
}
