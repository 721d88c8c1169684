//! Expression inference, including the infectious call-application
//! algorithm (§4.4-§4.6).
//!
//! Grounded on the teacher's `infer_expr`/`infer_call`/`infer_field_access`
//! for the per-form dispatch shape; the carrier threading itself has no
//! teacher analogue (ordinary Hindley-Milner has no notion of it) and
//! follows §4.4's outline directly: collapse the callee and every
//! argument's carrier state, unify the stripped value types against the
//! callee's parameters, then re-wrap the result in whatever carrier states
//! were collected, merged per effect domain.

use rustc_hash::{FxHashMap, FxHashSet};

use weave_ast::{Expr, ExprKind, Stmt, StmtKind};

use crate::carrier::CallCarrierState;
use crate::env::{generalize, instantiate, TypeEnv};
use crate::marks::{MarkKind, MarkRecorder};
use crate::match_engine::infer_match;
use crate::pattern::{infer_pattern, literal_ty};
use crate::register::{convert_type_expr, AdtEnv};
use crate::stubs::{ConstraintStub, StubRecorder};
use crate::ty::{Provenance, Scheme, Ty, TyVar};
use crate::unify::{unknown, InferCtx};

const ARITHMETIC_OPS: &[&str] = &["+", "-", "*", "/", "%"];
const COMPARISON_OPS: &[&str] = &["==", "!=", "<", ">", "<=", ">="];
const BOOLEAN_OPS: &[&str] = &["&&", "||"];

pub struct Facts<'a> {
    pub adt_env: &'a AdtEnv,
    pub operators: &'a crate::register::OperatorTable,
}

#[allow(clippy::too_many_arguments)]
pub fn infer_expr(
    ctx: &mut InferCtx,
    env: &mut TypeEnv,
    facts: &Facts,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    non_generalizable: &mut FxHashSet<TyVar>,
    node_types: &mut crate::NodeTypeMap,
    expr: &Expr,
) -> Ty {
    let ty = infer_expr_inner(ctx, env, facts, marks, stubs, non_generalizable, node_types, expr);
    node_types.insert(expr.id, ty.clone());
    ty
}

#[allow(clippy::too_many_arguments)]
fn infer_expr_inner(
    ctx: &mut InferCtx,
    env: &mut TypeEnv,
    facts: &Facts,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    non_generalizable: &mut FxHashSet<TyVar>,
    node_types: &mut crate::NodeTypeMap,
    expr: &Expr,
) -> Ty {
    match &expr.kind {
        ExprKind::Ident(name) => match env.lookup(name).cloned() {
            Some(scheme) => instantiate(ctx, &scheme),
            None => {
                marks.record(
                    expr.id,
                    MarkKind::FreeVariable {
                        name: name.clone(),
                    },
                );
                unknown(Provenance::UnboundIdentifier(name.clone()))
            }
        },

        ExprKind::Literal(lit) => literal_ty(lit),

        ExprKind::Hole => {
            let ty = unknown(Provenance::Hole);
            marks.record_hole(expr.id, ty.clone());
            ty
        }

        ExprKind::ConstructorApp { name, args } => {
            infer_constructor_app(ctx, env, facts, marks, stubs, non_generalizable, node_types, expr, name, args)
        }

        ExprKind::Tuple(elems) => Ty::Tuple(
            elems
                .iter()
                .map(|e| infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, e))
                .collect(),
        ),

        ExprKind::RecordLiteral { fields } => {
            infer_record_literal(ctx, env, facts, marks, stubs, non_generalizable, node_types, expr, fields)
        }

        ExprKind::Project { target, field } => {
            let target_ty = infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, target);
            let resolved = ctx.resolve(target_ty.clone());
            stubs.push(ConstraintStub::Field {
                node: expr.id,
                target: resolved.clone(),
                field: field.clone(),
            });
            match resolved {
                Ty::Record(fields) => fields
                    .into_iter()
                    .find(|(name, _)| name == field)
                    .map(|(_, ty)| ty)
                    .unwrap_or_else(|| {
                        marks.record(
                            expr.id,
                            MarkKind::MissingField {
                                name: field.clone(),
                                record_type: "<record>".into(),
                            },
                        );
                        unknown(Provenance::TypeMismatch)
                    }),
                Ty::Constructor(name, args) => facts
                    .adt_env
                    .record_field_type(&name, &args, field)
                    .unwrap_or_else(|| {
                        marks.record(
                            expr.id,
                            MarkKind::MissingField {
                                name: field.clone(),
                                record_type: name,
                            },
                        );
                        unknown(Provenance::TypeMismatch)
                    }),
                Ty::Var(_) => project_unresolved_var(ctx, marks, facts, expr.id, resolved, field),
                other => {
                    marks.record(expr.id, MarkKind::NotRecord { ty: other });
                    unknown(Provenance::TypeMismatch)
                }
            }
        }

        ExprKind::Call { callee, args } => {
            let callee_ty = infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, callee);
            let arg_tys: Vec<Ty> = args
                .iter()
                .map(|a| infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, a))
                .collect();
            infectious_call(ctx, marks, stubs, expr.id, callee_ty, arg_tys)
        }

        ExprKind::Arrow {
            params,
            return_annotation,
            body,
        } => {
            env.push_scope();
            let param_tys: Vec<Ty> = params
                .iter()
                .map(|p| {
                    let ty = match &p.annotation {
                        Some(te) => convert_type_expr(te, &Default::default()),
                        None => ctx.fresh_var(),
                    };
                    env.insert(p.name.clone(), Scheme::mono(ty.clone()));
                    if let Ty::Var(v) = ctx.resolve(ty.clone()) {
                        non_generalizable.insert(v);
                    }
                    ty
                })
                .collect();
            let body_ty = infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, body);
            if let Some(ret_te) = return_annotation {
                let expected = convert_type_expr(ret_te, &Default::default());
                stubs.push(ConstraintStub::Annotation {
                    node: expr.id,
                    expected: expected.clone(),
                });
                if let Err(kind) = ctx.unify(expected, body_ty.clone()) {
                    marks.record(expr.id, kind);
                }
            }
            env.pop_scope();
            Ty::curried(param_tys, body_ty)
        }

        ExprKind::Block { stmts, result } => {
            env.push_scope();
            for stmt in stmts {
                infer_stmt(ctx, env, facts, marks, stubs, non_generalizable, node_types, stmt);
            }
            let ty = match result {
                Some(e) => infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, e),
                None => Ty::Unit,
            };
            env.pop_scope();
            ty
        }

        ExprKind::Binary { op, lhs, rhs } => {
            let lhs_ty = infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, lhs);
            let rhs_ty = infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, rhs);
            infer_binary_op(ctx, env, facts, marks, stubs, expr.id, op, lhs_ty, rhs_ty)
        }

        ExprKind::Unary { op, operand } => {
            let operand_ty = infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, operand);
            infer_unary_op(ctx, env, facts, marks, stubs, expr.id, op, operand_ty)
        }

        ExprKind::Match { scrutinee, arms } => {
            let scrutinee_ty = infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, scrutinee);
            infer_match(
                ctx,
                env,
                facts,
                marks,
                stubs,
                non_generalizable,
                node_types,
                expr.id,
                scrutinee_ty,
                arms,
            )
        }

        ExprKind::MatchFn { arity, arms } => {
            let param_vars: Vec<Ty> = (0..*arity).map(|_| ctx.fresh_var()).collect();
            for v in &param_vars {
                if let Ty::Var(v) = ctx.resolve(v.clone()) {
                    non_generalizable.insert(v);
                }
            }
            let scrutinee_ty = if param_vars.len() == 1 {
                param_vars[0].clone()
            } else {
                Ty::Tuple(param_vars.clone())
            };
            let result_ty = infer_match(
                ctx,
                env,
                facts,
                marks,
                stubs,
                non_generalizable,
                node_types,
                expr.id,
                scrutinee_ty,
                arms,
            );
            Ty::curried(param_vars, result_ty)
        }

        ExprKind::MatchBundleLiteral { arms } => {
            let scrutinee_ty = ctx.fresh_var();
            let result_ty = infer_match(
                ctx,
                env,
                facts,
                marks,
                stubs,
                non_generalizable,
                node_types,
                expr.id,
                scrutinee_ty.clone(),
                arms,
            );
            Ty::func(scrutinee_ty, result_ty)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn infer_stmt(
    ctx: &mut InferCtx,
    env: &mut TypeEnv,
    facts: &Facts,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    non_generalizable: &mut FxHashSet<TyVar>,
    node_types: &mut crate::NodeTypeMap,
    stmt: &Stmt,
) {
    match &stmt.kind {
        StmtKind::Let {
            name,
            annotation,
            value,
        } => {
            let value_ty = infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, value);
            if let Some(te) = annotation {
                let expected = convert_type_expr(te, &Default::default());
                if let Err(kind) = ctx.unify(expected.clone(), value_ty.clone()) {
                    marks.record(value.id, kind);
                }
            }
            let scheme = generalize(ctx, env, non_generalizable, value_ty);
            env.insert(name.clone(), scheme);
        }
        StmtKind::PatternLet { pattern, value } => {
            let value_ty = infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, value);
            let mut seen = FxHashSet::default();
            infer_pattern(
                ctx,
                env,
                facts.adt_env,
                marks,
                non_generalizable,
                &mut seen,
                pattern,
                value_ty,
            );
            if seen.is_empty() {
                marks.record_pattern(pattern.id, MarkKind::BindingRequired);
            }
        }
        StmtKind::Expr(e) => {
            infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, e);
        }
    }
}

/// Constructor application (§4.5): like an ordinary call, but saturation is
/// mandatory (a constructor left partially applied is a `NotFunction`, not a
/// curried value) and, when the constructor belongs to a registered carrier,
/// an argument that is itself one of that carrier's effect constructors
/// leaks its label into the result's state row ("infectious refinement").
#[allow(clippy::too_many_arguments)]
fn infer_constructor_app(
    ctx: &mut InferCtx,
    env: &mut TypeEnv,
    facts: &Facts,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    non_generalizable: &mut FxHashSet<TyVar>,
    node_types: &mut crate::NodeTypeMap,
    expr: &Expr,
    name: &str,
    args: &[Expr],
) -> Ty {
    let arg_tys: Vec<Ty> = args
        .iter()
        .map(|a| infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, a))
        .collect();
    let scheme = match env.lookup(name).cloned() {
        Some(scheme) => scheme,
        None => {
            marks.record(
                expr.id,
                MarkKind::FreeVariable {
                    name: name.to_string(),
                },
            );
            return unknown(Provenance::UnboundIdentifier(name.to_string()));
        }
    };
    let callee_ty = instantiate(ctx, &scheme);
    let result = infectious_call(ctx, marks, stubs, expr.id, callee_ty, arg_tys);

    let resolved = ctx.resolve(result.clone());
    if matches!(resolved, Ty::Func(_, _)) {
        marks.record(expr.id, MarkKind::NotFunction { ty: resolved });
    }

    let Some(owner) = facts.adt_env.ctor_owner.get(name) else {
        return result;
    };
    let Some(descriptor) = ctx.carriers.get(owner).cloned() else {
        return result;
    };
    let leaked: Vec<String> = args
        .iter()
        .filter_map(|a| match &a.kind {
            ExprKind::ConstructorApp { name: inner, .. } if descriptor.effect_ctors.contains(inner) => {
                Some(inner.clone())
            }
            _ => None,
        })
        .collect();
    if leaked.is_empty() {
        return result;
    }
    stubs.push(ConstraintStub::Source {
        node: expr.id,
        ty: result.clone(),
    });
    crate::carrier::add_labels(&descriptor.type_name, result, &leaked)
}

/// The infectious call-application algorithm (§4.4): collapse the callee
/// and every argument, unify the stripped values against the callee's
/// parameters (falling back to the un-stripped argument if that fails —
/// covers a function genuinely parameterized over a carrier type), then
/// re-wrap the result in the union of every collected per-domain state.
fn infectious_call(
    ctx: &mut InferCtx,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    node: weave_common::NodeId,
    callee_ty: Ty,
    arg_tys: Vec<Ty>,
) -> Ty {
    let mut state = CallCarrierState::new();
    let resolved_callee = ctx.resolve(callee_ty.clone());
    let stripped_callee = state.absorb(ctx, &resolved_callee);
    let stripped_args: Vec<(Ty, Ty)> = arg_tys
        .into_iter()
        .map(|a| {
            let resolved = ctx.resolve(a.clone());
            let stripped = state.absorb(ctx, &resolved);
            (stripped, a)
        })
        .collect();

    stubs.push(ConstraintStub::Call {
        node,
        callee: stripped_callee.clone(),
        args: stripped_args.iter().map(|(s, _)| s.clone()).collect(),
    });

    let mut current = ctx.resolve(stripped_callee);
    for (stripped_arg, original_arg) in stripped_args {
        match current {
            Ty::Func(from, to) => {
                if ctx.unify(stripped_arg.clone(), (*from).clone()).is_err() {
                    if let Err(kind) = ctx.unify(original_arg, *from) {
                        marks.record(node, kind);
                    }
                }
                current = ctx.resolve(*to);
            }
            Ty::Unknown(_) => {
                // Already marked at the point this became Unknown; don't
                // pile on a second mark per argument.
                current = unknown(Provenance::NotAFunction);
            }
            other => {
                marks.record(node, MarkKind::NotFunction { ty: other });
                current = unknown(Provenance::NotAFunction);
            }
        }
    }

    if state.is_empty() {
        current
    } else {
        state.rewrap(ctx, current)
    }
}

/// Project a field off a still-unconstrained target type (§4.5's "if
/// variable" case): find every record type declaring `field`; exactly one
/// candidate unifies the target with a fresh instance of it, more than one
/// is ambiguous, and none leaves the target untyped.
fn project_unresolved_var(
    ctx: &mut InferCtx,
    marks: &mut MarkRecorder,
    facts: &Facts,
    node: weave_common::NodeId,
    target: Ty,
    field: &str,
) -> Ty {
    let candidates = facts.adt_env.record_candidates_containing(field);
    match candidates.as_slice() {
        [name] => {
            let info = &facts.adt_env.types[name];
            let fresh_args: Vec<Ty> = info.type_params.iter().map(|_| ctx.fresh_var()).collect();
            let nominal = Ty::Constructor(name.clone(), fresh_args.clone());
            if let Err(kind) = ctx.unify(nominal, target) {
                marks.record(node, kind);
            }
            facts
                .adt_env
                .record_field_type(name, &fresh_args, field)
                .unwrap_or_else(|| unknown(Provenance::TypeMismatch))
        }
        [] => {
            marks.record(
                node,
                MarkKind::MissingField {
                    name: field.to_string(),
                    record_type: "<unresolved>".into(),
                },
            );
            unknown(Provenance::TypeMismatch)
        }
        many => {
            marks.record(
                node,
                MarkKind::AmbiguousRecord {
                    candidates: many.to_vec(),
                },
            );
            unknown(Provenance::TypeMismatch)
        }
    }
}

fn classify_op(op: &str) -> Option<&'static str> {
    if ARITHMETIC_OPS.contains(&op) {
        Some("arithmetic")
    } else if COMPARISON_OPS.contains(&op) {
        Some("comparison")
    } else if BOOLEAN_OPS.contains(&op) {
        Some("boolean")
    } else {
        None
    }
}

#[allow(clippy::too_many_arguments)]
fn infer_binary_op(
    ctx: &mut InferCtx,
    env: &TypeEnv,
    facts: &Facts,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    node: weave_common::NodeId,
    op: &str,
    lhs: Ty,
    rhs: Ty,
) -> Ty {
    if let Some(impl_name) = facts.operators.infix.get(op) {
        // A user-declared operator impl resolves through the same
        // infectious call path as any other function application.
        if let Some(scheme) = env.lookup(impl_name).cloned() {
            let callee_ty = instantiate(ctx, &scheme);
            return infectious_call(ctx, marks, stubs, node, callee_ty, vec![lhs, rhs]);
        }
    }

    // Built-in arithmetic/comparison/boolean operators are structural, but
    // a carrier-wrapped operand still has to infect the result the same
    // way a function call's arguments do.
    let mut state = CallCarrierState::new();
    let lhs_resolved = ctx.resolve(lhs);
    let rhs_resolved = ctx.resolve(rhs);
    let lhs = state.absorb(ctx, &lhs_resolved);
    let rhs = state.absorb(ctx, &rhs_resolved);

    let result = match classify_op(op) {
        Some("arithmetic") => {
            stubs.push(ConstraintStub::Numeric {
                node,
                ty: lhs.clone(),
            });
            if let Err(kind) = ctx.unify(lhs.clone(), rhs) {
                marks.record(node, kind);
            }
            lhs
        }
        Some("comparison") => {
            stubs.push(ConstraintStub::Numeric {
                node,
                ty: lhs.clone(),
            });
            if let Err(kind) = ctx.unify(lhs, rhs) {
                marks.record(node, kind);
            }
            Ty::Bool
        }
        Some("boolean") => {
            stubs.push(ConstraintStub::Boolean {
                node,
                ty: Ty::Bool,
            });
            if let Err(kind) = ctx.unify(Ty::Bool, lhs) {
                marks.record(node, kind);
            }
            if let Err(kind) = ctx.unify(Ty::Bool, rhs) {
                marks.record(node, kind);
            }
            Ty::Bool
        }
        _ => {
            marks.record(
                node,
                MarkKind::UnsupportedExpr {
                    description: format!("unknown operator `{}`", op),
                },
            );
            unknown(Provenance::UnsupportedExpr)
        }
    };

    if state.is_empty() {
        result
    } else {
        state.rewrap(ctx, result)
    }
}

#[allow(clippy::too_many_arguments)]
fn infer_unary_op(
    ctx: &mut InferCtx,
    env: &TypeEnv,
    facts: &Facts,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    node: weave_common::NodeId,
    op: &str,
    operand: Ty,
) -> Ty {
    if let Some(impl_name) = facts.operators.prefix.get(op) {
        if let Some(scheme) = env.lookup(impl_name).cloned() {
            let callee_ty = instantiate(ctx, &scheme);
            return infectious_call(ctx, marks, stubs, node, callee_ty, vec![operand]);
        }
    }

    let mut state = CallCarrierState::new();
    let resolved = ctx.resolve(operand);
    let operand = state.absorb(ctx, &resolved);

    let result = match op {
        "-" => {
            stubs.push(ConstraintStub::Numeric {
                node,
                ty: operand.clone(),
            });
            operand
        }
        "!" => {
            stubs.push(ConstraintStub::Boolean {
                node,
                ty: Ty::Bool,
            });
            if let Err(kind) = ctx.unify(Ty::Bool, operand) {
                marks.record(node, kind);
            }
            Ty::Bool
        }
        other => {
            marks.record(
                node,
                MarkKind::UnsupportedExpr {
                    description: format!("unknown operator `{}`", other),
                },
            );
            unknown(Provenance::UnsupportedExpr)
        }
    };

    if state.is_empty() {
        result
    } else {
        state.rewrap(ctx, result)
    }
}

#[allow(clippy::too_many_arguments)]
fn infer_record_literal(
    ctx: &mut InferCtx,
    env: &mut TypeEnv,
    facts: &Facts,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    non_generalizable: &mut FxHashSet<TyVar>,
    node_types: &mut crate::NodeTypeMap,
    expr: &Expr,
    fields: &[(String, Expr)],
) -> Ty {
    let mut seen = FxHashSet::default();
    let mut inferred = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        if !seen.insert(name.clone()) {
            marks.record(
                expr.id,
                MarkKind::DuplicateRecordField { name: name.clone() },
            );
            continue;
        }
        let ty = infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, value);
        inferred.push((name.clone(), ty));
    }

    let labels: Vec<String> = inferred.iter().map(|(n, _)| n.clone()).collect();
    let candidates = facts.adt_env.record_candidates(&labels);
    if candidates.len() > 1 {
        marks.record(
            expr.id,
            MarkKind::AmbiguousRecord {
                candidates: candidates.clone(),
            },
        );
        return Ty::Record(inferred);
    }
    let [name] = candidates.as_slice() else {
        return Ty::Record(inferred);
    };
    let info = &facts.adt_env.types[name];
    let crate::register::AdtKind::Record { fields: declared } = &info.kind else {
        return Ty::Record(inferred);
    };
    let fresh_args: Vec<Ty> = info.type_params.iter().map(|_| ctx.fresh_var()).collect();
    let field_tys: FxHashMap<String, Ty> = declared
        .iter()
        .map(|(fname, te)| {
            let params: FxHashMap<String, Ty> = info
                .type_params
                .iter()
                .cloned()
                .zip(fresh_args.iter().cloned())
                .collect();
            (fname.clone(), convert_type_expr(te, &params))
        })
        .collect();
    for (fname, value_ty) in &inferred {
        if let Some(expected) = field_tys.get(fname) {
            if let Err(kind) = ctx.unify(expected.clone(), value_ty.clone()) {
                marks.record(expr.id, kind);
            }
        }
    }
    Ty::Constructor(name.clone(), fresh_args)
}
