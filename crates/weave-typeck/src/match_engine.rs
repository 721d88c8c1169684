//! Match-arm processing: pattern coverage, exhaustiveness, and the result
//! join across arms (§4.8-§4.9).
//!
//! Exhaustiveness here is a simplified constructor-coverage-set rule, not
//! full Maranget-style usefulness analysis: a match is exhaustive when
//! either some arm's top-level pattern is a catch-all (wildcard, plain
//! variable, or a bundle reference) or every constructor of the
//! scrutinee's nominal type is named by some arm. Nested patterns are not
//! consulted for exhaustiveness, only each arm's outermost pattern.
//!
//! A carrier's value and effect constructors are ordinary ADT
//! constructors of the same nominal type (`register.rs` registers them
//! into the same `AdtEnv` entry), so pattern inference treats them like
//! any other constructor pattern. Coverage classification over a carrier
//! scrutinee is still special-cased below, though: which error labels
//! were actually handled decides whether the row discharges, partially
//! discharges, or passes through untouched (see `check_coverage`).
//! `AllErrors` covers every effect constructor of a carrier at once, for
//! the case where individual error cases don't need to be told apart.
//!
//! The result type of a match over a *non-carrier* scrutinee is simply the
//! unification of its arms' body types. A carrier scrutinee goes through
//! one more step, effect-row discharge:
//! - every error case handled (explicit effect-constructor arms covering
//!   every label, or an `AllErrors`/wildcard arm) → the row collapses,
//!   the result is the bare joined value with no carrier wrapper.
//! - some but not all error cases handled → `ErrorRowPartialCoverage`,
//!   and the result is re-wrapped in the carrier with whatever labels (and
//!   open tail) were left untouched.
//! - no error case handled at all (only the value constructor, or a
//!   wildcard that never looked at the carrier) → the original state
//!   passes through unchanged, re-wrapped around the joined result.

use rustc_hash::FxHashSet;

use weave_ast::{ArmKind, Expr, ExprKind, MatchArm, Pattern, PatternKind};
use weave_common::NodeId;

use crate::env::{instantiate, TypeEnv};
use crate::expr::{infer_expr, Facts};
use crate::marks::{MarkKind, MarkRecorder};
use crate::register::AdtKind;
use crate::stubs::{ConstraintStub, StubRecorder};
use crate::ty::{Ty, TyVar};
use crate::unify::InferCtx;

enum Coverage {
    CatchAll,
    Ctor(String),
    BoolLit(bool),
    AllErrors,
    Other,
}

/// A branch's role relative to a carrier scrutinee (§4.7 step 3): `ok`
/// matches the carrier's value constructor, `err` one of its effect
/// constructors, `all_errors` the `_err` wildcard form, everything else
/// (including patterns over a non-carrier scrutinee) is `other`.
enum BranchKind {
    Ok,
    Err,
    AllErrors,
    Other,
}

fn classify_branch_kind(ctx: &mut InferCtx, scrutinee_ty: &Ty, pattern: &Pattern) -> BranchKind {
    if matches!(pattern.kind, PatternKind::AllErrors) {
        return BranchKind::AllErrors;
    }
    let PatternKind::Constructor { name, .. } = &pattern.kind else {
        return BranchKind::Other;
    };
    let resolved = ctx.resolve(scrutinee_ty.clone());
    let Ty::Constructor(type_name, _) = &resolved else {
        return BranchKind::Other;
    };
    let Some(descriptor) = ctx.carriers.get(type_name) else {
        return BranchKind::Other;
    };
    if *name == descriptor.value_ctor {
        BranchKind::Ok
    } else if descriptor.effect_ctors.contains(name) {
        BranchKind::Err
    } else {
        BranchKind::Other
    }
}

/// A block body with no trailing result expression — pure side effects.
fn is_statement_only_block(body: &Expr) -> bool {
    matches!(&body.kind, ExprKind::Block { result: None, .. })
}

#[allow(clippy::too_many_arguments)]
pub fn infer_match(
    ctx: &mut InferCtx,
    env: &mut TypeEnv,
    facts: &Facts,
    marks: &mut MarkRecorder,
    stubs: &mut StubRecorder,
    non_generalizable: &mut FxHashSet<TyVar>,
    node_types: &mut crate::NodeTypeMap,
    node: NodeId,
    scrutinee_ty: Ty,
    arms: &[MatchArm],
) -> Ty {
    let mut coverage = Vec::with_capacity(arms.len());
    let mut results: Vec<Ty> = Vec::with_capacity(arms.len());

    for arm in arms {
        match &arm.kind {
            ArmKind::Pattern { pattern, body } => {
                env.push_scope();
                let mut seen = FxHashSet::default();
                crate::pattern::infer_pattern(
                    ctx,
                    env,
                    facts.adt_env,
                    marks,
                    non_generalizable,
                    &mut seen,
                    pattern,
                    scrutinee_ty.clone(),
                );
                coverage.push(classify_coverage(ctx, marks, arm.id, &scrutinee_ty, pattern));
                let branch_kind = classify_branch_kind(ctx, &scrutinee_ty, pattern);
                let body_ty = infer_expr(ctx, env, facts, marks, stubs, non_generalizable, node_types, body);
                env.pop_scope();
                let excluded_from_join = matches!(branch_kind, BranchKind::Err | BranchKind::AllErrors)
                    && is_statement_only_block(body);
                if !excluded_from_join {
                    results.push(body_ty);
                }
            }
            ArmKind::BundleRef { name } => {
                match env.lookup(name).cloned() {
                    Some(scheme) => {
                        let bundle_ty = instantiate(ctx, &scheme);
                        match ctx.resolve(bundle_ty) {
                            Ty::Func(from, to) => {
                                if let Err(kind) = ctx.unify(scrutinee_ty.clone(), *from) {
                                    marks.record(arm.id, kind);
                                }
                                results.push(*to);
                            }
                            other => {
                                marks.record(
                                    arm.id,
                                    MarkKind::UnsupportedExpr {
                                        description: format!(
                                            "bundle `{}` does not resolve to a match function, found `{}`",
                                            name, other
                                        ),
                                    },
                                );
                                results.push(other);
                            }
                        }
                    }
                    None => {
                        marks.record(
                            arm.id,
                            MarkKind::FreeVariable {
                                name: name.clone(),
                            },
                        );
                        results.push(crate::unify::unknown(crate::ty::Provenance::UnboundIdentifier(
                            name.clone(),
                        )));
                    }
                }
                // A bundle's own exhaustiveness was already checked when it
                // was inferred as a `MatchBundleLiteral`; referencing it
                // here counts as covering whatever it covers.
                coverage.push(Coverage::CatchAll);
            }
        }
    }

    let discharge = check_coverage(ctx, facts, marks, node, &scrutinee_ty, &coverage);

    let joined = join_results(ctx, marks, node, results.clone());
    stubs.push(ConstraintStub::BranchJoin { node, arms: results });

    let result = match discharge {
        Discharge::Plain | Discharge::CarrierCollapse => joined,
        Discharge::CarrierPassthrough(type_name, state) | Discharge::CarrierPartial(type_name, state) => {
            crate::carrier::join(&type_name, joined, state)
        }
    };

    // Variables the join introduced that the scrutinee never constrained
    // leaked in through branch unification, not from an enclosing
    // annotation — premature generalization over them is unsound.
    let mut scrutinee_vars = Vec::new();
    crate::ty::free_tyvars(&ctx.resolve(scrutinee_ty), &mut scrutinee_vars);
    let scrutinee_vars: FxHashSet<TyVar> = scrutinee_vars.into_iter().collect();
    let mut result_vars = Vec::new();
    crate::ty::free_tyvars(&ctx.resolve(result.clone()), &mut result_vars);
    for v in result_vars {
        if !scrutinee_vars.contains(&v) {
            non_generalizable.insert(v);
        }
    }

    result
}

fn classify_coverage(
    ctx: &mut InferCtx,
    marks: &mut MarkRecorder,
    arm_node: NodeId,
    scrutinee_ty: &Ty,
    pattern: &weave_ast::Pattern,
) -> Coverage {
    use weave_ast::{LiteralValue, PatternKind};
    match &pattern.kind {
        PatternKind::Wildcard => Coverage::CatchAll,
        PatternKind::Variable { pin: false, .. } => Coverage::CatchAll,
        PatternKind::Variable { pin: true, .. } => Coverage::Other,
        PatternKind::Literal(LiteralValue::Bool(b)) => Coverage::BoolLit(*b),
        PatternKind::Constructor { name, .. } => Coverage::Ctor(name.clone()),
        PatternKind::AllErrors => {
            let resolved = ctx.resolve(scrutinee_ty.clone());
            let is_carrier = matches!(&resolved, Ty::Constructor(name, _) if ctx.carriers.is_carrier(name));
            if !is_carrier {
                marks.record(arm_node, MarkKind::AllErrorsOutsideResult);
            }
            Coverage::AllErrors
        }
        _ => Coverage::Other,
    }
}

enum Discharge {
    /// Not a carrier scrutinee; nothing to re-wrap.
    Plain,
    /// Every error case was handled (explicitly or via `AllErrors`/a
    /// catch-all); the result is the bare joined value.
    CarrierCollapse,
    /// No error case was handled at all; the original state threads
    /// through unchanged around the joined result.
    CarrierPassthrough(String, Ty),
    /// Some but not all error cases were handled; the leftover row
    /// threads through around the joined result.
    CarrierPartial(String, Ty),
}

fn check_coverage(
    ctx: &mut InferCtx,
    facts: &Facts,
    marks: &mut MarkRecorder,
    node: NodeId,
    scrutinee_ty: &Ty,
    coverage: &[Coverage],
) -> Discharge {
    let has_catch_all = coverage.iter().any(|c| matches!(c, Coverage::CatchAll));
    let resolved = ctx.resolve(scrutinee_ty.clone());

    match &resolved {
        Ty::Bool => {
            if has_catch_all {
                return Discharge::Plain;
            }
            let has_true = coverage.iter().any(|c| matches!(c, Coverage::BoolLit(true)));
            let has_false = coverage.iter().any(|c| matches!(c, Coverage::BoolLit(false)));
            let mut missing = Vec::new();
            if !has_true {
                missing.push("true".to_string());
            }
            if !has_false {
                missing.push("false".to_string());
            }
            if !missing.is_empty() {
                marks.record(
                    node,
                    MarkKind::NonExhaustive {
                        scrutinee_type: "Bool".to_string(),
                        missing,
                    },
                );
            }
            Discharge::Plain
        }

        Ty::Constructor(name, args) if ctx.carriers.is_carrier(name) && args.len() == 2 => {
            let type_name = name.clone();
            let state = ctx.resolve(args[1].clone());
            let (cases, tail) = match state {
                Ty::EffectRow { cases, tail } => (cases, tail),
                _ => (Default::default(), None),
            };

            let descriptor = ctx.carriers.get(&type_name).cloned();
            let value_ctor = descriptor.map(|d| d.value_ctor).unwrap_or_default();
            let value_covered = has_catch_all
                || coverage
                    .iter()
                    .any(|c| matches!(c, Coverage::Ctor(n) if *n == value_ctor));

            let has_all_errors = coverage.iter().any(|c| matches!(c, Coverage::AllErrors));
            let covered_labels: FxHashSet<&str> = coverage
                .iter()
                .filter_map(|c| match c {
                    Coverage::Ctor(n) if *n != value_ctor => Some(n.as_str()),
                    _ => None,
                })
                .collect();
            let handled_any_effect = has_all_errors || has_catch_all || !covered_labels.is_empty();

            if !value_covered {
                let mut missing: Vec<String> = vec![value_ctor];
                missing.extend(cases.keys().filter(|l| !covered_labels.contains(l.as_str())).cloned());
                marks.record(
                    node,
                    MarkKind::NonExhaustive {
                        scrutinee_type: type_name,
                        missing,
                    },
                );
                return Discharge::Plain;
            }

            if !handled_any_effect {
                return Discharge::CarrierPassthrough(type_name, Ty::EffectRow { cases, tail });
            }

            if has_all_errors || has_catch_all {
                return Discharge::CarrierCollapse;
            }

            let missing: Vec<String> = cases
                .keys()
                .filter(|l| !covered_labels.contains(l.as_str()))
                .cloned()
                .collect();
            if missing.is_empty() && tail.is_none() {
                return Discharge::CarrierCollapse;
            }

            marks.record(node, MarkKind::ErrorRowPartialCoverage { missing: missing.clone() });
            let leftover_cases = cases
                .into_iter()
                .filter(|(label, _)| missing.contains(label))
                .collect();
            Discharge::CarrierPartial(type_name, Ty::EffectRow { cases: leftover_cases, tail })
        }

        Ty::Constructor(name, _) => {
            if has_catch_all {
                return Discharge::Plain;
            }
            let Some(info) = facts.adt_env.types.get(name) else {
                return Discharge::Plain;
            };
            let AdtKind::Adt { constructors } = &info.kind else {
                return Discharge::Plain;
            };

            let covered: FxHashSet<&str> = coverage
                .iter()
                .filter_map(|c| match c {
                    Coverage::Ctor(n) => Some(n.as_str()),
                    _ => None,
                })
                .collect();

            let missing: Vec<String> = constructors
                .iter()
                .map(|c| c.name.clone())
                .filter(|n| !covered.contains(n.as_str()))
                .collect();

            if !missing.is_empty() {
                marks.record(
                    node,
                    MarkKind::NonExhaustive {
                        scrutinee_type: name.clone(),
                        missing,
                    },
                );
            }
            Discharge::Plain
        }
        _ => Discharge::Plain,
    }
}

fn join_results(ctx: &mut InferCtx, marks: &mut MarkRecorder, node: NodeId, results: Vec<Ty>) -> Ty {
    let mut iter = results.into_iter();
    let Some(first) = iter.next() else {
        return Ty::Unit;
    };
    let mut acc = first;
    for next in iter {
        if let Err(_kind) = ctx.unify(acc.clone(), next.clone()) {
            marks.record(
                node,
                MarkKind::TypeMismatch {
                    expected: acc.clone(),
                    found: next,
                },
            );
        } else {
            acc = ctx.resolve(acc);
        }
    }
    acc
}
