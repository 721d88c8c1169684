//! Pattern inference (§4.8).
//!
//! Each pattern form either narrows the scrutinee's type (literal,
//! constructor) or introduces a binding (`Variable`) into the arm's scope.
//! `pin: true` variables are the one form that does *not* introduce a
//! binding — they must match an already-bound occurrence, so they unify
//! against the existing binding's type instead of creating a new one.
//!
//! Grounded on the teacher's `infer_pattern`/`infer_constructor_pattern`
//! shape (walk the pattern alongside the expected type, recursing into
//! sub-patterns against the corresponding sub-type).

use rustc_hash::FxHashSet;

use weave_ast::{LiteralValue, Pattern, PatternKind};

use crate::env::{instantiate, TypeEnv};
use crate::marks::{MarkKind, MarkRecorder};
use crate::register::AdtEnv;
use crate::ty::{Scheme, Ty, TyVar};
use crate::unify::InferCtx;

pub fn literal_ty(lit: &LiteralValue) -> Ty {
    match lit {
        LiteralValue::Unit => Ty::Unit,
        LiteralValue::Bool(_) => Ty::Bool,
        LiteralValue::Int(_) => Ty::Int,
        LiteralValue::Str(_) => Ty::String,
    }
}

/// Peel `n` curried `Func` layers off `ty`, returning the parameter types
/// in order plus whatever remains as the result.
fn uncurry(ctx: &mut InferCtx, ty: Ty, n: usize) -> (Vec<Ty>, Ty) {
    let mut params = Vec::with_capacity(n);
    let mut current = ctx.resolve(ty);
    for _ in 0..n {
        match current {
            Ty::Func(from, to) => {
                params.push(*from);
                current = ctx.resolve(*to);
            }
            other => {
                // Arity exceeds what the scheme provides; stop peeling and
                // let the caller's arity check below report the mismatch.
                current = other;
                break;
            }
        }
    }
    (params, current)
}

/// Infer one pattern against an expected scrutinee type, binding any
/// variables it introduces into `env` and returning the (possibly further
/// resolved) scrutinee type.
#[allow(clippy::too_many_arguments)]
pub fn infer_pattern(
    ctx: &mut InferCtx,
    env: &mut TypeEnv,
    adt_env: &AdtEnv,
    marks: &mut MarkRecorder,
    non_generalizable: &mut FxHashSet<TyVar>,
    seen_names: &mut FxHashSet<String>,
    pattern: &Pattern,
    scrutinee: Ty,
) -> Ty {
    match &pattern.kind {
        PatternKind::Wildcard => scrutinee,

        PatternKind::Variable { name, pin } => {
            if *pin {
                match env.lookup(name).cloned() {
                    Some(scheme) => {
                        let ty = instantiate(ctx, &scheme);
                        if let Err(kind) = ctx.unify(ty, scrutinee.clone()) {
                            marks.record_pattern(pattern.id, kind);
                        }
                    }
                    None => marks.record_pattern(
                        pattern.id,
                        MarkKind::FreeVariable { name: name.clone() },
                    ),
                }
            } else {
                if !seen_names.insert(name.clone()) {
                    marks.record_pattern(
                        pattern.id,
                        MarkKind::DuplicateVariable { name: name.clone() },
                    );
                }
                env.insert(name.clone(), Scheme::mono(scrutinee.clone()));
                if let Ty::Var(v) = ctx.resolve(scrutinee.clone()) {
                    non_generalizable.insert(v);
                }
            }
            scrutinee
        }

        PatternKind::Literal(lit) => {
            let lit_ty = literal_ty(lit);
            if let Err(_kind) = ctx.unify(lit_ty.clone(), scrutinee.clone()) {
                marks.record_pattern(
                    pattern.id,
                    MarkKind::LiteralUnifyFailed {
                        expected: scrutinee.clone(),
                        found: lit_ty,
                    },
                );
            }
            scrutinee
        }

        PatternKind::Tuple(elems) => {
            let resolved = ctx.resolve(scrutinee.clone());
            let elem_tys: Vec<Ty> = match resolved {
                Ty::Tuple(tys) if tys.len() == elems.len() => tys,
                Ty::Tuple(tys) => {
                    marks.record_pattern(
                        pattern.id,
                        MarkKind::TupleArity {
                            expected: tys.len(),
                            found: elems.len(),
                        },
                    );
                    return scrutinee;
                }
                _ => {
                    let fresh: Vec<Ty> = elems.iter().map(|_| ctx.fresh_var()).collect();
                    if let Err(kind) = ctx.unify(Ty::Tuple(fresh.clone()), scrutinee.clone()) {
                        marks.record_pattern(pattern.id, kind);
                    }
                    fresh
                }
            };
            for (p, t) in elems.iter().zip(elem_tys) {
                infer_pattern(ctx, env, adt_env, marks, non_generalizable, seen_names, p, t);
            }
            scrutinee
        }

        PatternKind::Constructor { name, args } => {
            match env.lookup(name).cloned() {
                Some(scheme) => {
                    if let Some(owner) = adt_env.ctor_owner.get(name) {
                        if let Ty::Constructor(scrutinee_type, _) = ctx.resolve(scrutinee.clone())
                        {
                            if &scrutinee_type != owner {
                                marks.record_pattern(
                                    pattern.id,
                                    MarkKind::WrongConstructor {
                                        name: name.clone(),
                                        expected_type: scrutinee_type,
                                    },
                                );
                            }
                        }
                    }
                    let instantiated = instantiate(ctx, &scheme);
                    let (param_tys, result_ty) = uncurry(ctx, instantiated, args.len());
                    if param_tys.len() != args.len() {
                        marks.record_pattern(
                            pattern.id,
                            MarkKind::TupleArity {
                                expected: param_tys.len(),
                                found: args.len(),
                            },
                        );
                    }
                    if let Err(kind) = ctx.unify(result_ty, scrutinee.clone()) {
                        marks.record_pattern(pattern.id, kind);
                    }
                    for (p, t) in args.iter().zip(param_tys) {
                        infer_pattern(ctx, env, adt_env, marks, non_generalizable, seen_names, p, t);
                    }
                }
                None => marks.record_pattern(
                    pattern.id,
                    MarkKind::WrongConstructor {
                        name: name.clone(),
                        expected_type: "<unknown>".into(),
                    },
                ),
            }
            scrutinee
        }

        PatternKind::AllErrors => scrutinee,
    }
}
