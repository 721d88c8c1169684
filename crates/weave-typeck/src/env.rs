//! Typing environment, let-generalization, and scheme instantiation (§4.2).
//!
//! Grounded on the scope-stack shape of the teacher's `TypeEnv`, with the
//! `all_bindings` accumulator §3 asks for layered on top: every `insert`
//! writes into both the innermost scope (for shadowing-aware lookup) and a
//! flat map that survives scope pops (for the final `InferResult`).
//!
//! Generalization here follows §4.2 literally — free variables of the
//! body, minus the environment's free variables, minus an explicit
//! non-generalizable set — rather than the teacher's level-counter
//! shortcut, since the non-generalizable set is also what match-arm
//! joining and mutual recursion threading need to mutate directly.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ty::{free_tyvars, Scheme, Ty, TyVar};
use crate::unify::InferCtx;

#[derive(Default, Debug)]
pub struct TypeEnv {
    scopes: Vec<FxHashMap<String, Scheme>>,
    pub all_bindings: FxHashMap<String, Scheme>,
}

impl TypeEnv {
    pub fn new() -> Self {
        TypeEnv {
            scopes: vec![FxHashMap::default()],
            all_bindings: FxHashMap::default(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the base scope");
        self.scopes.pop();
    }

    pub fn insert(&mut self, name: impl Into<String>, scheme: Scheme) {
        let name = name.into();
        self.scopes
            .last_mut()
            .expect("at least one scope always present")
            .insert(name.clone(), scheme.clone());
        self.all_bindings.insert(name, scheme);
    }

    /// Last-write-wins lookup through the visible scope stack, innermost
    /// scope first.
    pub fn lookup(&self, name: &str) -> Option<&Scheme> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Free variables of every binding currently visible (not shadowed),
    /// used to exclude a type variable from generalization because some
    /// enclosing binding still mentions it monomorphically.
    pub fn free_vars(&self) -> FxHashSet<TyVar> {
        let mut out = FxHashSet::default();
        for scope in &self.scopes {
            for scheme in scope.values() {
                out.extend(scheme_free_vars(scheme));
            }
        }
        out
    }
}

fn scheme_free_vars(scheme: &Scheme) -> FxHashSet<TyVar> {
    let mut vars = Vec::new();
    free_tyvars(&scheme.ty, &mut vars);
    vars.into_iter()
        .filter(|v| !scheme.vars.contains(v))
        .collect()
}

/// Generalize `ty` into a scheme, quantifying every free variable except
/// those still mentioned by the surrounding environment or explicitly
/// barred by `non_generalizable` (e.g. the fresh variables standing in for
/// a mutually-recursive group's own signatures while their bodies are
/// still being inferred).
pub fn generalize(
    ctx: &mut InferCtx,
    env: &TypeEnv,
    non_generalizable: &FxHashSet<TyVar>,
    ty: Ty,
) -> Scheme {
    let resolved = ctx.resolve(ty);
    let mut free = Vec::new();
    free_tyvars(&resolved, &mut free);

    let env_free = env.free_vars();
    let mut seen = FxHashSet::default();
    let vars: Vec<TyVar> = free
        .into_iter()
        .filter(|v| seen.insert(*v))
        .filter(|v| !env_free.contains(v) && !non_generalizable.contains(v))
        .collect();

    Scheme {
        vars,
        ty: resolved,
    }
}

/// Instantiate a scheme with fresh type variables, renaming every
/// quantified variable wherever it appears — including inside an effect
/// row's tail slot, which holds a bare `TyVar` rather than a `Ty::Var`.
pub fn instantiate(ctx: &mut InferCtx, scheme: &Scheme) -> Ty {
    if scheme.vars.is_empty() {
        return scheme.ty.clone();
    }
    let subst: FxHashMap<TyVar, TyVar> = scheme
        .vars
        .iter()
        .map(|v| (*v, ctx.fresh_tyvar()))
        .collect();
    rename_vars(&scheme.ty, &subst)
}

fn rename_vars(ty: &Ty, subst: &FxHashMap<TyVar, TyVar>) -> Ty {
    match ty {
        Ty::Var(v) => Ty::Var(*subst.get(v).unwrap_or(v)),
        Ty::Unit | Ty::Bool | Ty::Int | Ty::String | Ty::Unknown(_) => ty.clone(),
        Ty::Func(from, to) => Ty::func(rename_vars(from, subst), rename_vars(to, subst)),
        Ty::Tuple(elems) => Ty::Tuple(elems.iter().map(|e| rename_vars(e, subst)).collect()),
        Ty::Constructor(name, args) => Ty::Constructor(
            name.clone(),
            args.iter().map(|a| rename_vars(a, subst)).collect(),
        ),
        Ty::Record(fields) => Ty::Record(
            fields
                .iter()
                .map(|(name, t)| (name.clone(), rename_vars(t, subst)))
                .collect(),
        ),
        Ty::EffectRow { cases, tail } => Ty::EffectRow {
            cases: cases
                .iter()
                .map(|(label, payload)| {
                    (
                        label.clone(),
                        payload.as_ref().map(|p| Box::new(rename_vars(p, subst))),
                    )
                })
                .collect(),
            tail: tail.map(|v| *subst.get(&v).unwrap_or(&v)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_respects_shadowing() {
        let mut env = TypeEnv::new();
        env.insert("x", Scheme::mono(Ty::Int));
        env.push_scope();
        env.insert("x", Scheme::mono(Ty::Bool));
        assert_eq!(env.lookup("x").unwrap().ty, Ty::Bool);
        env.pop_scope();
        assert_eq!(env.lookup("x").unwrap().ty, Ty::Int);
    }

    #[test]
    fn all_bindings_survives_scope_pop() {
        let mut env = TypeEnv::new();
        env.push_scope();
        env.insert("local", Scheme::mono(Ty::String));
        env.pop_scope();
        assert!(env.lookup("local").is_none());
        assert!(env.all_bindings.contains_key("local"));
    }

    #[test]
    fn generalize_quantifies_free_var_not_in_env() {
        let mut ctx = InferCtx::new();
        let env = TypeEnv::new();
        let a = ctx.fresh_var();
        let ty = Ty::func(a.clone(), a);
        let scheme = generalize(&mut ctx, &env, &FxHashSet::default(), ty);
        assert_eq!(scheme.vars.len(), 1);
    }

    #[test]
    fn generalize_excludes_vars_still_free_in_env() {
        let mut ctx = InferCtx::new();
        let mut env = TypeEnv::new();
        let a = ctx.fresh_var();
        env.insert("enclosing", Scheme::mono(a.clone()));
        let scheme = generalize(&mut ctx, &env, &FxHashSet::default(), a);
        assert!(scheme.vars.is_empty());
    }

    #[test]
    fn generalize_excludes_non_generalizable_vars() {
        let mut ctx = InferCtx::new();
        let env = TypeEnv::new();
        let a = match ctx.fresh_var() {
            Ty::Var(v) => v,
            _ => unreachable!(),
        };
        let mut blocked = FxHashSet::default();
        blocked.insert(a);
        let scheme = generalize(&mut ctx, &env, &blocked, Ty::Var(a));
        assert!(scheme.vars.is_empty());
    }

    #[test]
    fn instantiate_produces_fresh_vars_each_time() {
        let mut ctx = InferCtx::new();
        let env = TypeEnv::new();
        let a = ctx.fresh_var();
        let ty = Ty::func(a.clone(), a);
        let scheme = generalize(&mut ctx, &env, &FxHashSet::default(), ty);
        let inst1 = instantiate(&mut ctx, &scheme);
        let inst2 = instantiate(&mut ctx, &scheme);
        assert_ne!(inst1, inst2);
    }
}
