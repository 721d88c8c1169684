//! Declaration registration (§4 "Declaration registration" in §2's table).
//!
//! Three passes over a program's top-level declarations, run in this
//! order because later passes need the prior ones fully populated:
//!
//! 1. **Carriers** — `infectious` declarations and `type ... infectious`
//!    combined syntax both canonicalize into one `CarrierDescriptor`
//!    registration (§9's design note on the legacy/combined split).
//! 2. **Type names** — every `type` declaration's shape (ADT variants,
//!    record fields, or alias) goes into `AdtEnv` before any constructor
//!    or field type is resolved, so mutually-referencing type declarations
//!    see each other.
//! 3. **Constructors** — each ADT variant (or a carrier's value/effect
//!    constructors) becomes a scheme bound in the environment; infix/prefix
//!    operator declarations bind an operator symbol to the function name
//!    that implements it.
//!
//! Grounded on the teacher's `register_sum_type_def`/`register_struct_def`/
//! `register_variant_constructors` for the pass ordering and per-variant
//! scheme construction.

use rustc_hash::{FxHashMap, FxHashSet};

use weave_ast::{CtorDecl, Decl, Program, TypeDecl, TypeDeclKind, TypeExpr};

use crate::carrier::{CarrierDescriptor, CarrierRegistry};
use crate::env::TypeEnv;
use crate::error::ContractError;
use crate::rows::RowCases;
use crate::ty::{Provenance, Ty};
use crate::unify::InferCtx;

#[derive(Clone, Debug)]
pub struct CtorInfo {
    pub name: String,
    pub field_types: Vec<TypeExpr>,
}

#[derive(Clone, Debug)]
pub enum AdtKind {
    Adt { constructors: Vec<CtorInfo> },
    Record { fields: Vec<(String, TypeExpr)> },
    Alias(TypeExpr),
}

#[derive(Clone, Debug)]
pub struct AdtInfo {
    pub type_params: Vec<String>,
    pub kind: AdtKind,
}

/// Registry of nominal type shapes, plus a reverse index from constructor
/// name to owning type name (used by pattern inference to validate that a
/// constructor pattern names a variant of the scrutinee's actual type).
#[derive(Default, Debug)]
pub struct AdtEnv {
    pub types: FxHashMap<String, AdtInfo>,
    pub ctor_owner: FxHashMap<String, String>,
}

impl AdtEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// All record types whose field set is a superset of `fields` (by
    /// label), used to resolve a record literal's nominal type — more than
    /// one candidate means the literal is ambiguous. Fields the candidate
    /// declares beyond `fields` become `Unknown` at the call site.
    pub fn record_candidates(&self, fields: &[String]) -> Vec<String> {
        let wanted: FxHashSet<&String> = fields.iter().collect();
        self.types
            .iter()
            .filter_map(|(name, info)| match &info.kind {
                AdtKind::Record { fields: rf } => {
                    let have: FxHashSet<&String> = rf.iter().map(|(n, _)| n).collect();
                    wanted.is_subset(&have).then(|| name.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// All record types declaring `field`, used to resolve a projection
    /// whose target is still an unconstrained type variable.
    pub fn record_candidates_containing(&self, field: &str) -> Vec<String> {
        self.types
            .iter()
            .filter_map(|(name, info)| match &info.kind {
                AdtKind::Record { fields: rf } => {
                    rf.iter().any(|(n, _)| n == field).then(|| name.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// The declared type of `field` on the record type `type_name`,
    /// substituting `type_args` for that type's own parameters in order.
    pub fn record_field_type(&self, type_name: &str, type_args: &[Ty], field: &str) -> Option<Ty> {
        let info = self.types.get(type_name)?;
        let AdtKind::Record { fields } = &info.kind else {
            return None;
        };
        let params: FxHashMap<String, Ty> = info
            .type_params
            .iter()
            .cloned()
            .zip(type_args.iter().cloned())
            .collect();
        fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, te)| convert_type_expr(te, &params))
    }
}

#[derive(Default)]
pub struct OperatorTable {
    pub infix: FxHashMap<String, String>,
    pub prefix: FxHashMap<String, String>,
}

/// Convert a surface `TypeExpr` into a `Ty`, substituting the declaring
/// type's own parameters (already bound to fresh variables) for `Var`
/// references and resolving `Named` references against already-registered
/// nominal types.
pub fn convert_type_expr(te: &TypeExpr, params: &FxHashMap<String, Ty>) -> Ty {
    match te {
        TypeExpr::Unit => Ty::Unit,
        TypeExpr::Bool => Ty::Bool,
        TypeExpr::Int => Ty::Int,
        TypeExpr::String => Ty::String,
        TypeExpr::Func(from, to) => Ty::func(
            convert_type_expr(from, params),
            convert_type_expr(to, params),
        ),
        TypeExpr::Tuple(elems) => {
            Ty::Tuple(elems.iter().map(|e| convert_type_expr(e, params)).collect())
        }
        TypeExpr::Var(name) => params
            .get(name)
            .cloned()
            .unwrap_or(Ty::Unknown(Provenance::UnsupportedExpr)),
        TypeExpr::Named(name, args) => Ty::Constructor(
            name.clone(),
            args.iter().map(|a| convert_type_expr(a, params)).collect(),
        ),
    }
}

/// Pass 1: register every carrier, from either syntax.
pub fn register_carriers(
    program: &Program,
    registry: &mut CarrierRegistry,
) -> Result<(), ContractError> {
    for decl in &program.decls {
        let descriptor = match decl {
            Decl::Infectious(d) => Some(CarrierDescriptor {
                type_name: d.type_name.clone(),
                domain: d.domain.clone(),
                value_ctor: d.value_ctor.clone(),
                effect_ctors: d.effect_ctors.clone(),
            }),
            Decl::Type(d) => d.carrier.as_ref().map(|c| CarrierDescriptor {
                type_name: d.name.clone(),
                domain: c.domain.clone(),
                value_ctor: c.value_ctor.clone(),
                effect_ctors: c.effect_ctors.clone(),
            }),
            _ => None,
        };
        if let Some(descriptor) = descriptor {
            registry
                .register(descriptor)
                .map_err(|domain| ContractError::DuplicateCarrierDomain { domain })?;
        }
    }
    Ok(())
}

/// Pass 2: register every type declaration's shape.
pub fn register_type_names(program: &Program, adt_env: &mut AdtEnv) -> Result<(), ContractError> {
    for decl in &program.decls {
        if let Decl::Type(TypeDecl {
            name,
            type_params,
            kind,
            ..
        }) = decl
        {
            if adt_env.types.contains_key(name) {
                return Err(ContractError::DuplicateTypeName { name: name.clone() });
            }
            let kind = match kind {
                TypeDeclKind::Adt { constructors } => AdtKind::Adt {
                    constructors: constructors
                        .iter()
                        .map(|CtorDecl { name, field_types }| CtorInfo {
                            name: name.clone(),
                            field_types: field_types.clone(),
                        })
                        .collect(),
                },
                TypeDeclKind::Record { fields } => AdtKind::Record {
                    fields: fields.clone(),
                },
                TypeDeclKind::Alias(target) => AdtKind::Alias(target.clone()),
            };
            if let AdtKind::Adt { constructors } = &kind {
                for ctor in constructors {
                    adt_env
                        .ctor_owner
                        .insert(ctor.name.clone(), name.clone());
                }
            }
            adt_env.types.insert(
                name.clone(),
                AdtInfo {
                    type_params: type_params.clone(),
                    kind,
                },
            );
        }
    }
    Ok(())
}

/// Pass 3: bind every constructor's scheme and every infix/prefix operator.
pub fn register_constructors(
    ctx: &mut InferCtx,
    program: &Program,
    adt_env: &AdtEnv,
    env: &mut TypeEnv,
    operators: &mut OperatorTable,
) {
    for decl in &program.decls {
        match decl {
            Decl::Type(TypeDecl { name, .. }) => {
                register_type_constructors(ctx, name, adt_env, env);
            }
            Decl::Infix(op) => {
                operators.infix.insert(op.symbol.clone(), op.impl_name.clone());
            }
            Decl::Prefix(op) => {
                operators.prefix.insert(op.symbol.clone(), op.impl_name.clone());
            }
            _ => {}
        }
    }
}

fn register_type_constructors(
    ctx: &mut InferCtx,
    type_name: &str,
    adt_env: &AdtEnv,
    env: &mut TypeEnv,
) {
    let Some(info) = adt_env.types.get(type_name) else {
        return;
    };
    let AdtKind::Adt { constructors } = &info.kind else {
        return;
    };

    let carrier = ctx.carriers.get(type_name).cloned();

    for ctor in constructors {
        let param_vars: FxHashMap<String, Ty> = info
            .type_params
            .iter()
            .map(|p| (p.clone(), ctx.fresh_var()))
            .collect();
        let field_tys: Vec<Ty> = ctor
            .field_types
            .iter()
            .map(|te| convert_type_expr(te, &param_vars))
            .collect();

        let ctor_ty = if let Some(descriptor) = &carrier {
            if ctor.name == descriptor.value_ctor {
                let value_ty = field_tys.first().cloned().unwrap_or(Ty::Unit);
                let state = Ty::closed_row();
                Ty::curried(field_tys, crate::carrier::join(type_name, value_ty, state))
            } else if descriptor.effect_ctors.contains(&ctor.name) {
                let value_var = ctx.fresh_var();
                let payload = field_tys.first().cloned().map(Box::new);
                let mut cases = RowCases::default();
                cases.insert(ctor.name.clone(), payload);
                let tail = ctx.fresh_tyvar();
                let row = Ty::EffectRow {
                    cases,
                    tail: Some(tail),
                };
                Ty::curried(
                    field_tys,
                    crate::carrier::join(type_name, value_var, row),
                )
            } else {
                let result = Ty::Constructor(
                    type_name.to_string(),
                    info.type_params
                        .iter()
                        .map(|p| param_vars[p].clone())
                        .collect(),
                );
                Ty::curried(field_tys, result)
            }
        } else {
            let result = Ty::Constructor(
                type_name.to_string(),
                info.type_params
                    .iter()
                    .map(|p| param_vars[p].clone())
                    .collect(),
            );
            Ty::curried(field_tys, result)
        };

        let scheme = crate::env::generalize(ctx, env, &Default::default(), ctor_ty);
        env.insert(ctor.name.clone(), scheme);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_ast::InfectiousDecl;
    use weave_common::NodeId;

    fn id(n: u32) -> NodeId {
        NodeId::new(n)
    }

    fn sample_program() -> Program {
        Program {
            decls: vec![
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
                                name: "IErr".into(),
                                field_types: vec![TypeExpr::String],
                            },
                        ],
                    },
                    carrier: None,
                }),
                Decl::Infectious(InfectiousDecl {
                    id: id(1),
                    domain: "io".into(),
                    type_name: "IResult".into(),
                    value_ctor: "IOk".into(),
                    effect_ctors: vec!["IErr".into()],
                }),
            ],
        }
    }

    #[test]
    fn full_registration_pipeline_binds_constructors() {
        let program = sample_program();
        let mut ctx = InferCtx::new();
        register_carriers(&program, &mut ctx.carriers).unwrap();
        let mut adt_env = AdtEnv::new();
        register_type_names(&program, &mut adt_env).unwrap();
        let mut env = TypeEnv::new();
        let mut ops = OperatorTable::default();
        register_constructors(&mut ctx, &program, &adt_env, &mut env, &mut ops);

        assert!(env.lookup("IOk").is_some());
        assert!(env.lookup("IErr").is_some());
        assert!(ctx.carriers.is_carrier("IResult"));
    }

    #[test]
    fn duplicate_type_name_is_rejected() {
        let mut program = sample_program();
        let dup = program.decls[0].clone();
        program.decls.push(match dup {
            Decl::Type(t) => Decl::Type(t),
            other => other,
        });
        let mut adt_env = AdtEnv::new();
        let err = register_type_names(&program, &mut adt_env);
        assert!(err.is_err());
    }

    #[test]
    fn record_candidates_finds_exact_field_match() {
        let mut adt_env = AdtEnv::new();
        adt_env.types.insert(
            "Point".into(),
            AdtInfo {
                type_params: vec![],
                kind: AdtKind::Record {
                    fields: vec![("x".into(), TypeExpr::Int), ("y".into(), TypeExpr::Int)],
                },
            },
        );
        let candidates = adt_env.record_candidates(&["y".into(), "x".into()]);
        assert_eq!(candidates, vec!["Point".to_string()]);
    }
}
