//! The infectious carrier abstraction (§4.4).
//!
//! A carrier is a two-slot nominal type `C<V, S>` (e.g. `IResult<V, [IErr |
//! ...]>`) whose effect state `S` auto-propagates through ordinary function
//! application: calling a function with a carrier-typed argument "infects"
//! the call so its result also carries the union of every argument's
//! effect state, without the callee ever being written carrier-aware.
//!
//! Registered per `InferCtx` (§9's design note: a process-wide registry is
//! a porting hazard), keyed by the carrier's nominal type name.

use rustc_hash::FxHashMap;

use crate::rows;
use crate::ty::Ty;
use crate::unify::InferCtx;

/// Describes one carrier type registered by a `type ... infectious ...`
/// (or standalone `infectious`) declaration.
#[derive(Clone, Debug)]
pub struct CarrierDescriptor {
    /// The nominal type name, e.g. `"IResult"`.
    pub type_name: String,
    /// The domain label this carrier's effect state is tracked under
    /// (distinct carriers may share a domain only if they're the same
    /// registration — duplicates across different types are a hard error,
    /// see `ContractError::DuplicateCarrierDomain`).
    pub domain: String,
    /// Constructor name for the "value" case, e.g. `"IOk"`.
    pub value_ctor: String,
    /// Constructor names for the carrier's effect cases, e.g. `["IErr"]`.
    pub effect_ctors: Vec<String>,
}

/// A context-owned table of carrier descriptors, looked up by nominal type
/// name when a constructor application or call site needs to know whether
/// a type participates in infectious propagation.
#[derive(Default)]
pub struct CarrierRegistry {
    by_type: FxHashMap<String, CarrierDescriptor>,
    by_domain: FxHashMap<String, String>,
}

impl CarrierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a carrier, returning the domain name if it collides with
    /// an already-registered domain bound to a different type.
    pub fn register(&mut self, descriptor: CarrierDescriptor) -> Result<(), String> {
        if let Some(existing_type) = self.by_domain.get(&descriptor.domain) {
            if existing_type != &descriptor.type_name {
                return Err(descriptor.domain.clone());
            }
        }
        self.by_domain
            .insert(descriptor.domain.clone(), descriptor.type_name.clone());
        self.by_type.insert(descriptor.type_name.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<&CarrierDescriptor> {
        self.by_type.get(type_name)
    }

    pub fn is_carrier(&self, type_name: &str) -> bool {
        self.by_type.contains_key(type_name)
    }
}

/// The result of splitting a carrier-typed value: its underlying value
/// type and its effect-state row.
pub struct Split {
    pub value: Ty,
    pub state: Ty,
}

/// Split `ty` into `(value, state)` if it is a known carrier applied to
/// exactly two type arguments; otherwise treat `ty` as a plain value with
/// a fully discharged (empty, closed) effect state.
pub fn split(registry: &CarrierRegistry, ty: &Ty) -> Split {
    if let Ty::Constructor(name, args) = ty {
        if registry.is_carrier(name) && args.len() == 2 {
            return Split {
                value: args[0].clone(),
                state: args[1].clone(),
            };
        }
    }
    Split {
        value: ty.clone(),
        state: rows::empty(),
    }
}

/// Join a value type back into a carrier of `type_name`, attaching `state`
/// as its effect row. `ensure_row` callers should already have guaranteed
/// `state` is an `EffectRow`.
pub fn join(type_name: &str, value: Ty, state: Ty) -> Ty {
    Ty::Constructor(type_name.to_string(), vec![value, state])
}

/// Add bare (payload-less) labels to a carrier's effect row in place (§4.5's
/// "infectious refinement" — a constructor whose argument names one of its
/// own carrier's effect constructors leaks that label into the result's
/// state even though the argument itself never went through `absorb`). A
/// label already present keeps whatever payload it already carries. `ty` is
/// returned unchanged if it isn't a two-argument constructor of `type_name`.
pub fn add_labels(type_name: &str, ty: Ty, labels: &[String]) -> Ty {
    let Ty::Constructor(name, args) = &ty else {
        return ty;
    };
    if name != type_name || args.len() != 2 {
        return ty;
    }
    let value = args[0].clone();
    let Ty::EffectRow { mut cases, tail } = args[1].clone() else {
        return ty;
    };
    for label in labels {
        cases.entry(label.clone()).or_insert(None);
    }
    join(type_name, value, Ty::EffectRow { cases, tail })
}

/// Union two effect states, used when re-threading a carrier after an
/// infectious application collects state from multiple arguments.
pub fn union_states(ctx: &mut InferCtx, a: &Ty, b: &Ty) -> Ty {
    rows::union(ctx, a, b)
}

/// Canonicalize nested carriers of the same type into one layer: split,
/// recursively collapse the value, rejoin, merging states when the
/// recollapsed value is itself the same carrier (idempotent — collapsing
/// an already-canonical type is a no-op).
pub fn collapse(ctx: &mut InferCtx, ty: &Ty) -> Ty {
    let Ty::Constructor(type_name, args) = ty else {
        return ty.clone();
    };
    if !ctx.carriers.is_carrier(type_name) || args.len() != 2 {
        return ty.clone();
    }
    let type_name = type_name.clone();

    let value = collapse(ctx, &args[0]);
    let state = args[1].clone();

    match &value {
        Ty::Constructor(inner_name, inner_args) if *inner_name == type_name && inner_args.len() == 2 => {
            let merged = union_states(ctx, &state, &inner_args[1]);
            join(&type_name, inner_args[0].clone(), merged)
        }
        _ => join(&type_name, value, state),
    }
}

/// Per-call bookkeeping the infectious call-application algorithm
/// accumulates across a callee and its arguments, keyed by carrier domain
/// so two unrelated carriers (e.g. an IO-style one alongside a validation
/// one) don't get merged into each other's state.
#[derive(Default)]
pub struct CallCarrierState {
    by_domain: FxHashMap<String, (String, Ty)>,
}

impl CallCarrierState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one more argument/callee's carrier split, if `ty` turned out
    /// to be a registered carrier.
    pub fn absorb(&mut self, ctx: &mut InferCtx, ty: &Ty) -> Ty {
        if let Ty::Constructor(name, args) = ty {
            if let Some(descriptor) = ctx.carriers.get(name).cloned() {
                if args.len() == 2 {
                    let value = args[0].clone();
                    let state = args[1].clone();
                    let merged = match self.by_domain.get(&descriptor.domain) {
                        Some((owner, existing)) => (owner.clone(), union_states(ctx, existing, &state)),
                        None => (descriptor.type_name.clone(), state),
                    };
                    self.by_domain.insert(descriptor.domain.clone(), merged);
                    return value;
                }
            }
        }
        ty.clone()
    }

    /// Re-wrap a bare result type in every carrier whose state was
    /// accumulated during this call, merging per-domain state into each.
    /// `result` itself may already be the same carrier (a callee that
    /// returns one directly) — collapsing after each join keeps that case
    /// from nesting instead of merging.
    pub fn rewrap(&self, ctx: &mut InferCtx, result: Ty) -> Ty {
        let mut acc = result;
        for (type_name, state) in self.by_domain.values() {
            acc = collapse(ctx, &join(type_name, acc, state.clone()));
        }
        acc
    }

    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_iresult() -> CarrierRegistry {
        let mut reg = CarrierRegistry::new();
        reg.register(CarrierDescriptor {
            type_name: "IResult".into(),
            domain: "io".into(),
            value_ctor: "IOk".into(),
            effect_ctors: vec!["IErr".into()],
        })
        .unwrap();
        reg
    }

    fn ctx_with_iresult() -> InferCtx {
        let mut ctx = InferCtx::new();
        ctx.carriers = registry_with_iresult();
        ctx
    }

    #[test]
    fn split_join_round_trips_plain_value() {
        let reg = CarrierRegistry::new();
        let split = split(&reg, &Ty::Int);
        assert_eq!(split.value, Ty::Int);
        assert!(matches!(split.state, Ty::EffectRow { .. }));
    }

    #[test]
    fn split_unwraps_registered_carrier() {
        let reg = registry_with_iresult();
        let carrier = join("IResult", Ty::Int, rows::empty());
        let s = split(&reg, &carrier);
        assert_eq!(s.value, Ty::Int);
    }

    #[test]
    fn call_state_threads_single_argument_carrier_through() {
        let mut ctx = ctx_with_iresult();
        let mut state = CallCarrierState::new();
        let arg = join(
            "IResult",
            Ty::Int,
            Ty::EffectRow {
                cases: {
                    let mut m = FxHashMap::default();
                    m.insert("IErr".to_string(), None);
                    m
                },
                tail: None,
            },
        );
        let stripped = state.absorb(&mut ctx, &arg);
        assert_eq!(stripped, Ty::Int);
        let rewrapped = state.rewrap(&mut ctx, Ty::Bool);
        match rewrapped {
            Ty::Constructor(name, args) if name == "IResult" => {
                assert_eq!(args[0], Ty::Bool);
            }
            other => panic!("expected IResult, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_domain_on_different_type_is_rejected() {
        let mut reg = registry_with_iresult();
        let err = reg.register(CarrierDescriptor {
            type_name: "Outcome".into(),
            domain: "io".into(),
            value_ctor: "Ok".into(),
            effect_ctors: vec!["Err".into()],
        });
        assert!(err.is_err());
    }

    fn row(labels: &[&str]) -> Ty {
        let cases = labels.iter().map(|l| (l.to_string(), None)).collect();
        Ty::EffectRow { cases, tail: None }
    }

    #[test]
    fn collapse_merges_nested_same_type_carriers() {
        let mut ctx = ctx_with_iresult();
        let nested = join("IResult", join("IResult", Ty::Int, row(&["A"])), row(&["B"]));
        let collapsed = collapse(&mut ctx, &nested);
        match collapsed {
            Ty::Constructor(name, args) => {
                assert_eq!(name, "IResult");
                assert_eq!(args[0], Ty::Int);
                let (cases, _) = rows::as_row(&args[1]).unwrap();
                assert!(cases.contains_key("A"));
                assert!(cases.contains_key("B"));
            }
            other => panic!("expected a flattened IResult, got {:?}", other),
        }
    }

    #[test]
    fn collapse_is_idempotent() {
        let mut ctx = ctx_with_iresult();
        let ty = join("IResult", Ty::Int, row(&["A"]));
        let once = collapse(&mut ctx, &ty);
        let twice = collapse(&mut ctx, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn collapse_leaves_non_carrier_types_untouched() {
        let mut ctx = ctx_with_iresult();
        assert_eq!(collapse(&mut ctx, &Ty::Int), Ty::Int);
    }

    #[test]
    fn union_states_unifies_shared_label_payloads() {
        let mut ctx = InferCtx::new();
        let v = ctx.fresh_tyvar();
        let mut a_cases = rows::RowCases::default();
        a_cases.insert("IErr".to_string(), Some(Box::new(Ty::Var(v))));
        let a = Ty::EffectRow { cases: a_cases, tail: None };
        let mut b_cases = rows::RowCases::default();
        b_cases.insert("IErr".to_string(), Some(Box::new(Ty::Int)));
        let b = Ty::EffectRow { cases: b_cases, tail: None };
        union_states(&mut ctx, &a, &b);
        assert_eq!(ctx.resolve(Ty::Var(v)), Ty::Int);
    }
}
