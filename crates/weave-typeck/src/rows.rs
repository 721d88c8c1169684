//! Effect row algebra (§4.3).
//!
//! An effect row is a carrier's "error/effect state": a map from labelled
//! cases to optional payload types, plus an optional open tail variable
//! standing for "possibly more cases, not yet known". These are the pure,
//! structural operations on rows; `carrier.rs` builds the split/join/
//! collapse vocabulary on top, and `unify.rs` performs the deep unification
//! of row payloads during actual constraint solving.

use rustc_hash::FxHashMap;

use crate::ty::{Ty, TyVar};
use crate::unify::InferCtx;

pub type RowCases = FxHashMap<String, Option<Box<Ty>>>;

/// An empty, closed row — the fully discharged state.
pub fn empty() -> Ty {
    Ty::closed_row()
}

/// Extract `(cases, tail)` from a row type, if `ty` is one.
pub fn as_row(ty: &Ty) -> Option<(&RowCases, &Option<TyVar>)> {
    match ty {
        Ty::EffectRow { cases, tail } => Some((cases, tail)),
        _ => None,
    }
}

/// Merge two rows' case maps and tails into one row.
///
/// Case union is a plain key union: a label present in either row is
/// present in the result (tests require this to be commutative and
/// associative, which a key-set union trivially is). A label present in
/// both rows has its payloads actually unified through `ctx` — not just
/// one side kept and the other discarded — so two carriers that disagree
/// on a shared error case's payload type still surface that conflict.
/// Tails are combined by picking the lower-numbered variable when both
/// sides carry one, which is itself commutative and associative and keeps
/// the result deterministic regardless of argument order — callers that
/// need the two tail variables actually unified (so both resolve to one
/// row) still have to do that via `InferCtx::unify`.
pub fn union(ctx: &mut InferCtx, a: &Ty, b: &Ty) -> Ty {
    let empty_cases = RowCases::default();
    let (a_cases, a_tail) = as_row(a).unwrap_or((&empty_cases, &None));
    let (b_cases, b_tail) = as_row(b).unwrap_or((&empty_cases, &None));

    let mut cases = a_cases.clone();
    for (label, b_payload) in b_cases {
        match cases.get(label).cloned() {
            Some(Some(a_payload)) => {
                if let Some(b_payload) = b_payload {
                    let _ = ctx.unify((*a_payload).clone(), (**b_payload).clone());
                }
            }
            Some(None) => {
                if b_payload.is_some() {
                    cases.insert(label.clone(), b_payload.clone());
                }
            }
            None => {
                cases.insert(label.clone(), b_payload.clone());
            }
        }
    }

    let tail = match (a_tail, b_tail) {
        (None, None) => None,
        (Some(v), None) | (None, Some(v)) => Some(*v),
        (Some(v1), Some(v2)) => Some(if v1.0 <= v2.0 { *v1 } else { *v2 }),
    };

    Ty::EffectRow { cases, tail }
}

/// Expand a nominal ADT's error-variant names into row cases, each with a
/// nullary (`None`) payload. Payloads on expanded cases are intentionally
/// never tracked beyond presence/absence — see the design note on
/// constructor-payload tracking.
pub fn expand_adt_tail(variant_names: &[String]) -> RowCases {
    variant_names
        .iter()
        .map(|name| (name.clone(), None))
        .collect()
}

/// Whether a row has no cases and no open tail — fully discharged.
pub fn is_closed_empty(ty: &Ty) -> bool {
    matches!(
        ty,
        Ty::EffectRow { cases, tail } if cases.is_empty() && tail.is_none()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(labels: &[&str]) -> Ty {
        let cases = labels.iter().map(|l| (l.to_string(), None)).collect();
        Ty::EffectRow { cases, tail: None }
    }

    #[test]
    fn union_is_commutative() {
        let mut ctx = InferCtx::new();
        let a = row(&["ATimeout"]);
        let b = row(&["IErr"]);
        let ab = union(&mut ctx, &a, &b);
        let ba = union(&mut ctx, &b, &a);
        let (ab_cases, _) = as_row(&ab).unwrap();
        let (ba_cases, _) = as_row(&ba).unwrap();
        let mut ab_keys: Vec<_> = ab_cases.keys().collect();
        let mut ba_keys: Vec<_> = ba_cases.keys().collect();
        ab_keys.sort();
        ba_keys.sort();
        assert_eq!(ab_keys, ba_keys);
    }

    #[test]
    fn union_is_associative() {
        let mut ctx = InferCtx::new();
        let a = row(&["A"]);
        let b = row(&["B"]);
        let c = row(&["C"]);
        let ab = union(&mut ctx, &a, &b);
        let left = union(&mut ctx, &ab, &c);
        let bc = union(&mut ctx, &b, &c);
        let right = union(&mut ctx, &a, &bc);
        let (lc, _) = as_row(&left).unwrap();
        let (rc, _) = as_row(&right).unwrap();
        let mut lk: Vec<_> = lc.keys().collect();
        let mut rk: Vec<_> = rc.keys().collect();
        lk.sort();
        rk.sort();
        assert_eq!(lk, rk);
    }

    #[test]
    fn union_picks_lower_tail_var_regardless_of_order() {
        let a = Ty::EffectRow {
            cases: FxHashMap::default(),
            tail: Some(TyVar(5)),
        };
        let b = Ty::EffectRow {
            cases: FxHashMap::default(),
            tail: Some(TyVar(2)),
        };
        let mut ctx = InferCtx::new();
        let u1 = union(&mut ctx, &a, &b);
        let u2 = union(&mut ctx, &b, &a);
        let (_, t1) = as_row(&u1).unwrap();
        let (_, t2) = as_row(&u2).unwrap();
        assert_eq!(*t1, Some(TyVar(2)));
        assert_eq!(*t2, Some(TyVar(2)));
    }

    #[test]
    fn expand_adt_tail_is_nullary() {
        let cases = expand_adt_tail(&["NotFound".to_string(), "Timeout".to_string()]);
        assert!(cases.values().all(|v| v.is_none()));
    }
}
