//! Fact inference: which types are duplicable, exclusive, or affine.
//!
//! Every algebraic data type gets a *fact*:
//!
//! - `Duplicable(mask)` — copies are free, provided each parameter whose
//!   bit is set in `mask` is itself duplicable;
//! - `Exclusive` — unique heap ownership, linear;
//! - `Affine` — linear but not uniquely owned.
//!
//! Facts are computed as a monotone fixed point over a whole definition
//! group: each round recomputes every duplicable-declared definition from
//! its branches, and rounds repeat until the table stops changing. The
//! lattice is finite (`Duplicable(∅)` at the bottom, `Affine` at the top),
//! so the loop terminates within `|defs| × max-arity + 1` rounds.
//!
//! During a single recomputation, a position that reduces to parameter `i`
//! of the definition under inspection is tagged `Fuzzy(i)`; when facts are
//! joined, `Fuzzy(i)` turns into the requirement "parameter `i` must be
//! duplicable" (bit `i` of the mask).
//!
//! Variance vectors are computed alongside, by the same kind of fixed
//! point: each occurrence of a parameter contributes its polarity, arrows
//! flip polarity on the left, and a parameter that occurs both covariantly
//! and contravariantly is invariant.

use crate::env::{DeclaredFlavor, Definition, Env, Var};
use crate::ty::{Field, Type};

/// Bitmap over the parameters of a definition: bit `i` set means
/// "parameter `i` must be duplicable for the whole to be duplicable".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamMask(u32);

impl ParamMask {
    pub fn empty() -> Self {
        ParamMask(0)
    }

    pub fn singleton(i: usize) -> Self {
        ParamMask(1 << i)
    }

    pub fn set(&mut self, i: usize) {
        self.0 |= 1 << i;
    }

    pub fn is_set(&self, i: usize) -> bool {
        self.0 & (1 << i) != 0
    }

    pub fn union(self, other: ParamMask) -> ParamMask {
        ParamMask(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Indices of the set bits, ascending.
    pub fn bits(&self) -> impl Iterator<Item = usize> + '_ {
        (0..32).filter(move |i| self.is_set(*i))
    }
}

/// The fact lattice. `Fuzzy` never escapes a single recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact {
    Duplicable(ParamMask),
    Exclusive,
    Affine,
    /// Internal: this position reduces to parameter `i`.
    Fuzzy(usize),
}

impl Fact {
    /// Lattice order: `Duplicable(m1) ≤ Duplicable(m2)` iff `m1 ⊆ m2`,
    /// and `Duplicable ≤ Exclusive ≤ Affine`.
    pub fn leq(&self, other: &Fact) -> bool {
        match (self, other) {
            (Fact::Duplicable(m1), Fact::Duplicable(m2)) => m1.union(*m2) == *m2,
            (Fact::Duplicable(_), _) => true,
            (Fact::Exclusive, Fact::Exclusive) | (Fact::Exclusive, Fact::Affine) => true,
            (Fact::Affine, Fact::Affine) => true,
            _ => false,
        }
    }

    /// Turn a sub-position's fact into a requirement on the enclosing
    /// definition: `Fuzzy(i)` demands parameter `i` duplicable, exclusive
    /// and affine sub-uses demote the whole to affine.
    fn as_requirement(&self) -> Fact {
        match self {
            Fact::Fuzzy(i) => Fact::Duplicable(ParamMask::singleton(*i)),
            Fact::Duplicable(m) => Fact::Duplicable(*m),
            Fact::Exclusive | Fact::Affine => Fact::Affine,
        }
    }

    /// Join of two field requirements.
    fn join(&self, other: &Fact) -> Fact {
        match (self.as_requirement(), other.as_requirement()) {
            (Fact::Duplicable(m1), Fact::Duplicable(m2)) => Fact::Duplicable(m1.union(m2)),
            _ => Fact::Affine,
        }
    }
}

/// Polarity of a parameter occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variance {
    Invariant,
    Covariant,
    Contravariant,
    /// No occurrence at all.
    Bivariant,
}

impl Variance {
    /// Sign product: the polarity of an occurrence nested under a context
    /// of polarity `self`.
    pub fn compose(self, inner: Variance) -> Variance {
        match (self, inner) {
            (Variance::Bivariant, _) | (_, Variance::Bivariant) => Variance::Bivariant,
            (Variance::Covariant, v) => v,
            (Variance::Contravariant, Variance::Covariant) => Variance::Contravariant,
            (Variance::Contravariant, Variance::Contravariant) => Variance::Covariant,
            (Variance::Contravariant, Variance::Invariant) => Variance::Invariant,
            (Variance::Invariant, _) => Variance::Invariant,
        }
    }

    /// Combine two occurrences of the same parameter: a parameter seen
    /// both covariantly and contravariantly is invariant.
    pub fn meet(self, other: Variance) -> Variance {
        match (self, other) {
            (Variance::Bivariant, v) | (v, Variance::Bivariant) => v,
            (a, b) if a == b => a,
            _ => Variance::Invariant,
        }
    }
}

/// Compute the fact of a type as seen during a definition's recomputation.
///
/// `nparams` is the parameter count of the definition under inspection and
/// `depth` the number of local binders crossed so far; `Bound(j)` with
/// `depth <= j < depth + nparams` is parameter `nparams - 1 - (j - depth)`
/// and yields `Fuzzy` of that index.
fn fact_of_at(env: &Env, t: &Type, nparams: usize, depth: usize) -> Fact {
    let t = env.modulo_flex(t);
    match &t {
        Type::Bound(j) => {
            if *j >= depth && *j - depth < nparams {
                Fact::Fuzzy(nparams - 1 - (*j - depth))
            } else {
                // A locally quantified variable: nothing is known.
                Fact::Affine
            }
        }
        Type::Open(v) => match env.fact(*v) {
            Some(f) => f.clone(),
            // Flexible or term-kinded: assume nothing.
            None => Fact::Affine,
        },
        Type::Unknown | Type::Dynamic | Type::Empty => Fact::Duplicable(ParamMask::empty()),
        Type::Arrow(..) | Type::Singleton(_) => Fact::Duplicable(ParamMask::empty()),
        Type::App(head, args) => match fact_of_at(env, head, nparams, depth) {
            Fact::Exclusive => Fact::Exclusive,
            Fact::Affine | Fact::Fuzzy(_) => Fact::Affine,
            Fact::Duplicable(mask) => {
                let mut acc = Fact::Duplicable(ParamMask::empty());
                for i in mask.bits() {
                    match args.get(i) {
                        Some(arg) => acc = acc.join(&fact_of_at(env, arg, nparams, depth)),
                        None => return Fact::Affine,
                    }
                }
                acc
            }
        },
        Type::Tuple(ts) => ts.iter().fold(Fact::Duplicable(ParamMask::empty()), |acc, t| {
            acc.join(&fact_of_at(env, t, nparams, depth))
        }),
        Type::Concrete(c) => match env.declared_flavor(c.datacon.datatype) {
            Some(DeclaredFlavor::Exclusive) | Some(DeclaredFlavor::Mutable) => Fact::Exclusive,
            _ => c
                .fields
                .iter()
                .fold(Fact::Duplicable(ParamMask::empty()), |acc, fld| {
                    acc.join(&fact_of_at(env, fld.ty(), nparams, depth))
                }),
        },
        Type::Forall(_, body) | Type::Exists(_, body) => {
            fact_of_at(env, body, nparams, depth + 1)
        }
        Type::Bar(v, p) | Type::Star(v, p) => {
            fact_of_at(env, v, nparams, depth).join(&fact_of_at(env, p, nparams, depth))
        }
        Type::Anchored(_, inner) => fact_of_at(env, inner, nparams, depth),
        Type::And(_, inner) | Type::Imply(_, inner) => fact_of_at(env, inner, nparams, depth),
    }
}

/// Fact of a fully opened type (no parameters in scope).
pub fn fact_of(env: &Env, t: &Type) -> Fact {
    fact_of_at(env, t, 0, 0)
}

/// A permission or type whose copies are free.
pub fn is_duplicable(env: &Env, t: &Type) -> bool {
    matches!(fact_of(env, t), Fact::Duplicable(m) if m.is_empty())
}

/// A type carrying unique heap ownership.
pub fn is_exclusive(env: &Env, t: &Type) -> bool {
    matches!(fact_of(env, t), Fact::Exclusive)
}

/// Run fact and variance inference to a fixed point over one definition
/// group.
pub fn infer_facts(env: &mut Env, group: &[Var]) {
    // Facts first: variance does not feed back into facts.
    loop {
        let mut changed = false;
        for &v in group {
            let (flavor, branches) = match env.definition(v) {
                Some(Definition::Concrete { flavor, branches, .. }) => {
                    (*flavor, branches.clone())
                }
                _ => continue,
            };
            // Exclusive definitions are exclusive, full stop.
            if matches!(flavor, DeclaredFlavor::Exclusive | DeclaredFlavor::Mutable) {
                continue;
            }
            let nparams = env.params(v).len();
            let mut fact = Fact::Duplicable(ParamMask::empty());
            for branch in &branches {
                for field in &branch.fields {
                    fact = fact.join(&fact_of_at(env, field.ty(), nparams, 0));
                }
            }
            let old = env.fact(v).cloned();
            if old.as_ref() != Some(&fact) {
                debug_assert!(
                    old.map_or(true, |o| o.leq(&fact)),
                    "fact inference must be monotone"
                );
                env.set_fact(v, fact);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    infer_variance(env, group);
}

/// Record one occurrence of each parameter of `v` found in `t`.
fn variance_walk(
    env: &Env,
    t: &Type,
    nparams: usize,
    depth: usize,
    polarity: Variance,
    occ: &mut [Variance],
) {
    let t = env.modulo_flex(t);
    match &t {
        Type::Bound(j) => {
            if *j >= depth && *j - depth < nparams {
                let k = nparams - 1 - (*j - depth);
                occ[k] = occ[k].meet(polarity);
            }
        }
        Type::Open(_) | Type::Unknown | Type::Dynamic | Type::Empty => {}
        Type::Arrow(d, c) => {
            variance_walk(env, d, nparams, depth, polarity.compose(Variance::Contravariant), occ);
            variance_walk(env, c, nparams, depth, polarity.compose(Variance::Covariant), occ);
        }
        Type::App(head, args) => {
            let head_variance = match env.modulo_flex(head) {
                Type::Open(w) => env.variance(w).to_vec(),
                // Higher-kinded parameter position: treat as invariant use.
                _ => vec![Variance::Invariant; args.len()],
            };
            for (i, arg) in args.iter().enumerate() {
                let via = head_variance
                    .get(i)
                    .copied()
                    .unwrap_or(Variance::Invariant);
                variance_walk(env, arg, nparams, depth, polarity.compose(via), occ);
            }
        }
        Type::Tuple(ts) => {
            for t in ts {
                variance_walk(env, t, nparams, depth, polarity, occ);
            }
        }
        Type::Concrete(c) => {
            for field in &c.fields {
                variance_walk(env, field.ty(), nparams, depth, polarity, occ);
            }
            if let Some(a) = &c.adopts {
                variance_walk(env, a, nparams, depth, polarity, occ);
            }
        }
        Type::Singleton(inner) => variance_walk(env, inner, nparams, depth, polarity, occ),
        Type::Forall(_, body) | Type::Exists(_, body) => {
            variance_walk(env, body, nparams, depth + 1, polarity, occ)
        }
        Type::Bar(a, b) | Type::Star(a, b) => {
            variance_walk(env, a, nparams, depth, polarity, occ);
            variance_walk(env, b, nparams, depth, polarity, occ);
        }
        Type::Anchored(x, inner) => {
            variance_walk(env, x, nparams, depth, polarity, occ);
            variance_walk(env, inner, nparams, depth, polarity, occ);
        }
        Type::And(cs, inner) | Type::Imply(cs, inner) => {
            for c in cs {
                variance_walk(env, &c.ty, nparams, depth, polarity.compose(Variance::Invariant), occ);
            }
            variance_walk(env, inner, nparams, depth, polarity, occ);
        }
    }
}

fn infer_variance(env: &mut Env, group: &[Var]) {
    loop {
        let mut changed = false;
        for &v in group {
            let branches = match env.definition(v) {
                Some(Definition::Concrete { branches, .. }) => branches.clone(),
                _ => continue,
            };
            let adopts = match env.definition(v) {
                Some(Definition::Concrete { adopts, .. }) => adopts.clone(),
                _ => None,
            };
            let nparams = env.params(v).len();
            let mut occ = vec![Variance::Bivariant; nparams];
            for branch in &branches {
                for field in &branch.fields {
                    variance_walk(env, field.ty(), nparams, 0, Variance::Covariant, &mut occ);
                }
            }
            if let Some(a) = &adopts {
                variance_walk(env, a, nparams, 0, Variance::Covariant, &mut occ);
            }
            if env.variance(v) != occ.as_slice() {
                env.set_variance(v, occ);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Branch;
    use crate::ty::{Binding, Kind};
    use mezzo_base::{Interner, Span};

    struct Fixture {
        env: Env,
        interner: Interner,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                env: Env::new(),
                interner: Interner::new(),
            }
        }

        /// `data list a = Nil | Cons { head: a; tail: list a }`
        fn bind_list(&mut self) -> Var {
            let a = Binding::new(self.interner.intern("a"), Kind::Type, Span::dummy());
            let list = self
                .env
                .bind_datatype(self.interner.intern("list"), &[a], Span::dummy());
            let branches = vec![
                Branch {
                    name: self.interner.intern("Nil"),
                    fields: vec![],
                },
                Branch {
                    name: self.interner.intern("Cons"),
                    fields: vec![
                        Field::Value(self.interner.intern("head"), Type::Bound(0)),
                        Field::Value(
                            self.interner.intern("tail"),
                            Type::App(Box::new(Type::Open(list)), vec![Type::Bound(0)]),
                        ),
                    ],
                },
            ];
            self.env.install_definition(
                list,
                Definition::Concrete {
                    flavor: DeclaredFlavor::Duplicable,
                    branches,
                    adopts: None,
                },
                None,
            );
            list
        }

        /// `mutable data ref a = Ref { contents: a }`
        fn bind_ref(&mut self) -> Var {
            let a = Binding::new(self.interner.intern("a"), Kind::Type, Span::dummy());
            let r = self
                .env
                .bind_datatype(self.interner.intern("ref"), &[a], Span::dummy());
            self.env.install_definition(
                r,
                Definition::Concrete {
                    flavor: DeclaredFlavor::Mutable,
                    branches: vec![Branch {
                        name: self.interner.intern("Ref"),
                        fields: vec![Field::Value(self.interner.intern("contents"), Type::Bound(0))],
                    }],
                    adopts: None,
                },
                None,
            );
            r
        }

        /// `data int` as a builtin duplicable abstract type.
        fn bind_int(&mut self) -> Var {
            let v = self
                .env
                .bind_datatype(self.interner.intern("int"), &[], Span::dummy());
            self.env.install_definition(
                v,
                Definition::Abstract,
                Some(Fact::Duplicable(ParamMask::empty())),
            );
            v
        }
    }

    #[test]
    fn list_is_duplicable_in_its_parameter() {
        let mut fx = Fixture::new();
        let list = fx.bind_list();
        infer_facts(&mut fx.env, &[list]);
        assert_eq!(
            fx.env.fact(list),
            Some(&Fact::Duplicable(ParamMask::singleton(0)))
        );
    }

    #[test]
    fn list_of_int_is_duplicable_list_of_ref_is_not() {
        let mut fx = Fixture::new();
        let list = fx.bind_list();
        let int = fx.bind_int();
        let r = fx.bind_ref();
        infer_facts(&mut fx.env, &[list, int, r]);

        let list_int = Type::App(Box::new(Type::Open(list)), vec![Type::Open(int)]);
        assert!(is_duplicable(&fx.env, &list_int));

        let ref_int = Type::App(Box::new(Type::Open(r)), vec![Type::Open(int)]);
        let list_ref = Type::App(Box::new(Type::Open(list)), vec![ref_int]);
        assert!(!is_duplicable(&fx.env, &list_ref));
        assert!(!is_exclusive(&fx.env, &list_ref));
    }

    #[test]
    fn mutable_definitions_are_exclusive() {
        let mut fx = Fixture::new();
        let r = fx.bind_ref();
        let int = fx.bind_int();
        infer_facts(&mut fx.env, &[r, int]);
        assert_eq!(fx.env.fact(r), Some(&Fact::Exclusive));
        let ref_int = Type::App(Box::new(Type::Open(r)), vec![Type::Open(int)]);
        assert!(is_exclusive(&fx.env, &ref_int));
    }

    #[test]
    fn abstract_types_default_to_affine() {
        let mut fx = Fixture::new();
        let v = fx
            .env
            .bind_datatype(fx.interner.intern("opaque"), &[], Span::dummy());
        fx.env.install_definition(v, Definition::Abstract, None);
        infer_facts(&mut fx.env, &[v]);
        assert_eq!(fx.env.fact(v), Some(&Fact::Affine));
    }

    #[test]
    fn arrows_and_singletons_are_duplicable() {
        let fx = Fixture::new();
        let arrow = Type::arrow(Type::Unknown, Type::Unknown);
        assert!(is_duplicable(&fx.env, &arrow));
        let sing = Type::Singleton(Box::new(Type::Open(Var::from_raw(0))));
        assert!(is_duplicable(&fx.env, &sing));
    }

    #[test]
    fn field_holding_an_exclusive_type_makes_the_container_affine() {
        let mut fx = Fixture::new();
        let r = fx.bind_ref();
        let int = fx.bind_int();
        // data holder = Holder { cell: ref int }
        let holder = fx
            .env
            .bind_datatype(fx.interner.intern("holder"), &[], Span::dummy());
        let ref_int = Type::App(Box::new(Type::Open(r)), vec![Type::Open(int)]);
        fx.env.install_definition(
            holder,
            Definition::Concrete {
                flavor: DeclaredFlavor::Duplicable,
                branches: vec![Branch {
                    name: fx.interner.intern("Holder"),
                    fields: vec![Field::Value(fx.interner.intern("cell"), ref_int)],
                }],
                adopts: None,
            },
            None,
        );
        infer_facts(&mut fx.env, &[r, int, holder]);
        assert_eq!(fx.env.fact(holder), Some(&Fact::Affine));
    }

    #[test]
    fn variance_of_list_parameter_is_covariant() {
        let mut fx = Fixture::new();
        let list = fx.bind_list();
        infer_facts(&mut fx.env, &[list]);
        assert_eq!(fx.env.variance(list), &[Variance::Covariant]);
    }

    #[test]
    fn parameter_on_both_sides_of_an_arrow_is_invariant() {
        let mut fx = Fixture::new();
        // data endo a = Endo { run: a -> a }
        let a = Binding::new(fx.interner.intern("a"), Kind::Type, Span::dummy());
        let endo = fx
            .env
            .bind_datatype(fx.interner.intern("endo"), &[a], Span::dummy());
        fx.env.install_definition(
            endo,
            Definition::Concrete {
                flavor: DeclaredFlavor::Duplicable,
                branches: vec![Branch {
                    name: fx.interner.intern("Endo"),
                    fields: vec![Field::Value(
                        fx.interner.intern("run"),
                        Type::arrow(Type::Bound(0), Type::Bound(0)),
                    )],
                }],
                adopts: None,
            },
            None,
        );
        infer_facts(&mut fx.env, &[endo]);
        assert_eq!(fx.env.variance(endo), &[Variance::Invariant]);
    }

    #[test]
    fn variance_composition_follows_the_sign_product() {
        use Variance::*;
        assert_eq!(Contravariant.compose(Contravariant), Covariant);
        assert_eq!(Contravariant.compose(Covariant), Contravariant);
        assert_eq!(Covariant.compose(Contravariant), Contravariant);
        assert_eq!(Invariant.compose(Covariant), Invariant);
        assert_eq!(Bivariant.compose(Invariant), Bivariant);
    }

    #[test]
    fn fixed_point_is_reached_quickly_for_mutual_recursion() {
        let mut fx = Fixture::new();
        // data even a = E { next: odd a }   and   data odd a = O { next: even a; item: a }
        let a1 = Binding::new(fx.interner.intern("a"), Kind::Type, Span::dummy());
        let a2 = Binding::new(fx.interner.intern("a"), Kind::Type, Span::dummy());
        let even = fx
            .env
            .bind_datatype(fx.interner.intern("even"), &[a1], Span::dummy());
        let odd = fx
            .env
            .bind_datatype(fx.interner.intern("odd"), &[a2], Span::dummy());
        fx.env.install_definition(
            even,
            Definition::Concrete {
                flavor: DeclaredFlavor::Duplicable,
                branches: vec![Branch {
                    name: fx.interner.intern("E"),
                    fields: vec![Field::Value(
                        fx.interner.intern("next"),
                        Type::App(Box::new(Type::Open(odd)), vec![Type::Bound(0)]),
                    )],
                }],
                adopts: None,
            },
            None,
        );
        fx.env.install_definition(
            odd,
            Definition::Concrete {
                flavor: DeclaredFlavor::Duplicable,
                branches: vec![Branch {
                    name: fx.interner.intern("O"),
                    fields: vec![
                        Field::Value(
                            fx.interner.intern("next"),
                            Type::App(Box::new(Type::Open(even)), vec![Type::Bound(0)]),
                        ),
                        Field::Value(fx.interner.intern("item"), Type::Bound(0)),
                    ],
                }],
                adopts: None,
            },
            None,
        );
        infer_facts(&mut fx.env, &[even, odd]);
        assert_eq!(
            fx.env.fact(even),
            Some(&Fact::Duplicable(ParamMask::singleton(0)))
        );
        assert_eq!(
            fx.env.fact(odd),
            Some(&Fact::Duplicable(ParamMask::singleton(0)))
        );
    }
}
