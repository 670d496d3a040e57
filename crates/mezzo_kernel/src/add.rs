//! Addition: assimilating a permission into the environment.
//!
//! `add(env, x, t)` records that `x` has type `t`, keeping the environment
//! in its canonical shape:
//!
//! - structural types are *unfolded* first: every field of a stored tuple
//!   or concrete block is a singleton pointing at a fresh term variable
//!   that carries the field's real type;
//! - adding a singleton `=y` unifies `x` with `y`, union-find style, and
//!   re-adds `y`'s permissions so that structural equalities propagate
//!   (co-unification);
//! - adding a second copy of a block co-unifies the two blocks field by
//!   field instead of storing both;
//! - contradictions — a second exclusive permission, two different tags,
//!   two different defined types for one variable, incompatible adopts
//!   clauses — mark the environment inconsistent rather than failing.
//!
//! Addition never fails; inconsistency is a state, and once entered every
//! later subtraction succeeds vacuously.

use mezzo_base::{Interner, Span, Symbol};

use crate::env::{DeclaredFlavor, Env, Mode, Var};
use crate::fact::{is_duplicable, is_exclusive};
use crate::sub::{install_constraints, Subtractor};
use crate::ty::{collect, Concrete, Field, Kind, Type};

/// Add the permission `x @ t`.
pub fn add(env: Env, x: Var, t: &Type, interner: &Interner) -> Env {
    let mut env = env;
    let x = env.repr(x);
    let t = env.modulo_flex(t);
    let (value, perms) = collect(&t);

    env = add_value(env, x, &value, interner);
    for p in &perms {
        env = add_perm(env, p, interner);
    }
    env
}

fn add_value(mut env: Env, x: Var, value: &Type, interner: &Interner) -> Env {
    match value {
        // `x @ unknown` carries no information.
        Type::Unknown => env,

        Type::Singleton(inner) => match env.modulo_flex(inner) {
            Type::Open(y) => unify(env, x, y, interner),
            _ => env,
        },

        Type::Exists(b, body) => {
            let (_, opened) = env.open_binder(b, body, Mode::Rigid);
            add(env, x, &opened, interner)
        }

        Type::And(cs, body) => {
            install_constraints(&mut env, cs);
            add(env, x, body, interner)
        }

        Type::Concrete(c) => add_concrete(env, x, c, interner),

        Type::Tuple(ts) => add_tuple(env, x, ts, interner),

        other => {
            // Contradiction with a different defined type already held?
            if let Some(h1) = defined_head(&env, other) {
                let clash = env.permissions(x).iter().any(|p| {
                    matches!(defined_head(&env, p), Some(h2) if env.repr(h2) != env.repr(h1))
                });
                if clash {
                    env.mark_inconsistent();
                }
            }
            let sub = Subtractor::new(interner);
            match sub.sub(&env, x, other) {
                Ok(_) => {
                    if is_exclusive(&env, other) {
                        // Owning it twice is a contradiction.
                        env.mark_inconsistent();
                        env.push_permission(x, other.clone());
                    } else if is_duplicable(&env, other) {
                        // Already present, copies are free: drop.
                    } else {
                        env.push_permission(x, other.clone());
                    }
                }
                Err(_) => env.push_permission(x, other.clone()),
            }
            env
        }
    }
}

/// Walk a `perm`-kinded type and dispatch its pieces.
pub fn add_perm(env: Env, p: &Type, interner: &Interner) -> Env {
    let mut env = env;
    let p = env.modulo_flex(p);
    match &p {
        Type::Empty => env,
        Type::Star(l, r) => {
            env = add_perm(env, l, interner);
            add_perm(env, r, interner)
        }
        Type::Anchored(x, t) => match env.modulo_flex(x) {
            Type::Open(xv) => {
                if env.is_flexible(xv) {
                    // Never anchor a permission on a flexible variable;
                    // park it until the variable is solved.
                    env.add_floating_perm(p.clone());
                    env
                } else {
                    add(env, xv, t, interner)
                }
            }
            _ => {
                env.add_floating_perm(p.clone());
                env
            }
        },
        // Abstract permission variables and anything else float.
        _ => {
            env.add_floating_perm(p.clone());
            env
        }
    }
}

/// Union `x` and `y`, then re-add `y`'s former permissions to the merged
/// variable so block/tuple co-unification fires.
pub fn unify(mut env: Env, x: Var, y: Var, interner: &Interner) -> Env {
    let x = env.repr(x);
    let y = env.repr(y);
    if x == y {
        return env;
    }
    let moved: Vec<Type> = env
        .permissions(y)
        .iter()
        .filter(|p| **p != Type::singleton(y))
        .cloned()
        .collect();
    env.set_permissions(y, Vec::new());
    env.merge_left(x, y);
    for p in moved {
        env = add(env, x, &p, interner);
    }
    env
}

/// Hoist a field type onto a fresh term variable unless it is already a
/// singleton; the stored field becomes `=fresh`.
fn unfold_component(mut env: Env, t: &Type, interner: &Interner) -> (Env, Type) {
    match env.modulo_flex(t) {
        s @ Type::Singleton(_) => (env, s),
        other => {
            let fresh = env.bind_rigid(Symbol::EMPTY, Kind::Term, Span::dummy());
            env = add(env, fresh, &other, interner);
            (env, Type::singleton(fresh))
        }
    }
}

fn add_concrete(mut env: Env, x: Var, c: &Concrete, interner: &Interner) -> Env {
    // Unfold: value fields become singletons, permission fields are
    // released into the environment.
    let mut fields = Vec::new();
    for field in &c.fields {
        match field {
            Field::Value(name, t) => {
                let (e, s) = unfold_component(env, t, interner);
                env = e;
                fields.push(Field::Value(*name, s));
            }
            Field::Permission(p) => {
                env = add_perm(env, p, interner);
            }
        }
    }

    let exclusive = matches!(
        env.declared_flavor(c.datacon.datatype),
        Some(DeclaredFlavor::Exclusive) | Some(DeclaredFlavor::Mutable)
    );

    // An existing block for the same variable?
    let existing = env.permissions(x).iter().enumerate().find_map(|(i, p)| {
        match env.modulo_flex(p) {
            Type::Concrete(c0) => Some((i, c0)),
            _ => None,
        }
    });

    if let Some((_, c0)) = existing {
        if env.repr(c0.datacon.datatype) != env.repr(c.datacon.datatype)
            || c0.datacon.name != c.datacon.name
        {
            // Two different tags for one value.
            env.mark_inconsistent();
            return env;
        }
        if exclusive {
            // The same exclusive block arriving twice.
            env.mark_inconsistent();
        }
        match (&c0.adopts, &c.adopts) {
            (None, None) => {}
            (Some(a0), Some(a1)) if env.equal(a0, a1) => {}
            _ => env.mark_inconsistent(),
        }
        // Co-unify field by field: both sides are singletons after
        // unfolding.
        let pairs: Vec<(Var, Var)> = c0
            .fields
            .iter()
            .zip(fields.iter())
            .filter_map(|(f0, f1)| match (f0, f1) {
                (Field::Value(_, t0), Field::Value(_, t1)) => {
                    match (env.modulo_flex(t0), env.modulo_flex(t1)) {
                        (Type::Singleton(a), Type::Singleton(b)) => {
                            match (env.modulo_flex(&a), env.modulo_flex(&b)) {
                                (Type::Open(va), Type::Open(vb)) => Some((va, vb)),
                                _ => None,
                            }
                        }
                        _ => None,
                    }
                }
                _ => None,
            })
            .collect();
        for (a, b) in pairs {
            env = unify(env, a, b, interner);
        }
        return env;
    }

    env.push_permission(
        x,
        Type::Concrete(Box::new(Concrete {
            datacon: c.datacon,
            fields,
            adopts: c.adopts.clone(),
        })),
    );
    env
}

fn add_tuple(mut env: Env, x: Var, ts: &[Type], interner: &Interner) -> Env {
    let mut components = Vec::new();
    for t in ts {
        let (e, s) = unfold_component(env, t, interner);
        env = e;
        components.push(s);
    }

    let existing = env.permissions(x).iter().find_map(|p| {
        match env.modulo_flex(p) {
            Type::Tuple(ts0) => Some(ts0),
            _ => None,
        }
    });

    if let Some(ts0) = existing {
        if ts0.len() != components.len() {
            env.mark_inconsistent();
            return env;
        }
        let pairs: Vec<(Var, Var)> = ts0
            .iter()
            .zip(components.iter())
            .filter_map(|(t0, t1)| match (env.modulo_flex(t0), env.modulo_flex(t1)) {
                (Type::Singleton(a), Type::Singleton(b)) => {
                    match (env.modulo_flex(&a), env.modulo_flex(&b)) {
                        (Type::Open(va), Type::Open(vb)) => Some((va, vb)),
                        _ => None,
                    }
                }
                _ => None,
            })
            .collect();
        for (a, b) in pairs {
            env = unify(env, a, b, interner);
        }
        return env;
    }

    env.push_permission(x, Type::Tuple(components));
    env
}

/// The defining type variable behind a permission, when it has one: the
/// head of an application, a nullary defined type, or a block's data type.
/// Two different defined heads for one variable are a contradiction.
fn defined_head(env: &Env, t: &Type) -> Option<Var> {
    match env.modulo_flex(t) {
        Type::App(head, _) => match env.modulo_flex(&head) {
            Type::Open(v) if env.definition(v).is_some() => Some(v),
            _ => None,
        },
        Type::Open(v) if env.definition(v).is_some() => Some(v),
        Type::Concrete(c) => Some(c.datacon.datatype),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Branch, Definition};
    use crate::fact::{Fact, ParamMask};
    use crate::ty::Datacon;

    struct Fixture {
        env: Env,
        interner: Interner,
        int: Var,
        bool_: Var,
    }

    impl Fixture {
        fn new() -> Self {
            let mut env = Env::new();
            let mut interner = Interner::new();
            let int = env.bind_datatype(interner.intern("int"), &[], Span::dummy());
            env.install_definition(
                int,
                Definition::Abstract,
                Some(Fact::Duplicable(ParamMask::empty())),
            );
            let bool_ = env.bind_datatype(interner.intern("bool"), &[], Span::dummy());
            env.install_definition(
                bool_,
                Definition::Abstract,
                Some(Fact::Duplicable(ParamMask::empty())),
            );
            Fixture {
                env,
                interner,
                int,
                bool_,
            }
        }

        fn term(&mut self, name: &str) -> Var {
            self.env
                .bind_rigid(self.interner.intern(name), Kind::Term, Span::dummy())
        }

        fn bind_mutable_ref(&mut self) -> Var {
            let a = crate::ty::Binding::new(self.interner.intern("a"), Kind::Type, Span::dummy());
            let r = self
                .env
                .bind_datatype(self.interner.intern("ref"), &[a], Span::dummy());
            self.env.install_definition(
                r,
                Definition::Concrete {
                    flavor: DeclaredFlavor::Mutable,
                    branches: vec![Branch {
                        name: self.interner.intern("Ref"),
                        fields: vec![Field::Value(
                            self.interner.intern("contents"),
                            Type::Bound(0),
                        )],
                    }],
                    adopts: None,
                },
                None,
            );
            r
        }
    }

    #[test]
    fn adding_a_duplicable_twice_keeps_one_copy() {
        let mut fx = Fixture::new();
        let x = fx.term("x");
        let int = Type::Open(fx.int);
        let env = add(fx.env.clone(), x, &int, &fx.interner);
        let env = add(env, x, &int, &fx.interner);
        let copies = env
            .permissions(x)
            .iter()
            .filter(|p| env.equal(p, &int))
            .count();
        assert_eq!(copies, 1);
        assert!(!env.is_inconsistent());
    }

    #[test]
    fn add_then_sub_round_trips_for_duplicables() {
        let mut fx = Fixture::new();
        let x = fx.term("x");
        let int = Type::Open(fx.int);
        let env = add(fx.env.clone(), x, &int, &fx.interner);
        let sub = Subtractor::new(&fx.interner);
        let after = sub.sub(&env, x, &int).expect("just added");
        assert_eq!(after.permissions(x).len(), env.permissions(x).len());
    }

    #[test]
    fn two_exclusive_blocks_mark_inconsistency() {
        let mut fx = Fixture::new();
        let r = fx.bind_mutable_ref();
        let x = fx.term("x");
        let c = fx.term("c");
        let block = Type::Concrete(Box::new(Concrete {
            datacon: Datacon {
                datatype: r,
                name: fx.interner.intern("Ref"),
                branch: 0,
            },
            fields: vec![Field::Value(
                fx.interner.intern("contents"),
                Type::singleton(c),
            )],
            adopts: None,
        }));
        let env = add(fx.env.clone(), x, &block, &fx.interner);
        assert!(!env.is_inconsistent());
        let env = add(env, x, &block, &fx.interner);
        assert!(env.is_inconsistent());
    }

    #[test]
    fn tuple_co_unification_merges_components() {
        let mut fx = Fixture::new();
        let x = fx.term("x");
        let y = fx.term("y");
        let z = fx.term("z");
        let y2 = fx.term("y2");
        let z2 = fx.term("z2");
        let pair1 = Type::Tuple(vec![Type::singleton(y), Type::singleton(z)]);
        let pair2 = Type::Tuple(vec![Type::singleton(y2), Type::singleton(z2)]);
        let env = add(fx.env.clone(), x, &pair1, &fx.interner);
        let env = add(env, x, &pair2, &fx.interner);
        assert_eq!(env.repr(y2), env.repr(y));
        assert_eq!(env.repr(z2), env.repr(z));
        assert!(!env.is_inconsistent());
    }

    #[test]
    fn merged_aliases_with_clashing_types_are_inconsistent() {
        let mut fx = Fixture::new();
        let x = fx.term("x");
        let y = fx.term("y");
        let y2 = fx.term("y2");
        // x @ (=y) and x @ (=y2) force y = y2 ...
        let env = add(
            fx.env.clone(),
            x,
            &Type::Tuple(vec![Type::singleton(y)]),
            &fx.interner,
        );
        let env = add(env, x, &Type::Tuple(vec![Type::singleton(y2)]), &fx.interner);
        assert_eq!(env.repr(y2), env.repr(y));
        // ... and y @ int plus y2 @ bool is then a contradiction.
        let env = add(env, y, &Type::Open(fx.int), &fx.interner);
        let env = add(env, y2, &Type::Open(fx.bool_), &fx.interner);
        assert!(env.is_inconsistent());
    }

    #[test]
    fn unfolding_gives_every_field_its_own_variable() {
        let mut fx = Fixture::new();
        let r = fx.bind_mutable_ref();
        let x = fx.term("x");
        let int = Type::Open(fx.int);
        let block = Type::Concrete(Box::new(Concrete {
            datacon: Datacon {
                datatype: r,
                name: fx.interner.intern("Ref"),
                branch: 0,
            },
            fields: vec![Field::Value(fx.interner.intern("contents"), int.clone())],
            adopts: None,
        }));
        let env = add(fx.env.clone(), x, &block, &fx.interner);
        let stored = env
            .permissions(x)
            .iter()
            .find_map(|p| match env.modulo_flex(p) {
                Type::Concrete(c) => Some(c),
                _ => None,
            })
            .expect("block stored");
        // Field is now a singleton to a fresh variable that holds int.
        match &stored.fields[0] {
            Field::Value(_, Type::Singleton(inner)) => match env.modulo_flex(inner) {
                Type::Open(f) => {
                    let sub = Subtractor::new(&fx.interner);
                    assert!(sub.sub(&env, f, &int).is_ok());
                }
                other => panic!("expected open var, got {:?}", other),
            },
            other => panic!("expected singleton field, got {:?}", other),
        }
    }

    #[test]
    fn permissions_anchored_on_flexibles_float() {
        let mut fx = Fixture::new();
        let a = fx
            .env
            .bind_flexible(fx.interner.intern("a"), Kind::Term, Span::dummy());
        let p = Type::anchored(a, Type::Open(fx.int));
        let env = add_perm(fx.env.clone(), &p, &fx.interner);
        assert_eq!(env.floating_perms().len(), 1);
    }
}
