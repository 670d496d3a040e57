//! Subtraction: extracting a wanted permission from the environment.
//!
//! `sub_type(env, t1, t2)` answers "does `t1` provide `t2`?", returning an
//! updated environment on success. Flexible variables are instantiated
//! along the way; the portion of `t1` consumed by `t2` is accounted for.
//! `sub(env, x, t)` is `sub_type(env, =x, t)`: it searches `x`'s permission
//! list for a permission that provides `t`.
//!
//! Rules are tried in a fixed priority order:
//!
//! 1. an inconsistent environment proves anything;
//! 2. syntactic equality modulo flexible instantiations (and `unknown` as
//!    top);
//! 3. an uninstantiated flexible on either side is instantiated to the
//!    other side;
//! 4. `Imply`/`And` rewriting;
//! 5. quantifiers: rigid binders are opened before flexible ones —
//!    `Forall` on the right and `Exists` on the left first;
//! 6. the `Bar`/`Star` add-sub dance;
//! 7. structural congruence (tuples, concretes, arrows — arrows are
//!    contravariant in their domain and compared in an environment
//!    stripped to its duplicable part);
//! 8. application vs application, parameter-wise by variance;
//! 9. concrete vs application, by instantiating the defining branch;
//! 10. singleton unfolding, which delegates to the permission-list search.
//!
//! No call mutates the caller's environment: every rule works on a clone
//! and the clone is returned only on success. A failed attempt returns a
//! [`Derivation`] describing the rule it died in.

use mezzo_base::Interner;

use crate::add;
use crate::env::{Env, Mode, Var};
use crate::error::Derivation;
use crate::fact::{is_duplicable, is_exclusive};
use crate::print::TypePrinter;
use crate::ty::{collect, Constraint, Demand, Field, Kind, Type};

/// The subtraction engine. Holds the interner so failure derivations can
/// render types with their source names.
pub struct Subtractor<'a> {
    interner: &'a Interner,
}

impl<'a> Subtractor<'a> {
    pub fn new(interner: &'a Interner) -> Self {
        Subtractor { interner }
    }

    fn render(&self, env: &Env, t: &Type) -> String {
        TypePrinter::new(env, self.interner).render(t)
    }

    fn goal(&self, env: &Env, t1: &Type, t2: &Type) -> String {
        format!("{} - {}", self.render(env, t1), self.render(env, t2))
    }

    // ── sub_type ────────────────────────────────────────────────────────

    pub fn sub_type(&self, env: &Env, t1: &Type, t2: &Type) -> Result<Env, Derivation> {
        // Rule 1: inconsistency proves anything.
        if env.is_inconsistent() {
            return Ok(env.clone());
        }
        let t1 = env.modulo_flex(t1);
        let t2 = env.modulo_flex(t2);

        // Rule 2: trivial.
        if env.equal(&t1, &t2) {
            return Ok(env.clone());
        }
        if matches!(t2, Type::Unknown) {
            return Ok(env.clone());
        }

        // Rule 3: flexible shortcut.
        if let Type::Open(v) = &t2 {
            if env.is_flexible(*v) {
                return self.instantiate(env, *v, &t1);
            }
        }
        if let Type::Open(v) = &t1 {
            if env.is_flexible(*v) {
                return self.instantiate(env, *v, &t2);
            }
        }

        // Rule 4: And/Imply rewriting.
        if let Type::Imply(cs, u1) = &t1 {
            let wrapped = Type::And(cs.clone(), Box::new(t2.clone()));
            return self.sub_type(env, u1, &wrapped);
        }
        if let Type::And(cs, u2) = &t2 {
            let e = self.sub_type(env, &t1, u2)?;
            return self.check_constraints(&e, cs);
        }
        if let Type::And(_, u1) = &t1 {
            // The constraints were installed when t1 was added.
            return self.sub_type(env, u1, &t2);
        }
        if let Type::Imply(cs, u2) = &t2 {
            let mut e = env.clone();
            install_constraints(&mut e, cs);
            return self.sub_type(&e, &t1, u2);
        }

        // Rule 5: bind rigid before flexible.
        if let Type::Forall(b, body) = &t2 {
            let mut e = env.clone();
            let (_, opened) = e.open_binder(b, body, Mode::Rigid);
            return self
                .sub_type(&e, &t1, &opened)
                .map_err(|d| Derivation::node("forall-right", self.goal(env, &t1, &t2), vec![d]));
        }
        if let Type::Exists(b, body) = &t1 {
            let mut e = env.clone();
            let (_, opened) = e.open_binder(b, body, Mode::Rigid);
            return self
                .sub_type(&e, &opened, &t2)
                .map_err(|d| Derivation::node("exists-left", self.goal(env, &t1, &t2), vec![d]));
        }
        if let Type::Forall(b, body) = &t1 {
            let mut e = env.clone();
            let (_, opened) = e.open_binder(b, body, Mode::Flexible);
            return self
                .sub_type(&e, &opened, &t2)
                .map_err(|d| Derivation::node("forall-left", self.goal(env, &t1, &t2), vec![d]));
        }
        if let Type::Exists(b, body) = &t2 {
            let mut e = env.clone();
            let (_, opened) = e.open_binder(b, body, Mode::Flexible);
            return self
                .sub_type(&e, &t1, &opened)
                .map_err(|d| Derivation::node("exists-right", self.goal(env, &t1, &t2), vec![d]));
        }

        // Rule 6: the add-sub dance, whenever either side carries
        // permissions.
        let (v1, ps1) = collect(&t1);
        let (v2, ps2) = collect(&t2);
        if !ps1.is_empty() || !ps2.is_empty() {
            return self.add_sub(env, &v1, ps1, &v2, ps2);
        }

        // Rules 7-9: structural congruence.
        match (&t1, &t2) {
            (Type::Tuple(a1), Type::Tuple(a2)) if a1.len() == a2.len() => {
                let mut e = env.clone();
                for (x, y) in a1.iter().zip(a2.iter()) {
                    e = self.sub_type(&e, x, y).map_err(|d| {
                        Derivation::node("tuple", self.goal(env, &t1, &t2), vec![d])
                    })?;
                }
                Ok(e)
            }
            (Type::Concrete(c1), Type::Concrete(c2)) if c1.datacon == c2.datacon => {
                if c1.fields.len() != c2.fields.len() {
                    return Err(Derivation::leaf("concrete", self.goal(env, &t1, &t2)));
                }
                let adopts_ok = match (&c1.adopts, &c2.adopts) {
                    (None, None) => true,
                    (Some(a1), Some(a2)) => env.equal(a1, a2),
                    _ => false,
                };
                if !adopts_ok {
                    return Err(Derivation::leaf(
                        "concrete-adopts",
                        self.goal(env, &t1, &t2),
                    ));
                }
                let mut e = env.clone();
                for (f1, f2) in c1.fields.iter().zip(c2.fields.iter()) {
                    let (x, y) = match (f1, f2) {
                        (Field::Value(n1, x), Field::Value(n2, y)) if n1 == n2 => (x, y),
                        (Field::Permission(x), Field::Permission(y)) => (x, y),
                        _ => {
                            return Err(Derivation::leaf(
                                "concrete-fields",
                                self.goal(env, &t1, &t2),
                            ))
                        }
                    };
                    e = self.sub_type(&e, x, y).map_err(|d| {
                        Derivation::node("concrete", self.goal(env, &t1, &t2), vec![d])
                    })?;
                }
                Ok(e)
            }
            (Type::Arrow(d1, c1), Type::Arrow(d2, c2)) => {
                // Functions capture only duplicable state: the comparison
                // runs in a stripped environment. Instantiations taken
                // during it are imported back, consumed permissions are
                // not (nothing non-duplicable was there to consume).
                let stripped = env.strip_to_duplicable();
                let e1 = self.sub_type(&stripped, d2, d1).map_err(|d| {
                    Derivation::node("arrow-domain", self.goal(env, &t1, &t2), vec![d])
                })?;
                let e2 = self.sub_type(&e1, c1, c2).map_err(|d| {
                    Derivation::node("arrow-codomain", self.goal(env, &t1, &t2), vec![d])
                })?;
                let mut result = env.clone();
                result.import_flex_instantiations(&e2);
                Ok(result)
            }
            (Type::Singleton(a), Type::Singleton(b)) => {
                match (env.modulo_flex(a), env.modulo_flex(b)) {
                    (Type::Open(x), Type::Open(y)) => {
                        if env.is_flexible(y) {
                            self.instantiate(env, y, &Type::Open(x))
                        } else if env.is_flexible(x) {
                            self.instantiate(env, x, &Type::Open(y))
                        } else {
                            // Two distinct rigid values: fall back to the
                            // permission list of the left one.
                            self.sub(env, x, &t2)
                        }
                    }
                    _ => Err(Derivation::leaf("singleton", self.goal(env, &t1, &t2))),
                }
            }
            (Type::App(h1, a1), Type::App(h2, a2)) if env.equal(h1, h2) => {
                let head = match env.modulo_flex(h1) {
                    Type::Open(v) => v,
                    _ => return Err(Derivation::leaf("app-head", self.goal(env, &t1, &t2))),
                };
                if a1.len() != a2.len() {
                    return Err(Derivation::leaf("app-arity", self.goal(env, &t1, &t2)));
                }
                let variance = env.variance(head).to_vec();
                let mut e = env.clone();
                for (i, (x, y)) in a1.iter().zip(a2.iter()).enumerate() {
                    use crate::fact::Variance;
                    let via = variance.get(i).copied().unwrap_or(Variance::Invariant);
                    let wrap = |d| Derivation::node("app-param", self.goal(env, &t1, &t2), vec![d]);
                    match via {
                        Variance::Covariant => e = self.sub_type(&e, x, y).map_err(&wrap)?,
                        Variance::Contravariant => e = self.sub_type(&e, y, x).map_err(&wrap)?,
                        Variance::Invariant => {
                            e = self.sub_type(&e, x, y).map_err(&wrap)?;
                            e = self.sub_type(&e, y, x).map_err(&wrap)?;
                        }
                        Variance::Bivariant => {}
                    }
                }
                Ok(e)
            }
            // Concrete vs application of its own defining type:
            // instantiate that branch and retry structurally.
            (Type::Concrete(c), Type::App(h, args)) => {
                let head = match env.modulo_flex(h) {
                    Type::Open(v) => v,
                    _ => return Err(Derivation::leaf("fold", self.goal(env, &t1, &t2))),
                };
                if env.repr(c.datacon.datatype) != env.repr(head) {
                    return Err(Derivation::leaf("fold", self.goal(env, &t1, &t2)));
                }
                let branch = env
                    .resolved_branch(head, c.datacon.branch, args)
                    .ok_or_else(|| Derivation::leaf("fold", self.goal(env, &t1, &t2)))?;
                let target = Type::Concrete(Box::new(crate::ty::Concrete {
                    datacon: c.datacon,
                    fields: branch.fields,
                    adopts: env.resolved_adopts(head, args),
                }));
                self.sub_type(env, &t1, &target)
                    .map_err(|d| Derivation::node("fold", self.goal(env, &t1, &t2), vec![d]))
            }
            (Type::Concrete(c), Type::Open(h)) if env.is_rigid(*h) => {
                // Nullary type: same as above with no arguments.
                if env.repr(c.datacon.datatype) != env.repr(*h) {
                    return Err(Derivation::leaf("fold", self.goal(env, &t1, &t2)));
                }
                let branch = env
                    .resolved_branch(*h, c.datacon.branch, &[])
                    .ok_or_else(|| Derivation::leaf("fold", self.goal(env, &t1, &t2)))?;
                let target = Type::Concrete(Box::new(crate::ty::Concrete {
                    datacon: c.datacon,
                    fields: branch.fields,
                    adopts: env.resolved_adopts(*h, &[]),
                }));
                self.sub_type(env, &t1, &target)
                    .map_err(|d| Derivation::node("fold", self.goal(env, &t1, &t2), vec![d]))
            }
            _ => {
                // One-branch unfolding on either side, then singleton
                // unfolding as the last resort.
                if let Some(expanded) = env.expand_if_one_branch(&t1) {
                    return self.sub_type(env, &expanded, &t2).map_err(|d| {
                        Derivation::node("unfold-left", self.goal(env, &t1, &t2), vec![d])
                    });
                }
                if let Some(expanded) = env.expand_if_one_branch(&t2) {
                    return self.sub_type(env, &t1, &expanded).map_err(|d| {
                        Derivation::node("unfold-right", self.goal(env, &t1, &t2), vec![d])
                    });
                }
                if let Type::Singleton(inner) = &t1 {
                    if let Type::Open(x) = env.modulo_flex(inner) {
                        return self.sub(env, x, &t2);
                    }
                }
                Err(Derivation::leaf("no-rule", self.goal(env, &t1, &t2)))
            }
        }
    }

    fn instantiate(&self, env: &Env, v: Var, t: &Type) -> Result<Env, Derivation> {
        let mut e = env.clone();
        if e.instantiate_flexible(v, &env.resolve_deep(t)) {
            Ok(e)
        } else {
            Err(Derivation::leaf(
                "instantiate",
                format!(
                    "cannot instantiate {} to {}",
                    TypePrinter::new(env, self.interner).var(v),
                    self.render(env, t)
                ),
            ))
        }
    }

    // ── The permission-list search ──────────────────────────────────────

    /// `sub(env, x, t)`: find a permission of `x` that provides `t`.
    ///
    /// Candidates are ordered non-duplicable first, then duplicable, then
    /// singletons, then `unknown`, preserving insertion order within each
    /// class; the ordering keeps singletons and `unknown` from masking
    /// the permissions that actually carry information. The matched
    /// permission is removed unless duplicable.
    pub fn sub(&self, env: &Env, x: Var, t: &Type) -> Result<Env, Derivation> {
        if env.is_inconsistent() {
            return Ok(env.clone());
        }
        let x = env.repr(x);
        let t = env.modulo_flex(t);
        if matches!(t, Type::Unknown) {
            return Ok(env.clone());
        }
        let self_witness = Type::singleton(x);
        if env.equal(&t, &self_witness) {
            return Ok(env.clone());
        }

        let perms = env.permissions(x).to_vec();
        let mut order: Vec<usize> = (0..perms.len()).collect();
        order.sort_by_key(|&i| perm_class(env, &perms[i]));

        let mut attempts = Vec::new();
        for i in order {
            let p = &perms[i];
            // The self-witness redirects to x itself; trying it would loop.
            if env.equal(p, &self_witness) {
                continue;
            }
            let mut e = env.clone();
            if !is_duplicable(env, p) {
                e.remove_permission_at(x, i);
            }
            match self.sub_type(&e, p, &t) {
                Ok(e2) => return Ok(e2),
                Err(d) => attempts.push(d),
            }
        }
        Err(Derivation::node(
            "try-perms",
            format!(
                "{} - {}",
                TypePrinter::new(env, self.interner).var(x),
                self.render(env, &t)
            ),
            attempts,
        ))
    }

    // ── Permissions ─────────────────────────────────────────────────────

    /// Subtract a `perm`-kinded type: an anchored permission, a star of
    /// them, a floating permission variable, or `empty`.
    pub fn sub_perm(&self, env: &Env, p: &Type) -> Result<Env, Derivation> {
        if env.is_inconsistent() {
            return Ok(env.clone());
        }
        let p = env.modulo_flex(p);
        match &p {
            Type::Empty => Ok(env.clone()),
            Type::Star(l, r) => {
                let e = self.sub_perm(env, l)?;
                self.sub_perm(&e, r)
            }
            Type::Anchored(x, t) => match env.modulo_flex(x) {
                Type::Open(xv) => {
                    if env.is_flexible(xv) {
                        Err(Derivation::leaf(
                            "flexible-anchor",
                            self.render(env, &p),
                        ))
                    } else {
                        self.sub(env, xv, t)
                    }
                }
                _ => Err(Derivation::leaf("anchor", self.render(env, &p))),
            },
            Type::Open(v) => {
                // An abstract permission variable: look it up among the
                // floating permissions.
                if env.is_flexible(*v) {
                    return Err(Derivation::leaf("flexible-perm", self.render(env, &p)));
                }
                let mut e = env.clone();
                let floating = e.floating_perms().to_vec();
                for (i, q) in floating.iter().enumerate() {
                    if e.equal(q, &p) {
                        if !is_duplicable(&e, q) {
                            let mut rest = floating.clone();
                            rest.remove(i);
                            e.set_floating_perms(rest);
                        }
                        return Ok(e);
                    }
                }
                Err(Derivation::leaf("floating", self.render(env, &p)))
            }
            _ => self.sub_type(env, &Type::Empty, &p),
        }
    }

    // ── The add-sub dance ───────────────────────────────────────────────

    /// Split `(t1 | p1*) - (t2 | p2*)`: subtract the value parts, then
    /// alternate between assimilating available permissions from the left
    /// and discharging wanted permissions on the right until neither side
    /// can make progress, and finally try to close the remaining flexible
    /// permission variables.
    fn add_sub(
        &self,
        env: &Env,
        v1: &Type,
        ps1: Vec<Type>,
        v2: &Type,
        ps2: Vec<Type>,
    ) -> Result<Env, Derivation> {
        let detail = || {
            format!(
                "({} | ...) - ({} | ...)",
                self.render(env, v1),
                self.render(env, v2)
            )
        };
        let mut e = self
            .sub_type(env, v1, v2)
            .map_err(|d| Derivation::node("add-sub", detail(), vec![d]))?;

        let mut pending_add = ps1;
        let mut pending_sub = ps2;
        loop {
            let mut progress = false;

            // Assimilate permissions whose anchor is already rigid; ones
            // anchored on a still-flexible variable wait for it to be
            // solved.
            let mut still = Vec::new();
            for p in pending_add.drain(..) {
                if anchor_is_flexible(&e, &p) {
                    still.push(p);
                } else {
                    e = add::add_perm(e, &p, self.interner);
                    progress = true;
                }
            }
            pending_add = still;

            // Discharge whatever can be discharged now.
            let mut still = Vec::new();
            for p in pending_sub.drain(..) {
                if anchor_is_flexible(&e, &p) {
                    still.push(p);
                    continue;
                }
                match self.sub_perm(&e, &p) {
                    Ok(e2) => {
                        e = e2;
                        progress = true;
                    }
                    Err(_) => still.push(p),
                }
            }
            pending_sub = still;

            if !progress {
                break;
            }
        }

        if pending_sub.is_empty() {
            // Unclaimed left-over permissions are still worth keeping.
            for p in pending_add {
                e = add::add_perm(e, &p, self.interner);
            }
            return Ok(e);
        }

        // Closing, one: a single remaining flexible permission variable
        // swallows the star of everything left on the other side.
        if pending_sub.len() == 1 {
            if let Type::Open(v) = e.modulo_flex(&pending_sub[0]) {
                if e.is_flexible(v) && *e.kind(v) == Kind::Perm {
                    let star = Type::star_of(pending_add.clone());
                    let mut e2 = e.clone();
                    if e2.instantiate_flexible(v, &star) {
                        return Ok(e2);
                    }
                }
            }
        }

        // Closing, two: pair wanted permissions on flexible anchors with
        // available anchored permissions, merging the anchors.
        let mut attempts = Vec::new();
        'wanted: for (wi, want) in pending_sub.iter().enumerate() {
            if let Type::Anchored(wx, wt) = &e.modulo_flex(want) {
                if let Type::Open(wxv) = e.modulo_flex(wx) {
                    if !e.is_flexible(wxv) {
                        continue;
                    }
                    for have in &pending_add {
                        if let Type::Anchored(hx, _) = &e.modulo_flex(have) {
                            if let Type::Open(hxv) = e.modulo_flex(hx) {
                                let mut e2 = e.clone();
                                if !e2.instantiate_flexible(wxv, &Type::Open(hxv)) {
                                    continue;
                                }
                                for p in &pending_add {
                                    e2 = add::add_perm(e2, p, self.interner);
                                }
                                match self.sub(&e2, hxv, wt) {
                                    Ok(mut e3) => {
                                        let mut rest = pending_sub.clone();
                                        rest.remove(wi);
                                        for p in rest {
                                            match self.sub_perm(&e3, &p) {
                                                Ok(e4) => e3 = e4,
                                                Err(d) => {
                                                    attempts.push(d);
                                                    continue 'wanted;
                                                }
                                            }
                                        }
                                        return Ok(e3);
                                    }
                                    Err(d) => attempts.push(d),
                                }
                            }
                        }
                    }
                }
            }
        }

        Err(Derivation::node("add-sub", detail(), attempts))
    }

    // ── Constraints ─────────────────────────────────────────────────────

    /// Check mode constraints against the current facts.
    pub fn check_constraints(
        &self,
        env: &Env,
        cs: &[Constraint],
    ) -> Result<Env, Derivation> {
        if env.is_inconsistent() {
            return Ok(env.clone());
        }
        for c in cs {
            let holds = match c.demand {
                Demand::Duplicable => is_duplicable(env, &env.resolve_deep(&c.ty)),
                Demand::Exclusive => is_exclusive(env, &env.resolve_deep(&c.ty)),
            };
            if !holds {
                let what = match c.demand {
                    Demand::Duplicable => "duplicable",
                    Demand::Exclusive => "exclusive",
                };
                return Err(Derivation::leaf(
                    "constraint",
                    format!("{} {}", what, self.render(env, &c.ty)),
                ));
            }
        }
        Ok(env.clone())
    }
}

/// Assume a set of constraints: facts of the named type variables are
/// upgraded. A constraint on anything but an abstract type variable that
/// does not already hold is an absurd hypothesis and makes the
/// environment inconsistent (everything then checks vacuously).
pub fn install_constraints(env: &mut Env, cs: &[Constraint]) {
    for c in cs {
        let t = env.modulo_flex(&c.ty);
        let fact = match c.demand {
            Demand::Duplicable => crate::fact::Fact::Duplicable(Default::default()),
            Demand::Exclusive => crate::fact::Fact::Exclusive,
        };
        match t {
            Type::Open(v) if *env.kind(v) != Kind::Term => env.set_fact(v, fact),
            _ => {
                let holds = match c.demand {
                    Demand::Duplicable => is_duplicable(env, &t),
                    Demand::Exclusive => is_exclusive(env, &t),
                };
                if !holds {
                    env.mark_inconsistent();
                }
            }
        }
    }
}

/// Priority class for the permission-list search: real permissions first,
/// duplicable ones next, then singletons, `unknown` last.
fn perm_class(env: &Env, p: &Type) -> u8 {
    match env.modulo_flex(p) {
        Type::Unknown => 3,
        Type::Singleton(_) => 2,
        other => {
            if is_duplicable(env, &other) {
                1
            } else {
                0
            }
        }
    }
}

/// Is this permission anchored on a still-flexible variable?
fn anchor_is_flexible(env: &Env, p: &Type) -> bool {
    match env.modulo_flex(p) {
        Type::Anchored(x, _) => match env.modulo_flex(&x) {
            Type::Open(v) => env.is_flexible(v),
            _ => false,
        },
        Type::Open(v) => env.is_flexible(v),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Branch, DeclaredFlavor, Definition};
    use crate::fact::{Fact, ParamMask};
    use crate::ty::{Binding, Flavor};
    use mezzo_base::Span;

    struct Fixture {
        env: Env,
        interner: Interner,
        int: Var,
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
            Fixture { env, interner, int }
        }

        fn int(&self) -> Type {
            Type::Open(self.int)
        }

        fn term(&mut self, name: &str) -> Var {
            self.env
                .bind_rigid(self.interner.intern(name), Kind::Term, Span::dummy())
        }

        fn flexible_type(&mut self, name: &str) -> Var {
            self.env
                .bind_flexible(self.interner.intern(name), Kind::Type, Span::dummy())
        }
    }

    #[test]
    fn equal_types_subtract_trivially() {
        let fx = Fixture::new();
        let sub = Subtractor::new(&fx.interner);
        assert!(sub.sub_type(&fx.env, &fx.int(), &fx.int()).is_ok());
    }

    #[test]
    fn anything_subtracts_to_unknown() {
        let fx = Fixture::new();
        let sub = Subtractor::new(&fx.interner);
        assert!(sub.sub_type(&fx.env, &fx.int(), &Type::Unknown).is_ok());
    }

    #[test]
    fn inconsistent_environment_proves_anything() {
        let mut fx = Fixture::new();
        fx.env.mark_inconsistent();
        let sub = Subtractor::new(&fx.interner);
        assert!(sub.sub_type(&fx.env, &fx.int(), &Type::Dynamic).is_ok());
    }

    #[test]
    fn flexible_right_side_gets_instantiated() {
        let mut fx = Fixture::new();
        let a = fx.flexible_type("a");
        let sub = Subtractor::new(&fx.interner);
        let e = sub
            .sub_type(&fx.env, &fx.int(), &Type::Open(a))
            .expect("instantiation should succeed");
        assert!(e.equal(&Type::Open(a), &fx.int()));
        // The caller's environment is untouched.
        assert!(fx.env.is_flexible(a));
    }

    #[test]
    fn arrow_subtraction_is_contravariant_in_the_domain() {
        let fx = Fixture::new();
        let sub = Subtractor::new(&fx.interner);
        let pair = Type::Tuple(vec![fx.int(), fx.int()]);
        let narrow = Type::arrow(pair.clone(), fx.int());
        let wide = Type::arrow(pair, Type::Unknown);
        // (int, int) -> int provides (int, int) -> unknown ...
        assert!(sub.sub_type(&fx.env, &narrow, &wide).is_ok());
        // ... but not the other way around.
        assert!(sub.sub_type(&fx.env, &wide, &narrow).is_err());
    }

    #[test]
    fn permission_search_consumes_non_duplicable_matches() {
        let mut fx = Fixture::new();
        // mutable data cell = Cell {}
        let cell = fx
            .env
            .bind_datatype(fx.interner.intern("cell"), &[], Span::dummy());
        fx.env.install_definition(
            cell,
            Definition::Concrete {
                flavor: DeclaredFlavor::Mutable,
                branches: vec![Branch {
                    name: fx.interner.intern("Cell"),
                    fields: vec![],
                }],
                adopts: None,
            },
            None,
        );
        let x = fx.term("x");
        fx.env.push_permission(x, Type::Open(cell));
        let sub = Subtractor::new(&fx.interner);
        let e = sub
            .sub(&fx.env, x, &Type::Open(cell))
            .expect("x holds the permission");
        // Exclusive permission burned: a second subtraction fails.
        assert!(sub.sub(&e, x, &Type::Open(cell)).is_err());
    }

    #[test]
    fn permission_search_keeps_duplicable_matches() {
        let mut fx = Fixture::new();
        let x = fx.term("x");
        fx.env.push_permission(x, fx.int());
        let sub = Subtractor::new(&fx.interner);
        let e = sub.sub(&fx.env, x, &fx.int()).expect("x holds int");
        assert!(sub.sub(&e, x, &fx.int()).is_ok());
    }

    #[test]
    fn singleton_unfolding_reaches_through_aliases() {
        let mut fx = Fixture::new();
        let x = fx.term("x");
        let y = fx.term("y");
        // y @ int, x @ =y: subtracting int from x goes through y.
        fx.env.push_permission(y, fx.int());
        fx.env.push_permission(x, Type::singleton(y));
        let sub = Subtractor::new(&fx.interner);
        assert!(sub.sub(&fx.env, x, &fx.int()).is_ok());
    }

    #[test]
    fn forall_on_the_left_is_opened_flexibly() {
        let mut fx = Fixture::new();
        let a = Binding {
            name: fx.interner.intern("a"),
            kind: Kind::Type,
            span: Span::dummy(),
            flavor: Flavor::CanInstantiate,
        };
        // [a] (a -> a)  provides  int -> int.
        let poly = Type::Forall(
            a,
            Box::new(Type::arrow(Type::Bound(0), Type::Bound(0))),
        );
        let mono = Type::arrow(fx.int(), fx.int());
        let sub = Subtractor::new(&fx.interner);
        assert!(sub.sub_type(&fx.env, &poly, &mono).is_ok());
    }

    #[test]
    fn bar_releases_left_over_permissions() {
        let mut fx = Fixture::new();
        let y = fx.term("y");
        // (int | y @ int) - int  succeeds and leaves y @ int available.
        let t1 = Type::bar(fx.int(), Type::anchored(y, fx.int()));
        let sub = Subtractor::new(&fx.interner);
        let e = sub
            .sub_type(&fx.env, &t1, &fx.int())
            .expect("value parts match");
        assert!(sub.sub(&e, y, &fx.int()).is_ok());
    }

    #[test]
    fn failed_subtraction_reports_a_derivation() {
        let mut fx = Fixture::new();
        let x = fx.term("x");
        let sub = Subtractor::new(&fx.interner);
        let err = sub.sub(&fx.env, x, &Type::Dynamic).unwrap_err();
        assert_eq!(err.rule, "try-perms");
    }

    #[test]
    fn sub_agrees_with_sub_type_on_singletons() {
        let mut fx = Fixture::new();
        let x = fx.term("x");
        fx.env.push_permission(x, fx.int());
        let sub = Subtractor::new(&fx.interner);
        // sub(E, x, t) and sub_type(E, =x, t) stand or fall together.
        assert!(sub.sub(&fx.env, x, &fx.int()).is_ok());
        assert!(sub
            .sub_type(&fx.env, &Type::singleton(x), &fx.int())
            .is_ok());
        assert!(sub.sub(&fx.env, x, &Type::Dynamic).is_err());
        assert!(sub
            .sub_type(&fx.env, &Type::singleton(x), &Type::Dynamic)
            .is_err());
    }
}
