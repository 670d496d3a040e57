//! Internal type representation.
//!
//! The checker works on a *locally nameless* syntax: variables bound by a
//! quantifier are de Bruijn indices ([`Type::Bound`]), free variables are
//! [`Type::Open`] references into the environment. Opening a quantifier
//! allocates a fresh environment variable and substitutes it for index 0;
//! closing is the inverse. Substitution is capture-avoiding by construction.
//!
//! Types of kind `perm` describe assertions rather than values:
//! `Anchored(x, t)` is the permission `x @ t`, `Star` conjoins permissions,
//! `Empty` is the trivial permission, and `Bar(t, p)` bundles a value type
//! with a permission (written `t | p` in the surface syntax).
//!
//! Invariant: a fully-opened type — anything stored in a permission list or
//! handed to subtraction — contains no dangling `Bound` index. `Bound` only
//! appears under a quantifier that is yet to be opened.

use mezzo_base::{Span, Symbol};

use crate::env::Var;

/// Kinds, checked separately from types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Program values.
    Term,
    /// Value types.
    Type,
    /// Permissions.
    Perm,
    /// Type constructors: `Kind -> Kind`.
    Arrow(Box<Kind>, Box<Kind>),
}

impl Kind {
    /// The kind of a type constructor taking `arity` parameters of the given
    /// kinds and returning kind `type`.
    pub fn constructor(params: &[Kind]) -> Kind {
        params.iter().rev().fold(Kind::Type, |acc, p| {
            Kind::Arrow(Box::new(p.clone()), Box::new(acc))
        })
    }

    /// Number of parameters before the final `type`/`perm` kind.
    pub fn arity(&self) -> usize {
        match self {
            Kind::Arrow(_, rest) => 1 + rest.arity(),
            _ => 0,
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Term => write!(f, "term"),
            Kind::Type => write!(f, "type"),
            Kind::Perm => write!(f, "perm"),
            Kind::Arrow(k1, k2) => write!(f, "{} -> {}", k1, k2),
        }
    }
}

/// Whether a user-written type application may instantiate this binder.
///
/// Universal binders introduced by the translator for inferred polymorphism
/// are `CanInstantiate`; binders the user wrote with an explicit kind
/// annotation that must stay abstract are `CannotInstantiate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    CanInstantiate,
    CannotInstantiate,
}

/// A quantifier binding: name hint, kind, source location, flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: Symbol,
    pub kind: Kind,
    pub span: Span,
    pub flavor: Flavor,
}

impl Binding {
    pub fn new(name: Symbol, kind: Kind, span: Span) -> Self {
        Binding {
            name,
            kind,
            span,
            flavor: Flavor::CanInstantiate,
        }
    }

    pub fn cannot_instantiate(mut self) -> Self {
        self.flavor = Flavor::CannotInstantiate;
        self
    }
}

/// Whether a constraint demands duplicability or exclusivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Demand {
    Duplicable,
    Exclusive,
}

/// A mode constraint on a type, as in `duplicable a => t`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub demand: Demand,
    pub ty: Type,
}

/// Reference to a data constructor, resolved to its defining type variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datacon {
    /// The algebraic data type this constructor belongs to.
    pub datatype: Var,
    /// Constructor name.
    pub name: Symbol,
    /// Position of the branch in the definition.
    pub branch: usize,
}

/// One field of a concrete type: a named value field or an anonymous
/// permission carried inside the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Value(Symbol, Type),
    Permission(Type),
}

impl Field {
    /// The field's type, whichever shape it has.
    pub fn ty(&self) -> &Type {
        match self {
            Field::Value(_, t) | Field::Permission(t) => t,
        }
    }

    pub fn map_ty(&self, f: impl FnOnce(&Type) -> Type) -> Field {
        match self {
            Field::Value(name, t) => Field::Value(*name, f(t)),
            Field::Permission(t) => Field::Permission(f(t)),
        }
    }
}

/// A structural block: known constructor, fields, optional adopts clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concrete {
    pub datacon: Datacon,
    pub fields: Vec<Field>,
    /// Type of objects this block may adopt; `None` when the defining type
    /// has no adopts clause.
    pub adopts: Option<Type>,
}

/// The internal syntax of types and permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Top: every value has it, it tells you nothing.
    Unknown,
    /// Runtime-identity witness, required by adoption.
    Dynamic,
    /// De Bruijn index, only under an unopened quantifier.
    Bound(usize),
    /// A variable of the environment.
    Open(Var),
    /// Universal quantification.
    Forall(Binding, Box<Type>),
    /// Existential quantification.
    Exists(Binding, Box<Type>),
    /// Application of a defined type to arguments.
    App(Box<Type>, Vec<Type>),
    /// Tuples, structurally compared component-wise.
    Tuple(Vec<Type>),
    /// A block with a known constructor.
    Concrete(Box<Concrete>),
    /// `=x`: the type of exactly the value `x`.
    Singleton(Box<Type>),
    /// Function type; domain and codomain may bundle permissions via `Bar`.
    Arrow(Box<Type>, Box<Type>),
    /// `t | p`: a value type with an attached permission.
    Bar(Box<Type>, Box<Type>),
    /// The permission `x @ t`.
    Anchored(Box<Type>, Box<Type>),
    /// Permission conjunction `p * q`.
    Star(Box<Type>, Box<Type>),
    /// The trivial permission.
    Empty,
    /// `c /\ t`: the constraints have been established.
    And(Vec<Constraint>, Box<Type>),
    /// `c => t`: the constraints are owed before `t` may be used.
    Imply(Vec<Constraint>, Box<Type>),
}

impl Type {
    pub fn open(v: Var) -> Type {
        Type::Open(v)
    }

    /// The singleton `=v`.
    pub fn singleton(v: Var) -> Type {
        Type::Singleton(Box::new(Type::Open(v)))
    }

    pub fn anchored(v: Var, t: Type) -> Type {
        Type::Anchored(Box::new(Type::Open(v)), Box::new(t))
    }

    pub fn arrow(dom: Type, cod: Type) -> Type {
        Type::Arrow(Box::new(dom), Box::new(cod))
    }

    pub fn bar(t: Type, p: Type) -> Type {
        Type::Bar(Box::new(t), Box::new(p))
    }

    pub fn star(p: Type, q: Type) -> Type {
        match (p, q) {
            (Type::Empty, q) => q,
            (p, Type::Empty) => p,
            (p, q) => Type::Star(Box::new(p), Box::new(q)),
        }
    }

    /// Conjoin a whole list of permissions.
    pub fn star_of(perms: Vec<Type>) -> Type {
        perms.into_iter().fold(Type::Empty, Type::star)
    }

    /// `true` for the syntactic forms of kind `perm`.
    pub fn is_perm(&self) -> bool {
        matches!(
            self,
            Type::Anchored(..) | Type::Star(..) | Type::Empty
        )
    }
}

/// Shift every `Bound` index at or above `cutoff` up by `k`.
///
/// Used when a substituted type is pushed under an additional binder.
pub fn lift_above(t: &Type, cutoff: usize, k: usize) -> Type {
    match t {
        Type::Bound(i) if *i >= cutoff => Type::Bound(i + k),
        Type::Bound(_) | Type::Open(_) | Type::Unknown | Type::Dynamic | Type::Empty => t.clone(),
        Type::Forall(b, body) => Type::Forall(b.clone(), Box::new(lift_above(body, cutoff + 1, k))),
        Type::Exists(b, body) => Type::Exists(b.clone(), Box::new(lift_above(body, cutoff + 1, k))),
        Type::App(head, args) => Type::App(
            Box::new(lift_above(head, cutoff, k)),
            args.iter().map(|a| lift_above(a, cutoff, k)).collect(),
        ),
        Type::Tuple(ts) => Type::Tuple(ts.iter().map(|a| lift_above(a, cutoff, k)).collect()),
        Type::Concrete(c) => Type::Concrete(Box::new(Concrete {
            datacon: c.datacon,
            fields: c
                .fields
                .iter()
                .map(|fld| fld.map_ty(|t| lift_above(t, cutoff, k)))
                .collect(),
            adopts: c.adopts.as_ref().map(|a| lift_above(a, cutoff, k)),
        })),
        Type::Singleton(t) => Type::Singleton(Box::new(lift_above(t, cutoff, k))),
        Type::Arrow(d, c) => Type::Arrow(
            Box::new(lift_above(d, cutoff, k)),
            Box::new(lift_above(c, cutoff, k)),
        ),
        Type::Bar(t, p) => Type::Bar(
            Box::new(lift_above(t, cutoff, k)),
            Box::new(lift_above(p, cutoff, k)),
        ),
        Type::Anchored(x, t) => Type::Anchored(
            Box::new(lift_above(x, cutoff, k)),
            Box::new(lift_above(t, cutoff, k)),
        ),
        Type::Star(p, q) => Type::Star(
            Box::new(lift_above(p, cutoff, k)),
            Box::new(lift_above(q, cutoff, k)),
        ),
        Type::And(cs, t) => Type::And(
            lift_constraints(cs, cutoff, k),
            Box::new(lift_above(t, cutoff, k)),
        ),
        Type::Imply(cs, t) => Type::Imply(
            lift_constraints(cs, cutoff, k),
            Box::new(lift_above(t, cutoff, k)),
        ),
    }
}

/// Shift every free index of `t` up by `k`.
pub fn lift(k: usize, t: &Type) -> Type {
    lift_above(t, 0, k)
}

fn lift_constraints(cs: &[Constraint], cutoff: usize, k: usize) -> Vec<Constraint> {
    cs.iter()
        .map(|c| Constraint {
            demand: c.demand,
            ty: lift_above(&c.ty, cutoff, k),
        })
        .collect()
}

/// Replace `Bound(index)` with `replacement`, decrementing deeper indices.
///
/// The replacement is lifted as the traversal crosses binders, keeping the
/// substitution capture-avoiding.
pub fn subst(t: &Type, index: usize, replacement: &Type) -> Type {
    match t {
        Type::Bound(i) => {
            if *i == index {
                replacement.clone()
            } else if *i > index {
                Type::Bound(i - 1)
            } else {
                Type::Bound(*i)
            }
        }
        Type::Open(_) | Type::Unknown | Type::Dynamic | Type::Empty => t.clone(),
        Type::Forall(b, body) => Type::Forall(
            b.clone(),
            Box::new(subst(body, index + 1, &lift(1, replacement))),
        ),
        Type::Exists(b, body) => Type::Exists(
            b.clone(),
            Box::new(subst(body, index + 1, &lift(1, replacement))),
        ),
        Type::App(head, args) => Type::App(
            Box::new(subst(head, index, replacement)),
            args.iter().map(|a| subst(a, index, replacement)).collect(),
        ),
        Type::Tuple(ts) => Type::Tuple(ts.iter().map(|a| subst(a, index, replacement)).collect()),
        Type::Concrete(c) => Type::Concrete(Box::new(Concrete {
            datacon: c.datacon,
            fields: c
                .fields
                .iter()
                .map(|fld| fld.map_ty(|t| subst(t, index, replacement)))
                .collect(),
            adopts: c.adopts.as_ref().map(|a| subst(a, index, replacement)),
        })),
        Type::Singleton(inner) => Type::Singleton(Box::new(subst(inner, index, replacement))),
        Type::Arrow(d, c) => Type::Arrow(
            Box::new(subst(d, index, replacement)),
            Box::new(subst(c, index, replacement)),
        ),
        Type::Bar(inner, p) => Type::Bar(
            Box::new(subst(inner, index, replacement)),
            Box::new(subst(p, index, replacement)),
        ),
        Type::Anchored(x, inner) => Type::Anchored(
            Box::new(subst(x, index, replacement)),
            Box::new(subst(inner, index, replacement)),
        ),
        Type::Star(p, q) => Type::Star(
            Box::new(subst(p, index, replacement)),
            Box::new(subst(q, index, replacement)),
        ),
        Type::And(cs, inner) => Type::And(
            subst_constraints(cs, index, replacement),
            Box::new(subst(inner, index, replacement)),
        ),
        Type::Imply(cs, inner) => Type::Imply(
            subst_constraints(cs, index, replacement),
            Box::new(subst(inner, index, replacement)),
        ),
    }
}

fn subst_constraints(cs: &[Constraint], index: usize, replacement: &Type) -> Vec<Constraint> {
    cs.iter()
        .map(|c| Constraint {
            demand: c.demand,
            ty: subst(&c.ty, index, replacement),
        })
        .collect()
}

/// Open a quantifier body by substituting `Open(v)` for index 0.
pub fn open_with(body: &Type, v: Var) -> Type {
    subst(body, 0, &Type::Open(v))
}

/// Close over `v`: replace `Open(v)` with `Bound(index)`, incrementing the
/// index under binders. Inverse of [`open_with`].
pub fn close_over(t: &Type, v: Var, index: usize) -> Type {
    match t {
        Type::Open(w) if *w == v => Type::Bound(index),
        Type::Open(_) | Type::Bound(_) | Type::Unknown | Type::Dynamic | Type::Empty => t.clone(),
        Type::Forall(b, body) => Type::Forall(b.clone(), Box::new(close_over(body, v, index + 1))),
        Type::Exists(b, body) => Type::Exists(b.clone(), Box::new(close_over(body, v, index + 1))),
        Type::App(head, args) => Type::App(
            Box::new(close_over(head, v, index)),
            args.iter().map(|a| close_over(a, v, index)).collect(),
        ),
        Type::Tuple(ts) => Type::Tuple(ts.iter().map(|a| close_over(a, v, index)).collect()),
        Type::Concrete(c) => Type::Concrete(Box::new(Concrete {
            datacon: c.datacon,
            fields: c
                .fields
                .iter()
                .map(|fld| fld.map_ty(|t| close_over(t, v, index)))
                .collect(),
            adopts: c.adopts.as_ref().map(|a| close_over(a, v, index)),
        })),
        Type::Singleton(inner) => Type::Singleton(Box::new(close_over(inner, v, index))),
        Type::Arrow(d, c) => Type::Arrow(
            Box::new(close_over(d, v, index)),
            Box::new(close_over(c, v, index)),
        ),
        Type::Bar(inner, p) => Type::Bar(
            Box::new(close_over(inner, v, index)),
            Box::new(close_over(p, v, index)),
        ),
        Type::Anchored(x, inner) => Type::Anchored(
            Box::new(close_over(x, v, index)),
            Box::new(close_over(inner, v, index)),
        ),
        Type::Star(p, q) => Type::Star(
            Box::new(close_over(p, v, index)),
            Box::new(close_over(q, v, index)),
        ),
        Type::And(cs, inner) => Type::And(
            close_constraints(cs, v, index),
            Box::new(close_over(inner, v, index)),
        ),
        Type::Imply(cs, inner) => Type::Imply(
            close_constraints(cs, v, index),
            Box::new(close_over(inner, v, index)),
        ),
    }
}

fn close_constraints(cs: &[Constraint], v: Var, index: usize) -> Vec<Constraint> {
    cs.iter()
        .map(|c| Constraint {
            demand: c.demand,
            ty: close_over(&c.ty, v, index),
        })
        .collect()
}

/// Instantiate a definition stored under `n` parameter binders.
///
/// Parameter `k` of the definition appears as `Bound(n - 1 - k)`; each
/// substitution of index 0 therefore consumes the *last* remaining argument.
pub fn instantiate(t: &Type, args: &[Type]) -> Type {
    args.iter().rev().fold(t.clone(), |acc, a| subst(&acc, 0, a))
}

/// Split a type into its value part and attached permissions.
///
/// `Bar(t, p)` contributes `p`; `Star` chains are flattened; `Empty`
/// disappears. The value part of a pure permission is `Empty`'s dual:
/// calling this on a `perm`-kinded type yields `(Unknown, perms)`.
pub fn collect(t: &Type) -> (Type, Vec<Type>) {
    fn flatten(p: &Type, out: &mut Vec<Type>) {
        match p {
            Type::Star(l, r) => {
                flatten(l, out);
                flatten(r, out);
            }
            Type::Empty => {}
            other => out.push(other.clone()),
        }
    }
    match t {
        Type::Bar(value, perm) => {
            let (inner, mut perms) = collect(value);
            flatten(perm, &mut perms);
            (inner, perms)
        }
        Type::Star(..) | Type::Empty | Type::Anchored(..) => {
            let mut perms = Vec::new();
            flatten(t, &mut perms);
            (Type::Unknown, perms)
        }
        other => (other.clone(), Vec::new()),
    }
}

/// `true` when every open variable of `t` has an index below `limit`.
///
/// Used at environment boundaries: a type may only cross into an
/// environment that has records for all the variables it mentions.
pub fn vars_below(t: &Type, limit: usize) -> bool {
    match t {
        Type::Open(v) => v.index() < limit,
        Type::Bound(_) | Type::Unknown | Type::Dynamic | Type::Empty => true,
        Type::Forall(_, body) | Type::Exists(_, body) => vars_below(body, limit),
        Type::App(head, args) => {
            vars_below(head, limit) && args.iter().all(|a| vars_below(a, limit))
        }
        Type::Tuple(ts) => ts.iter().all(|a| vars_below(a, limit)),
        Type::Concrete(c) => {
            c.fields.iter().all(|f| vars_below(f.ty(), limit))
                && c.adopts.as_ref().map_or(true, |a| vars_below(a, limit))
        }
        Type::Singleton(inner) => vars_below(inner, limit),
        Type::Arrow(a, b) | Type::Bar(a, b) | Type::Anchored(a, b) | Type::Star(a, b) => {
            vars_below(a, limit) && vars_below(b, limit)
        }
        Type::And(cs, inner) | Type::Imply(cs, inner) => {
            vars_below(inner, limit) && cs.iter().all(|c| vars_below(&c.ty, limit))
        }
    }
}

/// `true` if `v` occurs free in `t` (after no chasing; callers chase first).
pub fn occurs(v: Var, t: &Type) -> bool {
    match t {
        Type::Open(w) => *w == v,
        Type::Bound(_) | Type::Unknown | Type::Dynamic | Type::Empty => false,
        Type::Forall(_, body) | Type::Exists(_, body) => occurs(v, body),
        Type::App(head, args) => occurs(v, head) || args.iter().any(|a| occurs(v, a)),
        Type::Tuple(ts) => ts.iter().any(|a| occurs(v, a)),
        Type::Concrete(c) => {
            c.fields.iter().any(|fld| occurs(v, fld.ty()))
                || c.adopts.as_ref().is_some_and(|a| occurs(v, a))
        }
        Type::Singleton(inner) => occurs(v, inner),
        Type::Arrow(d, c) => occurs(v, d) || occurs(v, c),
        Type::Bar(t, p) | Type::Anchored(t, p) | Type::Star(t, p) => occurs(v, t) || occurs(v, p),
        Type::And(cs, inner) | Type::Imply(cs, inner) => {
            occurs(v, inner) || cs.iter().any(|c| occurs(v, &c.ty))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mezzo_base::Interner;

    fn binding(interner: &mut Interner, name: &str) -> Binding {
        Binding::new(interner.intern(name), Kind::Type, Span::dummy())
    }

    #[test]
    fn subst_hits_only_the_target_index() {
        let t = Type::Tuple(vec![Type::Bound(0), Type::Bound(1)]);
        let out = subst(&t, 0, &Type::Dynamic);
        assert_eq!(out, Type::Tuple(vec![Type::Dynamic, Type::Bound(0)]));
    }

    #[test]
    fn subst_lifts_replacement_under_binders() {
        let mut interner = Interner::new();
        let b = binding(&mut interner, "a");
        // Forall a. (Bound 1, a)  with Bound 1 pointing outside the Forall.
        let t = Type::Forall(
            b,
            Box::new(Type::Tuple(vec![Type::Bound(1), Type::Bound(0)])),
        );
        // Substituting index 0 with Bound(5): must arrive as Bound(6) inside.
        let out = subst(&t, 0, &Type::Bound(5));
        match out {
            Type::Forall(_, body) => {
                assert_eq!(*body, Type::Tuple(vec![Type::Bound(6), Type::Bound(0)]));
            }
            other => panic!("expected Forall, got {:?}", other),
        }
    }

    #[test]
    fn open_then_close_is_identity() {
        let body = Type::Arrow(
            Box::new(Type::Bound(0)),
            Box::new(Type::Tuple(vec![Type::Bound(0), Type::Unknown])),
        );
        let v = Var::from_raw(42);
        let opened = open_with(&body, v);
        assert!(!occurs_bound(&opened));
        let closed = close_over(&opened, v, 0);
        assert_eq!(closed, body);
    }

    fn occurs_bound(t: &Type) -> bool {
        match t {
            Type::Bound(_) => true,
            Type::Arrow(d, c) => occurs_bound(d) || occurs_bound(c),
            Type::Tuple(ts) => ts.iter().any(occurs_bound),
            _ => false,
        }
    }

    #[test]
    fn collect_flattens_star_chains() {
        let v = Var::from_raw(1);
        let w = Var::from_raw(2);
        let t = Type::bar(
            Type::Dynamic,
            Type::star(
                Type::anchored(v, Type::Unknown),
                Type::star(Type::Empty, Type::anchored(w, Type::Dynamic)),
            ),
        );
        let (value, perms) = collect(&t);
        assert_eq!(value, Type::Dynamic);
        assert_eq!(perms.len(), 2);
    }

    #[test]
    fn instantiate_matches_parameter_order() {
        // Definition under 2 binders: (param0, param1) = (Bound 1, Bound 0).
        let t = Type::Tuple(vec![Type::Bound(1), Type::Bound(0)]);
        let out = instantiate(&t, &[Type::Dynamic, Type::Unknown]);
        assert_eq!(out, Type::Tuple(vec![Type::Dynamic, Type::Unknown]));
    }

    #[test]
    fn star_smart_constructor_drops_empty() {
        let v = Var::from_raw(7);
        let p = Type::anchored(v, Type::Unknown);
        assert_eq!(Type::star(Type::Empty, p.clone()), p);
        assert_eq!(Type::star(p.clone(), Type::Empty), p);
    }
}
