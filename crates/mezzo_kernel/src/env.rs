//! The typing environment.
//!
//! An [`Env`] holds one record per variable ever introduced: its names,
//! kind, rigid/flexible state, and — for `term` variables — the list of
//! permissions currently asserted about it. Type variables additionally
//! carry their data-type definition, inferred fact, and variance vector.
//!
//! Environments are values. Records are never removed and variable indices
//! stay stable, so a clone taken before a tentative subtraction step can be
//! dropped or kept at zero bookkeeping cost. Merged variables are linked
//! through a `link` pointer, union-find style; `repr` chases links without
//! path compression so that clones never observe each other's mutations.
//!
//! Invariants maintained here:
//!
//! 1. every `term` variable carries exactly one `=self` permission;
//! 2. a variable holds at most one exclusive permission unless the
//!    environment has been marked inconsistent;
//! 3. instantiated flexible variables are never read directly — all access
//!    goes through [`Env::repr`] / [`Env::modulo_flex`];
//! 4. no `x @ t` permission is anchored on a flexible variable.

use mezzo_base::{Span, Symbol};

use crate::fact::{Fact, Variance};
use crate::ty::{
    close_over, instantiate, occurs, open_with, Binding, Concrete, Field, Flavor, Kind, Type,
};

/// Index of a variable in the environment. Stable across clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(u32);

impl Var {
    pub fn from_raw(raw: u32) -> Var {
        Var(raw)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Rigid variables are abstract; flexible variables may be instantiated
/// (at most once) during subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Rigid,
    Flexible,
}

/// Declared flavor of an algebraic data type definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredFlavor {
    /// `data` — candidate for duplicability inference.
    Duplicable,
    /// Declared exclusive without mutable fields.
    Exclusive,
    /// `mutable data` — exclusive, fields writable, tag changeable.
    Mutable,
}

/// One branch of a concrete definition. Field types are stored under the
/// definition's parameter binders (parameter `k` is `Bound(n - 1 - k)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: Symbol,
    pub fields: Vec<Field>,
}

/// A data-type definition attached to a type variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    Concrete {
        flavor: DeclaredFlavor,
        branches: Vec<Branch>,
        /// Adopts clause, under the parameter binders.
        adopts: Option<Type>,
    },
    /// No body; fact comes from a declaration or defaults to affine.
    Abstract,
}


#[derive(Debug, Clone)]
struct VarRecord {
    names: Vec<Symbol>,
    kind: Kind,
    spans: Vec<Span>,
    mode: Mode,
    flavor: Flavor,
    /// Set at most once, only on flexible variables.
    instantiation: Option<Type>,
    /// Union-find parent after a merge.
    link: Option<Var>,
    permissions: Vec<Type>,
    definition: Option<Definition>,
    params: Vec<Binding>,
    fact: Option<Fact>,
    variance: Vec<Variance>,
}

impl VarRecord {
    fn new(name: Symbol, kind: Kind, span: Span, mode: Mode) -> Self {
        VarRecord {
            names: vec![name],
            kind,
            spans: vec![span],
            mode,
            flavor: Flavor::CanInstantiate,
            instantiation: None,
            link: None,
            permissions: Vec::new(),
            definition: None,
            params: Vec::new(),
            fact: None,
            variance: Vec::new(),
        }
    }
}

/// The permission environment.
#[derive(Debug, Clone, Default)]
pub struct Env {
    records: Vec<VarRecord>,
    floating: Vec<Type>,
    inconsistent: bool,
}

impl Env {
    pub fn new() -> Self {
        Env::default()
    }

    fn record(&self, v: Var) -> &VarRecord {
        &self.records[v.index()]
    }

    fn record_mut(&mut self, v: Var) -> &mut VarRecord {
        &mut self.records[v.index()]
    }

    // ── Binding ─────────────────────────────────────────────────────────

    fn bind(&mut self, name: Symbol, kind: Kind, span: Span, mode: Mode) -> Var {
        let v = Var(self.records.len() as u32);
        let mut rec = VarRecord::new(name, kind.clone(), span, mode);
        // Self-witness: every term variable knows its own identity.
        if kind == Kind::Term && mode == Mode::Rigid {
            rec.permissions.push(Type::singleton(v));
        }
        self.records.push(rec);
        v
    }

    /// Introduce a rigid variable.
    pub fn bind_rigid(&mut self, name: Symbol, kind: Kind, span: Span) -> Var {
        self.bind(name, kind, span, Mode::Rigid)
    }

    /// Introduce a flexible variable, to be solved by subtraction.
    pub fn bind_flexible(&mut self, name: Symbol, kind: Kind, span: Span) -> Var {
        self.bind(name, kind, span, Mode::Flexible)
    }

    /// Open one quantifier binding: allocate a fresh variable of the given
    /// mode and substitute it for index 0 of `body`.
    pub fn open_binder(&mut self, binding: &Binding, body: &Type, mode: Mode) -> (Var, Type) {
        let v = self.bind(binding.name, binding.kind.clone(), binding.span, mode);
        self.record_mut(v).flavor = binding.flavor;
        (v, open_with(body, v))
    }

    /// Open a `Forall` body with a rigid variable (checking a universal).
    pub fn open_forall(&mut self, binding: &Binding, body: &Type) -> (Var, Type) {
        self.open_binder(binding, body, Mode::Rigid)
    }

    /// Open an `Exists` body with a rigid variable (unpacking a witness).
    pub fn open_exists(&mut self, binding: &Binding, body: &Type) -> (Var, Type) {
        self.open_binder(binding, body, Mode::Rigid)
    }

    // ── Representatives and flexibility ─────────────────────────────────

    /// Chase merge links to the representative. No path compression: the
    /// chain is short-lived and clones must not share mutation.
    pub fn repr(&self, v: Var) -> Var {
        let mut cur = v;
        while let Some(next) = self.record(cur).link {
            cur = next;
        }
        cur
    }

    /// `true` if `v` is an uninstantiated flexible variable.
    pub fn is_flexible(&self, v: Var) -> bool {
        let r = self.record(self.repr(v));
        r.mode == Mode::Flexible && r.instantiation.is_none()
    }

    pub fn is_rigid(&self, v: Var) -> bool {
        let r = self.record(self.repr(v));
        r.mode == Mode::Rigid
    }

    /// Flavor-aware instantiation permission: `v` must be an uninstantiated
    /// flexible whose binder allows instantiation, and `t` must pass the
    /// occurs check.
    pub fn can_instantiate(&self, v: Var, t: &Type) -> bool {
        let v = self.repr(v);
        if !self.is_flexible(v) {
            return false;
        }
        if self.record(v).flavor == Flavor::CannotInstantiate {
            return false;
        }
        !occurs(v, &self.resolve_deep(t))
    }

    /// Instantiate a flexible variable. Returns `false` (leaving the
    /// environment unchanged) if the occurs check or flavor forbids it.
    ///
    /// Instantiating to another open variable merges the two instead, so a
    /// chain of solved flexibles always bottoms out at a real structure or
    /// a rigid variable.
    pub fn instantiate_flexible(&mut self, v: Var, t: &Type) -> bool {
        let v = self.repr(v);
        if !self.can_instantiate(v, t) {
            return false;
        }
        match t {
            Type::Open(w) => {
                let w = self.repr(*w);
                if w == v {
                    return true;
                }
                self.merge_left(w, v);
            }
            _ => {
                self.record_mut(v).instantiation = Some(t.clone());
            }
        }
        true
    }

    /// Collapse `v2` into `v1`: `v2`'s permissions, names, and locations
    /// move to `v1`, and `v2` becomes a link. Used by unification.
    pub fn merge_left(&mut self, v1: Var, v2: Var) {
        let v1 = self.repr(v1);
        let v2 = self.repr(v2);
        if v1 == v2 {
            return;
        }
        let moved = {
            let r2 = self.record_mut(v2);
            r2.link = Some(v1);
            (
                std::mem::take(&mut r2.names),
                std::mem::take(&mut r2.spans),
                std::mem::take(&mut r2.permissions),
            )
        };
        let r1 = self.record_mut(v1);
        r1.names.extend(moved.0);
        r1.spans.extend(moved.1);
        for perm in moved.2 {
            // v2's self-witness would duplicate v1's.
            if perm == Type::singleton(v2) {
                continue;
            }
            if !r1.permissions.contains(&perm) {
                r1.permissions.push(perm);
            }
        }
    }

    // ── Resolution modulo flexible instantiations ───────────────────────

    /// One step of resolution: if `t` is an open variable whose
    /// representative is an instantiated flexible, return the
    /// instantiation; otherwise normalize the variable to its
    /// representative.
    pub fn modulo_flex(&self, t: &Type) -> Type {
        match t {
            Type::Open(v) => {
                let r = self.repr(*v);
                match &self.record(r).instantiation {
                    Some(inner) => self.modulo_flex(inner),
                    None => Type::Open(r),
                }
            }
            other => other.clone(),
        }
    }

    /// Resolve through instantiations at every node. Used by the occurs
    /// check and when exporting types out of a discarded snapshot.
    pub fn resolve_deep(&self, t: &Type) -> Type {
        let t = self.modulo_flex(t);
        match &t {
            Type::Open(_) | Type::Bound(_) | Type::Unknown | Type::Dynamic | Type::Empty => t,
            Type::Forall(b, body) => {
                Type::Forall(b.clone(), Box::new(self.resolve_deep(body)))
            }
            Type::Exists(b, body) => {
                Type::Exists(b.clone(), Box::new(self.resolve_deep(body)))
            }
            Type::App(head, args) => Type::App(
                Box::new(self.resolve_deep(head)),
                args.iter().map(|a| self.resolve_deep(a)).collect(),
            ),
            Type::Tuple(ts) => Type::Tuple(ts.iter().map(|a| self.resolve_deep(a)).collect()),
            Type::Concrete(c) => Type::Concrete(Box::new(Concrete {
                datacon: c.datacon,
                fields: c
                    .fields
                    .iter()
                    .map(|fld| fld.map_ty(|t| self.resolve_deep(t)))
                    .collect(),
                adopts: c.adopts.as_ref().map(|a| self.resolve_deep(a)),
            })),
            Type::Singleton(inner) => Type::Singleton(Box::new(self.resolve_deep(inner))),
            Type::Arrow(d, c) => Type::Arrow(
                Box::new(self.resolve_deep(d)),
                Box::new(self.resolve_deep(c)),
            ),
            Type::Bar(v, p) => {
                Type::Bar(Box::new(self.resolve_deep(v)), Box::new(self.resolve_deep(p)))
            }
            Type::Anchored(x, inner) => Type::Anchored(
                Box::new(self.resolve_deep(x)),
                Box::new(self.resolve_deep(inner)),
            ),
            Type::Star(p, q) => {
                Type::Star(Box::new(self.resolve_deep(p)), Box::new(self.resolve_deep(q)))
            }
            Type::And(cs, inner) => Type::And(
                cs.iter()
                    .map(|c| crate::ty::Constraint {
                        demand: c.demand,
                        ty: self.resolve_deep(&c.ty),
                    })
                    .collect(),
                Box::new(self.resolve_deep(inner)),
            ),
            Type::Imply(cs, inner) => Type::Imply(
                cs.iter()
                    .map(|c| crate::ty::Constraint {
                        demand: c.demand,
                        ty: self.resolve_deep(&c.ty),
                    })
                    .collect(),
                Box::new(self.resolve_deep(inner)),
            ),
        }
    }

    /// Structural equality modulo representative chasing and flexible
    /// instantiations.
    pub fn equal(&self, t1: &Type, t2: &Type) -> bool {
        let t1 = self.modulo_flex(t1);
        let t2 = self.modulo_flex(t2);
        match (&t1, &t2) {
            (Type::Open(v), Type::Open(w)) => self.repr(*v) == self.repr(*w),
            (Type::Bound(i), Type::Bound(j)) => i == j,
            (Type::Unknown, Type::Unknown)
            | (Type::Dynamic, Type::Dynamic)
            | (Type::Empty, Type::Empty) => true,
            (Type::Forall(b1, u1), Type::Forall(b2, u2))
            | (Type::Exists(b1, u1), Type::Exists(b2, u2)) => {
                b1.kind == b2.kind && self.equal(u1, u2)
            }
            (Type::App(h1, a1), Type::App(h2, a2)) => {
                self.equal(h1, h2)
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2.iter()).all(|(x, y)| self.equal(x, y))
            }
            (Type::Tuple(a1), Type::Tuple(a2)) => {
                a1.len() == a2.len() && a1.iter().zip(a2.iter()).all(|(x, y)| self.equal(x, y))
            }
            (Type::Concrete(c1), Type::Concrete(c2)) => {
                c1.datacon == c2.datacon
                    && c1.fields.len() == c2.fields.len()
                    && c1
                        .fields
                        .iter()
                        .zip(c2.fields.iter())
                        .all(|(f1, f2)| match (f1, f2) {
                            (Field::Value(n1, t1), Field::Value(n2, t2)) => {
                                n1 == n2 && self.equal(t1, t2)
                            }
                            (Field::Permission(t1), Field::Permission(t2)) => self.equal(t1, t2),
                            _ => false,
                        })
                    && match (&c1.adopts, &c2.adopts) {
                        (None, None) => true,
                        (Some(a1), Some(a2)) => self.equal(a1, a2),
                        _ => false,
                    }
            }
            (Type::Singleton(u1), Type::Singleton(u2)) => self.equal(u1, u2),
            (Type::Arrow(d1, c1), Type::Arrow(d2, c2)) => self.equal(d1, d2) && self.equal(c1, c2),
            (Type::Bar(v1, p1), Type::Bar(v2, p2)) => self.equal(v1, v2) && self.equal(p1, p2),
            (Type::Anchored(x1, u1), Type::Anchored(x2, u2)) => {
                self.equal(x1, x2) && self.equal(u1, u2)
            }
            (Type::Star(p1, q1), Type::Star(p2, q2)) => self.equal(p1, p2) && self.equal(q1, q2),
            (Type::And(cs1, u1), Type::And(cs2, u2))
            | (Type::Imply(cs1, u1), Type::Imply(cs2, u2)) => {
                cs1.len() == cs2.len()
                    && cs1
                        .iter()
                        .zip(cs2.iter())
                        .all(|(a, b)| a.demand == b.demand && self.equal(&a.ty, &b.ty))
                    && self.equal(u1, u2)
            }
            _ => false,
        }
    }

    // ── Permissions ─────────────────────────────────────────────────────

    /// The permission list of a term variable.
    pub fn permissions(&self, v: Var) -> &[Type] {
        &self.record(self.repr(v)).permissions
    }

    pub fn set_permissions(&mut self, v: Var, perms: Vec<Type>) {
        let v = self.repr(v);
        self.record_mut(v).permissions = perms;
    }

    /// Append a permission to a variable's list, preserving insertion
    /// order. Duplicates of an already-present permission are allowed here;
    /// `add` decides whether to drop them.
    pub fn push_permission(&mut self, v: Var, t: Type) {
        let v = self.repr(v);
        self.record_mut(v).permissions.push(t);
    }

    /// Remove one occurrence of a permission, by index into the current
    /// list.
    pub fn remove_permission_at(&mut self, v: Var, index: usize) -> Type {
        let v = self.repr(v);
        self.record_mut(v).permissions.remove(index)
    }

    pub fn add_floating_perm(&mut self, t: Type) {
        self.floating.push(t);
    }

    pub fn floating_perms(&self) -> &[Type] {
        &self.floating
    }

    pub fn set_floating_perms(&mut self, perms: Vec<Type>) {
        self.floating = perms;
    }

    // ── Inconsistency ───────────────────────────────────────────────────

    /// Record a proven contradiction; all later checks succeed vacuously.
    pub fn mark_inconsistent(&mut self) {
        self.inconsistent = true;
    }

    pub fn is_inconsistent(&self) -> bool {
        self.inconsistent
    }

    // ── Definitions, facts, variance ────────────────────────────────────

    /// Bind the name of one definition of a data-type group. The whole
    /// group is bound before any body is translated, so branches can refer
    /// to any sibling through its `Open` variable.
    pub fn bind_datatype(&mut self, name: Symbol, params: &[Binding], span: Span) -> Var {
        let kind =
            Kind::constructor(&params.iter().map(|p| p.kind.clone()).collect::<Vec<_>>());
        let v = self.bind_rigid(name, kind, span);
        self.record_mut(v).params = params.to_vec();
        v
    }

    /// Attach the translated body to a previously bound data-type variable
    /// and seed its fact. Run [`crate::fact::infer_facts`] on the group's
    /// variables once every body is installed.
    pub fn install_definition(
        &mut self,
        v: Var,
        definition: Definition,
        declared_fact: Option<Fact>,
    ) {
        let v = self.repr(v);
        let nparams = self.record(v).params.len();
        let fact = match (&definition, declared_fact) {
            (_, Some(declared)) => declared,
            (Definition::Concrete { flavor, .. }, None) => match flavor {
                DeclaredFlavor::Duplicable => Fact::Duplicable(Default::default()),
                DeclaredFlavor::Exclusive | DeclaredFlavor::Mutable => Fact::Exclusive,
            },
            // Conservative default for abstract types.
            (Definition::Abstract, None) => Fact::Affine,
        };
        let rec = self.record_mut(v);
        rec.definition = Some(definition);
        rec.variance = vec![Variance::Bivariant; nparams];
        rec.fact = Some(fact);
    }

    pub fn definition(&self, v: Var) -> Option<&Definition> {
        self.record(self.repr(v)).definition.as_ref()
    }

    pub fn update_definition(&mut self, v: Var, definition: Definition) {
        let v = self.repr(v);
        self.record_mut(v).definition = Some(definition);
    }

    pub fn params(&self, v: Var) -> &[Binding] {
        &self.record(self.repr(v)).params
    }

    pub fn fact(&self, v: Var) -> Option<&Fact> {
        self.record(self.repr(v)).fact.as_ref()
    }

    pub fn set_fact(&mut self, v: Var, fact: Fact) {
        let v = self.repr(v);
        self.record_mut(v).fact = Some(fact);
    }

    pub fn variance(&self, v: Var) -> &[Variance] {
        &self.record(self.repr(v)).variance
    }

    pub fn set_variance(&mut self, v: Var, variance: Vec<Variance>) {
        let v = self.repr(v);
        self.record_mut(v).variance = variance;
    }

    /// The branch of a concrete definition a datacon refers to,
    /// instantiated with the given arguments.
    pub fn resolved_branch(&self, ty_var: Var, branch: usize, args: &[Type]) -> Option<Branch> {
        match self.definition(ty_var)? {
            Definition::Concrete { branches, .. } => {
                let b = branches.get(branch)?;
                Some(Branch {
                    name: b.name,
                    fields: b
                        .fields
                        .iter()
                        .map(|fld| fld.map_ty(|t| instantiate(t, args)))
                        .collect(),
                })
            }
            Definition::Abstract => None,
        }
    }

    /// The adopts clause of a definition, instantiated with `args`.
    pub fn resolved_adopts(&self, ty_var: Var, args: &[Type]) -> Option<Type> {
        match self.definition(ty_var)? {
            Definition::Concrete { adopts, .. } => {
                adopts.as_ref().map(|a| instantiate(a, args))
            }
            Definition::Abstract => None,
        }
    }

    pub fn declared_flavor(&self, ty_var: Var) -> Option<DeclaredFlavor> {
        match self.definition(ty_var)? {
            Definition::Concrete { flavor, .. } => Some(*flavor),
            Definition::Abstract => None,
        }
    }

    /// If `t` names a concrete type with exactly one branch, return its
    /// unfolded structural form.
    pub fn expand_if_one_branch(&self, t: &Type) -> Option<Type> {
        let t = self.modulo_flex(t);
        let (head, args) = match &t {
            Type::App(head, args) => match self.modulo_flex(head) {
                Type::Open(v) => (v, args.clone()),
                _ => return None,
            },
            Type::Open(v) => (*v, Vec::new()),
            _ => return None,
        };
        match self.definition(head)? {
            Definition::Concrete {
                branches, adopts, ..
            } if branches.len() == 1 => {
                let branch = &branches[0];
                Some(Type::Concrete(Box::new(Concrete {
                    datacon: crate::ty::Datacon {
                        datatype: head,
                        name: branch.name,
                        branch: 0,
                    },
                    fields: branch
                        .fields
                        .iter()
                        .map(|fld| fld.map_ty(|ft| instantiate(ft, &args)))
                        .collect(),
                    adopts: adopts.as_ref().map(|a| instantiate(a, &args)),
                })))
            }
            _ => None,
        }
    }

    // ── Iteration, names ────────────────────────────────────────────────

    /// All live (representative) term variables.
    pub fn term_vars(&self) -> Vec<Var> {
        (0..self.records.len() as u32)
            .map(Var)
            .filter(|&v| {
                self.record(v).link.is_none() && self.record(v).kind == Kind::Term
            })
            .collect()
    }

    /// All live type variables.
    pub fn type_vars(&self) -> Vec<Var> {
        (0..self.records.len() as u32)
            .map(Var)
            .filter(|&v| {
                let r = self.record(v);
                r.link.is_none() && r.kind != Kind::Term
            })
            .collect()
    }

    /// Flexible variables (representatives), instantiated or not.
    pub fn flexible_vars(&self) -> Vec<Var> {
        (0..self.records.len() as u32)
            .map(Var)
            .filter(|&v| self.record(v).link.is_none() && self.record(v).mode == Mode::Flexible)
            .collect()
    }

    pub fn instantiation(&self, v: Var) -> Option<&Type> {
        self.record(self.repr(v)).instantiation.as_ref()
    }

    /// Re-open an instantiated flexible variable. Used by merge when an
    /// instantiation was taken in only one branch.
    pub fn clear_instantiation(&mut self, v: Var) {
        let v = self.repr(v);
        self.record_mut(v).instantiation = None;
    }

    pub fn kind(&self, v: Var) -> &Kind {
        &self.record(self.repr(v)).kind
    }

    /// The preferred (first) name of a variable, for diagnostics.
    pub fn name(&self, v: Var) -> Symbol {
        let r = self.record(self.repr(v));
        r.names.first().copied().unwrap_or_default()
    }

    /// Record an extra source name for a variable (pattern aliases).
    pub fn add_name(&mut self, v: Var, name: Symbol) {
        let v = self.repr(v);
        let r = self.record_mut(v);
        if !r.names.contains(&name) {
            r.names.push(name);
        }
    }

    pub fn spans(&self, v: Var) -> &[Span] {
        &self.record(self.repr(v)).spans
    }

    pub fn var_count(&self) -> usize {
        self.records.len()
    }

    /// A copy of this environment keeping only duplicable permissions.
    ///
    /// Arrow subtraction and lambda bodies run against such a stripped
    /// environment: functions capture only duplicable state.
    pub fn strip_to_duplicable(&self) -> Env {
        let mut out = self.clone();
        for v in out.term_vars() {
            let kept: Vec<Type> = out
                .permissions(v)
                .iter()
                .filter(|t| crate::fact::is_duplicable(self, t))
                .cloned()
                .collect();
            out.set_permissions(v, kept);
        }
        let floating: Vec<Type> = out
            .floating
            .iter()
            .filter(|t| crate::fact::is_duplicable(self, t))
            .cloned()
            .collect();
        out.floating = floating;
        out
    }

    /// Import flexible instantiations found in `other` (a successful
    /// sub-environment derived from this one) without importing its
    /// permission consumption. Solutions that mention variables born in
    /// `other` cannot cross back and are left open here.
    pub fn import_flex_instantiations(&mut self, other: &Env) {
        let limit = self.records.len();
        for v in 0..limit as u32 {
            let v = Var(v);
            if self.record(v).link.is_some() || self.record(v).instantiation.is_some() {
                continue;
            }
            let other_repr = other.repr(v);
            if other_repr != v && self.repr(v) == v {
                // v was merged away over there; mirror the merge.
                if other_repr.index() < limit {
                    self.merge_left(other_repr, v);
                }
            } else if let Some(inst) = other.instantiation(v) {
                if self.is_flexible(v) {
                    let resolved = other.resolve_deep(inst);
                    if crate::ty::vars_below(&resolved, limit) {
                        let _ = self.instantiate_flexible(v, &resolved);
                    }
                }
            }
        }
    }

    /// Close a type over a variable, producing a quantifier body.
    pub fn close_var(&self, t: &Type, v: Var) -> Type {
        close_over(&self.resolve_deep(t), self.repr(v), 0)
    }
}
