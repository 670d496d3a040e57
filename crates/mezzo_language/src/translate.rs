//! Surface-to-core translation.
//!
//! The translator turns a well-kinded surface tree into the kernel's
//! core syntax. Binders become de Bruijn indices in a single index space
//! shared by every kind; type names resolve to environment variables;
//! data constructors resolve to their defining type and branch.
//!
//! Function types get the arrow encoding the checker expects: the
//! argument is threaded through a synthesized (non-instantiable) term
//! binder, so `(x: t) -> u` becomes, in core terms, a universal over `x`
//! whose domain is `(=x | x @ t)`. A `consumes` marker translates to its
//! bare content — an argument permission is consumed unless the
//! signature returns it.

use mezzo_base::{Interner, Span, Symbol};
use mezzo_kernel::env::{Branch, DeclaredFlavor, Definition, Env, Var};
use mezzo_kernel::expr::{Expr, ExprNode, Pattern, PatternNode};
use mezzo_kernel::fact::{infer_facts, Fact, ParamMask};
use mezzo_kernel::ty::{Binding, Constraint, Datacon, Demand, Field, Kind, Type};
use std::collections::HashMap;

use crate::ast::{
    DataDef, Expression, Pat, SBinding, SDemand, SField, TypeExpr,
};
use crate::kind::{KindError, ModuleExports, NameTable};

type TResult<T> = Result<T, KindError>;

/// Name bindings one module exposes to the translator.
#[derive(Debug, Clone, Default)]
pub struct ModuleBindings {
    pub types: HashMap<Symbol, Var>,
    pub datacons: HashMap<Symbol, (Datacon, Vec<Symbol>)>,
    pub values: HashMap<Symbol, Var>,
}

/// The translator. Accumulates the current module's bindings as items
/// are processed; imported modules are added up front.
pub struct Translator<'i> {
    interner: &'i mut Interner,
    /// Type names of the current module and of `open`ed modules.
    pub types: HashMap<Symbol, Var>,
    /// Data constructors, with their field names in declaration order.
    pub datacons: HashMap<Symbol, (Datacon, Vec<Symbol>)>,
    /// Toplevel values.
    pub values: HashMap<Symbol, Var>,
    /// Modules reachable by qualified access.
    pub modules: HashMap<Symbol, ModuleBindings>,
}

/// The translator's accumulated name state, detachable from the interner
/// borrow so a driver can thread it across phases.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub types: HashMap<Symbol, Var>,
    pub datacons: HashMap<Symbol, (Datacon, Vec<Symbol>)>,
    pub values: HashMap<Symbol, Var>,
    pub modules: HashMap<Symbol, ModuleBindings>,
}

impl<'i> Translator<'i> {
    pub fn new(interner: &'i mut Interner) -> Self {
        Translator {
            interner,
            types: HashMap::new(),
            datacons: HashMap::new(),
            values: HashMap::new(),
            modules: HashMap::new(),
        }
    }

    /// Resume from previously accumulated tables.
    pub fn with_tables(interner: &'i mut Interner, tables: Tables) -> Self {
        Translator {
            interner,
            types: tables.types,
            datacons: tables.datacons,
            values: tables.values,
            modules: tables.modules,
        }
    }

    /// Detach the accumulated tables, releasing the interner borrow.
    pub fn into_tables(self) -> Tables {
        Tables {
            types: self.types,
            datacons: self.datacons,
            values: self.values,
            modules: self.modules,
        }
    }

    pub fn interner(&self) -> &Interner {
        self.interner
    }

    /// Make the primitive types and the `bool` constructors resolvable.
    pub fn install_builtins(&mut self, builtins: &mezzo_kernel::check::Builtins) {
        let int_sym = self.interner.intern("int");
        let bool_sym = self.interner.intern("bool");
        self.types.insert(int_sym, builtins.int);
        self.types.insert(bool_sym, builtins.bool_);
        self.datacons
            .insert(builtins.false_.name, (builtins.false_, Vec::new()));
        self.datacons
            .insert(builtins.true_.name, (builtins.true_, Vec::new()));
    }

    /// Make a module's bindings visible unqualified (`open M`).
    pub fn open_module(&mut self, name: Symbol, span: Span) -> TResult<()> {
        let m = self
            .modules
            .get(&name)
            .cloned()
            .ok_or_else(|| KindError::UnboundModule {
                name: self.interner.resolve(name).to_string(),
                span,
            })?;
        self.types.extend(m.types);
        self.datacons.extend(m.datacons);
        self.values.extend(m.values);
        Ok(())
    }

    /// The bindings this module exports, for its importers.
    pub fn exports(&self) -> ModuleBindings {
        ModuleBindings {
            types: self.types.clone(),
            datacons: self.datacons.clone(),
            values: self.values.clone(),
        }
    }

    /// The kind-level name table these bindings imply: type kinds read
    /// back from the environment, constructor field lists as declared.
    /// Drivers and test harnesses seed the kind checker from here, so
    /// whatever `install_builtins` or a loaded interface registered is
    /// visible without being listed a second time.
    pub fn name_table(&self, env: &Env) -> NameTable {
        let mut table = NameTable::default();
        for (&sym, &v) in &self.types {
            table.types.insert(sym, env.kind(v).clone());
        }
        for (&sym, (_, fields)) in &self.datacons {
            table.datacons.insert(sym, fields.clone());
        }
        table.values.extend(self.values.keys().copied());
        for (&m, bindings) in &self.modules {
            table.modules.insert(m, kind_exports(bindings, env));
        }
        table
    }

    fn unbound(&self, sym: Symbol, span: Span) -> KindError {
        KindError::UnboundVariable {
            name: self.interner.resolve(sym).to_string(),
            span,
        }
    }

    // ── Data-type groups ────────────────────────────────────────────────

    /// Bind a whole `data ... and ...` group: names first, then bodies,
    /// then the fact-and-variance fixed point.
    pub fn bind_data_group(&mut self, env: &mut Env, defs: &[DataDef<'_>]) -> TResult<Vec<Var>> {
        let mut vars = Vec::new();
        for def in defs {
            let params: Vec<Binding> = def
                .params
                .iter()
                .map(|p| Binding::new(p.name, p.kind.clone(), p.span))
                .collect();
            let v = env.bind_datatype(def.name, &params, def.span);
            self.types.insert(def.name, v);
            vars.push(v);
        }
        for (def, &v) in defs.iter().zip(vars.iter()) {
            let mut scope: Vec<(Symbol, Kind)> = def
                .params
                .iter()
                .map(|p| (p.name, p.kind.clone()))
                .collect();
            let mut branches = Vec::new();
            for (index, branch) in def.branches.iter().enumerate() {
                let mut fields = Vec::new();
                let mut field_names = Vec::new();
                for field in &branch.fields {
                    match field {
                        SField::Value(name, t) => {
                            field_names.push(*name);
                            fields.push(Field::Value(*name, self.ty(&mut scope, t)?));
                        }
                        SField::Permission(p) => {
                            fields.push(Field::Permission(self.ty(&mut scope, p)?));
                        }
                    }
                }
                self.datacons.insert(
                    branch.datacon,
                    (
                        Datacon {
                            datatype: v,
                            name: branch.datacon,
                            branch: index,
                        },
                        field_names,
                    ),
                );
                branches.push(Branch {
                    name: branch.datacon,
                    fields,
                });
            }
            let adopts = match def.adopts {
                Some(t) => Some(self.ty(&mut scope, t)?),
                None => None,
            };
            env.install_definition(
                v,
                Definition::Concrete {
                    flavor: if def.mutable {
                        DeclaredFlavor::Mutable
                    } else {
                        DeclaredFlavor::Duplicable
                    },
                    branches,
                    adopts,
                },
                None,
            );
        }
        infer_facts(env, &vars);
        Ok(vars)
    }

    /// Interface: `abstract t a b`.
    pub fn declare_abstract(
        &mut self,
        env: &mut Env,
        name: Symbol,
        params: &[SBinding],
        span: Span,
    ) -> Var {
        let params: Vec<Binding> = params
            .iter()
            .map(|p| Binding::new(p.name, p.kind.clone(), p.span))
            .collect();
        let v = env.bind_datatype(name, &params, span);
        env.install_definition(v, Definition::Abstract, None);
        self.types.insert(name, v);
        v
    }

    /// Interface: `fact duplicable t` / `fact exclusive t`.
    pub fn declare_fact(
        &mut self,
        env: &mut Env,
        demand: SDemand,
        ty: &TypeExpr<'_>,
    ) -> TResult<()> {
        let mut scope = Vec::new();
        let t = self.ty(&mut scope, ty)?;
        let head = match &t {
            Type::App(head, _) => match **head {
                Type::Open(v) => v,
                _ => return Ok(()),
            },
            Type::Open(v) => *v,
            _ => return Ok(()),
        };
        let fact = match demand {
            SDemand::Duplicable => Fact::Duplicable(ParamMask::empty()),
            SDemand::Exclusive => Fact::Exclusive,
        };
        env.set_fact(head, fact);
        Ok(())
    }

    // ── Types ───────────────────────────────────────────────────────────

    /// Translate a surface type against a binder stack. The innermost
    /// binder is the last element; `Bound(0)` points at it.
    pub fn ty(&mut self, scope: &mut Vec<(Symbol, Kind)>, t: &TypeExpr<'_>) -> TResult<Type> {
        match t {
            TypeExpr::Name(sym, span) => {
                if let Some(i) = scope.iter().rev().position(|(n, _)| n == sym) {
                    return Ok(Type::Bound(i));
                }
                if let Some(&v) = self.types.get(sym) {
                    return Ok(Type::Open(v));
                }
                if let Some(&v) = self.values.get(sym) {
                    return Ok(Type::Open(v));
                }
                Err(self.unbound(*sym, *span))
            }
            TypeExpr::Qualified(m, name, span) => {
                let module = self
                    .modules
                    .get(m)
                    .ok_or_else(|| KindError::UnboundModule {
                        name: self.interner.resolve(*m).to_string(),
                        span: *span,
                    })?;
                module
                    .types
                    .get(name)
                    .or_else(|| module.values.get(name))
                    .map(|&v| Type::Open(v))
                    .ok_or_else(|| self.unbound(*name, *span))
            }
            TypeExpr::Forall(b, body) => {
                scope.push((b.name, b.kind.clone()));
                let inner = self.ty(scope, body);
                scope.pop();
                Ok(Type::Forall(
                    Binding::new(b.name, b.kind.clone(), b.span),
                    Box::new(inner?),
                ))
            }
            TypeExpr::Exists(b, body) => {
                scope.push((b.name, b.kind.clone()));
                let inner = self.ty(scope, body);
                scope.pop();
                Ok(Type::Exists(
                    Binding::new(b.name, b.kind.clone(), b.span),
                    Box::new(inner?),
                ))
            }
            TypeExpr::Imply(cs, body) => {
                let constraints = self.constraints(scope, cs)?;
                Ok(Type::Imply(constraints, Box::new(self.ty(scope, body)?)))
            }
            TypeExpr::And(cs, body) => {
                let constraints = self.constraints(scope, cs)?;
                Ok(Type::And(constraints, Box::new(self.ty(scope, body)?)))
            }
            TypeExpr::Arrow(dom, cod) => self.arrow(scope, dom, cod),
            TypeExpr::App(head, args) => {
                let h = self.ty(scope, head)?;
                let mut translated = Vec::new();
                for a in args {
                    translated.push(self.ty(scope, a)?);
                }
                Ok(Type::App(Box::new(h), translated))
            }
            TypeExpr::Tuple(ts) => {
                let mut parts = Vec::new();
                for t in ts {
                    parts.push(self.ty(scope, t)?);
                }
                Ok(Type::Tuple(parts))
            }
            TypeExpr::Singleton(x, span) => {
                Ok(Type::Singleton(Box::new(self.term_ref(scope, *x, *span)?)))
            }
            TypeExpr::Unknown(_) => Ok(Type::Unknown),
            TypeExpr::Dynamic(_) => Ok(Type::Dynamic),
            TypeExpr::Empty(_) => Ok(Type::Empty),
            TypeExpr::Concrete {
                datacon,
                fields,
                adopts,
                span,
            } => {
                let (dc, declared) = self
                    .datacons
                    .get(datacon)
                    .cloned()
                    .ok_or_else(|| KindError::UnknownConstructor {
                        name: self.interner.resolve(*datacon).to_string(),
                        span: *span,
                    })?;
                // Value fields in declaration order, permissions after.
                let mut value_fields: Vec<(Symbol, Type)> = Vec::new();
                let mut perm_fields = Vec::new();
                for field in fields {
                    match field {
                        SField::Value(name, t) => {
                            value_fields.push((*name, self.ty(scope, t)?));
                        }
                        SField::Permission(p) => perm_fields.push(self.ty(scope, p)?),
                    }
                }
                let mut ordered = Vec::new();
                for name in &declared {
                    match value_fields.iter().find(|(n, _)| n == name) {
                        Some((_, t)) => ordered.push(Field::Value(*name, t.clone())),
                        None => {
                            return Err(KindError::MissingField {
                                datacon: self.interner.resolve(*datacon).to_string(),
                                field: self.interner.resolve(*name).to_string(),
                                span: *span,
                            })
                        }
                    }
                }
                ordered.extend(perm_fields.into_iter().map(Field::Permission));
                let adopts = match adopts {
                    Some(a) => Some(self.ty(scope, a)?),
                    None => None,
                };
                Ok(Type::Concrete(Box::new(mezzo_kernel::ty::Concrete {
                    datacon: dc,
                    fields: ordered,
                    adopts,
                })))
            }
            TypeExpr::Bar(v, p) => Ok(Type::Bar(
                Box::new(self.ty(scope, v)?),
                Box::new(self.ty(scope, p)?),
            )),
            TypeExpr::Anchored(x, inner, span) => Ok(Type::Anchored(
                Box::new(self.term_ref(scope, *x, *span)?),
                Box::new(self.ty(scope, inner)?),
            )),
            TypeExpr::Star(p, q) => Ok(Type::Star(
                Box::new(self.ty(scope, p)?),
                Box::new(self.ty(scope, q)?),
            )),
            // An argument permission is consumed unless the signature
            // returns it; the marker itself adds nothing.
            TypeExpr::Consumes(inner, _) => self.ty(scope, inner),
            TypeExpr::NamedOf(_, inner, _) => self.ty(scope, inner),
        }
    }

    /// The arrow encoding: a synthesized universal term binder carries
    /// the argument through the domain.
    fn arrow(
        &mut self,
        scope: &mut Vec<(Symbol, Kind)>,
        dom: &TypeExpr<'_>,
        cod: &TypeExpr<'_>,
    ) -> TResult<Type> {
        let (arg_name, arg_span, dom_inner) = match dom {
            TypeExpr::NamedOf(name, inner, span) => (*name, *span, *inner),
            _ => (self.interner.intern("arg"), dom.span(), dom),
        };
        scope.push((arg_name, Kind::Term));
        let dom_t = self.ty(scope, dom_inner);
        let cod_t = self.ty(scope, cod);
        scope.pop();
        let dom_t = dom_t?;
        let cod_t = cod_t?;
        let root = Type::Bound(0);
        let domain = Type::Bar(
            Box::new(Type::Singleton(Box::new(root.clone()))),
            Box::new(Type::Anchored(Box::new(root), Box::new(dom_t))),
        );
        Ok(Type::Forall(
            Binding::new(arg_name, Kind::Term, arg_span).cannot_instantiate(),
            Box::new(Type::arrow(domain, cod_t)),
        ))
    }

    fn constraints(
        &mut self,
        scope: &mut Vec<(Symbol, Kind)>,
        cs: &[(SDemand, &TypeExpr<'_>)],
    ) -> TResult<Vec<Constraint>> {
        cs.iter()
            .map(|(demand, subject)| {
                Ok(Constraint {
                    demand: match demand {
                        SDemand::Duplicable => Demand::Duplicable,
                        SDemand::Exclusive => Demand::Exclusive,
                    },
                    ty: self.ty(scope, subject)?,
                })
            })
            .collect()
    }

    /// A term-kinded reference: a lexical binder or a toplevel value.
    fn term_ref(
        &mut self,
        scope: &mut Vec<(Symbol, Kind)>,
        sym: Symbol,
        span: Span,
    ) -> TResult<Type> {
        if let Some(i) = scope.iter().rev().position(|(n, _)| *n == sym) {
            return Ok(Type::Bound(i));
        }
        if let Some(&v) = self.values.get(&sym) {
            return Ok(Type::Open(v));
        }
        Err(self.unbound(sym, span))
    }

    // ── Expressions ─────────────────────────────────────────────────────

    /// Translate a toplevel expression (empty scope).
    pub fn expr_toplevel(&mut self, e: &Expression<'_>) -> TResult<Expr> {
        let mut scope = Vec::new();
        self.expr(&mut scope, e)
    }

    fn expr(&mut self, scope: &mut Vec<(Symbol, Kind)>, e: &Expression<'_>) -> TResult<Expr> {
        let span = e.span();
        let node = match e {
            Expression::Var(sym, span) => {
                if let Some(i) = scope.iter().rev().position(|(n, _)| n == sym) {
                    ExprNode::Var(i)
                } else if let Some(&v) = self.values.get(sym) {
                    ExprNode::Free(v)
                } else {
                    return Err(self.unbound(*sym, *span));
                }
            }
            Expression::Qualified(m, x, span) => {
                let module = self
                    .modules
                    .get(m)
                    .ok_or_else(|| KindError::UnboundModule {
                        name: self.interner.resolve(*m).to_string(),
                        span: *span,
                    })?;
                match module.values.get(x) {
                    Some(&v) => ExprNode::Free(v),
                    None => return Err(self.unbound(*x, *span)),
                }
            }
            Expression::Int(n, _) => ExprNode::Int(*n),
            Expression::Unit(_) => ExprNode::Tuple(Vec::new()),
            Expression::Let {
                rec,
                bindings,
                body,
                ..
            } => {
                let save = scope.len();
                let mut translated = Vec::new();
                if *rec {
                    for (pat, _) in bindings {
                        let p = self.pattern(pat)?;
                        self.push_pattern_names(scope, pat);
                        translated.push(p);
                    }
                    let mut rhss = Vec::new();
                    for (_, rhs) in bindings {
                        rhss.push(self.expr(scope, rhs)?);
                    }
                    let body = self.expr(scope, body);
                    scope.truncate(save);
                    ExprNode::Let {
                        rec: true,
                        bindings: translated.into_iter().zip(rhss).collect(),
                        body: Box::new(body?),
                    }
                } else {
                    let mut pairs = Vec::new();
                    for (pat, rhs) in bindings {
                        let rhs = self.expr(scope, rhs)?;
                        let p = self.pattern(pat)?;
                        self.push_pattern_names(scope, pat);
                        pairs.push((p, rhs));
                    }
                    let body = self.expr(scope, body);
                    scope.truncate(save);
                    ExprNode::Let {
                        rec: false,
                        bindings: pairs,
                        body: Box::new(body?),
                    }
                }
            }
            Expression::Fun {
                type_params,
                arg,
                arg_ty,
                ret_ty,
                body,
                span,
            } => {
                let save = scope.len();
                let mut binders = Vec::new();
                for p in type_params {
                    binders.push(Binding::new(p.name, p.kind.clone(), p.span));
                    scope.push((p.name, p.kind.clone()));
                }
                binders.push(Binding::new(*arg, Kind::Term, *span).cannot_instantiate());
                scope.push((*arg, Kind::Term));
                let arg_t = self.ty(scope, arg_ty);
                let ret_t = self.ty(scope, ret_ty);
                let body_t = self.expr(scope, body);
                scope.truncate(save);
                ExprNode::Lambda {
                    binders,
                    arg_ty: arg_t?,
                    ret_ty: ret_t?,
                    body: Box::new(body_t?),
                }
            }
            Expression::App(f, a) => ExprNode::App(
                Box::new(self.expr(scope, f)?),
                Box::new(self.expr(scope, a)?),
            ),
            Expression::TApp(f, tys, _) => {
                let f = self.expr(scope, f)?;
                let mut translated = Vec::new();
                for t in tys {
                    translated.push(self.ty(scope, t)?);
                }
                ExprNode::TApp(Box::new(f), translated)
            }
            Expression::Tuple(es, _) => {
                let mut parts = Vec::new();
                for e in es {
                    parts.push(self.expr(scope, e)?);
                }
                ExprNode::Tuple(parts)
            }
            Expression::Construct {
                datacon,
                fields,
                span,
            } => {
                let (dc, declared) = self
                    .datacons
                    .get(datacon)
                    .cloned()
                    .ok_or_else(|| KindError::UnknownConstructor {
                        name: self.interner.resolve(*datacon).to_string(),
                        span: *span,
                    })?;
                // Fields in declaration order, whatever order was written.
                let mut ordered = Vec::new();
                for name in &declared {
                    let written = fields.iter().find(|(n, _)| n == name).ok_or_else(|| {
                        KindError::MissingField {
                            datacon: self.interner.resolve(*datacon).to_string(),
                            field: self.interner.resolve(*name).to_string(),
                            span: *span,
                        }
                    })?;
                    ordered.push((*name, self.expr(scope, written.1)?));
                }
                ExprNode::Construct {
                    datacon: dc,
                    fields: ordered,
                }
            }
            Expression::Match {
                scrutinee, arms, ..
            } => {
                let s = self.expr(scope, scrutinee)?;
                let mut translated = Vec::new();
                for (pat, body) in arms {
                    let save = scope.len();
                    let p = self.pattern(pat)?;
                    self.push_pattern_names(scope, pat);
                    let b = self.expr(scope, body);
                    scope.truncate(save);
                    translated.push((p, b?));
                }
                ExprNode::Match {
                    scrutinee: Box::new(s),
                    arms: translated,
                }
            }
            Expression::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => ExprNode::If {
                cond: Box::new(self.expr(scope, cond)?),
                then_branch: Box::new(self.expr(scope, then_branch)?),
                else_branch: match else_branch {
                    Some(e) => Some(Box::new(self.expr(scope, e)?)),
                    None => None,
                },
            },
            Expression::Access(target, field, _) => ExprNode::Access {
                expr: Box::new(self.expr(scope, target)?),
                field: *field,
            },
            Expression::Assign(target, field, value, _) => ExprNode::Assign {
                expr: Box::new(self.expr(scope, target)?),
                field: *field,
                value: Box::new(self.expr(scope, value)?),
            },
            Expression::AssignTag(target, datacon, span) => {
                let (dc, _) = self
                    .datacons
                    .get(datacon)
                    .cloned()
                    .ok_or_else(|| KindError::UnknownConstructor {
                        name: self.interner.resolve(*datacon).to_string(),
                        span: *span,
                    })?;
                ExprNode::AssignTag {
                    expr: Box::new(self.expr(scope, target)?),
                    datacon: dc,
                }
            }
            Expression::Give(adoptee, adopter, _) => ExprNode::Give {
                adoptee: Box::new(self.expr(scope, adoptee)?),
                adopter: Box::new(self.expr(scope, adopter)?),
            },
            Expression::Take(adoptee, adopter, _) => ExprNode::Take {
                adoptee: Box::new(self.expr(scope, adoptee)?),
                adopter: Box::new(self.expr(scope, adopter)?),
            },
            Expression::Owns(adopter, adoptee, _) => ExprNode::Owns {
                adopter: Box::new(self.expr(scope, adopter)?),
                adoptee: Box::new(self.expr(scope, adoptee)?),
            },
            Expression::Fail(_) => ExprNode::Fail,
            Expression::Annot(inner, t) => {
                let e = self.expr(scope, inner)?;
                let t = self.ty(scope, t)?;
                ExprNode::Constraint(Box::new(e), t)
            }
            Expression::Sequence(a, b) => {
                // `a; b` is `let _ = a in b`.
                let a = self.expr(scope, a)?;
                let b = self.expr(scope, b)?;
                ExprNode::Let {
                    rec: false,
                    bindings: vec![(Pattern::new(PatternNode::Any, span), a)],
                    body: Box::new(b),
                }
            }
            Expression::Grouped(inner, _) => return self.expr(scope, inner),
        };
        Ok(Expr::new(node, span))
    }

    fn pattern(&mut self, pat: &Pat<'_>) -> TResult<Pattern> {
        let span = pat.span();
        let node = match pat {
            Pat::Var(sym, _) => PatternNode::Var(*sym),
            Pat::Any(_) => PatternNode::Any,
            Pat::Tuple(ps, _) => {
                let mut parts = Vec::new();
                for p in ps {
                    parts.push(self.pattern(p)?);
                }
                PatternNode::Tuple(parts)
            }
            Pat::Construct {
                datacon,
                fields,
                span,
            } => {
                let (dc, _) = self
                    .datacons
                    .get(datacon)
                    .cloned()
                    .ok_or_else(|| KindError::UnknownConstructor {
                        name: self.interner.resolve(*datacon).to_string(),
                        span: *span,
                    })?;
                let mut translated = Vec::new();
                for (name, p) in fields {
                    translated.push((*name, self.pattern(p)?));
                }
                PatternNode::Construct {
                    datacon: dc,
                    fields: translated,
                }
            }
            Pat::As(p, name, _) => PatternNode::As(Box::new(self.pattern(p)?), *name),
        };
        Ok(Pattern::new(node, span))
    }

    /// Push the names a pattern binds, in the same order the checker
    /// binds them.
    fn push_pattern_names(&self, scope: &mut Vec<(Symbol, Kind)>, pat: &Pat<'_>) {
        push_pattern_names_inner(scope, pat)
    }
}

/// What one module's bindings look like at the kind level.
fn kind_exports(bindings: &ModuleBindings, env: &Env) -> ModuleExports {
    let mut exports = ModuleExports::default();
    for (&sym, &v) in &bindings.types {
        exports.types.insert(sym, env.kind(v).clone());
    }
    for (&sym, (_, fields)) in &bindings.datacons {
        exports.datacons.insert(sym, fields.clone());
    }
    exports.values.extend(bindings.values.keys().copied());
    exports
}

fn push_pattern_names_inner(scope: &mut Vec<(Symbol, Kind)>, pat: &Pat<'_>) {
    match pat {
        Pat::Var(name, _) => scope.push((*name, Kind::Term)),
        Pat::Any(_) => {}
        Pat::Tuple(ps, _) => {
            for p in ps {
                push_pattern_names_inner(scope, p);
            }
        }
        Pat::Construct { fields, .. } => {
            for (_, p) in fields {
                push_pattern_names_inner(scope, p);
            }
        }
        Pat::As(p, name, _) => {
            push_pattern_names_inner(scope, p);
            scope.push((*name, Kind::Term));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstContext;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::ast::Item;
    use bumpalo::Bump;
    use mezzo_kernel::check::{check_expr, Builtins};

    /// Run a whole source file through lex, parse, translate, and check.
    fn check_program(src: &str) -> Result<(), String> {
        let mut interner = Interner::new();
        let tokens = Lexer::new(src)
            .tokenize(&mut interner)
            .map_err(|e| e.to_string())?;
        let bump = Bump::new();
        let ctx = AstContext::new(&bump);
        let module = Parser::new(&tokens, ctx)
            .parse_module()
            .map_err(|e| e.to_string())?;
        let mut env = Env::new();
        let builtins = Builtins::install(&mut env, &mut interner);
        let mut tr = Translator::new(&mut interner);
        tr.install_builtins(&builtins);
        for item in &module.items {
            match item {
                Item::DataGroup(defs) => {
                    tr.bind_data_group(&mut env, defs).map_err(|e| e.to_string())?;
                }
                Item::ValDef { name, expr, .. } => {
                    let core = tr.expr_toplevel(expr).map_err(|e| e.to_string())?;
                    let (e2, v) = check_expr(env.clone(), &core, tr.interner(), builtins)
                        .map_err(|e| e.to_string())?;
                    env = e2;
                    tr.values.insert(*name, v);
                }
                _ => {}
            }
        }
        Ok(())
    }

    #[test]
    fn whole_pipeline_accepts_a_list_module() {
        check_program(
            "data list a = Nil | Cons { head: a; tail: list a }\n\
             val xs = Cons { head = 1; tail = Nil }\n\
             val first = match xs with Cons { head = h; tail = t } -> h | Nil -> 0 end",
        )
        .expect("program checks");
    }

    #[test]
    fn exclusive_ref_assignment_checks() {
        check_program(
            "mutable data ref a = Ref { contents: a }\n\
             val go = let r = Ref { contents = 0 } in r.contents <- 1; r.contents <- 2",
        )
        .expect("assignment through a mutable ref checks");
    }

    #[test]
    fn closures_may_not_capture_exclusive_state() {
        let result = check_program(
            "mutable data ref a = Ref { contents: a }\n\
             val go = let r = Ref { contents = 0 } in \
                      let f = fun (u: ()) : int = begin r.contents <- 1; 0 end in f ()",
        );
        assert!(result.is_err(), "capture of an exclusive ref must fail");
    }

    #[test]
    fn duplicable_capture_is_fine() {
        check_program(
            "val go = let n = 3 in let f = fun (u: ()) : int = n in f ()",
        )
        .expect("capturing a duplicable int checks");
    }

    #[test]
    fn sequencing_desugars_to_let() {
        let mut interner = Interner::new();
        let tokens = Lexer::new("val x = 1; 2").tokenize(&mut interner).unwrap();
        let bump = Bump::new();
        let ctx = AstContext::new(&bump);
        let module = Parser::new(&tokens, ctx).parse_module().unwrap();
        let mut tr = Translator::new(&mut interner);
        match &module.items[0] {
            Item::ValDef { expr, .. } => {
                let core = tr.expr_toplevel(expr).unwrap();
                assert!(matches!(core.node, ExprNode::Let { rec: false, .. }));
            }
            other => panic!("expected val def, got {:?}", other),
        }
    }

    #[test]
    fn give_and_take_round_trip() {
        check_program(
            "mutable data cell = Cell { item: int }\n\
             mutable data pool = Pool {} adopts cell\n\
             val go = let c = Cell { item = 0 } in \
                      let p = Pool {} in \
                      give c to p; take c from p; c.item <- 1",
        )
        .expect("adoption cycle checks");
    }

    #[test]
    fn taking_without_dynamic_fails() {
        let result = check_program(
            "mutable data cell = Cell { item: int }\n\
             mutable data pool = Pool {} adopts cell\n\
             val go = let c = Cell { item = 0 } in \
                      let p = Pool {} in \
                      take c from p",
        );
        assert!(result.is_err(), "take requires the adoptee at dynamic");
    }

    #[test]
    fn if_requires_two_branches_and_merges() {
        check_program(
            "val go = let b = True in let x = if b then 1 else 2 in (x : int)",
        )
        .expect("if over bool checks");
    }

}
