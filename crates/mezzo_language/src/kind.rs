//! Kind checking and name resolution for the surface syntax.
//!
//! Runs between the parser and the translator: every name must resolve,
//! every type must be well-kinded, data-constructor applications must
//! mention exactly the declared fields, `consumes` and name-introducing
//! components may only appear in function domains, and an implication
//! constraint must wrap an arrow. The translator afterwards assumes a
//! well-kinded tree.

use mezzo_base::{Interner, Span, Symbol};
use mezzo_kernel::ty::Kind;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::ast::{
    DataDef, Expression, Item, Module, Pat, SField, TypeExpr,
};

/// Kind errors. Fatal for the declaration that raised them.
#[derive(Debug, Clone)]
pub enum KindError {
    UnboundVariable { name: String, span: Span },
    UnboundModule { name: String, span: Span },
    UnknownConstructor { name: String, span: Span },
    WrongKind {
        expected: String,
        found: String,
        span: Span,
    },
    ArityMismatch {
        expected: usize,
        found: usize,
        span: Span,
    },
    MissingField {
        datacon: String,
        field: String,
        span: Span,
    },
    ExtraField {
        datacon: String,
        field: String,
        span: Span,
    },
    ConsumesOutsideDomain { span: Span },
    NamedOutsideDomain { span: Span },
    ImplyOnNonArrow { span: Span },
}

impl KindError {
    pub fn span(&self) -> Span {
        match self {
            KindError::UnboundVariable { span, .. }
            | KindError::UnboundModule { span, .. }
            | KindError::UnknownConstructor { span, .. }
            | KindError::WrongKind { span, .. }
            | KindError::ArityMismatch { span, .. }
            | KindError::MissingField { span, .. }
            | KindError::ExtraField { span, .. }
            | KindError::ConsumesOutsideDomain { span }
            | KindError::NamedOutsideDomain { span }
            | KindError::ImplyOnNonArrow { span } => *span,
        }
    }
}

impl fmt::Display for KindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindError::UnboundVariable { name, .. } => write!(f, "unbound variable {}", name),
            KindError::UnboundModule { name, .. } => write!(f, "unbound module {}", name),
            KindError::UnknownConstructor { name, .. } => {
                write!(f, "unknown data constructor {}", name)
            }
            KindError::WrongKind {
                expected, found, ..
            } => write!(f, "expected kind {}, found {}", expected, found),
            KindError::ArityMismatch {
                expected, found, ..
            } => write!(f, "expected {} arguments, found {}", expected, found),
            KindError::MissingField { datacon, field, .. } => {
                write!(f, "{} is missing field {}", datacon, field)
            }
            KindError::ExtraField { datacon, field, .. } => {
                write!(f, "{} has no field {}", datacon, field)
            }
            KindError::ConsumesOutsideDomain { .. } => {
                write!(f, "'consumes' is only legal in a function domain")
            }
            KindError::NamedOutsideDomain { .. } => {
                write!(f, "a named component is only legal in a function domain")
            }
            KindError::ImplyOnNonArrow { .. } => {
                write!(f, "'=>' constraints must be attached to an arrow type")
            }
        }
    }
}

impl std::error::Error for KindError {}

/// What one module exports, as seen by its importers.
#[derive(Debug, Clone, Default)]
pub struct ModuleExports {
    pub types: HashMap<Symbol, Kind>,
    pub datacons: HashMap<Symbol, Vec<Symbol>>,
    pub values: HashSet<Symbol>,
}

/// All names visible while checking one module: the module's own
/// declarations, names imported by `open`, and the modules reachable by
/// qualified access.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    pub types: HashMap<Symbol, Kind>,
    /// Data constructor name to the field names of its branch, in order.
    pub datacons: HashMap<Symbol, Vec<Symbol>>,
    pub values: HashSet<Symbol>,
    pub modules: HashMap<Symbol, ModuleExports>,
}

impl NameTable {
    /// Make an imported module's names visible unqualified.
    pub fn open_module(&mut self, m: &ModuleExports) {
        self.types.extend(m.types.clone());
        self.datacons.extend(m.datacons.clone());
        self.values.extend(m.values.iter().copied());
    }
}

/// The kind checker. One per module; mutates its [`NameTable`] as items
/// introduce names, so later items see earlier ones.
pub struct KindChecker<'a> {
    interner: &'a Interner,
    pub table: NameTable,
    /// Lexical binders, innermost last.
    scope: Vec<(Symbol, Kind)>,
}

type KResult<T> = Result<T, KindError>;

impl<'a> KindChecker<'a> {
    pub fn new(interner: &'a Interner, table: NameTable) -> Self {
        KindChecker {
            interner,
            table,
            scope: Vec::new(),
        }
    }

    fn name(&self, sym: Symbol) -> String {
        self.interner.resolve(sym).to_string()
    }

    /// Check a whole module, item by item.
    pub fn check_module(&mut self, module: &Module<'_>) -> KResult<()> {
        for item in &module.items {
            self.check_item(item)?;
        }
        Ok(())
    }

    pub fn check_item(&mut self, item: &Item<'_>) -> KResult<()> {
        match item {
            Item::Open(name, span) => {
                match self.table.modules.get(name).cloned() {
                    Some(exports) => {
                        self.table.open_module(&exports);
                        Ok(())
                    }
                    None => Err(KindError::UnboundModule {
                        name: self.name(*name),
                        span: *span,
                    }),
                }
            }
            Item::DataGroup(defs) => self.check_data_group(defs),
            Item::ValDef { rec, name, expr, .. } => {
                if *rec {
                    self.table.values.insert(*name);
                }
                self.check_expr(expr)?;
                self.table.values.insert(*name);
                Ok(())
            }
            Item::ValDecl { name, ty, .. } => {
                let k = self.infer_kind(ty, false)?;
                // `val x @ p` declares a permission, `val x : t` a type.
                if k != Kind::Type && k != Kind::Perm {
                    return Err(KindError::WrongKind {
                        expected: "type or perm".to_string(),
                        found: k.to_string(),
                        span: ty.span(),
                    });
                }
                self.table.values.insert(*name);
                Ok(())
            }
            Item::AbstractDecl { name, params, .. } => {
                let kind = Kind::constructor(
                    &params.iter().map(|p| p.kind.clone()).collect::<Vec<_>>(),
                );
                self.table.types.insert(*name, kind);
                Ok(())
            }
            Item::FactDecl { ty, .. } => {
                let k = self.infer_kind(ty, false)?;
                if k != Kind::Type {
                    return Err(KindError::WrongKind {
                        expected: "type".to_string(),
                        found: k.to_string(),
                        span: ty.span(),
                    });
                }
                Ok(())
            }
        }
    }

    fn check_data_group(&mut self, defs: &[DataDef<'_>]) -> KResult<()> {
        // The whole group first, so branches can mention any sibling.
        for def in defs {
            let kind = Kind::constructor(
                &def.params.iter().map(|p| p.kind.clone()).collect::<Vec<_>>(),
            );
            self.table.types.insert(def.name, kind);
        }
        for def in defs {
            let save = self.scope.len();
            for p in &def.params {
                self.scope.push((p.name, p.kind.clone()));
            }
            for branch in &def.branches {
                let mut field_names = Vec::new();
                for field in &branch.fields {
                    match field {
                        SField::Value(name, ty) => {
                            field_names.push(*name);
                            self.expect_kind(ty, Kind::Type, false)?;
                        }
                        SField::Permission(p) => {
                            self.expect_kind(p, Kind::Perm, false)?;
                        }
                    }
                }
                self.table.datacons.insert(branch.datacon, field_names);
            }
            if let Some(adopts) = def.adopts {
                self.expect_kind(adopts, Kind::Type, false)?;
            }
            self.scope.truncate(save);
        }
        Ok(())
    }

    // ── Types ───────────────────────────────────────────────────────────

    fn expect_kind(&mut self, ty: &TypeExpr<'_>, expected: Kind, in_domain: bool) -> KResult<()> {
        let found = self.infer_kind(ty, in_domain)?;
        if found == expected {
            Ok(())
        } else {
            Err(KindError::WrongKind {
                expected: expected.to_string(),
                found: found.to_string(),
                span: ty.span(),
            })
        }
    }

    /// Infer the kind of a surface type. `in_domain` is true directly
    /// under an arrow's domain, where `consumes` and named components are
    /// legal.
    pub fn infer_kind(&mut self, ty: &TypeExpr<'_>, in_domain: bool) -> KResult<Kind> {
        match ty {
            TypeExpr::Name(sym, span) => {
                if let Some((_, k)) = self.scope.iter().rev().find(|(n, _)| n == sym) {
                    return Ok(k.clone());
                }
                if let Some(k) = self.table.types.get(sym) {
                    return Ok(k.clone());
                }
                Err(KindError::UnboundVariable {
                    name: self.name(*sym),
                    span: *span,
                })
            }
            TypeExpr::Qualified(m, t, span) => {
                let exports =
                    self.table
                        .modules
                        .get(m)
                        .ok_or_else(|| KindError::UnboundModule {
                            name: self.name(*m),
                            span: *span,
                        })?;
                exports
                    .types
                    .get(t)
                    .cloned()
                    .ok_or_else(|| KindError::UnboundVariable {
                        name: format!("{}.{}", self.name(*m), self.name(*t)),
                        span: *span,
                    })
            }
            TypeExpr::Forall(b, body) | TypeExpr::Exists(b, body) => {
                self.scope.push((b.name, b.kind.clone()));
                let k = self.infer_kind(body, in_domain);
                self.scope.pop();
                k
            }
            TypeExpr::Imply(cs, body) => {
                for (_, subject) in cs {
                    self.expect_kind(subject, Kind::Type, false)?;
                }
                if !is_arrow_under_binders(body) {
                    return Err(KindError::ImplyOnNonArrow { span: body.span() });
                }
                self.infer_kind(body, in_domain)
            }
            TypeExpr::And(cs, body) => {
                for (_, subject) in cs {
                    self.expect_kind(subject, Kind::Type, false)?;
                }
                self.infer_kind(body, in_domain)
            }
            TypeExpr::Arrow(dom, cod) => {
                // A named domain component scopes over the codomain.
                let save = self.scope.len();
                self.bind_domain_names(dom);
                self.expect_kind(dom, Kind::Type, true)?;
                let r = self.expect_kind(cod, Kind::Type, false);
                self.scope.truncate(save);
                r?;
                Ok(Kind::Type)
            }
            TypeExpr::App(head, args) => {
                let head_kind = self.infer_kind(head, false)?;
                let expected = head_kind.arity();
                if expected != args.len() {
                    return Err(KindError::ArityMismatch {
                        expected,
                        found: args.len(),
                        span: ty.span(),
                    });
                }
                let mut k = head_kind;
                for arg in args {
                    match k {
                        Kind::Arrow(param, rest) => {
                            self.expect_kind(arg, *param, false)?;
                            k = *rest;
                        }
                        _ => unreachable!("arity was checked"),
                    }
                }
                Ok(k)
            }
            TypeExpr::Tuple(ts) => {
                for t in ts {
                    self.expect_kind(t, Kind::Type, in_domain)?;
                }
                Ok(Kind::Type)
            }
            TypeExpr::Singleton(x, span) => {
                self.check_value_name(*x, *span)?;
                Ok(Kind::Type)
            }
            TypeExpr::Unknown(_) | TypeExpr::Dynamic(_) => Ok(Kind::Type),
            TypeExpr::Empty(_) => Ok(Kind::Perm),
            TypeExpr::Concrete {
                datacon, fields, adopts, span,
            } => {
                let declared = self
                    .table
                    .datacons
                    .get(datacon)
                    .cloned()
                    .ok_or_else(|| KindError::UnknownConstructor {
                        name: self.name(*datacon),
                        span: *span,
                    })?;
                let mut seen = Vec::new();
                for field in fields {
                    match field {
                        SField::Value(name, t) => {
                            if !declared.contains(name) {
                                return Err(KindError::ExtraField {
                                    datacon: self.name(*datacon),
                                    field: self.name(*name),
                                    span: t.span(),
                                });
                            }
                            seen.push(*name);
                            self.expect_kind(t, Kind::Type, false)?;
                        }
                        SField::Permission(p) => {
                            self.expect_kind(p, Kind::Perm, false)?;
                        }
                    }
                }
                for name in &declared {
                    if !seen.contains(name) {
                        return Err(KindError::MissingField {
                            datacon: self.name(*datacon),
                            field: self.name(*name),
                            span: *span,
                        });
                    }
                }
                if let Some(a) = adopts {
                    self.expect_kind(a, Kind::Type, false)?;
                }
                Ok(Kind::Type)
            }
            TypeExpr::Bar(t, p) => {
                self.expect_kind(t, Kind::Type, in_domain)?;
                self.expect_kind(p, Kind::Perm, false)?;
                Ok(Kind::Type)
            }
            TypeExpr::Anchored(x, t, span) => {
                self.check_value_name(*x, *span)?;
                self.expect_kind(t, Kind::Type, false)?;
                Ok(Kind::Perm)
            }
            TypeExpr::Star(p, q) => {
                self.expect_kind(p, Kind::Perm, false)?;
                self.expect_kind(q, Kind::Perm, false)?;
                Ok(Kind::Perm)
            }
            TypeExpr::Consumes(inner, span) => {
                if !in_domain {
                    return Err(KindError::ConsumesOutsideDomain { span: *span });
                }
                self.infer_kind(inner, false)
            }
            TypeExpr::NamedOf(_, inner, span) => {
                if !in_domain {
                    return Err(KindError::NamedOutsideDomain { span: *span });
                }
                self.infer_kind(inner, false)
            }
        }
    }

    /// Push the term binder a domain introduces. Only the top of the
    /// domain may be named; the argument is one value.
    fn bind_domain_names(&mut self, dom: &TypeExpr<'_>) {
        match dom {
            TypeExpr::NamedOf(name, _, _) => self.scope.push((*name, Kind::Term)),
            TypeExpr::Consumes(inner, _) | TypeExpr::Bar(inner, _) => {
                self.bind_domain_names(inner)
            }
            _ => {}
        }
    }

    /// A name used at kind `term`: a lexical binder of kind term, or a
    /// known toplevel value.
    fn check_value_name(&mut self, sym: Symbol, span: Span) -> KResult<()> {
        let bound = self
            .scope
            .iter()
            .rev()
            .any(|(n, k)| *n == sym && *k == Kind::Term);
        if bound || self.table.values.contains(&sym) {
            Ok(())
        } else {
            Err(KindError::UnboundVariable {
                name: self.name(sym),
                span,
            })
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub fn check_expr(&mut self, expr: &Expression<'_>) -> KResult<()> {
        match expr {
            Expression::Var(sym, span) => self.check_value_name(*sym, *span),
            Expression::Qualified(m, x, span) => {
                let exports =
                    self.table
                        .modules
                        .get(m)
                        .ok_or_else(|| KindError::UnboundModule {
                            name: self.name(*m),
                            span: *span,
                        })?;
                if exports.values.contains(x) {
                    Ok(())
                } else {
                    Err(KindError::UnboundVariable {
                        name: format!("{}.{}", self.name(*m), self.name(*x)),
                        span: *span,
                    })
                }
            }
            Expression::Int(..) | Expression::Unit(_) | Expression::Fail(_) => Ok(()),
            Expression::Let {
                rec,
                bindings,
                body,
                ..
            } => {
                let save = self.scope.len();
                if *rec {
                    for (pat, _) in bindings {
                        self.bind_pattern_names(pat);
                    }
                    for (_, rhs) in bindings {
                        self.check_expr(rhs)?;
                    }
                } else {
                    for (pat, rhs) in bindings {
                        self.check_expr(rhs)?;
                        self.check_pattern(pat)?;
                        self.bind_pattern_names(pat);
                    }
                }
                let r = self.check_expr(body);
                self.scope.truncate(save);
                r
            }
            Expression::Fun {
                type_params,
                arg,
                arg_ty,
                ret_ty,
                body,
                ..
            } => {
                let save = self.scope.len();
                for p in type_params {
                    self.scope.push((p.name, p.kind.clone()));
                }
                self.scope.push((*arg, Kind::Term));
                let r = self
                    .expect_kind(arg_ty, Kind::Type, true)
                    .and_then(|_| self.expect_kind(ret_ty, Kind::Type, false))
                    .and_then(|_| self.check_expr(body));
                self.scope.truncate(save);
                r
            }
            Expression::App(f, a) => {
                self.check_expr(f)?;
                self.check_expr(a)
            }
            Expression::TApp(f, tys, _) => {
                self.check_expr(f)?;
                for t in tys {
                    self.infer_kind(t, false)?;
                }
                Ok(())
            }
            Expression::Tuple(es, _) => {
                for e in es {
                    self.check_expr(e)?;
                }
                Ok(())
            }
            Expression::Construct {
                datacon,
                fields,
                span,
            } => {
                let declared = self
                    .table
                    .datacons
                    .get(datacon)
                    .cloned()
                    .ok_or_else(|| KindError::UnknownConstructor {
                        name: self.name(*datacon),
                        span: *span,
                    })?;
                for (name, e) in fields {
                    if !declared.contains(name) {
                        return Err(KindError::ExtraField {
                            datacon: self.name(*datacon),
                            field: self.name(*name),
                            span: e.span(),
                        });
                    }
                    self.check_expr(e)?;
                }
                for name in &declared {
                    if !fields.iter().any(|(n, _)| n == name) {
                        return Err(KindError::MissingField {
                            datacon: self.name(*datacon),
                            field: self.name(*name),
                            span: *span,
                        });
                    }
                }
                Ok(())
            }
            Expression::Match {
                scrutinee, arms, ..
            } => {
                self.check_expr(scrutinee)?;
                for (pat, body) in arms {
                    let save = self.scope.len();
                    self.check_pattern(pat)?;
                    self.bind_pattern_names(pat);
                    let r = self.check_expr(body);
                    self.scope.truncate(save);
                    r?;
                }
                Ok(())
            }
            Expression::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_expr(cond)?;
                self.check_expr(then_branch)?;
                if let Some(e) = else_branch {
                    self.check_expr(e)?;
                }
                Ok(())
            }
            Expression::Access(e, _, _) => self.check_expr(e),
            Expression::Assign(e, _, v, _) => {
                self.check_expr(e)?;
                self.check_expr(v)
            }
            Expression::AssignTag(e, datacon, span) => {
                if !self.table.datacons.contains_key(datacon) {
                    return Err(KindError::UnknownConstructor {
                        name: self.name(*datacon),
                        span: *span,
                    });
                }
                self.check_expr(e)
            }
            Expression::Give(a, b, _)
            | Expression::Take(a, b, _)
            | Expression::Owns(a, b, _) => {
                self.check_expr(a)?;
                self.check_expr(b)
            }
            Expression::Annot(e, t) => {
                self.expect_kind(t, Kind::Type, false)?;
                self.check_expr(e)
            }
            Expression::Sequence(a, b) => {
                self.check_expr(a)?;
                self.check_expr(b)
            }
            Expression::Grouped(e, _) => self.check_expr(e),
        }
    }

    fn check_pattern(&mut self, pat: &Pat<'_>) -> KResult<()> {
        match pat {
            Pat::Var(..) | Pat::Any(_) => Ok(()),
            Pat::Tuple(ps, _) => {
                for p in ps {
                    self.check_pattern(p)?;
                }
                Ok(())
            }
            Pat::Construct {
                datacon,
                fields,
                span,
            } => {
                let declared = self
                    .table
                    .datacons
                    .get(datacon)
                    .cloned()
                    .ok_or_else(|| KindError::UnknownConstructor {
                        name: self.name(*datacon),
                        span: *span,
                    })?;
                for (name, p) in fields {
                    if !declared.contains(name) {
                        return Err(KindError::ExtraField {
                            datacon: self.name(*datacon),
                            field: self.name(*name),
                            span: p.span(),
                        });
                    }
                    self.check_pattern(p)?;
                }
                Ok(())
            }
            Pat::As(p, _, _) => self.check_pattern(p),
        }
    }

    fn bind_pattern_names(&mut self, pat: &Pat<'_>) {
        match pat {
            Pat::Var(name, _) => self.scope.push((*name, Kind::Term)),
            Pat::Any(_) => {}
            Pat::Tuple(ps, _) => {
                for p in ps {
                    self.bind_pattern_names(p);
                }
            }
            Pat::Construct { fields, .. } => {
                for (_, p) in fields {
                    self.bind_pattern_names(p);
                }
            }
            Pat::As(p, name, _) => {
                self.bind_pattern_names(p);
                self.scope.push((*name, Kind::Term));
            }
        }
    }
}

/// Is this a function type once binders and constraints are peeled?
fn is_arrow_under_binders(t: &TypeExpr<'_>) -> bool {
    match t {
        TypeExpr::Arrow(..) => true,
        TypeExpr::Forall(_, body) | TypeExpr::Exists(_, body) => is_arrow_under_binders(body),
        TypeExpr::Imply(_, body) | TypeExpr::And(_, body) => is_arrow_under_binders(body),
        TypeExpr::Bar(inner, _) => is_arrow_under_binders(inner),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstContext;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use bumpalo::Bump;

    fn check(src: &str) -> Result<(), KindError> {
        let mut interner = Interner::new();
        let tokens = Lexer::new(src).tokenize(&mut interner).expect("lexes");
        let bump = Bump::new();
        let ctx = AstContext::new(&bump);
        let module = Parser::new(&tokens, ctx).parse_module().expect("parses");
        let mut table = NameTable::default();
        // Builtins visible in every module.
        table.types.insert(interner.intern("int"), Kind::Type);
        table.types.insert(interner.intern("bool"), Kind::Type);
        let mut checker = KindChecker::new(&interner, table);
        checker.check_module(&module)
    }

    #[test]
    fn well_kinded_data_and_values() {
        assert!(check(
            "data list a = Nil | Cons { head: a; tail: list a }\n\
             val xs = Cons { head = 1; tail = Nil }"
        )
        .is_ok());
    }

    #[test]
    fn unbound_variables_are_reported() {
        assert!(matches!(
            check("val x = y"),
            Err(KindError::UnboundVariable { .. })
        ));
    }

    #[test]
    fn type_application_arity_is_checked() {
        assert!(matches!(
            check("data list a = Nil\nval t : list int int"),
            Err(KindError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn constructor_fields_must_be_exact() {
        assert!(matches!(
            check("data pair = P { first: int; second: int }\nval p = P { first = 1 }"),
            Err(KindError::MissingField { .. })
        ));
        assert!(matches!(
            check("data pair = P { first: int }\nval p = P { first = 1; third = 2 }"),
            Err(KindError::ExtraField { .. })
        ));
    }

    #[test]
    fn consumes_is_domain_only() {
        assert!(matches!(
            check("val t : consumes int"),
            Err(KindError::ConsumesOutsideDomain { .. })
        ));
        assert!(check("val f : (consumes int) -> int").is_ok());
    }

    #[test]
    fn imply_requires_an_arrow() {
        assert!(matches!(
            check("data box a = B { item: a }\nval t : duplicable int => box int"),
            Err(KindError::ImplyOnNonArrow { .. })
        ));
        assert!(check("val f : duplicable int => int -> int").is_ok());
    }

    #[test]
    fn named_domains_scope_over_the_codomain() {
        assert!(check("val f : (x: int) -> =x").is_ok());
        assert!(matches!(
            check("val t : (x: int)"),
            Err(KindError::NamedOutsideDomain { .. })
        ));
    }

    #[test]
    fn rec_values_see_themselves() {
        assert!(check("val rec loop = fun (x: int) : int = loop x").is_ok());
    }
}
