//! Printing of the surface syntax.
//!
//! The printer renders a parsed module back to concrete syntax. Its
//! contract is stability: printing a module and re-parsing the output
//! yields a tree that prints identically. Output is normalized — one
//! item per line, canonical spacing, parentheses only where the grammar
//! needs them — rather than a byte-for-byte copy of the input.

use mezzo_base::Interner;
use mezzo_kernel::ty::Kind;
use std::fmt::Write;

use crate::ast::{
    DataDef, Expression, Item, Module, Pat, SBinding, SDemand, SField, TypeExpr,
};

/// Renders surface trees with resolved names.
pub struct AstPrinter<'i> {
    interner: &'i Interner,
}

impl<'i> AstPrinter<'i> {
    pub fn new(interner: &'i Interner) -> Self {
        AstPrinter { interner }
    }

    fn name(&self, sym: mezzo_base::Symbol) -> &str {
        self.interner.resolve(sym)
    }

    /// Print a whole module, one item per line.
    pub fn module(&self, module: &Module<'_>) -> String {
        let mut out = String::new();
        for item in &module.items {
            self.item(&mut out, item);
            out.push('\n');
        }
        out
    }

    fn item(&self, out: &mut String, item: &Item<'_>) {
        match item {
            Item::Open(name, _) => {
                let _ = write!(out, "open {}", self.name(*name));
            }
            Item::DataGroup(defs) => {
                for (i, def) in defs.iter().enumerate() {
                    if i > 0 {
                        out.push_str("\nand ");
                    }
                    self.data_def(out, def, i == 0);
                }
            }
            Item::ValDef {
                rec, name, expr, ..
            } => {
                let _ = write!(
                    out,
                    "val {}{} = ",
                    if *rec { "rec " } else { "" },
                    self.name(*name)
                );
                self.expr(out, expr);
            }
            Item::ValDecl { name, ty, .. } => {
                let _ = write!(out, "val {} : ", self.name(*name));
                self.ty(out, ty);
            }
            Item::AbstractDecl { name, params, .. } => {
                let _ = write!(out, "abstract {}", self.name(*name));
                for p in params {
                    out.push(' ');
                    self.binder(out, p);
                }
            }
            Item::FactDecl { demand, ty, .. } => {
                let _ = write!(
                    out,
                    "fact {} ",
                    match demand {
                        SDemand::Duplicable => "duplicable",
                        SDemand::Exclusive => "exclusive",
                    }
                );
                self.ty_atom(out, ty);
            }
        }
    }

    fn data_def(&self, out: &mut String, def: &DataDef<'_>, _leading: bool) {
        if def.mutable {
            out.push_str("mutable ");
        }
        out.push_str("data ");
        let _ = write!(out, "{}", self.name(def.name));
        for p in &def.params {
            out.push(' ');
            self.binder(out, p);
        }
        out.push_str(" = ");
        for (i, branch) in def.branches.iter().enumerate() {
            if i > 0 {
                out.push_str(" | ");
            }
            let _ = write!(out, "{}", self.name(branch.datacon));
            if !branch.fields.is_empty() {
                out.push_str(" { ");
                for (j, field) in branch.fields.iter().enumerate() {
                    if j > 0 {
                        out.push_str("; ");
                    }
                    self.field(out, field);
                }
                out.push_str(" }");
            }
        }
        if let Some(adopts) = def.adopts {
            out.push_str(" adopts ");
            self.ty_app(out, adopts);
        }
    }

    fn field(&self, out: &mut String, field: &SField<'_>) {
        match field {
            SField::Value(name, t) => {
                let _ = write!(out, "{}: ", self.name(*name));
                self.ty_arrow(out, t);
            }
            SField::Permission(p) => {
                out.push_str("| ");
                self.ty_star(out, p);
            }
        }
    }

    fn binder(&self, out: &mut String, b: &SBinding) {
        if b.kind == Kind::Type {
            let _ = write!(out, "{}", self.name(b.name));
        } else {
            let _ = write!(out, "({} : {})", self.name(b.name), b.kind);
        }
    }

    // ── Types, by precedence level ──────────────────────────────────────

    fn ty(&self, out: &mut String, t: &TypeExpr<'_>) {
        match t {
            TypeExpr::Forall(b, body) => {
                out.push('[');
                self.binder(out, b);
                out.push_str("] ");
                self.ty(out, body);
            }
            TypeExpr::Exists(b, body) => {
                out.push('{');
                self.binder(out, b);
                out.push_str("} ");
                self.ty(out, body);
            }
            TypeExpr::Imply(cs, body) => {
                for (demand, subject) in cs {
                    self.constraint(out, *demand, subject);
                    out.push_str(" => ");
                }
                self.ty(out, body);
            }
            TypeExpr::And(cs, body) => {
                for (demand, subject) in cs {
                    self.constraint(out, *demand, subject);
                    out.push_str(" /\\ ");
                }
                self.ty(out, body);
            }
            _ => self.ty_arrow(out, t),
        }
    }

    fn constraint(&self, out: &mut String, demand: SDemand, subject: &TypeExpr<'_>) {
        out.push_str(match demand {
            SDemand::Duplicable => "duplicable ",
            SDemand::Exclusive => "exclusive ",
        });
        self.ty_atom(out, subject);
    }

    fn ty_arrow(&self, out: &mut String, t: &TypeExpr<'_>) {
        match t {
            TypeExpr::Arrow(dom, cod) => {
                match dom {
                    TypeExpr::NamedOf(name, inner, _) => {
                        let _ = write!(out, "({}: ", self.name(*name));
                        self.ty(out, inner);
                        out.push(')');
                    }
                    _ => self.ty_bar(out, dom),
                }
                out.push_str(" -> ");
                self.ty_arrow(out, cod);
            }
            _ => self.ty_bar(out, t),
        }
    }

    fn ty_bar(&self, out: &mut String, t: &TypeExpr<'_>) {
        match t {
            TypeExpr::Bar(v, p) => {
                self.ty_bar(out, v);
                out.push_str(" | ");
                self.ty_star(out, p);
            }
            _ => self.ty_star(out, t),
        }
    }

    fn ty_star(&self, out: &mut String, t: &TypeExpr<'_>) {
        match t {
            TypeExpr::Star(p, q) => {
                self.ty_star(out, p);
                out.push_str(" * ");
                self.ty_anchor(out, q);
            }
            _ => self.ty_anchor(out, t),
        }
    }

    fn ty_anchor(&self, out: &mut String, t: &TypeExpr<'_>) {
        match t {
            TypeExpr::Anchored(x, inner, _) => {
                let _ = write!(out, "{} @ ", self.name(*x));
                self.ty_app(out, inner);
            }
            _ => self.ty_app(out, t),
        }
    }

    fn ty_app(&self, out: &mut String, t: &TypeExpr<'_>) {
        match t {
            TypeExpr::App(head, args) => {
                self.ty_atom(out, head);
                for arg in args {
                    out.push(' ');
                    self.ty_atom(out, arg);
                }
            }
            TypeExpr::Consumes(inner, _) => {
                out.push_str("consumes ");
                self.ty_app(out, inner);
            }
            _ => self.ty_atom(out, t),
        }
    }

    fn ty_atom(&self, out: &mut String, t: &TypeExpr<'_>) {
        match t {
            TypeExpr::Name(sym, _) => {
                let _ = write!(out, "{}", self.name(*sym));
            }
            TypeExpr::Qualified(m, name, _) => {
                let _ = write!(out, "{}.{}", self.name(*m), self.name(*name));
            }
            TypeExpr::Singleton(x, _) => {
                let _ = write!(out, "={}", self.name(*x));
            }
            TypeExpr::Unknown(_) => out.push_str("unknown"),
            TypeExpr::Dynamic(_) => out.push_str("dynamic"),
            TypeExpr::Empty(_) => out.push_str("empty"),
            TypeExpr::Tuple(ts) => {
                out.push('(');
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.ty(out, t);
                }
                out.push(')');
            }
            TypeExpr::Concrete {
                datacon,
                fields,
                adopts,
                ..
            } => {
                let _ = write!(out, "{}", self.name(*datacon));
                if !fields.is_empty() {
                    out.push_str(" { ");
                    for (i, field) in fields.iter().enumerate() {
                        if i > 0 {
                            out.push_str("; ");
                        }
                        self.field(out, field);
                    }
                    out.push_str(" }");
                }
                if let Some(a) = adopts {
                    out.push_str(" adopts ");
                    self.ty_app(out, a);
                }
            }
            TypeExpr::NamedOf(name, inner, _) => {
                let _ = write!(out, "({}: ", self.name(*name));
                self.ty(out, inner);
                out.push(')');
            }
            // Anything looser than an atom gets parenthesized.
            other => {
                out.push('(');
                self.ty(out, other);
                out.push(')');
            }
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn expr(&self, out: &mut String, e: &Expression<'_>) {
        match e {
            Expression::Let {
                rec,
                bindings,
                body,
                ..
            } => {
                let _ = write!(out, "let {}", if *rec { "rec " } else { "" });
                for (i, (pat, rhs)) in bindings.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" and ");
                    }
                    self.pat(out, pat);
                    out.push_str(" = ");
                    self.expr_stmt(out, rhs);
                }
                out.push_str(" in ");
                self.expr(out, body);
            }
            Expression::Sequence(a, b) => {
                self.expr_stmt(out, a);
                out.push_str("; ");
                self.expr(out, b);
            }
            _ => self.expr_stmt(out, e),
        }
    }

    fn expr_stmt(&self, out: &mut String, e: &Expression<'_>) {
        match e {
            Expression::Fun {
                type_params,
                arg,
                arg_ty,
                ret_ty,
                body,
                ..
            } => {
                out.push_str("fun ");
                for p in type_params {
                    out.push('[');
                    self.binder(out, p);
                    out.push_str("] ");
                }
                let _ = write!(out, "({}: ", self.name(*arg));
                self.ty(out, arg_ty);
                out.push_str(") : ");
                self.ty_arrow(out, ret_ty);
                out.push_str(" = ");
                self.expr_stmt(out, body);
            }
            Expression::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                out.push_str("if ");
                self.expr_stmt(out, cond);
                out.push_str(" then ");
                self.expr_stmt(out, then_branch);
                if let Some(e) = else_branch {
                    out.push_str(" else ");
                    self.expr_stmt(out, e);
                }
            }
            Expression::Match {
                scrutinee, arms, ..
            } => {
                out.push_str("match ");
                self.expr_stmt(out, scrutinee);
                out.push_str(" with ");
                for (i, (pat, body)) in arms.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" | ");
                    }
                    self.pat(out, pat);
                    out.push_str(" -> ");
                    self.expr(out, body);
                }
                out.push_str(" end");
            }
            Expression::Give(adoptee, adopter, _) => {
                out.push_str("give ");
                self.app_expr(out, adoptee);
                out.push_str(" to ");
                self.app_expr(out, adopter);
            }
            Expression::Take(adoptee, adopter, _) => {
                out.push_str("take ");
                self.app_expr(out, adoptee);
                out.push_str(" from ");
                self.app_expr(out, adopter);
            }
            Expression::AssignTag(target, datacon, _) => {
                out.push_str("tag of ");
                self.app_expr(out, target);
                let _ = write!(out, " <- {}", self.name(*datacon));
            }
            Expression::Assign(target, field, value, _) => {
                self.app_expr(out, target);
                let _ = write!(out, ".{} <- ", self.name(*field));
                self.expr_stmt(out, value);
            }
            Expression::Owns(adopter, adoptee, _) => {
                self.app_expr(out, adopter);
                out.push_str(" owns ");
                self.app_expr(out, adoptee);
            }
            Expression::Fail(_) => out.push_str("fail"),
            Expression::Let { .. } | Expression::Sequence(..) => {
                // A statement position cannot hold these directly; group.
                out.push_str("begin ");
                self.expr(out, e);
                out.push_str(" end");
            }
            _ => self.app_expr(out, e),
        }
    }

    fn app_expr(&self, out: &mut String, e: &Expression<'_>) {
        match e {
            Expression::App(f, a) => {
                self.app_expr(out, f);
                out.push(' ');
                self.atom_expr(out, a);
            }
            _ => self.postfix_expr(out, e),
        }
    }

    fn postfix_expr(&self, out: &mut String, e: &Expression<'_>) {
        match e {
            Expression::Access(target, field, _) => {
                self.postfix_expr(out, target);
                let _ = write!(out, ".{}", self.name(*field));
            }
            Expression::TApp(target, tys, _) => {
                self.postfix_expr(out, target);
                out.push('[');
                for (i, t) in tys.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.ty(out, t);
                }
                out.push(']');
            }
            _ => self.atom_expr(out, e),
        }
    }

    fn atom_expr(&self, out: &mut String, e: &Expression<'_>) {
        match e {
            Expression::Var(sym, _) => {
                let _ = write!(out, "{}", self.name(*sym));
            }
            Expression::Qualified(m, x, _) => {
                let _ = write!(out, "{}.{}", self.name(*m), self.name(*x));
            }
            Expression::Int(n, _) => {
                let _ = write!(out, "{}", n);
            }
            Expression::Unit(_) => out.push_str("()"),
            Expression::Tuple(es, _) => {
                out.push('(');
                for (i, e) in es.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.expr(out, e);
                }
                out.push(')');
            }
            Expression::Construct {
                datacon, fields, ..
            } => {
                let _ = write!(out, "{}", self.name(*datacon));
                if !fields.is_empty() {
                    out.push_str(" { ");
                    for (i, (name, e)) in fields.iter().enumerate() {
                        if i > 0 {
                            out.push_str("; ");
                        }
                        let _ = write!(out, "{} = ", self.name(*name));
                        self.expr_stmt(out, e);
                    }
                    out.push_str(" }");
                }
            }
            Expression::Annot(inner, t) => {
                out.push('(');
                self.expr(out, inner);
                out.push_str(" : ");
                self.ty(out, t);
                out.push(')');
            }
            Expression::Grouped(inner, _) => {
                out.push_str("begin ");
                self.expr(out, inner);
                out.push_str(" end");
            }
            other => {
                out.push('(');
                self.expr(out, other);
                out.push(')');
            }
        }
    }

    fn pat(&self, out: &mut String, pat: &Pat<'_>) {
        match pat {
            Pat::Var(sym, _) => {
                let _ = write!(out, "{}", self.name(*sym));
            }
            Pat::Any(_) => out.push('_'),
            Pat::Tuple(ps, _) => {
                out.push('(');
                for (i, p) in ps.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.pat(out, p);
                }
                out.push(')');
            }
            Pat::Construct {
                datacon, fields, ..
            } => {
                let _ = write!(out, "{}", self.name(*datacon));
                if !fields.is_empty() {
                    out.push_str(" { ");
                    for (i, (name, p)) in fields.iter().enumerate() {
                        if i > 0 {
                            out.push_str("; ");
                        }
                        let _ = write!(out, "{} = ", self.name(*name));
                        self.pat(out, p);
                    }
                    out.push_str(" }");
                }
            }
            Pat::As(inner, name, _) => {
                self.pat(out, inner);
                let _ = write!(out, " as {}", self.name(*name));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstContext;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use bumpalo::Bump;

    /// Printing is stable: print(parse(print(parse(src)))) equals
    /// print(parse(src)).
    fn assert_round_trips(src: &str) {
        let mut interner = Interner::new();
        let tokens = Lexer::new(src).tokenize(&mut interner).expect("lexes");
        let bump = Bump::new();
        let ctx = AstContext::new(&bump);
        let module = Parser::new(&tokens, ctx).parse_module().expect("parses");
        let printed = AstPrinter::new(&interner).module(&module);

        let tokens2 = Lexer::new(&printed)
            .tokenize(&mut interner)
            .unwrap_or_else(|e| panic!("printed output must lex: {}\n{}", e, printed));
        let bump2 = Bump::new();
        let ctx2 = AstContext::new(&bump2);
        let module2 = Parser::new(&tokens2, ctx2)
            .parse_module()
            .unwrap_or_else(|e| panic!("printed output must parse: {}\n{}", e, printed));
        let printed2 = AstPrinter::new(&interner).module(&module2);
        assert_eq!(printed, printed2, "printing must be a fixed point");
    }

    #[test]
    fn data_definitions_round_trip() {
        assert_round_trips("data list a = Nil | Cons { head: a; tail: list a }");
        assert_round_trips("mutable data ref a = Ref { contents: a }");
        assert_round_trips("mutable data pool = Pool {} adopts cell");
    }

    #[test]
    fn value_definitions_round_trip() {
        assert_round_trips("val x = 3");
        assert_round_trips("val f = fun (x: int) : int = x");
        assert_round_trips("val go = let r = Ref { contents = 0 } in r.contents <- 1");
        assert_round_trips(
            "val n = match xs with Nil -> 0 | Cons { head = h; tail = t } -> h end",
        );
        assert_round_trips("val c = if b then 1 else 2");
        assert_round_trips("val s = give r to p; take r from p");
        assert_round_trips("val t = tag of c <- Full");
    }

    #[test]
    fn types_round_trip() {
        assert_round_trips("val id : [a] (x: =a) -> =a");
        assert_round_trips("val len : [a] list a -> int");
        assert_round_trips("val p : x @ int * y @ bool");
        assert_round_trips("val d : duplicable a => (x: a) -> a");
        assert_round_trips("val w : (int | r @ int) -> (int, bool)");
        assert_round_trips("abstract t a\nfact duplicable t");
    }

    #[test]
    fn sequences_and_groups_round_trip() {
        assert_round_trips("val x = begin 1; 2 end");
        assert_round_trips("val y = (1, (2 : int), ())");
    }
}
