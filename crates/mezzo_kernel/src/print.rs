//! Rendering of internal types for diagnostics.
//!
//! Types reference the environment (variable names, flexibility) and the
//! interner (symbol text), so they cannot implement `Display` on their own.
//! [`TypePrinter`] borrows both and hands out `Display`-able adapters.
//!
//! Conventions: flexible variables print with a `?` sigil; a de Bruijn
//! index that somehow escapes prints as `^i` (it indicates a checker bug,
//! not a user error); auto-generated variables reuse their hint name.

use std::fmt;

use mezzo_base::Interner;

use crate::env::Env;
use crate::ty::{Demand, Field, Type};

/// Borrow of everything needed to render types.
pub struct TypePrinter<'a> {
    pub env: &'a Env,
    pub interner: &'a Interner,
}

impl<'a> TypePrinter<'a> {
    pub fn new(env: &'a Env, interner: &'a Interner) -> Self {
        TypePrinter { env, interner }
    }

    /// An adapter that renders `t` via `Display`.
    pub fn ty(&'a self, t: &'a Type) -> TypeDisplay<'a> {
        TypeDisplay { printer: self, t }
    }

    /// Render to an owned string (for storage inside errors).
    pub fn render(&self, t: &Type) -> String {
        self.ty(t).to_string()
    }

    /// Render a variable name.
    pub fn var(&self, v: crate::env::Var) -> String {
        let name = self.interner.resolve(self.env.name(v));
        if self.env.is_flexible(v) {
            format!("?{}", name)
        } else if name.is_empty() {
            format!("?v{}", v.index())
        } else {
            name.to_string()
        }
    }

    fn fmt_ty(&self, t: &Type, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.env.modulo_flex(t);
        match &t {
            Type::Unknown => write!(f, "unknown"),
            Type::Dynamic => write!(f, "dynamic"),
            Type::Empty => write!(f, "empty"),
            Type::Bound(i) => write!(f, "^{}", i),
            Type::Open(v) => write!(f, "{}", self.var(*v)),
            Type::Forall(b, body) => {
                write!(f, "[{}] ", self.interner.resolve(b.name))?;
                self.fmt_ty(body, f)
            }
            Type::Exists(b, body) => {
                write!(f, "{{{}}} ", self.interner.resolve(b.name))?;
                self.fmt_ty(body, f)
            }
            Type::App(head, args) => {
                self.fmt_atom(head, f)?;
                for arg in args {
                    write!(f, " ")?;
                    self.fmt_atom(arg, f)?;
                }
                Ok(())
            }
            Type::Tuple(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    self.fmt_ty(t, f)?;
                }
                write!(f, ")")
            }
            Type::Concrete(c) => {
                write!(f, "{}", self.interner.resolve(c.datacon.name))?;
                if !c.fields.is_empty() {
                    write!(f, " {{")?;
                    for (i, field) in c.fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, "; ")?;
                        }
                        match field {
                            Field::Value(name, t) => {
                                write!(f, "{}: ", self.interner.resolve(*name))?;
                                self.fmt_ty(t, f)?;
                            }
                            Field::Permission(p) => {
                                write!(f, "| ")?;
                                self.fmt_ty(p, f)?;
                            }
                        }
                    }
                    write!(f, "}}")?;
                }
                if let Some(a) = &c.adopts {
                    write!(f, " adopts ")?;
                    self.fmt_ty(a, f)?;
                }
                Ok(())
            }
            Type::Singleton(inner) => {
                write!(f, "=")?;
                self.fmt_atom(inner, f)
            }
            Type::Arrow(d, c) => {
                self.fmt_atom(d, f)?;
                write!(f, " -> ")?;
                self.fmt_ty(c, f)
            }
            Type::Bar(v, p) => {
                write!(f, "(")?;
                self.fmt_ty(v, f)?;
                write!(f, " | ")?;
                self.fmt_ty(p, f)?;
                write!(f, ")")
            }
            Type::Anchored(x, inner) => {
                self.fmt_atom(x, f)?;
                write!(f, " @ ")?;
                self.fmt_ty(inner, f)
            }
            Type::Star(p, q) => {
                self.fmt_ty(p, f)?;
                write!(f, " * ")?;
                self.fmt_ty(q, f)
            }
            Type::And(cs, inner) => {
                self.fmt_constraints(cs, f)?;
                write!(f, " /\\ ")?;
                self.fmt_ty(inner, f)
            }
            Type::Imply(cs, inner) => {
                self.fmt_constraints(cs, f)?;
                write!(f, " => ")?;
                self.fmt_ty(inner, f)
            }
        }
    }

    fn fmt_constraints(
        &self,
        cs: &[crate::ty::Constraint],
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for (i, c) in cs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match c.demand {
                Demand::Duplicable => write!(f, "duplicable ")?,
                Demand::Exclusive => write!(f, "exclusive ")?,
            }
            self.fmt_atom(&c.ty, f)?;
        }
        Ok(())
    }

    /// Atoms parenthesize compound forms.
    fn fmt_atom(&self, t: &Type, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.env.modulo_flex(t);
        match &t {
            Type::Arrow(..)
            | Type::Star(..)
            | Type::Anchored(..)
            | Type::Forall(..)
            | Type::Exists(..)
            | Type::And(..)
            | Type::Imply(..)
            | Type::App(..) => {
                write!(f, "(")?;
                self.fmt_ty(&t, f)?;
                write!(f, ")")
            }
            _ => self.fmt_ty(&t, f),
        }
    }
}

/// `Display` adapter returned by [`TypePrinter::ty`].
pub struct TypeDisplay<'a> {
    printer: &'a TypePrinter<'a>,
    t: &'a Type,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.printer.fmt_ty(self.t, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Kind;
    use mezzo_base::Span;

    #[test]
    fn renders_arrows_and_tuples() {
        let mut env = Env::new();
        let mut interner = Interner::new();
        let x = env.bind_rigid(interner.intern("x"), Kind::Term, Span::dummy());
        let t = Type::arrow(
            Type::Tuple(vec![Type::Unknown, Type::Dynamic]),
            Type::singleton(x),
        );
        let printer = TypePrinter::new(&env, &interner);
        assert_eq!(printer.render(&t), "(unknown, dynamic) -> =x");
    }

    #[test]
    fn flexible_variables_get_a_sigil() {
        let mut env = Env::new();
        let mut interner = Interner::new();
        let a = env.bind_flexible(interner.intern("a"), Kind::Type, Span::dummy());
        let printer = TypePrinter::new(&env, &interner);
        assert_eq!(printer.render(&Type::Open(a)), "?a");
    }

    #[test]
    fn instantiated_flexibles_print_their_solution() {
        let mut env = Env::new();
        let mut interner = Interner::new();
        let a = env.bind_flexible(interner.intern("a"), Kind::Type, Span::dummy());
        assert!(env.instantiate_flexible(a, &Type::Dynamic));
        let printer = TypePrinter::new(&env, &interner);
        assert_eq!(printer.render(&Type::Open(a)), "dynamic");
    }
}
