//! Core expression syntax.
//!
//! This is what the translator produces and the checker walks. Variable
//! references are de Bruijn indices into the checker's scope stack; every
//! binder (a pattern variable, a lambda's type parameters and argument)
//! pushes one entry. Types embedded in expressions — annotations, lambda
//! signatures — use the same index space, shifted by their own internal
//! quantifiers; the checker resolves them against the scope at the point
//! of use.

use mezzo_base::{Span, Symbol};

use crate::env::Var;
use crate::ty::{Binding, Datacon, Type};

/// An expression with its source location.
#[derive(Debug, Clone)]
pub struct Expr {
    pub node: ExprNode,
    pub span: Span,
}

impl Expr {
    pub fn new(node: ExprNode, span: Span) -> Self {
        Expr { node, span }
    }
}

/// The expression forms of the core language.
#[derive(Debug, Clone)]
pub enum ExprNode {
    /// De Bruijn reference to an enclosing binder.
    Var(usize),
    /// Reference to an environment variable bound outside the expression:
    /// an earlier toplevel value or an imported module export.
    Free(Var),
    /// Integer literal.
    Int(i64),
    /// `let [rec] p = e and ... in body`.
    Let {
        rec: bool,
        bindings: Vec<(Pattern, Expr)>,
        body: Box<Expr>,
    },
    /// `fun [a] ... (x: t) : u = e`. `binders` lists the type parameters
    /// followed by the term argument (innermost); `arg_ty` and `ret_ty`
    /// live under all the binders.
    Lambda {
        binders: Vec<Binding>,
        arg_ty: Type,
        ret_ty: Type,
        body: Box<Expr>,
    },
    /// Value application.
    App(Box<Expr>, Box<Expr>),
    /// Type application `e [t, ...]`.
    TApp(Box<Expr>, Vec<Type>),
    /// Tuple construction.
    Tuple(Vec<Expr>),
    /// Data constructor application, fields in definition order.
    Construct {
        datacon: Datacon,
        fields: Vec<(Symbol, Expr)>,
    },
    /// `match e with p -> e | ... end`.
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<(Pattern, Expr)>,
    },
    /// `if c then e1 else e2`; a missing else is the unit value.
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    /// Field read `e.f`.
    Access { expr: Box<Expr>, field: Symbol },
    /// Field write `e.f <- v`.
    Assign {
        expr: Box<Expr>,
        field: Symbol,
        value: Box<Expr>,
    },
    /// Tag update `e <- tag of D`.
    AssignTag { expr: Box<Expr>, datacon: Datacon },
    /// `give e1 to e2`.
    Give {
        adoptee: Box<Expr>,
        adopter: Box<Expr>,
    },
    /// `take e1 from e2`.
    Take {
        adoptee: Box<Expr>,
        adopter: Box<Expr>,
    },
    /// `e1 owns e2`.
    Owns {
        adopter: Box<Expr>,
        adoptee: Box<Expr>,
    },
    /// Dead end: marks the environment inconsistent.
    Fail,
    /// Type annotation `(e : t)`.
    Constraint(Box<Expr>, Type),
}

/// Patterns, as they appear in `let` and `match`.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub node: PatternNode,
    pub span: Span,
}

impl Pattern {
    pub fn new(node: PatternNode, span: Span) -> Self {
        Pattern { node, span }
    }

    /// Number of variables this pattern binds (scope entries it pushes).
    pub fn binder_count(&self) -> usize {
        match &self.node {
            PatternNode::Any => 0,
            PatternNode::Var(_) => 1,
            PatternNode::Tuple(ps) => ps.iter().map(|p| p.binder_count()).sum(),
            PatternNode::Construct { fields, .. } => {
                fields.iter().map(|(_, p)| p.binder_count()).sum()
            }
            PatternNode::As(p, _) => p.binder_count() + 1,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PatternNode {
    /// `_`
    Any,
    /// A variable binding.
    Var(Symbol),
    /// `(p, ...)`
    Tuple(Vec<Pattern>),
    /// `D { f = p; ... }`, fields in definition order.
    Construct {
        datacon: Datacon,
        fields: Vec<(Symbol, Pattern)>,
    },
    /// `p as x`
    As(Box<Pattern>, Symbol),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Var;

    fn pat(node: PatternNode) -> Pattern {
        Pattern::new(node, Span::dummy())
    }

    #[test]
    fn binder_count_walks_the_pattern() {
        let dc = Datacon {
            datatype: Var::from_raw(0),
            name: Symbol::EMPTY,
            branch: 0,
        };
        let p = pat(PatternNode::Tuple(vec![
            pat(PatternNode::Var(Symbol::EMPTY)),
            pat(PatternNode::Any),
            pat(PatternNode::As(
                Box::new(pat(PatternNode::Construct {
                    datacon: dc,
                    fields: vec![(Symbol::EMPTY, pat(PatternNode::Var(Symbol::EMPTY)))],
                })),
                Symbol::EMPTY,
            )),
        ]));
        assert_eq!(p.binder_count(), 3);
    }
}
