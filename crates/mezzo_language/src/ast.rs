//! Surface syntax tree.
//!
//! All nodes live in one bump allocator owned by the caller of the
//! parser; the `'a` lifetime is the bump's. A whole parse is freed in
//! one shot when the bump drops, and the kind checker and translator
//! only ever borrow the tree.
//!
//! Surface types, expressions, and patterns are deliberately close to the
//! written syntax; desugaring (sequencing, `begin`/`end`, unit) happens in
//! the translator, not here, so that printing a tree reproduces what the
//! user wrote.

use bumpalo::Bump;
use mezzo_base::{Span, Symbol};
use mezzo_kernel::ty::Kind;

/// Allocation handle the parser threads through itself: one bump for
/// every node kind of one parse.
#[derive(Clone, Copy)]
pub struct AstContext<'a> {
    bump: &'a Bump,
}

impl<'a> AstContext<'a> {
    pub fn new(bump: &'a Bump) -> Self {
        AstContext { bump }
    }

    pub fn ty(&self, node: TypeExpr<'a>) -> &'a TypeExpr<'a> {
        self.bump.alloc(node)
    }

    pub fn expr(&self, node: Expression<'a>) -> &'a Expression<'a> {
        self.bump.alloc(node)
    }

    pub fn pat(&self, node: Pat<'a>) -> &'a Pat<'a> {
        self.bump.alloc(node)
    }
}

/// A binder in a quantifier or data-type parameter list, with its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SBinding {
    pub name: Symbol,
    pub kind: Kind,
    pub span: Span,
}

/// A mode constraint, as in `duplicable a => t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SDemand {
    Duplicable,
    Exclusive,
}

/// Surface types and permissions.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr<'a> {
    /// A lowercase name: type variable, defined type, or (via `=x` and
    /// `x @ t`) a term variable.
    Name(Symbol, Span),
    /// `M.t`
    Qualified(Symbol, Symbol, Span),
    /// `[a] t` or `[(a : kind)] t`
    Forall(SBinding, &'a TypeExpr<'a>),
    /// `{a} t`
    Exists(SBinding, &'a TypeExpr<'a>),
    /// `duplicable a => t`
    Imply(Vec<(SDemand, &'a TypeExpr<'a>)>, &'a TypeExpr<'a>),
    /// `duplicable a /\ t`
    And(Vec<(SDemand, &'a TypeExpr<'a>)>, &'a TypeExpr<'a>),
    /// `t -> u`
    Arrow(&'a TypeExpr<'a>, &'a TypeExpr<'a>),
    /// Juxtaposed application `list a`.
    App(&'a TypeExpr<'a>, Vec<&'a TypeExpr<'a>>),
    /// `(t, u)`; the empty tuple is the unit type.
    Tuple(Vec<&'a TypeExpr<'a>>),
    /// `=x`
    Singleton(Symbol, Span),
    /// `unknown`
    Unknown(Span),
    /// `dynamic`
    Dynamic(Span),
    /// `empty`
    Empty(Span),
    /// `D { f: t; ... } adopts u`
    Concrete {
        datacon: Symbol,
        fields: Vec<SField<'a>>,
        adopts: Option<&'a TypeExpr<'a>>,
        span: Span,
    },
    /// `(t | p)`
    Bar(&'a TypeExpr<'a>, &'a TypeExpr<'a>),
    /// `x @ t`
    Anchored(Symbol, &'a TypeExpr<'a>, Span),
    /// `p * q`
    Star(&'a TypeExpr<'a>, &'a TypeExpr<'a>),
    /// `consumes t`, legal only in a function domain.
    Consumes(&'a TypeExpr<'a>, Span),
    /// `x: t` — a name-introducing component, legal in function domains,
    /// where `x` is usable in the rest of the signature.
    NamedOf(Symbol, &'a TypeExpr<'a>, Span),
}

impl TypeExpr<'_> {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Name(_, s)
            | TypeExpr::Qualified(_, _, s)
            | TypeExpr::Singleton(_, s)
            | TypeExpr::Unknown(s)
            | TypeExpr::Dynamic(s)
            | TypeExpr::Empty(s)
            | TypeExpr::Concrete { span: s, .. }
            | TypeExpr::Anchored(_, _, s)
            | TypeExpr::Consumes(_, s)
            | TypeExpr::NamedOf(_, _, s) => *s,
            TypeExpr::Forall(b, t) | TypeExpr::Exists(b, t) => b.span.merge(t.span()),
            TypeExpr::Imply(_, t) | TypeExpr::And(_, t) => t.span(),
            TypeExpr::Arrow(a, b) | TypeExpr::Bar(a, b) | TypeExpr::Star(a, b) => {
                a.span().merge(b.span())
            }
            TypeExpr::App(h, args) => args
                .last()
                .map_or(h.span(), |last| h.span().merge(last.span())),
            TypeExpr::Tuple(ts) => ts
                .first()
                .zip(ts.last())
                .map_or(Span::dummy(), |(a, b)| a.span().merge(b.span())),
        }
    }
}

/// A field in a concrete type or data-type branch.
#[derive(Debug, Clone, PartialEq)]
pub enum SField<'a> {
    /// `f: t`
    Value(Symbol, &'a TypeExpr<'a>),
    /// `| p` — an anonymous permission carried by the block.
    Permission(&'a TypeExpr<'a>),
}

/// Surface expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression<'a> {
    Var(Symbol, Span),
    /// `M.x`
    Qualified(Symbol, Symbol, Span),
    Int(i64, Span),
    /// `()`
    Unit(Span),
    Let {
        rec: bool,
        bindings: Vec<(&'a Pat<'a>, &'a Expression<'a>)>,
        body: &'a Expression<'a>,
        span: Span,
    },
    /// `fun [a] (x: t) : u = e`
    Fun {
        type_params: Vec<SBinding>,
        arg: Symbol,
        arg_ty: &'a TypeExpr<'a>,
        ret_ty: &'a TypeExpr<'a>,
        body: &'a Expression<'a>,
        span: Span,
    },
    App(&'a Expression<'a>, &'a Expression<'a>),
    /// `e [t]`
    TApp(&'a Expression<'a>, Vec<&'a TypeExpr<'a>>, Span),
    Tuple(Vec<&'a Expression<'a>>, Span),
    /// `D { f = e; ... }`
    Construct {
        datacon: Symbol,
        fields: Vec<(Symbol, &'a Expression<'a>)>,
        span: Span,
    },
    Match {
        scrutinee: &'a Expression<'a>,
        arms: Vec<(&'a Pat<'a>, &'a Expression<'a>)>,
        span: Span,
    },
    If {
        cond: &'a Expression<'a>,
        then_branch: &'a Expression<'a>,
        else_branch: Option<&'a Expression<'a>>,
        span: Span,
    },
    /// `e.f`
    Access(&'a Expression<'a>, Symbol, Span),
    /// `e.f <- v`
    Assign(&'a Expression<'a>, Symbol, &'a Expression<'a>, Span),
    /// `e <- tag of D`
    AssignTag(&'a Expression<'a>, Symbol, Span),
    Give(&'a Expression<'a>, &'a Expression<'a>, Span),
    Take(&'a Expression<'a>, &'a Expression<'a>, Span),
    Owns(&'a Expression<'a>, &'a Expression<'a>, Span),
    Fail(Span),
    /// `(e : t)`
    Annot(&'a Expression<'a>, &'a TypeExpr<'a>),
    /// `e1; e2`
    Sequence(&'a Expression<'a>, &'a Expression<'a>),
    /// `begin e end`
    Grouped(&'a Expression<'a>, Span),
}

impl Expression<'_> {
    pub fn span(&self) -> Span {
        match self {
            Expression::Var(_, s)
            | Expression::Qualified(_, _, s)
            | Expression::Int(_, s)
            | Expression::Unit(s)
            | Expression::Let { span: s, .. }
            | Expression::Fun { span: s, .. }
            | Expression::TApp(_, _, s)
            | Expression::Tuple(_, s)
            | Expression::Construct { span: s, .. }
            | Expression::Match { span: s, .. }
            | Expression::If { span: s, .. }
            | Expression::Access(_, _, s)
            | Expression::Assign(_, _, _, s)
            | Expression::AssignTag(_, _, s)
            | Expression::Give(_, _, s)
            | Expression::Take(_, _, s)
            | Expression::Owns(_, _, s)
            | Expression::Fail(s)
            | Expression::Grouped(_, s) => *s,
            Expression::App(f, a) => f.span().merge(a.span()),
            Expression::Annot(e, t) => e.span().merge(t.span()),
            Expression::Sequence(a, b) => a.span().merge(b.span()),
        }
    }
}

/// Surface patterns.
#[derive(Debug, Clone, PartialEq)]
pub enum Pat<'a> {
    Var(Symbol, Span),
    Any(Span),
    Tuple(Vec<&'a Pat<'a>>, Span),
    Construct {
        datacon: Symbol,
        fields: Vec<(Symbol, &'a Pat<'a>)>,
        span: Span,
    },
    As(&'a Pat<'a>, Symbol, Span),
}

impl Pat<'_> {
    pub fn span(&self) -> Span {
        match self {
            Pat::Var(_, s)
            | Pat::Any(s)
            | Pat::Tuple(_, s)
            | Pat::Construct { span: s, .. }
            | Pat::As(_, _, s) => *s,
        }
    }
}

/// One branch of a data-type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct SBranch<'a> {
    pub datacon: Symbol,
    pub fields: Vec<SField<'a>>,
    pub span: Span,
}

/// One definition of a `data ... and ...` group.
#[derive(Debug, Clone, PartialEq)]
pub struct DataDef<'a> {
    pub mutable: bool,
    pub name: Symbol,
    pub params: Vec<SBinding>,
    pub branches: Vec<SBranch<'a>>,
    pub adopts: Option<&'a TypeExpr<'a>>,
    pub span: Span,
}

/// Toplevel items. Implementations use `Open`, `DataGroup`, and `ValDef`;
/// interfaces add the declaration forms.
#[derive(Debug, Clone, PartialEq)]
pub enum Item<'a> {
    /// `open M`
    Open(Symbol, Span),
    /// `data ... and ...`
    DataGroup(Vec<DataDef<'a>>),
    /// `val [rec] x = e`
    ValDef {
        rec: bool,
        name: Symbol,
        expr: &'a Expression<'a>,
        span: Span,
    },
    /// Interface: `val x @ t` (a permission) or `val x : t` (a type).
    ValDecl {
        name: Symbol,
        ty: &'a TypeExpr<'a>,
        span: Span,
    },
    /// Interface: `abstract t a b [: kind]`
    AbstractDecl {
        name: Symbol,
        params: Vec<SBinding>,
        span: Span,
    },
    /// Interface: `fact duplicable t` / `fact exclusive t`
    FactDecl {
        demand: SDemand,
        ty: &'a TypeExpr<'a>,
        span: Span,
    },
}

/// A parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Module<'a> {
    pub items: Vec<Item<'a>>,
}
