//! Recursive-descent parser for mezzo.
//!
//! The parser consumes the token stream produced by the lexer and builds
//! an arena-allocated [`Module`]. Implementations and interfaces share
//! the grammar; interface-only forms (`abstract`, `fact`, `val x @ t`)
//! are accepted everywhere and policed by the kind checker.
//!
//! Precedence, loosest to tightest:
//!
//! - expressions: `;` sequencing, statements (`let`, `fun`, `if`,
//!   `match`, `give`, `take`, `tag of`), assignment `<-`, `owns`,
//!   application by juxtaposition, postfix `.field` and `[type]`, atoms;
//! - types: quantifiers and constraints, `->` (right associative), `|`,
//!   `*`, `@`, application by juxtaposition, atoms.

use mezzo_base::{Span, Symbol};
use mezzo_kernel::ty::Kind;
use std::fmt;

use crate::ast::{
    AstContext, DataDef, Expression, Item, Module, Pat, SBinding, SBranch, SDemand, SField,
    TypeExpr,
};
use crate::token::{Token, TokenType};

/// Parse errors.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub span: Span,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

impl std::error::Error for ParseError {}

type PResult<T> = Result<T, ParseError>;

/// The parser. One per token stream.
pub struct Parser<'a, 't> {
    tokens: &'t [Token],
    pos: usize,
    ctx: AstContext<'a>,
}

impl<'a, 't> Parser<'a, 't> {
    pub fn new(tokens: &'t [Token], ctx: AstContext<'a>) -> Self {
        Parser {
            tokens,
            pos: 0,
            ctx,
        }
    }

    /// Parse a whole source file.
    pub fn parse_module(mut self) -> PResult<Module<'a>> {
        let mut items = Vec::new();
        while !self.at(TokenType::Eof) {
            items.push(self.item()?);
        }
        Ok(Module { items })
    }

    // ── Token plumbing ──────────────────────────────────────────────────

    fn peek(&self) -> Token {
        self.tokens[self.pos]
    }

    fn peek2(&self) -> TokenType {
        self.tokens
            .get(self.pos + 1)
            .map(|t| t.ty)
            .unwrap_or(TokenType::Eof)
    }

    fn at(&self, ty: TokenType) -> bool {
        self.peek().ty == ty
    }

    fn bump(&mut self) -> Token {
        let t = self.peek();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, ty: TokenType) -> bool {
        if self.at(ty) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ty: TokenType) -> PResult<Token> {
        if self.at(ty) {
            Ok(self.bump())
        } else {
            Err(self.unexpected(ty.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let t = self.peek();
        ParseError {
            expected: expected.to_string(),
            found: t.ty.describe().to_string(),
            span: t.span,
        }
    }

    fn lower(&mut self) -> PResult<(Symbol, Span)> {
        match self.peek().ty {
            TokenType::Lower(sym) => {
                let t = self.bump();
                Ok((sym, t.span))
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn upper(&mut self) -> PResult<(Symbol, Span)> {
        match self.peek().ty {
            TokenType::Upper(sym) => {
                let t = self.bump();
                Ok((sym, t.span))
            }
            _ => Err(self.unexpected("a capitalized identifier")),
        }
    }

    // ── Items ───────────────────────────────────────────────────────────

    fn item(&mut self) -> PResult<Item<'a>> {
        match self.peek().ty {
            TokenType::Open => {
                let start = self.bump().span;
                let (name, end) = self.upper()?;
                Ok(Item::Open(name, start.merge(end)))
            }
            TokenType::Data | TokenType::Mutable => {
                let mut defs = vec![self.data_def(true)?];
                while self.eat(TokenType::And) {
                    defs.push(self.data_def(false)?);
                }
                Ok(Item::DataGroup(defs))
            }
            TokenType::Abstract => {
                let start = self.bump().span;
                let (name, mut end) = self.lower()?;
                let mut params = Vec::new();
                while let Some(b) = self.maybe_binder()? {
                    end = b.span;
                    params.push(b);
                }
                Ok(Item::AbstractDecl {
                    name,
                    params,
                    span: start.merge(end),
                })
            }
            TokenType::Fact => {
                let start = self.bump().span;
                let demand = if self.eat(TokenType::Duplicable) {
                    SDemand::Duplicable
                } else if self.eat(TokenType::Exclusive) {
                    SDemand::Exclusive
                } else {
                    return Err(self.unexpected("'duplicable' or 'exclusive'"));
                };
                let ty = self.ty()?;
                Ok(Item::FactDecl {
                    demand,
                    ty,
                    span: start.merge(ty.span()),
                })
            }
            TokenType::Val => {
                let start = self.bump().span;
                let rec = self.eat(TokenType::Rec);
                let (name, _) = self.lower()?;
                if self.eat(TokenType::Equals) {
                    let expr = self.expr()?;
                    Ok(Item::ValDef {
                        rec,
                        name,
                        expr,
                        span: start.merge(expr.span()),
                    })
                } else if self.eat(TokenType::At) || self.eat(TokenType::Colon) {
                    let ty = self.ty()?;
                    Ok(Item::ValDecl {
                        name,
                        ty,
                        span: start.merge(ty.span()),
                    })
                } else {
                    Err(self.unexpected("'=', '@', or ':'"))
                }
            }
            _ => Err(self.unexpected("an item")),
        }
    }

    fn data_def(&mut self, leading_data: bool) -> PResult<DataDef<'a>> {
        let start = self.peek().span;
        let mutable = self.eat(TokenType::Mutable);
        if leading_data || self.at(TokenType::Data) {
            self.expect(TokenType::Data)?;
        }
        let (name, _) = self.lower()?;
        let mut params = Vec::new();
        while let Some(b) = self.maybe_binder()? {
            params.push(b);
        }
        self.expect(TokenType::Equals)?;
        self.eat(TokenType::Pipe);
        let mut branches = vec![self.branch()?];
        while self.eat(TokenType::Pipe) {
            branches.push(self.branch()?);
        }
        let adopts = if self.eat(TokenType::Adopts) {
            Some(self.ty()?)
        } else {
            None
        };
        let end = adopts
            .map(|t| t.span())
            .unwrap_or_else(|| branches.last().map(|b| b.span).unwrap_or(start));
        Ok(DataDef {
            mutable,
            name,
            params,
            branches,
            adopts,
            span: start.merge(end),
        })
    }

    fn branch(&mut self) -> PResult<SBranch<'a>> {
        let (datacon, start) = self.upper()?;
        let mut fields = Vec::new();
        let mut end = start;
        if self.eat(TokenType::LBrace) {
            loop {
                fields.push(self.field()?);
                if !self.eat(TokenType::Semi) {
                    break;
                }
            }
            end = self.expect(TokenType::RBrace)?.span;
        }
        Ok(SBranch {
            datacon,
            fields,
            span: start.merge(end),
        })
    }

    fn field(&mut self) -> PResult<SField<'a>> {
        if self.eat(TokenType::Pipe) {
            Ok(SField::Permission(self.ty_star()?))
        } else {
            let (name, _) = self.lower()?;
            self.expect(TokenType::Colon)?;
            Ok(SField::Value(name, self.ty_arrow()?))
        }
    }

    /// A parameter binder: `a` (kind `type`) or `(a : kind)`.
    fn maybe_binder(&mut self) -> PResult<Option<SBinding>> {
        match self.peek().ty {
            TokenType::Lower(sym) => {
                let span = self.bump().span;
                Ok(Some(SBinding {
                    name: sym,
                    kind: Kind::Type,
                    span,
                }))
            }
            TokenType::LParen => {
                // Only a binder if it looks like `(name :`.
                if matches!(self.peek2(), TokenType::Lower(_)) {
                    let saved = self.pos;
                    self.bump();
                    let (name, span) = self.lower()?;
                    if self.eat(TokenType::Colon) {
                        let kind = self.kind()?;
                        self.expect(TokenType::RParen)?;
                        return Ok(Some(SBinding { name, kind, span }));
                    }
                    self.pos = saved;
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn kind(&mut self) -> PResult<Kind> {
        let lhs = match self.peek().ty {
            TokenType::KindTerm => {
                self.bump();
                Kind::Term
            }
            TokenType::KindType => {
                self.bump();
                Kind::Type
            }
            TokenType::KindPerm => {
                self.bump();
                Kind::Perm
            }
            TokenType::LParen => {
                self.bump();
                let k = self.kind()?;
                self.expect(TokenType::RParen)?;
                k
            }
            _ => return Err(self.unexpected("a kind")),
        };
        if self.eat(TokenType::Arrow) {
            let rhs = self.kind()?;
            Ok(Kind::Arrow(Box::new(lhs), Box::new(rhs)))
        } else {
            Ok(lhs)
        }
    }

    // ── Types ───────────────────────────────────────────────────────────

    pub fn ty(&mut self) -> PResult<&'a TypeExpr<'a>> {
        match self.peek().ty {
            TokenType::LBracket => {
                self.bump();
                let b = self.quantifier_binder()?;
                self.expect(TokenType::RBracket)?;
                let body = self.ty()?;
                Ok(self.ctx.ty(TypeExpr::Forall(b, body)))
            }
            TokenType::LBrace => {
                self.bump();
                let b = self.quantifier_binder()?;
                self.expect(TokenType::RBrace)?;
                let body = self.ty()?;
                Ok(self.ctx.ty(TypeExpr::Exists(b, body)))
            }
            TokenType::Duplicable | TokenType::Exclusive => {
                let demand = if self.eat(TokenType::Duplicable) {
                    SDemand::Duplicable
                } else {
                    self.bump();
                    SDemand::Exclusive
                };
                let subject = self.ty_atom()?;
                if self.eat(TokenType::DoubleArrow) {
                    let body = self.ty()?;
                    Ok(self
                        .ctx.ty(TypeExpr::Imply(vec![(demand, subject)], body)))
                } else if self.eat(TokenType::Conj) {
                    let body = self.ty()?;
                    Ok(self
                        .ctx.ty(TypeExpr::And(vec![(demand, subject)], body)))
                } else {
                    Err(self.unexpected("'=>' or '/\\'"))
                }
            }
            _ => self.ty_arrow(),
        }
    }

    fn quantifier_binder(&mut self) -> PResult<SBinding> {
        match self.peek().ty {
            TokenType::Lower(sym) => {
                let span = self.bump().span;
                Ok(SBinding {
                    name: sym,
                    kind: Kind::Type,
                    span,
                })
            }
            TokenType::LParen => {
                self.bump();
                let (name, span) = self.lower()?;
                self.expect(TokenType::Colon)?;
                let kind = self.kind()?;
                self.expect(TokenType::RParen)?;
                Ok(SBinding { name, kind, span })
            }
            _ => Err(self.unexpected("a binder")),
        }
    }

    fn ty_arrow(&mut self) -> PResult<&'a TypeExpr<'a>> {
        let lhs = self.ty_bar()?;
        if self.eat(TokenType::Arrow) {
            let rhs = self.ty()?;
            Ok(self.ctx.ty(TypeExpr::Arrow(lhs, rhs)))
        } else {
            Ok(lhs)
        }
    }

    fn ty_bar(&mut self) -> PResult<&'a TypeExpr<'a>> {
        let mut lhs = self.ty_star()?;
        while self.eat(TokenType::Pipe) {
            let rhs = self.ty_star()?;
            lhs = self.ctx.ty(TypeExpr::Bar(lhs, rhs));
        }
        Ok(lhs)
    }

    fn ty_star(&mut self) -> PResult<&'a TypeExpr<'a>> {
        let mut lhs = self.ty_anchor()?;
        while self.eat(TokenType::Star) {
            let rhs = self.ty_anchor()?;
            lhs = self.ctx.ty(TypeExpr::Star(lhs, rhs));
        }
        Ok(lhs)
    }

    fn ty_anchor(&mut self) -> PResult<&'a TypeExpr<'a>> {
        // `x @ t` — only a bare name can be anchored.
        if let TokenType::Lower(sym) = self.peek().ty {
            if self.peek2() == TokenType::At {
                let start = self.bump().span;
                self.bump();
                let t = self.ty_app()?;
                return Ok(self
                    .ctx.ty(TypeExpr::Anchored(sym, t, start.merge(t.span()))));
            }
        }
        self.ty_app()
    }

    fn ty_app(&mut self) -> PResult<&'a TypeExpr<'a>> {
        if self.at(TokenType::Consumes) {
            let start = self.bump().span;
            let t = self.ty_app()?;
            return Ok(self
                .ctx.ty(TypeExpr::Consumes(t, start.merge(t.span()))));
        }
        let head = self.ty_atom()?;
        let mut args = Vec::new();
        while self.starts_ty_atom() {
            args.push(self.ty_atom()?);
        }
        if args.is_empty() {
            Ok(head)
        } else {
            Ok(self.ctx.ty(TypeExpr::App(head, args)))
        }
    }

    /// A parenthesized component: `x: t` introduces a name usable in the
    /// rest of the signature (function domains), otherwise a plain type.
    fn ty_component(&mut self) -> PResult<&'a TypeExpr<'a>> {
        if let TokenType::Lower(sym) = self.peek().ty {
            if self.peek2() == TokenType::Colon {
                let start = self.bump().span;
                self.bump();
                let t = self.ty()?;
                return Ok(self
                    .ctx.ty(TypeExpr::NamedOf(sym, t, start.merge(t.span()))));
            }
        }
        self.ty()
    }

    fn starts_ty_atom(&self) -> bool {
        matches!(
            self.peek().ty,
            TokenType::Lower(_)
                | TokenType::Upper(_)
                | TokenType::Equals
                | TokenType::LParen
                | TokenType::Unknown
                | TokenType::Dynamic
                | TokenType::Empty
        )
    }

    fn ty_atom(&mut self) -> PResult<&'a TypeExpr<'a>> {
        match self.peek().ty {
            TokenType::Lower(sym) => {
                let span = self.bump().span;
                Ok(self.ctx.ty(TypeExpr::Name(sym, span)))
            }
            TokenType::Upper(sym) => {
                let start = self.bump().span;
                if self.eat(TokenType::Dot) {
                    let (name, end) = self.lower()?;
                    Ok(self
                        .ctx.ty(TypeExpr::Qualified(sym, name, start.merge(end))))
                } else if self.at(TokenType::LBrace) {
                    self.bump();
                    let mut fields = Vec::new();
                    if !self.at(TokenType::RBrace) {
                        loop {
                            fields.push(self.field()?);
                            if !self.eat(TokenType::Semi) {
                                break;
                            }
                        }
                    }
                    let mut end = self.expect(TokenType::RBrace)?.span;
                    let adopts = if self.eat(TokenType::Adopts) {
                        let t = self.ty_app()?;
                        end = t.span();
                        Some(t)
                    } else {
                        None
                    };
                    Ok(self.ctx.ty(TypeExpr::Concrete {
                        datacon: sym,
                        fields,
                        adopts,
                        span: start.merge(end),
                    }))
                } else {
                    // A bare constructor type, e.g. `Nil`.
                    Ok(self.ctx.ty(TypeExpr::Concrete {
                        datacon: sym,
                        fields: Vec::new(),
                        adopts: None,
                        span: start,
                    }))
                }
            }
            TokenType::Equals => {
                let start = self.bump().span;
                let (sym, end) = self.lower()?;
                Ok(self
                    .ctx.ty(TypeExpr::Singleton(sym, start.merge(end))))
            }
            TokenType::Unknown => {
                let span = self.bump().span;
                Ok(self.ctx.ty(TypeExpr::Unknown(span)))
            }
            TokenType::Dynamic => {
                let span = self.bump().span;
                Ok(self.ctx.ty(TypeExpr::Dynamic(span)))
            }
            TokenType::Empty => {
                let span = self.bump().span;
                Ok(self.ctx.ty(TypeExpr::Empty(span)))
            }
            TokenType::LParen => {
                self.bump();
                if self.at(TokenType::RParen) {
                    self.bump();
                    return Ok(self.ctx.ty(TypeExpr::Tuple(Vec::new())));
                }
                let first = self.ty_component()?;
                if self.eat(TokenType::Comma) {
                    let mut parts = vec![first];
                    loop {
                        parts.push(self.ty_component()?);
                        if !self.eat(TokenType::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenType::RParen)?;
                    Ok(self.ctx.ty(TypeExpr::Tuple(parts)))
                } else {
                    self.expect(TokenType::RParen)?;
                    Ok(first)
                }
            }
            _ => Err(self.unexpected("a type")),
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub fn expr(&mut self) -> PResult<&'a Expression<'a>> {
        let lhs = self.expr_stmt()?;
        if self.eat(TokenType::Semi) {
            let rhs = self.expr()?;
            Ok(self.ctx.expr(Expression::Sequence(lhs, rhs)))
        } else {
            Ok(lhs)
        }
    }

    fn expr_stmt(&mut self) -> PResult<&'a Expression<'a>> {
        match self.peek().ty {
            TokenType::Let => {
                let start = self.bump().span;
                let rec = self.eat(TokenType::Rec);
                let mut bindings = Vec::new();
                loop {
                    let pat = self.pat()?;
                    self.expect(TokenType::Equals)?;
                    let rhs = self.expr_stmt()?;
                    bindings.push((pat, rhs));
                    if !self.eat(TokenType::And) {
                        break;
                    }
                }
                self.expect(TokenType::In)?;
                let body = self.expr()?;
                Ok(self.ctx.expr(Expression::Let {
                    rec,
                    bindings,
                    body,
                    span: start.merge(body.span()),
                }))
            }
            TokenType::Fun => {
                let start = self.bump().span;
                let mut type_params = Vec::new();
                while self.eat(TokenType::LBracket) {
                    type_params.push(self.quantifier_binder()?);
                    self.expect(TokenType::RBracket)?;
                }
                self.expect(TokenType::LParen)?;
                let (arg, _) = self.lower()?;
                self.expect(TokenType::Colon)?;
                let arg_ty = self.ty()?;
                self.expect(TokenType::RParen)?;
                self.expect(TokenType::Colon)?;
                let ret_ty = self.ty_arrow()?;
                self.expect(TokenType::Equals)?;
                let body = self.expr_stmt()?;
                Ok(self.ctx.expr(Expression::Fun {
                    type_params,
                    arg,
                    arg_ty,
                    ret_ty,
                    body,
                    span: start.merge(body.span()),
                }))
            }
            TokenType::If => {
                let start = self.bump().span;
                let cond = self.expr_stmt()?;
                self.expect(TokenType::Then)?;
                let then_branch = self.expr_stmt()?;
                let else_branch = if self.eat(TokenType::Else) {
                    Some(self.expr_stmt()?)
                } else {
                    None
                };
                let end = else_branch.unwrap_or(then_branch).span();
                Ok(self.ctx.expr(Expression::If {
                    cond,
                    then_branch,
                    else_branch,
                    span: start.merge(end),
                }))
            }
            TokenType::Match => {
                let start = self.bump().span;
                let scrutinee = self.expr_stmt()?;
                self.expect(TokenType::With)?;
                self.eat(TokenType::Pipe);
                let mut arms = Vec::new();
                loop {
                    let pat = self.pat()?;
                    self.expect(TokenType::Arrow)?;
                    let body = self.expr()?;
                    arms.push((pat, body));
                    if !self.eat(TokenType::Pipe) {
                        break;
                    }
                }
                let end = self.expect(TokenType::End)?.span;
                Ok(self.ctx.expr(Expression::Match {
                    scrutinee,
                    arms,
                    span: start.merge(end),
                }))
            }
            TokenType::Give => {
                let start = self.bump().span;
                let adoptee = self.app_expr()?;
                self.expect(TokenType::To)?;
                let adopter = self.app_expr()?;
                Ok(self.ctx.expr(Expression::Give(
                    adoptee,
                    adopter,
                    start.merge(adopter.span()),
                )))
            }
            TokenType::Take => {
                let start = self.bump().span;
                let adoptee = self.app_expr()?;
                self.expect(TokenType::From)?;
                let adopter = self.app_expr()?;
                Ok(self.ctx.expr(Expression::Take(
                    adoptee,
                    adopter,
                    start.merge(adopter.span()),
                )))
            }
            TokenType::Tag => {
                // `tag of e <- D`
                let start = self.bump().span;
                self.expect(TokenType::Of)?;
                let target = self.app_expr()?;
                self.expect(TokenType::LeftArrow)?;
                let (datacon, end) = self.upper()?;
                Ok(self.ctx.expr(Expression::AssignTag(
                    target,
                    datacon,
                    start.merge(end),
                )))
            }
            TokenType::Fail => {
                let span = self.bump().span;
                Ok(self.ctx.expr(Expression::Fail(span)))
            }
            _ => self.assign_expr(),
        }
    }

    fn assign_expr(&mut self) -> PResult<&'a Expression<'a>> {
        let lhs = self.owns_expr()?;
        if self.eat(TokenType::LeftArrow) {
            match lhs {
                Expression::Access(target, field, _) => {
                    let value = self.expr_stmt()?;
                    Ok(self.ctx.expr(Expression::Assign(
                        *target,
                        *field,
                        value,
                        lhs.span().merge(value.span()),
                    )))
                }
                _ => Err(self.unexpected("a field access on the left of '<-'")),
            }
        } else {
            Ok(lhs)
        }
    }

    fn owns_expr(&mut self) -> PResult<&'a Expression<'a>> {
        let lhs = self.app_expr()?;
        if self.eat(TokenType::Owns) {
            let rhs = self.app_expr()?;
            Ok(self.ctx.expr(Expression::Owns(
                lhs,
                rhs,
                lhs.span().merge(rhs.span()),
            )))
        } else {
            Ok(lhs)
        }
    }

    fn app_expr(&mut self) -> PResult<&'a Expression<'a>> {
        let mut f = self.postfix_expr()?;
        while self.starts_expr_atom() {
            let arg = self.postfix_expr()?;
            f = self.ctx.expr(Expression::App(f, arg));
        }
        Ok(f)
    }

    fn starts_expr_atom(&self) -> bool {
        matches!(
            self.peek().ty,
            TokenType::Lower(_)
                | TokenType::Upper(_)
                | TokenType::Int(_)
                | TokenType::LParen
                | TokenType::Begin
        )
    }

    fn postfix_expr(&mut self) -> PResult<&'a Expression<'a>> {
        let mut e = self.atom_expr()?;
        loop {
            if self.at(TokenType::Dot) && matches!(self.peek2(), TokenType::Lower(_)) {
                self.bump();
                let (field, end) = self.lower()?;
                e = self
                    .ctx.expr(Expression::Access(e, field, e.span().merge(end)));
            } else if self.at(TokenType::LBracket) {
                let start = self.bump().span;
                let mut tys = vec![self.ty()?];
                while self.eat(TokenType::Comma) {
                    tys.push(self.ty()?);
                }
                let end = self.expect(TokenType::RBracket)?.span;
                e = self
                    .ctx.expr(Expression::TApp(e, tys, start.merge(end)));
            } else {
                return Ok(e);
            }
        }
    }

    fn atom_expr(&mut self) -> PResult<&'a Expression<'a>> {
        match self.peek().ty {
            TokenType::Int(n) => {
                let span = self.bump().span;
                Ok(self.ctx.expr(Expression::Int(n, span)))
            }
            TokenType::Lower(sym) => {
                let span = self.bump().span;
                Ok(self.ctx.expr(Expression::Var(sym, span)))
            }
            TokenType::Upper(sym) => {
                let start = self.bump().span;
                if self.eat(TokenType::Dot) {
                    let (name, end) = self.lower()?;
                    Ok(self
                        .ctx.expr(Expression::Qualified(sym, name, start.merge(end))))
                } else if self.at(TokenType::LBrace) {
                    self.bump();
                    let mut fields = Vec::new();
                    if !self.at(TokenType::RBrace) {
                        loop {
                            let (name, _) = self.lower()?;
                            self.expect(TokenType::Equals)?;
                            let value = self.expr_stmt()?;
                            fields.push((name, value));
                            if !self.eat(TokenType::Semi) {
                                break;
                            }
                        }
                    }
                    let end = self.expect(TokenType::RBrace)?.span;
                    Ok(self.ctx.expr(Expression::Construct {
                        datacon: sym,
                        fields,
                        span: start.merge(end),
                    }))
                } else {
                    Ok(self.ctx.expr(Expression::Construct {
                        datacon: sym,
                        fields: Vec::new(),
                        span: start,
                    }))
                }
            }
            TokenType::Begin => {
                let start = self.bump().span;
                let inner = self.expr()?;
                let end = self.expect(TokenType::End)?.span;
                Ok(self
                    .ctx.expr(Expression::Grouped(inner, start.merge(end))))
            }
            TokenType::LParen => {
                let start = self.bump().span;
                if self.at(TokenType::RParen) {
                    let end = self.bump().span;
                    return Ok(self.ctx.expr(Expression::Unit(start.merge(end))));
                }
                let first = self.expr()?;
                if self.eat(TokenType::Colon) {
                    let ty = self.ty()?;
                    self.expect(TokenType::RParen)?;
                    Ok(self.ctx.expr(Expression::Annot(first, ty)))
                } else if self.eat(TokenType::Comma) {
                    let mut parts = vec![first];
                    loop {
                        parts.push(self.expr()?);
                        if !self.eat(TokenType::Comma) {
                            break;
                        }
                    }
                    let end = self.expect(TokenType::RParen)?.span;
                    Ok(self
                        .ctx.expr(Expression::Tuple(parts, start.merge(end))))
                } else {
                    self.expect(TokenType::RParen)?;
                    Ok(first)
                }
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    // ── Patterns ────────────────────────────────────────────────────────

    fn pat(&mut self) -> PResult<&'a Pat<'a>> {
        let base = self.pat_atom()?;
        if self.eat(TokenType::As) {
            let (name, end) = self.lower()?;
            Ok(self
                .ctx.pat(Pat::As(base, name, base.span().merge(end))))
        } else {
            Ok(base)
        }
    }

    fn pat_atom(&mut self) -> PResult<&'a Pat<'a>> {
        match self.peek().ty {
            TokenType::Lower(sym) => {
                let span = self.bump().span;
                Ok(self.ctx.pat(Pat::Var(sym, span)))
            }
            TokenType::Underscore => {
                let span = self.bump().span;
                Ok(self.ctx.pat(Pat::Any(span)))
            }
            TokenType::Upper(sym) => {
                let start = self.bump().span;
                let mut fields = Vec::new();
                let mut end = start;
                if self.eat(TokenType::LBrace) {
                    if !self.at(TokenType::RBrace) {
                        loop {
                            let (name, _) = self.lower()?;
                            self.expect(TokenType::Equals)?;
                            let p = self.pat()?;
                            fields.push((name, p));
                            if !self.eat(TokenType::Semi) {
                                break;
                            }
                        }
                    }
                    end = self.expect(TokenType::RBrace)?.span;
                }
                Ok(self.ctx.pat(Pat::Construct {
                    datacon: sym,
                    fields,
                    span: start.merge(end),
                }))
            }
            TokenType::LParen => {
                let start = self.bump().span;
                if self.at(TokenType::RParen) {
                    let end = self.bump().span;
                    return Ok(self
                        .ctx.pat(Pat::Tuple(Vec::new(), start.merge(end))));
                }
                let first = self.pat()?;
                if self.eat(TokenType::Comma) {
                    let mut parts = vec![first];
                    loop {
                        parts.push(self.pat()?);
                        if !self.eat(TokenType::Comma) {
                            break;
                        }
                    }
                    let end = self.expect(TokenType::RParen)?.span;
                    Ok(self.ctx.pat(Pat::Tuple(parts, start.merge(end))))
                } else {
                    self.expect(TokenType::RParen)?;
                    Ok(first)
                }
            }
            _ => Err(self.unexpected("a pattern")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use bumpalo::Bump;
    use mezzo_base::Interner;

    fn with_module<R>(src: &str, f: impl FnOnce(&Module<'_>) -> R) -> R {
        let mut interner = Interner::new();
        let tokens = Lexer::new(src).tokenize(&mut interner).expect("lexes");
        let bump = Bump::new();
        let ctx = AstContext::new(&bump);
        let module = Parser::new(&tokens, ctx).parse_module().expect("parses");
        f(&module)
    }

    #[test]
    fn parses_a_data_group() {
        with_module(
            "data list a = Nil | Cons { head: a; tail: list a }",
            |m| {
                assert_eq!(m.items.len(), 1);
                match &m.items[0] {
                    Item::DataGroup(defs) => {
                        assert_eq!(defs.len(), 1);
                        assert!(!defs[0].mutable);
                        assert_eq!(defs[0].params.len(), 1);
                        assert_eq!(defs[0].branches.len(), 2);
                        assert_eq!(defs[0].branches[1].fields.len(), 2);
                    }
                    other => panic!("expected data group, got {:?}", other),
                }
            },
        );
    }

    #[test]
    fn parses_mutable_data_with_adopts() {
        with_module("mutable data pool = Pool {} adopts cell", |m| {
            match &m.items[0] {
                Item::DataGroup(defs) => {
                    assert!(defs[0].mutable);
                    assert!(defs[0].adopts.is_some());
                }
                other => panic!("expected data group, got {:?}", other),
            }
        });
    }

    #[test]
    fn parses_let_fun_and_application() {
        with_module(
            "val f = let id = fun (x: int) : int = x in id 3",
            |m| match &m.items[0] {
                Item::ValDef { rec, expr, .. } => {
                    assert!(!rec);
                    assert!(matches!(expr, Expression::Let { .. }));
                }
                other => panic!("expected val def, got {:?}", other),
            },
        );
    }

    #[test]
    fn parses_match_with_arms() {
        with_module(
            "val n = match xs with Nil -> 0 | Cons { head = h; tail = t } -> h end",
            |m| match &m.items[0] {
                Item::ValDef { expr, .. } => match expr {
                    Expression::Match { arms, .. } => assert_eq!(arms.len(), 2),
                    other => panic!("expected match, got {:?}", other),
                },
                other => panic!("expected val def, got {:?}", other),
            },
        );
    }

    #[test]
    fn parses_interface_declarations() {
        with_module(
            "abstract t a\nfact duplicable t\nval length : [a] list a -> int",
            |m| {
                assert!(matches!(m.items[0], Item::AbstractDecl { .. }));
                assert!(matches!(m.items[1], Item::FactDecl { .. }));
                assert!(matches!(m.items[2], Item::ValDecl { .. }));
            },
        );
    }

    #[test]
    fn parses_give_take_and_assignment() {
        with_module(
            "val go = give r to pool; take r from pool; r.contents <- 1",
            |m| match &m.items[0] {
                Item::ValDef { expr, .. } => {
                    assert!(matches!(expr, Expression::Sequence(..)));
                }
                other => panic!("expected val def, got {:?}", other),
            },
        );
    }

    #[test]
    fn parses_quantified_types() {
        with_module("val id : [a] (x: =a) -> a", |m| match &m.items[0] {
            Item::ValDecl { ty, .. } => {
                assert!(matches!(ty, TypeExpr::Forall(..)));
            }
            other => panic!("expected val decl, got {:?}", other),
        });
    }

    #[test]
    fn missing_in_is_rejected() {
        let mut interner = Interner::new();
        let tokens = Lexer::new("val x = let y = 1 y")
            .tokenize(&mut interner)
            .unwrap();
        let bump = Bump::new();
        let ctx = AstContext::new(&bump);
        assert!(Parser::new(&tokens, ctx).parse_module().is_err());
    }
}
