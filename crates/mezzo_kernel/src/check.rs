//! The bidirectional expression checker.
//!
//! `Checker::check` walks a core expression with the current environment,
//! a scope stack mapping de Bruijn indices to environment variables, and
//! an optional expected type. It returns the updated environment together
//! with a variable bound to the expression's value; the variable's
//! permission list describes everything known about that value.
//!
//! The checker owns no mutable state of its own: all effects go through
//! the environment threading. Subtraction consumes, addition produces,
//! and the merge module reconciles branches.

use mezzo_base::{Interner, Span, Symbol};

use crate::add::add;
use crate::env::{Branch, DeclaredFlavor, Definition, Env, Mode, Var};
use crate::error::{Derivation, TypeError, TypeResult};
use crate::expr::{Expr, ExprNode, Pattern, PatternNode};
use crate::fact::{is_duplicable, is_exclusive, Fact, ParamMask};
use crate::merge::merge_envs;
use crate::print::TypePrinter;
use crate::sub::Subtractor;
use crate::ty::{subst, Binding, Concrete, Datacon, Field, Kind, Type};

/// Environment variables for the primitive types every module can see.
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub int: Var,
    pub bool_: Var,
    pub false_: Datacon,
    pub true_: Datacon,
}

impl Builtins {
    /// Install `int` (abstract, duplicable) and `data bool = False | True`
    /// into a fresh environment.
    pub fn install(env: &mut Env, interner: &mut Interner) -> Builtins {
        let int = env.bind_datatype(interner.intern("int"), &[], Span::dummy());
        env.install_definition(
            int,
            Definition::Abstract,
            Some(Fact::Duplicable(ParamMask::empty())),
        );
        let bool_ = env.bind_datatype(interner.intern("bool"), &[], Span::dummy());
        let false_sym = interner.intern("False");
        let true_sym = interner.intern("True");
        env.install_definition(
            bool_,
            Definition::Concrete {
                flavor: DeclaredFlavor::Duplicable,
                branches: vec![
                    Branch {
                        name: false_sym,
                        fields: vec![],
                    },
                    Branch {
                        name: true_sym,
                        fields: vec![],
                    },
                ],
                adopts: None,
            },
            None,
        );
        Builtins {
            int,
            bool_,
            false_: Datacon {
                datatype: bool_,
                name: false_sym,
                branch: 0,
            },
            true_: Datacon {
                datatype: bool_,
                name: true_sym,
                branch: 1,
            },
        }
    }
}

/// The expression checker.
pub struct Checker<'a> {
    interner: &'a Interner,
    builtins: Builtins,
}

/// Check a whole expression in an empty scope.
pub fn check_expr(
    env: Env,
    expr: &Expr,
    interner: &Interner,
    builtins: Builtins,
) -> TypeResult<(Env, Var)> {
    let mut checker = Checker::new(interner, builtins);
    let mut scope = Vec::new();
    checker.check(env, &mut scope, expr, None)
}

impl<'a> Checker<'a> {
    pub fn new(interner: &'a Interner, builtins: Builtins) -> Self {
        Checker { interner, builtins }
    }

    fn sub(&self) -> Subtractor<'a> {
        Subtractor::new(self.interner)
    }

    fn render(&self, env: &Env, t: &Type) -> String {
        TypePrinter::new(env, self.interner).render(t)
    }

    fn var_name(&self, env: &Env, v: Var) -> String {
        TypePrinter::new(env, self.interner).var(v)
    }

    fn fresh(&self, env: &mut Env, name: Symbol, span: Span) -> Var {
        env.bind_rigid(name, Kind::Term, span)
    }

    /// Subtract-then-re-add the expected type, so the result variable is
    /// known at exactly the annotation.
    fn finish(
        &mut self,
        env: Env,
        v: Var,
        expected: Option<&Type>,
        span: Span,
    ) -> TypeResult<(Env, Var)> {
        match expected {
            None => Ok((env, v)),
            Some(t) => match self.sub().sub(&env, v, t) {
                Ok(e) => Ok((add(e, v, t, self.interner), v)),
                Err(derivation) => Err(TypeError::ExpectedPermission {
                    var: self.var_name(&env, v),
                    expected: self.render(&env, t),
                    span,
                    derivation,
                }),
            },
        }
    }

    /// The entry point: check `expr`, producing an environment and the
    /// variable naming its value.
    pub fn check(
        &mut self,
        env: Env,
        scope: &mut Vec<Var>,
        expr: &Expr,
        expected: Option<&Type>,
    ) -> TypeResult<(Env, Var)> {
        let span = expr.span;
        match &expr.node {
            ExprNode::Var(i) => {
                let v = scope[scope.len() - 1 - i];
                self.finish(env, v, expected, span)
            }

            ExprNode::Free(v) => self.finish(env, *v, expected, span),

            ExprNode::Int(_) => {
                let mut env = env;
                let v = self.fresh(&mut env, Symbol::EMPTY, span);
                let env = add(env, v, &Type::Open(self.builtins.int), self.interner);
                self.finish(env, v, expected, span)
            }

            ExprNode::Tuple(es) => {
                let mut env = env;
                let mut components = Vec::new();
                for e in es {
                    let (e2, v) = self.check(env, scope, e, None)?;
                    env = e2;
                    components.push(Type::singleton(v));
                }
                let v = self.fresh(&mut env, Symbol::EMPTY, span);
                let env = add(env, v, &Type::Tuple(components), self.interner);
                self.finish(env, v, expected, span)
            }

            ExprNode::Construct { datacon, fields } => {
                let mut env = env;
                let mut stored = Vec::new();
                for (name, e) in fields {
                    let (e2, fv) = self.check(env, scope, e, None)?;
                    env = e2;
                    stored.push(Field::Value(*name, Type::singleton(fv)));
                }
                // A parametric adopts clause is instantiated with fresh
                // flexible variables, to be solved by later subtractions.
                let has_adopts = matches!(
                    env.definition(datacon.datatype),
                    Some(Definition::Concrete { adopts: Some(_), .. })
                );
                let adopts = if has_adopts {
                    let params = env.params(datacon.datatype).to_vec();
                    let args: Vec<Type> = params
                        .iter()
                        .map(|p| {
                            Type::Open(env.bind_flexible(p.name, p.kind.clone(), span))
                        })
                        .collect();
                    env.resolved_adopts(datacon.datatype, &args)
                } else {
                    None
                };
                let v = self.fresh(&mut env, Symbol::EMPTY, span);
                let block = Type::Concrete(Box::new(Concrete {
                    datacon: *datacon,
                    fields: stored,
                    adopts,
                }));
                let env = add(env, v, &block, self.interner);
                self.finish(env, v, expected, span)
            }

            ExprNode::Let {
                rec,
                bindings,
                body,
            } => {
                let mut env = env;
                let save = scope.len();
                if *rec {
                    // Pre-install syntactic arrow types so the bodies can
                    // call each other.
                    let mut pre = Vec::new();
                    for (pat, rhs) in bindings {
                        let (name, sig) = match (&pat.node, &rhs.node) {
                            (
                                PatternNode::Var(name),
                                ExprNode::Lambda {
                                    binders,
                                    arg_ty,
                                    ret_ty,
                                    ..
                                },
                            ) => (*name, lambda_signature(binders, arg_ty, ret_ty)),
                            _ => (binder_name(pat), Type::Unknown),
                        };
                        let fv = self.fresh(&mut env, name, pat.span);
                        scope.push(fv);
                        pre.push((fv, sig));
                    }
                    for ((fv, sig), (_, rhs)) in pre.iter().zip(bindings.iter()) {
                        let sig = resolve_type(scope, sig);
                        env = add(env, *fv, &sig, self.interner);
                        let (e2, _) = self.check(env, scope, rhs, Some(&sig))?;
                        env = e2;
                    }
                } else {
                    for (pat, rhs) in bindings {
                        let (e2, v) = self.check(env, scope, rhs, None)?;
                        env = self.bind_pattern(e2, scope, pat, v)?;
                    }
                }
                let result = self.check(env, scope, body, expected);
                scope.truncate(save);
                result
            }

            ExprNode::Lambda {
                binders,
                arg_ty,
                ret_ty,
                body,
            } => {
                // The body runs against only the duplicable part of the
                // environment: a function may not capture unique state.
                let mut inner = env.strip_to_duplicable();
                let save = scope.len();
                for b in binders {
                    let v = inner.bind_rigid(b.name, b.kind.clone(), b.span);
                    scope.push(v);
                }
                let arg_var = *scope.last().expect("lambda has at least its argument");
                let arg_t = resolve_type(scope, arg_ty);
                inner = add(inner, arg_var, &arg_t, self.interner);
                let ret_t = resolve_type(scope, ret_ty);
                let (_, _) = self.check(inner, scope, body, Some(&ret_t))?;
                scope.truncate(save);

                let mut env = env;
                let v = self.fresh(&mut env, Symbol::EMPTY, span);
                let sig = resolve_type(scope, &lambda_signature(binders, arg_ty, ret_ty));
                let env = add(env, v, &sig, self.interner);
                self.finish(env, v, expected, span)
            }

            ExprNode::App(f, arg) => {
                let (env, fv) = self.check(env, scope, f, None)?;
                let (env, av) = self.check(env, scope, arg, None)?;
                self.apply(env, fv, av, expected, span)
            }

            ExprNode::TApp(f, tys) => {
                let (env, fv) = self.check(env, scope, f, None)?;
                self.type_apply(env, fv, tys, expected, span)
            }

            ExprNode::Match { scrutinee, arms } => {
                let (env, sv) = self.check(env, scope, scrutinee, None)?;
                let mut live: Option<(Env, Var)> = None;
                for (pat, body) in arms {
                    let save = scope.len();
                    let arm_env = env.clone();
                    let outcome = self
                        .bind_pattern(arm_env, scope, pat, sv)
                        .and_then(|e| self.check(e, scope, body, expected));
                    scope.truncate(save);
                    match outcome {
                        Ok((e, v)) => {
                            if e.is_inconsistent() && !env.is_inconsistent() {
                                // Unreachable arm: contributes nothing.
                                continue;
                            }
                            live = Some(match live {
                                None => (e, v),
                                Some(acc) => {
                                    merge_envs(&env, acc, (e, v), expected, self.interner)
                                }
                            });
                        }
                        Err(err) => return Err(err),
                    }
                }
                match live {
                    Some(result) => Ok(result),
                    None => {
                        // Every arm was impossible; the whole match is
                        // dead code.
                        let mut env = env;
                        env.mark_inconsistent();
                        let v = self.fresh(&mut env, Symbol::EMPTY, span);
                        Ok((env, v))
                    }
                }
            }

            ExprNode::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let (env, cv) = self.check(env, scope, cond, None)?;
                let (dt, args, perm_index) =
                    self.two_branch_scrutinee(&env, cv).ok_or_else(|| {
                        TypeError::NotTwoBranches {
                            ty: self.var_name(&env, cv),
                            span: cond.span,
                        }
                    })?;

                let then_env = self.refine_to_branch(&env, cv, dt, &args, 1, perm_index);
                let (then_env, then_var) =
                    self.check(then_env, scope, then_branch, expected)?;

                let else_env = self.refine_to_branch(&env, cv, dt, &args, 0, perm_index);
                let (else_env, else_var) = match else_branch {
                    Some(e) => self.check(else_env, scope, e, expected)?,
                    None => {
                        let mut e = else_env;
                        let v = self.fresh(&mut e, Symbol::EMPTY, span);
                        let e = add(e, v, &Type::Tuple(vec![]), self.interner);
                        (e, v)
                    }
                };

                Ok(merge_envs(
                    &env,
                    (then_env, then_var),
                    (else_env, else_var),
                    expected,
                    self.interner,
                ))
            }

            ExprNode::Access { expr: e, field } => {
                let (env, v) = self.check(env, scope, e, None)?;
                let env = self.ensure_unfolded(env, v);
                let (_, block) =
                    self.find_block(&env, v)
                        .ok_or_else(|| TypeError::NoSuchField {
                            var: self.var_name(&env, v),
                            field: self.interner.resolve(*field).to_string(),
                            span,
                        })?;
                let fv = field_var(&env, &block, *field).ok_or_else(|| {
                    TypeError::NoSuchField {
                        var: self.var_name(&env, v),
                        field: self.interner.resolve(*field).to_string(),
                        span,
                    }
                })?;
                self.finish(env, fv, expected, span)
            }

            ExprNode::Assign {
                expr: e,
                field,
                value,
            } => {
                let (env, v) = self.check(env, scope, e, None)?;
                let (env, wv) = self.check(env, scope, value, None)?;
                let env = self.ensure_unfolded(env, v);
                let (index, block) =
                    self.find_block(&env, v)
                        .ok_or_else(|| TypeError::NoSuchField {
                            var: self.var_name(&env, v),
                            field: self.interner.resolve(*field).to_string(),
                            span,
                        })?;
                if env.declared_flavor(block.datacon.datatype) != Some(DeclaredFlavor::Mutable) {
                    return Err(TypeError::AssignToImmutable {
                        ty: self.render(&env, &Type::Concrete(Box::new(block))),
                        span,
                    });
                }
                let mut fields = block.fields.clone();
                let mut found = false;
                for f in fields.iter_mut() {
                    if let Field::Value(name, t) = f {
                        if name == field {
                            *t = Type::singleton(wv);
                            found = true;
                        }
                    }
                }
                if !found {
                    return Err(TypeError::NoSuchField {
                        var: self.var_name(&env, v),
                        field: self.interner.resolve(*field).to_string(),
                        span,
                    });
                }
                let mut env = env;
                let mut perms = env.permissions(v).to_vec();
                perms[index] = Type::Concrete(Box::new(Concrete {
                    datacon: block.datacon,
                    fields,
                    adopts: block.adopts.clone(),
                }));
                env.set_permissions(v, perms);
                let v2 = self.fresh(&mut env, Symbol::EMPTY, span);
                let env = add(env, v2, &Type::Tuple(vec![]), self.interner);
                self.finish(env, v2, expected, span)
            }

            ExprNode::AssignTag { expr: e, datacon } => {
                let (env, v) = self.check(env, scope, e, None)?;
                let env = self.ensure_unfolded(env, v);
                let (index, block) =
                    self.find_block(&env, v)
                        .ok_or_else(|| TypeError::NoSuchField {
                            var: self.var_name(&env, v),
                            field: "<tag>".to_string(),
                            span,
                        })?;
                if env.declared_flavor(block.datacon.datatype) != Some(DeclaredFlavor::Mutable) {
                    return Err(TypeError::AssignToImmutable {
                        ty: self.render(&env, &Type::Concrete(Box::new(block))),
                        span,
                    });
                }
                let target_branch = match env.definition(datacon.datatype) {
                    Some(Definition::Concrete { branches, .. }) => {
                        branches.get(datacon.branch).cloned()
                    }
                    _ => None,
                }
                .ok_or_else(|| TypeError::NoSuchField {
                    var: self.var_name(&env, v),
                    field: "<tag>".to_string(),
                    span,
                })?;
                if target_branch.fields.len() != block.fields.len() {
                    return Err(TypeError::TagChangeArity {
                        from: self.interner.resolve(block.datacon.name).to_string(),
                        to: self.interner.resolve(datacon.name).to_string(),
                        span,
                    });
                }
                // Same field count: values stay, names change positionally.
                let fields: Vec<Field> = target_branch
                    .fields
                    .iter()
                    .zip(block.fields.iter())
                    .map(|(tf, of)| {
                        let name = match tf {
                            Field::Value(n, _) => *n,
                            Field::Permission(_) => Symbol::EMPTY,
                        };
                        Field::Value(name, of.ty().clone())
                    })
                    .collect();
                let mut env = env;
                let mut perms = env.permissions(v).to_vec();
                perms[index] = Type::Concrete(Box::new(Concrete {
                    datacon: *datacon,
                    fields,
                    adopts: block.adopts.clone(),
                }));
                env.set_permissions(v, perms);
                let v2 = self.fresh(&mut env, Symbol::EMPTY, span);
                let env = add(env, v2, &Type::Tuple(vec![]), self.interner);
                self.finish(env, v2, expected, span)
            }

            ExprNode::Give { adoptee, adopter } => {
                let (env, xv) = self.check(env, scope, adoptee, None)?;
                let (env, yv) = self.check(env, scope, adopter, None)?;
                let clause = self.adopts_clause(&env, yv).ok_or_else(|| {
                    TypeError::NoAdoptsClause {
                        ty: self.var_name(&env, yv),
                        span: adopter.span,
                    }
                })?;
                if !is_exclusive(&env, &clause) {
                    return Err(TypeError::NonExclusiveAdoptee {
                        ty: self.render(&env, &clause),
                        span,
                    });
                }
                let env = self.sub().sub(&env, xv, &clause).map_err(|derivation| {
                    TypeError::ExpectedPermission {
                        var: self.var_name(&env, xv),
                        expected: self.render(&env, &clause),
                        span,
                        derivation,
                    }
                })?;
                let env = add(env, xv, &Type::Dynamic, self.interner);
                let mut env = env;
                let v = self.fresh(&mut env, Symbol::EMPTY, span);
                let env = add(env, v, &Type::Tuple(vec![]), self.interner);
                self.finish(env, v, expected, span)
            }

            ExprNode::Take { adoptee, adopter } => {
                let (env, xv) = self.check(env, scope, adoptee, None)?;
                let (env, yv) = self.check(env, scope, adopter, None)?;
                let env = self.sub().sub(&env, xv, &Type::Dynamic).map_err(|derivation| {
                    TypeError::ExpectedPermission {
                        var: self.var_name(&env, xv),
                        expected: "dynamic".to_string(),
                        span: adoptee.span,
                        derivation,
                    }
                })?;
                let clause = self.adopts_clause(&env, yv).ok_or_else(|| {
                    TypeError::NoAdoptsClause {
                        ty: self.var_name(&env, yv),
                        span: adopter.span,
                    }
                })?;
                let env = add(env, xv, &clause, self.interner);
                let mut env = env;
                let v = self.fresh(&mut env, Symbol::EMPTY, span);
                let env = add(env, v, &Type::Tuple(vec![]), self.interner);
                self.finish(env, v, expected, span)
            }

            ExprNode::Owns { adopter, adoptee } => {
                let (env, yv) = self.check(env, scope, adopter, None)?;
                let (env, xv) = self.check(env, scope, adoptee, None)?;
                let has_exclusive = env
                    .permissions(yv)
                    .iter()
                    .any(|p| is_exclusive(&env, p));
                if !has_exclusive && !env.is_inconsistent() {
                    return Err(TypeError::ExpectedPermission {
                        var: self.var_name(&env, yv),
                        expected: "an exclusive permission".to_string(),
                        span: adopter.span,
                        derivation: Derivation::leaf("owns", "adopter is not exclusive"),
                    });
                }
                let env = self.sub().sub(&env, xv, &Type::Dynamic).map_err(|derivation| {
                    TypeError::ExpectedPermission {
                        var: self.var_name(&env, xv),
                        expected: "dynamic".to_string(),
                        span: adoptee.span,
                        derivation,
                    }
                })?;
                let mut env = env;
                let v = self.fresh(&mut env, Symbol::EMPTY, span);
                let env = add(env, v, &Type::Open(self.builtins.bool_), self.interner);
                self.finish(env, v, expected, span)
            }

            ExprNode::Fail => {
                let mut env = env;
                env.mark_inconsistent();
                let v = self.fresh(&mut env, Symbol::EMPTY, span);
                self.finish(env, v, expected, span)
            }

            ExprNode::Constraint(e, t) => {
                let t = resolve_type(scope, t);
                let merged = match expected {
                    None => t,
                    Some(prev) => merge_annotations(prev, &t).ok_or_else(|| {
                        TypeError::ConflictingAnnotations {
                            first: self.render(&env, prev),
                            second: self.render(&env, &t),
                            span,
                        }
                    })?,
                };
                self.check(env, scope, e, Some(&merged))
            }
        }
    }

    // ── Application ─────────────────────────────────────────────────────

    fn apply(
        &mut self,
        env: Env,
        fv: Var,
        av: Var,
        expected: Option<&Type>,
        span: Span,
    ) -> TypeResult<(Env, Var)> {
        let sub = self.sub();
        let mut attempts = Vec::new();
        let mut saw_arrow = false;
        let perms = env.permissions(fv).to_vec();
        for p in &perms {
            // Peel the quantifiers flexibly, looking for an arrow.
            let mut e = env.clone();
            let mut t = e.modulo_flex(p);
            loop {
                match t {
                    Type::Forall(b, body) => {
                        let (_, opened) = e.open_binder(&b, &body, Mode::Flexible);
                        t = e.modulo_flex(&opened);
                    }
                    other => {
                        t = other;
                        break;
                    }
                }
            }
            let (dom, cod) = match t {
                Type::Arrow(d, c) => (*d, *c),
                _ => continue,
            };
            saw_arrow = true;

            // Let the annotation guide instantiation of the codomain.
            if let Some(exp) = expected {
                if let Ok(e2) = sub.sub_type(&e, &cod, exp) {
                    e.import_flex_instantiations(&e2);
                }
            }

            // Subtract the argument against the domain.
            match sub.sub_type(&e, &Type::singleton(av), &dom) {
                Ok(e2) => {
                    let cod = e2.resolve_deep(&cod);
                    let mut e2 = e2;
                    let v = self.fresh(&mut e2, Symbol::EMPTY, span);
                    let e2 = add(e2, v, &cod, self.interner);
                    return self.finish(e2, v, expected, span);
                }
                Err(d) => attempts.push(d),
            }
        }
        if !saw_arrow {
            return Err(TypeError::NotAFunction {
                var: self.var_name(&env, fv),
                span,
            });
        }
        Err(TypeError::ExpectedPermission {
            var: self.var_name(&env, av),
            expected: "the function's domain".to_string(),
            span,
            derivation: Derivation::node("application", self.var_name(&env, fv), attempts),
        })
    }

    fn type_apply(
        &mut self,
        env: Env,
        fv: Var,
        tys: &[Type],
        expected: Option<&Type>,
        span: Span,
    ) -> TypeResult<(Env, Var)> {
        let perms = env.permissions(fv).to_vec();
        for (i, p) in perms.iter().enumerate() {
            let mut t = env.modulo_flex(p);
            if !matches!(t, Type::Forall(..)) {
                continue;
            }
            for arg in tys {
                match t {
                    Type::Forall(b, body) => {
                        if b.flavor == crate::ty::Flavor::CannotInstantiate {
                            return Err(TypeError::CannotInstantiate {
                                var: self.interner.resolve(b.name).to_string(),
                                span,
                            });
                        }
                        t = subst(&body, 0, arg);
                    }
                    other => {
                        t = other;
                        break;
                    }
                }
            }
            let mut env = env;
            if !is_duplicable(&env, p) {
                env.remove_permission_at(fv, i);
            }
            let v = self.fresh(&mut env, Symbol::EMPTY, span);
            let env = add(env, v, &t, self.interner);
            return self.finish(env, v, expected, span);
        }
        Err(TypeError::NotAFunction {
            var: self.var_name(&env, fv),
            span,
        })
    }

    // ── Patterns ────────────────────────────────────────────────────────

    /// Bind a pattern against a variable, refining the variable's
    /// permissions in place. In an inconsistent environment the pattern
    /// variables are bound to fresh, unconstrained variables so the body
    /// still checks (vacuously).
    fn bind_pattern(
        &mut self,
        env: Env,
        scope: &mut Vec<Var>,
        pat: &Pattern,
        v: Var,
    ) -> TypeResult<Env> {
        if env.is_inconsistent() {
            let mut env = env;
            bind_fresh(&mut env, scope, pat);
            return Ok(env);
        }
        match &pat.node {
            PatternNode::Any => Ok(env),
            PatternNode::Var(name) => {
                let mut env = env;
                env.add_name(v, *name);
                scope.push(v);
                Ok(env)
            }
            PatternNode::As(inner, name) => {
                let mut env = self.bind_pattern(env, scope, inner, v)?;
                env.add_name(v, *name);
                scope.push(v);
                Ok(env)
            }
            PatternNode::Tuple(ps) => {
                let env = self.ensure_unfolded(env, v);
                let components = env.permissions(v).iter().find_map(|p| {
                    match env.modulo_flex(p) {
                        Type::Tuple(ts) if ts.len() == ps.len() => Some(ts),
                        _ => None,
                    }
                });
                let components = match components {
                    Some(ts) => ts,
                    None => {
                        return Err(TypeError::ExpectedPermission {
                            var: self.var_name(&env, v),
                            expected: format!("a {}-tuple", ps.len()),
                            span: pat.span,
                            derivation: Derivation::leaf("pattern", "no tuple permission"),
                        })
                    }
                };
                let mut env = env;
                for (p, comp) in ps.iter().zip(components.iter()) {
                    let cv = match singleton_var(&env, comp) {
                        Some(cv) => cv,
                        None => {
                            return Err(TypeError::ExpectedPermission {
                                var: self.var_name(&env, v),
                                expected: "an unfolded tuple".to_string(),
                                span: pat.span,
                                derivation: Derivation::leaf("pattern", "component not a singleton"),
                            })
                        }
                    };
                    env = self.bind_pattern(env, scope, p, cv)?;
                }
                Ok(env)
            }
            PatternNode::Construct { datacon, fields } => {
                let mut env = self.ensure_unfolded(env, v);
                // A nominal permission for the pattern's data type is
                // refined in place: the matching branch becomes a block.
                if self.find_block(&env, v).is_none() {
                    if let Some((dt, args, i)) = self.nominal_perm(&env, v, datacon.datatype) {
                        env.remove_permission_at(v, i);
                        if let Some(b) = env.resolved_branch(dt, datacon.branch, &args) {
                            let block = Type::Concrete(Box::new(Concrete {
                                datacon: *datacon,
                                fields: b.fields,
                                adopts: env.resolved_adopts(dt, &args),
                            }));
                            env = add(env, v, &block, self.interner);
                        }
                    }
                }
                let block = match self.find_block(&env, v) {
                    Some((_, block)) => block,
                    None => {
                        return Err(TypeError::ExpectedPermission {
                            var: self.var_name(&env, v),
                            expected: self.interner.resolve(datacon.name).to_string(),
                            span: pat.span,
                            derivation: Derivation::leaf("pattern", "no block permission"),
                        })
                    }
                };
                if env.repr(block.datacon.datatype) != env.repr(datacon.datatype)
                    || block.datacon.name != datacon.name
                {
                    // The scrutinee is known to carry a different tag:
                    // this arm can never be taken.
                    env.mark_inconsistent();
                    bind_fresh(&mut env, scope, pat);
                    return Ok(env);
                }
                let value_fields: Vec<(Symbol, Type)> = block
                    .fields
                    .iter()
                    .filter_map(|f| match f {
                        Field::Value(n, t) => Some((*n, t.clone())),
                        Field::Permission(_) => None,
                    })
                    .collect();
                for (fname, fpat) in fields {
                    let ft = value_fields.iter().find(|(n, _)| n == fname).map(|(_, t)| t);
                    let ft = match ft {
                        Some(t) => t,
                        None => {
                            return Err(TypeError::MissingFieldInPattern {
                                datacon: self.interner.resolve(datacon.name).to_string(),
                                field: self.interner.resolve(*fname).to_string(),
                                span: fpat.span,
                            })
                        }
                    };
                    let fv = match singleton_var(&env, ft) {
                        Some(fv) => fv,
                        None => {
                            return Err(TypeError::ExpectedPermission {
                                var: self.var_name(&env, v),
                                expected: "an unfolded block".to_string(),
                                span: fpat.span,
                                derivation: Derivation::leaf("pattern", "field not a singleton"),
                            })
                        }
                    };
                    env = self.bind_pattern(env, scope, fpat, fv)?;
                }
                Ok(env)
            }
        }
    }

    // ── Structure lookups ───────────────────────────────────────────────

    /// Refine nominal permissions into structural ones when the defining
    /// type has a single branch.
    fn ensure_unfolded(&self, env: Env, v: Var) -> Env {
        let mut env = env;
        let perms = env.permissions(v).to_vec();
        for (i, p) in perms.iter().enumerate() {
            if let Some(expanded) = env.expand_if_one_branch(p) {
                env.remove_permission_at(v, i);
                return add(env, v, &expanded, self.interner);
            }
        }
        env
    }

    /// A permission of `v` naming the given data type nominally, with its
    /// arguments and position.
    fn nominal_perm(&self, env: &Env, v: Var, dt: Var) -> Option<(Var, Vec<Type>, usize)> {
        for (i, p) in env.permissions(v).iter().enumerate() {
            match env.modulo_flex(p) {
                Type::App(head, args) => {
                    if let Type::Open(h) = env.modulo_flex(&head) {
                        if env.repr(h) == env.repr(dt) {
                            return Some((h, args, i));
                        }
                    }
                }
                Type::Open(h) if env.repr(h) == env.repr(dt) => {
                    return Some((h, Vec::new(), i));
                }
                _ => {}
            }
        }
        None
    }

    /// The first concrete block among `v`'s permissions.
    fn find_block(&self, env: &Env, v: Var) -> Option<(usize, Concrete)> {
        env.permissions(v)
            .iter()
            .enumerate()
            .find_map(|(i, p)| match env.modulo_flex(p) {
                Type::Concrete(c) => Some((i, *c)),
                _ => None,
            })
    }

    /// A two-branch scrutinee: the data type, its arguments, and the
    /// index of the permission carrying it.
    fn two_branch_scrutinee(&self, env: &Env, v: Var) -> Option<(Var, Vec<Type>, usize)> {
        for (i, p) in env.permissions(v).iter().enumerate() {
            let (dt, args) = match env.modulo_flex(p) {
                Type::App(head, args) => match env.modulo_flex(&head) {
                    Type::Open(dt) => (dt, args),
                    _ => continue,
                },
                Type::Open(dt) => (dt, Vec::new()),
                Type::Concrete(c) => (c.datacon.datatype, Vec::new()),
                _ => continue,
            };
            if let Some(Definition::Concrete { branches, .. }) = env.definition(dt) {
                if branches.len() == 2 {
                    return Some((dt, args, i));
                }
            }
        }
        None
    }

    /// Replace the scrutinee's nominal permission with the concrete form
    /// of one branch.
    fn refine_to_branch(
        &self,
        env: &Env,
        v: Var,
        dt: Var,
        args: &[Type],
        branch: usize,
        perm_index: usize,
    ) -> Env {
        let mut e = env.clone();
        let resolved = match e.resolved_branch(dt, branch, args) {
            Some(b) => b,
            None => return e,
        };
        let was_concrete = matches!(
            e.modulo_flex(&e.permissions(v)[perm_index]),
            Type::Concrete(_)
        );
        if was_concrete {
            // Tag already known; refining to the other branch makes the
            // environment inconsistent via the add path below.
        } else {
            e.remove_permission_at(v, perm_index);
        }
        let block = Type::Concrete(Box::new(Concrete {
            datacon: Datacon {
                datatype: dt,
                name: resolved.name,
                branch,
            },
            fields: resolved.fields,
            adopts: e.resolved_adopts(dt, args),
        }));
        add(e, v, &block, self.interner)
    }

    /// The adopts clause visible through `v`'s permissions.
    fn adopts_clause(&self, env: &Env, v: Var) -> Option<Type> {
        for p in env.permissions(v) {
            match env.modulo_flex(p) {
                Type::Concrete(c) => {
                    if let Some(a) = &c.adopts {
                        return Some(a.clone());
                    }
                }
                Type::App(head, args) => {
                    if let Type::Open(dt) = env.modulo_flex(&head) {
                        if let Some(a) = env.resolved_adopts(dt, &args) {
                            return Some(a);
                        }
                    }
                }
                Type::Open(dt) => {
                    if let Some(a) = env.resolved_adopts(dt, &[]) {
                        return Some(a);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

// ── Free helpers ────────────────────────────────────────────────────────

/// Resolve the expression-level de Bruijn indices of an embedded type
/// against the checker's scope; indices under the type's own quantifiers
/// are left alone.
pub fn resolve_type(scope: &[Var], t: &Type) -> Type {
    fn go(scope: &[Var], t: &Type, depth: usize) -> Type {
        match t {
            Type::Bound(j) if *j >= depth => {
                let outer = *j - depth;
                Type::Open(scope[scope.len() - 1 - outer])
            }
            Type::Bound(_) | Type::Open(_) | Type::Unknown | Type::Dynamic | Type::Empty => {
                t.clone()
            }
            Type::Forall(b, body) => {
                Type::Forall(b.clone(), Box::new(go(scope, body, depth + 1)))
            }
            Type::Exists(b, body) => {
                Type::Exists(b.clone(), Box::new(go(scope, body, depth + 1)))
            }
            Type::App(head, args) => Type::App(
                Box::new(go(scope, head, depth)),
                args.iter().map(|a| go(scope, a, depth)).collect(),
            ),
            Type::Tuple(ts) => Type::Tuple(ts.iter().map(|a| go(scope, a, depth)).collect()),
            Type::Concrete(c) => Type::Concrete(Box::new(Concrete {
                datacon: c.datacon,
                fields: c
                    .fields
                    .iter()
                    .map(|f| f.map_ty(|t| go(scope, t, depth)))
                    .collect(),
                adopts: c.adopts.as_ref().map(|a| go(scope, a, depth)),
            })),
            Type::Singleton(inner) => Type::Singleton(Box::new(go(scope, inner, depth))),
            Type::Arrow(d, c) => Type::Arrow(
                Box::new(go(scope, d, depth)),
                Box::new(go(scope, c, depth)),
            ),
            Type::Bar(v, p) => {
                Type::Bar(Box::new(go(scope, v, depth)), Box::new(go(scope, p, depth)))
            }
            Type::Anchored(x, inner) => Type::Anchored(
                Box::new(go(scope, x, depth)),
                Box::new(go(scope, inner, depth)),
            ),
            Type::Star(p, q) => {
                Type::Star(Box::new(go(scope, p, depth)), Box::new(go(scope, q, depth)))
            }
            Type::And(cs, inner) => Type::And(
                cs.iter()
                    .map(|c| crate::ty::Constraint {
                        demand: c.demand,
                        ty: go(scope, &c.ty, depth),
                    })
                    .collect(),
                Box::new(go(scope, inner, depth)),
            ),
            Type::Imply(cs, inner) => Type::Imply(
                cs.iter()
                    .map(|c| crate::ty::Constraint {
                        demand: c.demand,
                        ty: go(scope, &c.ty, depth),
                    })
                    .collect(),
                Box::new(go(scope, inner, depth)),
            ),
        }
    }
    go(scope, t, 0)
}

/// The stored arrow type of a lambda: foralls over its binders, with the
/// argument (the innermost binder) threaded through the domain as
/// `(=arg | arg @ t)`.
pub fn lambda_signature(binders: &[Binding], arg_ty: &Type, ret_ty: &Type) -> Type {
    let root = Type::Bound(0);
    let dom = Type::Bar(
        Box::new(Type::Singleton(Box::new(root.clone()))),
        Box::new(Type::Anchored(Box::new(root), Box::new(arg_ty.clone()))),
    );
    let arrow = Type::arrow(dom, ret_ty.clone());
    binders
        .iter()
        .rev()
        .fold(arrow, |acc, b| Type::Forall(b.clone(), Box::new(acc)))
}

/// Structural merge of two annotations. `unknown` is absorbing; tuples
/// and blocks merge field-wise; anything else must agree syntactically.
fn merge_annotations(a: &Type, b: &Type) -> Option<Type> {
    match (a, b) {
        (Type::Unknown, t) | (t, Type::Unknown) => Some(t.clone()),
        (Type::Tuple(xs), Type::Tuple(ys)) if xs.len() == ys.len() => {
            let merged: Option<Vec<Type>> = xs
                .iter()
                .zip(ys.iter())
                .map(|(x, y)| merge_annotations(x, y))
                .collect();
            Some(Type::Tuple(merged?))
        }
        (Type::Concrete(c1), Type::Concrete(c2))
            if c1.datacon == c2.datacon && c1.fields.len() == c2.fields.len() =>
        {
            let fields: Option<Vec<Field>> = c1
                .fields
                .iter()
                .zip(c2.fields.iter())
                .map(|(f1, f2)| match (f1, f2) {
                    (Field::Value(n1, t1), Field::Value(n2, t2)) if n1 == n2 => {
                        merge_annotations(t1, t2).map(|t| Field::Value(*n1, t))
                    }
                    _ => None,
                })
                .collect();
            Some(Type::Concrete(Box::new(Concrete {
                datacon: c1.datacon,
                fields: fields?,
                adopts: c1.adopts.clone(),
            })))
        }
        _ => {
            if a == b {
                Some(a.clone())
            } else {
                None
            }
        }
    }
}

/// The variable a singleton type points at.
fn singleton_var(env: &Env, t: &Type) -> Option<Var> {
    match env.modulo_flex(t) {
        Type::Singleton(inner) => match env.modulo_flex(&inner) {
            Type::Open(v) => Some(v),
            _ => None,
        },
        _ => None,
    }
}

/// The name a simple binding pattern introduces.
fn binder_name(pat: &Pattern) -> Symbol {
    match &pat.node {
        PatternNode::Var(name) => *name,
        PatternNode::As(_, name) => *name,
        _ => Symbol::EMPTY,
    }
}

/// Bind every variable of a pattern to a fresh, unconstrained variable.
/// Used in dead branches, where the scrutinee tells us nothing.
fn bind_fresh(env: &mut Env, scope: &mut Vec<Var>, pat: &Pattern) {
    match &pat.node {
        PatternNode::Any => {}
        PatternNode::Var(name) => {
            let v = env.bind_rigid(*name, Kind::Term, pat.span);
            scope.push(v);
        }
        PatternNode::Tuple(ps) => {
            for p in ps {
                bind_fresh(env, scope, p);
            }
        }
        PatternNode::Construct { fields, .. } => {
            for (_, p) in fields {
                bind_fresh(env, scope, p);
            }
        }
        PatternNode::As(p, name) => {
            bind_fresh(env, scope, p);
            let v = env.bind_rigid(*name, Kind::Term, pat.span);
            scope.push(v);
        }
    }
}

/// The variable behind a named field of a block.
fn field_var(env: &Env, block: &Concrete, field: Symbol) -> Option<Var> {
    block.fields.iter().find_map(|f| match f {
        Field::Value(n, t) if *n == field => singleton_var(env, t),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Env, Interner, Builtins) {
        let mut env = Env::new();
        let mut interner = Interner::new();
        let builtins = Builtins::install(&mut env, &mut interner);
        (env, interner, builtins)
    }

    fn expr(node: ExprNode) -> Expr {
        Expr::new(node, Span::dummy())
    }

    #[test]
    fn integer_literals_check_at_int() {
        let (env, interner, builtins) = setup();
        let int = Type::Open(builtins.int);
        let (env, v) =
            check_expr(env, &expr(ExprNode::Int(3)), &interner, builtins).expect("literal checks");
        let sub = Subtractor::new(&interner);
        assert!(sub.sub(&env, v, &int).is_ok());
    }

    #[test]
    fn let_binds_the_pattern_variable() {
        let (env, mut interner, builtins) = setup();
        let x = interner.intern("x");
        let int = Type::Open(builtins.int);
        // let x = 3 in x : int
        let e = expr(ExprNode::Let {
            rec: false,
            bindings: vec![(
                Pattern::new(PatternNode::Var(x), Span::dummy()),
                expr(ExprNode::Int(3)),
            )],
            body: Box::new(expr(ExprNode::Constraint(
                Box::new(expr(ExprNode::Var(0))),
                int.clone(),
            ))),
        });
        let (env, v) = check_expr(env, &e, &interner, builtins).expect("let checks");
        let sub = Subtractor::new(&interner);
        assert!(sub.sub(&env, v, &int).is_ok());
    }

    #[test]
    fn tuples_unfold_to_singleton_components() {
        let (env, interner, builtins) = setup();
        let e = expr(ExprNode::Tuple(vec![
            expr(ExprNode::Int(1)),
            expr(ExprNode::Int(2)),
        ]));
        let (env, v) = check_expr(env, &e, &interner, builtins).expect("tuple checks");
        let stored = env
            .permissions(v)
            .iter()
            .find_map(|p| match env.modulo_flex(p) {
                Type::Tuple(ts) => Some(ts),
                _ => None,
            })
            .expect("tuple permission stored");
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|t| singleton_var(&env, t).is_some()));
    }

    #[test]
    fn conflicting_annotations_are_rejected() {
        let (env, interner, builtins) = setup();
        let int = Type::Open(builtins.int);
        let bool_ = Type::Open(builtins.bool_);
        // ((3 : bool) : int) — the two annotations clash.
        let e = expr(ExprNode::Constraint(
            Box::new(expr(ExprNode::Constraint(
                Box::new(expr(ExprNode::Int(3))),
                bool_,
            ))),
            int,
        ));
        let err = check_expr(env, &e, &interner, builtins).unwrap_err();
        assert!(matches!(err, TypeError::ConflictingAnnotations { .. }));
    }

    #[test]
    fn fail_makes_the_rest_vacuous() {
        let (env, interner, builtins) = setup();
        let bool_ = Type::Open(builtins.bool_);
        // (fail : bool) checks because the environment is inconsistent.
        let e = expr(ExprNode::Constraint(
            Box::new(expr(ExprNode::Fail)),
            bool_,
        ));
        let (env, _) = check_expr(env, &e, &interner, builtins).expect("vacuous");
        assert!(env.is_inconsistent());
    }

    #[test]
    fn identity_lambda_applies() {
        let (env, mut interner, builtins) = setup();
        let int = Type::Open(builtins.int);
        let f = interner.intern("f");
        let x = interner.intern("x");
        // let f = fun (x: int) : int = x in f 3 : int
        let lam = expr(ExprNode::Lambda {
            binders: vec![Binding::new(x, Kind::Term, Span::dummy())],
            arg_ty: int.clone(),
            ret_ty: int.clone(),
            body: Box::new(expr(ExprNode::Var(0))),
        });
        let e = expr(ExprNode::Let {
            rec: false,
            bindings: vec![(Pattern::new(PatternNode::Var(f), Span::dummy()), lam)],
            body: Box::new(expr(ExprNode::Constraint(
                Box::new(expr(ExprNode::App(
                    Box::new(expr(ExprNode::Var(0))),
                    Box::new(expr(ExprNode::Int(3))),
                ))),
                int.clone(),
            ))),
        });
        let (env, v) = check_expr(env, &e, &interner, builtins).expect("application checks");
        let sub = Subtractor::new(&interner);
        assert!(sub.sub(&env, v, &int).is_ok());
    }

    #[test]
    fn applying_a_non_function_is_reported() {
        let (env, mut interner, builtins) = setup();
        let x = interner.intern("x");
        let e = expr(ExprNode::Let {
            rec: false,
            bindings: vec![(
                Pattern::new(PatternNode::Var(x), Span::dummy()),
                expr(ExprNode::Int(1)),
            )],
            body: Box::new(expr(ExprNode::App(
                Box::new(expr(ExprNode::Var(0))),
                Box::new(expr(ExprNode::Int(2))),
            ))),
        });
        let err = check_expr(env, &e, &interner, builtins).unwrap_err();
        assert!(matches!(err, TypeError::NotAFunction { .. }));
    }
}
