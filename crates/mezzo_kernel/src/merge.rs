//! Merging environments at control-flow joins.
//!
//! After the branches of an `if` or `match` have been checked, their
//! environments must be reconciled into one. The merged environment keeps,
//! for every variable that was in scope before the split, the largest set
//! of permissions provable in *both* branches (syntactic equality modulo
//! flexible instantiations); a non-duplicable permission that survived
//! only one branch is gone.
//!
//! Flexible variables instantiated in only one branch come back flexible;
//! those instantiated in both keep the instantiation when the two
//! solutions agree. An inconsistent branch is dead: the merge is simply
//! the other branch. An annotation at the join point short-circuits the
//! result variable's permissions to exactly the annotated type (both
//! branches were already checked against it).
//!
//! Permissions mentioning variables born inside a branch cannot survive
//! the join — the merged environment has no record of them.

use mezzo_base::Interner;

use crate::add::add;
use crate::env::{Env, Var};
use crate::ty::{vars_below, Type};

/// Merge two branch outcomes into one environment and result variable.
///
/// `orig` is the environment from just before the split; `left` and
/// `right` are each branch's final environment paired with the variable
/// holding its value.
pub fn merge_envs(
    orig: &Env,
    left: (Env, Var),
    right: (Env, Var),
    annotation: Option<&Type>,
    interner: &Interner,
) -> (Env, Var) {
    let (left_env, left_var) = left;
    let (right_env, right_var) = right;

    // A dead branch contributes nothing.
    if left_env.is_inconsistent() {
        return (right_env, right_var);
    }
    if right_env.is_inconsistent() {
        return (left_env, left_var);
    }

    let limit = orig.var_count();
    let mut dest = orig.clone();

    // Frame: per-variable permission intersection.
    for v in orig.term_vars() {
        let kept = intersect_permissions(&left_env, &right_env, v, v, limit);
        dest.set_permissions(v, vec![Type::singleton(v)]);
        let mut d = dest;
        for p in kept {
            d = add(d, v, &p, interner);
        }
        dest = d;
    }

    // Floating permissions: intersection as well.
    let floating: Vec<Type> = left_env
        .floating_perms()
        .iter()
        .map(|p| left_env.resolve_deep(p))
        .filter(|p| {
            vars_below(p, limit)
                && right_env
                    .floating_perms()
                    .iter()
                    .any(|q| right_env.resolve_deep(q) == *p)
        })
        .collect();
    dest.set_floating_perms(floating);

    // Flexible variables: keep an instantiation only when both branches
    // agree on it; a one-sided solution is rolled back (dest starts from
    // orig, where the variable is still flexible).
    for v in dest.flexible_vars() {
        if v.index() >= limit || !dest.is_flexible(v) {
            continue;
        }
        let l = left_env.instantiation(v).map(|t| left_env.resolve_deep(t));
        let r = right_env
            .instantiation(v)
            .map(|t| right_env.resolve_deep(t));
        if let (Some(l), Some(r)) = (l, r) {
            if l == r && vars_below(&l, limit) {
                let _ = dest.instantiate_flexible(v, &l);
            }
        }
    }

    // The join's value: a fresh variable holding either the annotation or
    // the intersection of the two branch results.
    let d = dest.bind_rigid(Default::default(), crate::ty::Kind::Term, mezzo_base::Span::dummy());
    match annotation {
        Some(t) => {
            dest = add(dest, d, t, interner);
        }
        None => {
            let kept = intersect_permissions(&left_env, &right_env, left_var, right_var, limit);
            for p in kept {
                dest = add(dest, d, &p, interner);
            }
        }
    }
    (dest, d)
}

/// Permissions provable on `lv` in the left branch and on `rv` in the
/// right one, up to syntactic equality of their resolved forms. Self-
/// witness singletons and permissions naming branch-local variables are
/// excluded.
fn intersect_permissions(
    left_env: &Env,
    right_env: &Env,
    lv: Var,
    rv: Var,
    limit: usize,
) -> Vec<Type> {
    let lw = Type::singleton(left_env.repr(lv));
    let rw = Type::singleton(right_env.repr(rv));
    let right: Vec<Type> = right_env
        .permissions(rv)
        .iter()
        .filter(|p| !right_env.equal(p, &rw))
        .map(|p| right_env.resolve_deep(p))
        .collect();
    left_env
        .permissions(lv)
        .iter()
        .filter(|p| !left_env.equal(p, &lw))
        .map(|p| left_env.resolve_deep(p))
        .filter(|p| vars_below(p, limit) && right.contains(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Definition;
    use crate::fact::{Fact, ParamMask};
    use crate::sub::Subtractor;
    use crate::ty::Kind;
    use mezzo_base::{Interner, Span};

    struct Fixture {
        env: Env,
        interner: Interner,
        int: Var,
        bool_: Var,
    }

    impl Fixture {
        fn new() -> Self {
            let mut env = Env::new();
            let mut interner = Interner::new();
            let int = env.bind_datatype(interner.intern("int"), &[], Span::dummy());
            env.install_definition(
                int,
                Definition::Abstract,
                Some(Fact::Duplicable(ParamMask::empty())),
            );
            let bool_ = env.bind_datatype(interner.intern("bool"), &[], Span::dummy());
            env.install_definition(
                bool_,
                Definition::Abstract,
                Some(Fact::Duplicable(ParamMask::empty())),
            );
            Fixture {
                env,
                interner,
                int,
                bool_,
            }
        }
    }

    #[test]
    fn agreeing_branches_keep_the_permission() {
        let mut fx = Fixture::new();
        let x = fx
            .env
            .bind_rigid(fx.interner.intern("x"), Kind::Term, Span::dummy());
        let int = Type::Open(fx.int);
        let before = fx.env.clone();
        let left = add(before.clone(), x, &int, &fx.interner);
        let right = add(before.clone(), x, &int, &fx.interner);
        let lv = x;
        let rv = x;
        let (merged, _) = merge_envs(&before, (left, lv), (right, rv), None, &fx.interner);
        let sub = Subtractor::new(&fx.interner);
        assert!(sub.sub(&merged, x, &int).is_ok());
    }

    #[test]
    fn disagreeing_branches_drop_the_permission() {
        let mut fx = Fixture::new();
        let x = fx
            .env
            .bind_rigid(fx.interner.intern("x"), Kind::Term, Span::dummy());
        let int = Type::Open(fx.int);
        let bool_ = Type::Open(fx.bool_);
        let before = fx.env.clone();
        let left = add(before.clone(), x, &int, &fx.interner);
        let right = add(before.clone(), x, &bool_, &fx.interner);
        let (merged, _) = merge_envs(&before, (left, x), (right, x), None, &fx.interner);
        let sub = Subtractor::new(&fx.interner);
        assert!(sub.sub(&merged, x, &int).is_err());
        assert!(sub.sub(&merged, x, &bool_).is_err());
    }

    #[test]
    fn an_inconsistent_branch_is_dead() {
        let mut fx = Fixture::new();
        let x = fx
            .env
            .bind_rigid(fx.interner.intern("x"), Kind::Term, Span::dummy());
        let int = Type::Open(fx.int);
        let before = fx.env.clone();
        let live = add(before.clone(), x, &int, &fx.interner);
        let mut dead = before.clone();
        dead.mark_inconsistent();
        let (merged, _) =
            merge_envs(&before, (dead, x), (live, x), None, &fx.interner);
        let sub = Subtractor::new(&fx.interner);
        assert!(sub.sub(&merged, x, &int).is_ok());
        assert!(!merged.is_inconsistent());
    }

    #[test]
    fn one_sided_instantiations_are_rolled_back() {
        let mut fx = Fixture::new();
        let a = fx
            .env
            .bind_flexible(fx.interner.intern("a"), Kind::Type, Span::dummy());
        let before = fx.env.clone();
        let mut left = before.clone();
        assert!(left.instantiate_flexible(a, &Type::Open(fx.int)));
        let right = before.clone();
        let (merged, _) = merge_envs(&before, (left, a), (right, a), None, &fx.interner);
        assert!(merged.is_flexible(a));
    }

    #[test]
    fn agreeing_instantiations_are_kept() {
        let mut fx = Fixture::new();
        let a = fx
            .env
            .bind_flexible(fx.interner.intern("a"), Kind::Type, Span::dummy());
        let before = fx.env.clone();
        let mut left = before.clone();
        assert!(left.instantiate_flexible(a, &Type::Open(fx.int)));
        let mut right = before.clone();
        assert!(right.instantiate_flexible(a, &Type::Open(fx.int)));
        let (merged, _) = merge_envs(&before, (left, a), (right, a), None, &fx.interner);
        assert!(!merged.is_flexible(a));
        assert!(merged.equal(&Type::Open(a), &Type::Open(fx.int)));
    }

    #[test]
    fn annotation_biases_the_result_variable() {
        let mut fx = Fixture::new();
        let int = Type::Open(fx.int);
        let before = fx.env.clone();
        let mut left = before.clone();
        let lv = left.bind_rigid(fx.interner.intern("l"), Kind::Term, Span::dummy());
        let left = add(left, lv, &int, &fx.interner);
        let mut right = before.clone();
        let rv = right.bind_rigid(fx.interner.intern("r"), Kind::Term, Span::dummy());
        let right = add(right, rv, &int, &fx.interner);
        let (merged, d) =
            merge_envs(&before, (left, lv), (right, rv), Some(&int), &fx.interner);
        let sub = Subtractor::new(&fx.interner);
        assert!(sub.sub(&merged, d, &int).is_ok());
    }
}
