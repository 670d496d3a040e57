//! E2E tests: merging environments at control-flow joins.

mod common;

use common::{assert_checks, assert_type_error};
use mezzo_kernel::sub::Subtractor;
use mezzo_kernel::ty::Type;

#[test]
fn both_branches_agreeing_keeps_the_permission() {
    let checked = assert_checks(
        "val go = let b = True in \
                  let x = if b then 1 else 2 in \
                  (x : int)",
    );
    assert!(!checked.env.is_inconsistent());
}

#[test]
fn branches_with_different_types_lose_the_permission() {
    assert_type_error(
        "val go = let b = True in \
                  let x = if b then 1 else False in \
                  (x : int)",
    );
}

#[test]
fn a_frame_permission_consumed_in_one_branch_does_not_survive() {
    assert_type_error(
        "mutable data ref a = Ref { contents: a }\n\
         mutable data pool = Pool {} adopts ref int\n\
         val go = let b = True in \
                  let r = Ref { contents = 0 } in \
                  let p = Pool {} in \
                  let u = if b then give r to p else () in \
                  r.contents <- 1",
    );
}

#[test]
fn frame_permissions_untouched_by_both_branches_survive() {
    assert_checks(
        "mutable data ref a = Ref { contents: a }\n\
         val go = let b = True in \
                  let r = Ref { contents = 0 } in \
                  let x = if b then 1 else 2 in \
                  r.contents <- x",
    );
}

#[test]
fn match_refines_and_merges_branchwise() {
    assert_checks(
        "data list a = Nil | Cons { head: a; tail: list a }\n\
         val xs = Cons { head = 1; tail = Nil }\n\
         val n = match xs with \
                 | Cons { head = h; tail = t } -> h \
                 | Nil -> 0 \
                 end\n\
         val use = (n : int)",
    );
}

#[test]
fn impossible_arms_are_skipped_not_reported() {
    // xs is known to be Cons; the Nil arm is dead and checks vacuously
    // even though its body would otherwise be ill-typed.
    assert_checks(
        "data list a = Nil | Cons { head: a; tail: list a }\n\
         val xs = Cons { head = 1; tail = Nil }\n\
         val n = match xs with \
                 | Cons { head = h; tail = t } -> h \
                 | Nil -> (0 : bool) \
                 end",
    );
}

#[test]
fn an_annotation_biases_the_join() {
    let checked = assert_checks(
        "val go = let b = True in \
                  ((if b then 1 else 2) : int)",
    );
    let int = checked.types["int"];
    let go = checked.values["go"];
    let sub = Subtractor::new(&checked.interner);
    assert!(sub.sub(&checked.env, go, &Type::Open(int)).is_ok());
}

#[test]
fn if_requires_a_two_constructor_scrutinee() {
    assert_type_error(
        "val go = let n = 3 in if n then 1 else 2",
    );
}
