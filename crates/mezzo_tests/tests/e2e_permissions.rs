//! E2E tests: exclusive permissions through whole programs.
//!
//! The `ref` scenarios: reading and writing an exclusive cell is fine in
//! straight-line code, but a closure may not capture the exclusive
//! permission.

mod common;

use common::{assert_checks, assert_type_error};

#[test]
fn read_then_write_through_a_ref() {
    assert_checks(
        "mutable data ref a = Ref { contents: a }\n\
         val go = let r = Ref { contents = 0 } in \
                  let x = r.contents in \
                  r.contents <- 1",
    );
}

#[test]
fn two_writes_in_sequence() {
    assert_checks(
        "mutable data ref a = Ref { contents: a }\n\
         val go = let r = Ref { contents = 0 } in \
                  r.contents <- 1; r.contents <- 2",
    );
}

#[test]
fn a_closure_cannot_capture_an_exclusive_ref() {
    assert_type_error(
        "mutable data ref a = Ref { contents: a }\n\
         val go = let r = Ref { contents = 0 } in \
                  let f = fun (u: ()) : int = begin r.contents <- 1; 0 end in \
                  f ()",
    );
}

#[test]
fn a_closure_may_capture_a_duplicable_value() {
    assert_checks(
        "val go = let n = 3 in \
                  let f = fun (u: ()) : int = n in \
                  f ()",
    );
}

#[test]
fn assignment_through_immutable_data_is_rejected() {
    assert_type_error(
        "data box = Box { item: int }\n\
         val go = let b = Box { item = 0 } in b.item <- 1",
    );
}

#[test]
fn tag_update_preserves_field_count() {
    assert_checks(
        "mutable data slot = Free { junk: int } | Used { item: int }\n\
         val go = let s = Free { junk = 0 } in tag of s <- Used",
    );
}

#[test]
fn tag_update_with_different_field_count_is_rejected() {
    assert_type_error(
        "mutable data slot = Empty {} | Used { item: int }\n\
         val go = let s = Used { item = 1 } in tag of s <- Empty",
    );
}

#[test]
fn field_access_on_a_missing_field_is_rejected() {
    assert_type_error(
        "mutable data ref a = Ref { contents: a }\n\
         val go = let r = Ref { contents = 0 } in r.missing",
    );
}

#[test]
fn annotations_refold_structural_permissions() {
    assert_checks(
        "mutable data ref a = Ref { contents: a }\n\
         val go = let r = Ref { contents = 0 } in (r : ref int)",
    );
}

#[test]
fn a_function_can_consume_and_return_a_ref() {
    assert_checks(
        "mutable data ref a = Ref { contents: a }\n\
         val bump = fun (r: ref int) : () = r.contents <- 1\n\
         val go = let r = Ref { contents = 0 } in bump r",
    );
}

#[test]
fn an_exclusive_argument_is_consumed_by_the_call() {
    assert_type_error(
        "mutable data ref a = Ref { contents: a }\n\
         val burn = fun (r: ref int) : () = ()\n\
         val go = let r = Ref { contents = 0 } in \
                  burn r; r.contents <- 1",
    );
}

#[test]
fn fail_checks_anything_afterwards() {
    assert_checks(
        "val go = let x = fail in (x : bool)",
    );
}
