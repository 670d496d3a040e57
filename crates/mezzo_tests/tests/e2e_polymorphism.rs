//! E2E tests: quantifiers, instantiation, and arrow subsumption.

mod common;

use common::{assert_checks, assert_type_error};

#[test]
fn a_polymorphic_identity_applies_at_int() {
    assert_checks(
        "val id = fun [a] (x: a) : =x = x\n\
         val y = (id 3 : int)",
    );
}

#[test]
fn explicit_type_application_instantiates_the_head_binder() {
    assert_checks(
        "val id = fun [a] (x: a) : =x = x\n\
         val y = let f = id [int] in (f 3 : int)",
    );
}

#[test]
fn a_function_is_usable_at_a_wider_return_type() {
    // (int) -> int provides (int) -> unknown: codomains are covariant.
    assert_checks(
        "val use = fun (f: (x: int) -> unknown) : int = 0\n\
         val narrow = fun (x: int) : int = x\n\
         val ok = use narrow",
    );
}

#[test]
fn a_function_is_not_usable_at_a_narrower_return_type() {
    assert_type_error(
        "val use = fun (f: (x: int) -> int) : int = 0\n\
         val wide = fun (x: int) : unknown = 0\n\
         val bad = use wide",
    );
}

#[test]
fn an_existential_package_is_produced_by_weakening() {
    assert_checks("val boxed = (3 : {a} a)");
}

#[test]
fn singleton_return_types_track_identity() {
    assert_checks(
        "val pick = fun (x: int) : =x = x\n\
         val y = let n = 3 in let m = pick n in (m : =n)",
    );
}

#[test]
fn duplicable_constraints_are_checked_at_call_sites() {
    // share duplicates its argument; it demands a duplicable type.
    assert_checks(
        "val share = fun [a] (x: duplicable a /\\ a) : (=x, =x) = (x, x)\n\
         val ok = share 3",
    );
}

#[test]
fn tuples_check_component_wise() {
    assert_checks(
        "val p = (1, 2)\n\
         val q = (p : (int, int))",
    );
    assert_type_error(
        "val p = (1, 2)\n\
         val q = (p : (int, int, int))",
    );
}
