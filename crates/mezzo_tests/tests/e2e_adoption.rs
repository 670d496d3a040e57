//! E2E tests: adoption — `give`, `take`, `owns`.

mod common;

use common::{assert_checks, assert_type_error};

#[test]
fn give_then_take_round_trips_ownership() {
    assert_checks(
        "mutable data cell = Cell { item: int }\n\
         mutable data pool = Pool {} adopts cell\n\
         val go = let c = Cell { item = 0 } in \
                  let p = Pool {} in \
                  give c to p; \
                  take c from p; \
                  c.item <- 1",
    );
}

#[test]
fn giving_consumes_the_exclusive_permission() {
    assert_type_error(
        "mutable data cell = Cell { item: int }\n\
         mutable data pool = Pool {} adopts cell\n\
         val go = let c = Cell { item = 0 } in \
                  let p = Pool {} in \
                  give c to p; \
                  c.item <- 1",
    );
}

#[test]
fn taking_requires_a_dynamic_witness() {
    assert_type_error(
        "mutable data cell = Cell { item: int }\n\
         mutable data pool = Pool {} adopts cell\n\
         val go = let c = Cell { item = 0 } in \
                  let p = Pool {} in \
                  take c from p",
    );
}

#[test]
fn giving_to_a_type_without_an_adopts_clause_is_rejected() {
    assert_type_error(
        "mutable data cell = Cell { item: int }\n\
         mutable data pool = Pool {}\n\
         val go = let c = Cell { item = 0 } in \
                  let p = Pool {} in \
                  give c to p",
    );
}

#[test]
fn an_adopts_clause_must_be_exclusive() {
    assert_type_error(
        "mutable data pool = Pool {} adopts int\n\
         val go = let n = 3 in \
                  let p = Pool {} in \
                  give n to p",
    );
}

#[test]
fn owns_needs_an_exclusive_adopter_and_a_dynamic_adoptee() {
    assert_checks(
        "mutable data cell = Cell { item: int }\n\
         mutable data pool = Pool {} adopts cell\n\
         val go = let c = Cell { item = 0 } in \
                  let p = Pool {} in \
                  give c to p; \
                  let b = p owns c in (b : bool)",
    );
}

#[test]
fn owns_on_a_non_dynamic_value_is_rejected() {
    assert_type_error(
        "mutable data pool = Pool {}\n\
         val go = let n = 3 in \
                  let p = Pool {} in \
                  let b = p owns n in b",
    );
}
