//! E2E tests: fact inference over whole programs.
//!
//! Checks that definitions arriving through the full pipeline get the
//! duplicable / exclusive / affine facts the kernel should infer.

mod common;

use common::assert_checks;
use mezzo_kernel::fact::{is_duplicable, is_exclusive, Fact, ParamMask};
use mezzo_kernel::ty::Type;

#[test]
fn list_is_duplicable_when_its_parameter_is() {
    let checked = assert_checks("data list a = Nil | Cons { head: a; tail: list a }");
    let list = checked.types["list"];
    assert_eq!(
        checked.env.fact(list),
        Some(&Fact::Duplicable(ParamMask::singleton(0)))
    );

    let int = checked.types["int"];
    let list_int = Type::App(Box::new(Type::Open(list)), vec![Type::Open(int)]);
    assert!(is_duplicable(&checked.env, &list_int));
}

#[test]
fn list_of_refs_is_affine() {
    let checked = assert_checks(
        "mutable data ref a = Ref { contents: a }\n\
         data list a = Nil | Cons { head: a; tail: list a }",
    );
    let list = checked.types["list"];
    let r = checked.types["ref"];
    let int = checked.types["int"];
    let ref_int = Type::App(Box::new(Type::Open(r)), vec![Type::Open(int)]);
    let list_ref = Type::App(Box::new(Type::Open(list)), vec![ref_int]);
    assert!(!is_duplicable(&checked.env, &list_ref));
    assert!(!is_exclusive(&checked.env, &list_ref));
}

#[test]
fn mutable_data_is_exclusive() {
    let checked = assert_checks("mutable data ref a = Ref { contents: a }");
    let r = checked.types["ref"];
    assert_eq!(checked.env.fact(r), Some(&Fact::Exclusive));
}

#[test]
fn container_of_an_exclusive_type_is_affine() {
    let checked = assert_checks(
        "mutable data cell = Cell { item: int }\n\
         data holder = Holder { inner: cell }",
    );
    let holder = checked.types["holder"];
    assert_eq!(checked.env.fact(holder), Some(&Fact::Affine));
}

#[test]
fn mutually_recursive_groups_reach_a_fixed_point() {
    let checked = assert_checks(
        "data tree a = Leaf | Node { item: a; kids: forest a }\n\
         and forest a = FNil | FCons { head: tree a; tail: forest a }",
    );
    let tree = checked.types["tree"];
    let forest = checked.types["forest"];
    assert_eq!(
        checked.env.fact(tree),
        Some(&Fact::Duplicable(ParamMask::singleton(0)))
    );
    assert_eq!(
        checked.env.fact(forest),
        Some(&Fact::Duplicable(ParamMask::singleton(0)))
    );
}

#[test]
fn duplicable_permissions_survive_repeated_use() {
    // A duplicable value can be consumed twice.
    let checked = assert_checks(
        "val n = 3\n\
         val a = (n : int)\n\
         val b = (n : int)",
    );
    assert!(!checked.env.is_inconsistent());
}
