//! E2E tests: the driver — exit codes, include-path module resolution,
//! auto-includes, and interface matching. These run the real `run`
//! entry point over files in a temporary directory.

mod common;

use common::run_driver;
use mezzo::driver;

#[test]
fn a_good_program_exits_zero() {
    let code = run_driver(
        &[(
            "main.mz",
            "mutable data ref a = Ref { contents: a }\n\
             val go = let r = Ref { contents = 0 } in r.contents <- 1\n",
        )],
        |_| {},
    );
    assert_eq!(code, driver::EXIT_OK);
}

#[test]
fn a_missing_file_exits_255() {
    let code = run_driver(&[("main.mz", "val x = 3\n")], |opts| {
        opts.file = opts.file.with_file_name("absent.mz");
    });
    assert_eq!(code, driver::EXIT_NOT_FOUND);
}

#[test]
fn a_lexical_error_exits_250() {
    let code = run_driver(&[("main.mz", "val x = #\n")], |_| {});
    assert_eq!(code, driver::EXIT_LEXICAL);
}

#[test]
fn an_invalid_codepoint_exits_251() {
    let code = run_driver(&[("main.mz", "val x = \u{0007}\n")], |_| {});
    assert_eq!(code, driver::EXIT_INVALID_CODEPOINT);
}

#[test]
fn a_parse_error_exits_252() {
    let code = run_driver(&[("main.mz", "val x = let y = 1 y\n")], |_| {});
    assert_eq!(code, driver::EXIT_PARSE);
}

#[test]
fn a_kind_error_exits_253() {
    let code = run_driver(&[("main.mz", "val x = nowhere\n")], |_| {});
    assert_eq!(code, driver::EXIT_KIND);
}

#[test]
fn a_type_error_exits_254() {
    let code = run_driver(
        &[(
            "main.mz",
            "data box = Box { item: int }\n\
             val go = let b = Box { item = 0 } in b.item <- 1\n",
        )],
        |_| {},
    );
    assert_eq!(code, driver::EXIT_TYPE);
}

#[test]
fn a_missing_module_exits_255() {
    let code = run_driver(&[("main.mz", "open Nowhere\nval x = 3\n")], |_| {});
    assert_eq!(code, driver::EXIT_NOT_FOUND);
}

#[test]
fn qualified_access_through_an_interface() {
    let code = run_driver(
        &[
            ("main.mz", "val x = (Lib.n : int)\n"),
            ("Lib.mzi", "val n : int\n"),
        ],
        |_| {},
    );
    assert_eq!(code, driver::EXIT_OK);
}

#[test]
fn open_makes_imports_visible_unqualified() {
    let code = run_driver(
        &[
            ("main.mz", "open Lib\nval x = (n : int)\n"),
            ("Lib.mzi", "val n : int\n"),
        ],
        |_| {},
    );
    assert_eq!(code, driver::EXIT_OK);
}

#[test]
fn imported_abstract_types_carry_their_declared_facts() {
    let code = run_driver(
        &[
            (
                "main.mz",
                "open Lib\n\
                 val use = let f = fun (u: ()) : t = frozen in (f (), f ())\n",
            ),
            (
                "Lib.mzi",
                "abstract t\nfact duplicable t\nval frozen : t\n",
            ),
        ],
        |_| {},
    );
    assert_eq!(code, driver::EXIT_OK);
}

#[test]
fn auto_includes_are_opened_when_present() {
    let code = run_driver(
        &[
            ("main.mz", "val x = (origin : int)\n"),
            ("core.mzi", "val origin : int\n"),
        ],
        |_| {},
    );
    assert_eq!(code, driver::EXIT_OK);
}

#[test]
fn no_auto_include_disables_them() {
    let code = run_driver(
        &[
            ("main.mz", "val x = (origin : int)\n"),
            ("core.mzi", "val origin : int\n"),
        ],
        |opts| opts.auto_include = false,
    );
    assert_eq!(code, driver::EXIT_KIND);
}

#[test]
fn an_implementation_must_satisfy_its_interface() {
    let code = run_driver(
        &[
            ("main.mz", "val n = 3\n"),
            ("main.mzi", "val n : int\n"),
        ],
        |_| {},
    );
    assert_eq!(code, driver::EXIT_OK);
}

#[test]
fn a_missing_export_fails_the_interface_match() {
    let code = run_driver(
        &[
            ("main.mz", "val n = 3\n"),
            ("main.mzi", "val missing : int\n"),
        ],
        |_| {},
    );
    assert_eq!(code, driver::EXIT_TYPE);
}

#[test]
fn an_interface_checks_on_its_own() {
    let code = run_driver(&[("lone.mzi", "abstract t\nval x : t\n")], |_| {});
    assert_eq!(code, driver::EXIT_OK);
}

#[test]
fn consuming_a_dependency_export_is_detected() {
    let code = run_driver(
        &[
            (
                "main.mz",
                "open Lib\n\
                 mutable data pool = Pool {} adopts cell\n\
                 val go = let p = Pool {} in give shared to p\n",
            ),
            (
                "Lib.mzi",
                "mutable data cell = Cell { item: int }\n\
                 val shared : cell\n",
            ),
        ],
        |_| {},
    );
    assert_eq!(code, driver::EXIT_TYPE);
}
