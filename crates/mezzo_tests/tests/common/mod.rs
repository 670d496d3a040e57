//! E2E test harness.
//!
//! Drives source text through the full pipeline — lex, parse, kind
//! check, translate, check — and hands back the final environment plus
//! lookup maps, so tests can assert on facts, permissions, and errors.
//! A second entry point runs the installed driver against real files in
//! a temporary directory to test exit codes and module resolution.

use std::collections::HashMap;

use bumpalo::Bump;
use mezzo_base::Interner;
use mezzo_kernel::check::{Builtins, Checker};
use mezzo_kernel::env::{Env, Var};
use mezzo_language::ast::{AstContext, Item};
use mezzo_language::kind::KindChecker;
use mezzo_language::lexer::Lexer;
use mezzo_language::parser::Parser;
use mezzo_language::translate::Translator;

/// The outcome of checking a program: the final environment and maps
/// from source names to environment variables.
pub struct Checked {
    pub env: Env,
    pub interner: Interner,
    pub builtins: Builtins,
    pub values: HashMap<String, Var>,
    pub types: HashMap<String, Var>,
}

/// Run a whole program through the pipeline.
#[allow(dead_code)]
pub fn check_program(src: &str) -> Result<Checked, String> {
    let mut interner = Interner::new();
    let tokens = Lexer::new(src)
        .tokenize(&mut interner)
        .map_err(|e| format!("lex: {}", e))?;

    let bump = Bump::new();
    let ctx = AstContext::new(&bump);
    let module = Parser::new(&tokens, ctx)
        .parse_module()
        .map_err(|e| format!("parse: {}", e))?;

    let mut env = Env::new();
    let builtins = Builtins::install(&mut env, &mut interner);

    // The kind checker's table is derived from the translator's builtin
    // registration, exactly as the driver derives its own; the harness
    // cannot drift from what `install_builtins` actually registers.
    let table;
    let tables;
    {
        let mut tr = Translator::new(&mut interner);
        tr.install_builtins(&builtins);
        table = tr.name_table(&env);
        tables = tr.into_tables();
    }
    let mut kinds = KindChecker::new(&interner, table);
    kinds
        .check_module(&module)
        .map_err(|e| format!("kind: {}", e))?;

    let mut tr = Translator::with_tables(&mut interner, tables);
    for item in &module.items {
        match item {
            Item::DataGroup(defs) => {
                tr.bind_data_group(&mut env, defs)
                    .map_err(|e| format!("kind: {}", e))?;
            }
            Item::ValDef { name, expr, .. } => {
                let core = tr
                    .expr_toplevel(expr)
                    .map_err(|e| format!("kind: {}", e))?;
                let mut checker = Checker::new(tr.interner(), builtins);
                let mut scope = Vec::new();
                let (e2, v) = checker
                    .check(env.clone(), &mut scope, &core, None)
                    .map_err(|e| format!("type: {}", e))?;
                env = e2;
                tr.values.insert(*name, v);
            }
            _ => {}
        }
    }

    let values = tr
        .values
        .iter()
        .map(|(sym, v)| (tr.interner().resolve(*sym).to_string(), *v))
        .collect();
    let type_vars = tr
        .types
        .iter()
        .map(|(sym, v)| (tr.interner().resolve(*sym).to_string(), *v))
        .collect();
    drop(tr);
    Ok(Checked {
        env,
        interner,
        builtins,
        values,
        types: type_vars,
    })
}

/// The program must check.
#[allow(dead_code)]
pub fn assert_checks(src: &str) -> Checked {
    match check_program(src) {
        Ok(checked) => checked,
        Err(err) => panic!("program should check, got: {}\n{}", err, src),
    }
}

/// The program must be rejected by the type checker (not the earlier
/// phases).
#[allow(dead_code)]
pub fn assert_type_error(src: &str) -> String {
    match check_program(src) {
        Ok(_) => panic!("program should be rejected:\n{}", src),
        Err(err) => {
            assert!(
                err.starts_with("type:"),
                "expected a type error, got: {}\n{}",
                err,
                src
            );
            err
        }
    }
}

/// Run the real driver over files written to a temporary directory.
/// `files` is a list of (name, contents); the first entry is checked.
#[allow(dead_code)]
pub fn run_driver(files: &[(&str, &str)], extra: impl FnOnce(&mut mezzo::driver::Options)) -> i32 {
    let dir = tempfile::tempdir().expect("create temp dir");
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).expect("write module");
    }
    let mut opts = mezzo::driver::Options {
        file: dir.path().join(files[0].0),
        include: vec![dir.path().to_path_buf()],
        auto_include: true,
        debug: 0,
        explain: false,
    };
    extra(&mut opts);
    mezzo::driver::run(&opts)
}
