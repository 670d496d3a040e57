//! The file-level driver.
//!
//! Runs one module through the pipeline: read, lex, parse, resolve
//! dependencies (interfaces found on the include path), kind-check,
//! translate, check, and finally match the result against the module's
//! own interface. Failures map to distinct exit codes per class:
//!
//! | code | class |
//! |------|------------------------|
//! | 0    | success                |
//! | 250  | lexical error          |
//! | 251  | invalid codepoint      |
//! | 252  | parse error            |
//! | 253  | kind error             |
//! | 254  | type error             |
//! | 255  | file not found         |
//!
//! Diagnostics are one line each: `file:span: rule: message`. Under
//! `--explain`, a permission error is followed by its failure
//! derivation.
//!
//! All state is explicit: the include path, the debug level, and the
//! per-invocation interface cache live in the [`Driver`] value.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use bumpalo::Bump;
use mezzo_base::{Interner, Span};
use mezzo_kernel::check::{Builtins, Checker};
use mezzo_kernel::env::{Env, Var};
use mezzo_kernel::error::TypeError;
use mezzo_kernel::sub::Subtractor;
use mezzo_kernel::ty::{Kind, Type};
use mezzo_language::ast::{AstContext, Item, Module};
use mezzo_language::kind::{KindChecker, ModuleExports, NameTable};
use mezzo_language::lexer::Lexer;
use mezzo_language::parser::Parser;
use mezzo_language::token::{Token, TokenType};
use mezzo_language::translate::{Tables, Translator};

pub const EXIT_OK: i32 = 0;
pub const EXIT_LEXICAL: i32 = 250;
pub const EXIT_INVALID_CODEPOINT: i32 = 251;
pub const EXIT_PARSE: i32 = 252;
pub const EXIT_KIND: i32 = 253;
pub const EXIT_TYPE: i32 = 254;
pub const EXIT_NOT_FOUND: i32 = 255;

/// Modules pulled in automatically when present on the include path.
const AUTO_INCLUDES: [&str; 2] = ["core", "pervasives"];

/// Everything the driver needs to know, from the CLI.
#[derive(Debug)]
pub struct Options {
    pub file: PathBuf,
    pub include: Vec<PathBuf>,
    pub auto_include: bool,
    pub debug: u8,
    pub explain: bool,
}

/// Check one module; returns the process exit code.
pub fn run(opts: &Options) -> i32 {
    let source = match fs::read_to_string(&opts.file) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("{}: file-not-found: {}", opts.file.display(), err);
            return EXIT_NOT_FOUND;
        }
    };
    let mut driver = Driver::new(opts);
    match driver.check_main(&source) {
        Ok(code) => code,
        Err(code) => code,
    }
}

/// What one loaded interface contributed, for cache reuse and for the
/// end-of-run perturbation check.
struct LoadedModule {
    exports: ModuleExports,
    /// Exported values with their declared core types.
    declared: Vec<(Var, Type)>,
}

struct Driver<'o> {
    opts: &'o Options,
    interner: Interner,
    env: Env,
    builtins: Builtins,
    tables: Tables,
    names: NameTable,
    /// Interface cache, keyed by module name, for this invocation.
    loaded: HashMap<String, LoadedModule>,
    loading: HashSet<String>,
}

impl<'o> Driver<'o> {
    fn new(opts: &'o Options) -> Self {
        let mut interner = Interner::new();
        let mut env = Env::new();
        let builtins = Builtins::install(&mut env, &mut interner);
        let mut tables = Tables::default();
        let names;
        {
            let mut tr = Translator::with_tables(&mut interner, std::mem::take(&mut tables));
            tr.install_builtins(&builtins);
            // The kind checker's view of the builtins is derived from the
            // same registration the translator sees; nothing is listed
            // twice.
            names = tr.name_table(&env);
            tables = tr.into_tables();
        }
        Driver {
            opts,
            interner,
            env,
            builtins,
            tables,
            names,
            loaded: HashMap::new(),
            loading: HashSet::new(),
        }
    }

    fn debug(&self, level: u8, msg: &str) {
        if self.opts.debug >= level {
            eprintln!("[mezzo:{}] {}", level, msg);
        }
    }

    fn diagnose(&self, file: &Path, span: Span, rule: &str, msg: &str) {
        eprintln!("{}:{}: {}: {}", file.display(), span, rule, msg);
    }

    // ── The main module ─────────────────────────────────────────────────

    fn check_main(&mut self, source: &str) -> Result<i32, i32> {
        let file = self.opts.file.clone();
        let tokens = self.lex(&file, source)?;

        // Dependencies first: auto-includes, then whatever the token
        // stream references.
        if self.opts.auto_include {
            for name in AUTO_INCLUDES {
                if self.find_interface(name).is_some() {
                    self.load_module(name)?;
                    // Auto-included modules are also auto-opened.
                    let sym = self.interner.intern(name);
                    if let Some(exports) = self.names.modules.get(&sym).cloned() {
                        self.names.open_module(&exports);
                    }
                    let mut tr = Translator::with_tables(
                        &mut self.interner,
                        std::mem::take(&mut self.tables),
                    );
                    let _ = tr.open_module(sym, Span::dummy());
                    self.tables = tr.into_tables();
                }
            }
        }
        for dep in scan_dependencies(&tokens, &self.interner) {
            self.load_module(&dep)?;
        }

        let bump = Bump::new();
        let ctx = AstContext::new(&bump);
        let module = match Parser::new(&tokens, ctx).parse_module() {
            Ok(m) => m,
            Err(err) => {
                self.diagnose(&file, err.span, "parse-error", &err.to_string());
                return Err(EXIT_PARSE);
            }
        };

        let interface_only = file.extension().is_some_and(|e| e == "mzi");
        if interface_only {
            // An interface checks on its own: names and kinds only.
            let mut checker =
                KindChecker::new(&self.interner, std::mem::take(&mut self.names));
            let result = checker.check_module(&module);
            self.names = std::mem::take(&mut checker.table);
            return match result {
                Ok(()) => Ok(EXIT_OK),
                Err(err) => {
                    self.diagnose(&file, err.span(), "kind-error", &err.to_string());
                    Err(EXIT_KIND)
                }
            };
        }

        let mut worst = EXIT_OK;
        for item in &module.items {
            if let Err(code) = self.check_item(&file, item) {
                // Kind errors abort their declaration, permission errors
                // their toplevel item; the driver continues either way.
                worst = worst.max(code);
            }
        }

        // The module's own interface, when present.
        let sibling = file.with_extension("mzi");
        if sibling.exists() {
            if let Err(code) = self.match_interface(&sibling) {
                worst = worst.max(code);
            }
        }

        // No dependency's exported permission may have been consumed.
        if let Err(code) = self.check_dependencies_unperturbed(&file) {
            worst = worst.max(code);
        }

        if worst == EXIT_OK {
            Ok(EXIT_OK)
        } else {
            Err(worst)
        }
    }

    fn lex(&mut self, file: &Path, source: &str) -> Result<Vec<Token>, i32> {
        match Lexer::new(source).tokenize(&mut self.interner) {
            Ok(tokens) => Ok(tokens),
            Err(err) => {
                let (rule, code) = if err.is_invalid_codepoint() {
                    ("invalid-codepoint", EXIT_INVALID_CODEPOINT)
                } else {
                    ("lexical-error", EXIT_LEXICAL)
                };
                self.diagnose(file, err.span(), rule, &err.to_string());
                Err(code)
            }
        }
    }

    fn check_item(&mut self, file: &Path, item: &Item<'_>) -> Result<(), i32> {
        // Kinds first; a kind error aborts this declaration.
        {
            let mut checker =
                KindChecker::new(&self.interner, std::mem::take(&mut self.names));
            let result = checker.check_item(item);
            self.names = std::mem::take(&mut checker.table);
            if let Err(err) = result {
                self.diagnose(file, err.span(), "kind-error", &err.to_string());
                return Err(EXIT_KIND);
            }
        }

        match item {
            Item::Open(name, span) => {
                let mut tr =
                    Translator::with_tables(&mut self.interner, std::mem::take(&mut self.tables));
                let result = tr.open_module(*name, *span);
                self.tables = tr.into_tables();
                if let Err(err) = result {
                    self.diagnose(file, err.span(), "kind-error", &err.to_string());
                    return Err(EXIT_KIND);
                }
                Ok(())
            }
            Item::DataGroup(defs) => {
                let mut tr =
                    Translator::with_tables(&mut self.interner, std::mem::take(&mut self.tables));
                let result = tr.bind_data_group(&mut self.env, defs);
                self.tables = tr.into_tables();
                match result {
                    Ok(vars) => {
                        self.debug(1, &format!("bound data group of {} types", vars.len()));
                        Ok(())
                    }
                    Err(err) => {
                        self.diagnose(file, err.span(), "kind-error", &err.to_string());
                        Err(EXIT_KIND)
                    }
                }
            }
            Item::ValDef { name, expr, span, .. } => {
                let mut tr =
                    Translator::with_tables(&mut self.interner, std::mem::take(&mut self.tables));
                let translated = tr.expr_toplevel(expr);
                self.tables = tr.into_tables();
                let core = match translated {
                    Ok(core) => core,
                    Err(err) => {
                        self.diagnose(file, err.span(), "kind-error", &err.to_string());
                        return Err(EXIT_KIND);
                    }
                };
                let mut checker = Checker::new(&self.interner, self.builtins);
                let mut scope = Vec::new();
                match checker.check(self.env.clone(), &mut scope, &core, None) {
                    Ok((env, v)) => {
                        self.env = env;
                        self.env.add_name(v, *name);
                        self.tables.values.insert(*name, v);
                        self.debug(1, &format!("checked val {}", self.interner.resolve(*name)));
                        Ok(())
                    }
                    Err(err) => {
                        self.report_type_error(file, *span, &err);
                        Err(EXIT_TYPE)
                    }
                }
            }
            // Declaration forms inside an implementation act as axioms.
            Item::ValDecl { name, ty, span } => self
                .install_val_decl(*name, ty, *span)
                .map_err(|err| {
                    self.diagnose(file, err.span(), "kind-error", &err.to_string());
                    EXIT_KIND
                })
                .map(|_| ()),
            Item::AbstractDecl { name, params, span } => {
                let mut tr =
                    Translator::with_tables(&mut self.interner, std::mem::take(&mut self.tables));
                tr.declare_abstract(&mut self.env, *name, params, *span);
                self.tables = tr.into_tables();
                Ok(())
            }
            Item::FactDecl { demand, ty, span } => {
                let mut tr =
                    Translator::with_tables(&mut self.interner, std::mem::take(&mut self.tables));
                let result = tr.declare_fact(&mut self.env, *demand, ty);
                self.tables = tr.into_tables();
                result.map_err(|err| {
                    self.diagnose(file, err.span().merge(*span), "kind-error", &err.to_string());
                    EXIT_KIND
                })
            }
        }
    }

    fn report_type_error(&self, file: &Path, fallback: Span, err: &TypeError) {
        let span = if err.span().is_dummy() {
            fallback
        } else {
            err.span()
        };
        self.diagnose(file, span, err.rule(), &err.to_string());
        if self.opts.explain {
            if let Some(derivation) = err.derivation() {
                eprint!("{}", derivation);
            }
        }
    }

    /// Bind a declared value: `val x : t` installs a variable holding the
    /// type, `val x @ p`-style permission declarations float.
    fn install_val_decl(
        &mut self,
        name: mezzo_base::Symbol,
        ty: &mezzo_language::ast::TypeExpr<'_>,
        span: Span,
    ) -> Result<Var, mezzo_language::kind::KindError> {
        let mut tr =
            Translator::with_tables(&mut self.interner, std::mem::take(&mut self.tables));
        let mut scope = Vec::new();
        let translated = tr.ty(&mut scope, ty);
        self.tables = tr.into_tables();
        let t = translated?;
        let v = self.env.bind_rigid(name, Kind::Term, span);
        if t.is_perm() {
            self.env.add_floating_perm(t);
        } else {
            self.env = mezzo_kernel::add::add(self.env.clone(), v, &t, &self.interner);
        }
        self.tables.values.insert(name, v);
        Ok(v)
    }

    // ── Module loading ──────────────────────────────────────────────────

    fn find_interface(&self, name: &str) -> Option<PathBuf> {
        for dir in &self.opts.include {
            let candidate = dir.join(format!("{}.mzi", name));
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    /// Load a module's interface (cached per invocation) and register it
    /// for qualified access and `open`.
    fn load_module(&mut self, name: &str) -> Result<(), i32> {
        if self.loaded.contains_key(name) {
            return Ok(());
        }
        if !self.loading.insert(name.to_string()) {
            eprintln!("{}: kind-error: cyclic module dependency", name);
            return Err(EXIT_KIND);
        }
        let path = match self.find_interface(name) {
            Some(p) => p,
            None => {
                eprintln!(
                    "{}: file-not-found: no {}.mzi on the include path",
                    name, name
                );
                return Err(EXIT_NOT_FOUND);
            }
        };
        self.debug(1, &format!("loading interface {}", path.display()));
        let source = fs::read_to_string(&path).map_err(|err| {
            eprintln!("{}: file-not-found: {}", path.display(), err);
            EXIT_NOT_FOUND
        })?;
        let tokens = self.lex(&path, &source)?;

        // An interface's own dependencies first.
        for dep in scan_dependencies(&tokens, &self.interner) {
            if dep != name {
                self.load_module(&dep)?;
            }
        }

        let bump = Bump::new();
        let ctx = AstContext::new(&bump);
        let module = Parser::new(&tokens, ctx).parse_module().map_err(|err| {
            self.diagnose(&path, err.span, "parse-error", &err.to_string());
            EXIT_PARSE
        })?;

        let (exports, declared) = self.install_interface(&path, &module)?;
        let name_sym = self.interner.intern(name);
        self.names.modules.insert(name_sym, exports.clone());
        let bindings = module_bindings_of(&self.tables, &exports);
        self.tables.modules.insert(name_sym, bindings);
        self.loaded.insert(
            name.to_string(),
            LoadedModule { exports, declared },
        );
        self.loading.remove(name);
        Ok(())
    }

    /// Install an interface's declarations into the shared environment,
    /// returning its kind-level exports and declared value permissions.
    fn install_interface(
        &mut self,
        path: &Path,
        module: &Module<'_>,
    ) -> Result<(ModuleExports, Vec<(Var, Type)>), i32> {
        let names_before = self.names.clone();
        {
            let mut checker =
                KindChecker::new(&self.interner, std::mem::take(&mut self.names));
            let result = checker.check_module(module);
            self.names = std::mem::take(&mut checker.table);
            if let Err(err) = result {
                self.diagnose(path, err.span(), "kind-error", &err.to_string());
                return Err(EXIT_KIND);
            }
        }
        let mut declared = Vec::new();
        for item in &module.items {
            match item {
                Item::Open(name, span) => {
                    let mut tr = Translator::with_tables(
                        &mut self.interner,
                        std::mem::take(&mut self.tables),
                    );
                    let result = tr.open_module(*name, *span);
                    self.tables = tr.into_tables();
                    if let Err(err) = result {
                        self.diagnose(path, err.span(), "kind-error", &err.to_string());
                        return Err(EXIT_KIND);
                    }
                }
                Item::DataGroup(defs) => {
                    let mut tr = Translator::with_tables(
                        &mut self.interner,
                        std::mem::take(&mut self.tables),
                    );
                    let result = tr.bind_data_group(&mut self.env, defs);
                    self.tables = tr.into_tables();
                    if let Err(err) = result {
                        self.diagnose(path, err.span(), "kind-error", &err.to_string());
                        return Err(EXIT_KIND);
                    }
                }
                Item::AbstractDecl { name, params, span } => {
                    let mut tr = Translator::with_tables(
                        &mut self.interner,
                        std::mem::take(&mut self.tables),
                    );
                    tr.declare_abstract(&mut self.env, *name, params, *span);
                    self.tables = tr.into_tables();
                }
                Item::FactDecl { demand, ty, .. } => {
                    let mut tr = Translator::with_tables(
                        &mut self.interner,
                        std::mem::take(&mut self.tables),
                    );
                    let result = tr.declare_fact(&mut self.env, *demand, ty);
                    self.tables = tr.into_tables();
                    if let Err(err) = result {
                        self.diagnose(path, err.span(), "kind-error", &err.to_string());
                        return Err(EXIT_KIND);
                    }
                }
                Item::ValDecl { name, ty, span } => {
                    let v = self.install_val_decl(*name, ty, *span).map_err(|err| {
                        self.diagnose(path, err.span(), "kind-error", &err.to_string());
                        EXIT_KIND
                    })?;
                    // Remember the declared shape for the perturbation
                    // check at the end of the run.
                    let mut tr = Translator::with_tables(
                        &mut self.interner,
                        std::mem::take(&mut self.tables),
                    );
                    let mut scope = Vec::new();
                    let t = tr.ty(&mut scope, ty);
                    self.tables = tr.into_tables();
                    if let Ok(t) = t {
                        if !t.is_perm() {
                            declared.push((v, t));
                        }
                    }
                }
                Item::ValDef { span, .. } => {
                    self.diagnose(
                        path,
                        *span,
                        "kind-error",
                        "value definitions are not allowed in an interface",
                    );
                    return Err(EXIT_KIND);
                }
            }
        }
        // The module's exports are what it added on top of the base.
        let mut exports = ModuleExports::default();
        for (sym, kind) in &self.names.types {
            if !names_before.types.contains_key(sym) {
                exports.types.insert(*sym, kind.clone());
            }
        }
        for (sym, fields) in &self.names.datacons {
            if !names_before.datacons.contains_key(sym) {
                exports.datacons.insert(*sym, fields.clone());
            }
        }
        for sym in &self.names.values {
            if !names_before.values.contains(sym) {
                exports.values.insert(*sym);
            }
        }
        Ok((exports, declared))
    }

    // ── Interface compatibility ─────────────────────────────────────────

    /// Match the checked implementation against its own interface: every
    /// exported name must exist with the declared kind, and the final
    /// permission must subtract against the declared type.
    fn match_interface(&mut self, path: &Path) -> Result<(), i32> {
        let source = fs::read_to_string(path).map_err(|err| {
            eprintln!("{}: file-not-found: {}", path.display(), err);
            EXIT_NOT_FOUND
        })?;
        let tokens = self.lex(path, &source)?;
        let bump = Bump::new();
        let ctx = AstContext::new(&bump);
        let module = Parser::new(&tokens, ctx).parse_module().map_err(|err| {
            self.diagnose(path, err.span, "parse-error", &err.to_string());
            EXIT_PARSE
        })?;

        for item in &module.items {
            match item {
                Item::ValDecl { name, ty, span } => {
                    let v = match self.tables.values.get(name) {
                        Some(&v) => v,
                        None => {
                            self.diagnose(
                                path,
                                *span,
                                "interface-mismatch",
                                &format!(
                                    "no definition for exported value {}",
                                    self.interner.resolve(*name)
                                ),
                            );
                            return Err(EXIT_TYPE);
                        }
                    };
                    let mut tr = Translator::with_tables(
                        &mut self.interner,
                        std::mem::take(&mut self.tables),
                    );
                    let mut scope = Vec::new();
                    let translated = tr.ty(&mut scope, ty);
                    self.tables = tr.into_tables();
                    let t = translated.map_err(|err| {
                        self.diagnose(path, err.span(), "kind-error", &err.to_string());
                        EXIT_KIND
                    })?;
                    let sub = Subtractor::new(&self.interner);
                    match sub.sub(&self.env, v, &t) {
                        Ok(env) => {
                            // Re-add so a later export can use it too.
                            self.env =
                                mezzo_kernel::add::add(env, v, &t, &self.interner);
                        }
                        Err(derivation) => {
                            self.report_type_error(
                                path,
                                *span,
                                &TypeError::ExpectedPermission {
                                    var: self.interner.resolve(*name).to_string(),
                                    expected: "the declared interface type".to_string(),
                                    span: *span,
                                    derivation,
                                },
                            );
                            return Err(EXIT_TYPE);
                        }
                    }
                }
                Item::AbstractDecl { name, span, .. } => {
                    if !self.tables.types.contains_key(name) {
                        self.diagnose(
                            path,
                            *span,
                            "interface-mismatch",
                            &format!(
                                "no definition for exported type {}",
                                self.interner.resolve(*name)
                            ),
                        );
                        return Err(EXIT_TYPE);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Re-verify that nothing consumed a dependency's exported
    /// non-duplicable permission.
    fn check_dependencies_unperturbed(&mut self, file: &Path) -> Result<(), i32> {
        let declared: Vec<(String, Var, Type)> = self
            .loaded
            .iter()
            .flat_map(|(name, m)| {
                m.declared
                    .iter()
                    .map(move |(v, t)| (name.clone(), *v, t.clone()))
            })
            .collect();
        let sub = Subtractor::new(&self.interner);
        for (module, v, t) in declared {
            if sub.sub(&self.env, v, &t).is_err() {
                self.diagnose(
                    file,
                    Span::dummy(),
                    "interface-perturbed",
                    &format!(
                        "an exported permission of module {} was consumed",
                        module
                    ),
                );
                return Err(EXIT_TYPE);
            }
        }
        Ok(())
    }
}

/// Scan a token stream for the module names it references: `open M` and
/// qualified `M.x` uses.
fn scan_dependencies(tokens: &[Token], interner: &Interner) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut deps = Vec::new();
    for window in tokens.windows(2) {
        let name = match (window[0].ty, window[1].ty) {
            (TokenType::Open, TokenType::Upper(sym)) => Some(sym),
            (TokenType::Upper(sym), TokenType::Dot) => Some(sym),
            _ => None,
        };
        if let Some(sym) = name {
            let text = interner.resolve(sym).to_string();
            if seen.insert(text.clone()) {
                deps.push(text);
            }
        }
    }
    deps
}

/// Project a module's kind-level exports onto the translator bindings
/// installed for it.
fn module_bindings_of(
    tables: &Tables,
    exports: &ModuleExports,
) -> mezzo_language::translate::ModuleBindings {
    let mut bindings = mezzo_language::translate::ModuleBindings::default();
    for sym in exports.types.keys() {
        if let Some(&v) = tables.types.get(sym) {
            bindings.types.insert(*sym, v);
        }
    }
    for sym in exports.datacons.keys() {
        if let Some(dc) = tables.datacons.get(sym) {
            bindings.datacons.insert(*sym, dc.clone());
        }
    }
    for sym in &exports.values {
        if let Some(&v) = tables.values.get(sym) {
            bindings.values.insert(*sym, v);
        }
    }
    bindings
}
