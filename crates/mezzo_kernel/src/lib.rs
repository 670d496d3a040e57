//! # mezzo-kernel
//!
//! The type-and-permission checker at the heart of the mezzo front-end.
//!
//! Mezzo programs carry *permissions*: consumable, check-time assertions of
//! the form `x @ t` ("the value named x may be used at type t"). The kernel
//! decides whether a program's permission flow is coherent:
//!
//! - [`ty`] — the internal type representation: locally nameless, with
//!   de Bruijn indices under quantifiers and [`Var`](env::Var) references
//!   into the environment everywhere else
//! - [`env`] — the typing environment: one record per variable, holding its
//!   permission list, rigid/flexible state, and (for type variables) its
//!   data-type definition, fact, and variance vector
//! - [`fact`] — the fixed point deciding whether each algebraic data type is
//!   duplicable, exclusive, or affine
//! - [`sub`] — subtraction: can a wanted permission be extracted from the
//!   environment, instantiating flexible variables along the way?
//! - [`add`] — addition: assimilate a produced permission, unfolding
//!   structure and detecting contradictions
//! - [`merge`] — reconcile two environments at a control-flow join
//! - [`check`] — the bidirectional expression checker driving all of the
//!   above
//! - [`expr`] — the core expression syntax the checker walks
//! - [`error`] — typed checker errors with failure derivations
//! - [`print`] — rendering of types and errors with resolved names
//!
//! The kernel is strictly sequential and deterministic. Environments are
//! values: every tentative step clones, and a failed attempt leaves the
//! caller's environment untouched.

pub mod add;
pub mod check;
pub mod env;
pub mod error;
pub mod expr;
pub mod fact;
pub mod merge;
pub mod print;
pub mod sub;
pub mod ty;

pub use check::{check_expr, Builtins, Checker};
pub use env::{Env, Var};
pub use error::{Derivation, TypeError, TypeResult};
pub use fact::{infer_facts, Fact};
pub use ty::{Kind, Type};
