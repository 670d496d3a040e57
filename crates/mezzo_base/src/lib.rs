//! # mezzo-base
//!
//! The two atoms shared by every tier of the mezzo front-end:
//!
//! - [`Span`] — byte-range source locations, with a dummy location for
//!   synthesized nodes that merge as an identity
//! - [`Interner`]/[`Symbol`] — name interning, with the empty name
//!   reserved for kernel-invented variables
//!
//! Everything else is deliberately absent. Errors are layered enums in
//! the crates that raise them, and the surface tree allocates straight
//! from a bump allocator owned by the parse; neither wants a generic
//! wrapper here.

pub mod intern;
pub mod span;

pub use intern::{Interner, Symbol};
pub use span::Span;
