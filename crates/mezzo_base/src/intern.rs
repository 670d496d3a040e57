//! Name interning.
//!
//! Kind checking and the permission-list search compare variable, field,
//! constructor, and module names constantly; interning turns each
//! distinct name into a [`Symbol`] handle so those comparisons are
//! integer equality. The empty name is special: variables the kernel
//! invents (unfolded fields, desugared intermediates, join results) are
//! bound under [`Symbol::EMPTY`] and the printer renders them from their
//! environment index instead.

use std::collections::HashMap;

/// An interned name. The default is the empty name of a synthesized
/// variable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// The empty name, carried by every kernel-invented variable.
    pub const EMPTY: Symbol = Symbol(0);

    /// Position in the intern table, for dense side tables and for
    /// printing nameless variables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// The intern table. One per checker invocation; symbols from different
/// tables must never meet.
pub struct Interner {
    symbols: HashMap<Box<str>, Symbol>,
    texts: Vec<Box<str>>,
}

impl Interner {
    /// A table holding only the empty name.
    pub fn new() -> Self {
        Interner {
            symbols: HashMap::new(),
            texts: vec![Box::from("")],
        }
    }

    /// Intern a name. The same text always yields the same symbol.
    pub fn intern(&mut self, text: &str) -> Symbol {
        if let Some(&sym) = self.symbols.get(text) {
            return sym;
        }
        let sym = Symbol(self.texts.len() as u32);
        self.texts.push(Box::from(text));
        self.symbols.insert(Box::from(text), sym);
        sym
    }

    /// The text behind a symbol.
    ///
    /// # Panics
    ///
    /// Panics if `sym` came from a different table.
    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.texts[sym.0 as usize]
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut interner = Interner::new();
        assert_eq!(interner.intern("contents"), interner.intern("contents"));
    }

    #[test]
    fn distinct_names_get_distinct_symbols() {
        let mut interner = Interner::new();
        assert_ne!(interner.intern("head"), interner.intern("tail"));
    }

    #[test]
    fn resolve_round_trips() {
        let mut interner = Interner::new();
        let sym = interner.intern("adopts");
        assert_eq!(interner.resolve(sym), "adopts");
    }

    #[test]
    fn the_default_symbol_is_the_empty_name() {
        let interner = Interner::new();
        assert_eq!(interner.resolve(Symbol::default()), "");
        assert_eq!(Symbol::EMPTY.index(), 0);
    }
}
