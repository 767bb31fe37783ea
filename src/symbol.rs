//! Symbol interning.
//!
//! Every symbol is created through a [`SymbolTable`], which guarantees that
//! equal text yields the identical symbol. Identity is the interner's id, so
//! comparing, hashing and ordering symbols never touches their text.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use string_interner::{DefaultBackend, DefaultSymbol, StringInterner, Symbol as _};

/// An interned name.
#[derive(Clone)]
pub struct Symbol {
    id: DefaultSymbol,
    name: Rc<str>,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of this symbol in intern order
    pub fn id(&self) -> usize {
        self.id.to_usize()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Symbol({})", self.name)
    }
}

/// Symbols the reader and evaluator need to recognise by identity.
#[derive(Debug, Clone)]
pub struct Keywords {
    pub quote: Symbol,
    pub quasiquote: Symbol,
    pub unquote: Symbol,
    pub unquote_splicing: Symbol,
    pub lambda: Symbol,
    pub begin: Symbol,
    pub self_: Symbol,
}

/// Owner of all symbols of one interpreter. Only grows.
pub struct SymbolTable {
    interner: StringInterner<DefaultBackend>,
    symbols: HashMap<DefaultSymbol, Symbol>,
    keywords: Keywords,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut interner = StringInterner::<DefaultBackend>::new();
        let mut symbols = HashMap::new();
        let mut intern = |name: &str| intern_into(&mut interner, &mut symbols, name);
        let keywords = Keywords {
            quote: intern("quote"),
            quasiquote: intern("quasiquote"),
            unquote: intern("unquote"),
            unquote_splicing: intern("unquote-splicing"),
            lambda: intern("lambda"),
            begin: intern("begin"),
            self_: intern("self"),
        };
        SymbolTable {
            interner,
            symbols,
            keywords,
        }
    }

    /// Return the symbol for `name`, creating it on first use.
    pub fn intern(&mut self, name: &str) -> Symbol {
        intern_into(&mut self.interner, &mut self.symbols, name)
    }

    /// Look up an existing symbol without creating one
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.interner
            .get(name)
            .and_then(|id| self.symbols.get(&id))
            .cloned()
    }

    pub fn keywords(&self) -> &Keywords {
        &self.keywords
    }

    pub fn len(&self) -> usize {
        self.interner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interner.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

fn intern_into(
    interner: &mut StringInterner<DefaultBackend>,
    symbols: &mut HashMap<DefaultSymbol, Symbol>,
    name: &str,
) -> Symbol {
    let id = interner.get_or_intern(name);
    symbols
        .entry(id)
        .or_insert_with(|| Symbol {
            id,
            name: Rc::from(name),
        })
        .clone()
}
