//! Append-only name registries for variables and functions.
//!
//! Indices are handed out in insertion order starting at 0 and stay valid for the
//! lifetime of the table. They double as memory slots (variables) and label
//! numbers (functions) in the emitted assembly.
use core::fmt;

use lasso::{Key, Rodeo, Spur};

/// Position of a name inside its [`SymbolTable`].
pub type SymbolIndex = usize;

#[derive(Default)]
pub struct SymbolTable {
    names: Rodeo,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index of `name`, appending it if it has not been seen yet.
    pub fn intern(&mut self, name: &str) -> SymbolIndex {
        self.names.get_or_intern(name).into_usize()
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolIndex> {
        self.names.get(name).map(|key| key.into_usize())
    }

    pub fn resolve(&self, index: SymbolIndex) -> Option<&str> {
        Spur::try_from_usize(index).and_then(|key| self.names.try_resolve(&key))
    }

    pub fn contains_index(&self, index: SymbolIndex) -> bool {
        index < self.len()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Grow the table with generated `{prefix}{n}` names until `index` is valid.
    ///
    /// Used when a tree arrives without names attached, e.g. from the exchange format.
    pub fn reserve_through(&mut self, index: SymbolIndex, prefix: &str) {
        while self.len() <= index {
            let mut name = format!("{prefix}{}", self.len());
            while self.names.contains(&name) {
                name.push('_');
            }
            self.names.get_or_intern(name);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolIndex, &str)> {
        self.names.iter().map(|(key, name)| (key.into_usize(), name))
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Clone for SymbolTable {
    fn clone(&self) -> Self {
        let mut table = Self::new();
        for (_, name) in self.iter() {
            table.intern(name);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use arbtest::arbtest;
    use assert2::{check, let_assert};

    use super::SymbolTable;

    #[test]
    fn intern_is_stable() {
        let mut table = SymbolTable::new();
        check!(table.intern("x") == 0);
        check!(table.intern("y") == 1);
        check!(table.intern("x") == 0);
        check!(table.len() == 2);
        check!(table.lookup("y") == Some(1));
        check!(table.lookup("z").is_none());
        let_assert!(Some(name) = table.resolve(1));
        check!(name == "y");
        check!(table.resolve(2).is_none());
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut table = SymbolTable::new();
        check!(table.intern("Frodo") != table.intern("frodo"));
    }

    #[test]
    fn reserve_through_fills_placeholders() {
        let mut table = SymbolTable::new();
        table.intern("x");
        table.reserve_through(3, "var");
        check!(table.len() == 4);
        check!(table.resolve(0) == Some("x"));
        check!(table.resolve(3) == Some("var3"));
        table.reserve_through(1, "var");
        check!(table.len() == 4);
    }

    #[test]
    fn reserve_through_skips_taken_names() {
        let mut table = SymbolTable::new();
        table.intern("var1");
        table.reserve_through(1, "var");
        check!(table.len() == 2);
        check!(table.resolve(1) == Some("var1_"));
    }

    #[test]
    fn distinct_names_get_increasing_indices() {
        arbtest(|u| {
            let names: Vec<String> = u.arbitrary()?;
            let mut table = SymbolTable::new();
            let mut seen = Vec::<String>::new();
            for name in &names {
                let index = table.intern(name);
                match seen.iter().position(|s| s == name) {
                    Some(earlier) => {
                        check!(index == earlier);
                    }
                    None => {
                        check!(index == seen.len());
                        seen.push(name.clone());
                    }
                }
            }
            check!(table.len() == seen.len());
            Ok(())
        });
    }
}
