use fxhash::FxBuildHasher;
use indexmap::IndexMap;

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Symbol table mapping label name -> byte address.
///
/// Built during pass 1 and immutable afterwards. One table exists per
/// `assemble` call; it is threaded through both passes explicitly rather
/// than living in shared state, so concurrent or repeated assemblies never
/// interfere.
#[derive(Debug, Default)]
pub struct SymbolTable {
    table: FxMap<String, u16>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            table: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Insert a label definition. Err if the label already exists.
    pub fn insert(&mut self, name: &str, addr: u16) -> Result<(), ()> {
        if self.table.contains_key(name) {
            return Err(());
        }
        self.table.insert(name.to_string(), addr);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.table.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Labels in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.table.iter().map(|(name, addr)| (name.as_str(), *addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut syms = SymbolTable::new();
        assert!(syms.insert("start", 0x8000).is_ok());
        assert!(syms.insert("loop", 0x8004).is_ok());
        assert_eq!(syms.get("start"), Some(0x8000));
        assert_eq!(syms.get("missing"), None);
    }

    #[test]
    fn duplicate_rejected() {
        let mut syms = SymbolTable::new();
        syms.insert("x", 1).unwrap();
        assert!(syms.insert("x", 2).is_err());
        // First definition is address-stable
        assert_eq!(syms.get("x"), Some(1));
    }

    #[test]
    fn definition_order_kept() {
        let mut syms = SymbolTable::new();
        syms.insert("b", 2).unwrap();
        syms.insert("a", 1).unwrap();
        let names: Vec<&str> = syms.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
