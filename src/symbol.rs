// Symbol interning.
//
// A symbol's identity is its handle: interning the same string twice
// answers the same Obj, so selectors and global names compare by
// handle equality. Symbol objects carry Preserve and are never
// collected.

use crate::object::Obj;
use crate::tree::Tree;


#[derive(Debug)]
pub struct SymbolRegistry {
    names: Tree<Box<str>, Obj>,
}


impl SymbolRegistry {
    pub fn new() -> SymbolRegistry {
        SymbolRegistry { names: Tree::new() }
    }

    pub fn find(&mut self, name: &str) -> Option<Obj> {
        self.names.get(name).copied()
    }

    pub fn define(&mut self, name: &str, symbol: Obj) {
        let fresh = self.names.insert(Box::from(name), symbol);
        debug_assert!(fresh, "symbol {:?} interned twice", name);
    }

    // Reverse lookup, by walking the whole registry. Diagnostics
    // only; nothing on a hot path prints symbols.
    pub fn name_of(&self, symbol: Obj) -> Option<String> {
        let mut found = None;
        self.names.for_each(|name, obj| {
            if *obj == symbol && found.is_none() {
                found = Some(name.to_string());
            }
        });
        found
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}
