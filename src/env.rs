// Lexical scope chain (§9 "Dynamic name lookup ... becomes an explicit
// environment structure: a chain of immutable maps"), adapted from the
// teacher's own `Env<T>` (itself a parent-chain `RefCell<Map<T>>`) but
// typed over `Rc` instead of the teacher's bespoke `Node<T>` alias, since
// this crate's `ast`/`ir` no longer share that type.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::rc::Rc;

pub struct Env<T> {
    scope: RefCell<HashMap<String, T>>,
    parent: Option<Rc<Env<T>>>,
}

impl<T> Env<T>
where
    T: Clone + Debug,
{
    fn new(parent: Option<Rc<Env<T>>>) -> Env<T> {
        Env {
            scope: RefCell::new(HashMap::new()),
            parent,
        }
    }

    pub fn root() -> Env<T> {
        Self::new(None)
    }

    pub fn chain(parent: &Rc<Env<T>>) -> Env<T> {
        Self::new(Some(parent.clone()))
    }

    /// Look up an identifier from anywhere in the scope chain, innermost
    /// scope first.
    pub fn get(&self, key: &str) -> Option<T> {
        if let Some(value) = self.scope.borrow().get(key) {
            Some(value.clone())
        } else if let Some(env) = &self.parent {
            env.get(key)
        } else {
            None
        }
    }

    /// Insert a value into the current scope.
    pub fn define(&self, key: &str, value: T) {
        self.scope.borrow_mut().insert(key.to_string(), value);
    }

    /// Import a whole map into the current scope (used to seed a fresh
    /// evaluation env with an equation's resolved free variables).
    pub fn import(&self, values: &HashMap<String, T>) {
        for (k, v) in values {
            self.define(k, v.clone());
        }
    }

    /// Flatten the scope chain into a plain map, innermost scope winning
    /// on name collision. Used where `ir::Ir::replace`/`evaluate` want a
    /// single borrowed map rather than a chain to walk.
    pub fn flatten(&self) -> HashMap<String, T> {
        let mut out = match &self.parent {
            Some(env) => env.flatten(),
            None => HashMap::new(),
        };
        for (k, v) in self.scope.borrow().iter() {
            out.insert(k.clone(), v.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_falls_through_to_parent() {
        let root = Rc::new(Env::<i32>::root());
        root.define("x", 1);
        let child = Env::chain(&root);
        child.define("y", 2);
        assert_eq!(child.get("x"), Some(1));
        assert_eq!(child.get("y"), Some(2));
        assert_eq!(root.get("y"), None);
    }

    #[test]
    fn test_child_shadows_parent() {
        let root = Rc::new(Env::<i32>::root());
        root.define("x", 1);
        let child = Env::chain(&root);
        child.define("x", 99);
        assert_eq!(child.get("x"), Some(99));
        assert_eq!(root.get("x"), Some(1));
    }

    #[test]
    fn test_flatten_merges_chain() {
        let root = Rc::new(Env::<i32>::root());
        root.define("x", 1);
        let child = Env::chain(&root);
        child.define("y", 2);
        let flat = child.flatten();
        assert_eq!(flat.get("x"), Some(&1));
        assert_eq!(flat.get("y"), Some(&2));
    }
}
