//! Layered symbol scopes for the Menter evaluator.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::Value;

/// One layer of bindings. Layers are shared: a derived scope sees every
/// binding later added to the layers it was derived from.
pub type Symbols = Rc<RefCell<IndexMap<String, Value>>>;

pub fn new_symbols() -> Symbols {
    Rc::new(RefCell::new(IndexMap::new()))
}

/// A stack of symbol layers, innermost last.
///
/// `put` replaces the binding in the innermost layer that already has the
/// name, otherwise it binds on top. The unit-level scope's base layer is
/// the unit's own symbol map, so new top-level names become globals.
#[derive(Debug, Clone)]
pub struct Scope {
    layers: Vec<Symbols>,
}

impl Scope {
    /// A scope whose only layer is `base`.
    pub fn new(base: Symbols) -> Self {
        Self { layers: vec![base] }
    }

    /// A scope with one fresh layer, as used for a function call.
    pub fn function() -> Self {
        Self::new(new_symbols())
    }

    /// Share every layer of this scope and add a fresh one on top.
    pub fn derive(&self) -> Self {
        let mut layers = self.layers.clone();
        layers.push(new_symbols());
        Self { layers }
    }

    /// Look up a symbol, searching from innermost to outermost layer.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.borrow().get(name).cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layers.iter().any(|layer| layer.borrow().contains_key(name))
    }

    pub fn put(&self, name: &str, value: Value) {
        for layer in self.layers.iter().rev() {
            let mut layer = layer.borrow_mut();
            if let Some(slot) = layer.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.put_on_top(name, value);
    }

    pub fn put_on_top(&self, name: &str, value: Value) {
        if let Some(top) = self.layers.last() {
            top.borrow_mut().insert(name.to_string(), value);
        }
    }

    pub fn put_all(&self, symbols: &IndexMap<String, Value>) {
        for (name, value) in symbols {
            self.put(name, value.clone());
        }
    }

    /// Copy the bindings of every layer of `other`, outermost first.
    pub fn put_scope(&self, other: &Scope) {
        for layer in &other.layers {
            let bindings = layer.borrow().clone();
            self.put_all(&bindings);
        }
    }

    /// Bind `self`; an existing `self` moves to `super`.
    pub fn put_self(&self, value: Value) {
        if let Some(previous) = self.get("self") {
            self.put_on_top("super", previous);
        }
        self.put_on_top("self", value);
    }

    /// Remove the binding from the innermost layer that has it.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.borrow_mut().shift_remove(name))
    }

    /// All visible bindings, inner layers shadowing outer ones.
    pub fn effective(&self) -> IndexMap<String, Value> {
        let mut merged = IndexMap::new();
        for layer in &self.layers {
            for (name, value) in layer.borrow().iter() {
                merged.insert(name.clone(), value.clone());
            }
        }
        merged
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::function()
    }
}
