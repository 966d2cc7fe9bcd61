// A name table for IR traversals that need to track bindings introduced by Let, LetStmt, For
// and Allocate nodes. Each name maps to a stack of values, so an inner binding hides an outer
// one of the same name until it is popped again on the way back out of the binding node.
// The closure extractor uses a Scope<()> as its set of locally bound names, substitution uses
// one to stop replacing shadowed names, and the text parser uses a Scope<Type> for typing.

//! Shadowing name table used while traversing IR.

use hashbrown::HashMap;

#[derive(Debug, Clone)]
pub struct Scope<T = ()> {
    table: HashMap<String, Vec<T>>,
}

impl<T> Default for Scope<T> {
    fn default() -> Self {
        Self { table: HashMap::new() }
    }
}

impl<T> Scope<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, hiding any outer binding until the matching `pop`.
    pub fn push(&mut self, name: &str, value: T) {
        match self.table.get_mut(name) {
            Some(stack) => stack.push(value),
            None => {
                self.table.insert(name.to_string(), vec![value]);
            }
        }
    }

    /// Remove the innermost binding of `name`.
    pub fn pop(&mut self, name: &str) -> Option<T> {
        let stack = self.table.get_mut(name)?;
        let value = stack.pop();
        if stack.is_empty() {
            self.table.remove(name);
        }
        value
    }

    /// Innermost binding of `name`.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.table.get(name).and_then(|stack| stack.last())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Names with at least one live binding, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }
}
