// Symbolic stand-ins for offsets into the device blob. Call sites need the offset of their
// function's argv entry, and the init call needs the offset of the runtime initializer, but
// neither is known until the device image has been compiled after the whole host program was
// rewritten. Each reservation hands out a uint32 Variable named after the section it stands for
// (".text.<function>"); the resolver later fills in the real offset exactly once, and the
// backpatcher substitutes the literal for every occurrence. Offsets are bounded by the 32-bit
// call-site encoding: u32::MAX is the largest accepted value.

use crate::core::{OffloadError, OffloadResult};
use crate::ir::{Expr, Type};
use hashbrown::HashMap;
use std::collections::BTreeMap;

/// Type of a placeholder variable and of the literal that replaces it.
pub const PLACEHOLDER_TYPE: Type = Type::uint(32);

/// A named offset, unresolved until the device blob's sections are scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetPlaceholder {
    pub name: String,
    pub offset: Option<u32>,
}

impl OffsetPlaceholder {
    pub fn is_resolved(&self) -> bool {
        self.offset.is_some()
    }

    /// The variable standing for this offset in the host program.
    pub fn variable(&self) -> Expr {
        Expr::var(self.name.clone(), PLACEHOLDER_TYPE)
    }
}

#[derive(Debug, Default)]
pub struct PlaceholderRegistry {
    entries: BTreeMap<String, OffsetPlaceholder>,
}

impl PlaceholderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name` and return the variable standing for it.
    pub fn reserve(&mut self, name: impl Into<String>) -> OffloadResult<Expr> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(OffloadError::DuplicatePlaceholder { symbol: name });
        }
        let placeholder = OffsetPlaceholder { name: name.clone(), offset: None };
        let variable = placeholder.variable();
        log::trace!("Reserved placeholder {name}");
        self.entries.insert(name, placeholder);
        Ok(variable)
    }

    /// The variable for an already reserved name.
    pub fn lookup(&self, name: &str) -> Option<Expr> {
        self.entries.get(name).map(OffsetPlaceholder::variable)
    }

    pub fn get(&self, name: &str) -> Option<&OffsetPlaceholder> {
        self.entries.get(name)
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Record the offset of `name`. Each placeholder resolves exactly once.
    pub fn resolve(&mut self, name: &str, offset: u64) -> OffloadResult<u32> {
        let placeholder = self
            .entries
            .get_mut(name)
            .ok_or_else(|| OffloadError::UnknownPlaceholder { symbol: name.to_string() })?;
        if placeholder.offset.is_some() {
            return Err(OffloadError::DuplicateResolution { symbol: name.to_string() });
        }
        let offset =
            u32::try_from(offset).map_err(|_| OffloadError::OffsetOutOfRange { symbol: name.to_string(), offset })?;
        placeholder.offset = Some(offset);
        Ok(offset)
    }

    pub fn all_resolved(&self) -> bool {
        self.entries.values().all(OffsetPlaceholder::is_resolved)
    }

    /// Names still waiting for an offset, in name order.
    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.entries.values().filter(|p| !p.is_resolved()).map(|p| p.name.as_str())
    }

    /// Literal replacements for every resolved placeholder.
    pub fn substitutions(&self) -> HashMap<String, Expr> {
        self.entries
            .values()
            .filter_map(|p| p.offset.map(|offset| (p.name.clone(), Expr::uint(u64::from(offset), 32))))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OffsetPlaceholder> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_returns_typed_variable() {
        let mut registry = PlaceholderRegistry::new();
        let var = registry.reserve(".text.offload_f_argv").unwrap();
        assert_eq!(var, Expr::var(".text.offload_f_argv", Type::uint(32)));
        assert_eq!(registry.lookup(".text.offload_f_argv"), Some(var));
        assert!(!registry.all_resolved());
        assert_eq!(registry.unresolved().collect::<Vec<_>>(), [".text.offload_f_argv"]);
    }

    #[test]
    fn second_reservation_is_rejected() {
        let mut registry = PlaceholderRegistry::new();
        registry.reserve("a").unwrap();
        let err = registry.reserve("a").unwrap_err();
        assert!(matches!(err, OffloadError::DuplicatePlaceholder { ref symbol } if symbol == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolves_exactly_once() {
        let mut registry = PlaceholderRegistry::new();
        registry.reserve("a").unwrap();
        assert_eq!(registry.resolve("a", 64).unwrap(), 64);
        assert!(matches!(registry.resolve("a", 64), Err(OffloadError::DuplicateResolution { .. })));
        assert!(matches!(registry.resolve("b", 0), Err(OffloadError::UnknownPlaceholder { .. })));
        assert!(registry.all_resolved());
        assert_eq!(registry.substitutions()["a"], Expr::uint(64, 32));
    }

    #[test]
    fn offset_bound_is_inclusive() {
        let mut registry = PlaceholderRegistry::new();
        registry.reserve("max").unwrap();
        registry.reserve("over").unwrap();
        assert_eq!(registry.resolve("max", u64::from(u32::MAX)).unwrap(), u32::MAX);
        let err = registry.resolve("over", u64::from(u32::MAX) + 1).unwrap_err();
        assert!(matches!(err, OffloadError::OffsetOutOfRange { offset, .. } if offset == 1 << 32));
        assert_eq!(registry.unresolved().collect::<Vec<_>>(), ["over"]);
    }
}
