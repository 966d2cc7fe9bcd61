// Symbol offset resolution. After the device image has been compiled, the section table of the
// resulting blob is scanned once. A section named like a reserved placeholder resolves it to
// the section's offset within the blob. Finding the same section twice, an offset that does not
// fit the call-site encoding, or a placeholder that no section matched are all internal errors:
// the last one means a device function silently failed to make it into the blob.

use super::placeholder::PlaceholderRegistry;
use crate::core::{OffloadError, OffloadResult};
use crate::device::ObjectInspector;

/// Outcome of a section table scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub sections_scanned: usize,
    /// Resolved placeholders in section table order.
    pub resolved: Vec<(String, u32)>,
}

/// Resolve every placeholder in `registry` from the sections of `bytes`.
pub fn resolve_offsets(
    bytes: &[u8],
    registry: &mut PlaceholderRegistry,
    inspector: &dyn ObjectInspector,
) -> OffloadResult<Resolution> {
    let sections = inspector.sections(bytes)?;
    let mut resolution = Resolution { sections_scanned: sections.len(), resolved: Vec::new() };

    for section in &sections {
        let Some(placeholder) = registry.get(&section.name) else {
            continue;
        };
        if placeholder.is_resolved() {
            return Err(OffloadError::DuplicateSection { section: section.name.clone() });
        }
        log::debug!("Found section {} at {}, {}", section.name, section.offset, section.size);
        let offset = registry.resolve(&section.name, section.offset)?;
        resolution.resolved.push((section.name.clone(), offset));
    }

    if let Some(missing) = registry.unresolved().next() {
        return Err(OffloadError::UnresolvedPlaceholder { symbol: missing.to_string() });
    }
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SectionInfo;

    /// Section table with fixed entries.
    struct FakeTable(Vec<SectionInfo>);

    impl ObjectInspector for FakeTable {
        fn sections(&self, _bytes: &[u8]) -> Result<Vec<SectionInfo>, object::Error> {
            Ok(self.0.clone())
        }
    }

    fn section(name: &str, offset: u64) -> SectionInfo {
        SectionInfo { name: name.into(), offset, size: 16 }
    }

    fn registry(names: &[&str]) -> PlaceholderRegistry {
        let mut registry = PlaceholderRegistry::new();
        for name in names {
            registry.reserve(*name).unwrap();
        }
        registry
    }

    #[test]
    fn resolves_matching_sections() {
        let mut reg = registry(&[".text.a_argv", ".text.init"]);
        let table = FakeTable(vec![
            section(".strtab", 0),
            section(".text.a", 64),
            section(".text.a_argv", 80),
            section(".text.init", 112),
        ]);
        let resolution = resolve_offsets(&[], &mut reg, &table).unwrap();
        assert_eq!(resolution.sections_scanned, 4);
        assert_eq!(resolution.resolved, [(".text.a_argv".to_string(), 80), (".text.init".to_string(), 112)]);
        assert!(reg.all_resolved());
    }

    #[test]
    fn duplicate_section_is_fatal() {
        let mut reg = registry(&[".text.a_argv"]);
        let table = FakeTable(vec![section(".text.a_argv", 64), section(".text.a_argv", 128)]);
        let err = resolve_offsets(&[], &mut reg, &table).unwrap_err();
        assert!(matches!(err, OffloadError::DuplicateSection { ref section } if section == ".text.a_argv"));
    }

    #[test]
    fn missing_section_is_fatal() {
        let mut reg = registry(&[".text.a_argv", ".text.b_argv"]);
        let table = FakeTable(vec![section(".text.a_argv", 64)]);
        let err = resolve_offsets(&[], &mut reg, &table).unwrap_err();
        assert_eq!(err.to_string(), "Did not find compiled function .text.b_argv");
    }

    #[test]
    fn offset_bound() {
        let max = u64::from(u32::MAX);
        let mut reg = registry(&[".text.a_argv"]);
        let ok = resolve_offsets(&[], &mut reg, &FakeTable(vec![section(".text.a_argv", max)])).unwrap();
        assert_eq!(ok.resolved[0].1, u32::MAX);

        let mut reg = registry(&[".text.a_argv"]);
        let err = resolve_offsets(&[], &mut reg, &FakeTable(vec![section(".text.a_argv", max + 1)])).unwrap_err();
        assert!(matches!(err, OffloadError::OffsetOutOfRange { .. }));
    }

    #[test]
    fn unreadable_object_is_external() {
        use crate::device::ElfInspector;
        let mut reg = registry(&[".text.a_argv"]);
        let err = resolve_offsets(b"garbage", &mut reg, &ElfInspector).unwrap_err();
        assert!(!err.is_internal());
    }
}
