// Section table access for compiled device objects. The offload resolver needs the name,
// offset and size of every section in the blob the device compiler produced; it asks an
// ObjectInspector rather than parsing the format itself, so tests can substitute a table with
// arbitrary offsets. ElfInspector reads any format the object crate understands. For
// relocatable objects the section address is zero, so the offset reported is the section's
// position in the file, which is where the runtime finds it once the blob is loaded; for
// linked images it is the section address.

use object::{Object, ObjectKind, ObjectSection};

/// One entry of an object's section table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

pub trait ObjectInspector {
    /// Enumerate the sections of `bytes`, in section table order.
    fn sections(&self, bytes: &[u8]) -> Result<Vec<SectionInfo>, object::Error>;
}

/// [`ObjectInspector`] over the `object` crate's reader.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElfInspector;

impl ObjectInspector for ElfInspector {
    fn sections(&self, bytes: &[u8]) -> Result<Vec<SectionInfo>, object::Error> {
        let file = object::File::parse(bytes)?;
        let relocatable = file.kind() == ObjectKind::Relocatable;

        let mut sections = Vec::new();
        for section in file.sections() {
            // Sections without a readable name cannot match a placeholder.
            let name = match section.name() {
                Ok(name) => name,
                Err(e) => {
                    log::trace!("Skipping section {}: {e}", section.index().0);
                    continue;
                }
            };
            let offset = match (relocatable, section.file_range()) {
                (true, Some((offset, _))) => offset,
                _ => section.address(),
            };
            sections.push(SectionInfo { name: name.to_string(), offset, size: section.size() });
        }
        Ok(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::write::Object as ObjectWriter;
    use object::{Architecture, BinaryFormat, Endianness, SectionKind};

    #[test]
    fn reports_file_offsets_for_relocatable_objects() {
        let mut obj = ObjectWriter::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        let first = obj.add_section(Vec::new(), b".text.a".to_vec(), SectionKind::Text);
        obj.append_section_data(first, &[0xC3; 4], 16);
        let second = obj.add_section(Vec::new(), b".text.b".to_vec(), SectionKind::Text);
        obj.append_section_data(second, &[0xC3; 8], 16);
        let bytes = obj.write().unwrap();

        let sections = ElfInspector.sections(&bytes).unwrap();
        let a = sections.iter().find(|s| s.name == ".text.a").unwrap();
        let b = sections.iter().find(|s| s.name == ".text.b").unwrap();
        assert_eq!(a.size, 4);
        assert_eq!(b.size, 8);
        assert!(a.offset > 0 && b.offset > a.offset);
        assert_eq!(&bytes[b.offset as usize..b.offset as usize + 8], &[0xC3; 8]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(ElfInspector.sections(b"not an object").is_err());
    }
}
