use std::fmt::Write;

use failure::{Fallible, ResultExt};
use object::{Object, ObjectSection};

use super::{log_different, log_same, log_unidiff, Comparator, Comparison, Verdict};
use crate::items::{ItemId, Registry};

const MAGIC: &[u8] = b"\x7fELF";

// Sections carrying toolchain chatter rather than meaning.
const BLOTTED_SECTIONS: [&str; 3] = [".comment", ".note.gnu.build-id", ".gnu_debuglink"];

/// ELF images are close enough when they agree on everything outside the
/// build-stamp sections.
pub struct Elf;

pub static ELF: Elf = Elf;

fn semantic_sections(file: &object::File) -> Fallible<Vec<(String, Vec<u8>)>> {
    let mut sections = Vec::new();
    for section in file.sections() {
        let name = section.name().unwrap_or("").to_string();
        if BLOTTED_SECTIONS.contains(&name.as_str()) {
            continue;
        }
        let data = section.data()?;
        sections.push((name, data.to_vec()));
    }
    Ok(sections)
}

fn close_enough(left: &object::File, right: &object::File) -> Fallible<bool> {
    if left.architecture() != right.architecture() || left.kind() != right.kind() {
        return Ok(false);
    }
    Ok(semantic_sections(left)? == semantic_sections(right)?)
}

fn render_summary(file: &object::File) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "architecture: {:?}", file.architecture());
    let _ = writeln!(out, "kind: {:?}", file.kind());
    for section in file.sections() {
        let data = section.data().unwrap_or(&[]);
        let prefix: Vec<String> = data.iter().take(16).map(|b| format!("{:02x}", b)).collect();
        let _ = writeln!(
            out,
            "{} {} {}",
            section.name().unwrap_or("?"),
            section.size(),
            prefix.join(" ")
        );
    }
    out
}

impl Comparator for Elf {
    fn name(&self) -> &'static str {
        "Elf"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Ok(registry.content(item)?.starts_with(MAGIC))
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        let left_content = registry.content(left)?;
        let right_content = registry.content(right)?;

        let left_file = object::File::parse(&left_content[..])
            .with_context(|_| format!("parsing \"{}\"", registry.name(left)))?;
        let right_file = object::File::parse(&right_content[..])
            .with_context(|_| format!("parsing \"{}\"", registry.name(right)))?;

        if close_enough(&left_file, &right_file)? {
            log_same(self.name(), &registry.name(left));
            Ok(Verdict::Same)
        } else {
            log_different(self.name(), &registry.name(left));
            log_unidiff(
                &render_summary(&left_file),
                &render_summary(&right_file),
                &registry.name(left),
                &registry.name(right),
            );
            Ok(Verdict::Different)
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::boxes::BoxKind;

    // 64-bit little-endian header with no program or section headers.
    pub(crate) fn minimal_elf(machine: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes[..4].copy_from_slice(MAGIC);
        bytes[4] = 2; // ELFCLASS64
        bytes[5] = 1; // ELFDATA2LSB
        bytes[6] = 1; // EV_CURRENT
        bytes[16] = 1; // ET_REL
        bytes[18..20].copy_from_slice(&machine.to_le_bytes());
        bytes[20] = 1; // e_version
        bytes[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
        bytes
    }

    #[test]
    fn test_applies_needs_magic() -> Fallible<()> {
        let registry = Registry::new();
        let item = registry.find_or_create("prog", registry.root(), BoxKind::Dir);
        registry.set_content(item, minimal_elf(62));
        assert!(ELF.applies_item(&registry, item)?);

        let other = registry.find_or_create("notes", registry.root(), BoxKind::Dir);
        registry.set_content(other, b"just text".to_vec());
        assert!(!ELF.applies_item(&registry, other)?);
        Ok(())
    }

    #[test]
    fn test_close_enough_on_architecture() -> Fallible<()> {
        let left = minimal_elf(62); // x86-64
        let right = minimal_elf(183); // aarch64

        let left_file = object::File::parse(&left[..]).unwrap();
        let same_file = object::File::parse(&left[..]).unwrap();
        assert!(close_enough(&left_file, &same_file)?);

        let right_file = object::File::parse(&right[..]).unwrap();
        assert!(!close_enough(&left_file, &right_file)?);
        Ok(())
    }
}
