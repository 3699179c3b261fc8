use std::fs::File;

use failure::{Fallible, ResultExt};
use memmap2::Mmap;

use super::{log_different, log_indeterminate, log_same, log_unidiff, Comparator, Comparison, Verdict};
use crate::boxes::BoxKind;
use crate::items::{ItemId, Registry};

/// A missing side settles the question before anything gets opened.
pub struct NoSuchFile;

pub static NO_SUCH_FILE: NoSuchFile = NoSuchFile;

impl Comparator for NoSuchFile {
    fn name(&self) -> &'static str {
        "NoSuchFile"
    }

    fn applies_item(&self, _registry: &Registry, _item: ItemId) -> Fallible<bool> {
        Ok(true)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        let exists = [registry.exists(left)?, registry.exists(right)?];

        if exists[0] != exists[1] {
            log_different(self.name(), &registry.name(left));
            return Ok(Verdict::Different);
        }
        if !exists[0] {
            log_same(self.name(), &registry.name(left));
            return Ok(Verdict::Same);
        }
        log_indeterminate(self.name(), &registry.name(left));
        Ok(Verdict::Indeterminate)
    }
}

/// Filesystem entries with equal inode and device are the same object.
pub struct Inode;

pub static INODE: Inode = Inode;

impl Comparator for Inode {
    fn name(&self) -> &'static str {
        "Inode"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Ok(registry.kind(item) == BoxKind::Dir)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        if registry.inode(left)? == registry.inode(right)?
            && registry.device(left)? == registry.device(right)?
        {
            log_same(self.name(), &registry.name(left));
            Ok(Verdict::Same)
        } else {
            log_indeterminate(self.name(), &registry.name(left));
            Ok(Verdict::Indeterminate)
        }
    }
}

/// Two empty files are equal without being opened at all.
pub struct EmptyFile;

pub static EMPTY_FILE: EmptyFile = EmptyFile;

impl Comparator for EmptyFile {
    fn name(&self) -> &'static str {
        "EmptyFile"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        registry.is_reg(item)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        if registry.size(left)? == 0 && registry.size(right)? == 0 {
            log_same(self.name(), &registry.name(left));
            Ok(Verdict::Same)
        } else {
            log_indeterminate(self.name(), &registry.name(left));
            Ok(Verdict::Indeterminate)
        }
    }
}

/// Bitwise identical payloads are close enough.  Filesystem pairs with no
/// payload cached yet are compared through memory maps; equality drops the
/// maps on the floor, inequality copies them into the payload caches for
/// the text comparators further down the chain.
pub struct Bitwise;

pub static BITWISE: Bitwise = Bitwise;

impl Bitwise {
    fn mmap(registry: &Registry, item: ItemId) -> Fallible<Mmap> {
        let name = registry.name(item);
        let file = File::open(&*name).with_context(|_| format!("opening \"{}\"", name))?;
        let map = unsafe { Mmap::map(&file) }
            .with_context(|_| format!("mapping \"{}\"", name))?;
        Ok(map)
    }
}

impl Comparator for Bitwise {
    fn name(&self) -> &'static str {
        "Bitwise"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        registry.is_reg(item)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();

        if registry.size(left)? != registry.size(right)? {
            log_indeterminate(self.name(), &registry.name(left));
            return Ok(Verdict::Indeterminate);
        }

        let filesystem_backed = registry.parent_kind(left) == BoxKind::Dir
            && registry.parent_kind(right) == BoxKind::Dir;
        let materialized = registry.has_content(left) || registry.has_content(right);

        if materialized || !filesystem_backed {
            return if registry.content(left)? == registry.content(right)? {
                registry.reset_item(left);
                registry.reset_item(right);
                log_same(self.name(), &registry.name(left));
                Ok(Verdict::Same)
            } else {
                log_indeterminate(self.name(), &registry.name(left));
                Ok(Verdict::Indeterminate)
            };
        }

        if registry.size(left)? == 0 {
            log_same(self.name(), &registry.name(left));
            return Ok(Verdict::Same);
        }

        let left_map = Self::mmap(registry, left)?;
        let right_map = Self::mmap(registry, right)?;
        if left_map[..] == right_map[..] {
            log_same(self.name(), &registry.name(left));
            Ok(Verdict::Same)
        } else {
            registry.set_content(left, left_map.to_vec());
            registry.set_content(right, right_map.to_vec());
            log_indeterminate(self.name(), &registry.name(left));
            Ok(Verdict::Indeterminate)
        }
    }
}

/// Symbolic links are equal iff they point at the same place.  This is
/// final for links: unequal targets are an authoritative difference.
pub struct Symlink;

pub static SYMLINK: Symlink = Symlink;

impl Comparator for Symlink {
    fn name(&self) -> &'static str {
        "Symlink"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        registry.is_lnk(item)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        if registry.link(left)? == registry.link(right)? {
            log_same(self.name(), &registry.name(left));
            Ok(Verdict::Same)
        } else {
            log_different(self.name(), &registry.name(left));
            Ok(Verdict::Different)
        }
    }
}

/// Catchall terminating the chain: whatever reaches this point is
/// different, with a unified diff for the record.
pub struct Fail;

pub static FAIL: Fail = Fail;

impl Comparator for Fail {
    fn name(&self) -> &'static str {
        "Fail"
    }

    fn applies_item(&self, _registry: &Registry, _item: ItemId) -> Fallible<bool> {
        Ok(true)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        log_different(self.name(), &registry.name(left));

        let left_content = registry.content(left)?;
        let right_content = registry.content(right)?;
        log_unidiff(
            &String::from_utf8_lossy(&left_content),
            &String::from_utf8_lossy(&right_content),
            &registry.name(left),
            &registry.name(right),
        );
        Ok(Verdict::Different)
    }
}
