use std::fs;

use failure::{Fallible, ResultExt};

use super::{BoxKind, Container, Session};
use crate::items::{ItemId, Registry};

/// Filesystem directories.  Needs no mount; member accessors go straight to
/// the filesystem under the member's own extended name.
pub struct Dir;

pub static DIR: Dir = Dir;

impl Container for Dir {
    fn kind(&self) -> BoxKind {
        BoxKind::Dir
    }

    fn applies(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        registry.is_dir(item)
    }

    fn keys(&self, registry: &Registry, item: ItemId) -> Fallible<Vec<String>> {
        let name = registry.name(item);
        let mut keys = Vec::new();
        for entry in fs::read_dir(&*name).with_context(|_| format!("listing \"{}\"", name))? {
            keys.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(keys)
    }

    fn open(&self, _registry: &Registry, _item: ItemId) -> Fallible<Option<Session>> {
        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_applies_and_keys() -> Fallible<()> {
        let dir = tempfile::tempdir()?;
        File::create(dir.path().join("foo"))?;
        File::create(dir.path().join("bar"))?;

        let registry = Registry::new();
        let item = registry.find_or_create(
            dir.path().to_str().unwrap(),
            registry.root(),
            BoxKind::Dir,
        );
        assert!(DIR.applies(&registry, item)?);

        let mut keys = DIR.keys(&registry, item)?;
        keys.sort();
        assert_eq!(keys, vec!["bar", "foo"]);

        let foo = registry.find_or_create(
            dir.path().join("foo").to_str().unwrap(),
            item,
            BoxKind::Dir,
        );
        assert!(!DIR.applies(&registry, foo)?);
        Ok(())
    }
}
