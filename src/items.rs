use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::rc::Rc;

use failure::{format_err, Fallible, ResultExt};
use log::trace;

use crate::boxes::{BoxKind, MemberKind, MemberMeta, Session};

/// Interned handle on one comparable thing: a filesystem entry or an
/// archive member, keyed by its extended path name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ItemId(usize);

enum StatCache {
    Unfetched,
    Absent,
    Present(fs::Metadata),
}

struct ItemState {
    name: Rc<str>,
    parent: ItemId,
    kind: BoxKind,
    stat: StatCache,
    content: Option<Rc<Vec<u8>>>,
    link: Option<Rc<str>>,
    size: Option<u64>,
}

impl ItemState {
    fn new(name: &str, parent: ItemId, kind: BoxKind) -> ItemState {
        ItemState {
            name: name.into(),
            parent,
            kind,
            stat: StatCache::Unfetched,
            content: None,
            link: None,
            size: None,
        }
    }
}

struct Inner {
    by_name: HashMap<String, ItemId>,
    items: Vec<ItemState>,
    mounts: HashMap<ItemId, Session>,
}

/// Owns every item.  Member accessors route through the parent item's box
/// kind: directory members go to the filesystem, archive members to the
/// mounted session of their parent in the `mounts` side table.
///
/// Single-threaded by design; one logical comparison tree runs at a time.
pub struct Registry {
    inner: RefCell<Inner>,
}

const ROOT: ItemId = ItemId(0);

impl Registry {
    pub fn new() -> Registry {
        Registry {
            inner: RefCell::new(Inner {
                by_name: HashMap::new(),
                // the synthetic root is its own parent
                items: vec![ItemState::new("{root}", ROOT, BoxKind::Dir)],
                mounts: HashMap::new(),
            }),
        }
    }

    pub fn root(&self) -> ItemId {
        ROOT
    }

    pub fn find_or_create(&self, name: &str, parent: ItemId, kind: BoxKind) -> ItemId {
        let mut inner = self.inner.borrow_mut();
        if let Some(&id) = inner.by_name.get(name) {
            return id;
        }
        let id = ItemId(inner.items.len());
        inner.items.push(ItemState::new(name, parent, kind));
        inner.by_name.insert(name.to_string(), id);
        trace!("interned \"{}\" under \"{}\"", name, inner.items[parent.0].name);
        id
    }

    /// Forget a name.  The arena slot is retired, not reused.
    pub fn delete(&self, name: &str) {
        self.inner.borrow_mut().by_name.remove(name);
    }

    /// Clear all interned items and mounts between independent top-level
    /// comparisons.  Outstanding `ItemId`s become invalid.
    pub fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.by_name.clear();
        inner.items.truncate(1);
        inner.mounts.clear();
    }

    pub fn name(&self, id: ItemId) -> Rc<str> {
        self.inner.borrow().items[id.0].name.clone()
    }

    pub fn parent(&self, id: ItemId) -> ItemId {
        self.inner.borrow().items[id.0].parent
    }

    pub fn kind(&self, id: ItemId) -> BoxKind {
        self.inner.borrow().items[id.0].kind
    }

    pub fn parent_kind(&self, id: ItemId) -> BoxKind {
        let inner = self.inner.borrow();
        inner.items[inner.items[id.0].parent.0].kind
    }

    pub fn set_kind(&self, id: ItemId, kind: BoxKind) {
        self.inner.borrow_mut().items[id.0].kind = kind;
    }

    /// Short name within the enclosing container, per the item's own box.
    pub fn short_name(&self, id: ItemId) -> String {
        let inner = self.inner.borrow();
        let item = &inner.items[id.0];
        item.kind.short_name(&item.name).to_string()
    }

    pub fn mount(&self, id: ItemId, session: Session) {
        self.inner.borrow_mut().mounts.insert(id, session);
    }

    pub fn unmount(&self, id: ItemId) {
        self.inner.borrow_mut().mounts.remove(&id);
    }

    pub fn is_mounted(&self, id: ItemId) -> bool {
        self.inner.borrow().mounts.contains_key(&id)
    }

    pub(crate) fn with_session<T>(
        &self,
        id: ItemId,
        f: impl FnOnce(&Session) -> Fallible<T>,
    ) -> Fallible<T> {
        let inner = self.inner.borrow();
        let session = inner
            .mounts
            .get(&id)
            .ok_or_else(|| format_err!("container \"{}\" is not mounted", inner.items[id.0].name))?;
        f(session)
    }

    fn with_parent_member<T>(
        &self,
        id: ItemId,
        f: impl FnOnce(&Session, &crate::boxes::Member) -> Fallible<T>,
    ) -> Fallible<T> {
        let parent = self.parent(id);
        let short = self.short_name(id);
        let name = self.name(id);
        self.with_session(parent, |session| {
            let member = session.member(&short, &name)?;
            f(session, member)
        })
    }

    fn fs_stat(&self, id: ItemId) -> Fallible<Option<fs::Metadata>> {
        {
            let inner = self.inner.borrow();
            match &inner.items[id.0].stat {
                StatCache::Absent => return Ok(None),
                StatCache::Present(metadata) => return Ok(Some(metadata.clone())),
                StatCache::Unfetched => {}
            }
        }

        let name = self.name(id);
        let looked = match fs::symlink_metadata(&*name) {
            Ok(metadata) => Some(metadata),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(failure::Error::from(e)
                    .context(format!("stat \"{}\"", name))
                    .into());
            }
        };

        let mut inner = self.inner.borrow_mut();
        inner.items[id.0].stat = match &looked {
            Some(metadata) => StatCache::Present(metadata.clone()),
            None => StatCache::Absent,
        };
        Ok(looked)
    }

    pub fn exists(&self, id: ItemId) -> Fallible<bool> {
        match self.parent_kind(id) {
            BoxKind::Dir => Ok(Path::new(&*self.name(id)).exists()),
            _ => {
                let parent = self.parent(id);
                let short = self.short_name(id);
                self.with_session(parent, |session| Ok(session.contains(&short)))
            }
        }
    }

    /// The whole payload, materialized at most once until `reset_item`.
    pub fn content(&self, id: ItemId) -> Fallible<Rc<Vec<u8>>> {
        if let Some(content) = self.inner.borrow().items[id.0].content.clone() {
            return Ok(content);
        }

        let name = self.name(id);
        let bytes = match self.parent_kind(id) {
            BoxKind::Dir => Rc::new(
                fs::read(&*name).with_context(|_| format!("reading \"{}\"", name))?,
            ),
            _ => self.with_parent_member(id, |_, member| Ok(member.payload.clone()))?,
        };

        self.inner.borrow_mut().items[id.0].content = Some(bytes.clone());
        Ok(bytes)
    }

    pub fn has_content(&self, id: ItemId) -> bool {
        self.inner.borrow().items[id.0].content.is_some()
    }

    pub fn set_content(&self, id: ItemId, bytes: Vec<u8>) {
        self.inner.borrow_mut().items[id.0].content = Some(Rc::new(bytes));
    }

    /// Drop the materialized payload, keeping stat.  Used between sibling
    /// comparisons to bound resident memory during deep walks.
    pub fn reset_item(&self, id: ItemId) {
        self.inner.borrow_mut().items[id.0].content = None;
    }

    pub fn size(&self, id: ItemId) -> Fallible<u64> {
        if let Some(size) = self.inner.borrow().items[id.0].size {
            return Ok(size);
        }

        let size = match self.parent_kind(id) {
            BoxKind::Dir => self
                .fs_stat(id)?
                .ok_or_else(|| format_err!("no such file \"{}\"", self.name(id)))?
                .len(),
            _ => self.with_parent_member(id, |_, member| Ok(member.size))?,
        };

        self.inner.borrow_mut().items[id.0].size = Some(size);
        Ok(size)
    }

    pub fn is_dir(&self, id: ItemId) -> Fallible<bool> {
        match self.parent_kind(id) {
            BoxKind::Dir => Ok(self
                .fs_stat(id)?
                .map(|m| m.file_type().is_dir())
                .unwrap_or(false)),
            // archive key spaces are flat
            _ => Ok(false),
        }
    }

    pub fn is_reg(&self, id: ItemId) -> Fallible<bool> {
        match self.parent_kind(id) {
            BoxKind::Dir => Ok(self
                .fs_stat(id)?
                .map(|m| m.file_type().is_file())
                .unwrap_or(false)),
            BoxKind::Tar | BoxKind::Cpio => {
                self.with_parent_member(id, |_, member| Ok(member.kind == MemberKind::Regular))
            }
            // content-only containers hold nothing but regular payloads
            _ => Ok(true),
        }
    }

    pub fn is_lnk(&self, id: ItemId) -> Fallible<bool> {
        match self.parent_kind(id) {
            BoxKind::Dir => Ok(self
                .fs_stat(id)?
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false)),
            BoxKind::Tar | BoxKind::Cpio => self.with_parent_member(id, |_, member| {
                Ok(matches!(member.kind, MemberKind::Symlink(_)))
            }),
            _ => Ok(false),
        }
    }

    pub fn link(&self, id: ItemId) -> Fallible<Rc<str>> {
        if let Some(link) = self.inner.borrow().items[id.0].link.clone() {
            return Ok(link);
        }

        let name = self.name(id);
        let target: Rc<str> = match self.parent_kind(id) {
            BoxKind::Dir => {
                let target = fs::read_link(&*name)
                    .with_context(|_| format!("readlink \"{}\"", name))?;
                target.to_string_lossy().into_owned().into()
            }
            _ => self.with_parent_member(id, |_, member| match &member.kind {
                MemberKind::Symlink(target) => Ok(Rc::from(target.as_str())),
                _ => Err(format_err!("\"{}\" is not a symbolic link", name)),
            })?,
        };

        self.inner.borrow_mut().items[id.0].link = Some(target.clone());
        Ok(target)
    }

    pub fn inode(&self, id: ItemId) -> Fallible<u64> {
        Ok(self
            .fs_stat(id)?
            .ok_or_else(|| format_err!("no such file \"{}\"", self.name(id)))?
            .ino())
    }

    pub fn device(&self, id: ItemId) -> Fallible<u64> {
        Ok(self
            .fs_stat(id)?
            .ok_or_else(|| format_err!("no such file \"{}\"", self.name(id)))?
            .dev())
    }

    pub fn member_meta(&self, id: ItemId) -> Fallible<MemberMeta> {
        self.with_parent_member(id, |_, member| Ok(member.meta.clone()))
    }

    pub fn archive_comment(&self, id: ItemId) -> Fallible<Vec<u8>> {
        self.with_session(id, |session| Ok(session.comment().to_vec()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_interning_identity() {
        let registry = Registry::new();
        let a = registry.find_or_create("red/foo", registry.root(), BoxKind::Dir);
        let b = registry.find_or_create("red/foo", registry.root(), BoxKind::Dir);
        assert_eq!(a, b);
        let c = registry.find_or_create("red/bar", registry.root(), BoxKind::Dir);
        assert_ne!(a, c);
    }

    #[test]
    fn test_delete_forgets_name() {
        let registry = Registry::new();
        let a = registry.find_or_create("red/foo", registry.root(), BoxKind::Dir);
        registry.delete("red/foo");
        let b = registry.find_or_create("red/foo", registry.root(), BoxKind::Dir);
        assert_ne!(a, b);
    }

    #[test]
    fn test_reset() {
        let registry = Registry::new();
        registry.find_or_create("red", registry.root(), BoxKind::Dir);
        registry.reset();
        let a = registry.find_or_create("red", registry.root(), BoxKind::Dir);
        let b = registry.find_or_create("red", registry.root(), BoxKind::Dir);
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_name_follows_box() {
        let registry = Registry::new();
        let a = registry.find_or_create("red/sub/foo", registry.root(), BoxKind::Dir);
        assert_eq!(registry.short_name(a), "foo");
        let b = registry.find_or_create("a.tar{tar}dir/member", registry.root(), BoxKind::Tar);
        assert_eq!(registry.short_name(b), "dir/member");
    }

    #[test]
    fn test_filesystem_accessors() -> Fallible<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data");
        let mut file = fs::File::create(&path)?;
        file.write_all(b"payload")?;
        drop(file);

        let registry = Registry::new();
        let id = registry.find_or_create(
            path.to_str().unwrap(),
            registry.root(),
            BoxKind::Dir,
        );
        assert!(registry.exists(id)?);
        assert!(registry.is_reg(id)?);
        assert!(!registry.is_dir(id)?);
        assert!(!registry.is_lnk(id)?);
        assert_eq!(registry.size(id)?, 7);
        assert_eq!(&*registry.content(id)?, &b"payload".to_vec());
        assert!(registry.has_content(id));
        registry.reset_item(id);
        assert!(!registry.has_content(id));
        Ok(())
    }

    #[test]
    fn test_absent_item() -> Fallible<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("missing");
        let registry = Registry::new();
        let id = registry.find_or_create(
            path.to_str().unwrap(),
            registry.root(),
            BoxKind::Dir,
        );
        assert!(!registry.exists(id)?);
        assert!(!registry.is_reg(id)?);
        assert!(!registry.is_dir(id)?);
        assert!(registry.size(id).is_err());
        Ok(())
    }
}
