pub mod ar;
pub mod cpio;
pub mod dir;
pub mod encoder;
pub mod tar;
pub mod zip;

use std::rc::Rc;

use failure::{format_err, Fallible};
use indexmap::IndexMap;

use crate::items::{ItemId, Registry};

/// Identifies the adapter governing member access for one container format.
/// The separator token doubles as the segment tag in extended path names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BoxKind {
    Dir,
    Ar,
    Cpio,
    Tar,
    Zip,
    Gzip,
    Bz2,
    Xz,
}

impl BoxKind {
    pub fn name(self) -> &'static str {
        match self {
            BoxKind::Dir => "Dir",
            BoxKind::Ar => "Ar",
            BoxKind::Cpio => "Cpio",
            BoxKind::Tar => "Tar",
            BoxKind::Zip => "Zip",
            BoxKind::Gzip => "Gzip",
            BoxKind::Bz2 => "Bz2",
            BoxKind::Xz => "Xz",
        }
    }

    pub fn separator(self) -> &'static str {
        match self {
            BoxKind::Dir => "/",
            BoxKind::Ar => "{ar}",
            BoxKind::Cpio => "{cpio}",
            BoxKind::Tar => "{tar}",
            BoxKind::Zip => "{zip}",
            BoxKind::Gzip => "{gzip}",
            BoxKind::Bz2 => "{bz2}",
            BoxKind::Xz => "{xz}",
        }
    }

    /// Synthetic short name of the single member of a content-only stream.
    pub fn content_name(self) -> Option<&'static str> {
        match self {
            BoxKind::Gzip => Some("{gzipcontent}"),
            BoxKind::Bz2 => Some("{bz2content}"),
            BoxKind::Xz => Some("{xzcontent}"),
            _ => None,
        }
    }

    pub fn join(self, parent: &str, child: &str) -> String {
        format!("{}{}{}", parent, self.separator(), child)
    }

    pub fn short_name(self, name: &str) -> &str {
        name.rsplit(self.separator()).next().unwrap_or(name)
    }

    pub fn container(self) -> &'static dyn Container {
        match self {
            BoxKind::Dir => &dir::DIR,
            BoxKind::Ar => &ar::AR,
            BoxKind::Cpio => &cpio::CPIO,
            BoxKind::Tar => &tar::TAR,
            BoxKind::Zip => &zip::ZIP,
            BoxKind::Gzip => &encoder::GZIP,
            BoxKind::Bz2 => &encoder::BZ2,
            BoxKind::Xz => &encoder::XZ,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Regular,
    Directory,
    Symlink(String),
    Other,
}

#[derive(Clone, Debug)]
pub enum MemberMeta {
    None,
    Ar(ar::ArMeta),
    Cpio(cpio::CpioMeta),
    Tar(tar::TarMeta),
    Zip(zip::ZipMeta),
}

pub struct Member {
    pub kind: MemberKind,
    pub size: u64,
    pub payload: Rc<Vec<u8>>,
    pub meta: MemberMeta,
}

/// In-memory view of one mounted container, alive for the duration of a
/// single aggregator compare.  Member order is the container's own.
pub struct Session {
    comment: Vec<u8>,
    members: IndexMap<String, Member>,
}

impl Session {
    pub fn new() -> Session {
        Session {
            comment: Vec::new(),
            members: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, short_name: String, member: Member) {
        self.members.insert(short_name, member);
    }

    pub fn set_comment(&mut self, comment: Vec<u8>) {
        self.comment = comment;
    }

    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    pub fn keys(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn contains(&self, short_name: &str) -> bool {
        self.members.contains_key(short_name)
    }

    pub fn member(&self, short_name: &str, owner: &str) -> Fallible<&Member> {
        self.members
            .get(short_name)
            .ok_or_else(|| format_err!("no member \"{}\" in \"{}\"", short_name, owner))
    }
}

/// One container format.  Implementations are stateless strategies; all
/// per-mount state lives in the `Session` held by the registry side table.
pub trait Container {
    fn kind(&self) -> BoxKind;

    fn applies(&self, registry: &Registry, item: ItemId) -> Fallible<bool>;

    fn keys(&self, registry: &Registry, item: ItemId) -> Fallible<Vec<String>>;

    /// Mount the container.  `None` means the format needs no session
    /// (the directory adapter works straight off the filesystem).
    fn open(&self, registry: &Registry, item: ItemId) -> Fallible<Option<Session>>;
}

pub(crate) fn session_keys(registry: &Registry, item: ItemId) -> Fallible<Vec<String>> {
    registry.with_session(item, |session| Ok(session.keys()))
}

/// Scoped mount of both sides of an aggregate comparison.  Unmounts on drop,
/// so every exit path out of an aggregator releases its sessions.
pub struct Mount<'a> {
    registry: &'a Registry,
    mounted: Vec<ItemId>,
}

impl<'a> Mount<'a> {
    pub fn open_pair(
        container: &dyn Container,
        registry: &'a Registry,
        pair: [ItemId; 2],
    ) -> Fallible<Mount<'a>> {
        let mut guard = Mount {
            registry,
            mounted: Vec::new(),
        };

        for &id in pair.iter() {
            registry.set_kind(id, container.kind());
            if registry.is_mounted(id) {
                continue; // reflexive comparison
            }
            if let Some(session) = container.open(registry, id)? {
                registry.mount(id, session);
                guard.mounted.push(id);
            }
        }

        Ok(guard)
    }
}

impl<'a> Drop for Mount<'a> {
    fn drop(&mut self) {
        for id in self.mounted.drain(..) {
            self.registry.unmount(id);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_join_split() {
        assert_eq!(BoxKind::Dir.join("red", "foo"), "red/foo");
        assert_eq!(
            BoxKind::Tar.join("a.tar", "dir/member"),
            "a.tar{tar}dir/member"
        );
        assert_eq!(BoxKind::Dir.short_name("red/sub/foo"), "foo");
        assert_eq!(BoxKind::Tar.short_name("a.tar{tar}dir/member"), "dir/member");
        assert_eq!(
            BoxKind::Tar.short_name("a.tar{tar}inner.tar{tar}member"),
            "member"
        );
        assert_eq!(BoxKind::Gzip.short_name("x.gz{gzip}{gzipcontent}"), "{gzipcontent}");
        assert_eq!(BoxKind::Dir.short_name("red"), "red");
    }

    #[test]
    fn test_content_names() {
        assert_eq!(BoxKind::Gzip.content_name(), Some("{gzipcontent}"));
        assert_eq!(BoxKind::Bz2.content_name(), Some("{bz2content}"));
        assert_eq!(BoxKind::Xz.content_name(), Some("{xzcontent}"));
        assert_eq!(BoxKind::Tar.content_name(), None);
    }

    #[test]
    fn test_session_member_order() {
        let mut session = Session::new();
        for name in &["zebra", "apple", "mango"] {
            session.insert(
                name.to_string(),
                Member {
                    kind: MemberKind::Regular,
                    size: 0,
                    payload: Rc::new(Vec::new()),
                    meta: MemberMeta::None,
                },
            );
        }
        assert_eq!(session.keys(), vec!["zebra", "apple", "mango"]);
        assert!(session.contains("apple"));
        assert!(!session.contains("pear"));
    }
}
