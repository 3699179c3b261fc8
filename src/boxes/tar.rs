use std::io::{Cursor, Read};
use std::rc::Rc;

use failure::Fallible;
use tar::EntryType;

use super::{session_keys, BoxKind, Container, Member, MemberKind, MemberMeta, Session};
use crate::errors::RcmpError;
use crate::items::{ItemId, Registry};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TarMeta {
    pub mode: u32,
    pub entry_type: u8,
    pub linkname: String,
    pub uid: u64,
    pub gid: u64,
    pub uname: String,
    pub gname: String,
    pub size: u64,
}

/// Tar archives.  Keys are the full member paths; only regular members have
/// payloads, directories and devices read back empty.  Compressed tarballs
/// are unwrapped one layer at a time by the generic stream decoders, so this
/// adapter only ever sees plain tar bytes.
pub struct Tar;

pub static TAR: Tar = Tar;

impl Container for Tar {
    fn kind(&self) -> BoxKind {
        BoxKind::Tar
    }

    fn applies(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        // trial-open: there is no reliable magic for old style archives
        let bytes = registry.content(item)?;
        let mut archive = tar::Archive::new(Cursor::new(&bytes[..]));
        Ok(match archive.entries() {
            Ok(mut entries) => matches!(entries.next(), Some(Ok(_))),
            Err(_) => false,
        })
    }

    fn keys(&self, registry: &Registry, item: ItemId) -> Fallible<Vec<String>> {
        session_keys(registry, item)
    }

    fn open(&self, registry: &Registry, item: ItemId) -> Fallible<Option<Session>> {
        let name = registry.name(item);
        let bad = |e: std::io::Error| RcmpError::BadArchive(name.to_string(), e.to_string());

        let bytes = registry.content(item)?;
        let mut archive = tar::Archive::new(Cursor::new(&bytes[..]));
        let mut session = Session::new();

        for entry in archive.entries().map_err(bad)? {
            let mut entry = entry.map_err(bad)?;
            let short = entry.path().map_err(bad)?.to_string_lossy().into_owned();
            let (kind, size, meta) = {
                let header = entry.header();
                let entry_type = header.entry_type();
                let linkname = header
                    .link_name()
                    .map_err(bad)?
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let meta = TarMeta {
                    mode: header.mode().map_err(bad)?,
                    entry_type: entry_type.as_byte(),
                    linkname: linkname.clone(),
                    uid: header.uid().map_err(bad)?,
                    gid: header.gid().map_err(bad)?,
                    uname: header
                        .username()
                        .ok()
                        .and_then(|u| u)
                        .unwrap_or("")
                        .to_string(),
                    gname: header
                        .groupname()
                        .ok()
                        .and_then(|g| g)
                        .unwrap_or("")
                        .to_string(),
                    size: header.size().map_err(bad)?,
                };
                let kind = match entry_type {
                    EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                        MemberKind::Regular
                    }
                    EntryType::Directory => MemberKind::Directory,
                    EntryType::Symlink => MemberKind::Symlink(linkname),
                    _ => MemberKind::Other,
                };
                (kind, meta.size, meta)
            };

            let payload = if kind == MemberKind::Regular {
                let mut payload = Vec::new();
                entry.read_to_end(&mut payload).map_err(bad)?;
                payload
            } else {
                Vec::new()
            };

            session.insert(
                short,
                Member {
                    kind,
                    size,
                    payload: Rc::new(payload),
                    meta: MemberMeta::Tar(meta),
                },
            );
        }

        Ok(Some(session))
    }
}
