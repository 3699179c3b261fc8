use std::io::{Cursor, Read};
use std::rc::Rc;

use failure::Fallible;

use super::{session_keys, BoxKind, Container, Member, MemberKind, MemberMeta, Session};
use crate::errors::RcmpError;
use crate::items::{ItemId, Registry};

const MAGIC: &[u8] = b"!<arch>\n";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArMeta {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

/// Unix ar archives.  Members carry uid/gid/mode but in practice are always
/// plain payloads, so the key space is content-only.
pub struct Ar;

pub static AR: Ar = Ar;

impl Container for Ar {
    fn kind(&self) -> BoxKind {
        BoxKind::Ar
    }

    fn applies(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Ok(registry.content(item)?.starts_with(MAGIC))
    }

    fn keys(&self, registry: &Registry, item: ItemId) -> Fallible<Vec<String>> {
        session_keys(registry, item)
    }

    fn open(&self, registry: &Registry, item: ItemId) -> Fallible<Option<Session>> {
        let name = registry.name(item);
        let bytes = registry.content(item)?;
        let mut archive = ar::Archive::new(Cursor::new(&bytes[..]));
        let mut session = Session::new();

        while let Some(entry) = archive.next_entry() {
            let mut entry =
                entry.map_err(|e| RcmpError::BadArchive(name.to_string(), e.to_string()))?;
            let (short, size, meta) = {
                let header = entry.header();
                (
                    String::from_utf8_lossy(header.identifier()).into_owned(),
                    header.size(),
                    ArMeta {
                        uid: header.uid(),
                        gid: header.gid(),
                        mode: header.mode(),
                    },
                )
            };
            let mut payload = Vec::new();
            entry
                .read_to_end(&mut payload)
                .map_err(|e| RcmpError::BadArchive(name.to_string(), e.to_string()))?;
            session.insert(
                short,
                Member {
                    kind: MemberKind::Regular,
                    size,
                    payload: Rc::new(payload),
                    meta: MemberMeta::Ar(meta),
                },
            );
        }

        Ok(Some(session))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn build_ar(members: &[(&str, &[u8], u32, u32, u32)]) -> Vec<u8> {
        let mut builder = ar::Builder::new(Vec::new());
        for (name, data, uid, gid, mode) in members {
            let mut header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            header.set_uid(*uid);
            header.set_gid(*gid);
            header.set_mode(*mode);
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_open() -> Fallible<()> {
        let bytes = build_ar(&[
            ("hello.o", b"hello payload", 1000, 1000, 0o644),
            ("world.o", b"world", 0, 0, 0o755),
        ]);

        let registry = Registry::new();
        let item = registry.find_or_create("lib.a", registry.root(), BoxKind::Ar);
        registry.set_content(item, bytes.clone());
        assert!(AR.applies(&registry, item)?);

        let session = AR.open(&registry, item)?.unwrap();
        assert_eq!(session.keys(), vec!["hello.o", "world.o"]);
        let member = session.member("hello.o", "lib.a")?;
        assert_eq!(&*member.payload, &b"hello payload".to_vec());
        assert_eq!(member.size, 13);
        match &member.meta {
            MemberMeta::Ar(meta) => {
                assert_eq!(meta.uid, 1000);
                assert_eq!(meta.mode, 0o644);
            }
            other => panic!("unexpected meta {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_applies_rejects_other_content() -> Fallible<()> {
        let registry = Registry::new();
        let item = registry.find_or_create("not-an-archive", registry.root(), BoxKind::Dir);
        registry.set_content(item, b"plain text".to_vec());
        assert!(!AR.applies(&registry, item)?);
        Ok(())
    }
}
