use std::io::{Cursor, Read};
use std::rc::Rc;

use failure::Fallible;

use super::{session_keys, BoxKind, Container, Member, MemberKind, MemberMeta, Session};
use crate::errors::RcmpError;
use crate::items::{ItemId, Registry};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZipMeta {
    pub compression: String,
    pub comment: String,
    pub unix_mode: Option<u32>,
}

/// Zip archives.  Every payload is CRC-checked while the session is built,
/// so a corrupt archive surfaces at open time.  The archive-level comment is
/// kept on the session; member `extra` fields are intentionally ignored.
pub struct Zip;

pub static ZIP: Zip = Zip;

impl Container for Zip {
    fn kind(&self) -> BoxKind {
        BoxKind::Zip
    }

    fn applies(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        let bytes = registry.content(item)?;
        Ok(zip::ZipArchive::new(Cursor::new(&bytes[..])).is_ok())
    }

    fn keys(&self, registry: &Registry, item: ItemId) -> Fallible<Vec<String>> {
        session_keys(registry, item)
    }

    fn open(&self, registry: &Registry, item: ItemId) -> Fallible<Option<Session>> {
        let name = registry.name(item);
        let bytes = registry.content(item)?;
        let mut archive = zip::ZipArchive::new(Cursor::new(&bytes[..]))
            .map_err(|e| RcmpError::BadArchive(name.to_string(), e.to_string()))?;

        let mut session = Session::new();
        session.set_comment(archive.comment().to_vec());

        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| RcmpError::BadArchive(name.to_string(), e.to_string()))?;
            let short = file.name().to_string();
            let meta = ZipMeta {
                compression: format!("{:?}", file.compression()),
                comment: file.comment().to_string(),
                unix_mode: file.unix_mode(),
            };
            let size = file.size();
            let mut payload = Vec::new();
            file.read_to_end(&mut payload)
                .map_err(|e| RcmpError::BadArchive(name.to_string(), e.to_string()))?;
            session.insert(
                short,
                Member {
                    kind: MemberKind::Regular,
                    size,
                    payload: Rc::new(payload),
                    meta: MemberMeta::Zip(meta),
                },
            );
        }

        Ok(Some(session))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    pub(crate) fn build_zip(members: &[(&str, &[u8])], comment: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.set_comment(comment.to_string());
        for (name, data) in members {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_open() -> Fallible<()> {
        let bytes = build_zip(&[("foo", b"foo bytes"), ("bar", b"bar")], "release build");

        let registry = Registry::new();
        let item = registry.find_or_create("a.zip", registry.root(), BoxKind::Zip);
        registry.set_content(item, bytes);
        assert!(ZIP.applies(&registry, item)?);

        let session = ZIP.open(&registry, item)?.unwrap();
        assert_eq!(session.comment(), b"release build");
        assert_eq!(session.keys(), vec!["foo", "bar"]);
        assert_eq!(
            &*session.member("foo", "a.zip")?.payload,
            &b"foo bytes".to_vec()
        );
        Ok(())
    }

    #[test]
    fn test_open_rejects_truncated() -> Fallible<()> {
        let mut bytes = build_zip(&[("foo", b"foo bytes")], "");
        bytes.truncate(bytes.len() / 2);

        let registry = Registry::new();
        let item = registry.find_or_create("broken.zip", registry.root(), BoxKind::Zip);
        registry.set_content(item, bytes);
        assert!(ZIP.open(&registry, item).is_err());
        Ok(())
    }
}
