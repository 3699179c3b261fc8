use std::io::Read;
use std::rc::Rc;

use failure::Fallible;

use super::{session_keys, BoxKind, Container, Member, MemberKind, MemberMeta, Session};
use crate::errors::RcmpError;
use crate::items::{ItemId, Registry};

/// Single-stream compressors.  Each exposes exactly one synthetic member
/// holding the decoded stream; gzip's container timestamp (and any other
/// wrapper noise) never reaches the comparison.
pub struct Encoder {
    kind: BoxKind,
    magic: &'static [u8],
}

pub static GZIP: Encoder = Encoder {
    kind: BoxKind::Gzip,
    magic: b"\x1f\x8b",
};

pub static BZ2: Encoder = Encoder {
    kind: BoxKind::Bz2,
    magic: b"BZ",
};

pub static XZ: Encoder = Encoder {
    kind: BoxKind::Xz,
    magic: b"\xfd7zXZ\x00",
};

impl Container for Encoder {
    fn kind(&self) -> BoxKind {
        self.kind
    }

    fn applies(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Ok(registry.content(item)?.starts_with(self.magic))
    }

    fn keys(&self, registry: &Registry, item: ItemId) -> Fallible<Vec<String>> {
        session_keys(registry, item)
    }

    fn open(&self, registry: &Registry, item: ItemId) -> Fallible<Option<Session>> {
        let name = registry.name(item);
        let bytes = registry.content(item)?;

        let mut decoded = Vec::new();
        let result = match self.kind {
            BoxKind::Gzip => flate2::read::GzDecoder::new(&bytes[..]).read_to_end(&mut decoded),
            BoxKind::Bz2 => bzip2::read::BzDecoder::new(&bytes[..]).read_to_end(&mut decoded),
            BoxKind::Xz => xz2::read::XzDecoder::new(&bytes[..]).read_to_end(&mut decoded),
            other => unreachable!("{:?} is not a stream encoder", other),
        };
        result.map_err(|e| RcmpError::BadArchive(name.to_string(), e.to_string()))?;

        let mut session = Session::new();
        session.insert(
            self.kind
                .content_name()
                .expect("stream encoders have a content name")
                .to_string(),
            Member {
                kind: MemberKind::Regular,
                size: decoded.len() as u64,
                payload: Rc::new(decoded),
                meta: MemberMeta::None,
            },
        );
        Ok(Some(session))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::io::Write;

    pub(crate) fn gzip_bytes(data: &[u8], mtime: u32) -> Vec<u8> {
        let writer = flate2::GzBuilder::new().mtime(mtime).write(
            Vec::new(),
            flate2::Compression::default(),
        );
        let mut writer = writer;
        writer.write_all(data).unwrap();
        writer.finish().unwrap()
    }

    pub(crate) fn bzip2_bytes(data: &[u8], level: u32) -> Vec<u8> {
        let mut writer =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::new(level));
        writer.write_all(data).unwrap();
        writer.finish().unwrap()
    }

    pub(crate) fn xz_bytes(data: &[u8], level: u32) -> Vec<u8> {
        let mut writer = xz2::write::XzEncoder::new(Vec::new(), level);
        writer.write_all(data).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_gzip_open() -> Fallible<()> {
        let registry = Registry::new();
        let item = registry.find_or_create("a.gz", registry.root(), BoxKind::Gzip);
        registry.set_content(item, gzip_bytes(b"stream payload", 1234));

        assert!(GZIP.applies(&registry, item)?);
        let session = GZIP.open(&registry, item)?.unwrap();
        assert_eq!(session.keys(), vec!["{gzipcontent}"]);
        assert_eq!(
            &*session.member("{gzipcontent}", "a.gz")?.payload,
            &b"stream payload".to_vec()
        );
        Ok(())
    }

    #[test]
    fn test_magics_are_distinct() -> Fallible<()> {
        let registry = Registry::new();
        let item = registry.find_or_create("a.bz2", registry.root(), BoxKind::Bz2);
        registry.set_content(item, bzip2_bytes(b"stream payload", 9));

        assert!(BZ2.applies(&registry, item)?);
        assert!(!GZIP.applies(&registry, item)?);
        assert!(!XZ.applies(&registry, item)?);
        Ok(())
    }

    #[test]
    fn test_corrupt_stream() -> Fallible<()> {
        let mut bytes = xz_bytes(b"stream payload", 6);
        let len = bytes.len();
        bytes.truncate(len - 8);

        let registry = Registry::new();
        let item = registry.find_or_create("short.xz", registry.root(), BoxKind::Xz);
        registry.set_content(item, bytes);
        assert!(XZ.open(&registry, item).is_err());
        Ok(())
    }
}
