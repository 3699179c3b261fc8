use std::rc::Rc;

use failure::Fallible;

use super::{session_keys, BoxKind, Container, Member, MemberKind, MemberMeta, Session};
use crate::errors::RcmpError;
use crate::items::{ItemId, Registry};

const MAGICS: [&[u8]; 2] = [b"070701", b"070702"];
const HEADER_LEN: usize = 110;
const TRAILER: &str = "TRAILER!!!";

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFREG: u32 = 0o100_000;
const S_IFLNK: u32 = 0o120_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpioMeta {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdevmajor: u32,
    pub rdevminor: u32,
    pub filesize: u32,
}

/// Cpio archives in the portable ASCII (newc/crc) form.  Symlink members
/// store their target as the member payload.
pub struct Cpio;

pub static CPIO: Cpio = Cpio;

impl Container for Cpio {
    fn kind(&self) -> BoxKind {
        BoxKind::Cpio
    }

    fn applies(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        let bytes = registry.content(item)?;
        Ok(MAGICS.iter().any(|magic| bytes.starts_with(magic)))
    }

    fn keys(&self, registry: &Registry, item: ItemId) -> Fallible<Vec<String>> {
        session_keys(registry, item)
    }

    fn open(&self, registry: &Registry, item: ItemId) -> Fallible<Option<Session>> {
        let name = registry.name(item);
        let bytes = registry.content(item)?;
        let mut session = Session::new();

        let mut offset = 0;
        loop {
            let record = Record::parse(&bytes, offset)
                .map_err(|reason| RcmpError::BadArchive(name.to_string(), reason))?;
            if record.name == TRAILER {
                break;
            }

            let file_type = record.meta.mode & S_IFMT;
            let kind = match file_type {
                S_IFREG => MemberKind::Regular,
                S_IFDIR => MemberKind::Directory,
                S_IFLNK => {
                    MemberKind::Symlink(String::from_utf8_lossy(&record.payload).into_owned())
                }
                _ => MemberKind::Other,
            };

            session.insert(
                record.name,
                Member {
                    kind,
                    size: record.meta.filesize as u64,
                    payload: Rc::new(record.payload),
                    meta: MemberMeta::Cpio(record.meta),
                },
            );
            offset = record.next;
        }

        Ok(Some(session))
    }
}

struct Record {
    name: String,
    meta: CpioMeta,
    payload: Vec<u8>,
    next: usize,
}

impl Record {
    // 110 ASCII bytes: magic, then 13 fields of 8 hex digits; the name and
    // the payload are each padded out to a multiple of 4.
    fn parse(bytes: &[u8], offset: usize) -> Result<Record, String> {
        let header = bytes
            .get(offset..offset + HEADER_LEN)
            .ok_or_else(|| format!("truncated header at offset {}", offset))?;
        if !MAGICS.iter().any(|magic| header.starts_with(magic)) {
            return Err(format!("bad magic at offset {}", offset));
        }

        let field = |index: usize| -> Result<u32, String> {
            let start = 6 + index * 8;
            let text = std::str::from_utf8(&header[start..start + 8])
                .map_err(|_| format!("non-ascii header field {}", index))?;
            u32::from_str_radix(text, 16).map_err(|_| format!("bad header field {}", index))
        };

        let meta = CpioMeta {
            mode: field(1)?,
            uid: field(2)?,
            gid: field(3)?,
            filesize: field(6)?,
            rdevmajor: field(9)?,
            rdevminor: field(10)?,
        };
        let namesize = field(11)? as usize;

        let name_start = offset + HEADER_LEN;
        let name_bytes = bytes
            .get(name_start..name_start + namesize)
            .ok_or_else(|| format!("truncated name at offset {}", name_start))?;
        // namesize counts the trailing NUL
        let name = String::from_utf8_lossy(&name_bytes[..namesize.saturating_sub(1)]).into_owned();

        let data_start = pad4(name_start + namesize);
        let data_end = data_start + meta.filesize as usize;
        let payload = if name == TRAILER {
            Vec::new()
        } else {
            bytes
                .get(data_start..data_end)
                .ok_or_else(|| format!("truncated payload for \"{}\"", name))?
                .to_vec()
        };

        Ok(Record {
            name,
            meta,
            payload,
            next: pad4(data_end),
        })
    }
}

fn pad4(offset: usize) -> usize {
    (offset + 3) & !3
}
