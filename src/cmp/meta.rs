use failure::{format_err, Fallible};
use log::log;

use super::{log_different, Comparator, Comparison, Verdict, DIFFERENCES};
use crate::boxes::{BoxKind, MemberMeta};
use crate::items::{ItemId, Registry};

macro_rules! push_field_diff {
    ($diffs:ident, $left:ident, $right:ident, $($field:ident),+) => {
        $(
            if $left.$field != $right.$field {
                $diffs.push_str(&format!(
                    "\n{} = {:?} {:?}",
                    stringify!($field),
                    $left.$field,
                    $right.$field
                ));
            }
        )+
    };
}

fn pair_meta<T, F>(registry: &Registry, pair: [ItemId; 2], pick: F) -> Fallible<(T, T)>
where
    F: Fn(MemberMeta) -> Option<T>,
{
    let mut picked = Vec::with_capacity(2);
    for &item in pair.iter() {
        let meta = pick(registry.member_meta(item)?).ok_or_else(|| {
            format_err!(
                "unexpected member metadata for \"{}\"",
                registry.name(item)
            )
        })?;
        picked.push(meta);
    }
    let second = picked.pop().expect("two metas");
    let first = picked.pop().expect("two metas");
    Ok((first, second))
}

/// Mode and ownership of ar members.  Equality is deliberately not
/// authoritative so that the payload still gets examined downstream.
pub struct ArMemberMetadata;

pub static AR_MEMBER_METADATA: ArMemberMetadata = ArMemberMetadata;

impl Comparator for ArMemberMetadata {
    fn name(&self) -> &'static str {
        "ArMemberMetadata"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Ok(registry.parent_kind(item) == BoxKind::Ar)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let (left, right) = pair_meta(registry, comparison.pair(), |meta| match meta {
            MemberMeta::Ar(meta) => Some(meta),
            _ => None,
        })?;

        let owners_match = comparison.settings().ignore_ownerships
            || (left.uid == right.uid && left.gid == right.gid);
        if owners_match && left.mode == right.mode {
            return Ok(Verdict::Indeterminate);
        }

        log_different(self.name(), &registry.name(comparison.pair()[0]));
        let mut diffs = String::new();
        push_field_diff!(diffs, left, right, uid, gid, mode);
        log!(DIFFERENCES, "{}", diffs);
        Ok(Verdict::Different)
    }
}

/// Tar member headers minus the noise: mtime never participates, and
/// ownership only when asked for.  Sizeless members with equal headers are
/// settled here, which is what terminates directory and device entries.
pub struct TarMemberMetadata;

pub static TAR_MEMBER_METADATA: TarMemberMetadata = TarMemberMetadata;

impl Comparator for TarMemberMetadata {
    fn name(&self) -> &'static str {
        "TarMemberMetadata"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Ok(registry.parent_kind(item) == BoxKind::Tar)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let (left, right) = pair_meta(registry, comparison.pair(), |meta| match meta {
            MemberMeta::Tar(meta) => Some(meta),
            _ => None,
        })?;

        let owners_match = comparison.settings().ignore_ownerships
            || (left.uid == right.uid
                && left.gid == right.gid
                && left.uname == right.uname
                && left.gname == right.gname);
        if left.mode == right.mode
            && left.entry_type == right.entry_type
            && left.linkname == right.linkname
            && owners_match
        {
            return if left.size == 0 && right.size == 0 {
                Ok(Verdict::Same)
            } else {
                Ok(Verdict::Indeterminate)
            };
        }

        log_different(self.name(), &registry.name(comparison.pair()[0]));
        let mut diffs = String::new();
        push_field_diff!(
            diffs, left, right, mode, entry_type, linkname, uid, gid, uname, gname
        );
        log!(DIFFERENCES, "{}", diffs);
        Ok(Verdict::Different)
    }
}

/// Cpio member headers, with the same ownership gate as ar and tar.
pub struct CpioMemberMetadata;

pub static CPIO_MEMBER_METADATA: CpioMemberMetadata = CpioMemberMetadata;

impl Comparator for CpioMemberMetadata {
    fn name(&self) -> &'static str {
        "CpioMemberMetadata"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Ok(registry.parent_kind(item) == BoxKind::Cpio)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let (left, right) = pair_meta(registry, comparison.pair(), |meta| match meta {
            MemberMeta::Cpio(meta) => Some(meta),
            _ => None,
        })?;

        let owners_match = comparison.settings().ignore_ownerships
            || (left.uid == right.uid && left.gid == right.gid);
        if left.mode == right.mode
            && owners_match
            && left.rdevmajor == right.rdevmajor
            && left.rdevminor == right.rdevminor
            && left.filesize == right.filesize
        {
            return if left.filesize == 0 {
                Ok(Verdict::Same)
            } else {
                Ok(Verdict::Indeterminate)
            };
        }

        log_different(self.name(), &registry.name(comparison.pair()[0]));
        let mut diffs = String::new();
        push_field_diff!(
            diffs, left, right, mode, uid, gid, rdevmajor, rdevminor, filesize
        );
        log!(DIFFERENCES, "{}", diffs);
        Ok(Verdict::Different)
    }
}

/// Central-directory fields of zip members.  Not part of the default
/// chain; available for callers that want stricter zip comparisons.
pub struct ZipMemberMetadata;

pub static ZIP_MEMBER_METADATA: ZipMemberMetadata = ZipMemberMetadata;

impl Comparator for ZipMemberMetadata {
    fn name(&self) -> &'static str {
        "ZipMemberMetadata"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Ok(registry.parent_kind(item) == BoxKind::Zip)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let (left, right) = pair_meta(registry, comparison.pair(), |meta| match meta {
            MemberMeta::Zip(meta) => Some(meta),
            _ => None,
        })?;

        if left == right {
            return Ok(Verdict::Indeterminate);
        }

        log_different(self.name(), &registry.name(comparison.pair()[0]));
        let mut diffs = String::new();
        push_field_diff!(diffs, left, right, compression, comment, unix_mode);
        log!(DIFFERENCES, "{}", diffs);
        Ok(Verdict::Different)
    }
}
