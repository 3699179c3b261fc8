use std::cmp::min;

use failure::Fallible;
use lazy_static::lazy_static;
use regex::Regex;

use super::{log_different, log_indeterminate, log_same, log_unidiff, Comparator, Comparison, Verdict};
use crate::dateblot::date_blot;
use crate::items::{ItemId, Registry};

/// Last path component of an extended name, with any container tag
/// stripped off.
fn basename(name: &str) -> &str {
    let tail = name.rsplit('/').next().unwrap_or(name);
    match tail.rfind('}') {
        Some(index) => &tail[index + 1..],
        None => tail,
    }
}

/// Offset of the `count`th newline, requiring each line to fit inside
/// `bound` bytes when one is given.  `None` if the content runs out first.
fn scan_lines(content: &[u8], count: usize, bound: Option<usize>) -> Option<usize> {
    let mut position: i64 = -1;
    for _ in 0..count {
        let start = (position + 1) as usize;
        let end = match bound {
            Some(bound) => min(content.len(), (position + bound as i64) as usize),
            None => content.len(),
        };
        if start >= end {
            return None;
        }
        match content[start..end].iter().position(|&b| b == b'\n') {
            Some(offset) => position = (start + offset) as i64,
            None => return None,
        }
    }
    Some(position as usize)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack
            .windows(needle.len())
            .any(|window| window == needle)
}

/// Phrase within the first `lines` lines of the content.
fn triggered(content: &[u8], phrase: &str, lines: usize, bound: Option<usize>) -> bool {
    match scan_lines(content, lines, bound) {
        Some(position) => contains(&content[..position], phrase.as_bytes()),
        None => false,
    }
}

/// Automake-generated Makefiles differ in embedded timestamps and version
/// stamps; they are the same aside from that.
pub struct AM;

lazy_static! {
    static ref MODVERSION_ASSIGN: Regex = Regex::new(r"(?m)^MODVERSION = .*$").unwrap();
    static ref BUILDINFO_ASSIGN: Regex = Regex::new(r"(?m)^BUILDINFO = .*$").unwrap();
    static ref CC_TEMP: Regex = Regex::new(r"(?m)/cc.{6}\.([os])").unwrap();
    static ref MODVERSION_LINE: Regex = Regex::new(r"(?m)MODVERSION.*$").unwrap();
    static ref TMP_NUMBER: Regex = Regex::new(r"tmp-\d*").unwrap();
}

impl AM {
    fn normalize(content: &[u8]) -> String {
        let text = date_blot(&String::from_utf8_lossy(content));
        let text = MODVERSION_ASSIGN.replace_all(&text, "MODVERSION = ...");
        BUILDINFO_ASSIGN
            .replace_all(&text, "BUILDINFO = ...")
            .into_owned()
    }
}

impl Comparator for AM {
    fn name(&self) -> &'static str {
        "AM"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        if basename(&registry.name(item)) != "Makefile" {
            return Ok(false);
        }
        // five short lines, then the automake stamp
        Ok(triggered(
            &registry.content(item)?,
            "generated by automake",
            5,
            Some(132),
        ))
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        let left_text = Self::normalize(&registry.content(left)?);
        let right_text = Self::normalize(&registry.content(right)?);

        if left_text == right_text {
            log_same(self.name(), &registry.name(left));
            Ok(Verdict::Same)
        } else {
            log_different(self.name(), &registry.name(left));
            log_unidiff(
                &left_text,
                &right_text,
                &registry.name(left),
                &registry.name(right),
            );
            Ok(Verdict::Different)
        }
    }
}

/// Autoconf droppings: config.log leaks the names of compiler temp files,
/// and all three carry timestamps and version stamps.
pub struct ConfigLog;

pub static CONFIG_LOG: ConfigLog = ConfigLog;

impl ConfigLog {
    fn trigger(name: &str) -> Option<&'static str> {
        match basename(name) {
            "config.log" => Some("generated by GNU Autoconf"),
            "config.status" => Some("Generated by configure."),
            "config.h" => Some("Generated from config.h.in by configure."),
            _ => None,
        }
    }

    fn normalize(content: &[u8]) -> String {
        let text = String::from_utf8_lossy(content);
        let text = CC_TEMP.replace_all(&text, "/cc------.${1}");
        let text = MODVERSION_LINE.replace_all(&text, "MODVERSION...");
        date_blot(&text)
    }
}

impl Comparator for ConfigLog {
    fn name(&self) -> &'static str {
        "ConfigLog"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        let phrase = match Self::trigger(&registry.name(item)) {
            Some(phrase) => phrase,
            None => return Ok(false),
        };
        Ok(triggered(&registry.content(item)?, phrase, 8, None))
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        let left_text = Self::normalize(&registry.content(left)?);
        let right_text = Self::normalize(&registry.content(right)?);

        if left_text == right_text {
            log_same(self.name(), &registry.name(left));
            Ok(Verdict::Same)
        } else {
            log_different(self.name(), &registry.name(left));
            log_unidiff(
                &left_text,
                &right_text,
                &registry.name(left),
                &registry.name(right),
            );
            Ok(Verdict::Different)
        }
    }
}

/// Kernel "make config" output embeds a timestamp on the fourth line.
pub struct KernelConf;

pub static KERNEL_CONF: KernelConf = KernelConf;

impl KernelConf {
    fn trigger(name: &str) -> Option<&'static str> {
        match basename(name) {
            "auto.conf" => Some("Automatically generated make config: don't edit"),
            "autoconf.h" => Some("Automatically generated C config: don't edit"),
            _ => None,
        }
    }

    fn without_stamp_line(content: &[u8]) -> Vec<&[u8]> {
        let mut lines: Vec<&[u8]> = content.split(|&b| b == b'\n').collect();
        if lines.len() > 3 {
            lines.remove(3);
        }
        lines
    }
}

impl Comparator for KernelConf {
    fn name(&self) -> &'static str {
        "KernelConf"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        let phrase = match Self::trigger(&registry.name(item)) {
            Some(phrase) => phrase,
            None => return Ok(false),
        };
        Ok(triggered(&registry.content(item)?, phrase, 8, None))
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        let left_content = registry.content(left)?;
        let right_content = registry.content(right)?;

        if Self::without_stamp_line(&left_content) == Self::without_stamp_line(&right_content) {
            log_same(self.name(), &registry.name(left));
            Ok(Verdict::Same)
        } else {
            log_different(self.name(), &registry.name(left));
            log_unidiff(
                &String::from_utf8_lossy(&left_content),
                &String::from_utf8_lossy(&right_content),
                &registry.name(left),
                &registry.name(right),
            );
            Ok(Verdict::Different)
        }
    }
}

/// Linker map files reference the generated temp name of the output.
pub struct Map;

pub static MAP: Map = Map;

impl Comparator for Map {
    fn name(&self) -> &'static str {
        "Map"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Ok(registry
            .content(item)?
            .starts_with(b"Archive member included"))
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        let blot = |content: &[u8]| {
            TMP_NUMBER
                .replace_all(&String::from_utf8_lossy(content), "tmp-0")
                .into_owned()
        };

        if blot(&registry.content(left)?) == blot(&registry.content(right)?) {
            log_same(self.name(), &registry.name(left));
            Ok(Verdict::Same)
        } else {
            log_indeterminate(self.name(), &registry.name(left));
            Ok(Verdict::Indeterminate)
        }
    }
}

fn replace_bytes(content: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    let mut rest = content;
    while let Some(position) = rest
        .windows(from.len())
        .position(|window| window == from)
    {
        out.extend_from_slice(&rest[..position]);
        out.extend_from_slice(to);
        rest = &rest[position + from.len()..];
    }
    out.extend_from_slice(rest);
    out
}

/// Unique leading path components of two names sharing a common suffix.
fn unique_heads<'a>(this: &'a str, that: &'a str) -> (String, String) {
    let mut these: Vec<&str> = this.split('/').collect();
    let mut those: Vec<&str> = that.split('/').collect();
    while these.len() > 1 && those.len() > 1 && these.last() == those.last() {
        these.pop();
        those.pop();
    }
    (these.join("/"), those.join("/"))
}

/// Files that differ only by their own build paths buried in the payload.
/// Not part of the default chain.
pub struct BuriedPath;

pub static BURIED_PATH: BuriedPath = BuriedPath;

impl Comparator for BuriedPath {
    fn name(&self) -> &'static str {
        "BuriedPath"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        registry.is_reg(item)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        let left_name = registry.name(left);
        let right_name = registry.name(right);
        let (left_head, right_head) = unique_heads(&left_name, &right_name);

        let left_content = registry.content(left)?;
        if !left_head.is_empty()
            && !right_head.is_empty()
            && contains(&left_content, left_head.as_bytes())
        {
            let right_content = registry.content(right)?;
            let placeholder = b"@placeholder@";
            let blotted_left = replace_bytes(&left_content, left_head.as_bytes(), placeholder);
            let blotted_right = replace_bytes(&right_content, right_head.as_bytes(), placeholder);
            if blotted_left == blotted_right {
                log_same(self.name(), &left_name);
                return Ok(Verdict::Same);
            }
        }

        log_indeterminate(self.name(), &left_name);
        Ok(Verdict::Indeterminate)
    }
}

/// Last-ditch textual equality after canonicalizing every recognizable
/// date rendering.
pub struct DateBlotBitwise;

pub static DATE_BLOT_BITWISE: DateBlotBitwise = DateBlotBitwise;

impl Comparator for DateBlotBitwise {
    fn name(&self) -> &'static str {
        "DateBlotBitwise"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        registry.is_reg(item)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let [left, right] = comparison.pair();
        let left_text = date_blot(&String::from_utf8_lossy(&registry.content(left)?));
        let right_text = date_blot(&String::from_utf8_lossy(&registry.content(right)?));

        if left_text == right_text {
            log_same(self.name(), &registry.name(left));
            Ok(Verdict::Same)
        } else {
            log_indeterminate(self.name(), &registry.name(left));
            Ok(Verdict::Indeterminate)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_basename() {
        assert_eq!(basename("red/sub/Makefile"), "Makefile");
        assert_eq!(basename("a.tar{tar}src/Makefile"), "Makefile");
        assert_eq!(basename("a.tar{tar}Makefile"), "Makefile");
        assert_eq!(basename("x.gz{gzip}{gzipcontent}"), "");
        assert_eq!(basename("Makefile"), "Makefile");
    }

    #[test]
    fn test_scan_lines() {
        let content = b"one\ntwo\nthree\nfour\nfive\nrest";
        assert_eq!(scan_lines(content, 1, None), Some(3));
        assert_eq!(scan_lines(content, 5, None), Some(23));
        assert_eq!(scan_lines(content, 6, None), None);

        let long = vec![b'x'; 200];
        assert_eq!(scan_lines(&long, 1, Some(132)), None);
    }

    #[test]
    fn test_unique_heads() {
        assert_eq!(
            unique_heads("red/sub/foo", "blue/sub/foo"),
            ("red".to_string(), "blue".to_string())
        );
        assert_eq!(
            unique_heads("a/b", "c/d"),
            ("a/b".to_string(), "c/d".to_string())
        );
    }

    #[test]
    fn test_replace_bytes() {
        assert_eq!(
            replace_bytes(b"red one red two", b"red", b"@p@"),
            b"@p@ one @p@ two".to_vec()
        );
        assert_eq!(replace_bytes(b"no hits", b"red", b"@p@"), b"no hits".to_vec());
    }

    #[test]
    fn test_am_normalize() {
        let makefile = b"# Makefile.in generated by automake 1.11\nMODVERSION = 1.2.3-20110413\nBUILDINFO = host x\nbuilt Sun Feb 13 12:29:28 PST 2011\n";
        let other = b"# Makefile.in generated by automake 1.11\nMODVERSION = 1.2.4-20110414\nBUILDINFO = host y\nbuilt Mon Feb 14 09:00:00 PDT 2011\n";
        assert_eq!(AM::normalize(makefile), AM::normalize(other));
    }

    #[test]
    fn test_config_log_normalize() {
        let left = b"conftest: /tmp/ccAbCdEf.o failed\nMODVERSION 1.2.3\n";
        let right = b"conftest: /tmp/ccXyZwVu.o failed\nMODVERSION 9.9.9\n";
        assert_eq!(ConfigLog::normalize(left), ConfigLog::normalize(right));
    }

    #[test]
    fn test_kernel_conf_stamp_line() {
        let left = b"#\n# Automatically generated make config: don't edit\n#\n# Wed Apr 13 10:00:00 2011\nCONFIG_X=y\n";
        let right = b"#\n# Automatically generated make config: don't edit\n#\n# Thu Apr 14 11:30:00 2011\nCONFIG_X=y\n";
        assert_eq!(
            KernelConf::without_stamp_line(left),
            KernelConf::without_stamp_line(right)
        );
        let changed = b"#\n# Automatically generated make config: don't edit\n#\n# stamp\nCONFIG_X=n\n";
        assert_ne!(
            KernelConf::without_stamp_line(left),
            KernelConf::without_stamp_line(changed)
        );
    }
}
