pub mod basic;
pub mod elf;
pub mod meta;
pub mod text;

use std::collections::HashSet;
use std::mem;
use std::rc::Rc;

use failure::Fallible;
use log::{log, trace, Level};
use similar::TextDiff;

use crate::boxes::{BoxKind, Container, Mount};
use crate::errors::RcmpError;
use crate::ignores::IgnoreSet;
use crate::items::{ItemId, Registry};

// Verdicts log around the warning anchor so `-v` dials in differences
// first, then sames, then the indeterminate chatter.
pub const DIFFERENCES: Level = Level::Warn;
pub const SAMES: Level = Level::Info;
pub const INDETERMINATES: Level = Level::Debug;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Verdict {
    Same,
    Different,
    /// No authoritative determination; the next comparator in the chain is
    /// tried.  Fatal if the whole chain declines.
    Indeterminate,
}

/// One comparison heuristic.  Implementations are stateless strategies;
/// aggregators additionally mount both sides and recurse into members.
pub trait Comparator {
    fn name(&self) -> &'static str;

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool>;

    fn applies(&self, registry: &Registry, pair: &[ItemId; 2]) -> Fallible<bool> {
        Ok(self.applies_item(registry, pair[0])? && self.applies_item(registry, pair[1])?)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict>;
}

pub struct Settings {
    pub comparators: Vec<&'static dyn Comparator>,
    pub ignores: IgnoreSet,
    pub exit_asap: bool,
    pub ignore_ownerships: bool,
}

impl Settings {
    pub fn with_defaults(ignores: IgnoreSet, exit_asap: bool, ignore_ownerships: bool) -> Settings {
        Settings {
            comparators: default_comparators(),
            ignores,
            exit_asap,
            ignore_ownerships,
        }
    }
}

/// The default chain, cheapest and most decisive first.  The stream
/// decoders run before the tar adapter so that compressed tarballs are
/// unwrapped one layer at a time.  `Fail` terminates the chain, so no pair
/// escapes without a verdict.
pub fn default_comparators() -> Vec<&'static dyn Comparator> {
    vec![
        &basic::NO_SUCH_FILE,
        &basic::INODE,
        &basic::EMPTY_FILE,
        &crate::boxes::dir::DIR,
        &meta::AR_MEMBER_METADATA,
        &basic::BITWISE,
        &basic::SYMLINK,
        &elf::ELF,
        &crate::boxes::ar::AR,
        &text::AM,
        &text::CONFIG_LOG,
        &text::KERNEL_CONF,
        &crate::boxes::encoder::XZ,
        &crate::boxes::encoder::BZ2,
        &crate::boxes::encoder::GZIP,
        &crate::boxes::zip::ZIP,
        &meta::TAR_MEMBER_METADATA,
        &crate::boxes::tar::TAR,
        &meta::CPIO_MEMBER_METADATA,
        &crate::boxes::cpio::CPIO,
        &text::MAP,
        &text::DATE_BLOT_BITWISE,
        &basic::FAIL,
    ]
}

pub struct Comparison {
    pair: [ItemId; 2],
    settings: Rc<Settings>,
    children: Vec<Comparison>,
}

impl Comparison {
    pub fn new(
        registry: &Registry,
        left: &str,
        right: &str,
        settings: Rc<Settings>,
    ) -> Fallible<Comparison> {
        for name in &[left, right] {
            if let Some(pattern) = settings.ignores.ignoring(name) {
                return Err(
                    RcmpError::IgnoredAtTop(name.to_string(), pattern.to_string()).into(),
                );
            }
        }

        let pair = [
            registry.find_or_create(left, registry.root(), BoxKind::Dir),
            registry.find_or_create(right, registry.root(), BoxKind::Dir),
        ];
        Ok(Comparison::from_pair(pair, settings))
    }

    pub(crate) fn from_pair(pair: [ItemId; 2], settings: Rc<Settings>) -> Comparison {
        Comparison {
            pair,
            settings,
            children: Vec::new(),
        }
    }

    pub fn pair(&self) -> [ItemId; 2] {
        self.pair
    }

    pub fn settings(&self) -> &Rc<Settings> {
        &self.settings
    }

    /// Run the chain.  The first authoritative verdict wins and releases
    /// the pair's payload caches; `Indeterminate` means the whole chain
    /// declined, which callers treat as fatal.
    pub fn compare(&mut self, registry: &Registry) -> Fallible<Verdict> {
        let settings = self.settings.clone();
        for comparator in &settings.comparators {
            if !comparator.applies(registry, &self.pair)? {
                trace!(
                    "does not apply - {} \"{}\"",
                    comparator.name(),
                    registry.name(self.pair[0])
                );
                continue;
            }

            trace!(
                "applies - {} \"{}\"",
                comparator.name(),
                registry.name(self.pair[0])
            );
            let verdict = comparator.compare(registry, self)?;
            if verdict != Verdict::Indeterminate {
                registry.reset_item(self.pair[0]);
                registry.reset_item(self.pair[1]);
                return Ok(verdict);
            }
        }

        log!(
            INDETERMINATES,
            "indeterminate result for \"{}\" and \"{}\"",
            registry.name(self.pair[0]),
            registry.name(self.pair[1])
        );
        Ok(Verdict::Indeterminate)
    }

    /// Aggregate compare over mounted containers: a pair of directed outer
    /// joins to surface unmated members, then the inner join recursing into
    /// every spooled child.
    pub(crate) fn aggregate(&mut self, registry: &Registry, kind: BoxKind) -> Fallible<Verdict> {
        let mut verdict = Verdict::Same;

        let left_only = self.outer_join(registry, kind, false, true)?;
        let right_only = self.outer_join(registry, kind, true, false)?;
        if left_only == Verdict::Different || right_only == Verdict::Different {
            verdict = Verdict::Different;
            if self.settings.exit_asap {
                return Ok(verdict);
            }
        }

        let children = mem::replace(&mut self.children, Vec::new());
        for mut child in children {
            match child.compare(registry)? {
                Verdict::Indeterminate => {
                    log_indeterminate(kind.name(), &registry.name(child.pair[0]));
                    return Err(
                        RcmpError::Indeterminate(registry.name(child.pair[0]).to_string()).into(),
                    );
                }
                Verdict::Different => {
                    verdict = Verdict::Different;
                    if self.settings.exit_asap {
                        return Ok(verdict);
                    }
                }
                Verdict::Same => {}
            }
        }

        match verdict {
            Verdict::Same => log_same(kind.name(), &registry.name(self.pair[0])),
            _ => log_different(kind.name(), &registry.name(self.pair[0])),
        }
        Ok(verdict)
    }

    fn outer_join(
        &mut self,
        registry: &Registry,
        kind: BoxKind,
        invert: bool,
        spool: bool,
    ) -> Fallible<Verdict> {
        let container = kind.container();
        let (lparent, rparent) = if invert {
            (self.pair[1], self.pair[0])
        } else {
            (self.pair[0], self.pair[1])
        };

        let lparent_name = registry.name(lparent);
        let rparent_name = registry.name(rparent);
        let rkeys: HashSet<String> = container.keys(registry, rparent)?.into_iter().collect();
        let mut verdict = Verdict::Same;

        for short in container.keys(registry, lparent)? {
            let lname = kind.join(&lparent_name, &short);
            if let Some(pattern) = self.settings.ignores.ignoring(&lname) {
                log!(SAMES, "Ignoring \"{}\" cause \"{}\"", lname, pattern);
                continue;
            }
            let litem = registry.find_or_create(&lname, lparent, kind);

            let rname = kind.join(&rparent_name, &short);
            if let Some(pattern) = self.settings.ignores.ignoring(&rname) {
                log!(SAMES, "Ignoring \"{}\" cause \"{}\"", rname, pattern);
                continue;
            }
            let ritem = registry.find_or_create(&rname, rparent, kind);

            if rkeys.contains(&short) {
                if spool {
                    trace!("spooling \"{}\"", lname);
                    self.children
                        .push(Comparison::from_pair([litem, ritem], self.settings.clone()));
                }
            } else {
                log!(
                    DIFFERENCES,
                    "Different {} no mate: \"{}\"",
                    kind.name(),
                    lname
                );
                verdict = Verdict::Different;
            }
        }

        Ok(verdict)
    }
}

/// Positionally aligned name lists: one from column a, one from column b.
pub struct ComparisonList {
    lists: [Vec<String>; 2],
    settings: Rc<Settings>,
}

impl ComparisonList {
    pub fn new(left: Vec<String>, right: Vec<String>, settings: Rc<Settings>) -> ComparisonList {
        let filter = |names: Vec<String>| {
            names
                .into_iter()
                .filter(|name| match settings.ignores.ignoring(name) {
                    Some(pattern) => {
                        log!(SAMES, "Ignoring \"{}\" cause \"{}\"", name, pattern);
                        false
                    }
                    None => true,
                })
                .collect()
        };
        ComparisonList {
            lists: [filter(left), filter(right)],
            settings,
        }
    }

    pub fn compare(&self, registry: &Registry) -> Fallible<Verdict> {
        if self.lists[0].len() != self.lists[1].len() {
            log!(
                DIFFERENCES,
                "Different lists are of different sizes: {} and {}",
                self.lists[0].len(),
                self.lists[1].len()
            );
            return Ok(Verdict::Different);
        }

        let mut verdict = Verdict::Same;
        for (left, right) in self.lists[0].iter().zip(self.lists[1].iter()) {
            let mut comparison = Comparison::new(registry, left, right, self.settings.clone())?;
            match comparison.compare(registry)? {
                Verdict::Indeterminate => {
                    return Err(RcmpError::Indeterminate(left.to_string()).into());
                }
                Verdict::Different => {
                    verdict = Verdict::Different;
                    if self.settings.exit_asap {
                        return Ok(verdict);
                    }
                }
                Verdict::Same => {}
            }
        }

        if verdict == Verdict::Same {
            log!(SAMES, "Same lists");
        }
        Ok(verdict)
    }
}

pub(crate) fn log_same(who: &str, name: &str) {
    log!(SAMES, "Same {} \"{}\"", who, name);
}

pub(crate) fn log_different(who: &str, name: &str) {
    log!(DIFFERENCES, "Different {} \"{}\"", who, name);
}

pub(crate) fn log_indeterminate(who: &str, name: &str) {
    log!(INDETERMINATES, "Indeterminate {} \"{}\"", who, name);
}

pub(crate) fn log_unidiff(left: &str, right: &str, lname: &str, rname: &str) {
    let diff = TextDiff::from_lines(left, right);
    log!(
        DIFFERENCES,
        "{}",
        diff.unified_diff().context_radius(3).header(lname, rname)
    );
}

// An aggregator is the container capability plus the comparator one: its
// compare mounts both sides, binds their boxes, and runs the joins.  The
// mount guard releases the sessions on every exit path.

fn aggregate_compare(
    container: &'static dyn Container,
    who: &'static str,
    registry: &Registry,
    comparison: &mut Comparison,
) -> Fallible<Verdict> {
    let _guard = match Mount::open_pair(container, registry, comparison.pair()) {
        Ok(guard) => guard,
        Err(e) => return bad_archive_verdict(e, who),
    };
    comparison.aggregate(registry, container.kind())
}

/// A container that fails its own self-test is authoritatively different,
/// not indeterminate.
fn bad_archive_verdict(error: failure::Error, who: &str) -> Fallible<Verdict> {
    if let Some(RcmpError::BadArchive(name, reason)) = error.downcast_ref::<RcmpError>() {
        log!(DIFFERENCES, "Different {} \"{}\": {}", who, name, reason);
        Ok(Verdict::Different)
    } else {
        Err(error)
    }
}

impl Comparator for crate::boxes::dir::Dir {
    fn name(&self) -> &'static str {
        "Dir"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Container::applies(self, registry, item)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        aggregate_compare(&crate::boxes::dir::DIR, "Dir", registry, comparison)
    }
}

impl Comparator for crate::boxes::ar::Ar {
    fn name(&self) -> &'static str {
        "Ar"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Container::applies(self, registry, item)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        aggregate_compare(&crate::boxes::ar::AR, "Ar", registry, comparison)
    }
}

impl Comparator for crate::boxes::cpio::Cpio {
    fn name(&self) -> &'static str {
        "Cpio"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Container::applies(self, registry, item)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        aggregate_compare(&crate::boxes::cpio::CPIO, "Cpio", registry, comparison)
    }
}

impl Comparator for crate::boxes::tar::Tar {
    fn name(&self) -> &'static str {
        "Tar"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Container::applies(self, registry, item)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        aggregate_compare(&crate::boxes::tar::TAR, "Tar", registry, comparison)
    }
}

impl Comparator for crate::boxes::zip::Zip {
    fn name(&self) -> &'static str {
        "Zip"
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Container::applies(self, registry, item)
    }

    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let _guard = match Mount::open_pair(&crate::boxes::zip::ZIP, registry, comparison.pair())
        {
            Ok(guard) => guard,
            Err(e) => return bad_archive_verdict(e, "Zip"),
        };

        let [left, right] = comparison.pair();
        if registry.archive_comment(left)? != registry.archive_comment(right)? {
            log_different("Zip", &registry.name(left));
            log!(DIFFERENCES, "archive comments differ");
            return Ok(Verdict::Different);
        }

        comparison.aggregate(registry, BoxKind::Zip)
    }
}

impl Comparator for crate::boxes::encoder::Encoder {
    fn name(&self) -> &'static str {
        match Container::kind(self) {
            BoxKind::Bz2 => "Bz2",
            BoxKind::Xz => "Xz",
            _ => "Gzip",
        }
    }

    fn applies_item(&self, registry: &Registry, item: ItemId) -> Fallible<bool> {
        Container::applies(self, registry, item)
    }

    /// Content-only streams skip the joins: the single synthetic member is
    /// compared directly and its verdict passed through.
    fn compare(&self, registry: &Registry, comparison: &mut Comparison) -> Fallible<Verdict> {
        let kind = Container::kind(self);
        let _guard = match Mount::open_pair(self, registry, comparison.pair()) {
            Ok(guard) => guard,
            Err(e) => return bad_archive_verdict(e, Comparator::name(self)),
        };

        let [left, right] = comparison.pair();
        let content_name = kind.content_name().expect("encoders expose one member");
        let pair = [
            registry.find_or_create(&kind.join(&registry.name(left), content_name), left, kind),
            registry.find_or_create(&kind.join(&registry.name(right), content_name), right, kind),
        ];

        let mut child = Comparison::from_pair(pair, comparison.settings().clone());
        match child.compare(registry)? {
            Verdict::Indeterminate => {
                Err(RcmpError::Indeterminate(registry.name(pair[0]).to_string()).into())
            }
            verdict => Ok(verdict),
        }
    }
}
