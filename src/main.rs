mod boxes;
mod cmp;
mod dateblot;
mod errors;
mod ignores;
mod items;

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use failure::{Fallible, ResultExt};
use log::LevelFilter;
use structopt::StructOpt;

use crate::cmp::{Comparison, Settings, Verdict};
use crate::errors::RcmpError;
use crate::ignores::IgnoreSet;
use crate::items::Registry;

#[derive(Debug, StructOpt)]
#[structopt(name = "rcmp", about = "Recursively compares two trees.")]
struct Opt {
    /// First tree to check
    left: String,

    /// Second tree to check
    right: String,

    /// Exit on first difference
    #[structopt(short = "e", long = "exit-early")]
    exit_early: bool,

    /// Read the named file as an ignore file (can be repeated)
    #[structopt(short = "i", long = "ignore-file", parse(from_os_str))]
    ignore_files: Vec<PathBuf>,

    /// Ignore differences in member ownerships
    #[structopt(long = "ignore-ownerships")]
    ignore_ownerships: bool,

    /// Be more verbose (can be repeated)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,
}

fn level_filter(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,  // differences
        2 => LevelFilter::Info,  // + sames
        3 => LevelFilter::Debug, // + indeterminates
        _ => LevelFilter::Trace,
    }
}

#[cfg(feature = "simplelog")]
fn init_logging(filter: LevelFilter) {
    use simplelog::{Config, SimpleLogger, TermLogger, TerminalMode};

    if TermLogger::init(filter, Config::default(), TerminalMode::Stderr).is_err() {
        let _ = SimpleLogger::init(filter, Config::default());
    }
}

#[cfg(not(feature = "simplelog"))]
fn init_logging(_filter: LevelFilter) {}

fn read_ignore_patterns(files: &[PathBuf]) -> Fallible<Vec<String>> {
    let mut patterns = Vec::new();
    for file in files {
        if !file.is_file() {
            continue;
        }
        let text = fs::read_to_string(file)
            .with_context(|_| format!("reading ignore file \"{}\"", file.display()))?;
        patterns.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from),
        );
    }
    Ok(patterns)
}

fn run() -> Fallible<Verdict> {
    let opt = Opt::from_args();
    init_logging(level_filter(opt.verbose));

    let mut ignore_files = Vec::new();
    if let Some(home) = std::env::var_os("HOME") {
        ignore_files.push(PathBuf::from(home).join(".rcmpignore"));
    }
    ignore_files.extend(opt.ignore_files);

    let settings = Rc::new(Settings::with_defaults(
        IgnoreSet::new(&read_ignore_patterns(&ignore_files)?)?,
        opt.exit_early,
        opt.ignore_ownerships,
    ));

    let registry = Registry::new();
    let mut comparison = Comparison::new(&registry, &opt.left, &opt.right, settings)?;
    match comparison.compare(&registry)? {
        Verdict::Indeterminate => {
            Err(RcmpError::Indeterminate(format!("{} and {}", opt.left, opt.right)).into())
        }
        verdict => Ok(verdict),
    }
}

fn main() {
    match run() {
        Ok(Verdict::Same) => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}
