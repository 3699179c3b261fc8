use failure::{Fallible, ResultExt};
use regex::Regex;

/// Shell-glob ignore patterns, compiled once and matched against extended
/// path names.  `*` crosses `/` so a pattern like `*.pyc` prunes at any
/// depth, including inside archives.
pub struct IgnoreSet {
    patterns: Vec<(String, Regex)>,
}

impl IgnoreSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Fallible<IgnoreSet> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let regex = Regex::new(&translate(pattern))
                .with_context(|_| format!("bad ignore pattern \"{}\"", pattern))?;
            compiled.push((pattern.to_string(), regex));
        }
        Ok(IgnoreSet { patterns: compiled })
    }

    pub fn empty() -> IgnoreSet {
        IgnoreSet {
            patterns: Vec::new(),
        }
    }

    /// First pattern matching `name`, for logging; `None` means not ignored.
    pub fn ignoring(&self, name: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(name))
            .map(|(source, _)| source.as_str())
    }
}

/// Translate one shell glob into an anchored regular expression.
fn translate(glob: &str) -> String {
    let mut out = String::from("^(?s:");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut class = String::new();
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                if chars.peek() == Some(&']') {
                    chars.next();
                    class.push(']');
                }
                let mut closed = false;
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next == ']' {
                        closed = true;
                        break;
                    }
                    if next == '\\' {
                        class.push_str("\\\\");
                    } else {
                        class.push(next);
                    }
                }
                if closed {
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                } else {
                    // unterminated class matches a literal bracket
                    out.push_str(&regex::escape("["));
                    out.push_str(&regex::escape(&class.replace("\\\\", "\\")));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push_str(")$");
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_star_crosses_separators() -> Fallible<()> {
        let ignores = IgnoreSet::new(&["*.pyc"])?;
        assert_eq!(ignores.ignoring("red/cache/foo.pyc"), Some("*.pyc"));
        assert_eq!(ignores.ignoring("a.tar{tar}lib/foo.pyc"), Some("*.pyc"));
        assert_eq!(ignores.ignoring("red/foo.py"), None);
        Ok(())
    }

    #[test]
    fn test_question_and_class() -> Fallible<()> {
        let ignores = IgnoreSet::new(&["foo.?", "lib[0-9].so"])?;
        assert_eq!(ignores.ignoring("foo.a"), Some("foo.?"));
        assert_eq!(ignores.ignoring("foo.ab"), None);
        assert_eq!(ignores.ignoring("lib7.so"), Some("lib[0-9].so"));
        assert_eq!(ignores.ignoring("libx.so"), None);
        Ok(())
    }

    #[test]
    fn test_first_match_wins() -> Fallible<()> {
        let ignores = IgnoreSet::new(&["*.o", "*o"])?;
        assert_eq!(ignores.ignoring("main.o"), Some("*.o"));
        assert_eq!(ignores.ignoring("hello"), Some("*o"));
        Ok(())
    }

    #[test]
    fn test_literal_dots_are_escaped() -> Fallible<()> {
        let ignores = IgnoreSet::new(&["a.b"])?;
        assert_eq!(ignores.ignoring("a.b"), Some("a.b"));
        assert_eq!(ignores.ignoring("axb"), None);
        Ok(())
    }

    #[test]
    fn test_negated_class() -> Fallible<()> {
        let ignores = IgnoreSet::new(&["foo.[!o]"])?;
        assert_eq!(ignores.ignoring("foo.c"), Some("foo.[!o]"));
        assert_eq!(ignores.ignoring("foo.o"), None);
        Ok(())
    }

    #[test]
    fn test_empty_set() {
        assert_eq!(IgnoreSet::empty().ignoring("anything"), None);
    }
}
