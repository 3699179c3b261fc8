use failure::Fail;

#[derive(Debug, Fail)]
pub enum RcmpError {
    #[fail(display = "no comparator produced a verdict for \"{}\"", _0)]
    Indeterminate(String),

    #[fail(display = "bad archive \"{}\": {}", _0, _1)]
    BadArchive(String, String),

    #[fail(display = "\"{}\" matches ignore pattern \"{}\"", _0, _1)]
    IgnoredAtTop(String, String),
}
