//! Glob segments.
//!
//! A glob segment matches exactly one subject segment name:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//!
//! Everything else is literal. Globs never span a `/`; a pattern such as
//! `/a/*.txt` only matches names directly under `/a`.

use std::fmt;

use regex::Regex;

use crate::error::{PathError, PathResult};
use crate::escape::{canonicalize, decode};

/// Check if escaped segment text contains glob metacharacters.
///
/// Literal `*` and `?` are always escaped (`%2A`, `%3F`), so any bare one
/// is a wildcard.
///
/// ```
/// use arbor_path::contains_glob;
///
/// assert!(contains_glob("*.rs"));
/// assert!(contains_glob("file?.txt"));
/// assert!(!contains_glob("main.rs"));
/// assert!(!contains_glob("star%2A"));
/// ```
pub fn contains_glob(escaped: &str) -> bool {
    escaped.contains(['*', '?'])
}

/// Translate escaped glob text into a regular expression.
///
/// The result matches unescaped names, anchored at both ends. Literal runs
/// are percent-decoded and regex-escaped, which covers `.` and `\`.
///
/// ```
/// use arbor_path::glob_to_regex;
///
/// assert_eq!(glob_to_regex("*.txt").unwrap(), r"(?s)^.*\.txt$");
/// assert_eq!(glob_to_regex("a%20?").unwrap(), "(?s)^a .$");
/// ```
pub fn glob_to_regex(escaped: &str) -> PathResult<String> {
    let mut regex = String::from("(?s)^");
    let mut literal = String::new();

    for c in escaped.chars() {
        match c {
            '*' | '?' => {
                push_literal(&mut regex, &mut literal)?;
                regex.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    push_literal(&mut regex, &mut literal)?;

    regex.push('$');
    Ok(regex)
}

fn push_literal(regex: &mut String, literal: &mut String) -> PathResult<()> {
    if !literal.is_empty() {
        regex.push_str(&regex::escape(&decode(literal)?));
        literal.clear();
    }
    Ok(())
}

/// A compiled glob segment.
///
/// Holds the canonical escaped text alongside the compiled matcher. Cloning
/// is cheap; the compiled program is shared.
#[derive(Clone)]
pub struct Glob {
    text: Box<str>,
    regex: Regex,
}

impl Glob {
    /// Compile escaped glob text.
    pub fn new(escaped: &str) -> PathResult<Self> {
        let text = Self::canonical(escaped)?;
        Self::compile(escaped, text)
    }

    /// Canonicalize the literal runs between wildcards.
    pub(crate) fn canonical(escaped: &str) -> PathResult<String> {
        let mut out = String::with_capacity(escaped.len());
        let mut start = 0;
        for (i, c) in escaped.char_indices() {
            if c == '*' || c == '?' {
                out.push_str(&canonicalize(&escaped[start..i])?);
                out.push(c);
                start = i + 1;
            }
        }
        out.push_str(&canonicalize(&escaped[start..])?);
        Ok(out)
    }

    /// Compile already-canonical text. `source` is only used for errors.
    pub(crate) fn compile(source: &str, text: String) -> PathResult<Self> {
        let regex = Regex::new(&glob_to_regex(&text)?)
            .map_err(|e| PathError::parse(source, e.to_string()))?;
        Ok(Self {
            text: text.into_boxed_str(),
            regex,
        })
    }

    /// The canonical escaped text of this glob.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Match an unescaped segment name.
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Glob").field(&self.text).finish()
    }
}

impl PartialEq for Glob {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for Glob {}
