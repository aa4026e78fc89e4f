//! Shell glob matching for -name, -path and -lname.
//!
//! Patterns are translated to anchored regular expressions once at parse
//! time and matched as bytes. The dialect is the classic `fnmatch` one,
//! without any special treatment of slashes:
//! - `?` matches any single character, `*` any sequence (both cross `/`)
//! - `[...]` character classes support ranges, `!` negation, and a literal
//!   `]` when it comes first
//! - a backslash makes the next character literal
//! - an unterminated class is matched literally, like fnmatch does

use core::fmt;
use regex::bytes::{Regex, RegexBuilder};

/// A compiled glob pattern.
#[derive(Debug)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    /// Compile `pattern`, optionally ignoring case.
    ///
    /// # Errors
    /// Returns the regex error when the translated class is malformed
    /// (a reversed range, mostly).
    pub fn new(pattern: &str, casefold: bool) -> Result<Self, regex::Error> {
        let translated = glob_to_regex(pattern);
        let regex = RegexBuilder::new(&translated)
            .case_insensitive(casefold)
            .unicode(false)
            .build()?;
        Ok(Self {
            pattern: pattern.to_owned(),
            regex,
        })
    }

    /// Whether the whole of `text` matches the pattern.
    #[must_use]
    #[inline]
    pub fn matches(&self, text: &[u8]) -> bool {
        self.regex.is_match(text)
    }

    #[must_use]
    #[inline]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

fn push_literal(out: &mut String, ch: char) {
    if "[](){}|^$.*+?\\".contains(ch) {
        out.push('\\');
    }
    out.push(ch);
}

/// Translate a glob into an anchored regex over bytes.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s-u)^");

    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.next() {
                Some(next) => push_literal(&mut out, next),
                // A trailing backslash matches itself
                None => push_literal(&mut out, '\\'),
            },
            '[' => {
                // Collect the class body up to the closing bracket;
                // a ] right after the (possibly negated) opening is literal
                let mut body = String::new();
                let mut negated = false;
                if chars.peek() == Some(&'!') || chars.peek() == Some(&'^') {
                    negated = true;
                    chars.next();
                }
                if chars.peek() == Some(&']') {
                    body.push_str("\\]");
                    chars.next();
                }

                let mut closed = false;
                for ch in chars.by_ref() {
                    match ch {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' | '[' => {
                            body.push('\\');
                            body.push(ch);
                        }
                        _ => body.push(ch),
                    }
                }

                if closed {
                    out.push('[');
                    if negated {
                        out.push('^');
                    }
                    out.push_str(&body);
                    out.push(']');
                } else {
                    // No closing bracket: everything was literal
                    push_literal(&mut out, '[');
                    if negated {
                        push_literal(&mut out, '!');
                    }
                    for ch in body.chars() {
                        if ch != '\\' {
                            push_literal(&mut out, ch);
                        }
                    }
                }
            }
            _ => push_literal(&mut out, ch),
        }
    }

    out.push('$');
    out
}

/**
Rewrite a POSIX basic regular expression into the extended dialect the
regex crate speaks.

In a BRE, bare `( ) { } + ? |` are literals while `\(` and `\)` group;
this flips the escaping so either -regextype compiles through the same
engine.
*/
#[must_use]
pub fn bre_to_ere(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;

    while let Some(ch) = chars.next() {
        if in_class {
            out.push(ch);
            if ch == ']' {
                in_class = false;
            }
            continue;
        }

        match ch {
            '[' => {
                in_class = true;
                out.push('[');
                // Leading ] (possibly negated) is part of the class
                if chars.peek() == Some(&'^') {
                    out.push('^');
                    chars.next();
                }
                if chars.peek() == Some(&']') {
                    out.push_str("\\]");
                    chars.next();
                }
            }
            '(' | ')' | '{' | '}' | '+' | '?' | '|' => {
                out.push('\\');
                out.push(ch);
            }
            '\\' => match chars.next() {
                Some(next @ ('(' | ')' | '{' | '}' | '+' | '?' | '|')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            _ => out.push(ch),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_and_wildcards() {
        let glob = Glob::new("*.txt", false).unwrap();
        assert!(glob.matches(b"notes.txt"));
        assert!(glob.matches(b".txt"));
        assert!(!glob.matches(b"notes.txt.bak"));

        let glob = Glob::new("a?c", false).unwrap();
        assert!(glob.matches(b"abc"));
        assert!(!glob.matches(b"ac"));
    }

    #[test]
    fn star_crosses_slashes() {
        // fnmatch without FNM_PATHNAME lets wildcards cross separators,
        // which is what -path relies on
        let glob = Glob::new("*/build/*", false).unwrap();
        assert!(glob.matches(b"src/build/out.o"));
        assert!(glob.matches(b"a/b/build/c/d"));
    }

    #[test]
    fn classes() {
        let glob = Glob::new("file[0-9]", false).unwrap();
        assert!(glob.matches(b"file5"));
        assert!(!glob.matches(b"filex"));

        let glob = Glob::new("file[!0-9]", false).unwrap();
        assert!(glob.matches(b"filex"));
        assert!(!glob.matches(b"file5"));

        let glob = Glob::new("[]]", false).unwrap();
        assert!(glob.matches(b"]"));
    }

    #[test]
    fn escapes_and_case() {
        let glob = Glob::new(r"literal\*", false).unwrap();
        assert!(glob.matches(b"literal*"));
        assert!(!glob.matches(b"literalx"));

        let glob = Glob::new("README*", true).unwrap();
        assert!(glob.matches(b"readme.md"));
    }

    #[test]
    fn unterminated_class_is_literal() {
        let glob = Glob::new("a[bc", false).unwrap();
        assert!(glob.matches(b"a[bc"));
        assert!(!glob.matches(b"ab"));
    }

    #[test]
    fn bre_translation() {
        assert_eq!(bre_to_ere(r"a\(b\)c"), "a(b)c");
        assert_eq!(bre_to_ere("a(b)c"), r"a\(b\)c");
        assert_eq!(bre_to_ere("a+b?"), r"a\+b\?");
        assert_eq!(bre_to_ere("[+?]"), "[+?]");
        assert_eq!(bre_to_ere(r"x\.y"), r"x\.y");
    }
}
