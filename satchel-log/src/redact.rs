//! Keeps live session identifiers out of log output.

use std::fmt;

const VISIBLE: usize = 6;

/// Display wrapper that prints only the head of a session id and its length.
///
/// ```
/// use satchel_log::redact;
///
/// assert_eq!(redact("abcdefghijklmnop").to_string(), "abcdef…(16)");
/// assert_eq!(redact("").to_string(), "<none>");
/// ```
pub fn redact(id: &str) -> Redacted<'_> {
    Redacted(id)
}

#[derive(Debug, Clone, Copy)]
pub struct Redacted<'a>(&'a str);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<none>");
        }
        let head: String = self.0.chars().take(VISIBLE).collect();
        write!(f, "{}…({})", head, self.0.chars().count())
    }
}
