//! Ordering for `v<major>.<minor>.<patch>[suffix]` tags.

use std::cmp::Ordering;
use std::fmt;

/// A tag that follows the `v<major>.<minor>.<patch>[suffix]` grammar.
///
/// Numeric components compare numerically. On equal numbers a plain release
/// outranks any suffixed tag (`v1.0.0` > `v1.0.0-rc1`), and two suffixes
/// compare lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub suffix: Option<String>,
}

impl TagVersion {
    /// Parse a tag, returning `None` when it does not follow the grammar.
    pub fn parse(tag: &str) -> Option<Self> {
        let rest = tag.strip_prefix('v')?;

        let (major, rest) = take_number(rest)?;
        let rest = rest.strip_prefix('.')?;
        let (minor, rest) = take_number(rest)?;
        let rest = rest.strip_prefix('.')?;
        let (patch, rest) = take_number(rest)?;

        // "v1.2.3.4" would otherwise read as patch 3 with suffix ".4"
        if rest.starts_with('.') {
            return None;
        }

        Some(TagVersion {
            major,
            minor,
            patch,
            suffix: (!rest.is_empty()).then(|| rest.to_string()),
        })
    }

    pub fn is_release(&self) -> bool {
        self.suffix.is_none()
    }
}

fn take_number(s: &str) -> Option<(u64, &str)> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

impl Ord for TagVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.suffix, &other.suffix) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for TagVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TagVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(suffix) = &self.suffix {
            write!(f, "{}", suffix)?;
        }
        Ok(())
    }
}
