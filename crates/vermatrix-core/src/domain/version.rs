//! Version identifiers with numeric, segment-wise ordering.
//!
//! `"7.1.0" < "8.0.0" < "8.0.2" < "10.0.0"`. Plain string comparison gets
//! the last pair wrong, so identifiers are parsed into numeric segments.
//! Missing trailing segments compare as zero (`8.1 == 8.1.0`).
//!
//! A pre-release suffix after `-` sorts before the release it precedes and
//! compares by alternating alphabetic and numeric runs, so
//! `8.1.0-beta2 < 8.1.0-beta10 < 8.1.0-rc01 < 8.1.0`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{MatrixError, Result};

/// One run inside a pre-release suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PreToken {
    Num(u64),
    Alpha(String),
}

impl PartialOrd for PreToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PreToken {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PreToken::Num(a), PreToken::Num(b)) => a.cmp(b),
            (PreToken::Alpha(a), PreToken::Alpha(b)) => a.cmp(b),
            (PreToken::Num(_), PreToken::Alpha(_)) => Ordering::Less,
            (PreToken::Alpha(_), PreToken::Num(_)) => Ordering::Greater,
        }
    }
}

/// A parsed version identifier.
///
/// The original identifier string is kept for naming and display; ordering
/// and equality use the parsed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    raw: String,
    segments: Vec<u64>,
    pre: Vec<PreToken>,
}

impl Version {
    /// Parse an identifier such as `8.1.4` or `8.1.0-alpha05`.
    pub fn parse(value: &str) -> Result<Self> {
        let raw = value.trim();
        let invalid = |reason: &str| MatrixError::InvalidVersion {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("empty identifier"));
        }

        let (core, suffix) = match raw.split_once('-') {
            Some((core, suffix)) => (core, Some(suffix)),
            None => (raw, None),
        };

        let segments = core
            .split('.')
            .map(|s| {
                if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
                    Err(invalid("segments must be non-empty decimal numbers"))
                } else {
                    s.parse::<u64>().map_err(|_| invalid("segment out of range"))
                }
            })
            .collect::<Result<Vec<u64>>>()?;

        let pre = match suffix {
            Some(s) if s.is_empty() => return Err(invalid("empty pre-release suffix")),
            Some(s) => tokenize_pre(s).ok_or_else(|| invalid("pre-release must be alphanumeric"))?,
            None => Vec::new(),
        };

        Ok(Self {
            raw: raw.to_string(),
            segments,
            pre,
        })
    }

    /// The zero version, used as the catch-all toolchain threshold.
    pub fn zero() -> Self {
        Self {
            raw: "0".to_string(),
            segments: vec![0],
            pre: Vec::new(),
        }
    }

    /// A release version built from numeric segments.
    pub fn from_segments(segments: &[u64]) -> Self {
        let raw = segments
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        Self {
            raw,
            segments: segments.to_vec(),
            pre: Vec::new(),
        }
    }

    /// The identifier as written in the catalog.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Numeric segments (`[8, 1, 4]` for `8.1.4`).
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Segments with trailing zeros removed; equal versions share this form.
    fn significant_segments(&self) -> &[u64] {
        let end = self
            .segments
            .iter()
            .rposition(|s| *s != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.segments[..end]
    }
}

fn tokenize_pre(suffix: &str) -> Option<Vec<PreToken>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;

    let flush = |current: &mut String, in_digits: bool, tokens: &mut Vec<PreToken>| -> Option<()> {
        if current.is_empty() {
            return Some(());
        }
        let token = if in_digits {
            PreToken::Num(current.parse().ok()?)
        } else {
            PreToken::Alpha(current.to_ascii_lowercase())
        };
        tokens.push(token);
        current.clear();
        Some(())
    };

    for c in suffix.chars() {
        if c == '.' || c == '-' {
            flush(&mut current, in_digits, &mut tokens)?;
            continue;
        }
        if !c.is_ascii_alphanumeric() {
            return None;
        }
        let digit = c.is_ascii_digit();
        if !current.is_empty() && digit != in_digits {
            flush(&mut current, in_digits, &mut tokens)?;
        }
        in_digits = digit;
        current.push(c);
    }
    flush(&mut current, in_digits, &mut tokens)?;
    Some(tokens)
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.pre.cmp(&other.pre),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_segments().hash(state);
        self.pre.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = MatrixError;

    fn try_from(value: String) -> Result<Self> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_numeric_not_lexical_ordering() {
        assert!(v("7.1.0") < v("8.0.0"));
        assert!(v("8.0.0") < v("8.0.2"));
        assert!(v("8.0.2") < v("10.0.0"));
        // lexical compare would put "10.0.0" first
        assert!("10.0.0" < "7.1.0");
    }

    #[test]
    fn test_sort_matches_numeric_order() {
        let mut versions = vec![v("10.0.0"), v("8.0.2"), v("7.1.0"), v("8.0.0")];
        versions.sort();
        let raw: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
        assert_eq!(raw, vec!["7.1.0", "8.0.0", "8.0.2", "10.0.0"]);
    }

    #[test]
    fn test_missing_segments_are_zero() {
        assert_eq!(v("8.1"), v("8.1.0"));
        assert!(v("8.1") < v("8.1.1"));
    }

    #[test]
    fn test_prerelease_sorts_before_release() {
        assert!(v("8.1.0-alpha05") < v("8.1.0"));
        assert!(v("8.1.0-alpha11") < v("8.1.0-beta01"));
        assert!(v("8.1.0-beta2") < v("8.1.0-beta10"));
        assert!(v("8.1.0-beta10") < v("8.1.0-rc01"));
        assert!(v("8.0.2") < v("8.1.0-alpha01"));
        assert!(v("8.1.0-rc01").is_prerelease());
    }

    #[test]
    fn test_zero_is_lowest_release() {
        assert!(Version::zero() <= v("0.0.1"));
        assert_eq!(Version::zero(), v("0.0.0"));
    }

    #[test]
    fn test_rejects_malformed_identifiers() {
        for bad in ["", "abc", "8..1", "8.1.", "8.x.0", "8.1.0-", "8.1.0-beta!"] {
            assert!(Version::parse(bad).is_err(), "expected {bad:?} to be rejected");
        }
    }

    #[test]
    fn test_serde_keeps_raw_identifier() {
        let version = v("8.1.0-alpha05");
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, "\"8.1.0-alpha05\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "8.1.0-alpha05");
    }

    #[test]
    fn test_equal_versions_hash_alike() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(v("8.1"));
        assert!(set.contains(&v("8.1.0")));
    }
}
