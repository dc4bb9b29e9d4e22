//! Version-sort tag ordering.
//!
//! A [`VersionTag`] is a semantic-version-like label (`1.4.0`, `v2.0.0`,
//! `v1.0.0-beta`). Ordering is numeric segment comparison, never lexical
//! string comparison, so `v1.10.0 > v1.9.0`.
//!
//! Pre-release rule, pinned here: a tag with a pre-release suffix sorts
//! *before* the same numeric core without one (`1.0.0-beta < 1.0.0`); two
//! pre-releases of the same core compare by suffix lexically.

use std::cmp::Ordering;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An immutable, totally-ordered release label.
///
/// Construct via [`VersionTag::parse`]; tag names that do not match
/// `v?N(.N)*(-suffix)?` are rejected and excluded from tag selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionTag {
    raw: String,
    numbers: Vec<u64>,
    pre: Option<String>,
}

impl VersionTag {
    /// Parse a tag name. Returns `None` for names that are not
    /// version-shaped (e.g. `nightly`, `release-candidate`, empty strings).
    pub fn parse(raw: &str) -> Option<Self> {
        let body = raw.strip_prefix('v').unwrap_or(raw);
        if body.is_empty() {
            return None;
        }

        let (core, pre) = match body.split_once('-') {
            Some((core, suffix)) if !suffix.is_empty() => (core, Some(suffix.to_owned())),
            Some(_) => return None,
            None => (body, None),
        };

        let mut numbers = Vec::new();
        for segment in core.split('.') {
            if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            numbers.push(segment.parse().ok()?);
        }

        Some(Self {
            raw: raw.to_owned(),
            numbers,
            pre,
        })
    }

    /// The tag exactly as it appeared at the source, including any leading `v`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The tag with the conventional leading `v` stripped — the mandatory
    /// normalization for image references (`v1.4.0` → `1.4.0`).
    pub fn image_tag(&self) -> &str {
        self.raw.strip_prefix('v').unwrap_or(&self.raw)
    }

    /// Select the highest tag under version-sort from raw tag names,
    /// ignoring names that are not version-shaped.
    pub fn latest_of<'a, I>(names: I) -> Option<VersionTag>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().filter_map(VersionTag::parse).max()
    }
}

impl Ord for VersionTag {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            let a = self.numbers.get(i).copied().unwrap_or(0);
            let b = other.numbers.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        // Same numeric core: a release outranks any of its pre-releases.
        match (&self.pre, &other.pre) {
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b).then_with(|| self.raw.cmp(&other.raw)),
            (None, None) => self.raw.cmp(&other.raw),
        }
    }
}

impl PartialOrd for VersionTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

impl Serialize for VersionTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VersionTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        VersionTag::parse(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid version tag '{raw}'")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
