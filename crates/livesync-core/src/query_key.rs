// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tuple-shaped cache keys such as `['submission', 'd1']`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one cached query result.
///
/// The first segment names the query family (`submissions`, `submission`,
/// `userSubmissions`); later segments narrow it (a row id, an owner id).
/// Prefix matching on segments drives invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// A single-segment key naming a query family.
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Append a segment.
    pub fn with(mut self, part: impl Into<String>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if every segment of `prefix` matches this key's leading segments.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl From<&str> for QueryKey {
    fn from(name: &str) -> Self {
        QueryKey::root(name)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{part}'")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_tuple_notation() {
        let key = QueryKey::root("userSubmissions").with("U1");
        assert_eq!(key.to_string(), "['userSubmissions', 'U1']");
    }

    #[test]
    fn prefix_matching_is_segment_wise() {
        let detail = QueryKey::new(["submission", "d1"]);
        assert!(detail.starts_with(&QueryKey::root("submission")));
        assert!(!detail.starts_with(&QueryKey::root("submissions")));
        assert!(!QueryKey::root("submission").starts_with(&detail));
    }
}
