//! Queries touched during a unit of work.

use std::collections::HashSet;

/// Append-only, insertion-ordered set of queries.
///
/// Owned by the caller and passed to [`CachedDatabase::query`](crate::CachedDatabase::query),
/// so several sessions can share one database handle.
#[derive(Debug, Clone, Default)]
pub struct Session {
    queries: Vec<String>,
    seen: HashSet<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `query`. Returns false if it was already recorded.
    pub fn record(&mut self, query: &str) -> bool {
        if self.seen.contains(query) {
            return false;
        }
        self.seen.insert(query.to_string());
        self.queries.push(query.to_string());
        true
    }

    pub fn contains(&self, query: &str) -> bool {
        self.seen.contains(query)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Recorded queries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.queries.iter().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a Session {
    type Item = &'a str;
    type IntoIter = std::iter::Map<std::slice::Iter<'a, String>, fn(&'a String) -> &'a str>;

    fn into_iter(self) -> Self::IntoIter {
        self.queries.iter().map(String::as_str as fn(&'a String) -> &'a str)
    }
}
