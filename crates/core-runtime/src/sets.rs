//! Order-preserving string set used for status lines and user-facing errors.

use std::sync::Arc;

use serde::Serialize;

/// A de-duplicating list of strings. Additions keep first-seen order, and
/// every mutation returns a new value; when nothing would change, the input
/// value is returned as-is so unchanged states keep pointer identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StrSet(Arc<Vec<String>>);

impl StrSet {
    pub fn add<I, S>(&self, items: I) -> StrSet
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fresh: Vec<String> = Vec::new();
        for s in items {
            let s = s.into();
            if s.is_empty() {
                continue;
            }
            if !self.contains(&s) && !fresh.contains(&s) {
                fresh.push(s);
            }
        }
        if fresh.is_empty() {
            return self.clone();
        }
        let mut next = Vec::with_capacity(self.0.len() + fresh.len());
        next.extend(self.0.iter().cloned());
        next.extend(fresh);
        StrSet(Arc::new(next))
    }

    pub fn contains(&self, s: &str) -> bool {
        self.0.iter().any(|x| x == s)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn join(&self, sep: &str) -> String {
        self.0.join(sep)
    }

    /// Pointer identity with another set; true means the two provably share
    /// storage (no mutation happened between them).
    pub fn same_as(&self, other: &StrSet) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
