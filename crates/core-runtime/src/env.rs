//! Environment mapping shared between the editor and spawned tools.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

/// Immutable string→string environment. Cheap to clone; every mutation
/// produces a new map so two states can never observe each other's edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EnvMap(Arc<BTreeMap<String, String>>);

impl EnvMap {
    /// Snapshot of the agent's own process environment.
    pub fn process() -> EnvMap {
        EnvMap(Arc::new(std::env::vars().collect()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `KEY=value` pairs for handing to a child process.
    pub fn environ(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn add(&self, name: impl Into<String>, value: impl Into<String>) -> EnvMap {
        let mut m = (*self.0).clone();
        m.insert(name.into(), value.into());
        EnvMap(Arc::new(m))
    }
}

impl<K, V> FromIterator<(K, V)> for EnvMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> EnvMap {
        EnvMap(Arc::new(
            iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_does_not_touch_the_source_map() {
        let a: EnvMap = [("GOPATH", "/go")].into_iter().collect();
        let b = a.add("GOROOT", "/usr/go");
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
        assert_eq!(b.get("GOPATH"), Some("/go"));
        assert_eq!(b.get("GOROOT"), Some("/usr/go"));
        assert_eq!(a.get("GOROOT"), None);
    }

    #[test]
    fn serializes_as_a_plain_map() {
        let m: EnvMap = [("A", "1")].into_iter().collect();
        let v = serde_json::to_value(&m).expect("serializes");
        assert_eq!(v, serde_json::json!({"A": "1"}));
    }
}
