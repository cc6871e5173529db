use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// `path → interface names` for one service, as built by one crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscoveryIndex {
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl DiscoveryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `interfaces` at `path`, merging with what is already there.
    /// An empty set records nothing.
    pub fn insert<I, S>(&mut self, path: &str, interfaces: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut interfaces = interfaces.into_iter().map(Into::into).peekable();
        if interfaces.peek().is_none() {
            return;
        }
        self.entries.entry(path.to_string()).or_default().extend(interfaces);
    }

    /// Merges another index into this one.
    pub fn merge(&mut self, other: Self) {
        for (path, interfaces) in other.entries {
            self.entries.entry(path).or_default().extend(interfaces);
        }
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.entries.iter().map(|(p, i)| (p.as_str(), i))
    }

    /// Content digest; equal indexes hash equal.
    #[must_use]
    pub fn digest(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        for (path, interfaces) in &self.entries {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            for iface in interfaces {
                hasher.update(iface.as_bytes());
                hasher.update(&[1]);
            }
            hasher.update(&[2]);
        }
        hasher.finalize()
    }
}

impl IntoIterator for DiscoveryIndex {
    type Item = (String, BTreeSet<String>);
    type IntoIter = std::collections::btree_map::IntoIter<String, BTreeSet<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<S: Into<String>> FromIterator<(S, BTreeSet<String>)> for DiscoveryIndex {
    fn from_iter<T: IntoIterator<Item = (S, BTreeSet<String>)>>(iter: T) -> Self {
        let mut index = Self::new();
        for (path, interfaces) in iter {
            let path: String = path.into();
            index.insert(&path, interfaces);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_merges_and_skips_empty() {
        let mut index = DiscoveryIndex::new();
        index.insert("/a", ["X"]);
        index.insert("/a", ["Y"]);
        index.insert("/b", Vec::<String>::new());
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("/a").unwrap().len(), 2);
        assert!(!index.contains("/b"));
    }

    #[test]
    fn digest_tracks_content() {
        let mut a = DiscoveryIndex::new();
        a.insert("/a", ["X"]);
        let mut b = DiscoveryIndex::new();
        b.insert("/a", ["X"]);
        assert_eq!(a.digest(), b.digest());

        b.insert("/a", ["Y"]);
        assert_ne!(a.digest(), b.digest());

        // Boundaries between path and interface are not ambiguous.
        let mut c = DiscoveryIndex::new();
        c.insert("/aX", ["Y"]);
        let mut d = DiscoveryIndex::new();
        d.insert("/a", ["XY"]);
        assert_ne!(c.digest(), d.digest());
    }
}
