//! # Path Parameters
//!
//! Ordered name → value mapping produced by a layer match.
//!
//! Named parameters keep declaration order. Wildcard captures are stored
//! under positional names (`"0"`, `"1"`, ...), which is what the
//! `merge_params` renumbering operates on.

/// Ordered set of decoded path parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    /// Create an empty parameter set
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Get a parameter by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Insert a parameter, replacing the value in place if the name exists
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Whether a parameter with this name exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    /// Iterate over `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parameter names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Length of the contiguous positional run `"0"`, `"1"`, ...
    fn positional_len(&self) -> usize {
        let mut n = 0;
        while self.contains(&n.to_string()) {
            n += 1;
        }
        n
    }

    /// Merge a child match onto inherited parent parameters.
    ///
    /// Named values from the child win over the parent. When both sides
    /// carry positional captures, the child's run is renumbered to follow
    /// the parent's so neither side is lost.
    #[must_use]
    pub fn merge(child: Self, parent: &Self) -> Self {
        if parent.is_empty() {
            return child;
        }

        let mut merged = parent.clone();
        let child_run = child.positional_len();
        let parent_run = parent.positional_len();

        if child_run == 0 || parent_run == 0 {
            for (k, v) in child.entries {
                merged.insert(k, v);
            }
            return merged;
        }

        for (k, v) in child.entries {
            match k.parse::<usize>() {
                Ok(i) if i < child_run => merged.insert((i + parent_run).to_string(), v),
                _ => merged.insert(k, v),
            }
        }
        merged
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}
