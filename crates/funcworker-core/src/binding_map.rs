//! Ordered, case-insensitive name → value mapping.
//!
//! Binding names and trigger-metadata keys are compared case-insensitively
//! under Unicode lowercase folding, so `Ärger` and `äRGER` collide. There
//! is no normalization: composed and decomposed forms stay distinct. The first value inserted for a key wins; later
//! inserts under a key that differs only by case are dropped. Iteration
//! follows insertion order and reports keys with their original casing.

/// Ordered mapping with case-insensitive keys and first-wins inserts.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> BindingMap<V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert a value. Returns `false` (and drops `value`) when a key equal
    /// ignoring case is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        if self.contains_key(&key) {
            return false;
        }
        self.entries.push((key, value));
        true
    }

    /// Look up a value by key, ignoring case.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.position(key).map(|idx| &self.entries[idx].1)
    }

    /// Whether a key equal ignoring case is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Remove and return the entry for a key, ignoring case. The stored
    /// key casing is returned alongside the value.
    pub fn remove(&mut self, key: &str) -> Option<(String, V)> {
        self.position(key).map(|idx| self.entries.remove(idx))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| keys_match(k, key))
    }
}

fn keys_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
        || a.chars()
            .flat_map(char::to_lowercase)
            .eq(b.chars().flat_map(char::to_lowercase))
}

impl<V> Default for BindingMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for BindingMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V> IntoIterator for BindingMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_insert_wins_ignoring_case() {
        let mut map = BindingMap::new();
        assert!(map.insert("Req", 1));
        assert!(!map.insert("req", 2));
        assert!(!map.insert("REQ", 3));

        assert_eq!(map.len(), 1);
        assert_eq!(map.get("req"), Some(&1));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["Req"]);
    }

    #[test]
    fn test_non_ascii_keys_fold_case() {
        let mut map = BindingMap::new();
        assert!(map.insert("Ärger", 1));
        assert!(!map.insert("äRGER", 2));
        assert!(map.insert("Ärgerlich", 3));

        assert_eq!(map.get("ÄRGER"), Some(&1));
        assert_eq!(map.get("σίγμα"), None);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_preserves_insertion_order() {
        let map: BindingMap<i32> = [("b", 1), ("a", 2), ("c", 3)].into_iter().collect();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_remove_returns_stored_casing() {
        let mut map = BindingMap::new();
        map.insert("$Return", "x");
        let (key, value) = map.remove("$return").unwrap();
        assert_eq!(key, "$Return");
        assert_eq!(value, "x");
        assert!(map.is_empty());
    }
}
