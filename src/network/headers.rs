//! Ordered, case-insensitive header list

/// HTTP header list preserving insertion order
///
/// Names compare case-insensitively; the casing of the first insertion is
/// kept for transmission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    entries: Vec<(String, String)>,
}

impl HeaderList {
    /// Create an empty header list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing entries with the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Append a value to an existing header, joined by `", "`, or add it
    pub fn combine(&mut self, name: &str, value: &str) {
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// Replace every entry with this name by a single entry
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.entries.push((name.to_string(), value.into()));
    }

    /// Remove all entries with this name
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// All values for a name joined by `", "`, or `None` when absent
    pub fn get(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// Check whether a header is present
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Iterate over `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of raw entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Lower-cased, combined and name-sorted view for `getAllResponseHeaders`
    pub fn sorted_combined(&self) -> Vec<(String, String)> {
        let mut combined: Vec<(String, String)> = Vec::new();
        for (name, value) in &self.entries {
            let lower = name.to_ascii_lowercase();
            match combined.iter_mut().find(|(n, _)| *n == lower) {
                Some((_, existing)) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                None => combined.push((lower, value.clone())),
            }
        }
        combined.sort_by(|a, b| a.0.cmp(&b.0));
        combined
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = HeaderList::new();
        headers.append("Content-Type", "text/xml");
        assert_eq!(headers.get("content-type"), Some("text/xml".to_string()));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/xml".to_string()));
        assert!(headers.get("content-length").is_none());
    }

    #[test]
    fn test_combine_appends_value() {
        let mut headers = HeaderList::new();
        headers.combine("X-Foo", "a");
        headers.combine("x-foo", "b");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-FOO"), Some("a, b".to_string()));
        assert_eq!(headers.iter().next(), Some(("X-Foo", "a, b")));
    }

    #[test]
    fn test_repeated_entries_join_on_get() {
        let headers: HeaderList = [("Vary", "Accept"), ("vary", "Origin")].into_iter().collect();
        assert_eq!(headers.get("vary"), Some("Accept, Origin".to_string()));
    }

    #[test]
    fn test_sorted_combined() {
        let headers: HeaderList = [
            ("X-B", "2"),
            ("Content-Type", "text/plain"),
            ("x-b", "3"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            headers.sorted_combined(),
            vec![
                ("content-type".to_string(), "text/plain".to_string()),
                ("x-b".to_string(), "2, 3".to_string()),
            ]
        );
    }

    #[test]
    fn test_set_replaces() {
        let mut headers = HeaderList::new();
        headers.append("Accept", "a");
        headers.append("accept", "b");
        headers.set("Accept", "*/*");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("accept"), Some("*/*".to_string()));
    }
}
