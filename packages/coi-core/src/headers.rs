//! Isolation header names and values, plus a small case-insensitive header
//! list that follows the browser `Headers` semantics closely enough for the
//! rewrite to be checked without a browser.

pub const OPENER_POLICY_HEADER: &str = "Cross-Origin-Opener-Policy";
pub const OPENER_POLICY_VALUE: &str = "same-origin";
pub const EMBEDDER_POLICY_HEADER: &str = "Cross-Origin-Embedder-Policy";
pub const EMBEDDER_POLICY_VALUE: &str = "require-corp";

/// Headers added to every rewritten response.
pub const ISOLATION_HEADERS: [(&str, &str); 2] = [
    (OPENER_POLICY_HEADER, OPENER_POLICY_VALUE),
    (EMBEDDER_POLICY_HEADER, EMBEDDER_POLICY_VALUE),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (name, value) in entries {
            set.append(name, value);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// First value stored under `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces every value stored under `name`. The first occurrence keeps
    /// its position; a new name is appended.
    pub fn set(&mut self, name: &str, value: &str) {
        let mut kept = false;
        self.entries.retain_mut(|(existing, existing_value)| {
            if !existing.eq_ignore_ascii_case(name) {
                return true;
            }
            if kept {
                return false;
            }
            kept = true;
            *existing_value = value.to_string();
            true
        });
        if !kept {
            self.append(name, value);
        }
    }

    pub fn with_isolation_headers(&self) -> Self {
        let mut headers = self.clone();
        for (name, value) in ISOLATION_HEADERS {
            headers.set(name, value);
        }
        headers
    }
}

impl<'a> IntoIterator for &'a HeaderSet {
    type Item = &'a (String, String);
    type IntoIter = std::slice::Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
