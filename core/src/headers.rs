//! Ordered, case-insensitive header multimap.
//!
//! # Design
//! Entries are kept in a `Vec` in first-insertion order of each distinct
//! name, which is also the order they are written to the wire. Every entry
//! remembers the casing of the first time its name was seen and holds all of
//! its values in order. Lookups are linear; header lists are short.

use std::fmt;

use crate::http::is_token;

#[derive(Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    key: String,
    values: Vec<String>,
}

/// An ordered multimap from header name to one or more values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Entry>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every value stored under `name` with `value`.
    ///
    /// An existing entry keeps its position and original casing.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => {
                let values = &mut self.entries[idx].values;
                values.clear();
                values.push(value);
            }
            None => self.push_entry(name, value),
        }
    }

    /// Add `value` under `name` without touching existing values.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].values.push(value),
            None => self.push_entry(name, value),
        }
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entry(name)
            .and_then(|e| e.values.first())
            .map(String::as_str)
    }

    /// All values stored under `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entry(name).map(|e| e.values.as_slice()).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove `name` and return its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|idx| self.entries.remove(idx).values)
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct names in insertion order, with their stored casing.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// `(name, value)` pairs in serialization order, one pair per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|e| e.values.iter().map(move |v| (e.name.as_str(), v.as_str())))
    }

    /// Copy every header of `defaults` whose name is absent here.
    pub(crate) fn fill_missing(&mut self, defaults: &Headers) {
        for entry in &defaults.entries {
            if !self.contains(&entry.key) {
                self.entries.push(entry.clone());
            }
        }
    }

    /// First name or value that could not be written on the wire.
    pub(crate) fn find_invalid(&self) -> Option<String> {
        for entry in &self.entries {
            if !is_token(&entry.name) {
                return Some(entry.name.clone());
            }
            if entry.values.iter().any(|v| !is_valid_value(v)) {
                return Some(entry.name.clone());
            }
        }
        None
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.key.eq_ignore_ascii_case(name))
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.position(name).map(|idx| &self.entries[idx])
    }

    fn push_entry(&mut self, name: String, value: String) {
        self.entries.push(Entry {
            key: name.to_ascii_lowercase(),
            name,
            values: vec![value],
        });
    }
}

fn is_valid_value(value: &str) -> bool {
    value.bytes().all(|b| b == b'\t' || (b >= 0x20 && b != 0x7f))
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        headers.extend(iter);
        headers
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Headers {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.append(name, value);
        }
    }
}
