//! Captured path parameters.
//!
//! Parameters are keyed either by name (`:id`) or by position (unnamed
//! groups and `*`). Storage is a [`SmallVec`] so the common case of a handful
//! of captures never touches the heap.

use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};
use smallvec::SmallVec;

/// Maximum number of captures stored inline before spilling to the heap.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Key of a captured parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKey {
    /// `:name` capture. Names come from the compiled pattern, so they are
    /// shared `Arc<str>` rather than per-request strings.
    Name(Arc<str>),
    /// Unnamed group or wildcard, numbered from 0 in pattern order.
    Index(usize),
}

impl ParamKey {
    /// Name of a named key.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            ParamKey::Name(name) => Some(name),
            ParamKey::Index(_) => None,
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKey::Name(name) => f.write_str(name),
            ParamKey::Index(idx) => write!(f, "{idx}"),
        }
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        ParamKey::Name(Arc::from(name))
    }
}

impl From<usize> for ParamKey {
    fn from(idx: usize) -> Self {
        ParamKey::Index(idx)
    }
}

/// Ordered parameter set attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: SmallVec<[(ParamKey, String); MAX_INLINE_PARAMS]>,
}

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of the named parameter `name`.
    #[must_use]
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rfind(|(k, _)| k.name() == Some(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of the positional parameter `idx`.
    #[must_use]
    #[inline]
    pub fn positional(&self, idx: usize) -> Option<&str> {
        self.get_key(&ParamKey::Index(idx))
    }

    #[must_use]
    pub fn get_key(&self, key: &ParamKey) -> Option<&str> {
        self.entries
            .iter()
            .rfind(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains_key(&self, key: &ParamKey) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or overwrite `key`, keeping the original position on overwrite.
    pub fn set(&mut self, key: impl Into<ParamKey>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &ParamKey) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &str)> {
        self.entries.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Number of contiguous positional keys starting at 0.
    fn positional_run(&self) -> usize {
        let mut n = 0;
        while self.contains_key(&ParamKey::Index(n)) {
            n += 1;
        }
        n
    }

    /// Merge a layer's captures with the parameters inherited from an
    /// enclosing router.
    ///
    /// Named keys: the parent set overwritten by the child's keys. When both
    /// sides carry positional key `0`, the child's contiguous positional run
    /// is shifted up by the parent's run length first so neither side's
    /// positional values are lost. A shifted index `k` below the parent's run
    /// length is dropped from its old slot.
    #[must_use]
    pub fn merge(mut child: Params, parent: &Params) -> Params {
        let mut merged = parent.clone();
        let zero = ParamKey::Index(0);

        if child.contains_key(&zero) && parent.contains_key(&zero) {
            let run = child.positional_run();
            let offset = parent.positional_run();
            for k in (0..run).rev() {
                if let Some(value) = child.get_key(&ParamKey::Index(k)).map(str::to_owned) {
                    child.set(ParamKey::Index(k + offset), value);
                }
                if k < offset {
                    child.remove(&ParamKey::Index(k));
                }
            }
        }

        for (key, value) in child.entries {
            merged.set(key, value);
        }
        merged
    }
}

impl FromIterator<(ParamKey, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (ParamKey, String)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(&k.to_string(), v)?;
        }
        map.end()
    }
}
