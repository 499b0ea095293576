//! The configuration tree consumed by the acquire engine.
//!
//! Keys are `::`-separated paths (`Acquire::Retries::Delay`), compared
//! case-insensitively; values are strings with typed accessors on top.
//! Parsing configuration *files* happens elsewhere; this type is the
//! already-parsed tree handed to the engine, and it keeps insertion order
//! because the full dump is replayed verbatim to methods that ask for it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::message::parse_bool;

/// Result of looking up a per-scheme method override.
///
/// A scheme can be redirected to another binary or explicitly switched
/// off by policy; the latter is a first-class state here rather than a
/// magic value hidden in a path string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodOverride {
    /// No override configured; use the methods directory.
    Unset,
    /// The scheme is disabled by policy.
    Disabled,
    /// Use this binary instead of the default one.
    Path(PathBuf),
}

/// An ordered, case-insensitive key/value tree.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    items: Vec<(String, String)>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing an existing entry in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .items
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some((_, v)) => *v = value,
            None => self.items.push((key, value)),
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.items.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
    }

    pub fn find(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn find_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.find(key).unwrap_or(default)
    }

    pub fn find_bool(&self, key: &str, default: bool) -> bool {
        self.find(key).and_then(parse_bool).unwrap_or(default)
    }

    pub fn find_i64(&self, key: &str, default: i64) -> i64 {
        self.find(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// A path-valued entry; empty values count as unset.
    pub fn find_path(&self, key: &str) -> Option<PathBuf> {
        self.find(key)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    /// A directory-valued entry with a fallback.
    pub fn find_dir(&self, key: &str, default: &str) -> PathBuf {
        self.find_path(key)
            .unwrap_or_else(|| PathBuf::from(default))
    }

    /// Look up `Dir::Bin::Methods::<access>`.
    ///
    /// The historical way to disable a scheme is setting its override to
    /// the literal string `false`; that spelling is parsed into
    /// [`MethodOverride::Disabled`] so callers never string-compare.
    pub fn method_override(&self, access: &str) -> MethodOverride {
        match self.find(&format!("Dir::Bin::Methods::{access}")) {
            None => MethodOverride::Unset,
            Some(v) if v.eq_ignore_ascii_case("false") => MethodOverride::Disabled,
            Some(v) => MethodOverride::Path(PathBuf::from(v)),
        }
    }

    /// The methods directory (`Dir::Bin::Methods`).
    pub fn methods_dir(&self) -> PathBuf {
        self.find_dir("Dir::Bin::Methods", "/usr/lib/apt/methods")
    }

    /// Default binary path for `access`: the methods directory entry of
    /// the same name.
    pub fn method_default_path(&self, access: &str) -> PathBuf {
        self.methods_dir().join(access)
    }

    /// All entries in insertion order, for the configuration dump.
    pub fn dump(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Configuration {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut cfg = Self::new();
        for (k, v) in iter {
            cfg.set(k, v);
        }
        cfg
    }
}

/// Helper for tests and embedders: a tree pre-pointed at a methods
/// directory.
pub fn with_methods_dir(dir: &Path) -> Configuration {
    let mut cfg = Configuration::new();
    cfg.set("Dir::Bin::Methods", dir.display().to_string());
    cfg
}
