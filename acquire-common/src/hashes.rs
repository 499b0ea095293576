//! Hash lists for download verification.
//!
//! Methods report digests as `<Algo>-Hash` tags; index metadata supplies
//! the expected digests. Both sides meet in a [`HashList`], which knows
//! which algorithms count as collision-safe and how to compare the two
//! lists without demanding that they advertise the same algorithm set.

use crate::message::Record;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const HASH_READ_BUF: usize = 64 * 1024;

/// Digest algorithms spoken on the wire, strongest first.
///
/// `FileSize` is a pseudo-entry carrying the byte count; it rides along in
/// hash lists but never makes a list usable on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    Sha512,
    Sha256,
    Sha1,
    Md5Sum,
    FileSize,
}

impl HashKind {
    pub const ALL: [HashKind; 5] = [
        HashKind::Sha512,
        HashKind::Sha256,
        HashKind::Sha1,
        HashKind::Md5Sum,
        HashKind::FileSize,
    ];

    /// Wire name, as used in `<name>-Hash` and `Expected-<name>` tags.
    pub fn name(self) -> &'static str {
        match self {
            HashKind::Sha512 => "SHA512",
            HashKind::Sha256 => "SHA256",
            HashKind::Sha1 => "SHA1",
            HashKind::Md5Sum => "MD5Sum",
            HashKind::FileSize => "Checksum-FileSize",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    /// Whether this algorithm is trusted against collision attacks.
    pub fn is_strong(self) -> bool {
        matches!(self, HashKind::Sha512 | HashKind::Sha256)
    }
}

/// A single algorithm/digest pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashItem {
    kind: HashKind,
    value: String,
}

impl HashItem {
    pub fn new(kind: HashKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn kind(&self) -> HashKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An ordered set of digests for one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashList {
    items: Vec<HashItem>,
}

impl HashList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect `prefix<Algo>-Hash` tags from a protocol record.
    pub fn from_record(prefix: &str, record: &Record) -> Self {
        let mut list = Self::new();
        for kind in HashKind::ALL {
            let tag = format!("{prefix}{}-Hash", kind.name());
            if let Some(value) = record.get(&tag) {
                if !value.is_empty() {
                    list.push(HashItem::new(kind, value));
                }
            }
        }
        list
    }

    pub fn push(&mut self, item: HashItem) {
        match self.items.iter_mut().find(|i| i.kind == item.kind) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    pub fn find(&self, kind: HashKind) -> Option<&HashItem> {
        self.items.iter().find(|i| i.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HashItem> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Byte count carried by the pseudo file-size entry, if any.
    pub fn file_size(&self) -> u64 {
        self.find(HashKind::FileSize)
            .and_then(|i| i.value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Whether this list is strong enough to verify against.
    ///
    /// With a forced algorithm configured the list must carry exactly that
    /// algorithm; otherwise at least one collision-safe digest is needed.
    pub fn usable(&self, forced: Option<&str>) -> bool {
        if self.items.is_empty() {
            return false;
        }
        match forced.filter(|f| !f.is_empty()) {
            Some(forced) => HashKind::from_name(forced)
                .and_then(|k| self.find(k))
                .is_some(),
            None => self.items.iter().any(|i| i.kind.is_strong()),
        }
    }

    /// Compare two lists the way verification needs: every algorithm both
    /// sides know must agree, and at least one algorithm must be shared.
    pub fn matches(&self, other: &HashList) -> bool {
        let mut shared = 0usize;
        for item in &self.items {
            let Some(theirs) = other.find(item.kind) else {
                continue;
            };
            if !item.value.eq_ignore_ascii_case(&theirs.value) {
                return false;
            }
            shared += 1;
        }
        shared != 0
    }
}

impl FromIterator<HashItem> for HashList {
    fn from_iter<T: IntoIterator<Item = HashItem>>(iter: T) -> Self {
        let mut list = Self::new();
        for item in iter {
            list.push(item);
        }
        list
    }
}

/// Streaming multi-digest calculator.
///
/// Instantiates only the algorithms named by the selector list, so an
/// expected-hash set doubles as the "which digests to compute" request.
pub struct MultiHasher {
    md5: Option<Md5>,
    sha1: Option<Sha1>,
    sha256: Option<Sha256>,
    sha512: Option<Sha512>,
    size: u64,
}

impl MultiHasher {
    pub fn for_selector(selector: &HashList) -> Self {
        let want = |kind| selector.find(kind).is_some();
        Self {
            md5: want(HashKind::Md5Sum).then(Md5::new),
            sha1: want(HashKind::Sha1).then(Sha1::new),
            sha256: want(HashKind::Sha256).then(Sha256::new),
            sha512: want(HashKind::Sha512).then(Sha512::new),
            size: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        if let Some(h) = self.md5.as_mut() {
            h.update(data);
        }
        if let Some(h) = self.sha1.as_mut() {
            h.update(data);
        }
        if let Some(h) = self.sha256.as_mut() {
            h.update(data);
        }
        if let Some(h) = self.sha512.as_mut() {
            h.update(data);
        }
        self.size += data.len() as u64;
    }

    pub fn finish(self) -> HashList {
        let mut list = HashList::new();
        if let Some(h) = self.md5 {
            list.push(HashItem::new(HashKind::Md5Sum, hex::encode(h.finalize())));
        }
        if let Some(h) = self.sha1 {
            list.push(HashItem::new(HashKind::Sha1, hex::encode(h.finalize())));
        }
        if let Some(h) = self.sha256 {
            list.push(HashItem::new(HashKind::Sha256, hex::encode(h.finalize())));
        }
        if let Some(h) = self.sha512 {
            list.push(HashItem::new(HashKind::Sha512, hex::encode(h.finalize())));
        }
        list.push(HashItem::new(HashKind::FileSize, self.size.to_string()));
        list
    }
}

/// Hash a file on disk, computing the algorithms named by `selector`.
pub fn hash_file(path: &Path, selector: &HashList) -> std::io::Result<HashList> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = MultiHasher::for_selector(selector);
    let mut buf = vec![0u8; HASH_READ_BUF];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn list(pairs: &[(HashKind, &str)]) -> HashList {
        pairs
            .iter()
            .map(|(k, v)| HashItem::new(*k, *v))
            .collect()
    }

    #[test]
    fn from_record_collects_prefixed_tags() {
        let rec = Record::new(201, "URI Done")
            .with("SHA256-Hash", "aa")
            .with("MD5Sum-Hash", "bb")
            .with("Aux-SHA512-Hash", "cc");
        let plain = HashList::from_record("", &rec);
        assert!(plain.find(HashKind::Sha256).is_some());
        assert!(plain.find(HashKind::Sha512).is_none());
        let aux = HashList::from_record("Aux-", &rec);
        assert_eq!(aux.find(HashKind::Sha512).map(HashItem::value), Some("cc"));
    }

    #[test]
    fn usable_requires_a_strong_algorithm() {
        assert!(!list(&[(HashKind::Md5Sum, "aa")]).usable(None));
        assert!(!list(&[(HashKind::FileSize, "10")]).usable(None));
        assert!(list(&[(HashKind::Sha256, "aa")]).usable(None));
    }

    #[test]
    fn forced_algorithm_overrides_strength_rules() {
        let weak = list(&[(HashKind::Md5Sum, "aa")]);
        assert!(weak.usable(Some("MD5Sum")));
        assert!(!weak.usable(Some("SHA256")));
    }

    #[test]
    fn matches_needs_agreement_on_every_shared_algorithm() {
        let expected = list(&[(HashKind::Sha256, "aa"), (HashKind::Md5Sum, "bb")]);
        assert!(list(&[(HashKind::Sha256, "AA")]).matches(&expected));
        assert!(!list(&[(HashKind::Sha256, "xx")]).matches(&expected));
        assert!(!list(&[(HashKind::Sha512, "zz")]).matches(&expected));
        assert!(!HashList::new().matches(&expected));
    }

    #[test]
    fn hash_file_computes_selected_algorithms_and_size() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello").unwrap();
        let selector = list(&[(HashKind::Sha256, ""), (HashKind::Md5Sum, "")]);
        let got = hash_file(tmp.path(), &selector).unwrap();
        assert_eq!(
            got.find(HashKind::Sha256).map(HashItem::value),
            Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"),
        );
        assert_eq!(
            got.find(HashKind::Md5Sum).map(HashItem::value),
            Some("5d41402abc4b2a76b9719d911017c592"),
        );
        assert!(got.find(HashKind::Sha1).is_none());
        assert_eq!(got.file_size(), 5);
    }
}
