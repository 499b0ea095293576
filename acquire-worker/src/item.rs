//! Owners: the per-caller requests riding on an in-flight URI.
//!
//! One URI can be wanted by several callers at once, each with its own
//! destination file, expected hashes and retry budget. Owners live in an
//! arena owned by the enclosing queue and are referenced everywhere by
//! stable index, never by pointer, so the worker and the queue cannot end
//! up in cyclic ownership.

use acquire_common::hashes::HashList;
use acquire_common::message::Record;
use acquire_common::uri;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::ops::{Index, IndexMut};
use std::path::PathBuf;
use std::time::Instant;

/// Lifecycle state of one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting in a queue, not handed to a worker yet.
    Idle,
    /// A worker is actively fetching this owner's URI.
    Fetching,
    /// Fetched and verified.
    Done,
    /// Verification failed: the data cannot be trusted.
    AuthError,
    /// A network-level failure that may heal on its own.
    TransientNetworkError,
    /// Any other terminal failure.
    Error,
}

impl Default for ItemStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// What one owner asked for: URI plus display strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDesc {
    pub uri: String,
    /// Human-readable description; the first space-separated token is the
    /// site label and gets rewritten on mirror switches.
    pub description: String,
    pub short_desc: String,
}

impl ItemDesc {
    pub fn new(
        uri: impl Into<String>,
        description: impl Into<String>,
        short_desc: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            description: description.into(),
            short_desc: short_desc.into(),
        }
    }
}

/// Subtype behaviour of an owner, as a capability set.
///
/// Transaction items, auxiliary files and plain downloads differ only in
/// these predicates and observers; the worker consults `is_doomed` before
/// any mutating callback.
pub trait OwnerHooks: std::fmt::Debug {
    /// Whether the owner's enclosing transaction has been aborted.
    /// Doomed owners skip enqueue and done/failed side effects.
    fn is_doomed(&self) -> bool {
        false
    }

    /// Whether this owner refuses to accept unverified data.
    fn hashes_required(&self) -> bool {
        true
    }

    /// Final acceptance check once hashes look right; may still refuse.
    fn verify_done(&mut self, record: &Record) -> bool {
        let _ = record;
        true
    }

    /// Extra tags to append to the `600 URI Acquire` request.
    fn custom_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Upper bound on the transfer size, 0 for none.
    fn maximum_size(&self) -> u64 {
        0
    }

    fn on_start(&mut self, total_size: u64) {
        let _ = total_size;
    }

    fn on_done(&mut self, record: &Record, hashes: &HashList) {
        let _ = (record, hashes);
    }

    fn on_failed(&mut self, record: &Record) {
        let _ = record;
    }
}

/// Hooks for a plain file download.
#[derive(Debug, Default)]
pub struct DownloadHooks {
    /// Refuse unverified data even when no expected hashes are known.
    pub require_hashes: bool,
}

impl DownloadHooks {
    pub fn requiring_hashes() -> Self {
        Self {
            require_hashes: true,
        }
    }
}

impl OwnerHooks for DownloadHooks {
    fn hashes_required(&self) -> bool {
        self.require_hashes
    }
}

/// Stable handle into the owner arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(pub usize);

/// One caller's request for a URI.
#[derive(Debug)]
pub struct Owner {
    pub desc: ItemDesc,
    pub dest_file: PathBuf,
    pub expected_hashes: HashList,
    /// Remaining transient-failure retries; only ever decreases.
    pub retries: u32,
    pub status: ItemStatus,
    /// Label of the mirror that actually served this owner, if any.
    pub used_mirror: String,
    /// Earliest time a retry may be handed to a worker again.
    pub fetch_after: Option<Instant>,
    /// The data never crossed the network (e.g. `file:` URIs).
    pub local: bool,
    pub complete: bool,
    /// Message text of the most recent failure.
    pub fail_message: String,
    /// `FailReason` tag of the most recent failure.
    pub fail_reason: String,
    alternates: VecDeque<String>,
    bad_alternative_sites: Vec<String>,
    past_redirections: Vec<String>,
    pub hooks: Box<dyn OwnerHooks>,
}

impl Owner {
    pub fn new(desc: ItemDesc, dest_file: PathBuf, expected_hashes: HashList, retries: u32) -> Self {
        Self::with_hooks(
            desc,
            dest_file,
            expected_hashes,
            retries,
            Box::new(DownloadHooks::default()),
        )
    }

    pub fn with_hooks(
        desc: ItemDesc,
        dest_file: PathBuf,
        expected_hashes: HashList,
        retries: u32,
        hooks: Box<dyn OwnerHooks>,
    ) -> Self {
        Self {
            desc,
            dest_file,
            expected_hashes,
            retries,
            status: ItemStatus::Idle,
            used_mirror: String::new(),
            fetch_after: None,
            local: false,
            complete: false,
            fail_message: String::new(),
            fail_reason: String::new(),
            alternates: VecDeque::new(),
            bad_alternative_sites: Vec::new(),
            past_redirections: Vec::new(),
            hooks,
        }
    }

    /// A URI qualifies as an alternative only while it has not been
    /// visited through a redirect and its site has not been blacklisted.
    pub fn is_good_alternative(&self, uri: &str) -> bool {
        !self.past_redirections.iter().any(|p| p == uri)
            && !self
                .bad_alternative_sites
                .iter()
                .any(|s| *s == uri::site_only(uri))
    }

    /// Push an alternative URI onto the stack; silently dropped when it is
    /// no longer good.
    pub fn push_alternative_uri(&mut self, uri: String, at_back: bool) {
        if !self.is_good_alternative(&uri) {
            return;
        }
        if at_back {
            self.alternates.push_back(uri);
        } else {
            self.alternates.push_front(uri);
        }
    }

    /// Pop the next still-good alternative, discarding stale entries.
    pub fn pop_alternative_uri(&mut self) -> Option<String> {
        while let Some(uri) = self.alternates.pop_front() {
            if self.is_good_alternative(&uri) {
                return Some(uri);
            }
        }
        None
    }

    /// Blacklist a site after an authentication failure; alternates on
    /// that site are skipped from now on.
    pub fn remove_alternative_site(&mut self, site: &str) {
        if !self.bad_alternative_sites.iter().any(|s| s == site) {
            self.bad_alternative_sites.push(site.to_string());
        }
    }

    /// Track redirect targets. A repeat of the most recent target is a
    /// simple retry, any older repeat is a loop; new targets are recorded.
    pub fn is_redirection_loop(&mut self, uri: &str) -> bool {
        if self.past_redirections.last().is_some_and(|l| l == uri) {
            return false;
        }
        if self.past_redirections.iter().any(|p| p == uri) {
            return true;
        }
        self.past_redirections.push(uri.to_string());
        false
    }

    /// Rewrite the description's site label when `new_uri` lives on a
    /// different site than the current URI (a mirror switch).
    pub fn apply_mirror_change(&mut self, new_uri: &str) {
        if uri::site_only(new_uri) == uri::site_only(&self.desc.uri) {
            return;
        }
        let Some(first_space) = self.desc.description.find(' ') else {
            return;
        };
        let old_site = self.desc.description[..first_space].to_string();
        let Some(old_extra) = self
            .desc
            .uri
            .strip_prefix(&old_site)
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return;
        };
        let Some(new_site) = new_uri.strip_suffix(old_extra) else {
            return;
        };
        self.used_mirror = uri::archive_only(new_site);
        self.desc
            .description
            .replace_range(..first_space, &self.used_mirror);
    }

    /// Mark this owner as successfully finished.
    pub fn done(&mut self, record: &Record, hashes: &HashList) {
        self.status = ItemStatus::Done;
        self.complete = true;
        self.hooks.on_done(record, hashes);
    }

    /// Mark this owner as terminally failed. A status already forced to
    /// `AuthError` or `TransientNetworkError` is preserved.
    pub fn failed(&mut self, record: &Record) {
        self.fail_message = record.get_or("Message", "").to_string();
        self.fail_reason = record.get_or("FailReason", "").to_string();
        if !matches!(
            self.status,
            ItemStatus::AuthError | ItemStatus::TransientNetworkError
        ) {
            self.status = ItemStatus::Error;
        }
        self.complete = false;
        self.hooks.on_failed(record);
    }
}

/// The queue's owner storage; indices stay valid for the queue lifetime.
#[derive(Debug, Default)]
pub struct OwnerArena {
    owners: Vec<Owner>,
}

impl OwnerArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, owner: Owner) -> OwnerId {
        self.owners.push(owner);
        OwnerId(self.owners.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Owner> {
        self.owners.iter()
    }
}

impl Index<OwnerId> for OwnerArena {
    type Output = Owner;

    fn index(&self, id: OwnerId) -> &Owner {
        &self.owners[id.0]
    }
}

impl IndexMut<OwnerId> for OwnerArena {
    fn index_mut(&mut self, id: OwnerId) -> &mut Owner {
        &mut self.owners[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(uri: &str) -> Owner {
        Owner::new(
            ItemDesc::new(uri, format!("{} label", uri::site_only(uri)), "x"),
            PathBuf::from("/tmp/x"),
            HashList::new(),
            3,
        )
    }

    #[test]
    fn alternates_pop_in_push_order() {
        let mut o = owner("http://a/x");
        o.push_alternative_uri("http://m1/x".into(), true);
        o.push_alternative_uri("http://m2/x".into(), true);
        assert_eq!(o.pop_alternative_uri().as_deref(), Some("http://m1/x"));
        assert_eq!(o.pop_alternative_uri().as_deref(), Some("http://m2/x"));
        assert_eq!(o.pop_alternative_uri(), None);
    }

    #[test]
    fn bad_sites_are_skipped_when_popping() {
        let mut o = owner("http://a/x");
        o.push_alternative_uri("http://bad/x".into(), true);
        o.push_alternative_uri("http://good/x".into(), true);
        o.remove_alternative_site("http://bad");
        assert_eq!(o.pop_alternative_uri().as_deref(), Some("http://good/x"));
    }

    #[test]
    fn redirection_loop_detection() {
        let mut o = owner("http://a/x");
        assert!(!o.is_redirection_loop("http://b/x"));
        // Repeating the most recent target is a simple retry.
        assert!(!o.is_redirection_loop("http://b/x"));
        assert!(!o.is_redirection_loop("http://c/x"));
        // Going back to an older target is a loop.
        assert!(o.is_redirection_loop("http://b/x"));
    }

    #[test]
    fn visited_uris_stop_being_good_alternatives() {
        let mut o = owner("http://a/x");
        o.push_alternative_uri("http://b/x".into(), true);
        assert!(!o.is_redirection_loop("http://b/x"));
        assert!(!o.is_good_alternative("http://b/x"));
        assert_eq!(o.pop_alternative_uri(), None);
    }

    #[test]
    fn mirror_change_rewrites_site_label() {
        let mut o = owner("http://a/pool/x.deb");
        o.desc.description = "http://a pool/x.deb".into();
        o.apply_mirror_change("http://b/pool/x.deb");
        assert_eq!(o.used_mirror, "http://b");
        assert_eq!(o.desc.description, "http://b pool/x.deb");
    }

    #[test]
    fn same_site_redirect_keeps_label() {
        let mut o = owner("http://a/pool/x.deb");
        o.desc.description = "http://a pool/x.deb".into();
        o.apply_mirror_change("http://a/other/x.deb");
        assert_eq!(o.used_mirror, "");
        assert_eq!(o.desc.description, "http://a pool/x.deb");
    }

    #[test]
    fn failed_preserves_forced_auth_status() {
        let mut o = owner("http://a/x");
        o.status = ItemStatus::AuthError;
        o.failed(&Record::new(400, "URI Failure").with("FailReason", "HashSumMismatch"));
        assert_eq!(o.status, ItemStatus::AuthError);
        assert_eq!(o.fail_reason, "HashSumMismatch");

        let mut o = owner("http://a/x");
        o.failed(&Record::new(400, "URI Failure").with("Message", "boom"));
        assert_eq!(o.status, ItemStatus::Error);
        assert_eq!(o.fail_message, "boom");
    }
}
