//! The worker-facing slice of the acquire queue.
//!
//! The enclosing engine owns the real scheduling; the worker only needs
//! to find the in-flight item an incoming record refers to, mark items
//! done, and hand owners back for re-enqueueing. Re-enqueues and aux
//! requests are collected in outboxes the enclosing loop drains.

use acquire_common::hashes::HashList;
use std::collections::VecDeque;

use crate::item::{Owner, OwnerArena, OwnerId};

/// One URI in flight on a worker.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// The (possibly re-encoded) URI handed to the method.
    pub uri: String,
    /// Display string; first space-separated token is the site label.
    pub description: String,
    /// Size announced by `URI Start`, 0 until then.
    pub total_size: u64,
    /// Bytes on disk so far, sampled by `pulse`.
    pub current_size: u64,
    /// Offset an interrupted transfer resumed from.
    pub resume_point: u64,
    /// Owners sharing this download, in arrival order.
    pub owners: Vec<OwnerId>,
}

impl QueueItem {
    pub fn new(uri: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            description: description.into(),
            total_size: 0,
            current_size: 0,
            resume_point: 0,
            owners: Vec::new(),
        }
    }

    /// Build an item carrying a single owner, from that owner's request.
    pub fn for_owner(arena: &OwnerArena, id: OwnerId) -> Self {
        let owner: &Owner = &arena[id];
        let mut item = Self::new(owner.desc.uri.clone(), owner.desc.description.clone());
        item.owners.push(id);
        item
    }

    pub fn add_owner(&mut self, id: OwnerId) {
        self.owners.push(id);
    }
}

/// An auxiliary resource a method asked for mid-transfer.
#[derive(Debug)]
pub struct AuxRequest {
    /// The owner whose transfer triggered the request.
    pub requestor: OwnerId,
    pub short_desc: String,
    pub description: String,
    pub uri: String,
    pub hashes: HashList,
    /// 0 means no size cap.
    pub maximum_size: u64,
}

/// In-flight items plus the outboxes the enclosing loop consumes.
#[derive(Debug, Default)]
pub struct WorkerQueue {
    items: Vec<QueueItem>,
    requeued: VecDeque<OwnerId>,
    aux_requests: Vec<AuxRequest>,
}

impl WorkerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: QueueItem) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    /// Index of the in-flight item with exactly this URI.
    pub fn find_index(&self, uri: &str) -> Option<usize> {
        self.items.iter().position(|i| i.uri == uri)
    }

    pub fn get(&self, index: usize) -> &QueueItem {
        &self.items[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut QueueItem {
        &mut self.items[index]
    }

    /// Remove a finished item, returning it so its owners can be settled.
    pub fn item_done(&mut self, index: usize) -> QueueItem {
        self.items.remove(index)
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Hand an owner back for re-enqueueing by the enclosing loop.
    pub fn requeue(&mut self, id: OwnerId) {
        self.requeued.push_back(id);
    }

    /// Drain the re-enqueue outbox, oldest first.
    pub fn take_requeued(&mut self) -> Vec<OwnerId> {
        self.requeued.drain(..).collect()
    }

    pub fn push_aux(&mut self, request: AuxRequest) {
        self.aux_requests.push(request);
    }

    /// Drain pending auxiliary requests.
    pub fn take_aux(&mut self) -> Vec<AuxRequest> {
        std::mem::take(&mut self.aux_requests)
    }
}
