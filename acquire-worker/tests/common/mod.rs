//! Shared fixtures for worker integration tests.
//!
//! Each test gets its own methods directory containing the scripted mock
//! method under the access name, plus the session state a real embedder
//! would own (configuration, queue, owner arena, progress, report sink).

#![allow(dead_code)]

use acquire_common::config::{Configuration, with_methods_dir};
use acquire_common::hashes::HashList;
use acquire_common::report::ReportSink;
use acquire_worker::item::{ItemDesc, Owner, OwnerArena, OwnerId};
use acquire_worker::progress::RecordingProgress;
use acquire_worker::queue::{QueueItem, WorkerQueue};
use acquire_worker::worker::{Worker, WorkerContext};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// A temporary methods directory with the mock method installed as
/// `access` and scripted by a JSON file next to it.
pub struct MethodDir {
    pub dir: TempDir,
    pub access: String,
}

impl MethodDir {
    pub fn new(access: &str, script: &serde_json::Value) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mock = env!("CARGO_BIN_EXE_mock-method");
        std::os::unix::fs::symlink(mock, dir.path().join(access)).expect("install mock method");
        std::fs::write(
            dir.path().join(format!("{access}.script.json")),
            serde_json::to_vec_pretty(script).expect("script json"),
        )
        .expect("write script");
        Self {
            dir,
            access: access.to_string(),
        }
    }

    /// Configuration pointing `Dir::Bin::Methods` at this directory.
    pub fn config(&self) -> Configuration {
        with_methods_dir(self.dir.path())
    }

    /// Everything the mock method received so far, as wire text.
    pub fn log(&self) -> String {
        std::fs::read_to_string(self.dir.path().join(format!("{}.log", self.access)))
            .unwrap_or_default()
    }

    /// Poll the method log until it contains `needle`.
    pub async fn wait_for_log(&self, needle: &str) -> String {
        for _ in 0..250 {
            let log = self.log();
            if log.contains(needle) {
                return log;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("method log never contained {needle:?}; log so far:\n{}", self.log());
    }
}

/// The state an embedder owns around one worker.
pub struct Session {
    pub config: Configuration,
    pub queue: WorkerQueue,
    pub owners: OwnerArena,
    pub progress: RecordingProgress,
    pub report: ReportSink,
}

impl Session {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            queue: WorkerQueue::new(),
            owners: OwnerArena::new(),
            progress: RecordingProgress::default(),
            report: ReportSink::new(),
        }
    }

    pub fn ctx(&mut self) -> WorkerContext<'_> {
        WorkerContext {
            config: &self.config,
            queue: &mut self.queue,
            owners: &mut self.owners,
            progress: &mut self.progress,
            report: &mut self.report,
        }
    }

    /// Create an owner and put its item in flight on the queue.
    pub fn add_item(&mut self, uri: &str, dest: &Path, hashes: HashList) -> OwnerId {
        let retries = self.config.find_i64("Acquire::Retries", 3).max(0) as u32;
        let site = acquire_common::uri::site_only(uri);
        let owner = Owner::new(
            ItemDesc::new(uri, format!("{site} x"), "x"),
            dest.to_path_buf(),
            hashes,
            retries,
        );
        let id = self.owners.add(owner);
        self.queue.add(QueueItem::for_owner(&self.owners, id));
        id
    }

    /// Put an owner's item back in flight after a re-enqueue.
    pub fn requeue_item(&mut self, id: OwnerId) {
        self.queue.add(QueueItem::for_owner(&self.owners, id));
    }
}

/// Pump the worker until `done` observes the expected state.
pub async fn pump_until<F>(worker: &mut Worker, session: &mut Session, mut done: F)
where
    F: FnMut(&Session) -> bool,
{
    for _ in 0..200 {
        if done(session) {
            return;
        }
        let mut ctx = session.ctx();
        match tokio::time::timeout(Duration::from_secs(5), worker.pump(&mut ctx)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => panic!("worker failed while pumping: {err}"),
            Err(_) => panic!("timed out waiting for worker progress"),
        }
    }
    panic!("condition not reached after 200 pump steps");
}

/// Flush the worker's outbound buffer to the method.
pub async fn flush_out(worker: &mut Worker, session: &mut Session) {
    while worker.out_pending() {
        let mut ctx = session.ctx();
        tokio::time::timeout(Duration::from_secs(5), worker.out_ready(&mut ctx))
            .await
            .expect("timed out flushing")
            .expect("flush failed");
    }
}
