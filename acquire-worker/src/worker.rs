//! The worker: supervisor for one running fetch method.
//!
//! One worker owns one method child and the two pipe ends connecting it.
//! The enclosing event loop multiplexes readiness across workers; this
//! type reacts to it: `in_ready` parses and dispatches every record the
//! pipe has to offer, `out_ready` drains the outbound buffer as far as
//! the pipe accepts. Dispatch mutates queue state through the explicit
//! [`WorkerContext`], never through globals.

use acquire_common::config::Configuration;
use acquire_common::hashes::{HashList, hash_file};
use acquire_common::message::{Record, RecordCodec, RecordError};
use acquire_common::report::ReportSink;
use acquire_common::uri;
use bytes::BytesMut;
use std::collections::VecDeque;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout};
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::files::{prepare_files, real_file_exists, sandbox_permissions};
use crate::item::{ItemStatus, OwnerArena};
use crate::method::{MethodConfig, MethodHandle, StartError, resolve_method};
use crate::policy::{FailureClass, classify_failure, handle_failure};
use crate::progress::{Progress, StatusFd};
use crate::queue::{AuxRequest, WorkerQueue};

/// Everything dispatch is allowed to touch, passed explicitly.
pub struct WorkerContext<'a> {
    pub config: &'a Configuration,
    pub queue: &'a mut WorkerQueue,
    pub owners: &'a mut OwnerArena,
    pub progress: &'a mut dyn Progress,
    pub report: &'a mut ReportSink,
}

/// Failures the enclosing event loop has to react to.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A pipe returned EOF or an error; the method is gone.
    #[error("Method {0} has died unexpectedly!")]
    MethodDied(String),

    /// The method sent bytes that are not a protocol record.
    #[error("Invalid message from method {access}: {status_line:?}")]
    Protocol { access: String, status_line: String },
}

/// Supervisor for one running method process.
#[derive(Debug)]
pub struct Worker {
    access: String,
    debug: bool,
    debug_auth: bool,
    caps: MethodConfig,
    capabilities_seen: bool,
    status: String,
    /// URI of the item the method reported a `URI Start` for.
    current_item: Option<String>,
    child: MethodHandle,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    codec: RecordCodec,
    inbuf: BytesMut,
    pending: VecDeque<Record>,
    outbuf: BytesMut,
    status_fd: Option<StatusFd>,
}

impl Worker {
    /// Resolve, spawn and handshake a method for `access`.
    ///
    /// Returns once the `100 Capabilities` greeting has been processed
    /// and, when requested, the configuration dump has been queued.
    pub async fn start(access: &str, ctx: &mut WorkerContext<'_>) -> Result<Self, StartError> {
        let resolved = resolve_method(ctx.config, access)?;
        let (child, stdin, stdout) = MethodHandle::spawn(&resolved, access)?;
        let mut worker = Self {
            access: access.to_string(),
            debug: ctx.config.find_bool("Debug::pkgAcquire::Worker", false),
            debug_auth: ctx.config.find_bool("Debug::pkgAcquire::Auth", false),
            caps: MethodConfig::new(access),
            capabilities_seen: false,
            status: String::new(),
            current_item: None,
            child,
            stdin: Some(stdin),
            stdout: Some(stdout),
            codec: RecordCodec::new(),
            inbuf: BytesMut::with_capacity(4096),
            pending: VecDeque::new(),
            outbuf: BytesMut::new(),
            status_fd: StatusFd::from_config(ctx.config),
        };
        while !worker.capabilities_seen {
            if worker.in_ready(ctx).await.is_err() {
                return Err(StartError::Handshake(access.to_string()));
            }
        }
        worker.send_configuration(ctx.config);
        Ok(worker)
    }

    pub fn access(&self) -> &str {
        &self.access
    }

    /// Capabilities negotiated with the method.
    pub fn method_config(&self) -> &MethodConfig {
        &self.caps
    }

    /// Most recent `102 Status` text.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// URI of the item the method is actively transferring, if any.
    pub fn current_item(&self) -> Option<&str> {
        self.current_item.as_deref()
    }

    /// Whether the outbound buffer still holds bytes for the method.
    pub fn out_pending(&self) -> bool {
        !self.outbuf.is_empty()
    }

    /// The raw bytes queued for the method; useful for assertions.
    pub fn pending_output(&self) -> &[u8] {
        &self.outbuf
    }

    /// The inbound pipe is readable: read what is there, parse every
    /// complete record, dispatch them in arrival order.
    pub async fn in_ready(&mut self, ctx: &mut WorkerContext<'_>) -> Result<(), WorkerError> {
        self.inbuf.reserve(4096);
        let n = match self.stdout.as_mut() {
            Some(out) => out.read_buf(&mut self.inbuf).await.unwrap_or(0),
            None => 0,
        };
        if n == 0 {
            return Err(self.method_failure(ctx.report).await);
        }
        self.drain_codec(ctx.report)?;
        self.run_messages(ctx);
        Ok(())
    }

    /// The outbound pipe is writable: hand it as much of the buffer as it
    /// accepts. A short write just leaves the rest queued.
    pub async fn out_ready(&mut self, ctx: &mut WorkerContext<'_>) -> Result<(), WorkerError> {
        if self.outbuf.is_empty() {
            return Ok(());
        }
        let result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_buf(&mut self.outbuf).await,
            None => Ok(0),
        };
        match result {
            Ok(0) | Err(_) => Err(self.method_failure(ctx.report).await),
            Ok(_) => Ok(()),
        }
    }

    /// One multiplexing step: wait for whichever pipe is ready first and
    /// service it. The building block for event loops and tests.
    pub async fn pump(&mut self, ctx: &mut WorkerContext<'_>) -> Result<(), WorkerError> {
        if self.outbuf.is_empty() {
            return self.in_ready(ctx).await;
        }
        enum Step {
            Read(usize),
            Wrote(usize),
        }
        let step = {
            let (Some(stdout), Some(stdin)) = (self.stdout.as_mut(), self.stdin.as_mut()) else {
                return Err(self.method_failure(ctx.report).await);
            };
            self.inbuf.reserve(4096);
            tokio::select! {
                r = stdout.read_buf(&mut self.inbuf) => Step::Read(r.unwrap_or(0)),
                w = stdin.write_buf(&mut self.outbuf) => Step::Wrote(w.unwrap_or(0)),
            }
        };
        match step {
            Step::Read(0) | Step::Wrote(0) => Err(self.method_failure(ctx.report).await),
            Step::Read(_) => {
                self.drain_codec(ctx.report)?;
                self.run_messages(ctx);
                Ok(())
            }
            Step::Wrote(_) => Ok(()),
        }
    }

    /// Tear the worker down: SIGINT unless the method asked to be told by
    /// pipe-close, then collect the child exactly once.
    pub async fn shutdown(mut self) -> Option<ExitStatus> {
        if !self.caps.needs_cleanup {
            self.child.send_sigint();
        }
        drop(self.stdin.take());
        drop(self.stdout.take());
        self.child.wait().await.ok()
    }

    /// Queue a `600 URI Acquire` for the in-flight item at `index`.
    pub fn send_acquire(&mut self, index: usize, ctx: &mut WorkerContext<'_>) -> bool {
        if self.stdin.is_none() {
            return false;
        }
        let item = ctx.queue.get(index);
        let Some(&first) = item.owners.first() else {
            return false;
        };
        let owner = &ctx.owners[first];
        if owner.hooks.is_doomed() {
            return true;
        }

        let mut record = Record::new(600, "URI Acquire");
        if self.caps.send_uri_encoded {
            record.push("URI", item.uri.clone());
        } else {
            record.push("URI", uri::decode_path(&item.uri));
        }
        record.push("Filename", owner.dest_file.display().to_string());

        let scheme = uri::scheme(&item.uri).unwrap_or("");
        if scheme == "http" || scheme == "https" {
            let key = format!("Acquire::{scheme}::proxy::{}", uri::host_of(&item.uri));
            if let Some(proxy) = ctx.config.find(&key) {
                record.push("Proxy", proxy);
            }
        }

        for hash in owner.expected_hashes.iter() {
            record.push(format!("Expected-{}", hash.kind().name()), hash.value());
        }

        let custom = owner.hooks.custom_headers();
        let has_max = custom
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("Maximum-Size"));
        for (key, value) in custom {
            record.push(key, value);
        }
        if owner.expected_hashes.file_size() == 0 && !has_max {
            let maximum = owner.hooks.maximum_size();
            if maximum > 0 {
                record.push("Maximum-Size", maximum.to_string());
            }
        }

        // An existing destination must be readable and writable by the
        // sandboxed method before it is asked to resume it.
        let dest = owner.dest_file.clone();
        if real_file_exists(&dest) {
            sandbox_permissions(&dest, ctx.config, ctx.report);
        }

        self.send(&record);
        true
    }

    /// Queue the `601 Configuration` dump, when the method asked for one.
    pub fn send_configuration(&mut self, config: &Configuration) {
        if !self.caps.send_config {
            return;
        }
        let mut record = Record::new(601, "Configuration");
        if !config.exists("Acquire::Send-URI-Encoded") {
            record.push("Config-Item", "Acquire::Send-URI-Encoded=1");
        }
        for (key, value) in config.dump() {
            record.push("Config-Item", format!("{key}={value}"));
        }
        self.send(&record);
    }

    /// Answer an earlier aux request once its fetch settled.
    pub fn reply_aux(&mut self, aux_uri: &str, owner_status: ItemStatus, dest: &Path,
        ctx: &mut WorkerContext<'_>)
    {
        if self.stdin.is_none() {
            return;
        }
        let mut record = Record::new(600, "URI Acquire").with("URI", aux_uri);
        if real_file_exists(dest) && owner_status == ItemStatus::Done {
            sandbox_permissions(dest, ctx.config, ctx.report);
            record.push("Filename", dest.display().to_string());
        } else if real_file_exists(dest) {
            record.push("Filename", format!("/nonexistent{}", dest.display()));
        } else {
            record.push("Filename", dest.display().to_string());
        }
        self.send(&record);
    }

    /// Sample the on-disk size of the active transfer.
    pub fn pulse(&mut self, queue: &mut WorkerQueue, owners: &OwnerArena) {
        let Some(current) = self.current_item.as_deref() else {
            return;
        };
        let Some(index) = queue.find_index(current) else {
            return;
        };
        let Some(&first) = queue.get(index).owners.first() else {
            return;
        };
        if let Ok(meta) = std::fs::metadata(&owners[first].dest_file) {
            queue.get_mut(index).current_size = meta.len();
        }
    }

    fn send(&mut self, record: &Record) {
        if self.debug {
            debug!(" -> {}:{}", self.access, quoted(record));
        }
        record.encode_to(&mut self.outbuf);
    }

    fn drain_codec(&mut self, report: &mut ReportSink) -> Result<(), WorkerError> {
        loop {
            match self.codec.decode(&mut self.inbuf) {
                Ok(Some(record)) => self.pending.push_back(record),
                Ok(None) => return Ok(()),
                Err(RecordError::InvalidStatusLine(line)) => {
                    report.error(format!(
                        "Invalid message from method {}: {line}",
                        self.access
                    ));
                    return Err(WorkerError::Protocol {
                        access: self.access.clone(),
                        status_line: line,
                    });
                }
                Err(RecordError::Io(err)) => {
                    report.errno("read from method", &err);
                    return Ok(());
                }
            }
        }
    }

    fn run_messages(&mut self, ctx: &mut WorkerContext<'_>) {
        while let Some(record) = self.pending.pop_front() {
            self.dispatch(record, ctx);
        }
    }

    fn dispatch(&mut self, record: Record, ctx: &mut WorkerContext<'_>) {
        if self.debug {
            debug!(" <- {}:{}", self.access, quoted(&record));
        }

        let item_index = record
            .get("URI")
            .and_then(|uri| ctx.queue.find_index(uri));

        if let Some(index) = item_index {
            if let Some(mirror) = record.get("UsedMirror").filter(|m| !m.is_empty()) {
                let mirror = mirror.to_string();
                let item = ctx.queue.get_mut(index);
                for &id in &item.owners {
                    ctx.owners[id].used_mirror = mirror.clone();
                }
                if let Some(space) = item.description.find(' ') {
                    item.description.replace_range(..space, &mirror);
                }
            }
        }

        match record.code() {
            100 => self.capabilities(&record, ctx.config),
            101 => debug!(" <- (log) {}", record.get_or("Message", "")),
            102 => self.status = record.get_or("Message", "").to_string(),
            103 => self.redirect(&record, item_index, ctx),
            104 => {
                let subject = item_index
                    .and_then(|i| ctx.queue.get(i).owners.first().copied())
                    .map(|id| ctx.owners[id].desc.uri.clone())
                    .unwrap_or_else(|| self.access.clone());
                ctx.report
                    .warning(format!("{subject}: {}", record.get_or("Message", "")));
            }
            200 => self.uri_start(&record, item_index, ctx),
            201 => self.uri_done(&record, item_index, ctx),
            351 => self.aux_request(&record, item_index, ctx),
            400 => self.uri_failure(&record, item_index, ctx),
            401 => ctx.report.error(format!(
                "Method {} General failure: {}",
                self.access,
                record.get_or("Message", "")
            )),
            403 => self.media_change(&record, ctx),
            code => debug!("Unhandled message code {code} from method {}", self.access),
        }
    }

    fn capabilities(&mut self, record: &Record, config: &Configuration) {
        self.caps.update_from_capabilities(record, config);
        self.capabilities_seen = true;
        if self.debug {
            debug!(
                "Configured access method {}: Version:{} SingleInstance:{} Pipeline:{} \
                 SendConfig:{} LocalOnly:{} NeedsCleanup:{} Removable:{} AuxRequests:{} \
                 SendURIEncoded:{}",
                self.caps.access,
                self.caps.version,
                self.caps.single_instance,
                self.caps.pipeline,
                self.caps.send_config,
                self.caps.local_only,
                self.caps.needs_cleanup,
                self.caps.removable,
                self.caps.aux_requests,
                self.caps.send_uri_encoded,
            );
        }
    }

    fn redirect(&mut self, record: &Record, item_index: Option<usize>,
        ctx: &mut WorkerContext<'_>)
    {
        let Some(index) = item_index else {
            ctx.report.error("Method gave invalid 103 Redirect message");
            return;
        };

        let uri_tag = record.get_or("URI", "");
        let got_new_uri = record.get_or("New-URI", uri_tag).to_string();
        let new_uri = if self.caps.send_uri_encoded {
            got_new_uri.clone()
        } else {
            uri::encode_path(&got_new_uri)
        };
        ctx.queue.get_mut(index).uri = new_uri.clone();

        let alternates: Vec<String> = record
            .get("Alternate-URIs")
            .map(|v| v.split('\n').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();

        self.item_finished();
        let item = ctx.queue.item_done(index);
        for &id in &item.owners {
            ctx.owners[id].status = ItemStatus::Idle;
        }

        for &id in &item.owners {
            let owner = &mut ctx.owners[id];

            // Alternates arrive best-first; pushing them in reverse keeps
            // that order on the stack.
            let simple_retry = if self.caps.send_uri_encoded {
                for alt in alternates.iter().rev() {
                    owner.push_alternative_uri(alt.clone(), false);
                }
                owner.desc.uri == got_new_uri
            } else {
                for alt in alternates.iter().rev() {
                    owner.push_alternative_uri(uri::encode_path(alt), false);
                }
                uri::decode_path(&owner.desc.uri) == got_new_uri
            };

            if !simple_retry {
                let mut target = new_uri.clone();
                if !owner.is_good_alternative(&target) {
                    target = owner.pop_alternative_uri().unwrap_or_default();
                }
                if target.is_empty() || owner.is_redirection_loop(&target) {
                    let failed = record.clone().with("FailReason", "RedirectionLoop");
                    let desc = owner.desc.clone();
                    owner.failed(&failed);
                    ctx.progress.fail(&desc);
                    continue;
                }

                ctx.progress.done(&ctx.owners[id].desc);
                let owner = &mut ctx.owners[id];
                owner.apply_mirror_change(&target);
                owner.desc.uri = target;
            }

            if !ctx.owners[id].hooks.is_doomed() {
                ctx.queue.requeue(id);
            }
        }
    }

    fn uri_start(&mut self, record: &Record, item_index: Option<usize>,
        ctx: &mut WorkerContext<'_>)
    {
        let Some(index) = item_index else {
            ctx.report.error("Method gave invalid 200 URI Start message");
            return;
        };
        let item = ctx.queue.get_mut(index);
        self.current_item = Some(item.uri.clone());
        item.current_size = 0;
        item.total_size = record.get_u64("Size", 0);
        item.resume_point = record.get_u64("Resume-Point", 0);
        let total = item.total_size;
        let owners = item.owners.clone();
        for id in owners {
            let owner = &mut ctx.owners[id];
            owner.status = ItemStatus::Fetching;
            owner.hooks.on_start(total);
            ctx.progress.pulse();
            ctx.progress.fetch(&ctx.owners[id].desc);
        }
    }

    fn uri_done(&mut self, record: &Record, item_index: Option<usize>,
        ctx: &mut WorkerContext<'_>)
    {
        let Some(index) = item_index else {
            ctx.report.error("Method gave invalid 201 URI Done message");
            return;
        };

        prepare_files("201::URIDone", ctx.queue.get(index), ctx.owners, ctx.report);
        for _ in &ctx.queue.get(index).owners {
            ctx.progress.pulse();
        }

        let first = ctx.queue.get(index).owners.first().copied();
        let given_filename = record.get("Filename").map(str::to_string);
        let filename = given_filename.clone().unwrap_or_else(|| {
            first
                .map(|id| ctx.owners[id].dest_file.display().to_string())
                .unwrap_or_default()
        });

        let forced = ctx.config.find("Acquire::ForceHash").filter(|f| !f.is_empty());
        let mut received = HashList::from_record("", record);
        // Not every method reports hashes; recompute from disk when the
        // expectations are strong enough to pick algorithms from.
        if !received.usable(forced) {
            if let Some(id) = first {
                let expected = &ctx.owners[id].expected_hashes;
                if expected.usable(forced) && real_file_exists(Path::new(&filename)) {
                    match hash_file(Path::new(&filename), expected) {
                        Ok(computed) => received = computed,
                        Err(err) => ctx.report.errno(&format!("hashing {filename}"), &err),
                    }
                }
            }
        }

        // Only data that crossed the wire into this very file counts as
        // fetched bytes.
        if let Some(id) = first {
            let owner = &ctx.owners[id];
            if !owner.complete && !owner.local && given_filename.as_deref() == Some(filename.as_str()) {
                ctx.progress
                    .fetched(received.file_size(), record.get_u64("Resume-Point", 0));
            }
        }

        let item = ctx.queue.item_done(index);
        let is_ims_hit =
            record.get_bool("IMS-Hit", false) || record.get_bool("Alt-IMS-Hit", false);

        for &id in &item.owners {
            let owner = &mut ctx.owners[id];
            let expected = owner.expected_hashes.clone();

            if self.debug_auth {
                debug!("201 URI Done: {}", owner.desc.uri);
                for hash in received.iter() {
                    debug!("ReceivedHash: {}:{}", hash.kind().name(), hash.value());
                }
                for hash in expected.iter() {
                    debug!("ExpectedHash: {}:{}", hash.kind().name(), hash.value());
                }
            }

            let mut considered_okay = if (forced.is_none() && !expected.is_empty())
                || (forced.is_some() && expected.usable(forced))
            {
                if received.is_empty() {
                    // The transferred (compressed) bytes differ from what
                    // is on disk, so only the server's IMS assertion can
                    // vouch for the data.
                    is_ims_hit
                } else {
                    received.matches(&expected)
                }
            } else {
                !owner.hooks.hashes_required()
            };

            if considered_okay {
                considered_okay = owner.hooks.verify_done(record);
            } else {
                owner.status = ItemStatus::AuthError;
            }

            if considered_okay {
                if !owner.hooks.is_doomed() {
                    owner.done(record, &received);
                }
                let desc = &ctx.owners[id].desc;
                if is_ims_hit {
                    ctx.progress.ims_hit(desc);
                } else {
                    ctx.progress.done(desc);
                }
            } else {
                let desc = owner.desc.clone();
                if !owner.hooks.is_doomed() {
                    let mut failed = record.clone();
                    if record.get("FailReason").is_none() {
                        if !received.matches(&expected) {
                            failed.push("FailReason", "HashSumMismatch");
                        } else {
                            failed.push("FailReason", "WeakHashSums");
                        }
                    }
                    owner.failed(&failed);
                }
                ctx.progress.fail(&desc);
            }
        }
        self.item_finished();
    }

    fn aux_request(&mut self, record: &Record, item_index: Option<usize>,
        ctx: &mut WorkerContext<'_>)
    {
        let Some(index) = item_index else {
            ctx.report.error("Method gave invalid Aux Request message");
            return;
        };

        if !self.caps.aux_requests {
            // The method is not allowed to ask; fail the item through the
            // normal path and unblock the method with a dead-end reply.
            let synthetic = record.clone().with(
                "Message",
                "Method tried to make an Aux Request while not being allowed to do them",
            );
            let item = ctx.queue.item_done(index);
            handle_failure(
                &item.owners,
                &synthetic,
                FailureClass::default(),
                &self.caps,
                ctx,
                Instant::now(),
            );
            self.item_finished();

            let reply = Record::new(600, "URI Acquire")
                .with("URI", record.get_or("Aux-URI", ""))
                .with("Filename", "/nonexistent/auxrequest.blocked");
            self.send(&reply);
            return;
        }

        let Some(&requestor) = ctx.queue.get(index).owners.first() else {
            return;
        };
        ctx.queue.push_aux(AuxRequest {
            requestor,
            short_desc: record.get_or("Aux-ShortDesc", "").to_string(),
            description: record.get_or("Aux-Description", "").to_string(),
            uri: record.get_or("Aux-URI", "").to_string(),
            hashes: HashList::from_record("Aux-", record),
            maximum_size: record.get_u64("MaximumSize", 0),
        });
    }

    fn uri_failure(&mut self, record: &Record, item_index: Option<usize>,
        ctx: &mut WorkerContext<'_>)
    {
        let Some(index) = item_index else {
            ctx.report.error(format!(
                "Method gave invalid 400 URI Failure message: {}",
                record.get_or("Message", "")
            ));
            return;
        };

        prepare_files("400::URIFailure", ctx.queue.get(index), ctx.owners, ctx.report);
        for _ in &ctx.queue.get(index).owners {
            ctx.progress.pulse();
        }

        let item = ctx.queue.item_done(index);
        let class = classify_failure(record);
        handle_failure(&item.owners, record, class, &self.caps, ctx, Instant::now());
        self.item_finished();
    }

    fn media_change(&mut self, record: &Record, ctx: &mut WorkerContext<'_>) {
        let media = record.get_or("Media", "").to_string();
        let drive = record.get_or("Drive", "").to_string();
        if let Some(status_fd) = self.status_fd.as_mut() {
            status_fd.media_change(&media, &drive, ctx.report);
        }

        let mut reply = Record::new(603, "Media Changed");
        if !ctx.progress.media_change(&media, &drive) {
            reply.push("Failed", "true");
        }
        self.send(&reply);
    }

    /// Report how the dead child went down, then drop the pipes and all
    /// queued bytes. The enclosing loop reopens the method if it wants.
    async fn method_failure(&mut self, report: &mut ReportSink) -> WorkerError {
        report.error(format!("Method {} has died unexpectedly!", self.access));
        self.stdin = None;
        self.stdout = None;
        self.inbuf.clear();
        self.outbuf.clear();
        self.pending.clear();
        self.current_item = None;
        self.status.clear();
        if let Ok(status) = self.child.wait().await {
            report_exit(&self.access, status, report);
        }
        WorkerError::MethodDied(self.access.clone())
    }

    fn item_finished(&mut self) {
        self.current_item = None;
        self.status.clear();
    }
}

fn report_exit(access: &str, status: ExitStatus, report: &mut ReportSink) {
    if let Some(signal) = status.signal() {
        report.error(format!(
            "Sub-process {access} terminated by signal {signal}"
        ));
    } else if let Some(code) = status.code().filter(|&c| c != 0) {
        report.error(format!(
            "Sub-process {access} returned an error code ({code})"
        ));
    }
}

fn quoted(record: &Record) -> String {
    String::from_utf8_lossy(&record.to_bytes())
        .trim_end_matches('\n')
        .replace('\n', "\\n")
}
