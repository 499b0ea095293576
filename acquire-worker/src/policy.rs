//! Failure classification and retry policy.
//!
//! A failed URI is sorted into one of three classes. Transient network
//! errors earn exponentially backed-off retries while the owner still has
//! budget; authentication errors blacklist the current site and move on
//! to the next alternate; anything left settles the owner with a terminal
//! status.

use acquire_common::message::Record;
use acquire_common::uri;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::item::{ItemStatus, OwnerId};
use crate::method::MethodConfig;
use crate::worker::WorkerContext;

const TRANSIENT_REASONS: [&str; 5] = [
    "Timeout",
    "ConnectionRefused",
    "ConnectionTimedOut",
    "ResolveFailure",
    "TmpResolveFailure",
];

const AUTH_REASONS: [&str; 3] = ["HashSumMismatch", "WeakHashSums", "MaximumSizeExceeded"];

/// How a `400 URI Failure` should be treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureClass {
    pub transient: bool,
    pub auth: bool,
}

/// Classify a failure record from its `Transient-Failure` flag and
/// `FailReason` tag.
pub fn classify_failure(record: &Record) -> FailureClass {
    if record.get_bool("Transient-Failure", false) {
        return FailureClass {
            transient: true,
            auth: false,
        };
    }
    let reason = record.get_or("FailReason", "");
    let transient = TRANSIENT_REASONS.contains(&reason);
    FailureClass {
        transient,
        auth: !transient && AUTH_REASONS.contains(&reason),
    }
}

/// Back-off before the next retry, given the retries an owner has left
/// *after* the decrement: `min(2^attempt, maximum)` seconds.
pub fn retry_backoff(
    config: &acquire_common::config::Configuration,
    retries_left: u32,
) -> Duration {
    let total = config.find_i64("Acquire::Retries", 3);
    let attempt = (total - i64::from(retries_left) - 1).clamp(0, 30) as u32;
    let maximum = config.find_i64("Acquire::Retries::Delay::Maximum", 30).max(0) as u64;
    Duration::from_secs((1u64 << attempt).min(maximum))
}

/// Settle every owner of a failed item.
pub fn handle_failure(
    owner_ids: &[OwnerId],
    record: &Record,
    class: FailureClass,
    caps: &MethodConfig,
    ctx: &mut WorkerContext<'_>,
    now: Instant,
) {
    for &id in owner_ids {
        let owner = &mut ctx.owners[id];

        if class.transient && !caps.local_only && owner.retries > 0 {
            owner.retries -= 1;
            owner.fail_message = record.get_or("Message", "").to_string();
            owner.fail_reason = record.get_or("FailReason", "").to_string();
            if ctx.config.find_bool("Acquire::Retries::Delay", true) {
                let delay = retry_backoff(ctx.config, owner.retries);
                if ctx.config.find_bool("Debug::Acquire::Retries", false) {
                    debug!(
                        "Delaying {} by {} seconds",
                        owner.desc.description,
                        delay.as_secs()
                    );
                }
                owner.fetch_after = Some(now + delay);
            } else {
                owner.fetch_after = Some(now);
            }
            let desc = owner.desc.clone();
            let doomed = owner.hooks.is_doomed();
            if !doomed {
                owner.status = ItemStatus::Idle;
            }
            ctx.progress.fail(&desc);
            if !doomed {
                ctx.queue.requeue(id);
            }
            continue;
        }

        if class.auth {
            let site = uri::site_only(&owner.desc.uri);
            owner.remove_alternative_site(&site);
        }

        if let Some(new_uri) = owner.pop_alternative_uri() {
            owner.fail_message = record.get_or("Message", "").to_string();
            owner.fail_reason = record.get_or("FailReason", "").to_string();
            ctx.progress.fail(&ctx.owners[id].desc);
            let owner = &mut ctx.owners[id];
            owner.apply_mirror_change(&new_uri);
            owner.desc.uri = new_uri;
            if !owner.hooks.is_doomed() {
                owner.status = ItemStatus::Idle;
                ctx.queue.requeue(id);
            }
        } else {
            if class.auth && !owner.expected_hashes.is_empty() {
                owner.status = ItemStatus::AuthError;
            } else if class.transient {
                owner.status = ItemStatus::TransientNetworkError;
            }
            let desc = owner.desc.clone();
            if !owner.hooks.is_doomed() {
                owner.failed(record);
            }
            ctx.progress.fail(&desc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{ItemDesc, Owner, OwnerArena};
    use crate::progress::{NullProgress, ProgressEvent, RecordingProgress};
    use crate::queue::WorkerQueue;
    use acquire_common::config::Configuration;
    use acquire_common::hashes::{HashItem, HashKind, HashList};
    use acquire_common::report::ReportSink;
    use std::path::PathBuf;

    fn transient_record() -> Record {
        Record::new(400, "URI Failure")
            .with("URI", "http://a/x")
            .with("Message", "connect timed out")
            .with("FailReason", "Timeout")
    }

    fn auth_record() -> Record {
        Record::new(400, "URI Failure")
            .with("URI", "http://a/x")
            .with("Message", "hash mismatch")
            .with("FailReason", "HashSumMismatch")
    }

    fn sha256_list() -> HashList {
        [HashItem::new(HashKind::Sha256, "aa")].into_iter().collect()
    }

    fn owner(uri: &str, hashes: HashList) -> Owner {
        Owner::new(
            ItemDesc::new(uri, format!("{} x", uri::site_only(uri)), "x"),
            PathBuf::from("/tmp/x"),
            hashes,
            3,
        )
    }

    #[test]
    fn classification_table() {
        assert_eq!(
            classify_failure(&transient_record()),
            FailureClass {
                transient: true,
                auth: false
            }
        );
        assert_eq!(
            classify_failure(&auth_record()),
            FailureClass {
                transient: false,
                auth: true
            }
        );
        let transient_flag =
            Record::new(400, "URI Failure").with("Transient-Failure", "true");
        assert!(classify_failure(&transient_flag).transient);
        let other = Record::new(400, "URI Failure").with("FailReason", "SomethingElse");
        assert_eq!(classify_failure(&other), FailureClass::default());
    }

    #[test]
    fn backoff_ladder_and_saturation() {
        let mut config = Configuration::new();
        config.set("Acquire::Retries", "3");
        config.set("Acquire::Retries::Delay::Maximum", "30");
        assert_eq!(retry_backoff(&config, 2), Duration::from_secs(1));
        assert_eq!(retry_backoff(&config, 1), Duration::from_secs(2));
        assert_eq!(retry_backoff(&config, 0), Duration::from_secs(4));

        config.set("Acquire::Retries::Delay::Maximum", "3");
        assert_eq!(retry_backoff(&config, 0), Duration::from_secs(3));
    }

    #[test]
    fn transient_failures_requeue_with_backoff() {
        let mut config = Configuration::new();
        config.set("Acquire::Retries", "2");
        let mut queue = WorkerQueue::new();
        let mut arena = OwnerArena::new();
        let mut o = owner("http://a/x", HashList::new());
        o.retries = 2;
        let id = arena.add(o);
        let mut progress = NullProgress;
        let mut report = ReportSink::new();
        let caps = MethodConfig::new("http");
        let now = Instant::now();

        for expected_delay in [1u64, 2] {
            let mut ctx = WorkerContext {
                config: &config,
                queue: &mut queue,
                owners: &mut arena,
                progress: &mut progress,
                report: &mut report,
            };
            handle_failure(&[id], &transient_record(), classify_failure(&transient_record()),
                &caps, &mut ctx, now);
            assert_eq!(
                arena[id].fetch_after,
                Some(now + Duration::from_secs(expected_delay))
            );
            assert_eq!(queue.take_requeued(), vec![id]);
            assert_eq!(arena[id].status, ItemStatus::Idle);
        }

        // Budget exhausted: the third failure settles the owner.
        let mut ctx = WorkerContext {
            config: &config,
            queue: &mut queue,
            owners: &mut arena,
            progress: &mut progress,
            report: &mut report,
        };
        handle_failure(&[id], &transient_record(), classify_failure(&transient_record()),
            &caps, &mut ctx, now);
        assert!(queue.take_requeued().is_empty());
        assert_eq!(arena[id].status, ItemStatus::TransientNetworkError);
        assert_eq!(arena[id].retries, 0);
    }

    #[test]
    fn local_only_methods_never_retry() {
        let config = Configuration::new();
        let mut queue = WorkerQueue::new();
        let mut arena = OwnerArena::new();
        let id = arena.add(owner("file:/x", HashList::new()));
        let mut progress = NullProgress;
        let mut report = ReportSink::new();
        let mut caps = MethodConfig::new("file");
        caps.local_only = true;

        let mut ctx = WorkerContext {
            config: &config,
            queue: &mut queue,
            owners: &mut arena,
            progress: &mut progress,
            report: &mut report,
        };
        handle_failure(&[id], &transient_record(), classify_failure(&transient_record()),
            &caps, &mut ctx, Instant::now());
        assert!(queue.take_requeued().is_empty());
        assert_eq!(arena[id].retries, 3);
        assert_eq!(arena[id].status, ItemStatus::TransientNetworkError);
    }

    #[test]
    fn auth_failure_blacklists_site_then_pops_alternate() {
        let config = Configuration::new();
        let mut queue = WorkerQueue::new();
        let mut arena = OwnerArena::new();
        let mut o = owner("http://a/pool/x.deb", sha256_list());
        o.desc.description = "http://a pool/x.deb".into();
        // The current site also appears as an alternate; it must be
        // skipped after the blacklist.
        o.push_alternative_uri("http://a/pool/x.deb".into(), true);
        o.push_alternative_uri("http://b/pool/x.deb".into(), true);
        let id = arena.add(o);
        let mut progress = RecordingProgress::default();
        let mut report = ReportSink::new();
        let caps = MethodConfig::new("http");

        let mut ctx = WorkerContext {
            config: &config,
            queue: &mut queue,
            owners: &mut arena,
            progress: &mut progress,
            report: &mut report,
        };
        handle_failure(&[id], &auth_record(), classify_failure(&auth_record()),
            &caps, &mut ctx, Instant::now());

        assert_eq!(arena[id].desc.uri, "http://b/pool/x.deb");
        assert_eq!(arena[id].desc.description, "http://b pool/x.deb");
        assert_eq!(arena[id].used_mirror, "http://b");
        assert_eq!(queue.take_requeued(), vec![id]);
        assert!(matches!(progress.events[0], ProgressEvent::Fail(_)));
    }

    #[test]
    fn auth_failure_without_alternates_is_sticky() {
        let config = Configuration::new();
        let mut queue = WorkerQueue::new();
        let mut arena = OwnerArena::new();
        let id = arena.add(owner("http://a/x", sha256_list()));
        let mut progress = NullProgress;
        let mut report = ReportSink::new();
        let caps = MethodConfig::new("http");

        let mut ctx = WorkerContext {
            config: &config,
            queue: &mut queue,
            owners: &mut arena,
            progress: &mut progress,
            report: &mut report,
        };
        handle_failure(&[id], &auth_record(), classify_failure(&auth_record()),
            &caps, &mut ctx, Instant::now());
        assert_eq!(arena[id].status, ItemStatus::AuthError);
        assert_eq!(arena[id].fail_reason, "HashSumMismatch");
    }

    #[test]
    fn other_failures_settle_as_generic_error() {
        let config = Configuration::new();
        let mut queue = WorkerQueue::new();
        let mut arena = OwnerArena::new();
        let id = arena.add(owner("http://a/x", HashList::new()));
        let mut progress = NullProgress;
        let mut report = ReportSink::new();
        let caps = MethodConfig::new("http");

        let record = Record::new(400, "URI Failure")
            .with("URI", "http://a/x")
            .with("Message", "404 Not Found");
        let mut ctx = WorkerContext {
            config: &config,
            queue: &mut queue,
            owners: &mut arena,
            progress: &mut progress,
            report: &mut report,
        };
        handle_failure(&[id], &record, classify_failure(&record), &caps, &mut ctx,
            Instant::now());
        assert_eq!(arena[id].status, ItemStatus::Error);
        assert_eq!(arena[id].fail_message, "404 Not Found");
    }
}
