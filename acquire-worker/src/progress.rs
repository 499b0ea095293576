//! Progress reporting surface.
//!
//! The worker never talks to a terminal itself; it emits events through
//! this trait and the enclosing application renders them. A recording
//! implementation ships here because integration tests and embedders both
//! want to observe the exact event stream.

use acquire_common::config::Configuration;
use acquire_common::report::ReportSink;
use std::os::fd::{BorrowedFd, RawFd};

use crate::item::ItemDesc;

/// Sink for per-item display events.
///
/// `media_change` returns whether the user satisfied the prompt; the
/// default refuses, which makes the worker answer the method with
/// `Failed: true`.
pub trait Progress {
    fn fetch(&mut self, desc: &ItemDesc) {
        let _ = desc;
    }

    fn done(&mut self, desc: &ItemDesc) {
        let _ = desc;
    }

    fn fail(&mut self, desc: &ItemDesc) {
        let _ = desc;
    }

    fn ims_hit(&mut self, desc: &ItemDesc) {
        let _ = desc;
    }

    /// Periodic tick while a transfer is active.
    fn pulse(&mut self) {}

    /// Bytes actually transferred for a finished item, minus the resume
    /// offset.
    fn fetched(&mut self, bytes: u64, resume_point: u64) {
        let _ = (bytes, resume_point);
    }

    fn media_change(&mut self, media: &str, drive: &str) -> bool {
        let _ = (media, drive);
        false
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullProgress;

impl Progress for NullProgress {}

/// Everything the worker reported, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Fetch(String),
    Done(String),
    Fail(String),
    ImsHit(String),
    Fetched { bytes: u64, resume_point: u64 },
    MediaChange { media: String, drive: String },
}

/// Progress sink that remembers events for later assertions.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub events: Vec<ProgressEvent>,
    /// Answer to give when a media change is requested.
    pub accept_media_change: bool,
}

impl Progress for RecordingProgress {
    fn fetch(&mut self, desc: &ItemDesc) {
        self.events.push(ProgressEvent::Fetch(desc.uri.clone()));
    }

    fn done(&mut self, desc: &ItemDesc) {
        self.events.push(ProgressEvent::Done(desc.uri.clone()));
    }

    fn fail(&mut self, desc: &ItemDesc) {
        self.events.push(ProgressEvent::Fail(desc.uri.clone()));
    }

    fn ims_hit(&mut self, desc: &ItemDesc) {
        self.events.push(ProgressEvent::ImsHit(desc.uri.clone()));
    }

    fn fetched(&mut self, bytes: u64, resume_point: u64) {
        self.events.push(ProgressEvent::Fetched {
            bytes,
            resume_point,
        });
    }

    fn media_change(&mut self, media: &str, drive: &str) -> bool {
        self.events.push(ProgressEvent::MediaChange {
            media: media.to_string(),
            drive: drive.to_string(),
        });
        self.accept_media_change
    }
}

/// Writer for the machine-readable status descriptor.
///
/// Front-ends that drive the engine pass the descriptor number in
/// `APT::Status-Fd`; media-change prompts are mirrored there as one
/// `media-change:<media>:<drive>:<prompt>` line.
#[derive(Debug)]
pub struct StatusFd {
    fd: RawFd,
}

impl StatusFd {
    /// Build from `APT::Status-Fd`, if configured to a positive number.
    pub fn from_config(config: &Configuration) -> Option<Self> {
        let fd = config.find_i64("APT::Status-Fd", -1);
        (fd > 0).then(|| Self { fd: fd as RawFd })
    }

    #[cfg(test)]
    pub fn from_raw(fd: RawFd) -> Self {
        Self { fd }
    }

    /// Emit the media-change status line.
    pub fn media_change(&mut self, media: &str, drive: &str, report: &mut ReportSink) {
        let prompt = format!(
            "Please insert the disc labeled: '{media}' in the drive '{drive}' and press [Enter]."
        );
        let line = format!("media-change:{media}:{drive}:{prompt}\n");
        if let Err(err) = self.write_all(line.as_bytes()) {
            report.errno("write to status fd", &err);
        }
    }

    // The descriptor is owned by the embedding front-end; borrow it per
    // write instead of adopting it.
    #[allow(unsafe_code)]
    fn write_all(&self, mut buf: &[u8]) -> std::io::Result<()> {
        let fd = unsafe { BorrowedFd::borrow_raw(self.fd) };
        while !buf.is_empty() {
            match nix::unistd::write(fd, buf) {
                Ok(0) => return Err(std::io::ErrorKind::WriteZero.into()),
                Ok(n) => buf = &buf[n..],
                Err(nix::errno::Errno::EINTR) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::fd::AsRawFd;

    #[test]
    fn recording_progress_keeps_event_order() {
        let mut progress = RecordingProgress::default();
        let desc = ItemDesc::new("http://a/x", "http://a x", "x");
        progress.fetch(&desc);
        progress.fetched(10, 0);
        progress.done(&desc);
        assert_eq!(
            progress.events,
            vec![
                ProgressEvent::Fetch("http://a/x".into()),
                ProgressEvent::Fetched {
                    bytes: 10,
                    resume_point: 0
                },
                ProgressEvent::Done("http://a/x".into()),
            ]
        );
    }

    #[test]
    fn status_fd_writes_media_change_line() {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let mut status = StatusFd::from_raw(write_end.as_raw_fd());
        let mut report = ReportSink::new();
        status.media_change("Disc 1", "/dev/sr0", &mut report);
        drop(write_end);

        let mut out = String::new();
        std::fs::File::from(read_end).read_to_string(&mut out).unwrap();
        assert!(out.starts_with("media-change:Disc 1:/dev/sr0:"));
        assert!(out.ends_with("[Enter].\n"));
        assert!(report.is_empty());
    }
}
