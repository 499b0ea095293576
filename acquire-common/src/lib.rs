//! Acquire engine - common library
//!
//! Shared protocol, hashing and configuration types used by the worker
//! and by embedders of the acquire engine.

#![deny(unsafe_code)]

pub mod config;
pub mod hashes;
pub mod logging;
pub mod message;
pub mod report;
pub mod uri;

pub use config::{Configuration, MethodOverride};
pub use hashes::{HashItem, HashKind, HashList, MultiHasher, hash_file};
pub use logging::{LogFormat, init_logging};
pub use message::{Record, RecordCodec, RecordError, parse_bool};
pub use report::{Diagnostic, ReportSink, Severity};
