//! Scripted fake fetch method for integration tests.
//!
//! Speaks the real record protocol on stdin/stdout but takes its answers
//! from a JSON script found next to the path it was called as
//! (`<argv0>.script.json`). Every record it receives is appended to
//! `<argv0>.log` so tests can assert on the exact bytes the worker sent.
//!
//! Behaviour mirrors a production method where it matters for lifecycle
//! tests: no signal handlers are installed (SIGINT kills it), and EOF on
//! stdin makes it exit cleanly, which is the `Needs-Cleanup` contract.

use acquire_common::message::{Record, RecordCodec};
use anyhow::{Context, Result};
use bytes::BytesMut;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::Decoder;

#[derive(Debug, Deserialize)]
struct Script {
    /// Tags for the `100 Capabilities` greeting.
    #[serde(default)]
    capabilities: Vec<(String, String)>,
    /// One entry consumed per `600 URI Acquire`, in order.
    #[serde(default)]
    responses: Vec<Response>,
    /// Greet with garbage instead of capabilities.
    #[serde(default)]
    garbage_greeting: bool,
}

#[derive(Debug, Deserialize)]
struct Response {
    records: Vec<ScriptRecord>,
    /// Exit abruptly after answering, simulating a method crash.
    #[serde(default)]
    die: bool,
}

#[derive(Debug, Deserialize)]
struct ScriptRecord {
    code: u16,
    reason: String,
    #[serde(default)]
    fields: Vec<(String, String)>,
}

impl ScriptRecord {
    /// Build the wire record, substituting `${URI}` with the URI of the
    /// request being answered.
    fn to_record(&self, uri: &str) -> Record {
        let mut record = Record::new(self.code, self.reason.clone());
        for (key, value) in &self.fields {
            record.push(key.clone(), value.replace("${URI}", uri));
        }
        record
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    acquire_common::init_logging("warn")?;
    let calling = std::env::args().next().context("missing argv[0]")?;
    let script_path = format!("{calling}.script.json");
    let script: Script = serde_json::from_slice(
        &std::fs::read(&script_path).with_context(|| format!("reading {script_path}"))?,
    )
    .with_context(|| format!("parsing {script_path}"))?;
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(format!("{calling}.log"))?;

    let mut stdout = tokio::io::stdout();
    if script.garbage_greeting {
        stdout.write_all(b"this is not a protocol record\n\n").await?;
    } else {
        let mut greeting = Record::new(100, "Capabilities");
        for (key, value) in &script.capabilities {
            greeting.push(key.clone(), value.clone());
        }
        stdout.write_all(&greeting.to_bytes()).await?;
    }
    stdout.flush().await?;

    let mut responses: VecDeque<Response> = script.responses.into();
    let mut stdin = tokio::io::stdin();
    let mut codec = RecordCodec::new();
    let mut buf = BytesMut::new();

    loop {
        buf.reserve(4096);
        let n = stdin.read_buf(&mut buf).await?;
        if n == 0 {
            // Outbound pipe closed: the agreed signal to finish up.
            return Ok(());
        }
        while let Some(record) = codec.decode(&mut buf)? {
            log.write_all(&record.to_bytes())?;
            log.flush()?;
            if record.code() != 600 {
                continue;
            }
            let uri = record.get_or("URI", "").to_string();
            let Some(response) = responses.pop_front() else {
                continue;
            };
            for scripted in &response.records {
                stdout.write_all(&scripted.to_record(&uri).to_bytes()).await?;
            }
            stdout.flush().await?;
            if response.die {
                std::process::exit(1);
            }
        }
    }
}
