//! Locating and running fetch-method binaries.
//!
//! A method is an external helper implementing one URL scheme. The
//! resolver honours the per-scheme override (which can redirect to a
//! different binary or disable the scheme outright) and falls back to the
//! methods directory. The spawned child talks the record protocol on its
//! stdin/stdout; argv[0] carries the *calling* path so a redirected
//! binary still knows which scheme it was started as.

use acquire_common::config::{Configuration, MethodOverride};
use acquire_common::message::Record;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::{Child, ChildStdin, ChildStdout};
use tracing::debug;

/// Schemes whose methods were removed from the default install.
const LEGACY_SCHEMES: [&str; 3] = ["ftp", "rsh", "ssh"];

/// Errors that keep a worker from starting at all.
#[derive(Debug, Error)]
pub enum StartError {
    #[error(
        "The method '{0}' is unsupported and disabled by default. Consider switching to http(s). \
         Set Dir::Bin::Methods::{0} to \"{0}\" to enable it again."
    )]
    UnsupportedScheme(String),

    #[error("The method '{access}' is explicitly disabled via configuration.{hint}")]
    Disabled { access: String, hint: String },

    #[error("The method driver {} could not be found. Is the package {package} installed?", path.display())]
    DriverNotFound { path: PathBuf, package: String },

    #[error("Failed to start method {}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Method {0} did not start correctly")]
    Handshake(String),
}

/// Capabilities negotiated with a running method.
///
/// Populated once from the `100 Capabilities` greeting and read-only
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodConfig {
    pub access: String,
    pub version: String,
    /// Only one instance of this method may run at a time.
    pub single_instance: bool,
    /// The method accepts multiple outstanding `600 URI Acquire` records.
    pub pipeline: bool,
    /// The method wants a `601 Configuration` dump after startup.
    pub send_config: bool,
    /// The method serves local data; network retry policy does not apply.
    pub local_only: bool,
    /// Closing our outbound pipe is the agreed termination signal.
    pub needs_cleanup: bool,
    /// The method serves removable media.
    pub removable: bool,
    /// The method may issue `351 Aux Request` records.
    pub aux_requests: bool,
    /// The method understands percent-encoded URIs.
    pub send_uri_encoded: bool,
}

impl MethodConfig {
    pub fn new(access: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            version: String::new(),
            single_instance: false,
            pipeline: false,
            send_config: false,
            local_only: false,
            needs_cleanup: false,
            removable: false,
            aux_requests: false,
            send_uri_encoded: false,
        }
    }

    /// Fill in the advertised capabilities.
    ///
    /// Encoded-URI support is only honoured while the engine-wide
    /// `Acquire::Send-URI-Encoded` switch allows it.
    pub fn update_from_capabilities(&mut self, record: &Record, config: &Configuration) {
        self.version = record.get_or("Version", "").to_string();
        self.single_instance = record.get_bool("Single-Instance", false);
        self.pipeline = record.get_bool("Pipeline", false);
        self.send_config = record.get_bool("Send-Config", false);
        self.local_only = record.get_bool("Local-Only", false);
        self.needs_cleanup = record.get_bool("Needs-Cleanup", false);
        self.removable = record.get_bool("Removable", false);
        self.aux_requests = record.get_bool("AuxRequests", false);
        if config.find_bool("Acquire::Send-URI-Encoded", true) {
            self.send_uri_encoded = record.get_bool("Send-URI-Encoded", false);
        }
    }
}

/// Outcome of the two-level binary lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMethod {
    /// The binary to execute.
    pub method: PathBuf,
    /// The path the method believes it was called as (argv[0]); differs
    /// from `method` when an override redirects the scheme.
    pub calling: PathBuf,
}

/// Resolve the binary implementing `access`.
pub fn resolve_method(config: &Configuration, access: &str) -> Result<ResolvedMethod, StartError> {
    let method = match config.method_override(access) {
        MethodOverride::Path(path) => path,
        MethodOverride::Disabled => {
            let hint = if access == "http" || access == "https" {
                format!(
                    " If you meant to use Tor remember to use tor+{access} instead of {access}."
                )
            } else {
                String::new()
            };
            return Err(StartError::Disabled {
                access: access.to_string(),
                hint,
            });
        }
        MethodOverride::Unset => {
            if LEGACY_SCHEMES.contains(&access) {
                return Err(StartError::UnsupportedScheme(access.to_string()));
            }
            config.method_default_path(access)
        }
    };

    if !method.exists() {
        let transport = access.split('+').next().unwrap_or(access);
        return Err(StartError::DriverNotFound {
            path: method,
            package: format!("apt-transport-{transport}"),
        });
    }

    Ok(ResolvedMethod {
        calling: config.method_default_path(access),
        method,
    })
}

/// A running method child plus its access name.
#[derive(Debug)]
pub struct MethodHandle {
    child: Child,
    access: String,
}

impl MethodHandle {
    /// Spawn the resolved binary with piped stdin/stdout.
    pub fn spawn(
        resolved: &ResolvedMethod,
        access: &str,
    ) -> Result<(Self, ChildStdin, ChildStdout), StartError> {
        if resolved.calling != resolved.method {
            debug!(
                "Starting method '{}' ( via {} )",
                resolved.calling.display(),
                resolved.method.display()
            );
        } else {
            debug!("Starting method '{}'", resolved.calling.display());
        }

        let mut cmd = std::process::Command::new(&resolved.method);
        cmd.arg0(&resolved.calling)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut cmd = tokio::process::Command::from(cmd);
        // Backstop for workers dropped without an orderly shutdown.
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| StartError::Spawn {
            path: resolved.method.clone(),
            source,
        })?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        Ok((
            Self {
                child,
                access: access.to_string(),
            },
            stdin,
            stdout,
        ))
    }

    pub fn access(&self) -> &str {
        &self.access
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Deliver SIGINT; errors are uninteresting (the child may already be
    /// gone).
    pub fn send_sigint(&self) {
        if let Some(pid) = self.child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGINT);
        }
    }

    /// Collect the child, once.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }
}
