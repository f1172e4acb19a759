//! # host-hooks
//!
//! Small, optional integrations with the macOS desktop that a long batch
//! conversion benefits from:
//!
//! - [`Caffeinate`] keeps the machine from idle-sleeping while a run is in
//!   progress. The returned [`SleepGuard`] releases the assertion when dropped,
//!   and `caffeinate -w <pid>` also releases it if this process dies.
//! - [`FinderTagger`] colours finished output files in Finder so progress is
//!   visible at a glance. A hung `osascript` is killed after a timeout.
//!
//! Both are traits with no-op implementations ([`NoSleepInhibitor`],
//! [`NoopTagger`]) for other platforms and for tests. Nothing here is ever
//! fatal to a run: callers log a [`HostError`] and carry on.
//!
//! ```rust,no_run
//! use host_hooks::{Caffeinate, SleepInhibitor};
//!
//! let guard = Caffeinate::default().inhibit();
//! // ... long-running work ...
//! drop(guard); // machine may sleep again
//! ```

use async_trait::async_trait;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum HostError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} did not finish within {secs}s")]
    TimedOut { program: String, secs: u64 },

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(String),
}

// ── Sleep inhibition ─────────────────────────────────────────────────────────

/// Holds a sleep-inhibiting child process alive. Dropping it ends the child.
#[derive(Debug)]
pub struct SleepGuard {
    child: Option<Child>,
}

impl SleepGuard {
    /// A guard that holds nothing.
    pub fn inactive() -> Self {
        Self { child: None }
    }

    /// Spawn `cmd` and hold it until the guard is dropped.
    pub fn spawn(mut cmd: Command) -> Result<Self, HostError> {
        let program = cmd.get_program().to_string_lossy().into_owned();
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| HostError::Spawn { program, source })?;
        debug!("Sleep inhibitor running as pid {}", child.id());
        Ok(Self { child: Some(child) })
    }

    pub fn is_active(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for SleepGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("Sleep inhibitor released");
        }
    }
}

/// Something that can keep the machine awake for the lifetime of a guard.
pub trait SleepInhibitor: Send + Sync {
    fn inhibit(&self) -> SleepGuard;
}

/// macOS `caffeinate -i -w <pid>`.
///
/// Spawn failures are logged and produce an inactive guard: a run on a
/// machine without `caffeinate` still proceeds.
#[derive(Debug, Clone)]
pub struct Caffeinate {
    program: String,
}

impl Default for Caffeinate {
    fn default() -> Self {
        Self {
            program: "caffeinate".to_string(),
        }
    }
}

impl Caffeinate {
    /// Arguments passed to `caffeinate`, tied to this process's lifetime.
    pub fn args(&self) -> Vec<String> {
        vec!["-i".into(), "-w".into(), std::process::id().to_string()]
    }
}

impl SleepInhibitor for Caffeinate {
    fn inhibit(&self) -> SleepGuard {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args());
        match SleepGuard::spawn(cmd) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("Sleep prevention unavailable: {}", e);
                SleepGuard::inactive()
            }
        }
    }
}

pub struct NoSleepInhibitor;

impl SleepInhibitor for NoSleepInhibitor {
    fn inhibit(&self) -> SleepGuard {
        SleepGuard::inactive()
    }
}

// ── Finder tags ──────────────────────────────────────────────────────────────

/// Marks a finished output file.
#[async_trait]
pub trait FileTagger: Send + Sync {
    async fn tag(&self, path: &Path) -> Result<(), HostError>;
}

/// Finder colour label, by AppleScript `label index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderLabel {
    Orange = 1,
    Red = 2,
    Yellow = 3,
    Blue = 4,
    Purple = 5,
    Green = 6,
    Gray = 7,
}

/// Sets a Finder label through `osascript`. Defaults to green.
#[derive(Debug, Clone)]
pub struct FinderTagger {
    label: FinderLabel,
    timeout: Duration,
}

impl Default for FinderTagger {
    fn default() -> Self {
        Self::new(FinderLabel::Green)
    }
}

impl FinderTagger {
    pub fn new(label: FinderLabel) -> Self {
        Self {
            label,
            timeout: Duration::from_secs(10),
        }
    }

    /// How long `osascript` may run before it is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The AppleScript that labels `path`.
    pub fn script(&self, path: &Path) -> Result<String, HostError> {
        let raw = path
            .to_str()
            .ok_or_else(|| HostError::NonUtf8Path(path.display().to_string()))?;
        let quoted = raw.replace('\\', "\\\\").replace('"', "\\\"");
        Ok(format!(
            "tell application \"Finder\" to set label index of (POSIX file \"{}\" as alias) to {}",
            quoted, self.label as u8
        ))
    }
}

#[async_trait]
impl FileTagger for FinderTagger {
    async fn tag(&self, path: &Path) -> Result<(), HostError> {
        let script = self.script(path)?;
        run_bounded("osascript", &["-e", &script], self.timeout).await
    }
}

/// Run `program` to completion, killing it if it outlives `timeout`.
async fn run_bounded(program: &str, args: &[&str], timeout: Duration) -> Result<(), HostError> {
    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| HostError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| HostError::Spawn {
            program: program.to_string(),
            source,
        })?,
        Err(_) => {
            return Err(HostError::TimedOut {
                program: program.to_string(),
                secs: timeout.as_secs(),
            })
        }
    };

    if output.status.success() {
        Ok(())
    } else {
        Err(HostError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

pub struct NoopTagger;

#[async_trait]
impl FileTagger for NoopTagger {
    async fn tag(&self, _path: &Path) -> Result<(), HostError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_quotes_path() {
        let t = FinderTagger::default();
        let s = t.script(Path::new("/Users/me/My \"Paper\".md")).unwrap();
        assert_eq!(
            s,
            r#"tell application "Finder" to set label index of (POSIX file "/Users/me/My \"Paper\".md" as alias) to 6"#
        );
    }

    #[test]
    fn label_index_follows_colour() {
        let t = FinderTagger::new(FinderLabel::Blue);
        assert!(t.script(Path::new("/a.md")).unwrap().ends_with("to 4"));
    }

    #[test]
    fn caffeinate_waits_on_this_process() {
        let args = Caffeinate::default().args();
        assert_eq!(args[..2], ["-i".to_string(), "-w".to_string()]);
        assert_eq!(args[2], std::process::id().to_string());
    }

    #[tokio::test]
    async fn noop_hooks_do_nothing() {
        assert!(!NoSleepInhibitor.inhibit().is_active());
        assert!(NoopTagger.tag(Path::new("/nowhere")).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_helper_is_killed_at_timeout() {
        let started = std::time::Instant::now();
        let err = run_bounded("sleep", &["30"], Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::TimedOut { ref program, .. } if program == "sleep"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn helper_failure_reports_status() {
        let err = run_bounded("false", &[], Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Failed { .. }));
    }

    #[test]
    fn missing_program_yields_inactive_guard() {
        let c = Caffeinate {
            program: "definitely-not-caffeinate-9137".into(),
        };
        assert!(!c.inhibit().is_active());
    }

    #[cfg(unix)]
    #[test]
    fn guard_ends_child_on_drop() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let guard = SleepGuard::spawn(cmd).unwrap();
        assert!(guard.is_active());
        let started = std::time::Instant::now();
        drop(guard);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
