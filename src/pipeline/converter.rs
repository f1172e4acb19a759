//! External converter adapters.
//!
//! A [`Converter`] turns one input file into one output file. The runners
//! never see a subprocess directly; they only call `convert` and, when the
//! tool seems stuck, `restart`. Tests substitute fakes that fail on demand.
//!
//! [`CommandConverter`] is the subprocess-backed implementation. The two
//! production instances differ only in command shape, timeout and restart
//! command:
//!
//! | Stage | Program | Timeout | Restart |
//! |-------|---------|---------|---------|
//! | PDF → Word | `osascript <script> <in> <out>` | 180 s | quit the application, settle 5 s |
//! | Word → Markdown | `pandoc <in> -f docx -t markdown -o <out> --wrap=none` | 60 s | none |
//!
//! Every failure comes back as a [`ConvertError`]. Nothing escapes as a
//! panic or fatal error.

use crate::error::ConvertError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One stage's conversion capability.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Short tool name for logs.
    fn name(&self) -> &str;

    /// Convert `input` into `output`.
    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError>;

    /// Reset the underlying tool after repeated failures or periodic wear.
    ///
    /// Stateless converters keep the default no-op.
    async fn restart(&self) -> Result<(), ConvertError> {
        Ok(())
    }
}

/// Placeholder in argument templates replaced by the input path.
pub const INPUT: &str = "{input}";
/// Placeholder in argument templates replaced by the output path.
pub const OUTPUT: &str = "{output}";

/// A command run to reset the tool, followed by a settle delay.
#[derive(Debug, Clone)]
pub struct RestartCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub settle: Duration,
}

/// A converter backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    install_hint: String,
    restart: Option<RestartCommand>,
}

impl CommandConverter {
    /// `args` may contain [`INPUT`] and [`OUTPUT`] placeholders.
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        let program = program.into();
        Self {
            install_hint: format!("Make sure '{program}' is installed and on PATH."),
            program,
            args,
            timeout,
            restart: None,
        }
    }

    pub fn install_hint(mut self, hint: impl Into<String>) -> Self {
        self.install_hint = hint.into();
        self
    }

    pub fn restart_with(mut self, restart: RestartCommand) -> Self {
        self.restart = Some(restart);
        self
    }

    /// PDF → Word through Adobe Acrobat, driven by an AppleScript export script.
    ///
    /// The script is expected to call Acrobat's JavaScript `saveAs()` so the
    /// write is complete by the time `osascript` exits.
    pub fn acrobat(script: impl AsRef<Path>, timeout_secs: u64) -> Self {
        let script = script.as_ref().display().to_string();
        Self::new(
            "osascript",
            vec![script, INPUT.into(), OUTPUT.into()],
            Duration::from_secs(timeout_secs),
        )
        .install_hint("osascript is only available on macOS with Adobe Acrobat installed.")
        .restart_with(RestartCommand {
            program: "osascript".into(),
            args: vec![
                "-e".into(),
                r#"tell application "Adobe Acrobat" to quit"#.into(),
            ],
            timeout: Duration::from_secs(30),
            settle: Duration::from_secs(5),
        })
    }

    /// Word → Markdown through pandoc.
    ///
    /// `--wrap=none` keeps table rows on one line each.
    pub fn pandoc(timeout_secs: u64) -> Self {
        Self::new(
            "pandoc",
            vec![
                INPUT.into(),
                "-f".into(),
                "docx".into(),
                "-t".into(),
                "markdown".into(),
                "-o".into(),
                OUTPUT.into(),
                "--wrap=none".into(),
            ],
            Duration::from_secs(timeout_secs),
        )
        .install_hint("Install with: brew install pandoc")
    }

    /// Arguments with placeholders substituted.
    fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|a| a.replace(INPUT, &input).replace(OUTPUT, &output))
            .collect()
    }
}

#[async_trait]
impl Converter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<(), ConvertError> {
        let args = self.render_args(input, output);
        debug!("Running {} {:?}", self.program, args);

        run_with_timeout(&self.program, &args, self.timeout, &self.install_hint).await?;

        if !output.exists() {
            return Err(ConvertError::MissingOutput {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }

    async fn restart(&self) -> Result<(), ConvertError> {
        let Some(ref restart) = self.restart else {
            return Ok(());
        };
        info!("Restarting {}", self.program);
        if let Err(e) = run_with_timeout(
            &restart.program,
            &restart.args,
            restart.timeout,
            &self.install_hint,
        )
        .await
        {
            warn!("Restart command for {} failed: {}", self.program, e);
        }
        tokio::time::sleep(restart.settle).await;
        Ok(())
    }
}

/// Spawn `program`, wait at most `timeout`, and map every failure mode.
///
/// The child is killed when the timeout elapses (`kill_on_drop`).
async fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    install_hint: &str,
) -> Result<(), ConvertError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConvertError::ToolMissing {
                tool: program.to_string(),
                hint: install_hint.to_string(),
            });
        }
        Err(e) => return Err(ConvertError::Internal(format!("spawn {program}: {e}"))),
    };

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(ConvertError::Internal(format!("wait {program}: {e}"))),
        Err(_) => {
            return Err(ConvertError::TimedOut {
                tool: program.to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    if output.status.success() {
        return Ok(());
    }

    let code = output
        .status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    Err(ConvertError::ToolFailed {
        tool: program.to_string(),
        code,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Destination path for `source` inside `out_dir` with a new extension.
pub fn destination_for(source: &Path, out_dir: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    let mut dest = out_dir.join(stem);
    dest.set_extension(extension);
    dest
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pandoc_args_substitute_paths() {
        let c = CommandConverter::pandoc(60);
        let args = c.render_args(Path::new("/in/a.docx"), Path::new("/out/a.md"));
        assert_eq!(
            args,
            vec![
                "/in/a.docx",
                "-f",
                "docx",
                "-t",
                "markdown",
                "-o",
                "/out/a.md",
                "--wrap=none"
            ]
        );
        assert_eq!(c.timeout, Duration::from_secs(60));
        assert!(c.restart.is_none());
    }

    #[test]
    fn acrobat_has_restart_and_long_timeout() {
        let c = CommandConverter::acrobat("/scripts/export.scpt", 180);
        let args = c.render_args(Path::new("/in/a.pdf"), Path::new("/out/a.docx"));
        assert_eq!(args, vec!["/scripts/export.scpt", "/in/a.pdf", "/out/a.docx"]);
        assert_eq!(c.timeout, Duration::from_secs(180));
        let restart = c.restart.as_ref().unwrap();
        assert!(restart.args[1].contains("to quit"));
    }

    #[test]
    fn destination_replaces_extension() {
        let dest = destination_for(Path::new("/in/My Paper.pdf"), Path::new("/out"), "docx");
        assert_eq!(dest, PathBuf::from("/out/My Paper.docx"));
    }

    #[tokio::test]
    async fn missing_binary_is_actionable() {
        let c = CommandConverter::new(
            "definitely-not-a-real-binary-4821",
            vec![INPUT.into()],
            Duration::from_secs(5),
        )
        .install_hint("Install the thing");
        let err = c
            .convert(Path::new("/tmp/in"), Path::new("/tmp/out"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConvertError::ToolMissing {
                tool: "definitely-not-a-real-binary-4821".into(),
                hint: "Install the thing".into(),
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_captures_stderr() {
        let c = CommandConverter::new(
            "sh",
            vec!["-c".into(), "echo boom >&2; exit 3".into()],
            Duration::from_secs(5),
        );
        let err = c
            .convert(Path::new("/tmp/in"), Path::new("/tmp/out"))
            .await
            .unwrap_err();
        match err {
            ConvertError::ToolFailed { code, stderr, .. } => {
                assert_eq!(code, "3");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_times_out() {
        let c = CommandConverter::new("sleep", vec!["5".into()], Duration::from_secs(1));
        let err = c
            .convert(Path::new("/tmp/in"), Path::new("/tmp/out"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::TimedOut { secs: 1, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_requires_output_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.md");

        let noop = CommandConverter::new("true", vec![], Duration::from_secs(5));
        let err = noop.convert(Path::new("/tmp/in"), &out).await.unwrap_err();
        assert!(matches!(err, ConvertError::MissingOutput { .. }));

        let writer = CommandConverter::new(
            "sh",
            vec!["-c".into(), format!("echo hi > '{OUTPUT}'")],
            Duration::from_secs(5),
        );
        writer.convert(Path::new("/tmp/in"), &out).await.unwrap();
        assert!(out.exists());
    }
}
