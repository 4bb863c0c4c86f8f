use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, JayeError};

/// Abstract media processing command representation
#[derive(Debug, Clone)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
    failure: fn(String) -> JayeError,
}

impl MediaCommand {
    /// Create a new media processing command. `failure` builds the error
    /// reported when the process cannot be run or exits unsuccessfully.
    pub fn new<S1: Into<String>, S2: Into<String>>(
        binary_path: S1,
        description: S2,
        failure: fn(String) -> JayeError,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
            failure,
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Read input from stdin
    pub fn stdin_input(self) -> Self {
        self.arg("-i").arg("-")
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Write output to stdout
    pub fn stdout_output(self) -> Self {
        self.arg("-")
    }

    /// Force the container format of the next output
    pub fn format<S: Into<String>>(self, format: S) -> Self {
        self.arg("-f").arg(format)
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Suppress the banner and keep stderr to errors only
    pub fn quiet(self) -> Self {
        self.arg("-hide_banner").arg("-loglevel").arg("error")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }

    fn check_status(&self, status: ExitStatus, stderr: &str) -> Result<()> {
        if status.success() {
            return Ok(());
        }
        Err((self.failure)(format!(
            "{} failed ({}): {}",
            self.description,
            status,
            stderr.trim()
        )))
    }

    /// Execute the command against files named in its arguments
    pub async fn execute(&self, cancel: &CancellationToken) -> Result<()> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| (self.failure)(format!("Failed to execute media processor: {}", e)))?;

        // Dropping the child on cancellation kills it.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JayeError::Cancelled),
            output = child.wait_with_output() => output,
        }
        .map_err(|e| (self.failure)(format!("Failed to wait for media processor: {}", e)))?;

        self.check_status(output.status, &String::from_utf8_lossy(&output.stderr))
    }

    /// Execute the command with `src` fed to stdin and stdout copied into `dst`
    pub async fn pipe(
        &self,
        src: &mut (dyn AsyncRead + Unpin + Send),
        dst: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug!("Piping through media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| (self.failure)(format!("Failed to execute media processor: {}", e)))?;

        let (mut stdin, mut stdout, mut stderr) =
            match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
                (Some(i), Some(o), Some(e)) => (i, o, e),
                _ => return Err((self.failure)("Media processor pipes unavailable".to_string())),
            };

        // Set when the output sink fails. The process may then block on a
        // stdout nobody reads, so it is killed rather than waited on.
        let broken = CancellationToken::new();

        let feed = async {
            let copied = tokio::select! {
                copied = tokio::io::copy(&mut *src, &mut stdin) => copied,
                _ = broken.cancelled() => Ok(0),
            };
            // Closing stdin signals end of input.
            drop(stdin);
            copied
        };
        let drain = async {
            let copied = tokio::io::copy(&mut stdout, &mut *dst).await;
            if copied.is_err() {
                drop(stdout);
                broken.cancel();
            }
            copied
        };
        let collect = async {
            let mut buf = String::new();
            tokio::select! {
                _ = stderr.read_to_string(&mut buf) => {}
                _ = broken.cancelled() => {}
            }
            buf
        };

        let io = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            io = async { tokio::join!(feed, drain, collect) } => Some(io),
        };

        let Some((fed, drained, stderr)) = io else {
            let _ = child.kill().await;
            return Err(JayeError::Cancelled);
        };

        if let Err(e) = drained {
            if let Err(kill) = child.kill().await {
                warn!("Failed to kill {}: {}", self.description, kill);
            }
            return Err((self.failure)(format!("Failed to write {} output: {}", self.description, e)));
        }

        let status = child
            .wait()
            .await
            .map_err(|e| (self.failure)(format!("Failed to wait for media processor: {}", e)))?;

        // A non-zero exit explains a broken stdin pipe better than the pipe error itself.
        self.check_status(status, &stderr)?;
        fed.map_err(|e| (self.failure)(format!("Failed to feed {}: {}", self.description, e)))?;
        Ok(())
    }
}

/// Builder for the encoder invocations the gateway needs
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build stdin-to-stdout mp3 conversion command
    pub fn convert_to_mp3(&self, additional_options: &[String]) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio conversion", JayeError::ConvertFailed)
            .quiet()
            .stdin_input()
            .format("mp3")
            .args(additional_options.iter().cloned())
            .stdout_output()
    }

    /// Build video and audio merge command
    pub fn merge_to_mp4<P: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: P,
        output_path: P,
        additional_options: &[String],
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio/video merge", JayeError::MergeFailed)
            .quiet()
            .input(video_path)
            .input(audio_path)
            .args(additional_options.iter().cloned())
            .format("mp4")
            .overwrite()
            .output(output_path)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check", JayeError::Config)
            .arg("-version")
    }
}
