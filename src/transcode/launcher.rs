//! Transcoder process launcher

use std::collections::VecDeque;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::io::ReaderStream;

use super::{build_args, SourceDescriptor};
use crate::config::TranscoderConfig;
use crate::error::RelayError;

/// Number of diagnostic lines kept for exit reports
const STDERR_TAIL_LINES: usize = 8;

/// Output of a running transcoder
#[derive(Debug)]
pub enum UpstreamEvent {
    /// One read from the stdout pipe, in emission order
    Chunk(Bytes),
    /// The transcoder stopped producing output
    Ended(String),
}

/// Starts transcoder processes from a configuration snapshot
pub struct TranscodeLauncher {
    config: TranscoderConfig,
}

impl TranscodeLauncher {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Spawn exactly one transcoder process for `source`
    ///
    /// `label` tags the process's diagnostic output in the logs.
    pub fn start(&self, source: &SourceDescriptor, label: &str) -> Result<Transcoder, RelayError> {
        let args = build_args(&self.config, source);

        tracing::info!(
            "[{}] Starting transcoder: {} {}",
            label,
            self.config.binary,
            args.join(" ")
        );

        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RelayError::Launch {
                binary: self.config.binary.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| RelayError::Launch {
            binary: self.config.binary.clone(),
            source: io::Error::new(io::ErrorKind::BrokenPipe, "stdout not captured"),
        })?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        if let Some(stderr) = child.stderr.take() {
            let label = label.to_string();
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                collect_diagnostics(label, stderr, tail).await;
            });
        }

        let pid = child.id();
        tracing::info!("[{}] Transcoder started with PID {:?}", label, pid);

        Ok(Transcoder {
            child,
            output: ReaderStream::with_capacity(stdout, self.config.read_chunk_size.max(1)),
            pid,
            exit_status: None,
            stderr_tail,
        })
    }
}

/// Log the transcoder's stderr line by line
///
/// Diagnostic output is only logged and kept for exit reports, never
/// interpreted.
async fn collect_diagnostics<R: tokio::io::AsyncRead + Unpin>(
    label: String,
    reader: R,
    tail: Arc<Mutex<VecDeque<String>>>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::debug!("[{}] transcoder: {}", label, line);
                let mut tail = tail.lock();
                if tail.len() >= STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("[{}] Error reading transcoder stderr: {}", label, e);
                break;
            }
        }
    }
}

/// A running transcoder process and its output pipe
pub struct Transcoder {
    child: Child,
    output: ReaderStream<ChildStdout>,
    pid: Option<u32>,
    exit_status: Option<ExitStatus>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
}

impl Transcoder {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the next chunk or for the end of the upstream
    ///
    /// Cancel-safe: a pending read is not lost when the future is dropped.
    pub async fn next_event(&mut self) -> UpstreamEvent {
        tokio::select! {
            biased;

            chunk = self.output.next() => match chunk {
                Some(Ok(bytes)) => UpstreamEvent::Chunk(bytes),
                Some(Err(e)) => UpstreamEvent::Ended(format!("stdout read error: {}", e)),
                None => {
                    let reason = match self.child.try_wait() {
                        Ok(Some(status)) => {
                            self.exit_status = Some(status);
                            format!("transcoder exited ({})", status)
                        }
                        _ => "transcoder closed its output".to_string(),
                    };
                    UpstreamEvent::Ended(self.with_diagnostics(reason))
                }
            },

            status = self.child.wait() => {
                let reason = match status {
                    Ok(status) => {
                        self.exit_status = Some(status);
                        format!("transcoder exited ({})", status)
                    }
                    Err(e) => format!("failed to wait for transcoder: {}", e),
                };
                UpstreamEvent::Ended(self.with_diagnostics(reason))
            }
        }
    }

    fn with_diagnostics(&self, reason: String) -> String {
        match self.stderr_tail.lock().back() {
            Some(line) => format!("{}: {}", reason, line),
            None => reason,
        }
    }

    /// Whether the process has exited and been reaped
    pub fn has_exited(&mut self) -> bool {
        if self.exit_status.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                true
            }
            _ => false,
        }
    }

    /// Force the process to exit (SIGKILL) and reap it
    ///
    /// Returns once the process is gone. Calling it again is a no-op.
    pub async fn kill(&mut self) -> io::Result<()> {
        if self.has_exited() {
            return Ok(());
        }

        self.child.kill().await?;
        self.exit_status = self.child.try_wait()?;
        tracing::debug!("Transcoder {:?} killed", self.pid);
        Ok(())
    }
}
