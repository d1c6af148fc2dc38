//! Worker process handle
//!
//! Spawns an external command with stdout and stderr captured into bounded
//! in-memory buffers, so failures can be logged with the worker's own output
//! without it leaking into the supervisor's stream.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::{RapidError, Result};
use crate::worker::command::LaunchCommand;

/// Default number of trailing output bytes kept per stream
pub const DEFAULT_OUTPUT_TAIL_BYTES: usize = 64 * 1024;

/// How long to wait for output readers after the process exits
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Bounded buffer that keeps the most recent bytes of a stream
#[derive(Debug, Clone)]
struct OutputBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    limit: usize,
}

impl OutputBuffer {
    fn new(limit: usize) -> Self {
        Self {
            data: Arc::new(Mutex::new(Vec::new())),
            limit,
        }
    }

    fn push(&self, chunk: &[u8]) {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.extend_from_slice(chunk);
        if data.len() > self.limit {
            let excess = data.len() - self.limit;
            data.drain(..excess);
        }
    }

    fn contents(&self) -> String {
        let data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&data).into_owned()
    }
}

fn capture<R>(mut reader: R, buffer: OutputBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer.push(&chunk[..n]),
            }
        }
    })
}

/// Result of a worker run that was waited to completion
#[derive(Debug, Clone)]
pub struct ProcessExit {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// A spawned worker process
#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
    pid: Option<u32>,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    readers: Vec<JoinHandle<()>>,
    exited: bool,
}

impl WorkerProcess {
    /// Spawn the command, keeping up to `tail_bytes` of each output stream
    pub fn start(command: &LaunchCommand, tail_bytes: usize) -> Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| RapidError::Launch(format!("{}: {}", command, e)))?;

        let stdout = OutputBuffer::new(tail_bytes);
        let stderr = OutputBuffer::new(tail_bytes);
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(capture(out, stdout.clone()));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(capture(err, stderr.clone()));
        }

        Ok(Self {
            pid: child.id(),
            child,
            stdout,
            stderr,
            readers,
            exited: false,
        })
    }

    /// OS process id, if the process was still running when spawned
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has been observed to exit
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    /// Captured stderr so far
    pub fn stderr(&self) -> String {
        self.stderr.contents()
    }

    /// Wait for the process to exit without consuming the handle
    pub async fn wait_status(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.exited = true;
        self.drain_readers().await;
        Ok(status)
    }

    /// Run to completion and collect the captured output
    pub async fn wait(mut self) -> Result<ProcessExit> {
        let status = self.wait_status().await?;
        Ok(ProcessExit {
            status,
            stdout: self.stdout.contents(),
            stderr: self.stderr.contents(),
        })
    }

    /// Forcefully terminate the process
    ///
    /// Fails with [`RapidError::Kill`] if the process already exited; callers
    /// report that and move on.
    pub async fn kill(&mut self) -> Result<()> {
        let pid = self.pid;
        self.child
            .kill()
            .await
            .map_err(|e| RapidError::Kill(format!("pid {:?}: {}", pid, e)))?;
        self.exited = true;
        Ok(())
    }

    async fn drain_readers(&mut self) {
        // Grandchildren can hold the pipes open past the worker's exit.
        for reader in self.readers.drain(..) {
            let _ = tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await;
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}
