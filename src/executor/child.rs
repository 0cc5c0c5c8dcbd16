use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, Notify};

use crate::error::ProxyError;

/// Written to both log sinks after every `Interact`, successful or not, so
/// the outer log harvester can segment activations (spec §6).
pub const ACTIVATION_BOUNDARY_SENTINEL: &[u8] = b"XXX_THE_END_OF_A_WHISK_ACTIVATION_XXX\n";

/// Start timeout for generic (uploaded-action) executors (spec §4.A).
pub const START_TIMEOUT_GENERIC: Duration = Duration::from_millis(5);
/// Start timeout for warm model executors, which only need to clear fork
/// and reach their input loop (spec §4.A).
pub const START_TIMEOUT_WARM: Duration = Duration::from_millis(100);
/// Default per-kind `Interact` deadline for warm inference executors (spec §4.A).
pub const DEFAULT_INTERACT_TIMEOUT: Duration = Duration::from_secs(15);

/// Launch specification for a child process (spec §4.A). `Launch` builds
/// this but does not start anything; `ChildProcess::start` does.
#[derive(Clone)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// Whether the child becomes its own process group leader so `Stop()`
    /// can SIGKILL the whole group, not just the leader pid (spec §4.A, §9).
    pub process_group: bool,
    pub start_timeout: Duration,
    pub interact_timeout: Duration,
}

/// Where the activation-boundary sentinel lands. Always the captured log
/// sinks, never a (possibly dead) child handle — spec §9 Design Notes
/// calls out the source's null-dereference risk on the timeout path.
#[derive(Clone)]
pub struct LogSinks {
    pub stdout: Arc<Mutex<tokio::fs::File>>,
    pub stderr: Arc<Mutex<tokio::fs::File>>,
}

impl LogSinks {
    pub async fn write_sentinel(&self) {
        let mut stdout = self.stdout.lock().await;
        let _ = stdout.write_all(ACTIVATION_BOUNDARY_SENTINEL).await;
        drop(stdout);
        let mut stderr = self.stderr.lock().await;
        let _ = stderr.write_all(ACTIVATION_BOUNDARY_SENTINEL).await;
    }
}

/// Ack payload a child emits before its first real reply when
/// `OW_WAIT_FOR_ACK` is set (spec §6).
#[derive(serde::Deserialize)]
struct ActionAck {
    ok: bool,
}

/// One OS child: stdin writer, stdout reader, exit signal, started flag
/// (spec §3). `Unstarted → Running → Exited|Killed`. A reaped handle is
/// never reused — construct a fresh `ChildProcess` for every (re)start.
pub struct ChildProcess {
    stdin: Option<tokio::process::ChildStdin>,
    stdout: Option<BufReader<tokio::process::ChildStdout>>,
    exited: Arc<Notify>,
    exited_flag: Arc<AtomicBool>,
    pid: Option<i32>,
    spec: LaunchSpec,
    log_sinks: LogSinks,
    started: bool,
}

impl ChildProcess {
    /// Constructs an Unstarted handle. Does not start the process (spec §4.A).
    pub fn launch(spec: LaunchSpec, log_sinks: LogSinks) -> Self {
        Self {
            stdin: None,
            stdout: None,
            exited: Arc::new(Notify::new()),
            exited_flag: Arc::new(AtomicBool::new(false)),
            pid: None,
            spec,
            log_sinks,
            started: false,
        }
    }

    pub fn started(&self) -> bool {
        self.started
    }

    /// Non-blocking peek at the exit signal (spec §4.A).
    pub fn exited(&self) -> bool {
        self.exited_flag.load(Ordering::SeqCst)
    }

    /// Launches the OS child and, depending on `wait_for_ack`, either waits
    /// a short start timeout or blocks for the `{"ok": true}` ack line
    /// (spec §4.A).
    pub async fn start(&mut self, wait_for_ack: bool) -> Result<(), ProxyError> {
        let mut cmd = tokio::process::Command::new(&self.spec.command);
        cmd.args(&self.spec.args)
            .env_clear()
            .envs(&self.spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if self.spec.process_group {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|_| ProxyError::ProcessExited)?;
        self.pid = child.id().map(|p| p as i32);

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = BufReader::new(child.stdout.take().expect("stdout was piped"));
        let stderr = child.stderr.take().expect("stderr was piped");

        // "stderr merged into stdout" (spec §4.A Launch) — mirrored into the
        // stdout log sink by a background copier rather than interleaved
        // into the protocol-carrying stdout pipe, to keep JSON framing clean.
        let stdout_log = self.log_sinks.stdout.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let mut sink = stdout_log.lock().await;
                        let _ = sink.write_all(&buf).await;
                    }
                }
            }
        });

        let exited = self.exited.clone();
        let exited_flag = self.exited_flag.clone();
        tokio::spawn(async move {
            let _ = child.wait().await;
            exited_flag.store(true, Ordering::SeqCst);
            exited.notify_waiters();
        });

        self.stdin = Some(stdin);
        self.stdout = Some(stdout);

        if !wait_for_ack {
            tokio::select! {
                _ = self.exited.notified() => {
                    self.started = false;
                    Err(ProxyError::ProcessExited)
                }
                _ = tokio::time::sleep(self.spec.start_timeout) => {
                    self.started = true;
                    Ok(())
                }
            }
        } else {
            let stdout = self.stdout.as_mut().expect("stdout set above");
            let mut line = Vec::new();
            tokio::select! {
                result = stdout.read_until(b'\n', &mut line) => {
                    match result {
                        Ok(0) | Err(_) => {
                            self.started = false;
                            Err(ProxyError::InitRefused)
                        }
                        Ok(_) => {
                            let ack: Result<ActionAck, _> = serde_json::from_slice(&line);
                            match ack {
                                Ok(ActionAck { ok: true }) => {
                                    self.started = true;
                                    Ok(())
                                }
                                _ => {
                                    self.started = false;
                                    Err(ProxyError::InitRefused)
                                }
                            }
                        }
                    }
                }
                _ = self.exited.notified() => {
                    self.started = false;
                    Err(ProxyError::InitRefused)
                }
            }
        }
    }

    /// Writes `payload` plus a newline to stdin, reads exactly one line
    /// from stdout, and always appends the activation-boundary sentinel to
    /// both log sinks afterward (spec §4.A).
    pub async fn interact(&mut self, payload: &[u8]) -> Result<Vec<u8>, ProxyError> {
        let result = self.interact_inner(payload).await;
        self.log_sinks.write_sentinel().await;
        result
    }

    async fn interact_inner(&mut self, payload: &[u8]) -> Result<Vec<u8>, ProxyError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ProxyError::WriteFailed("stdin closed".to_string()))?;
        if stdin.write_all(payload).await.is_err() || stdin.write_all(b"\n").await.is_err() {
            return Err(ProxyError::WriteFailed("stdin closed".to_string()));
        }
        let _ = stdin.flush().await;

        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| ProxyError::WriteFailed("stdout unavailable".to_string()))?;
        let mut line = Vec::new();

        tokio::select! {
            result = stdout.read_until(b'\n', &mut line) => {
                match result {
                    Ok(0) => Err(ProxyError::NoAnswer),
                    Err(_) => Err(ProxyError::NoAnswer),
                    Ok(_) => {
                        if line.last() == Some(&b'\n') {
                            line.pop();
                        }
                        if line.is_empty() {
                            Err(ProxyError::NoAnswer)
                        } else {
                            Ok(line)
                        }
                    }
                }
            }
            _ = self.exited.notified() => {
                Err(ProxyError::ProcessExited)
            }
            _ = tokio::time::sleep(self.spec.interact_timeout) => {
                Err(ProxyError::Timeout)
            }
        }
    }

    /// Reads exactly one line from stdout without writing anything to
    /// stdin first, racing against the exit signal and preferring the
    /// line when both are ready (spec §4.C, used by `ColdExecutor`).
    pub async fn read_one_line_or_exit(&mut self) -> Result<Vec<u8>, ProxyError> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or(ProxyError::NoAnswer)?;
        let mut line = Vec::new();
        tokio::select! {
            biased;
            result = stdout.read_until(b'\n', &mut line) => {
                match result {
                    Ok(0) | Err(_) => Err(ProxyError::NoAnswer),
                    Ok(_) => {
                        if line.last() == Some(&b'\n') {
                            line.pop();
                        }
                        Ok(line)
                    }
                }
            }
            _ = self.exited.notified() => Err(ProxyError::ProcessExited),
        }
    }

    /// Writes the activation-boundary sentinel to both log sinks without
    /// performing any stdin/stdout interaction (used by `ColdExecutor`,
    /// which has no request payload to write).
    pub async fn write_sentinel(&self) {
        self.log_sinks.write_sentinel().await;
    }

    /// Idempotent. Kills the process (process-group SIGKILL for
    /// process-grouped kinds, direct kill otherwise), clears `started`,
    /// and drops the handle (spec §4.A).
    pub fn stop(&mut self) {
        if let Some(pid) = self.pid.take() {
            let target = if self.spec.process_group { -pid } else { pid };
            unsafe {
                libc::kill(target, libc::SIGKILL);
            }
        }
        self.started = false;
        self.stdin = None;
        self.stdout = None;
    }
}
