use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::errors::StageError;
use crate::utils::{render_args, truncate_head, truncate_tail};
use super::payload::{extract_payload, reported_error};
use super::{AnalysisEngine, Stage, StageRequest};

/// Stderr kept for diagnostics; the tail holds the traceback.
const MAX_STDERR_CHARS: usize = 4000;
/// Stdout prefix attached to failures for diagnosis.
const STDOUT_PREFIX_CHARS: usize = 200;

/// Executable plus the leading arguments that precede the stage's
/// positional arguments, e.g. `python scripts/audio_separator.py`.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub program: String,
    pub base_args: Vec<OsString>,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    pub fn script(interpreter: &str, script: &Path) -> Self {
        Self::new(interpreter).arg(script.as_os_str())
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.base_args.push(arg.into());
        self
    }

    fn args_for(&self, request: &StageRequest) -> Vec<OsString> {
        let mut args = self.base_args.clone();
        args.extend(request.positional_args());
        args
    }
}

/// Runs one engine as a child process with a hard timeout.
pub struct ProcessEngine {
    command: EngineCommand,
}

impl ProcessEngine {
    pub fn new(command: EngineCommand) -> Self {
        Self { command }
    }

    fn spawn(&self, args: &[OsString]) -> std::io::Result<Child> {
        let mut command = std::process::Command::new(&self.command.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so a timeout also reaches whatever the engine forked.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut command = Command::from(command);
        command.kill_on_drop(true);
        command.spawn()
    }
}

#[async_trait]
impl AnalysisEngine for ProcessEngine {
    async fn run(&self, request: &StageRequest) -> Result<Value, StageError> {
        let stage = request.stage;
        let args = self.command.args_for(request);
        info!(
            "[{}] Spawning {} {} (budget {}s)",
            stage,
            self.command.program,
            render_args(&args),
            request.timeout.as_secs()
        );

        let started = Instant::now();
        let mut child = self.spawn(&args).map_err(|source| StageError::Spawn {
            stage,
            program: self.command.program.clone(),
            source,
        })?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let mut stdout = Vec::new();
        let mut stderr = String::new();

        let completed = {
            let run = async {
                let (status, stdout_read, ()) = tokio::join!(
                    child.wait(),
                    read_stdout(stdout_pipe, &mut stdout),
                    collect_stderr(stage, stderr_pipe, &mut stderr),
                );
                if let Err(e) = stdout_read {
                    warn!("[{}] Failed reading engine stdout: {}", stage, e);
                }
                status
            };
            tokio::time::timeout(request.timeout, run).await
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let status = match completed {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                terminate(stage, &mut child).await;
                return Err(StageError::Engine {
                    stage,
                    code: None,
                    stderr: format!("failed waiting for engine exit: {}", e),
                    stdout_prefix: stdout_prefix(&stdout),
                    elapsed_ms,
                });
            }
            Err(_) => {
                warn!(
                    "[{}] Engine exceeded its {}s budget, terminating",
                    stage,
                    request.timeout.as_secs()
                );
                terminate(stage, &mut child).await;
                return Err(StageError::Timeout {
                    stage,
                    budget: request.timeout,
                    elapsed_ms,
                    stderr: truncate_tail(&stderr, MAX_STDERR_CHARS),
                    stdout_prefix: stdout_prefix(&stdout),
                });
            }
        };

        info!("[{}] Engine exited with {} after {}ms", stage, status, elapsed_ms);
        interpret_output(stage, status, &String::from_utf8_lossy(&stdout), &stderr, elapsed_ms)
    }

    fn engine_type(&self) -> &'static str {
        "process"
    }
}

/// Maps a finished process to its payload or a typed failure.
///
/// A parseable payload wins over a non-zero exit; engines sometimes exit
/// non-zero after printing a complete result.
fn interpret_output(
    stage: Stage,
    status: ExitStatus,
    stdout: &str,
    stderr: &str,
    elapsed_ms: u64,
) -> Result<Value, StageError> {
    match extract_payload(stdout) {
        Ok(payload) => {
            if let Some(message) = reported_error(&payload) {
                return Err(StageError::Engine {
                    stage,
                    code: status.code(),
                    stderr: truncate_tail(&message, MAX_STDERR_CHARS),
                    stdout_prefix: String::new(),
                    elapsed_ms,
                });
            }
            if !status.success() {
                warn!("[{}] Engine exited with {} but emitted a payload, accepting it", stage, status);
            }
            Ok(payload)
        }
        Err(_) if !status.success() => Err(StageError::Engine {
            stage,
            code: status.code(),
            stderr: truncate_tail(stderr, MAX_STDERR_CHARS),
            stdout_prefix: truncate_head(stdout, STDOUT_PREFIX_CHARS),
            elapsed_ms,
        }),
        Err(e) => {
            let diagnostic = if stderr.trim().is_empty() {
                truncate_head(stdout, STDOUT_PREFIX_CHARS)
            } else {
                truncate_tail(stderr, MAX_STDERR_CHARS)
            };
            Err(StageError::Protocol {
                stage,
                detail: e.to_string(),
                diagnostic,
            })
        }
    }
}

fn stdout_prefix(stdout: &[u8]) -> String {
    truncate_head(&String::from_utf8_lossy(stdout), STDOUT_PREFIX_CHARS)
}

async fn read_stdout(pipe: Option<ChildStdout>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    match pipe {
        Some(mut pipe) => pipe.read_to_end(buf).await.map(|_| ()),
        None => Ok(()),
    }
}

async fn collect_stderr(stage: Stage, pipe: Option<ChildStderr>, buf: &mut String) {
    let Some(pipe) = pipe else { return };
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!("[{}] {}", stage, line);
                buf.push_str(&line);
                buf.push('\n');
            }
            Ok(None) => break,
            Err(e) => {
                debug!("[{}] Stopped reading stderr: {}", stage, e);
                break;
            }
        }
    }
}

async fn terminate(stage: Stage, child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            kill_process_group(stage, pid).await;
        }
    }
    if let Err(e) = child.kill().await {
        debug!("[{}] Engine already gone when killed: {}", stage, e);
    }
}

#[cfg(unix)]
async fn kill_process_group(stage: Stage, pgid: u32) {
    let group = format!("-{}", pgid);
    let result = Command::new("kill")
        .args(["-s", "KILL", "--", group.as_str()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        warn!("[{}] Could not signal process group {}: {}", stage, pgid, e);
    }
}
