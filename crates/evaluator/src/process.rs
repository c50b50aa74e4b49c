//! Child-process execution with a deadline and cooperative cancellation.

use crate::cancel::CancelToken;
use crate::toolchain::ToolFailure;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of a finished child process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Run `cmd` to completion.
///
/// stdout and stderr are drained on reader threads so a verbose child can't
/// block on a full pipe. The child is killed when `timeout` elapses or
/// `cancel` fires. A non-zero exit is NOT an error here; callers inspect
/// `status`.
pub fn run_to_completion(
    cmd: &mut Command,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<ProcessOutput, ToolFailure> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    if cancel.is_cancelled() {
        return Err(ToolFailure::Cancelled);
    }

    let start = Instant::now();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ToolFailure::Launch {
            program: program.clone(),
            detail: e.to_string(),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                kill(&mut child, &program);
                return Err(ToolFailure::Launch {
                    program,
                    detail: format!("failed to wait: {e}"),
                });
            }
        }

        if cancel.is_cancelled() {
            kill(&mut child, &program);
            return Err(ToolFailure::Cancelled);
        }
        if let Some(limit) = timeout {
            if start.elapsed() >= limit {
                kill(&mut child, &program);
                return Err(ToolFailure::TimedOut {
                    program,
                    after: limit,
                });
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(ProcessOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
        elapsed: start.elapsed(),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn kill(child: &mut Child, program: &str) {
    if let Err(e) = child.kill() {
        warn!(program, error = %e, "failed to kill child process");
    }
    let _ = child.wait();
}
