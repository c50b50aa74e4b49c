//! The external build/run collaborator.
//!
//! The evaluator never compiles or simulates anything itself; it hands a
//! source file to a [`Toolchain`] and gets back a binary, then a textual
//! simulator report per workload.

use crate::cancel::CancelToken;
use crate::process::{run_to_completion, ProcessOutput};
use cacheforge_ledger::Workload;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Stderr/stdout excerpt kept in a failure, in bytes.
const DETAIL_LIMIT: usize = 2000;

/// Upper bound on `docker rm -f` after an abandoned run.
const CONTAINER_STOP_TIMEOUT: Duration = Duration::from_secs(30);

static CONTAINER_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum ToolFailure {
    #[error("{program} exited with {status}: {detail}")]
    Exit {
        program: String,
        status: String,
        detail: String,
    },

    #[error("failed to launch {program}: {detail}")]
    Launch { program: String, detail: String },

    #[error("{program} timed out after {after:?}")]
    TimedOut { program: String, after: Duration },

    #[error("cancelled")]
    Cancelled,
}

/// Builds a candidate source into an executable and runs it on a workload.
pub trait Toolchain: Send + Sync {
    fn name(&self) -> &str;

    /// Compile `source`; returns the path of the produced executable.
    fn build(&self, source: &Path, cancel: &CancelToken) -> Result<PathBuf, ToolFailure>;

    /// Simulate `binary` on `workload`'s trace; returns the raw report.
    fn run(
        &self,
        binary: &Path,
        workload: &Workload,
        cancel: &CancelToken,
    ) -> Result<String, ToolFailure>;
}

/// Optional `docker run` wrapper around every build and run command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub image: String,
    pub platform: Option<String>,
    /// Mount point of `host_dir` inside the container; also the working dir.
    pub workdir: String,
    /// Directory mounted at `workdir`. Defaults to the current directory.
    pub host_dir: Option<PathBuf>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: "champsim-runner".into(),
            platform: Some("linux/amd64".into()),
            workdir: "/app".into(),
            host_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub compiler: String,
    pub compiler_flags: Vec<String>,
    /// Extra inputs placed after the source on the compiler line (the
    /// simulator library).
    pub link_inputs: Vec<String>,
    pub warmup_instructions: u64,
    pub simulation_instructions: u64,
    pub container: Option<ContainerConfig>,
    pub build_timeout_secs: Option<u64>,
    pub run_timeout_secs: Option<u64>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: "g++".into(),
            compiler_flags: vec!["-Wall".into(), "--std=c++11".into()],
            link_inputs: vec!["ChampSim_CRC2/lib/config1.a".into()],
            warmup_instructions: 1_000_000,
            simulation_instructions: 10_000_000,
            container: None,
            build_timeout_secs: Some(300),
            run_timeout_secs: None,
        }
    }
}

/// A spawned-ready command plus the container it will start, if any.
#[derive(Debug)]
pub struct Invocation {
    pub command: Command,
    /// `--name` given to `docker run`; the container outlives a killed
    /// client, so it has to be removed by name.
    pub container: Option<String>,
}

/// Drives the compiler and simulator as child processes.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    config: ToolchainConfig,
}

impl CommandToolchain {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    /// Compiler argv for `source`, producing `binary`.
    pub fn build_argv(&self, source: &Path, binary: &Path) -> Vec<String> {
        let mut argv = vec![self.config.compiler.clone()];
        argv.extend(self.config.compiler_flags.iter().cloned());
        argv.push(source.display().to_string());
        argv.extend(self.config.link_inputs.iter().cloned());
        argv.push("-o".into());
        argv.push(binary.display().to_string());
        argv
    }

    /// Simulator argv for `binary` on `workload`.
    pub fn run_argv(&self, binary: &Path, workload: &Workload) -> Vec<String> {
        vec![
            executable_path(binary),
            "-warmup_instructions".into(),
            self.config.warmup_instructions.to_string(),
            "-simulation_instructions".into(),
            self.config.simulation_instructions.to_string(),
            "-traces".into(),
            workload.trace.clone(),
        ]
    }

    /// The command actually spawned for `argv`, container wrapper included.
    pub fn command(&self, argv: &[String]) -> Result<Invocation, ToolFailure> {
        let Some(container) = &self.config.container else {
            let (program, args) = argv.split_first().ok_or_else(|| ToolFailure::Launch {
                program: String::new(),
                detail: "empty command line".into(),
            })?;
            let mut command = Command::new(program);
            command.args(args);
            return Ok(Invocation {
                command,
                container: None,
            });
        };

        let host_dir = match &container.host_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|e| ToolFailure::Launch {
                program: "docker".into(),
                detail: format!("cannot resolve current directory: {e}"),
            })?,
        };
        let name = format!(
            "cacheforge-{}-{}",
            std::process::id(),
            CONTAINER_SEQ.fetch_add(1, Ordering::Relaxed)
        );

        let mut command = Command::new("docker");
        command.arg("run");
        if let Some(platform) = &container.platform {
            command.args(["--platform", platform.as_str()]);
        }
        command
            .arg("--rm")
            .args(["--name", name.as_str()])
            .arg("-v")
            .arg(format!("{}:{}", host_dir.display(), container.workdir))
            .args(["-w", container.workdir.as_str()])
            .arg(&container.image)
            .args(["bash", "-c"])
            .arg(shell_join(argv));
        Ok(Invocation {
            command,
            container: Some(name),
        })
    }

    /// Force-removes a named container, stopping it first if it still runs.
    pub fn stop_argv(container: &str) -> Vec<String> {
        vec!["docker".into(), "rm".into(), "-f".into(), container.into()]
    }

    fn execute(
        &self,
        argv: &[String],
        timeout: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput, ToolFailure> {
        let program = argv.first().cloned().unwrap_or_default();
        let Invocation {
            mut command,
            container,
        } = self.command(argv)?;
        debug!(command = %shell_join(argv), container = ?container, "spawning");

        let output =
            match run_to_completion(&mut command, timeout.map(Duration::from_secs), cancel) {
                Ok(output) => output,
                Err(failure) => {
                    if let (Some(name), ToolFailure::TimedOut { .. } | ToolFailure::Cancelled) =
                        (&container, &failure)
                    {
                        stop_container(name);
                    }
                    return Err(failure);
                }
            };
        if !output.status.success() {
            let detail = if output.stderr.trim().is_empty() {
                &output.stdout
            } else {
                &output.stderr
            };
            return Err(ToolFailure::Exit {
                program,
                status: output.status.to_string(),
                detail: excerpt(detail),
            });
        }
        Ok(output)
    }
}

impl Toolchain for CommandToolchain {
    fn name(&self) -> &str {
        if self.config.container.is_some() {
            "container"
        } else {
            "local"
        }
    }

    fn build(&self, source: &Path, cancel: &CancelToken) -> Result<PathBuf, ToolFailure> {
        let binary = source.with_extension("out");
        let argv = self.build_argv(source, &binary);
        let output = self.execute(&argv, self.config.build_timeout_secs, cancel)?;
        info!(
            source = %source.display(),
            elapsed_ms = output.elapsed.as_millis() as u64,
            "candidate compiled"
        );
        Ok(binary)
    }

    fn run(
        &self,
        binary: &Path,
        workload: &Workload,
        cancel: &CancelToken,
    ) -> Result<String, ToolFailure> {
        let argv = self.run_argv(binary, workload);
        let output = self.execute(&argv, self.config.run_timeout_secs, cancel)?;
        info!(
            binary = %binary.display(),
            workload = %workload.name,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "simulation finished"
        );
        Ok(output.stdout)
    }
}

/// Killing the `docker` client leaves its container running.
fn stop_container(name: &str) {
    let argv = CommandToolchain::stop_argv(name);
    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]);
    match run_to_completion(&mut command, Some(CONTAINER_STOP_TIMEOUT), &CancelToken::new()) {
        Ok(output) if output.status.success() => info!(container = name, "container removed"),
        Ok(output) => warn!(
            container = name,
            status = %output.status,
            stderr = %output.stderr.trim(),
            "failed to remove container"
        ),
        Err(e) => warn!(container = name, error = %e, "failed to remove container"),
    }
}

/// A bare file name would be looked up on `PATH`; anchor it to the working
/// directory instead.
fn executable_path(binary: &Path) -> String {
    let shown = binary.display().to_string();
    let bare = binary.is_relative() && binary.parent().map_or(true, |p| p.as_os_str().is_empty());
    if bare {
        format!("./{shown}")
    } else {
        shown
    }
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.len() <= DETAIL_LIMIT {
        return text.to_string();
    }
    let mut cut = text.len() - DETAIL_LIMIT;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    format!("...{}", &text[cut..])
}
