//! Pipelines: several commands chained through anonymous pipes.

use std::ops::BitOr;
use std::os::fd::{AsRawFd, OwnedFd};
use std::time::Duration;

use tracing::warn;

use crate::backend::{default_backend, Spawned};
use crate::command::Command;
use crate::drain::drain_pipes;
use crate::error::{Error, ErrorKind, Result};
use crate::fd::create_pipe;
use crate::lowering::{lower_command, lower_pipeline, SpawnMode};
use crate::pipe::{PipeReader, PipeWriter};
use crate::status::{ExitStatus, Output};
use crate::stdio::Stdio;

/// Per-stage and aggregate exit statuses of a finished pipeline.
#[derive(Debug)]
pub struct PipelineStatus {
    /// One status per stage, in pipeline order.
    pub stages: Vec<ExitStatus>,
    /// Aggregate status under the pipefail rule.
    pub aggregate: ExitStatus,
}

/// A chain of commands connected stdout-to-stdin, built with `|`.
///
/// # Examples
///
/// ```no_run
/// use procpipe::Command;
///
/// # fn main() -> procpipe::Result<()> {
/// let output = (Command::new("echo").arg("hello") | Command::new("tr").args(["a-z", "A-Z"]))
///     .output()?;
/// assert_eq!(output.stdout, b"HELLO\n");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub(crate) stages: Vec<Command>,
    pub(crate) pipefail: bool,
    pub(crate) new_pgrp: bool,
    pub(crate) stdin: Option<Stdio>,
    pub(crate) stdout: Option<Stdio>,
    pub(crate) stderr: Option<Stdio>,
}

impl BitOr<Command> for Command {
    type Output = Pipeline;

    fn bitor(self, rhs: Command) -> Pipeline {
        Pipeline {
            stages: vec![self, rhs],
            ..Pipeline::default()
        }
    }
}

impl BitOr<Command> for Pipeline {
    type Output = Pipeline;

    fn bitor(mut self, rhs: Command) -> Pipeline {
        self.stages.push(rhs);
        self
    }
}

impl Pipeline {
    /// With pipefail on, the aggregate status is the first failing stage's
    /// status; off, it is always the tail stage's.
    pub fn pipefail(mut self, enabled: bool) -> Self {
        self.pipefail = enabled;
        self
    }

    /// Run the whole pipeline in one new process group, led by the first
    /// stage. Signals sent through the handle then reach every stage.
    pub fn new_process_group(mut self, enabled: bool) -> Self {
        self.new_pgrp = enabled;
        self
    }

    /// Configure stdin of the first stage.
    pub fn stdin(mut self, stdio: Stdio) -> Self {
        self.stdin = Some(stdio);
        self
    }

    /// Configure stdout of the last stage.
    pub fn stdout(mut self, stdio: Stdio) -> Self {
        self.stdout = Some(stdio);
        self
    }

    /// Configure stderr of the last stage.
    pub fn stderr(mut self, stdio: Stdio) -> Self {
        self.stderr = Some(stdio);
        self
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// True when the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Spawns every stage without waiting.
    pub fn spawn(&self) -> Result<PipelineChild> {
        spawn_pipeline(self, SpawnMode::Spawn)
    }

    /// Spawns, waits for every stage, and returns the aggregate status.
    pub fn status(&self) -> Result<ExitStatus> {
        let mut child = self.spawn()?;
        Ok(child.wait()?.aggregate)
    }

    /// Spawns, captures the tail stage's stdout and stderr, and waits.
    pub fn output(&self) -> Result<Output> {
        let mut child = spawn_pipeline(self, SpawnMode::Output)?;

        let mut stdout = child.take_stdout();
        let mut stderr = child.take_stderr();
        let drained = drain_pipes(stdout.as_mut(), stderr.as_mut())?;

        let status = child.wait()?;
        Ok(Output {
            status: status.aggregate,
            stdout: drained.stdout,
            stderr: drained.stderr,
        })
    }
}

fn spawn_pipeline(pipeline: &Pipeline, mode: SpawnMode) -> Result<PipelineChild> {
    let pipeline_spec = lower_pipeline(pipeline, mode)?;
    let stage_count = pipeline_spec.stages.len();
    let backend = default_backend();

    // Inter-stage pipes; the parent's copies close when this vector drops,
    // whether the spawn loop finishes or bails.
    let mut pipes: Vec<(OwnedFd, OwnedFd)> = Vec::with_capacity(stage_count.saturating_sub(1));
    for _ in 1..stage_count {
        pipes.push(create_pipe()?);
    }

    let mut spawned: Vec<Spawned> = Vec::with_capacity(stage_count);
    let mut pipeline_pgid = None;

    for (index, stage) in pipeline_spec.stages.iter().enumerate() {
        let mut overrides = stage.overrides.clone();
        if stage.stdin_from_prev {
            overrides.stdin = Some(Stdio::fd(pipes[index - 1].0.as_raw_fd()));
        }
        if stage.stdout_to_next {
            overrides.stdout = Some(Stdio::fd(pipes[index].1.as_raw_fd()));
        }

        let spec = lower_command(stage.command, stage.mode, Some(&overrides)).and_then(|mut spec| {
            if pipeline_spec.new_process_group {
                match pipeline_pgid {
                    None => spec.opts.new_process_group = true,
                    Some(pgid) => spec.process_group = Some(pgid),
                }
            }
            backend.spawn(&spec)
        });

        match spec {
            Ok(stage_spawned) => {
                if pipeline_spec.new_process_group && pipeline_pgid.is_none() {
                    pipeline_pgid = stage_spawned.pgid;
                }
                spawned.push(stage_spawned);
            }
            Err(err) => {
                // Kill and reap everything already running so a failed spawn
                // leaves no survivors reading a dead pipe.
                for mut stage_spawned in spawned {
                    if let Err(cleanup_err) = backend.kill(&stage_spawned) {
                        warn!(
                            pid = stage_spawned.pid,
                            error = %cleanup_err,
                            "failed to kill pipeline stage during cleanup"
                        );
                    }
                    let _ = backend.wait(&mut stage_spawned, None, Duration::ZERO);
                }
                return Err(err);
            }
        }
    }

    let mut stdin = None;
    let mut stdout = None;
    let mut stderr = None;
    if let Some(first) = spawned.first_mut() {
        stdin = first.stdin.take().map(PipeWriter::new);
    }
    if let Some(last) = spawned.last_mut() {
        stdout = last.stdout.take().map(PipeReader::new);
        stderr = last.stderr.take().map(PipeReader::new);
    }

    Ok(PipelineChild {
        spawned,
        pipefail: pipeline_spec.pipefail,
        new_process_group: pipeline_spec.new_process_group,
        stdin,
        stdout,
        stderr,
    })
}

/// A running pipeline: every stage's child plus the outer pipe endpoints.
#[derive(Debug)]
pub struct PipelineChild {
    spawned: Vec<Spawned>,
    pipefail: bool,
    new_process_group: bool,
    stdin: Option<PipeWriter>,
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
}

impl PipelineChild {
    /// Takes the write end of the head stage's stdin pipe, at most once.
    pub fn take_stdin(&mut self) -> Option<PipeWriter> {
        self.stdin.take()
    }

    /// Takes the read end of the tail stage's stdout pipe, at most once.
    pub fn take_stdout(&mut self) -> Option<PipeReader> {
        self.stdout.take()
    }

    /// Takes the read end of the tail stage's stderr pipe, at most once.
    pub fn take_stderr(&mut self) -> Option<PipeReader> {
        self.stderr.take()
    }

    /// Waits for every stage in pipeline order and aggregates the statuses.
    pub fn wait(&mut self) -> Result<PipelineStatus> {
        let mut stages = Vec::with_capacity(self.spawned.len());
        for spawned in &mut self.spawned {
            stages.push(default_backend().wait(spawned, None, Duration::ZERO)?);
        }

        let tail = match stages.last() {
            Some(tail) => *tail,
            None => return Err(Error::new(ErrorKind::InvalidPipeline, "wait")),
        };

        let aggregate = if self.pipefail {
            stages.iter().copied().find(|status| !status.success()).unwrap_or(tail)
        } else {
            tail
        };

        Ok(PipelineStatus { stages, aggregate })
    }

    /// Sends SIGTERM to the group leader in group mode, or to every stage.
    pub fn terminate(&self) -> Result<()> {
        self.signal_all(|spawned| default_backend().terminate(spawned))
    }

    /// Sends SIGKILL to the group leader in group mode, or to every stage.
    pub fn kill(&self) -> Result<()> {
        self.signal_all(|spawned| default_backend().kill(spawned))
    }

    fn signal_all(&self, send: impl Fn(&Spawned) -> Result<()>) -> Result<()> {
        if self.new_process_group {
            if let Some(leader) = self.spawned.first() {
                return send(leader);
            }
        }
        for spawned in &self.spawned {
            send(spawned)?;
        }
        Ok(())
    }
}
