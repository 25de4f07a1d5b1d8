//! Lowering from user-facing builders to fully-resolved spawn specs.
//!
//! Everything here is checked before any syscall runs, so configuration
//! mistakes surface as typed errors rather than half-spawned children. The
//! only ambient input is the process environment, read once per lowering.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::os::fd::RawFd;
use std::path::PathBuf;

use crate::command::{Command, SpawnOptions};
use crate::error::{Error, ErrorKind, Result};
use crate::pipeline::Pipeline;
use crate::stdio::{FilePerms, OpenMode, Stdio, StdioInner};

/// How the caller intends to consume the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpawnMode {
    /// Plain spawn; unset streams inherit.
    Spawn,
    /// Output capture; unset stdout/stderr default to pipes.
    Output,
}

/// Fully-resolved stdio wiring for one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StdioSpec {
    Inherit,
    Null,
    Piped,
    Fd(RawFd),
    File {
        path: PathBuf,
        mode: OpenMode,
        perms: Option<FilePerms>,
    },
    /// Stderr only: duplicate whatever stdout resolves to.
    DupStdout,
}

/// Resolved description of one child process, ready for the backend.
#[derive(Debug, Clone)]
pub(crate) struct SpawnSpec {
    pub(crate) argv: Vec<OsString>,
    pub(crate) cwd: Option<PathBuf>,
    /// `KEY=VALUE` entries, sorted by byte order for determinism.
    pub(crate) envp: Vec<OsString>,
    pub(crate) stdin: StdioSpec,
    pub(crate) stdout: StdioSpec,
    pub(crate) stderr: StdioSpec,
    pub(crate) opts: SpawnOptions,
    /// Join an existing process group instead of creating one.
    pub(crate) process_group: Option<libc::pid_t>,
}

/// Per-stream overrides injected by the pipeline wiring.
#[derive(Debug, Clone, Default)]
pub(crate) struct StdioOverride {
    pub(crate) stdin: Option<Stdio>,
    pub(crate) stdout: Option<Stdio>,
    pub(crate) stderr: Option<Stdio>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum StreamTarget {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamTarget {
    fn default_open_mode(self) -> OpenMode {
        match self {
            StreamTarget::Stdin => OpenMode::Read,
            StreamTarget::Stdout | StreamTarget::Stderr => OpenMode::WriteTruncate,
        }
    }
}

fn mode_is_readable(mode: OpenMode) -> bool {
    matches!(mode, OpenMode::Read | OpenMode::ReadWrite)
}

fn mode_is_writable(mode: OpenMode) -> bool {
    matches!(
        mode,
        OpenMode::WriteTruncate | OpenMode::WriteAppend | OpenMode::ReadWrite
    )
}

fn resolve_stdio(
    value: Option<&Stdio>,
    piped_default: bool,
    target: StreamTarget,
) -> Result<StdioSpec> {
    let value = match value {
        Some(value) => value,
        None => {
            return Ok(if piped_default {
                StdioSpec::Piped
            } else {
                StdioSpec::Inherit
            });
        }
    };

    match &value.0 {
        StdioInner::Inherit => Ok(StdioSpec::Inherit),
        StdioInner::Null => Ok(StdioSpec::Null),
        StdioInner::Piped => Ok(StdioSpec::Piped),
        StdioInner::Fd(fd) => {
            if *fd < 0 {
                return Err(Error::new(ErrorKind::InvalidStdio, "negative fd"));
            }
            Ok(StdioSpec::Fd(*fd))
        }
        StdioInner::File(file) => {
            let mode = file.mode.unwrap_or_else(|| target.default_open_mode());
            let direction_ok = match target {
                StreamTarget::Stdin => mode_is_readable(mode),
                StreamTarget::Stdout | StreamTarget::Stderr => mode_is_writable(mode),
            };
            if !direction_ok {
                return Err(Error::new(ErrorKind::InvalidStdio, "file mode"));
            }
            Ok(StdioSpec::File {
                path: file.path.clone(),
                mode,
                perms: file.perms,
            })
        }
    }
}

fn join_key_value(key: &OsStr, value: &OsStr) -> OsString {
    let mut entry = OsString::with_capacity(key.len() + 1 + value.len());
    entry.push(key);
    entry.push("=");
    entry.push(value);
    entry
}

/// Lower a command into a [`SpawnSpec`].
///
/// `overrides` is how the pipeline injects inter-stage descriptors and
/// end-cap selections without touching the user's command.
pub(crate) fn lower_command(
    cmd: &Command,
    mode: SpawnMode,
    overrides: Option<&StdioOverride>,
) -> Result<SpawnSpec> {
    if cmd.argv.is_empty() {
        return Err(Error::new(ErrorKind::EmptyArgv, "argv"));
    }

    let mut env_map: BTreeMap<OsString, OsString> = BTreeMap::new();
    if cmd.inherit_env {
        env_map.extend(std::env::vars_os());
    }
    for (key, value) in &cmd.env_delta {
        match value {
            Some(value) => {
                env_map.insert(key.clone(), value.clone());
            }
            None => {
                env_map.remove(key);
            }
        }
    }
    let envp = env_map
        .iter()
        .map(|(key, value)| join_key_value(key, value))
        .collect();

    let piped_default = mode == SpawnMode::Output;

    let stdin_sel = overrides
        .and_then(|o| o.stdin.as_ref())
        .or(cmd.stdin.as_ref());
    let stdout_sel = overrides
        .and_then(|o| o.stdout.as_ref())
        .or(cmd.stdout.as_ref());
    let stderr_sel = overrides
        .and_then(|o| o.stderr.as_ref())
        .or(cmd.stderr.as_ref());

    let stdin = resolve_stdio(stdin_sel, false, StreamTarget::Stdin)?;
    let stdout = resolve_stdio(stdout_sel, piped_default, StreamTarget::Stdout)?;
    let mut stderr = resolve_stdio(stderr_sel, piped_default, StreamTarget::Stderr)?;

    if cmd.opts.merge_stderr_into_stdout {
        stderr = StdioSpec::DupStdout;
    }

    Ok(SpawnSpec {
        argv: cmd.argv.clone(),
        cwd: cmd.cwd.clone(),
        envp,
        stdin,
        stdout,
        stderr,
        opts: cmd.opts,
        process_group: None,
    })
}

/// One stage of a lowered pipeline.
#[derive(Debug)]
pub(crate) struct PipelineStageSpec<'a> {
    pub(crate) command: &'a Command,
    pub(crate) mode: SpawnMode,
    pub(crate) stdin_from_prev: bool,
    pub(crate) stdout_to_next: bool,
    pub(crate) overrides: StdioOverride,
}

/// Lowered pipeline, stages in execution order.
#[derive(Debug)]
pub(crate) struct PipelineSpec<'a> {
    pub(crate) stages: Vec<PipelineStageSpec<'a>>,
    pub(crate) pipefail: bool,
    pub(crate) new_process_group: bool,
}

/// Lower a pipeline: per-stage modes, positional wiring flags, and the
/// head/tail user overrides.
pub(crate) fn lower_pipeline(pipeline: &Pipeline, mode: SpawnMode) -> Result<PipelineSpec<'_>> {
    let stages = &pipeline.stages;
    if stages.is_empty() {
        return Err(Error::new(ErrorKind::InvalidPipeline, "no stages"));
    }

    let count = stages.len();
    let mut lowered = Vec::with_capacity(count);
    for (index, command) in stages.iter().enumerate() {
        let is_head = index == 0;
        let is_tail = index + 1 == count;

        let mut overrides = StdioOverride::default();
        if is_head {
            overrides.stdin = pipeline.stdin.clone();
        }
        if is_tail {
            overrides.stdout = pipeline.stdout.clone();
            overrides.stderr = pipeline.stderr.clone();
        }

        lowered.push(PipelineStageSpec {
            command,
            mode: if is_tail { mode } else { SpawnMode::Spawn },
            stdin_from_prev: !is_head,
            stdout_to_next: !is_tail,
            overrides,
        });
    }

    Ok(PipelineSpec {
        stages: lowered,
        pipefail: pipeline.pipefail,
        new_process_group: pipeline.new_pgrp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_contains(envp: &[OsString], key: &str, value: &str) -> bool {
        let needle = OsString::from(format!("{key}={value}"));
        envp.iter().any(|entry| *entry == needle)
    }

    #[test]
    fn empty_argv_is_an_error() {
        let mut cmd = Command::new("placeholder");
        cmd.argv.clear();
        let err = lower_command(&cmd, SpawnMode::Spawn, None).expect_err("empty argv");
        assert_eq!(err.kind(), ErrorKind::EmptyArgv);
    }

    #[test]
    fn output_mode_defaults_to_piped() {
        let spec = lower_command(&Command::new("echo"), SpawnMode::Output, None).expect("spec");
        assert_eq!(spec.stdout, StdioSpec::Piped);
        assert_eq!(spec.stderr, StdioSpec::Piped);
        assert_eq!(spec.stdin, StdioSpec::Inherit);
    }

    #[test]
    fn spawn_mode_defaults_to_inherit() {
        let spec = lower_command(&Command::new("echo"), SpawnMode::Spawn, None).expect("spec");
        assert_eq!(spec.stdout, StdioSpec::Inherit);
        assert_eq!(spec.stderr, StdioSpec::Inherit);
    }

    #[test]
    fn merge_replaces_stderr_with_dup_stdout() {
        let cmd = Command::new("echo").options(SpawnOptions {
            merge_stderr_into_stdout: true,
            ..SpawnOptions::default()
        });
        let spec = lower_command(&cmd, SpawnMode::Output, None).expect("spec");
        assert_eq!(spec.stderr, StdioSpec::DupStdout);
        assert_eq!(spec.stdout, StdioSpec::Piped);
    }

    #[test]
    fn file_defaults_follow_stream_direction() {
        let cmd = Command::new("echo")
            .stdin(Stdio::file("/tmp/in"))
            .stdout(Stdio::file("/tmp/out"))
            .stderr(Stdio::file("/tmp/err"));
        let spec = lower_command(&cmd, SpawnMode::Spawn, None).expect("spec");
        assert!(matches!(spec.stdin, StdioSpec::File { mode: OpenMode::Read, .. }));
        assert!(matches!(
            spec.stdout,
            StdioSpec::File { mode: OpenMode::WriteTruncate, .. }
        ));
        assert!(matches!(
            spec.stderr,
            StdioSpec::File { mode: OpenMode::WriteTruncate, .. }
        ));
    }

    #[test]
    fn stdin_file_must_be_readable() {
        let cmd = Command::new("echo")
            .stdin(crate::FileSpec::new("/tmp/in").mode(OpenMode::WriteAppend).into());
        let err = lower_command(&cmd, SpawnMode::Spawn, None).expect_err("mode");
        assert_eq!(err.kind(), ErrorKind::InvalidStdio);
    }

    #[test]
    fn stdout_file_must_be_writable() {
        let cmd =
            Command::new("echo").stdout(crate::FileSpec::new("/tmp/out").mode(OpenMode::Read).into());
        let err = lower_command(&cmd, SpawnMode::Spawn, None).expect_err("mode");
        assert_eq!(err.kind(), ErrorKind::InvalidStdio);
    }

    #[test]
    fn read_write_is_valid_in_both_directions() {
        let cmd = Command::new("echo")
            .stdin(crate::FileSpec::new("/tmp/in").mode(OpenMode::ReadWrite).into())
            .stdout(crate::FileSpec::new("/tmp/out").mode(OpenMode::ReadWrite).into());
        let spec = lower_command(&cmd, SpawnMode::Spawn, None).expect("spec");
        assert!(matches!(spec.stdin, StdioSpec::File { mode: OpenMode::ReadWrite, .. }));
        assert!(matches!(spec.stdout, StdioSpec::File { mode: OpenMode::ReadWrite, .. }));
    }

    #[test]
    fn negative_fd_is_rejected() {
        let cmd = Command::new("echo").stdin(Stdio::fd(-1));
        let err = lower_command(&cmd, SpawnMode::Spawn, None).expect_err("fd");
        assert_eq!(err.kind(), ErrorKind::InvalidStdio);
    }

    #[test]
    fn env_clear_then_set_overrides_inherited_value() {
        std::env::set_var("PROCPIPE_TEST_ENV", "one");
        let cmd = Command::new("echo").env_clear().env("PROCPIPE_TEST_ENV", "two");
        let spec = lower_command(&cmd, SpawnMode::Spawn, None).expect("spec");
        assert!(env_contains(&spec.envp, "PROCPIPE_TEST_ENV", "two"));
        assert!(!env_contains(&spec.envp, "PROCPIPE_TEST_ENV", "one"));
    }

    #[test]
    fn env_remove_drops_inherited_key() {
        std::env::set_var("PROCPIPE_TEST_ENV_REMOVE", "one");
        let cmd = Command::new("echo").env_remove("PROCPIPE_TEST_ENV_REMOVE");
        let spec = lower_command(&cmd, SpawnMode::Spawn, None).expect("spec");
        assert!(!env_contains(&spec.envp, "PROCPIPE_TEST_ENV_REMOVE", "one"));
    }

    #[test]
    fn envp_is_sorted() {
        let cmd = Command::new("echo")
            .env_clear()
            .env("ZED", "1")
            .env("ALPHA", "2")
            .env("MID", "3");
        let spec = lower_command(&cmd, SpawnMode::Spawn, None).expect("spec");
        let mut sorted = spec.envp.clone();
        sorted.sort();
        assert_eq!(spec.envp, sorted);
    }

    #[test]
    fn lowering_is_repeatable() {
        let cmd = Command::new("echo").arg("x").env_clear().env("A", "1");
        let first = lower_command(&cmd, SpawnMode::Output, None).expect("first");
        let second = lower_command(&cmd, SpawnMode::Output, None).expect("second");
        assert_eq!(first.argv, second.argv);
        assert_eq!(first.envp, second.envp);
        assert_eq!(first.stdout, second.stdout);
    }

    #[test]
    fn overrides_win_over_command_selections() {
        let cmd = Command::new("echo").stdin(Stdio::null());
        let overrides = StdioOverride {
            stdin: Some(Stdio::fd(7)),
            ..StdioOverride::default()
        };
        let spec = lower_command(&cmd, SpawnMode::Spawn, Some(&overrides)).expect("spec");
        assert_eq!(spec.stdin, StdioSpec::Fd(7));
    }

    #[test]
    fn empty_pipeline_is_an_error() {
        let pipeline = Pipeline::default();
        let err = lower_pipeline(&pipeline, SpawnMode::Spawn).expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::InvalidPipeline);
    }

    #[test]
    fn pipeline_wiring_and_modes() {
        let pipeline = Command::new("echo") | Command::new("cat");
        let spec = lower_pipeline(&pipeline, SpawnMode::Output).expect("spec");
        assert_eq!(spec.stages.len(), 2);

        let head = &spec.stages[0];
        let tail = &spec.stages[1];
        assert!(!head.stdin_from_prev);
        assert!(head.stdout_to_next);
        assert!(tail.stdin_from_prev);
        assert!(!tail.stdout_to_next);
        assert_eq!(head.mode, SpawnMode::Spawn);
        assert_eq!(tail.mode, SpawnMode::Output);
    }

    #[test]
    fn pipeline_overrides_only_touch_the_ends() {
        let pipeline = (Command::new("echo") | Command::new("cat"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let spec = lower_pipeline(&pipeline, SpawnMode::Spawn).expect("spec");

        let head = &spec.stages[0];
        let tail = &spec.stages[1];
        assert!(head.overrides.stdin.is_some());
        assert!(head.overrides.stdout.is_none());
        assert!(head.overrides.stderr.is_none());
        assert!(tail.overrides.stdin.is_none());
        assert!(tail.overrides.stdout.is_some());
        assert!(tail.overrides.stderr.is_some());
    }
}
