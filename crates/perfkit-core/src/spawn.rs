//! Spawning and terminating a channel's target process.
//!
//! A channel is configured with a [`SpawnInfo`] describing either a pid to
//! attach to or a command line to launch; exactly one of its sources may be
//! responsible for actually launching it
//! ([`Source::needs_spawn`](crate::source::Source::needs_spawn)), otherwise
//! the channel launches it itself via [`spawn_process`]. This mirrors
//! `pkd-channel.c`'s `do_spawn`, including its choice to discard the
//! child's stdout/stderr by default (`G_SPAWN_STDOUT_TO_DEV_NULL |
//! G_SPAWN_STDERR_TO_DEV_NULL`) unless the caller opts back in.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use slog::Logger;

use crate::error::{PerfkitError, Result};

/// Target-process configuration for a channel. Mutable only
/// while the owning channel is `Ready`; frozen once it reaches `Running`.
#[derive(Debug, Clone, Default)]
pub struct SpawnInfo {
    /// Pid to attach to instead of spawning, if already running.
    pub pid: Option<u32>,
    /// Executable to launch if no pid is given and no source spawns it.
    pub target: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    /// If `true`, the child inherits this process's environment in
    /// addition to `env`. If `false`, `env` is the child's entire
    /// environment.
    pub inherit_env: bool,
    /// If `true`, `stop()` sends a termination signal to `pid` when the
    /// process was spawned by this channel (not attached to).
    pub kill_on_stop: bool,
    /// When `false` (the default), the child's stdout and stderr are
    /// redirected to `/dev/null`, matching the original daemon. Set `true`
    /// to let the child inherit this process's stdio instead.
    pub inherit_stdio: bool,
}

impl SpawnInfo {
    pub fn with_target(target: impl Into<String>) -> Self {
        SpawnInfo {
            target: Some(target.into()),
            ..SpawnInfo::default()
        }
    }

    pub fn with_pid(pid: u32) -> Self {
        SpawnInfo {
            pid: Some(pid),
            ..SpawnInfo::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    pub fn kill_on_stop(mut self, kill: bool) -> Self {
        self.kill_on_stop = kill;
        self
    }

    pub fn inherit_stdio(mut self, inherit: bool) -> Self {
        self.inherit_stdio = inherit;
        self
    }
}

/// Launch `info.target`, returning the spawned child so the caller can reap
/// it. Fails with [`PerfkitError::NoTarget`] if no target is configured —
/// callers are expected to have already checked for a spawning source or an
/// attach pid.
pub fn spawn_process(info: &SpawnInfo, log: &Logger) -> Result<std::process::Child> {
    let target = info.target.as_ref().ok_or(PerfkitError::NoTarget)?;

    slog::info!(
        log,
        "spawning process";
        "target" => %target, "args" => ?info.args,
    );

    let mut command = Command::new(target);
    command.args(&info.args);
    if !info.inherit_env {
        command.env_clear();
    }
    command.envs(&info.env);
    if let Some(dir) = &info.working_dir {
        command.current_dir(dir);
    }

    let stdio = |inherit: bool| if inherit { Stdio::inherit() } else { Stdio::null() };
    command.stdout(stdio(info.inherit_stdio));
    command.stderr(stdio(info.inherit_stdio));
    command.stdin(Stdio::null());

    command.spawn().map_err(PerfkitError::SpawnFailed)
}

/// Send a termination signal to a pid the channel spawned, honoring
/// `spawn_info.kill_on_stop`. Best-effort: a pid that has already exited
/// yields an `ESRCH` from `kill(2)`, which we ignore.
#[cfg(unix)]
pub fn terminate(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) {}
