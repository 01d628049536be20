//! The per-target orchestrator. A `Channel` owns an ordered
//! list of sources, fans delivered samples out to its subscriptions, and
//! drives the target-process lifecycle described by its [`SpawnInfo`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use slog::Logger;

use crate::error::{PerfkitError, Result};
use crate::ids::{ChannelId, SourceId};
use crate::manifest::Manifest;
use crate::sample::Sample;
use crate::source::{SharedScheduler, Source};
use crate::spawn::{self, SpawnInfo};
use crate::subscription::Subscription;

/// A channel's position in its state graph. Transitions not
/// drawn in that graph are rejected with [`PerfkitError::InvalidState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Ready,
    Running,
    Muted,
    Stopped,
    Failed,
}

pub struct Channel {
    id: ChannelId,
    state: RwLock<ChannelState>,
    spawn_info: Mutex<SpawnInfo>,
    spawned: AtomicBool,
    exit_status: Arc<Mutex<Option<i32>>>,
    sources: RwLock<Vec<Arc<Source>>>,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    scheduler: Arc<SharedScheduler>,
    log: Logger,
}

impl Channel {
    pub(crate) fn new(
        id: ChannelId,
        spawn_info: SpawnInfo,
        scheduler: Arc<SharedScheduler>,
        log: Logger,
    ) -> Arc<Channel> {
        Arc::new(Channel {
            id,
            state: RwLock::new(ChannelState::Ready),
            spawn_info: Mutex::new(spawn_info),
            spawned: AtomicBool::new(false),
            exit_status: Arc::new(Mutex::new(None)),
            sources: RwLock::new(Vec::new()),
            subscriptions: RwLock::new(Vec::new()),
            scheduler,
            log,
        })
    }

    #[inline]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        *self.state.read().unwrap()
    }

    pub fn spawn_info(&self) -> SpawnInfo {
        self.spawn_info.lock().unwrap().clone()
    }

    pub fn exit_status(&self) -> Option<i32> {
        *self.exit_status.lock().unwrap()
    }

    // -- Target configuration ---------------------------------------------
    //
    // Every field below is mutable only while the channel is `Ready`; once
    // it starts, its `spawn_info` is frozen and a setter rejects with
    // `InvalidState`.

    pub fn get_target(&self) -> Option<String> {
        self.spawn_info.lock().unwrap().target.clone()
    }

    pub fn set_target(&self, target: impl Into<String>) -> Result<()> {
        self.require_state(ChannelState::Ready)?;
        self.spawn_info.lock().unwrap().target = Some(target.into());
        Ok(())
    }

    pub fn get_args(&self) -> Vec<String> {
        self.spawn_info.lock().unwrap().args.clone()
    }

    pub fn set_args(&self, args: Vec<String>) -> Result<()> {
        self.require_state(ChannelState::Ready)?;
        self.spawn_info.lock().unwrap().args = args;
        Ok(())
    }

    pub fn get_env(&self) -> HashMap<String, String> {
        self.spawn_info.lock().unwrap().env.clone()
    }

    pub fn set_env(&self, env: HashMap<String, String>) -> Result<()> {
        self.require_state(ChannelState::Ready)?;
        self.spawn_info.lock().unwrap().env = env;
        Ok(())
    }

    pub fn get_working_dir(&self) -> Option<PathBuf> {
        self.spawn_info.lock().unwrap().working_dir.clone()
    }

    pub fn set_working_dir(&self, dir: impl Into<PathBuf>) -> Result<()> {
        self.require_state(ChannelState::Ready)?;
        self.spawn_info.lock().unwrap().working_dir = Some(dir.into());
        Ok(())
    }

    /// The pid to attach to instead of spawning. Once a target has actually
    /// been spawned or attached this reflects that live pid instead (see
    /// [`adopt_child`](Self::adopt_child)), but the setter below only ever
    /// touches the pre-start attach-pid configuration.
    pub fn get_pid(&self) -> Option<u32> {
        self.spawn_info.lock().unwrap().pid
    }

    pub fn set_pid(&self, pid: u32) -> Result<()> {
        self.require_state(ChannelState::Ready)?;
        self.spawn_info.lock().unwrap().pid = Some(pid);
        Ok(())
    }

    pub fn get_kill_pid(&self) -> bool {
        self.spawn_info.lock().unwrap().kill_on_stop
    }

    pub fn set_kill_pid(&self, kill: bool) -> Result<()> {
        self.require_state(ChannelState::Ready)?;
        self.spawn_info.lock().unwrap().kill_on_stop = kill;
        Ok(())
    }

    pub fn sources(&self) -> Vec<Arc<Source>> {
        self.sources.read().unwrap().clone()
    }

    /// Valid only in `Ready`. Appends to the source list and
    /// sets the source's channel back-reference by construction — callers
    /// build the `Arc<Source>` with this channel's `Weak` already wired in.
    pub fn add_source(&self, source: Arc<Source>) -> Result<()> {
        self.require_state(ChannelState::Ready)?;
        self.sources.write().unwrap().push(source);
        Ok(())
    }

    /// Detach a source. Callers are
    /// responsible for having already stopped it and for refusing this
    /// while the channel is `Running`.
    pub(crate) fn remove_source(&self, id: SourceId) {
        self.sources.write().unwrap().retain(|s| s.id() != id);
    }

    pub(crate) fn add_subscription(&self, subscription: Arc<Subscription>) {
        self.subscriptions.write().unwrap().push(subscription);
    }

    pub(crate) fn remove_subscription(&self, id: crate::ids::SubscriptionId) {
        self.subscriptions.write().unwrap().retain(|s| s.id() != id);
    }

    /// Records the pid of a child this channel just spawned. Only ever
    /// called by a spawning source or by `start` itself, both of which run
    /// before the state transitions away from `Ready`.
    fn record_pid(&self, pid: u32) {
        self.spawn_info.lock().unwrap().pid = Some(pid);
    }

    pub(crate) fn adopt_child(&self, mut child: std::process::Child) {
        let pid = child.id();
        self.record_pid(pid);
        self.spawned.store(true, Ordering::SeqCst);

        let exit_status = Arc::clone(&self.exit_status);
        let log = self.log.clone();
        thread::spawn(move || match child.wait() {
            Ok(status) => {
                *exit_status.lock().unwrap() = Some(status.code().unwrap_or(-1));
            }
            Err(err) => {
                slog::warn!(log, "failed to reap spawned child"; "error" => %err);
            }
        });
    }

    /// Scans sources for a spawner, delegates or self-spawns, then starts
    /// every source in order.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        self.require_state(ChannelState::Ready)?;

        if let Err(err) = self.acquire_target() {
            *self.state.write().unwrap() = ChannelState::Failed;
            return Err(err);
        }

        for source in self.sources.read().unwrap().iter() {
            if let Err(err) = source.start(&self.scheduler) {
                slog::error!(self.log, "source failed to start"; "source_id" => source.id().get(), "error" => %err);
                *self.state.write().unwrap() = ChannelState::Failed;
                return Err(err);
            }
        }

        *self.state.write().unwrap() = ChannelState::Running;
        Ok(())
    }

    /// Attach to an already-running process, self-spawn one, or delegate to
    /// a spawning source. Exactly one source
    /// may declare `needs_spawn`; the first one found wins.
    fn acquire_target(self: &Arc<Self>) -> Result<()> {
        let spawner = self
            .sources
            .read()
            .unwrap()
            .iter()
            .find(|s| s.needs_spawn())
            .cloned();

        if let Some(spawner) = spawner {
            let info = self.spawn_info();
            return spawner.spawn(&info);
        }

        let info = self.spawn_info();
        if info.pid.is_some() {
            return Ok(());
        }
        if info.target.is_some() {
            let child = spawn::spawn_process(&info, &self.log)?;
            self.adopt_child(child);
            return Ok(());
        }

        Err(PerfkitError::NoTarget)
    }

    /// Valid in `Running` only.
    pub fn mute(&self) -> Result<()> {
        self.require_state(ChannelState::Running)?;
        *self.state.write().unwrap() = ChannelState::Muted;
        Ok(())
    }

    /// Valid in `Muted` only.
    pub fn unmute(&self) -> Result<()> {
        self.require_state(ChannelState::Muted)?;
        *self.state.write().unwrap() = ChannelState::Running;
        Ok(())
    }

    /// Valid in `{Ready, Running, Muted}`. Stops
    /// every source best-effort — a source's own stop does not fail, so
    /// there is nothing to isolate here beyond the join itself — and sends
    /// a termination signal to the target if this channel is responsible
    /// for it and `kill_on_stop` was requested. Terminal.
    pub fn stop(self: &Arc<Self>) {
        let current = self.state();
        if !matches!(
            current,
            ChannelState::Ready | ChannelState::Running | ChannelState::Muted
        ) {
            slog::warn!(self.log, "stop() called outside a stoppable state"; "state" => ?current);
            return;
        }

        for source in self.sources.read().unwrap().iter() {
            source.stop(&self.scheduler);
        }

        let info = self.spawn_info();
        if info.kill_on_stop && self.spawned.load(Ordering::SeqCst) {
            if let Some(pid) = info.pid {
                spawn::terminate(pid);
            }
        }

        *self.state.write().unwrap() = ChannelState::Stopped;
    }

    /// A source calls this with every sample it produces. Stamps
    /// `source_id` and fans out to every subscription
    /// under a read lock; per-subscription failures are isolated.
    pub fn deliver(&self, source_id: SourceId, sample: Sample) {
        if self.state() != ChannelState::Running {
            return;
        }
        let sample = sample.restamped(source_id);
        for subscription in self.subscriptions.read().unwrap().iter() {
            subscription.deliver_sample(sample.clone());
        }
    }

    /// A source calls this once its manifest changes. Channel-level mute
    /// suppresses this the same way it
    /// suppresses sample delivery, since a manifest arriving while muted
    /// would otherwise describe samples the subscriber never saw.
    pub fn publish_manifest(&self, source_id: SourceId, manifest: Arc<Manifest>) {
        if self.state() != ChannelState::Running {
            return;
        }
        debug_assert_eq!(manifest.source_id(), source_id);
        for subscription in self.subscriptions.read().unwrap().iter() {
            subscription.deliver_manifest(Arc::clone(&manifest));
        }
    }

    fn require_state(&self, expected: ChannelState) -> Result<()> {
        let current = self.state();
        if current == expected {
            Ok(())
        } else {
            Err(PerfkitError::InvalidState { current })
        }
    }
}
