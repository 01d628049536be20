//! Producers of manifests and samples. An abstract `Source` capability is
//! separated from the concrete, timer-driven `SimpleSource` variant — one
//! [`Source`] struct holding the
//! fields every kind needs (id, channel back-reference, current manifest)
//! plus a [`SourceKind`] enum for the concrete, variant-specific state —
//! rather than an object-safe trait hierarchy, since the scheduling state
//! below is internal and never needs to be implemented by a caller.

use std::collections::BinaryHeap;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::thread;
use std::time::Duration;

use slog::Logger;

use crate::channel::Channel;
use crate::clock::MonotonicInstant;
use crate::error::Result;
use crate::ids::SourceId;
use crate::manifest::Manifest;
use crate::spawn::SpawnInfo;

/// A callback invoked once per scheduling tick. Boxed rather than a bare
/// `fn` pointer`) so test code and
/// real sources alike can close over state — a bare fn pointer cannot
/// capture the channel a test wants to assert against.
pub type SourceCallback = Arc<dyn Fn(&Source) + Send + Sync>;
pub type SpawnCallback = Arc<dyn Fn(&Source, &SpawnInfo) + Send + Sync>;

/// Producer of manifests and samples, optionally responsible for spawning
/// the channel's target process.
pub struct Source {
    id: SourceId,
    channel: Weak<Channel>,
    manifest: RwLock<Option<Arc<Manifest>>>,
    kind: SourceKind,
}

/// Concrete source variants. The core ships exactly one — [`SimpleSource`]
/// — but the shape leaves room for others (e.g. a spawn-wrapping tracer)
/// without touching the `Source` struct.
pub enum SourceKind {
    Simple(SimpleSource),
}

pub struct SimpleSource {
    frequency: Duration,
    use_dedicated_thread: bool,
    callback: SourceCallback,
    spawn_callback: Option<SpawnCallback>,
    running: AtomicBool,
    dedicated: Mutex<Option<DedicatedHandle>>,
    wake: Arc<(Mutex<WakeState>, Condvar)>,
    log: Logger,
}

struct DedicatedHandle {
    thread: thread::JoinHandle<()>,
}

struct WakeState {
    next_deadline: MonotonicInstant,
    stopping: bool,
}

impl Source {
    pub fn new_simple(
        id: SourceId,
        channel: Weak<Channel>,
        frequency: Duration,
        use_dedicated_thread: bool,
        callback: SourceCallback,
        spawn_callback: Option<SpawnCallback>,
        log: Logger,
    ) -> Arc<Source> {
        Arc::new(Source {
            id,
            channel,
            manifest: RwLock::new(None),
            kind: SourceKind::Simple(SimpleSource {
                frequency,
                use_dedicated_thread,
                callback,
                spawn_callback,
                running: AtomicBool::new(false),
                dedicated: Mutex::new(None),
                wake: Arc::new((
                    Mutex::new(WakeState {
                        next_deadline: MonotonicInstant::now(),
                        stopping: false,
                    }),
                    Condvar::new(),
                )),
                log,
            }),
        })
    }

    #[inline]
    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest.read().unwrap().clone()
    }

    /// The channel this source is attached to, if it still exists.
    pub fn channel(&self) -> Option<Arc<Channel>> {
        self.channel.upgrade()
    }

    /// Does this source require it be the one that spawns the target
    /// process?
    pub fn needs_spawn(&self) -> bool {
        match &self.kind {
            SourceKind::Simple(s) => s.spawn_callback.is_some(),
        }
    }

    /// Perform the spawn and hand the child off to the channel. Only
    /// called on the source for which [`needs_spawn`](Self::needs_spawn)
    /// is true.
    pub fn spawn(self: &Arc<Self>, info: &SpawnInfo) -> Result<()> {
        let simple = self.simple();
        let child = crate::spawn::spawn_process(info, &simple.log)?;
        if let Some(channel) = self.channel.upgrade() {
            channel.adopt_child(child);
        }
        if let Some(cb) = &simple.spawn_callback {
            cb(self, info);
        }
        Ok(())
    }

    /// Start producing: registers with the shared scheduler, or spins up a
    /// dedicated thread, depending on the source's scheduling mode.
    pub fn start(self: &Arc<Self>, scheduler: &Arc<SharedScheduler>) -> Result<()> {
        let simple = self.simple();
        simple.running.store(true, Ordering::SeqCst);

        let deadline = MonotonicInstant::now() + simple.frequency;
        {
            let mut wake = simple.wake.0.lock().unwrap();
            wake.next_deadline = deadline;
            wake.stopping = false;
        }

        if simple.use_dedicated_thread {
            match spawn_dedicated(Arc::clone(self)) {
                Ok(handle) => {
                    *simple.dedicated.lock().unwrap() = Some(handle);
                    return Ok(());
                }
                Err(err) => {
                    slog::warn!(
                        simple.log,
                        "dedicated thread creation failed, falling back to shared scheduler";
                        "source_id" => self.id.get(), "error" => %err,
                    );
                }
            }
        }

        scheduler.register(Arc::clone(self), deadline);
        Ok(())
    }

    /// Stop producing. Cancels any pending deadline wait by signalling the
    /// source's condition variable with `running = false`.
    pub fn stop(self: &Arc<Self>, scheduler: &Arc<SharedScheduler>) {
        let simple = self.simple();
        simple.running.store(false, Ordering::SeqCst);

        {
            let (mutex, condvar) = &*simple.wake;
            let mut wake = mutex.lock().unwrap();
            wake.stopping = true;
            condvar.notify_all();
        }

        if let Some(handle) = simple.dedicated.lock().unwrap().take() {
            let _ = handle.thread.join();
        } else {
            scheduler.unregister(self.id);
        }
    }

    /// Sources keep producing while their channel is muted — the mute
    /// boundary is enforced at delivery time in
    /// `Channel::deliver`, not here. These hooks exist for parity with the
    /// abstract contract and for variants where muting at the source would
    /// make sense (e.g. to pause an expensive read).
    pub fn mute(&self) {}
    pub fn unmute(&self) {}

    fn is_running(&self) -> bool {
        let simple = self.simple();
        simple.running.load(Ordering::SeqCst)
    }

    fn frequency(&self) -> Duration {
        let simple = self.simple();
        simple.frequency
    }

    fn invoke_callback(self: &Arc<Self>) {
        let simple = self.simple();
        let callback = Arc::clone(&simple.callback);
        callback(self);
    }

    /// Route a produced sample to the owning channel, stamping it with
    /// this source's id on the way.
    pub fn emit_sample(&self, data: Vec<u8>) {
        if let Some(channel) = self.channel.upgrade() {
            let sample = crate::sample::Sample::new(self.id, data);
            channel.deliver(self.id, sample);
        }
    }

    /// Publish a manifest, both caching it locally and routing it to the
    /// owning channel.
    pub fn publish_manifest(&self, manifest: Arc<Manifest>) {
        *self.manifest.write().unwrap() = Some(Arc::clone(&manifest));
        if let Some(channel) = self.channel.upgrade() {
            channel.publish_manifest(self.id, manifest);
        }
    }

    fn simple(&self) -> &SimpleSource {
        match &self.kind {
            SourceKind::Simple(s) => s,
        }
    }
}

/// The per-source deadline wait used by both the dedicated thread below and
/// (conceptually — the shared engine inlines the same elapsed/not-elapsed
/// check across many sources) the shared scheduler's tick. Advances the
/// deadline *before* invoking the callback so callback runtime never
/// accumulates as drift.
fn spawn_dedicated(source: Arc<Source>) -> std::io::Result<DedicatedHandle> {
    let thread = thread::Builder::new()
        .name(format!("perfkit-source-{}", source.id().get()))
        .spawn(move || run_dedicated(source))?;
    Ok(DedicatedHandle { thread })
}

fn run_dedicated(source: Arc<Source>) {
    let simple = source.simple();
    let (mutex, condvar) = &*simple.wake;

    loop {
        {
            let mut guard = mutex.lock().unwrap();
            loop {
                if guard.stopping {
                    return;
                }
                let remaining = guard.next_deadline.remaining();
                if remaining.is_zero() {
                    break;
                }
                let (g2, timeout) = condvar.wait_timeout(guard, remaining).unwrap();
                guard = g2;
                if timeout.timed_out() {
                    break;
                }
            }
            if guard.stopping {
                return;
            }
            // Advance before invoking so the callback's own runtime never
            // accumulates as drift.
            guard.next_deadline = guard.next_deadline + simple.frequency;
        }

        if !source.is_running() {
            return;
        }
        source.invoke_callback();
    }
}

/// Single process-wide worker thread driving a deadline-ordered heap of
/// `SimpleSource`s that opted into shared scheduling. Owned by a
/// `Manager`, not a global, so tests can stand up independent pipelines.
pub struct SharedScheduler {
    state: Arc<SchedulerState>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

struct SchedulerState {
    inner: Mutex<SchedulerInner>,
    condvar: Condvar,
}

struct SchedulerInner {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    shutdown: bool,
}

struct HeapEntry {
    deadline: MonotonicInstant,
    source: Arc<Source>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

impl SharedScheduler {
    pub fn new(log: Logger) -> Arc<SharedScheduler> {
        let state = Arc::new(SchedulerState {
            inner: Mutex::new(SchedulerInner {
                heap: BinaryHeap::new(),
                shutdown: false,
            }),
            condvar: Condvar::new(),
        });

        let worker_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name("perfkit-shared-scheduler".into())
            .spawn(move || run_shared(worker_state, log))
            .expect("failed to spawn the shared scheduler thread");

        Arc::new(SharedScheduler {
            state,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn register(&self, source: Arc<Source>, deadline: MonotonicInstant) {
        let mut inner = self.state.inner.lock().unwrap();
        inner.heap.push(Reverse(HeapEntry { deadline, source }));
        self.state.condvar.notify_all();
    }

    pub fn unregister(&self, source_id: SourceId) {
        let mut inner = self.state.inner.lock().unwrap();
        let remaining: Vec<_> = inner
            .heap
            .drain()
            .filter(|Reverse(entry)| entry.source.id() != source_id)
            .collect();
        inner.heap.extend(remaining);
        self.state.condvar.notify_all();
    }

    pub fn shutdown(&self) {
        {
            let mut inner = self.state.inner.lock().unwrap();
            inner.shutdown = true;
            self.state.condvar.notify_all();
        }
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SharedScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_shared(state: Arc<SchedulerState>, log: Logger) {
    slog::debug!(log, "shared scheduler thread started");
    loop {
        let ready = {
            let mut guard = state.inner.lock().unwrap();
            loop {
                if guard.shutdown {
                    slog::debug!(log, "shared scheduler thread stopping");
                    return;
                }
                match guard.heap.peek() {
                    None => {
                        guard = state.condvar.wait(guard).unwrap();
                    }
                    Some(Reverse(entry)) => {
                        if entry.deadline.has_elapsed() {
                            break;
                        }
                        let wait = entry.deadline.remaining();
                        let (g2, _timeout) = state.condvar.wait_timeout(guard, wait).unwrap();
                        guard = g2;
                    }
                }
            }

            let mut ready = Vec::new();
            while let Some(Reverse(entry)) = guard.heap.peek() {
                if entry.deadline.has_elapsed() {
                    if let Some(Reverse(entry)) = guard.heap.pop() {
                        ready.push(entry);
                    }
                } else {
                    break;
                }
            }
            ready
        };

        for mut entry in ready {
            // Advance before invoking so the callback's own runtime never
            // accumulates as drift.
            entry.deadline = entry.deadline + entry.source.frequency();
            let source = Arc::clone(&entry.source);
            let still_running = source.is_running();
            if still_running {
                source.invoke_callback();
            }

            let mut guard = state.inner.lock().unwrap();
            if !guard.shutdown && still_running {
                guard.heap.push(Reverse(entry));
            }
        }
    }
}
