//! Buffered fan-out endpoint delivering encoded manifests and samples to a
//! listener. Each subscription owns its own mutex, queue and
//! (when `buffer_timeout > 0`) a dedicated flush-timer thread, so one slow
//! or broken subscription never blocks delivery to the others.

use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::Duration;

use slog::Logger;

use crate::channel::Channel;
use crate::clock::MonotonicInstant;
use crate::encode::Encoder;
use crate::ids::SubscriptionId;
use crate::manifest::Manifest;
use crate::sample::Sample;

pub type ManifestHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync>;
pub type SampleHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

pub struct Subscription {
    id: SubscriptionId,
    channel: Weak<Channel>,
    encoder: Arc<dyn Encoder>,
    manifest_handler: ManifestHandler,
    sample_handler: SampleHandler,
    buffer_max: usize,
    buffer_timeout: Duration,
    state: Mutex<SubState>,
    timer: Arc<(Mutex<TimerState>, Condvar)>,
    timer_thread: Mutex<Option<thread::JoinHandle<()>>>,
    log: Logger,
}

struct SubState {
    muted: bool,
    queue: Vec<Sample>,
    buffered_bytes: usize,
    current_manifest: Option<Arc<Manifest>>,
    manifest_delivered: bool,
    disabled: bool,
    timer_generation: u64,
}

struct TimerState {
    deadline: Option<MonotonicInstant>,
    generation: u64,
    stopping: bool,
}

impl Subscription {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: SubscriptionId,
        channel: Weak<Channel>,
        buffer_max: usize,
        buffer_timeout: Duration,
        encoder: Arc<dyn Encoder>,
        manifest_handler: ManifestHandler,
        sample_handler: SampleHandler,
        log: Logger,
    ) -> Arc<Subscription> {
        let subscription = Arc::new(Subscription {
            id,
            channel,
            encoder,
            manifest_handler,
            sample_handler,
            buffer_max,
            buffer_timeout,
            state: Mutex::new(SubState {
                muted: true,
                queue: Vec::new(),
                buffered_bytes: 0,
                current_manifest: None,
                manifest_delivered: true,
                disabled: false,
                timer_generation: 0,
            }),
            timer: Arc::new((
                Mutex::new(TimerState {
                    deadline: None,
                    generation: 0,
                    stopping: false,
                }),
                Condvar::new(),
            )),
            timer_thread: Mutex::new(None),
            log,
        });

        if !subscription.buffer_timeout.is_zero() {
            let watched = Arc::clone(&subscription);
            let handle = thread::Builder::new()
                .name(format!("perfkit-sub-timer-{}", id.get()))
                .spawn(move || run_timer(watched))
                .expect("failed to spawn subscription timer thread");
            *subscription.timer_thread.lock().unwrap() = Some(handle);
        }

        subscription
    }

    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn channel(&self) -> Option<Arc<Channel>> {
        self.channel.upgrade()
    }

    pub fn is_muted(&self) -> bool {
        self.state.lock().unwrap().muted
    }

    pub fn buffered_bytes(&self) -> usize {
        self.state.lock().unwrap().buffered_bytes
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn is_disabled(&self) -> bool {
        self.state.lock().unwrap().disabled
    }

    /// Queues an encoded sample, flushing if the batch is now due.
    pub fn deliver_sample(&self, sample: Sample) {
        let mut state = self.state.lock().unwrap();
        if state.disabled || state.muted {
            return;
        }

        state.buffered_bytes += sample.len();
        state.queue.push(sample);
        if state.queue.len() == 1 {
            self.arm_timer(&mut state);
        }

        if needs_flush_locked(&state, self.buffer_max) {
            self.flush_locked(&mut state);
        }
    }

    /// Flushes any pending samples under the old manifest, then delivers
    /// the new one (or queues it, if muted).
    pub fn deliver_manifest(&self, manifest: Arc<Manifest>) {
        let mut state = self.state.lock().unwrap();
        if state.disabled {
            return;
        }

        if state.muted {
            debug_assert!(state.queue.is_empty(), "queue must be empty while muted");
            state.current_manifest = Some(manifest);
            state.manifest_delivered = false;
            return;
        }

        if !state.queue.is_empty() {
            self.flush_locked(&mut state);
        }
        state.current_manifest = Some(Arc::clone(&manifest));
        self.encode_and_deliver_manifest(&mut state, &manifest);
    }

    /// Mutes delivery, optionally flushing the pending queue first.
    pub fn mute(&self, drain: bool) {
        let mut state = self.state.lock().unwrap();
        if drain && !state.muted && !state.queue.is_empty() {
            self.flush_locked(&mut state);
        }
        state.muted = true;
        self.cancel_timer(&mut state);
    }

    pub fn unmute(&self) {
        let mut state = self.state.lock().unwrap();
        state.muted = false;
        if !state.manifest_delivered {
            if let Some(manifest) = state.current_manifest.clone() {
                self.encode_and_deliver_manifest(&mut state, &manifest);
            }
        }
    }

    /// The subscription's transport peer disconnected: mute without
    /// draining and detach from the owning channel.
    pub fn handle_peer_gone(self: &Arc<Self>) {
        self.mute(false);
        if let Some(channel) = self.channel.upgrade() {
            channel.remove_subscription(self.id);
        }
    }

    pub(crate) fn shutdown(&self) {
        {
            let (mutex, condvar) = &*self.timer;
            let mut timer = mutex.lock().unwrap();
            timer.stopping = true;
            condvar.notify_all();
        }
        if let Some(handle) = self.timer_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn encode_and_deliver_manifest(&self, state: &mut SubState, manifest: &Manifest) {
        match self.encoder.encode_manifest(manifest) {
            Ok(bytes) => {
                state.manifest_delivered = true;
                (self.manifest_handler)(bytes);
            }
            Err(err) => self.disable(state, &err.to_string()),
        }
    }

    fn flush_locked(&self, state: &mut SubState) {
        let pending = std::mem::take(&mut state.queue);
        state.buffered_bytes = 0;
        self.cancel_timer(state);

        match self.encoder.encode_samples(&pending) {
            Ok(bytes) => (self.sample_handler)(bytes),
            Err(err) => self.disable(state, &err.to_string()),
        }
    }

    fn disable(&self, state: &mut SubState, reason: &str) {
        slog::error!(self.log, "subscription disabled by encoder failure"; "subscription_id" => self.id.get(), "reason" => reason);
        state.disabled = true;
        state.queue.clear();
        state.buffered_bytes = 0;
    }

    fn arm_timer(&self, state: &mut SubState) {
        if self.buffer_timeout.is_zero() {
            return;
        }
        state.timer_generation += 1;
        let (mutex, condvar) = &*self.timer;
        let mut timer = mutex.lock().unwrap();
        timer.generation = state.timer_generation;
        timer.deadline = Some(MonotonicInstant::now() + self.buffer_timeout);
        condvar.notify_all();
    }

    fn cancel_timer(&self, state: &mut SubState) {
        state.timer_generation += 1;
        let (mutex, condvar) = &*self.timer;
        let mut timer = mutex.lock().unwrap();
        timer.deadline = None;
        condvar.notify_all();
    }

    fn on_timer_fire(&self, generation: u64) {
        let mut state = self.state.lock().unwrap();
        if state.disabled || state.muted || state.timer_generation != generation {
            return;
        }
        if !state.queue.is_empty() {
            self.flush_locked(&mut state);
        }
    }
}

fn needs_flush_locked(state: &SubState, buffer_max: usize) -> bool {
    !state.queue.is_empty() && (buffer_max == 0 || state.buffered_bytes >= buffer_max)
}

fn run_timer(subscription: Arc<Subscription>) {
    let (mutex, condvar) = &*subscription.timer;
    loop {
        let fired_generation = {
            let mut guard = mutex.lock().unwrap();
            loop {
                if guard.stopping {
                    return;
                }
                match guard.deadline {
                    None => guard = condvar.wait(guard).unwrap(),
                    Some(deadline) => {
                        let remaining = deadline.remaining();
                        if remaining.is_zero() {
                            break;
                        }
                        let (g2, _timeout) = condvar.wait_timeout(guard, remaining).unwrap();
                        guard = g2;
                    }
                }
            }
            if guard.stopping {
                return;
            }
            guard.deadline = None;
            guard.generation
        };

        subscription.on_timer_fire(fired_generation);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}
