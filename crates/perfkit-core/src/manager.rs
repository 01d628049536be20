//! Process-wide registry of channels, sources, and subscriptions. A
//! `Manager` is the root object an embedder constructs once; every
//! `Channel`/`Source`/`Subscription` it hands out is reachable again
//! through its id for the lifetime of the process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use slog::Logger;

use crate::channel::{Channel, ChannelState};
use crate::encode::Encoder;
use crate::error::{PerfkitError, Result};
use crate::ids::{ChannelId, IdAllocator, SourceId, SubscriptionId};
use crate::listener::Listener;
use crate::plugin::PluginInfo;
use crate::source::{SharedScheduler, Source};
use crate::spawn::SpawnInfo;
use crate::subscription::{ManifestHandler, SampleHandler, Subscription};

/// Constructs a concrete [`Source`] for a named kind. Registered once per
/// kind at startup, e.g. `"simple"`.
pub type SourceFactory =
    Arc<dyn Fn(SourceId, Weak<Channel>, Logger) -> Arc<Source> + Send + Sync>;

pub struct Manager {
    channel_ids: IdAllocator<ChannelId>,
    source_ids: IdAllocator<SourceId>,
    subscription_ids: IdAllocator<SubscriptionId>,

    channels: RwLock<HashMap<ChannelId, Arc<Channel>>>,
    sources: RwLock<HashMap<SourceId, Arc<Source>>>,
    subscriptions: RwLock<HashMap<SubscriptionId, Arc<Subscription>>>,

    source_factories: RwLock<HashMap<String, SourceFactory>>,
    encoders: RwLock<HashMap<String, Arc<dyn Encoder>>>,
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
    plugins: RwLock<Vec<PluginInfo>>,

    scheduler: Arc<SharedScheduler>,
    log: Logger,
}

impl Manager {
    pub fn new(log: Logger) -> Arc<Manager> {
        let scheduler = SharedScheduler::new(log.clone());
        Arc::new(Manager {
            channel_ids: ChannelId::allocator(),
            source_ids: SourceId::allocator(),
            subscription_ids: SubscriptionId::allocator(),
            channels: RwLock::new(HashMap::new()),
            sources: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            source_factories: RwLock::new(HashMap::new()),
            encoders: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            plugins: RwLock::new(Vec::new()),
            scheduler,
            log,
        })
    }

    pub fn register_source_factory(&self, kind: impl Into<String>, factory: SourceFactory) {
        self.source_factories.write().unwrap().insert(kind.into(), factory);
    }

    pub fn register_encoder(&self, name: impl Into<String>, encoder: Arc<dyn Encoder>) {
        self.encoders.write().unwrap().insert(name.into(), encoder);
    }

    pub fn register_listener(&self, listener: Arc<dyn Listener>) {
        self.listeners.write().unwrap().push(listener);
    }

    /// Advertises a registered source or encoder kind in the plugin
    /// catalog. Purely descriptive — registering here has no effect on
    /// whether the kind can actually be used; that's
    /// `register_source_factory`/`register_encoder`'s job.
    pub fn register_plugin(&self, info: PluginInfo) {
        self.plugins.write().unwrap().push(info);
    }

    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.plugins.read().unwrap().clone()
    }

    fn notify(&self, f: impl Fn(&dyn Listener)) {
        for listener in self.listeners.read().unwrap().iter() {
            f(listener.as_ref());
        }
    }

    // -- Channels ---------------------------------------------------------

    pub fn create_channel(&self, spawn_info: SpawnInfo) -> ChannelId {
        let id = self.channel_ids.alloc();
        let channel = Channel::new(id, spawn_info, Arc::clone(&self.scheduler), self.log.clone());
        self.channels.write().unwrap().insert(id, channel);
        self.notify(|l| l.channel_added(id));
        id
    }

    pub fn channel(&self, id: ChannelId) -> Option<Arc<Channel>> {
        self.channels.read().unwrap().get(&id).cloned()
    }

    /// Stops the channel (draining its sources) and drops it from the
    /// registry. Returns whether a channel with this id existed.
    pub fn remove_channel(&self, id: ChannelId) -> bool {
        let channel = self.channels.write().unwrap().remove(&id);
        match channel {
            Some(channel) => {
                if matches!(
                    channel.state(),
                    ChannelState::Ready | ChannelState::Running | ChannelState::Muted
                ) {
                    channel.stop();
                }
                self.notify(|l| l.channel_removed(id));
                true
            }
            None => false,
        }
    }

    pub fn list_channels(&self) -> Vec<ChannelId> {
        self.channels.read().unwrap().keys().copied().collect()
    }

    // -- Sources ------------------------------------------------------------

    /// Build a source of `kind` via its registered factory and attach it to
    /// `channel_id`.
    pub fn add_source(&self, kind: &str, channel_id: ChannelId) -> Result<SourceId> {
        let channel = self
            .channel(channel_id)
            .ok_or(PerfkitError::NotFound { kind: "channel", id: channel_id.get() })?;

        let factory = self
            .source_factories
            .read()
            .unwrap()
            .get(kind)
            .cloned()
            .ok_or_else(|| PerfkitError::InvalidKind { kind: "source", name: kind.to_string() })?;

        let id = self.source_ids.alloc();
        let source = factory(id, Arc::downgrade(&channel), self.log.clone());
        channel.add_source(Arc::clone(&source))?;
        self.sources.write().unwrap().insert(id, source);
        self.notify(|l| l.source_added(id));
        Ok(id)
    }

    pub fn source(&self, id: SourceId) -> Option<Arc<Source>> {
        self.sources.read().unwrap().get(&id).cloned()
    }

    /// Stops and detaches a source; fails if its channel is `Running`
    ///.
    pub fn remove_source(&self, id: SourceId) -> Result<()> {
        let source = self
            .sources
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(PerfkitError::NotFound { kind: "source", id: id.get() })?;

        if let Some(channel) = source.channel() {
            if channel.state() == ChannelState::Running {
                return Err(PerfkitError::InvalidState { current: ChannelState::Running });
            }
            source.stop(&self.scheduler);
            channel.remove_source(id);
        }

        self.sources.write().unwrap().remove(&id);
        self.notify(|l| l.source_removed(id));
        Ok(())
    }

    pub fn list_sources(&self) -> Vec<SourceId> {
        self.sources.read().unwrap().keys().copied().collect()
    }

    // -- Subscriptions --------------------------------------------------

    /// Attaches a new, initially-muted subscription to `channel_id`.
    /// `encoder_id` selects a registered encoder by name; `None` uses the
    /// default wire-format encoder.
    #[allow(clippy::too_many_arguments)]
    pub fn create_subscription(
        &self,
        channel_id: ChannelId,
        buffer_max: usize,
        buffer_timeout: std::time::Duration,
        encoder_id: Option<&str>,
        manifest_handler: ManifestHandler,
        sample_handler: SampleHandler,
    ) -> Result<SubscriptionId> {
        let channel = self
            .channel(channel_id)
            .ok_or(PerfkitError::NotFound { kind: "channel", id: channel_id.get() })?;

        let encoder: Arc<dyn Encoder> = match encoder_id {
            None => Arc::new(crate::encode::DefaultEncoder),
            Some(name) => self
                .encoders
                .read()
                .unwrap()
                .get(name)
                .cloned()
                .ok_or_else(|| PerfkitError::InvalidKind { kind: "encoder", name: name.to_string() })?,
        };

        let id = self.subscription_ids.alloc();
        let subscription = Subscription::new(
            id,
            Arc::downgrade(&channel),
            buffer_max,
            buffer_timeout,
            encoder,
            manifest_handler,
            sample_handler,
            self.log.clone(),
        );
        channel.add_subscription(Arc::clone(&subscription));
        self.subscriptions.write().unwrap().insert(id, subscription);
        self.notify(|l| l.subscription_added(id));
        Ok(id)
    }

    pub fn subscription(&self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        self.subscriptions.read().unwrap().get(&id).cloned()
    }

    /// Detaches a subscription, performing one final flush first if
    /// `drain`. Removals are
    /// synchronous: the caller is not released until the flush and
    /// detachment have both completed.
    pub fn remove_subscription(&self, id: SubscriptionId, drain: bool) -> bool {
        let subscription = self.subscriptions.write().unwrap().remove(&id);
        match subscription {
            Some(subscription) => {
                subscription.mute(drain);
                subscription.shutdown();
                if let Some(channel) = subscription.channel() {
                    channel.remove_subscription(id);
                }
                self.notify(|l| l.subscription_removed(id));
                true
            }
            None => false,
        }
    }

    pub fn list_subscriptions(&self) -> Vec<SubscriptionId> {
        self.subscriptions.read().unwrap().keys().copied().collect()
    }

    // -- Diagnostics ------------------------------------------------------

    pub fn ping(&self) -> String {
        perfkit_support::time::now_iso8601()
    }

    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Best-effort local hostname, for a transport's catalog response.
    /// Falls back to `"unknown"` rather than failing if the platform call
    /// does.
    pub fn get_hostname(&self) -> String {
        crate::hostname::hostname()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginInfo, PluginType};
    use crate::source::SourceCallback;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn test_log() -> Logger {
        perfkit_support::logging::test_logger()
    }

    fn idle_factory() -> SourceFactory {
        Arc::new(|id, channel, log| {
            let callback: SourceCallback = Arc::new(|_source: &Source| {});
            Source::new_simple(id, channel, Duration::from_secs(3600), false, callback, None, log)
        })
    }

    #[test]
    fn create_list_and_remove_channel() {
        let manager = Manager::new(test_log());
        let id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));
        assert!(manager.channel(id).is_some());
        assert_eq!(manager.list_channels(), vec![id]);

        assert!(manager.remove_channel(id));
        assert!(manager.channel(id).is_none());
        assert!(manager.list_channels().is_empty());
        assert!(!manager.remove_channel(id), "removing twice reports not-found");
    }

    #[test]
    fn add_source_against_unknown_channel_is_not_found() {
        let manager = Manager::new(test_log());
        manager.register_source_factory("idle", idle_factory());
        let bogus = manager.channel_ids.alloc();
        match manager.add_source("idle", bogus) {
            Err(PerfkitError::NotFound { kind: "channel", .. }) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn add_source_with_unregistered_kind_is_invalid_kind() {
        let manager = Manager::new(test_log());
        let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));
        match manager.add_source("does-not-exist", channel_id) {
            Err(PerfkitError::InvalidKind { kind: "source", .. }) => {}
            other => panic!("expected InvalidKind, got {other:?}"),
        }
    }

    #[test]
    fn add_list_and_remove_source() {
        let manager = Manager::new(test_log());
        manager.register_source_factory("idle", idle_factory());
        let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));
        let source_id = manager.add_source("idle", channel_id).unwrap();

        assert!(manager.source(source_id).is_some());
        assert_eq!(manager.list_sources(), vec![source_id]);

        manager.remove_source(source_id).unwrap();
        assert!(manager.source(source_id).is_none());
        assert!(manager.list_sources().is_empty());
    }

    #[test]
    fn remove_source_while_channel_running_is_rejected() {
        let manager = Manager::new(test_log());
        manager.register_source_factory("idle", idle_factory());
        let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));
        let source_id = manager.add_source("idle", channel_id).unwrap();
        manager.channel(channel_id).unwrap().start().unwrap();

        match manager.remove_source(source_id) {
            Err(PerfkitError::InvalidState { current: ChannelState::Running }) => {}
            other => panic!("expected InvalidState(Running), got {other:?}"),
        }
    }

    #[test]
    fn create_list_and_remove_subscription() {
        let manager = Manager::new(test_log());
        let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));
        let subscription_id = manager
            .create_subscription(
                channel_id,
                64,
                Duration::ZERO,
                None,
                Arc::new(|_| {}),
                Arc::new(|_| {}),
            )
            .unwrap();

        assert!(manager.subscription(subscription_id).is_some());
        assert_eq!(manager.list_subscriptions(), vec![subscription_id]);

        assert!(manager.remove_subscription(subscription_id, false));
        assert!(manager.subscription(subscription_id).is_none());
        assert!(manager.list_subscriptions().is_empty());
    }

    #[test]
    fn create_subscription_against_unknown_channel_is_not_found() {
        let manager = Manager::new(test_log());
        let bogus = manager.channel_ids.alloc();
        match manager.create_subscription(
            bogus,
            64,
            Duration::ZERO,
            None,
            Arc::new(|_| {}),
            Arc::new(|_| {}),
        ) {
            Err(PerfkitError::NotFound { kind: "channel", .. }) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn create_subscription_with_unknown_encoder_is_invalid_kind() {
        let manager = Manager::new(test_log());
        let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));
        match manager.create_subscription(
            channel_id,
            64,
            Duration::ZERO,
            Some("does-not-exist"),
            Arc::new(|_| {}),
            Arc::new(|_| {}),
        ) {
            Err(PerfkitError::InvalidKind { kind: "encoder", .. }) => {}
            other => panic!("expected InvalidKind, got {other:?}"),
        }
    }

    struct RecordingListener {
        channels_added: StdMutex<Vec<ChannelId>>,
        channels_removed: StdMutex<Vec<ChannelId>>,
    }

    impl Listener for RecordingListener {
        fn start(&self) -> Result<()> {
            Ok(())
        }
        fn stop(&self) {}
        fn channel_added(&self, channel_id: ChannelId) {
            self.channels_added.lock().unwrap().push(channel_id);
        }
        fn channel_removed(&self, channel_id: ChannelId) {
            self.channels_removed.lock().unwrap().push(channel_id);
        }
        fn source_added(&self, _source_id: SourceId) {}
        fn source_removed(&self, _source_id: SourceId) {}
        fn subscription_added(&self, _subscription_id: SubscriptionId) {}
        fn subscription_removed(&self, _subscription_id: SubscriptionId) {}
        fn deliver_manifest(&self, _subscription_id: SubscriptionId, _bytes: &[u8]) {}
        fn deliver_sample(&self, _subscription_id: SubscriptionId, _bytes: &[u8]) {}
    }

    #[test]
    fn registered_listeners_observe_channel_topology_changes() {
        let manager = Manager::new(test_log());
        let listener = Arc::new(RecordingListener {
            channels_added: StdMutex::new(Vec::new()),
            channels_removed: StdMutex::new(Vec::new()),
        });
        manager.register_listener(listener.clone());

        let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));
        assert_eq!(*listener.channels_added.lock().unwrap(), vec![channel_id]);

        manager.remove_channel(channel_id);
        assert_eq!(*listener.channels_removed.lock().unwrap(), vec![channel_id]);
    }

    #[test]
    fn plugin_catalog_round_trips_registered_entries() {
        let manager = Manager::new(test_log());
        assert!(manager.list_plugins().is_empty());

        manager.register_plugin(PluginInfo::new(
            "simple",
            "0.1.0",
            "(C) Perfkit Contributors",
            "timer-driven sampler",
            PluginType::Source,
        ));
        let plugins = manager.list_plugins();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].get_name(), "simple");
        assert_eq!(plugins[0].get_plugin_type(), PluginType::Source);
    }

    #[test]
    fn get_hostname_is_never_empty() {
        let manager = Manager::new(test_log());
        assert!(!manager.get_hostname().is_empty());
    }

    #[test]
    fn ping_and_version_report_something() {
        let manager = Manager::new(test_log());
        assert!(!manager.ping().is_empty());
        assert!(!manager.version().is_empty());
    }
}
