//! Reference daemon binary: wires a [`Manager`](perfkit_core::Manager) with
//! one `simple`-kind source factory, starts a single demo channel, and logs
//! every delivered manifest/sample batch through the same [`slog`] pipeline
//! the core itself logs through. A real deployment replaces this `main`
//! with whatever RPC transport implements [`Listener`](perfkit_core::listener::Listener)
//! and drives the `Manager` from the wire instead of from a hardcoded
//! source; the pipeline core in `perfkit-core` is the part this exercise
//! specifies, so this binary stays intentionally small.

use std::sync::Arc;
use std::time::Duration;

use perfkit_core::manifest::{ManifestBuilder, Resolution, RowType};
use perfkit_core::plugin::{PluginInfo, PluginType};
use perfkit_core::source::{Source, SourceCallback};
use perfkit_core::spawn::SpawnInfo;
use perfkit_core::Manager;
use perfkit_support::PipelineConfig;

fn main() {
    let config = PipelineConfig::default();
    let _log_guard = perfkit_support::logging::init(&config.logging);
    let log = slog_scope::logger();

    let manager = Manager::new(log.clone());
    manager.register_source_factory(
        "simple",
        Arc::new(|id, channel, log| build_cpu_sampler(id, channel, log)),
    );
    manager.register_plugin(PluginInfo::new(
        "simple",
        env!("CARGO_PKG_VERSION"),
        "(C) Perfkit Contributors",
        "synthetic timer-driven cpu_pct sampler",
        PluginType::Source,
    ));

    let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));
    let source_id = manager
        .add_source("simple", channel_id)
        .expect("the \"simple\" factory is registered above");

    let subscription_id = manager
        .create_subscription(
            channel_id,
            256,
            Duration::from_millis(0),
            None,
            Arc::new(|bytes| slog_scope::info!("manifest delivered"; "bytes" => bytes.len())),
            Arc::new(|bytes| slog_scope::info!("samples delivered"; "bytes" => bytes.len())),
        )
        .expect("channel was just created");
    manager
        .subscription(subscription_id)
        .expect("just created")
        .unmute();

    let channel = manager.channel(channel_id).expect("just created");
    channel.start().expect("attaching to our own pid cannot fail");

    slog::info!(log, "perfkitd running"; "channel_id" => channel_id.get(), "source_id" => source_id.get());
    std::thread::sleep(Duration::from_secs(5));

    channel.stop();
    slog::info!(log, "perfkitd shutting down");
}

/// A `simple`-kind source emitting a single synthetic `cpu_pct` row,
/// standing in for the real OS sampling a production embedder would wire
/// up here.
fn build_cpu_sampler(
    id: perfkit_core::SourceId,
    channel: std::sync::Weak<perfkit_core::Channel>,
    log: slog::Logger,
) -> Arc<Source> {
    let callback: SourceCallback = Arc::new(|source: &Source| {
        if source.manifest().is_none() {
            let mut builder = ManifestBuilder::new();
            builder.set_source_id(source.id());
            builder.set_resolution(Resolution::Sec);
            builder.append("cpu_pct", RowType::U32).expect("first row always succeeds");
            source.publish_manifest(builder.build());
        }

        let cpu_pct: u32 = 0;
        source.emit_sample(cpu_pct.to_ne_bytes().to_vec());
    });

    Source::new_simple(id, channel, Duration::from_millis(500), false, callback, None, log)
}
