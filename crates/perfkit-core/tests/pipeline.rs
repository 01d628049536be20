//! End-to-end scenarios covering the pipeline wired together through its
//! public `Manager`/`Channel`/`Source`/`Subscription` surface. Names match
//! the scenario labels they cover so a failure points straight at which
//! behavior regressed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use perfkit_core::channel::ChannelState;
use perfkit_core::manager::Manager;
use perfkit_core::manifest::{ManifestBuilder, RowType};
use perfkit_core::sample::Sample;
use perfkit_core::source::{Source, SourceCallback};
use perfkit_core::spawn::SpawnInfo;

fn test_log() -> slog::Logger {
    perfkit_support::logging::test_logger()
}

/// S1 — buffered flush by size: a 256-byte `buffer_max` with 64-byte
/// samples flushes every 4th sample, each flush carrying exactly
/// `4*(4+1+64)` bytes.
#[test]
fn s1_buffered_flush_by_size() {
    let manager = Manager::new(test_log());
    let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));

    let counter = Arc::new(AtomicUsize::new(0));
    manager.register_source_factory("counting", {
        let counter = Arc::clone(&counter);
        Arc::new(move |id, channel, log| {
            let counter = Arc::clone(&counter);
            let callback: SourceCallback = Arc::new(move |source: &Source| {
                source.emit_sample(vec![0u8; 64]);
                if counter.fetch_add(1, Ordering::SeqCst) + 1 == 12 {
                    if let Some(channel) = source.channel() {
                        channel.stop();
                    }
                }
            });
            Source::new_simple(id, channel, Duration::from_millis(10), false, callback, None, log)
        })
    });
    manager.add_source("counting", channel_id).unwrap();

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let subscription_id = manager
        .create_subscription(
            channel_id,
            256,
            Duration::ZERO,
            None,
            Arc::new(|_| {}),
            Arc::new(move |bytes| {
                let _ = tx.send(bytes);
            }),
        )
        .unwrap();
    manager.subscription(subscription_id).unwrap().unmute();

    manager.channel(channel_id).unwrap().start().unwrap();

    let mut flushes = Vec::new();
    while let Ok(bytes) = rx.recv_timeout(Duration::from_secs(2)) {
        flushes.push(bytes);
        if flushes.len() == 3 {
            break;
        }
    }

    assert_eq!(flushes.len(), 3);
    for flush in &flushes {
        assert_eq!(flush.len(), 4 * (4 + 1 + 64));
    }
    assert!(rx.try_recv().is_err(), "exactly 3 flushes expected after 12 samples");
}

/// S2 — buffered flush by time: a `buffer_timeout` well under the
/// source's period flushes periodically even though `buffer_max` is never
/// reached by size alone. `buffer_max=0` is the degenerate
/// always-flush-immediately case already covered by S3, not genuine time
/// batching, so this uses a `buffer_max` the run never gets close to.
#[test]
fn s2_buffered_flush_by_time() {
    let manager = Manager::new(test_log());
    let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));

    manager.register_source_factory(
        "ticker",
        Arc::new(|id, channel, log| {
            let callback: SourceCallback = Arc::new(|source: &Source| {
                source.emit_sample(vec![0u8; 64]);
            });
            Source::new_simple(id, channel, Duration::from_millis(10), false, callback, None, log)
        }),
    );
    manager.add_source("ticker", channel_id).unwrap();

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let subscription_id = manager
        .create_subscription(
            channel_id,
            4096,
            Duration::from_millis(50),
            None,
            Arc::new(|_| {}),
            Arc::new(move |bytes| {
                let _ = tx.send(bytes);
            }),
        )
        .unwrap();
    manager.subscription(subscription_id).unwrap().unmute();

    let channel = manager.channel(channel_id).unwrap();
    channel.start().unwrap();

    let sample_len = 4 + 1 + 64;
    let mut flushes = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_millis(280);
    while let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now()) {
        match rx.recv_timeout(remaining.max(Duration::from_millis(1))) {
            Ok(bytes) => flushes.push(bytes),
            Err(_) => break,
        }
    }
    channel.stop();

    assert!(flushes.len() >= 3, "expected several timer-driven flushes, got {}", flushes.len());
    for flush in &flushes {
        assert!(!flush.is_empty(), "a fired timer must have something queued");
        assert_eq!(flush.len() % sample_len, 0, "a flush must carry whole encoded samples");
    }
}

/// S3 — a muted subscription drops every sample and queues nothing; the
/// first sample after unmuting flushes immediately because `buffer_max=0`.
#[test]
fn s3_muted_subscription_then_unmute_flushes_immediately() {
    let manager = Manager::new(test_log());
    let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));

    manager.register_source_factory(
        "emitter",
        Arc::new(|id, channel, log| {
            let callback: SourceCallback = Arc::new(|source: &Source| {
                source.emit_sample(vec![0u8; 64]);
            });
            Source::new_simple(id, channel, Duration::from_millis(5), false, callback, None, log)
        }),
    );
    manager.add_source("emitter", channel_id).unwrap();

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let subscription_id = manager
        .create_subscription(
            channel_id,
            0,
            Duration::ZERO,
            None,
            Arc::new(|_| {}),
            Arc::new(move |bytes| {
                let _ = tx.send(bytes);
            }),
        )
        .unwrap();
    let subscription = manager.subscription(subscription_id).unwrap();
    assert!(subscription.is_muted(), "subscriptions begin muted");

    let channel = manager.channel(channel_id).unwrap();
    channel.start().unwrap();
    std::thread::sleep(Duration::from_millis(60));
    assert!(rx.try_recv().is_err(), "a muted subscription must not receive flushes");
    assert_eq!(subscription.queue_len(), 0);

    subscription.unmute();
    let flushed = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(flushed.len(), 4 + 1 + 64, "buffer_max=0 flushes the very next sample alone");

    channel.stop();
}

/// S4 — queuing samples against one manifest and then delivering a second
/// flushes the pending batch first; no sample for the first manifest
/// arrives after the second manifest's notification.
#[test]
fn s4_manifest_swap_flushes_pending_samples_first() {
    let manager = Manager::new(test_log());
    let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));

    manager.register_source_factory(
        "idle",
        Arc::new(|id, channel, log| {
            let callback: SourceCallback = Arc::new(|_source: &Source| {});
            Source::new_simple(id, channel, Duration::from_secs(3600), false, callback, None, log)
        }),
    );
    let source_id = manager.add_source("idle", channel_id).unwrap();

    let (sample_tx, sample_rx) = mpsc::channel::<Vec<u8>>();
    let (manifest_tx, manifest_rx) = mpsc::channel::<Vec<u8>>();
    let subscription_id = manager
        .create_subscription(
            channel_id,
            1024,
            Duration::ZERO,
            None,
            Arc::new(move |bytes| {
                let _ = manifest_tx.send(bytes);
            }),
            Arc::new(move |bytes| {
                let _ = sample_tx.send(bytes);
            }),
        )
        .unwrap();
    manager.subscription(subscription_id).unwrap().unmute();

    let channel = manager.channel(channel_id).unwrap();
    channel.start().unwrap();

    let mut m1 = ManifestBuilder::new();
    m1.set_source_id(source_id);
    m1.append("x", RowType::I8).unwrap();
    channel.publish_manifest(source_id, m1.build());
    manifest_rx.recv_timeout(Duration::from_secs(1)).unwrap();

    for _ in 0..3 {
        channel.deliver(source_id, Sample::new(source_id, vec![9]));
    }
    assert_eq!(manager.subscription(subscription_id).unwrap().queue_len(), 3);
    assert!(sample_rx.try_recv().is_err());

    let mut m2 = ManifestBuilder::new();
    m2.set_source_id(source_id);
    m2.append("y", RowType::I8).unwrap();
    channel.publish_manifest(source_id, m2.build());

    let flushed = sample_rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(flushed.len(), 3 * (4 + 1 + 1));
    manifest_rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(sample_rx.try_recv().is_err(), "no sample for M1 arrives after M2");

    channel.stop();
}

/// S5 — a channel with a target and no spawning source spawns the target
/// itself on `start()`; once the child exits, `exit_status` is populated.
#[test]
fn s5_spawn_on_start_reports_exit_status() {
    let manager = Manager::new(test_log());
    let spawn_info = SpawnInfo::with_target("true").kill_on_stop(true);
    let channel_id = manager.create_channel(spawn_info);
    let channel = manager.channel(channel_id).unwrap();

    channel.start().unwrap();
    assert_eq!(channel.state(), ChannelState::Running);
    assert!(channel.spawn_info().pid.unwrap() > 0);

    let mut waited = Duration::ZERO;
    while channel.exit_status().is_none() && waited < Duration::from_secs(2) {
        std::thread::sleep(Duration::from_millis(20));
        waited += Duration::from_millis(20);
    }
    assert_eq!(channel.exit_status(), Some(0));

    channel.stop();
    assert_eq!(channel.state(), ChannelState::Stopped);
}

/// S6 — three shared-scheduler sources at different frequencies never
/// overlap on the single worker thread, and each fires roughly
/// `1000ms / frequency` times over a one-second run.
#[test]
fn s6_shared_scheduler_ordering_and_rates() {
    let manager = Manager::new(test_log());
    let channel_id = manager.create_channel(SpawnInfo::with_pid(std::process::id()));

    let in_callback = Arc::new(AtomicBool::new(false));
    let frequencies_ms = [10u64, 17, 25];
    let counters: Vec<Arc<AtomicUsize>> = frequencies_ms.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();

    for (i, frequency_ms) in frequencies_ms.iter().enumerate() {
        let counter = Arc::clone(&counters[i]);
        let in_callback = Arc::clone(&in_callback);
        let frequency = Duration::from_millis(*frequency_ms);
        manager.register_source_factory(format!("rate-{i}"), Arc::new(move |id, channel, log| {
            let counter = Arc::clone(&counter);
            let in_callback = Arc::clone(&in_callback);
            let callback: SourceCallback = Arc::new(move |_source: &Source| {
                assert!(!in_callback.swap(true, Ordering::SeqCst), "shared scheduler must serialize callbacks");
                counter.fetch_add(1, Ordering::SeqCst);
                in_callback.store(false, Ordering::SeqCst);
            });
            Source::new_simple(id, channel, frequency, false, callback, None, log)
        }));
        manager.add_source(&format!("rate-{i}"), channel_id).unwrap();
    }

    let channel = manager.channel(channel_id).unwrap();
    channel.start().unwrap();
    std::thread::sleep(Duration::from_secs(1));
    channel.stop();

    let expected = [100i64, 58, 40];
    for (counter, expected) in counters.iter().zip(expected.iter()) {
        let actual = counter.load(Ordering::SeqCst) as i64;
        assert!(
            (actual - expected).abs() <= 6,
            "expected roughly {expected} ticks, got {actual}"
        );
    }
}
