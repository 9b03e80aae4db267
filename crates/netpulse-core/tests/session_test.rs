// Integration tests for SessionController with in-memory transports
//
// All tests run on a paused tokio clock, so tick intervals, probe latencies and
// download pacing are deterministic and the suite finishes instantly.
//
// Run with: cargo test -p netpulse-core --test session_test

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use netpulse_core::error::{MonitorError, Result};
use netpulse_core::transport::{ChunkStream, Download, DownloadSource, ProbeTransport};
use netpulse_core::{
    MeasurementKind, MeasurementStatus, SessionConfig, SessionController, SessionState,
    StopReason, SystemClock,
};
use url::Url;

const MIB: usize = 1024 * 1024;

/// Marks a download as open for as long as its stream is alive
struct OpenGuard {
    open: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl OpenGuard {
    fn new(net: &FakeNet) -> Self {
        let now_open = net.open.fetch_add(1, Ordering::SeqCst) + 1;
        net.max_open.fetch_max(now_open, Ordering::SeqCst);
        net.opened.fetch_add(1, Ordering::SeqCst);
        Self {
            open: net.open.clone(),
            released: net.released.clone(),
        }
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Fake network: fixed probe latency and paced downloads
#[derive(Clone)]
struct FakeNet {
    probe_delay: Duration,
    probe_fails: bool,
    chunks: usize,
    chunk_gap: Duration,
    stall: bool,
    open: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl Default for FakeNet {
    fn default() -> Self {
        Self {
            probe_delay: Duration::from_millis(5),
            probe_fails: false,
            chunks: 10,
            chunk_gap: Duration::from_millis(100),
            stall: false,
            open: Arc::default(),
            max_open: Arc::default(),
            opened: Arc::default(),
            released: Arc::default(),
        }
    }
}

#[async_trait]
impl ProbeTransport for FakeNet {
    async fn round_trip(&self, _url: &Url) -> Result<()> {
        tokio::time::sleep(self.probe_delay).await;
        if self.probe_fails {
            Err(MonitorError::probe("host unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DownloadSource for FakeNet {
    async fn open(&self, _url: &Url) -> Result<Download> {
        let guard = OpenGuard::new(self);
        let (total, gap, stall) = (self.chunks, self.chunk_gap, self.stall);

        let chunks: ChunkStream = stream::unfold((0usize, guard), move |(sent, guard)| async move {
            if stall && sent == 1 {
                futures::future::pending::<()>().await;
            }
            if sent == total {
                return None;
            }
            tokio::time::sleep(gap).await;
            Some((Ok(MIB), (sent + 1, guard)))
        })
        .boxed();

        Ok(Download {
            content_length: Some((total * MIB) as u64),
            chunks,
        })
    }
}

fn controller(net: &FakeNet) -> SessionController {
    let net = Arc::new(net.clone());
    SessionController::new(net.clone(), net, Arc::new(SystemClock))
}

fn config(duration: u64, ping_interval: u64, speed_interval: u64) -> SessionConfig {
    SessionConfig::from_secs(duration, ping_interval, speed_interval)
}

#[tokio::test(start_paused = true)]
async fn test_start_then_stop() {
    let net = FakeNet::default();
    let controller = controller(&net);

    let session_id = controller.start(config(3600, 2, 300)).unwrap();
    assert!(controller.is_running());
    assert_eq!(controller.state().session_id(), Some(session_id));

    // Ticks at 0s, 2s and 4s; the first tick also samples (1s download)
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(controller.elapsed(), Some(Duration::from_secs(5)));

    assert!(controller.stop(StopReason::UserRequested));
    assert_eq!(
        controller.state(),
        SessionState::Stopped {
            session_id,
            reason: StopReason::UserRequested
        }
    );
    assert!(controller.elapsed().is_none());

    let stats = controller.stats();
    assert_eq!(stats.ping_count, 3);
    assert_eq!(stats.ping_errors, 0);
    assert_eq!(stats.avg_latency_ms, 5);
    assert_eq!(stats.speed_count, 1);
    assert!((stats.avg_mbps - 80.0).abs() < 1e-3);

    let log = controller.log_snapshot();
    assert_eq!(log.len(), 4);
    let sample_index = log
        .iter()
        .position(|m| m.kind() == MeasurementKind::Speed)
        .unwrap();
    assert_eq!(controller.sample_history(sample_index).unwrap().len(), 5);
    assert_eq!(controller.export_rows().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_session_stops_when_duration_elapses() {
    let net = FakeNet::default();
    let controller = controller(&net);
    let started = tokio::time::Instant::now();

    controller.start(config(10, 2, 300)).unwrap();
    let reason = controller.wait_until_stopped().await;

    assert_eq!(reason, Some(StopReason::DurationElapsed));
    assert_eq!(started.elapsed(), Duration::from_secs(10));

    // Ticks at 0, 2, 4, 6 and 8 seconds probe; the tick at 10s only stops
    let stats = controller.stats();
    assert_eq!(stats.ping_count, 5);
    assert_eq!(stats.speed_count, 1);

    // Nothing is appended after the stop
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(controller.stats().ping_count, 5);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_between_ticks_stops_on_time() {
    let net = FakeNet::default();
    let controller = controller(&net);
    let started = tokio::time::Instant::now();

    // 10s is not a multiple of the 6s tick period
    controller.start(config(10, 6, 300)).unwrap();
    let reason = controller.wait_until_stopped().await;

    assert_eq!(reason, Some(StopReason::DurationElapsed));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(controller.stats().ping_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_timings_are_rejected_at_start() {
    let net = FakeNet::default();
    let controller = controller(&net);
    let huge = Duration::from_secs(u64::MAX);

    for config in [
        config(3600, 2, 300).with_duration(huge),
        config(3600, 2, 300).with_ping_interval(huge),
        config(3600, 2, 300).with_speed_interval(huge),
    ] {
        let err = controller.start(config).unwrap_err();
        assert!(matches!(err, MonitorError::InvalidConfig(_)));
        assert_eq!(controller.state(), SessionState::Idle);
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_samples_never_overlap() {
    let net = FakeNet {
        chunks: 7,
        chunk_gap: Duration::from_secs(1),
        ..Default::default()
    };
    let controller = controller(&net);

    // Samples are due every 2s but each one takes 7s
    controller.start(config(3600, 1, 2)).unwrap();
    tokio::time::sleep(Duration::from_millis(20_500)).await;
    controller.stop(StopReason::UserRequested);

    assert_eq!(net.max_open.load(Ordering::SeqCst), 1);
    assert!(net.opened.load(Ordering::SeqCst) >= 2);
    assert!(controller.stats().speed_count >= 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_in_flight_sample() {
    let net = FakeNet {
        stall: true,
        ..Default::default()
    };
    let controller = controller(&net);

    controller.start(config(3600, 2, 300)).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(controller.sample_in_flight());
    assert!(controller.progress().borrow().active);
    assert!(!net.released.load(Ordering::SeqCst));

    controller.stop(StopReason::UserRequested);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(net.released.load(Ordering::SeqCst));
    assert!(!controller.sample_in_flight());
    assert!(!controller.progress().borrow().active);
    assert_eq!(controller.stats().speed_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_probe_completing_after_stop_is_dropped() {
    let net = FakeNet {
        probe_delay: Duration::from_secs(3),
        chunks: 0,
        ..Default::default()
    };
    let controller = controller(&net);

    controller.start(config(3600, 1, 300)).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    controller.stop(StopReason::UserRequested);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let stats = controller.stats();
    assert_eq!(stats.ping_count + stats.ping_errors, 0);
    assert_eq!(controller.probe_errors(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_probes_are_counted() {
    let net = FakeNet {
        probe_fails: true,
        ..Default::default()
    };
    let controller = controller(&net);

    controller.start(config(3600, 2, 300)).unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    controller.stop(StopReason::UserRequested);

    let stats = controller.stats();
    assert_eq!(stats.ping_count, 0);
    assert_eq!(stats.ping_errors, 2);
    assert_eq!(stats.avg_latency_ms, 0);
    assert_eq!(controller.probe_errors(), 2);
    assert!(controller
        .log_snapshot()
        .iter()
        .filter(|m| m.kind() == MeasurementKind::Ping)
        .all(|m| m.status() == MeasurementStatus::Error));
}

#[tokio::test(start_paused = true)]
async fn test_restart_resets_session() {
    let net = FakeNet {
        probe_fails: true,
        chunks: 2,
        ..Default::default()
    };
    let controller = controller(&net);

    let first = controller.start(config(3600, 1, 300)).unwrap();
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(controller.probe_errors(), 4);

    let second = controller.start(config(3600, 1, 300)).unwrap();
    assert_ne!(first, second);
    assert!(controller.is_running());
    assert_eq!(controller.probe_errors(), 0);
    assert_eq!(controller.stats().ping_errors, 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(controller.stats().ping_errors, 1);
    assert_eq!(controller.probe_errors(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_keeps_running_session() {
    let net = FakeNet::default();
    let controller = controller(&net);

    let session_id = controller.start(config(3600, 2, 300)).unwrap();
    let err = controller.start(config(3600, 0, 300)).unwrap_err();

    assert!(matches!(err, MonitorError::InvalidConfig(_)));
    assert!(controller.is_running());
    assert_eq!(controller.state().session_id(), Some(session_id));
}

#[tokio::test]
async fn test_wait_without_session() {
    let controller = controller(&FakeNet::default());
    assert_eq!(controller.wait_until_stopped().await, None);
}
