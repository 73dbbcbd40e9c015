use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::log::{EventSink, RelayEvent};

/// Byte counters of one session. Each is written by exactly one copy direction.
#[derive(Debug, Default)]
pub struct SessionStat {
    pub uplink_written: AtomicU64,
    pub downlink_written: AtomicU64,
}

#[derive(Debug, Default)]
pub struct RelayStatInner {
    pub accepted_sessions: AtomicU64,
    pub active_sessions: AtomicU32,
}

/// Process-wide session counters.
#[derive(Debug, Clone, Default)]
pub struct RelayStat {
    pub inner: Arc<RelayStatInner>,
}

impl Display for RelayStat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} sessions accepted, {} active",
            self.inner.accepted_sessions.load(Ordering::Relaxed),
            self.inner.active_sessions.load(Ordering::Relaxed)
        )
    }
}

/// Holds one slot in [`RelayStatInner::active_sessions`] until dropped.
pub struct StatGuard(RelayStat);

impl StatGuard {
    pub fn new(stat: RelayStat) -> Self {
        stat.inner.accepted_sessions.fetch_add(1, Ordering::Relaxed);
        stat.inner.active_sessions.fetch_add(1, Ordering::Relaxed);
        Self(stat)
    }
}

impl Drop for StatGuard {
    fn drop(&mut self) {
        self.0.inner.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatSample {
    pub uploaded: u64,
    pub upload_rate: u64,
    pub downloaded: u64,
    pub download_rate: u64,
}

/// Bytes per second for `delta` bytes moved within `period`, rounded down.
pub fn rate_per_second(delta: u64, period: Duration) -> u64 {
    let nanos = period.as_nanos();
    if nanos == 0 {
        return 0;
    }
    (delta as u128 * 1_000_000_000 / nanos).min(u64::MAX as u128) as u64
}

/// Remembers the previous counter snapshot to derive instantaneous rates.
#[derive(Debug, Default)]
pub struct StatSampler {
    last_uploaded: u64,
    last_downloaded: u64,
}

impl StatSampler {
    pub fn sample(&mut self, stat: &SessionStat, period: Duration) -> StatSample {
        let uploaded = stat.uplink_written.load(Ordering::Relaxed);
        let downloaded = stat.downlink_written.load(Ordering::Relaxed);
        let sample = StatSample {
            uploaded,
            upload_rate: rate_per_second(uploaded.saturating_sub(self.last_uploaded), period),
            downloaded,
            download_rate: rate_per_second(
                downloaded.saturating_sub(self.last_downloaded),
                period,
            ),
        };
        self.last_uploaded = uploaded;
        self.last_downloaded = downloaded;
        sample
    }
}

pub struct StatsReporter {
    pub id: u64,
    pub stat: Arc<SessionStat>,
    pub period: Duration,
    pub sink: Arc<dyn EventSink>,
}

impl StatsReporter {
    /// Emits a throughput sample every period until `exit` fires or its
    /// sender is dropped.
    pub async fn run(self, mut exit: oneshot::Receiver<()>) {
        let Self {
            id,
            stat,
            period,
            sink,
        } = self;
        let mut sampler = StatSampler::default();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let sample = sampler.sample(&stat, period);
                    sink.emit(RelayEvent::Throughput { id, sample });
                }
                _ = &mut exit => return,
            }
        }
    }
}
