//! Transfer statistics: sliding-window speed and session byte counts.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Window over which instantaneous speed is averaged.
pub const SPEED_WINDOW: Duration = Duration::from_secs(10);

/// Sliding-window byte rate.
#[derive(Debug, Clone)]
pub struct SpeedMeter {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl Default for SpeedMeter {
    fn default() -> Self {
        Self::new(SPEED_WINDOW)
    }
}

impl SpeedMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    pub fn record(&mut self, bytes: u64, now: Instant) {
        self.samples.push_back((now, bytes));
        while let Some(&(t, _)) = self.samples.front() {
            if now.saturating_duration_since(t) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Bytes per second over the window ending at `now`. Does not mutate.
    pub fn speed(&self, now: Instant) -> u64 {
        let recent = self
            .samples
            .iter()
            .filter(|(t, _)| now.saturating_duration_since(*t) <= self.window);
        let mut oldest = None;
        let mut bytes = 0u64;
        for (t, b) in recent {
            oldest.get_or_insert(*t);
            bytes += b;
        }
        let Some(oldest) = oldest else {
            return 0;
        };
        let elapsed = now.saturating_duration_since(oldest).max(Duration::from_secs(1));
        (bytes as f64 / elapsed.as_secs_f64()) as u64
    }
}

/// Point-in-time view returned by `calculate_stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStat {
    pub download_speed: u64,
    pub upload_speed: u64,
    pub session_download_length: u64,
    pub session_upload_length: u64,
    pub all_time_upload_length: u64,
}

/// Per-task aggregator fed by the commands the task produced.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    download: SpeedMeter,
    upload: SpeedMeter,
    session_download_length: u64,
    session_upload_length: u64,
    /// Upload carried over from a previous session via the control file.
    prior_upload_length: u64,
}

impl TransferStats {
    pub fn record_download(&mut self, bytes: u64, now: Instant) {
        self.download.record(bytes, now);
        self.session_download_length += bytes;
    }

    pub fn record_upload(&mut self, bytes: u64, now: Instant) {
        self.upload.record(bytes, now);
        self.session_upload_length += bytes;
    }

    pub fn set_prior_upload_length(&mut self, bytes: u64) {
        self.prior_upload_length = bytes;
    }

    pub fn session_download_length(&self) -> u64 {
        self.session_download_length
    }

    pub fn snapshot(&self, now: Instant) -> TransferStat {
        TransferStat {
            download_speed: self.download.speed(now),
            upload_speed: self.upload.speed(now),
            session_download_length: self.session_download_length,
            session_upload_length: self.session_upload_length,
            all_time_upload_length: self.prior_upload_length + self.session_upload_length,
        }
    }
}
