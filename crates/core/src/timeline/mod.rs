use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Monotonic time source driving playback.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Time elapsed since an arbitrary, fixed origin. Never decreases.
    fn now(&self) -> Duration;
}

/// Wall-clock backed [`Clock`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to. Clones share the same reading, so a
/// test can keep a handle after moving one into the transport.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, delta: Duration) {
        let nanos = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Advances by a number of seconds. Negative or non-finite values are
    /// ignored because the clock is monotonic.
    pub fn advance_secs(&self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.advance(Duration::from_secs_f64(seconds));
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Anchors a playback position to a clock reading so the position can be
/// derived from elapsed time while playing.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlaybackClock {
    anchor: Option<Duration>,
    anchor_position: f64,
}

impl PlaybackClock {
    /// Starts running from `position` at clock reading `now`.
    pub fn start(&mut self, now: Duration, position: f64) {
        self.anchor = Some(now);
        self.anchor_position = position;
    }

    /// Stops running and keeps `position` as the frozen reading.
    pub fn halt(&mut self, position: f64) {
        self.anchor = None;
        self.anchor_position = position;
    }

    pub fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    /// Position in seconds at clock reading `now`.
    pub fn position_at(&self, now: Duration) -> f64 {
        match self.anchor {
            Some(anchor) => {
                self.anchor_position + now.saturating_sub(anchor).as_secs_f64()
            }
            None => self.anchor_position,
        }
    }
}

/// Formats seconds as `m:ss`, the way transport readouts display time.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance_secs(1.5);
        assert_eq!(clock.now(), Duration::from_millis(1500));

        handle.advance_secs(-3.0);
        assert_eq!(clock.now(), Duration::from_millis(1500));
    }

    #[test]
    fn playback_clock_tracks_elapsed_time_while_running() {
        let mut playback = PlaybackClock::default();
        playback.start(Duration::from_secs(10), 2.0);
        assert!((playback.position_at(Duration::from_millis(10_500)) - 2.5).abs() < 1e-9);

        playback.halt(2.5);
        assert!(!playback.is_running());
        assert_eq!(playback.position_at(Duration::from_secs(99)), 2.5);
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(65.9), "1:05");
        assert_eq!(format_timestamp(f64::NAN), "0:00");
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
