use serde::{Deserialize, Serialize};

use crate::{
    assets, config::TransportConfig, AudioAsset, Clock, DecodeError, PlaybackClock,
    TransportError,
};

/// Snapshot of the transport, as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransportState {
    /// Playback position in seconds, within `[0, duration]`.
    pub position: f64,
    /// Duration of the loaded asset in seconds, 0 when nothing is loaded.
    pub duration: f64,
    pub playing: bool,
    /// Stored volume in `[0, 1]`. Muting leaves it untouched.
    pub volume: f32,
    pub muted: bool,
    pub looping: bool,
}

impl TransportState {
    fn initial(config: &TransportConfig) -> Self {
        Self {
            position: 0.0,
            duration: 0.0,
            playing: false,
            volume: config.volume.clamp(0.0, 1.0),
            muted: config.muted,
            looping: config.looping,
        }
    }

    /// Position as a fraction of the duration.
    pub fn progress(&self) -> f64 {
        if self.duration > 0.0 {
            (self.position / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Gain the output stage should apply: silent when muted.
    pub fn effective_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }
}

/// What happened to the playback position during [`Transport::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Not playing; nothing moved.
    Stationary,
    Advanced,
    /// Reached the end while looping and restarted from the top.
    Wrapped,
    /// Reached the end without looping; playback stopped at the duration.
    Ended,
}

/// Owns the loaded asset and the transport state. Position advances with the
/// injected [`Clock`], independent of how often anyone looks at it.
#[derive(Debug)]
pub struct Transport {
    clock: Box<dyn Clock>,
    asset: Option<AudioAsset>,
    playback: PlaybackClock,
    state: TransportState,
}

impl Transport {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self::with_config(clock, &TransportConfig::default())
    }

    pub fn with_config(clock: Box<dyn Clock>, config: &TransportConfig) -> Self {
        Self {
            clock,
            asset: None,
            playback: PlaybackClock::default(),
            state: TransportState::initial(config),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn asset(&self) -> Option<&AudioAsset> {
        self.asset.as_ref()
    }

    /// Decodes `bytes` and replaces the current asset. On failure nothing
    /// changes.
    pub fn load(&mut self, bytes: &[u8]) -> Result<&AudioAsset, DecodeError> {
        let asset = assets::decode(bytes)?;
        Ok(self.install(asset))
    }

    /// Replaces the current asset and rewinds. Volume, mute and loop flags
    /// carry over.
    pub fn install(&mut self, asset: AudioAsset) -> &AudioAsset {
        tracing::info!(
            sample_rate = asset.sample_rate(),
            channels = asset.channels(),
            duration = asset.duration_seconds(),
            "audio asset loaded"
        );
        self.state.duration = asset.duration_seconds();
        self.state.position = 0.0;
        self.state.playing = false;
        self.playback.halt(0.0);
        self.asset.insert(asset)
    }

    /// Releases the asset and resets position and duration.
    pub fn unload(&mut self) {
        self.asset = None;
        self.state.duration = 0.0;
        self.state.position = 0.0;
        self.state.playing = false;
        self.playback.halt(0.0);
    }

    pub fn play(&mut self) -> Result<(), TransportError> {
        if self.asset.is_none() {
            return Err(TransportError::NoAsset);
        }
        self.sync();
        if self.state.playing {
            return Ok(());
        }
        if self.state.position >= self.state.duration && !self.state.looping {
            self.state.position = 0.0;
        }
        self.state.playing = true;
        self.playback.start(self.clock.now(), self.state.position);
        Ok(())
    }

    pub fn pause(&mut self) {
        self.sync();
        self.state.playing = false;
        self.playback.halt(self.state.position);
    }

    pub fn stop(&mut self) {
        self.state.playing = false;
        self.state.position = 0.0;
        self.playback.halt(0.0);
    }

    /// Moves the position to `seconds`, clamped to `[0, duration]`. The
    /// playing flag is kept; reaching the end by seeking never wraps.
    pub fn seek(&mut self, seconds: f64) -> Result<(), TransportError> {
        if seconds.is_nan() {
            return Err(TransportError::InvalidSeekTarget(seconds));
        }
        if self.asset.is_none() {
            return Err(TransportError::NoAsset);
        }
        self.sync();

        let target = seconds.clamp(0.0, self.state.duration);
        self.state.position = target;
        if self.state.playing {
            self.playback.start(self.clock.now(), target);
        } else {
            self.playback.halt(target);
        }
        Ok(())
    }

    /// Seeks to a fraction of the duration, as a progress bar would.
    pub fn seek_fraction(&mut self, fraction: f64) -> Result<(), TransportError> {
        if fraction.is_nan() {
            return Err(TransportError::InvalidSeekTarget(fraction));
        }
        self.seek(fraction.clamp(0.0, 1.0) * self.state.duration)
    }

    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            tracing::warn!("ignoring NaN volume");
            return;
        }
        self.state.volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.state.muted = muted;
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.sync();
        self.state.looping = looping;
    }

    /// Brings the position up to date with the clock and applies end-of-stream
    /// handling.
    pub fn sync(&mut self) -> PlaybackEvent {
        if !self.state.playing {
            return PlaybackEvent::Stationary;
        }

        let now = self.clock.now();
        let position = self.playback.position_at(now);
        let duration = self.state.duration;
        if position < duration {
            self.state.position = position;
            return PlaybackEvent::Advanced;
        }

        if self.state.looping && duration > 0.0 {
            let wrapped = position % duration;
            self.state.position = wrapped;
            self.playback.start(now, wrapped);
            tracing::debug!(overshoot = wrapped, "playback wrapped");
            PlaybackEvent::Wrapped
        } else {
            self.state.position = duration;
            self.state.playing = false;
            self.playback.halt(duration);
            tracing::debug!("playback reached the end");
            PlaybackEvent::Ended
        }
    }
}
