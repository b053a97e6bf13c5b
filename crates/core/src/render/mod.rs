use crate::{
    config::AnalysisConfig, AudioAsset, FeatureExtractor, FrameSampler, ModeMapper, RenderFrame,
    Result, TransportState, VisualizationMode,
};

/// Outcome of a single [`RenderScheduler::tick`].
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub frame: RenderFrame,
    /// Whether the frame was computed this tick rather than repeated.
    pub fresh: bool,
    /// Analysis faults recovered from during this tick.
    pub faults: usize,
    /// Set on the tick that switched to the neutral fallback frame.
    pub entered_fallback: bool,
}

/// Runs sampler, extractor and mapper once per externally driven tick. It
/// owns no timer; the host decides when ticks happen.
#[derive(Debug)]
pub struct RenderScheduler {
    sampler: FrameSampler,
    extractor: FeatureExtractor,
    mapper: ModeMapper,
    last_frame: Option<RenderFrame>,
    fault_threshold: u32,
    consecutive_faults: u32,
    degraded: bool,
}

impl RenderScheduler {
    pub fn new(config: &AnalysisConfig, mode: VisualizationMode) -> Result<Self> {
        let sampler = FrameSampler::new(config.window_length, config.alignment)?;
        Ok(Self {
            sampler,
            extractor: FeatureExtractor::new(config.window_length),
            mapper: ModeMapper::new(mode),
            last_frame: None,
            fault_threshold: config.fault_threshold.max(1),
            consecutive_faults: 0,
            degraded: false,
        })
    }

    pub fn mode(&self) -> &VisualizationMode {
        self.mapper.mode()
    }

    pub fn last_frame(&self) -> Option<&RenderFrame> {
        self.last_frame.as_ref()
    }

    /// True while repeated analysis faults keep the neutral fallback active.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn total_faults(&self) -> u64 {
        self.extractor.total_faults()
    }

    /// Switches mode instantly; nothing from the old mode carries over.
    pub fn select_mode(&mut self, mode: VisualizationMode) {
        self.mapper.select(mode);
        self.clear_history();
    }

    /// Forgets everything derived from the previous asset.
    pub fn reset(&mut self) {
        self.mapper.reset();
        self.clear_history();
    }

    fn clear_history(&mut self) {
        self.last_frame = None;
        self.consecutive_faults = 0;
        self.degraded = false;
    }

    /// Produces the frame for this tick. While not playing the last frame is
    /// repeated (or the neutral frame if there is none yet).
    pub fn tick(&mut self, asset: Option<&AudioAsset>, state: &TransportState) -> TickReport {
        let asset = match asset {
            Some(asset) if state.playing => asset,
            _ => {
                let frame = self
                    .last_frame
                    .clone()
                    .unwrap_or_else(|| self.mapper.mode().neutral_frame(state.position));
                return TickReport {
                    frame,
                    fresh: false,
                    faults: 0,
                    entered_fallback: false,
                };
            }
        };

        let window = self.sampler.sample(asset, state.position);
        let features = self.extractor.analyze(&window);
        let faults = self.extractor.faults().len();

        if faults > 0 {
            self.consecutive_faults = self.consecutive_faults.saturating_add(1);
        } else {
            self.consecutive_faults = 0;
            if self.degraded {
                self.degraded = false;
                tracing::info!(position = state.position, "analysis recovered");
            }
        }

        let mut entered_fallback = false;
        let frame = if self.consecutive_faults >= self.fault_threshold {
            if !self.degraded {
                self.degraded = true;
                entered_fallback = true;
                tracing::warn!(
                    consecutive = self.consecutive_faults,
                    "repeated analysis faults, showing neutral frame"
                );
            }
            self.mapper.reset();
            self.mapper.mode().neutral_frame(state.position)
        } else {
            self.mapper.map(&features, &window)
        };

        self.last_frame = Some(frame.clone());
        TickReport {
            frame,
            fresh: true,
            faults,
            entered_fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ModeConfig, ModeId};

    fn playing_at(position: f64) -> TransportState {
        TransportState {
            position,
            duration: 10.0,
            playing: true,
            volume: 1.0,
            muted: false,
            looping: false,
        }
    }

    fn scheduler(mode: ModeId, fault_threshold: u32) -> RenderScheduler {
        let config = AnalysisConfig {
            window_length: 256,
            fault_threshold,
            ..Default::default()
        };
        RenderScheduler::new(
            &config,
            VisualizationMode::from_config(mode, &ModeConfig::default()),
        )
        .unwrap()
    }

    fn tone() -> AudioAsset {
        let samples = (0..8_000)
            .map(|i| (i as f32 * 0.3).sin() * (i as f32 / 8_000.0))
            .collect();
        AudioAsset::from_interleaved(samples, 1, 800).unwrap()
    }

    #[test]
    fn paused_ticks_repeat_last_frame() {
        let asset = tone();
        let mut scheduler = scheduler(ModeId::Spectrum, 4);

        let idle = scheduler.tick(Some(&asset), &TransportState { playing: false, ..playing_at(1.0) });
        assert!(!idle.fresh);
        assert!(idle.frame.neutral);

        let live = scheduler.tick(Some(&asset), &playing_at(2.0));
        assert!(live.fresh);

        let mut paused = playing_at(5.0);
        paused.playing = false;
        let frozen = scheduler.tick(Some(&asset), &paused);
        assert!(!frozen.fresh);
        assert_eq!(frozen.frame, live.frame);
    }

    #[test]
    fn fresh_frames_follow_playback_position() {
        let asset = tone();
        let mut scheduler = scheduler(ModeId::Waveform, 4);
        let mut last = f64::MIN;

        for step in 0..50 {
            let report = scheduler.tick(Some(&asset), &playing_at(step as f64 * 0.17));
            assert!(report.frame.timestamp >= last);
            last = report.frame.timestamp;
        }
    }

    #[test]
    fn repeated_faults_fall_back_to_neutral_and_recover() {
        let mut samples = vec![f32::NAN; 800];
        samples.extend(std::iter::repeat(0.4).take(800));
        let asset = AudioAsset::from_interleaved(samples, 1, 800).unwrap();
        let mut scheduler = scheduler(ModeId::Spectrum, 3);

        let first = scheduler.tick(Some(&asset), &playing_at(0.5));
        assert!(first.faults > 0);
        assert!(!first.frame.neutral);
        scheduler.tick(Some(&asset), &playing_at(0.55));
        let third = scheduler.tick(Some(&asset), &playing_at(0.6));
        assert!(third.entered_fallback);
        assert!(third.frame.neutral);
        assert!(scheduler.is_degraded());

        let fourth = scheduler.tick(Some(&asset), &playing_at(0.65));
        assert!(!fourth.entered_fallback);
        assert!(fourth.frame.neutral);

        let clean = scheduler.tick(Some(&asset), &playing_at(1.5));
        assert_eq!(clean.faults, 0);
        assert!(!clean.frame.neutral);
        assert!(!scheduler.is_degraded());
        assert!(scheduler.total_faults() > 0);
    }

    #[test]
    fn mode_switch_drops_frozen_frame() {
        let asset = tone();
        let mut scheduler = scheduler(ModeId::Spectrum, 4);
        scheduler.tick(Some(&asset), &playing_at(3.0));

        scheduler.select_mode(VisualizationMode::from_config(
            ModeId::Particles,
            &ModeConfig::default(),
        ));
        let mut paused = playing_at(3.0);
        paused.playing = false;
        let report = scheduler.tick(Some(&asset), &paused);

        assert_eq!(report.frame.mode, ModeId::Particles);
        assert!(report.frame.neutral);
    }
}
