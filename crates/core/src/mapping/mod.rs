use serde::{Deserialize, Serialize};

use crate::{
    config::{ModeConfig, ParticleParams, SpectrumParams, WaveformParams},
    FeatureSet, ModeId, SampleWindow,
};

/// A visualisation mode together with its tunables.
#[derive(Debug, Clone, PartialEq)]
pub enum VisualizationMode {
    Spectrum(SpectrumParams),
    Particles(ParticleParams),
    Waveform(WaveformParams),
}

impl VisualizationMode {
    pub fn from_config(id: ModeId, config: &ModeConfig) -> Self {
        match id {
            ModeId::Spectrum => Self::Spectrum(config.spectrum.clone()),
            ModeId::Particles => Self::Particles(config.particles.clone()),
            ModeId::Waveform => Self::Waveform(config.waveform.clone()),
        }
    }

    pub fn id(&self) -> ModeId {
        match self {
            Self::Spectrum(_) => ModeId::Spectrum,
            Self::Particles(_) => ModeId::Particles,
            Self::Waveform(_) => ModeId::Waveform,
        }
    }

    /// Weight of the previous frame when blending with the current one.
    pub fn smoothing(&self) -> f32 {
        match self {
            Self::Spectrum(params) => params.smoothing,
            Self::Particles(params) => params.smoothing,
            Self::Waveform(params) => params.smoothing,
        }
    }

    /// The resting frame this mode starts from and falls back to.
    pub fn neutral_frame(&self, timestamp: f64) -> RenderFrame {
        let values = match self {
            Self::Spectrum(params) => FrameValues::Bars(vec![params.floor; params.bars]),
            Self::Particles(params) => FrameValues::Particles(ParticleField {
                count: params.min_count,
                level: 0.0,
                scale: 0.5,
                velocity: 0.0,
                offsets: vec![0.0; params.max_count],
            }),
            Self::Waveform(params) => FrameValues::Path(vec![0.0; params.points]),
        };
        RenderFrame {
            mode: self.id(),
            timestamp,
            neutral: true,
            values,
        }
    }

    /// Maps one tick's features to render values, blending against
    /// `previous`. A `previous` frame from another mode counts as neutral.
    pub fn map(
        &self,
        features: &FeatureSet,
        window: &SampleWindow,
        previous: &RenderFrame,
    ) -> RenderFrame {
        let values = match self {
            Self::Spectrum(params) => map_spectrum(params, features, previous),
            Self::Particles(params) => map_particles(params, features, previous),
            Self::Waveform(params) => map_waveform(params, window, previous),
        };
        RenderFrame {
            mode: self.id(),
            timestamp: features.timestamp,
            neutral: false,
            values,
        }
    }
}

fn map_spectrum(
    params: &SpectrumParams,
    features: &FeatureSet,
    previous: &RenderFrame,
) -> FrameValues {
    let current = group_average(&features.magnitudes, params.bars);
    let previous = match &previous.values {
        FrameValues::Bars(heights) if heights.len() == params.bars => heights.as_slice(),
        _ => &[][..],
    };

    let heights = current
        .iter()
        .enumerate()
        .map(|(bar, value)| {
            let last = previous.get(bar).copied().unwrap_or(params.floor);
            blend(last, *value, params.smoothing).clamp(params.floor, 1.0)
        })
        .collect();
    FrameValues::Bars(heights)
}

fn map_particles(
    params: &ParticleParams,
    features: &FeatureSet,
    previous: &RenderFrame,
) -> FrameValues {
    let (last_level, last_offsets) = match &previous.values {
        FrameValues::Particles(field) if field.offsets.len() == params.max_count => {
            (field.level, field.offsets.as_slice())
        }
        _ => (0.0, &[][..]),
    };

    let loudness = ((features.rms + features.peak) * 0.5).clamp(0.0, 1.0);
    let level = blend(last_level, loudness, params.smoothing).clamp(0.0, 1.0);
    let spread = params.max_count.saturating_sub(params.min_count) as f32;
    let count = params.min_count + (spread * level).round() as usize;

    let offsets = group_average(&features.magnitudes, params.max_count)
        .into_iter()
        .enumerate()
        .map(|(slot, magnitude)| {
            let direction = if slot % 2 == 0 { 1.0 } else { -1.0 };
            let last = last_offsets.get(slot).copied().unwrap_or(0.0);
            blend(last, direction * magnitude.clamp(0.0, 1.0), params.smoothing)
        })
        .collect();

    FrameValues::Particles(ParticleField {
        count: count.min(params.max_count),
        level,
        scale: 0.5 + level,
        velocity: params.max_velocity * level,
        offsets,
    })
}

fn map_waveform(
    params: &WaveformParams,
    window: &SampleWindow,
    previous: &RenderFrame,
) -> FrameValues {
    let previous = match &previous.values {
        FrameValues::Path(points) if points.len() == params.points => points.as_slice(),
        _ => &[][..],
    };

    let len = window.samples.len();
    let points = (0..params.points)
        .map(|point| {
            let current = if len == 0 {
                0.0
            } else {
                // Midpoint of the point's share of the window.
                let index = ((2 * point + 1) * len / (2 * params.points)).min(len - 1);
                let sample = window.samples[index];
                if sample.is_finite() {
                    sample.clamp(-1.0, 1.0)
                } else {
                    0.0
                }
            };
            let last = previous.get(point).copied().unwrap_or(0.0);
            blend(last, current, params.smoothing)
        })
        .collect();
    FrameValues::Path(points)
}

fn blend(previous: f32, current: f32, smoothing: f32) -> f32 {
    smoothing * previous + (1.0 - smoothing) * current
}

/// Averages `values` into `groups` contiguous, near-equal groups. With fewer
/// values than groups, neighbouring groups repeat a value.
fn group_average(values: &[f32], groups: usize) -> Vec<f32> {
    let len = values.len();
    (0..groups)
        .map(|group| {
            if len == 0 {
                return 0.0;
            }
            let start = (group * len / groups).min(len - 1);
            let end = ((group + 1) * len / groups).clamp(start + 1, len);
            let slice = &values[start..end];
            slice.iter().sum::<f32>() / slice.len() as f32
        })
        .collect()
}

/// Per-particle perturbation derived from loudness and spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleField {
    /// Number of particles the surface should show.
    pub count: usize,
    /// Smoothed loudness in `[0, 1]` the other fields derive from.
    pub level: f32,
    pub scale: f32,
    /// Upper bound for particle speed.
    pub velocity: f32,
    /// Signed offsets in `[-1, 1]`, one per particle slot.
    pub offsets: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameValues {
    /// Bar heights in `[floor, 1]`, indexed by bar.
    Bars(Vec<f32>),
    Particles(ParticleField),
    /// Path amplitudes in `[-1, 1]`, indexed by point.
    Path(Vec<f32>),
}

/// Render parameters for one tick. Consumed once by the rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderFrame {
    pub mode: ModeId,
    /// Playback position the frame was computed from.
    pub timestamp: f64,
    /// Set for resting frames that were not derived from audio.
    pub neutral: bool,
    pub values: FrameValues,
}

impl RenderFrame {
    /// Render value of the visual element with the given index.
    pub fn value(&self, index: usize) -> Option<f32> {
        match &self.values {
            FrameValues::Bars(values) | FrameValues::Path(values) => values.get(index).copied(),
            FrameValues::Particles(field) => field.offsets.get(index).copied(),
        }
    }

    /// Number of addressable visual elements.
    pub fn len(&self) -> usize {
        match &self.values {
            FrameValues::Bars(values) | FrameValues::Path(values) => values.len(),
            FrameValues::Particles(field) => field.offsets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The active mode plus its smoothing history.
#[derive(Debug, Clone)]
pub struct ModeMapper {
    mode: VisualizationMode,
    previous: RenderFrame,
}

impl ModeMapper {
    pub fn new(mode: VisualizationMode) -> Self {
        let previous = mode.neutral_frame(0.0);
        Self { mode, previous }
    }

    pub fn mode(&self) -> &VisualizationMode {
        &self.mode
    }

    /// The last frame produced, or the neutral baseline.
    pub fn previous(&self) -> &RenderFrame {
        &self.previous
    }

    /// Switches mode. History restarts from the new mode's baseline.
    pub fn select(&mut self, mode: VisualizationMode) {
        tracing::debug!(from = %self.mode.id(), to = %mode.id(), "switching visualisation mode");
        self.previous = mode.neutral_frame(self.previous.timestamp);
        self.mode = mode;
    }

    /// Drops smoothing history.
    pub fn reset(&mut self) {
        self.previous = self.mode.neutral_frame(self.previous.timestamp);
    }

    pub fn map(&mut self, features: &FeatureSet, window: &SampleWindow) -> RenderFrame {
        let frame = self.mode.map(features, window, &self.previous);
        self.previous = frame.clone();
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(magnitudes: Vec<f32>, peak: f32, rms: f32) -> FeatureSet {
        FeatureSet {
            timestamp: 1.0,
            sample_rate: 44_100,
            magnitudes,
            peak,
            rms,
            spectral_centroid: 0.0,
        }
    }

    fn window(samples: Vec<f32>) -> SampleWindow {
        SampleWindow {
            samples,
            position: 1.0,
            sample_rate: 44_100,
        }
    }

    fn mode(id: ModeId) -> VisualizationMode {
        VisualizationMode::from_config(id, &ModeConfig::default())
    }

    #[test]
    fn groups_average_contiguous_buckets() {
        assert_eq!(group_average(&[1.0, 3.0, 5.0, 7.0], 2), vec![2.0, 6.0]);
        assert_eq!(group_average(&[1.0, 2.0], 4), vec![1.0, 1.0, 2.0, 2.0]);
        assert_eq!(group_average(&[], 3), vec![0.0; 3]);
    }

    #[test]
    fn spectrum_bars_respect_floor_and_smoothing() {
        let spectrum = VisualizationMode::Spectrum(SpectrumParams {
            bars: 4,
            smoothing: 0.5,
            floor: 0.1,
        });
        let mut mapper = ModeMapper::new(spectrum);
        let loud = features(vec![1.0; 8], 1.0, 0.7);
        let window = window(vec![0.0; 16]);

        let first = mapper.map(&loud, &window);
        assert_eq!(first.values, FrameValues::Bars(vec![0.55; 4]));

        let quiet = features(vec![0.0; 8], 0.0, 0.0);
        let mut frame = first;
        for _ in 0..32 {
            frame = mapper.map(&quiet, &window);
        }
        assert_eq!(frame.values, FrameValues::Bars(vec![0.1; 4]));
        assert!(!frame.neutral);
    }

    #[test]
    fn consecutive_frames_move_by_at_most_the_smoothing_bound() {
        for id in ModeId::ALL {
            let mut mapper = ModeMapper::new(mode(id));
            let smoothing = mapper.mode().smoothing();
            let mut previous = mapper.previous().clone();

            for step in 0..40 {
                let level = if step % 3 == 0 { 1.0 } else { 0.0 };
                let sign = if step % 2 == 0 { 1.0 } else { -1.0 };
                let frame = mapper.map(
                    &features(vec![level; 1024], level, level * 0.7),
                    &window(vec![sign * level; 2048]),
                );

                // Bars and offsets span 1.0, path points span 2.0.
                let range = if id == ModeId::Waveform { 2.0 } else { 1.0 };
                let bound = (1.0 - smoothing) * range + 1e-6;
                for index in 0..frame.len() {
                    let delta = frame.value(index).unwrap() - previous.value(index).unwrap();
                    assert!(delta.abs() <= bound, "{id} moved {delta} at {index}");
                }
                previous = frame;
            }
        }
    }

    #[test]
    fn mode_switch_starts_from_neutral_baseline() {
        let loud = features(vec![0.9; 512], 0.9, 0.6);
        let samples = window(vec![0.8; 1024]);

        let mut switched = ModeMapper::new(mode(ModeId::Spectrum));
        for _ in 0..5 {
            switched.map(&loud, &samples);
        }
        switched.select(mode(ModeId::Waveform));
        assert!(switched.previous().neutral);
        let after_switch = switched.map(&loud, &samples);

        let mut fresh = ModeMapper::new(mode(ModeId::Waveform));
        assert_eq!(after_switch, fresh.map(&loud, &samples));

        // Returning to the first mode does not resurrect its old history.
        switched.select(mode(ModeId::Spectrum));
        let back = switched.map(&loud, &samples);
        let mut fresh = ModeMapper::new(mode(ModeId::Spectrum));
        assert_eq!(back, fresh.map(&loud, &samples));
    }

    #[test]
    fn louder_input_raises_particle_dynamics() {
        let particles = mode(ModeId::Particles);
        let neutral = particles.neutral_frame(0.0);
        let quiet = particles.map(
            &features(vec![0.05; 64], 0.1, 0.05),
            &window(vec![0.0; 128]),
            &neutral,
        );
        let loud = particles.map(
            &features(vec![0.5; 64], 0.9, 0.6),
            &window(vec![0.0; 128]),
            &neutral,
        );

        let (FrameValues::Particles(quiet), FrameValues::Particles(loud)) =
            (quiet.values, loud.values)
        else {
            panic!("particle mode must emit particle fields");
        };
        assert!(loud.count > quiet.count);
        assert!(loud.scale > quiet.scale);
        assert!(loud.velocity > quiet.velocity);
        assert_eq!(loud.offsets.len(), 30);
        assert!(loud.offsets[0] > 0.0 && loud.offsets[1] < 0.0);
    }

    #[test]
    fn inverted_particle_bounds_cap_at_max_count() {
        let particles = VisualizationMode::Particles(ParticleParams {
            min_count: 12,
            max_count: 4,
            ..ParticleParams::default()
        });
        let frame = particles.map(
            &features(vec![0.5; 64], 0.9, 0.6),
            &window(vec![0.0; 128]),
            &particles.neutral_frame(0.0),
        );

        let FrameValues::Particles(field) = frame.values else {
            panic!("particle mode must emit particle fields");
        };
        assert_eq!(field.count, 4);
        assert_eq!(field.offsets.len(), 4);
    }

    #[test]
    fn waveform_subsamples_window_midpoints() {
        let waveform = VisualizationMode::Waveform(WaveformParams {
            points: 4,
            smoothing: 0.0,
        });
        let samples: Vec<f32> = (0..8).map(|i| i as f32 / 10.0).collect();
        let frame = waveform.map(
            &features(vec![0.0; 4], 0.7, 0.4),
            &window(samples),
            &waveform.neutral_frame(0.0),
        );

        assert_eq!(frame.values, FrameValues::Path(vec![0.1, 0.3, 0.5, 0.7]));
        assert_eq!(frame.timestamp, 1.0);
    }

    #[test]
    fn frame_values_are_addressable_by_element() {
        let frame = mode(ModeId::Spectrum).neutral_frame(0.0);
        assert_eq!(frame.len(), 20);
        assert_eq!(frame.value(19), Some(0.02));
        assert_eq!(frame.value(20), None);
    }
}
