use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{AnalysisFault, SampleWindow};

/// Features extracted from one sample window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Playback position (seconds) the window was taken at.
    pub timestamp: f64,
    pub sample_rate: u32,
    /// One magnitude per bucket, normalised to `[0, 1]`. There are always
    /// `window_length / 2` buckets.
    pub magnitudes: Vec<f32>,
    /// Largest absolute sample value.
    pub peak: f32,
    /// Root mean square of the samples. Never exceeds `peak`.
    pub rms: f32,
    /// Normalised [0, 1] spectral centroid where 1.0 corresponds to the
    /// Nyquist frequency of the analysed block.
    pub spectral_centroid: f32,
}

impl FeatureSet {
    /// Width of one bucket in Hz.
    pub fn bucket_hz(&self) -> f32 {
        let window_length = self.magnitudes.len() * 2;
        if window_length == 0 {
            0.0
        } else {
            self.sample_rate as f32 / window_length as f32
        }
    }
}

/// Hann-windowed magnitude spectrum plus level statistics. The planner and
/// buffers are reused between calls, so one extractor should live as long as
/// the window length stays fixed.
pub struct FeatureExtractor {
    fft_planner: RealFftPlanner<f32>,
    fft: FftResources,
    faults: Vec<AnalysisFault>,
    total_faults: u64,
}

impl FeatureExtractor {
    pub fn new(window_length: usize) -> Self {
        let mut fft_planner = RealFftPlanner::new();
        let fft = FftResources::plan(&mut fft_planner, window_length);
        Self {
            fft_planner,
            fft,
            faults: Vec::new(),
            total_faults: 0,
        }
    }

    pub fn window_length(&self) -> usize {
        self.fft.size
    }

    /// Faults recorded during the most recent [`analyze`](Self::analyze).
    pub fn faults(&self) -> &[AnalysisFault] {
        &self.faults
    }

    pub fn total_faults(&self) -> u64 {
        self.total_faults
    }

    /// Analyses a window. Bad input never fails the call: non-finite samples
    /// are treated as silence and non-finite buckets as zero, and both are
    /// reported through [`faults`](Self::faults).
    pub fn analyze(&mut self, window: &SampleWindow) -> FeatureSet {
        self.faults.clear();
        let len = window.samples.len();
        if len < 2 {
            return FeatureSet {
                timestamp: window.position,
                sample_rate: window.sample_rate,
                ..Default::default()
            };
        }
        if len != self.fft.size {
            tracing::debug!(from = self.fft.size, to = len, "re-planning fft");
            self.fft = FftResources::plan(&mut self.fft_planner, len);
        }

        let mut peak = 0.0_f32;
        let mut energy = 0.0_f32;
        for (index, sample) in window.samples.iter().enumerate() {
            let value = if sample.is_finite() {
                *sample
            } else {
                self.faults.push(AnalysisFault::NonFiniteSample { index });
                0.0
            };
            peak = peak.max(value.abs());
            energy += value * value;
            self.fft.input[index] = value * self.fft.window[index];
        }
        let rms = (energy / len as f32).sqrt().min(peak);

        let magnitudes = self.spectrum(len);
        let spectral_centroid = spectral_centroid(&magnitudes);

        if !self.faults.is_empty() {
            self.total_faults += self.faults.len() as u64;
            tracing::warn!(
                faults = self.faults.len(),
                position = window.position,
                "recovered from analysis faults"
            );
        }

        FeatureSet {
            timestamp: window.position,
            sample_rate: window.sample_rate,
            magnitudes,
            peak,
            rms,
            spectral_centroid,
        }
    }

    fn spectrum(&mut self, len: usize) -> Vec<f32> {
        let buckets = len / 2;
        let fft = &mut self.fft;
        if let Err(err) =
            fft.plan
                .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
        {
            self.faults.push(AnalysisFault::Transform(err.to_string()));
            return vec![0.0; buckets];
        }

        let scale = buckets as f32;
        let mut magnitudes = Vec::with_capacity(buckets);
        for (bucket, bin) in fft.spectrum.iter().take(buckets).enumerate() {
            let magnitude = bin.norm() / scale;
            if magnitude.is_finite() {
                magnitudes.push(magnitude.clamp(0.0, 1.0));
            } else {
                self.faults.push(AnalysisFault::NonFiniteBucket { bucket });
                magnitudes.push(0.0);
            }
        }
        magnitudes
    }
}

fn spectral_centroid(magnitudes: &[f32]) -> f32 {
    let mut magnitude_sum = 0.0;
    let mut weighted_sum = 0.0;
    for (i, magnitude) in magnitudes.iter().enumerate() {
        magnitude_sum += magnitude;
        weighted_sum += magnitude * i as f32;
    }

    if magnitude_sum <= f32::EPSILON || magnitudes.is_empty() {
        0.0
    } else {
        (weighted_sum / magnitude_sum / magnitudes.len() as f32).clamp(0.0, 1.0)
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
    window: Vec<f32>,
}

impl FftResources {
    fn plan(planner: &mut RealFftPlanner<f32>, size: usize) -> Self {
        let plan = planner.plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let input = plan.make_input_vec();
        let window = (0..size).map(|index| hann_value(index, size)).collect();
        Self {
            size,
            plan,
            scratch,
            spectrum,
            input,
            window,
        }
    }
}

impl fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("fft", &self.fft)
            .field("faults", &self.faults)
            .field("total_faults", &self.total_faults)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
