use serde::{Deserialize, Serialize};

use crate::{AudioAsset, Result, StudioError};

/// Where the window sits relative to the playback position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowAlignment {
    /// Half the window before the position, half after.
    #[default]
    Centered,
    /// The whole window ends at the position.
    Trailing,
}

/// Mono slice of samples around a playback position, valid for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    pub samples: Vec<f32>,
    /// Playback position (seconds) the window was taken at.
    pub position: f64,
    pub sample_rate: u32,
}

impl SampleWindow {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Cuts fixed-length, down-mixed windows out of an asset. Output depends only
/// on `(asset, position, window_length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSampler {
    window_length: usize,
    alignment: WindowAlignment,
}

impl FrameSampler {
    pub fn new(window_length: usize, alignment: WindowAlignment) -> Result<Self> {
        if window_length < 2 || !window_length.is_power_of_two() {
            return Err(StudioError::config(format!(
                "window length must be a power of two >= 2, got {window_length}"
            )));
        }
        Ok(Self {
            window_length,
            alignment,
        })
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    pub fn alignment(&self) -> WindowAlignment {
        self.alignment
    }

    /// Extracts the window at `position` seconds. Frames falling outside the
    /// asset are zero.
    pub fn sample(&self, asset: &AudioAsset, position: f64) -> SampleWindow {
        let sample_rate = asset.sample_rate();
        let frame = if position.is_finite() && position > 0.0 {
            (position * f64::from(sample_rate)).floor() as i64
        } else {
            0
        };

        let length = self.window_length as i64;
        let start = match self.alignment {
            WindowAlignment::Centered => frame - length / 2,
            WindowAlignment::Trailing => frame - length,
        };

        let samples = (start..start + length)
            .map(|index| {
                usize::try_from(index)
                    .ok()
                    .and_then(|index| asset.mono_frame(index))
                    .unwrap_or(0.0)
            })
            .collect();

        SampleWindow {
            samples,
            position,
            sample_rate,
        }
    }
}
