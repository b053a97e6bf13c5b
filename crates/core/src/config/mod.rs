use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ModeId, Result, StudioError, WindowAlignment};

/// Top-level configuration structure for the studio core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub analysis: AnalysisConfig,
    pub transport: TransportConfig,
    pub modes: ModeConfig,
}

impl StudioConfig {
    /// Parses a JSON document. Missing sections fall back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!(?path, "loaded studio configuration");
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        self.transport.validate()?;
        self.modes.validate()
    }
}

/// Configuration of the sampler and feature extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of samples per analysis window. Must be a power of two.
    pub window_length: usize,
    pub alignment: WindowAlignment,
    /// Consecutive faulty frames tolerated before falling back to a neutral
    /// frame.
    pub fault_threshold: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_length: 2048,
            alignment: WindowAlignment::Centered,
            fault_threshold: 8,
        }
    }
}

impl AnalysisConfig {
    fn validate(&self) -> Result<()> {
        if self.window_length < 2 || !self.window_length.is_power_of_two() {
            return Err(StudioError::config(format!(
                "window_length must be a power of two >= 2, got {}",
                self.window_length
            )));
        }
        if self.fault_threshold == 0 {
            return Err(StudioError::config("fault_threshold must be at least 1"));
        }
        Ok(())
    }
}

/// Initial transport flags applied when the controller is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub volume: f32,
    pub muted: bool,
    pub looping: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            volume: 0.75,
            muted: false,
            looping: false,
        }
    }
}

impl TransportConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(StudioError::config(format!(
                "volume must be within [0, 1], got {}",
                self.volume
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    /// Mode active when the controller starts.
    pub initial: ModeId,
    pub spectrum: SpectrumParams,
    pub particles: ParticleParams,
    pub waveform: WaveformParams,
}

impl ModeConfig {
    fn validate(&self) -> Result<()> {
        let spectrum = &self.spectrum;
        check_smoothing("spectrum", spectrum.smoothing)?;
        if spectrum.bars == 0 {
            return Err(StudioError::config("spectrum.bars must be at least 1"));
        }
        if !(0.0..=1.0).contains(&spectrum.floor) {
            return Err(StudioError::config("spectrum.floor must be within [0, 1]"));
        }

        let particles = &self.particles;
        check_smoothing("particles", particles.smoothing)?;
        if particles.max_count == 0 || particles.min_count > particles.max_count {
            return Err(StudioError::config(format!(
                "particles counts must satisfy 0 <= min_count <= max_count and max_count > 0, got {}..{}",
                particles.min_count, particles.max_count
            )));
        }
        if !particles.max_velocity.is_finite() || particles.max_velocity < 0.0 {
            return Err(StudioError::config(
                "particles.max_velocity must be a finite, non-negative number",
            ));
        }

        check_smoothing("waveform", self.waveform.smoothing)?;
        if self.waveform.points == 0 {
            return Err(StudioError::config("waveform.points must be at least 1"));
        }
        Ok(())
    }
}

fn check_smoothing(mode: &str, smoothing: f32) -> Result<()> {
    if (0.0..1.0).contains(&smoothing) {
        Ok(())
    } else {
        Err(StudioError::config(format!(
            "{mode}.smoothing must be within [0, 1), got {smoothing}"
        )))
    }
}

/// Tunables for the bar spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumParams {
    pub bars: usize,
    pub smoothing: f32,
    /// Minimum bar height so bars never fully collapse.
    pub floor: f32,
}

impl Default for SpectrumParams {
    fn default() -> Self {
        Self {
            bars: 20,
            smoothing: 0.6,
            floor: 0.02,
        }
    }
}

/// Tunables for the particle field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleParams {
    pub min_count: usize,
    pub max_count: usize,
    pub smoothing: f32,
    pub max_velocity: f32,
}

impl Default for ParticleParams {
    fn default() -> Self {
        Self {
            min_count: 6,
            max_count: 30,
            smoothing: 0.5,
            max_velocity: 1.0,
        }
    }
}

/// Tunables for the waveform path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformParams {
    pub points: usize,
    pub smoothing: f32,
}

impl Default for WaveformParams {
    fn default() -> Self {
        Self {
            points: 128,
            smoothing: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        StudioConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_documents_fill_in_defaults() {
        let config = StudioConfig::from_json_str(
            r#"{ "analysis": { "window_length": 1024 }, "modes": { "initial": "waveform" } }"#,
        )
        .unwrap();

        assert_eq!(config.analysis.window_length, 1024);
        assert_eq!(config.analysis.alignment, WindowAlignment::Centered);
        assert_eq!(config.modes.initial, ModeId::Waveform);
        assert_eq!(config.modes.spectrum.bars, 20);
        assert!((config.transport.volume - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_non_power_of_two_windows() {
        let err = StudioConfig::from_json_str(r#"{ "analysis": { "window_length": 1000 } }"#)
            .unwrap_err();
        assert!(matches!(err, StudioError::Config(_)));
    }

    #[test]
    fn rejects_smoothing_of_one() {
        let mut config = StudioConfig::default();
        config.modes.waveform.smoothing = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_particle_counts() {
        let mut config = StudioConfig::default();
        config.modes.particles.min_count = 40;
        assert!(config.validate().is_err());
    }
}
