use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::StudioError;

/// Identifier of a visualisation mode as selected by the UI shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeId {
    #[default]
    Spectrum,
    Particles,
    Waveform,
}

impl ModeId {
    pub const ALL: [ModeId; 3] = [ModeId::Spectrum, ModeId::Particles, ModeId::Waveform];

    /// Stable string identifier used by hosts and configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            ModeId::Spectrum => "spectrum",
            ModeId::Particles => "particles",
            ModeId::Waveform => "waveform",
        }
    }

    pub fn descriptor(self) -> ModeDescriptor {
        match self {
            ModeId::Spectrum => ModeDescriptor {
                id: self,
                name: "Frequency Spectrum",
                description: "Classic audio frequency visualization",
            },
            ModeId::Particles => ModeDescriptor {
                id: self,
                name: "Particle Field",
                description: "Dynamic particle-based visualization",
            },
            ModeId::Waveform => ModeDescriptor {
                id: self,
                name: "Waveform",
                description: "Real-time audio waveform display",
            },
        }
    }
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModeId {
    type Err = StudioError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        ModeId::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| StudioError::UnknownMode(value.to_string()))
    }
}

/// Human readable metadata for a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDescriptor {
    pub id: ModeId,
    pub name: &'static str,
    pub description: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_ids() {
        assert_eq!("spectrum".parse::<ModeId>().unwrap(), ModeId::Spectrum);
        assert_eq!(" Particles ".parse::<ModeId>().unwrap(), ModeId::Particles);
        assert_eq!("WAVEFORM".parse::<ModeId>().unwrap(), ModeId::Waveform);
    }

    #[test]
    fn rejects_unknown_ids() {
        let err = "laser".parse::<ModeId>().unwrap_err();
        assert!(matches!(err, StudioError::UnknownMode(ref id) if id == "laser"));
    }

    #[test]
    fn ids_round_trip_through_display() {
        for mode in ModeId::ALL {
            assert_eq!(mode.to_string().parse::<ModeId>().unwrap(), mode);
            assert_eq!(mode.descriptor().id, mode);
        }
    }
}
