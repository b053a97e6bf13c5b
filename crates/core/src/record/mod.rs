use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{ErrorKind, RenderFrame, Result, StudioError, StudioObserver};

/// Configuration options for offline frame recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    pub output_path: PathBuf,
    pub fps: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("frames.jsonl"),
            fps: 60,
        }
    }
}

impl RecordingSettings {
    /// Playback time covered by one recorded tick.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

/// Observer that writes every published frame as one JSON line.
///
/// Observer callbacks cannot fail, so the first write error is kept and
/// returned from [`finish`](Self::finish); later frames are dropped.
#[derive(Debug)]
pub struct FrameRecorder<W: Write> {
    writer: W,
    frames_written: u64,
    errors_seen: u64,
    failure: Option<StudioError>,
}

impl FrameRecorder<BufWriter<File>> {
    /// Creates (or truncates) the output file named in `settings`.
    pub fn create(settings: &RecordingSettings) -> Result<Self> {
        let file = File::create(&settings.output_path)?;
        tracing::info!(path = ?settings.output_path, fps = settings.fps, "recording frames");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> FrameRecorder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_written: 0,
            errors_seen: 0,
            failure: None,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Errors the studio reported while recording.
    pub fn errors_seen(&self) -> u64 {
        self.errors_seen
    }

    /// Flushes the writer and returns the number of frames written.
    pub fn finish(&mut self) -> Result<u64> {
        if let Some(err) = self.failure.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok(self.frames_written)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_frame(&mut self, frame: &RenderFrame) -> Result<()> {
        serde_json::to_writer(&mut self.writer, frame)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> StudioObserver for FrameRecorder<W> {
    fn on_frame(&mut self, frame: &RenderFrame) {
        if self.failure.is_some() {
            return;
        }
        match self.write_frame(frame) {
            Ok(()) => self.frames_written += 1,
            Err(err) => {
                tracing::error!(error = %err, "failed to record frame");
                self.failure = Some(err);
            }
        }
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        self.errors_seen += 1;
        tracing::debug!(?kind, message, "studio error during recording");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ModeConfig, ModeId, VisualizationMode};

    #[test]
    fn writes_one_json_line_per_frame() {
        let mut recorder = FrameRecorder::new(Vec::new());
        let mode = VisualizationMode::from_config(ModeId::Waveform, &ModeConfig::default());
        recorder.on_frame(&mode.neutral_frame(0.0));
        recorder.on_frame(&mode.neutral_frame(0.5));

        assert_eq!(recorder.finish().unwrap(), 2);
        let output = String::from_utf8(recorder.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let frame: RenderFrame = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(frame.mode, ModeId::Waveform);
        assert_eq!(frame.timestamp, 0.5);
        assert!(frame.neutral);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn keeps_first_write_error_for_finish() {
        let mut recorder = FrameRecorder::new(BrokenPipe);
        let mode = VisualizationMode::from_config(ModeId::Spectrum, &ModeConfig::default());
        recorder.on_frame(&mode.neutral_frame(0.0));
        recorder.on_frame(&mode.neutral_frame(0.1));

        assert_eq!(recorder.frames_written(), 0);
        assert!(recorder.finish().is_err());
    }

    #[test]
    fn frame_interval_matches_fps() {
        let settings = RecordingSettings {
            fps: 50,
            ..Default::default()
        };
        assert_eq!(settings.frame_interval(), Duration::from_millis(20));
    }
}
