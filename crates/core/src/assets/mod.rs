use std::{
    fmt,
    io::{self, Cursor},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{DecodeError, Result};

/// Frames a stream may fall short of its declared length before it counts as
/// truncated. Lossy codecs trim encoder delay and padding.
const TRUNCATION_TOLERANCE_FRAMES: u64 = 4096;

/// Immutable handle to a decoded, interleaved sample buffer.
///
/// Cloning is cheap: the samples are shared, never copied.
#[derive(Clone)]
pub struct AudioAsset {
    sample_rate: u32,
    channels: u16,
    samples: Arc<[f32]>,
}

impl AudioAsset {
    /// Builds an asset from interleaved samples. Finite samples are clamped to
    /// `[-1, 1]`; a trailing partial frame is dropped.
    pub fn from_interleaved(
        mut samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
    ) -> std::result::Result<Self, DecodeError> {
        if sample_rate == 0 {
            return Err(DecodeError::UnsupportedFormat(
                "sample rate must be positive".to_string(),
            ));
        }
        if !(1..=2).contains(&channels) {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{channels} channels are not supported, expected mono or stereo"
            )));
        }

        let whole = samples.len() - samples.len() % usize::from(channels);
        samples.truncate(whole);
        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }
        for sample in &mut samples {
            *sample = sample.clamp(-1.0, 1.0);
        }

        Ok(Self {
            sample_rate,
            channels,
            samples: samples.into(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of sample frames (one sample per channel).
    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }

    /// Raw interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the frame at `index` down-mixed to mono, or `None` outside the
    /// asset.
    pub fn mono_frame(&self, index: usize) -> Option<f32> {
        let channels = usize::from(self.channels);
        let start = index.checked_mul(channels)?;
        let frame = self.samples.get(start..start + channels)?;
        let sum: f32 = frame.iter().sum();
        Some(sum / channels as f32)
    }

    pub fn info(&self) -> AssetInfo {
        AssetInfo {
            sample_rate: self.sample_rate,
            channels: self.channels,
            frames: self.frame_count(),
            duration_seconds: self.duration_seconds(),
        }
    }
}

impl fmt::Debug for AudioAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioAsset")
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("frames", &self.frame_count())
            .finish()
    }
}

/// Read-only description of a loaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: usize,
    pub duration_seconds: f64,
}

/// Decodes an in-memory audio file.
pub fn decode(bytes: &[u8]) -> std::result::Result<AudioAsset, DecodeError> {
    decode_cancellable(bytes, &AtomicBool::new(false))
}

/// Decodes an in-memory audio file, giving up with [`DecodeError::Cancelled`]
/// as soon as `cancel` is raised. The flag is checked between packets.
pub fn decode_cancellable(
    bytes: &[u8],
    cancel: &AtomicBool,
) -> std::result::Result<AudioAsset, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| DecodeError::UnsupportedFormat(err.to_string()))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::UnsupportedFormat("no audio track found".to_string()))?;
    let track_id = track.id;
    let declared_frames = track.codec_params.n_frames;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|channels| channels.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| DecodeError::UnsupportedFormat(err.to_string()))?;

    let mut samples = Vec::<f32>::new();
    let mut skipped_packets = 0usize;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(DecodeError::Cancelled);
        }

        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(DecodeError::Truncated(err.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if decoded.frames() == 0 {
                    continue;
                }
                let spec = *decoded.spec();
                if sample_rate.is_none() {
                    sample_rate = Some(spec.rate);
                }
                if channels.is_none() {
                    channels = Some(spec.channels.count());
                }

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(reason)) => {
                skipped_packets += 1;
                tracing::warn!(reason, "skipping undecodable packet");
            }
            Err(SymphoniaError::IoError(err)) => {
                return Err(DecodeError::Truncated(err.to_string()));
            }
            Err(err) => return Err(DecodeError::UnsupportedFormat(err.to_string())),
        }
    }

    let channels = channels
        .ok_or_else(|| DecodeError::UnsupportedFormat("unknown channel layout".to_string()))?;
    let sample_rate = sample_rate
        .ok_or_else(|| DecodeError::UnsupportedFormat("unknown sample rate".to_string()))?;
    let channels = u16::try_from(channels).map_err(|_| {
        DecodeError::UnsupportedFormat(format!("{channels} channels are not supported"))
    })?;

    let decoded_frames = (samples.len() / usize::from(channels.max(1))) as u64;
    if decoded_frames == 0 {
        return Err(DecodeError::Empty);
    }
    if let Some(declared) = declared_frames {
        if decoded_frames + TRUNCATION_TOLERANCE_FRAMES < declared {
            return Err(DecodeError::Truncated(format!(
                "decoded {decoded_frames} of {declared} frames"
            )));
        }
    }

    let asset = AudioAsset::from_interleaved(samples, channels, sample_rate)?;
    tracing::debug!(
        sample_rate,
        channels,
        frames = asset.frame_count(),
        skipped_packets,
        "decoded audio asset"
    );
    Ok(asset)
}

/// Identifies one submission to the [`AssetLoader`]. Later tickets compare
/// greater than earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadTicket(u64);

/// Result of a background decode.
#[derive(Debug)]
pub struct LoadOutcome {
    pub ticket: LoadTicket,
    pub result: std::result::Result<AudioAsset, DecodeError>,
}

/// Runs decodes on worker threads. Only the most recent submission can ever
/// be delivered; older ones are cancelled and their results dropped.
#[derive(Debug)]
pub struct AssetLoader {
    sender: Sender<LoadOutcome>,
    receiver: Receiver<LoadOutcome>,
    next_ticket: u64,
    current: Option<(LoadTicket, Arc<AtomicBool>)>,
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetLoader {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            next_ticket: 0,
            current: None,
        }
    }

    /// Starts decoding `bytes` in the background, cancelling any decode that
    /// is still in flight.
    pub fn submit(&mut self, bytes: Vec<u8>) -> Result<LoadTicket> {
        self.cancel();

        self.next_ticket += 1;
        let ticket = LoadTicket(self.next_ticket);
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let sender = self.sender.clone();

        thread::Builder::new()
            .name("asset-decode".to_string())
            .spawn(move || {
                let result = decode_cancellable(&bytes, &flag);
                // The loader may already be gone; nobody is left to tell.
                let _ = sender.send(LoadOutcome { ticket, result });
            })?;

        tracing::debug!(?ticket, "submitted background decode");
        self.current = Some((ticket, cancel));
        Ok(ticket)
    }

    /// Cancels the in-flight decode, if any. Its result will be discarded.
    pub fn cancel(&mut self) {
        if let Some((ticket, flag)) = self.current.take() {
            flag.store(true, Ordering::Relaxed);
            tracing::debug!(?ticket, "cancelled background decode");
        }
    }

    pub fn is_pending(&self) -> bool {
        self.current.is_some()
    }

    /// Returns the outcome of the latest submission if it has arrived,
    /// dropping any stale outcomes queued before it.
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        let mut delivered = None;
        while let Ok(outcome) = self.receiver.try_recv() {
            if let Some(outcome) = self.accept(outcome) {
                delivered = Some(outcome);
            }
        }
        delivered
    }

    /// Blocks until the latest submission finishes or `timeout` passes.
    pub fn wait(&mut self, timeout: Duration) -> Option<LoadOutcome> {
        let deadline = Instant::now() + timeout;
        while self.current.is_some() {
            match self.receiver.recv_deadline(deadline) {
                Ok(outcome) => {
                    if let Some(outcome) = self.accept(outcome) {
                        return Some(outcome);
                    }
                }
                Err(_) => return None,
            }
        }
        None
    }

    fn accept(&mut self, outcome: LoadOutcome) -> Option<LoadOutcome> {
        match &self.current {
            Some((ticket, _)) if *ticket == outcome.ticket => {
                self.current = None;
                Some(outcome)
            }
            _ => {
                tracing::debug!(ticket = ?outcome.ticket, "discarding stale decode result");
                None
            }
        }
    }
}
