use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::{
    assets::LoadOutcome, AssetInfo, AssetLoader, Clock, DecodeError, ErrorKind, LoadTicket,
    ModeId, PlaybackEvent, RenderFrame, RenderScheduler, Result, StudioConfig, StudioError,
    SystemClock, Transport, TransportState, VisualizationMode,
};

/// Lifecycle of the studio as seen by the UI shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudioPhase {
    /// No asset loaded.
    Idle,
    /// Asset loaded, not playing.
    Loaded,
    Playing,
    /// Not playing, after having been paused by the user.
    Paused,
}

/// Receives outbound notifications from the controller. Every method has an
/// empty default so hosts only implement what they need.
pub trait StudioObserver {
    fn on_state_change(&mut self, _state: &TransportState) {}

    fn on_frame(&mut self, _frame: &RenderFrame) {}

    fn on_error(&mut self, _kind: ErrorKind, _message: &str) {}
}

/// Lets a host keep a handle to an observer it registered.
impl<T: StudioObserver + ?Sized> StudioObserver for Arc<Mutex<T>> {
    fn on_state_change(&mut self, state: &TransportState) {
        if let Ok(mut observer) = self.lock() {
            observer.on_state_change(state);
        }
    }

    fn on_frame(&mut self, frame: &RenderFrame) {
        if let Ok(mut observer) = self.lock() {
            observer.on_frame(frame);
        }
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        if let Ok(mut observer) = self.lock() {
            observer.on_error(kind, message);
        }
    }
}

/// Inbound request that can be queued from any thread and is applied at the
/// start of the next tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LoadAsset(Vec<u8>),
    Play,
    Pause,
    Stop,
    Seek(f64),
    SetVolume(f32),
    SetMuted(bool),
    SetLoop(bool),
    SelectMode(ModeId),
    Clear,
}

/// Read-only view handed to the UI shell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudioSnapshot {
    pub phase: StudioPhase,
    pub mode: ModeId,
    pub transport: TransportState,
    pub asset: Option<AssetInfo>,
    /// A background decode is in flight.
    pub loading: bool,
    /// Repeated analysis faults forced the neutral fallback frame.
    pub degraded: bool,
}

/// Top-level coordinator wiring user actions to the transport, the loader and
/// the render scheduler.
pub struct StudioController {
    config: StudioConfig,
    transport: Transport,
    loader: AssetLoader,
    scheduler: RenderScheduler,
    phase: StudioPhase,
    observers: Vec<Box<dyn StudioObserver>>,
    commands: Sender<Command>,
    inbox: Receiver<Command>,
}

impl StudioController {
    /// Creates a controller driven by the wall clock.
    pub fn new(config: StudioConfig) -> Result<Self> {
        Self::with_clock(config, Box::new(SystemClock::new()))
    }

    pub fn with_clock(config: StudioConfig, clock: Box<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let mode = VisualizationMode::from_config(config.modes.initial, &config.modes);
        let scheduler = RenderScheduler::new(&config.analysis, mode)?;
        let transport = Transport::with_config(clock, &config.transport);
        let (commands, inbox) = unbounded();

        Ok(Self {
            config,
            transport,
            loader: AssetLoader::new(),
            scheduler,
            phase: StudioPhase::Idle,
            observers: Vec::new(),
            commands,
            inbox,
        })
    }

    pub fn subscribe(&mut self, observer: Box<dyn StudioObserver>) {
        self.observers.push(observer);
    }

    /// Sender for queueing [`Command`]s from other threads.
    pub fn command_sender(&self) -> Sender<Command> {
        self.commands.clone()
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn phase(&self) -> StudioPhase {
        self.phase
    }

    pub fn mode(&self) -> ModeId {
        self.scheduler.mode().id()
    }

    pub fn transport_state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn last_frame(&self) -> Option<&RenderFrame> {
        self.scheduler.last_frame()
    }

    pub fn snapshot(&self) -> StudioSnapshot {
        StudioSnapshot {
            phase: self.phase,
            mode: self.mode(),
            transport: self.transport.state(),
            asset: self.transport.asset().map(|asset| asset.info()),
            loading: self.loader.is_pending(),
            degraded: self.scheduler.is_degraded(),
        }
    }

    /// Decodes and installs an asset right away. On failure the controller
    /// stays exactly as it was.
    pub fn load_asset(&mut self, bytes: &[u8]) -> Result<()> {
        match self.transport.load(bytes).map(|_| ()) {
            Ok(()) => {
                self.loader.cancel();
                self.asset_installed();
                Ok(())
            }
            Err(err) => Err(self.report(err.into())),
        }
    }

    /// Starts decoding in the background. The asset is installed by a later
    /// [`tick`](Self::tick) unless another load supersedes it first.
    pub fn begin_load(&mut self, bytes: Vec<u8>) -> Result<LoadTicket> {
        self.loader.submit(bytes)
    }

    /// Blocks until the pending background load finishes and applies it.
    /// Returns `None` when nothing was pending or the timeout passed.
    pub fn wait_for_load(&mut self, timeout: Duration) -> Option<Result<()>> {
        let outcome = self.loader.wait(timeout)?;
        Some(self.apply_load(outcome))
    }

    fn poll_loads(&mut self) {
        if let Some(outcome) = self.loader.poll() {
            // Failures are already reported to observers.
            let _ = self.apply_load(outcome);
        }
    }

    fn apply_load(&mut self, outcome: LoadOutcome) -> Result<()> {
        match outcome.result {
            Ok(asset) => {
                tracing::debug!(ticket = ?outcome.ticket, "background load finished");
                self.transport.install(asset);
                self.asset_installed();
                Ok(())
            }
            Err(DecodeError::Cancelled) => Ok(()),
            Err(err) => Err(self.report(err.into())),
        }
    }

    fn asset_installed(&mut self) {
        self.scheduler.reset();
        self.phase = StudioPhase::Loaded;
        self.notify_state();
    }

    pub fn play(&mut self) -> Result<()> {
        self.sync_transport();
        if self.transport.state().playing {
            return Ok(());
        }
        if let Err(err) = self.transport.play() {
            return Err(self.report(err.into()));
        }
        self.phase = StudioPhase::Playing;
        self.notify_state();
        Ok(())
    }

    pub fn pause(&mut self) {
        self.sync_transport();
        if self.phase != StudioPhase::Playing {
            return;
        }
        self.transport.pause();
        self.phase = StudioPhase::Paused;
        self.notify_state();
    }

    /// Stops and rewinds. The asset stays loaded.
    pub fn stop(&mut self) {
        if self.phase == StudioPhase::Idle {
            return;
        }
        self.transport.stop();
        self.phase = StudioPhase::Loaded;
        self.notify_state();
    }

    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        self.sync_transport();
        if let Err(err) = self.transport.seek(seconds) {
            return Err(self.report(err.into()));
        }
        self.notify_state();
        Ok(())
    }

    pub fn seek_fraction(&mut self, fraction: f64) -> Result<()> {
        self.sync_transport();
        if let Err(err) = self.transport.seek_fraction(fraction) {
            return Err(self.report(err.into()));
        }
        self.notify_state();
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.transport.set_volume(volume);
        self.notify_state();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.transport.set_muted(muted);
        self.notify_state();
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.sync_transport();
        self.transport.set_loop(looping);
        self.notify_state();
    }

    /// Switches visualisation mode. Transport state is untouched.
    pub fn select_mode(&mut self, mode: ModeId) {
        if mode == self.mode() {
            return;
        }
        let mode = VisualizationMode::from_config(mode, &self.config.modes);
        self.scheduler.select_mode(mode);
    }

    /// Like [`select_mode`](Self::select_mode) but takes the string id used by
    /// hosts, e.g. `"particles"`.
    pub fn select_mode_id(&mut self, id: &str) -> Result<()> {
        match id.parse::<ModeId>() {
            Ok(mode) => {
                self.select_mode(mode);
                Ok(())
            }
            Err(err) => Err(self.report(err)),
        }
    }

    /// Unloads the asset, cancels any pending load and returns to idle.
    pub fn clear(&mut self) {
        self.loader.cancel();
        self.transport.unload();
        self.scheduler.reset();
        self.phase = StudioPhase::Idle;
        self.notify_state();
    }

    /// Applies one command. Errors are reported to observers as well.
    pub fn apply(&mut self, command: Command) -> Result<()> {
        match command {
            Command::LoadAsset(bytes) => self.load_asset(&bytes)?,
            Command::Play => self.play()?,
            Command::Pause => self.pause(),
            Command::Stop => self.stop(),
            Command::Seek(seconds) => self.seek(seconds)?,
            Command::SetVolume(volume) => self.set_volume(volume),
            Command::SetMuted(muted) => self.set_muted(muted),
            Command::SetLoop(looping) => self.set_loop(looping),
            Command::SelectMode(mode) => self.select_mode(mode),
            Command::Clear => self.clear(),
        }
        Ok(())
    }

    /// Advances one rendered frame: applies queued commands and finished
    /// loads, brings the transport up to date, then computes and publishes
    /// the frame.
    pub fn tick(&mut self) -> RenderFrame {
        while let Ok(command) = self.inbox.try_recv() {
            // Failures are already reported to observers.
            let _ = self.apply(command);
        }
        self.poll_loads();
        self.sync_transport();

        let state = self.transport.state();
        let report = self.scheduler.tick(self.transport.asset(), &state);
        if report.entered_fallback {
            self.notify_error(
                ErrorKind::Analysis,
                "audio analysis keeps failing; showing a neutral frame",
            );
        }

        for observer in &mut self.observers {
            observer.on_frame(&report.frame);
        }
        report.frame
    }

    /// Brings the transport up to date and publishes end-of-stream events, so
    /// the phase never claims `Playing` for a stopped transport.
    fn sync_transport(&mut self) {
        match self.transport.sync() {
            PlaybackEvent::Ended => {
                self.phase = StudioPhase::Loaded;
                self.notify_state();
            }
            // The transport stopped inside one of its own commands.
            PlaybackEvent::Stationary if self.phase == StudioPhase::Playing => {
                self.phase = StudioPhase::Loaded;
                self.notify_state();
            }
            PlaybackEvent::Wrapped => self.notify_state(),
            PlaybackEvent::Advanced | PlaybackEvent::Stationary => {}
        }
    }

    fn report(&mut self, err: StudioError) -> StudioError {
        tracing::warn!(error = %err, "studio command failed");
        self.notify_error(err.kind(), &err.to_string());
        err
    }

    fn notify_state(&mut self) {
        let state = self.transport.state();
        for observer in &mut self.observers {
            observer.on_state_change(&state);
        }
    }

    fn notify_error(&mut self, kind: ErrorKind, message: &str) {
        for observer in &mut self.observers {
            observer.on_error(kind, message);
        }
    }
}

impl fmt::Debug for StudioController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudioController")
            .field("phase", &self.phase)
            .field("transport", &self.transport)
            .field("scheduler", &self.scheduler)
            .field("observers", &self.observers.len())
            .finish()
    }
}
