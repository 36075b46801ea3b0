//! **Narration Pipeline** — the single execution context that ties capture,
//! analysis, scheduling, and speech together.
//!
//! One spawned task owns every piece of mutable state: the capture stream,
//! settings, transcript, timers, and the single-flight gate. Commands arrive
//! over a channel, analyses run in spawned tasks and report back over a
//! completion channel, so results are applied in completion order. Dropping
//! every handle (or calling `shutdown`) halts speech and releases the camera.

use crate::analysis::{AnalysisClient, NarrationResult};
use crate::camera::{self, CameraProvider, EncodedFrame, VideoStream};
use crate::error::{SightError, SightResult};
use crate::scheduler::{AutoTicker, FlightGate, SettleTimer};
use crate::settings::{NarrationMode, NarrationSettings, Verbosity};
use crate::speech::{SpeechArbiter, SpeechDevice};
use crate::transcript::TranscriptLog;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Configuration for the narration pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Mode active at startup
    pub mode: NarrationMode,

    /// Initial user settings
    pub settings: NarrationSettings,

    /// Delay between a mode switch and its automatic narration (default 500ms),
    /// giving the user time to re-aim the camera
    pub settle_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: NarrationMode::General,
            settings: NarrationSettings::default(),
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// Why a narration was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOrigin {
    /// Explicit user action
    Manual,
    /// Recurring auto-narration tick
    Auto,
    /// Scheduled shot after a mode switch
    ModeSwitch,
}

/// Events emitted by the pipeline
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Capture stream opened
    CaptureStarted,

    /// Capture stream released
    CaptureStopped,

    /// A narration completed and was handed to the speech arbiter
    Narrated {
        origin: TriggerOrigin,
        result: NarrationResult,
    },
}

/// Snapshot of pipeline state, for UIs and tests
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    pub active: bool,
    pub mode: NarrationMode,
    pub settings: NarrationSettings,
    pub auto_armed: bool,
    pub analysis_in_flight: bool,
}

enum Command {
    Activate { ack: oneshot::Sender<SightResult<()>> },
    Deactivate,
    Narrate,
    SetMode(NarrationMode),
    SetVerbosity(Verbosity),
    SetSpeechRate(f32),
    SetAutoNarration(bool),
    SetAutoIntervalMs(u64),
    Transcript { reply: oneshot::Sender<Vec<NarrationResult>> },
    Status { reply: oneshot::Sender<PipelineStatus> },
    Shutdown,
}

struct Completion {
    origin: TriggerOrigin,
    result: NarrationResult,
}

/// Builder for the pipeline task. `start` spawns it and hands back a session.
pub struct NarrationPipeline {
    camera: Arc<dyn CameraProvider>,
    analyzer: AnalysisClient,
    arbiter: SpeechArbiter,
    config: PipelineConfig,
}

impl NarrationPipeline {
    pub fn new(
        camera: Arc<dyn CameraProvider>,
        analyzer: AnalysisClient,
        speaker: Arc<dyn SpeechDevice>,
    ) -> Self {
        Self {
            camera,
            analyzer,
            arbiter: SpeechArbiter::new(speaker),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawn the pipeline task. Returns a session: command handle plus the
    /// event stream. Must be called from within a tokio runtime.
    pub fn start(self) -> PipelineSession {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let task = PipelineTask {
            camera: self.camera,
            analyzer: self.analyzer,
            arbiter: self.arbiter,
            settle_delay: self.config.settle_delay,
            mode: self.config.mode,
            settings: self.config.settings,
            transcript: TranscriptLog::new(),
            stream: None,
            ticker: AutoTicker::new(),
            settle: SettleTimer::new(),
            gate: FlightGate::new(),
            cmd_rx,
            event_tx,
            completion_tx,
            completion_rx,
        };
        tokio::spawn(task.run());

        PipelineSession {
            handle: PipelineHandle { cmd_tx },
            events: event_rx,
        }
    }
}

/// Session from [`NarrationPipeline::start`]: command handle plus event stream.
pub struct PipelineSession {
    pub handle: PipelineHandle,
    /// Capture state changes and completed narrations. Closed once the
    /// pipeline task exits.
    pub events: mpsc::UnboundedReceiver<PipelineEvent>,
}

/// Cloneable command handle. Dropping every handle shuts the pipeline down.
#[derive(Clone)]
pub struct PipelineHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl PipelineHandle {
    /// Open the capture stream. Fails with the device's reason when the
    /// camera is unavailable; the pipeline stays up so the user can retry.
    pub async fn activate(&self) -> SightResult<()> {
        let (ack, rx) = oneshot::channel();
        self.send(Command::Activate { ack }).await?;
        rx.await
            .map_err(|_| SightError::ChannelReceive("pipeline dropped activation ack".to_string()))?
    }

    /// Release the capture stream. In-flight analyses still complete.
    pub async fn deactivate(&self) -> SightResult<()> {
        self.send(Command::Deactivate).await
    }

    /// Trigger one narration now. Skipped when capture is inactive or no
    /// frame is ready; never gated by an in-flight auto request.
    pub async fn narrate(&self) -> SightResult<()> {
        self.send(Command::Narrate).await
    }

    /// Switch the narration mode. While capture is active and auto-narration
    /// is off, schedules one narration after the settle delay.
    pub async fn set_mode(&self, mode: NarrationMode) -> SightResult<()> {
        self.send(Command::SetMode(mode)).await
    }

    pub async fn set_verbosity(&self, verbosity: Verbosity) -> SightResult<()> {
        self.send(Command::SetVerbosity(verbosity)).await
    }

    /// Set the speech rate; out-of-range values are clamped to [0.5, 2.0].
    pub async fn set_speech_rate(&self, rate: f32) -> SightResult<()> {
        self.send(Command::SetSpeechRate(rate)).await
    }

    /// Toggle the recurring auto-narration schedule. Enabling fires a first
    /// narration immediately.
    pub async fn set_auto_narration(&self, enabled: bool) -> SightResult<()> {
        self.send(Command::SetAutoNarration(enabled)).await
    }

    /// Change the auto-narration period; snaps to the nearest offered interval.
    pub async fn set_auto_interval_ms(&self, interval_ms: u64) -> SightResult<()> {
        self.send(Command::SetAutoIntervalMs(interval_ms)).await
    }

    /// Snapshot of the transcript, newest first.
    pub async fn transcript(&self) -> SightResult<Vec<NarrationResult>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Transcript { reply }).await?;
        rx.await
            .map_err(|_| SightError::ChannelReceive("pipeline dropped transcript reply".to_string()))
    }

    /// Snapshot of pipeline state.
    pub async fn status(&self) -> SightResult<PipelineStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await
            .map_err(|_| SightError::ChannelReceive("pipeline dropped status reply".to_string()))
    }

    /// Stop the pipeline task, halting speech and releasing the camera.
    pub async fn shutdown(&self) -> SightResult<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> SightResult<()> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| SightError::ChannelSend("pipeline task is gone".to_string()))
    }
}

struct PipelineTask {
    camera: Arc<dyn CameraProvider>,
    analyzer: AnalysisClient,
    arbiter: SpeechArbiter,
    settle_delay: Duration,

    mode: NarrationMode,
    settings: NarrationSettings,
    transcript: TranscriptLog,

    stream: Option<Box<dyn VideoStream>>,
    ticker: AutoTicker,
    settle: SettleTimer,
    gate: FlightGate,

    cmd_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::UnboundedSender<PipelineEvent>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
}

impl PipelineTask {
    async fn run(mut self) {
        info!("👁️ Narration pipeline started (mode: {})", self.mode);
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let keep_running = match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => false,
                    };
                    if !keep_running {
                        break;
                    }
                }
                Some(done) = self.completion_rx.recv() => {
                    self.handle_completion(done);
                }
                _ = self.ticker.tick() => {
                    self.spawn_analysis(TriggerOrigin::Auto, true);
                }
                _ = self.settle.fired() => {
                    debug!("🕐 Mode settled, narrating");
                    self.spawn_analysis(TriggerOrigin::ModeSwitch, false);
                }
            }
        }
        self.teardown();
    }

    /// Returns false when the pipeline should shut down.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Activate { ack } => {
                let result = self.activate();
                let _ = ack.send(result);
            }
            Command::Deactivate => self.deactivate(),
            Command::Narrate => {
                debug!("👆 Manual narration requested");
                self.spawn_analysis(TriggerOrigin::Manual, false);
            }
            Command::SetMode(mode) => self.set_mode(mode),
            Command::SetVerbosity(verbosity) => {
                self.settings.verbosity = verbosity;
            }
            Command::SetSpeechRate(rate) => self.settings.set_speech_rate(rate),
            Command::SetAutoNarration(enabled) => self.set_auto_narration(enabled),
            Command::SetAutoIntervalMs(interval_ms) => self.set_auto_interval(interval_ms),
            Command::Transcript { reply } => {
                let _ = reply.send(self.transcript.to_vec());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn activate(&mut self) -> SightResult<()> {
        if self.stream.is_some() {
            debug!("🎥 Capture already active");
            return Ok(());
        }
        match self.camera.open() {
            Ok(stream) => {
                self.stream = Some(stream);
                if self.settings.auto_narration {
                    self.ticker
                        .arm(Duration::from_millis(self.settings.auto_interval_ms));
                }
                info!("🎥 Capture started");
                self.emit(PipelineEvent::CaptureStarted);
                Ok(())
            }
            Err(e) => {
                warn!("🎥 Capture failed to start: {}", e);
                Err(e)
            }
        }
    }

    fn deactivate(&mut self) {
        if self.stream.take().is_none() {
            return;
        }
        // In-flight analyses keep running; only future scheduling stops.
        self.ticker.disarm();
        self.settle.disarm();
        info!("🎥 Capture stopped");
        self.emit(PipelineEvent::CaptureStopped);
    }

    fn set_mode(&mut self, mode: NarrationMode) {
        if mode == self.mode {
            return;
        }
        info!("🔭 Mode: {} -> {}", self.mode, mode);
        self.mode = mode;
        // One narration in the new mode once the user has had time to aim,
        // unless the recurring ticker covers it anyway. Re-arming replaces
        // any shot still pending from a previous switch.
        if self.stream.is_some() && !self.settings.auto_narration {
            self.settle.arm(self.settle_delay);
        }
    }

    fn set_auto_narration(&mut self, enabled: bool) {
        if self.settings.auto_narration == enabled {
            return;
        }
        self.settings.auto_narration = enabled;
        if enabled {
            info!("🔁 Auto narration on ({} ms)", self.settings.auto_interval_ms);
            // Recurring coverage supersedes a pending mode-switch shot.
            self.settle.disarm();
            if self.stream.is_some() {
                self.ticker
                    .arm(Duration::from_millis(self.settings.auto_interval_ms));
            }
        } else {
            info!("🔁 Auto narration off");
            self.ticker.disarm();
        }
    }

    fn set_auto_interval(&mut self, interval_ms: u64) {
        self.settings.set_auto_interval_ms(interval_ms);
        if self.settings.auto_narration && self.stream.is_some() {
            info!("🔁 Auto interval: {} ms", self.settings.auto_interval_ms);
            self.ticker
                .arm(Duration::from_millis(self.settings.auto_interval_ms));
        }
    }

    /// Snapshot a frame and run analysis in a spawned task. `gated` marks
    /// the request as the single-flight auto request.
    fn spawn_analysis(&mut self, origin: TriggerOrigin, gated: bool) {
        if gated && !self.gate.try_begin() {
            debug!("⏭️ Auto tick skipped, analysis already in flight");
            return;
        }
        let frame = match self.current_frame() {
            Some(frame) => frame,
            None => {
                if gated {
                    self.gate.clear();
                }
                return;
            }
        };

        debug!(
            "📸 Analyzing {} byte frame ({:?}, mode {})",
            frame.jpeg.len(),
            origin,
            self.mode
        );
        let analyzer = self.analyzer.clone();
        let mode = self.mode;
        let verbosity = self.settings.verbosity;
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = analyzer.analyze(&frame, mode, verbosity).await;
            let _ = completion_tx.send(Completion { origin, result });
        });
    }

    /// Frame for the next narration, or `None` when capture is inactive or
    /// the sensor has nothing decoded yet. Absence is a skip, not an error.
    fn current_frame(&mut self) -> Option<EncodedFrame> {
        match self.stream.as_mut() {
            Some(stream) => {
                let frame = camera::snapshot(stream.as_mut());
                if frame.is_none() {
                    debug!("⏭️ Narration skipped, no frame ready");
                }
                frame
            }
            None => {
                debug!("⏭️ Narration skipped, capture inactive");
                None
            }
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        if done.origin == TriggerOrigin::Auto {
            self.gate.clear();
        }
        info!(
            "🗣️ Narration ({:?}, {:?}): {}",
            done.origin, done.result.priority, done.result.text
        );
        self.arbiter
            .speak(&done.result.text, done.result.priority, &self.settings);
        self.transcript.push(done.result.clone());
        self.emit(PipelineEvent::Narrated {
            origin: done.origin,
            result: done.result,
        });
    }

    fn status(&self) -> PipelineStatus {
        PipelineStatus {
            active: self.stream.is_some(),
            mode: self.mode,
            settings: self.settings.clone(),
            auto_armed: self.ticker.is_armed(),
            analysis_in_flight: self.gate.is_in_flight(),
        }
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.event_tx.send(event);
    }

    fn teardown(&mut self) {
        self.arbiter.stop();
        self.ticker.disarm();
        self.settle.disarm();
        if self.stream.take().is_some() {
            self.emit(PipelineEvent::CaptureStopped);
        }
        info!("👁️ Narration pipeline stopped");
    }
}
