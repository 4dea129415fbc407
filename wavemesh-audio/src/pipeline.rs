//! Wires capture, analysis and publication together.
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use tracing::{debug, instrument};

use crate::{
    config::{AnalysisConfig, ConfigError},
    engine::AnalysisEngine,
    frame::{frame_channel, FrameReceiver, RecvTimeoutError},
    output::OutputSlot,
    source::{CaptureError, FrameSource},
};

/// How long the analysis thread sleeps on an empty queue before it re-checks
/// the stop flag.
const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Which analysis path runs for the incoming frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Publish a single smoothed loudness value per frame.
    Amplitude,
    /// Publish the smoothed spectrum together with its band slices per frame.
    Spectrum,
}

/// Errors which can occur while starting the pipeline.
#[derive(thiserror::Error, Debug)]
pub enum StartError {
    /// The pipeline is already running. Stop it first; there's no implicit
    /// restart.
    #[error("The pipeline is already running.")]
    AlreadyRunning,

    /// The source delivers a different sample rate than the one the band
    /// table was computed against.
    #[error("The source delivers {source_rate} Hz but the pipeline is configured for {configured} Hz.")]
    SampleRateMismatch { source_rate: u32, configured: u32 },

    /// The capture source couldn't be acquired or started.
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// The whole analysis pipeline, from the capture source over the frame queue
/// and the analysis thread into the output slot.
///
/// A pipeline is either *idle* or *running*. [`Pipeline::start`] binds a
/// source and spins up the analysis thread, [`Pipeline::stop`] tears both
/// down again. The engine's smoothing memory survives stop/start cycles
/// until [`Pipeline::reset`] clears it.
///
/// # Example
/// ```rust
/// use wavemesh_audio::{AnalysisConfig, Mode, Pipeline, source::ScriptedSource, DEFAULT_SAMPLE_RATE};
///
/// let mut pipeline = Pipeline::new(AnalysisConfig::default()).unwrap();
/// let output = pipeline.output();
///
/// let source = ScriptedSource::new(DEFAULT_SAMPLE_RATE, vec![vec![0.5; 128]]);
/// pipeline.start(source, Mode::Amplitude).unwrap();
///
/// // a render loop would poll at its own cadence
/// let _latest = output.read();
///
/// pipeline.stop();
/// ```
pub struct Pipeline {
    config: AnalysisConfig,
    slot: OutputSlot,
    mode: Arc<ModeFlag>,

    /// Parked here while idle, moved onto the analysis thread while running.
    engine: Option<AnalysisEngine>,
    running: Option<Running>,
    dropped_before: u64,
}

struct Running {
    source: Box<dyn FrameSource>,
    worker: thread::JoinHandle<AnalysisEngine>,
    stop: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl Pipeline {
    /// Creates an idle pipeline for the given config.
    pub fn new(config: AnalysisConfig) -> Result<Self, ConfigError> {
        let engine = AnalysisEngine::new(&config)?;

        Ok(Self {
            config,
            slot: OutputSlot::new(),
            mode: Arc::new(ModeFlag::new(Mode::Amplitude)),
            engine: Some(engine),
            running: None,
            dropped_before: 0,
        })
    }

    /// Binds `source` and starts analyzing its frames under `mode`.
    ///
    /// Builds a fresh frame queue per start. If the source can't be started
    /// the pipeline stays idle with its mode untouched and no capture stream
    /// is left behind.
    #[instrument(name = "Pipeline::start", skip_all)]
    pub fn start(
        &mut self,
        mut source: Box<dyn FrameSource>,
        mode: Mode,
    ) -> Result<(), StartError> {
        if self.running.is_some() {
            return Err(StartError::AlreadyRunning);
        }

        let source_rate = source.sample_rate();
        if source_rate != self.config.sample_rate {
            return Err(StartError::SampleRateMismatch {
                source_rate: source_rate.0,
                configured: self.config.sample_rate.0,
            });
        }

        let (sink, receiver) = frame_channel(self.config.queue_capacity);
        let dropped = sink.drop_counter();
        source.bind(sink)?;
        self.mode.set(mode);

        let engine = self.engine.take().expect("The engine is parked while idle.");
        let stop = Arc::new(AtomicBool::new(false));
        let worker = thread::Builder::new()
            .name("wavemesh-analysis".into())
            .spawn({
                let stop = stop.clone();
                let mode = self.mode.clone();
                let slot = self.slot.clone();
                move || analysis_loop(engine, receiver, stop, mode, slot)
            })
            .expect("Spawn the analysis thread");

        self.running = Some(Running {
            source,
            worker,
            stop,
            dropped,
        });
        Ok(())
    }

    /// Stops capture and analysis.
    ///
    /// In order: the source stops emitting, the analysis thread stops
    /// consuming, still-queued frames are discarded. The output slot keeps
    /// its last published value so readers always observe something valid,
    /// however stale. Stopping an idle pipeline does nothing.
    #[instrument(name = "Pipeline::stop", skip_all)]
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        running.source.unbind();
        running.stop.store(true, Ordering::Relaxed);

        let engine = running
            .worker
            .join()
            .expect("Join the analysis thread");
        self.dropped_before += running.dropped.load(Ordering::Relaxed);
        self.engine = Some(engine);
    }

    /// Switches the analysis mode without stopping capture.
    ///
    /// Frames which are already queued get processed under whatever mode is
    /// active at the moment they are dequeued, so a few results of the
    /// previous mode may still be published right after the switch.
    pub fn set_mode(&self, mode: Mode) {
        self.mode.set(mode);
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    /// A handle onto the cell the analysis thread publishes into. Clone it
    /// into whatever render loop wants to poll the latest result.
    pub fn output(&self) -> OutputSlot {
        self.slot.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The total amount of frames evicted from the handoff queue because the
    /// analysis thread fell behind, accumulated across all runs of this
    /// pipeline.
    pub fn dropped_frames(&self) -> u64 {
        let current = self
            .running
            .as_ref()
            .map(|running| running.dropped.load(Ordering::Relaxed))
            .unwrap_or(0);

        self.dropped_before + current
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Clears the smoothing memory of the engine.
    ///
    /// Only possible while the pipeline is idle since the engine lives on the
    /// analysis thread while running. Returns whether the reset happened.
    pub fn reset(&mut self) -> bool {
        match &mut self.engine {
            Some(engine) => {
                engine.reset();
                true
            }
            None => false,
        }
    }
}

impl Drop for Pipeline {
    /// Stops the pipeline, releasing the capture stream and joining the
    /// analysis thread.
    fn drop(&mut self) {
        self.stop();
    }
}

fn analysis_loop(
    mut engine: AnalysisEngine,
    receiver: FrameReceiver,
    stop: Arc<AtomicBool>,
    mode: Arc<ModeFlag>,
    slot: OutputSlot,
) -> AnalysisEngine {
    debug!("Analysis thread is running");

    while !stop.load(Ordering::Relaxed) {
        let frame = match receiver.recv_timeout(POLL_TIMEOUT) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        // the mode is re-read per frame: queued frames run under whatever
        // mode is active when they are dequeued
        let result = match mode.get() {
            Mode::Amplitude => engine.process_amplitude(&frame),
            Mode::Spectrum => engine.process_spectrum(&frame),
        };
        slot.publish(result);
    }

    debug!("Analysis thread shuts down");
    engine
}

struct ModeFlag(AtomicU8);

impl ModeFlag {
    fn new(mode: Mode) -> Self {
        Self(AtomicU8::new(mode as u8))
    }

    fn set(&self, mode: Mode) {
        self.0.store(mode as u8, Ordering::Relaxed);
    }

    fn get(&self) -> Mode {
        if self.0.load(Ordering::Relaxed) == Mode::Spectrum as u8 {
            Mode::Spectrum
        } else {
            Mode::Amplitude
        }
    }
}
