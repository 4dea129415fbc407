//! # Description
//! A crate which turns live microphone input into the handful of numbers a
//! sound reactive visual needs: either a smoothed loudness value or a
//! smoothed, logarithmically banded magnitude spectrum, published into a cell
//! which a render loop polls at its own cadence.
//!
//! ### [cpal]
//!
//! This crate also re-exports [cpal] so there's no need to add [cpal] exclusively
//! to your dependency list.
//!
//! # Example
//!
//! ## Simple workflow
//! A simple workflow can look like this:
//! ```
//! use wavemesh_audio::{
//!     source::ScriptedSource, AnalysisConfig, AnalysisResult, Mode, Pipeline,
//!     DEFAULT_SAMPLE_RATE,
//! };
//!
//! let mut pipeline = Pipeline::new(AnalysisConfig::default()).unwrap();
//! let output = pipeline.output();
//!
//! // a real application would attach `source::MicSource::default_device(...)`
//! let source = ScriptedSource::new(DEFAULT_SAMPLE_RATE, vec![vec![0.5; 128]; 4]);
//! pipeline.start(source, Mode::Spectrum).unwrap();
//!
//! loop {
//!     // the render loop polls at its own cadence and never blocks
//!     if let Some(result) = output.read() {
//!         let AnalysisResult::Spectrum { bands, energy, .. } = &*result else {
//!             unreachable!("the pipeline runs in spectrum mode");
//!         };
//!
//!         assert_eq!(bands.len(), 32);
//!         assert!(*energy >= 0.);
//!         break;
//!     }
//! }
//!
//! pipeline.stop();
//! ```
pub mod source;

mod bands;
mod config;
mod engine;
mod frame;
mod output;
mod pipeline;

pub use bands::BandTable;
pub use config::{AnalysisConfig, ConfigError, SpectrumWindow};
pub use cpal;
pub use engine::AnalysisEngine;
pub use frame::{
    frame_channel, AudioFrame, FrameReceiver, FrameSink, RecvTimeoutError, TryRecvError,
};
pub use output::{AnalysisResult, OutputSlot};
pub use pipeline::{Mode, Pipeline, StartError};

use cpal::SampleRate;

/// Unit of the frequency values within this crate.
pub type Hz = u32;

/// The minimal frequency which humans can hear (roughly).
/// See: <https://en.wikipedia.org/wiki/Hearing_range>
pub const MIN_HUMAN_FREQUENCY: Hz = 20;

/// The maximal frequency which humans can hear (roughly).
/// See: <https://en.wikipedia.org/wiki/Hearing_range>
pub const MAX_HUMAN_FREQUENCY: Hz = 20_000;

/// The default sample rate for a source.
/// Sources are allowed to use this for orientation.
pub const DEFAULT_SAMPLE_RATE: SampleRate = SampleRate(44_100);

/// The amount of samples a capture source puts into one frame by default.
/// One render quantum of the usual audio worklet runtimes.
pub const DEFAULT_BLOCK_SIZE: usize = 128;
