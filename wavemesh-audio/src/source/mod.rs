//! Each struct here can push frames into a pipeline.
//! Pick the one matching where your audio comes from.
mod microphone;
mod script;

use cpal::SampleRate;

pub use microphone::MicSource;
pub use script::ScriptedSource;

use crate::frame::FrameSink;

/// Errors which can occur while acquiring or starting a capture source.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    /// No default input device could be found to capture from.
    #[error("Couldn't retrieve a default input device.")]
    NoDefaultDevice,

    /// The input device didn't offer any supported stream config.
    #[error("Couldn't retrieve any config of the input stream of the device.")]
    NoSupportedStreamConfig,

    /// The input device refused to enumerate its stream configs.
    #[error(transparent)]
    SupportedStreamConfigs(#[from] cpal::SupportedStreamConfigsError),

    /// Building the input stream failed.
    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),

    /// Starting the input stream failed.
    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),

    /// The source is already bound to a sink.
    #[error("The source is already delivering frames into a sink.")]
    AlreadyBound,
}

/// Interface of everything which can feed frames into the pipeline.
///
/// A source is push driven: once bound it delivers mono frames into the given
/// [FrameSink] at its own cadence until [`FrameSource::unbind`] releases it.
/// Faults while a stream is running must stay inside the source (reported
/// through whatever error observer it was created with) and never panic into
/// the capture context.
pub trait FrameSource {
    /// Starts delivering frames into `sink`.
    ///
    /// Fails without side effects, so a pipeline which couldn't start leaves
    /// no capture stream behind.
    fn bind(&mut self, sink: FrameSink) -> Result<(), CaptureError>;

    /// Stops delivering frames and releases the capture resources.
    ///
    /// Unbinding an unbound source does nothing.
    fn unbind(&mut self);

    /// The sample rate of the frames this source delivers.
    fn sample_rate(&self) -> SampleRate;
}
