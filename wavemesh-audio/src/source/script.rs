use cpal::SampleRate;

use crate::frame::FrameSink;

use super::{CaptureError, FrameSource};

/// A source which replays a fixed list of frames.
/// Mainly used for docs and tests.
pub struct ScriptedSource {
    sample_rate: SampleRate,
    frames: Vec<Vec<f32>>,
    sink: Option<FrameSink>,
}

impl ScriptedSource {
    /// Creates a source which sends the given frames, in order, as soon as it
    /// is bound. Binding it again replays the script from the start.
    pub fn new(sample_rate: SampleRate, frames: impl IntoIterator<Item = Vec<f32>>) -> Box<Self> {
        Box::new(Self {
            sample_rate,
            frames: frames.into_iter().collect(),
            sink: None,
        })
    }

    /// A source with nothing to say, for pipelines which should stay idle but
    /// alive.
    pub fn silent(sample_rate: SampleRate) -> Box<Self> {
        Self::new(sample_rate, [])
    }
}

impl FrameSource for ScriptedSource {
    fn bind(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
        if self.sink.is_some() {
            return Err(CaptureError::AlreadyBound);
        }

        for frame in &self.frames {
            sink.send(frame);
        }
        self.sink = Some(sink);

        Ok(())
    }

    fn unbind(&mut self) {
        self.sink = None;
    }

    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }
}
