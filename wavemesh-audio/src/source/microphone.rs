use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleRate, StreamError, SupportedStreamConfigRange,
};
use tracing::{debug, instrument, warn};

use crate::{frame::FrameSink, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE};

use super::{CaptureError, FrameSource};

type ErrorCallback = Arc<Mutex<dyn FnMut(StreamError) + Send + 'static>>;

/// Captures frames from a microphone.
///
/// The backend delivers interleaved blocks of whatever size it likes; this
/// source downmixes them to mono (all channels averaged) and re-blocks them
/// into fixed `block_size` frames before they go into the sink. Construction
/// only picks the device and config; the stream itself is built and started
/// at bind time.
///
/// It's recommended to use [MicSource::default_device] to create a new
/// instance of this struct.
pub struct MicSource {
    device: cpal::Device,
    stream_config: cpal::StreamConfig,
    block_size: usize,
    error_callback: ErrorCallback,
    stream: Option<cpal::Stream>,
}

impl MicSource {
    /// This exposes the API of [cpal] which you can use to pick your own
    /// [cpal::Device] and [cpal::SupportedStreamConfigRange] if you want.
    #[instrument(name = "MicSource::new", skip_all)]
    pub fn new<E>(
        device: cpal::Device,
        stream_config_range: &SupportedStreamConfigRange,
        block_size: NonZeroUsize,
        error_callback: E,
    ) -> Result<Box<Self>, CaptureError>
    where
        E: FnMut(StreamError) + Send + 'static,
    {
        let stream_config = {
            let supported_stream_config = stream_config_range
                .try_with_sample_rate(DEFAULT_SAMPLE_RATE)
                .unwrap_or(stream_config_range.with_max_sample_rate());
            supported_stream_config.config()
        };

        debug!("Stream config: {:?}", stream_config);

        Ok(Box::new(Self {
            device,
            stream_config,
            block_size: block_size.get(),
            error_callback: Arc::new(Mutex::new(error_callback)),
            stream: None,
        }))
    }

    /// Picks the default input device of the default host together with its
    /// preferred config and the default block size.
    ///
    /// This is the recommended function to create an instance of this struct.
    ///
    /// # Args
    /// - `error_callback` will be invoked for faults of the running stream and
    ///   is passed along to the `error_callback` of
    ///   [`cpal::traits::DeviceTrait::build_input_stream`].
    pub fn default_device<E>(error_callback: E) -> Result<Box<Self>, CaptureError>
    where
        E: FnMut(StreamError) + Send + 'static,
    {
        let Some(device) = cpal::default_host().default_input_device() else {
            return Err(CaptureError::NoDefaultDevice);
        };

        let stream_config_range = default_input_config(&device)?;

        Self::new(
            device,
            &stream_config_range,
            NonZeroUsize::new(DEFAULT_BLOCK_SIZE).unwrap(),
            error_callback,
        )
    }
}

impl FrameSource for MicSource {
    #[instrument(name = "MicSource::bind", skip_all)]
    fn bind(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Err(CaptureError::AlreadyBound);
        }

        let channels = usize::from(self.stream_config.channels);
        let block_size = self.block_size;
        let mut block: Vec<f32> = Vec::with_capacity(block_size);

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for samples in data.chunks_exact(channels) {
                    block.push(samples.iter().sum::<f32>() / channels as f32);
                    if block.len() == block_size {
                        sink.send(&block);
                        block.clear();
                    }
                }
            },
            {
                let error_callback = self.error_callback.clone();
                move |err| (error_callback.lock().unwrap())(err)
            },
            None,
        )?;
        stream.play()?;

        self.stream = Some(stream);
        Ok(())
    }

    fn unbind(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                warn!("Couldn't pause the input stream: {err}");
            }
        }
    }

    fn sample_rate(&self) -> SampleRate {
        self.stream_config.sample_rate
    }
}

impl Drop for MicSource {
    /// Closes the audio stream before it gets dropped.
    fn drop(&mut self) {
        self.unbind();
    }
}

#[instrument(skip_all)]
fn default_input_config(
    device: &cpal::Device,
) -> Result<SupportedStreamConfigRange, CaptureError> {
    let matching_configs: Vec<_> = device.supported_input_configs()?.collect();

    matching_configs
        .into_iter()
        .max_by(|a, b| a.cmp_default_heuristics(b))
        .ok_or(CaptureError::NoSupportedStreamConfig)
}
