//! The stateful consumer turning frames into published results.
use realfft::{num_complex::Complex32, RealFftPlanner};

use crate::{
    bands::BandTable,
    config::{AnalysisConfig, ConfigError, SpectrumWindow},
    frame::AudioFrame,
    output::AnalysisResult,
};

struct SlidingWindow {
    window: Box<[f32]>,
    raw: Box<[f32]>,
}

/// Computes the analysis results out of the incoming frames.
///
/// The engine owns all of its working buffers and smoothing state, so multiple
/// engines can run side by side without sharing anything. It processes one
/// frame at a time; the caller decides per frame whether the amplitude or the
/// spectrum path runs. The two paths keep disjoint state which survives
/// across mode switches (and across stop/start of the surrounding pipeline)
/// until [`AnalysisEngine::reset`] is called.
pub struct AnalysisEngine {
    bands: BandTable,

    planner: RealFftPlanner<f32>,
    sliding: Option<SlidingWindow>,
    scratch_buffer: Box<[Complex32]>,
    fft_out: Box<[Complex32]>,
    fft_in: Box<[f32]>,
    spectrum: Box<[f32]>,

    latest_amplitude: f32,
    smoothed_amplitude: f32,

    fft_size: usize,
    amplitude_smoothing: f32,
    spectrum_smoothing: f32,
    energy_bins: usize,
}

impl AnalysisEngine {
    /// Creates a new engine for the given config.
    pub fn new(config: impl AsRef<AnalysisConfig>) -> Result<Self, ConfigError> {
        let config = config.as_ref();
        config.validate()?;

        let fft_size = config.fft_size.get();
        let fft_out_size = fft_size / 2 + 1;

        let sliding = match config.window {
            SpectrumWindow::None => None,
            SpectrumWindow::Hann => Some(SlidingWindow {
                window: apodize::hanning_iter(fft_size)
                    .map(|val| val as f32)
                    .collect::<Vec<f32>>()
                    .into_boxed_slice(),
                raw: vec![0.; fft_size].into_boxed_slice(),
            }),
        };

        Ok(Self {
            bands: BandTable::build(config),
            planner: RealFftPlanner::new(),
            sliding,
            scratch_buffer: vec![Complex32::ZERO; fft_out_size].into_boxed_slice(),
            fft_out: vec![Complex32::ZERO; fft_out_size].into_boxed_slice(),
            fft_in: vec![0.; fft_size].into_boxed_slice(),
            spectrum: vec![0.; fft_size].into_boxed_slice(),
            latest_amplitude: 0.,
            smoothed_amplitude: 0.,
            fft_size,
            amplitude_smoothing: config.amplitude_smoothing,
            spectrum_smoothing: config.spectrum_smoothing,
            energy_bins: config.energy_bins.get(),
        })
    }

    /// Turns `frame` into a smoothed loudness value.
    ///
    /// An empty frame contributes an rms of `0` instead of faulting.
    pub fn process_amplitude(&mut self, frame: &AudioFrame) -> AnalysisResult {
        let rms = root_mean_square(frame.samples());

        self.smoothed_amplitude = (1. - self.amplitude_smoothing) * self.smoothed_amplitude
            + self.amplitude_smoothing * rms;
        self.latest_amplitude = rms;

        AnalysisResult::Amplitude {
            amplitude: self.smoothed_amplitude,
        }
    }

    /// Turns `frame` into a smoothed magnitude spectrum plus its band slices.
    ///
    /// The transform runs over the full `fft_size` and the magnitudes above
    /// Nyquist are reconstructed by mirroring the lower half, so the published
    /// spectrum always has `fft_size` entries. Every bin is blended into the
    /// smoothed state before the bands are cut out.
    pub fn process_spectrum(&mut self, frame: &AudioFrame) -> AnalysisResult {
        self.fill_fft_input(frame);

        let fft = self.planner.plan_fft_forward(self.fft_size);
        fft.process_with_scratch(
            &mut self.fft_in,
            self.fft_out.as_mut(),
            self.scratch_buffer.as_mut(),
        )
        .unwrap();

        let half = self.fft_out.len();
        let factor = self.spectrum_smoothing;
        for i in 0..self.fft_size {
            let magnitude = if i < half {
                self.fft_out[i].norm()
            } else {
                // bins above Nyquist mirror the lower half
                self.fft_out[self.fft_size - i].norm()
            };
            self.spectrum[i] = (1. - factor) * self.spectrum[i] + factor * magnitude;
        }

        let bands = self
            .bands
            .bands()
            .map(|range| Box::from(&self.spectrum[range]))
            .collect::<Box<[Box<[f32]>]>>();
        let energy =
            self.spectrum[..self.energy_bins].iter().sum::<f32>() / self.energy_bins as f32;

        AnalysisResult::Spectrum {
            spectrum: self.spectrum.clone(),
            bands,
            energy,
        }
    }

    /// Clears all smoothing memory as if no frame had been processed yet.
    pub fn reset(&mut self) {
        self.latest_amplitude = 0.;
        self.smoothed_amplitude = 0.;
        self.spectrum.fill(0.);
        if let Some(sliding) = &mut self.sliding {
            sliding.raw.fill(0.);
        }
    }

    /// The rms of the last frame which went through the amplitude path.
    pub fn latest_amplitude(&self) -> f32 {
        self.latest_amplitude
    }

    /// The current smoothed loudness value.
    pub fn smoothed_amplitude(&self) -> f32 {
        self.smoothed_amplitude
    }

    pub fn band_table(&self) -> &BandTable {
        &self.bands
    }

    fn fill_fft_input(&mut self, frame: &AudioFrame) {
        if frame.is_empty() {
            // a malformed frame contributes silence, in both window modes
            self.fft_in.fill(0.);
            return;
        }

        let samples = frame.samples();
        let new_len = frame.len().min(self.fft_size);
        match &mut self.sliding {
            // zero padded single block transform: the frame sits at the start,
            // everything behind it stays silent and no raw samples survive
            // into the next cycle
            None => {
                self.fft_in[..new_len].copy_from_slice(&samples[..new_len]);
                self.fft_in[new_len..].fill(0.);
            }
            Some(sliding) => {
                sliding.raw.copy_within(..self.fft_size - new_len, new_len);
                sliding.raw[..new_len].copy_from_slice(&samples[..new_len]);

                for (i, (&raw, &weight)) in
                    sliding.raw.iter().zip(sliding.window.iter()).enumerate()
                {
                    self.fft_in[i] = raw * weight;
                }
            }
        }
    }
}

fn root_mean_square(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.;
    }

    let mean_square = samples.iter().map(|sample| sample * sample).sum::<f32>()
        / samples.len() as f32;
    mean_square.sqrt()
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use crate::frame::frame_channel;

    use super::*;

    fn frame(samples: &[f32]) -> AudioFrame {
        let (sink, receiver) = frame_channel(NonZeroUsize::new(1).unwrap());
        sink.send(samples);
        receiver.try_recv().unwrap()
    }

    fn spectrum_of(result: AnalysisResult) -> Box<[f32]> {
        match result {
            AnalysisResult::Spectrum { spectrum, .. } => spectrum,
            other => panic!("expected a spectrum result but got {:?}", other),
        }
    }

    #[test]
    fn rms_of_a_square_wave_is_one() {
        let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();

        engine.process_amplitude(&frame(&[1., -1., 1., -1.]));

        assert_eq!(engine.latest_amplitude(), 1.);
    }

    #[test]
    fn rms_of_silence_and_of_an_empty_frame_is_zero() {
        let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();

        engine.process_amplitude(&frame(&[0.; 128]));
        assert_eq!(engine.latest_amplitude(), 0.);

        engine.process_amplitude(&frame(&[]));
        assert_eq!(engine.latest_amplitude(), 0.);
    }

    #[test]
    fn smoothed_amplitude_converges_geometrically() {
        let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();
        let square = frame(&[1., -1., 1., -1.]);

        let mut previous_distance = 1.;
        for n in 1..=20 {
            engine.process_amplitude(&square);

            let distance = (engine.smoothed_amplitude() - 1.).abs();
            let expected = 0.9f32.powi(n);
            assert!(
                (distance - expected).abs() < 1e-4,
                "cycle {}: distance {} but expected {}",
                n,
                distance,
                expected
            );
            assert!(distance < previous_distance);
            previous_distance = distance;
        }
    }

    #[test]
    fn dc_bin_of_a_padded_block_is_its_sum() {
        let config = AnalysisConfig {
            fft_size: NonZeroUsize::new(512).unwrap(),
            spectrum_smoothing: 1.,
            ..Default::default()
        };
        let mut engine = AnalysisEngine::new(config).unwrap();

        // 128 samples of 0.5 zero padded to 512: the dc bin carries the block
        // sum of 64, untouched by any window
        let spectrum = spectrum_of(engine.process_spectrum(&frame(&[0.5; 128])));

        assert_eq!(spectrum.len(), 512);
        assert!(
            (spectrum[0] - 64.).abs() < 1e-3,
            "dc bin was {}",
            spectrum[0]
        );
    }

    #[test]
    fn upper_spectrum_half_mirrors_the_lower() {
        let config = AnalysisConfig {
            fft_size: NonZeroUsize::new(512).unwrap(),
            spectrum_smoothing: 1.,
            ..Default::default()
        };
        let mut engine = AnalysisEngine::new(config).unwrap();

        let samples = (0..128)
            .map(|i| (i as f32 * 0.1).sin())
            .collect::<Vec<f32>>();
        let spectrum = spectrum_of(engine.process_spectrum(&frame(&samples)));

        for i in 257..512 {
            assert_eq!(spectrum[i], spectrum[512 - i], "bin {} doesn't mirror", i);
        }
    }

    #[test]
    fn silent_frames_decay_the_spectrum_geometrically() {
        let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();

        let samples = (0..128)
            .map(|i| (i as f32 * 0.3).sin())
            .collect::<Vec<f32>>();
        let initial = spectrum_of(engine.process_spectrum(&frame(&samples)));

        for n in 1..=5 {
            let latest = spectrum_of(engine.process_spectrum(&frame(&[0.; 128])));

            let rate = 0.8f32.powi(n);
            for (i, (&now, &start)) in latest.iter().zip(initial.iter()).enumerate() {
                assert!(
                    (now - start * rate).abs() <= start.abs() * 1e-4 + 1e-6,
                    "bin {} after {} silent cycles: {} (expected {})",
                    i,
                    n,
                    now,
                    start * rate
                );
            }
        }
    }

    #[test]
    fn band_slices_are_cut_straight_out_of_the_spectrum() {
        let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();

        let samples = (0..128)
            .map(|i| (i as f32 * 0.25).sin() + (i as f32 * 0.8).sin())
            .collect::<Vec<f32>>();
        let result = engine.process_spectrum(&frame(&samples));

        let AnalysisResult::Spectrum {
            spectrum,
            bands,
            energy,
        } = result
        else {
            panic!("expected a spectrum result");
        };

        assert_eq!(bands.len(), engine.band_table().num_bands());
        for (k, range) in engine.band_table().bands().enumerate() {
            assert_eq!(&*bands[k], &spectrum[range], "band {} isn't a plain slice", k);
        }

        let expected_energy = spectrum[..32].iter().sum::<f32>() / 32.;
        assert!((energy - expected_energy).abs() < 1e-6);
    }

    #[test]
    fn amplitude_path_does_not_touch_spectrum_state() {
        let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();

        let loud = frame(&[0.9; 128]);
        let first = spectrum_of(engine.process_spectrum(&loud));

        for _ in 0..3 {
            engine.process_amplitude(&loud);
        }

        // the decay continues from `first` as if the amplitude calls never
        // happened
        let second = spectrum_of(engine.process_spectrum(&frame(&[0.; 128])));
        for (i, (&now, &before)) in second.iter().zip(first.iter()).enumerate() {
            assert!(
                (now - before * 0.8).abs() <= before.abs() * 1e-4 + 1e-6,
                "bin {} changed unexpectedly",
                i
            );
        }
    }

    #[test]
    fn spectrum_path_does_not_touch_amplitude_state() {
        let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();

        engine.process_amplitude(&frame(&[1., -1., 1., -1.]));
        let smoothed = engine.smoothed_amplitude();

        engine.process_spectrum(&frame(&[0.9; 128]));

        assert_eq!(engine.smoothed_amplitude(), smoothed);
        assert_eq!(engine.latest_amplitude(), 1.);
    }

    #[test]
    fn reset_clears_all_smoothing_memory() {
        let mut engine = AnalysisEngine::new(AnalysisConfig::default()).unwrap();

        engine.process_amplitude(&frame(&[1., -1., 1., -1.]));
        engine.process_spectrum(&frame(&[0.9; 128]));
        engine.reset();

        assert_eq!(engine.latest_amplitude(), 0.);
        assert_eq!(engine.smoothed_amplitude(), 0.);

        let spectrum = spectrum_of(engine.process_spectrum(&frame(&[0.; 128])));
        assert!(spectrum.iter().all(|&bin| bin == 0.));
    }

    #[test]
    fn an_empty_frame_contributes_silence_to_the_spectrum() {
        let config = AnalysisConfig {
            spectrum_smoothing: 1.,
            ..Default::default()
        };
        let mut engine = AnalysisEngine::new(config).unwrap();

        let loud = spectrum_of(engine.process_spectrum(&frame(&[0.9; 128])));
        assert!(loud.iter().any(|&bin| bin > 0.));

        let silent = spectrum_of(engine.process_spectrum(&frame(&[])));
        assert!(silent.iter().all(|&bin| bin == 0.));
    }

    #[test]
    fn hann_mode_treats_an_empty_frame_as_silence() {
        let config = AnalysisConfig {
            window: SpectrumWindow::Hann,
            spectrum_smoothing: 1.,
            ..Default::default()
        };
        let mut engine = AnalysisEngine::new(config).unwrap();

        let loud = spectrum_of(engine.process_spectrum(&frame(&[0.9; 128])));
        assert!(loud.iter().any(|&bin| bin > 0.));

        // an empty frame must not re-transform the sliding buffer
        let silent = spectrum_of(engine.process_spectrum(&frame(&[])));
        assert!(silent.iter().all(|&bin| bin == 0.));
    }

    #[test]
    fn hann_mode_remembers_samples_across_frames() {
        let config = AnalysisConfig {
            window: SpectrumWindow::Hann,
            spectrum_smoothing: 1.,
            ..Default::default()
        };
        let mut engine = AnalysisEngine::new(config).unwrap();

        engine.process_spectrum(&frame(&[0.9; 128]));

        // in sliding mode the earlier loud frame still sits in the buffer, so
        // a silent frame doesn't silence the spectrum
        let spectrum = spectrum_of(engine.process_spectrum(&frame(&[0.; 128])));
        assert!(spectrum.iter().any(|&bin| bin > 0.));
    }
}
