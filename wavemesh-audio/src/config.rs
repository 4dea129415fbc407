//! Config of the analysis pipeline.
use std::{
    num::{NonZero, NonZeroU32, NonZeroUsize},
    ops::Range,
};

use cpal::SampleRate;

use crate::{DEFAULT_SAMPLE_RATE, MAX_HUMAN_FREQUENCY, MIN_HUMAN_FREQUENCY};

/// All validation errors of an [AnalysisConfig].
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConfigError {
    /// Occurs, if [`AnalysisConfig::sample_rate`] is `0`.
    #[error("The sample rate can't be 0.")]
    ZeroSampleRate,

    /// Occurs, if [`AnalysisConfig::fft_size`] isn't a power of two.
    #[error("The fft size must be a power of two but you gave: {0}")]
    FftSizeNotPowerOfTwo(usize),

    /// Occurs, if you've set [`AnalysisConfig::freq_range`] to an empty range.
    ///
    /// # Example
    /// ```rust
    /// use wavemesh_audio::AnalysisConfig;
    /// use std::num::NonZeroU32;
    ///
    /// let invalid_range = NonZeroU32::new(10).unwrap()..NonZeroU32::new(10).unwrap();
    /// assert!(invalid_range.is_empty(), "`start` and `end` are equal");
    ///
    /// let config = AnalysisConfig {
    ///     freq_range: invalid_range.clone(),
    ///     ..Default::default()
    /// };
    ///
    /// // the range isn't allowed to be empty!
    /// assert!(config.validate().is_err());
    /// ```
    #[error("Frequency range can't be empty but you gave: {0:?}")]
    EmptyFreqRange(Range<NonZeroU32>),

    /// Occurs, if the upper end of [`AnalysisConfig::freq_range`] lies above the
    /// Nyquist frequency of [`AnalysisConfig::sample_rate`]. Frequencies above it
    /// can't be represented by the fft.
    #[error("The frequency range ends at {end} Hz which is above the Nyquist frequency ({nyquist} Hz) of the configured sample rate.")]
    FreqRangeAboveNyquist { end: u32, nyquist: u32 },

    /// Occurs, if [`AnalysisConfig::amplitude_smoothing`] lies outside of `(0, 1]`.
    #[error("The amplitude smoothing factor must be within (0, 1] but you gave: {0}")]
    InvalidAmplitudeSmoothing(f32),

    /// Occurs, if [`AnalysisConfig::spectrum_smoothing`] lies outside of `(0, 1]`.
    #[error("The spectrum smoothing factor must be within (0, 1] but you gave: {0}")]
    InvalidSpectrumSmoothing(f32),

    /// Occurs, if [`AnalysisConfig::energy_bins`] reaches past the first half of
    /// the spectrum.
    #[error("`energy_bins` must be at most `fft_size / 2` (= {max}) but you gave: {energy_bins}")]
    TooManyEnergyBins { energy_bins: usize, max: usize },
}

/// Which window function is applied to the samples before the fourier transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpectrumWindow {
    /// No window function. Each cycle transforms exactly one frame, zero padded
    /// up to the fft size. Prior raw samples are discarded so only the smoothed
    /// magnitude state carries memory across cycles.
    #[default]
    None,

    /// A hann window over a sliding buffer of the most recent `fft_size` samples.
    /// Smoother spectra at the cost of mixing neighbouring frames into each
    /// transform.
    Hann,
}

/// Configure the analysis pipeline.
///
/// # Example
/// ```rust
/// use wavemesh_audio::AnalysisConfig;
/// use std::num::NonZeroUsize;
///
/// let config = AnalysisConfig {
///     num_bands: NonZeroUsize::new(64).unwrap(),
///     ..Default::default()
/// };
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// The sample rate of the audio source. The band table is computed against
    /// this value, so it has to match the rate of the attached source.
    pub sample_rate: SampleRate,

    /// Set the size of the fourier transform (and with it the length of the
    /// published spectrum). Must be a power of two.
    pub fft_size: NonZeroUsize,

    /// Set the amount of logarithmically spaced frequency bands which should be
    /// cut out of the spectrum.
    pub num_bands: NonZeroUsize,

    /// Set the frequency range which the bands should cover.
    ///
    /// # Example
    /// ```rust
    /// use wavemesh_audio::AnalysisConfig;
    /// use std::num::NonZeroU32;
    ///
    /// let config = AnalysisConfig {
    ///     // only map the bands onto the frequencies from 50Hz up to 10_000Hz
    ///     freq_range: NonZeroU32::new(50).unwrap()..NonZeroU32::new(10_000).unwrap(),
    ///     ..Default::default()
    /// };
    /// ```
    pub freq_range: Range<NonZeroU32>,

    /// The weight of a new rms measurement within the smoothed amplitude.
    /// `0.1` means the published amplitude moves 10% towards each new
    /// measurement. Must be within `(0, 1]`; `1` disables smoothing.
    pub amplitude_smoothing: f32,

    /// The weight of a new magnitude within the smoothed spectrum, per bin.
    /// Must be within `(0, 1]`; `1` disables smoothing.
    pub spectrum_smoothing: f32,

    /// The amount of low bins which are averaged into the published bass energy
    /// scalar. Must be at most `fft_size / 2`.
    pub energy_bins: NonZeroUsize,

    /// The window function for the spectrum path.
    pub window: SpectrumWindow,

    /// The amount of frames the handoff queue towards the analysis thread can
    /// hold before the oldest queued frame gets evicted.
    pub queue_capacity: NonZeroUsize,
}

impl AnalysisConfig {
    /// Checks if the current config is valid or contains any mistakes.
    ///
    /// See [`ConfigError`] to see all possible errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate.0 == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }

        if !self.fft_size.get().is_power_of_two() {
            return Err(ConfigError::FftSizeNotPowerOfTwo(self.fft_size.get()));
        }

        if self.freq_range.is_empty() {
            return Err(ConfigError::EmptyFreqRange(self.freq_range.clone()));
        }

        let nyquist = self.sample_rate.0 / 2;
        if self.freq_range.end.get() > nyquist {
            return Err(ConfigError::FreqRangeAboveNyquist {
                end: self.freq_range.end.get(),
                nyquist,
            });
        }

        if !(self.amplitude_smoothing > 0. && self.amplitude_smoothing <= 1.) {
            return Err(ConfigError::InvalidAmplitudeSmoothing(
                self.amplitude_smoothing,
            ));
        }

        if !(self.spectrum_smoothing > 0. && self.spectrum_smoothing <= 1.) {
            return Err(ConfigError::InvalidSpectrumSmoothing(
                self.spectrum_smoothing,
            ));
        }

        let max_energy_bins = self.fft_size.get() / 2;
        if self.energy_bins.get() > max_energy_bins {
            return Err(ConfigError::TooManyEnergyBins {
                energy_bins: self.energy_bins.get(),
                max: max_energy_bins,
            });
        }

        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            fft_size: NonZeroUsize::new(1024).unwrap(),
            num_bands: NonZeroUsize::new(32).unwrap(),
            freq_range: NonZero::new(MIN_HUMAN_FREQUENCY).unwrap()
                ..NonZero::new(MAX_HUMAN_FREQUENCY).unwrap(),
            amplitude_smoothing: 0.1,
            spectrum_smoothing: 0.2,
            energy_bins: NonZeroUsize::new(32).unwrap(),
            window: SpectrumWindow::default(),
            queue_capacity: NonZeroUsize::new(64).unwrap(),
        }
    }
}

impl AsRef<AnalysisConfig> for AnalysisConfig {
    fn as_ref(&self) -> &AnalysisConfig {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let config = AnalysisConfig {
            sample_rate: SampleRate(0),
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroSampleRate)
        ));
    }

    #[test]
    fn rejects_non_power_of_two_fft_size() {
        let config = AnalysisConfig {
            fft_size: NonZeroUsize::new(1000).unwrap(),
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::FftSizeNotPowerOfTwo(1000))
        ));
    }

    #[test]
    fn rejects_range_above_nyquist() {
        let config = AnalysisConfig {
            freq_range: NonZeroU32::new(20).unwrap()..NonZeroU32::new(30_000).unwrap(),
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::FreqRangeAboveNyquist {
                end: 30_000,
                nyquist: 22_050
            })
        ));
    }

    #[test]
    fn rejects_out_of_range_smoothing() {
        for value in [0., -0.5, 1.5, f32::NAN] {
            let config = AnalysisConfig {
                amplitude_smoothing: value,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "accepted {}", value);

            let config = AnalysisConfig {
                spectrum_smoothing: value,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "accepted {}", value);
        }
    }

    #[test]
    fn rejects_too_many_energy_bins() {
        let config = AnalysisConfig {
            fft_size: NonZeroUsize::new(512).unwrap(),
            energy_bins: NonZeroUsize::new(257).unwrap(),
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooManyEnergyBins {
                energy_bins: 257,
                max: 256
            })
        ));
    }
}
