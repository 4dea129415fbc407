//! Maps fft bins to logarithmically spaced frequency bands.
use std::ops::Range;

use tracing::debug;

use crate::config::AnalysisConfig;

/// The bin edges of the logarithmically spaced frequency bands.
///
/// Built once per config and shared by reference afterwards. Band `k` covers
/// the bin indices `edges[k]..edges[k + 1]`. Neighbouring edges may be equal
/// for low bands (the log curve is flat there compared to the bin resolution),
/// in which case the band is empty. Callers have to tolerate empty bands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandTable {
    edges: Box<[usize]>,
}

impl BandTable {
    /// Computes the edges for the given config.
    ///
    /// For every band boundary the frequency is interpolated logarithmically
    /// between the two ends of [`AnalysisConfig::freq_range`] and then mapped
    /// onto its fft bin, clamped into `[0, fft_size - 1]`.
    pub fn build(config: &AnalysisConfig) -> Self {
        let fft_size = config.fft_size.get();
        let num_bands = config.num_bands.get();

        let min_freq = f64::from(config.freq_range.start.get());
        let max_freq = f64::from(config.freq_range.end.get());
        let sample_rate = f64::from(config.sample_rate.0);
        debug!("Freq resolution: {}", sample_rate / fft_size as f64);

        let edges = (0..=num_bands)
            .map(|i| {
                let ratio = i as f64 / num_bands as f64;
                let frequency = min_freq * (max_freq / min_freq).powf(ratio);

                let edge = (frequency / sample_rate * fft_size as f64).floor() as usize;
                edge.min(fft_size - 1)
            })
            .collect::<Vec<usize>>();
        debug!("Band edges: {:?}", edges);

        Self {
            edges: edges.into_boxed_slice(),
        }
    }

    pub fn num_bands(&self) -> usize {
        self.edges.len() - 1
    }

    /// All `num_bands + 1` edges in non-decreasing order.
    pub fn edges(&self) -> &[usize] {
        &self.edges
    }

    /// The bin range of band `k`.
    ///
    /// **Panics** if `band >= num_bands`.
    pub fn band(&self, band: usize) -> Range<usize> {
        self.edges[band]..self.edges[band + 1]
    }

    /// Iterate over the bin ranges of all bands.
    pub fn bands(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.edges.windows(2).map(|edge| edge[0]..edge[1])
    }
}
