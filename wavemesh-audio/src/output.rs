//! Publication point between the analysis thread and the render loop.
use std::sync::{Arc, Mutex};

/// One published analysis cycle, tagged with the mode it was computed under.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    /// Output of the amplitude mode.
    Amplitude {
        /// The smoothed rms loudness of the signal.
        amplitude: f32,
    },

    /// Output of the spectrum mode.
    Spectrum {
        /// The smoothed magnitude of every fft bin. Has `fft_size` entries;
        /// the upper half mirrors the lower one.
        spectrum: Box<[f32]>,

        /// The magnitude sub-ranges of the logarithmically spaced bands, cut
        /// directly out of `spectrum` (no averaging). Bands may be empty, see
        /// [`BandTable`](crate::BandTable).
        bands: Box<[Box<[f32]>]>,

        /// Mean magnitude of the lowest `energy_bins` bins. A single bass
        /// loudness number for consumers which don't want to walk the bands.
        energy: f32,
    },
}

/// The cell holding the most recent [AnalysisResult].
///
/// There is no queue and no history. [`OutputSlot::publish`] replaces the
/// value wholesale and [`OutputSlot::read`] hands out the latest one, however
/// stale it may be. A render loop polls this at its own cadence and reuses the
/// previous value when nothing new arrived.
///
/// Cloning the slot clones the handle, not the value; all clones observe the
/// same cell.
///
/// # Single writer
/// Exactly one thread may call [`OutputSlot::publish`]. The pipeline confines
/// publishing to its analysis thread; readers only ever swap an [Arc] out of
/// the cell, so results are never observed half written. This confinement is
/// a hard precondition of the type, not an implementation detail.
#[derive(Debug, Clone, Default)]
pub struct OutputSlot {
    latest: Arc<Mutex<Option<Arc<AnalysisResult>>>>,
}

impl OutputSlot {
    /// Creates an empty slot. [`OutputSlot::read`] returns [None] until the
    /// first publish.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current value.
    pub fn publish(&self, result: AnalysisResult) {
        let mut latest = self.latest.lock().unwrap();
        *latest = Some(Arc::new(result));
    }

    /// The most recently published result, or [None] if nothing has been
    /// published yet.
    ///
    /// Never blocks beyond the swap of a reference.
    pub fn read(&self) -> Option<Arc<AnalysisResult>> {
        self.latest.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slot_reads_no_data() {
        let slot = OutputSlot::new();

        assert!(slot.read().is_none());
    }

    #[test]
    fn read_observes_the_latest_publish() {
        let slot = OutputSlot::new();

        slot.publish(AnalysisResult::Amplitude { amplitude: 0.25 });
        slot.publish(AnalysisResult::Amplitude { amplitude: 0.5 });

        let result = slot.read().unwrap();
        assert_eq!(*result, AnalysisResult::Amplitude { amplitude: 0.5 });

        // nothing new published: the same value is observed again
        assert_eq!(slot.read().unwrap(), result);
    }

    #[test]
    fn clones_share_the_cell() {
        let slot = OutputSlot::new();
        let reader = slot.clone();

        slot.publish(AnalysisResult::Amplitude { amplitude: 1.0 });

        assert!(reader.read().is_some());
    }
}
