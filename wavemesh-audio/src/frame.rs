//! The handoff of sample blocks from the capture callback to the analysis
//! thread.
use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TrySendError};

pub use crossbeam_channel::{RecvTimeoutError, TryRecvError};

/// One block of mono samples as delivered by a capture callback.
///
/// The samples are owned. A source hands its (reused) callback buffer to
/// [`FrameSink::send`] which copies it, so a frame never aliases live capture
/// memory. The sequence number counts sent frames and exists to make the
/// arrival order observable.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Box<[f32]>,
    sequence: u64,
}

impl AudioFrame {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Creates the channel between a capture source and the analysis thread.
///
/// The channel holds at most `capacity` frames. [`FrameSink::send`] never
/// blocks: sending into a full channel evicts the oldest queued frame to make
/// room, so a stalled consumer costs the oldest data instead of stalling the
/// capture callback. Frames which make it through come out strictly in send
/// order.
pub fn frame_channel(capacity: NonZeroUsize) -> (FrameSink, FrameReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.get());
    let dropped = Arc::new(AtomicU64::new(0));

    let sink = FrameSink {
        tx,
        rx: rx.clone(),
        next_sequence: AtomicU64::new(0),
        dropped: dropped.clone(),
    };
    let receiver = FrameReceiver { rx, dropped };

    (sink, receiver)
}

/// The producer side of the frame channel. Owned by a capture source and
/// driven from its callback.
pub struct FrameSink {
    tx: Sender<AudioFrame>,
    rx: Receiver<AudioFrame>,
    next_sequence: AtomicU64,
    dropped: Arc<AtomicU64>,
}

impl FrameSink {
    /// Copies `samples` into a new frame and enqueues it.
    ///
    /// Never blocks. If the channel is full the oldest queued frame is evicted
    /// (and counted, see [`FrameSink::dropped_frames`]). A sink whose receiver
    /// is gone keeps cycling frames through the queue, so a capture callback
    /// can outlive the analysis side without faulting.
    pub fn send(&self, samples: &[f32]) {
        let mut frame = AudioFrame {
            samples: samples.into(),
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        };

        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    frame = rejected;
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// The amount of frames evicted so far because the channel was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// A shared handle onto the eviction counter, for observers which outlive
    /// the sink.
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }
}

/// The consumer side of the frame channel.
pub struct FrameReceiver {
    rx: Receiver<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameReceiver {
    /// Takes the oldest queued frame if one is available.
    pub fn try_recv(&self) -> Result<AudioFrame, TryRecvError> {
        self.rx.try_recv()
    }

    /// Waits at most `timeout` for the next frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<AudioFrame, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// The amount of frames evicted so far because the channel was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
