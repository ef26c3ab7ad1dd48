// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bounded sample FIFO bridging the hardware producer thread and the
//! engine worker.
//!
//! The ring is the only data structure touched by both threads; a single
//! mutex covers every operation. The consumer borrows the stored samples
//! in place through [`RingRead`], which keeps the ring locked for the
//! duration of one drain step; borrowed spans are never held across a
//! mutex release.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::sample::Sample;

/// Minimum wall time between overflow reports from one ring.
const OVERFLOW_REPORT_INTERVAL: Duration = Duration::from_millis(2500);

/// Wake-up signal from a ring to the engine worker.
///
/// Wraps a bounded channel of capacity one: `notify` never blocks, and
/// back-to-back writes coalesce into a single queued wake-up.
#[derive(Clone)]
pub struct DataReady {
    tx: mpsc::Sender<()>,
}

impl DataReady {
    /// Create a notifier together with the receiver half the worker
    /// sleeps on.
    pub fn channel() -> (DataReady, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (DataReady { tx }, rx)
    }

    /// Queue a wake-up. A wake-up already in flight is good enough.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

struct RingState {
    data: Vec<Sample>,
    head: usize,
    tail: usize,
    fill: usize,
    /// `None` while the overflow report is armed; `Some(n)` counts the
    /// reports swallowed since the current window opened.
    suppressed: Option<u32>,
    window_start: Instant,
}

impl RingState {
    fn report_overflow(&mut self, dropped: usize) {
        match self.suppressed {
            None => {
                warn!("sample ring overflow, dropping {} samples", dropped);
                self.suppressed = Some(0);
                self.window_start = Instant::now();
            }
            Some(count) => {
                if self.window_start.elapsed() > OVERFLOW_REPORT_INTERVAL {
                    warn!("{} overflow reports suppressed", count);
                    warn!("sample ring overflow, dropping {} samples", dropped);
                    self.suppressed = None;
                } else {
                    self.suppressed = Some(count + 1);
                }
            }
        }
    }
}

/// Bounded FIFO of I/Q samples with split-region read borrows.
///
/// Writers never overwrite unread data: a write beyond the free space
/// accepts the leading samples and drops the rest with a rate-limited
/// overflow report. Readers see the stored samples in FIFO order as up to
/// two contiguous spans (the second covers a wrap past the end of the
/// buffer).
pub struct SampleRing {
    state: Mutex<RingState>,
    data_ready: Mutex<Option<DataReady>>,
}

impl SampleRing {
    /// Create a ring holding up to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sample ring capacity must be non-zero");
        SampleRing {
            state: Mutex::new(RingState {
                data: vec![Sample::new(0, 0); capacity],
                head: 0,
                tail: 0,
                fill: 0,
                suppressed: None,
                window_start: Instant::now(),
            }),
            data_ready: Mutex::new(None),
        }
    }

    pub fn capacity(&self) -> usize {
        self.lock_state().data.len()
    }

    /// Number of samples currently stored.
    pub fn fill(&self) -> usize {
        self.lock_state().fill
    }

    pub fn is_empty(&self) -> bool {
        self.fill() == 0
    }

    /// Install the worker-side notifier signalled after each write that
    /// leaves data in the ring.
    pub fn set_data_ready(&self, notifier: DataReady) {
        *self.lock_notifier() = Some(notifier);
    }

    /// Detach the notifier; subsequent writes wake nobody.
    pub fn clear_data_ready(&self) {
        *self.lock_notifier() = None;
    }

    /// Append samples, returning how many were accepted. Excess beyond
    /// the free space is dropped with an overflow report.
    pub fn write(&self, samples: &[Sample]) -> usize {
        let total;
        let announce;
        {
            let mut state = self.lock_state();
            let capacity = state.data.len();
            total = samples.len().min(capacity - state.fill);
            if total < samples.len() {
                state.report_overflow(samples.len() - total);
            }
            let mut written = 0;
            while written < total {
                let tail = state.tail;
                let len = (total - written).min(capacity - tail);
                state.data[tail..tail + len].copy_from_slice(&samples[written..written + len]);
                state.tail = (tail + len) % capacity;
                state.fill += len;
                written += len;
            }
            announce = state.fill > 0;
        }
        if announce {
            if let Some(notifier) = self.lock_notifier().as_ref() {
                notifier.notify();
            }
        }
        total
    }

    /// Borrow up to `count` stored samples in FIFO order without
    /// consuming them. Requests beyond the current fill clamp with a loud
    /// log; the spans stay valid until the returned guard is dropped or
    /// committed.
    pub fn read_begin(&self, count: usize) -> RingRead<'_> {
        let state = self.lock_state();
        let capacity = state.data.len();
        let total = count.min(state.fill);
        if total < count {
            error!("sample ring underflow, missing {} samples", count - total);
        }
        let part1_len = total.min(capacity - state.head);
        RingRead {
            part1_start: state.head,
            part1_len,
            part2_len: total - part1_len,
            state,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().expect("sample ring mutex poisoned")
    }

    fn lock_notifier(&self) -> MutexGuard<'_, Option<DataReady>> {
        self.data_ready.lock().expect("sample ring mutex poisoned")
    }

    #[cfg(test)]
    fn overflow_suppressed(&self) -> Option<u32> {
        self.lock_state().suppressed
    }

    #[cfg(test)]
    fn age_overflow_window(&self, by: Duration) {
        let mut state = self.lock_state();
        state.window_start -= by;
    }
}

/// Read borrow over up to two contiguous regions of the ring.
///
/// The guard keeps the ring locked; commit (or drop) it before the
/// producer can make progress. Dropping without committing leaves the
/// samples in place for the next drain pass.
pub struct RingRead<'a> {
    state: MutexGuard<'a, RingState>,
    part1_start: usize,
    part1_len: usize,
    part2_len: usize,
}

impl RingRead<'_> {
    /// Total samples exposed by both spans.
    pub fn len(&self) -> usize {
        self.part1_len + self.part2_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The borrowed spans in FIFO order. The second span is non-empty
    /// only when the read wraps past the end of the buffer; it then
    /// starts at slot zero, strictly below the first span, so the two
    /// mutable borrows are disjoint.
    pub fn parts(&mut self) -> (&mut [Sample], &mut [Sample]) {
        debug_assert!(self.part2_len <= self.part1_start);
        let (wrapped, linear) = self.state.data.split_at_mut(self.part1_start);
        (
            &mut linear[..self.part1_len],
            &mut wrapped[..self.part2_len],
        )
    }

    /// Consume `count` samples, freeing their slots for the producer.
    /// Committing more than the ring holds is clamped and logged.
    pub fn commit(mut self, count: usize) -> usize {
        let state = &mut *self.state;
        let capacity = state.data.len();
        let count = if count > state.fill {
            error!(
                "sample ring cannot commit {} samples, only {} available",
                count, state.fill
            );
            state.fill
        } else {
            count
        };
        state.head = (state.head + count) % capacity;
        state.fill -= count;
        count
    }
}
