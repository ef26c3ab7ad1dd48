// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::sample::Sample;

/// Unique identifier for a registered sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(u64);

impl SinkId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SinkId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque message fanned out to sinks the engine does not handle itself.
#[derive(Debug, Clone)]
pub struct SinkMessage {
    pub name: String,
    pub payload: Bytes,
}

/// Downstream consumer of the corrected sample stream.
///
/// All methods are invoked on the engine worker, in sink insertion order.
pub trait SampleSink: Send {
    /// Acquisition is starting; `set_sample_rate` has already been seen.
    fn start(&mut self);

    /// Acquisition is stopping.
    fn stop(&mut self);

    /// Notified on every stream-rate change.
    fn set_sample_rate(&mut self, sample_rate: u32);

    /// Receive one contiguous span of corrected samples. `first_of_burst`
    /// is true for the first span of a drain pass, letting the sink
    /// detect discontinuities. The span must not be retained past return.
    fn feed(&mut self, samples: &[Sample], first_of_burst: bool);

    /// Receive a command the engine did not recognize.
    fn handle_message(&mut self, message: &SinkMessage) {
        let _ = message;
    }
}
