// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::sync::Arc;

use crate::ring::SampleRing;

/// Hardware-facing producer that fills a [`SampleRing`] from its own
/// thread.
///
/// The ring is owned by the source; the engine only holds the `Arc` while
/// the source is attached and drains it on data-ready wake-ups. All trait
/// methods are invoked on the engine worker.
pub trait SampleSource: Send {
    /// Begin streaming. After a successful return the source thread fills
    /// the ring. Returns `false` when the hardware could not be started.
    fn start_input(&mut self, flags: u32) -> bool;

    /// Cease streaming. No ring writes may happen after this returns.
    fn stop_input(&mut self);

    /// The ring this source writes into.
    fn sample_ring(&self) -> Arc<SampleRing>;

    /// Stream rate in samples per second, as reported by the hardware.
    fn sample_rate(&self) -> u32;

    /// Tuned center frequency in Hz.
    fn center_frequency(&self) -> u64;

    /// Human-readable device description, shown while acquisition runs.
    fn device_description(&self) -> String;

    /// Apply a source-specific configuration payload.
    fn handle_configuration(&mut self, config: &[u8]) {
        let _ = config;
    }
}
