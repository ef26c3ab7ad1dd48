// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! In-place DC-offset and I/Q-imbalance correction.
//!
//! Both correctors are cheap first-order IIR estimators applied per span;
//! they are not meant to be calibration-grade, only to keep LO leakage and
//! the image of the wanted signal suppressed in the downstream spectrum.
//! DC converges in roughly ten spans, the imbalance ratio in roughly a
//! hundred.

use crate::sample::Sample;

/// Q15.16 unity, the neutral imbalance ratio.
const IMBALANCE_ONE: i32 = 1 << 16;

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Running correction state carried between drain passes.
///
/// `imbalance` is the Q15.16 ratio `i_range / q_range`; only the Q rail is
/// rescaled by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleCorrections {
    i_offset: i32,
    q_offset: i32,
    i_range: i32,
    q_range: i32,
    imbalance: i32,
}

impl Default for SampleCorrections {
    fn default() -> Self {
        SampleCorrections {
            i_offset: 0,
            q_offset: 0,
            i_range: 1 << 16,
            q_range: 1 << 16,
            imbalance: IMBALANCE_ONE,
        }
    }
}

impl SampleCorrections {
    /// Return everything to the neutral values.
    pub fn reset(&mut self) {
        *self = SampleCorrections::default();
    }

    /// Forget the running DC estimates.
    pub fn reset_dc_offset(&mut self) {
        self.i_offset = 0;
        self.q_offset = 0;
    }

    /// Forget the running range estimates and the imbalance ratio.
    pub fn reset_iq_imbalance(&mut self) {
        self.i_range = 1 << 16;
        self.q_range = 1 << 16;
        self.imbalance = IMBALANCE_ONE;
    }

    /// Running DC estimates in sample units, `(i, q)`.
    pub fn dc_offsets(&self) -> (i32, i32) {
        (self.i_offset, self.q_offset)
    }

    /// Running peak-to-peak estimates, `(i, q)`.
    pub fn ranges(&self) -> (i32, i32) {
        (self.i_range, self.q_range)
    }

    /// Current Q15.16 imbalance ratio.
    pub fn imbalance(&self) -> i32 {
        self.imbalance
    }

    /// Update the running DC estimate from this span and subtract it from
    /// every sample, saturating at the i16 range.
    pub fn dc_offset(&mut self, samples: &mut [Sample]) {
        if samples.is_empty() {
            return;
        }

        let mut io: i64 = 0;
        let mut qo: i64 = 0;
        for sample in samples.iter() {
            io += sample.re as i64;
            qo += sample.im as i64;
        }

        // Sliding average, weight 3/4 on the prior estimate.
        let count = samples.len() as i64;
        self.i_offset = ((self.i_offset as i64 * 3 + io / count) >> 2) as i32;
        self.q_offset = ((self.q_offset as i64 * 3 + qo / count) >> 2) as i32;

        for sample in samples.iter_mut() {
            sample.re = clamp_i16(sample.re as i32 - self.i_offset);
            sample.im = clamp_i16(sample.im as i32 - self.q_offset);
        }
    }

    /// Update the running range estimates from this span's extrema and
    /// rescale the Q rail by the resulting ratio.
    pub fn iq_imbalance(&mut self, samples: &mut [Sample]) {
        if samples.is_empty() {
            return;
        }

        let first = samples[0];
        let mut i_min = first.re as i32;
        let mut i_max = first.re as i32;
        let mut q_min = first.im as i32;
        let mut q_max = first.im as i32;
        for sample in &samples[1..] {
            i_min = i_min.min(sample.re as i32);
            i_max = i_max.max(sample.re as i32);
            q_min = q_min.min(sample.im as i32);
            q_max = q_max.max(sample.im as i32);
        }

        // A silent span carries no gain information; keep the estimates.
        if i_max == i_min && q_max == q_min {
            return;
        }

        // Sliding average, weight 15/16 on the prior estimate.
        self.i_range = (self.i_range * 15 + (i_max - i_min)) >> 4;
        self.q_range = (self.q_range * 15 + (q_max - q_min)) >> 4;

        // Q15.16 ratio; a collapsed Q range keeps the previous value.
        if self.q_range != 0 {
            self.imbalance = (((self.i_range as i64) << 16) / self.q_range as i64) as i32;
        }

        for sample in samples.iter_mut() {
            sample.im = clamp_i16(((sample.im as i64 * self.imbalance as i64) >> 16) as i32);
        }
    }
}
