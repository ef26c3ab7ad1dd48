// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use num_complex::Complex;

/// One baseband I/Q sample as delivered by the hardware frontend:
/// a pair of signed 16-bit integers (`re` = I, `im` = Q).
pub type Sample = Complex<i16>;

/// Owned buffer of I/Q samples.
pub type SampleVector = Vec<Sample>;
