// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::Serialize;

/// Published by the worker whenever the source's stream parameters
/// change, after every sink has been re-rated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineReport {
    pub sample_rate: u32,
    pub center_frequency: u64,
}
