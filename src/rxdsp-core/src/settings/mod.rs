// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Persisted settings blobs and their wire format.

pub mod preset;
pub mod serializer;
