// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod engine;
pub mod handle;

pub use engine::Engine;
pub use handle::EngineHandle;
