// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::Serialize;

/// Lifecycle state of the engine worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum EngineState {
    /// Worker not running: before spawn, or after `Exit`.
    #[default]
    NotStarted,
    /// Worker alive, acquisition stopped.
    Idle,
    /// Acquisition active, samples flowing to the sinks.
    Running,
    /// Acquisition failed; the engine error string says why. A new
    /// acquisition start retries from here.
    Error,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Error => write!(f, "Error"),
        }
    }
}
