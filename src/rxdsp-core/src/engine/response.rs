// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::Serialize;

use crate::engine::state::EngineState;
use crate::sink::SinkId;

/// Error type returned by engine requests.
#[derive(Debug, Clone, Serialize)]
pub struct EngineError(pub String);

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// The worker is gone; no request will ever be answered again.
    pub fn shut_down() -> Self {
        EngineError("engine task is not running".to_string())
    }

    pub fn unexpected_response(response: &CommandResponse) -> Self {
        EngineError(format!("unexpected engine response: {:?}", response))
    }
}

impl From<String> for EngineError {
    fn from(value: String) -> Self {
        EngineError(value)
    }
}

impl From<&str> for EngineError {
    fn from(value: &str) -> Self {
        EngineError(value.to_string())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EngineError {}

/// Result value carried back on a request's completion channel.
#[derive(Debug)]
pub enum CommandResponse {
    State(EngineState),
    Text(String),
    SinkAdded(SinkId),
    Done,
}
