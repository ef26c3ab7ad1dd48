// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::sync::oneshot;

use crate::engine::command::EngineCommand;
use crate::engine::response::CommandResponse;

/// Request sent to the engine task.
///
/// `respond_to: Some` makes the request synchronous: the submitter blocks
/// on the completion channel until the worker answers. `None` is
/// submit-and-forget; the worker handles the command and drops it.
pub struct EngineRequest {
    pub command: EngineCommand,
    pub respond_to: Option<oneshot::Sender<CommandResponse>>,
}
