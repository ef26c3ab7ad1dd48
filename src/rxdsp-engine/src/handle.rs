// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Thin cloneable handle used to control a running engine worker.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use rxdsp_core::{
    CommandResponse, EngineCommand, EngineError, EngineRequest, EngineResult, EngineState,
    SampleSink, SampleSource, SinkId, SinkMessage,
};

/// Handle to a spawned [`Engine`](crate::Engine) task.
///
/// Every method becomes a message on the engine's request channel; the
/// worker is the only place engine state is ever touched. Handles are
/// cheap to clone and share.
#[derive(Clone)]
pub struct EngineHandle {
    request_tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    pub(crate) fn new(request_tx: mpsc::Sender<EngineRequest>) -> Self {
        EngineHandle { request_tx }
    }

    async fn execute(&self, command: EngineCommand) -> EngineResult<CommandResponse> {
        let (respond_to, response) = oneshot::channel();
        self.request_tx
            .send(EngineRequest {
                command,
                respond_to: Some(respond_to),
            })
            .await
            .map_err(|_| EngineError::shut_down())?;
        response.await.map_err(|_| EngineError::shut_down())
    }

    async fn submit(&self, command: EngineCommand) -> EngineResult<()> {
        self.request_tx
            .send(EngineRequest {
                command,
                respond_to: None,
            })
            .await
            .map_err(|_| EngineError::shut_down())
    }

    async fn execute_state(&self, command: EngineCommand) -> EngineResult<EngineState> {
        match self.execute(command).await? {
            CommandResponse::State(state) => Ok(state),
            other => Err(EngineError::unexpected_response(&other)),
        }
    }

    async fn execute_text(&self, command: EngineCommand) -> EngineResult<String> {
        match self.execute(command).await? {
            CommandResponse::Text(text) => Ok(text),
            other => Err(EngineError::unexpected_response(&other)),
        }
    }

    /// Confirm the worker is up; resolves once the event loop runs.
    pub async fn start(&self) -> EngineResult<EngineState> {
        self.ping().await
    }

    pub async fn ping(&self) -> EngineResult<EngineState> {
        self.execute_state(EngineCommand::Ping).await
    }

    /// Stop acquisition, tear down, and terminate the worker.
    pub async fn stop(&self) -> EngineResult<EngineState> {
        self.execute_state(EngineCommand::Exit).await
    }

    pub async fn start_acquisition(&self) -> EngineResult<EngineState> {
        self.execute_state(EngineCommand::AcquisitionStart).await
    }

    pub async fn stop_acquisition(&self) -> EngineResult<EngineState> {
        self.execute_state(EngineCommand::AcquisitionStop).await
    }

    pub async fn set_source(&self, source: Box<dyn SampleSource>) -> EngineResult<()> {
        self.execute(EngineCommand::SetSource(source)).await?;
        Ok(())
    }

    /// Register a sink; the returned id removes exactly this registration.
    pub async fn add_sink(&self, sink: Box<dyn SampleSink>) -> EngineResult<SinkId> {
        match self.execute(EngineCommand::AddSink(sink)).await? {
            CommandResponse::SinkAdded(id) => Ok(id),
            other => Err(EngineError::unexpected_response(&other)),
        }
    }

    pub async fn remove_sink(&self, id: SinkId) -> EngineResult<()> {
        self.execute(EngineCommand::RemoveSink(id)).await?;
        Ok(())
    }

    /// Submit-and-forget, like the UI toggles it models.
    pub async fn configure_corrections(
        &self,
        dc_offset: bool,
        iq_imbalance: bool,
    ) -> EngineResult<()> {
        self.submit(EngineCommand::ConfigureCorrections {
            dc_offset,
            iq_imbalance,
        })
        .await
    }

    /// Forward an opaque configuration payload to the current source.
    pub async fn configure_source(&self, config: Bytes) -> EngineResult<()> {
        self.submit(EngineCommand::ConfigureSource(config)).await
    }

    /// Fan a message out to every registered sink.
    pub async fn broadcast(&self, message: SinkMessage) -> EngineResult<()> {
        self.submit(EngineCommand::Broadcast(message)).await
    }

    pub async fn error_message(&self) -> EngineResult<String> {
        self.execute_text(EngineCommand::GetErrorMessage).await
    }

    pub async fn device_description(&self) -> EngineResult<String> {
        self.execute_text(EngineCommand::GetDeviceDescription).await
    }
}
