// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use bytes::Bytes;

use crate::sink::{SampleSink, SinkId, SinkMessage};
use crate::source::SampleSource;

/// Command handled by the engine worker.
///
/// The request channel carrying these is the only mutation path for
/// engine state and the sink list.
pub enum EngineCommand {
    /// Round trip returning the current state.
    Ping,
    /// Stop acquisition, tear everything down, and terminate the worker.
    Exit,
    /// Stop whatever is running, then start acquisition from the current
    /// source.
    AcquisitionStart,
    /// Stop acquisition and return to idle.
    AcquisitionStop,
    GetDeviceDescription,
    GetErrorMessage,
    /// Replace the sample source. The previous source is detached from
    /// the data-ready path and dropped.
    SetSource(Box<dyn SampleSource>),
    /// Append a sink; when acquisition is running it is rated and started
    /// before it sees any samples.
    AddSink(Box<dyn SampleSink>),
    RemoveSink(SinkId),
    /// Enable or disable the correction stages. A stage toggled from off
    /// to on restarts from its neutral running state.
    ConfigureCorrections { dc_offset: bool, iq_imbalance: bool },
    /// Opaque configuration payload forwarded to the current source.
    ConfigureSource(Bytes),
    /// Anything the engine does not handle itself is fanned out to every
    /// sink in insertion order.
    Broadcast(SinkMessage),
}

impl fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => write!(f, "Ping"),
            Self::Exit => write!(f, "Exit"),
            Self::AcquisitionStart => write!(f, "AcquisitionStart"),
            Self::AcquisitionStop => write!(f, "AcquisitionStop"),
            Self::GetDeviceDescription => write!(f, "GetDeviceDescription"),
            Self::GetErrorMessage => write!(f, "GetErrorMessage"),
            Self::SetSource(_) => write!(f, "SetSource"),
            Self::AddSink(_) => write!(f, "AddSink"),
            Self::RemoveSink(id) => write!(f, "RemoveSink({:?})", id),
            Self::ConfigureCorrections {
                dc_offset,
                iq_imbalance,
            } => write!(
                f,
                "ConfigureCorrections(dc={}, iq={})",
                dc_offset, iq_imbalance
            ),
            Self::ConfigureSource(payload) => {
                write!(f, "ConfigureSource({} bytes)", payload.len())
            }
            Self::Broadcast(message) => write!(f, "Broadcast({})", message.name),
        }
    }
}
