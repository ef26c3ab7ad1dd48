// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod corrections;
pub mod engine;
pub mod ring;
pub mod sample;
pub mod settings;
pub mod sink;
pub mod source;

pub use corrections::SampleCorrections;
pub use engine::command::EngineCommand;
pub use engine::report::EngineReport;
pub use engine::request::EngineRequest;
pub use engine::response::{CommandResponse, EngineError, EngineResult};
pub use engine::state::EngineState;
pub use ring::{DataReady, RingRead, SampleRing};
pub use sample::{Sample, SampleVector};
pub use settings::preset::{DemodConfig, Preset, PresetError};
pub use sink::{SampleSink, SinkId, SinkMessage};
pub use source::SampleSource;
