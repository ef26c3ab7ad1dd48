// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Persisted user preset: everything needed to restore a receiver setup.
//!
//! The blob is versioned; loading an unknown version or a structurally
//! broken blob resets the preset to defaults and reports failure, so a
//! damaged settings file can never leave a half-loaded state behind.

use std::fmt;

use bytes::Bytes;

use crate::settings::serializer::{Deserializer, Serializer};

const PRESET_VERSION: u32 = 1;

const TAG_GROUP: u32 = 1;
const TAG_DESCRIPTION: u32 = 2;
const TAG_CENTER_FREQUENCY: u32 = 3;
const TAG_SHOW_SCOPE: u32 = 4;
const TAG_LAYOUT: u32 = 5;
const TAG_SPECTRUM_CONFIG: u32 = 6;
const TAG_DC_OFFSET_CORRECTION: u32 = 7;
const TAG_IQ_IMBALANCE_CORRECTION: u32 = 8;
const TAG_SCOPE_CONFIG: u32 = 9;
const TAG_SOURCE: u32 = 10;
const TAG_SOURCE_GENERAL_CONFIG: u32 = 11;
const TAG_SOURCE_CONFIG: u32 = 12;
const TAG_DEMOD_COUNT: u32 = 100;
/// Demod `i` uses tags `base + 2i` (id) and `base + 2i + 1` (config).
const TAG_DEMOD_BASE: u32 = 101;

/// Demodulator entry stored in a preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemodConfig {
    pub demod: String,
    pub config: Bytes,
}

/// Failure loading a preset blob. The preset has already been reset to
/// defaults when this is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetError {
    UnsupportedVersion(u32),
    Malformed,
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion(version) => {
                write!(f, "unsupported preset version {}", version)
            }
            Self::Malformed => write!(f, "malformed preset blob"),
        }
    }
}

impl std::error::Error for PresetError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub group: String,
    pub description: String,
    pub center_frequency: u64,
    pub show_scope: bool,
    pub layout: Bytes,
    pub spectrum_config: Bytes,
    pub dc_offset_correction: bool,
    pub iq_imbalance_correction: bool,
    pub scope_config: Bytes,
    pub source: String,
    pub source_general_config: Bytes,
    pub source_config: Bytes,
    pub demod_configs: Vec<DemodConfig>,
}

impl Default for Preset {
    fn default() -> Self {
        Preset {
            group: "default".to_string(),
            description: "no name".to_string(),
            center_frequency: 0,
            show_scope: true,
            layout: Bytes::new(),
            spectrum_config: Bytes::new(),
            dc_offset_correction: true,
            iq_imbalance_correction: true,
            scope_config: Bytes::new(),
            source: String::new(),
            source_general_config: Bytes::new(),
            source_config: Bytes::new(),
            demod_configs: Vec::new(),
        }
    }
}

impl Preset {
    pub fn reset_to_defaults(&mut self) {
        *self = Preset::default();
    }

    pub fn serialize(&self) -> Bytes {
        let mut s = Serializer::new(PRESET_VERSION);
        s.write_string(TAG_GROUP, &self.group);
        s.write_string(TAG_DESCRIPTION, &self.description);
        s.write_u64(TAG_CENTER_FREQUENCY, self.center_frequency);
        s.write_bool(TAG_SHOW_SCOPE, self.show_scope);
        s.write_blob(TAG_LAYOUT, &self.layout);
        s.write_blob(TAG_SPECTRUM_CONFIG, &self.spectrum_config);
        s.write_bool(TAG_DC_OFFSET_CORRECTION, self.dc_offset_correction);
        s.write_bool(TAG_IQ_IMBALANCE_CORRECTION, self.iq_imbalance_correction);
        s.write_blob(TAG_SCOPE_CONFIG, &self.scope_config);
        s.write_string(TAG_SOURCE, &self.source);
        s.write_blob(TAG_SOURCE_GENERAL_CONFIG, &self.source_general_config);
        s.write_blob(TAG_SOURCE_CONFIG, &self.source_config);

        s.write_s32(TAG_DEMOD_COUNT, self.demod_configs.len() as i32);
        for (i, demod) in self.demod_configs.iter().enumerate() {
            let i = i as u32;
            s.write_string(TAG_DEMOD_BASE + 2 * i, &demod.demod);
            s.write_blob(TAG_DEMOD_BASE + 2 * i + 1, &demod.config);
        }
        s.finish()
    }

    pub fn deserialize(&mut self, data: &[u8]) -> Result<(), PresetError> {
        let d = match Deserializer::new(data) {
            Ok(d) => d,
            Err(_) => {
                self.reset_to_defaults();
                return Err(PresetError::Malformed);
            }
        };
        if d.version() != PRESET_VERSION {
            self.reset_to_defaults();
            return Err(PresetError::UnsupportedVersion(d.version()));
        }

        self.group = d.read_string(TAG_GROUP, "default");
        self.description = d.read_string(TAG_DESCRIPTION, "no name");
        self.center_frequency = d.read_u64(TAG_CENTER_FREQUENCY, 0);
        self.show_scope = d.read_bool(TAG_SHOW_SCOPE, true);
        self.layout = d.read_blob(TAG_LAYOUT);
        self.spectrum_config = d.read_blob(TAG_SPECTRUM_CONFIG);
        self.dc_offset_correction = d.read_bool(TAG_DC_OFFSET_CORRECTION, true);
        self.iq_imbalance_correction = d.read_bool(TAG_IQ_IMBALANCE_CORRECTION, true);
        self.scope_config = d.read_blob(TAG_SCOPE_CONFIG);
        self.source = d.read_string(TAG_SOURCE, "");
        self.source_general_config = d.read_blob(TAG_SOURCE_GENERAL_CONFIG);
        self.source_config = d.read_blob(TAG_SOURCE_CONFIG);

        self.demod_configs.clear();
        let count = d.read_s32(TAG_DEMOD_COUNT, 0).max(0) as u32;
        for i in 0..count {
            self.demod_configs.push(DemodConfig {
                demod: d.read_string(TAG_DEMOD_BASE + 2 * i, "unknown-demod"),
                config: d.read_blob(TAG_DEMOD_BASE + 2 * i + 1),
            });
        }
        Ok(())
    }
}
