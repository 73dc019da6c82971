//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zicube.
//! The Zicube project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Length Probe
//!
//! A read-only pass over a cursor that records the widest value seen for
//! every component id. Fixed-width writers size their columns from the result
//! when no explicit widths are configured.
//!
//! The cursor is rewound before and after the pass, so the emission pass that
//! follows starts from the first dataset.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::errors::Result;
use crate::model::{ComponentValue, KeyValue};
use crate::tabular::transcode::Transcoder;

/// Maximum rendered length per component id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldWidths {
    widths: BTreeMap<String, usize>,
}

impl FieldWidths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(widths: BTreeMap<String, usize>) -> Self {
        Self { widths }
    }

    pub fn get(&self, id: &str) -> Option<usize> {
        self.widths.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, usize> {
        &self.widths
    }

    pub fn into_map(self) -> BTreeMap<String, usize> {
        self.widths
    }

    /// Records one observed length, keeping the maximum.
    pub fn observe(&mut self, id: &str, len: usize) {
        let width = self.widths.entry(id.to_string()).or_insert(0);
        *width = (*width).max(len);
    }

    /// Returns the explicit widths when given, otherwise probes the cursor.
    pub fn resolve<C: Cursor + ?Sized>(
        explicit: Option<&BTreeMap<String, usize>>,
        cursor: &mut C,
    ) -> Result<Self> {
        match explicit {
            Some(widths) => Ok(Self::from_map(widths.clone())),
            None => LengthProbe::new().probe(cursor),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LengthProbe {
    transcoder: Option<Transcoder>,
}

impl LengthProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measures values after transcoding, as a tabular sink would write them.
    pub fn with_transcoder(mut self, transcoder: Transcoder) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    fn len_of(&self, id: &str, value: &ComponentValue) -> usize {
        match &self.transcoder {
            Some(t) => t.apply_value(id, value).effective_len(),
            None => value.effective_len(),
        }
    }

    fn observe_all(&self, widths: &mut FieldWidths, values: &[KeyValue]) {
        for kv in values {
            widths.observe(&kv.id, self.len_of(&kv.id, &kv.value));
        }
    }

    pub fn probe<C: Cursor + ?Sized>(&self, cursor: &mut C) -> Result<FieldWidths> {
        let mut widths = FieldWidths::new();
        cursor.reset()?;
        while cursor.move_next_dataset()? {
            let structure = cursor.structure();
            self.observe_all(&mut widths, cursor.dataset_attributes());
            while cursor.move_next_keyable()? {
                if let Some(key) = cursor.current_key() {
                    self.observe_all(&mut widths, &key.key);
                    self.observe_all(&mut widths, &key.attributes);
                }
                while cursor.move_next_observation()? {
                    let obs = match cursor.current_observation() {
                        Some(obs) => obs,
                        None => continue,
                    };
                    if !obs.dimension_id.is_empty() {
                        let id = structure
                            .as_deref()
                            .and_then(|dsd| dsd.canonical_dimension_id(&obs.dimension_id))
                            .unwrap_or(obs.dimension_id.as_str());
                        let value = ComponentValue::from(obs.dimension_value.as_str());
                        widths.observe(id, self.len_of(id, &value));
                    }
                    self.observe_all(&mut widths, &obs.measures);
                    self.observe_all(&mut widths, &obs.attributes);
                }
            }
        }
        cursor.reset()?;
        log::debug!("probed widths for {} components", widths.len());
        Ok(widths)
    }
}
