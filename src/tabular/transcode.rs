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

//! Component-scoped value remapping.
//!
//! A rule table maps raw codes of one component to output values. The entry
//! keyed by the empty string is the default for empty or absent values.
//! Lookups are exact; there is no prefix or partial matching.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ComponentValue;

/// Component id to raw value to mapped value.
pub type TranscodingRules = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcoder {
    rules: TranscodingRules,
}

impl Transcoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: TranscodingRules) -> Self {
        Self { rules }
    }

    pub fn with_rule(mut self, component_id: &str, raw: &str, mapped: &str) -> Self {
        self.rules
            .entry(component_id.to_string())
            .or_default()
            .insert(raw.to_string(), mapped.to_string());
        self
    }

    pub fn rules(&self) -> &TranscodingRules {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn has_rule(&self, component_id: &str) -> bool {
        self.rules.contains_key(component_id)
    }

    pub fn apply(&self, component_id: &str, raw: &str) -> String {
        self.apply_optional(component_id, Some(raw))
    }

    /// Like [`Transcoder::apply`], with `None` standing for an absent value.
    pub fn apply_optional(&self, component_id: &str, raw: Option<&str>) -> String {
        let table = match self.rules.get(component_id) {
            Some(table) => table,
            None => return raw.unwrap_or_default().to_string(),
        };
        if let Some(mapped) = raw.and_then(|r| table.get(r)) {
            return mapped.clone();
        }
        let raw = raw.unwrap_or_default();
        if raw.is_empty() {
            if let Some(default) = table.get("") {
                return default.clone();
            }
        }
        raw.to_string()
    }

    /// Maps every sub-value of a complex value independently.
    pub fn apply_value(&self, component_id: &str, value: &ComponentValue) -> ComponentValue {
        if !self.has_rule(component_id) {
            return value.clone();
        }
        match value {
            ComponentValue::Scalar(v) => ComponentValue::Scalar(self.apply(component_id, v)),
            ComponentValue::Complex(vs) => {
                ComponentValue::Complex(vs.iter().map(|v| self.apply(component_id, v)).collect())
            }
        }
    }
}
