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

//! # Conversion Configuration
//!
//! [`ConversionConfig`] can be built in code or loaded from JSON or YAML.
//! Every field has a default, so a config file only lists what it changes:
//!
//! ```yaml
//! reorder_cross_sectional: true
//! cross_sectional_measures: [STOCK_A, STOCK_B]
//! error_policy: collect
//! transcoding:
//!   SEX:
//!     M: Male
//!     "": NA
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{CubeError, Result};
use crate::tabular::transcode::{Transcoder, TranscodingRules};

/// What happens to recoverable data format errors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abort on the first error.
    #[default]
    FailFast,
    /// Log, keep and continue.
    Collect,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Merge observation values of a series until the series closes.
    pub aggregate_observations: bool,
    /// Run the two-pass reorder engine instead of a straight copy.
    pub reorder_cross_sectional: bool,
    /// Measure ids kept by the reorder engine; empty means every measure with
    /// a measure-dimension code.
    pub cross_sectional_measures: Vec<String>,
    pub transcoding: TranscodingRules,
    /// Separator between sub-values of complex components in flat output.
    pub complex_separator: String,
    /// Explicit fixed-width column sizes; probed from the data when absent.
    pub column_widths: Option<BTreeMap<String, usize>>,
    pub error_policy: ErrorPolicy,
    pub store_namespace_prefix: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            aggregate_observations: false,
            reorder_cross_sectional: false,
            cross_sectional_measures: Vec::new(),
            transcoding: TranscodingRules::new(),
            complex_separator: ";".to_string(),
            column_widths: None,
            error_policy: ErrorPolicy::FailFast,
            store_namespace_prefix: "zicube".to_string(),
        }
    }
}

impl ConversionConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "json" => Self::from_json_str(&raw),
            "yaml" | "yml" => Self::from_yaml_str(&raw),
            other => Err(CubeError::configuration(format!(
                "unsupported configuration format '{}' for {}",
                other,
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.complex_separator.is_empty() {
            return Err(CubeError::configuration("complex_separator must not be empty"));
        }
        let mut seen = HashSet::new();
        for id in &self.cross_sectional_measures {
            if id.is_empty() || !seen.insert(id.as_str()) {
                return Err(CubeError::configuration(format!(
                    "cross_sectional_measures contains an empty or repeated id '{}'",
                    id
                )));
            }
        }
        if let Some(widths) = &self.column_widths {
            if let Some((id, _)) = widths.iter().find(|(_, w)| **w == 0) {
                return Err(CubeError::configuration(format!("column width of '{}' is zero", id)));
            }
        }
        if self.store_namespace_prefix.is_empty() {
            return Err(CubeError::configuration("store_namespace_prefix must not be empty"));
        }
        if !self.cross_sectional_measures.is_empty() && !self.reorder_cross_sectional {
            log::warn!("cross_sectional_measures are ignored unless reorder_cross_sectional is set");
        }
        Ok(())
    }

    pub fn transcoder(&self) -> Transcoder {
        Transcoder::from_rules(self.transcoding.clone())
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_reorder(mut self, measures: Vec<String>) -> Self {
        self.reorder_cross_sectional = true;
        self.cross_sectional_measures = measures;
        self
    }

    pub fn with_aggregate_observations(mut self, enabled: bool) -> Self {
        self.aggregate_observations = enabled;
        self
    }
}
