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

//! # Zicube Data Model
//!
//! Data cubes are organised in four layers: dataset, group, series and
//! observation. A [`DataStructure`] (the DSD) declares which dimensions,
//! attributes and measures exist and at which [`AttachmentLevel`] each of them
//! is recorded. Cursors hand out [`Keyable`]s (series or group keys with their
//! attributes) and [`Observation`]s; sinks receive the same values one
//! component at a time.
//!
//! ## Values
//!
//! Every component value is a [`ComponentValue`]: either a single scalar code
//! or, for *complex* components, an ordered sequence of sub-values. Empty
//! scalars and empty sequences are both "no value".
//!
//! ## Usage Example
//!
//! ```rust
//! use zicube::model::{DataStructure, DimensionRole, Keyable, Observation};
//!
//! let dsd = DataStructure::new("ECB_EXR")
//!     .with_dimension("FREQ", DimensionRole::Ordinary)
//!     .with_dimension("CURRENCY", DimensionRole::Ordinary)
//!     .with_dimension("TIME_PERIOD", DimensionRole::Time)
//!     .with_measure("OBS_VALUE", None);
//!
//! assert_eq!(dsd.time_dimension().map(|d| d.id.as_str()), Some("TIME_PERIOD"));
//!
//! let series = Keyable::series([("FREQ", "A"), ("CURRENCY", "USD")]);
//! let obs = Observation::new("TIME_PERIOD", "2020").with_measure("OBS_VALUE", "1.2");
//! assert_eq!(series.value("FREQ").and_then(|v| v.as_scalar()), Some("A"));
//! assert_eq!(obs.measures.len(), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Sentinel dimension-at-observation meaning "no single dimension".
pub const ALL_DIMENSIONS: &str = "AllDimensions";

/// Legacy alias that refers to the declared time dimension.
pub const TIME_ALIAS: &str = "TIME";

/// Hierarchy level at which a component value is recorded and cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttachmentLevel {
    Dataset,
    Group,
    Series,
    Observation,
}

impl AttachmentLevel {
    /// Nesting depth, dataset being the outermost level.
    pub fn depth(self) -> u8 {
        match self {
            AttachmentLevel::Dataset => 0,
            AttachmentLevel::Group => 1,
            AttachmentLevel::Series => 2,
            AttachmentLevel::Observation => 3,
        }
    }

    /// True when `self` is `other` or nested inside it.
    ///
    /// Groups and series are siblings; a group-level value is treated as part
    /// of the series scope it was written for.
    pub fn is_at_or_below(self, other: AttachmentLevel) -> bool {
        match other {
            AttachmentLevel::Group | AttachmentLevel::Series => self.depth() >= 1,
            _ => self.depth() >= other.depth(),
        }
    }
}

impl fmt::Display for AttachmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttachmentLevel::Dataset => "DATASET",
            AttachmentLevel::Group => "GROUP",
            AttachmentLevel::Series => "SERIES",
            AttachmentLevel::Observation => "OBSERVATION",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimensionRole {
    Ordinary,
    Time,
    Measure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Dimension,
    TimeDimension,
    MeasureDimension,
    Attribute,
    Measure,
}

/// A component resolved against one dataset's dimension-at-observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub kind: ComponentKind,
    pub level: AttachmentLevel,
    pub complex: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub id: String,
    pub role: DimensionRole,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: String,
    pub level: AttachmentLevel,
    /// Group the attribute is attached to when `level` is GROUP.
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub complex: bool,
}

impl Attribute {
    pub fn new(id: impl Into<String>, level: AttachmentLevel) -> Self {
        Self {
            id: id.into(),
            level,
            group: None,
            complex: false,
        }
    }

    pub fn for_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn complex(mut self) -> Self {
        self.complex = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub id: String,
    /// Measure-dimension code this measure stands for in cross-sectional data.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub complex: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub id: String,
    pub dimensions: Vec<String>,
}

/// Data structure definition: the schema of a dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStructure {
    pub id: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub measures: Vec<Measure>,
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
}

impl DataStructure {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_dimension(mut self, id: impl Into<String>, role: DimensionRole) -> Self {
        self.dimensions.push(Dimension {
            id: id.into(),
            role,
        });
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_measure(mut self, id: impl Into<String>, code: Option<&str>) -> Self {
        self.measures.push(Measure {
            id: id.into(),
            code: code.map(str::to_string),
            complex: false,
        });
        self
    }

    pub fn with_group<I, S>(mut self, id: impl Into<String>, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.push(GroupDefinition {
            id: id.into(),
            dimensions: dimensions.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn dimension(&self, id: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.id == id)
    }

    pub fn attribute(&self, id: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.id == id)
    }

    pub fn measure(&self, id: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&GroupDefinition> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn time_dimension(&self) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.role == DimensionRole::Time)
    }

    pub fn last_measure_dimension(&self) -> Option<&Dimension> {
        self.dimensions
            .iter()
            .rev()
            .find(|d| d.role == DimensionRole::Measure)
    }

    pub fn last_ordinary_dimension(&self) -> Option<&Dimension> {
        self.dimensions
            .iter()
            .rev()
            .find(|d| d.role == DimensionRole::Ordinary)
    }

    /// Maps a reported dimension id to the declared one, translating the
    /// legacy `TIME` alias to the declared time dimension.
    pub fn canonical_dimension_id<'a>(&'a self, id: &'a str) -> Option<&'a str> {
        if let Some(dim) = self.dimension(id) {
            return Some(dim.id.as_str());
        }
        if id == TIME_ALIAS {
            return self.time_dimension().map(|d| d.id.as_str());
        }
        None
    }

    /// Measures that stand for a measure-dimension code.
    pub fn cross_sectional_measures(&self) -> impl Iterator<Item = &Measure> {
        self.measures.iter().filter(|m| m.code.is_some())
    }

    pub fn measure_by_code(&self, code: &str) -> Option<&Measure> {
        self.measures
            .iter()
            .find(|m| m.code.as_deref() == Some(code))
    }

    pub fn has_multiple_measures(&self) -> bool {
        self.measures.len() > 1
    }

    /// Attributes attached to the given group.
    pub fn group_attributes<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Attribute> {
        self.attributes.iter().filter(move |a| {
            a.level == AttachmentLevel::Group && a.group.as_deref().map_or(true, |g| g == group)
        })
    }

    pub fn attributes_at(&self, level: AttachmentLevel) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(move |a| a.level == level)
    }

    /// Every declared component with the level it is recorded at, given the
    /// dimension written per observation.
    pub fn components(&self, dimension_at_observation: Option<&str>) -> Vec<Component> {
        let mut out = Vec::with_capacity(
            self.dimensions.len() + self.attributes.len() + self.measures.len(),
        );
        for dim in &self.dimensions {
            let kind = match dim.role {
                DimensionRole::Ordinary => ComponentKind::Dimension,
                DimensionRole::Time => ComponentKind::TimeDimension,
                DimensionRole::Measure => ComponentKind::MeasureDimension,
            };
            let level = if dimension_at_observation == Some(dim.id.as_str()) {
                AttachmentLevel::Observation
            } else {
                AttachmentLevel::Series
            };
            out.push(Component {
                id: dim.id.clone(),
                kind,
                level,
                complex: false,
            });
        }
        for attr in &self.attributes {
            out.push(Component {
                id: attr.id.clone(),
                kind: ComponentKind::Attribute,
                level: attr.level,
                complex: attr.complex,
            });
        }
        for measure in &self.measures {
            out.push(Component {
                id: measure.id.clone(),
                kind: ComponentKind::Measure,
                level: AttachmentLevel::Observation,
                complex: measure.complex,
            });
        }
        out
    }

    /// True when the component id is declared as complex.
    pub fn is_complex(&self, id: &str) -> bool {
        self.attribute(id).map(|a| a.complex).unwrap_or(false)
            || self.measure(id).map(|m| m.complex).unwrap_or(false)
    }
}

/// Message header shared by every dataset of one conversion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub id: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub prepared: Option<String>,
    #[serde(default)]
    pub test: bool,
}

impl Header {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Per-dataset header information as carried by the source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetHeader {
    #[serde(default)]
    pub dataset_id: Option<String>,
    pub structure_id: String,
    /// Explicit dimension-at-observation override, possibly [`ALL_DIMENSIONS`].
    #[serde(default)]
    pub dimension_at_observation: Option<String>,
    /// Set when the source declares the dataset as not being a time series.
    #[serde(default)]
    pub cross_sectional: bool,
}

impl DatasetHeader {
    pub fn new(structure_id: impl Into<String>) -> Self {
        Self {
            structure_id: structure_id.into(),
            ..Default::default()
        }
    }

    pub fn with_dimension_at_observation(mut self, id: impl Into<String>) -> Self {
        self.dimension_at_observation = Some(id.into());
        self
    }

    pub fn cross_sectional(mut self) -> Self {
        self.cross_sectional = true;
        self
    }
}

/// One conversion unit: header, structure and the resolved
/// dimension-at-observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dataset {
    pub header: DatasetHeader,
    pub structure: Arc<DataStructure>,
    pub dimension_at_observation: String,
}

/// A scalar code or the ordered sub-values of a complex component.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentValue {
    Scalar(String),
    Complex(Vec<String>),
}

impl ComponentValue {
    /// The empty value of the given shape.
    pub fn empty(complex: bool) -> Self {
        if complex {
            ComponentValue::Complex(Vec::new())
        } else {
            ComponentValue::Scalar(String::new())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ComponentValue::Scalar(v) => v.is_empty(),
            ComponentValue::Complex(vs) => vs.is_empty(),
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ComponentValue::Scalar(v) => Some(v.as_str()),
            ComponentValue::Complex(_) => None,
        }
    }

    /// Rendered length: scalar length, or the sub-value lengths plus one
    /// separator character between each pair.
    pub fn effective_len(&self) -> usize {
        match self {
            ComponentValue::Scalar(v) => v.chars().count(),
            ComponentValue::Complex(vs) => {
                let total: usize = vs.iter().map(|v| v.chars().count()).sum();
                total + vs.len().saturating_sub(1)
            }
        }
    }

    /// Flattens the value to one string, joining sub-values with `separator`.
    pub fn join(&self, separator: &str) -> String {
        match self {
            ComponentValue::Scalar(v) => v.clone(),
            ComponentValue::Complex(vs) => vs.join(separator),
        }
    }
}

impl Default for ComponentValue {
    fn default() -> Self {
        ComponentValue::Scalar(String::new())
    }
}

impl From<&str> for ComponentValue {
    fn from(v: &str) -> Self {
        ComponentValue::Scalar(v.to_string())
    }
}

impl From<String> for ComponentValue {
    fn from(v: String) -> Self {
        ComponentValue::Scalar(v)
    }
}

impl From<Vec<String>> for ComponentValue {
    fn from(vs: Vec<String>) -> Self {
        ComponentValue::Complex(vs)
    }
}

impl From<Vec<&str>> for ComponentValue {
    fn from(vs: Vec<&str>) -> Self {
        ComponentValue::Complex(vs.into_iter().map(str::to_string).collect())
    }
}

impl fmt::Display for ComponentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentValue::Scalar(v) => f.write_str(v),
            ComponentValue::Complex(vs) => write!(f, "[{}]", vs.join(", ")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyValue {
    pub id: String,
    pub value: ComponentValue,
}

impl KeyValue {
    pub fn new(id: impl Into<String>, value: impl Into<ComponentValue>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
        }
    }
}

/// A series key or a group key together with its attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyable {
    /// Group id for group keys; `None` for series.
    #[serde(default)]
    pub group: Option<String>,
    pub key: Vec<KeyValue>,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

impl Keyable {
    pub fn series<I, K, V>(key: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ComponentValue>,
    {
        Self {
            group: None,
            key: key.into_iter().map(|(k, v)| KeyValue::new(k, v)).collect(),
            attributes: Vec::new(),
        }
    }

    pub fn group<I, K, V>(group: impl Into<String>, key: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ComponentValue>,
    {
        let mut keyable = Self::series(key);
        keyable.group = Some(group.into());
        keyable
    }

    pub fn with_attribute(mut self, id: impl Into<String>, value: impl Into<ComponentValue>) -> Self {
        self.attributes.push(KeyValue::new(id, value));
        self
    }

    pub fn is_series(&self) -> bool {
        self.group.is_none()
    }

    pub fn value(&self, id: &str) -> Option<&ComponentValue> {
        self.key.iter().find(|kv| kv.id == id).map(|kv| &kv.value)
    }
}

/// One observation of the current series.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Dimension the source reports the observation against (may be an alias
    /// or empty for flat sources that carry it in the key).
    pub dimension_id: String,
    pub dimension_value: String,
    #[serde(default)]
    pub measures: Vec<KeyValue>,
    #[serde(default)]
    pub attributes: Vec<KeyValue>,
}

impl Observation {
    pub fn new(dimension_id: impl Into<String>, dimension_value: impl Into<String>) -> Self {
        Self {
            dimension_id: dimension_id.into(),
            dimension_value: dimension_value.into(),
            measures: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn with_measure(mut self, id: impl Into<String>, value: impl Into<ComponentValue>) -> Self {
        self.measures.push(KeyValue::new(id, value));
        self
    }

    pub fn with_attribute(mut self, id: impl Into<String>, value: impl Into<ComponentValue>) -> Self {
        self.attributes.push(KeyValue::new(id, value));
        self
    }
}
