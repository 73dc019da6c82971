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

//! # Flat Rows
//!
//! [`FlatRowBuffer`] keeps one slot per declared component and assembles a
//! complete row per observation. Columns are the dimensions, then the
//! attributes, then the measures, each in declaration order.
//!
//! When the structure declares more than one measure, every measure has its
//! own slot and writing a measure value emits a row right away with only that
//! measure filled in. Otherwise the row is emitted when the observation ends.
//!
//! [`TabularSink`] hosts the buffer behind the [`Sink`] interface and hands
//! finished rows to a [`RowSink`]. A group is written once per dataset, so the
//! sink keeps the last committed attributes of every group key and fills them
//! into each series whose key matches.

use std::collections::{BTreeMap, HashMap};

use crate::errors::{CubeError, Result};
use crate::model::{AttachmentLevel, ComponentValue, DataStructure, Dataset, Header};
use crate::sink::Sink;
use crate::tabular::transcode::Transcoder;

/// Receives finished rows from a [`TabularSink`].
pub trait RowSink {
    /// Called before the first row of a dataset whose columns differ from
    /// the previous ones.
    fn write_columns(&mut self, columns: &[String]) -> Result<()>;

    /// Receives one complete row in column order.
    fn write_row(&mut self, row: &[String]) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Keeps rows in memory.
#[derive(Clone, Debug, Default)]
pub struct VecRowSink {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub closed: bool,
}

impl VecRowSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `column` in row `index`.
    pub fn cell(&self, index: usize, column: &str) -> Option<&str> {
        let pos = self.columns.iter().position(|c| c == column)?;
        self.rows.get(index).and_then(|row| row.get(pos)).map(String::as_str)
    }
}

impl RowSink for VecRowSink {
    fn write_columns(&mut self, columns: &[String]) -> Result<()> {
        self.columns = columns.to_vec();
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<()> {
        self.rows.push(row.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// One slot per column; completes a row per observation or per measure.
#[derive(Clone, Debug)]
pub struct FlatRowBuffer {
    columns: Vec<String>,
    levels: Vec<AttachmentLevel>,
    index: HashMap<String, usize>,
    /// Column positions of the declared measures.
    measures: Vec<usize>,
    multi_measure: bool,
    values: Vec<String>,
    transcoder: Transcoder,
    separator: String,
}

impl FlatRowBuffer {
    pub fn new(dsd: &DataStructure, dimension_at_observation: &str, transcoder: Transcoder, separator: &str) -> Self {
        let components = dsd.components(Some(dimension_at_observation));
        let mut columns = Vec::with_capacity(components.len());
        let mut levels = Vec::with_capacity(components.len());
        let mut index = HashMap::new();
        for component in components {
            if index.contains_key(&component.id) {
                continue;
            }
            index.insert(component.id.clone(), columns.len());
            columns.push(component.id);
            levels.push(component.level);
        }
        let measures = dsd
            .measures
            .iter()
            .filter_map(|m| index.get(&m.id).copied())
            .collect();
        let values = vec![String::new(); columns.len()];
        Self {
            columns,
            levels,
            index,
            measures,
            multi_measure: dsd.has_multiple_measures(),
            values,
            transcoder,
            separator: separator.to_string(),
        }
    }

    /// Column ids in output order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_multi_measure(&self) -> bool {
        self.multi_measure
    }

    pub fn value(&self, id: &str) -> Option<&str> {
        self.index.get(id).map(|&pos| self.values[pos].as_str())
    }

    /// Stores a transcoded value, last write wins. In multi-measure mode a
    /// measure value completes a row, which is returned.
    pub fn set(&mut self, id: &str, value: &ComponentValue) -> Option<Vec<String>> {
        let pos = match self.index.get(id) {
            Some(&pos) => pos,
            None => {
                log::debug!("ignoring undeclared component {}", id);
                return None;
            }
        };
        self.values[pos] = self.transcoder.apply_value(id, value).join(&self.separator);
        if self.multi_measure && self.measures.contains(&pos) {
            let mut row = self.snapshot();
            for &other in self.measures.iter().filter(|&&m| m != pos) {
                row[other].clear();
            }
            self.values[pos].clear();
            return Some(row);
        }
        None
    }

    /// Ends the current observation; returns its row unless rows are emitted
    /// per measure.
    pub fn complete_observation(&mut self) -> Option<Vec<String>> {
        let row = if self.multi_measure {
            None
        } else {
            Some(self.snapshot())
        };
        self.close_level(AttachmentLevel::Observation);
        row
    }

    /// Current values, with unset slots given their transcoding default.
    fn snapshot(&self) -> Vec<String> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(id, value)| {
                if value.is_empty() && self.transcoder.has_rule(id) {
                    self.transcoder.apply_optional(id, None)
                } else {
                    value.clone()
                }
            })
            .collect()
    }

    /// Clears every slot recorded at or below `level`.
    pub fn close_level(&mut self, level: AttachmentLevel) {
        for (value, slot_level) in self.values.iter_mut().zip(&self.levels) {
            if slot_level.is_at_or_below(level) {
                value.clear();
            }
        }
    }
}

/// Key and attributes of one committed group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct CommittedGroup {
    id: String,
    key: Vec<(String, ComponentValue)>,
    attributes: Vec<(String, ComponentValue)>,
}

impl CommittedGroup {
    fn matches(&self, series_key: &BTreeMap<String, ComponentValue>) -> bool {
        self.key.iter().all(|(id, v)| series_key.get(id) == Some(v))
    }
}

/// A [`Sink`] that flattens the cube into rows.
pub struct TabularSink<R: RowSink> {
    rows: R,
    transcoder: Transcoder,
    separator: String,
    buffer: Option<FlatRowBuffer>,
    columns: Option<Vec<String>>,
    rows_written: usize,
    groups: Vec<CommittedGroup>,
    open_group: Option<CommittedGroup>,
    series_key: BTreeMap<String, ComponentValue>,
    groups_seeded: bool,
}

impl<R: RowSink> TabularSink<R> {
    pub fn new(rows: R) -> Self {
        Self {
            rows,
            transcoder: Transcoder::default(),
            separator: ";".to_string(),
            buffer: None,
            columns: None,
            rows_written: 0,
            groups: Vec::new(),
            open_group: None,
            series_key: BTreeMap::new(),
            groups_seeded: false,
        }
    }

    pub fn with_transcoder(mut self, transcoder: Transcoder) -> Self {
        self.transcoder = transcoder;
        self
    }

    /// Separator placed between the sub-values of complex components.
    pub fn with_separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    /// Rows handed to the row sink so far.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn row_sink(&self) -> &R {
        &self.rows
    }

    pub fn into_inner(self) -> R {
        self.rows
    }

    fn buffer(&mut self) -> Result<&mut FlatRowBuffer> {
        self.buffer
            .as_mut()
            .ok_or_else(|| CubeError::internal("tabular sink received values outside a dataset"))
    }

    fn emit(&mut self, row: Option<Vec<String>>) -> Result<()> {
        if let Some(row) = row {
            self.rows.write_row(&row)?;
            self.rows_written += 1;
        }
        Ok(())
    }

    fn set(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        let row = self.buffer()?.set(id, value);
        self.emit(row)
    }

    /// Last write wins per group id and key.
    fn commit_group(&mut self) {
        if let Some(group) = self.open_group.take() {
            match self.groups.iter_mut().find(|g| g.id == group.id && g.key == group.key) {
                Some(existing) => *existing = group,
                None => self.groups.push(group),
            }
        }
    }

    /// Fills the attributes of every group the current series belongs to.
    fn seed_groups(&mut self) -> Result<()> {
        self.groups_seeded = true;
        let attributes: Vec<(String, ComponentValue)> = self
            .groups
            .iter()
            .filter(|g| g.matches(&self.series_key))
            .flat_map(|g| g.attributes.iter().cloned())
            .collect();
        for (id, value) in &attributes {
            self.set(id, value)?;
        }
        Ok(())
    }
}

impl<R: RowSink> Sink for TabularSink<R> {
    fn write_header(&mut self, header: &Header) -> Result<()> {
        log::debug!("tabular output for message {}", header.id);
        Ok(())
    }

    fn start_dataset(&mut self, dataset: &Dataset) -> Result<()> {
        let buffer = FlatRowBuffer::new(
            &dataset.structure,
            &dataset.dimension_at_observation,
            self.transcoder.clone(),
            &self.separator,
        );
        if self.columns.as_deref() != Some(buffer.columns()) {
            self.rows.write_columns(buffer.columns())?;
            self.columns = Some(buffer.columns().to_vec());
        }
        self.buffer = Some(buffer);
        self.groups.clear();
        self.open_group = None;
        Ok(())
    }

    fn end_dataset(&mut self) -> Result<()> {
        self.commit_group();
        self.groups.clear();
        self.buffer()?.close_level(AttachmentLevel::Dataset);
        Ok(())
    }

    fn start_group(&mut self, group_id: &str) -> Result<()> {
        self.commit_group();
        self.open_group = Some(CommittedGroup {
            id: group_id.to_string(),
            ..CommittedGroup::default()
        });
        Ok(())
    }

    fn write_group_key_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        let group = self
            .open_group
            .as_mut()
            .ok_or_else(|| CubeError::internal("group key value outside a group"))?;
        group.key.push((id.to_string(), value.clone()));
        Ok(())
    }

    fn end_group(&mut self) -> Result<()> {
        self.commit_group();
        Ok(())
    }

    fn start_series(&mut self) -> Result<()> {
        self.commit_group();
        self.series_key.clear();
        self.groups_seeded = false;
        Ok(())
    }

    fn write_series_key_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        self.series_key.insert(id.to_string(), value.clone());
        self.set(id, value)
    }

    fn end_series(&mut self) -> Result<()> {
        self.buffer()?.close_level(AttachmentLevel::Series);
        Ok(())
    }

    fn write_attribute_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        if let Some(group) = self.open_group.as_mut() {
            group.attributes.push((id.to_string(), value.clone()));
            return Ok(());
        }
        self.set(id, value)
    }

    fn write_observation(&mut self, dimension_id: &str, dimension_value: &str) -> Result<()> {
        if !self.groups_seeded {
            self.seed_groups()?;
        }
        self.set(dimension_id, &ComponentValue::from(dimension_value))
    }

    fn write_measure_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        self.set(id, value)
    }

    fn end_observation(&mut self) -> Result<()> {
        let row = self.buffer()?.complete_observation();
        self.emit(row)
    }

    fn close(&mut self) -> Result<()> {
        log::info!("tabular sink closed after {} rows", self.rows_written);
        self.rows.close()
    }
}
