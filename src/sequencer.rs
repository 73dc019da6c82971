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

//! # Write Sequencer
//!
//! Producers emit component values in whatever order their source hands them
//! out; sinks that are attribute-oriented need every value of a level before
//! any child content. The [`WriteSequencer`] sits in between: it buffers the
//! values of the level being written and commits a level to the sink as one
//! open → values → close sequence when a sibling or parent level begins, or
//! when the sequencer is closed.
//!
//! ## States
//!
//! ```text
//! Created -> HeaderWritten -> InDataset -> (InGroup | InSeries -> InObservation*)* -> Closed
//! ```
//!
//! Only forward and sibling transitions are legal. A call arriving in a state
//! that does not accept it fails with [`CubeError::Protocol`].
//!
//! ## Aggregated observations
//!
//! With [`SequencerOptions::aggregate_observations`] set, beginning an
//! observation whose dimension value was already seen in the current series
//! re-opens that observation instead of committing it. Every distinct
//! observation is committed once, in first-seen order, when the series
//! closes. Series that carry several measures as side-by-side columns use
//! this to merge them into one observation per dimension value.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{CubeError, Result};
use crate::model::{AttachmentLevel, ComponentValue, DataStructure, Dataset, Header, KeyValue};
use crate::sink::Sink;

/// Position of a [`WriteSequencer`] in the level protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SequencerState {
    /// Nothing written yet.
    Created,
    /// Header written, no dataset open.
    HeaderWritten,
    InDataset,
    InGroup,
    InSeries,
    InObservation,
    /// Closed or aborted; every further call is a protocol error.
    Closed,
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

use SequencerState::*;

const DATASET_CHILD_STATES: &[SequencerState] = &[InDataset, InGroup, InSeries, InObservation];

/// Behaviour switches of a [`WriteSequencer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerOptions {
    /// Merge observations that repeat a dimension value within one series.
    pub aggregate_observations: bool,
}

/// Number of level instances committed so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerStats {
    pub datasets: usize,
    pub groups: usize,
    pub series: usize,
    pub observations: usize,
}

/// Values of one level, seeded with the declared components in declaration
/// order. Re-assigning a component replaces its value in place.
#[derive(Clone, Debug, Default)]
struct LevelBuffer {
    entries: Vec<(String, ComponentValue)>,
    index: HashMap<String, usize>,
}

impl LevelBuffer {
    fn reset<'a, I>(&mut self, seeds: I)
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        self.entries.clear();
        self.index.clear();
        for (id, complex) in seeds {
            if !self.index.contains_key(id) {
                self.index.insert(id.to_string(), self.entries.len());
                self.entries
                    .push((id.to_string(), ComponentValue::empty(complex)));
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    fn set(&mut self, id: &str, value: ComponentValue) {
        match self.index.get(id) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(id.to_string(), self.entries.len());
                self.entries.push((id.to_string(), value));
            }
        }
    }

    fn populated(&self) -> impl Iterator<Item = (&str, &ComponentValue)> {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(id, v)| (id.as_str(), v))
    }
}

#[derive(Clone, Debug, Default)]
struct ObservationBuffer {
    dimension_id: String,
    dimension_value: String,
    attributes: LevelBuffer,
    measures: LevelBuffer,
}

impl ObservationBuffer {
    fn seeded(structure: Option<&DataStructure>, dimension_id: &str, dimension_value: &str) -> Self {
        let mut buf = ObservationBuffer {
            dimension_id: dimension_id.to_string(),
            dimension_value: dimension_value.to_string(),
            ..Default::default()
        };
        if let Some(dsd) = structure {
            buf.attributes.reset(
                dsd.attributes_at(AttachmentLevel::Observation)
                    .map(|a| (a.id.as_str(), a.complex)),
            );
            buf.measures
                .reset(dsd.measures.iter().map(|m| (m.id.as_str(), m.complex)));
        }
        buf
    }
}

/// Buffers level values and commits them to a [`Sink`] in nesting order.
pub struct WriteSequencer<'s, S: Sink + ?Sized> {
    sink: &'s mut S,
    options: SequencerOptions,
    state: SequencerState,
    stats: SequencerStats,

    dataset: Option<Dataset>,
    dataset_open: bool,
    dataset_attributes: LevelBuffer,

    group_id: Option<String>,
    group_key: LevelBuffer,
    group_attributes: LevelBuffer,

    series_open: bool,
    series_key: LevelBuffer,
    series_attributes: LevelBuffer,

    observation: Option<ObservationBuffer>,
    aggregated: Vec<ObservationBuffer>,
    aggregated_index: HashMap<(String, String), usize>,
    current_aggregate: Option<usize>,
}

impl<'s, S: Sink + ?Sized> WriteSequencer<'s, S> {
    /// Creates a sequencer with default options over `sink`.
    pub fn new(sink: &'s mut S) -> Self {
        Self::with_options(sink, SequencerOptions::default())
    }

    /// Creates a sequencer with explicit options.
    pub fn with_options(sink: &'s mut S, options: SequencerOptions) -> Self {
        Self {
            sink,
            options,
            state: Created,
            stats: SequencerStats::default(),
            dataset: None,
            dataset_open: false,
            dataset_attributes: LevelBuffer::default(),
            group_id: None,
            group_key: LevelBuffer::default(),
            group_attributes: LevelBuffer::default(),
            series_open: false,
            series_key: LevelBuffer::default(),
            series_attributes: LevelBuffer::default(),
            observation: None,
            aggregated: Vec::new(),
            aggregated_index: HashMap::new(),
            current_aggregate: None,
        }
    }

    /// Current protocol state.
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Level instances committed to the sink so far.
    pub fn stats(&self) -> SequencerStats {
        self.stats
    }

    /// Options this sequencer was created with.
    pub fn options(&self) -> SequencerOptions {
        self.options
    }

    /// Dataset currently being written, if any.
    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    fn expect_state(&self, call: &str, allowed: &[SequencerState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CubeError::protocol(self.state.to_string(), call))
        }
    }

    fn structure(&self) -> Option<Arc<DataStructure>> {
        self.dataset.as_ref().map(|d| Arc::clone(&d.structure))
    }

    /// Writes the message header. Must be the first call.
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        self.expect_state("write_header", &[Created])?;
        self.sink.write_header(header)?;
        self.state = HeaderWritten;
        Ok(())
    }

    /// Begins a dataset, committing the previous one if still open.
    pub fn start_dataset(&mut self, dataset: Dataset) -> Result<()> {
        self.expect_state(
            "start_dataset",
            &[HeaderWritten, InDataset, InGroup, InSeries, InObservation],
        )?;
        if self.state != HeaderWritten {
            self.exit_dataset()?;
        }
        self.dataset_attributes.reset(
            dataset
                .structure
                .attributes_at(AttachmentLevel::Dataset)
                .map(|a| (a.id.as_str(), a.complex)),
        );
        log::debug!(
            "dataset started: structure={} dimension_at_observation={}",
            dataset.header.structure_id,
            dataset.dimension_at_observation
        );
        self.dataset = Some(dataset);
        self.dataset_open = false;
        self.state = InDataset;
        Ok(())
    }

    /// Buffers a dataset-level attribute; last write wins.
    pub fn write_dataset_attribute(&mut self, id: &str, value: impl Into<ComponentValue>) -> Result<()> {
        self.expect_state("write_dataset_attribute", &[InDataset])?;
        self.dataset_attributes.set(id, value.into());
        Ok(())
    }

    pub fn start_group(&mut self, group_id: &str) -> Result<()> {
        self.expect_state("start_group", DATASET_CHILD_STATES)?;
        self.exit_group_or_series()?;
        self.open_dataset()?;
        let structure = self.structure();
        match structure.as_deref().and_then(|dsd| dsd.group(group_id).map(|g| (dsd, g))) {
            Some((dsd, group)) => {
                self.group_key
                    .reset(group.dimensions.iter().map(|d| (d.as_str(), false)));
                self.group_attributes.reset(
                    dsd.group_attributes(group_id)
                        .map(|a| (a.id.as_str(), a.complex)),
                );
            }
            None => {
                self.group_key.clear();
                self.group_attributes.clear();
            }
        }
        self.group_id = Some(group_id.to_string());
        self.state = InGroup;
        Ok(())
    }

    /// Buffers one dimension value of the open group key.
    pub fn write_group_key_value(&mut self, id: &str, value: impl Into<ComponentValue>) -> Result<()> {
        self.expect_state("write_group_key_value", &[InGroup])?;
        self.group_key.set(id, value.into());
        Ok(())
    }

    /// Buffers an attribute of the open group.
    pub fn write_group_attribute(&mut self, id: &str, value: impl Into<ComponentValue>) -> Result<()> {
        self.expect_state("write_group_attribute", &[InGroup])?;
        self.group_attributes.set(id, value.into());
        Ok(())
    }

    pub fn start_series(&mut self) -> Result<()> {
        self.expect_state("start_series", DATASET_CHILD_STATES)?;
        self.exit_group_or_series()?;
        self.open_dataset()?;
        let dao = self
            .dataset
            .as_ref()
            .map(|d| d.dimension_at_observation.clone())
            .unwrap_or_default();
        match self.structure() {
            Some(dsd) => {
                self.series_key.reset(
                    dsd.dimensions
                        .iter()
                        .filter(|d| d.id != dao)
                        .map(|d| (d.id.as_str(), false)),
                );
                self.series_attributes.reset(
                    dsd.attributes_at(AttachmentLevel::Series)
                        .map(|a| (a.id.as_str(), a.complex)),
                );
            }
            None => {
                self.series_key.clear();
                self.series_attributes.clear();
            }
        }
        self.series_open = false;
        self.state = InSeries;
        Ok(())
    }

    /// Buffers one dimension value of the open series key.
    pub fn write_series_key_value(&mut self, id: &str, value: impl Into<ComponentValue>) -> Result<()> {
        self.expect_state("write_series_key_value", &[InSeries])?;
        self.series_key.set(id, value.into());
        Ok(())
    }

    /// Buffers an attribute of the open series.
    pub fn write_series_attribute(&mut self, id: &str, value: impl Into<ComponentValue>) -> Result<()> {
        self.expect_state("write_series_attribute", &[InSeries])?;
        self.series_attributes.set(id, value.into());
        Ok(())
    }

    /// Begins an observation of the current series.
    pub fn start_observation(&mut self, dimension_id: &str, dimension_value: &str) -> Result<()> {
        self.expect_state("start_observation", &[InSeries, InObservation])?;
        if !self.options.aggregate_observations {
            self.commit_pending_observation()?;
        }
        self.open_series()?;
        let structure = self.structure();
        if self.options.aggregate_observations {
            let key = (dimension_id.to_string(), dimension_value.to_string());
            let pos = match self.aggregated_index.get(&key) {
                Some(&pos) => pos,
                None => {
                    let pos = self.aggregated.len();
                    self.aggregated.push(ObservationBuffer::seeded(
                        structure.as_deref(),
                        dimension_id,
                        dimension_value,
                    ));
                    self.aggregated_index.insert(key, pos);
                    pos
                }
            };
            self.current_aggregate = Some(pos);
        } else {
            self.observation = Some(ObservationBuffer::seeded(
                structure.as_deref(),
                dimension_id,
                dimension_value,
            ));
        }
        self.state = InObservation;
        Ok(())
    }

    /// Buffers a measure value of the open observation.
    pub fn write_observation_value(&mut self, measure_id: &str, value: impl Into<ComponentValue>) -> Result<()> {
        self.expect_state("write_observation_value", &[InObservation])?;
        let value = value.into();
        self.current_observation()?.measures.set(measure_id, value);
        Ok(())
    }

    /// Buffers an attribute of the open observation.
    pub fn write_observation_attribute(&mut self, id: &str, value: impl Into<ComponentValue>) -> Result<()> {
        self.expect_state("write_observation_attribute", &[InObservation])?;
        let value = value.into();
        self.current_observation()?.attributes.set(id, value);
        Ok(())
    }

    /// Begins an observation and records its measure values in one call.
    pub fn write_observation(
        &mut self,
        dimension_id: &str,
        dimension_value: &str,
        measures: &[KeyValue],
    ) -> Result<()> {
        self.start_observation(dimension_id, dimension_value)?;
        for kv in measures {
            self.write_observation_value(&kv.id, kv.value.clone())?;
        }
        Ok(())
    }

    fn current_observation(&mut self) -> Result<&mut ObservationBuffer> {
        let current = if self.options.aggregate_observations {
            self.current_aggregate
                .and_then(|pos| self.aggregated.get_mut(pos))
        } else {
            self.observation.as_mut()
        };
        current.ok_or_else(|| CubeError::internal("no observation buffer while in observation"))
    }

    /// Commits everything still pending (observation, series, group, dataset)
    /// and closes the sink. Calling it again has no effect.
    pub fn close(&mut self) -> Result<()> {
        if self.state == Closed {
            return Ok(());
        }
        let committed = if DATASET_CHILD_STATES.contains(&self.state) {
            self.exit_dataset()
        } else {
            Ok(())
        };
        self.state = Closed;
        let released = self.sink.close();
        log::debug!(
            "sequencer closed: datasets={} groups={} series={} observations={}",
            self.stats.datasets,
            self.stats.groups,
            self.stats.series,
            self.stats.observations
        );
        committed.and(released)
    }

    /// Closes the sink without committing anything still buffered.
    pub fn abort(&mut self) -> Result<()> {
        if self.state == Closed {
            return Ok(());
        }
        self.state = Closed;
        self.sink.close()
    }

    fn open_dataset(&mut self) -> Result<()> {
        if self.dataset_open {
            return Ok(());
        }
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| CubeError::internal("no dataset to open"))?;
        self.sink.start_dataset(dataset)?;
        for (id, value) in self.dataset_attributes.populated() {
            self.sink.write_attribute_value(id, value)?;
        }
        self.dataset_open = true;
        Ok(())
    }

    fn exit_dataset(&mut self) -> Result<()> {
        self.exit_group_or_series()?;
        self.open_dataset()?;
        self.sink.end_dataset()?;
        self.stats.datasets += 1;
        self.dataset = None;
        self.dataset_open = false;
        self.dataset_attributes.clear();
        Ok(())
    }

    fn exit_group_or_series(&mut self) -> Result<()> {
        match self.state {
            InGroup => self.commit_group(),
            InSeries | InObservation => self.close_series(),
            _ => Ok(()),
        }
    }

    fn commit_group(&mut self) -> Result<()> {
        let group_id = self
            .group_id
            .take()
            .ok_or_else(|| CubeError::internal("no group to commit"))?;
        self.sink.start_group(&group_id)?;
        for (id, value) in self.group_key.populated() {
            self.sink.write_group_key_value(id, value)?;
        }
        for (id, value) in self.group_attributes.populated() {
            self.sink.write_attribute_value(id, value)?;
        }
        self.sink.end_group()?;
        self.stats.groups += 1;
        self.state = InDataset;
        Ok(())
    }

    fn open_series(&mut self) -> Result<()> {
        if self.series_open {
            return Ok(());
        }
        self.sink.start_series()?;
        for (id, value) in self.series_key.populated() {
            self.sink.write_series_key_value(id, value)?;
        }
        for (id, value) in self.series_attributes.populated() {
            self.sink.write_attribute_value(id, value)?;
        }
        self.series_open = true;
        Ok(())
    }

    fn close_series(&mut self) -> Result<()> {
        self.commit_pending_observation()?;
        self.open_series()?;
        if self.options.aggregate_observations {
            let pending = std::mem::take(&mut self.aggregated);
            self.aggregated_index.clear();
            self.current_aggregate = None;
            for buf in &pending {
                emit_observation(&mut *self.sink, buf)?;
                self.stats.observations += 1;
            }
        }
        self.sink.end_series()?;
        self.stats.series += 1;
        self.series_open = false;
        self.state = InDataset;
        Ok(())
    }

    fn commit_pending_observation(&mut self) -> Result<()> {
        if let Some(buf) = self.observation.take() {
            emit_observation(&mut *self.sink, &buf)?;
            self.stats.observations += 1;
        }
        Ok(())
    }
}

fn emit_observation<S: Sink + ?Sized>(sink: &mut S, buf: &ObservationBuffer) -> Result<()> {
    sink.write_observation(&buf.dimension_id, &buf.dimension_value)?;
    for (id, value) in buf.attributes.populated() {
        sink.write_attribute_value(id, value)?;
    }
    for (id, value) in buf.measures.populated() {
        sink.write_measure_value(id, value)?;
    }
    sink.end_observation()
}

impl<'s, S: Sink + ?Sized> Drop for WriteSequencer<'s, S> {
    fn drop(&mut self) {
        if self.state != Closed {
            log::warn!("write sequencer dropped in state {} without close; releasing sink", self.state);
            if let Err(err) = self.abort() {
                log::warn!("failed to release sink: {}", err);
            }
        }
    }
}
