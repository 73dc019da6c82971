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

//! # Sink Module
//!
//! A [`Sink`] is the write side of one concrete wire format. The
//! [`WriteSequencer`](crate::sequencer::WriteSequencer) guarantees that a sink
//! sees every level as one open → values → close sequence:
//!
//! | level       | open                    | values                                               | close             |
//! |-------------|-------------------------|------------------------------------------------------|-------------------|
//! | dataset     | `start_dataset`         | `write_attribute_value`*                             | `end_dataset`     |
//! | group       | `start_group`           | `write_group_key_value`*, `write_attribute_value`*   | `end_group`       |
//! | series      | `start_series`          | `write_series_key_value`*, `write_attribute_value`*  | `end_series`      |
//! | observation | `write_observation`     | `write_attribute_value`*, `write_measure_value`*     | `end_observation` |
//!
//! Parent levels are opened before their first child and closed after the
//! last one. The `end_*` hooks default to no-ops for sinks that do not need
//! them.
//!
//! [`RecordingSink`] keeps every call as a [`SinkEvent`]; tests and debugging
//! tools use it to inspect exactly what a conversion emitted.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::model::{ComponentValue, Dataset, Header};

pub trait Sink {
    fn write_header(&mut self, header: &Header) -> Result<()>;

    fn start_dataset(&mut self, dataset: &Dataset) -> Result<()>;

    fn end_dataset(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_group(&mut self, group_id: &str) -> Result<()>;

    fn write_group_key_value(&mut self, id: &str, value: &ComponentValue) -> Result<()>;

    fn end_group(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_series(&mut self) -> Result<()>;

    fn write_series_key_value(&mut self, id: &str, value: &ComponentValue) -> Result<()>;

    fn end_series(&mut self) -> Result<()> {
        Ok(())
    }

    /// Writes an attribute of whichever level is currently open.
    fn write_attribute_value(&mut self, id: &str, value: &ComponentValue) -> Result<()>;

    /// Opens an observation identified by its dimension-at-observation value.
    fn write_observation(&mut self, dimension_id: &str, dimension_value: &str) -> Result<()>;

    fn write_measure_value(&mut self, id: &str, value: &ComponentValue) -> Result<()>;

    fn end_observation(&mut self) -> Result<()> {
        Ok(())
    }

    /// Flushes and releases the output. Called exactly once by the sequencer.
    fn close(&mut self) -> Result<()>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write_header(&mut self, header: &Header) -> Result<()> {
        (**self).write_header(header)
    }
    fn start_dataset(&mut self, dataset: &Dataset) -> Result<()> {
        (**self).start_dataset(dataset)
    }
    fn end_dataset(&mut self) -> Result<()> {
        (**self).end_dataset()
    }
    fn start_group(&mut self, group_id: &str) -> Result<()> {
        (**self).start_group(group_id)
    }
    fn write_group_key_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        (**self).write_group_key_value(id, value)
    }
    fn end_group(&mut self) -> Result<()> {
        (**self).end_group()
    }
    fn start_series(&mut self) -> Result<()> {
        (**self).start_series()
    }
    fn write_series_key_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        (**self).write_series_key_value(id, value)
    }
    fn end_series(&mut self) -> Result<()> {
        (**self).end_series()
    }
    fn write_attribute_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        (**self).write_attribute_value(id, value)
    }
    fn write_observation(&mut self, dimension_id: &str, dimension_value: &str) -> Result<()> {
        (**self).write_observation(dimension_id, dimension_value)
    }
    fn write_measure_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        (**self).write_measure_value(id, value)
    }
    fn end_observation(&mut self) -> Result<()> {
        (**self).end_observation()
    }
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// One call received by a [`RecordingSink`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkEvent {
    Header(String),
    StartDataset {
        structure_id: String,
        dimension_at_observation: String,
    },
    EndDataset,
    StartGroup(String),
    GroupKey(String, ComponentValue),
    EndGroup,
    StartSeries,
    SeriesKey(String, ComponentValue),
    EndSeries,
    Attribute(String, ComponentValue),
    Observation(String, String),
    Measure(String, ComponentValue),
    EndObservation,
    Close,
}

/// An observation reconstructed from recorded events, with the series key it
/// was written under.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordedObservation {
    pub series_key: Vec<(String, ComponentValue)>,
    pub dimension_id: String,
    pub dimension_value: String,
    pub measures: Vec<(String, ComponentValue)>,
    pub attributes: Vec<(String, ComponentValue)>,
}

#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    pub fn count(&self, predicate: impl Fn(&SinkEvent) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }

    pub fn is_closed(&self) -> bool {
        self.events.last() == Some(&SinkEvent::Close)
    }

    /// Rebuilds the observations in emission order.
    pub fn observations(&self) -> Vec<RecordedObservation> {
        let mut out = Vec::new();
        let mut series_key: Vec<(String, ComponentValue)> = Vec::new();
        let mut current: Option<RecordedObservation> = None;
        for event in &self.events {
            match event {
                SinkEvent::StartSeries => series_key.clear(),
                SinkEvent::SeriesKey(id, v) => series_key.push((id.clone(), v.clone())),
                SinkEvent::Observation(id, v) => {
                    current = Some(RecordedObservation {
                        series_key: series_key.clone(),
                        dimension_id: id.clone(),
                        dimension_value: v.clone(),
                        ..Default::default()
                    });
                }
                SinkEvent::Measure(id, v) => {
                    if let Some(obs) = current.as_mut() {
                        obs.measures.push((id.clone(), v.clone()));
                    }
                }
                SinkEvent::Attribute(id, v) => {
                    if let Some(obs) = current.as_mut() {
                        obs.attributes.push((id.clone(), v.clone()));
                    }
                }
                SinkEvent::EndObservation => {
                    if let Some(obs) = current.take() {
                        out.push(obs);
                    }
                }
                _ => {}
            }
        }
        out
    }
}

impl Sink for RecordingSink {
    fn write_header(&mut self, header: &Header) -> Result<()> {
        self.events.push(SinkEvent::Header(header.id.clone()));
        Ok(())
    }

    fn start_dataset(&mut self, dataset: &Dataset) -> Result<()> {
        self.events.push(SinkEvent::StartDataset {
            structure_id: dataset.header.structure_id.clone(),
            dimension_at_observation: dataset.dimension_at_observation.clone(),
        });
        Ok(())
    }

    fn end_dataset(&mut self) -> Result<()> {
        self.events.push(SinkEvent::EndDataset);
        Ok(())
    }

    fn start_group(&mut self, group_id: &str) -> Result<()> {
        self.events.push(SinkEvent::StartGroup(group_id.to_string()));
        Ok(())
    }

    fn write_group_key_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        self.events
            .push(SinkEvent::GroupKey(id.to_string(), value.clone()));
        Ok(())
    }

    fn end_group(&mut self) -> Result<()> {
        self.events.push(SinkEvent::EndGroup);
        Ok(())
    }

    fn start_series(&mut self) -> Result<()> {
        self.events.push(SinkEvent::StartSeries);
        Ok(())
    }

    fn write_series_key_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        self.events
            .push(SinkEvent::SeriesKey(id.to_string(), value.clone()));
        Ok(())
    }

    fn end_series(&mut self) -> Result<()> {
        self.events.push(SinkEvent::EndSeries);
        Ok(())
    }

    fn write_attribute_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        self.events
            .push(SinkEvent::Attribute(id.to_string(), value.clone()));
        Ok(())
    }

    fn write_observation(&mut self, dimension_id: &str, dimension_value: &str) -> Result<()> {
        self.events.push(SinkEvent::Observation(
            dimension_id.to_string(),
            dimension_value.to_string(),
        ));
        Ok(())
    }

    fn write_measure_value(&mut self, id: &str, value: &ComponentValue) -> Result<()> {
        self.events
            .push(SinkEvent::Measure(id.to_string(), value.clone()));
        Ok(())
    }

    fn end_observation(&mut self) -> Result<()> {
        self.events.push(SinkEvent::EndObservation);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.events.push(SinkEvent::Close);
        Ok(())
    }
}
