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

//! # Cursor Module
//!
//! A [`Cursor`] is the read side of one concrete wire format. It advances
//! through datasets, keyables (series and group keys) and observations, and
//! exposes the item it currently points at. Two-pass consumers (the reorder
//! cache, the length probe) call [`Cursor::reset`] and replay the source.
//!
//! [`MemoryCursor`] replays datasets held in memory. It backs the test
//! fixtures and any producer that already has the cube materialised.

use std::sync::Arc;

use crate::errors::{CubeError, Result};
use crate::model::{DataStructure, DatasetHeader, Header, KeyValue, Keyable, Observation};

pub trait Cursor {
    /// Rewinds to before the first dataset.
    fn reset(&mut self) -> Result<()>;

    fn move_next_dataset(&mut self) -> Result<bool>;

    /// Advances to the next series or group key of the current dataset.
    fn move_next_keyable(&mut self) -> Result<bool>;

    /// Advances to the next observation of the current series.
    fn move_next_observation(&mut self) -> Result<bool>;

    fn header(&self) -> &Header;

    fn dataset_header(&self) -> Option<&DatasetHeader>;

    fn structure(&self) -> Option<Arc<DataStructure>>;

    fn current_key(&self) -> Option<&Keyable>;

    fn current_observation(&self) -> Option<&Observation>;

    fn dataset_attributes(&self) -> &[KeyValue];

    /// Releases the underlying source. Safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }
    fn move_next_dataset(&mut self) -> Result<bool> {
        (**self).move_next_dataset()
    }
    fn move_next_keyable(&mut self) -> Result<bool> {
        (**self).move_next_keyable()
    }
    fn move_next_observation(&mut self) -> Result<bool> {
        (**self).move_next_observation()
    }
    fn header(&self) -> &Header {
        (**self).header()
    }
    fn dataset_header(&self) -> Option<&DatasetHeader> {
        (**self).dataset_header()
    }
    fn structure(&self) -> Option<Arc<DataStructure>> {
        (**self).structure()
    }
    fn current_key(&self) -> Option<&Keyable> {
        (**self).current_key()
    }
    fn current_observation(&self) -> Option<&Observation> {
        (**self).current_observation()
    }
    fn dataset_attributes(&self) -> &[KeyValue] {
        (**self).dataset_attributes()
    }
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// A keyable and, for series, its observations.
#[derive(Clone, Debug, Default)]
pub struct MemoryKeyable {
    pub keyable: Keyable,
    pub observations: Vec<Observation>,
}

#[derive(Clone, Debug)]
pub struct MemoryDataset {
    pub header: DatasetHeader,
    pub structure: Arc<DataStructure>,
    pub attributes: Vec<KeyValue>,
    pub keyables: Vec<MemoryKeyable>,
}

impl MemoryDataset {
    pub fn new(header: DatasetHeader, structure: Arc<DataStructure>) -> Self {
        Self {
            header,
            structure,
            attributes: Vec::new(),
            keyables: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, id: &str, value: &str) -> Self {
        self.attributes.push(KeyValue::new(id, value));
        self
    }

    pub fn with_series(mut self, keyable: Keyable, observations: Vec<Observation>) -> Self {
        self.keyables.push(MemoryKeyable {
            keyable,
            observations,
        });
        self
    }

    pub fn with_group(mut self, keyable: Keyable) -> Self {
        self.keyables.push(MemoryKeyable {
            keyable,
            observations: Vec::new(),
        });
        self
    }
}

/// Replays in-memory datasets through the [`Cursor`] interface.
#[derive(Clone, Debug)]
pub struct MemoryCursor {
    header: Header,
    datasets: Vec<MemoryDataset>,
    dataset_pos: Option<usize>,
    keyable_pos: Option<usize>,
    observation_pos: Option<usize>,
    closed: bool,
    resets: usize,
}

impl MemoryCursor {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            datasets: Vec::new(),
            dataset_pos: None,
            keyable_pos: None,
            observation_pos: None,
            closed: false,
            resets: 0,
        }
    }

    pub fn with_dataset(mut self, dataset: MemoryDataset) -> Self {
        self.datasets.push(dataset);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of times the cursor was rewound.
    pub fn resets(&self) -> usize {
        self.resets
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(CubeError::internal("cursor already closed"));
        }
        Ok(())
    }

    fn dataset(&self) -> Option<&MemoryDataset> {
        self.dataset_pos.and_then(|i| self.datasets.get(i))
    }

    fn keyable(&self) -> Option<&MemoryKeyable> {
        let dataset = self.dataset()?;
        self.keyable_pos.and_then(|i| dataset.keyables.get(i))
    }
}

impl Cursor for MemoryCursor {
    fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.dataset_pos = None;
        self.keyable_pos = None;
        self.observation_pos = None;
        self.resets += 1;
        Ok(())
    }

    fn move_next_dataset(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let next = self.dataset_pos.map_or(0, |i| i + 1);
        self.keyable_pos = None;
        self.observation_pos = None;
        if next < self.datasets.len() {
            self.dataset_pos = Some(next);
            Ok(true)
        } else {
            self.dataset_pos = Some(self.datasets.len());
            Ok(false)
        }
    }

    fn move_next_keyable(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let count = match self.dataset() {
            Some(dataset) => dataset.keyables.len(),
            None => return Ok(false),
        };
        let next = self.keyable_pos.map_or(0, |i| i + 1);
        self.observation_pos = None;
        if next < count {
            self.keyable_pos = Some(next);
            Ok(true)
        } else {
            self.keyable_pos = Some(count);
            Ok(false)
        }
    }

    fn move_next_observation(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let count = match self.keyable() {
            Some(k) if k.keyable.is_series() => k.observations.len(),
            _ => return Ok(false),
        };
        let next = self.observation_pos.map_or(0, |i| i + 1);
        if next < count {
            self.observation_pos = Some(next);
            Ok(true)
        } else {
            self.observation_pos = Some(count);
            Ok(false)
        }
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn dataset_header(&self) -> Option<&DatasetHeader> {
        self.dataset().map(|d| &d.header)
    }

    fn structure(&self) -> Option<Arc<DataStructure>> {
        self.dataset().map(|d| Arc::clone(&d.structure))
    }

    fn current_key(&self) -> Option<&Keyable> {
        self.keyable().map(|k| &k.keyable)
    }

    fn current_observation(&self) -> Option<&Observation> {
        let keyable = self.keyable()?;
        self.observation_pos.and_then(|i| keyable.observations.get(i))
    }

    fn dataset_attributes(&self) -> &[KeyValue] {
        self.dataset().map(|d| d.attributes.as_slice()).unwrap_or(&[])
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
