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

//! # Copy Engine
//!
//! Drives one [`Cursor`] into one [`WriteSequencer`], dataset by dataset.
//!
//! ## Dimension at observation
//!
//! The dimension written per observation is resolved once per dataset, in
//! this order:
//!
//! 1. the explicit override carried by the dataset header, unless it is the
//!    `AllDimensions` sentinel (the legacy `TIME` alias maps to the declared
//!    time dimension);
//! 2. the declared time dimension, if the dataset is a time series;
//! 3. the last declared measure dimension;
//! 4. the last ordinary dimension in declaration order.
//!
//! An override naming an undeclared dimension is reported to the error handler
//! and resolution continues with step 2.
//!
//! ## Series shapes
//!
//! - **time series**: the key omits the time dimension and each observation
//!   carries its time value under the canonical time dimension id;
//! - **cross-sectional**: the key omits the dimension at observation, which is
//!   only supplied per observation;
//! - **flat**: the source key carries every dimension. The series key is
//!   written without the per-observation dimension (step 4's dimension when
//!   the sentinel was declared) and an empty or missing value for any other
//!   dimension is a data format error.
//!
//! Group keys are cached when read and written once per dataset, right before
//! the first series whose key matches them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::errors::{CubeError, ErrorHandler, Result};
use crate::model::{ComponentValue, DataStructure, Dataset, DatasetHeader, Keyable, ALL_DIMENSIONS};
use crate::sequencer::{SequencerState, WriteSequencer};
use crate::sink::Sink;

/// Which rule produced the dimension at observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionSource {
    /// Declared by the dataset header.
    Explicit,
    /// The time dimension of a time-series dataset.
    TimeDimension,
    /// The last measure dimension of a cross-sectional dataset.
    MeasureDimension,
    /// The last ordinary dimension as a final fallback.
    LastDimension,
}

/// Dimension at observation of one dataset and how it was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedDimension {
    /// Canonical dimension id.
    pub id: String,
    /// Rule that selected `id`.
    pub source: DimensionSource,
    /// `id` is the time dimension of the structure.
    pub is_time: bool,
    /// The header declared the `AllDimensions` sentinel.
    pub all_dimensions: bool,
    /// Last ordinary dimension, written per observation by flat series when
    /// the sentinel was declared.
    pub flat_dimension: Option<String>,
}

impl ResolvedDimension {
    /// Dimension a flat series writes per observation.
    pub fn observation_dimension(&self) -> &str {
        match (&self.flat_dimension, self.all_dimensions && !self.is_time) {
            (Some(flat), true) => flat.as_str(),
            _ => self.id.as_str(),
        }
    }
}

/// Resolves the dimension at observation of one dataset.
///
/// Returns `Ok(None)` when no rule applies and the handler chose to continue.
pub fn resolve_dimension_at_observation(
    header: &DatasetHeader,
    dsd: &DataStructure,
    handler: &mut dyn ErrorHandler,
) -> Result<Option<ResolvedDimension>> {
    let declared = header
        .dimension_at_observation
        .as_deref()
        .filter(|id| !id.is_empty());
    let all_dimensions = declared == Some(ALL_DIMENSIONS);
    let time_id = dsd.time_dimension().map(|d| d.id.clone());
    let flat_dimension = if all_dimensions {
        dsd.last_ordinary_dimension().map(|d| d.id.clone())
    } else {
        None
    };
    let resolved = |id: &str, source: DimensionSource| ResolvedDimension {
        id: id.to_string(),
        source,
        is_time: time_id.as_deref() == Some(id),
        all_dimensions,
        flat_dimension: flat_dimension.clone(),
    };

    if let Some(id) = declared.filter(|_| !all_dimensions) {
        match dsd.canonical_dimension_id(id) {
            Some(canonical) => return Ok(Some(resolved(canonical, DimensionSource::Explicit))),
            None => handler.handle(CubeError::data_format(format!(
                "dimension at observation '{}' is not declared by structure '{}'",
                id, dsd.id
            )))?,
        }
    }

    if !header.cross_sectional {
        if let Some(time) = dsd.time_dimension() {
            return Ok(Some(resolved(&time.id, DimensionSource::TimeDimension)));
        }
    }
    if let Some(measure) = dsd.last_measure_dimension() {
        return Ok(Some(resolved(&measure.id, DimensionSource::MeasureDimension)));
    }
    if let Some(last) = dsd.last_ordinary_dimension() {
        return Ok(Some(resolved(&last.id, DimensionSource::LastDimension)));
    }

    handler.handle(CubeError::data_format(format!(
        "unable to resolve a dimension at observation for structure '{}'",
        dsd.id
    )))?;
    Ok(None)
}

/// Layout a series is copied in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesShape {
    /// One observation per time period.
    TimeSeries,
    /// One observation per value of a non-time dimension.
    CrossSectional,
    /// The observation dimension is already part of the series key.
    Flat,
}

/// Picks the layout of a series from the resolved dimension and its key.
pub fn classify_series(dao: &ResolvedDimension, key: &Keyable) -> SeriesShape {
    if dao.is_time {
        SeriesShape::TimeSeries
    } else if key.value(dao.observation_dimension()).is_some() {
        SeriesShape::Flat
    } else {
        SeriesShape::CrossSectional
    }
}

type GroupKey = (String, BTreeMap<String, ComponentValue>);

/// Group keys seen in the current dataset, and which ones were written.
#[derive(Debug, Default)]
struct GroupCache {
    entries: Vec<(GroupKey, Keyable)>,
    index: HashMap<GroupKey, usize>,
    written: HashSet<GroupKey>,
}

impl GroupCache {
    fn key_of(dsd: &DataStructure, group_id: &str, keyable: &Keyable) -> GroupKey {
        let values = match dsd.group(group_id) {
            Some(def) => keyable
                .key
                .iter()
                .filter(|kv| def.dimensions.contains(&kv.id))
                .map(|kv| (kv.id.clone(), kv.value.clone()))
                .collect(),
            None => keyable
                .key
                .iter()
                .map(|kv| (kv.id.clone(), kv.value.clone()))
                .collect(),
        };
        (group_id.to_string(), values)
    }

    fn insert(&mut self, dsd: &DataStructure, group_id: &str, keyable: Keyable) {
        let key = Self::key_of(dsd, group_id, &keyable);
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = keyable,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, keyable));
            }
        }
    }

    /// Unwritten groups whose key the series belongs to; marks them written.
    fn referenced_by(&mut self, dsd: &DataStructure, series: &Keyable) -> Vec<Keyable> {
        let mut out = Vec::new();
        for def in &dsd.groups {
            let mut values = BTreeMap::new();
            let complete = def.dimensions.iter().all(|dim| match series.value(dim) {
                Some(v) => {
                    values.insert(dim.clone(), v.clone());
                    true
                }
                None => false,
            });
            if !complete {
                continue;
            }
            let key = (def.id.clone(), values);
            if self.written.contains(&key) {
                continue;
            }
            if let Some(&pos) = self.index.get(&key) {
                out.push(self.entries[pos].1.clone());
                self.written.insert(key);
            }
        }
        out
    }

    fn take_unwritten(&mut self) -> Vec<Keyable> {
        let entries = std::mem::take(&mut self.entries);
        self.index.clear();
        entries
            .into_iter()
            .filter(|(key, _)| !self.written.contains(key))
            .map(|(_, keyable)| keyable)
            .collect()
    }
}

/// Counts of what a [`CopyEngine`] read and copied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyStats {
    pub datasets: usize,
    pub skipped_datasets: usize,
    pub groups: usize,
    pub series: usize,
    pub observations: usize,
}

/// Copies every dataset of a cursor into a write sequencer.
pub struct CopyEngine<'h> {
    handler: &'h mut dyn ErrorHandler,
    stats: CopyStats,
}

impl<'h> CopyEngine<'h> {
    /// Creates an engine that reports data format errors to `handler`.
    pub fn new(handler: &'h mut dyn ErrorHandler) -> Self {
        Self {
            handler,
            stats: CopyStats::default(),
        }
    }

    /// Totals of every dataset copied so far.
    pub fn stats(&self) -> CopyStats {
        self.stats
    }

    /// Writes the header (once) and every remaining dataset of the cursor.
    pub fn copy<C, S>(&mut self, cursor: &mut C, seq: &mut WriteSequencer<'_, S>) -> Result<CopyStats>
    where
        C: Cursor + ?Sized,
        S: Sink + ?Sized,
    {
        if seq.state() == SequencerState::Created {
            seq.write_header(cursor.header())?;
        }
        while cursor.move_next_dataset()? {
            self.copy_dataset(cursor, seq)?;
        }
        log::info!(
            "copy finished: datasets={} skipped={} groups={} series={} observations={}",
            self.stats.datasets,
            self.stats.skipped_datasets,
            self.stats.groups,
            self.stats.series,
            self.stats.observations
        );
        Ok(self.stats)
    }

    /// Copies the dataset the cursor currently points at. Returns false when
    /// the dataset was skipped after a reported data format error.
    pub fn copy_dataset<C, S>(&mut self, cursor: &mut C, seq: &mut WriteSequencer<'_, S>) -> Result<bool>
    where
        C: Cursor + ?Sized,
        S: Sink + ?Sized,
    {
        let (header, structure) = match (cursor.dataset_header().cloned(), cursor.structure()) {
            (Some(header), Some(structure)) => (header, structure),
            _ => {
                self.handler.handle(CubeError::data_format(
                    "dataset has no header or no data structure",
                ))?;
                self.stats.skipped_datasets += 1;
                return Ok(false);
            }
        };
        let dao = match resolve_dimension_at_observation(&header, &structure, &mut *self.handler)? {
            Some(dao) => dao,
            None => {
                self.stats.skipped_datasets += 1;
                return Ok(false);
            }
        };
        log::debug!(
            "dataset {}: dimension at observation {} ({:?})",
            header.structure_id,
            dao.id,
            dao.source
        );

        seq.start_dataset(Dataset {
            header,
            structure: Arc::clone(&structure),
            dimension_at_observation: dao.id.clone(),
        })?;
        for kv in cursor.dataset_attributes() {
            seq.write_dataset_attribute(&kv.id, kv.value.clone())?;
        }

        let mut groups = GroupCache::default();
        while cursor.move_next_keyable()? {
            let keyable = match cursor.current_key() {
                Some(k) => k.clone(),
                None => continue,
            };
            if let Some(group_id) = keyable.group.clone() {
                groups.insert(&structure, &group_id, keyable);
                continue;
            }
            for group in groups.referenced_by(&structure, &keyable) {
                self.write_group(seq, &group)?;
            }
            let shape = classify_series(&dao, &keyable);
            self.write_series(cursor, seq, &structure, &dao, shape, &keyable)?;
        }
        for group in groups.take_unwritten() {
            self.write_group(seq, &group)?;
        }
        self.stats.datasets += 1;
        Ok(true)
    }

    fn write_group<S: Sink + ?Sized>(&mut self, seq: &mut WriteSequencer<'_, S>, group: &Keyable) -> Result<()> {
        let group_id = group.group.as_deref().unwrap_or_default();
        seq.start_group(group_id)?;
        for kv in &group.key {
            seq.write_group_key_value(&kv.id, kv.value.clone())?;
        }
        for kv in &group.attributes {
            seq.write_group_attribute(&kv.id, kv.value.clone())?;
        }
        self.stats.groups += 1;
        Ok(())
    }

    fn write_series<C, S>(
        &mut self,
        cursor: &mut C,
        seq: &mut WriteSequencer<'_, S>,
        dsd: &DataStructure,
        dao: &ResolvedDimension,
        shape: SeriesShape,
        key: &Keyable,
    ) -> Result<()>
    where
        C: Cursor + ?Sized,
        S: Sink + ?Sized,
    {
        seq.start_series()?;
        let obs_dimension = dao.observation_dimension();
        match shape {
            SeriesShape::TimeSeries | SeriesShape::CrossSectional => {
                for kv in &key.key {
                    let canonical = dsd.canonical_dimension_id(&kv.id).unwrap_or(kv.id.as_str());
                    if canonical == dao.id {
                        continue;
                    }
                    seq.write_series_key_value(&kv.id, kv.value.clone())?;
                }
            }
            SeriesShape::Flat => {
                for dim in &dsd.dimensions {
                    if dim.id == obs_dimension {
                        continue;
                    }
                    match key.value(&dim.id) {
                        Some(v) if !v.is_empty() => seq.write_series_key_value(&dim.id, v.clone())?,
                        Some(_) => self.handler.handle(CubeError::data_format(format!(
                            "empty value for series key component '{}'",
                            dim.id
                        )))?,
                        None => self.handler.handle(CubeError::data_format(format!(
                            "missing value for series key component '{}'",
                            dim.id
                        )))?,
                    }
                }
                for kv in key.key.iter().filter(|kv| dsd.dimension(&kv.id).is_none()) {
                    seq.write_series_key_value(&kv.id, kv.value.clone())?;
                }
            }
        }
        for kv in &key.attributes {
            seq.write_series_attribute(&kv.id, kv.value.clone())?;
        }
        self.stats.series += 1;

        while cursor.move_next_observation()? {
            let obs = match cursor.current_observation() {
                Some(obs) => obs,
                None => continue,
            };
            let (dimension_id, dimension_value) = match shape {
                SeriesShape::TimeSeries | SeriesShape::CrossSectional => {
                    (dao.id.as_str(), obs.dimension_value.clone())
                }
                SeriesShape::Flat => {
                    let value = if obs.dimension_value.is_empty() {
                        key.value(obs_dimension)
                            .and_then(|v| v.as_scalar())
                            .unwrap_or_default()
                            .to_string()
                    } else {
                        obs.dimension_value.clone()
                    };
                    (obs_dimension, value)
                }
            };
            seq.start_observation(dimension_id, &dimension_value)?;
            for kv in &obs.attributes {
                seq.write_observation_attribute(&kv.id, kv.value.clone())?;
            }
            for kv in &obs.measures {
                seq.write_observation_value(&kv.id, kv.value.clone())?;
            }
            self.stats.observations += 1;
        }
        Ok(())
    }
}
