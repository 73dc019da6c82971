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

//! # Reorder Cache
//!
//! Turns a cross-sectional source, where every measure is its own
//! pseudo-series keyed by a measure-dimension code, into canonical series
//! holding every measure of one time period in a single observation.
//!
//! ## Record layout
//!
//! Every record lives in an [`AddressableStore`] under its own value map:
//!
//! | record      | key fields                                              |
//! |-------------|---------------------------------------------------------|
//! | dataset     | `@kind=dataset`, `@dataset`                             |
//! | group       | `@kind=group`, `@dataset`, `@group`, group dimensions   |
//! | series      | `@kind=series`, `@dataset`, non-measure dimensions      |
//! | observation | series fields with `@kind=obs`, `@obs` = time period    |
//!
//! Links are stored in the record value as the target key with every field
//! prefixed by the link name: a dataset holds `@group/`, `@group-tail/`,
//! `@series/` and `@series-tail/`; a series holds `@obs/` and `@obs-tail/`;
//! every chained record holds `@next/`. Component values are stored under
//! `#a/<id>` (attributes) and `#m/<id>` (measures), encoded as `s:<scalar>` or
//! `c:<json array>`.
//!
//! ## Passes
//!
//! [`ReorderCache::load`] streams the cursor once and appends to the chains.
//! Measures of the same series and time period merge into one observation
//! record. New observation records are spliced into the series chain before
//! the first period that sorts after theirs, so every series is kept in time
//! order regardless of how the measure pseudo-series interleave. [`ReorderCache::write`]
//! walks the chains and drives a [`WriteSequencer`]; it only reads from the
//! store and can be run more than once.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::errors::{CubeError, ErrorHandler, Result};
use crate::model::{
    ComponentValue, DataStructure, Dataset, DatasetHeader, Header, KeyValue, Keyable, Observation, TIME_ALIAS,
};
use crate::reorder::store::{AddressableStore, ScopedStore, ValueMap};
use crate::sequencer::{SequencerState, WriteSequencer};
use crate::sink::Sink;

const KIND: &str = "@kind";
const DATASET: &str = "@dataset";
const GROUP: &str = "@group";
const OBS: &str = "@obs";

const NEXT: &str = "@next/";
const GROUP_HEAD: &str = "@group/";
const GROUP_TAIL: &str = "@group-tail/";
const SERIES_HEAD: &str = "@series/";
const SERIES_TAIL: &str = "@series-tail/";
const OBS_HEAD: &str = "@obs/";
const OBS_TAIL: &str = "@obs-tail/";

const ATTRIBUTE: &str = "#a/";
const MEASURE: &str = "#m/";

/// Encodes a component value for storage, keeping its shape.
pub fn encode_value(value: &ComponentValue) -> Result<String> {
    match value {
        ComponentValue::Scalar(v) => Ok(format!("s:{}", v)),
        ComponentValue::Complex(vs) => Ok(format!("c:{}", serde_json::to_string(vs)?)),
    }
}

/// Inverse of [`encode_value`].
pub fn decode_value(raw: &str) -> Result<ComponentValue> {
    if let Some(v) = raw.strip_prefix("s:") {
        Ok(ComponentValue::Scalar(v.to_string()))
    } else if let Some(json) = raw.strip_prefix("c:") {
        Ok(ComponentValue::Complex(serde_json::from_str(json)?))
    } else {
        Err(CubeError::store(format!("malformed stored value '{}'", raw)))
    }
}

fn link(value: &ValueMap, name: &str) -> Option<ValueMap> {
    let target: ValueMap = value
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(name).map(|field| (field.to_string(), v.clone())))
        .collect();
    if target.is_empty() {
        None
    } else {
        Some(target)
    }
}

fn set_link(value: &mut ValueMap, name: &str, target: &ValueMap) {
    value.retain(|k, _| !k.starts_with(name));
    for (k, v) in target {
        value.insert(format!("{}{}", name, k), v.clone());
    }
}

fn prefixed<'a>(value: &'a ValueMap, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a String)> + 'a {
    value
        .iter()
        .filter_map(move |(k, v)| k.strip_prefix(prefix).map(|id| (id, v)))
}

/// Key values are stored as plain text, so complex ones are refused.
fn key_text(kv: &KeyValue) -> Result<String> {
    kv.value.as_scalar().map(str::to_string).ok_or_else(|| {
        CubeError::data_format(format!("key value of {} must be a single code, found {}", kv.id, kv.value))
    })
}

/// Time period of an observation key. Periods compare as plain strings.
fn period_of(key: &ValueMap) -> &str {
    key.get(OBS).map(String::as_str).unwrap_or_default()
}

/// Component fields of a key, without the bookkeeping fields.
fn key_components(key: &ValueMap) -> impl Iterator<Item = (&String, &String)> {
    key.iter().filter(|(k, _)| !k.starts_with('@'))
}

fn store_values(target: &mut ValueMap, prefix: &str, values: &[KeyValue]) -> Result<()> {
    for kv in values.iter().filter(|kv| !kv.value.is_empty()) {
        target.insert(format!("{}{}", prefix, kv.id), encode_value(&kv.value)?);
    }
    Ok(())
}

/// Record counts of a load pass or a write pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStats {
    pub datasets: usize,
    pub groups: usize,
    pub series: usize,
    pub observations: usize,
    /// Measure values folded into an already existing observation record.
    pub merged_values: usize,
}

/// Per-dataset facts resolved at load time.
#[derive(Clone, Debug)]
struct DatasetPlan {
    header: DatasetHeader,
    structure: Arc<DataStructure>,
    measure_dimension: String,
    time_dimension: String,
    /// Measure-dimension code to measure id.
    measures: BTreeMap<String, String>,
}

/// Two-pass reorderer of cross-sectional datasets over an [`AddressableStore`].
pub struct ReorderCache<'s, S: AddressableStore + ?Sized> {
    store: ScopedStore<'s, S>,
    declared_measures: Vec<String>,
    header: Option<Header>,
    datasets: Vec<DatasetPlan>,
    stats: ChainStats,
}

impl<'s, S: AddressableStore + ?Sized> ReorderCache<'s, S> {
    /// `declared_measures` lists the cross-sectional measure ids to keep; when
    /// empty every measure carrying a measure-dimension code is used.
    pub fn new(store: &'s mut S, namespace: impl Into<String>, declared_measures: Vec<String>) -> Self {
        Self {
            store: ScopedStore::new(store, namespace),
            declared_measures,
            header: None,
            datasets: Vec::new(),
            stats: ChainStats::default(),
        }
    }

    /// Store namespace holding this conversion's records.
    pub fn namespace(&self) -> &str {
        self.store.namespace()
    }

    /// Counts of the load pass.
    pub fn stats(&self) -> ChainStats {
        self.stats
    }

    /// Drops every record of this conversion.
    pub fn release(&mut self) -> Result<()> {
        self.store.release()
    }

    fn plan(&self, header: DatasetHeader, dsd: Arc<DataStructure>) -> Result<DatasetPlan> {
        let measure_dimension = dsd
            .last_measure_dimension()
            .map(|d| d.id.clone())
            .ok_or_else(|| {
                CubeError::configuration(format!(
                    "structure '{}' declares no measure dimension",
                    dsd.id
                ))
            })?;

        let mut measures = BTreeMap::new();
        if self.declared_measures.is_empty() {
            for m in dsd.cross_sectional_measures() {
                if let Some(code) = &m.code {
                    measures.insert(code.clone(), m.id.clone());
                }
            }
        } else {
            for id in &self.declared_measures {
                let code = dsd.measure(id).and_then(|m| m.code.clone()).ok_or_else(|| {
                    CubeError::configuration(format!(
                        "cross-sectional measure '{}' is not declared with a measure code by '{}'",
                        id, dsd.id
                    ))
                })?;
                measures.insert(code, id.clone());
            }
        }
        if measures.is_empty() {
            return Err(CubeError::configuration(format!(
                "structure '{}' declares no cross-sectional measures",
                dsd.id
            )));
        }

        let time_dimension = dsd.time_dimension().map(|d| d.id.clone()).unwrap_or_default();
        Ok(DatasetPlan {
            header,
            structure: dsd,
            measure_dimension,
            time_dimension,
            measures,
        })
    }

    fn dataset_key(index: usize) -> ValueMap {
        let mut key = ValueMap::new();
        key.insert(KIND.to_string(), "dataset".to_string());
        key.insert(DATASET.to_string(), index.to_string());
        key
    }

    fn get_required(&self, key: &ValueMap) -> Result<ValueMap> {
        self.store
            .get(key)?
            .ok_or_else(|| CubeError::store(format!("chain record {:?} is missing", key)))
    }

    /// Appends `key` to the chain whose head and tail links live in `owner`.
    fn append(&mut self, owner: &ValueMap, head: &str, tail: &str, key: &ValueMap, value: ValueMap) -> Result<()> {
        let mut owner_value = self.get_required(owner)?;
        match link(&owner_value, tail) {
            None => set_link(&mut owner_value, head, key),
            Some(tail_key) => {
                let mut tail_value = self.get_required(&tail_key)?;
                set_link(&mut tail_value, NEXT, key);
                self.store.put(&tail_key, tail_value)?;
            }
        }
        set_link(&mut owner_value, tail, key);
        self.store.put(owner, owner_value)?;
        self.store.put(key, value)?;
        log::debug!("chain append under {}: {:?}", head, key);
        Ok(())
    }

    /// Pass 1: reads the whole cursor into the store.
    ///
    /// Configuration errors abort immediately; data format errors go through
    /// `handler` and the offending dataset or observation is skipped.
    pub fn load<C: Cursor + ?Sized>(&mut self, cursor: &mut C, handler: &mut dyn ErrorHandler) -> Result<ChainStats> {
        if self.header.is_some() {
            return Err(CubeError::internal("reorder cache already loaded"));
        }
        cursor.reset()?;
        self.header = Some(cursor.header().clone());

        while cursor.move_next_dataset()? {
            let (header, structure) = match (cursor.dataset_header().cloned(), cursor.structure()) {
                (Some(header), Some(structure)) => (header, structure),
                _ => {
                    handler.handle(CubeError::data_format("dataset has no header or no data structure"))?;
                    continue;
                }
            };
            let plan = self.plan(header, structure)?;
            if plan.time_dimension.is_empty() {
                handler.handle(CubeError::data_format(format!(
                    "structure '{}' has no time dimension to reorder by",
                    plan.structure.id
                )))?;
                continue;
            }

            let index = self.datasets.len();
            let dataset_key = Self::dataset_key(index);
            let mut dataset_value = ValueMap::new();
            store_values(&mut dataset_value, ATTRIBUTE, cursor.dataset_attributes())?;
            self.store.put(&dataset_key, dataset_value)?;
            self.datasets.push(plan);
            self.stats.datasets += 1;

            while cursor.move_next_keyable()? {
                let keyable = match cursor.current_key() {
                    Some(k) => k.clone(),
                    None => continue,
                };
                if keyable.group.is_some() {
                    self.load_group(index, &keyable, handler)?;
                    continue;
                }
                let mut last_series: Option<ValueMap> = None;
                while cursor.move_next_observation()? {
                    let obs = match cursor.current_observation() {
                        Some(obs) => obs.clone(),
                        None => continue,
                    };
                    self.load_observation(index, &keyable, &obs, &mut last_series, handler)?;
                }
            }
        }

        log::info!(
            "reorder pass 1 into {}: datasets={} groups={} series={} observations={} merged={}",
            self.store.namespace(),
            self.stats.datasets,
            self.stats.groups,
            self.stats.series,
            self.stats.observations,
            self.stats.merged_values
        );
        Ok(self.stats)
    }

    fn group_key(index: usize, group_id: &str) -> ValueMap {
        let mut key = ValueMap::new();
        key.insert(KIND.to_string(), "group".to_string());
        key.insert(DATASET.to_string(), index.to_string());
        key.insert(GROUP.to_string(), group_id.to_string());
        key
    }

    fn load_group(&mut self, index: usize, keyable: &Keyable, handler: &mut dyn ErrorHandler) -> Result<()> {
        let group_id = keyable.group.as_deref().unwrap_or_default();
        let dsd = Arc::clone(&self.datasets[index].structure);
        let mut key = Self::group_key(index, group_id);
        for kv in &keyable.key {
            let in_group = dsd
                .group(group_id)
                .map_or(true, |def| def.dimensions.contains(&kv.id));
            if in_group {
                match key_text(kv) {
                    Ok(text) => key.insert(kv.id.clone(), text),
                    Err(err) => return handler.handle(err),
                };
            }
        }
        match self.store.get(&key)? {
            Some(mut existing) => {
                store_values(&mut existing, ATTRIBUTE, &keyable.attributes)?;
                self.store.put(&key, existing)
            }
            None => {
                let mut value = ValueMap::new();
                store_values(&mut value, ATTRIBUTE, &keyable.attributes)?;
                self.append(&Self::dataset_key(index), GROUP_HEAD, GROUP_TAIL, &key, value)?;
                self.stats.groups += 1;
                Ok(())
            }
        }
    }

    fn load_observation(
        &mut self,
        index: usize,
        keyable: &Keyable,
        obs: &Observation,
        last_series: &mut Option<ValueMap>,
        handler: &mut dyn ErrorHandler,
    ) -> Result<()> {
        let plan = &self.datasets[index];
        let mut coordinates: BTreeMap<String, String> = BTreeMap::new();
        for kv in &keyable.key {
            match key_text(kv) {
                Ok(text) => coordinates.insert(kv.id.clone(), text),
                Err(err) => return handler.handle(err),
            };
        }
        if !obs.dimension_id.is_empty() {
            let dim = plan
                .structure
                .canonical_dimension_id(&obs.dimension_id)
                .unwrap_or(obs.dimension_id.as_str())
                .to_string();
            coordinates.insert(dim, obs.dimension_value.clone());
        }
        if plan.structure.dimension(TIME_ALIAS).is_none() {
            if let Some(alias) = coordinates.remove(TIME_ALIAS) {
                coordinates.entry(plan.time_dimension.clone()).or_insert(alias);
            }
        }

        let code = coordinates.remove(&plan.measure_dimension).unwrap_or_default();
        let measure_id = match plan.measures.get(&code) {
            Some(id) if !code.is_empty() => id.clone(),
            _ => {
                return handler.handle(CubeError::data_format(format!(
                    "measure code '{}' of {} does not map to a cross-sectional measure",
                    code, plan.measure_dimension
                )));
            }
        };
        let time = coordinates.remove(&plan.time_dimension).unwrap_or_default();
        if time.is_empty() {
            return handler.handle(CubeError::data_format(format!(
                "observation without a value for {}",
                plan.time_dimension
            )));
        }

        let mut series_key = ValueMap::new();
        series_key.insert(KIND.to_string(), "series".to_string());
        series_key.insert(DATASET.to_string(), index.to_string());
        series_key.extend(coordinates);

        if last_series.as_ref() != Some(&series_key) {
            self.upsert_series(index, &series_key, &keyable.attributes)?;
            *last_series = Some(series_key.clone());
        }

        let mut obs_key = series_key.clone();
        obs_key.insert(KIND.to_string(), "obs".to_string());
        obs_key.insert(OBS.to_string(), time);

        let measure_value = obs.measures.iter().find(|m| !m.value.is_empty());
        match self.store.get(&obs_key)? {
            Some(mut existing) => {
                if let Some(m) = measure_value {
                    existing.insert(format!("{}{}", MEASURE, measure_id), encode_value(&m.value)?);
                    self.stats.merged_values += 1;
                }
                store_values(&mut existing, ATTRIBUTE, &obs.attributes)?;
                self.store.put(&obs_key, existing)?;
            }
            None => {
                let mut value = ValueMap::new();
                if let Some(m) = measure_value {
                    value.insert(format!("{}{}", MEASURE, measure_id), encode_value(&m.value)?);
                }
                store_values(&mut value, ATTRIBUTE, &obs.attributes)?;
                self.insert_observation(&series_key, &obs_key, value)?;
                self.stats.observations += 1;
            }
        }
        Ok(())
    }

    /// Links a new observation record into the series chain in period order.
    fn insert_observation(&mut self, series_key: &ValueMap, key: &ValueMap, mut value: ValueMap) -> Result<()> {
        let period = period_of(key);
        let mut series_value = self.get_required(series_key)?;
        match link(&series_value, OBS_TAIL) {
            Some(tail) if period_of(&tail) > period => {}
            _ => return self.append(series_key, OBS_HEAD, OBS_TAIL, key, value),
        }

        let mut previous: Option<ValueMap> = None;
        let mut cursor = link(&series_value, OBS_HEAD);
        while let Some(current) = cursor.take() {
            if period_of(&current) > period {
                cursor = Some(current);
                break;
            }
            let current_value = self.get_required(&current)?;
            cursor = link(&current_value, NEXT);
            previous = Some(current);
        }
        let next = cursor.ok_or_else(|| CubeError::store("observation chain ends before its tail"))?;
        set_link(&mut value, NEXT, &next);

        match previous {
            None => {
                set_link(&mut series_value, OBS_HEAD, key);
                self.store.put(series_key, series_value)?;
            }
            Some(previous) => {
                let mut previous_value = self.get_required(&previous)?;
                set_link(&mut previous_value, NEXT, key);
                self.store.put(&previous, previous_value)?;
            }
        }
        self.store.put(key, value)?;
        log::debug!("chain insert at period {}: {:?}", period, key);
        Ok(())
    }

    fn upsert_series(&mut self, index: usize, key: &ValueMap, attributes: &[KeyValue]) -> Result<()> {
        match self.store.get(key)? {
            Some(mut existing) => {
                store_values(&mut existing, ATTRIBUTE, attributes)?;
                self.store.put(key, existing)
            }
            None => {
                let mut value = ValueMap::new();
                store_values(&mut value, ATTRIBUTE, attributes)?;
                self.append(&Self::dataset_key(index), SERIES_HEAD, SERIES_TAIL, key, value)?;
                self.stats.series += 1;
                Ok(())
            }
        }
    }

    /// Every record key in walk order: per dataset, the dataset record, its
    /// groups, then each series followed by its observations.
    pub fn chain(&self) -> Result<Vec<ValueMap>> {
        let mut out = Vec::new();
        for index in 0..self.datasets.len() {
            let dataset_key = Self::dataset_key(index);
            let dataset = self.get_required(&dataset_key)?;
            out.push(dataset_key);

            let mut cursor = link(&dataset, GROUP_HEAD);
            while let Some(key) = cursor {
                let value = self.get_required(&key)?;
                cursor = link(&value, NEXT);
                out.push(key);
            }

            let mut series = link(&dataset, SERIES_HEAD);
            while let Some(series_key) = series {
                let series_value = self.get_required(&series_key)?;
                series = link(&series_value, NEXT);
                out.push(series_key);

                let mut obs = link(&series_value, OBS_HEAD);
                while let Some(obs_key) = obs {
                    let obs_value = self.get_required(&obs_key)?;
                    obs = link(&obs_value, NEXT);
                    out.push(obs_key);
                }
            }
        }
        Ok(out)
    }

    /// Pass 2: walks the chains and writes canonical series into `seq`.
    pub fn write<K: Sink + ?Sized>(&self, seq: &mut WriteSequencer<'_, K>) -> Result<ChainStats> {
        let header = self
            .header
            .as_ref()
            .ok_or_else(|| CubeError::internal("reorder cache written before it was loaded"))?;
        if seq.state() == SequencerState::Created {
            seq.write_header(header)?;
        }

        let mut emitted = ChainStats::default();
        for (index, plan) in self.datasets.iter().enumerate() {
            let mut output_header = plan.header.clone();
            output_header.dimension_at_observation = Some(plan.time_dimension.clone());
            output_header.cross_sectional = false;
            seq.start_dataset(Dataset {
                header: output_header,
                structure: Arc::clone(&plan.structure),
                dimension_at_observation: plan.time_dimension.clone(),
            })?;
            emitted.datasets += 1;

            let dataset = self.get_required(&Self::dataset_key(index))?;
            for (id, raw) in prefixed(&dataset, ATTRIBUTE) {
                seq.write_dataset_attribute(id, decode_value(raw)?)?;
            }

            let mut written_groups: HashSet<ValueMap> = HashSet::new();
            let mut series = link(&dataset, SERIES_HEAD);
            while let Some(series_key) = series {
                let series_value = self.get_required(&series_key)?;
                self.write_referenced_groups(seq, index, plan, &series_key, &mut written_groups, &mut emitted)?;
                self.write_series(seq, plan, &series_key, &series_value, &mut emitted)?;
                series = link(&series_value, NEXT);
            }

            let mut group = link(&dataset, GROUP_HEAD);
            while let Some(group_key) = group {
                let group_value = self.get_required(&group_key)?;
                if !written_groups.contains(&group_key) {
                    Self::write_group(seq, &group_key, &group_value)?;
                    emitted.groups += 1;
                }
                group = link(&group_value, NEXT);
            }
        }

        log::info!(
            "reorder pass 2 from {}: datasets={} groups={} series={} observations={}",
            self.store.namespace(),
            emitted.datasets,
            emitted.groups,
            emitted.series,
            emitted.observations
        );
        Ok(emitted)
    }

    fn write_referenced_groups<K: Sink + ?Sized>(
        &self,
        seq: &mut WriteSequencer<'_, K>,
        index: usize,
        plan: &DatasetPlan,
        series_key: &ValueMap,
        written: &mut HashSet<ValueMap>,
        emitted: &mut ChainStats,
    ) -> Result<()> {
        for def in &plan.structure.groups {
            let mut key = Self::group_key(index, &def.id);
            let complete = def.dimensions.iter().all(|dim| match series_key.get(dim) {
                Some(v) => {
                    key.insert(dim.clone(), v.clone());
                    true
                }
                None => false,
            });
            if !complete || written.contains(&key) {
                continue;
            }
            if let Some(value) = self.store.get(&key)? {
                Self::write_group(seq, &key, &value)?;
                emitted.groups += 1;
                written.insert(key);
            }
        }
        Ok(())
    }

    fn write_group<K: Sink + ?Sized>(seq: &mut WriteSequencer<'_, K>, key: &ValueMap, value: &ValueMap) -> Result<()> {
        let group_id = key.get(GROUP).map(String::as_str).unwrap_or_default();
        seq.start_group(group_id)?;
        for (id, v) in key_components(key) {
            seq.write_group_key_value(id, v.as_str())?;
        }
        for (id, raw) in prefixed(value, ATTRIBUTE) {
            seq.write_group_attribute(id, decode_value(raw)?)?;
        }
        Ok(())
    }

    fn write_series<K: Sink + ?Sized>(
        &self,
        seq: &mut WriteSequencer<'_, K>,
        plan: &DatasetPlan,
        key: &ValueMap,
        value: &ValueMap,
        emitted: &mut ChainStats,
    ) -> Result<()> {
        seq.start_series()?;
        for (id, v) in key_components(key) {
            seq.write_series_key_value(id, v.as_str())?;
        }
        for (id, raw) in prefixed(value, ATTRIBUTE) {
            seq.write_series_attribute(id, decode_value(raw)?)?;
        }
        emitted.series += 1;

        let mut obs = link(value, OBS_HEAD);
        while let Some(obs_key) = obs {
            let obs_value = self.get_required(&obs_key)?;
            let time = obs_key.get(OBS).map(String::as_str).unwrap_or_default();
            seq.start_observation(&plan.time_dimension, time)?;
            for (id, raw) in prefixed(&obs_value, ATTRIBUTE) {
                seq.write_observation_attribute(id, decode_value(raw)?)?;
            }
            for measure in &plan.structure.measures {
                if let Some(raw) = obs_value.get(&format!("{}{}", MEASURE, measure.id)) {
                    seq.write_observation_value(&measure.id, decode_value(raw)?)?;
                }
            }
            emitted.observations += 1;
            obs = link(&obs_value, NEXT);
        }
        Ok(())
    }
}
