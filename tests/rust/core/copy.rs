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

use std::sync::Arc;

use zicube::cursor::{MemoryCursor, MemoryDataset};
use zicube::model::{
    AttachmentLevel, Attribute, ComponentValue, DataStructure, DatasetHeader, DimensionRole, Header, Keyable,
    Observation, ALL_DIMENSIONS,
};
use zicube::{CollectErrors, CopyEngine, FailFast, RecordingSink, SinkEvent, WriteSequencer};

fn structure() -> Arc<DataStructure> {
    Arc::new(
        DataStructure::new("EXR")
            .with_dimension("FREQ", DimensionRole::Ordinary)
            .with_dimension("COUNTRY", DimensionRole::Ordinary)
            .with_dimension("TIME_PERIOD", DimensionRole::Time)
            .with_attribute(Attribute::new("TITLE", AttachmentLevel::Group).for_group("SIBLING"))
            .with_measure("OBS_VALUE", None)
            .with_group("SIBLING", ["FREQ"]),
    )
}

fn run(cursor: &mut MemoryCursor, handler: &mut dyn zicube::ErrorHandler) -> RecordingSink {
    let mut sink = RecordingSink::new();
    let mut seq = WriteSequencer::new(&mut sink);
    CopyEngine::new(handler).copy(cursor, &mut seq).unwrap();
    seq.close().unwrap();
    drop(seq);
    sink
}

fn pair(id: &str, value: &str) -> (String, ComponentValue) {
    (id.to_string(), value.into())
}

#[test]
fn time_series_round_trip() {
    let mut cursor = MemoryCursor::new(Header::new("MSG")).with_dataset(
        MemoryDataset::new(DatasetHeader::new("EXR").with_dimension_at_observation("TIME"), structure())
            .with_series(
                Keyable::series([("FREQ", "A"), ("COUNTRY", "FR")]),
                vec![
                    Observation::new("TIME", "2020").with_measure("OBS_VALUE", "1"),
                    Observation::new("TIME", "2021").with_measure("OBS_VALUE", "2"),
                ],
            ),
    );
    let sink = run(&mut cursor, &mut FailFast);

    assert_eq!(
        sink.events()[1],
        SinkEvent::StartDataset {
            structure_id: "EXR".to_string(),
            dimension_at_observation: "TIME_PERIOD".to_string(),
        }
    );
    let obs = sink.observations();
    assert_eq!(obs.len(), 2);
    for (o, (period, value)) in obs.iter().zip([("2020", "1"), ("2021", "2")]) {
        assert_eq!(o.series_key, vec![pair("FREQ", "A"), pair("COUNTRY", "FR")]);
        assert_eq!(o.dimension_id, "TIME_PERIOD");
        assert_eq!(o.dimension_value, period);
        assert_eq!(o.measures, vec![pair("OBS_VALUE", value)]);
    }
}

#[test]
fn groups_precede_their_first_series_and_leftovers_close_the_dataset() {
    let mut cursor = MemoryCursor::new(Header::new("MSG")).with_dataset(
        MemoryDataset::new(DatasetHeader::new("EXR"), structure())
            .with_group(Keyable::group("SIBLING", [("FREQ", "A")]).with_attribute("TITLE", "Annual"))
            .with_group(Keyable::group("SIBLING", [("FREQ", "M")]).with_attribute("TITLE", "Monthly"))
            .with_series(
                Keyable::series([("FREQ", "A"), ("COUNTRY", "FR")]),
                vec![Observation::new("TIME_PERIOD", "2020").with_measure("OBS_VALUE", "1")],
            )
            .with_series(
                Keyable::series([("FREQ", "A"), ("COUNTRY", "DE")]),
                vec![Observation::new("TIME_PERIOD", "2020").with_measure("OBS_VALUE", "2")],
            ),
    );
    let sink = run(&mut cursor, &mut FailFast);
    let events = sink.events();

    let position = |event: &SinkEvent| events.iter().position(|e| e == event).unwrap();
    let annual = position(&SinkEvent::Attribute("TITLE".to_string(), "Annual".into()));
    let monthly = position(&SinkEvent::Attribute("TITLE".to_string(), "Monthly".into()));
    let first_series = position(&SinkEvent::StartSeries);
    let last_series_end = events.iter().rposition(|e| *e == SinkEvent::EndSeries).unwrap();

    assert_eq!(sink.count(|e| matches!(e, SinkEvent::StartGroup(_))), 2);
    assert!(annual < first_series);
    assert!(monthly > last_series_end);
    assert_eq!(sink.count(|e| *e == SinkEvent::StartSeries), 2);
}

#[test]
fn cross_sectional_series_write_the_key_without_the_observation_dimension() {
    let mut cursor = MemoryCursor::new(Header::new("MSG")).with_dataset(
        MemoryDataset::new(DatasetHeader::new("EXR").with_dimension_at_observation("COUNTRY"), structure())
            .with_series(
                Keyable::series([("FREQ", "A"), ("TIME_PERIOD", "2020")]),
                vec![
                    Observation::new("COUNTRY", "FR").with_measure("OBS_VALUE", "1"),
                    Observation::new("COUNTRY", "DE").with_measure("OBS_VALUE", "2"),
                ],
            ),
    );
    let sink = run(&mut cursor, &mut FailFast);

    let obs = sink.observations();
    assert_eq!(obs.len(), 2);
    assert_eq!(obs[0].series_key, vec![pair("FREQ", "A"), pair("TIME_PERIOD", "2020")]);
    assert_eq!(obs[0].dimension_id, "COUNTRY");
    assert_eq!(obs[1].dimension_value, "DE");
}

#[test]
fn flat_series_collect_empty_key_components() {
    let mut cursor = MemoryCursor::new(Header::new("MSG")).with_dataset(
        MemoryDataset::new(
            DatasetHeader::new("EXR")
                .with_dimension_at_observation(ALL_DIMENSIONS)
                .cross_sectional(),
            structure(),
        )
        .with_series(
            Keyable::series([("FREQ", "A"), ("COUNTRY", "FR"), ("TIME_PERIOD", "2020")]),
            vec![Observation::new("", "").with_measure("OBS_VALUE", "1")],
        )
        .with_series(
            Keyable::series([("FREQ", ""), ("COUNTRY", "DE"), ("TIME_PERIOD", "2020")]),
            vec![Observation::new("", "").with_measure("OBS_VALUE", "2")],
        ),
    );
    let mut collected = CollectErrors::default();
    let sink = run(&mut cursor, &mut collected);

    assert_eq!(collected.errors().len(), 1);
    let obs = sink.observations();
    assert_eq!(obs.len(), 2);
    assert_eq!(obs[0].dimension_id, "COUNTRY");
    assert_eq!(obs[0].dimension_value, "FR");
    assert_eq!(obs[0].series_key, vec![pair("FREQ", "A"), pair("TIME_PERIOD", "2020")]);
    assert_eq!(obs[1].series_key, vec![pair("TIME_PERIOD", "2020")]);
}

#[test]
fn several_datasets_share_one_header() {
    let dataset = |id: &str| {
        MemoryDataset::new(DatasetHeader::new("EXR"), structure()).with_series(
            Keyable::series([("FREQ", "A"), ("COUNTRY", id)]),
            vec![Observation::new("TIME_PERIOD", "2020").with_measure("OBS_VALUE", "1")],
        )
    };
    let mut cursor = MemoryCursor::new(Header::new("MSG"))
        .with_dataset(dataset("FR"))
        .with_dataset(dataset("DE"));
    let mut sink = RecordingSink::new();
    let mut seq = WriteSequencer::new(&mut sink);
    let mut handler = FailFast;
    let stats = CopyEngine::new(&mut handler).copy(&mut cursor, &mut seq).unwrap();
    seq.close().unwrap();
    assert_eq!(seq.stats().datasets, 2);
    drop(seq);

    assert_eq!(stats.datasets, 2);
    assert_eq!(stats.observations, 2);
    assert_eq!(sink.count(|e| matches!(e, SinkEvent::Header(_))), 1);
    assert_eq!(sink.count(|e| matches!(e, SinkEvent::StartDataset { .. })), 2);
    assert_eq!(sink.count(|e| *e == SinkEvent::EndDataset), 2);
}
