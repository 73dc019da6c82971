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

use proptest::prelude::*;
use zicube::model::{
    AttachmentLevel, Attribute, ComponentValue, DataStructure, Dataset, DatasetHeader, DimensionRole, Header,
};
use zicube::{CubeError, RecordingSink, SequencerOptions, SequencerState, SinkEvent, WriteSequencer};

fn dataset() -> Dataset {
    let dsd = DataStructure::new("DSD")
        .with_dimension("FREQ", DimensionRole::Ordinary)
        .with_dimension("TIME_PERIOD", DimensionRole::Time)
        .with_attribute(Attribute::new("UNIT", AttachmentLevel::Series))
        .with_attribute(Attribute::new("TITLE", AttachmentLevel::Group).for_group("SIBLING"))
        .with_measure("OBS_VALUE", None)
        .with_group("SIBLING", ["FREQ"]);
    Dataset {
        header: DatasetHeader::new("DSD"),
        structure: Arc::new(dsd),
        dimension_at_observation: "TIME_PERIOD".to_string(),
    }
}

#[derive(Clone, Debug)]
struct SeriesPlan {
    first: String,
    last: String,
    periods: Vec<String>,
}

fn plans() -> impl Strategy<Value = Vec<SeriesPlan>> {
    prop::collection::vec(
        ("[A-Z]{1,3}", "[A-Z]{1,3}", prop::collection::vec(1990u16..2030, 0..5)).prop_map(
            |(first, last, periods)| SeriesPlan {
                first,
                last,
                periods: periods.into_iter().map(|p| p.to_string()).collect(),
            },
        ),
        0..6,
    )
}

proptest! {
    #[test]
    fn commits_each_level_once_in_nesting_order(plan in plans()) {
        let mut sink = RecordingSink::new();
        let mut seq = WriteSequencer::new(&mut sink);
        seq.write_header(&Header::new("H")).unwrap();
        seq.start_dataset(dataset()).unwrap();
        for series in &plan {
            seq.start_series().unwrap();
            seq.write_series_key_value("FREQ", series.first.as_str()).unwrap();
            seq.write_series_key_value("FREQ", series.last.as_str()).unwrap();
            for period in &series.periods {
                seq.start_observation("TIME_PERIOD", period).unwrap();
                seq.write_observation_value("OBS_VALUE", "1").unwrap();
            }
        }
        seq.close().unwrap();
        drop(seq);

        let events = sink.events();
        prop_assert_eq!(&events[0], &SinkEvent::Header("H".to_string()));
        let is_start_dataset = matches!(events[1], SinkEvent::StartDataset { .. });
        prop_assert!(is_start_dataset);
        prop_assert_eq!(&events[events.len() - 2], &SinkEvent::EndDataset);
        prop_assert_eq!(events.last(), Some(&SinkEvent::Close));

        let observations: usize = plan.iter().map(|s| s.periods.len()).sum();
        prop_assert_eq!(sink.count(|e| *e == SinkEvent::StartSeries), plan.len());
        prop_assert_eq!(sink.count(|e| *e == SinkEvent::EndSeries), plan.len());
        prop_assert_eq!(sink.count(|e| matches!(e, SinkEvent::Observation(..))), observations);
        prop_assert_eq!(sink.count(|e| *e == SinkEvent::EndObservation), observations);

        let mut in_series = false;
        let mut in_observation = false;
        for event in events {
            match event {
                SinkEvent::StartSeries => {
                    prop_assert!(!in_series);
                    in_series = true;
                }
                SinkEvent::SeriesKey(..) => prop_assert!(in_series && !in_observation),
                SinkEvent::Observation(..) => {
                    prop_assert!(in_series && !in_observation);
                    in_observation = true;
                }
                SinkEvent::Measure(..) => prop_assert!(in_observation),
                SinkEvent::EndObservation => {
                    prop_assert!(in_observation);
                    in_observation = false;
                }
                SinkEvent::EndSeries => {
                    prop_assert!(in_series && !in_observation);
                    in_series = false;
                }
                _ => {}
            }
        }

        let keys: Vec<ComponentValue> = events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::SeriesKey(id, v) if id == "FREQ" => Some(v.clone()),
                _ => None,
            })
            .collect();
        let expected: Vec<ComponentValue> = plan.iter().map(|s| ComponentValue::from(s.last.as_str())).collect();
        prop_assert_eq!(keys, expected);
    }
}

#[test]
fn group_commits_before_the_next_series() {
    let mut sink = RecordingSink::new();
    let mut seq = WriteSequencer::new(&mut sink);
    seq.write_header(&Header::new("H")).unwrap();
    seq.start_dataset(dataset()).unwrap();
    seq.start_group("SIBLING").unwrap();
    seq.write_group_attribute("TITLE", "Annual").unwrap();
    seq.write_group_key_value("FREQ", "A").unwrap();
    seq.start_series().unwrap();
    seq.write_series_key_value("FREQ", "A").unwrap();
    seq.write_series_attribute("UNIT", "EUR").unwrap();
    seq.start_observation("TIME_PERIOD", "2020").unwrap();
    seq.write_observation_value("OBS_VALUE", "1").unwrap();
    seq.close().unwrap();
    assert_eq!(seq.stats().groups, 1);
    drop(seq);

    assert_eq!(
        sink.events(),
        &[
            SinkEvent::Header("H".to_string()),
            SinkEvent::StartDataset {
                structure_id: "DSD".to_string(),
                dimension_at_observation: "TIME_PERIOD".to_string(),
            },
            SinkEvent::StartGroup("SIBLING".to_string()),
            SinkEvent::GroupKey("FREQ".to_string(), "A".into()),
            SinkEvent::Attribute("TITLE".to_string(), "Annual".into()),
            SinkEvent::EndGroup,
            SinkEvent::StartSeries,
            SinkEvent::SeriesKey("FREQ".to_string(), "A".into()),
            SinkEvent::Attribute("UNIT".to_string(), "EUR".into()),
            SinkEvent::Observation("TIME_PERIOD".to_string(), "2020".to_string()),
            SinkEvent::Measure("OBS_VALUE".to_string(), "1".into()),
            SinkEvent::EndObservation,
            SinkEvent::EndSeries,
            SinkEvent::EndDataset,
            SinkEvent::Close,
        ]
    );
}

#[test]
fn aggregate_mode_emits_one_observation_per_key() {
    let mut sink = RecordingSink::new();
    let mut seq = WriteSequencer::with_options(
        &mut sink,
        SequencerOptions {
            aggregate_observations: true,
        },
    );
    seq.write_header(&Header::new("H")).unwrap();
    seq.start_dataset(dataset()).unwrap();
    seq.start_series().unwrap();
    for (period, measure, value) in [("2020", "A", "1"), ("2021", "A", "2"), ("2020", "B", "3")] {
        seq.start_observation("TIME_PERIOD", period).unwrap();
        seq.write_observation_value(measure, value).unwrap();
    }
    seq.close().unwrap();
    drop(seq);

    let obs = sink.observations();
    assert_eq!(obs.len(), 2);
    assert_eq!(obs[0].dimension_value, "2020");
    assert_eq!(
        obs[0].measures,
        vec![("A".to_string(), "1".into()), ("B".to_string(), "3".into())]
    );
    assert_eq!(obs[1].measures, vec![("A".to_string(), "2".into())]);
}

#[test]
fn out_of_order_calls_are_protocol_errors() {
    let mut sink = RecordingSink::new();
    let mut seq = WriteSequencer::new(&mut sink);
    let err = seq.start_dataset(dataset()).unwrap_err();
    assert_eq!(err, CubeError::protocol("Created", "start_dataset"));
    seq.write_header(&Header::new("H")).unwrap();
    assert!(seq.start_series().is_err());
    seq.close().unwrap();
    seq.close().unwrap();
    assert_eq!(seq.state(), SequencerState::Closed);
    drop(seq);
    assert_eq!(sink.count(|e| *e == SinkEvent::Close), 1);
}
