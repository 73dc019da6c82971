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

use std::collections::BTreeMap;
use std::sync::Arc;

use zicube::cursor::{MemoryCursor, MemoryDataset};
use zicube::model::{
    AttachmentLevel, Attribute, DataStructure, DatasetHeader, DimensionRole, Header, Keyable, Observation,
};
use zicube::{ConversionConfig, Converter, LengthProbe, RecordingSink};

fn cursor() -> MemoryCursor {
    let dsd = Arc::new(
        DataStructure::new("DSD")
            .with_dimension("FREQ", DimensionRole::Ordinary)
            .with_dimension("TIME_PERIOD", DimensionRole::Time)
            .with_attribute(Attribute::new("TAGS", AttachmentLevel::Observation).complex())
            .with_measure("OBS_VALUE", None),
    );
    MemoryCursor::new(Header::new("H")).with_dataset(
        MemoryDataset::new(DatasetHeader::new("DSD"), dsd)
            .with_series(
                Keyable::series([("FREQ", "AB")]),
                vec![Observation::new("TIME_PERIOD", "2020")
                    .with_measure("OBS_VALUE", "1")
                    .with_attribute("TAGS", vec!["A", "BB"])],
            )
            .with_series(
                Keyable::series([("FREQ", "ABC")]),
                vec![Observation::new("TIME_PERIOD", "2021").with_measure("OBS_VALUE", "22")],
            )
            .with_series(
                Keyable::series([("FREQ", "")]),
                vec![Observation::new("TIME_PERIOD", "2022").with_measure("OBS_VALUE", "333")],
            ),
    )
}

#[test]
fn widest_value_per_component() {
    let mut source = cursor();
    let widths = LengthProbe::new().probe(&mut source).unwrap();
    assert_eq!(widths.get("FREQ"), Some(3));
    assert_eq!(widths.get("TAGS"), Some(4));
    assert_eq!(widths.get("TIME_PERIOD"), Some(4));
    assert_eq!(widths.get("OBS_VALUE"), Some(3));
    assert_eq!(widths.get("UNKNOWN"), None);
}

#[test]
fn probing_does_not_disturb_the_emission_pass() {
    let mut source = cursor();
    let converter = Converter::default();
    let widths = converter.column_widths(&mut source).unwrap();
    assert_eq!(widths.get("FREQ"), Some(3));

    let mut sink = RecordingSink::new();
    let report = converter.convert(&mut source, &mut sink).unwrap();
    assert_eq!(report.committed.series, 3);
    assert_eq!(report.committed.observations, 3);
}

#[test]
fn configured_widths_win() {
    let mut config = ConversionConfig::default();
    config.column_widths = Some(BTreeMap::from([("FREQ".to_string(), 12)]));
    let mut source = cursor();
    let widths = Converter::new(config).column_widths(&mut source).unwrap();
    assert_eq!(widths.get("FREQ"), Some(12));
    assert_eq!(widths.get("OBS_VALUE"), None);
    assert_eq!(source.resets(), 0);
}

#[test]
fn widths_serialize_as_a_plain_map() {
    let mut source = cursor();
    let widths = LengthProbe::new().probe(&mut source).unwrap();
    let raw = serde_json::to_value(&widths).unwrap();
    assert_eq!(raw["FREQ"], 3);
    assert_eq!(raw["TAGS"], 4);
}
