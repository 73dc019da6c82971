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
    Observation,
};
use zicube::tabular::VecRowSink;
use zicube::{Converter, ConversionConfig, Transcoder};

#[test]
fn lookup_order() {
    let t = Transcoder::new()
        .with_rule("SEX", "M", "Male")
        .with_rule("SEX", "", "NA");
    assert_eq!(t.apply("SEX", "M"), "Male");
    assert_eq!(t.apply("SEX", ""), "NA");
    assert_eq!(t.apply("SEX", "X"), "X");
    assert_eq!(t.apply("AGE", "M"), "M");
    assert_eq!(t.apply_optional("SEX", None), "NA");
}

#[test]
fn no_prefix_matching() {
    let t = Transcoder::new().with_rule("SEX", "M", "Male");
    assert_eq!(t.apply("SEX", "MM"), "MM");
    assert_eq!(t.apply("SEX", ""), "");
}

#[test]
fn complex_values_map_each_part() {
    let t = Transcoder::new().with_rule("TAGS", "a", "alpha");
    let mapped = t.apply_value("TAGS", &ComponentValue::from(vec!["a", "b"]));
    assert_eq!(mapped, ComponentValue::from(vec!["alpha", "b"]));
}

#[test]
fn rules_round_trip_through_json() {
    let t = Transcoder::new().with_rule("SEX", "F", "Female");
    let raw = serde_json::to_string(&t).unwrap();
    assert_eq!(raw, r#"{"SEX":{"F":"Female"}}"#);
    let back: Transcoder = serde_json::from_str(&raw).unwrap();
    assert_eq!(back, t);
}

#[test]
fn unset_cells_take_the_declared_default() {
    let dsd = Arc::new(
        DataStructure::new("POP")
            .with_dimension("SEX", DimensionRole::Ordinary)
            .with_dimension("TIME_PERIOD", DimensionRole::Time)
            .with_attribute(Attribute::new("NOTE", AttachmentLevel::Observation))
            .with_measure("OBS_VALUE", None),
    );
    let mut source = MemoryCursor::new(Header::new("MSG")).with_dataset(
        MemoryDataset::new(DatasetHeader::new("POP"), dsd).with_series(
            Keyable::series([("SEX", "M")]),
            vec![Observation::new("TIME_PERIOD", "2020").with_measure("OBS_VALUE", "7")],
        ),
    );
    let config = ConversionConfig::from_yaml_str("transcoding:\n  SEX:\n    M: Male\n  NOTE:\n    \"\": none\n").unwrap();
    let converter = Converter::new(config);
    let mut sink = converter.tabular_sink(VecRowSink::new());
    converter.convert(&mut source, &mut sink).unwrap();
    let rows = sink.into_inner();

    assert_eq!(rows.cell(0, "SEX"), Some("Male"));
    assert_eq!(rows.cell(0, "NOTE"), Some("none"));
    assert_eq!(rows.cell(0, "OBS_VALUE"), Some("7"));
}
