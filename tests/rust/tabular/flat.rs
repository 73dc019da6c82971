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

use std::fs;
use std::sync::Arc;

use zicube::cursor::{MemoryCursor, MemoryDataset};
use zicube::model::{
    AttachmentLevel, Attribute, DataStructure, DatasetHeader, DimensionRole, Header, Keyable, Observation,
};
use zicube::tabular::{CsvRowSink, VecRowSink};
use zicube::{ConversionConfig, Converter, TabularSink};

fn structure(measures: &[&str]) -> Arc<DataStructure> {
    let mut dsd = DataStructure::new("EXR")
        .with_dimension("FREQ", DimensionRole::Ordinary)
        .with_dimension("TIME_PERIOD", DimensionRole::Time)
        .with_attribute(Attribute::new("TITLE", AttachmentLevel::Dataset))
        .with_attribute(Attribute::new("UNIT", AttachmentLevel::Series))
        .with_attribute(Attribute::new("OBS_STATUS", AttachmentLevel::Observation));
    for m in measures {
        dsd = dsd.with_measure(*m, None);
    }
    Arc::new(dsd)
}

fn cursor() -> MemoryCursor {
    MemoryCursor::new(Header::new("MSG")).with_dataset(
        MemoryDataset::new(DatasetHeader::new("EXR"), structure(&["OBS_VALUE"]))
            .with_attribute("TITLE", "Rates")
            .with_series(
                Keyable::series([("FREQ", "A")]).with_attribute("UNIT", "EUR"),
                vec![Observation::new("TIME_PERIOD", "2020")
                    .with_measure("OBS_VALUE", "1")
                    .with_attribute("OBS_STATUS", "A")],
            )
            .with_series(
                Keyable::series([("FREQ", "M")]),
                vec![Observation::new("TIME_PERIOD", "2020-01").with_measure("OBS_VALUE", "2")],
            ),
    )
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

#[test]
fn series_close_clears_series_slots_and_keeps_dataset_slots() {
    let converter = Converter::default();
    let mut sink = converter.tabular_sink(VecRowSink::new());
    converter.convert(&mut cursor(), &mut sink).unwrap();
    assert_eq!(sink.rows_written(), 2);
    let rows = sink.into_inner();

    assert!(rows.closed);
    assert_eq!(rows.columns, row(&["FREQ", "TIME_PERIOD", "TITLE", "UNIT", "OBS_STATUS", "OBS_VALUE"]));
    assert_eq!(rows.rows[0], row(&["A", "2020", "Rates", "EUR", "A", "1"]));
    assert_eq!(rows.rows[1], row(&["M", "2020-01", "Rates", "", "", "2"]));
}

#[test]
fn configured_transcoding_applies_to_cells() {
    let config = ConversionConfig::from_yaml_str("transcoding:\n  FREQ:\n    A: Annual\n").unwrap();
    let converter = Converter::new(config);
    let mut sink = converter.tabular_sink(VecRowSink::new());
    converter.convert(&mut cursor(), &mut sink).unwrap();
    let rows = sink.into_inner();
    assert_eq!(rows.cell(0, "FREQ"), Some("Annual"));
    assert_eq!(rows.cell(1, "FREQ"), Some("M"));
}

#[test]
fn multiple_measures_emit_one_row_per_measure() {
    let mut source = MemoryCursor::new(Header::new("MSG")).with_dataset(
        MemoryDataset::new(DatasetHeader::new("EXR"), structure(&["BID", "ASK"])).with_series(
            Keyable::series([("FREQ", "D")]),
            vec![Observation::new("TIME_PERIOD", "2020-01-02")
                .with_measure("BID", "1.1")
                .with_measure("ASK", "1.2")],
        ),
    );
    let mut sink = TabularSink::new(VecRowSink::new());
    Converter::default().convert(&mut source, &mut sink).unwrap();
    let rows = sink.into_inner();

    assert_eq!(rows.rows.len(), 2);
    assert_eq!(rows.cell(0, "BID"), Some("1.1"));
    assert_eq!(rows.cell(0, "ASK"), Some(""));
    assert_eq!(rows.cell(1, "BID"), Some(""));
    assert_eq!(rows.cell(1, "ASK"), Some("1.2"));
    assert_eq!(rows.cell(1, "TIME_PERIOD"), Some("2020-01-02"));
}

#[test]
fn csv_output_lands_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exr.csv");
    let converter = Converter::default();
    let mut sink = converter.tabular_sink(CsvRowSink::create(&path).unwrap());
    converter.convert(&mut cursor(), &mut sink).unwrap();
    drop(sink);

    let written = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(
        lines,
        vec![
            "FREQ,TIME_PERIOD,TITLE,UNIT,OBS_STATUS,OBS_VALUE",
            "A,2020,Rates,EUR,A,1",
            "M,2020-01,Rates,,,2",
        ]
    );
}

#[test]
fn group_attributes_fill_every_series_of_the_group() {
    let dsd = Arc::new(
        DataStructure::new("EXR")
            .with_dimension("FREQ", DimensionRole::Ordinary)
            .with_dimension("COUNTRY", DimensionRole::Ordinary)
            .with_dimension("TIME_PERIOD", DimensionRole::Time)
            .with_attribute(Attribute::new("TITLE", AttachmentLevel::Group).for_group("SIBLING"))
            .with_measure("OBS_VALUE", None)
            .with_group("SIBLING", ["FREQ"]),
    );
    let mut source = MemoryCursor::new(Header::new("MSG")).with_dataset(
        MemoryDataset::new(DatasetHeader::new("EXR"), dsd)
            .with_group(Keyable::group("SIBLING", [("FREQ", "A")]).with_attribute("TITLE", "Annual"))
            .with_series(
                Keyable::series([("FREQ", "A"), ("COUNTRY", "FR")]),
                vec![Observation::new("TIME_PERIOD", "2020").with_measure("OBS_VALUE", "1")],
            )
            .with_series(
                Keyable::series([("FREQ", "A"), ("COUNTRY", "DE")]),
                vec![
                    Observation::new("TIME_PERIOD", "2020").with_measure("OBS_VALUE", "2"),
                    Observation::new("TIME_PERIOD", "2021").with_measure("OBS_VALUE", "3"),
                ],
            )
            .with_series(
                Keyable::series([("FREQ", "M"), ("COUNTRY", "FR")]),
                vec![Observation::new("TIME_PERIOD", "2020-01").with_measure("OBS_VALUE", "4")],
            ),
    );
    let mut sink = TabularSink::new(VecRowSink::new());
    Converter::default().convert(&mut source, &mut sink).unwrap();
    let rows = sink.into_inner();

    assert_eq!(rows.rows.len(), 4);
    assert_eq!(rows.cell(0, "TITLE"), Some("Annual"));
    assert_eq!(rows.cell(1, "TITLE"), Some("Annual"));
    assert_eq!(rows.cell(1, "COUNTRY"), Some("DE"));
    assert_eq!(rows.cell(2, "TITLE"), Some("Annual"));
    assert_eq!(rows.cell(3, "FREQ"), Some("M"));
    assert_eq!(rows.cell(3, "TITLE"), Some(""));
}
