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

use tempfile::tempdir;
use zicube::cursor::MemoryCursor;
use zicube::model::Header;
use zicube::{ConversionConfig, Converter, CubeError, ErrorPolicy, RecordingSink};

#[test]
fn loads_yaml_and_json_files() {
    let dir = tempdir().unwrap();
    let yaml = dir.path().join("conversion.yml");
    fs::write(
        &yaml,
        "reorder_cross_sectional: true\ncross_sectional_measures: [STOCK_A, STOCK_B]\nerror_policy: collect\n",
    )
    .unwrap();
    let json = dir.path().join("conversion.json");
    fs::write(&json, r#"{"complex_separator": "|", "column_widths": {"FREQ": 4}}"#).unwrap();

    let from_yaml = ConversionConfig::from_path(&yaml).unwrap();
    assert!(from_yaml.reorder_cross_sectional);
    assert_eq!(from_yaml.cross_sectional_measures, vec!["STOCK_A", "STOCK_B"]);
    assert_eq!(from_yaml.error_policy, ErrorPolicy::Collect);

    let from_json = ConversionConfig::from_path(&json).unwrap();
    assert_eq!(from_json.complex_separator, "|");
    assert_eq!(from_json.column_widths.unwrap()["FREQ"], 4);
    assert!(!from_json.reorder_cross_sectional);
}

#[test]
fn rejects_unknown_extensions_and_bad_values() {
    let dir = tempdir().unwrap();
    let toml = dir.path().join("conversion.toml");
    fs::write(&toml, "aggregate_observations = true\n").unwrap();
    assert!(matches!(
        ConversionConfig::from_path(&toml),
        Err(CubeError::Configuration { .. })
    ));

    let repeated = ConversionConfig::from_yaml_str("cross_sectional_measures: [A, A]\n").unwrap_err();
    assert!(matches!(repeated, CubeError::Configuration { .. }));
    let zero = ConversionConfig::from_json_str(r#"{"column_widths": {"FREQ": 0}}"#).unwrap_err();
    assert!(matches!(zero, CubeError::Configuration { .. }));
    let malformed = ConversionConfig::from_json_str("{").unwrap_err();
    assert!(matches!(malformed, CubeError::Serde(_)));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = ConversionConfig::from_path(dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, CubeError::Io(_)));
}

#[test]
fn invalid_config_releases_both_ends() {
    let mut config = ConversionConfig::default();
    config.store_namespace_prefix.clear();
    let mut source = MemoryCursor::new(Header::new("MSG"));
    let mut sink = RecordingSink::new();
    let err = Converter::new(config).convert(&mut source, &mut sink).unwrap_err();
    assert!(matches!(err, CubeError::Configuration { .. }));
    assert!(source.is_closed());
    assert!(sink.is_closed());
}

#[test]
fn empty_source_still_writes_a_header() {
    let mut source = MemoryCursor::new(Header::new("MSG"));
    let mut sink = RecordingSink::new();
    let report = Converter::default().convert(&mut source, &mut sink).unwrap();
    assert_eq!(report.committed.datasets, 0);
    assert!(report.errors.is_empty());
    assert_eq!(sink.events().len(), 2);
}
