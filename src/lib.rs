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

//! # Zicube - Statistical Data Cube Conversion Core
//!
//! Zicube is the format-agnostic part of a converter for hierarchical
//! statistical datasets (dataset, group, series, observation). Concrete wire
//! formats plug in as a [`Cursor`] on the read side and a [`Sink`] on the
//! write side; everything in between lives here.
//!
//! ## Module Overview
//!
//! - **model**: data structure definitions, keys, observations and values
//! - **cursor** / **sink**: the read and write capabilities of a format
//! - **sequencer**: buffers loosely ordered writes and commits them level by level
//! - **copy**: drives a cursor into a sequencer and resolves the dimension at observation
//! - **reorder**: two-pass cross-sectional reordering over an addressable store
//! - **tabular**: transcoding, flat rows and delimited output
//! - **probe**: maximum field widths for fixed-width output
//! - **config** / **convert**: configuration and top-level orchestration
//!
//! ## Feature Flags
//!
//! - `csv`: delimited-text row output via the `csv` crate (enabled by default)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use zicube::{Converter, ConversionConfig, MemoryCursor, RecordingSink};
//! use zicube::cursor::MemoryDataset;
//! use zicube::model::{DataStructure, DatasetHeader, DimensionRole, Header, Keyable, Observation};
//!
//! let dsd = Arc::new(
//!     DataStructure::new("EXR")
//!         .with_dimension("FREQ", DimensionRole::Ordinary)
//!         .with_dimension("TIME_PERIOD", DimensionRole::Time)
//!         .with_measure("OBS_VALUE", None),
//! );
//! let mut cursor = MemoryCursor::new(Header::new("MSG")).with_dataset(
//!     MemoryDataset::new(DatasetHeader::new("EXR"), dsd).with_series(
//!         Keyable::series([("FREQ", "A")]),
//!         vec![Observation::new("TIME_PERIOD", "2020").with_measure("OBS_VALUE", "1.1")],
//!     ),
//! );
//! let mut sink = RecordingSink::new();
//! let report = Converter::new(ConversionConfig::default())
//!     .convert(&mut cursor, &mut sink)
//!     .unwrap();
//! assert_eq!(report.committed.observations, 1);
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, CubeError>`. Recoverable data format
//! errors are routed through an [`ErrorHandler`]; protocol and configuration
//! errors abort immediately.

pub mod errors;
pub mod model;

pub mod cursor;
pub mod sink;

pub mod copy;
pub mod sequencer;

pub mod reorder;
pub mod tabular;

pub mod config;
pub mod convert;
pub mod probe;

pub use errors::{CollectErrors, CubeError, ErrorHandler, FailFast, Result};
pub use model::{
    AttachmentLevel, ComponentValue, DataStructure, Dataset, DatasetHeader, Header, KeyValue, Keyable, Observation,
};

pub use cursor::{Cursor, MemoryCursor};
pub use sink::{RecordingSink, Sink, SinkEvent};

pub use copy::{resolve_dimension_at_observation, CopyEngine, CopyStats, SeriesShape};
pub use sequencer::{SequencerOptions, SequencerState, SequencerStats, WriteSequencer};

pub use reorder::{AddressableStore, FileStore, MemoryStore, ReorderCache};
pub use tabular::{FlatRowBuffer, RowSink, TabularSink, Transcoder};

pub use config::{ConversionConfig, ErrorPolicy};
pub use convert::{ConversionReport, Converter};
pub use probe::{FieldWidths, LengthProbe};
