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

//! # Tabular Output
//!
//! ## Module Components
//!
//! - **Transcode** ([transcode.rs](transcode/index.html)): per-component value remapping
//! - **Flat** ([flat.rs](flat/index.html)): row assembly and the tabular sink adapter
//! - **Csv** ([csv.rs](csv/index.html)): delimited-text rows (feature `csv`)
//!
//! ## Usage Patterns
//!
//! ```rust
//! use zicube::tabular::{TabularSink, Transcoder, VecRowSink};
//!
//! let transcoder = Transcoder::new().with_rule("SEX", "M", "Male");
//! let sink = TabularSink::new(VecRowSink::new())
//!     .with_transcoder(transcoder)
//!     .with_separator(";");
//! ```

#[cfg(feature = "csv")]
pub mod csv;
pub mod flat;
pub mod transcode;

#[cfg(feature = "csv")]
pub use self::csv::CsvRowSink;
pub use flat::{FlatRowBuffer, RowSink, TabularSink, VecRowSink};
pub use transcode::{Transcoder, TranscodingRules};
