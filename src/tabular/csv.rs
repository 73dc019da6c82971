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

//! Delimited-text row output backed by the `csv` crate.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use ::csv::{Writer, WriterBuilder};

use crate::errors::{CubeError, Result};
use crate::tabular::flat::RowSink;

pub struct CsvRowSink<W: Write> {
    writer: Writer<W>,
    rows: usize,
}

impl<W: Write> CsvRowSink<W> {
    pub fn new(writer: W) -> Self {
        Self::with_delimiter(writer, b',')
    }

    pub fn with_delimiter(writer: W, delimiter: u8) -> Self {
        let writer = WriterBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .from_writer(writer);
        Self { writer, rows: 0 }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| CubeError::Io(e.error().to_string()))
    }
}

impl CsvRowSink<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> RowSink for CsvRowSink<W> {
    fn write_columns(&mut self, columns: &[String]) -> Result<()> {
        self.writer.write_record(columns)?;
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<()> {
        self.writer.write_record(row)?;
        self.rows += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        log::debug!("csv output flushed after {} rows", self.rows);
        Ok(())
    }
}
