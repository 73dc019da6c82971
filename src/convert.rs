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

//! # Converter
//!
//! One conversion: a cursor, a sink, and a [`ConversionConfig`]. The converter
//! picks the straight copy or the two-pass reorder, applies the configured
//! error policy and releases both ends on every exit path. The sink is closed
//! by the write sequencer (committing on success, aborting on failure); the
//! cursor is closed by a guard.
//!
//! ```rust
//! use zicube::config::ConversionConfig;
//! use zicube::convert::Converter;
//!
//! let report = Converter::new(ConversionConfig::default()).convert(&mut cursor, &mut sink)?;
//! println!("{} observations", report.committed.observations);
//! ```

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::config::{ConversionConfig, ErrorPolicy};
use crate::copy::{CopyEngine, CopyStats};
use crate::cursor::Cursor;
use crate::errors::{CollectErrors, CubeError, ErrorHandler, FailFast, Result};
use crate::probe::{FieldWidths, LengthProbe};
use crate::reorder::{conversion_namespace, AddressableStore, ChainStats, MemoryStore, ReorderCache};
use crate::sequencer::{SequencerOptions, SequencerStats, WriteSequencer};
use crate::sink::Sink;
use crate::tabular::{RowSink, TabularSink};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionMode {
    Copy,
    Reorder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub mode: ConversionMode,
    pub copy: Option<CopyStats>,
    pub reorder: Option<ChainStats>,
    /// Level instances the sink received.
    pub committed: SequencerStats,
    /// Data format errors collected under [`ErrorPolicy::Collect`].
    pub errors: Vec<CubeError>,
    pub namespace: Option<String>,
}

/// Closes the wrapped cursor when dropped unless closed explicitly.
pub struct CursorGuard<'a, C: Cursor + ?Sized> {
    cursor: &'a mut C,
    closed: bool,
}

impl<'a, C: Cursor + ?Sized> CursorGuard<'a, C> {
    pub fn new(cursor: &'a mut C) -> Self {
        Self { cursor, closed: false }
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cursor.close()
    }
}

impl<'a, C: Cursor + ?Sized> Deref for CursorGuard<'a, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.cursor
    }
}

impl<'a, C: Cursor + ?Sized> DerefMut for CursorGuard<'a, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.cursor
    }
}

impl<'a, C: Cursor + ?Sized> Drop for CursorGuard<'a, C> {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!("cursor released without an explicit close");
            if let Err(e) = self.close() {
                log::warn!("failed to close cursor: {}", e);
            }
        }
    }
}

enum Outcome {
    Copied(CopyStats),
    Reordered(ChainStats, String),
}

#[derive(Clone, Debug, Default)]
pub struct Converter {
    config: ConversionConfig,
}

impl Converter {
    pub fn new(config: ConversionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// A tabular sink using the configured transcoding and separator.
    pub fn tabular_sink<R: RowSink>(&self, rows: R) -> TabularSink<R> {
        TabularSink::new(rows)
            .with_transcoder(self.config.transcoder())
            .with_separator(&self.config.complex_separator)
    }

    /// Configured column widths, or widths probed from the cursor.
    pub fn column_widths<C: Cursor + ?Sized>(&self, cursor: &mut C) -> Result<FieldWidths> {
        match &self.config.column_widths {
            Some(widths) => Ok(FieldWidths::from_map(widths.clone())),
            None => LengthProbe::new()
                .with_transcoder(self.config.transcoder())
                .probe(cursor),
        }
    }

    pub fn convert<C, S>(&self, cursor: &mut C, sink: &mut S) -> Result<ConversionReport>
    where
        C: Cursor + ?Sized,
        S: Sink + ?Sized,
    {
        let mut store = MemoryStore::new();
        self.convert_with_store(cursor, sink, &mut store)
    }

    /// Like [`Converter::convert`], keeping reorder records in `store`.
    pub fn convert_with_store<C, S, K>(&self, cursor: &mut C, sink: &mut S, store: &mut K) -> Result<ConversionReport>
    where
        C: Cursor + ?Sized,
        S: Sink + ?Sized,
        K: AddressableStore + ?Sized,
    {
        let mut cursor = CursorGuard::new(cursor);
        let mut seq = WriteSequencer::with_options(
            sink,
            SequencerOptions {
                aggregate_observations: self.config.aggregate_observations,
            },
        );
        if let Err(e) = self.config.validate() {
            abort_quietly(&mut seq);
            return Err(e);
        }

        let mut collected = CollectErrors::default();
        let mut fail_fast = FailFast;
        let outcome = {
            let handler: &mut dyn ErrorHandler = match self.config.error_policy {
                ErrorPolicy::FailFast => &mut fail_fast,
                ErrorPolicy::Collect => &mut collected,
            };
            if self.config.reorder_cross_sectional {
                self.reorder(&mut *cursor, &mut seq, store, handler)
            } else {
                CopyEngine::new(handler)
                    .copy(&mut *cursor, &mut seq)
                    .map(Outcome::Copied)
            }
        };

        let outcome = match outcome {
            Ok(outcome) => seq.close().map(|_| outcome),
            Err(e) => {
                abort_quietly(&mut seq);
                Err(e)
            }
        };
        let committed = seq.stats();
        drop(seq);
        let closed = cursor.close();
        let outcome = outcome?;
        closed?;

        let errors = collected.into_errors();
        let report = match outcome {
            Outcome::Copied(stats) => ConversionReport {
                mode: ConversionMode::Copy,
                copy: Some(stats),
                reorder: None,
                committed,
                errors,
                namespace: None,
            },
            Outcome::Reordered(stats, namespace) => ConversionReport {
                mode: ConversionMode::Reorder,
                copy: None,
                reorder: Some(stats),
                committed,
                errors,
                namespace: Some(namespace),
            },
        };
        log::info!(
            "conversion finished ({:?}): series={} observations={} errors={}",
            report.mode,
            report.committed.series,
            report.committed.observations,
            report.errors.len()
        );
        Ok(report)
    }

    fn reorder<C, S, K>(
        &self,
        cursor: &mut C,
        seq: &mut WriteSequencer<'_, S>,
        store: &mut K,
        handler: &mut dyn ErrorHandler,
    ) -> Result<Outcome>
    where
        C: Cursor + ?Sized,
        S: Sink + ?Sized,
        K: AddressableStore + ?Sized,
    {
        let namespace = conversion_namespace(&self.config.store_namespace_prefix);
        let mut cache = ReorderCache::new(store, namespace.clone(), self.config.cross_sectional_measures.clone());
        cache.load(cursor, handler)?;
        let stats = cache.write(seq)?;
        cache.release()?;
        Ok(Outcome::Reordered(stats, namespace))
    }
}

fn abort_quietly<S: Sink + ?Sized>(seq: &mut WriteSequencer<'_, S>) {
    if let Err(e) = seq.abort() {
        log::warn!("failed to release sink: {}", e);
    }
}
