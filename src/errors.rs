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

//! # Zicube Error Module
//!
//! This module defines the error types used throughout the conversion core
//! and the handler abstraction that decides what happens to recoverable ones.
//!
//! ## Error Categories
//!
//! - **Protocol**: a write call arrived in a sequencer state where it is not
//!   legal. Always fatal; never routed through an [`ErrorHandler`].
//! - **DataFormat**: missing or empty mandatory series-key values, an
//!   unresolved dimension-at-observation, an unsupported structure shape.
//!   Routed through the caller-supplied [`ErrorHandler`].
//! - **Configuration**: a declared cross-sectional measure cannot be resolved
//!   against the data structure.
//! - **Store**: failures of an addressable store backend.
//! - **Io** / **Serde**: wrapped filesystem and (de)serialization failures.
//! - **Internal**: broken invariants inside the core itself.
//!
//! ## Usage
//!
//! ```rust
//! use zicube::errors::{CollectErrors, CubeError, ErrorHandler, Result};
//!
//! fn check(handler: &mut dyn ErrorHandler, value: &str) -> Result<()> {
//!     if value.is_empty() {
//!         handler.handle(CubeError::data_format("empty series key value for FREQ"))?;
//!     }
//!     Ok(())
//! }
//!
//! let mut collect = CollectErrors::default();
//! check(&mut collect, "").unwrap();
//! assert_eq!(collect.errors().len(), 1);
//! ```

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type used throughout Zicube.
pub type Result<T> = std::result::Result<T, CubeError>;

/// Canonical error enumeration for the conversion core.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CubeError {
    /// A write call arrived in a state where it is not legal.
    #[error("protocol error: '{call}' is not allowed in state {state}")]
    Protocol { state: String, call: String },

    /// Malformed or incomplete data coming from a cursor.
    #[error("data format error: {message}")]
    DataFormat { message: String },

    /// The conversion was configured in a way the data structure cannot honour.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Failures reported by an addressable store backend.
    #[error("store error: {0}")]
    Store(String),

    /// Errors originating from filesystem IO.
    #[error("io error: {0}")]
    Io(String),

    /// Wrapper for serialization issues.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Catch-all variant for broken internal invariants.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for CubeError {
    fn from(err: io::Error) -> Self {
        CubeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CubeError {
    fn from(err: serde_json::Error) -> Self {
        CubeError::Serde(err.to_string())
    }
}

impl From<serde_yaml::Error> for CubeError {
    fn from(err: serde_yaml::Error) -> Self {
        CubeError::Serde(err.to_string())
    }
}

#[cfg(feature = "csv")]
impl From<csv::Error> for CubeError {
    fn from(err: csv::Error) -> Self {
        CubeError::Io(err.to_string())
    }
}

impl CubeError {
    /// Helper to construct protocol errors.
    pub fn protocol(state: impl Into<String>, call: impl Into<String>) -> Self {
        CubeError::Protocol {
            state: state.into(),
            call: call.into(),
        }
    }

    /// Helper to construct data format errors.
    pub fn data_format<T: Into<String>>(message: T) -> Self {
        CubeError::DataFormat {
            message: message.into(),
        }
    }

    /// Helper to construct configuration errors.
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        CubeError::Configuration {
            message: message.into(),
        }
    }

    /// Helper to construct store errors.
    pub fn store<T: Into<String>>(message: T) -> Self {
        CubeError::Store(message.into())
    }

    /// Helper to construct internal errors.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        CubeError::Internal(message.into())
    }

    /// Returns true for errors that must abort the conversion regardless of
    /// the handler policy.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CubeError::DataFormat { .. })
    }
}

/// Policy hook for recoverable errors.
///
/// Returning `Err` from [`ErrorHandler::handle`] aborts the conversion with
/// that error; returning `Ok(())` lets the core skip the offending value and
/// continue.
pub trait ErrorHandler {
    fn handle(&mut self, error: CubeError) -> Result<()>;
}

/// Re-raises every error it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailFast;

impl ErrorHandler for FailFast {
    fn handle(&mut self, error: CubeError) -> Result<()> {
        Err(error)
    }
}

/// Collects data format errors and continues; anything fatal is re-raised.
#[derive(Debug, Default, Clone)]
pub struct CollectErrors {
    errors: Vec<CubeError>,
}

impl CollectErrors {
    pub fn errors(&self) -> &[CubeError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<CubeError> {
        self.errors
    }
}

impl ErrorHandler for CollectErrors {
    fn handle(&mut self, error: CubeError) -> Result<()> {
        if error.is_fatal() {
            return Err(error);
        }
        log::warn!("continuing after {}", error);
        self.errors.push(error);
        Ok(())
    }
}

impl<H: ErrorHandler + ?Sized> ErrorHandler for &mut H {
    fn handle(&mut self, error: CubeError) -> Result<()> {
        (**self).handle(error)
    }
}
