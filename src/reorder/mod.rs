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

//! # Cross-Sectional Reordering
//!
//! ## Module Components
//!
//! - **Store** ([store.rs](store/index.html)): value-addressed key-value stores
//!   and per-conversion namespaces
//! - **Cache** ([cache.rs](cache/index.html)): the two-pass reorder engine
//!
//! ## Usage Patterns
//!
//! ```rust
//! use zicube::reorder::{conversion_namespace, MemoryStore, ReorderCache};
//!
//! let mut store = MemoryStore::new();
//! let mut cache = ReorderCache::new(&mut store, conversion_namespace("zicube"), vec![]);
//! cache.load(&mut cursor, &mut handler)?;
//! cache.write(&mut sequencer)?;
//! ```

pub mod cache;
pub mod store;

pub use cache::{decode_value, encode_value, ChainStats, ReorderCache};
pub use store::{conversion_namespace, AddressableStore, FileStore, MemoryStore, ScopedStore, ValueMap, NAMESPACE_FIELD};
