// Copyright (C) 2024 Silo Labs.
// SPDX-License-Identifier: Apache-2.0

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Persisted key-value store contract shared by the ledger's durable
//! fallback, farm plot backends and account/metadata storage, with three
//! interchangeable implementations: an in-memory map, an embedded ordered
//! engine and a single pre-sized file addressed by offset×record-size.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, missing_docs)]

mod db;
mod file;
mod mem;

pub use db::DbStore;
pub use file::FixedRecordStore;
pub use mem::MemStore;
use std::fmt;
use std::io;
use thiserror::Error;

/// Underlying store failures.
///
/// Propagated as-is; the core never retries, retry policy belongs to the
/// caller.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O failure of a file-backed store.
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
    /// Embedded engine failure.
    #[error("embedded store error: {0}")]
    Db(#[from] parity_db::Error),
    /// Key is not addressable by this backend.
    #[error("invalid key of {0} bytes for this backend")]
    InvalidKey(usize),
    /// Value doesn't match the backend's fixed record size.
    #[error("invalid value length {actual}, backend records are {expected} bytes")]
    InvalidValueLength {
        /// Fixed record size of the backend.
        expected: usize,
        /// Length of the rejected value.
        actual: usize,
    },
    /// Operation on a store that has been closed.
    #[error("store is closed")]
    Closed,
}

/// The persisted key-value store contract.
///
/// All backends satisfy it identically: absent keys are `Ok(None)`, never
/// an error, and `del` of a missing key is a no-op.
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Store `value` under `key`, overwriting any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve the value under `key`, or `None` when absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete the value under `key`; missing keys are a no-op.
    fn del(&self, key: &[u8]) -> Result<(), StoreError>;

    /// All stored keys.
    fn keys(&self) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Number of stored entries.
    fn len(&self) -> Result<usize, StoreError>;

    /// Whether the store holds no entries.
    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Remove every entry.
    fn clear(&self) -> Result<(), StoreError>;

    /// Flush and refuse further operations.
    fn close(&self) -> Result<(), StoreError>;
}
