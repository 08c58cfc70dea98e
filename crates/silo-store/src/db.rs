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

use crate::{ObjectStore, StoreError};
use parity_db::{ColumnOptions, CompressionType, Db, Options as ParityOptions};
use parking_lot::RwLock;
use std::fmt;
use std::path::Path;

/// Embedded ordered key-value engine backed by `parity-db` with a single
/// b-tree indexed column.
pub struct DbStore {
    db: RwLock<Option<Db>>,
}

impl fmt::Debug for DbStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbStore").finish_non_exhaustive()
    }
}

impl DbStore {
    /// Open or create the database at `path`.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = ParityOptions {
            path: path.as_ref().to_owned(),
            sync_wal: true,
            sync_data: true,
            stats: false,
            salt: None,
            columns: vec![ColumnOptions {
                // Conflicts with `btree_index`
                preimage: false,
                btree_index: true,
                ref_counted: false,
                uniform: false,
                compression: CompressionType::NoCompression,
                ..ColumnOptions::default()
            }],
            compression_threshold: Default::default(),
        };

        Ok(Self {
            db: RwLock::new(Some(Db::open_or_create(&options)?)),
        })
    }

    fn with_db<T>(&self, f: impl FnOnce(&Db) -> Result<T, StoreError>) -> Result<T, StoreError> {
        f(self.db.read().as_ref().ok_or(StoreError::Closed)?)
    }
}

impl ObjectStore for DbStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.with_db(|db| Ok(db.commit([(0, key.to_vec(), Some(value.to_vec()))])?))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_db(|db| Ok(db.get(0, key)?))
    }

    fn del(&self, key: &[u8]) -> Result<(), StoreError> {
        self.with_db(|db| Ok(db.commit([(0, key.to_vec(), None)])?))
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        self.with_db(|db| {
            let mut iter = db.iter(0)?;
            let mut keys = Vec::new();
            while let Some((key, _value)) = iter.next()? {
                keys.push(key);
            }
            Ok(keys)
        })
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.keys()?.len())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let keys = self.keys()?;
        self.with_db(|db| Ok(db.commit(keys.into_iter().map(|key| (0, key, None)))?))
    }

    fn close(&self) -> Result<(), StoreError> {
        // Dropping the handle flushes the write-ahead log
        self.db.write().take();
        Ok(())
    }
}
