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
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory store, lives for the process lifetime only.
#[derive(Debug)]
pub struct MemStore {
    entries: RwLock<Option<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// New empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Some(HashMap::new())),
        }
    }
}

impl ObjectStore for MemStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.entries
            .write()
            .as_mut()
            .ok_or(StoreError::Closed)?
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .entries
            .read()
            .as_ref()
            .ok_or(StoreError::Closed)?
            .get(key)
            .cloned())
    }

    fn del(&self, key: &[u8]) -> Result<(), StoreError> {
        self.entries
            .write()
            .as_mut()
            .ok_or(StoreError::Closed)?
            .remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self
            .entries
            .read()
            .as_ref()
            .ok_or(StoreError::Closed)?
            .keys()
            .cloned()
            .collect())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().as_ref().ok_or(StoreError::Closed)?.len())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries
            .write()
            .as_mut()
            .ok_or(StoreError::Closed)?
            .clear();
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        self.entries.write().take();
        Ok(())
    }
}
