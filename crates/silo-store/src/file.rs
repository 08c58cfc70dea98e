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
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Single pre-sized file addressed by offset×record-size.
///
/// Keys are big-endian `u64` record offsets and values must be exactly one
/// record long. Occupancy is tracked in memory for the process lifetime;
/// deleting zeroes the record on disk.
#[derive(Debug)]
pub struct FixedRecordStore {
    inner: Mutex<Option<Inner>>,
    record_size: usize,
}

#[derive(Debug)]
struct Inner {
    file: File,
    occupied: BTreeSet<u64>,
}

fn offset_from_key(key: &[u8]) -> Result<u64, StoreError> {
    <[u8; 8]>::try_from(key)
        .map(u64::from_be_bytes)
        .map_err(|_| StoreError::InvalidKey(key.len()))
}

impl FixedRecordStore {
    /// Open or create the file at `path`, pre-sized for `max_records`
    /// records of `record_size` bytes each.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        record_size: usize,
        max_records: u64,
    ) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.set_len(record_size as u64 * max_records)?;

        Ok(Self {
            inner: Mutex::new(Some(Inner {
                file,
                occupied: BTreeSet::new(),
            })),
            record_size,
        })
    }
}

impl ObjectStore for FixedRecordStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let offset = offset_from_key(key)?;
        if value.len() != self.record_size {
            return Err(StoreError::InvalidValueLength {
                expected: self.record_size,
                actual: value.len(),
            });
        }

        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(StoreError::Closed)?;
        inner
            .file
            .seek(SeekFrom::Start(offset * self.record_size as u64))?;
        inner.file.write_all(value)?;
        inner.occupied.insert(offset);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let offset = offset_from_key(key)?;

        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(StoreError::Closed)?;
        if !inner.occupied.contains(&offset) {
            return Ok(None);
        }
        inner
            .file
            .seek(SeekFrom::Start(offset * self.record_size as u64))?;
        let mut record = vec![0u8; self.record_size];
        inner.file.read_exact(&mut record)?;
        Ok(Some(record))
    }

    fn del(&self, key: &[u8]) -> Result<(), StoreError> {
        let offset = offset_from_key(key)?;

        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(StoreError::Closed)?;
        if inner.occupied.remove(&offset) {
            inner
                .file
                .seek(SeekFrom::Start(offset * self.record_size as u64))?;
            inner.file.write_all(&vec![0u8; self.record_size])?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self
            .inner
            .lock()
            .as_ref()
            .ok_or(StoreError::Closed)?
            .occupied
            .iter()
            .map(|offset| offset.to_be_bytes().to_vec())
            .collect())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self
            .inner
            .lock()
            .as_ref()
            .ok_or(StoreError::Closed)?
            .occupied
            .len())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().ok_or(StoreError::Closed)?;
        let zero_record = vec![0u8; self.record_size];
        for offset in core::mem::take(&mut inner.occupied) {
            inner
                .file
                .seek(SeekFrom::Start(offset * self.record_size as u64))?;
            inner.file.write_all(&zero_record)?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        if let Some(inner) = self.inner.lock().take() {
            inner.file.sync_all()?;
        }
        Ok(())
    }
}
