// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote object storage capability.

use crate::error::AppError;
use crate::ids::random_hex;
use crate::models::{LocalFile, MediaAssetRef};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Upload/delete against a remote object store.
///
/// Each call is a single attempt; retries are the caller's business.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, file: &LocalFile) -> Result<MediaAssetRef, AppError>;

    async fn delete(&self, storage_id: &str) -> Result<DeleteOutcome, AppError>;
}

/// In-process object store for tests and local development.
#[derive(Default)]
pub struct MemoryStorage {
    objects: DashMap<String, LocalFile>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
    uploads: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of upload calls, failed ones included.
    pub fn upload_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Number of delete calls, failed ones included.
    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, storage_id: &str) -> bool {
        self.objects.contains_key(storage_id)
    }

    /// Number of objects currently held.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, file: &LocalFile) -> Result<MediaAssetRef, AppError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("upload rejected (injected failure)".to_string()));
        }

        let storage_id = format!("mem/{}", random_hex(8)?);
        let url = format!("memory://{}/{}", storage_id, file.file_name);
        self.objects.insert(storage_id.clone(), file.clone());

        Ok(MediaAssetRef { url, storage_id })
    }

    async fn delete(&self, storage_id: &str) -> Result<DeleteOutcome, AppError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("delete rejected (injected failure)".to_string()));
        }

        Ok(match self.objects.remove(storage_id) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }
}
