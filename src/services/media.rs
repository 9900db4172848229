// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Media asset swap: upload the replacement, then clean up the old object.
//!
//! Ordering is strict. The old object is only deleted after the new upload
//! has succeeded, and a failed delete never fails the swap. Every object that
//! may be left behind in storage is reported through a `warn` event carrying
//! `storage_id`, and counted in [`MediaAssetManager::cleanup_failures`].

use crate::error::AppError;
use crate::models::{LocalFile, MediaAssetRef};
use crate::services::storage::{DeleteOutcome, ObjectStorage};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Orchestrates uploads to, and cleanup in, the object store.
#[derive(Clone)]
pub struct MediaAssetManager {
    storage: Arc<dyn ObjectStorage>,
    cleanup_failures: Arc<AtomicU64>,
}

impl MediaAssetManager {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            storage,
            cleanup_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of objects that could not be cleaned up since startup.
    pub fn cleanup_failures(&self) -> u64 {
        self.cleanup_failures.load(Ordering::Relaxed)
    }

    /// Upload `new_file` and, once that succeeded, delete `current`.
    ///
    /// Returns the new reference; persisting it is the caller's job.
    pub async fn swap(
        &self,
        current: Option<&MediaAssetRef>,
        new_file: Option<&LocalFile>,
    ) -> Result<MediaAssetRef, AppError> {
        let uploaded = self.upload(new_file).await?;

        if let Some(old) = current {
            self.discard(old).await;
        }

        Ok(uploaded)
    }

    /// Like [`swap`](Self::swap), but runs `commit` between the upload and
    /// the cleanup.
    ///
    /// `commit` persists the new reference and returns the one it replaced,
    /// which is what gets deleted. That may differ from what the caller read
    /// earlier if another update committed in between. If `commit` fails the
    /// stored reference is untouched, the new object is reported as orphaned,
    /// and the error is returned, so a stored reference never points at a
    /// deleted object.
    pub async fn swap_committed<F, Fut>(
        &self,
        new_file: Option<&LocalFile>,
        commit: F,
    ) -> Result<MediaAssetRef, AppError>
    where
        F: FnOnce(MediaAssetRef) -> Fut,
        Fut: Future<Output = Result<Option<MediaAssetRef>, AppError>>,
    {
        let uploaded = self.upload(new_file).await?;

        let replaced = match commit(uploaded.clone()).await {
            Ok(replaced) => replaced,
            Err(e) => {
                self.report_orphan(
                    &uploaded.storage_id,
                    &format!("reference not persisted: {}", e),
                );
                return Err(e);
            }
        };

        if let Some(old) = replaced.filter(|old| *old != uploaded) {
            self.discard(&old).await;
        }

        Ok(uploaded)
    }

    async fn upload(&self, new_file: Option<&LocalFile>) -> Result<MediaAssetRef, AppError> {
        let file = new_file
            .filter(|f| !f.bytes.is_empty())
            .ok_or_else(|| AppError::Validation("File is required".to_string()))?;

        self.storage.upload(file).await.map_err(|e| {
            tracing::warn!(file_name = %file.file_name, error = %e, "Upload failed");
            e
        })
    }

    /// Best-effort delete of an object that is no longer referenced.
    pub async fn discard(&self, asset: &MediaAssetRef) {
        match self.storage.delete(&asset.storage_id).await {
            Ok(DeleteOutcome::Deleted) => {
                tracing::debug!(storage_id = %asset.storage_id, "Deleted superseded asset");
            }
            Ok(DeleteOutcome::NotFound) => {
                tracing::info!(storage_id = %asset.storage_id, "Superseded asset already gone");
            }
            Err(e) => {
                self.report_orphan(&asset.storage_id, &e.to_string());
            }
        }
    }

    /// Record an object that storage may still hold but nothing references.
    pub fn report_orphan(&self, storage_id: &str, reason: &str) {
        self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            storage_id = %storage_id,
            reason = %reason,
            "Orphaned storage asset: cleanup failed, reconcile out-of-band"
        );
    }
}
