// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloudinary client implementing [`ObjectStorage`].
//!
//! Uses the signed upload API: parameters are sorted, joined as
//! `k=v&k=v`, suffixed with the API secret and SHA-1 hashed.

use crate::config::StorageConfig;
use crate::error::AppError;
use crate::models::{LocalFile, MediaAssetRef};
use crate::services::storage::{DeleteOutcome, ObjectStorage};
use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::time::{SystemTime, UNIX_EPOCH};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Cloudinary API client.
#[derive(Clone)]
pub struct CloudinaryStorage {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryStorage {
    /// Create a client; every request is bounded by the configured timeout.
    pub fn new(config: &StorageConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed building Cloudinary HTTP client")?;

        Ok(Self {
            http,
            base_url: format!("{}/{}/image", API_BASE, config.cloud_name),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    /// Point the client at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Add `api_key`, `timestamp` and `signature` to a parameter set.
    fn signed_params(
        &self,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<Vec<(&'static str, String)>, AppError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock before Unix epoch")?
            .as_secs();
        params.push(("timestamp", timestamp.to_string()));

        let signature = sign(&params, &self.api_secret);
        params.push(("api_key", self.api_key.clone()));
        params.push(("signature", signature));
        Ok(params)
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        form: &[(&'static str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Cloudinary request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("JSON parse error: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[async_trait]
impl ObjectStorage for CloudinaryStorage {
    async fn upload(&self, file: &LocalFile) -> Result<MediaAssetRef, AppError> {
        let content_type = file
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let data_uri = format!("data:{};base64,{}", content_type, BASE64.encode(&file.bytes));

        let mut form = self.signed_params(Vec::new())?;
        form.push(("file", data_uri));

        let uploaded: UploadResponse = self
            .post_form(&format!("{}/upload", self.base_url), &form)
            .await?;

        tracing::info!(
            storage_id = %uploaded.public_id,
            bytes = file.bytes.len(),
            "Uploaded file to Cloudinary"
        );

        Ok(MediaAssetRef {
            url: uploaded.secure_url,
            storage_id: uploaded.public_id,
        })
    }

    async fn delete(&self, storage_id: &str) -> Result<DeleteOutcome, AppError> {
        let form = self.signed_params(vec![("public_id", storage_id.to_string())])?;

        let destroyed: DestroyResponse = self
            .post_form(&format!("{}/destroy", self.base_url), &form)
            .await?;

        match destroyed.result.as_str() {
            "ok" => Ok(DeleteOutcome::Deleted),
            "not found" => Ok(DeleteOutcome::NotFound),
            other => Err(AppError::Upstream(format!(
                "unexpected destroy result: {}",
                other
            ))),
        }
    }
}

/// Compute the request signature over the (unsorted) signable parameters.
fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let payload = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(payload.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}
