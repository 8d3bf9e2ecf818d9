//! HTTP client for the remote value and table services
//!
//! Endpoints, relative to the configured base URL:
//! - `POST {base}/bulk-lookup` with a [`BulkLookupRequest`] body
//! - `GET {base}/tables/{tableId}?projectId=..` returning `{"cells": [..]}`

use crate::error::{Result, SdeError};
use crate::sync::remote::{BulkLookupRequest, BulkLookupResponse, ValueService};
use crate::xtable::{RemoteTable, TableService};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// reqwest-backed client; timeouts are applied by the callers
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_json<T: DeserializeOwned>(
        operation: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(upstream(operation, format!("HTTP {}", status)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| upstream(operation, format!("invalid response body: {}", e)))
    }
}

fn upstream(operation: &str, message: impl Into<String>) -> SdeError {
    SdeError::Upstream {
        operation: operation.to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl ValueService for HttpRemote {
    async fn bulk_lookup(&self, request: &BulkLookupRequest) -> Result<BulkLookupResponse> {
        tracing::debug!(
            project = %request.project_id,
            facts = request.len(),
            "Sending bulk lookup"
        );

        let response = self
            .client
            .post(format!("{}/bulk-lookup", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| upstream("bulk lookup", e.to_string()))?;

        Self::read_json("bulk lookup", response).await
    }
}

#[async_trait]
impl TableService for HttpRemote {
    async fn fetch_table(&self, project_id: &str, table_id: &str) -> Result<RemoteTable> {
        let response = self
            .client
            .get(format!("{}/tables/{}", self.base_url, table_id))
            .query(&[("projectId", project_id)])
            .send()
            .await
            .map_err(|e| upstream("table fetch", e.to_string()))?;

        Self::read_json("table fetch", response).await
    }
}
