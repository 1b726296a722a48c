use std::sync::Arc;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::AccessTokenSource;
use crate::{http_client, response_json_or_error, truncate_text};

/// Read access to blobs. `Ok(None)` means the object does not exist.
pub trait ObjectStore: Send + Sync {
    fn fetch(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectListing {
    pub name: String,
}

/// Cloud Storage JSON API client.
pub struct GcsObjectStore {
    api_base: String,
    http: HttpClient,
    tokens: Arc<dyn AccessTokenSource>,
}

impl GcsObjectStore {
    pub fn new(api_base: impl Into<String>, tokens: Arc<dyn AccessTokenSource>) -> Result<Self> {
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            http: http_client()?,
            tokens,
        })
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/b/{}", self.api_base, urlencoding::encode(bucket))
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/o/{}", self.bucket_url(bucket), urlencoding::encode(key))
    }

    pub fn bucket_metadata(&self, bucket: &str) -> Result<Value> {
        let url = self.bucket_url(bucket);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.tokens.access_token()?)
            .send()
            .with_context(|| format!("bucket metadata request failed ({url})"))?;
        response_json_or_error("Storage bucket", response)
    }

    pub fn uniform_access_enabled(&self, bucket: &str) -> Result<bool> {
        let metadata = self.bucket_metadata(bucket)?;
        Ok(metadata
            .pointer("/iamConfiguration/uniformBucketLevelAccess/enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    pub fn iam_policy(&self, bucket: &str) -> Result<Value> {
        let url = format!("{}/iam", self.bucket_url(bucket));
        let response = self
            .http
            .get(&url)
            .query(&[("optionsRequestedPolicyVersion", "3")])
            .bearer_auth(self.tokens.access_token()?)
            .send()
            .with_context(|| format!("IAM policy request failed ({url})"))?;
        response_json_or_error("Storage IAM get", response)
    }

    pub fn set_iam_policy(&self, bucket: &str, policy: &Value) -> Result<Value> {
        let url = format!("{}/iam", self.bucket_url(bucket));
        let response = self
            .http
            .put(&url)
            .bearer_auth(self.tokens.access_token()?)
            .json(policy)
            .send()
            .with_context(|| format!("IAM policy update failed ({url})"))?;
        response_json_or_error("Storage IAM set", response)
    }

    /// Every object under `prefix`, following page tokens.
    pub fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectListing>> {
        let url = format!("{}/o", self.bucket_url(bucket));
        let token = self.tokens.access_token()?;
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("prefix", prefix.to_string())];
            if let Some(page) = page_token.as_ref() {
                query.push(("pageToken", page.clone()));
            }
            let response = self
                .http
                .get(&url)
                .query(&query)
                .bearer_auth(&token)
                .send()
                .with_context(|| format!("object listing failed ({url})"))?;
            let payload = response_json_or_error("Storage list", response)?;
            if let Some(items) = payload.get("items").and_then(Value::as_array) {
                for item in items {
                    objects.push(serde_json::from_value::<ObjectListing>(item.clone())?);
                }
            }
            page_token = payload
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string);
            if page_token.is_none() {
                return Ok(objects);
            }
        }
    }
}

impl ObjectStore for GcsObjectStore {
    fn fetch(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let url = self.object_url(bucket, key);
        let response = self
            .http
            .get(&url)
            .query(&[("alt", "media")])
            .bearer_auth(self.tokens.access_token()?)
            .send()
            .with_context(|| format!("object download failed (gs://{bucket}/{key})"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            bail!(
                "Storage download failed ({code}): {}",
                truncate_text(&body, 512)
            );
        }
        let bytes = response
            .bytes()
            .with_context(|| format!("failed reading object bytes (gs://{bucket}/{key})"))?;
        Ok(Some(bytes.to_vec()))
    }
}

pub fn public_object_url(bucket: &str, key: &str) -> String {
    format!("https://storage.googleapis.com/{bucket}/{key}")
}
