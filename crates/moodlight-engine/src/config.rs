use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub const DEFAULT_REGION: &str = "europe-west9";
pub const DEFAULT_DATA_PREFIX: &str = "synesthetic_dj";

/// Cloud project settings, read from the environment (`.env` is loaded by the
/// binary before this runs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub project_id: Option<String>,
    pub project_number: Option<String>,
    pub region: String,
    pub bucket_name: Option<String>,
    pub endpoint_id: Option<String>,
    pub mood_samples_uri: Option<String>,
    pub mood_catalog_uri: Option<String>,
    pub audio_aliases_path: Option<PathBuf>,
    pub aiplatform_api_base: Option<String>,
    pub storage_api_base: Option<String>,
}

impl PlatformConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let bucket_name = read("GCP_BUCKET_NAME");
        let default_data_uri = |file: &str| {
            bucket_name
                .as_ref()
                .map(|bucket| format!("gs://{bucket}/{DEFAULT_DATA_PREFIX}/{file}"))
        };
        Self {
            project_id: read("GCP_PROJECT_ID"),
            project_number: read("GCP_PROJECT_NUMBER"),
            region: read("GCP_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_id: read("GCP_ENDPOINT_ID"),
            mood_samples_uri: read("MOOD_SAMPLES_URI")
                .or_else(|| default_data_uri("mood_samples.csv")),
            mood_catalog_uri: read("MOOD_CATALOG_URI")
                .or_else(|| default_data_uri("mood_catalog.csv")),
            audio_aliases_path: read("MOODLIGHT_AUDIO_ALIASES").map(PathBuf::from),
            aiplatform_api_base: read("AIPLATFORM_API_BASE"),
            storage_api_base: read("STORAGE_API_BASE"),
            bucket_name,
        }
    }

    pub fn require_project_id(&self) -> Result<&str> {
        required(self.project_id.as_deref(), "GCP_PROJECT_ID")
    }

    pub fn require_bucket(&self) -> Result<&str> {
        required(self.bucket_name.as_deref(), "GCP_BUCKET_NAME")
    }

    pub fn aiplatform_api_base(&self) -> String {
        self.aiplatform_api_base
            .as_deref()
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com/v1", self.region))
    }

    pub fn storage_api_base(&self) -> String {
        self.storage_api_base
            .as_deref()
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://storage.googleapis.com/storage/v1".to_string())
    }

    /// `:predict` URL of the deployed endpoint. `endpoint_id` overrides the
    /// configured one.
    pub fn predict_url(&self, endpoint_id: Option<&str>) -> Result<String> {
        let project = required(self.project_number.as_deref(), "GCP_PROJECT_NUMBER")?;
        let endpoint = match endpoint_id {
            Some(value) => value,
            None => required(self.endpoint_id.as_deref(), "GCP_ENDPOINT_ID")?,
        };
        Ok(format!(
            "{}/projects/{}/locations/{}/endpoints/{}:predict",
            self.aiplatform_api_base(),
            project,
            self.region,
            endpoint
        ))
    }
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    value.ok_or_else(|| anyhow!("{key} must be set in the environment or .env file"))
}
