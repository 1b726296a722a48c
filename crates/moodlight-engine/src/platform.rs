use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AccessTokenSource;
use crate::storage::{public_object_url, GcsObjectStore, ObjectListing};
use crate::{http_client, response_json_or_error};

pub const DEFAULT_ENDPOINT_DISPLAY_NAME: &str = "enzo-synesthetic-dj-endpoint";
pub const DEFAULT_MACHINE_TYPE: &str = "n1-standard-4";
pub const DEFAULT_ACCELERATOR_TYPE: &str = "NVIDIA_TESLA_T4";
pub const AUDIO_PREVIEW_PREFIX: &str = "audio_previews/";
pub const PUBLIC_READ_ROLE: &str = "roles/storage.objectViewer";
pub const PUBLIC_MEMBER: &str = "allUsers";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub deployed_models: Vec<DeployedModelInfo>,
}

impl EndpointStatus {
    /// Last path segment of the resource name.
    pub fn endpoint_id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedModelInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub dedicated_resources: Option<DedicatedResources>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedicatedResources {
    #[serde(default)]
    pub machine_spec: MachineSpec,
    #[serde(default)]
    pub min_replica_count: u32,
    #[serde(default)]
    pub max_replica_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(default)]
    pub machine_type: String,
    #[serde(default)]
    pub accelerator_type: Option<String>,
    #[serde(default)]
    pub accelerator_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployRequest {
    pub model: String,
    pub endpoint_display_name: String,
    pub machine_type: String,
    pub accelerator_type: Option<String>,
    pub accelerator_count: u32,
    pub operation_timeout: Duration,
}

impl DeployRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            endpoint_display_name: DEFAULT_ENDPOINT_DISPLAY_NAME.to_string(),
            machine_type: DEFAULT_MACHINE_TYPE.to_string(),
            accelerator_type: Some(DEFAULT_ACCELERATOR_TYPE.to_string()),
            accelerator_count: 1,
            operation_timeout: Duration::from_secs(45 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub endpoint: EndpointStatus,
    pub created_endpoint: bool,
    pub model_display_name: String,
}

/// Vertex AI endpoint administration over the REST API.
pub struct VertexAdmin {
    api_base: String,
    project: String,
    region: String,
    http: HttpClient,
    tokens: Arc<dyn AccessTokenSource>,
    poll_interval: Duration,
}

impl VertexAdmin {
    pub fn new(
        api_base: impl Into<String>,
        project: impl Into<String>,
        region: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Result<Self> {
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            project: project.into(),
            region: region.into(),
            http: http_client()?,
            tokens,
            poll_interval: Duration::from_secs(5),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn location_path(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.region)
    }

    /// Full resource name for a bare endpoint or model id.
    pub fn resource_name(&self, collection: &str, id: &str) -> String {
        if id.starts_with("projects/") {
            id.to_string()
        } else {
            format!("{}/{collection}/{id}", self.location_path())
        }
    }

    fn get(&self, label: &str, path: &str) -> Result<Value> {
        let url = format!("{}/{path}", self.api_base);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.tokens.access_token()?)
            .send()
            .with_context(|| format!("{label} request failed ({url})"))?;
        response_json_or_error(label, response)
    }

    fn post(&self, label: &str, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/{path}", self.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.tokens.access_token()?)
            .json(body)
            .send()
            .with_context(|| format!("{label} request failed ({url})"))?;
        response_json_or_error(label, response)
    }

    pub fn endpoint_status(&self, endpoint_id: &str) -> Result<EndpointStatus> {
        let payload = self.get(
            "Endpoint status",
            &self.resource_name("endpoints", endpoint_id),
        )?;
        serde_json::from_value(payload).context("endpoint status payload is malformed")
    }

    pub fn find_endpoint_by_display_name(&self, display_name: &str) -> Result<Option<EndpointStatus>> {
        let url = format!("{}/{}/endpoints", self.api_base, self.location_path());
        let filter = format!("display_name=\"{display_name}\"");
        let response = self
            .http
            .get(&url)
            .query(&[("filter", filter.as_str())])
            .bearer_auth(self.tokens.access_token()?)
            .send()
            .with_context(|| format!("Endpoint list request failed ({url})"))?;
        let payload = response_json_or_error("Endpoint list", response)?;
        parse_endpoint_list(&payload).map(|rows| rows.into_iter().next())
    }

    pub fn create_endpoint(&self, display_name: &str) -> Result<EndpointStatus> {
        let operation = self.post(
            "Endpoint create",
            &format!("{}/endpoints", self.location_path()),
            &json!({"displayName": display_name}),
        )?;
        let done = self.wait_for_operation(&operation, Duration::from_secs(10 * 60))?;
        let endpoint = done.get("response").cloned().unwrap_or(Value::Null);
        serde_json::from_value(endpoint).context("endpoint create response is malformed")
    }

    pub fn model_display_name(&self, model: &str) -> Result<String> {
        let payload = self.get("Model lookup", &self.resource_name("models", model))?;
        Ok(payload
            .get("displayName")
            .and_then(Value::as_str)
            .unwrap_or(model)
            .to_string())
    }

    /// Deploys onto the endpoint named `endpoint_display_name`, creating it
    /// when missing, and routes all traffic to the new model.
    pub fn deploy_model(&self, request: &DeployRequest) -> Result<Deployment> {
        let model_name = self.resource_name("models", &request.model);
        let model_display_name = self.model_display_name(&model_name)?;
        tracing::info!(model = %model_display_name, "model retrieved");

        let (endpoint, created_endpoint) =
            match self.find_endpoint_by_display_name(&request.endpoint_display_name)? {
                Some(endpoint) => {
                    tracing::info!(endpoint = %endpoint.display_name, "using existing endpoint");
                    (endpoint, false)
                }
                None => {
                    let endpoint = self.create_endpoint(&request.endpoint_display_name)?;
                    tracing::info!(endpoint = %endpoint.display_name, "created endpoint");
                    (endpoint, true)
                }
            };
        if endpoint.name.is_empty() {
            bail!("endpoint '{}' has no resource name", request.endpoint_display_name);
        }

        let body = deploy_model_body(&model_name, &model_display_name, request);
        tracing::info!(endpoint = %endpoint.name, "deploying model to endpoint");
        let operation = self.post(
            "Deploy model",
            &format!("{}:deployModel", endpoint.name),
            &body,
        )?;
        self.wait_for_operation(&operation, request.operation_timeout)?;
        let endpoint = self.endpoint_status(&endpoint.name)?;

        Ok(Deployment {
            endpoint,
            created_endpoint,
            model_display_name,
        })
    }

    /// Polls a long-running operation until `done`, failing on an operation
    /// error or once `timeout` has elapsed.
    pub fn wait_for_operation(&self, operation: &Value, timeout: Duration) -> Result<Value> {
        let mut current = operation.clone();
        let name = operation_name(&current)?;
        let started = Instant::now();
        loop {
            if current.get("done").and_then(Value::as_bool).unwrap_or(false) {
                if let Some(error) = current.get("error") {
                    bail!("operation {name} failed: {error}");
                }
                return Ok(current);
            }
            if started.elapsed() >= timeout {
                bail!(
                    "operation {name} timed out after {:.1}s",
                    timeout.as_secs_f64()
                );
            }
            thread::sleep(self.poll_interval);
            tracing::debug!(operation = %name, "polling operation");
            current = self.get("Operation poll", &name)?;
        }
    }
}

pub fn deploy_model_body(model_name: &str, display_name: &str, request: &DeployRequest) -> Value {
    let mut machine_spec = json!({"machineType": request.machine_type});
    if let Some(accelerator) = request.accelerator_type.as_deref() {
        machine_spec["acceleratorType"] = json!(accelerator);
        machine_spec["acceleratorCount"] = json!(request.accelerator_count);
    }
    json!({
        "deployedModel": {
            "model": model_name,
            "displayName": display_name,
            "dedicatedResources": {
                "machineSpec": machine_spec,
                "minReplicaCount": 1,
                "maxReplicaCount": 1,
            },
        },
        "trafficSplit": {"0": 100},
    })
}

pub fn parse_endpoint_list(payload: &Value) -> Result<Vec<EndpointStatus>> {
    let Some(rows) = payload.get("endpoints") else {
        return Ok(Vec::new());
    };
    serde_json::from_value(rows.clone()).context("endpoint list payload is malformed")
}

fn operation_name(operation: &Value) -> Result<String> {
    operation
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("long-running operation has no name")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicAudio {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPublication {
    pub uniform_access: bool,
    pub policy_updated: bool,
    pub files: Vec<PublicAudio>,
}

/// Grants `allUsers` read access on uniform-access buckets, then lists the
/// preview files with their public URLs.
pub fn publish_audio_previews(store: &GcsObjectStore, bucket: &str) -> Result<AudioPublication> {
    let uniform_access = store.uniform_access_enabled(bucket)?;
    let mut policy_updated = false;
    if uniform_access {
        let mut policy = store.iam_policy(bucket)?;
        if add_public_read_binding(&mut policy) {
            store.set_iam_policy(bucket, &policy)?;
            policy_updated = true;
            tracing::info!(bucket, "bucket is now publicly readable");
        }
    }
    let files = audio_preview_files(bucket, &store.list_objects(bucket, AUDIO_PREVIEW_PREFIX)?);
    Ok(AudioPublication {
        uniform_access,
        policy_updated,
        files,
    })
}

/// Returns false when the binding is already present.
pub fn add_public_read_binding(policy: &mut Value) -> bool {
    if !policy.is_object() {
        *policy = json!({});
    }
    let bindings = policy
        .as_object_mut()
        .map(|map| map.entry("bindings").or_insert_with(|| json!([])));
    let Some(Value::Array(bindings)) = bindings else {
        return false;
    };
    let already_public = bindings.iter().any(|binding| {
        binding.get("role").and_then(Value::as_str) == Some(PUBLIC_READ_ROLE)
            && binding
                .get("members")
                .and_then(Value::as_array)
                .map(|members| members.iter().any(|member| member == PUBLIC_MEMBER))
                .unwrap_or(false)
    });
    if already_public {
        return false;
    }
    bindings.push(json!({"role": PUBLIC_READ_ROLE, "members": [PUBLIC_MEMBER]}));
    policy["version"] = json!(3);
    true
}

pub fn audio_preview_files(bucket: &str, listing: &[ObjectListing]) -> Vec<PublicAudio> {
    listing
        .iter()
        .filter(|object| object.name.ends_with(".mp3"))
        .map(|object| PublicAudio {
            key: object.name.clone(),
            url: public_object_url(bucket, &object.name),
        })
        .collect()
}
