use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use crate::auth::AccessTokenSource;
use crate::{http_client, response_json_or_error};

/// Raw generation plus the model identity the endpoint reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prediction {
    pub raw_text: String,
    pub model_display_name: Option<String>,
    pub model_version_id: Option<String>,
    pub deployed_model_id: Option<String>,
    pub model: Option<String>,
}

impl Prediction {
    pub fn metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        let mut put = |key: &str, value: &Option<String>| {
            metadata.insert(
                key.to_string(),
                value.clone().map(Value::String).unwrap_or(Value::Null),
            );
        };
        put("model_display_name", &self.model_display_name);
        put("model_version_id", &self.model_version_id);
        put("deployed_model_id", &self.deployed_model_id);
        put("model", &self.model);
        metadata
    }
}

pub trait InferenceClient: Send + Sync {
    fn predict(&self, prompt: &str) -> Result<Prediction>;
}

/// Key spelling expected by the serving container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDialect {
    /// `max_new_tokens` / `top_p`, as read by text-generation-inference.
    TextGeneration,
    /// `maxOutputTokens` / `topP`, as read by Model Garden containers.
    ModelGarden,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParameters {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub dialect: ParameterDialect,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.1,
            top_p: 0.8,
            dialect: ParameterDialect::TextGeneration,
        }
    }
}

impl GenerationParameters {
    pub fn to_json(&self) -> Value {
        match self.dialect {
            ParameterDialect::TextGeneration => json!({
                "max_new_tokens": self.max_tokens,
                "temperature": self.temperature,
                "top_p": self.top_p,
            }),
            ParameterDialect::ModelGarden => json!({
                "maxOutputTokens": self.max_tokens,
                "temperature": self.temperature,
                "topP": self.top_p,
            }),
        }
    }
}

pub fn predict_request_body(prompt: &str, parameters: &GenerationParameters) -> Value {
    json!({
        "instances": [{"input": prompt}],
        "parameters": parameters.to_json(),
    })
}

pub fn parse_prediction(payload: &Value) -> Result<Prediction> {
    let raw_text = payload
        .get("predictions")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(Value::as_str)
        .context("endpoint response has no text in predictions[0]")?
        .to_string();
    let field = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    Ok(Prediction {
        raw_text,
        model_display_name: field("modelDisplayName"),
        model_version_id: field("modelVersionId"),
        deployed_model_id: field("deployedModelId"),
        model: field("model"),
    })
}

/// Online prediction against a deployed endpoint.
pub struct EndpointClient {
    predict_url: String,
    http: HttpClient,
    tokens: Arc<dyn AccessTokenSource>,
    parameters: GenerationParameters,
}

impl EndpointClient {
    pub fn new(predict_url: impl Into<String>, tokens: Arc<dyn AccessTokenSource>) -> Result<Self> {
        Ok(Self {
            predict_url: predict_url.into(),
            http: http_client()?,
            tokens,
            parameters: GenerationParameters::default(),
        })
    }

    pub fn with_parameters(mut self, parameters: GenerationParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }
}

impl InferenceClient for EndpointClient {
    fn predict(&self, prompt: &str) -> Result<Prediction> {
        let token = self.tokens.access_token()?;
        let body = predict_request_body(prompt, &self.parameters);
        tracing::debug!(url = %self.predict_url, "sending prediction request");
        let response = self
            .http
            .post(&self.predict_url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .with_context(|| format!("prediction request failed ({})", self.predict_url))?;
        let payload = response_json_or_error("Endpoint predict", response)?;
        parse_prediction(&payload)
    }
}
