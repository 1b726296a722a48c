use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::non_empty_env;

/// Supplies bearer tokens for platform API calls.
pub trait AccessTokenSource: Send + Sync {
    fn access_token(&self) -> Result<String>;
}

/// `GCP_ACCESS_TOKEN` when set, otherwise `gcloud auth print-access-token`.
///
/// Tokens are fetched per call; gcloud caches and refreshes them itself.
#[derive(Debug, Clone, Default)]
pub struct GcloudAccessToken;

impl AccessTokenSource for GcloudAccessToken {
    fn access_token(&self) -> Result<String> {
        if let Some(token) = non_empty_env("GCP_ACCESS_TOKEN") {
            return Ok(token);
        }
        let output = Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .output()
            .context("failed to run `gcloud auth print-access-token`")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("gcloud auth print-access-token failed: {}", stderr.trim());
        }
        let token = String::from_utf8(output.stdout)
            .context("gcloud returned a non UTF-8 access token")?
            .trim()
            .to_string();
        if token.is_empty() {
            bail!("gcloud returned an empty access token");
        }
        Ok(token)
    }
}

#[derive(Debug, Clone)]
pub struct StaticAccessToken(pub String);

impl AccessTokenSource for StaticAccessToken {
    fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
