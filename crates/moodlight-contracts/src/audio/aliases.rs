use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde_json::Value;

const DEFAULT_AUDIO_ALIASES_JSON: &str = include_str!("../../resources/audio_aliases.json");

/// Object keys known to be misnamed in the bucket, mapped to their canonical
/// spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    aliases: BTreeMap<String, String>,
}

impl AliasMap {
    pub fn bundled() -> Self {
        let mut map = Self::default();
        map.merge_json(DEFAULT_AUDIO_ALIASES_JSON).ok();
        map
    }

    /// Bundled aliases, overlaid with the entries of `override_path` when given.
    pub fn load(override_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut map = Self::bundled();
        if let Some(path) = override_path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed reading audio aliases ({})", path.display()))?;
            map.merge_json(&raw)
                .with_context(|| format!("invalid audio aliases ({})", path.display()))?;
        }
        Ok(map)
    }

    pub fn merge_json(&mut self, raw: &str) -> anyhow::Result<()> {
        let payload: Value = serde_json::from_str(raw)?;
        let Some(table) = payload.as_object() else {
            bail!("audio aliases must be a JSON object");
        };
        for (key, value) in table {
            let Some(canonical) = value.as_str() else {
                bail!("alias for '{key}' must be a string");
            };
            self.aliases.insert(key.clone(), canonical.to_string());
        }
        Ok(())
    }

    pub fn insert(&mut self, key: impl Into<String>, canonical: impl Into<String>) {
        self.aliases.insert(key.into(), canonical.into());
    }

    pub fn canonical<'a>(&'a self, key: &'a str) -> &'a str {
        self.aliases.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
