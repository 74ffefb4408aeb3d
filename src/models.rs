/// Model catalog over the gateway config file, plus primary-model switching.
///
/// Reading degrades to an empty catalog on any failure; switching is the one
/// operation in this crate that surfaces errors, since it rewrites the
/// gateway config in place.
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCatalog {
    pub models: Vec<ModelEntry>,
    pub current_primary: String,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            current_primary: "unknown".to_string(),
        }
    }
}

/// Flatten the provider → model tree into `{provider}/{model}` entries and
/// report the currently configured primary model.
pub fn read_models(config_path: &Path) -> ModelCatalog {
    let Ok(content) = std::fs::read_to_string(config_path) else {
        return ModelCatalog::default();
    };
    let Ok(config) = serde_json::from_str::<Value>(&content) else {
        return ModelCatalog::default();
    };

    let mut models = Vec::new();
    if let Some(providers) = config
        .pointer("/models/providers")
        .and_then(Value::as_object)
    {
        for (provider_name, provider) in providers {
            let Some(entries) = provider.get("models").and_then(Value::as_array) else {
                continue;
            };
            for model in entries {
                let Some(id) = model.get("id").and_then(Value::as_str) else {
                    continue;
                };
                models.push(ModelEntry {
                    id: format!("{provider_name}/{id}"),
                    name: model
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or(id)
                        .to_string(),
                    provider: provider_name.clone(),
                    context_window: model.get("contextWindow").and_then(Value::as_u64),
                    max_tokens: model.get("maxTokens").and_then(Value::as_u64),
                });
            }
        }
    }

    let current_primary = config
        .pointer("/agents/defaults/model/primary")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    ModelCatalog {
        models,
        current_primary,
    }
}

/// Errors from rewriting the gateway config.
#[derive(Debug)]
pub enum SwitchError {
    Read { source: std::io::Error },
    Parse { source: serde_json::Error },
    NotAnObject,
    Write { source: std::io::Error },
}

impl std::fmt::Display for SwitchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchError::Read { source } => write!(f, "failed to read gateway config: {source}"),
            SwitchError::Parse { source } => write!(f, "failed to parse gateway config: {source}"),
            SwitchError::NotAnObject => write!(f, "gateway config root is not a JSON object"),
            SwitchError::Write { source } => write!(f, "failed to write gateway config: {source}"),
        }
    }
}

impl std::error::Error for SwitchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SwitchError::Read { source } | SwitchError::Write { source } => Some(source),
            SwitchError::Parse { source } => Some(source),
            SwitchError::NotAnObject => None,
        }
    }
}

/// Point `agents.defaults.model.primary` at a new model id, creating the
/// intermediate objects if absent, and rewrite the config in place.
/// Returns the previous primary, if one was set.
pub fn switch_primary_model(
    config_path: &Path,
    new_model_id: &str,
) -> Result<Option<String>, SwitchError> {
    let content =
        std::fs::read_to_string(config_path).map_err(|e| SwitchError::Read { source: e })?;
    let mut config: Value =
        serde_json::from_str(&content).map_err(|e| SwitchError::Parse { source: e })?;
    if !config.is_object() {
        return Err(SwitchError::NotAnObject);
    }

    let mut node = &mut config;
    for key in ["agents", "defaults", "model"] {
        if !node.get(key).is_some_and(Value::is_object) {
            node[key] = Value::Object(serde_json::Map::new());
        }
        node = &mut node[key];
    }

    let old_model = node
        .get("primary")
        .and_then(Value::as_str)
        .map(str::to_string);
    node["primary"] = Value::String(new_model_id.to_string());

    let pretty =
        serde_json::to_string_pretty(&config).map_err(|e| SwitchError::Parse { source: e })?;
    std::fs::write(config_path, pretty).map_err(|e| SwitchError::Write { source: e })?;

    tracing::info!(old = ?old_model, new = new_model_id, "primary model switched");
    Ok(old_model)
}
