use serde_json::Value;
use tracing::{info, warn};

use crate::connection::Connection;
use crate::error::CatalogError;
use crate::ollama::InferenceApi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub name: String,
    /// Guessed from the name, not reported by the server.
    pub is_vision: bool,
}

pub fn is_vision_model(name: &str, keywords: &[String]) -> bool {
    let name = name.to_lowercase();
    keywords.iter().any(|k| name.contains(&k.to_lowercase()))
}

/// Models sorted vision-capable first, then by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    models: Vec<ModelDescriptor>,
}

impl Catalog {
    pub fn from_names<I, S>(names: I, keywords: &[String]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut models: Vec<ModelDescriptor> = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                ModelDescriptor {
                    is_vision: is_vision_model(&name, keywords),
                    name,
                }
            })
            .collect();

        models.sort_by(|a, b| (!a.is_vision, &a.name).cmp(&(!b.is_vision, &b.name)));
        models.dedup_by(|a, b| a.name == b.name);

        Self { models }
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// First vision model, else the first model, else nothing.
    pub fn default_selection(&self) -> Option<&str> {
        self.models
            .iter()
            .find(|m| m.is_vision)
            .or_else(|| self.models.first())
            .map(|m| m.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.iter().any(|m| m.name == name)
    }
}

/// Flattens the listing shapes servers are known to return into model names.
/// Entries without a usable name are skipped.
pub fn model_names(listing: &Value) -> Result<Vec<String>, CatalogError> {
    let entries = match listing {
        Value::Array(entries) => entries,
        Value::Object(object) => match object.get("models").or_else(|| object.get("data")) {
            Some(Value::Array(entries)) => entries,
            Some(Value::Null) => return Ok(Vec::new()),
            Some(other) => {
                return Err(CatalogError::Malformed(format!(
                    "model list is {}, expected an array",
                    kind(other)
                )))
            }
            None => {
                return Err(CatalogError::Malformed(
                    "response has no 'models' field".to_string(),
                ))
            }
        },
        other => {
            return Err(CatalogError::Malformed(format!(
                "response is {}, expected an object or array",
                kind(other)
            )))
        }
    };

    let mut names = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry_name(entry) {
            Some(name) => names.push(name),
            None => warn!(entry = %entry, "skipping model entry without a name"),
        }
    }
    Ok(names)
}

fn entry_name(entry: &Value) -> Option<String> {
    let name = match entry {
        Value::String(name) => Some(name.as_str()),
        Value::Object(fields) => ["model", "name", "id"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str)),
        _ => None,
    }?;

    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub async fn load_models<A: InferenceApi>(
    connection: &Connection<A>,
    keywords: &[String],
) -> Result<Catalog, CatalogError> {
    let listing = connection
        .api
        .list_models()
        .await
        .map_err(|e| CatalogError::Transport(format!("{:#}", e)))?;

    let catalog = Catalog::from_names(model_names(&listing)?, keywords);
    info!(
        total = catalog.len(),
        vision = catalog.models().iter().filter(|m| m.is_vision).count(),
        "model catalog loaded"
    );
    Ok(catalog)
}
