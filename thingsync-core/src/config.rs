//! Configuration model: the merged user + project layers, thing metadata and
//! the per-kind attachment tables.
//!
//! The user layer carries credentials, the project layer carries the thing
//! definition and the remote identifiers learned on previous runs. Layers are
//! merged shallowly with the project layer winning on key collision. Only the
//! project layer is ever written back to disk (see [`Config::project_layer`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::attachment::AttachmentKind;
use crate::error::PublishError;

/// Base URL used when the config does not set `api_url`.
pub const DEFAULT_API_URL: &str = "https://api.thingiverse.com";

/// Shallow merge of two config layers; `project` wins on collision.
pub fn merge_layers(user: &Map<String, Value>, project: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = user.clone();
    for (key, value) in project {
        if user.contains_key(key) {
            debug!(key = %key, "Project config overrides user config key");
        }
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// The merged configuration a publish run works on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default)]
    pub thing: ThingMetadata,
    #[serde(default)]
    pub files: AttachmentTable,
    #[serde(default)]
    pub images: AttachmentTable,
    /// Keys this tool does not interpret, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Config {
    /// Builds the typed config from the two raw layers.
    pub fn from_layers(
        user: &Map<String, Value>,
        project: &Map<String, Value>,
    ) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(merge_layers(user, project)))
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn table(&self, kind: AttachmentKind) -> &AttachmentTable {
        match kind {
            AttachmentKind::File => &self.files,
            AttachmentKind::Image => &self.images,
        }
    }

    pub fn table_mut(&mut self, kind: AttachmentKind) -> &mut AttachmentTable {
        match kind {
            AttachmentKind::File => &mut self.files,
            AttachmentKind::Image => &mut self.images,
        }
    }

    /// Resolves credentials, letting `overrides` take precedence over config values.
    /// Empty strings count as absent.
    pub fn credentials(&self, overrides: &CredentialOverrides) -> Result<Credentials, PublishError> {
        fn pick(over: &Option<String>, conf: &Option<String>) -> Option<String> {
            over.as_ref()
                .or(conf.as_ref())
                .filter(|v| !v.is_empty())
                .cloned()
        }
        let bearer_token = pick(&overrides.bearer_token, &self.bearer_token)
            .ok_or(PublishError::MissingCredential("bearer_token"))?;
        let username = pick(&overrides.username, &self.username)
            .ok_or(PublishError::MissingCredential("username"))?;
        Ok(Credentials {
            bearer_token,
            username,
        })
    }

    /// The part of this config that belongs in the project file.
    ///
    /// Drops keys that only the user layer supplied (credentials must not
    /// leak into a project directory) and omits attachment tables that are
    /// empty and were never in the project file. Thing fields listed in
    /// `ingested` were filled from project files for this run; they are
    /// written back as the project file had them, or not at all.
    pub fn project_layer(
        &self,
        user: &Map<String, Value>,
        project: &Map<String, Value>,
        ingested: &[&str],
    ) -> serde_json::Result<Map<String, Value>> {
        let mut layer = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        layer.retain(|key, _| project.contains_key(key) || !user.contains_key(key));

        if let Some(Value::Object(thing)) = layer.get_mut("thing") {
            let on_disk = project.get("thing").and_then(Value::as_object);
            for &field in ingested {
                match on_disk.and_then(|t| t.get(field)) {
                    Some(value) => {
                        thing.insert(field.to_owned(), value.clone());
                    }
                    None => {
                        thing.remove(field);
                    }
                }
            }
        }
        for kind in AttachmentKind::ALL {
            let key = kind.config_key();
            if self.table(kind).is_empty() && !project.contains_key(key) {
                layer.remove(key);
            }
        }
        Ok(layer)
    }
}

/// Credentials every remote call needs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub bearer_token: String,
    pub username: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bearer_token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

/// Command-line supplied credentials that beat both config layers.
#[derive(Debug, Clone, Default)]
pub struct CredentialOverrides {
    pub bearer_token: Option<String>,
    pub username: Option<String>,
}

/// Metadata of the remote thing, as kept in the project config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThingMetadata {
    /// Server-assigned identifier, cached once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_wip: Option<bool>,
    /// Passed through verbatim; the platform decides which values it accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThingMetadata {
    /// Request body for creating or updating the thing. Never includes `id`.
    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        body.insert("name".into(), Value::String(self.name.clone()));
        if let Some(category) = &self.category {
            body.insert("category".into(), Value::String(category.clone()));
        }
        if !self.tags.is_empty() {
            body.insert(
                "tags".into(),
                Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(description) = &self.description {
            body.insert("description".into(), Value::String(description.clone()));
        }
        if let Some(instructions) = &self.instructions {
            body.insert("instructions".into(), Value::String(instructions.clone()));
        }
        if let Some(is_wip) = self.is_wip {
            body.insert("is_wip".into(), Value::Bool(is_wip));
        }
        if let Some(license) = &self.license {
            body.insert("license".into(), Value::String(license.clone()));
        }
        for (key, value) in &self.extra {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(body)
    }
}

/// Local path → remote metadata blob, in project file order.
///
/// A blob is whatever the finalize call returned; its `id` field identifies
/// the remote copy. `null` or `{}` marks a path that was never uploaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentTable(Map<String, Value>);

impl AttachmentTable {
    /// Paths in listing order.
    pub fn paths(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Remote identifier recorded for `path`, if any.
    pub fn remote_id(&self, path: &str) -> Option<u64> {
        match self.0.get(path)?.get("id")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Replaces the record for `path`, keeping its position if already listed.
    pub fn record(&mut self, path: &str, metadata: Value) {
        self.0.insert(path.to_owned(), metadata);
    }

    /// Marks `path` as not uploaded, keeping its position in the listing.
    pub fn forget(&mut self, path: &str) {
        self.0.insert(path.to_owned(), Value::Null);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
