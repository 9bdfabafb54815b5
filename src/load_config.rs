/// `load_config` module: reads the user and project JSON layers, merges them
/// into the core [`Config`], and writes the project layer back after a run.
///
/// # Responsibilities
/// - Locate the user-level config (credentials) and the project-level config
///   (thing definition, attachment tables)
/// - Treat a missing file as an empty layer; fail loudly on unreadable or malformed files
/// - Pull `README.md` and `print-instructions.md` into the thing metadata
/// - Persist only what belongs to the project file
///
/// # Errors
/// All errors use `anyhow::Error` with the offending path in context, and are
/// surfaced at the CLI boundary.
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thingsync_core::config::Config;
use tracing::{debug, error, info, warn};

/// Project config file name looked up in the working directory.
pub const DEFAULT_PROJECT_CONFIG: &str = "thingsync.json";

/// Read into `thing.description`.
pub const README_FILE: &str = "README.md";

/// Read into `thing.instructions`.
pub const PRINT_INSTRUCTIONS_FILE: &str = "print-instructions.md";

/// `<config dir>/thingsync/config.json`, e.g. `~/.config/thingsync/config.json` on Linux.
pub fn default_user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("thingsync").join("config.json"))
}

/// Both raw layers plus the merged config built from them.
#[derive(Debug)]
pub struct LoadedConfig {
    pub user: Map<String, Value>,
    pub project: Map<String, Value>,
    pub config: Config,
    pub project_path: PathBuf,
}

impl LoadedConfig {
    /// Directory the project config lives in; attachment paths and the
    /// README files are resolved against it.
    pub fn project_dir(&self) -> PathBuf {
        match self.project_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Writes the project layer of `config` back to the project file.
    /// `ingested` names the thing fields [`ingest_project_texts`] filled.
    pub fn save(&self, config: &Config, ingested: &[&str]) -> Result<()> {
        let layer = config
            .project_layer(&self.user, &self.project, ingested)
            .context("Failed to serialize project config")?;
        let mut text = serde_json::to_string_pretty(&Value::Object(layer))
            .context("Failed to serialize project config")?;
        text.push('\n');
        fs::write(&self.project_path, text).map_err(|e| {
            error!(error = ?e, config_path = ?self.project_path, "Failed to write project config");
            anyhow::anyhow!(
                "Failed to write project config {:?}: {}",
                self.project_path,
                e
            )
        })?;
        info!(config_path = ?self.project_path, "Project config saved");
        Ok(())
    }
}

/// Reads one JSON config layer. A missing file is an empty layer.
pub fn read_layer(path: &Path) -> Result<Map<String, Value>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(config_path = ?path, "Config file not found, using empty layer");
            return Ok(Map::new());
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path,
                e
            ));
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => {
            info!(config_path = ?path, keys = map.len(), "Parsed config file");
            Ok(map)
        }
        Ok(other) => {
            error!(config_path = ?path, "Config file is not a JSON object");
            Err(anyhow::anyhow!(
                "Failed to parse config JSON {:?}: expected an object, found {}",
                path,
                json_kind(&other)
            ))
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to parse config JSON");
            Err(anyhow::anyhow!("Failed to parse config JSON {:?}: {e}", path))
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Loads and merges the user layer (if any) and the project layer.
pub fn load_config(user_path: Option<&Path>, project_path: &Path) -> Result<LoadedConfig> {
    let user = match user_path {
        Some(path) => read_layer(path)?,
        None => {
            warn!("No user config directory available, skipping user config");
            Map::new()
        }
    };
    let project = read_layer(project_path)?;
    let config = Config::from_layers(&user, &project)
        .with_context(|| format!("Invalid configuration in {:?}", project_path))?;

    info!(
        thing = %config.thing.name,
        thing_id = ?config.thing.id,
        files = config.files.len(),
        images = config.images.len(),
        "Config loaded and merged successfully"
    );

    Ok(LoadedConfig {
        user,
        project,
        config,
        project_path: project_path.to_path_buf(),
    })
}

/// Fills `thing.description` and `thing.instructions` from the project's
/// README and print instructions. A missing file leaves its field as is.
///
/// Returns the names of the thing fields that were filled.
pub fn ingest_project_texts(config: &mut Config, project_dir: &Path) -> Result<Vec<&'static str>> {
    let mut ingested = Vec::new();
    if let Some(text) = read_optional_text(&project_dir.join(README_FILE))? {
        config.thing.description = Some(text);
        ingested.push("description");
    }
    if let Some(text) = read_optional_text(&project_dir.join(PRINT_INSTRUCTIONS_FILE))? {
        config.thing.instructions = Some(text);
        ingested.push("instructions");
    }
    Ok(ingested)
}

fn read_optional_text(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => {
            debug!(path = %path.display(), bytes = text.len(), "Read project text");
            Ok(Some(text))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "Project text not found, leaving field unchanged");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}
