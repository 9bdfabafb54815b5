use serde_json::{json, Value};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

use thingsync::load_config::{
    default_user_config_path, ingest_project_texts, load_config, read_layer,
};

#[test]
fn missing_file_is_an_empty_layer() {
    let dir = tempdir().unwrap();
    let layer = read_layer(&dir.path().join("absent.json")).expect("missing file is not an error");
    assert!(layer.is_empty());
}

#[test]
fn malformed_file_error_names_the_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"thing\": ").unwrap();

    let err = read_layer(&path).unwrap_err().to_string();
    assert!(err.contains("Failed to parse config JSON"));
    assert!(err.contains("broken.json"));
}

#[test]
fn non_object_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("list.json");
    fs::write(&path, "[1, 2]").unwrap();

    let err = read_layer(&path).unwrap_err().to_string();
    assert!(err.contains("an array"));
}

#[test]
fn project_layer_overrides_user_layer() {
    let dir = tempdir().unwrap();
    let user = dir.path().join("user.json");
    let project = dir.path().join("thingsync.json");
    fs::write(
        &user,
        json!({ "bearer_token": "t", "username": "alice", "api_url": "https://user.example" })
            .to_string(),
    )
    .unwrap();
    fs::write(
        &project,
        json!({ "api_url": "https://project.example", "thing": { "name": "Clip" } }).to_string(),
    )
    .unwrap();

    let loaded = load_config(Some(&user), &project).unwrap();
    assert_eq!(loaded.config.api_url(), "https://project.example");
    assert_eq!(loaded.config.username.as_deref(), Some("alice"));
    assert_eq!(loaded.config.thing.name, "Clip");
    assert_eq!(loaded.project_dir(), dir.path());
}

#[test]
fn bare_file_name_resolves_against_current_dir() {
    let dir = tempdir().unwrap();
    let loaded = load_config(None, &dir.path().join("thingsync.json")).unwrap();
    assert_eq!(loaded.project_dir(), dir.path());

    let relative = load_config(None, &PathBuf::from("does-not-exist-thingsync.json")).unwrap();
    assert_eq!(relative.project_dir(), PathBuf::from("."));
}

#[test]
fn save_writes_only_the_project_layer() {
    let dir = tempdir().unwrap();
    let user = dir.path().join("user.json");
    let project = dir.path().join("thingsync.json");
    fs::write(&user, json!({ "bearer_token": "t", "username": "alice" }).to_string()).unwrap();
    fs::write(
        &project,
        json!({
            "thing": { "name": "Clip" },
            "files": { "part.stl": null },
            "notes": "kept as is"
        })
        .to_string(),
    )
    .unwrap();
    fs::write(dir.path().join("README.md"), "A clip.").unwrap();

    let loaded = load_config(Some(&user), &project).unwrap();
    let mut config = loaded.config.clone();
    let ingested = ingest_project_texts(&mut config, &loaded.project_dir()).unwrap();
    assert_eq!(ingested, vec!["description"]);
    config.thing.id = Some(12);
    config.files.record("part.stl", json!({ "id": 3, "name": "part.stl" }));
    loaded.save(&config, &ingested).unwrap();

    let text = fs::read_to_string(&project).unwrap();
    assert!(text.ends_with('\n'));
    let saved: Value = serde_json::from_str(&text).unwrap();
    assert!(saved.get("bearer_token").is_none());
    assert!(saved.get("username").is_none());
    assert!(saved["thing"].get("description").is_none());
    assert_eq!(saved["thing"]["id"], 12);
    assert_eq!(saved["files"]["part.stl"]["id"], 3);
    assert_eq!(saved["notes"], "kept as is");
}

#[test]
fn project_texts_fill_description_and_instructions() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("thingsync.json");
    fs::write(
        &project,
        json!({ "thing": { "name": "Clip", "description": "old" } }).to_string(),
    )
    .unwrap();
    fs::write(dir.path().join("README.md"), "# Clip\n").unwrap();
    fs::write(dir.path().join("print-instructions.md"), "0.2mm layers").unwrap();

    let mut config = load_config(None, &project).unwrap().config;
    let ingested = ingest_project_texts(&mut config, dir.path()).unwrap();
    assert_eq!(ingested, vec!["description", "instructions"]);
    assert_eq!(config.thing.description.as_deref(), Some("# Clip\n"));
    assert_eq!(config.thing.instructions.as_deref(), Some("0.2mm layers"));
}

#[test]
fn missing_project_texts_leave_fields_alone() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("thingsync.json");
    fs::write(
        &project,
        json!({ "thing": { "name": "Clip", "description": "kept" } }).to_string(),
    )
    .unwrap();

    let mut config = load_config(None, &project).unwrap().config;
    let ingested = ingest_project_texts(&mut config, dir.path()).unwrap();
    assert!(ingested.is_empty());
    assert_eq!(config.thing.description.as_deref(), Some("kept"));
    assert_eq!(config.thing.instructions, None);
}

#[test]
fn handwritten_instructions_survive_save_without_instructions_file() {
    let dir = tempdir().unwrap();
    let project = dir.path().join("thingsync.json");
    fs::write(
        &project,
        json!({ "thing": { "name": "Clip", "instructions": "Print in PETG, 3 walls" } })
            .to_string(),
    )
    .unwrap();
    fs::write(dir.path().join("README.md"), "# Clip\n").unwrap();

    let loaded = load_config(None, &project).unwrap();
    let mut config = loaded.config.clone();
    let ingested = ingest_project_texts(&mut config, dir.path()).unwrap();
    loaded.save(&config, &ingested).unwrap();

    let saved: Value = serde_json::from_str(&fs::read_to_string(&project).unwrap()).unwrap();
    assert_eq!(saved["thing"]["instructions"], "Print in PETG, 3 walls");
    assert!(saved["thing"].get("description").is_none());
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn default_user_config_follows_xdg_config_home() {
    let dir = tempdir().unwrap();
    let previous = env::var_os("XDG_CONFIG_HOME");
    env::set_var("XDG_CONFIG_HOME", dir.path());

    let path = default_user_config_path();

    match previous {
        Some(value) => env::set_var("XDG_CONFIG_HOME", value),
        None => env::remove_var("XDG_CONFIG_HOME"),
    }
    assert_eq!(path, Some(dir.path().join("thingsync").join("config.json")));
}
