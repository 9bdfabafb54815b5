//! Publish orchestration: resolve the remote thing, then bring every listed
//! file and image up to date.
//!
//! A [`Publisher`] owns the merged [`Config`] for one run and mutates it as
//! remote identifiers become known. Whatever happens, the caller gets the
//! config back through [`Publisher::into_config`] and decides what to persist.
//!
//! # Flow
//! 1. [`Publisher::resolve_or_create_thing`]: reuse `thing.id`, look the thing
//!    up by name, or create it.
//! 2. [`Publisher::sync_attachment`] for each file, then each image, in
//!    listing order.
//!
//! # Error Handling
//! The first failing remote call aborts the run with a [`PublishError`].
//! Nothing is retried and nothing already done remotely is rolled back.

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::attachment::{is_stale, local_timestamp, remote_timestamp, AttachmentKind};
use crate::config::{Config, Credentials};
use crate::contract::ThingApi;
use crate::error::PublishError;

/// How the remote thing was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThingAction {
    /// No matching thing existed; it was created with the local metadata.
    Created,
    /// An existing thing was reused and patched with the local metadata.
    Updated,
}

/// What happened to one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentOutcome {
    /// No remote copy was recorded; uploaded fresh.
    Uploaded,
    /// The remote copy was older than the local file; deleted and uploaded again.
    Replaced,
    /// The remote copy is at least as new as the local file.
    UpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentReport {
    pub path: String,
    pub kind: AttachmentKind,
    pub outcome: AttachmentOutcome,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub thing_id: u64,
    pub thing_action: ThingAction,
    pub attachments: Vec<AttachmentReport>,
}

impl PublishReport {
    pub fn count(&self, outcome: AttachmentOutcome) -> usize {
        self.attachments
            .iter()
            .filter(|a| a.outcome == outcome)
            .count()
    }
}

/// Single-run publisher. Construct once, call [`Publisher::publish`], then
/// take the updated config back with [`Publisher::into_config`].
pub struct Publisher<A: ThingApi> {
    api: A,
    config: Config,
    credentials: Credentials,
    root: PathBuf,
}

impl<A: ThingApi> Publisher<A> {
    /// `root` is the project directory attachment paths are relative to.
    pub fn new(api: A, config: Config, credentials: Credentials, root: impl Into<PathBuf>) -> Self {
        Self {
            api,
            config,
            credentials,
            root: root.into(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Runs the whole publish flow.
    pub async fn publish(&mut self) -> Result<PublishReport, PublishError> {
        info!(
            thing = %self.config.thing.name,
            files = self.config.files.len(),
            images = self.config.images.len(),
            "[PUBLISH] Starting publish run"
        );

        let (thing_id, thing_action) = self.resolve_or_create_thing().await?;

        let mut attachments = Vec::new();
        for kind in AttachmentKind::ALL {
            for path in self.config.table(kind).paths() {
                let outcome = self.sync_attachment(thing_id, &path, kind).await?;
                attachments.push(AttachmentReport {
                    path,
                    kind,
                    outcome,
                });
            }
        }

        let report = PublishReport {
            thing_id,
            thing_action,
            attachments,
        };
        info!(
            thing_id,
            uploaded = report.count(AttachmentOutcome::Uploaded),
            replaced = report.count(AttachmentOutcome::Replaced),
            up_to_date = report.count(AttachmentOutcome::UpToDate),
            "[PUBLISH] Publish run complete"
        );
        Ok(report)
    }

    /// Makes sure the remote thing exists and carries the local metadata.
    ///
    /// The resolved identifier is written to `thing.id` before any further
    /// remote call is made.
    pub async fn resolve_or_create_thing(&mut self) -> Result<(u64, ThingAction), PublishError> {
        let payload = self.config.thing.payload();

        let thing_id = match self.config.thing.id {
            Some(id) => {
                debug!(thing_id = id, "[PUBLISH] Using cached thing id");
                id
            }
            None => match self.find_thing_by_name().await? {
                Some(id) => {
                    self.config.thing.id = Some(id);
                    id
                }
                None => {
                    let name = &self.config.thing.name;
                    info!(thing = %name, "[PUBLISH] No remote thing found, creating it");
                    let created = self
                        .api
                        .create_thing(&payload)
                        .await
                        .map_err(PublishError::api("create thing"))?;
                    info!(thing_id = created.id, "[PUBLISH] Created remote thing");
                    self.config.thing.id = Some(created.id);
                    return Ok((created.id, ThingAction::Created));
                }
            },
        };

        info!(thing_id, "[PUBLISH] Updating remote thing metadata");
        self.api
            .update_thing(thing_id, &payload)
            .await
            .map_err(PublishError::api("update thing"))?;
        Ok((thing_id, ThingAction::Updated))
    }

    async fn find_thing_by_name(&self) -> Result<Option<u64>, PublishError> {
        let name = &self.config.thing.name;
        if name.is_empty() {
            return Err(PublishError::MissingField {
                context: "project config",
                field: "thing.name",
            });
        }

        let things = self
            .api
            .list_user_things(&self.credentials.username)
            .await
            .map_err(PublishError::api("list things"))?;
        let ids: Vec<u64> = things
            .iter()
            .filter(|t| &t.name == name)
            .map(|t| t.id)
            .collect();
        debug!(
            username = %self.credentials.username,
            listed = things.len(),
            matches = ids.len(),
            "[PUBLISH] Looked up things by name"
        );

        match ids.as_slice() {
            [] => Ok(None),
            [id] => {
                info!(thing_id = *id, thing = %name, "[PUBLISH] Found existing remote thing");
                Ok(Some(*id))
            }
            _ => {
                error!(thing = %name, ?ids, "[PUBLISH][ERROR] Several remote things share this name");
                Err(PublishError::ConflictingThings {
                    name: name.clone(),
                    ids,
                })
            }
        }
    }

    /// Brings one attachment up to date and records the new remote metadata.
    pub async fn sync_attachment(
        &mut self,
        thing_id: u64,
        path: &str,
        kind: AttachmentKind,
    ) -> Result<AttachmentOutcome, PublishError> {
        let local_path = self.root.join(path);
        let outcome = match self.config.table(kind).remote_id(path) {
            None => {
                debug!(path, %kind, "[PUBLISH][ATTACHMENT] No remote copy recorded");
                AttachmentOutcome::Uploaded
            }
            Some(attachment_id) => {
                let modified = std::fs::metadata(&local_path)
                    .and_then(|m| m.modified())
                    .map_err(PublishError::io(&local_path))?;
                let local = local_timestamp(modified);

                let remote = self
                    .api
                    .get_attachment(thing_id, kind, attachment_id)
                    .await
                    .map_err(PublishError::api("fetch attachment"))?;
                let (raw, parsed) = remote_timestamp(kind, &remote);
                let remote_time = parsed.ok_or_else(|| PublishError::InvalidTimestamp {
                    path: path.to_owned(),
                    field: kind.timestamp_field(),
                    value: raw,
                })?;

                if !is_stale(local, remote_time) {
                    info!(
                        path,
                        %kind,
                        attachment_id,
                        %local,
                        remote = %remote_time,
                        "[PUBLISH][ATTACHMENT] Remote copy is up to date, skipping"
                    );
                    return Ok(AttachmentOutcome::UpToDate);
                }

                warn!(
                    path,
                    %kind,
                    attachment_id,
                    %local,
                    remote = %remote_time,
                    "[PUBLISH][ATTACHMENT] Local copy is newer, replacing remote copy"
                );
                self.api
                    .delete_attachment(thing_id, kind, attachment_id)
                    .await
                    .map_err(PublishError::api("delete attachment"))?;
                // The old id is dead from here on, even if the upload fails.
                self.config.table_mut(kind).forget(path);
                AttachmentOutcome::Replaced
            }
        };

        let metadata = self.upload(thing_id, path, &local_path).await?;
        self.config.table_mut(kind).record(path, metadata);
        info!(path, %kind, ?outcome, "[PUBLISH][ATTACHMENT] Attachment uploaded");
        Ok(outcome)
    }

    /// Upload slot, binary upload, finalize. Returns the finalized metadata.
    async fn upload(
        &self,
        thing_id: u64,
        path: &str,
        local_path: &Path,
    ) -> Result<Value, PublishError> {
        let content = std::fs::read(local_path).map_err(PublishError::io(local_path))?;
        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_owned());

        let slot = self
            .api
            .request_upload_slot(thing_id, &filename)
            .await
            .map_err(PublishError::api("request upload slot"))?;
        if slot.finalize_url().is_none() {
            return Err(PublishError::MissingField {
                context: "upload slot",
                field: crate::contract::FINALIZE_URL_FIELD,
            });
        }
        debug!(path, action = %slot.action, bytes = content.len(), "[PUBLISH][ATTACHMENT] Got upload slot");

        self.api
            .upload_to_slot(&slot, &filename, content)
            .await
            .map_err(PublishError::api("upload file"))?;

        self.api
            .finalize_upload(&slot)
            .await
            .map_err(PublishError::api("finalize upload"))
    }
}
