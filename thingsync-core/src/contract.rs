#![allow(unused)]

//! # contract: the remote platform as seen by the publisher
//!
//! This module defines the [`ThingApi`] trait and the plain data types that
//! cross it. The [`crate::publish::Publisher`] only ever talks to the remote
//! platform through this trait, so the same orchestration runs against the
//! real HTTP client (in the `thingsync` binary crate) and against mocks.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockThingApi` is exported behind
//!   the default `test-export-mocks` feature so integration tests and
//!   downstream crates can script exact call sequences.
//!
//! ## Errors
//! - Every method returns [`ApiResult`]; implementors box their own error
//!   types. Any error is fatal to the run: the publisher never retries.

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attachment::AttachmentKind;
use crate::error::ApiResult;

/// Field of an upload slot naming the finalize callback URL.
pub const FINALIZE_URL_FIELD: &str = "success_action_redirect";

/// The parts of a remote thing the publisher cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThingSummary {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// A presigned upload destination handed out by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSlot {
    /// Where the multipart upload goes.
    pub action: String,
    /// Form fields to send along with the file; also the finalize body.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl UploadSlot {
    /// The callback that turns an uploaded blob into an attachment.
    pub fn finalize_url(&self) -> Option<&str> {
        self.fields.get(FINALIZE_URL_FIELD).and_then(Value::as_str)
    }
}

/// Remote operations needed to publish a thing and its attachments.
///
/// Implemented by the HTTP client and by test mocks. All calls are awaited
/// one at a time by the publisher.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ThingApi: Send + Sync {
    /// `GET /users/{username}/things`
    async fn list_user_things(&self, username: &str) -> ApiResult<Vec<ThingSummary>>;

    /// `POST /things` with the metadata payload. Returns the created thing.
    async fn create_thing(&self, metadata: &Value) -> ApiResult<ThingSummary>;

    /// `PATCH /things/{id}` with the metadata payload.
    async fn update_thing(&self, thing_id: u64, metadata: &Value) -> ApiResult<()>;

    /// `GET /things/{id}/{files|images}/{attachment_id}`
    async fn get_attachment(
        &self,
        thing_id: u64,
        kind: AttachmentKind,
        attachment_id: u64,
    ) -> ApiResult<Value>;

    /// `DELETE /things/{id}/{files|images}/{attachment_id}`
    async fn delete_attachment(
        &self,
        thing_id: u64,
        kind: AttachmentKind,
        attachment_id: u64,
    ) -> ApiResult<()>;

    /// `POST /things/{id}/files` with `{"filename": ...}`.
    async fn request_upload_slot(&self, thing_id: u64, filename: &str) -> ApiResult<UploadSlot>;

    /// Multipart `POST` of `content` plus the slot fields to the slot's `action` URL.
    async fn upload_to_slot(
        &self,
        slot: &UploadSlot,
        filename: &str,
        content: Vec<u8>,
    ) -> ApiResult<()>;

    /// `POST` of the slot fields to the finalize URL. Returns the attachment metadata.
    async fn finalize_upload(&self, slot: &UploadSlot) -> ApiResult<Value>;
}
