#![doc = "HTTP client for the thing hosting platform: bridges the core `ThingApi` trait to the REST API."]
//
//! # Upload client (CLI <-> Core)
//!
//! [`ThingClient`] implements [`thingsync_core::contract::ThingApi`] with
//! `reqwest`. The publisher in `thingsync-core` drives it; this module only
//! knows how each operation maps onto the platform's endpoints.
//!
//! - API calls carry `Authorization: Bearer <token>` and a JSON content type.
//! - The binary upload goes to the presigned `action` URL of an upload slot,
//!   which is authorized by the slot's form fields, so it carries no token.
//! - Any non-2xx response becomes [`ClientError::Status`] with the response
//!   body attached. Nothing is retried.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use thingsync_core::attachment::AttachmentKind;
use thingsync_core::config::Credentials;
use thingsync_core::contract::{ThingApi, ThingSummary, UploadSlot, FINALIZE_URL_FIELD};
use thingsync_core::error::ApiResult;

/// Errors raised by [`ThingClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure or undecodable response body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// REST client for one account on the platform.
#[derive(Debug, Clone)]
pub struct ThingClient {
    http: Client,
    base_url: String,
    token: String,
}

impl ThingClient {
    pub fn new(base_url: &str, credentials: &Credentials) -> ClientResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("thingsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        tracing::info!(
            base_url,
            username = %credentials.username,
            token_set = !credentials.bearer_token.is_empty(),
            "Initialized ThingClient"
        );
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: credentials.bearer_token.clone(),
        })
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// API path of a single attachment.
    pub fn attachment_path(thing_id: u64, kind: AttachmentKind, attachment_id: u64) -> String {
        format!("things/{thing_id}/{}/{attachment_id}", kind.collection())
    }

    /// Request to the API with bearer auth and the JSON content type already set.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_url(method, &self.url(path))
    }

    fn request_url(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
    }

    /// Sends a request and fails on any non-2xx status.
    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let request = request.build()?;
        let method = request.method().clone();
        let response = self.http.execute(request).await.map_err(|e| {
            tracing::error!(error = ?e, %method, "Request failed before a response arrived");
            ClientError::Http(e)
        })?;
        ensure_success(method, response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }
}

async fn ensure_success(method: Method, response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        tracing::debug!(%method, url = %response.url(), %status, "Request succeeded");
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
    tracing::error!(%method, url = %url, %status, body = %body, "API returned error status");
    Err(ClientError::Status {
        method,
        url,
        status,
        body,
    })
}

/// Form field values must be strings; non-string JSON is sent in its JSON text form.
fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Serialize)]
struct SlotRequest<'a> {
    filename: &'a str,
}

#[async_trait]
impl ThingApi for ThingClient {
    async fn list_user_things(&self, username: &str) -> ApiResult<Vec<ThingSummary>> {
        tracing::info!(username, "Listing things owned by user");
        let things: Vec<ThingSummary> = self
            .send_json(self.request(Method::GET, &format!("users/{username}/things")))
            .await?;
        tracing::info!(count = things.len(), "Fetched user things");
        Ok(things)
    }

    async fn create_thing(&self, metadata: &Value) -> ApiResult<ThingSummary> {
        tracing::info!(name = %metadata["name"], "Creating thing");
        let created: ThingSummary = self
            .send_json(self.request(Method::POST, "things").json(metadata))
            .await?;
        tracing::info!(thing_id = created.id, "Successfully created thing");
        Ok(created)
    }

    async fn update_thing(&self, thing_id: u64, metadata: &Value) -> ApiResult<()> {
        tracing::info!(thing_id, "Updating thing metadata");
        self.send(self.request(Method::PATCH, &format!("things/{thing_id}")).json(metadata))
            .await?;
        Ok(())
    }

    async fn get_attachment(
        &self,
        thing_id: u64,
        kind: AttachmentKind,
        attachment_id: u64,
    ) -> ApiResult<Value> {
        tracing::debug!(thing_id, %kind, attachment_id, "Fetching attachment");
        let path = Self::attachment_path(thing_id, kind, attachment_id);
        Ok(self.send_json(self.request(Method::GET, &path)).await?)
    }

    async fn delete_attachment(
        &self,
        thing_id: u64,
        kind: AttachmentKind,
        attachment_id: u64,
    ) -> ApiResult<()> {
        tracing::info!(thing_id, %kind, attachment_id, "Deleting attachment");
        let path = Self::attachment_path(thing_id, kind, attachment_id);
        self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn request_upload_slot(&self, thing_id: u64, filename: &str) -> ApiResult<UploadSlot> {
        tracing::info!(thing_id, filename, "Requesting upload slot");
        let request = self
            .request(Method::POST, &format!("things/{thing_id}/files"))
            .json(&SlotRequest { filename });
        let slot: UploadSlot = self.send_json(request).await?;
        Ok(slot)
    }

    async fn upload_to_slot(
        &self,
        slot: &UploadSlot,
        filename: &str,
        content: Vec<u8>,
    ) -> ApiResult<()> {
        let size = content.len();
        tracing::info!(filename, size, action = %slot.action, "Uploading file content");

        // The file part must come after the policy fields.
        let form = slot
            .fields
            .iter()
            .fold(Form::new(), |form, (key, value)| {
                form.text(key.clone(), form_value(value))
            })
            .part(
                "file",
                Part::bytes(content)
                    .file_name(filename.to_string())
                    .mime_str("application/octet-stream")
                    .map_err(ClientError::Http)?,
            );

        let response = self
            .http
            .post(&slot.action)
            .multipart(form)
            .send()
            .await
            .map_err(ClientError::Http)?;
        ensure_success(Method::POST, response).await?;
        tracing::info!(filename, size, "Uploaded file content");
        Ok(())
    }

    async fn finalize_upload(&self, slot: &UploadSlot) -> ApiResult<Value> {
        let url = slot.finalize_url().ok_or_else(|| {
            ClientError::InvalidResponse(format!("upload slot has no {FINALIZE_URL_FIELD}"))
        })?;
        tracing::info!(url, "Finalizing upload");
        let metadata: Value = self
            .send_json(self.request_url(Method::POST, url).json(&slot.fields))
            .await?;
        tracing::info!(attachment_id = %metadata["id"], "Upload finalized");
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base: &str) -> ThingClient {
        ThingClient::new(
            base,
            &Credentials {
                bearer_token: "t".into(),
                username: "alice".into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let c = client("https://api.example/");
        assert_eq!(c.url("things"), "https://api.example/things");
        assert_eq!(c.url("/users/alice/things"), "https://api.example/users/alice/things");
    }

    #[test]
    fn attachment_paths_follow_kind() {
        assert_eq!(
            ThingClient::attachment_path(5, AttachmentKind::File, 9),
            "things/5/files/9"
        );
        assert_eq!(
            ThingClient::attachment_path(5, AttachmentKind::Image, 9),
            "things/5/images/9"
        );
    }

    #[test]
    fn form_values_are_plain_strings() {
        assert_eq!(form_value(&json!("abc")), "abc");
        assert_eq!(form_value(&json!(12)), "12");
        assert_eq!(form_value(&json!(true)), "true");
    }
}
