//! XRPC client for the three calls the publisher needs.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{AutoPostError, Result};
use crate::http::{HttpRequest, HttpResponse, HttpTransport, DEFAULT_TIMEOUT};
use crate::models::{Credentials, Session};
use crate::record::{PostRecord, POST_COLLECTION};

pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social/xrpc/";

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const CREATE_RECORD: &str = "com.atproto.repo.createRecord";
const UPLOAD_BLOB: &str = "com.atproto.repo.uploadBlob";

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    did: String,
    access_jwt: String,
    #[serde(default)]
    handle: Option<String>,
}

#[derive(Serialize)]
struct CreateRecordRequest<'a> {
    repo: &'a str,
    collection: &'static str,
    record: &'a PostRecord,
}

/// Reference to the record created for a post.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRecord {
    pub uri: String,
    #[serde(default)]
    pub cid: Option<String>,
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    blob: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct BlueskyClient {
    transport: Arc<dyn HttpTransport>,
    service_url: String,
}

impl BlueskyClient {
    pub fn new(transport: Arc<dyn HttpTransport>, service_url: impl Into<String>) -> Self {
        let mut service_url = service_url.into();
        if !service_url.ends_with('/') {
            service_url.push('/');
        }

        Self {
            transport,
            service_url,
        }
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    fn endpoint(&self, nsid: &str) -> String {
        format!("{}{}", self.service_url, nsid)
    }

    pub async fn create_session(&self, credentials: &Credentials) -> Result<Session> {
        let request = HttpRequest::post(self.endpoint(CREATE_SESSION), DEFAULT_TIMEOUT).json(
            &CreateSessionRequest {
                identifier: &credentials.identifier,
                password: &credentials.secret,
            },
        )?;

        let response = self.transport.send(request).await?;
        let body: CreateSessionResponse = expect_ok(response)?.json()?;

        Ok(Session {
            did: body.did,
            access_jwt: body.access_jwt,
            handle: body.handle,
        })
    }

    /// Uploads raw bytes and returns the opaque blob reference.
    pub async fn upload_blob(
        &self,
        session: &Session,
        mime_type: &str,
        bytes: impl Into<Bytes>,
    ) -> Result<serde_json::Value> {
        let request = HttpRequest::post(self.endpoint(UPLOAD_BLOB), DEFAULT_TIMEOUT)
            .bearer(&session.access_jwt)
            .header("Content-Type", mime_type)
            .body(bytes);

        let response = self.transport.send(request).await?;
        let body: UploadBlobResponse = expect_ok(response)?.json()?;

        body.blob
            .ok_or_else(|| AutoPostError::Parse("No blob in upload response".to_string()))
    }

    pub async fn create_post(&self, session: &Session, record: &PostRecord) -> Result<CreatedRecord> {
        let request = HttpRequest::post(self.endpoint(CREATE_RECORD), DEFAULT_TIMEOUT)
            .bearer(&session.access_jwt)
            .json(&CreateRecordRequest {
                repo: &session.did,
                collection: POST_COLLECTION,
                record,
            })?;

        let response = self.transport.send(request).await?;
        let created: CreatedRecord = expect_ok(response)?.json()?;
        debug!("Created record {}", created.uri);

        Ok(created)
    }
}

fn expect_ok(response: HttpResponse) -> Result<HttpResponse> {
    if response.status != 200 {
        return Err(AutoPostError::Api {
            status: response.status,
            body: response.text(),
        });
    }
    Ok(response)
}
