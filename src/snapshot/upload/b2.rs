//! Backblaze B2 native API (v2) client.
//!
//! Only the calls a snapshot upload needs: account authorization, bucket
//! lookup by name, single-part upload and file version deletion for rollback.

use crate::snapshot::redacted::RedactedString;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::AddMsg;
use crate::snapshot::upload::{ObjectBucket, ObjectStore, RemoteObject};
use crate::snapshot::validate::validate_http_url;
use itertools::Itertools;
use reqwest::blocking::{Body, Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use validator::Validate;

pub static DEFAULT_API_URL: &str = "https://api.backblazeb2.com";
static DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Validate)]
#[serde(deny_unknown_fields)]
pub struct B2Config {
    /// Authorization endpoint; later calls use the API url it returns
    #[validate(custom(function = validate_http_url))]
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Per-request timeout, covering the whole transfer of one archive
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Default for B2Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct B2Store {
    client: Client,
    api_url: String,
}

impl B2Store {
    pub fn new(config: &B2Config) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct B2Session {
    account_id: String,
    api_url: String,
    authorization_token: RedactedString,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeAccountResponse {
    account_id: String,
    api_url: String,
    authorization_token: RedactedString,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsRequest<'a> {
    account_id: &'a str,
    bucket_name: &'a str,
}

#[derive(Deserialize)]
struct ListBucketsResponse {
    buckets: Vec<BucketInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketInfo {
    bucket_id: String,
    bucket_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlRequest<'a> {
    bucket_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlResponse {
    upload_url: String,
    authorization_token: RedactedString,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    file_id: String,
    file_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteFileVersionRequest<'a> {
    file_name: &'a str,
    file_id: &'a str,
}

/// Error body B2 sends with every non-2xx response
#[derive(Deserialize)]
struct ApiErrorBody {
    status: u16,
    code: String,
    message: String,
}

fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json()?);
    }

    let body = response.text().unwrap_or_default();
    match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(e) => Err(Error::b2_api(e.status, e.code, e.message)),
        Err(_) => Err(Error::b2_api(status.as_u16(), "unknown", body)),
    }
}

/// Percent-encodes each path segment of a file name, keeping `/`.
pub fn encode_file_name(name: &str) -> String {
    name.split('/')
        .map(|segment| url::form_urlencoded::byte_serialize(segment.as_bytes()).collect::<String>())
        .join("/")
}

/// Hex SHA-1 of the file and its length
fn sha1_and_len(path: &Path) -> Result<(String, u64)> {
    let mut hasher = Sha1::new();
    let len = std::io::copy(&mut File::open(path)?, &mut hasher)?;
    let hex = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();
    Ok((hex, len))
}

impl ObjectStore for B2Store {
    type Session = B2Session;
    type Bucket = B2Bucket;

    fn service_name(&self) -> &'static str {
        "B2"
    }

    fn authorize(&self, key_id: &str, key_secret: &RedactedString) -> Result<B2Session> {
        let url = format!("{}/b2api/v2/b2_authorize_account", self.api_url);
        debug!("Authorizing B2 key {} at {}", key_id, url);
        let response = self
            .client
            .get(&url)
            .basic_auth(key_id, Some(key_secret.inner()))
            .send()?;
        let auth: AuthorizeAccountResponse = parse_response(response)?;

        Ok(B2Session {
            account_id: auth.account_id,
            api_url: auth.api_url,
            authorization_token: auth.authorization_token,
        })
    }

    fn resolve_bucket(&self, session: &B2Session, bucket_name: &str) -> Result<B2Bucket> {
        let response = self
            .client
            .post(format!("{}/b2api/v2/b2_list_buckets", session.api_url))
            .header(AUTHORIZATION, session.authorization_token.inner())
            .json(&ListBucketsRequest {
                account_id: &session.account_id,
                bucket_name,
            })
            .send()?;
        let list: ListBucketsResponse = parse_response(response)?;

        let bucket = list
            .buckets
            .into_iter()
            .find(|b| b.bucket_name == bucket_name)
            .ok_or_else(|| Error::bucket_not_found(bucket_name))?;
        debug!("Resolved B2 bucket {} to {}", bucket.bucket_name, bucket.bucket_id);

        Ok(B2Bucket {
            client: self.client.clone(),
            session: session.clone(),
            bucket_id: bucket.bucket_id,
        })
    }
}

pub struct B2Bucket {
    client: Client,
    session: B2Session,
    bucket_id: String,
}

impl B2Bucket {
    fn get_upload_url(&self) -> Result<GetUploadUrlResponse> {
        let response = self
            .client
            .post(format!("{}/b2api/v2/b2_get_upload_url", self.session.api_url))
            .header(AUTHORIZATION, self.session.authorization_token.inner())
            .json(&GetUploadUrlRequest {
                bucket_id: &self.bucket_id,
            })
            .send()?;
        parse_response(response)
    }
}

impl ObjectBucket for B2Bucket {
    fn upload_file(&self, key: &str, path: &Path, content_type: &str) -> Result<RemoteObject> {
        let (sha1, len) = sha1_and_len(path)
            .add_msg(format!("Reading {:?} for upload failed", path))?;
        let upload = self.get_upload_url()?;
        debug!("Uploading {:?} ({} bytes, sha1 {}) as {}", path, len, sha1, key);

        let response = self
            .client
            .post(&upload.upload_url)
            .header(AUTHORIZATION, upload.authorization_token.inner())
            .header("X-Bz-File-Name", encode_file_name(key))
            .header(CONTENT_TYPE, content_type)
            .header("X-Bz-Content-Sha1", sha1)
            .body(Body::sized(File::open(path)?, len))
            .send()?;
        let info: FileInfo = parse_response(response)?;

        Ok(RemoteObject {
            key: info.file_name,
            id: info.file_id,
        })
    }

    fn delete(&self, object: &RemoteObject) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/b2api/v2/b2_delete_file_version", self.session.api_url))
            .header(AUTHORIZATION, self.session.authorization_token.inner())
            .json(&DeleteFileVersionRequest {
                file_name: &object.key,
                file_id: &object.id,
            })
            .send()?;
        let _: serde_json::Value = parse_response(response)?;
        Ok(())
    }
}
