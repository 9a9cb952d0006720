use super::{
    DownloadUrl, FileDocument, FileDocumentQuery, OrganizationSummary, RemoteApi, RemoteError,
    TransferStatus, UploadTarget, WriteLocation,
};
use crate::core::config::{ConfigStore, GRAPHQL_ENDPOINT};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const AUTH_HEADER: &str = "Authorization-API";
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

const FETCH_UPLOAD_URL: &str = r#"
query fetchFileUploadUrl($input: FetchFileUploadUrlInput!) {
  fetchFileUploadUrl(input: $input) {
    temporarySignedURL
    timestamp
  }
}"#;

const CREATE_FILE_DOCUMENT: &str = r#"
mutation createFileDocument($input: CreateFileDocumentInput!) {
  createFileDocument(input: $input) {
    fileDocument {
      id
      name
      fileName
      s3Key
      type
    }
  }
}"#;

const UPDATE_ORGANIZATION: &str = r#"
mutation updateOrganization($input: UpdateOrganizationInput!) {
  updateOrganization(input: $input) {
    organization {
      id
      name
    }
  }
}"#;

const FILE_DOCUMENTS: &str = r#"
query fileDocuments($input: FileDocumentsInput!) {
  fileDocuments(input: $input) {
    fileDocuments {
      id
      name
      fileName
      type
      permissionType
      createdAt
    }
  }
}"#;

const REQUEST_DOWNLOAD_URL: &str = r#"
mutation requestPresignedDownloadUrl($input: RequestPresignedDownloadUrlInput!) {
  requestPresignedDownloadUrl(input: $input) {
    presignedUrl
    expiresAt
  }
}"#;

#[derive(Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphqlErrorEntry>>,
}

#[derive(Deserialize)]
struct GraphqlErrorEntry {
    #[serde(default)]
    message: Option<String>,
}

/// GraphQL client that reads credentials and limits from the shared
/// configuration store on every request.
pub struct GraphqlClient {
    http: reqwest::Client,
    config: Arc<ConfigStore>,
    endpoint: String,
}

impl GraphqlClient {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self::with_endpoint(config, GRAPHQL_ENDPOINT)
    }

    pub fn with_endpoint(config: Arc<ConfigStore>, endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            endpoint: endpoint.into(),
        }
    }

    /// Posts `{query, variables}` and returns the `data` member.
    ///
    /// Only failures to reach the server are re-sent, up to the configured
    /// retry count. HTTP and GraphQL level errors are returned immediately.
    pub async fn execute(&self, query: &str, variables: Value) -> Result<Value, RemoteError> {
        let config = self.config.get().await?;
        let api_key = config.api_key()?.to_string();
        let timeout = Duration::from_millis(config.timeout_ms);
        let payload = json!({ "query": query, "variables": variables });

        let mut attempt: u32 = 0;
        let response = loop {
            let result = self
                .http
                .post(&self.endpoint)
                .header(AUTH_HEADER, &api_key)
                .header(CONTENT_TYPE, "application/json")
                .timeout(timeout)
                .json(&payload)
                .send()
                .await;
            match result {
                Ok(response) => break response,
                Err(err) if err.is_connect() && attempt < config.retries => {
                    attempt += 1;
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        error = %err,
                        "GraphQL endpoint unreachable; retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(err) => return Err(RemoteError::Connection(err.to_string())),
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| RemoteError::Connection(err.to_string()))?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: truncate(&body, 300),
            });
        }

        let parsed: GraphqlResponse = serde_json::from_str(&body)
            .map_err(|err| RemoteError::InvalidResponse(err.to_string()))?;
        if let Some(errors) = parsed.errors.filter(|errors| !errors.is_empty()) {
            let messages: Vec<String> = errors
                .into_iter()
                .map(|entry| entry.message.unwrap_or_else(|| "Unknown error".to_string()))
                .collect();
            return Err(RemoteError::Graphql(format_graphql_errors(&messages)));
        }
        Ok(parsed.data.unwrap_or_else(|| json!({})))
    }
}

#[async_trait]
impl RemoteApi for GraphqlClient {
    async fn fetch_upload_location(
        &self,
        target: &UploadTarget,
    ) -> Result<WriteLocation, RemoteError> {
        let data = self
            .execute(
                FETCH_UPLOAD_URL,
                json!({
                    "input": {
                        "objectType": target.object_type,
                        "objectId": target.object_id,
                        "fileName": target.file_name,
                        "type": target.kind,
                        "userId": target.user_id,
                        "generateUniqueFileName": true,
                    }
                }),
            )
            .await?;
        let url = data
            .pointer("/fetchFileUploadUrl/temporarySignedURL")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                RemoteError::InvalidResponse("no temporarySignedURL in response".to_string())
            })?;
        let timestamp = data
            .pointer("/fetchFileUploadUrl/timestamp")
            .cloned()
            .unwrap_or(Value::Null);
        debug!(file = %target.file_name, "Upload location acquired");
        Ok(WriteLocation {
            url: url.to_string(),
            method: "PUT".to_string(),
            headers: vec![(
                "Content-Type".to_string(),
                "application/octet-stream".to_string(),
            )],
            timestamp,
        })
    }

    async fn transfer(
        &self,
        location: &WriteLocation,
        bytes: Vec<u8>,
    ) -> Result<TransferStatus, RemoteError> {
        let method = Method::from_bytes(location.method.as_bytes())
            .map_err(|err| RemoteError::InvalidResponse(err.to_string()))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &location.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| RemoteError::InvalidResponse(err.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| RemoteError::InvalidResponse(err.to_string()))?;
            headers.insert(name, value);
        }

        let size = bytes.len();
        let response = self
            .http
            .request(method, &location.url)
            .headers(headers)
            .timeout(TRANSFER_TIMEOUT)
            .body(bytes)
            .send()
            .await
            .map_err(|err| RemoteError::Connection(err.to_string()))?;
        let status = response.status();
        debug!(status = status.as_u16(), bytes = size, "Transfer finished");
        Ok(TransferStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown"),
        })
    }

    async fn create_file_document(
        &self,
        target: &UploadTarget,
        timestamp: &Value,
    ) -> Result<FileDocument, RemoteError> {
        let data = self
            .execute(
                CREATE_FILE_DOCUMENT,
                json!({
                    "input": {
                        "fileName": target.file_name,
                        "objectId": target.object_id,
                        "objectType": target.object_type,
                        "name": target.file_name,
                        "type": target.kind,
                        "permissionType": target.permission,
                        "sourceType": target.kind,
                        "timestamp": timestamp,
                    }
                }),
            )
            .await?;
        let document: FileDocument = extract(&data, "/createFileDocument/fileDocument")?;
        if document.id.is_empty() {
            return Err(RemoteError::InvalidResponse(
                "created file document has no id".to_string(),
            ));
        }
        Ok(document)
    }

    async fn update_organization(&self, input: Value) -> Result<OrganizationSummary, RemoteError> {
        let data = self
            .execute(UPDATE_ORGANIZATION, json!({ "input": input }))
            .await?;
        Ok(data
            .pointer("/updateOrganization/organization")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default())
    }

    async fn list_file_documents(
        &self,
        query: &FileDocumentQuery,
    ) -> Result<Vec<FileDocument>, RemoteError> {
        let data = self
            .execute(
                FILE_DOCUMENTS,
                json!({
                    "input": {
                        "objectType": query.object_type,
                        "objectId": query.object_id,
                        "type": query.kind,
                        "limit": query.limit,
                    }
                }),
            )
            .await?;
        match data.pointer("/fileDocuments/fileDocuments") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(_) => extract(&data, "/fileDocuments/fileDocuments"),
        }
    }

    async fn request_download_url(
        &self,
        file_document_id: &str,
    ) -> Result<DownloadUrl, RemoteError> {
        let data = self
            .execute(
                REQUEST_DOWNLOAD_URL,
                json!({ "input": { "fileDocumentId": file_document_id } }),
            )
            .await?;
        extract(&data, "/requestPresignedDownloadUrl")
    }
}

fn extract<T: DeserializeOwned>(data: &Value, pointer: &str) -> Result<T, RemoteError> {
    let value = data
        .pointer(pointer)
        .cloned()
        .ok_or_else(|| RemoteError::InvalidResponse(format!("missing {pointer} in response")))?;
    serde_json::from_value(value)
        .map_err(|err| RemoteError::InvalidResponse(format!("{pointer}: {err}")))
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

/// Rewrites schema errors such as `Field "x" is not defined by type "Y".`
/// into a shorter hint and joins all messages with `; `.
pub fn format_graphql_errors(messages: &[String]) -> String {
    messages
        .iter()
        .map(|message| rewrite_field_error(message).unwrap_or_else(|| message.clone()))
        .collect::<Vec<_>>()
        .join("; ")
}

fn rewrite_field_error(message: &str) -> Option<String> {
    if !message.contains("is not defined by type") {
        return None;
    }
    let field = quoted_after(message, "Field \"")?;
    let type_name = quoted_after(message, "type \"")?;
    let mut formatted = format!("Invalid field '{field}' in {type_name}");
    if let Some(suggestion) = quoted_after(message, "Did you mean \"") {
        formatted.push_str(&format!(". Did you mean '{suggestion}'?"));
    }
    Some(formatted)
}

fn quoted_after<'a>(message: &'a str, marker: &str) -> Option<&'a str> {
    let start = message.find(marker)? + marker.len();
    let rest = &message[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}
