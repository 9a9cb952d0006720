//! Boundary to the remote GraphQL API and the object store it hands out
//! upload locations for.
//!
//! [`RemoteApi`] is the seam the upload workflow and the tool handlers talk
//! to; [`graphql::GraphqlClient`] is the production implementation.

use crate::core::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

pub mod graphql;

pub use graphql::GraphqlClient;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Config(#[from] ToolError),

    #[error("HTTP request failed: {0}")]
    Connection(String),

    #[error("HTTP request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GraphQL errors: {0}")]
    Graphql(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<RemoteError> for ToolError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Config(inner) => inner,
            other => ToolError::HandlerError(other.to_string()),
        }
    }
}

macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(ObjectType {
    Organization => "ORGANIZATION",
    User => "USER",
    Client => "CLIENT",
});

wire_enum!(FileKind {
    Avatar => "AVATAR",
    Document => "DOCUMENT",
    Image => "IMAGE",
    Logo => "LOGO",
});

wire_enum!(PermissionType {
    Public => "PUBLIC",
    Private => "PRIVATE",
    Restricted => "RESTRICTED",
});

/// What is being uploaded and who owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub object_type: ObjectType,
    pub object_id: String,
    pub file_name: String,
    pub kind: FileKind,
    pub user_id: String,
    pub permission: PermissionType,
}

/// Pre-authorized write location returned by the first upload step.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteLocation {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    /// Opaque value that must be echoed back when registering metadata.
    pub timestamp: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStatus {
    pub status: u16,
    pub reason: &'static str,
}

impl TransferStatus {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OrganizationSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrl {
    pub presigned_url: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDocumentQuery {
    pub object_type: ObjectType,
    pub object_id: String,
    pub kind: FileKind,
    pub limit: u32,
}

#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn fetch_upload_location(
        &self,
        target: &UploadTarget,
    ) -> Result<WriteLocation, RemoteError>;

    async fn transfer(
        &self,
        location: &WriteLocation,
        bytes: Vec<u8>,
    ) -> Result<TransferStatus, RemoteError>;

    async fn create_file_document(
        &self,
        target: &UploadTarget,
        timestamp: &Value,
    ) -> Result<FileDocument, RemoteError>;

    /// Sends an `UpdateOrganizationInput`; `input` must carry `organizationId`.
    async fn update_organization(&self, input: Value) -> Result<OrganizationSummary, RemoteError>;

    async fn list_file_documents(
        &self,
        query: &FileDocumentQuery,
    ) -> Result<Vec<FileDocument>, RemoteError>;

    async fn request_download_url(&self, file_document_id: &str)
        -> Result<DownloadUrl, RemoteError>;

    async fn link_organization_logo(
        &self,
        organization_id: &str,
        file_document_id: &str,
    ) -> Result<OrganizationSummary, RemoteError> {
        self.update_organization(json!({
            "organizationId": organization_id,
            "logoFileDocumentId": file_document_id,
        }))
        .await
    }
}
