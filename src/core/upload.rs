//! Four-step upload: acquire a write location, transfer the bytes, register
//! the file document and optionally link it to its owner.
//!
//! Steps 1-3 are fatal and stop the run with a step-specific [`ToolError`].
//! Step 4 is best effort: its failure is logged and reported in the report
//! while the upload as a whole still succeeds. Nothing is rolled back, so a
//! failure in step 3 leaves the transferred object unreferenced.

use crate::core::error::ToolError;
use crate::core::remote::{
    FileDocument, FileKind, ObjectType, OrganizationSummary, RemoteApi, UploadTarget,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub target: UploadTarget,
    /// Link the new document to its owner once registered. Only honoured for
    /// organization logos.
    pub link_to_owner: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: u8,
    pub name: &'static str,
    pub status: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepOutcome {
    fn completed(step: u8, name: &'static str) -> Self {
        Self {
            step,
            name,
            status: StepState::Completed,
            detail: None,
        }
    }

    fn with(step: u8, name: &'static str, status: StepState, detail: impl Into<String>) -> Self {
        Self {
            step,
            name,
            status,
            detail: Some(detail.into()),
        }
    }
}

const STEP_LOCATION: (u8, &str) = (1, "acquire_upload_location");
const STEP_TRANSFER: (u8, &str) = (2, "transfer_bytes");
const STEP_REGISTER: (u8, &str) = (3, "register_file_document");
const STEP_LINK: (u8, &str) = (4, "link_to_owner");

#[derive(Debug, Clone)]
pub struct UploadReport {
    pub document: FileDocument,
    pub steps: Vec<StepOutcome>,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: &'static str,
    pub linked_organization: Option<OrganizationSummary>,
}

impl UploadReport {
    pub fn link_failed(&self) -> bool {
        self.steps
            .iter()
            .any(|step| step.step == STEP_LINK.0 && step.status == StepState::Failed)
    }

    pub fn to_json(&self, original_path: &Path) -> Value {
        let message = if self.link_failed() {
            "File uploaded and registered, but linking it to the organization failed"
        } else {
            "File uploaded and processed successfully"
        };
        let mut payload = json!({
            "success": true,
            "message": message,
            "fileDocument": self.document,
            "steps": self.steps,
            "fileInfo": {
                "originalPath": original_path.display().to_string(),
                "fileName": self.file_name,
                "fileSize": self.file_size,
                "contentType": self.content_type,
            },
        });
        if let Some(organization) = &self.linked_organization {
            payload["linkedOrganization"] = json!({
                "id": organization.id,
                "name": organization.name,
            });
        }
        payload
    }
}

pub struct UploadWorkflow {
    remote: Arc<dyn RemoteApi>,
}

impl UploadWorkflow {
    pub fn new(remote: Arc<dyn RemoteApi>) -> Self {
        Self { remote }
    }

    pub async fn run(&self, request: &UploadRequest) -> Result<UploadReport, ToolError> {
        let target = &request.target;
        let metadata = tokio::fs::metadata(&request.path).await.map_err(|err| {
            ToolError::handler(format!(
                "File not found: {} ({err})",
                request.path.display()
            ))
        })?;
        if !metadata.is_file() {
            return Err(ToolError::handler(format!(
                "Not a regular file: {}",
                request.path.display()
            )));
        }

        info!(file = %target.file_name, kind = %target.kind, "Starting upload");
        let mut steps = Vec::with_capacity(4);

        let location = self
            .remote
            .fetch_upload_location(target)
            .await
            .map_err(|err| ToolError::UploadLocationError(err.to_string()))?;
        steps.push(StepOutcome::completed(STEP_LOCATION.0, STEP_LOCATION.1));

        let bytes = tokio::fs::read(&request.path).await.map_err(|err| {
            ToolError::handler(format!(
                "Failed to read {}: {err}",
                request.path.display()
            ))
        })?;
        let file_size = bytes.len() as u64;
        let status = self
            .remote
            .transfer(&location, bytes)
            .await
            .map_err(|err| ToolError::TransferError {
                status: 0,
                reason: err.to_string(),
            })?;
        if !status.is_success() {
            return Err(ToolError::TransferError {
                status: status.status,
                reason: status.reason.to_string(),
            });
        }
        steps.push(StepOutcome::completed(STEP_TRANSFER.0, STEP_TRANSFER.1));
        debug!(bytes = file_size, "File bytes transferred");

        let document = match self
            .remote
            .create_file_document(target, &location.timestamp)
            .await
        {
            Ok(document) => document,
            Err(err) => {
                warn!(
                    url = %location.url,
                    timestamp = %location.timestamp,
                    error = %err,
                    "Uploaded object left unregistered"
                );
                return Err(ToolError::MetadataRegistrationError(format!(
                    "{err}. The file was transferred (upload timestamp {}) but has no file document; re-run the upload to register it.",
                    location.timestamp
                )));
            }
        };
        steps.push(StepOutcome::completed(STEP_REGISTER.0, STEP_REGISTER.1));

        let mut linked_organization = None;
        let links_logo = target.kind == FileKind::Logo
            && target.object_type == ObjectType::Organization;
        if request.link_to_owner && links_logo {
            match self
                .remote
                .link_organization_logo(&target.object_id, &document.id)
                .await
            {
                Ok(organization) => {
                    steps.push(StepOutcome::completed(STEP_LINK.0, STEP_LINK.1));
                    linked_organization = Some(organization);
                }
                Err(err) => {
                    warn!(
                        organization = %target.object_id,
                        document = %document.id,
                        error = %err,
                        "Failed to link logo to organization"
                    );
                    steps.push(StepOutcome::with(
                        STEP_LINK.0,
                        STEP_LINK.1,
                        StepState::Failed,
                        err.to_string(),
                    ));
                }
            }
        } else {
            let reason = if request.link_to_owner {
                "only organization logos are linked"
            } else {
                "linking not requested"
            };
            steps.push(StepOutcome::with(
                STEP_LINK.0,
                STEP_LINK.1,
                StepState::Skipped,
                reason,
            ));
        }

        info!(document = %document.id, "Upload finished");
        Ok(UploadReport {
            document,
            steps,
            file_name: target.file_name.clone(),
            file_size,
            content_type: guess_content_type(&request.path),
            linked_organization,
        })
    }
}

pub fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("ico") => "image/vnd.microsoft.icon",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("html" | "htm") => "text/html",
        Some("json") => "application/json",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}
