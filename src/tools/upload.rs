use super::schema::parse_args;
use super::ToolContext;
use crate::core::error::ToolError;
use crate::core::remote::{FileKind, ObjectType, PermissionType, UploadTarget};
use crate::core::upload::UploadRequest;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOperation {
    UploadFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadFileArgs {
    file_path: PathBuf,
    file_name: Option<String>,
    object_type: ObjectType,
    object_id: Option<String>,
    file_type: FileKind,
    user_id: Option<String>,
    permission_type: PermissionType,
}

impl UploadOperation {
    pub const ALL: [UploadOperation; 1] = [UploadOperation::UploadFile];

    pub fn name(self) -> &'static str {
        match self {
            UploadOperation::UploadFile => "upload_file",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            UploadOperation::UploadFile => {
                "Upload a general file (document, avatar or image) and create its file document record. Do NOT use for organization logos; use update_organization_theme instead. objectId and userId default to the configured values."
            }
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            UploadOperation::UploadFile => json!({
                "type": "object",
                "properties": {
                    "filePath": {"type": "string", "minLength": 1, "description": "Path to the local file"},
                    "fileName": {"type": "string", "minLength": 1, "description": "Stored name; defaults to the file's own name"},
                    "objectType": {"type": "string", "enum": ["ORGANIZATION", "USER", "CLIENT"], "default": "ORGANIZATION"},
                    "objectId": {"type": "string", "description": "Owner ID; defaults to the configured organization ID"},
                    "fileType": {"type": "string", "enum": ["AVATAR", "DOCUMENT", "IMAGE"], "default": "DOCUMENT"},
                    "userId": {"type": "string", "description": "Uploading user; defaults to the configured user ID"},
                    "permissionType": {"type": "string", "enum": ["PUBLIC", "PRIVATE", "RESTRICTED"], "default": "PUBLIC"}
                },
                "required": ["filePath"],
                "additionalProperties": false
            }),
        }
    }

    pub async fn call(self, ctx: &ToolContext, args: Value) -> Result<String, ToolError> {
        match self {
            UploadOperation::UploadFile => {
                let args: UploadFileArgs = parse_args(self.name(), args)?;
                let config = ctx.config.get().await?;
                let object_id = match args.object_id {
                    Some(id) => id,
                    None => config.organization_id()?.to_string(),
                };
                let user_id = match args.user_id {
                    Some(id) => id,
                    None => config.user_id()?.to_string(),
                };
                let file_name = match args.file_name {
                    Some(name) => name,
                    None => default_file_name(&args.file_path)?,
                };

                let request = UploadRequest {
                    target: UploadTarget {
                        object_type: args.object_type,
                        object_id,
                        file_name,
                        kind: args.file_type,
                        user_id,
                        permission: args.permission_type,
                    },
                    path: args.file_path,
                    link_to_owner: false,
                };
                let report = ctx.uploads().run(&request).await?;
                let payload = report.to_json(&request.path);
                serde_json::to_string_pretty(&payload)
                    .map_err(|err| ToolError::handler(err.to_string()))
            }
        }
    }
}

pub(crate) fn default_file_name(path: &Path) -> Result<String, ToolError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ToolError::handler(format!(
                "Cannot derive a file name from {}; pass fileName explicitly",
                path.display()
            ))
        })
}
