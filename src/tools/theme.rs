//! Organization theme and logo tools.

use super::schema::{parse_args, HEX_COLOR_PATTERN};
use super::upload::default_file_name;
use super::ToolContext;
use crate::core::config::Config;
use crate::core::error::ToolError;
use crate::core::remote::{
    FileDocument, FileDocumentQuery, FileKind, ObjectType, PermissionType, UploadTarget,
};
use crate::core::upload::UploadRequest;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_LOGO_LIMIT: u32 = 10;
pub const MAX_LOGO_LIMIT: u32 = 50;

/// Keys callers tend to put in `theme` that belong in `themeTokens`.
const MISPLACED_THEME_FIELDS: [(&str, &str); 8] = [
    ("name", "Theme names should not be set in the theme object"),
    ("primaryColor", "Use themeTokens.ref.palette.primary50 instead"),
    ("secondaryColor", "Use themeTokens.ref.palette.supportOne50 instead"),
    ("backgroundColor", "Use themeTokens.comp.layout.backgroundColor instead"),
    ("textColor", "Use themeTokens.comp.layout.textColor instead"),
    ("fontColor", "Use themeTokens.comp.layout.textColor instead"),
    ("headerColor", "Use themeTokens.comp.layout.backgroundColor instead"),
    ("bodyColor", "Use themeTokens.comp.layout.backgroundColor instead"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeOperation {
    UpdateTheme,
    ListLogos,
    LogoDownloadUrl,
    VerifyLogo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateThemeArgs {
    organization_id: Option<String>,
    favicon_link: Option<String>,
    browser_tab_title: Option<String>,
    theme_tokens: Option<Map<String, Value>>,
    theme: Option<Map<String, Value>>,
    logo_file: Option<LogoFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogoFile {
    file_path: PathBuf,
    file_name: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListLogosArgs {
    organization_id: Option<String>,
    limit: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadUrlArgs {
    file_document_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyLogoArgs {
    organization_id: Option<String>,
}

impl ThemeOperation {
    pub const ALL: [ThemeOperation; 4] = [
        ThemeOperation::UpdateTheme,
        ThemeOperation::ListLogos,
        ThemeOperation::LogoDownloadUrl,
        ThemeOperation::VerifyLogo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ThemeOperation::UpdateTheme => "update_organization_theme",
            ThemeOperation::ListLogos => "list_organization_logos",
            ThemeOperation::LogoDownloadUrl => "get_logo_download_url",
            ThemeOperation::VerifyLogo => "verify_organization_logo",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ThemeOperation::UpdateTheme => {
                "Update organization theme, branding and logo. PRIMARY tool for organization logo uploads: a logoFile is uploaded and linked to the organization automatically. Colours go in themeTokens (ref.palette and comp.layout take #RRGGBB values); the theme object only accepts a few simple fields. organizationId defaults to the configured value."
            }
            ThemeOperation::ListLogos => {
                "List logo files associated with an organization (limit 1-50, default 10)."
            }
            ThemeOperation::LogoDownloadUrl => {
                "Get a temporary download URL for a logo file document."
            }
            ThemeOperation::VerifyLogo => {
                "Verify that an organization has a logo and show the most recent one."
            }
        }
    }

    pub fn input_schema(self) -> Value {
        let organization_id = json!({
            "type": "string",
            "description": "Organization ID; defaults to the configured value"
        });
        let hex_map = json!({
            "type": "object",
            "additionalProperties": {"type": "string", "pattern": HEX_COLOR_PATTERN}
        });
        match self {
            ThemeOperation::UpdateTheme => json!({
                "type": "object",
                "properties": {
                    "organizationId": organization_id,
                    "faviconLink": {"type": "string"},
                    "browserTabTitle": {"type": "string"},
                    "themeTokens": {
                        "type": "object",
                        "properties": {
                            "ref": {
                                "type": "object",
                                "properties": {"palette": hex_map}
                            },
                            "comp": {
                                "type": "object",
                                "properties": {"layout": hex_map}
                            }
                        }
                    },
                    "theme": {
                        "type": "object",
                        "description": "Simple theme settings such as sideBarColor; use themeTokens for colours"
                    },
                    "logoFile": {
                        "type": "object",
                        "properties": {
                            "filePath": {"type": "string", "minLength": 1},
                            "fileName": {"type": "string", "minLength": 1},
                            "userId": {"type": "string"}
                        },
                        "required": ["filePath"],
                        "additionalProperties": false
                    }
                },
                "additionalProperties": false
            }),
            ThemeOperation::ListLogos => json!({
                "type": "object",
                "properties": {
                    "organizationId": organization_id,
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_LOGO_LIMIT,
                        "default": DEFAULT_LOGO_LIMIT
                    }
                },
                "additionalProperties": false
            }),
            ThemeOperation::LogoDownloadUrl => json!({
                "type": "object",
                "properties": {
                    "fileDocumentId": {"type": "string", "minLength": 1}
                },
                "required": ["fileDocumentId"],
                "additionalProperties": false
            }),
            ThemeOperation::VerifyLogo => json!({
                "type": "object",
                "properties": {"organizationId": organization_id},
                "additionalProperties": false
            }),
        }
    }

    /// Checks the schema cannot express. Returns a violation message.
    pub fn argument_violations(self, args: &Value) -> Option<String> {
        match self {
            ThemeOperation::UpdateTheme => args
                .get("theme")
                .and_then(Value::as_object)
                .and_then(misplaced_theme_fields),
            ThemeOperation::ListLogos
            | ThemeOperation::LogoDownloadUrl
            | ThemeOperation::VerifyLogo => None,
        }
    }

    pub async fn call(self, ctx: &ToolContext, args: Value) -> Result<String, ToolError> {
        match self {
            ThemeOperation::UpdateTheme => {
                let args: UpdateThemeArgs = parse_args(self.name(), args)?;
                update_theme(ctx, args).await
            }
            ThemeOperation::ListLogos => {
                let args: ListLogosArgs = parse_args(self.name(), args)?;
                let config = ctx.config.get().await?;
                let organization_id = organization_or_default(args.organization_id, &config)?;
                let logos = ctx
                    .remote
                    .list_file_documents(&logo_query(&organization_id, args.limit))
                    .await?;
                if logos.is_empty() {
                    return Ok(format!("No logos found for organization {organization_id}"));
                }
                let listing = serde_json::to_string_pretty(&logos)
                    .map_err(|err| ToolError::handler(err.to_string()))?;
                Ok(format!(
                    "Found {} logo(s) for organization {organization_id}:\n\n{listing}",
                    logos.len()
                ))
            }
            ThemeOperation::LogoDownloadUrl => {
                let args: DownloadUrlArgs = parse_args(self.name(), args)?;
                let download = ctx
                    .remote
                    .request_download_url(&args.file_document_id)
                    .await?;
                Ok(format!(
                    "Download URL for file document {}:\n\n\
                     Download URL: {}\n\
                     Expires At: {}\n\n\
                     Note: This URL is temporary and will expire. Use it promptly to download the logo.",
                    args.file_document_id,
                    download.presigned_url,
                    download.expires_at.as_deref().unwrap_or("unknown")
                ))
            }
            ThemeOperation::VerifyLogo => {
                let args: VerifyLogoArgs = parse_args(self.name(), args)?;
                let config = ctx.config.get().await?;
                let organization_id = organization_or_default(args.organization_id, &config)?;
                let logos = ctx
                    .remote
                    .list_file_documents(&logo_query(&organization_id, 1))
                    .await?;
                match logos.first() {
                    Some(logo) => Ok(render_verified_logo(&organization_id, logo)),
                    None => Ok(format!("No logo found for organization {organization_id}")),
                }
            }
        }
    }
}

async fn update_theme(ctx: &ToolContext, args: UpdateThemeArgs) -> Result<String, ToolError> {
    let config = ctx.config.get().await?;
    let organization_id = organization_or_default(args.organization_id, &config)?;

    let mut input = Map::new();
    input.insert("organizationId".to_string(), json!(organization_id));
    if let Some(link) = &args.favicon_link {
        input.insert("faviconLink".to_string(), json!(link));
    }
    if let Some(title) = &args.browser_tab_title {
        input.insert("browserTabTitle".to_string(), json!(title));
    }
    if let Some(tokens) = &args.theme_tokens {
        input.insert("themeTokens".to_string(), Value::Object(tokens.clone()));
    }
    if let Some(theme) = &args.theme {
        input.insert("theme".to_string(), Value::Object(theme.clone()));
    }
    let has_settings = input.len() > 1;

    if !has_settings && args.logo_file.is_none() {
        return Err(ToolError::ValidationError {
            operation: ThemeOperation::UpdateTheme.name().to_string(),
            details: "nothing to update; pass logoFile, themeTokens, theme, faviconLink or browserTabTitle"
                .to_string(),
        });
    }

    let mut sections = Vec::new();
    let mut organization_name = None;

    if let Some(logo) = args.logo_file {
        let user_id = match logo.user_id {
            Some(id) => id,
            None => config.user_id()?.to_string(),
        };
        let file_name = match logo.file_name {
            Some(name) => name,
            None => default_file_name(&logo.file_path)?,
        };
        let request = UploadRequest {
            target: UploadTarget {
                object_type: ObjectType::Organization,
                object_id: organization_id.clone(),
                file_name,
                kind: FileKind::Logo,
                user_id,
                permission: PermissionType::Public,
            },
            path: logo.file_path,
            link_to_owner: true,
        };
        let report = ctx.uploads().run(&request).await?;
        if let Some(organization) = &report.linked_organization {
            organization_name = organization.name.clone();
        }
        let payload = serde_json::to_string_pretty(&report.to_json(&request.path))
            .map_err(|err| ToolError::handler(err.to_string()))?;
        sections.push(format!("Logo upload:\n{payload}"));
    }

    if has_settings {
        debug!(organization = %organization_id, "Updating organization theme");
        let organization = ctx.remote.update_organization(Value::Object(input)).await?;
        if organization.name.is_some() {
            organization_name = organization.name;
        }
    }

    let updated = |present: bool| if present { "Updated" } else { "Not updated" };
    let mut text = format!(
        "Success! Organization theme updated successfully.\n\n\
         Organization ID: {organization_id}\n\
         Organization Name: {}\n\n\
         Updated Settings:\n\
         - Favicon Link: {}\n\
         - Browser Tab Title: {}\n\
         - Theme Tokens: {}\n\
         - Theme: {}",
        organization_name.as_deref().unwrap_or("Unknown"),
        args.favicon_link.as_deref().unwrap_or("Not updated"),
        args.browser_tab_title.as_deref().unwrap_or("Not updated"),
        updated(args.theme_tokens.is_some()),
        updated(args.theme.is_some()),
    );
    for section in sections {
        text.push_str("\n\n");
        text.push_str(&section);
    }
    Ok(text)
}

fn organization_or_default(explicit: Option<String>, config: &Config) -> Result<String, ToolError> {
    match explicit {
        Some(id) => Ok(id),
        None => Ok(config.organization_id()?.to_string()),
    }
}

fn logo_query(organization_id: &str, limit: u32) -> FileDocumentQuery {
    FileDocumentQuery {
        object_type: ObjectType::Organization,
        object_id: organization_id.to_string(),
        kind: FileKind::Logo,
        limit,
    }
}

fn render_verified_logo(organization_id: &str, logo: &FileDocument) -> String {
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "unknown".to_string());
    format!(
        "Logo verified for organization {organization_id}:\n\n\
         Logo Details:\n\
         - ID: {}\n\
         - Name: {}\n\
         - File Name: {}\n\
         - Type: {}\n\
         - Permission: {}\n\
         - Created: {}\n\n\
         The organization has a valid logo file.",
        logo.id,
        show(&logo.name),
        show(&logo.file_name),
        show(&logo.kind),
        show(&logo.permission_type),
        show(&logo.created_at),
    )
}

fn misplaced_theme_fields(theme: &Map<String, Value>) -> Option<String> {
    let found: Vec<(&str, &str)> = MISPLACED_THEME_FIELDS
        .iter()
        .filter(|(field, _)| theme.contains_key(*field))
        .copied()
        .collect();
    if found.is_empty() {
        return None;
    }
    let names: Vec<&str> = found.iter().map(|(field, _)| *field).collect();
    let hints: Vec<String> = found
        .iter()
        .map(|(field, hint)| format!("- {field}: {hint}"))
        .collect();
    Some(format!(
        "Invalid fields found in theme object: {}. These fields belong in themeTokens:\n{}\n\
         Example: themeTokens: {{ ref: {{ palette: {{ primary50: '#888888' }} }}, comp: {{ layout: {{ backgroundColor: '#f0f0f0', textColor: '#222222' }} }} }}",
        names.join(", "),
        hints.join("\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::{compile, violations};

    #[test]
    fn misplaced_theme_fields_get_suggestions() {
        let args = json!({"theme": {"primaryColor": "#112233", "sideBarColor": "#888888"}});
        let message = ThemeOperation::UpdateTheme
            .argument_violations(&args)
            .expect("violation");
        assert!(message.contains("primaryColor"));
        assert!(message.contains("themeTokens.ref.palette.primary50"));
        assert!(!message.contains("sideBarColor"));

        let ok = json!({"theme": {"sideBarColor": "#888888"}});
        assert!(ThemeOperation::UpdateTheme.argument_violations(&ok).is_none());
    }

    #[test]
    fn theme_token_colours_must_be_hex() {
        let validator =
            compile(&ThemeOperation::UpdateTheme.input_schema()).expect("schema compiles");
        let bad = json!({"themeTokens": {"comp": {"layout": {"textColor": "red"}}}});
        assert!(violations(&validator, &bad).is_some());
        let good = json!({"themeTokens": {"ref": {"palette": {"primary50": "#A0b1C2"}}}});
        assert!(violations(&validator, &good).is_none());
    }

    #[test]
    fn logo_limit_is_bounded() {
        let validator = compile(&ThemeOperation::ListLogos.input_schema()).expect("schema");
        assert!(violations(&validator, &json!({"limit": 0})).is_some());
        assert!(violations(&validator, &json!({"limit": 51})).is_some());
        assert!(violations(&validator, &json!({"limit": 50})).is_none());
    }
}
