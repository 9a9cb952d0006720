use super::ToolContext;
use crate::core::config::data::{
    looks_like_placeholder, mask_secret, path_display, Config, ConfigPatch, GRAPHQL_ENDPOINT,
    MAX_RETRIES, MAX_TIMEOUT_MS, MIN_TIMEOUT_MS,
};
use crate::core::error::ToolError;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOperation {
    Get,
    Set,
    Status,
    Reset,
}

impl ConfigOperation {
    pub const ALL: [ConfigOperation; 4] = [
        ConfigOperation::Get,
        ConfigOperation::Set,
        ConfigOperation::Status,
        ConfigOperation::Reset,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConfigOperation::Get => "config_get",
            ConfigOperation::Set => "config_set",
            ConfigOperation::Status => "config_status",
            ConfigOperation::Reset => "config_reset",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ConfigOperation::Get => "Get the current server configuration. The API key is masked.",
            ConfigOperation::Set => {
                "Update the server configuration. Only the fields you pass are changed; an empty string clears a field. Timeout is in milliseconds (1000-30000), retries 0-5. The GraphQL endpoint is fixed."
            }
            ConfigOperation::Status => "Check whether the configuration is complete and valid.",
            ConfigOperation::Reset => "Reset the configuration to defaults.",
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            ConfigOperation::Set => json!({
                "type": "object",
                "properties": {
                    "apiKey": {"type": "string", "description": "API key sent with every request"},
                    "organizationId": {"type": "string", "description": "Default organization ID"},
                    "userId": {"type": "string", "description": "Default user ID"},
                    "timeout": {"type": "integer", "description": "Request timeout in milliseconds (1000-30000)"},
                    "retries": {"type": "integer", "description": "Connection retry count (0-5)"},
                    "graphqlEndpoint": {"type": "string", "description": "Read only; must equal the built-in endpoint"}
                },
                "additionalProperties": false
            }),
            ConfigOperation::Get | ConfigOperation::Status | ConfigOperation::Reset => json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }

    pub async fn call(self, ctx: &ToolContext, args: Value) -> Result<String, ToolError> {
        match self {
            ConfigOperation::Get => {
                let config = ctx.config.get().await?;
                Ok(render_config(&config, &path_display(ctx.config.path())))
            }
            ConfigOperation::Set => {
                let patch = ConfigPatch::from_json(args)?;
                if patch.is_empty() {
                    return Ok("No configuration fields were provided; nothing changed.".to_string());
                }
                let updated = ctx.config.update(&patch).await?;
                Ok(format!(
                    "Configuration updated successfully. Updated fields: {}\n\n{}",
                    patch.updated_fields().join(", "),
                    render_config(&updated, &path_display(ctx.config.path()))
                ))
            }
            ConfigOperation::Status => {
                let config = ctx.config.get().await?;
                Ok(render_status(&config))
            }
            ConfigOperation::Reset => {
                ctx.config.reset().await?;
                Ok(format!(
                    "Configuration reset to defaults successfully.\n\n\
                     Default values:\n\
                     - API Key: (empty)\n\
                     - Organization ID: (empty)\n\
                     - User ID: (empty)\n\
                     - Timeout: {}ms\n\
                     - Retries: {}\n\n\
                     Please use config_set to configure your API key and other required settings.",
                    Config::default().timeout_ms,
                    Config::default().retries
                ))
            }
        }
    }
}

fn render_config(config: &Config, location: &str) -> String {
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "(not set)".to_string());
    format!(
        "Current MCP Server Configuration:\n\n\
         API Key: {}\n\
         GraphQL Endpoint: {GRAPHQL_ENDPOINT}\n\
         Organization ID: {}\n\
         User ID: {}\n\
         Timeout: {}ms\n\
         Retries: {}\n\
         Config File: {location}\n\n\
         Configuration Status: {}",
        config
            .api_key
            .as_deref()
            .map(mask_secret)
            .unwrap_or_else(|| "(not set)".to_string()),
        show(&config.organization_id),
        show(&config.user_id),
        config.timeout_ms,
        config.retries,
        if config.is_minimally_configured() {
            "Complete"
        } else {
            "Incomplete"
        }
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldState {
    Valid,
    Placeholder,
    Missing,
}

impl FieldState {
    fn of(value: Option<&str>) -> Self {
        match value {
            None => FieldState::Missing,
            Some(value) if looks_like_placeholder(value) => FieldState::Placeholder,
            Some(_) => FieldState::Valid,
        }
    }

    fn label(self) -> &'static str {
        match self {
            FieldState::Valid => "Present & Valid",
            FieldState::Placeholder => "Present but Invalid (placeholder value)",
            FieldState::Missing => "Missing",
        }
    }
}

fn render_status(config: &Config) -> String {
    let api_key = FieldState::of(config.api_key.as_deref());
    let organization = FieldState::of(config.organization_id.as_deref());
    let user = FieldState::of(config.user_id.as_deref());
    let all_valid = [api_key, organization, user]
        .iter()
        .all(|state| *state == FieldState::Valid);

    let overall = if config.is_fully_configured() && all_valid {
        "Fully Configured"
    } else if config.is_minimally_configured() {
        "Incomplete"
    } else {
        "Not Configured"
    };
    let next = if all_valid {
        "Ready to use!"
    } else {
        "Please complete configuration using the config_set tool."
    };

    format!(
        "Configuration Status:\n\n\
         Overall Status: {overall}\n\n\
         Field Status:\n\
         - API Key: {}\n\
         - Organization ID: {}\n\
         - User ID: {}\n\n\
         Settings:\n\
         - Timeout: {}ms (allowed {MIN_TIMEOUT_MS}-{MAX_TIMEOUT_MS})\n\
         - Retries: {} (allowed 0-{MAX_RETRIES})\n\n\
         {next}",
        api_key.label(),
        organization.label(),
        user.label(),
        config.timeout_ms,
        config.retries,
    )
}
