//! Routes `tools/call` requests to the owning registry.
//!
//! Order of checks: resolve the name, require configuration for non-config
//! tools, reject placeholder identifiers, validate against the schema, then
//! run the handler. Every outcome becomes a `CallToolResult`; failures carry
//! `isError: true` and a readable message.

use crate::core::error::ToolError;
use crate::core::failures::{FailureTracker, FailureVerdict};
use crate::tools::schema::{apply_defaults, compile, find_placeholder_id, violations};
use crate::tools::{Operation, ToolContext};
use jsonschema::Validator;
use rust_mcp_schema::{CallToolResult, ContentBlock, TextContent, Tool};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct Dispatcher {
    ctx: ToolContext,
    tracker: Arc<FailureTracker>,
    validators: HashMap<&'static str, Validator>,
}

impl Dispatcher {
    pub fn new(ctx: ToolContext, tracker: Arc<FailureTracker>) -> Self {
        let mut validators = HashMap::new();
        for op in Operation::all() {
            match compile(&op.input_schema()) {
                Ok(validator) => {
                    validators.insert(op.name(), validator);
                }
                Err(err) => error!(tool = op.name(), error = %err, "Input schema failed to compile"),
            }
        }
        Self {
            ctx,
            tracker,
            validators,
        }
    }

    pub fn list_tools(&self) -> Vec<Tool> {
        Operation::all()
            .into_iter()
            .map(Operation::descriptor)
            .collect()
    }

    pub fn tracker(&self) -> &FailureTracker {
        &self.tracker
    }

    pub async fn invoke(&self, name: &str, arguments: Option<Map<String, Value>>) -> CallToolResult {
        match self.try_invoke(name, arguments).await {
            Ok(text) => text_result(text, false),
            Err(err) => {
                debug!(tool = %name, kind = err.kind(), "Tool call failed");
                text_result(format!("Error: {err}"), true)
            }
        }
    }

    async fn try_invoke(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<String, ToolError> {
        let op = Operation::resolve(name)
            .ok_or_else(|| ToolError::UnknownOperation(name.to_string()))?;

        if op.group().requires_configuration() && !self.ctx.config.is_minimally_configured().await?
        {
            return Err(ToolError::NotConfigured {
                operation: name.to_string(),
            });
        }

        let mut args = Value::Object(arguments.unwrap_or_default());

        if let Some((key, value)) = find_placeholder_id(&args) {
            let details = format!(
                "'{key}' has the placeholder value '{value}'. Omit {key} to use the configured default, or pass a real ID."
            );
            return Err(self.record_failure(name, details));
        }

        let validator = self.validators.get(name).ok_or_else(|| {
            ToolError::handler(format!("No input schema is available for {name}"))
        })?;
        let problems = violations(validator, &args).or_else(|| op.argument_violations(&args));
        if let Some(details) = problems {
            return Err(self.record_failure(name, details));
        }
        self.tracker.clear(name);

        apply_defaults(&op.input_schema(), &mut args);
        debug!(tool = %name, "Invoking tool handler");

        let ctx = self.ctx.clone();
        let handle = tokio::spawn(async move { op.call(ctx, args).await });
        match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                error!(tool = %name, error = %join_err, "Tool handler aborted");
                Err(ToolError::handler(format!(
                    "The {name} handler failed unexpectedly: {join_err}"
                )))
            }
        }
    }

    fn record_failure(&self, name: &str, details: String) -> ToolError {
        match self.tracker.record_failure(name, details.clone()) {
            FailureVerdict::Plain => ToolError::ValidationError {
                operation: name.to_string(),
                details,
            },
            FailureVerdict::Loop { attempts, history } => {
                warn!(tool = %name, attempts, "Repeated invalid calls detected");
                ToolError::LoopDetected {
                    operation: name.to_string(),
                    attempts,
                    history,
                }
            }
        }
    }
}

pub fn text_result(text: String, is_error: bool) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::TextContent(TextContent::new(text, None, None))],
        is_error: Some(is_error),
        meta: None,
        structured_content: None,
    }
}

#[cfg(test)]
mod tests;
