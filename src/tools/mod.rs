//! Tool registries.
//!
//! Each capability group is a closed enum of operations. [`ToolGroup::ALL`]
//! fixes the order in which groups are listed and searched, and
//! [`Operation`] ties a resolved name to its group.

use crate::core::config::ConfigStore;
use crate::core::error::ToolError;
use crate::core::pdf::PdfInspector;
use crate::core::remote::RemoteApi;
use crate::core::upload::UploadWorkflow;
use rust_mcp_schema::{Tool, ToolInputSchema};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

pub mod config;
pub mod document;
pub mod schema;
pub mod theme;
pub mod upload;

pub use config::ConfigOperation;
pub use document::DocumentOperation;
pub use theme::ThemeOperation;
pub use upload::UploadOperation;

/// Shared collaborators handed to every handler.
#[derive(Clone)]
pub struct ToolContext {
    pub config: Arc<ConfigStore>,
    pub remote: Arc<dyn RemoteApi>,
    pub pdf: Arc<dyn PdfInspector>,
}

impl ToolContext {
    pub fn new(
        config: Arc<ConfigStore>,
        remote: Arc<dyn RemoteApi>,
        pdf: Arc<dyn PdfInspector>,
    ) -> Self {
        Self {
            config,
            remote,
            pdf,
        }
    }

    pub fn uploads(&self) -> UploadWorkflow {
        UploadWorkflow::new(self.remote.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolGroup {
    Theme,
    Upload,
    Document,
    Config,
}

impl ToolGroup {
    pub const ALL: [ToolGroup; 4] = [
        ToolGroup::Theme,
        ToolGroup::Upload,
        ToolGroup::Document,
        ToolGroup::Config,
    ];

    pub fn list_operations(self) -> Vec<Operation> {
        match self {
            ToolGroup::Theme => ThemeOperation::ALL.into_iter().map(Operation::Theme).collect(),
            ToolGroup::Upload => UploadOperation::ALL
                .into_iter()
                .map(Operation::Upload)
                .collect(),
            ToolGroup::Document => DocumentOperation::ALL
                .into_iter()
                .map(Operation::Document)
                .collect(),
            ToolGroup::Config => ConfigOperation::ALL
                .into_iter()
                .map(Operation::Config)
                .collect(),
        }
    }

    pub fn owns_operation(self, name: &str) -> bool {
        self.list_operations().iter().any(|op| op.name() == name)
    }

    /// Configuration tools must work before anything is configured.
    pub fn requires_configuration(self) -> bool {
        !matches!(self, ToolGroup::Config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Theme(ThemeOperation),
    Upload(UploadOperation),
    Document(DocumentOperation),
    Config(ConfigOperation),
}

impl Operation {
    /// Every operation, in registry order.
    pub fn all() -> Vec<Operation> {
        ToolGroup::ALL
            .into_iter()
            .flat_map(ToolGroup::list_operations)
            .collect()
    }

    pub fn resolve(name: &str) -> Option<Operation> {
        ToolGroup::ALL
            .into_iter()
            .find(|group| group.owns_operation(name))
            .and_then(|group| {
                group
                    .list_operations()
                    .into_iter()
                    .find(|op| op.name() == name)
            })
    }

    pub fn group(self) -> ToolGroup {
        match self {
            Operation::Theme(_) => ToolGroup::Theme,
            Operation::Upload(_) => ToolGroup::Upload,
            Operation::Document(_) => ToolGroup::Document,
            Operation::Config(_) => ToolGroup::Config,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::Theme(op) => op.name(),
            Operation::Upload(op) => op.name(),
            Operation::Document(op) => op.name(),
            Operation::Config(op) => op.name(),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Operation::Theme(op) => op.description(),
            Operation::Upload(op) => op.description(),
            Operation::Document(op) => op.description(),
            Operation::Config(op) => op.description(),
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            Operation::Theme(op) => op.input_schema(),
            Operation::Upload(op) => op.input_schema(),
            Operation::Document(op) => op.input_schema(),
            Operation::Config(op) => op.input_schema(),
        }
    }

    /// Semantic checks on top of the input schema.
    pub fn argument_violations(self, args: &Value) -> Option<String> {
        match self {
            Operation::Theme(op) => op.argument_violations(args),
            Operation::Upload(_) | Operation::Document(_) | Operation::Config(_) => None,
        }
    }

    /// Runs the handler with arguments that already passed validation.
    pub async fn call(self, ctx: ToolContext, args: Value) -> Result<String, ToolError> {
        match self {
            Operation::Theme(op) => op.call(&ctx, args).await,
            Operation::Upload(op) => op.call(&ctx, args).await,
            Operation::Document(op) => op.call(&ctx, args).await,
            Operation::Config(op) => op.call(&ctx, args).await,
        }
    }

    pub fn descriptor(self) -> Tool {
        let input_schema = serde_json::from_value::<ToolInputSchema>(self.input_schema())
            .unwrap_or_else(|err| {
                warn!(tool = self.name(), error = %err, "Input schema not representable");
                ToolInputSchema::new(Vec::new(), None, None)
            });
        Tool {
            annotations: None,
            description: Some(self.description().to_string()),
            execution: None,
            icons: Vec::new(),
            input_schema,
            meta: None,
            name: self.name().to_string(),
            output_schema: None,
            title: None,
        }
    }
}
