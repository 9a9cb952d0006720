use super::schema::parse_args;
use super::ToolContext;
use crate::core::error::ToolError;
use crate::core::pdf::format_file_size;
use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

pub const DEFAULT_MAX_PAGES: u32 = 10;
pub const MAX_PAGES: u32 = 100;
const PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOperation {
    ViewPdf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewPdfArgs {
    file_path: PathBuf,
    max_pages: u32,
    include_metadata: bool,
    include_text_preview: bool,
}

impl DocumentOperation {
    pub const ALL: [DocumentOperation; 1] = [DocumentOperation::ViewPdf];

    pub fn name(self) -> &'static str {
        match self {
            DocumentOperation::ViewPdf => "view_pdf",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DocumentOperation::ViewPdf => {
                "Extract and view text from a local PDF with file information, page count, optional metadata and a text preview."
            }
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            DocumentOperation::ViewPdf => json!({
                "type": "object",
                "properties": {
                    "filePath": {"type": "string", "minLength": 1, "description": "Path to the PDF file"},
                    "maxPages": {"type": "integer", "minimum": 1, "maximum": MAX_PAGES, "default": DEFAULT_MAX_PAGES},
                    "includeMetadata": {"type": "boolean", "default": true},
                    "includeTextPreview": {"type": "boolean", "default": true}
                },
                "required": ["filePath"],
                "additionalProperties": false
            }),
        }
    }

    pub async fn call(self, ctx: &ToolContext, args: Value) -> Result<String, ToolError> {
        match self {
            DocumentOperation::ViewPdf => {
                let args: ViewPdfArgs = parse_args(self.name(), args)?;
                let payload = view_pdf(ctx, &args).await?;
                serde_json::to_string_pretty(&payload)
                    .map_err(|err| ToolError::handler(err.to_string()))
            }
        }
    }
}

async fn view_pdf(ctx: &ToolContext, args: &ViewPdfArgs) -> Result<Value, ToolError> {
    let path = &args.file_path;
    let metadata = tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|metadata| metadata.is_file())
        .ok_or_else(|| ToolError::handler(format!("PDF file not found: {}", path.display())))?;
    if !has_pdf_extension(path) {
        return Err(ToolError::handler(format!(
            "File is not a PDF: {}",
            path.display()
        )));
    }

    let file_info = json!({
        "size": metadata.len(),
        "sizeFormatted": format_file_size(metadata.len()),
        "created": metadata.created().ok().map(iso_timestamp),
        "modified": metadata.modified().ok().map(iso_timestamp),
    });

    let extraction = match ctx.pdf.extract(path, args.max_pages).await {
        Ok(extraction) => extraction,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "PDF text extraction failed");
            return Ok(json!({
                "success": false,
                "filePath": path.display().to_string(),
                "fileInfo": file_info,
                "pdfInfo": {
                    "pageCount": 0,
                    "note": "Text extraction failed"
                },
                "content": format!(
                    "PDF file detected but text extraction failed. File size: {}",
                    format_file_size(metadata.len())
                ),
                "textPreview": "Text preview not available",
                "extractedPages": 0,
                "totalPages": 0,
                "method": format!("{} (failed)", ctx.pdf.method()),
                "error": err,
            }));
        }
    };

    let mut payload = json!({
        "success": true,
        "filePath": path.display().to_string(),
        "fileInfo": file_info,
        "pdfInfo": {
            "pageCount": extraction.page_count,
            "extractedPages": extraction.extracted_pages,
            "totalPages": extraction.page_count,
        },
        "content": extraction.text,
        "method": ctx.pdf.method(),
    });
    if args.include_metadata && !extraction.metadata.is_empty() {
        payload["pdfInfo"]["metadata"] = json!(extraction.metadata);
    }
    if args.include_text_preview {
        payload["textPreview"] = json!(text_preview(&extraction.text));
    }
    Ok(payload)
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn iso_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time).to_rfc3339()
}

fn text_preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
