//! PDF inspection through the poppler command-line tools.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfExtraction {
    pub page_count: u32,
    pub extracted_pages: u32,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait PdfInspector: Send + Sync {
    async fn extract(&self, path: &Path, max_pages: u32) -> Result<PdfExtraction, String>;

    fn method(&self) -> &'static str;
}

/// Runs `pdfinfo` for page count and metadata, then `pdftotext` for the
/// first `max_pages` pages.
#[derive(Debug, Default, Clone)]
pub struct PopplerInspector;

const METADATA_KEYS: [(&str, &str); 7] = [
    ("Title", "title"),
    ("Author", "author"),
    ("Subject", "subject"),
    ("Creator", "creator"),
    ("Producer", "producer"),
    ("CreationDate", "creation_date"),
    ("ModDate", "modification_date"),
];

#[async_trait]
impl PdfInspector for PopplerInspector {
    async fn extract(&self, path: &Path, max_pages: u32) -> Result<PdfExtraction, String> {
        let info = run_tool(Command::new("pdfinfo").arg(path)).await?;
        let (page_count, metadata) = parse_pdfinfo(&info);
        let extracted_pages = page_count.min(max_pages);

        let text = if extracted_pages == 0 {
            String::new()
        } else {
            run_tool(
                Command::new("pdftotext")
                    .arg("-f")
                    .arg("1")
                    .arg("-l")
                    .arg(extracted_pages.to_string())
                    .arg("-layout")
                    .arg(path)
                    .arg("-"),
            )
            .await?
        };
        debug!(pages = page_count, extracted = extracted_pages, "PDF text extracted");

        Ok(PdfExtraction {
            page_count,
            extracted_pages,
            text,
            metadata,
        })
    }

    fn method(&self) -> &'static str {
        "pdftotext"
    }
}

async fn run_tool(command: &mut Command) -> Result<String, String> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| format!("Failed to run {program}: {err}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn parse_pdfinfo(output: &str) -> (u32, BTreeMap<String, String>) {
    let mut page_count = 0;
    let mut metadata = BTreeMap::new();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key == "Pages" {
            page_count = value.parse().unwrap_or(0);
            continue;
        }
        if let Some((_, name)) = METADATA_KEYS.iter().find(|(source, _)| *source == key) {
            if !value.is_empty() {
                metadata.insert(name.to_string(), value.to_string());
            }
        }
    }
    (page_count, metadata)
}

/// Formats a byte count with two decimals using binary units.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdfinfo_output_is_parsed() {
        let output = "Title:          Quarterly report\n\
                      Author:         \n\
                      Producer:       pdfTeX-1.40\n\
                      CreationDate:   Mon Jan  1 10:00:00 2024 UTC\n\
                      Pages:          12\n\
                      Page size:      612 x 792 pts (letter)\n";
        let (pages, metadata) = parse_pdfinfo(output);
        assert_eq!(pages, 12);
        assert_eq!(metadata.get("title").map(String::as_str), Some("Quarterly report"));
        assert_eq!(
            metadata.get("creation_date").map(String::as_str),
            Some("Mon Jan  1 10:00:00 2024 UTC")
        );
        assert!(!metadata.contains_key("author"));
    }

    #[test]
    fn file_sizes_use_binary_units() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512.00 Bytes");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MB");
    }
}
