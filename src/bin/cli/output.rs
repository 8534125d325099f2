//! Output formatting for CLI operations.

use serde_json::json;
use unrar_session::{ArchiveFormat, Entry, ExtractResult, WriteSummary};

/// Trait for output formatting
pub trait OutputFormatter {
    /// Formats a list of entries
    fn format_list(&self, format: ArchiveFormat, result: &ExtractResult) -> String;

    /// Formats extraction results
    fn format_extract_result(&self, result: &ExtractResult, summary: &WriteSummary) -> String;
}

/// Human-readable output formatter
pub struct HumanFormatter;

impl HumanFormatter {
    fn entry_line(entry: &Entry) -> String {
        if entry.is_directory {
            format!("📁 {}/\n", entry.name)
        } else {
            let lock = if entry.is_encrypted { " 🔒" } else { "" };
            format!("📄 {} ({}){}\n", entry.name, humanize_bytes(entry.size), lock)
        }
    }

    fn failures(result: &ExtractResult) -> String {
        let mut output = String::new();
        if !result.failures.is_empty() {
            output.push_str("\nFailures:\n");
            for failure in &result.failures {
                let name = if failure.name.is_empty() {
                    "<archive>"
                } else {
                    &failure.name
                };
                output.push_str(&format!("  {}: {}\n", name, failure.error));
            }
        }
        output
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_list(&self, format: ArchiveFormat, result: &ExtractResult) -> String {
        let mut output = String::new();
        output.push_str(&format!("Format: {}\n", format));
        output.push_str(&"-".repeat(50));
        output.push('\n');

        let mut total_size = 0u64;
        for entry in &result.entries {
            if !entry.is_directory {
                total_size += entry.size;
            }
            output.push_str(&Self::entry_line(entry));
        }

        output.push_str(&"-".repeat(50));
        output.push('\n');
        output.push_str(&format!(
            "{} files, {} directories, {} total\n",
            result.files(),
            result.directories(),
            humanize_bytes(total_size)
        ));
        output.push_str(&Self::failures(result));
        output
    }

    fn format_extract_result(&self, result: &ExtractResult, summary: &WriteSummary) -> String {
        let mut output = String::new();
        for entry in &result.entries {
            output.push_str(&Self::entry_line(entry));
        }

        if result.is_ok() {
            output.push_str(&format!(
                "\n✅ Extracted {} files ({})\n",
                summary.files,
                humanize_bytes(summary.bytes_written)
            ));
        } else {
            output.push_str("\nExtraction completed with errors:\n");
            output.push_str(&format!("  Written: {}\n", summary.files));
            output.push_str(&format!("  Failed:  {}\n", result.failures.len()));
            output.push_str(&Self::failures(result));
        }
        if summary.skipped > 0 {
            output.push_str(&format!("Skipped {} entries without content\n", summary.skipped));
        }
        output
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl JsonFormatter {
    fn entries(result: &ExtractResult) -> Vec<serde_json::Value> {
        result
            .entries
            .iter()
            .map(|e| {
                json!({
                    "name": e.name,
                    "size": e.size,
                    "is_directory": e.is_directory,
                    "encrypted": e.is_encrypted,
                })
            })
            .collect()
    }

    fn failures(result: &ExtractResult) -> Vec<serde_json::Value> {
        result
            .failures
            .iter()
            .map(|f| json!({"name": f.name, "error": f.error.to_string()}))
            .collect()
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_list(&self, format: ArchiveFormat, result: &ExtractResult) -> String {
        let obj = json!({
            "format": format.name(),
            "complete": result.termination.is_some_and(|t| t.is_complete()),
            "entries": Self::entries(result),
            "failures": Self::failures(result),
        });
        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_extract_result(&self, result: &ExtractResult, summary: &WriteSummary) -> String {
        let obj = json!({
            "success": result.is_ok(),
            "entries": Self::entries(result),
            "files_written": summary.files,
            "directories_created": summary.directories,
            "bytes_written": summary.bytes_written,
            "failures": Self::failures(result),
        });
        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Creates the appropriate formatter based on output format
pub fn create_formatter(format: super::OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        super::OutputFormat::Human => Box::new(HumanFormatter),
        super::OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Converts bytes to a human-readable string
pub fn humanize_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
