use cloudmirror_transfer::TransferReport;
use serde_json::json;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
    /// Prints the outcome of a finished operation
    fn report(&self, operation: &str, report: &TransferReport);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {
        // Human formatter doesn't print JSON
    }
    fn report(&self, operation: &str, report: &TransferReport) {
        self.success(&summary(operation, report));
        for (path, reason) in &report.skipped {
            self.info(&format!("skipped {path} ({reason})"));
        }
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!("{}", value);
    }
    fn report(&self, operation: &str, report: &TransferReport) {
        self.print_json(&report_json(operation, report));
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

/// One-line description of a finished operation
pub fn summary(operation: &str, report: &TransferReport) -> String {
    let mut parts = Vec::new();
    if operation == "delete" {
        parts.push(format!("{} entries deleted", report.entries_deleted));
    } else {
        parts.push(format!(
            "{} files ({})",
            report.files_transferred,
            format_bytes(report.bytes_transferred)
        ));
        if report.folders_created > 0 {
            parts.push(format!("{} folders created", report.folders_created));
        }
    }
    if !report.skipped.is_empty() {
        parts.push(format!("{} skipped", report.skipped.len()));
    }

    let mut title = operation.to_string();
    if let Some(first) = title.get_mut(..1) {
        first.make_ascii_uppercase();
    }
    format!("{} complete: {}", title, parts.join(", "))
}

pub fn report_json(operation: &str, report: &TransferReport) -> serde_json::Value {
    let skipped: Vec<_> = report
        .skipped
        .iter()
        .map(|(path, reason)| json!({"path": path, "reason": reason}))
        .collect();
    json!({
        "success": true,
        "operation": operation,
        "files_transferred": report.files_transferred,
        "bytes_transferred": report.bytes_transferred,
        "folders_created": report.folders_created,
        "entries_deleted": report.entries_deleted,
        "skipped": skipped,
    })
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KiB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
