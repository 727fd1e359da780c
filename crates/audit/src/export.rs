//! Audit export - CSV and JSON

use std::str::FromStr;

use crate::entry::AuditEntry;
use crate::error::{AuditError, AuditResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(AuditError::UnsupportedFormat(other.to_string())),
        }
    }
}

const CSV_HEADERS: [&str; 11] = [
    "id",
    "createdAt",
    "userId",
    "userRole",
    "action",
    "category",
    "entityType",
    "entityId",
    "description",
    "success",
    "errorMessage",
];

fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_row(entry: &AuditEntry) -> Vec<String> {
    vec![
        entry.id.clone(),
        entry.created_at.to_rfc3339(),
        entry.user_id.clone(),
        entry
            .user_role
            .map(|r| r.as_str().to_string())
            .unwrap_or_default(),
        entry.action.as_str().to_string(),
        entry.category.to_string(),
        entry.entity_type.clone(),
        entry.entity_id.clone(),
        entry.description.clone(),
        entry.success.to_string(),
        entry.error_message.clone().unwrap_or_default(),
    ]
}

/// Render entries in the requested format
pub fn export(entries: &[AuditEntry], format: ExportFormat) -> AuditResult<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(entries)?),
        ExportFormat::Csv => {
            let mut output = CSV_HEADERS.join(",");
            output.push('\n');
            for entry in entries {
                let fields: Vec<String> = csv_row(entry)
                    .iter()
                    .map(|f| escape_csv_field(f))
                    .collect();
                output.push_str(&fields.join(","));
                output.push('\n');
            }
            Ok(output)
        }
    }
}
