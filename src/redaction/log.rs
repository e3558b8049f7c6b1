//! Redaction log: one entry per span plus aggregate metrics.

use crate::domain::{Category, PiiSpan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 1-based page number
    pub page: usize,
    #[serde(rename = "type")]
    pub pii_type: String,
    pub action: String,
    pub original: String,
    pub replacement: String,
    pub category: Category,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub location_unresolved: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMetrics {
    /// Spans actually drawn; unresolved spans are not counted
    pub total_redactions: usize,
    pub unique_pii_types: usize,
    pub total_visual_elements: usize,
    /// Every span event by type, drawn or not
    pub type_counts: BTreeMap<String, usize>,
    #[serde(default)]
    pub degraded_replacements: usize,
    #[serde(default)]
    pub unresolved_locations: usize,
}

/// The JSON audit record written next to the redacted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedactionLog {
    pub input_pdf: String,
    pub timestamp: DateTime<Utc>,
    pub redactions: Vec<LogEntry>,
    pub metrics: LogMetrics,
}

impl RedactionLog {
    /// Builds the log from final span state.
    pub fn build(input_pdf: &str, spans: &[PiiSpan], visual_elements: usize) -> Self {
        let redactions: Vec<LogEntry> = spans
            .iter()
            .map(|span| LogEntry {
                page: span.page_index + 1,
                pii_type: span.pii_type.clone(),
                action: span.action.as_str().to_string(),
                original: span.original_text.clone(),
                replacement: span.replacement().unwrap_or_default().to_string(),
                category: span.category,
                confidence: span.confidence,
                degraded: span.degraded,
                location_unresolved: span.location_unresolved,
            })
            .collect();

        let mut type_counts = BTreeMap::new();
        for span in spans {
            *type_counts.entry(span.pii_type.clone()).or_insert(0) += 1;
        }

        let metrics = LogMetrics {
            total_redactions: spans.iter().filter(|s| !s.location_unresolved).count(),
            unique_pii_types: type_counts.len(),
            total_visual_elements: visual_elements,
            type_counts,
            degraded_replacements: spans.iter().filter(|s| s.degraded).count(),
            unresolved_locations: spans.iter().filter(|s| s.location_unresolved).count(),
        };

        Self {
            input_pdf: input_pdf.to_string(),
            timestamp: Utc::now(),
            redactions,
            metrics,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
