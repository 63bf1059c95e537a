use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analyzers::strip_code_fence;
use crate::config::AmbiguousReportPolicy;
use crate::error::LabReportError;
use crate::inference::{InferenceClient, InferencePurpose, InferenceRequest};
use crate::models::ReportType;

const CLASSIFIER_SYSTEM_PROMPT: &str = "You are an expert at identifying different types of lab reports and medical documents. \
Analyze the provided text and determine which type of report it is. Return only one of these exact values:
- nutriq (for NutriQ/NAQ assessments)
- kbmo (for KBMO food intolerance tests)
- dutch (for Dutch hormone tests)
- cgm (for Continuous Glucose Monitor data)
- food_photo (for food photos)

Look for specific keywords, formatting, and content patterns that identify each type.";

/// Only the head of the corpus is needed to recognise the format.
const CLASSIFIER_EXCERPT_CHARS: usize = 2000;

/// Report type picked when the model answer is not one of the known types.
pub const DEFAULT_REPORT_TYPE: ReportType = ReportType::Nutriq;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub report_type: ReportType,
    /// True when the answer could not be parsed and the default was used.
    pub ambiguous: bool,
    pub raw: String,
}

impl Classification {
    /// Interpret a model answer. Never fails; unknown answers fall back to
    /// [`DEFAULT_REPORT_TYPE`] and are flagged as ambiguous.
    pub fn parse(raw: &str) -> Self {
        match parse_report_type(raw) {
            Some(report_type) => Self {
                report_type,
                ambiguous: false,
                raw: raw.to_string(),
            },
            None => Self {
                report_type: DEFAULT_REPORT_TYPE,
                ambiguous: true,
                raw: raw.to_string(),
            },
        }
    }
}

fn parse_report_type(raw: &str) -> Option<ReportType> {
    let stripped = strip_code_fence(raw);

    if let Ok(value) = serde_json::from_str::<Value>(stripped) {
        let field = value
            .get("reportType")
            .or_else(|| value.get("report_type"))
            .and_then(Value::as_str);
        if let Some(field) = field {
            return normalize(field).parse().ok();
        }
    }

    normalize(stripped).parse().ok()
}

fn normalize(answer: &str) -> String {
    answer
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.' | ',' | ';' | ':' | '!'))
        .trim()
        .to_lowercase()
        .replace([' ', '-'], "_")
}

/// Buckets a corpus into one of the known report types with one call.
pub struct ReportClassifier {
    inference: Arc<dyn InferenceClient>,
    policy: AmbiguousReportPolicy,
}

impl ReportClassifier {
    pub fn new(inference: Arc<dyn InferenceClient>, policy: AmbiguousReportPolicy) -> Self {
        Self { inference, policy }
    }

    pub async fn classify(&self, corpus: &str) -> Result<Classification, LabReportError> {
        let excerpt: String = corpus.chars().take(CLASSIFIER_EXCERPT_CHARS).collect();
        info!(corpus_chars = corpus.len(), "Detecting report type");

        let request = InferenceRequest::new(
            InferencePurpose::Classification,
            CLASSIFIER_SYSTEM_PROMPT,
            format!(
                "Please analyze this lab report text and tell me what type of report it is:\n\n{}...",
                excerpt
            ),
        )
        .with_max_tokens(20);

        let raw = self
            .inference
            .complete(request)
            .await
            .map_err(|e| LabReportError::ClassificationFailure(e.to_string()))?;

        let classification = Classification::parse(&raw);
        if classification.ambiguous {
            warn!(
                response = %raw.trim(),
                default = %DEFAULT_REPORT_TYPE,
                policy = ?self.policy,
                "Unknown report type detected"
            );
            if self.policy == AmbiguousReportPolicy::Reject {
                return Err(LabReportError::Unclassified {
                    response: raw.trim().to_string(),
                });
            }
        }

        info!(report_type = %classification.report_type, "Detected report type");
        Ok(classification)
    }
}
