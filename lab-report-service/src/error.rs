use serde::Serialize;
use thiserror::Error;

use crate::models::{PipelineStage, ReportType};

/// Failure taxonomy of the lab report pipeline.
///
/// A rejected-for-storage verdict is not an error; see
/// [`crate::models::AnalysisOutcome::Rejected`].
#[derive(Debug, Error)]
pub enum LabReportError {
    #[error("The PDF file appears to be corrupted or has an invalid structure: {0}")]
    CorruptDocument(String),

    #[error("The PDF file is password-protected")]
    PasswordProtected,

    #[error("The PDF file is encrypted")]
    Encrypted,

    #[error("The document is empty or contains no readable text")]
    EmptyOrUnreadable,

    #[error("Document extraction service failed: {0}")]
    ExtractionServiceFailure(String),

    #[error("Failed to detect report type: {0}")]
    ClassificationFailure(String),

    #[error("Report type could not be determined from model response '{response}'")]
    Unclassified { response: String },

    #[error("{analyzer} analysis failed: {reason}")]
    AnalyzerFailure { analyzer: ReportType, reason: String },

    #[error("Workflow error: {0}")]
    Workflow(String),
}

impl LabReportError {
    /// Stable machine-readable identifier for API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            LabReportError::CorruptDocument(_) => "corrupt_document",
            LabReportError::PasswordProtected => "password_protected",
            LabReportError::Encrypted => "encrypted",
            LabReportError::EmptyOrUnreadable => "empty_or_unreadable",
            LabReportError::ExtractionServiceFailure(_) => "extraction_service_failure",
            LabReportError::ClassificationFailure(_) => "classification_failure",
            LabReportError::Unclassified { .. } => "unclassified",
            LabReportError::AnalyzerFailure { .. } => "analyzer_failure",
            LabReportError::Workflow(_) => "workflow_error",
        }
    }

    pub fn analyzer(analyzer: ReportType, reason: impl std::fmt::Display) -> Self {
        LabReportError::AnalyzerFailure {
            analyzer,
            reason: reason.to_string(),
        }
    }
}

/// A fatal pipeline error tagged with the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct PipelineFailure {
    pub stage: PipelineStage,
    #[source]
    pub error: LabReportError,
}

impl PipelineFailure {
    pub fn new(stage: PipelineStage, error: LabReportError) -> Self {
        Self { stage, error }
    }

    /// The typed reason string handed to callers.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    pub fn report(&self) -> FailureReport {
        FailureReport {
            stage: self.stage,
            kind: self.error.kind(),
            error: self.reason(),
        }
    }
}

/// Serializable view of a [`PipelineFailure`].
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub stage: PipelineStage,
    pub kind: &'static str,
    pub error: String,
}
