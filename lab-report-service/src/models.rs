use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::analyzers::{CgmAnalysis, DutchAnalysis, FoodPhotoAnalysis, KbmoAnalysis, NutriqAnalysis};

/// Strings that identify a plain-text assessment export mislabeled as a PDF.
pub const PLAIN_TEXT_MARKERS: &[&str] = &["NUTRIQ ASSESSMENT REPORT", "Patient Name:"];

/// How far into the buffer the `%PDF` magic may appear.
const PDF_HEADER_WINDOW: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

/// An uploaded document for the duration of one pipeline run.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
}

impl RawDocument {
    /// Decide between the plain-text and PDF paths from the content itself.
    pub fn sniff(bytes: Vec<u8>) -> Self {
        let kind = if !bytes.starts_with(b"%PDF") && Self::contains_text_marker(&bytes) {
            DocumentKind::PlainText
        } else {
            DocumentKind::Pdf
        };
        Self { bytes, kind }
    }

    fn contains_text_marker(bytes: &[u8]) -> bool {
        std::str::from_utf8(bytes)
            .map(|text| PLAIN_TEXT_MARKERS.iter().any(|marker| text.contains(marker)))
            .unwrap_or(false)
    }

    pub fn has_pdf_header(&self) -> bool {
        let window = &self.bytes[..self.bytes.len().min(PDF_HEADER_WINDOW)];
        window.windows(4).any(|w| w == b"%PDF")
    }

    /// The document as text, only for plain-text documents.
    pub fn as_text(&self) -> Option<&str> {
        match self.kind {
            DocumentKind::PlainText => std::str::from_utf8(&self.bytes).ok(),
            DocumentKind::Pdf => None,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Text recovered from a document, from either or both extraction paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedText {
    pub text_layer: String,
    pub vision_layer: Option<String>,
    pub combined: String,
    pub has_image_content: bool,
    pub page_count: usize,
}

impl ExtractedText {
    pub fn vision_used(&self) -> bool {
        self.vision_layer
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Nutriq,
    Kbmo,
    Dutch,
    Cgm,
    FoodPhoto,
}

impl ReportType {
    pub const ALL: [ReportType; 5] = [
        ReportType::Nutriq,
        ReportType::Kbmo,
        ReportType::Dutch,
        ReportType::Cgm,
        ReportType::FoodPhoto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Nutriq => "nutriq",
            ReportType::Kbmo => "kbmo",
            ReportType::Dutch => "dutch",
            ReportType::Cgm => "cgm",
            ReportType::FoodPhoto => "food_photo",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown report type '{}'", s))
    }
}

/// Orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Extracting,
    Classifying,
    Analyzing,
    Validating,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Extracting => "extracting",
            PipelineStage::Classifying => "classifying",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::Validating => "validating",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Identity fields found inside the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientIdentity {
    pub patient_name: Option<String>,
    /// Raw matched string; birth years are not century-expanded.
    pub date_of_birth: Option<String>,
    pub test_date: Option<NaiveDate>,
    pub patient_id: Option<String>,
}

/// Result of a structural check over a type-specific analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralValidation {
    pub valid: bool,
    pub reasons: Vec<String>,
}

impl StructuralValidation {
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            valid: reasons.is_empty(),
            reasons,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeSpecificAnalysis {
    Nutriq(NutriqAnalysis),
    Kbmo(KbmoAnalysis),
    Dutch(DutchAnalysis),
    Cgm(CgmAnalysis),
    FoodPhoto(FoodPhotoAnalysis),
}

impl TypeSpecificAnalysis {
    pub fn report_type(&self) -> ReportType {
        match self {
            TypeSpecificAnalysis::Nutriq(_) => ReportType::Nutriq,
            TypeSpecificAnalysis::Kbmo(_) => ReportType::Kbmo,
            TypeSpecificAnalysis::Dutch(_) => ReportType::Dutch,
            TypeSpecificAnalysis::Cgm(_) => ReportType::Cgm,
            TypeSpecificAnalysis::FoodPhoto(_) => ReportType::FoodPhoto,
        }
    }

    pub fn validate(&self) -> StructuralValidation {
        match self {
            TypeSpecificAnalysis::Nutriq(analysis) => analysis.validate(),
            TypeSpecificAnalysis::Kbmo(analysis) => analysis.validate(),
            TypeSpecificAnalysis::Dutch(analysis) => analysis.validate(),
            TypeSpecificAnalysis::Cgm(analysis) => analysis.validate(),
            TypeSpecificAnalysis::FoodPhoto(analysis) => analysis.validate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedReport {
    #[serde(flatten)]
    pub identity: PatientIdentity,
    pub raw_text: String,
    pub combined_text: String,
    pub has_image_content: bool,
    pub vision_used: bool,
    pub page_count: usize,
    pub type_specific_analysis: TypeSpecificAnalysis,
}

/// The finished, immutable product of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub report_type: ReportType,
    pub analyzed_report: AnalyzedReport,
    pub processing_time_ms: u64,
    pub confidence: f64,
}

/// Storage gate decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub reasons: Vec<String>,
    /// Non-blocking observations, logged and surfaced for review.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Accepted {
        result: AnalysisResult,
    },
    Rejected {
        result: AnalysisResult,
        reasons: Vec<String>,
    },
}

impl AnalysisOutcome {
    pub fn result(&self) -> &AnalysisResult {
        match self {
            AnalysisOutcome::Accepted { result } | AnalysisOutcome::Rejected { result, .. } => {
                result
            }
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, AnalysisOutcome::Accepted { .. })
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            AnalysisOutcome::Accepted { .. } => &[],
            AnalysisOutcome::Rejected { reasons, .. } => reasons,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSource {
    PdfPriority,
    FormEntry,
    Merged,
}

/// Operator-entered client identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_first_name: Option<String>,
    pub client_last_name: Option<String>,
    pub assessment_date: Option<NaiveDate>,
}

/// Identity-relevant data derived from the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfExtractedData {
    pub client_name: Option<String>,
    pub assessment_date: Option<NaiveDate>,
    pub raw_text: String,
}

/// Reconciled client identity. `data_source` decides which name is authoritative;
/// `form_override` is kept for audit only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientData {
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_first_name: Option<String>,
    pub client_last_name: Option<String>,
    pub assessment_date: Option<NaiveDate>,
    pub data_source: DataSource,
    pub form_override: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAnalysis {
    pub outcome: AnalysisOutcome,
    pub client_data: ClientData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeReportRequest {
    pub document_base64: Option<String>,
    pub bucket: Option<String>,
    pub path: Option<String>,
    pub form: Option<FormData>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeReportResponse {
    pub id: String,
    pub status: String,
    pub result: AnalysisResult,
    pub reasons: Vec<String>,
    pub client_data: Option<ClientData>,
    pub data_source_message: Option<String>,
    /// The same text the CLI prints with `--summary`.
    pub summary: String,
}

/// What the result store keeps for an accepted analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnalysis {
    pub id: String,
    pub stored_at: chrono::DateTime<chrono::Utc>,
    pub result: AnalysisResult,
    pub client_data: Option<ClientData>,
}
