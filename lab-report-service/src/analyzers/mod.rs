//! One analyzer per report type. Each turns the corpus into its structured
//! analysis through a JSON-schema prompt and reads identity fields with the
//! shared [`IdentityExtractor`].

pub mod cgm;
pub mod dutch;
pub mod food_photo;
pub mod kbmo;
mod lenient;
pub mod nutriq;

pub use cgm::{CgmAnalysis, CgmAnalyzer};
pub use dutch::{CortisolPattern, CortisolRhythm, DutchAnalysis, DutchAnalyzer, HormoneResult, MarkerStatus, SexHormones};
pub use food_photo::{FoodItem, FoodPhotoAnalysis, FoodPhotoAnalyzer, MacroBreakdown};
pub use kbmo::{FoodSensitivity, KbmoAnalysis, KbmoAnalyzer};
pub use nutriq::{BodySystemScore, BodySystems, NutriqAnalysis, NutriqAnalyzer};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::LabReportError;
use crate::identity::IdentityExtractor;
use crate::inference::{Attachment, InferenceClient, InferencePurpose, InferenceRequest};
use crate::models::{PatientIdentity, RawDocument, ReportType, TypeSpecificAnalysis};

const STRUCTURED_MAX_TOKENS: u32 = 4000;

/// What an analyzer hands back to the pipeline.
#[derive(Debug, Clone)]
pub struct AnalyzerOutput {
    pub identity: PatientIdentity,
    pub analysis: TypeSpecificAnalysis,
}

#[async_trait]
pub trait ReportAnalyzer: Send + Sync {
    fn report_type(&self) -> ReportType;

    async fn analyze(
        &self,
        document: Arc<RawDocument>,
        corpus: &str,
    ) -> Result<AnalyzerOutput, LabReportError>;
}

/// Inference plus identity extraction, shared by every analyzer.
#[derive(Clone)]
pub struct StructuredExtraction {
    inference: Arc<dyn InferenceClient>,
    identity: IdentityExtractor,
}

impl StructuredExtraction {
    pub fn new(inference: Arc<dyn InferenceClient>, identity: IdentityExtractor) -> Self {
        Self { inference, identity }
    }

    pub fn identity(&self, corpus: &str) -> PatientIdentity {
        self.identity.extract(corpus)
    }

    /// Ask for a JSON document and deserialize it. Any failure is reported
    /// against `report_type`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        report_type: ReportType,
        system: &str,
        prompt: String,
        attachments: Vec<Attachment>,
    ) -> Result<T, LabReportError> {
        info!(%report_type, prompt_chars = prompt.len(), "Requesting structured analysis");
        let request = InferenceRequest::new(InferencePurpose::StructuredExtraction, system, prompt)
            .with_attachments(attachments)
            .with_max_tokens(STRUCTURED_MAX_TOKENS);

        let raw = self
            .inference
            .complete(request)
            .await
            .map_err(|e| LabReportError::analyzer(report_type, e))?;

        debug!(%report_type, response_chars = raw.len(), "Parsing structured analysis");
        parse_json_response(&raw)
            .map_err(|e| LabReportError::analyzer(report_type, format!("invalid JSON: {}", e)))
    }
}

/// Strip a surrounding markdown code fence, with or without a language tag.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Deserialize a model answer that should be a JSON object, tolerating a
/// code fence or prose around the object.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let body = strip_code_fence(raw);
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(err) => match (body.find('{'), body.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str(&body[start..=end]),
            _ => Err(err),
        },
    }
}

/// All analyzers wired to the same collaborators, keyed by report type.
pub fn standard_analyzers(
    inference: Arc<dyn InferenceClient>,
    identity: IdentityExtractor,
) -> HashMap<ReportType, Arc<dyn ReportAnalyzer>> {
    let extraction = StructuredExtraction::new(inference, identity);
    let analyzers: [Arc<dyn ReportAnalyzer>; 5] = [
        Arc::new(NutriqAnalyzer::new(extraction.clone())),
        Arc::new(KbmoAnalyzer::new(extraction.clone())),
        Arc::new(DutchAnalyzer::new(extraction.clone())),
        Arc::new(CgmAnalyzer::new(extraction.clone())),
        Arc::new(FoodPhotoAnalyzer::new(extraction)),
    ];
    analyzers
        .into_iter()
        .map(|analyzer| (analyzer.report_type(), analyzer))
        .collect()
}
