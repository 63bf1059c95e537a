use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{AnalyzerOutput, ReportAnalyzer, StructuredExtraction, lenient};
use crate::error::LabReportError;
use crate::models::{RawDocument, ReportType, StructuralValidation, TypeSpecificAnalysis};

const SYSTEM_PROMPT: &str = r#"You are an expert nutritionist analyzing NutriQ/NAQ assessment results.
Extract structured data about body system scores and provide detailed recommendations.

Return your analysis as a JSON object with this exact structure:
{
  "totalScore": number,
  "bodySystems": {
    "energy": {"score": number, "issues": [string], "recommendations": [string]},
    "mood": {"score": number, "issues": [string], "recommendations": [string]},
    "sleep": {"score": number, "issues": [string], "recommendations": [string]},
    "stress": {"score": number, "issues": [string], "recommendations": [string]},
    "digestion": {"score": number, "issues": [string], "recommendations": [string]},
    "immunity": {"score": number, "issues": [string], "recommendations": [string]}
  },
  "overallRecommendations": [string],
  "priorityActions": [string],
  "followUpTests": [string]
}

Scores should be 0-100. Be thorough in your analysis and provide actionable recommendations."#;

/// Systems scoring below this are worth a priority action.
const PRIORITY_SCORE_THRESHOLD: f64 = 50.0;
const MAX_PRIORITY_SYSTEMS: usize = 3;
const MAX_MISSING_SYSTEMS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BodySystemScore {
    #[serde(deserialize_with = "lenient::optional")]
    pub score: Option<f64>,
    #[serde(deserialize_with = "lenient::list")]
    pub issues: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodySystems {
    #[serde(deserialize_with = "lenient::optional")]
    pub energy: Option<BodySystemScore>,
    #[serde(deserialize_with = "lenient::optional")]
    pub mood: Option<BodySystemScore>,
    #[serde(deserialize_with = "lenient::optional")]
    pub sleep: Option<BodySystemScore>,
    #[serde(deserialize_with = "lenient::optional")]
    pub stress: Option<BodySystemScore>,
    #[serde(deserialize_with = "lenient::optional")]
    pub digestion: Option<BodySystemScore>,
    #[serde(deserialize_with = "lenient::optional")]
    pub immunity: Option<BodySystemScore>,
}

impl BodySystems {
    /// Each system by name, in questionnaire order.
    pub fn entries(&self) -> [(&'static str, Option<&BodySystemScore>); 6] {
        [
            ("energy", self.energy.as_ref()),
            ("mood", self.mood.as_ref()),
            ("sleep", self.sleep.as_ref()),
            ("stress", self.stress.as_ref()),
            ("digestion", self.digestion.as_ref()),
            ("immunity", self.immunity.as_ref()),
        ]
    }

    pub fn present(&self) -> impl Iterator<Item = (&'static str, &BodySystemScore)> {
        self.entries()
            .into_iter()
            .filter_map(|(name, score)| score.map(|score| (name, score)))
    }

    pub fn missing(&self) -> Vec<&'static str> {
        self.entries()
            .into_iter()
            .filter(|(_, score)| score.is_none())
            .map(|(name, _)| name)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NutriqAnalysis {
    #[serde(deserialize_with = "lenient::optional")]
    pub total_score: Option<f64>,
    #[serde(deserialize_with = "lenient::optional")]
    pub body_systems: Option<BodySystems>,
    #[serde(deserialize_with = "lenient::list")]
    pub overall_recommendations: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub priority_actions: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub follow_up_tests: Vec<String>,
}

impl NutriqAnalysis {
    pub fn validate(&self) -> StructuralValidation {
        let mut reasons = Vec::new();

        if self.total_score.is_none() {
            reasons.push("Missing or invalid total score".to_string());
        }

        match &self.body_systems {
            None => reasons.push("Missing body systems analysis".to_string()),
            Some(systems) => {
                let missing = systems.missing();
                if missing.len() > MAX_MISSING_SYSTEMS {
                    reasons.push(format!("Too many missing body systems: {}", missing.join(", ")));
                }
                reasons.extend(
                    systems
                        .present()
                        .filter(|(_, system)| system.score.is_none())
                        .map(|(name, _)| format!("Missing {} score", name)),
                );
            }
        }

        StructuralValidation::from_reasons(reasons)
    }

    /// The lowest-scoring systems, when they fall under the threshold.
    pub fn priority_systems(&self) -> Vec<String> {
        let Some(systems) = &self.body_systems else {
            return Vec::new();
        };

        let mut scored: Vec<_> = systems
            .present()
            .filter_map(|(name, system)| system.score.map(|score| (name, score)))
            .collect();
        scored.sort_by(|(_, a), (_, b)| a.total_cmp(b));

        scored
            .into_iter()
            .take(MAX_PRIORITY_SYSTEMS)
            .filter(|(_, score)| *score < PRIORITY_SCORE_THRESHOLD)
            .map(|(name, score)| format!("Focus on improving {} (score: {})", name, score))
            .collect()
    }
}

pub struct NutriqAnalyzer {
    extraction: StructuredExtraction,
}

impl NutriqAnalyzer {
    pub fn new(extraction: StructuredExtraction) -> Self {
        Self { extraction }
    }
}

#[async_trait]
impl ReportAnalyzer for NutriqAnalyzer {
    fn report_type(&self) -> ReportType {
        ReportType::Nutriq
    }

    async fn analyze(
        &self,
        _document: Arc<RawDocument>,
        corpus: &str,
    ) -> Result<AnalyzerOutput, LabReportError> {
        let analysis: NutriqAnalysis = self
            .extraction
            .request(
                ReportType::Nutriq,
                SYSTEM_PROMPT,
                format!(
                    "Please analyze this NutriQ assessment and extract all relevant data:\n\n{}",
                    corpus
                ),
                Vec::new(),
            )
            .await?;

        Ok(AnalyzerOutput {
            identity: self.extraction.identity(corpus),
            analysis: TypeSpecificAnalysis::Nutriq(analysis),
        })
    }
}
