use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{AnalyzerOutput, ReportAnalyzer, StructuredExtraction, lenient};
use crate::error::LabReportError;
use crate::models::{RawDocument, ReportType, StructuralValidation, TypeSpecificAnalysis};

const SYSTEM_PROMPT: &str = r#"You are an expert analyzing continuous glucose monitor (CGM) data.
Extract glucose statistics, patterns, and provide lifestyle recommendations.

Return your analysis as a JSON object with this exact structure:
{
  "averageGlucose": number,
  "glucoseVariability": number,
  "timeInRange": number,
  "hypoglycemicEvents": number,
  "postMealSpikes": [string],
  "recommendations": [string],
  "mealTiming": [string],
  "lifestyleFactors": [string]
}

Time in range should be percentage (0-100). Glucose values in mg/dL."#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CgmAnalysis {
    /// mg/dL
    #[serde(deserialize_with = "lenient::optional")]
    pub average_glucose: Option<f64>,
    #[serde(deserialize_with = "lenient::optional")]
    pub glucose_variability: Option<f64>,
    /// Percentage, 0 to 100.
    #[serde(deserialize_with = "lenient::optional")]
    pub time_in_range: Option<f64>,
    #[serde(deserialize_with = "lenient::optional")]
    pub hypoglycemic_events: Option<f64>,
    #[serde(deserialize_with = "lenient::list")]
    pub post_meal_spikes: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub recommendations: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub meal_timing: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub lifestyle_factors: Vec<String>,
}

impl CgmAnalysis {
    pub fn validate(&self) -> StructuralValidation {
        let mut reasons = Vec::new();

        if self.average_glucose.is_none() {
            reasons.push("Missing or invalid average glucose".to_string());
        }
        match self.time_in_range {
            None => reasons.push("Missing or invalid time in range".to_string()),
            Some(tir) if !(0.0..=100.0).contains(&tir) => {
                reasons.push(format!("Time in range out of bounds: {}", tir));
            }
            Some(_) => {}
        }

        StructuralValidation::from_reasons(reasons)
    }
}

pub struct CgmAnalyzer {
    extraction: StructuredExtraction,
}

impl CgmAnalyzer {
    pub fn new(extraction: StructuredExtraction) -> Self {
        Self { extraction }
    }
}

#[async_trait]
impl ReportAnalyzer for CgmAnalyzer {
    fn report_type(&self) -> ReportType {
        ReportType::Cgm
    }

    async fn analyze(
        &self,
        _document: Arc<RawDocument>,
        corpus: &str,
    ) -> Result<AnalyzerOutput, LabReportError> {
        let analysis: CgmAnalysis = self
            .extraction
            .request(
                ReportType::Cgm,
                SYSTEM_PROMPT,
                format!(
                    "Please analyze this CGM data and extract all relevant glucose statistics:\n\n{}",
                    corpus
                ),
                Vec::new(),
            )
            .await?;

        Ok(AnalyzerOutput {
            identity: self.extraction.identity(corpus),
            analysis: TypeSpecificAnalysis::Cgm(analysis),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_summary_is_valid() {
        let analysis: CgmAnalysis = serde_json::from_str(
            r#"{"averageGlucose": 112.4, "glucoseVariability": 18, "timeInRange": 86.5, "hypoglycemicEvents": 2}"#,
        )
        .unwrap();

        assert!(analysis.validate().valid);
        assert_eq!(analysis.hypoglycemic_events, Some(2.0));
        assert!(analysis.post_meal_spikes.is_empty());
    }

    #[test]
    fn time_in_range_must_be_a_percentage() {
        let analysis = CgmAnalysis {
            average_glucose: Some(140.0),
            time_in_range: Some(130.0),
            ..Default::default()
        };
        assert_eq!(
            analysis.validate().reasons,
            vec!["Time in range out of bounds: 130"]
        );

        let boundary = CgmAnalysis {
            average_glucose: Some(140.0),
            time_in_range: Some(100.0),
            ..Default::default()
        };
        assert!(boundary.validate().valid);
    }

    #[test]
    fn missing_statistics_are_reported() {
        assert_eq!(
            CgmAnalysis::default().validate().reasons,
            vec![
                "Missing or invalid average glucose",
                "Missing or invalid time in range",
            ]
        );
    }

    #[test]
    fn null_statistics_are_reported_not_fatal() {
        let analysis: CgmAnalysis = serde_json::from_str(
            r#"{"averageGlucose": null, "timeInRange": "86%", "postMealSpikes": "none"}"#,
        )
        .unwrap();

        assert_eq!(
            analysis.validate().reasons,
            vec![
                "Missing or invalid average glucose",
                "Missing or invalid time in range",
            ]
        );
        assert!(analysis.post_meal_spikes.is_empty());
    }
}
