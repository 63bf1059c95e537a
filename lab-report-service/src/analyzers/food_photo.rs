use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{AnalyzerOutput, ReportAnalyzer, StructuredExtraction, lenient};
use crate::error::LabReportError;
use crate::inference::Attachment;
use crate::models::{DocumentKind, RawDocument, ReportType, StructuralValidation, TypeSpecificAnalysis};

const SYSTEM_PROMPT: &str = r#"You are an expert nutritionist analyzing food photos.
Identify the foods, estimate portion sizes and calories, and assess nutritional quality.

Return your analysis as a JSON object with this exact structure:
{
  "estimatedCalories": number,
  "macroBreakdown": {"protein": number, "carbs": number, "fat": number, "fiber": number},
  "foodItems": [{"name": string, "quantity": string, "calories": number}],
  "nutritionalQuality": "excellent|good|fair|poor",
  "recommendations": [string]
}

Macronutrients are in grams."#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroBreakdown {
    #[serde(deserialize_with = "lenient::optional")]
    pub protein: Option<f64>,
    #[serde(deserialize_with = "lenient::optional")]
    pub carbs: Option<f64>,
    #[serde(deserialize_with = "lenient::optional")]
    pub fat: Option<f64>,
    #[serde(deserialize_with = "lenient::optional")]
    pub fiber: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoodItem {
    #[serde(deserialize_with = "lenient::or_default")]
    pub name: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub quantity: String,
    #[serde(deserialize_with = "lenient::optional")]
    pub calories: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FoodPhotoAnalysis {
    #[serde(deserialize_with = "lenient::optional")]
    pub estimated_calories: Option<f64>,
    #[serde(deserialize_with = "lenient::optional")]
    pub macro_breakdown: Option<MacroBreakdown>,
    #[serde(deserialize_with = "lenient::list")]
    pub food_items: Vec<FoodItem>,
    #[serde(deserialize_with = "lenient::optional")]
    pub nutritional_quality: Option<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub recommendations: Vec<String>,
}

impl FoodPhotoAnalysis {
    pub fn validate(&self) -> StructuralValidation {
        let mut reasons = Vec::new();
        if self.food_items.is_empty() && self.estimated_calories.is_none() {
            reasons.push("No food items or calorie estimate found".to_string());
        }
        StructuralValidation::from_reasons(reasons)
    }

    /// Calories summed from the itemised foods that carry a figure.
    pub fn itemised_calories(&self) -> f64 {
        self.food_items.iter().filter_map(|item| item.calories).sum()
    }
}

pub struct FoodPhotoAnalyzer {
    extraction: StructuredExtraction,
}

impl FoodPhotoAnalyzer {
    pub fn new(extraction: StructuredExtraction) -> Self {
        Self { extraction }
    }
}

#[async_trait]
impl ReportAnalyzer for FoodPhotoAnalyzer {
    fn report_type(&self) -> ReportType {
        ReportType::FoodPhoto
    }

    async fn analyze(
        &self,
        document: Arc<RawDocument>,
        corpus: &str,
    ) -> Result<AnalyzerOutput, LabReportError> {
        // The photo itself carries most of the signal; the corpus is a caption.
        let attachments = match document.kind {
            DocumentKind::Pdf => vec![Attachment::pdf(document.bytes.clone())],
            DocumentKind::PlainText => Vec::new(),
        };

        let analysis: FoodPhotoAnalysis = self
            .extraction
            .request(
                ReportType::FoodPhoto,
                SYSTEM_PROMPT,
                format!(
                    "Please analyze this food photo and provide nutritional analysis:\n\n{}",
                    corpus
                ),
                attachments,
            )
            .await?;

        Ok(AnalyzerOutput {
            identity: self.extraction.identity(corpus),
            analysis: TypeSpecificAnalysis::FoodPhoto(analysis),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityExtractor;
    use crate::inference::InferencePurpose;
    use crate::test_support::ScriptedInference;

    #[test]
    fn items_or_calories_make_a_valid_analysis() {
        let items_only = FoodPhotoAnalysis {
            food_items: vec![FoodItem {
                name: "Oatmeal".into(),
                quantity: "1 bowl".into(),
                calories: Some(300.0),
            }],
            ..Default::default()
        };
        assert!(items_only.validate().valid);
        assert_eq!(items_only.itemised_calories(), 300.0);

        let calories_only = FoodPhotoAnalysis {
            estimated_calories: Some(650.0),
            ..Default::default()
        };
        assert!(calories_only.validate().valid);

        assert!(!FoodPhotoAnalysis::default().validate().valid);
    }

    #[test]
    fn null_figures_leave_the_rest_of_the_plate() {
        let analysis: FoodPhotoAnalysis = serde_json::from_str(
            r#"{"estimatedCalories": null, "foodItems": [{"name": "Toast", "calories": null}, {"name": "Egg", "calories": 78}], "macroBreakdown": {"fat": "some"}}"#,
        )
        .unwrap();

        assert!(analysis.validate().valid);
        assert_eq!(analysis.itemised_calories(), 78.0);
        assert_eq!(analysis.macro_breakdown.unwrap().fat, None);
    }

    #[tokio::test]
    async fn pdf_documents_are_attached_to_the_request() {
        let inference = Arc::new(ScriptedInference::new().reply(
            InferencePurpose::StructuredExtraction,
            Ok(r#"{"estimatedCalories": 540, "macroBreakdown": {"protein": 32}, "nutritionalQuality": "good"}"#
                .to_string()),
        ));
        let analyzer = FoodPhotoAnalyzer::new(StructuredExtraction::new(
            inference.clone(),
            IdentityExtractor::default(),
        ));
        let document = Arc::new(RawDocument::sniff(b"%PDF-1.7 photo".to_vec()));

        let output = analyzer.analyze(document, "grilled salmon plate").await.unwrap();

        let TypeSpecificAnalysis::FoodPhoto(analysis) = output.analysis else {
            panic!("expected a food photo analysis");
        };
        assert_eq!(analysis.estimated_calories, Some(540.0));
        assert_eq!(analysis.macro_breakdown.unwrap().protein, Some(32.0));

        let requests = inference.requests();
        assert_eq!(requests[0].attachments.len(), 1);
        assert!(requests[0].prompt.ends_with("grilled salmon plate"));
    }
}
