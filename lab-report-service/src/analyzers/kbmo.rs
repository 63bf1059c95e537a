use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{AnalyzerOutput, ReportAnalyzer, StructuredExtraction, lenient};
use crate::error::LabReportError;
use crate::models::{RawDocument, ReportType, StructuralValidation, TypeSpecificAnalysis};

const SYSTEM_PROMPT: &str = r#"You are an expert analyzing KBMO food intolerance test results.
Extract IgG levels for different foods and categorize them by sensitivity level.

Return your analysis as a JSON object with this exact structure:
{
  "totalIggScore": number,
  "highSensitivityFoods": [{"food": string, "iggLevel": number, "sensitivity": "high", "eliminationPeriod": string, "reintroductionNotes": string}],
  "moderateSensitivityFoods": [{"food": string, "iggLevel": number, "sensitivity": "moderate", "eliminationPeriod": string, "reintroductionNotes": string}],
  "lowSensitivityFoods": [{"food": string, "iggLevel": number, "sensitivity": "low", "eliminationPeriod": string, "reintroductionNotes": string}],
  "eliminationDietPlan": [string],
  "reintroductionSchedule": [string],
  "crossReactivityNotes": [string]
}

IgG levels typically range from 0-100+. Categorize as: high (>50), moderate (25-50), low (<25)."#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FoodSensitivity {
    #[serde(deserialize_with = "lenient::or_default")]
    pub food: String,
    #[serde(deserialize_with = "lenient::optional")]
    pub igg_level: Option<f64>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub sensitivity: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub elimination_period: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub reintroduction_notes: String,
}

impl FoodSensitivity {
    fn igg_label(&self) -> String {
        self.igg_level
            .map(|level| level.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KbmoAnalysis {
    #[serde(deserialize_with = "lenient::optional")]
    pub total_igg_score: Option<f64>,
    #[serde(deserialize_with = "lenient::optional_list")]
    pub high_sensitivity_foods: Option<Vec<FoodSensitivity>>,
    #[serde(deserialize_with = "lenient::optional_list")]
    pub moderate_sensitivity_foods: Option<Vec<FoodSensitivity>>,
    #[serde(deserialize_with = "lenient::optional_list")]
    pub low_sensitivity_foods: Option<Vec<FoodSensitivity>>,
    #[serde(deserialize_with = "lenient::list")]
    pub elimination_diet_plan: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub reintroduction_schedule: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub cross_reactivity_notes: Vec<String>,
}

fn band(foods: &Option<Vec<FoodSensitivity>>) -> &[FoodSensitivity] {
    foods.as_deref().unwrap_or_default()
}

impl KbmoAnalysis {
    pub fn high(&self) -> &[FoodSensitivity] {
        band(&self.high_sensitivity_foods)
    }

    pub fn moderate(&self) -> &[FoodSensitivity] {
        band(&self.moderate_sensitivity_foods)
    }

    pub fn low(&self) -> &[FoodSensitivity] {
        band(&self.low_sensitivity_foods)
    }

    pub fn validate(&self) -> StructuralValidation {
        let mut reasons = Vec::new();

        if self.total_igg_score.is_none() {
            reasons.push("Missing or invalid total IgG score".to_string());
        }
        for (foods, name) in [
            (&self.high_sensitivity_foods, "high"),
            (&self.moderate_sensitivity_foods, "moderate"),
            (&self.low_sensitivity_foods, "low"),
        ] {
            if foods.is_none() {
                reasons.push(format!("Missing {} sensitivity foods array", name));
            }
        }
        if self.high().is_empty() && self.moderate().is_empty() && self.low().is_empty() {
            reasons.push("No food sensitivity results found".to_string());
        }
        reasons.extend(
            self.foods()
                .filter(|food| food.igg_level.is_none())
                .map(|food| format!("Missing IgG level for {}", food.food)),
        );

        StructuralValidation::from_reasons(reasons)
    }

    fn foods(&self) -> impl Iterator<Item = &FoodSensitivity> {
        self.high().iter().chain(self.moderate()).chain(self.low())
    }

    /// Sum of IgG levels across all three bands.
    pub fn calculate_total_igg_score(&self) -> f64 {
        self.foods().filter_map(|food| food.igg_level).sum()
    }

    pub fn elimination_diet_plan(&self) -> Vec<String> {
        let mut plan = Vec::new();
        for (foods, heading) in [
            (self.high(), "Immediate elimination (6-8 weeks):"),
            (self.moderate(), "Consider eliminating (4-6 weeks):"),
        ] {
            if foods.is_empty() {
                continue;
            }
            plan.push(heading.to_string());
            plan.extend(
                foods
                    .iter()
                    .map(|food| format!("- {} (IgG: {})", food.food, food.igg_label())),
            );
        }
        plan
    }

    /// Least reactive foods come back first.
    pub fn reintroduction_schedule(&self) -> Vec<String> {
        vec![
            "Reintroduction Schedule:".to_string(),
            "Week 1-2: Reintroduce low sensitivity foods".to_string(),
            "Week 3-4: Reintroduce moderate sensitivity foods".to_string(),
            "Week 5-6: Reintroduce high sensitivity foods (if needed)".to_string(),
        ]
    }
}

pub struct KbmoAnalyzer {
    extraction: StructuredExtraction,
}

impl KbmoAnalyzer {
    pub fn new(extraction: StructuredExtraction) -> Self {
        Self { extraction }
    }
}

#[async_trait]
impl ReportAnalyzer for KbmoAnalyzer {
    fn report_type(&self) -> ReportType {
        ReportType::Kbmo
    }

    async fn analyze(
        &self,
        _document: Arc<RawDocument>,
        corpus: &str,
    ) -> Result<AnalyzerOutput, LabReportError> {
        let analysis: KbmoAnalysis = self
            .extraction
            .request(
                ReportType::Kbmo,
                SYSTEM_PROMPT,
                format!(
                    "Please analyze this KBMO food intolerance test and extract all relevant data:\n\n{}",
                    corpus
                ),
                Vec::new(),
            )
            .await?;

        Ok(AnalyzerOutput {
            identity: self.extraction.identity(corpus),
            analysis: TypeSpecificAnalysis::Kbmo(analysis),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn food(name: &str, igg_level: f64) -> FoodSensitivity {
        FoodSensitivity {
            food: name.to_string(),
            igg_level: Some(igg_level),
            ..Default::default()
        }
    }

    fn panel() -> KbmoAnalysis {
        KbmoAnalysis {
            total_igg_score: Some(0.0),
            high_sensitivity_foods: Some(vec![food("Dairy", 88.0), food("Egg white", 61.5)]),
            moderate_sensitivity_foods: Some(vec![food("Wheat", 32.0)]),
            low_sensitivity_foods: Some(vec![food("Rice", 4.0)]),
            ..Default::default()
        }
    }

    #[test]
    fn total_igg_sums_every_band() {
        assert_eq!(panel().calculate_total_igg_score(), 185.5);
        assert_eq!(KbmoAnalysis::default().calculate_total_igg_score(), 0.0);
    }

    #[test]
    fn elimination_plan_groups_high_then_moderate() {
        assert_eq!(
            panel().elimination_diet_plan(),
            vec![
                "Immediate elimination (6-8 weeks):",
                "- Dairy (IgG: 88)",
                "- Egg white (IgG: 61.5)",
                "Consider eliminating (4-6 weeks):",
                "- Wheat (IgG: 32)",
            ]
        );
    }

    #[test]
    fn reintroduction_starts_with_low_sensitivity_foods() {
        let schedule = panel().reintroduction_schedule();
        assert_eq!(schedule[1], "Week 1-2: Reintroduce low sensitivity foods");
        assert_eq!(schedule.len(), 4);
    }

    #[test]
    fn validation_requires_bands_and_results() {
        assert!(panel().validate().valid);

        let empty_bands = KbmoAnalysis {
            total_igg_score: Some(0.0),
            high_sensitivity_foods: Some(Vec::new()),
            moderate_sensitivity_foods: Some(Vec::new()),
            low_sensitivity_foods: Some(Vec::new()),
            ..Default::default()
        };
        assert_eq!(
            empty_bands.validate().reasons,
            vec!["No food sensitivity results found"]
        );

        let missing: KbmoAnalysis =
            serde_json::from_str(r#"{"highSensitivityFoods": [{"food": "Corn", "iggLevel": 55}]}"#)
                .unwrap();
        assert_eq!(
            missing.validate().reasons,
            vec![
                "Missing or invalid total IgG score",
                "Missing moderate sensitivity foods array",
                "Missing low sensitivity foods array",
            ]
        );
    }

    #[test]
    fn unreadable_levels_are_reported_and_skipped() {
        let analysis: KbmoAnalysis = serde_json::from_str(
            r#"{"totalIggScore": 40, "highSensitivityFoods": [{"food": "Dairy", "iggLevel": null}, {"food": "Soy", "iggLevel": 52}], "moderateSensitivityFoods": null, "lowSensitivityFoods": [{"food": "Rice"}]}"#,
        )
        .unwrap();

        assert_eq!(
            analysis.validate().reasons,
            vec![
                "Missing moderate sensitivity foods array",
                "Missing IgG level for Dairy",
                "Missing IgG level for Rice",
            ]
        );
        assert_eq!(analysis.calculate_total_igg_score(), 52.0);
        assert_eq!(analysis.elimination_diet_plan()[1], "- Dairy (IgG: N/A)");
    }
}
