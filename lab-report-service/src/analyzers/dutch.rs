use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{AnalyzerOutput, ReportAnalyzer, StructuredExtraction, lenient};
use crate::error::LabReportError;
use crate::models::{RawDocument, ReportType, StructuralValidation, TypeSpecificAnalysis};

const SYSTEM_PROMPT: &str = r#"You are an expert analyzing Dutch hormone test results.
Extract hormone levels, interpret patterns, and provide clinical recommendations.

Return your analysis as a JSON object with this exact structure:
{
  "cortisolPattern": {
    "am": {"hormone": "cortisol_am", "value": number, "unit": string, "referenceRange": string, "status": "normal|high|low", "clinicalSignificance": string},
    "pm": {"hormone": "cortisol_pm", "value": number, "unit": string, "referenceRange": string, "status": "normal|high|low", "clinicalSignificance": string},
    "pattern": "normal|flat|reversed|elevated",
    "interpretation": string
  },
  "sexHormones": {
    "testosterone": {"hormone": "testosterone", "value": number, "unit": string, "referenceRange": string, "status": "normal|high|low", "clinicalSignificance": string},
    "estradiol": {"hormone": "estradiol", "value": number, "unit": string, "referenceRange": string, "status": "normal|high|low", "clinicalSignificance": string},
    "progesterone": {"hormone": "progesterone", "value": number, "unit": string, "referenceRange": string, "status": "normal|high|low", "clinicalSignificance": string},
    "dhea": {"hormone": "dhea", "value": number, "unit": string, "referenceRange": string, "status": "normal|high|low", "clinicalSignificance": string}
  },
  "organicAcids": [{"hormone": string, "value": number, "unit": string, "referenceRange": string, "status": "normal|high|low", "clinicalSignificance": string}],
  "hormoneAnalysis": string,
  "recommendations": [string],
  "followUpTests": [string]
}"#;

const CORTISOL_PENALTY: i32 = 20;
const SEX_HORMONE_PENALTY: i32 = 15;
const ORGANIC_ACID_PENALTY: i32 = 5;

/// Lab flag on a single marker. Unrecognised flags are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MarkerStatus {
    #[default]
    Normal,
    High,
    Low,
    Other(String),
}

impl MarkerStatus {
    pub fn is_normal(&self) -> bool {
        matches!(self, MarkerStatus::Normal)
    }
}

impl From<String> for MarkerStatus {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "normal" => MarkerStatus::Normal,
            "high" => MarkerStatus::High,
            "low" => MarkerStatus::Low,
            _ => MarkerStatus::Other(value),
        }
    }
}

impl From<MarkerStatus> for String {
    fn from(status: MarkerStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for MarkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerStatus::Normal => f.write_str("normal"),
            MarkerStatus::High => f.write_str("high"),
            MarkerStatus::Low => f.write_str("low"),
            MarkerStatus::Other(other) => f.write_str(other),
        }
    }
}

/// Shape of the daily cortisol curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CortisolRhythm {
    Normal,
    Flat,
    Reversed,
    Elevated,
    Other(String),
}

impl CortisolRhythm {
    pub fn is_normal(&self) -> bool {
        matches!(self, CortisolRhythm::Normal)
    }
}

impl From<String> for CortisolRhythm {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "normal" => CortisolRhythm::Normal,
            "flat" => CortisolRhythm::Flat,
            "reversed" => CortisolRhythm::Reversed,
            "elevated" => CortisolRhythm::Elevated,
            _ => CortisolRhythm::Other(value),
        }
    }
}

impl From<CortisolRhythm> for String {
    fn from(rhythm: CortisolRhythm) -> Self {
        rhythm.to_string()
    }
}

impl fmt::Display for CortisolRhythm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CortisolRhythm::Normal => f.write_str("normal"),
            CortisolRhythm::Flat => f.write_str("flat"),
            CortisolRhythm::Reversed => f.write_str("reversed"),
            CortisolRhythm::Elevated => f.write_str("elevated"),
            CortisolRhythm::Other(other) => f.write_str(other),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HormoneResult {
    #[serde(deserialize_with = "lenient::or_default")]
    pub hormone: String,
    #[serde(deserialize_with = "lenient::optional")]
    pub value: Option<f64>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub unit: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub reference_range: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: MarkerStatus,
    #[serde(deserialize_with = "lenient::or_default")]
    pub clinical_significance: String,
}

impl HormoneResult {
    fn reading(&self) -> String {
        match self.value {
            Some(value) => format!("{} ({} {})", self.status, value, self.unit),
            None => format!("{} (N/A)", self.status),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CortisolPattern {
    #[serde(deserialize_with = "lenient::optional")]
    pub am: Option<HormoneResult>,
    #[serde(deserialize_with = "lenient::optional")]
    pub pm: Option<HormoneResult>,
    #[serde(deserialize_with = "lenient::optional")]
    pub pattern: Option<CortisolRhythm>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub interpretation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SexHormones {
    #[serde(deserialize_with = "lenient::optional")]
    pub testosterone: Option<HormoneResult>,
    #[serde(deserialize_with = "lenient::optional")]
    pub estradiol: Option<HormoneResult>,
    #[serde(deserialize_with = "lenient::optional")]
    pub progesterone: Option<HormoneResult>,
    #[serde(deserialize_with = "lenient::optional")]
    pub dhea: Option<HormoneResult>,
}

impl SexHormones {
    pub fn present(&self) -> impl Iterator<Item = (&'static str, &HormoneResult)> {
        [
            ("testosterone", self.testosterone.as_ref()),
            ("estradiol", self.estradiol.as_ref()),
            ("progesterone", self.progesterone.as_ref()),
            ("dhea", self.dhea.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, result)| result.map(|result| (name, result)))
    }

    pub fn abnormal(&self) -> impl Iterator<Item = (&'static str, &HormoneResult)> {
        self.present().filter(|(_, result)| !result.status.is_normal())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DutchAnalysis {
    #[serde(deserialize_with = "lenient::optional")]
    pub cortisol_pattern: Option<CortisolPattern>,
    #[serde(deserialize_with = "lenient::optional")]
    pub sex_hormones: Option<SexHormones>,
    #[serde(deserialize_with = "lenient::optional_list")]
    pub organic_acids: Option<Vec<HormoneResult>>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub hormone_analysis: String,
    #[serde(deserialize_with = "lenient::list")]
    pub recommendations: Vec<String>,
    #[serde(deserialize_with = "lenient::list")]
    pub follow_up_tests: Vec<String>,
}

impl DutchAnalysis {
    pub fn validate(&self) -> StructuralValidation {
        let mut reasons = Vec::new();
        match &self.cortisol_pattern {
            None => reasons.push("Missing cortisol pattern analysis".to_string()),
            Some(cortisol) if cortisol.pattern.is_none() => {
                reasons.push("Missing cortisol pattern".to_string());
            }
            Some(_) => {}
        }
        if self.sex_hormones.is_none() {
            reasons.push("Missing sex hormones analysis".to_string());
        }
        if self.organic_acids.is_none() {
            reasons.push("Missing organic acids analysis".to_string());
        }
        StructuralValidation::from_reasons(reasons)
    }

    fn cortisol_abnormal(&self) -> bool {
        self.cortisol_pattern
            .as_ref()
            .and_then(|cortisol| cortisol.pattern.as_ref())
            .is_some_and(|pattern| !pattern.is_normal())
    }

    fn abnormal_sex_hormones(&self) -> usize {
        self.sex_hormones
            .as_ref()
            .map(|hormones| hormones.abnormal().count())
            .unwrap_or(0)
    }

    fn abnormal_organic_acids(&self) -> usize {
        self.organic_acids
            .iter()
            .flatten()
            .filter(|acid| !acid.status.is_normal())
            .count()
    }

    /// 100 minus fixed penalties per abnormal finding, never below zero.
    pub fn hormone_health_score(&self) -> u32 {
        let mut score = 100;
        if self.cortisol_abnormal() {
            score -= CORTISOL_PENALTY;
        }
        score -= SEX_HORMONE_PENALTY * self.abnormal_sex_hormones() as i32;
        score -= ORGANIC_ACID_PENALTY * self.abnormal_organic_acids() as i32;
        score.max(0) as u32
    }

    pub fn imbalance_summary(&self) -> Vec<String> {
        let mut summary = Vec::new();

        if let Some(cortisol) = &self.cortisol_pattern {
            let am_normal = cortisol.am.as_ref().is_none_or(|am| am.status.is_normal());
            let pm_normal = cortisol.pm.as_ref().is_none_or(|pm| pm.status.is_normal());
            if !am_normal || !pm_normal {
                match &cortisol.pattern {
                    Some(pattern) => summary.push(format!("Cortisol pattern: {}", pattern)),
                    None => summary.push("Cortisol pattern: unknown".to_string()),
                }
                if let Some(am) = &cortisol.am {
                    summary.push(format!("AM cortisol: {}", am.reading()));
                }
                if let Some(pm) = &cortisol.pm {
                    summary.push(format!("PM cortisol: {}", pm.reading()));
                }
            }
        }

        if let Some(hormones) = &self.sex_hormones {
            summary.extend(
                hormones
                    .abnormal()
                    .map(|(name, result)| format!("{}: {}", name, result.reading())),
            );
        }

        summary
    }

    pub fn priority_recommendations(&self) -> Vec<String> {
        let mut priorities = Vec::new();
        if self.cortisol_abnormal() {
            priorities.push("Address adrenal function and stress management".to_string());
        }
        if self.abnormal_sex_hormones() > 0 {
            priorities.push("Address sex hormone balance".to_string());
        }
        if self.abnormal_organic_acids() > 0 {
            priorities.push("Address metabolic pathways and nutrient deficiencies".to_string());
        }
        priorities
    }

    pub fn follow_up_tests(&self) -> Vec<String> {
        let mut tests = Vec::new();
        if self.cortisol_abnormal() {
            tests.push("Repeat cortisol testing in 3 months".to_string());
            tests.push("Consider adrenal stress index".to_string());
        }
        if self.abnormal_sex_hormones() > 0 {
            tests.push("Repeat sex hormone panel in 3 months".to_string());
        }
        if self.abnormal_organic_acids() > 0 {
            tests.push("Consider comprehensive metabolic panel".to_string());
            tests.push("Vitamin and mineral testing".to_string());
        }
        tests
    }
}

pub struct DutchAnalyzer {
    extraction: StructuredExtraction,
}

impl DutchAnalyzer {
    pub fn new(extraction: StructuredExtraction) -> Self {
        Self { extraction }
    }
}

#[async_trait]
impl ReportAnalyzer for DutchAnalyzer {
    fn report_type(&self) -> ReportType {
        ReportType::Dutch
    }

    async fn analyze(
        &self,
        _document: Arc<RawDocument>,
        corpus: &str,
    ) -> Result<AnalyzerOutput, LabReportError> {
        let analysis: DutchAnalysis = self
            .extraction
            .request(
                ReportType::Dutch,
                SYSTEM_PROMPT,
                format!(
                    "Please analyze this Dutch hormone test and extract all relevant data:\n\n{}",
                    corpus
                ),
                Vec::new(),
            )
            .await?;

        Ok(AnalyzerOutput {
            identity: self.extraction.identity(corpus),
            analysis: TypeSpecificAnalysis::Dutch(analysis),
        })
    }
}
