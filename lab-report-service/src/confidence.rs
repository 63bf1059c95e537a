//! Heuristic confidence scoring and the gate that decides whether an
//! analysis may be stored.

use tracing::warn;

use crate::models::{AnalysisResult, AnalyzedReport, ValidationVerdict};

pub const BASE_CONFIDENCE: f64 = 0.8;
pub const MIN_STORAGE_CONFIDENCE: f64 = 0.5;

const PATIENT_NAME_BOOST: f64 = 0.10;
const TEST_DATE_BOOST: f64 = 0.05;
const STRUCTURE_BOOST: f64 = 0.05;
const VISION_BOOST: f64 = 0.05;

/// Missing optional signals contribute nothing; the result is capped at 1.0.
pub fn score(report: &AnalyzedReport) -> f64 {
    let mut confidence = BASE_CONFIDENCE;

    if report.vision_used {
        confidence += VISION_BOOST;
    }
    if report.identity.patient_name.is_some() {
        confidence += PATIENT_NAME_BOOST;
    }
    if report.identity.test_date.is_some() {
        confidence += TEST_DATE_BOOST;
    }
    if report.type_specific_analysis.validate().valid {
        confidence += STRUCTURE_BOOST;
    }

    confidence.min(1.0)
}

/// Never fails. Missing identity fields are warnings, not blockers.
pub fn validate_for_storage(result: &AnalysisResult) -> ValidationVerdict {
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();
    let report = &result.analyzed_report;

    if result.confidence < MIN_STORAGE_CONFIDENCE {
        reasons.push(format!(
            "Confidence too low: {:.1}% (minimum {}%)",
            result.confidence * 100.0,
            MIN_STORAGE_CONFIDENCE * 100.0
        ));
    }

    reasons.extend(report.type_specific_analysis.validate().reasons);

    if report.identity.patient_name.is_none() {
        warnings.push("Missing patient name".to_string());
    }
    if report.identity.test_date.is_none() {
        warnings.push("Missing test date".to_string());
    }
    if !warnings.is_empty() {
        warn!(report_type = %result.report_type, ?warnings, "Analysis stored without full identity");
    }

    ValidationVerdict {
        valid: reasons.is_empty(),
        reasons,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::CgmAnalysis;
    use crate::models::{PatientIdentity, ReportType, TypeSpecificAnalysis};
    use chrono::NaiveDate;

    fn valid_cgm() -> TypeSpecificAnalysis {
        TypeSpecificAnalysis::Cgm(CgmAnalysis {
            average_glucose: Some(110.0),
            time_in_range: Some(80.0),
            ..Default::default()
        })
    }

    fn report(
        name: bool,
        date: bool,
        structure_valid: bool,
        vision_used: bool,
    ) -> AnalyzedReport {
        AnalyzedReport {
            identity: PatientIdentity {
                patient_name: name.then(|| "Jane Doe".to_string()),
                test_date: date.then(|| NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()),
                ..Default::default()
            },
            raw_text: String::new(),
            combined_text: String::new(),
            has_image_content: vision_used,
            vision_used,
            page_count: 1,
            type_specific_analysis: if structure_valid {
                valid_cgm()
            } else {
                TypeSpecificAnalysis::Cgm(CgmAnalysis::default())
            },
        }
    }

    fn result(report: AnalyzedReport, confidence: f64) -> AnalysisResult {
        AnalysisResult {
            report_type: ReportType::Cgm,
            analyzed_report: report,
            processing_time_ms: 0,
            confidence,
        }
    }

    #[test]
    fn bare_report_scores_the_base() {
        assert!((score(&report(false, false, false, false)) - 0.8).abs() < 1e-9);
        assert!((score(&report(true, false, false, false)) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_monotonic_and_capped() {
        let mut previous = 0.0;
        for signals in 0..=4 {
            let confidence = score(&report(signals > 0, signals > 1, signals > 2, signals > 3));
            assert!(confidence >= previous, "{signals} signals");
            assert!(confidence <= 1.0);
            previous = confidence;
        }
        assert_eq!(score(&report(true, true, true, true)), 1.0);
    }

    #[test]
    fn low_confidence_is_rejected_with_reason() {
        let verdict = validate_for_storage(&result(report(true, true, true, false), 0.42));
        assert!(!verdict.valid);
        assert_eq!(verdict.reasons, vec!["Confidence too low: 42.0% (minimum 50%)"]);
    }

    #[test]
    fn structural_failures_block_storage() {
        let verdict = validate_for_storage(&result(report(true, true, false, false), 0.9));
        assert!(!verdict.valid);
        assert_eq!(verdict.reasons.len(), 2);
    }

    #[test]
    fn missing_identity_only_warns() {
        let verdict = validate_for_storage(&result(report(false, false, true, false), 0.85));
        assert!(verdict.valid);
        assert_eq!(verdict.warnings, vec!["Missing patient name", "Missing test date"]);
    }
}
