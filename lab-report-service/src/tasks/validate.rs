use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use tracing::{info, warn};

use super::{enter_stage, session_keys};
use crate::confidence;
use crate::models::{AnalysisResult, AnalyzedReport, PipelineStage, ReportType};

/// Scores the analysis and records the storage verdict. Never fails on
/// content; a bad analysis is a rejected verdict, not an error.
pub struct ValidateTask;

impl ValidateTask {
    pub const ID: &'static str = "validate";
}

#[async_trait]
impl Task for ValidateTask {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        enter_stage(&context, PipelineStage::Validating)?;
        let report_type: ReportType = context.require(session_keys::REPORT_TYPE).await?;
        let report: AnalyzedReport = context.require(session_keys::ANALYZED_REPORT).await?;

        let result = AnalysisResult {
            report_type,
            confidence: confidence::score(&report),
            analyzed_report: report,
            processing_time_ms: 0,
        };
        let verdict = confidence::validate_for_storage(&result);

        if verdict.valid {
            info!(%report_type, confidence = result.confidence, "Analysis passed validation");
        } else {
            warn!(%report_type, reasons = ?verdict.reasons, "Analysis rejected for storage");
        }

        let status = if verdict.valid { "accepted" } else { "rejected" };
        context.set(session_keys::RESULT, result).await?;
        context.set(session_keys::VERDICT, verdict).await?;
        context.set(session_keys::STAGE, PipelineStage::Done).await?;

        Ok(TaskResult::new_with_status(
            Some(status.to_string()),
            NextAction::End,
            Some(format!("Validation {}", status)),
        ))
    }
}
