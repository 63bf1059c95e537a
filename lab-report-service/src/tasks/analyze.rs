use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use super::{document, enter_stage, session_keys};
use crate::analyzers::ReportAnalyzer;
use crate::models::{AnalyzedReport, ExtractedText, PipelineStage, ReportType};

/// Runs one type-specific analyzer over the extracted corpus.
pub struct AnalyzeTask {
    id: String,
    analyzer: Arc<dyn ReportAnalyzer>,
}

impl AnalyzeTask {
    pub fn new(analyzer: Arc<dyn ReportAnalyzer>) -> Self {
        Self {
            id: Self::id_for(analyzer.report_type()),
            analyzer,
        }
    }

    pub fn id_for(report_type: ReportType) -> String {
        format!("analyze_{}", report_type)
    }
}

#[async_trait]
impl Task for AnalyzeTask {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        enter_stage(&context, PipelineStage::Analyzing)?;
        let document = document(&context, &self.id)?;
        let extracted: ExtractedText = context.require(session_keys::EXTRACTED).await?;

        let report_type = self.analyzer.report_type();
        info!(%report_type, corpus_chars = extracted.combined.len(), "Analyzing report");

        let output = self
            .analyzer
            .analyze(document, &extracted.combined)
            .await
            .map_err(|e| GraphError::task_failed(self.id.as_str(), e))?;

        let vision_used = extracted.vision_used();
        let report = AnalyzedReport {
            identity: output.identity,
            raw_text: extracted.text_layer,
            combined_text: extracted.combined,
            has_image_content: extracted.has_image_content,
            vision_used,
            page_count: extracted.page_count,
            type_specific_analysis: output.analysis,
        };
        context.set(session_keys::ANALYZED_REPORT, report).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(format!("{} analysis complete", report_type)),
        ))
    }
}
