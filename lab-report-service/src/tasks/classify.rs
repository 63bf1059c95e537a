use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;

use super::{enter_stage, session_keys};
use crate::classifier::ReportClassifier;
use crate::models::{ExtractedText, PipelineStage};

pub struct ClassifyTask {
    classifier: Arc<ReportClassifier>,
}

impl ClassifyTask {
    pub const ID: &'static str = "classify";

    pub fn new(classifier: Arc<ReportClassifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl Task for ClassifyTask {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        enter_stage(&context, PipelineStage::Classifying)?;
        let extracted: ExtractedText = context.require(session_keys::EXTRACTED).await?;

        let classification = self
            .classifier
            .classify(&extracted.combined)
            .await
            .map_err(|e| GraphError::task_failed(Self::ID, e))?;

        context
            .set(session_keys::REPORT_TYPE, classification.report_type)
            .await?;
        context
            .set(session_keys::CLASSIFICATION_AMBIGUOUS, classification.ambiguous)
            .await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(format!("Classified as {}", classification.report_type)),
        ))
    }
}
