use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use super::{document, enter_stage, session_keys};
use crate::extraction::DocumentExtractor;
use crate::models::PipelineStage;

pub struct ExtractTask {
    extractor: Arc<DocumentExtractor>,
}

impl ExtractTask {
    pub const ID: &'static str = "extract";

    pub fn new(extractor: Arc<DocumentExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Task for ExtractTask {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(&self, context: Context) -> Result<TaskResult> {
        enter_stage(&context, PipelineStage::Extracting)?;
        let document = document(&context, Self::ID)?;
        info!(bytes = document.len(), kind = ?document.kind, "Extracting document text");

        let extracted = self
            .extractor
            .extract(document)
            .await
            .map_err(|e| GraphError::task_failed(Self::ID, e))?;

        let status = format!(
            "Extracted {} characters from {} page(s)",
            extracted.combined.len(),
            extracted.page_count
        );
        context.set(session_keys::EXTRACTED, extracted).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::ContinueAndExecute,
            Some(status),
        ))
    }
}
