pub mod analyze;
pub mod classify;
pub mod extract;
pub mod validate;

pub use analyze::AnalyzeTask;
pub use classify::ClassifyTask;
pub use extract::ExtractTask;
pub use validate::ValidateTask;

use graph_flow::{Context, GraphError};
use std::sync::Arc;
use tracing::debug;

use crate::error::LabReportError;
use crate::models::{PipelineStage, RawDocument};

/// Context keys shared by the pipeline tasks.
pub mod session_keys {
    pub const STAGE: &str = "stage";
    pub const EXTRACTED: &str = "extracted_text";
    pub const REPORT_TYPE: &str = "report_type";
    pub const CLASSIFICATION_AMBIGUOUS: &str = "classification_ambiguous";
    pub const ANALYZED_REPORT: &str = "analyzed_report";
    pub const RESULT: &str = "analysis_result";
    pub const VERDICT: &str = "validation_verdict";
}

/// Record the stage a task is entering so failures can be attributed.
pub(crate) fn enter_stage(context: &Context, stage: PipelineStage) -> graph_flow::Result<()> {
    debug!(%stage, "Entering stage");
    context.set_sync(session_keys::STAGE, stage)
}

pub(crate) fn document(context: &Context, task_id: &str) -> graph_flow::Result<Arc<RawDocument>> {
    context.attachment::<RawDocument>().ok_or_else(|| {
        GraphError::task_failed(
            task_id,
            LabReportError::Workflow("no document attached to the run".to_string()),
        )
    })
}
