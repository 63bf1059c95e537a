pub mod analyzers;
pub mod classifier;
pub mod confidence;
pub mod config;
pub mod error;
pub mod extraction;
pub mod identity;
pub mod inference;
pub mod models;
pub mod orchestrator;
pub mod reconcile;
pub mod service;
pub mod storage;
pub mod tasks;
pub mod telemetry;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{PipelineConfig, ServiceConfig};
pub use error::{LabReportError, PipelineFailure};
pub use extraction::{PageRasterizer, PdfPageRasterizer};
pub use inference::{InferenceClient, OpenRouterClient};
pub use models::*;
pub use orchestrator::MasterAnalyzer;
pub use service::{AppState, build_router, create_app};
pub use workflow::build_lab_report_workflow;
