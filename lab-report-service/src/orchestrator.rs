//! The master analyzer: one document in, one verdict out.

use graph_flow::{Context, Graph, GraphError};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::analyzers::standard_analyzers;
use crate::classifier::ReportClassifier;
use crate::config::PipelineConfig;
use crate::error::{LabReportError, PipelineFailure};
use crate::extraction::{DocumentExtractor, PageRasterizer};
use crate::identity::IdentityExtractor;
use crate::inference::InferenceClient;
use crate::models::{
    AnalysisOutcome, AnalysisResult, ClientAnalysis, FormData, PdfExtractedData, PipelineStage,
    RawDocument, TypeSpecificAnalysis, ValidationVerdict,
};
use crate::reconcile::{ClientDataPriority, validate_analysis_data};
use crate::tasks::session_keys;
use crate::workflow::build_lab_report_workflow;

/// Owns the pipeline graph and its collaborators. Cheap to share behind an
/// `Arc`; every run gets its own context.
pub struct MasterAnalyzer {
    graph: Arc<Graph>,
    permits: Arc<Semaphore>,
    reconciler: ClientDataPriority,
}

impl MasterAnalyzer {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        rasterizer: Arc<dyn PageRasterizer>,
        config: PipelineConfig,
    ) -> Self {
        Self::with_identity(inference, rasterizer, config, IdentityExtractor::default())
    }

    pub fn with_identity(
        inference: Arc<dyn InferenceClient>,
        rasterizer: Arc<dyn PageRasterizer>,
        config: PipelineConfig,
        identity: IdentityExtractor,
    ) -> Self {
        let extractor = Arc::new(DocumentExtractor::new(
            inference.clone(),
            rasterizer,
            config.vision_max_pages,
        ));
        let classifier = Arc::new(ReportClassifier::new(
            inference.clone(),
            config.ambiguous_report_policy,
        ));
        let analyzers = standard_analyzers(inference, identity.clone());
        let graph = build_lab_report_workflow(extractor, classifier, &analyzers);

        Self {
            graph: Arc::new(graph),
            permits: Arc::new(Semaphore::new(config.max_concurrent_documents.max(1))),
            reconciler: ClientDataPriority::new(identity, config.name_match_policy),
        }
    }

    /// Run the full pipeline over one document.
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub async fn analyze_report(&self, bytes: Vec<u8>) -> Result<AnalysisOutcome, PipelineFailure> {
        let _permit = self.permits.acquire().await.map_err(|_| {
            PipelineFailure::new(
                PipelineStage::Extracting,
                LabReportError::Workflow("pipeline is shutting down".to_string()),
            )
        })?;

        let started = Instant::now();
        let context = Context::new();
        context.attach(Arc::new(RawDocument::sniff(bytes)));

        match self.run(&context).await {
            Ok((mut result, verdict)) => {
                result.processing_time_ms = started.elapsed().as_millis() as u64;
                info!(
                    report_type = %result.report_type,
                    confidence = result.confidence,
                    processing_time_ms = result.processing_time_ms,
                    accepted = verdict.valid,
                    "Lab report analysis finished"
                );
                if verdict.valid {
                    Ok(AnalysisOutcome::Accepted { result })
                } else {
                    Ok(AnalysisOutcome::Rejected {
                        result,
                        reasons: verdict.reasons,
                    })
                }
            }
            Err(err) => {
                let stage = context
                    .get_sync::<PipelineStage>(session_keys::STAGE)
                    .unwrap_or(PipelineStage::Extracting);
                let failure = PipelineFailure::new(stage, into_lab_error(err));
                error!(
                    stage = %failure.stage,
                    kind = failure.error.kind(),
                    error = %failure.error,
                    processing_time_ms = started.elapsed().as_millis() as u64,
                    "Lab report analysis failed"
                );
                Err(failure)
            }
        }
    }

    async fn run(&self, context: &Context) -> graph_flow::Result<(AnalysisResult, ValidationVerdict)> {
        let execution = self.graph.execute_from_start(context.clone()).await?;
        info!(tasks = ?execution.visited, "Workflow completed");

        let result = context.require(session_keys::RESULT).await?;
        let verdict = context.require(session_keys::VERDICT).await?;
        Ok((result, verdict))
    }

    /// Run the pipeline, then reconcile the operator-entered identity with
    /// the one found in the document.
    pub async fn analyze_for_client(
        &self,
        bytes: Vec<u8>,
        form: &FormData,
    ) -> Result<ClientAnalysis, PipelineFailure> {
        let outcome = self.analyze_report(bytes).await?;
        let report = &outcome.result().analyzed_report;

        let pdf = PdfExtractedData {
            client_name: report.identity.patient_name.clone(),
            assessment_date: report.identity.test_date,
            raw_text: report.combined_text.clone(),
        };
        let client_data = self.reconciler.reconcile(form, &pdf);
        let issues = validate_analysis_data(&client_data, &pdf);
        if !issues.is_empty() {
            warn!(?issues, data_source = ?client_data.data_source, "Client data needs review");
        }

        Ok(ClientAnalysis {
            outcome,
            client_data,
        })
    }

    /// Human-readable multi-line summary of a finished analysis.
    pub fn summary(result: &AnalysisResult) -> String {
        let report = &result.analyzed_report;
        let mut summary = String::new();

        let _ = writeln!(summary, "Report Type: {}", result.report_type.as_str().to_uppercase());
        let _ = writeln!(summary, "Confidence: {:.1}%", result.confidence * 100.0);
        if let Some(name) = &report.identity.patient_name {
            let _ = writeln!(summary, "Patient: {}", name);
        }
        if let Some(date) = &report.identity.test_date {
            let _ = writeln!(summary, "Test Date: {}", date);
        }

        match &report.type_specific_analysis {
            TypeSpecificAnalysis::Nutriq(analysis) => {
                let _ = writeln!(summary, "Total Score: {}", score_or_na(analysis.total_score));
                let systems = analysis
                    .body_systems
                    .as_ref()
                    .map(|systems| systems.present().count())
                    .unwrap_or(0);
                let _ = writeln!(summary, "Body Systems Analyzed: {}", systems);
                list_lines(&mut summary, "Priority", &analysis.priority_systems());
            }
            TypeSpecificAnalysis::Kbmo(analysis) => {
                let _ = writeln!(summary, "Total IgG Score: {}", score_or_na(analysis.total_igg_score));
                let _ = writeln!(summary, "Summed IgG Levels: {}", analysis.calculate_total_igg_score());
                let _ = writeln!(summary, "High Sensitivity Foods: {}", analysis.high().len());
                let _ = writeln!(summary, "Moderate Sensitivity Foods: {}", analysis.moderate().len());
                let plan = analysis.elimination_diet_plan();
                if !plan.is_empty() {
                    for line in plan.into_iter().chain(analysis.reintroduction_schedule()) {
                        let _ = writeln!(summary, "{}", line);
                    }
                }
            }
            TypeSpecificAnalysis::Dutch(analysis) => {
                if let Some(pattern) = analysis
                    .cortisol_pattern
                    .as_ref()
                    .and_then(|cortisol| cortisol.pattern.as_ref())
                {
                    let _ = writeln!(summary, "Cortisol Pattern: {}", pattern);
                }
                let acids = analysis.organic_acids.as_ref().map(Vec::len).unwrap_or(0);
                let _ = writeln!(summary, "Organic Acids Analyzed: {}", acids);
                let _ = writeln!(summary, "Hormone Health Score: {}/100", analysis.hormone_health_score());
                list_lines(&mut summary, "Imbalance", &analysis.imbalance_summary());
                list_lines(&mut summary, "Priority", &analysis.priority_recommendations());
                list_lines(&mut summary, "Follow-up", &analysis.follow_up_tests());
            }
            TypeSpecificAnalysis::Cgm(_) => {
                let _ = writeln!(summary, "CGM Data Analyzed");
            }
            TypeSpecificAnalysis::FoodPhoto(analysis) => {
                let _ = writeln!(summary, "Food Photo Analyzed");
                if !analysis.food_items.is_empty() {
                    let _ = writeln!(summary, "Itemised Calories: {}", analysis.itemised_calories());
                }
            }
        }

        summary
    }
}

fn list_lines(summary: &mut String, label: &str, lines: &[String]) {
    for line in lines {
        let _ = writeln!(summary, "{}: {}", label, line);
    }
}

fn score_or_na(score: Option<f64>) -> String {
    score.map(|s| s.to_string()).unwrap_or_else(|| "N/A".to_string())
}

/// Recover the typed pipeline error a task raised, if any.
fn into_lab_error(err: GraphError) -> LabReportError {
    match err {
        GraphError::TaskFailed { source, .. } => match source.downcast::<LabReportError>() {
            Ok(lab_error) => *lab_error,
            Err(other) => LabReportError::Workflow(other.to_string()),
        },
        other => LabReportError::Workflow(other.to_string()),
    }
}
