use graph_flow::{Graph, GraphBuilder};
use std::collections::HashMap;
use std::sync::Arc;

use crate::analyzers::ReportAnalyzer;
use crate::classifier::ReportClassifier;
use crate::extraction::DocumentExtractor;
use crate::models::ReportType;
use crate::tasks::{AnalyzeTask, ClassifyTask, ExtractTask, ValidateTask, session_keys};

/// extract -> classify -> analyze_<type> -> validate
pub fn build_lab_report_workflow(
    extractor: Arc<DocumentExtractor>,
    classifier: Arc<ReportClassifier>,
    analyzers: &HashMap<ReportType, Arc<dyn ReportAnalyzer>>,
) -> Graph {
    let mut builder = GraphBuilder::new("lab_report_workflow")
        .add_task(Arc::new(ExtractTask::new(extractor)))
        .add_task(Arc::new(ClassifyTask::new(classifier)))
        .add_task(Arc::new(ValidateTask))
        .add_edge(ExtractTask::ID, ClassifyTask::ID);

    for report_type in ReportType::ALL {
        let Some(analyzer) = analyzers.get(&report_type) else {
            continue;
        };
        let analyze_id = AnalyzeTask::id_for(report_type);
        builder = builder
            .add_task(Arc::new(AnalyzeTask::new(analyzer.clone())))
            .add_conditional_edge(ClassifyTask::ID, analyze_id.clone(), move |context| {
                context.get_sync::<ReportType>(session_keys::REPORT_TYPE) == Some(report_type)
            })
            .add_edge(analyze_id, ValidateTask::ID);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::standard_analyzers;
    use crate::config::AmbiguousReportPolicy;
    use crate::identity::IdentityExtractor;
    use crate::test_support::{FakeRasterizer, ScriptedInference};
    use graph_flow::Context;

    fn workflow() -> Graph {
        let inference = Arc::new(ScriptedInference::new());
        build_lab_report_workflow(
            Arc::new(DocumentExtractor::new(
                inference.clone(),
                Arc::new(FakeRasterizer::pages(1)),
                10,
            )),
            Arc::new(ReportClassifier::new(
                inference.clone(),
                AmbiguousReportPolicy::default(),
            )),
            &standard_analyzers(inference, IdentityExtractor::default()),
        )
    }

    #[test]
    fn starts_at_extraction() {
        assert_eq!(workflow().start_task_id(), Some(ExtractTask::ID));
    }

    #[test]
    fn classified_type_selects_its_analyzer() {
        let graph = workflow();
        let context = Context::new();

        for report_type in ReportType::ALL {
            context
                .set_sync(session_keys::REPORT_TYPE, report_type)
                .unwrap();
            assert_eq!(
                graph.find_next_task(ClassifyTask::ID, &context),
                Some(AnalyzeTask::id_for(report_type))
            );
            assert_eq!(
                graph.find_next_task(&AnalyzeTask::id_for(report_type), &context).as_deref(),
                Some(ValidateTask::ID)
            );
        }
    }

    #[test]
    fn unclassified_context_has_no_route() {
        let graph = workflow();
        assert_eq!(graph.find_next_task(ClassifyTask::ID, &Context::new()), None);
    }
}
