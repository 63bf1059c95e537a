//! Turning an uploaded document into one text corpus.

pub mod combine;
pub mod text;
pub mod vision;

pub use combine::{TEXT_LAYER_SEPARATOR, combine};
pub use text::{PdfTextExtractor, TextLayer, classify_parser_error, fallback_reasons, needs_vision_fallback};
pub use vision::{PageRasterizer, PdfPageRasterizer, RasterizeError, VisionFallbackExtractor};

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::LabReportError;
use crate::inference::InferenceClient;
use crate::models::{DocumentKind, ExtractedText, RawDocument};

/// Words that mark a text layer as belonging to a supported report.
pub const DOMAIN_KEYWORDS: &[&str] = &[
    "nutriq",
    "naq",
    "assessment",
    "kbmo",
    "igg",
    "food",
    "dutch",
    "cortisol",
    "hormone",
    "glucose",
    "cgm",
    "patient",
    "symptom",
];

const USABLE_TEXT_LAYER_CHARS: usize = 100;

pub fn has_domain_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    DOMAIN_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Whether the text layer alone is worth analyzing when vision is unavailable.
pub fn is_usable_text_layer(text: &str) -> bool {
    text.trim().chars().count() > USABLE_TEXT_LAYER_CHARS && has_domain_keyword(text)
}

/// Text layer first, vision when the heuristic asks for it, then combine.
pub struct DocumentExtractor {
    text: PdfTextExtractor,
    vision: VisionFallbackExtractor,
}

impl DocumentExtractor {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        rasterizer: Arc<dyn PageRasterizer>,
        vision_max_pages: usize,
    ) -> Self {
        Self {
            text: PdfTextExtractor::new(),
            vision: VisionFallbackExtractor::new(inference, rasterizer, vision_max_pages),
        }
    }

    pub async fn extract(&self, document: Arc<RawDocument>) -> Result<ExtractedText, LabReportError> {
        let (text_layer, page_count, layer_failed) = match self.text.extract(document.clone()).await {
            Ok(layer) => (layer.text, layer.page_count, false),
            Err(LabReportError::ExtractionServiceFailure(reason)) => {
                warn!(%reason, "Text layer unavailable, relying on vision");
                (String::new(), 0, true)
            }
            Err(e) => return Err(e),
        };

        let wants_vision = document.kind == DocumentKind::Pdf
            && (layer_failed || needs_vision_fallback(&text_layer, page_count));

        let vision_layer = if wants_vision {
            info!(page_count, text_chars = text_layer.len(), "Using vision fallback");
            match self.vision.analyze(document, &text_layer).await {
                Ok(text) => Some(text).filter(|t| !t.trim().is_empty()),
                Err(e) if is_usable_text_layer(&text_layer) => {
                    warn!(error = %e, "Vision failed, continuing with the text layer");
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let combined = combine(&text_layer, vision_layer.as_deref());
        if combined.trim().is_empty() {
            return Err(LabReportError::EmptyOrUnreadable);
        }

        info!(
            combined_chars = combined.len(),
            vision_used = vision_layer.is_some(),
            "Document text ready"
        );
        Ok(ExtractedText {
            text_layer,
            vision_layer,
            combined,
            has_image_content: wants_vision,
            page_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::text::tests::{make_text_pdf, rich_report_text};
    use crate::inference::{InferenceError, InferencePurpose};
    use crate::test_support::{FakeRasterizer, ScriptedInference};

    fn extractor(inference: Arc<ScriptedInference>) -> DocumentExtractor {
        DocumentExtractor::new(inference, Arc::new(FakeRasterizer::pages(2)), 10)
    }

    #[tokio::test]
    async fn plain_text_never_reaches_vision() {
        let inference = Arc::new(ScriptedInference::new());
        let document = Arc::new(RawDocument::sniff(b"Patient Name: Jane Doe".to_vec()));

        let extracted = extractor(inference.clone()).extract(document).await.unwrap();

        assert_eq!(extracted.combined, "Patient Name: Jane Doe");
        assert!(!extracted.has_image_content);
        assert!(inference.requests().is_empty());
    }

    #[tokio::test]
    async fn rich_plain_text_is_kept_verbatim() {
        let inference = Arc::new(ScriptedInference::new());
        let document = Arc::new(RawDocument::sniff(rich_report_text().into_bytes()));

        let extracted = extractor(inference).extract(document).await.unwrap();
        assert_eq!(extracted.combined, rich_report_text());
        assert!(!extracted.vision_used());
    }

    #[tokio::test]
    async fn sparse_pdf_text_is_combined_with_vision() {
        let inference = Arc::new(ScriptedInference::new().reply(
            InferencePurpose::VisionExtraction,
            Ok("KBMO FIT 176 food panel".to_string()),
        ));
        let document = Arc::new(RawDocument::sniff(make_text_pdf(&["Glucose"])));

        let extracted = extractor(inference.clone()).extract(document).await.unwrap();

        assert!(extracted.has_image_content);
        assert!(extracted.vision_used());
        assert!(extracted.combined.starts_with("KBMO FIT 176 food panel"));
        assert_eq!(inference.requests().len(), 1);
    }

    #[tokio::test]
    async fn empty_text_and_blank_vision_is_unreadable() {
        let inference = Arc::new(
            ScriptedInference::new()
                .reply(InferencePurpose::VisionExtraction, Ok(String::new()))
                .reply(InferencePurpose::VisionExtraction, Ok("  ".to_string())),
        );
        let document = Arc::new(RawDocument::sniff(make_text_pdf(&[])));

        let err = extractor(inference.clone()).extract(document).await.unwrap_err();

        assert!(matches!(err, LabReportError::EmptyOrUnreadable));
        assert_eq!(inference.requests().len(), 2);
    }

    #[tokio::test]
    async fn failed_vision_keeps_a_usable_text_layer() {
        let inference = Arc::new(
            ScriptedInference::new()
                .reply(InferencePurpose::VisionExtraction, Err(InferenceError::RateLimited))
                .reply(InferencePurpose::VisionExtraction, Err(InferenceError::RateLimited)),
        );
        let document = Arc::new(RawDocument::sniff(make_text_pdf(&[
            "NUTRIQ ASSESSMENT for the patient with a symptom chart attached",
            "Energy and mood sections follow after the summary page of this report",
        ])));

        let extracted = extractor(inference).extract(document).await.unwrap();

        assert!(extracted.combined.contains("NUTRIQ"));
        assert!(extracted.vision_layer.is_none());
        assert!(extracted.has_image_content);
    }

    #[test]
    fn usable_text_layer_needs_length_and_keyword() {
        assert!(!is_usable_text_layer("cortisol"));
        assert!(!is_usable_text_layer(&"lorem ipsum ".repeat(20)));
        assert!(is_usable_text_layer(&format!("{} cortisol", "lorem ipsum ".repeat(20))));
    }
}
