use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::error::LabReportError;
use crate::models::{DocumentKind, RawDocument};

static ALPHABETIC_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z]{5,}").unwrap());
static NUMERIC_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(\.\d+)?").unwrap());
static VISUAL_CONTENT_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(image|chart|graph)s?\b").unwrap());

const MIN_TEXT_CHARS: usize = 100;
const MIN_LINES: usize = 10;
const MIN_CHARS_PER_PAGE: usize = 200;
const MIN_NUMERIC_TOKENS: usize = 5;

/// Text pulled from the document's own structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLayer {
    pub text: String,
    pub page_count: usize,
}

/// Text-layer extraction over the `pdf-extract` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Plain-text documents are returned verbatim. PDFs are parsed on the
    /// blocking pool; a parser panic surfaces as `ExtractionServiceFailure`.
    pub async fn extract(&self, document: Arc<RawDocument>) -> Result<TextLayer, LabReportError> {
        if let Some(text) = document.as_text() {
            info!(chars = text.len(), "Document is a plain-text export, skipping PDF parsing");
            return Ok(TextLayer {
                text: text.to_string(),
                page_count: 1,
            });
        }

        if document.kind == DocumentKind::Pdf && !document.has_pdf_header() {
            return Err(LabReportError::CorruptDocument(
                "missing %PDF header".to_string(),
            ));
        }

        let parsed = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&document.bytes)
                .map_err(|e| e.to_string())
        })
        .await;

        let pages = match parsed {
            Ok(Ok(pages)) => pages,
            Ok(Err(message)) => {
                warn!(error = %message, "PDF parser rejected the document");
                return Err(classify_parser_error(&message));
            }
            Err(join_error) => {
                warn!(error = %join_error, "PDF parser crashed");
                return Err(LabReportError::ExtractionServiceFailure(join_error.to_string()));
            }
        };

        let page_count = pages.len();
        let text = pages.join("\n");
        info!(page_count, chars = text.len(), "Extracted PDF text layer");
        Ok(TextLayer { text, page_count })
    }
}

/// Map a parser error message onto the extraction taxonomy.
pub fn classify_parser_error(message: &str) -> LabReportError {
    let lower = message.to_lowercase();
    if lower.contains("password") {
        LabReportError::PasswordProtected
    } else if lower.contains("encrypt") || lower.contains("decrypt") {
        LabReportError::Encrypted
    } else {
        LabReportError::CorruptDocument(message.to_string())
    }
}

/// Every heuristic that says the text layer is not enough on its own.
pub fn fallback_reasons(text: &str, page_count: usize) -> Vec<&'static str> {
    let mut reasons = Vec::new();
    let trimmed = text.trim();
    let chars = trimmed.chars().count();

    if chars < MIN_TEXT_CHARS {
        reasons.push("text shorter than 100 characters");
    }
    if trimmed.lines().filter(|line| !line.trim().is_empty()).count() < MIN_LINES {
        reasons.push("fewer than 10 lines");
    }
    if !ALPHABETIC_RUN.is_match(trimmed) {
        reasons.push("no words found");
    }
    if VISUAL_CONTENT_HINT.is_match(trimmed) {
        reasons.push("mentions images, charts or graphs");
    }
    if page_count > 1 && chars / page_count < MIN_CHARS_PER_PAGE {
        reasons.push("sparse text per page");
    }
    if NUMERIC_TOKEN.find_iter(trimmed).count() < MIN_NUMERIC_TOKENS {
        reasons.push("fewer than 5 numbers");
    }

    if !reasons.is_empty() {
        debug!(?reasons, page_count, chars, "Text layer looks insufficient");
    }
    reasons
}

pub fn needs_vision_fallback(text: &str, page_count: usize) -> bool {
    !fallback_reasons(text, page_count).is_empty()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A single-page PDF with one text line per entry.
    pub(crate) fn make_text_pdf(lines: &[&str]) -> Vec<u8> {
        use lopdf::dictionary;
        use lopdf::{Document, Object, Stream};

        let mut doc = Document::with_version("1.4");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut content = String::from("BT /F1 11 Tf 50 750 Td ");
        for line in lines {
            content.push_str(&format!("({}) Tj 0 -14 Td ", line));
        }
        content.push_str("ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        });
        if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(page_id) {
            dict.set("Parent", pages_id);
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    pub(crate) fn rich_report_text() -> String {
        let mut lines = vec!["NUTRIQ ASSESSMENT REPORT".to_string(), "Patient Name: Jane Doe".to_string()];
        for (i, system) in ["Energy", "Mood", "Sleep", "Stress", "Digestion", "Immunity", "Hormones", "Detox"]
            .iter()
            .enumerate()
        {
            lines.push(format!("{} score: {} of 100, reviewed {}", system, 40 + i * 5, 2020 + i));
        }
        lines.join("\n")
    }

    #[test]
    fn rich_text_needs_no_fallback() {
        let text = rich_report_text();
        assert!(fallback_reasons(&text, 1).is_empty(), "{:?}", fallback_reasons(&text, 1));
        assert!(!needs_vision_fallback(&text, 1));
    }

    #[test]
    fn empty_or_sparse_text_needs_fallback() {
        assert!(needs_vision_fallback("", 1));
        assert!(needs_vision_fallback("Patient Name: Jane Doe", 1));
    }

    #[test]
    fn chart_mentions_force_fallback() {
        let text = format!("{}\nSee the glucose chart below", rich_report_text());
        assert!(fallback_reasons(&text, 1).contains(&"mentions images, charts or graphs"));
        assert!(!needs_vision_fallback(&rich_report_text().replace("reviewed", "paragraph"), 1));
    }

    #[test]
    fn per_page_density_only_counts_for_multi_page_documents() {
        let text = rich_report_text();
        assert!(!needs_vision_fallback(&text, 1));
        assert!(fallback_reasons(&text, 5).contains(&"sparse text per page"));
    }

    #[test]
    fn parser_errors_are_classified_by_message() {
        assert!(matches!(
            classify_parser_error("document requires a password"),
            LabReportError::PasswordProtected
        ));
        assert!(matches!(
            classify_parser_error("failed to decrypt stream"),
            LabReportError::Encrypted
        ));
        assert!(matches!(
            classify_parser_error("Invalid file trailer"),
            LabReportError::CorruptDocument(_)
        ));
    }

    #[tokio::test]
    async fn plain_text_bypasses_the_parser() {
        let document = Arc::new(RawDocument::sniff(rich_report_text().into_bytes()));
        let layer = PdfTextExtractor::new().extract(document).await.unwrap();

        assert_eq!(layer.page_count, 1);
        assert!(layer.text.starts_with("NUTRIQ ASSESSMENT REPORT"));
    }

    #[tokio::test]
    async fn buffers_without_pdf_magic_are_corrupt() {
        let document = Arc::new(RawDocument::sniff(b"GIF89a not a pdf".to_vec()));
        let err = PdfTextExtractor::new().extract(document).await.unwrap_err();
        assert!(matches!(err, LabReportError::CorruptDocument(_)));
    }

    #[tokio::test]
    async fn text_pdf_is_parsed() {
        let bytes = make_text_pdf(&["Glucose Summary", "Average 104 mg/dL"]);
        let document = Arc::new(RawDocument::sniff(bytes));
        let layer = PdfTextExtractor::new().extract(document).await.unwrap();

        assert_eq!(layer.page_count, 1);
        assert!(layer.text.contains("Glucose"), "got: {}", layer.text);
    }
}
