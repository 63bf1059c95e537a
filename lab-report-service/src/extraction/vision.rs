use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use pdf2image::{PDF, Pages};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::error::LabReportError;
use crate::inference::{Attachment, InferenceClient, InferencePurpose, InferenceRequest};
use crate::models::RawDocument;

const VISION_SYSTEM_PROMPT: &str = "You are an expert at reading lab reports and health assessments. \
Transcribe every piece of information in the document: headings, patient details, dates, \
tables, scores, reference ranges, and values read from charts or graphs. \
Preserve the original labels such as 'Patient Name:' and 'Test Date:'. \
Return plain text only, without commentary.";

const WHOLE_DOCUMENT_PROMPT: &str =
    "Please read this lab report and extract all text and data it contains.";

const PAGE_IMAGES_CLOSING: &str = "Please extract all text, data from charts/graphs, tables, \
and any other relevant information from these pages.";

/// Characters of the text layer sent along with page images.
const TEXT_CONTEXT_CHARS: usize = 1000;

#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error("failed to load PDF for rendering: {0}")]
    Load(String),

    #[error("failed to render PDF pages: {0}")]
    Render(String),

    #[error("failed to encode page image: {0}")]
    Encode(String),

    #[error("rendering worker failed: {0}")]
    Worker(String),
}

/// Turns the first pages of a PDF into PNG images.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Render pages `1..=min(page_count, max_pages)` in page order.
    async fn rasterize(
        &self,
        document: Arc<RawDocument>,
        max_pages: usize,
    ) -> Result<Vec<Vec<u8>>, RasterizeError>;
}

/// Rasterizer over pdf2image (poppler).
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfPageRasterizer;

#[async_trait]
impl PageRasterizer for PdfPageRasterizer {
    async fn rasterize(
        &self,
        document: Arc<RawDocument>,
        max_pages: usize,
    ) -> Result<Vec<Vec<u8>>, RasterizeError> {
        info!(max_pages, "Converting PDF pages to images using pdf2image");

        let images = tokio::task::spawn_blocking(move || -> Result<Vec<DynamicImage>, RasterizeError> {
            let pdf = PDF::from_bytes(document.bytes.clone())
                .map_err(|e| RasterizeError::Load(e.to_string()))?;

            let last_page = pdf.page_count().min(max_pages as u32);
            if last_page == 0 {
                return Ok(Vec::new());
            }

            pdf.render(Pages::Range(1..=last_page), None)
                .map_err(|e| RasterizeError::Render(e.to_string()))
        })
        .await
        .map_err(|e| RasterizeError::Worker(e.to_string()))??;

        info!(pages = images.len(), "Rendered PDF pages");
        images.iter().map(encode_png).collect()
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, RasterizeError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| RasterizeError::Encode(e.to_string()))?;
    Ok(buffer)
}

/// Reads a document through the multimodal inference capability.
///
/// Tries the whole document first and, when that call fails or comes back
/// blank, renders the first pages to images and tries again.
pub struct VisionFallbackExtractor {
    inference: Arc<dyn InferenceClient>,
    rasterizer: Arc<dyn PageRasterizer>,
    max_pages: usize,
}

impl VisionFallbackExtractor {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        rasterizer: Arc<dyn PageRasterizer>,
        max_pages: usize,
    ) -> Self {
        Self {
            inference,
            rasterizer,
            max_pages,
        }
    }

    /// Returns the text read by vision, which may be empty when the model
    /// saw nothing. Errors only when both strategies failed outright.
    pub async fn analyze(
        &self,
        document: Arc<RawDocument>,
        text_layer: &str,
    ) -> Result<String, LabReportError> {
        let whole_document = InferenceRequest::new(
            InferencePurpose::VisionExtraction,
            VISION_SYSTEM_PROMPT,
            WHOLE_DOCUMENT_PROMPT,
        )
        .with_attachments(vec![Attachment::pdf(document.bytes.clone())]);

        let document_error = match self.inference.complete(whole_document).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(chars = text.len(), "Vision read the whole document");
                return Ok(text);
            }
            Ok(_) => "whole-document vision returned no text".to_string(),
            Err(e) => e.to_string(),
        };
        warn!(error = %document_error, "Whole-document vision failed, trying page images");

        match self.analyze_pages(document, text_layer).await {
            Ok(text) => Ok(text),
            Err(page_error) => {
                warn!(error = %page_error, "Page-image vision failed");
                Err(LabReportError::ExtractionServiceFailure(format!(
                    "{}; {}",
                    document_error, page_error
                )))
            }
        }
    }

    async fn analyze_pages(
        &self,
        document: Arc<RawDocument>,
        text_layer: &str,
    ) -> Result<String, String> {
        let pages = self
            .rasterizer
            .rasterize(document, self.max_pages)
            .await
            .map_err(|e| e.to_string())?;
        if pages.is_empty() {
            return Err("document has no pages to render".to_string());
        }

        info!(pages = pages.len(), "Sending page images to vision");
        let request = InferenceRequest::new(
            InferencePurpose::VisionExtraction,
            VISION_SYSTEM_PROMPT,
            page_images_prompt(text_layer),
        )
        .with_attachments(
            pages
                .into_iter()
                .enumerate()
                .map(|(index, png)| Attachment::png_page(index + 1, png))
                .collect(),
        );

        self.inference
            .complete(request)
            .await
            .map_err(|e| e.to_string())
    }
}

fn page_images_prompt(text_layer: &str) -> String {
    let context = if text_layer.trim().is_empty() {
        "The PDF appears to be image-based or contains charts/graphs.".to_string()
    } else {
        let excerpt: String = text_layer.chars().take(TEXT_CONTEXT_CHARS).collect();
        format!(
            "For context, here's what text extraction found (may be incomplete): {}",
            excerpt
        )
    };
    format!(
        "Please analyze these PDF pages and extract all relevant information. {}\n\n{}",
        context, PAGE_IMAGES_CLOSING
    )
}
