//! Document export helper
//!
//! Turns a research result into a downloadable PDF. Remote images are
//! re-fetched and embedded as base64 JPEG data before conversion, because
//! the PDF layer can only rasterize embedded bitmaps, not cross-origin
//! references. Image failures are logged and skipped; they never abort the
//! export.

mod pdf;

pub use pdf::PdfOptions;

use crate::client::ResearchResult;
use crate::markdown::{Block, Document, Inline, Renderer};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::future::join_all;
use image::codecs::jpeg::JpegEncoder;
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the downloaded artifact
pub const EXPORT_FILENAME: &str = "research.pdf";

/// Errors from the export pipeline
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("PDF generation failed: {0}")]
    Pdf(String),
}

/// Why a single image could not be inlined (logged, never fatal)
#[derive(Error, Debug)]
enum InlineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("image server returned HTTP {0}")]
    Status(u16),

    #[error("unsupported image data: {0}")]
    Decode(#[from] image::ImageError),
}

/// PDF exporter with fixed layout options
pub struct Exporter {
    http: Client,
    options: PdfOptions,
}

impl Exporter {
    /// Create an exporter; `image_timeout` bounds each embedded-image fetch
    pub fn new(image_timeout: Duration) -> Self {
        Self {
            http: Client::builder()
                .timeout(image_timeout)
                .build()
                .expect("Failed to create HTTP client"),
            options: PdfOptions::default(),
        }
    }

    /// Assemble the full export document for one research result
    pub fn document(result: &ResearchResult, renderer: &Renderer) -> Document {
        let text = |s: &str| vec![Inline::Text(s.to_string())];

        let mut blocks = vec![
            Block::Heading {
                level: 1,
                children: text("Deep Research"),
            },
            Block::Heading {
                level: 2,
                children: text("Research Summary"),
            },
            Block::Paragraph(text(&result.summary)),
            Block::Heading {
                level: 2,
                children: text("Detailed Report"),
            },
        ];

        blocks.extend(renderer.render(&result.report).document.blocks.clone());

        if !result.follow_up_questions.is_empty() {
            blocks.push(Block::Heading {
                level: 2,
                children: text("Follow-up Questions"),
            });
            blocks.push(Block::List {
                ordered: true,
                start: 1,
                items: result
                    .follow_up_questions
                    .iter()
                    .map(|q| vec![Block::Paragraph(text(q))])
                    .collect(),
            });
        }

        blocks.push(Block::Rule);
        blocks.push(Block::Paragraph(text(&format!(
            "Trace ID: {}",
            result.trace_id
        ))));

        Document { blocks }
    }

    /// Export one research result as PDF bytes
    pub async fn export(
        &self,
        result: &ResearchResult,
        renderer: &Renderer,
    ) -> Result<Vec<u8>, ExportError> {
        let mut document = Self::document(result, renderer);
        self.inline_images(&mut document).await;
        pdf::render(&document, &self.options)
    }

    /// Replace every remote image source in the document with embedded
    /// base64 JPEG data.
    ///
    /// One fetch per distinct source, all in flight together; the method
    /// returns once every fetch has settled. A source that fails stays as
    /// it was and is skipped at conversion time.
    pub async fn inline_images(&self, document: &mut Document) {
        let mut sources = HashSet::new();
        for_each_image_src(document, &mut |src| {
            if !src.starts_with("data:") {
                sources.insert(src.clone());
            }
        });
        if sources.is_empty() {
            return;
        }

        debug!(images = sources.len(), "Inlining report images");

        let fetches = sources.into_iter().map(|src| async move {
            let outcome = self.fetch_and_encode(&src).await;
            (src, outcome)
        });

        let mut inlined: HashMap<String, String> = HashMap::new();
        for (src, outcome) in join_all(fetches).await {
            match outcome {
                Ok(data_uri) => {
                    inlined.insert(src, data_uri);
                }
                Err(e) => warn!(src = %src, error = %e, "Skipping image that failed to inline"),
            }
        }

        for_each_image_src(document, &mut |src| {
            if let Some(data_uri) = inlined.get(src.as_str()) {
                *src = data_uri.clone();
            }
        });
    }

    async fn fetch_and_encode(&self, src: &str) -> Result<String, InlineError> {
        let response = self.http.get(src).send().await?;
        if !response.status().is_success() {
            return Err(InlineError::Status(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;

        let decoded = image::load_from_memory(&bytes)?;
        // JPEG cannot carry an alpha channel
        let rgb = decoded.to_rgb8();

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.options.jpeg_quality);
        encoder.encode_image(&rgb)?;

        Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(&jpeg)))
    }
}

/// Visit every image source in the document, innermost inlines included
fn for_each_image_src<F: FnMut(&mut String)>(document: &mut Document, f: &mut F) {
    for block in &mut document.blocks {
        visit_block(block, f);
    }
}

fn visit_block<F: FnMut(&mut String)>(block: &mut Block, f: &mut F) {
    match block {
        Block::Heading { children, .. } | Block::Paragraph(children) => {
            visit_inlines(children, f)
        }
        Block::Quote(blocks) => {
            for b in blocks {
                visit_block(b, f);
            }
        }
        Block::List { items, .. } => {
            for item in items {
                for b in item {
                    visit_block(b, f);
                }
            }
        }
        Block::Table { header, rows, .. } => {
            for cell in header.iter_mut() {
                visit_inlines(cell, f);
            }
            for row in rows {
                for cell in row {
                    visit_inlines(cell, f);
                }
            }
        }
        Block::CodeBlock { .. } | Block::Rule => {}
    }
}

fn visit_inlines<F: FnMut(&mut String)>(inlines: &mut [Inline], f: &mut F) {
    for inline in inlines {
        match inline {
            Inline::Image { src, .. } => f(src),
            Inline::Strong(children)
            | Inline::Emphasis(children)
            | Inline::Strikethrough(children)
            | Inline::Link { children, .. } => visit_inlines(children, f),
            _ => {}
        }
    }
}
