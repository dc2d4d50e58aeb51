//! PDF layout for export documents
//!
//! Lays the document tree out on A4 portrait pages with the builtin
//! Helvetica faces. Blocks are kept intact across page breaks: a block that
//! no longer fits moves to the next page whole, and only blocks taller than
//! a page split at line granularity.

use super::ExportError;
use crate::markdown::{Block, Document, Inline};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point,
};
use tracing::warn;

/// Fixed layout options for the conversion
#[derive(Debug, Clone)]
pub struct PdfOptions {
    /// Page margin on all four sides (mm)
    pub margin_mm: f64,
    /// Quality for re-encoded embedded images (0-100)
    pub jpeg_quality: u8,
    /// Raster density for embedded bitmaps; 192 dpi is a 2x screen scale
    pub raster_dpi: f64,
    /// Page width (mm)
    pub page_width_mm: f64,
    /// Page height (mm)
    pub page_height_mm: f64,
}

impl Default for PdfOptions {
    /// A4 portrait, 10 mm margins, JPEG quality 98, 2x raster scale
    fn default() -> Self {
        Self {
            margin_mm: 10.0,
            jpeg_quality: 98,
            raster_dpi: 192.0,
            page_width_mm: 210.0,
            page_height_mm: 297.0,
        }
    }
}

const PT_TO_MM: f64 = 0.352_778;
const BODY_SIZE: f64 = 11.0;
const CODE_SIZE: f64 = 9.5;
const TABLE_SIZE: f64 = 9.0;

fn pdf_err(e: impl std::fmt::Display) -> ExportError {
    ExportError::Pdf(e.to_string())
}

/// Render a document to PDF bytes
pub fn render(document: &Document, options: &PdfOptions) -> Result<Vec<u8>, ExportError> {
    let (doc, page, layer) = PdfDocument::new(
        "Deep Research",
        Mm(options.page_width_mm as f32),
        Mm(options.page_height_mm as f32),
        "Layer 1",
    );

    let fonts = Fonts {
        body: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(pdf_err)?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_err)?,
        mono: doc.add_builtin_font(BuiltinFont::Courier).map_err(pdf_err)?,
    };

    {
        let layer = doc.get_page(page).get_layer(layer);
        let mut writer = Writer {
            doc: &doc,
            layer,
            options,
            fonts,
            y: options.page_height_mm - options.margin_mm,
            indent: 0.0,
        };
        for block in &document.blocks {
            writer.block(block);
        }
    }

    doc.save_to_bytes().map_err(pdf_err)
}

struct Fonts {
    body: IndirectFontRef,
    bold: IndirectFontRef,
    mono: IndirectFontRef,
}

#[derive(Clone, Copy)]
enum Face {
    Body,
    Bold,
    Mono,
}

enum Segment {
    Text(String),
    Image { src: String, alt: String },
}

struct Writer<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    options: &'a PdfOptions,
    fonts: Fonts,
    /// Current cursor, mm from the page bottom
    y: f64,
    /// Extra left indent, mm
    indent: f64,
}

impl<'a> Writer<'a> {
    fn font(&self, face: Face) -> &IndirectFontRef {
        match face {
            Face::Body => &self.fonts.body,
            Face::Bold => &self.fonts.bold,
            Face::Mono => &self.fonts.mono,
        }
    }

    fn line_height(size: f64) -> f64 {
        size * PT_TO_MM * 1.45
    }

    fn usable_width(&self) -> f64 {
        self.options.page_width_mm - 2.0 * self.options.margin_mm - self.indent
    }

    fn max_chars(&self, face: Face, size: f64) -> usize {
        let char_width = match face {
            Face::Mono => size * PT_TO_MM * 0.60,
            _ => size * PT_TO_MM * 0.50,
        };
        ((self.usable_width() / char_width) as usize).max(8)
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(
            Mm(self.options.page_width_mm as f32),
            Mm(self.options.page_height_mm as f32),
            "Layer 1",
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = self.options.page_height_mm - self.options.margin_mm;
    }

    fn remaining(&self) -> f64 {
        self.y - self.options.margin_mm
    }

    fn page_capacity(&self) -> f64 {
        self.options.page_height_mm - 2.0 * self.options.margin_mm
    }

    /// Break the page unless `needed` mm still fit
    fn ensure_room(&mut self, needed: f64) {
        if needed > self.remaining() && self.remaining() < self.page_capacity() {
            self.new_page();
        }
    }

    fn text_line(&mut self, line: &str, face: Face, size: f64) {
        self.ensure_room(Self::line_height(size));
        self.y -= Self::line_height(size);
        self.layer.use_text(
            sanitize(line),
            size as f32,
            Mm((self.options.margin_mm + self.indent) as f32),
            Mm(self.y as f32),
            self.font(face),
        );
    }

    fn write_wrapped(&mut self, text: &str, face: Face, size: f64) {
        for line in wrap(text, self.max_chars(face, size)) {
            self.text_line(&line, face, size);
        }
    }

    fn gap(&mut self, mm: f64) {
        self.y -= mm;
    }

    fn block(&mut self, block: &Block) {
        // Keep the block on one page when it can fit on one
        let height = self.block_height(block);
        if height <= self.page_capacity() {
            self.ensure_room(height);
        }
        self.write_block(block);
    }

    fn write_block(&mut self, block: &Block) {
        match block {
            Block::Heading { level, children } => {
                let size = heading_size(*level);
                self.gap(2.5);
                self.write_wrapped(&flatten(children), Face::Bold, size);
                self.gap(1.5);
            }
            Block::Paragraph(children) => {
                for segment in segments(children) {
                    match segment {
                        Segment::Text(text) => {
                            if !text.trim().is_empty() {
                                self.write_wrapped(&text, Face::Body, BODY_SIZE);
                            }
                        }
                        Segment::Image { src, alt } => self.image(&src, &alt),
                    }
                }
                self.gap(2.0);
            }
            Block::CodeBlock { code, .. } => {
                self.gap(1.0);
                let max = self.max_chars(Face::Mono, CODE_SIZE);
                for raw_line in code.lines() {
                    for line in wrap_hard(raw_line, max) {
                        self.text_line(&line, Face::Mono, CODE_SIZE);
                    }
                }
                self.gap(2.0);
            }
            Block::Quote(blocks) => {
                self.indent += 6.0;
                for b in blocks {
                    self.write_block(b);
                }
                self.indent -= 6.0;
            }
            Block::List {
                ordered,
                start,
                items,
            } => {
                for (idx, item) in items.iter().enumerate() {
                    let prefix = if *ordered {
                        format!("{}. ", start + idx as u64)
                    } else {
                        "- ".to_string()
                    };
                    self.list_item(&prefix, item);
                }
                self.gap(2.0);
            }
            Block::Table {
                header,
                rows,
                ..
            } => {
                self.gap(1.0);
                let head = header
                    .iter()
                    .map(|cell| flatten(cell))
                    .collect::<Vec<_>>()
                    .join(" | ");
                self.write_wrapped(&head, Face::Bold, TABLE_SIZE);
                let rule_width = self.max_chars(Face::Mono, TABLE_SIZE).min(head.len().max(8));
                self.text_line(&"-".repeat(rule_width), Face::Mono, TABLE_SIZE);
                for row in rows {
                    let line = row
                        .iter()
                        .map(|cell| flatten(cell))
                        .collect::<Vec<_>>()
                        .join(" | ");
                    self.write_wrapped(&line, Face::Body, TABLE_SIZE);
                }
                self.gap(2.0);
            }
            Block::Rule => {
                self.gap(3.0);
                self.ensure_room(3.0);
                let x0 = self.options.margin_mm + self.indent;
                let x1 = self.options.page_width_mm - self.options.margin_mm;
                self.layer.set_outline_thickness(0.4);
                self.layer.add_line(Line {
                    points: vec![
                        (Point::new(Mm(x0 as f32), Mm(self.y as f32)), false),
                        (Point::new(Mm(x1 as f32), Mm(self.y as f32)), false),
                    ],
                    is_closed: false,
                });
                self.gap(3.0);
            }
        }
    }

    fn list_item(&mut self, prefix: &str, blocks: &[Block]) {
        let mut blocks = blocks.iter();
        if let Some(Block::Paragraph(children)) = blocks.clone().next() {
            blocks.next();
            let text = format!("{}{}", prefix, flatten(children));
            let max = self.max_chars(Face::Body, BODY_SIZE);
            let mut lines = wrap(&text, max).into_iter();
            if let Some(first) = lines.next() {
                self.text_line(&first, Face::Body, BODY_SIZE);
            }
            self.indent += 5.0;
            for line in lines {
                self.text_line(&line, Face::Body, BODY_SIZE);
            }
            self.indent -= 5.0;
        } else {
            self.text_line(prefix.trim_end(), Face::Body, BODY_SIZE);
        }
        self.indent += 5.0;
        for b in blocks {
            self.write_block(b);
        }
        self.indent -= 5.0;
    }

    fn image(&mut self, src: &str, alt: &str) {
        let Some(bytes) = decode_data_uri(src) else {
            // Remote reference that never got inlined; keep a placeholder
            self.write_wrapped(&format!("[image: {alt}]"), Face::Body, BODY_SIZE);
            return;
        };

        let decoded = match printpdf::image_crate::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable embedded image");
                self.write_wrapped(&format!("[image: {alt}]"), Face::Body, BODY_SIZE);
                return;
            }
        };

        let (px_w, px_h) = (decoded.width() as f64, decoded.height() as f64);
        let natural_w = px_w * 25.4 / self.options.raster_dpi;
        let natural_h = px_h * 25.4 / self.options.raster_dpi;
        let scale = (self.usable_width() / natural_w).min(1.0);
        let disp_h = natural_h * scale;

        self.ensure_room(disp_h + 2.0);
        self.y -= disp_h;

        Image::from_dynamic_image(&decoded).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm((self.options.margin_mm + self.indent) as f32)),
                translate_y: Some(Mm(self.y as f32)),
                scale_x: Some(scale as f32),
                scale_y: Some(scale as f32),
                dpi: Some(self.options.raster_dpi as f32),
                ..Default::default()
            },
        );
        self.gap(2.0);
    }

    fn block_height(&self, block: &Block) -> f64 {
        match block {
            Block::Heading { level, children } => {
                let size = heading_size(*level);
                let lines = wrap(&flatten(children), self.max_chars(Face::Bold, size)).len();
                lines as f64 * Self::line_height(size) + 4.0
            }
            Block::Paragraph(children) => {
                let mut height = 2.0;
                for segment in segments(children) {
                    match segment {
                        Segment::Text(text) => {
                            let lines =
                                wrap(&text, self.max_chars(Face::Body, BODY_SIZE)).len();
                            height += lines as f64 * Self::line_height(BODY_SIZE);
                        }
                        Segment::Image { ref src, .. } => {
                            height += self.image_height(src);
                        }
                    }
                }
                height
            }
            Block::CodeBlock { code, .. } => {
                let max = self.max_chars(Face::Mono, CODE_SIZE);
                let lines: usize = code.lines().map(|l| wrap_hard(l, max).len()).sum();
                lines as f64 * Self::line_height(CODE_SIZE) + 3.0
            }
            Block::Quote(blocks) => blocks.iter().map(|b| self.block_height(b)).sum(),
            Block::List { items, .. } => {
                let per_line = Self::line_height(BODY_SIZE);
                items
                    .iter()
                    .flat_map(|item| item.iter())
                    .map(|b| self.block_height(b).max(per_line))
                    .sum::<f64>()
                    + 2.0
            }
            Block::Table { rows, .. } => {
                (rows.len() + 2) as f64 * Self::line_height(TABLE_SIZE) + 3.0
            }
            Block::Rule => 6.0,
        }
    }

    fn image_height(&self, src: &str) -> f64 {
        let Some(bytes) = decode_data_uri(src) else {
            return Self::line_height(BODY_SIZE);
        };
        match printpdf::image_crate::load_from_memory(&bytes) {
            Ok(img) => {
                let natural_w = img.width() as f64 * 25.4 / self.options.raster_dpi;
                let natural_h = img.height() as f64 * 25.4 / self.options.raster_dpi;
                let scale = (self.usable_width() / natural_w).min(1.0);
                natural_h * scale + 2.0
            }
            Err(_) => Self::line_height(BODY_SIZE),
        }
    }
}

fn heading_size(level: u8) -> f64 {
    match level {
        1 => 19.0,
        2 => 15.5,
        3 => 13.5,
        4 => 12.5,
        5 => 11.5,
        _ => 11.0,
    }
}

/// Flatten inlines to exportable text; links keep their targets
fn flatten(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match inline {
            Inline::Text(t) | Inline::Code(t) => out.push_str(t),
            Inline::Cursor => out.push('|'),
            Inline::Strong(c) | Inline::Emphasis(c) | Inline::Strikethrough(c) => {
                out.push_str(&flatten(c))
            }
            Inline::Link { url, children, .. } => {
                let label = flatten(children);
                if label == *url {
                    out.push_str(url);
                } else {
                    out.push_str(&format!("{label} ({url})"));
                }
            }
            Inline::Image { alt, .. } => {
                out.push_str(&format!("[image: {alt}]"));
            }
            Inline::Math { tex, .. } => out.push_str(&format!("${tex}$")),
            Inline::HardBreak => out.push('\n'),
            Inline::TaskMarker(done) => out.push_str(if *done { "[x] " } else { "[ ] " }),
        }
    }
    out
}

/// Split a paragraph into text runs and top-level images
fn segments(inlines: &[Inline]) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut run: Vec<Inline> = Vec::new();
    for inline in inlines {
        if let Inline::Image { src, alt } = inline {
            if !run.is_empty() {
                out.push(Segment::Text(flatten(&run)));
                run.clear();
            }
            out.push(Segment::Image {
                src: src.clone(),
                alt: alt.clone(),
            });
        } else {
            run.push(inline.clone());
        }
    }
    if !run.is_empty() {
        out.push(Segment::Text(flatten(&run)));
    }
    out
}

fn decode_data_uri(src: &str) -> Option<Vec<u8>> {
    let rest = src.strip_prefix("data:")?;
    let (_, b64) = rest.split_once(";base64,")?;
    BASE64.decode(b64).ok()
}

/// Word-wrap to a character width; overlong words split hard
fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw_line in text.split('\n') {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            let word_len = word.chars().count();
            let current_len = current.chars().count();
            if current.is_empty() {
                if word_len > max_chars {
                    lines.extend(wrap_hard(word, max_chars));
                } else {
                    current.push_str(word);
                }
            } else if current_len + 1 + word_len <= max_chars {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                if word_len > max_chars {
                    lines.extend(wrap_hard(word, max_chars));
                } else {
                    current.push_str(word);
                }
            }
        }
        if !current.is_empty() || raw_line.trim().is_empty() {
            lines.push(current);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Split at exactly the character width
fn wrap_hard(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(max_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Map text into the WinAnsi range the builtin faces can encode
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{258d}' => '|',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201c}' | '\u{201d}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2026}' => '.',
            '\u{2022}' => '-',
            '\u{00a0}' => ' ',
            c if (c as u32) < 0x100 => c,
            _ => '?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::parse;

    #[test]
    fn test_wrap_respects_width() {
        let lines = wrap("one two three four five six seven eight", 12);
        assert!(lines.iter().all(|l| l.chars().count() <= 12));
        assert!(lines.len() >= 3);
    }

    #[test]
    fn test_wrap_splits_long_words() {
        let lines = wrap("antidisestablishmentarianism", 10);
        assert!(lines.len() >= 3);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
    }

    #[test]
    fn test_flatten_links_keep_target() {
        let doc = parse("see [the docs](https://example.com)");
        match &doc.blocks[0] {
            crate::markdown::Block::Paragraph(inlines) => {
                assert_eq!(flatten(inlines), "see the docs (https://example.com)");
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_data_uri() {
        let uri = format!("data:image/jpeg;base64,{}", BASE64.encode(b"hello"));
        assert_eq!(decode_data_uri(&uri).unwrap(), b"hello");
        assert!(decode_data_uri("https://example.com/a.png").is_none());
    }

    #[test]
    fn test_sanitize_maps_cursor_glyph() {
        assert_eq!(sanitize("a\u{258d}b\u{2014}c"), "a|b-c");
    }

    #[test]
    fn test_render_simple_document() {
        let doc = parse("# Title\n\nA paragraph.\n\n- one\n- two\n");
        let bytes = render(&doc, &PdfOptions::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_render_long_document_paginates() {
        let text = "paragraph line\n\n".repeat(400);
        let doc = parse(&text);
        let bytes = render(&doc, &PdfOptions::default()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        // More than one /Page object
        let needle: &[u8] = b"/Type /Page";
        let count = bytes
            .windows(needle.len())
            .filter(|w| *w == needle)
            .count();
        assert!(count > 1, "expected pagination, found {count} page markers");
    }
}
