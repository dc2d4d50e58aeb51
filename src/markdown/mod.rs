//! Markdown rendering pipeline
//!
//! Transforms report markdown into a typed block/inline tree, then into
//! sanitized HTML (see [`html`]). Parsing is a pure function of the input
//! text plus a fixed extension set (tables, strikethrough, task lists,
//! math). Raw HTML in the source is carried as plain text, so it is escaped
//! on output rather than passed through.

mod html;

pub use html::to_html;

use lru::LruCache;
use pulldown_cmark::{Alignment, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Streaming-cursor placeholder glyph used inside code content
pub const CURSOR_GLYPH: &str = "\u{258d}";

/// An inline element inside a block
#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String),
    Code(String),
    /// Animated typing-cursor affordance
    Cursor,
    Strong(Vec<Inline>),
    Emphasis(Vec<Inline>),
    Strikethrough(Vec<Inline>),
    Link {
        url: String,
        title: String,
        children: Vec<Inline>,
    },
    Image {
        src: String,
        alt: String,
    },
    Math {
        display: bool,
        tex: String,
    },
    HardBreak,
    TaskMarker(bool),
}

/// Horizontal alignment of a table column
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnAlign {
    None,
    Left,
    Center,
    Right,
}

impl From<Alignment> for ColumnAlign {
    fn from(a: Alignment) -> Self {
        match a {
            Alignment::None => ColumnAlign::None,
            Alignment::Left => ColumnAlign::Left,
            Alignment::Center => ColumnAlign::Center,
            Alignment::Right => ColumnAlign::Right,
        }
    }
}

/// A block-level element
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading {
        level: u8,
        children: Vec<Inline>,
    },
    Paragraph(Vec<Inline>),
    CodeBlock {
        /// Fence language tag, empty when absent
        language: String,
        code: String,
    },
    Quote(Vec<Block>),
    List {
        ordered: bool,
        start: u64,
        items: Vec<Vec<Block>>,
    },
    Table {
        alignments: Vec<ColumnAlign>,
        header: Vec<Vec<Inline>>,
        rows: Vec<Vec<Vec<Inline>>>,
    },
    Rule,
}

/// A parsed markdown document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    /// Flatten the document to plain text (used for sizing and logging)
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            collect_block_text(block, &mut out);
            out.push('\n');
        }
        out
    }
}

fn collect_block_text(block: &Block, out: &mut String) {
    match block {
        Block::Heading { children, .. } | Block::Paragraph(children) => {
            out.push_str(&plain_text(children));
        }
        Block::CodeBlock { code, .. } => out.push_str(code),
        Block::Quote(blocks) => {
            for b in blocks {
                collect_block_text(b, out);
            }
        }
        Block::List { items, .. } => {
            for item in items {
                for b in item {
                    collect_block_text(b, out);
                }
            }
        }
        Block::Table { header, rows, .. } => {
            for cell in header {
                out.push_str(&plain_text(cell));
            }
            for row in rows {
                for cell in row {
                    out.push_str(&plain_text(cell));
                }
            }
        }
        Block::Rule => {}
    }
}

/// Flatten inlines to their text content
pub fn plain_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match inline {
            Inline::Text(t) | Inline::Code(t) => out.push_str(t),
            Inline::Cursor => out.push_str(CURSOR_GLYPH),
            Inline::Strong(c) | Inline::Emphasis(c) | Inline::Strikethrough(c) => {
                out.push_str(&plain_text(c))
            }
            Inline::Link { children, .. } => out.push_str(&plain_text(children)),
            Inline::Image { alt, .. } => out.push_str(alt),
            Inline::Math { tex, .. } => out.push_str(tex),
            Inline::HardBreak => out.push('\n'),
            Inline::TaskMarker(_) => {}
        }
    }
    out
}

/// Replace the backtick-quoted cursor form with the bare glyph, once
fn unquote_cursor(text: &str) -> String {
    text.replacen("`\u{258d}`", CURSOR_GLYPH, 1)
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Language tag from a fence info string, empty when absent
fn fence_language(info: &str) -> String {
    info.split(|c: char| c == ',' || c.is_whitespace())
        .next()
        .unwrap_or("")
        .to_string()
}

enum InlineKind {
    /// Paragraph-level collector; implicit roots wrap loose text in tight
    /// list items
    Root { implicit: bool },
    Emphasis,
    Strong,
    Strikethrough,
    Link { url: String, title: String },
    Image { src: String },
}

struct InlineFrame {
    kind: InlineKind,
    children: Vec<Inline>,
}

struct ListFrame {
    ordered: bool,
    start: u64,
    items: Vec<Vec<Block>>,
}

struct TableFrame {
    alignments: Vec<ColumnAlign>,
    header: Vec<Vec<Inline>>,
    rows: Vec<Vec<Vec<Inline>>>,
    current_row: Vec<Vec<Inline>>,
    in_head: bool,
}

struct CodeAccum {
    language: String,
    text: String,
}

struct TreeBuilder {
    blocks_stack: Vec<Vec<Block>>,
    inline_stack: Vec<InlineFrame>,
    list_stack: Vec<ListFrame>,
    table_stack: Vec<TableFrame>,
    code: Option<CodeAccum>,
    pending_heading: Vec<u8>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            blocks_stack: vec![Vec::new()],
            inline_stack: Vec::new(),
            list_stack: Vec::new(),
            table_stack: Vec::new(),
            code: None,
            pending_heading: Vec::new(),
        }
    }

    fn push_block(&mut self, block: Block) {
        self.blocks_stack
            .last_mut()
            .expect("document frame always present")
            .push(block);
    }

    fn push_inline(&mut self, inline: Inline) {
        self.ensure_root();
        self.inline_stack
            .last_mut()
            .expect("root frame just ensured")
            .children
            .push(inline);
    }

    fn open_inline(&mut self, kind: InlineKind) {
        if !matches!(kind, InlineKind::Root { .. }) {
            self.ensure_root();
        }
        self.inline_stack.push(InlineFrame {
            kind,
            children: Vec::new(),
        });
    }

    /// Open an implicit paragraph when inline content arrives outside one
    fn ensure_root(&mut self) {
        if self.inline_stack.is_empty() {
            self.inline_stack.push(InlineFrame {
                kind: InlineKind::Root { implicit: true },
                children: Vec::new(),
            });
        }
    }

    /// Close an implicit paragraph before a block boundary
    fn flush_implicit(&mut self) {
        if let Some(frame) = self.inline_stack.last() {
            if matches!(frame.kind, InlineKind::Root { implicit: true }) {
                let frame = self.inline_stack.pop().unwrap();
                if !frame.children.is_empty() {
                    self.push_block(Block::Paragraph(frame.children));
                }
            }
        }
    }

    fn close_inline(&mut self) {
        let frame = match self.inline_stack.pop() {
            Some(f) => f,
            None => return,
        };
        let inline = match frame.kind {
            InlineKind::Root { .. } => {
                // Root frames close into blocks, handled by callers
                self.inline_stack.push(frame);
                return;
            }
            InlineKind::Emphasis => Inline::Emphasis(frame.children),
            InlineKind::Strong => Inline::Strong(frame.children),
            InlineKind::Strikethrough => Inline::Strikethrough(frame.children),
            InlineKind::Link { url, title } => Inline::Link {
                url,
                title,
                children: frame.children,
            },
            InlineKind::Image { src } => Inline::Image {
                src,
                alt: plain_text(&frame.children),
            },
        };
        self.push_inline(inline);
    }

    fn pop_root(&mut self) -> Vec<Inline> {
        match self.inline_stack.pop() {
            Some(frame) => frame.children,
            None => Vec::new(),
        }
    }

    fn handle_start(&mut self, tag: Tag) {
        match tag {
            Tag::Paragraph => {
                self.flush_implicit();
                self.open_inline(InlineKind::Root { implicit: false });
            }
            Tag::Heading { level, .. } => {
                self.flush_implicit();
                self.pending_heading.push(heading_level(level));
                self.open_inline(InlineKind::Root { implicit: false });
            }
            Tag::BlockQuote(_) => {
                self.flush_implicit();
                self.blocks_stack.push(Vec::new());
            }
            Tag::CodeBlock(kind) => {
                self.flush_implicit();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => fence_language(&info),
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some(CodeAccum {
                    language,
                    text: String::new(),
                });
            }
            Tag::List(start) => {
                self.flush_implicit();
                self.list_stack.push(ListFrame {
                    ordered: start.is_some(),
                    start: start.unwrap_or(1),
                    items: Vec::new(),
                });
            }
            Tag::Item => {
                self.blocks_stack.push(Vec::new());
            }
            Tag::Table(alignments) => {
                self.flush_implicit();
                self.table_stack.push(TableFrame {
                    alignments: alignments.into_iter().map(ColumnAlign::from).collect(),
                    header: Vec::new(),
                    rows: Vec::new(),
                    current_row: Vec::new(),
                    in_head: false,
                });
            }
            Tag::TableHead => {
                if let Some(table) = self.table_stack.last_mut() {
                    table.in_head = true;
                }
            }
            Tag::TableRow => {}
            Tag::TableCell => {
                self.open_inline(InlineKind::Root { implicit: false });
            }
            Tag::Emphasis => self.open_inline(InlineKind::Emphasis),
            Tag::Strong => self.open_inline(InlineKind::Strong),
            Tag::Strikethrough => self.open_inline(InlineKind::Strikethrough),
            Tag::Link {
                dest_url, title, ..
            } => self.open_inline(InlineKind::Link {
                url: dest_url.to_string(),
                title: title.to_string(),
            }),
            Tag::Image { dest_url, .. } => self.open_inline(InlineKind::Image {
                src: dest_url.to_string(),
            }),
            Tag::HtmlBlock => self.flush_implicit(),
            _ => {}
        }
    }

    fn handle_end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                let inlines = self.pop_root();
                if !inlines.is_empty() {
                    self.push_block(Block::Paragraph(inlines));
                }
            }
            TagEnd::Heading(_) => {
                let children = self.pop_root();
                let level = self.pending_heading.pop().unwrap_or(1);
                self.push_block(Block::Heading { level, children });
            }
            TagEnd::BlockQuote(_) => {
                self.flush_implicit();
                let blocks = self.blocks_stack.pop().unwrap_or_default();
                self.push_block(Block::Quote(blocks));
            }
            TagEnd::CodeBlock => {
                if let Some(accum) = self.code.take() {
                    let text = accum
                        .text
                        .strip_suffix('\n')
                        .unwrap_or(&accum.text)
                        .to_string();
                    let code = if text == CURSOR_GLYPH {
                        text
                    } else {
                        unquote_cursor(&text)
                    };
                    self.push_block(Block::CodeBlock {
                        language: accum.language,
                        code,
                    });
                }
            }
            TagEnd::Item => {
                self.flush_implicit();
                let blocks = self.blocks_stack.pop().unwrap_or_default();
                if let Some(list) = self.list_stack.last_mut() {
                    list.items.push(blocks);
                }
            }
            TagEnd::List(_) => {
                if let Some(list) = self.list_stack.pop() {
                    self.push_block(Block::List {
                        ordered: list.ordered,
                        start: list.start,
                        items: list.items,
                    });
                }
            }
            TagEnd::TableCell => {
                let cell = self.pop_root();
                if let Some(table) = self.table_stack.last_mut() {
                    if table.in_head {
                        table.header.push(cell);
                    } else {
                        table.current_row.push(cell);
                    }
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table_stack.last_mut() {
                    table.in_head = false;
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table_stack.last_mut() {
                    let row = std::mem::take(&mut table.current_row);
                    table.rows.push(row);
                }
            }
            TagEnd::Table => {
                if let Some(table) = self.table_stack.pop() {
                    self.push_block(Block::Table {
                        alignments: table.alignments,
                        header: table.header,
                        rows: table.rows,
                    });
                }
            }
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link
            | TagEnd::Image => self.close_inline(),
            TagEnd::HtmlBlock => self.flush_implicit(),
            _ => {}
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.handle_start(tag),
            Event::End(tag) => self.handle_end(tag),
            Event::Text(text) => {
                if let Some(code) = self.code.as_mut() {
                    code.text.push_str(&text);
                } else {
                    self.push_inline(Inline::Text(text.to_string()));
                }
            }
            Event::Code(code) => {
                if &*code == CURSOR_GLYPH {
                    self.push_inline(Inline::Cursor);
                } else {
                    self.push_inline(Inline::Code(unquote_cursor(&code)));
                }
            }
            // Raw HTML is neutralized to text and escaped on output
            Event::Html(raw) | Event::InlineHtml(raw) => {
                self.push_inline(Inline::Text(raw.to_string()));
            }
            Event::InlineMath(tex) => self.push_inline(Inline::Math {
                display: false,
                tex: tex.to_string(),
            }),
            Event::DisplayMath(tex) => self.push_inline(Inline::Math {
                display: true,
                tex: tex.to_string(),
            }),
            Event::SoftBreak => self.push_inline(Inline::Text(" ".to_string())),
            Event::HardBreak => self.push_inline(Inline::HardBreak),
            Event::Rule => {
                self.flush_implicit();
                self.push_block(Block::Rule);
            }
            Event::TaskListMarker(done) => self.push_inline(Inline::TaskMarker(done)),
            Event::FootnoteReference(_) => {}
        }
    }

    fn finish(mut self) -> Document {
        self.flush_implicit();
        Document {
            blocks: self.blocks_stack.pop().unwrap_or_default(),
        }
    }
}

/// Parse markdown into a document tree.
///
/// Deterministic: the same text always yields the same tree.
pub fn parse(text: &str) -> Document {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_MATH);

    let mut builder = TreeBuilder::new();
    for event in Parser::new_ext(text, options) {
        builder.handle_event(event);
    }
    builder.finish()
}

/// A parse + render result held by the cache
#[derive(Debug)]
pub struct Rendered {
    pub document: Document,
    pub html: String,
}

/// Markdown renderer with a pure-function cache keyed on input text.
///
/// Re-rendering identical text returns the cached result; this is an
/// optimization, not a correctness requirement.
pub struct Renderer {
    cache: Mutex<LruCache<String, Arc<Rendered>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Renderer {
    /// Create a renderer keeping up to `capacity` rendered texts
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1"),
            )),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Render markdown, reusing the cached result for identical text
    pub fn render(&self, text: &str) -> Arc<Rendered> {
        let mut cache = self.cache.lock().expect("render cache poisoned");
        if let Some(hit) = cache.get(text) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let document = parse(text);
        let html = to_html(&document);
        let rendered = Arc::new(Rendered { document, html });
        cache.put(text.to_string(), Arc::clone(&rendered));
        rendered
    }

    /// (hits, misses) counters
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_deterministic() {
        let text = "# Title\n\nSome *body* with `code`.\n\n- a\n- b\n";
        assert_eq!(parse(text), parse(text));
    }

    #[test]
    fn test_heading_and_paragraph() {
        let doc = parse("# Title\n\nBody text.");
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(
            doc.blocks[0],
            Block::Heading {
                level: 1,
                children: vec![Inline::Text("Title".to_string())]
            }
        );
        assert_eq!(
            doc.blocks[1],
            Block::Paragraph(vec![Inline::Text("Body text.".to_string())])
        );
    }

    #[test]
    fn test_fence_language_extracted() {
        let doc = parse("```rust\nfn main() {}\n```");
        assert_eq!(
            doc.blocks[0],
            Block::CodeBlock {
                language: "rust".to_string(),
                code: "fn main() {}".to_string(),
            }
        );
    }

    #[test]
    fn test_fence_without_language() {
        let doc = parse("```\nplain\n```");
        match &doc.blocks[0] {
            Block::CodeBlock { language, .. } => assert_eq!(language, ""),
            other => panic!("expected code block, got {other:?}"),
        }
    }

    #[test]
    fn test_lone_cursor_glyph_in_code_block() {
        let doc = parse("```\n\u{258d}\n```");
        assert_eq!(
            doc.blocks[0],
            Block::CodeBlock {
                language: String::new(),
                code: CURSOR_GLYPH.to_string(),
            }
        );
    }

    #[test]
    fn test_backtick_quoted_cursor_stripped_in_code_block() {
        let doc = parse("```\n`\u{258d}` more\n```");
        match &doc.blocks[0] {
            Block::CodeBlock { code, .. } => assert_eq!(code, "\u{258d} more"),
            other => panic!("expected code block, got {other:?}"),
        }
    }

    #[test]
    fn test_inline_cursor_glyph() {
        let doc = parse("before `\u{258d}` after");
        match &doc.blocks[0] {
            Block::Paragraph(inlines) => {
                assert!(inlines.contains(&Inline::Cursor));
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn test_table_parsed_with_alignments() {
        let doc = parse("| a | b |\n|:--|--:|\n| 1 | 2 |\n");
        match &doc.blocks[0] {
            Block::Table {
                alignments,
                header,
                rows,
            } => {
                assert_eq!(
                    alignments,
                    &vec![ColumnAlign::Left, ColumnAlign::Right]
                );
                assert_eq!(header.len(), 2);
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0][1], vec![Inline::Text("2".to_string())]);
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn test_tight_list_items() {
        let doc = parse("- first\n- second\n");
        match &doc.blocks[0] {
            Block::List { ordered, items, .. } => {
                assert!(!ordered);
                assert_eq!(items.len(), 2);
                assert_eq!(
                    items[0][0],
                    Block::Paragraph(vec![Inline::Text("first".to_string())])
                );
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_ordered_list_start() {
        let doc = parse("3. third\n4. fourth\n");
        match &doc.blocks[0] {
            Block::List { ordered, start, .. } => {
                assert!(ordered);
                assert_eq!(*start, 3);
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_raw_html_becomes_text() {
        let doc = parse("hello <script>alert(1)</script> there");
        match &doc.blocks[0] {
            Block::Paragraph(inlines) => {
                let flat = plain_text(inlines);
                assert!(flat.contains("<script>"));
                assert!(inlines
                    .iter()
                    .all(|i| matches!(i, Inline::Text(_))));
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn test_math_events() {
        let doc = parse("inline $x^2$ and display $$\\int_0^1 f$$");
        match &doc.blocks[0] {
            Block::Paragraph(inlines) => {
                assert!(inlines.iter().any(|i| matches!(
                    i,
                    Inline::Math { display: false, .. }
                )));
                assert!(inlines.iter().any(|i| matches!(
                    i,
                    Inline::Math { display: true, .. }
                )));
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn test_strikethrough_and_tasklist() {
        let doc = parse("- [x] done ~~gone~~\n- [ ] open\n");
        match &doc.blocks[0] {
            Block::List { items, .. } => {
                let first = plain_text(match &items[0][0] {
                    Block::Paragraph(inlines) => inlines,
                    other => panic!("expected paragraph, got {other:?}"),
                });
                assert!(first.contains("done"));
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_render_cache_hit() {
        let renderer = Renderer::new(8);
        let first = renderer.render("# Same");
        let second = renderer.render("# Same");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(renderer.stats(), (1, 1));
    }

    #[test]
    fn test_render_cache_identical_output() {
        let renderer = Renderer::new(1);
        let a = renderer.render("**bold** move").html.clone();
        // Evict, then re-render
        renderer.render("other");
        let b = renderer.render("**bold** move").html.clone();
        assert_eq!(a, b);
    }
}
