//! HTML writer for parsed documents
//!
//! All text and attribute values are escaped on the way out; the parser
//! never forwards raw HTML, so the output cannot smuggle markup from the
//! report. Hyperlinks open in a new tab without a window reference, and
//! code blocks carry stable position-derived ids.

use super::{Block, ColumnAlign, Document, Inline, CURSOR_GLYPH};

/// Render a document to sanitized HTML
pub fn to_html(document: &Document) -> String {
    let mut writer = Writer {
        out: String::new(),
        code_index: 0,
    };
    for block in &document.blocks {
        writer.block(block);
    }
    writer.out
}

struct Writer {
    out: String,
    code_index: usize,
}

impl Writer {
    fn block(&mut self, block: &Block) {
        match block {
            Block::Heading { level, children } => {
                let level = (*level).clamp(1, 6);
                self.out.push_str(&format!("<h{level}>"));
                self.inlines(children);
                self.out.push_str(&format!("</h{level}>\n"));
            }
            Block::Paragraph(children) => {
                // A lone display formula stands on its own, outside <p>
                if let [Inline::Math { display: true, tex }] = children.as_slice() {
                    self.display_math(tex);
                    return;
                }
                self.out.push_str("<p>");
                self.inlines(children);
                self.out.push_str("</p>\n");
            }
            Block::CodeBlock { language, code } => self.code_block(language, code),
            Block::Quote(blocks) => {
                self.out.push_str("<blockquote>\n");
                for b in blocks {
                    self.block(b);
                }
                self.out.push_str("</blockquote>\n");
            }
            Block::List {
                ordered,
                start,
                items,
            } => {
                if *ordered {
                    if *start != 1 {
                        self.out.push_str(&format!("<ol start=\"{start}\">\n"));
                    } else {
                        self.out.push_str("<ol>\n");
                    }
                } else {
                    self.out.push_str("<ul>\n");
                }
                for item in items {
                    self.out.push_str("<li>");
                    // Single-paragraph items render tight
                    if let [Block::Paragraph(inlines)] = item.as_slice() {
                        self.inlines(inlines);
                    } else {
                        for b in item {
                            self.block(b);
                        }
                    }
                    self.out.push_str("</li>\n");
                }
                self.out
                    .push_str(if *ordered { "</ol>\n" } else { "</ul>\n" });
            }
            Block::Table {
                alignments,
                header,
                rows,
            } => self.table(alignments, header, rows),
            Block::Rule => self.out.push_str("<hr>\n"),
        }
    }

    fn code_block(&mut self, language: &str, code: &str) {
        // A block holding the lone placeholder glyph is a streaming cursor,
        // not literal code
        if code == CURSOR_GLYPH {
            self.out.push_str("<span class=\"cursor\">");
            self.out.push_str(CURSOR_GLYPH);
            self.out.push_str("</span>\n");
            return;
        }

        let id = format!("code-block-{}", self.code_index);
        self.code_index += 1;

        self.out
            .push_str(&format!("<div class=\"code-block\" id=\"{id}\">"));
        self.out.push_str("<div class=\"code-block-header\"><span>");
        escape_into(language, &mut self.out);
        self.out.push_str("</span></div><pre><code");
        if !language.is_empty() {
            self.out.push_str(" class=\"language-");
            escape_attr_into(language, &mut self.out);
            self.out.push('"');
        }
        self.out.push('>');
        escape_into(code, &mut self.out);
        self.out.push_str("</code></pre></div>\n");
    }

    fn table(
        &mut self,
        alignments: &[ColumnAlign],
        header: &[Vec<Inline>],
        rows: &[Vec<Vec<Inline>>],
    ) {
        let align_attr = |idx: usize| -> &'static str {
            match alignments.get(idx).copied().unwrap_or(ColumnAlign::None) {
                ColumnAlign::None => "",
                ColumnAlign::Left => " style=\"text-align:left\"",
                ColumnAlign::Center => " style=\"text-align:center\"",
                ColumnAlign::Right => " style=\"text-align:right\"",
            }
        };

        self.out.push_str("<div class=\"table-wrap\"><table>\n<thead><tr>");
        for (idx, cell) in header.iter().enumerate() {
            self.out.push_str(&format!("<th{}>", align_attr(idx)));
            self.inlines(cell);
            self.out.push_str("</th>");
        }
        self.out.push_str("</tr></thead>\n<tbody>\n");
        for row in rows {
            self.out.push_str("<tr>");
            for (idx, cell) in row.iter().enumerate() {
                self.out.push_str(&format!("<td{}>", align_attr(idx)));
                self.inlines(cell);
                self.out.push_str("</td>");
            }
            self.out.push_str("</tr>\n");
        }
        self.out.push_str("</tbody>\n</table></div>\n");
    }

    fn display_math(&mut self, tex: &str) {
        self.out.push_str("<div class=\"math math-display\">");
        escape_into(tex, &mut self.out);
        self.out.push_str("</div>\n");
    }

    fn inlines(&mut self, inlines: &[Inline]) {
        for inline in inlines {
            self.inline(inline);
        }
    }

    fn inline(&mut self, inline: &Inline) {
        match inline {
            Inline::Text(text) => escape_into(text, &mut self.out),
            Inline::Code(code) => {
                self.out.push_str("<code>");
                escape_into(code, &mut self.out);
                self.out.push_str("</code>");
            }
            Inline::Cursor => {
                self.out.push_str("<span class=\"cursor\">");
                self.out.push_str(CURSOR_GLYPH);
                self.out.push_str("</span>");
            }
            Inline::Strong(children) => {
                self.out.push_str("<strong>");
                self.inlines(children);
                self.out.push_str("</strong>");
            }
            Inline::Emphasis(children) => {
                self.out.push_str("<em>");
                self.inlines(children);
                self.out.push_str("</em>");
            }
            Inline::Strikethrough(children) => {
                self.out.push_str("<del>");
                self.inlines(children);
                self.out.push_str("</del>");
            }
            Inline::Link {
                url,
                title,
                children,
            } => {
                self.out.push_str("<a href=\"");
                escape_attr_into(url, &mut self.out);
                self.out.push('"');
                if !title.is_empty() {
                    self.out.push_str(" title=\"");
                    escape_attr_into(title, &mut self.out);
                    self.out.push('"');
                }
                self.out
                    .push_str(" target=\"_blank\" rel=\"noopener noreferrer\">");
                self.inlines(children);
                self.out.push_str("</a>");
            }
            Inline::Image { src, alt } => {
                self.out.push_str("<img src=\"");
                escape_attr_into(src, &mut self.out);
                self.out.push_str("\" alt=\"");
                escape_attr_into(alt, &mut self.out);
                self.out.push_str("\">");
            }
            Inline::Math { display, tex } => {
                if *display {
                    self.display_math(tex);
                } else {
                    self.out.push_str("<span class=\"math math-inline\">");
                    escape_into(tex, &mut self.out);
                    self.out.push_str("</span>");
                }
            }
            Inline::HardBreak => self.out.push_str("<br>\n"),
            Inline::TaskMarker(done) => {
                self.out.push_str(if *done {
                    "<input type=\"checkbox\" disabled checked> "
                } else {
                    "<input type=\"checkbox\" disabled> "
                });
            }
        }
    }
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    fn render(text: &str) -> String {
        to_html(&parse(text))
    }

    #[test]
    fn test_links_open_in_new_tab() {
        let html = render("[docs](https://example.com)");
        assert!(html.contains(
            "<a href=\"https://example.com\" target=\"_blank\" rel=\"noopener noreferrer\">docs</a>"
        ));
    }

    #[test]
    fn test_lone_cursor_block_renders_widget() {
        let html = render("```\n\u{258d}\n```");
        assert!(html.contains("<span class=\"cursor\">\u{258d}</span>"));
        assert!(!html.contains("<pre>"));
    }

    #[test]
    fn test_backtick_quoted_cursor_renders_bare_glyph() {
        let html = render("```\n`\u{258d}` rest\n```");
        assert!(html.contains("\u{258d} rest"));
        assert!(!html.contains("`\u{258d}`"));
    }

    #[test]
    fn test_inline_cursor_widget() {
        let html = render("typing `\u{258d}`");
        assert!(html.contains("<span class=\"cursor\">\u{258d}</span>"));
    }

    #[test]
    fn test_code_block_ids_are_stable() {
        let text = "```rust\na\n```\n\ntext\n\n```python\nb\n```";
        let html = render(text);
        assert!(html.contains("id=\"code-block-0\""));
        assert!(html.contains("id=\"code-block-1\""));
        assert_eq!(html, render(text));
    }

    #[test]
    fn test_code_block_language_class() {
        let html = render("```rust\nfn main() {}\n```");
        assert!(html.contains("<code class=\"language-rust\">"));
        assert!(html.contains("<div class=\"code-block-header\"><span>rust</span></div>"));
    }

    #[test]
    fn test_code_block_without_language() {
        let html = render("```\nplain\n```");
        assert!(html.contains("<code>plain</code>"));
    }

    #[test]
    fn test_table_wrapped_for_overflow() {
        let html = render("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<div class=\"table-wrap\"><table>"));
        assert!(html.contains("<thead><tr><th>a</th><th>b</th></tr></thead>"));
        assert!(html.contains("<td>1</td><td>2</td>"));
    }

    #[test]
    fn test_table_alignment_styles() {
        let html = render("| a | b |\n|:--|--:|\n| 1 | 2 |\n");
        assert!(html.contains("<th style=\"text-align:left\">a</th>"));
        assert!(html.contains("<td style=\"text-align:right\">2</td>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = render("hello <script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_image_attributes_escaped() {
        let html = render("![an \"alt\"](https://example.com/a.png)");
        assert!(html.contains("<img src=\"https://example.com/a.png\" alt=\"an &quot;alt&quot;\">"));
    }

    #[test]
    fn test_inline_code_unchanged() {
        let html = render("use `let x = 1;` here");
        assert!(html.contains("<code>let x = 1;</code>"));
    }

    #[test]
    fn test_math_rendering() {
        let html = render("energy $E = mc^2$");
        assert!(html.contains("<span class=\"math math-inline\">E = mc^2</span>"));
    }

    #[test]
    fn test_ordered_list_start_attribute() {
        let html = render("3. three\n4. four\n");
        assert!(html.contains("<ol start=\"3\">"));
    }
}
