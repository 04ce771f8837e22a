// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — lay plain text out as a new PDF using `printpdf` 0.8.
//
// Plain-text uploads have no page structure to stamp. Rendering them to a PDF
// first gives them one.

use std::borrow::Cow;

use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, TextItem,
};
use tracing::{debug, info, instrument};
use vellum_core::error::VellumError;

use super::reader::is_pdf;

/// Page sizes offered for generated documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    #[default]
    A4,
    Letter,
}

impl PageSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (f32, f32) {
        match self {
            Self::A4 => (210.0, 297.0),
            Self::Letter => (215.9, 279.4),
        }
    }
}

/// Creates new PDF documents from text content.
pub struct PdfWriter {
    page_size: PageSize,
    /// Title metadata embedded in the PDF /Info dictionary.
    title: Option<String>,
}

impl PdfWriter {
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page_size,
            title: None,
        }
    }

    pub fn a4() -> Self {
        Self::new(PageSize::A4)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    fn page_dimensions(&self) -> (Mm, Mm) {
        let (w, h) = self.page_size.dimensions_mm();
        (Mm(w), Mm(h))
    }

    /// Lay out plain text top-to-bottom in Helvetica 11pt. Long lines wrap at
    /// an estimated character width and pages break automatically.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn create_from_text(&self, text: &str) -> Result<Vec<u8>, VellumError> {
        let (page_w, page_h) = self.page_dimensions();
        let title = self.title.as_deref().unwrap_or("Vellum Document");

        info!(page_size = ?self.page_size, title, "creating text PDF");

        let font_size_pt: f32 = 11.0;
        let line_height_pt: f32 = 14.0;
        let margin_mm: f32 = 20.0;
        let margin_pt: f32 = Mm(margin_mm).into_pt().0;
        let usable_width_mm = page_w.0 - 2.0 * margin_mm;

        // Average Helvetica glyph is about half the font size wide
        // (1pt = 0.3528mm).
        let avg_char_width_mm: f32 = 0.50 * font_size_pt * 0.3528;
        let max_chars_per_line = ((usable_width_mm / avg_char_width_mm) as usize).max(1);

        let wrapped_lines = wrap_text(text, max_chars_per_line);
        let page_h_pt = page_h.into_pt().0;
        let usable_height_pt = page_h_pt - 2.0 * margin_pt;
        let lines_per_page = ((usable_height_pt / line_height_pt) as usize).max(1);

        let mut doc = PdfDocument::new(title);
        let mut pages: Vec<PdfPage> = wrapped_lines
            .chunks(lines_per_page)
            .map(|chunk| {
                let mut ops: Vec<Op> = Vec::with_capacity(chunk.len() * 5);
                for (idx, line) in chunk.iter().enumerate() {
                    let y_pt = page_h_pt - margin_pt - (idx as f32 * line_height_pt);
                    ops.push(Op::StartTextSection);
                    ops.push(Op::SetTextCursor {
                        pos: Point {
                            x: Pt(margin_pt),
                            y: Pt(y_pt),
                        },
                    });
                    ops.push(Op::SetFontSizeBuiltinFont {
                        size: Pt(font_size_pt),
                        font: BuiltinFont::Helvetica,
                    });
                    ops.push(Op::WriteTextBuiltinFont {
                        items: vec![TextItem::Text(line.clone())],
                        font: BuiltinFont::Helvetica,
                    });
                    ops.push(Op::EndTextSection);
                }
                PdfPage::new(page_w, page_h, ops)
            })
            .collect();

        if pages.is_empty() {
            pages.push(PdfPage::new(page_w, page_h, Vec::new()));
        }
        doc.with_pages(pages);

        debug!(
            total_lines = wrapped_lines.len(),
            pages = doc.pages.len(),
            "text layout complete"
        );

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !is_pdf(&output) {
            return Err(VellumError::RenderError(
                "generated output lacks a PDF header".into(),
            ));
        }
        Ok(output)
    }

    /// Return `bytes` as a PDF: PDFs pass through, `text/*` content is laid
    /// out with [`create_from_text`](Self::create_from_text), anything else
    /// is `UnsupportedFormat`.
    pub fn ensure_pdf<'a>(
        &self,
        bytes: &'a [u8],
        content_type: &str,
    ) -> Result<Cow<'a, [u8]>, VellumError> {
        if is_pdf(bytes) {
            return Ok(Cow::Borrowed(bytes));
        }
        if content_type.starts_with("text/") {
            let text = String::from_utf8_lossy(bytes);
            return self.create_from_text(&text).map(Cow::Owned);
        }
        Err(VellumError::UnsupportedFormat(format!(
            "cannot convert {content_type} to PDF"
        )))
    }
}

/// Wrap a multi-line string so that no line exceeds `max_width` characters.
///
/// Splits on existing newlines first, then word-wraps each paragraph. Words
/// longer than `max_width` are force-broken on character boundaries.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let mut result = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();

            while chars.len() > max_width {
                if !current.is_empty() {
                    result.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = chars.split_off(max_width);
                result.push(chars.into_iter().collect());
                chars = rest;
            }
            if chars.is_empty() {
                continue;
            }

            let needed = if current.is_empty() { chars.len() } else { current_len + 1 + chars.len() };
            if needed > max_width {
                result.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push(' ');
                current_len += 1;
            }
            current_len += chars.len();
            current.extend(chars);
        }

        result.push(current);
    }

    result
}
