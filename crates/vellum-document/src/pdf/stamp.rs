// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Provenance stamp rendering — overlays a signer/timestamp line onto the last
// page of an existing PDF.
//
// The overlay is merged onto the final page rather than appended as a new
// page, so page count is preserved. The page's existing content streams are
// wrapped in `q … Q` so graphics state left dirty by the original content
// cannot move or recolour the stamp.

use chrono::{DateTime, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::{debug, info, instrument};
use vellum_core::config::StampStyle;
use vellum_core::error::VellumError;

use super::reader::{PdfReader, effective_resources, resolve_dictionary};

/// Resource name of the stamp font inside the page's /Font dictionary.
const STAMP_FONT: &str = "FVellumStamp";

fn render_err(context: &str, err: impl std::fmt::Display) -> VellumError {
    VellumError::RenderError(format!("{context}: {err}"))
}

/// Draws provenance lines onto PDF pages.
#[derive(Debug, Clone, Default)]
pub struct StampRenderer {
    style: StampStyle,
}

impl StampRenderer {
    pub fn new(style: StampStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &StampStyle {
        &self.style
    }

    /// The visible line for a signer at a point in time.
    pub fn stamp_line(&self, signer: &str, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}: {} {}",
            self.style.label,
            signer,
            timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }

    /// Overlay `line` on the last page of `pdf` and return the new PDF bytes.
    ///
    /// Fails with `UnsupportedFormat` if `pdf` is not a loadable PDF and with
    /// `RenderError` if the overlay cannot be composed or serialised.
    #[instrument(skip(self, pdf), fields(bytes_len = pdf.len()))]
    pub fn render(&self, pdf: &[u8], line: &str) -> Result<Vec<u8>, VellumError> {
        let reader = PdfReader::from_bytes(pdf)?;
        let (page_number, page_id) = reader
            .last_page()
            .ok_or_else(|| VellumError::RenderError("document has no pages".into()))?;
        let mut doc = reader.into_document();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources = self.resources_with_font(&doc, page_id, font_id)?;

        let mut contents = Vec::new();
        contents.push(Object::Reference(
            doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec())),
        ));
        contents.extend(existing_contents(&doc, page_id)?);
        contents.push(Object::Reference(
            doc.add_object(Stream::new(Dictionary::new(), self.overlay(line)?)),
        ));

        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| render_err("cannot edit last page", err))?;
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Array(contents));

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|err| render_err("failed to serialise stamped PDF", err))?;

        info!(page_number, output_bytes = output.len(), "provenance stamp rendered");
        Ok(output)
    }

    /// Copy the page's effective resources onto the page itself and register
    /// the stamp font. Shared ancestor dictionaries are left untouched.
    fn resources_with_font(
        &self,
        doc: &Document,
        page_id: ObjectId,
        font_id: ObjectId,
    ) -> Result<Dictionary, VellumError> {
        let mut resources = effective_resources(doc, page_id)?;
        let mut fonts = match resources.get(b"Font") {
            Ok(fonts) => resolve_dictionary(doc, fonts)?,
            Err(_) => Dictionary::new(),
        };
        fonts.set(STAMP_FONT, Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));
        Ok(resources)
    }

    fn overlay(&self, line: &str) -> Result<Vec<u8>, VellumError> {
        let style = &self.style;
        let content = Content {
            operations: vec![
                // Close the `q` opened before the original content.
                Operation::new("Q", vec![]),
                Operation::new("q", vec![]),
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(STAMP_FONT.as_bytes().to_vec()), Object::Integer(style.font_size_pt)],
                ),
                Operation::new("Td", vec![Object::Integer(style.x_pt), Object::Integer(style.y_pt)]),
                Operation::new("Tj", vec![Object::String(to_win_ansi(line), StringFormat::Literal)]),
                Operation::new("ET", vec![]),
                Operation::new("Q", vec![]),
            ],
        };
        // Leading newline: the previous stream may end mid-line.
        let mut encoded = b"\n".to_vec();
        encoded.extend(
            content
                .encode()
                .map_err(|err| render_err("failed to encode stamp content", err))?,
        );
        debug!(overlay_bytes = encoded.len(), "stamp overlay encoded");
        Ok(encoded)
    }
}

/// References to the page's current content streams, in drawing order.
fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, VellumError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|err| render_err("cannot read last page", err))?;

    match page.get(b"Contents") {
        Err(_) => Ok(Vec::new()),
        Ok(Object::Array(items)) => Ok(items.clone()),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            // An indirect array of streams.
            Ok(Object::Array(items)) => Ok(items.clone()),
            _ => Ok(vec![Object::Reference(*id)]),
        },
        Ok(other) => Err(VellumError::RenderError(format!(
            "unexpected /Contents entry: {other:?}"
        ))),
    }
}

/// Encode text for a simple font with WinAnsiEncoding. Latin-1 printable
/// characters map to themselves; anything else becomes `?`.
fn to_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u8,
            _ => b'?',
        })
        .collect()
}
