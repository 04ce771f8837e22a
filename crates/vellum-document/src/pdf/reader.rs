// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — format sniffing and page-tree inspection using the `lopdf`
// crate.

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, instrument};
use vellum_core::error::VellumError;

/// How far up the page tree to look for inherited attributes.
const MAX_TREE_DEPTH: usize = 64;

/// Readers accept junk before the header, within the first kilobyte.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// `true` if `data` carries a `%PDF-` header where readers look for one.
pub fn is_pdf(data: &[u8]) -> bool {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// Read-only view of a parsed PDF document.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    /// Parse raw PDF bytes.
    ///
    /// Anything that is not a loadable PDF is `UnsupportedFormat`: the
    /// document is not in a page-structured format this crate can work with.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, VellumError> {
        if !is_pdf(data) {
            return Err(VellumError::UnsupportedFormat(
                "missing %PDF- header".to_string(),
            ));
        }

        let document = Document::load_mem(data).map_err(|err| {
            VellumError::UnsupportedFormat(format!("failed to parse PDF: {err}"))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Page number (1-indexed) and object id of the final page.
    pub fn last_page(&self) -> Option<(u32, ObjectId)> {
        self.document.get_pages().into_iter().next_back()
    }

    /// Decoded content stream bytes of a page (1-indexed).
    pub fn page_content(&self, page_number: u32) -> Result<Vec<u8>, VellumError> {
        let page_id = self.page_id(page_number)?;
        self.document.get_page_content(page_id).map_err(|err| {
            VellumError::RenderError(format!("cannot read content of page {page_number}: {err}"))
        })
    }

    /// Effective resource dictionary of a page (1-indexed), following
    /// inheritance through the page tree.
    pub fn page_resources(&self, page_number: u32) -> Result<Dictionary, VellumError> {
        let page_id = self.page_id(page_number)?;
        effective_resources(&self.document, page_id)
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    fn page_id(&self, page_number: u32) -> Result<ObjectId, VellumError> {
        let pages = self.document.get_pages();
        pages.get(&page_number).copied().ok_or_else(|| {
            VellumError::RenderError(format!(
                "page {} out of range (document has {} pages)",
                page_number,
                pages.len()
            ))
        })
    }
}

/// Resolve a dictionary that may be stored inline or behind a reference.
pub(crate) fn resolve_dictionary(doc: &Document, object: &Object) -> Result<Dictionary, VellumError> {
    match object {
        Object::Dictionary(dict) => Ok(dict.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).cloned().map_err(|err| {
            VellumError::RenderError(format!("cannot resolve dictionary {id:?}: {err}"))
        }),
        other => Err(VellumError::RenderError(format!(
            "expected a dictionary, found {other:?}"
        ))),
    }
}

/// The page's own /Resources, or the nearest ancestor's, or an empty set.
pub(crate) fn effective_resources(
    doc: &Document,
    page_id: ObjectId,
) -> Result<Dictionary, VellumError> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(current).map_err(|err| {
            VellumError::RenderError(format!("cannot read page tree node {current:?}: {err}"))
        })?;
        if let Ok(resources) = node.get(b"Resources") {
            return resolve_dictionary(doc, resources);
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => break,
        }
    }
    Ok(Dictionary::new())
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample_pdf;
    use super::*;

    #[test]
    fn sniff_header() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(is_pdf(b"\xef\xbb\xbf%PDF-1.4"));
        assert!(!is_pdf(b"PK\x03\x04 docx"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn non_pdf_is_unsupported() {
        let result = PdfReader::from_bytes(b"plain text, not a PDF");
        assert!(matches!(result, Err(VellumError::UnsupportedFormat(_))));
    }

    #[test]
    fn truncated_pdf_is_unsupported() {
        let result = PdfReader::from_bytes(b"%PDF-1.5\n1 0 obj\n<<");
        assert!(matches!(result, Err(VellumError::UnsupportedFormat(_))));
    }

    #[test]
    fn counts_pages_and_finds_last() {
        let reader = PdfReader::from_bytes(&sample_pdf(3)).unwrap();
        assert_eq!(reader.page_count(), 3);
        assert_eq!(reader.last_page().map(|(n, _)| n), Some(3));
    }

    #[test]
    fn reads_page_content() {
        let reader = PdfReader::from_bytes(&sample_pdf(2)).unwrap();
        let content = reader.page_content(2).unwrap();
        assert!(content.windows(6).any(|w| w == b"Page 2"));
        assert!(reader.page_content(3).is_err());
    }

    #[test]
    fn inherited_resources_are_found() {
        let reader = PdfReader::from_bytes(&sample_pdf(1)).unwrap();
        let resources = reader.page_resources(1).unwrap();
        assert!(resources.has(b"Font"));
    }
}
