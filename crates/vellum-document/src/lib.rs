// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// vellum-document — page-structured document handling for Vellum.
//
// Reads PDFs, overlays provenance stamps onto their last page, and lays plain
// text out as new PDFs.

pub mod pdf;

// Re-export the primary structs so callers can use `vellum_document::PdfReader` etc.
pub use pdf::reader::{PdfReader, is_pdf};
pub use pdf::stamp::StampRenderer;
pub use pdf::writer::{PageSize, PdfWriter};
