// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — reading, provenance stamping, and creating PDFs.

pub mod reader;
pub mod stamp;
pub mod writer;

pub use reader::{PdfReader, is_pdf};
pub use stamp::StampRenderer;
pub use writer::{PageSize, PdfWriter};
