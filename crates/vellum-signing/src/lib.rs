// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// vellum-signing — signs document versions, verifies their signature sets,
// and stamps visible provenance onto PDFs.

pub mod locks;
pub mod service;
pub mod stamper;

pub use locks::{DocumentGuard, DocumentLocks};
pub use service::SignatureService;
pub use stamper::ProvenanceStamper;
