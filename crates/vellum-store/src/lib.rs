// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// vellum-store — where document bytes and their metadata live.
//
// Object stores hold immutable bytes under storage-assigned version ids. The
// SQLite ledger holds documents, versions, certificates, and signatures.
// `VersionStore` ties the two together as an append-only version history.

pub mod ledger;
pub mod object;
pub mod repository;
pub mod versions;

pub use ledger::SqliteLedger;
pub use object::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use repository::{
    CertificateDirectory, DocumentRepository, MetadataStore, SignatureRepository,
    VersionRepository,
};
pub use versions::VersionStore;
